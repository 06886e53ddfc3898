//! PostgreSQL read model store
//!
//! Each read model is stored whole as a JSONB `document`. The columns
//! beside it duplicate the fields queries filter on.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;

use app_services::{OrganisationReadModel, QuoteFilter, QuoteReadModel, ReadModelStore, UserReadModel};
use core_kernel::{
    DomainPort, HealthCheckResult, HealthCheckable, OrganisationId, PortError, QuoteAggregateId, QuoteId, TenantId,
    UserId,
};

use crate::error::port_error;
use crate::pool::probe;

fn decode<T: DeserializeOwned>(documents: Vec<serde_json::Value>) -> Result<Vec<T>, PortError> {
    documents
        .into_iter()
        .map(|d| serde_json::from_value(d).map_err(PortError::from))
        .collect()
}

fn decode_one<T: DeserializeOwned>(document: Option<serde_json::Value>) -> Result<Option<T>, PortError> {
    document
        .map(|d| serde_json::from_value(d).map_err(PortError::from))
        .transpose()
}

/// Text form of a unit enum as serde writes it
pub(crate) fn enum_text<T: Serialize>(value: &T) -> Result<String, PortError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(text) => Ok(text),
        other => Err(PortError::transformation(format!("expected a string, got {}", other))),
    }
}

#[derive(Debug, Clone)]
pub struct PostgresReadModelStore {
    pool: PgPool,
}

impl PostgresReadModelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DomainPort for PostgresReadModelStore {}

#[async_trait]
impl HealthCheckable for PostgresReadModelStore {
    async fn health_check(&self) -> HealthCheckResult {
        probe(&self.pool, "postgres-read-models").await
    }
}

#[async_trait]
impl ReadModelStore for PostgresReadModelStore {
    #[instrument(skip(self, quotes), fields(count = quotes.len()))]
    async fn replace_quotes(
        &self,
        tenant_id: TenantId,
        aggregate_id: QuoteAggregateId,
        quotes: Vec<QuoteReadModel>,
    ) -> Result<(), PortError> {
        let mut tx = self.pool.begin().await.map_err(port_error)?;

        sqlx::query("DELETE FROM quote_read_models WHERE tenant_id = $1 AND aggregate_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(port_error)?;

        for quote in &quotes {
            sqlx::query(
                r#"
                INSERT INTO quote_read_models (tenant_id, quote_id, aggregate_id, organisation_id,
                                               customer_id, state, discarded, created_at, document)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(tenant_id.as_uuid())
            .bind(quote.quote_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(quote.organisation_id.as_uuid())
            .bind(quote.customer_id.map(|c| *c.as_uuid()))
            .bind(enum_text(&quote.state)?)
            .bind(quote.discarded)
            .bind(quote.created_at)
            .bind(serde_json::to_value(quote)?)
            .execute(&mut *tx)
            .await
            .map_err(port_error)?;
        }

        tx.commit().await.map_err(port_error)
    }

    async fn get_quote(&self, tenant_id: TenantId, quote_id: QuoteId) -> Result<Option<QuoteReadModel>, PortError> {
        let document = sqlx::query_scalar("SELECT document FROM quote_read_models WHERE tenant_id = $1 AND quote_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(quote_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        decode_one(document)
    }

    async fn list_quotes(&self, tenant_id: TenantId, filter: &QuoteFilter) -> Result<Vec<QuoteReadModel>, PortError> {
        let state = filter.state.as_ref().map(enum_text).transpose()?;
        let documents = sqlx::query_scalar(
            r#"
            SELECT document FROM quote_read_models
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR state = $2)
              AND ($3::uuid IS NULL OR organisation_id = $3)
              AND ($4::uuid IS NULL OR customer_id = $4)
              AND ($5 OR NOT discarded)
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(state)
        .bind(filter.organisation_id.map(|o| *o.as_uuid()))
        .bind(filter.customer_id.map(|c| *c.as_uuid()))
        .bind(filter.include_discarded)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        decode(documents)
    }

    async fn upsert_user(&self, user: UserReadModel) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO user_read_models (tenant_id, user_id, organisation_id, login_email, created_at, document)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, user_id) DO UPDATE
            SET organisation_id = EXCLUDED.organisation_id,
                login_email = EXCLUDED.login_email,
                document = EXCLUDED.document
            "#,
        )
        .bind(user.tenant_id.as_uuid())
        .bind(user.user_id.as_uuid())
        .bind(user.organisation_id.as_uuid())
        .bind(&user.login_email)
        .bind(user.created_at)
        .bind(serde_json::to_value(&user)?)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserReadModel>, PortError> {
        let document = sqlx::query_scalar("SELECT document FROM user_read_models WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        decode_one(document)
    }

    async fn find_user_by_email(&self, tenant_id: TenantId, email: &str) -> Result<Option<UserReadModel>, PortError> {
        let document = sqlx::query_scalar(
            "SELECT document FROM user_read_models WHERE tenant_id = $1 AND lower(login_email) = lower($2) LIMIT 1",
        )
        .bind(tenant_id.as_uuid())
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        decode_one(document)
    }

    async fn list_users(
        &self,
        tenant_id: TenantId,
        organisation_id: Option<OrganisationId>,
    ) -> Result<Vec<UserReadModel>, PortError> {
        let documents = sqlx::query_scalar(
            r#"
            SELECT document FROM user_read_models
            WHERE tenant_id = $1 AND ($2::uuid IS NULL OR organisation_id = $2)
            ORDER BY login_email
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(organisation_id.map(|o| *o.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        decode(documents)
    }

    async fn upsert_organisation(&self, organisation: OrganisationReadModel) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO organisation_read_models (tenant_id, organisation_id, alias, deleted, created_at, document)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, organisation_id) DO UPDATE
            SET alias = EXCLUDED.alias,
                deleted = EXCLUDED.deleted,
                document = EXCLUDED.document
            "#,
        )
        .bind(organisation.tenant_id.as_uuid())
        .bind(organisation.organisation_id.as_uuid())
        .bind(&organisation.alias)
        .bind(organisation.deleted)
        .bind(organisation.created_at)
        .bind(serde_json::to_value(&organisation)?)
        .execute(&self.pool)
        .await
        .map_err(port_error)?;
        Ok(())
    }

    async fn get_organisation(
        &self,
        tenant_id: TenantId,
        organisation_id: OrganisationId,
    ) -> Result<Option<OrganisationReadModel>, PortError> {
        let document = sqlx::query_scalar(
            "SELECT document FROM organisation_read_models WHERE tenant_id = $1 AND organisation_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(organisation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        decode_one(document)
    }

    async fn find_organisation_by_alias(
        &self,
        tenant_id: TenantId,
        alias: &str,
    ) -> Result<Option<OrganisationReadModel>, PortError> {
        let document = sqlx::query_scalar(
            "SELECT document FROM organisation_read_models WHERE tenant_id = $1 AND alias = $2 AND NOT deleted LIMIT 1",
        )
        .bind(tenant_id.as_uuid())
        .bind(alias)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        decode_one(document)
    }

    async fn list_organisations(
        &self,
        tenant_id: TenantId,
        include_deleted: bool,
    ) -> Result<Vec<OrganisationReadModel>, PortError> {
        let documents = sqlx::query_scalar(
            r#"
            SELECT document FROM organisation_read_models
            WHERE tenant_id = $1 AND ($2 OR NOT deleted)
            ORDER BY document->>'name'
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        decode(documents)
    }
}

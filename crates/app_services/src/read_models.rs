//! Read models
//!
//! Query-side documents projected from aggregate state after every save.
//! Projection is whole-document: a handler rebuilds the read model from
//! the aggregate it just saved and replaces what was stored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::{
    CustomerId, DeploymentEnvironment, DomainPort, EventSourced, HealthCheckable, Money, OrganisationId,
    PersonId, PortError, ProductId, QuoteAggregateId, QuoteId, TenantId, UserId,
};
use domain_party::{OrganisationAggregate, PersonAggregate, UserAggregate};
use domain_quote::{CalculationState, QuoteAggregate, QuoteState, QuoteType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteReadModel {
    pub tenant_id: TenantId,
    pub quote_id: QuoteId,
    pub aggregate_id: QuoteAggregateId,
    pub organisation_id: OrganisationId,
    pub product_id: ProductId,
    pub environment: DeploymentEnvironment,
    pub is_test_data: bool,
    pub quote_type: QuoteType,
    pub state: QuoteState,
    pub quote_number: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub owner_user_id: Option<UserId>,
    pub form_data: Value,
    pub calculation_state: Option<CalculationState>,
    pub total_premium: Option<Money>,
    pub submitted: bool,
    pub discarded: bool,
    pub expiry: Option<DateTime<Utc>>,
    pub policy_number: Option<String>,
    /// Aggregate version the document was projected at
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl QuoteReadModel {
    /// One document per quote held by the aggregate
    pub fn project(aggregate: &QuoteAggregate) -> Vec<QuoteReadModel> {
        let policy_number = aggregate.policy().map(|p| p.policy_number().to_string());
        aggregate
            .quotes()
            .iter()
            .map(|quote| {
                let calculation = quote.latest_calculation();
                QuoteReadModel {
                    tenant_id: aggregate.tenant_id(),
                    quote_id: quote.id(),
                    aggregate_id: aggregate.id(),
                    organisation_id: aggregate.organisation_id(),
                    product_id: aggregate.product_id(),
                    environment: aggregate.environment(),
                    is_test_data: aggregate.is_test_data(),
                    quote_type: quote.quote_type(),
                    state: quote.state(),
                    quote_number: quote.quote_number().map(str::to_string),
                    customer_id: aggregate.customer_id(),
                    owner_user_id: aggregate.owner_user_id(),
                    form_data: quote.form_data().clone(),
                    calculation_state: calculation.map(|c| c.state),
                    total_premium: calculation.and_then(|c| c.total()),
                    submitted: quote.is_submitted(),
                    discarded: quote.is_discarded(),
                    expiry: quote.expiry(),
                    policy_number: policy_number.clone(),
                    version: aggregate.version(),
                    created_at: quote.created_at(),
                    last_modified: quote.last_modified(),
                }
            })
            .collect()
    }

    /// Expiry is derived from the expiry date, never stored
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReadModel {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub organisation_id: OrganisationId,
    pub person_id: PersonId,
    pub login_email: String,
    pub full_name: String,
    pub preferred_name: Option<String>,
    pub mobile_phone: Option<String>,
    pub roles: Vec<String>,
    pub blocked: bool,
    pub activated: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl UserReadModel {
    pub fn project(user: &UserAggregate, person: &PersonAggregate) -> Self {
        let details = person.details();
        Self {
            tenant_id: user.tenant_id(),
            user_id: user.id(),
            organisation_id: user.organisation_id(),
            person_id: person.id(),
            login_email: user.login_email().to_string(),
            full_name: details.full_name.clone(),
            preferred_name: details.preferred_name.clone(),
            mobile_phone: details.mobile_phone.clone(),
            roles: user.roles().to_vec(),
            blocked: user.is_blocked(),
            activated: user.is_activated(),
            created_at: user.created_at(),
            last_modified: user.last_modified().max(person.last_modified()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationReadModel {
    pub tenant_id: TenantId,
    pub organisation_id: OrganisationId,
    pub name: String,
    pub alias: String,
    pub active: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl OrganisationReadModel {
    pub fn project(organisation: &OrganisationAggregate) -> Self {
        Self {
            tenant_id: organisation.tenant_id(),
            organisation_id: organisation.id(),
            name: organisation.name().to_string(),
            alias: organisation.alias().to_string(),
            active: organisation.is_active(),
            deleted: organisation.is_deleted(),
            created_at: organisation.created_at(),
            last_modified: organisation.last_modified(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteFilter {
    pub state: Option<QuoteState>,
    pub organisation_id: Option<OrganisationId>,
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub include_discarded: bool,
}

impl QuoteFilter {
    pub fn matches(&self, quote: &QuoteReadModel) -> bool {
        self.state.map_or(true, |s| quote.state == s)
            && self.organisation_id.map_or(true, |o| quote.organisation_id == o)
            && self.customer_id.map_or(true, |c| quote.customer_id == Some(c))
            && (self.include_discarded || !quote.discarded)
    }
}

/// Storage for read models, partitioned by tenant
#[async_trait]
pub trait ReadModelStore: DomainPort + HealthCheckable {
    /// Replaces every quote document of the aggregate
    async fn replace_quotes(
        &self,
        tenant_id: TenantId,
        aggregate_id: QuoteAggregateId,
        quotes: Vec<QuoteReadModel>,
    ) -> Result<(), PortError>;

    async fn get_quote(&self, tenant_id: TenantId, quote_id: QuoteId) -> Result<Option<QuoteReadModel>, PortError>;

    /// Newest first
    async fn list_quotes(&self, tenant_id: TenantId, filter: &QuoteFilter) -> Result<Vec<QuoteReadModel>, PortError>;

    async fn upsert_user(&self, user: UserReadModel) -> Result<(), PortError>;

    async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserReadModel>, PortError>;

    /// Case-insensitive
    async fn find_user_by_email(&self, tenant_id: TenantId, email: &str) -> Result<Option<UserReadModel>, PortError>;

    async fn list_users(
        &self,
        tenant_id: TenantId,
        organisation_id: Option<OrganisationId>,
    ) -> Result<Vec<UserReadModel>, PortError>;

    async fn upsert_organisation(&self, organisation: OrganisationReadModel) -> Result<(), PortError>;

    async fn get_organisation(
        &self,
        tenant_id: TenantId,
        organisation_id: OrganisationId,
    ) -> Result<Option<OrganisationReadModel>, PortError>;

    /// Ignores deleted organisations, whose aliases are free for reuse
    async fn find_organisation_by_alias(
        &self,
        tenant_id: TenantId,
        alias: &str,
    ) -> Result<Option<OrganisationReadModel>, PortError>;

    async fn list_organisations(
        &self,
        tenant_id: TenantId,
        include_deleted: bool,
    ) -> Result<Vec<OrganisationReadModel>, PortError>;
}

/// Process-local read model store, used by the in-memory backend and tests
pub mod memory {
    use super::*;
    use core_kernel::HealthCheckResult;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    pub struct InMemoryReadModelStore {
        quotes: RwLock<HashMap<(TenantId, QuoteId), QuoteReadModel>>,
        users: RwLock<HashMap<(TenantId, UserId), UserReadModel>>,
        organisations: RwLock<HashMap<(TenantId, OrganisationId), OrganisationReadModel>>,
    }

    impl InMemoryReadModelStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for InMemoryReadModelStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryReadModelStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("in-memory-read-models")
        }
    }

    #[async_trait]
    impl ReadModelStore for InMemoryReadModelStore {
        async fn replace_quotes(
            &self,
            tenant_id: TenantId,
            aggregate_id: QuoteAggregateId,
            quotes: Vec<QuoteReadModel>,
        ) -> Result<(), PortError> {
            let mut stored = self.quotes.write().await;
            stored.retain(|(tenant, _), q| !(*tenant == tenant_id && q.aggregate_id == aggregate_id));
            for quote in quotes {
                stored.insert((tenant_id, quote.quote_id), quote);
            }
            Ok(())
        }

        async fn get_quote(&self, tenant_id: TenantId, quote_id: QuoteId) -> Result<Option<QuoteReadModel>, PortError> {
            Ok(self.quotes.read().await.get(&(tenant_id, quote_id)).cloned())
        }

        async fn list_quotes(&self, tenant_id: TenantId, filter: &QuoteFilter) -> Result<Vec<QuoteReadModel>, PortError> {
            let mut quotes: Vec<QuoteReadModel> = self
                .quotes
                .read()
                .await
                .iter()
                .filter(|((tenant, _), q)| *tenant == tenant_id && filter.matches(q))
                .map(|(_, q)| q.clone())
                .collect();
            quotes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(quotes)
        }

        async fn upsert_user(&self, user: UserReadModel) -> Result<(), PortError> {
            self.users.write().await.insert((user.tenant_id, user.user_id), user);
            Ok(())
        }

        async fn get_user(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserReadModel>, PortError> {
            Ok(self.users.read().await.get(&(tenant_id, user_id)).cloned())
        }

        async fn find_user_by_email(&self, tenant_id: TenantId, email: &str) -> Result<Option<UserReadModel>, PortError> {
            Ok(self
                .users
                .read()
                .await
                .values()
                .find(|u| u.tenant_id == tenant_id && u.login_email.eq_ignore_ascii_case(email.trim()))
                .cloned())
        }

        async fn list_users(
            &self,
            tenant_id: TenantId,
            organisation_id: Option<OrganisationId>,
        ) -> Result<Vec<UserReadModel>, PortError> {
            let mut users: Vec<UserReadModel> = self
                .users
                .read()
                .await
                .values()
                .filter(|u| u.tenant_id == tenant_id && organisation_id.map_or(true, |o| u.organisation_id == o))
                .cloned()
                .collect();
            users.sort_by(|a, b| a.login_email.cmp(&b.login_email));
            Ok(users)
        }

        async fn upsert_organisation(&self, organisation: OrganisationReadModel) -> Result<(), PortError> {
            self.organisations
                .write()
                .await
                .insert((organisation.tenant_id, organisation.organisation_id), organisation);
            Ok(())
        }

        async fn get_organisation(
            &self,
            tenant_id: TenantId,
            organisation_id: OrganisationId,
        ) -> Result<Option<OrganisationReadModel>, PortError> {
            Ok(self
                .organisations
                .read()
                .await
                .get(&(tenant_id, organisation_id))
                .cloned())
        }

        async fn find_organisation_by_alias(
            &self,
            tenant_id: TenantId,
            alias: &str,
        ) -> Result<Option<OrganisationReadModel>, PortError> {
            Ok(self
                .organisations
                .read()
                .await
                .values()
                .find(|o| o.tenant_id == tenant_id && !o.deleted && o.alias == alias)
                .cloned())
        }

        async fn list_organisations(
            &self,
            tenant_id: TenantId,
            include_deleted: bool,
        ) -> Result<Vec<OrganisationReadModel>, PortError> {
            let mut organisations: Vec<OrganisationReadModel> = self
                .organisations
                .read()
                .await
                .values()
                .filter(|o| o.tenant_id == tenant_id && (include_deleted || !o.deleted))
                .cloned()
                .collect();
            organisations.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(organisations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryReadModelStore;
    use super::*;
    use domain_quote::NewQuoteAggregate;
    use serde_json::json;

    fn aggregate(tenant_id: TenantId, organisation_id: OrganisationId) -> QuoteAggregate {
        QuoteAggregate::create_new_business(
            NewQuoteAggregate {
                tenant_id,
                aggregate_id: QuoteAggregateId::new(),
                organisation_id,
                product_id: ProductId::new(),
                environment: DeploymentEnvironment::Development,
                is_test_data: false,
                quote_id: QuoteId::new(),
                form_data: Some(json!({ "a": 1 })),
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_projection_has_one_document_per_quote() {
        let agg = aggregate(TenantId::new(), OrganisationId::new());
        let docs = QuoteReadModel::project(&agg);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].state, QuoteState::Nascent);
        assert_eq!(docs[0].aggregate_id, agg.id());
        assert_eq!(docs[0].form_data["a"], 1);
    }

    #[test]
    fn test_expiry_is_derived() {
        let agg = aggregate(TenantId::new(), OrganisationId::new());
        let mut doc = QuoteReadModel::project(&agg).remove(0);
        let now = Utc::now();
        assert!(!doc.is_expired(now));
        doc.expiry = Some(now - chrono::Duration::days(1));
        assert!(doc.is_expired(now));
        doc.state = QuoteState::Complete;
        assert!(!doc.is_expired(now));
    }

    #[tokio::test]
    async fn test_quotes_are_isolated_by_tenant_and_filtered() {
        let store = InMemoryReadModelStore::new();
        let (tenant, other_tenant) = (TenantId::new(), TenantId::new());
        let org = OrganisationId::new();

        let mine = aggregate(tenant, org);
        let theirs = aggregate(other_tenant, org);
        store.replace_quotes(tenant, mine.id(), QuoteReadModel::project(&mine)).await.unwrap();
        store
            .replace_quotes(other_tenant, theirs.id(), QuoteReadModel::project(&theirs))
            .await
            .unwrap();

        let all = store.list_quotes(tenant, &QuoteFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);

        let incomplete = QuoteFilter {
            state: Some(QuoteState::Incomplete),
            ..QuoteFilter::default()
        };
        assert!(store.list_quotes(tenant, &incomplete).await.unwrap().is_empty());

        let quote_id = theirs.quotes()[0].id();
        assert!(store.get_quote(tenant, quote_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_removes_quotes_no_longer_in_the_aggregate() {
        let store = InMemoryReadModelStore::new();
        let tenant = TenantId::new();
        let agg = aggregate(tenant, OrganisationId::new());
        store.replace_quotes(tenant, agg.id(), QuoteReadModel::project(&agg)).await.unwrap();
        store.replace_quotes(tenant, agg.id(), Vec::new()).await.unwrap();

        assert!(store.list_quotes(tenant, &QuoteFilter::default()).await.unwrap().is_empty());
    }
}

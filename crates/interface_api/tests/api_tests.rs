//! API Tests
//!
//! Drives the full router over in-memory storage: bootstrap administrator,
//! token issuance, quotes through binding, users, organisations and
//! updater jobs.

use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use domain_party::password::mock::PlainTextPasswordHasher;
use interface_api::bootstrap::Services;
use interface_api::config::{ApiConfig, BootstrapAdmin};
use interface_api::create_router;
use interface_api::middleware::CORRELATION_HEADER;

const MOTOR_RULES: &str = r#"{
    "metadata": { "product_code": "MOTOR", "product_name": "Motor", "version": "1", "currency": "AUD" },
    "base_premium": "500",
    "rates": { "gst_percent": "10" },
    "required_fields": ["driver.age", "vehicle.value"],
    "estimate_fields": ["vehicle.value"]
}"#;

const ADMIN_EMAIL: &str = "admin@acme.test";
const ADMIN_PASSWORD: &str = "admin-password-1";

struct TestApp {
    server: TestServer,
    tenant_id: Uuid,
    product_id: Uuid,
    _services: Services,
    _dirs: (TempDir, TempDir),
}

async fn spawn_app() -> TestApp {
    let tenant_id = Uuid::new_v4();
    let product_id = Uuid::new_v4();

    let rules_dir = TempDir::new().expect("rules dir");
    std::fs::write(rules_dir.path().join(format!("{}.json", product_id)), MOTOR_RULES).expect("write rules");
    std::fs::write(rules_dir.path().join("README.txt"), "ignored").expect("write readme");
    let work_dir = TempDir::new().expect("work dir");

    let mut config = ApiConfig {
        jwt_secret: "api-test-secret".to_string(),
        rating_rules_dir: Some(rules_dir.path().to_path_buf()),
        bootstrap_admin: Some(BootstrapAdmin {
            tenant_id,
            organisation_name: "Acme Insurance".to_string(),
            organisation_alias: "acme".to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        }),
        ..ApiConfig::default()
    };
    config.updater.work_dir = work_dir.path().to_path_buf();

    let services = Services::start_with_hasher(config, Arc::new(PlainTextPasswordHasher))
        .await
        .expect("services should start");
    let server = TestServer::new(create_router(services.state.clone())).expect("test server");

    TestApp {
        server,
        tenant_id,
        product_id,
        _services: services,
        _dirs: (rules_dir, work_dir),
    }
}

fn bearer(request: TestRequest, token: &str) -> TestRequest {
    let value = HeaderValue::from_str(&format!("Bearer {}", token)).expect("header value");
    request.add_header(AUTHORIZATION, value)
}

impl TestApp {
    async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        let response = self
            .server
            .post("/api/v1/auth/login")
            .json(&json!({ "tenant_id": self.tenant_id, "email": email, "password": password }))
            .await;
        (response.status_code(), response.json::<Value>())
    }

    async fn admin_token(&self) -> String {
        let (status, body) = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
        body["access_token"].as_str().expect("token").to_string()
    }

    async fn organisation_id(&self, token: &str) -> String {
        let response = bearer(self.server.get("/api/v1/organisations/by-alias/acme"), token).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        response.json::<Value>()["organisation_id"]
            .as_str()
            .expect("organisation id")
            .to_string()
    }

    async fn create_quote(&self, token: &str) -> Value {
        let organisation_id = self.organisation_id(token).await;
        let response = bearer(self.server.post("/api/v1/quotes"), token)
            .json(&json!({ "organisation_id": organisation_id, "product_id": self.product_id }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
        response.json::<Value>()
    }
}

/// A year of cover from now
fn bind_dates() -> Value {
    let now = chrono::Utc::now();
    json!({ "effective_date": now, "expiry_date": now + chrono::Duration::days(365) })
}

fn id_of(body: &Value, field: &str) -> String {
    body[field].as_str().expect("id field").to_string()
}

// ============================================================================
// HEALTH AND AUTHENTICATION
// ============================================================================

mod health_and_auth {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoints_are_public() {
        let app = spawn_app().await;

        let live = app.server.get("/health").await;
        assert_eq!(live.status_code(), StatusCode::OK);
        assert_eq!(live.json::<Value>()["status"], "healthy");

        let ready = app.server.get("/health/ready").await;
        assert_eq!(ready.status_code(), StatusCode::OK);
        assert_eq!(ready.json::<Value>()["status"], "ready");
    }

    #[tokio::test]
    async fn test_bootstrap_admin_can_log_in() {
        let app = spawn_app().await;
        let (status, body) = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["user"]["login_email"], ADMIN_EMAIL);
        assert!(body["user"]["roles"].as_array().unwrap().iter().any(|r| r == "Admin"));
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let app = spawn_app().await;
        let (status, body) = app.login(ADMIN_EMAIL, "not-the-password").await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_malformed_email_is_a_validation_error() {
        let app = spawn_app().await;
        let (status, body) = app.login("not-an-email", ADMIN_PASSWORD).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_protected_routes_need_a_token() {
        let app = spawn_app().await;

        let missing = app.server.get("/api/v1/quotes").await;
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

        let forged = bearer(app.server.get("/api/v1/quotes"), "not.a.jwt").await;
        assert_eq!(forged.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_correlation_id_is_echoed() {
        let app = spawn_app().await;
        let token = app.admin_token().await;
        let correlation_id = Uuid::new_v4().to_string();

        let response = bearer(app.server.get("/api/v1/quotes"), &token)
            .add_header(
                HeaderName::from_static(CORRELATION_HEADER),
                HeaderValue::from_str(&correlation_id).unwrap(),
            )
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let echoed = response.headers().get(CORRELATION_HEADER).cloned();
        assert!(echoed.is_some_and(|v| v.to_str().unwrap().contains(&correlation_id)));
    }

    #[tokio::test]
    async fn test_password_reset_is_accepted_for_unknown_email() {
        let app = spawn_app().await;
        let response = app
            .server
            .post("/api/v1/auth/password-reset")
            .json(&json!({ "tenant_id": app.tenant_id, "email": "nobody@acme.test" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    }
}

// ============================================================================
// QUOTES
// ============================================================================

mod quotes {
    use super::*;

    #[tokio::test]
    async fn test_quote_is_created_numbered_and_listed() {
        let app = spawn_app().await;
        let token = app.admin_token().await;
        let quote = app.create_quote(&token).await;

        assert_eq!(quote["state"], "Nascent");
        assert!(quote["quote_number"].is_string());

        let list = bearer(app.server.get("/api/v1/quotes"), &token).await;
        assert_eq!(list.status_code(), StatusCode::OK);
        assert_eq!(list.json::<Value>().as_array().unwrap().len(), 1);

        let fetched = bearer(app.server.get(&format!("/api/v1/quotes/{}", id_of(&quote, "quote_id"))), &token).await;
        assert_eq!(fetched.json::<Value>()["quote_number"], quote["quote_number"]);
    }

    #[tokio::test]
    async fn test_unknown_quote_is_not_found() {
        let app = spawn_app().await;
        let token = app.admin_token().await;

        let response = bearer(app.server.get(&format!("/api/v1/quotes/{}", Uuid::new_v4())), &token).await;

        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["error"], "not_found");
    }

    #[tokio::test]
    async fn test_quote_binds_to_a_policy() {
        let app = spawn_app().await;
        let token = app.admin_token().await;

        for (kind, number) in [("policy", "P-100"), ("invoice", "INV-100")] {
            let loaded = bearer(
                app.server.post(&format!("/api/v1/products/{}/numbers", app.product_id)),
                &token,
            )
            .json(&json!({ "kind": kind, "numbers": [number] }))
            .await;
            assert_eq!(loaded.status_code(), StatusCode::OK);
            assert_eq!(loaded.json::<Value>()["added"], 1);
        }

        let quote = app.create_quote(&token).await;
        let base = format!("/api/v1/quotes/{}", id_of(&quote, "quote_id"));

        let updated = bearer(app.server.put(&format!("{}/form-data", base)), &token)
            .json(&json!({ "form_data": { "driver": { "age": 40 }, "vehicle": { "value": 30000 } } }))
            .await;
        assert_eq!(updated.status_code(), StatusCode::OK);

        let calculated = bearer(app.server.post(&format!("{}/calculate", base)), &token).await;
        assert_eq!(calculated.status_code(), StatusCode::OK);
        assert!(calculated.json::<Value>()["total_premium"].is_object());

        let bound = bearer(app.server.post(&format!("{}/bind", base)), &token)
            .json(&bind_dates())
            .await;
        assert_eq!(bound.status_code(), StatusCode::OK);
        let bound = bound.json::<Value>();
        assert_eq!(bound["state"], "Complete");
        assert_eq!(bound["policy_number"], "P-100");
    }

    #[tokio::test]
    async fn test_bind_without_numbers_is_a_business_rule_failure() {
        let app = spawn_app().await;
        let token = app.admin_token().await;
        let quote = app.create_quote(&token).await;
        let base = format!("/api/v1/quotes/{}", id_of(&quote, "quote_id"));

        bearer(app.server.put(&format!("{}/form-data", base)), &token)
            .json(&json!({ "form_data": { "driver": { "age": 40 }, "vehicle": { "value": 30000 } } }))
            .await;
        bearer(app.server.post(&format!("{}/calculate", base)), &token).await;

        let bound = bearer(app.server.post(&format!("{}/bind", base)), &token)
            .json(&bind_dates())
            .await;
        assert_eq!(bound.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(bound.json::<Value>()["error"], "business_rule");

        let after = bearer(app.server.get(&base), &token).await;
        assert_ne!(after.json::<Value>()["state"], "Complete");
    }

    #[tokio::test]
    async fn test_form_data_must_be_an_object() {
        let app = spawn_app().await;
        let token = app.admin_token().await;
        let quote = app.create_quote(&token).await;

        let response = bearer(
            app.server.put(&format!("/api/v1/quotes/{}/form-data", id_of(&quote, "quote_id"))),
            &token,
        )
        .json(&json!({ "form_data": [1, 2, 3] }))
        .await;

        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_rollback_past_the_stream_is_rejected() {
        let app = spawn_app().await;
        let token = app.admin_token().await;
        let quote = app.create_quote(&token).await;
        let base = format!("/api/v1/quotes/{}", id_of(&quote, "quote_id"));

        let overflow = bearer(app.server.post(&format!("{}/rollback", base)), &token)
            .json(&json!({ "sequence": u64::MAX }))
            .await;
        assert_eq!(overflow.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(overflow.json::<Value>()["error"], "validation_error");

        let beyond = bearer(app.server.post(&format!("{}/rollback", base)), &token)
            .json(&json!({ "sequence": 1000 }))
            .await;
        assert!(beyond.status_code().is_client_error());

        let after = bearer(app.server.get(&base), &token).await;
        assert_eq!(after.status_code(), StatusCode::OK);
        assert_eq!(after.json::<Value>()["quote_number"], quote["quote_number"]);
    }
}

// ============================================================================
// USERS AND ORGANISATIONS
// ============================================================================

mod users_and_organisations {
    use super::*;

    async fn create_broker(app: &TestApp, token: &str, email: &str) -> Value {
        let organisation_id = app.organisation_id(token).await;
        let response = bearer(app.server.post("/api/v1/users"), token)
            .json(&json!({
                "organisation_id": organisation_id,
                "full_name": "Jane Citizen",
                "login_email": email,
                "roles": ["Agent"]
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED, "{}", response.text());
        response.json::<Value>()
    }

    #[tokio::test]
    async fn test_invited_user_activates_and_logs_in() {
        let app = spawn_app().await;
        let token = app.admin_token().await;
        let user = create_broker(&app, &token, "jane@acme.test").await;
        let user_id = id_of(&user, "user_id");

        let invitation = bearer(app.server.post(&format!("/api/v1/users/{}/invitations", user_id)), &token).await;
        assert_eq!(invitation.status_code(), StatusCode::CREATED);
        let invitation_id = id_of(&invitation.json::<Value>(), "invitation_id");

        let activated = app
            .server
            .post("/api/v1/auth/activate")
            .json(&json!({
                "tenant_id": app.tenant_id,
                "user_id": user_id,
                "invitation_id": invitation_id,
                "password": "jane-password-1"
            }))
            .await;
        assert_eq!(activated.status_code(), StatusCode::OK);
        assert_eq!(activated.json::<Value>()["activated"], true);

        let (status, _) = app.login("jane@acme.test", "jane-password-1").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_create_organisations() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let user = create_broker(&app, &admin, "agent@acme.test").await;
        let user_id = id_of(&user, "user_id");

        let invitation = bearer(app.server.post(&format!("/api/v1/users/{}/invitations", user_id)), &admin).await;
        let invitation_id = id_of(&invitation.json::<Value>(), "invitation_id");
        app.server
            .post("/api/v1/auth/activate")
            .json(&json!({
                "tenant_id": app.tenant_id,
                "user_id": user_id,
                "invitation_id": invitation_id,
                "password": "agent-password-1"
            }))
            .await;
        let (_, body) = app.login("agent@acme.test", "agent-password-1").await;
        let agent = body["access_token"].as_str().unwrap().to_string();

        let response = bearer(app.server.post("/api/v1/organisations"), &agent)
            .json(&json!({ "name": "Rogue Brokers", "alias": "rogue" }))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_blocked_user_cannot_log_in() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let user = create_broker(&app, &admin, "blocked@acme.test").await;
        let user_id = id_of(&user, "user_id");

        let invitation = bearer(app.server.post(&format!("/api/v1/users/{}/invitations", user_id)), &admin).await;
        let invitation_id = id_of(&invitation.json::<Value>(), "invitation_id");
        app.server
            .post("/api/v1/auth/activate")
            .json(&json!({
                "tenant_id": app.tenant_id,
                "user_id": user_id,
                "invitation_id": invitation_id,
                "password": "blocked-password-1"
            }))
            .await;

        let blocked = bearer(app.server.post(&format!("/api/v1/users/{}/block", user_id)), &admin).await;
        assert_eq!(blocked.json::<Value>()["blocked"], true);

        let (status, _) = app.login("blocked@acme.test", "blocked-password-1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_duplicate_alias_conflicts() {
        let app = spawn_app().await;
        let token = app.admin_token().await;

        let response = bearer(app.server.post("/api/v1/organisations"), &token)
            .json(&json!({ "name": "Another Acme", "alias": "acme" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_organisation_lifecycle() {
        let app = spawn_app().await;
        let token = app.admin_token().await;

        let created = bearer(app.server.post("/api/v1/organisations"), &token)
            .json(&json!({ "name": "Coastal Brokers", "alias": "coastal" }))
            .await;
        assert_eq!(created.status_code(), StatusCode::CREATED);
        let id = id_of(&created.json::<Value>(), "organisation_id");

        let renamed = bearer(app.server.put(&format!("/api/v1/organisations/{}/name", id)), &token)
            .json(&json!({ "name": "Coastal Insurance Brokers" }))
            .await;
        assert_eq!(renamed.json::<Value>()["name"], "Coastal Insurance Brokers");

        let disabled = bearer(app.server.post(&format!("/api/v1/organisations/{}/disable", id)), &token).await;
        assert_eq!(disabled.json::<Value>()["active"], false);

        let deleted = bearer(app.server.delete(&format!("/api/v1/organisations/{}", id)), &token).await;
        assert_eq!(deleted.json::<Value>()["deleted"], true);

        let by_alias = bearer(app.server.get("/api/v1/organisations/by-alias/coastal"), &token).await;
        assert_eq!(by_alias.status_code(), StatusCode::NOT_FOUND);
    }
}

// ============================================================================
// UPDATER JOBS
// ============================================================================

mod updater_jobs {
    use super::*;

    #[tokio::test]
    async fn test_started_job_is_accepted_and_listed() {
        let app = spawn_app().await;
        let token = app.admin_token().await;

        let started = bearer(app.server.post("/api/v1/updater-jobs"), &token)
            .json(&json!({ "data_set": "gnaf", "source_url": "file:///nonexistent/gnaf.zip" }))
            .await;
        assert_eq!(started.status_code(), StatusCode::ACCEPTED);
        let job_id = id_of(&started.json::<Value>(), "id");

        let fetched = bearer(app.server.get(&format!("/api/v1/updater-jobs/{}", job_id)), &token).await;
        assert_eq!(fetched.status_code(), StatusCode::OK);
        assert_eq!(fetched.json::<Value>()["data_set"], "gnaf");

        let listed = bearer(app.server.get("/api/v1/updater-jobs?data_set=gnaf"), &token).await;
        assert_eq!(listed.json::<Value>().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_without_configured_source_is_rejected() {
        let app = spawn_app().await;
        let token = app.admin_token().await;

        let response = bearer(app.server.post("/api/v1/updater-jobs"), &token)
            .json(&json!({ "data_set": "red_book" }))
            .await;

        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

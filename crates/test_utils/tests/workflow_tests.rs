//! Workflow Tests
//!
//! Cross-crate scenarios through the mediator: the policy lifecycle,
//! aggregate locking under concurrent commands, number pool contention,
//! tenant isolation and updater job failure.

use std::sync::Arc;
use std::time::Duration;

use tasks::join_all;
use rust_decimal::Decimal;

use app_services::quotes::{CreateAdjustmentQuote, CreateCancellationQuote, GetQuote, UpdateQuoteFormData};
use app_services::updater_jobs::{GetUpdaterJob, StartUpdaterJob};
use app_services::AppError;
use core_kernel::{DeploymentEnvironment, EventStore, TenantId, UserId};
use domain_quote::{NumberKind, QuoteState, QuoteType};
use infra_updater::{DataSetKind, UpdaterJobState};
use test_utils::*;

mod tasks {
    /// Awaits every handle, failing the test on a panicked task
    pub async fn join_all<T>(handles: Vec<tokio::task::JoinHandle<T>>) -> Vec<T> {
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.expect("task panicked"));
        }
        results
    }
}

mod policy_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_bind_adjust_and_cancel() {
        let h = TestHarnessBuilder::new().build().await;
        h.load_numbers(NumberKind::Policy, &["POL-000001"]).await;
        h.load_numbers(NumberKind::Invoice, &["INV-000001", "INV-000002"]).await;
        h.load_numbers(NumberKind::CreditNote, &["CN-000001"]).await;

        let quote = h.calculated_quote(FormFixtures::young_driver()).await;
        assert_total_premium(&quote, Decimal::from(660));

        let bound = h.bind(&quote).await.expect("bind should succeed");
        assert_quote_state(&bound, QuoteState::Complete);
        assert_eq!(bound.policy_number.as_deref(), Some("POL-000001"));

        let adjustment = h
            .mediator
            .send(CreateAdjustmentQuote { aggregate_id: quote.aggregate_id }, &h.ctx)
            .await
            .expect("adjustment should be created");
        assert_eq!(adjustment.quote_type, QuoteType::Adjustment);
        assert_eq!(adjustment.aggregate_id, quote.aggregate_id);

        // One transaction in progress per policy
        let err = h
            .mediator
            .send(CreateCancellationQuote { aggregate_id: quote.aggregate_id }, &h.ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));

        let events = h
            .event_store
            .load(h.ctx.tenant_id, "quote", *quote.aggregate_id.as_uuid())
            .await
            .unwrap();
        assert_contiguous_sequences(&events);
        assert!(events.iter().all(|e| e.tenant_id == h.ctx.tenant_id));

        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_decline_trigger_blocks_binding() {
        let h = TestHarnessBuilder::new().build().await;
        h.load_numbers(NumberKind::Policy, &["POL-000001"]).await;
        h.load_numbers(NumberKind::Invoice, &["INV-000001"]).await;

        let quote = h.calculated_quote(FormFixtures::unlicensed_driver()).await;

        assert!(h.bind(&quote).await.is_err());
        assert_eq!(h.available_numbers(NumberKind::Policy).await, 1);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let h = Arc::new(TestHarnessBuilder::new().build().await);
        let quote = h.create_quote().await;

        let handles = (0..8u32)
            .map(|i| {
                let h = Arc::clone(&h);
                let quote = quote.clone();
                tokio::spawn(async move {
                    h.mediator
                        .send(
                            UpdateQuoteFormData {
                                aggregate_id: quote.aggregate_id,
                                quote_id: quote.quote_id,
                                form_data: FormFixtures::motor(30 + i, 20_000),
                            },
                            &h.ctx,
                        )
                        .await
                })
            })
            .collect();

        for result in join_all(handles).await {
            result.expect("every update should succeed under the lock");
        }

        let events = h
            .event_store
            .load(h.ctx.tenant_id, "quote", *quote.aggregate_id.as_uuid())
            .await
            .unwrap();
        assert_contiguous_sequences(&events);

        let latest = h.mediator.send(GetQuote { quote_id: quote.quote_id }, &h.ctx).await.unwrap();
        assert_eq!(latest.version, events.len() as u64);
    }

    #[tokio::test]
    async fn test_each_policy_number_is_issued_once() {
        let h = Arc::new(TestHarnessBuilder::new().build().await);
        h.load_numbers(NumberKind::Policy, &["POL-000001", "POL-000002"]).await;
        h.load_numbers(NumberKind::Invoice, &["INV-000001", "INV-000002", "INV-000003"])
            .await;

        let mut quotes = Vec::new();
        for _ in 0..3 {
            quotes.push(h.calculated_quote(FormFixtures::standard_driver()).await);
        }

        let handles = quotes
            .into_iter()
            .map(|quote| {
                let h = Arc::clone(&h);
                tokio::spawn(async move { h.bind(&quote).await })
            })
            .collect();
        let results = join_all(handles).await;

        let mut issued: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter_map(|q| q.policy_number.clone())
            .collect();
        issued.sort();
        assert_eq!(issued, vec!["POL-000001", "POL-000002"]);

        let failures: Vec<&AppError> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], AppError::BusinessRule(_)));
    }
}

mod isolation {
    use super::*;

    #[tokio::test]
    async fn test_quotes_are_invisible_to_other_tenants() {
        let h = TestHarnessBuilder::new().build().await;
        let quote = h.create_quote().await;

        let stranger = app_services::RequestContext::new(TenantId::new(), h.ctx.environment)
            .with_user(UserId::new(), vec!["Admin".to_string()]);
        let err = h
            .mediator
            .send(GetQuote { quote_id: quote.quote_id }, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_quotes_are_invisible_to_other_environments() {
        let h = TestHarnessBuilder::new()
            .environment(DeploymentEnvironment::Staging)
            .build()
            .await;
        let quote = h.create_quote().await;

        let production = app_services::RequestContext::new(h.ctx.tenant_id, DeploymentEnvironment::Production)
            .with_user(UserId::new(), vec!["Admin".to_string()]);
        assert!(h
            .mediator
            .send(GetQuote { quote_id: quote.quote_id }, &production)
            .await
            .is_err());
    }
}

mod updater {
    use super::*;

    #[tokio::test]
    async fn test_missing_source_fails_the_job() {
        let work = tempfile::TempDir::new().unwrap();
        let missing = work.path().join("gnaf.zip");
        let h = TestHarnessBuilder::new()
            .source(DataSetKind::Gnaf, format!("file://{}", missing.display()))
            .build()
            .await;

        let job = h
            .mediator
            .send(
                StartUpdaterJob {
                    data_set: DataSetKind::Gnaf,
                    source_url: None,
                },
                &h.ctx,
            )
            .await
            .expect("job should start");

        let mut state = job.state;
        for _ in 0..100 {
            let current = h.mediator.send(GetUpdaterJob { job_id: job.id }, &h.ctx).await.unwrap();
            state = current.state;
            if state.is_terminal() {
                assert!(current.failure_reason.is_some());
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(state, UpdaterJobState::Failed);
        assert!(h.data_sets.live_job(DataSetKind::Gnaf).await.is_none());

        h.shutdown().await;
    }
}

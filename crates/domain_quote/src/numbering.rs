//! Quote references and number pools
//!
//! Quote references are generated locally. Policy, invoice and credit note
//! numbers are handed out from pools loaded per tenant, product and
//! environment, so numbering follows each insurer's own sequences.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{DeploymentEnvironment, DomainPort, HealthCheckable, PortError, ProductId, TenantId};

/// Letters and digits that cannot be confused when read aloud or handwritten
pub const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const REFERENCE_LENGTH: usize = 6;

/// Generates short human-friendly quote references
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteReferenceGenerator;

impl QuoteReferenceGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self) -> String {
        self.generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        (0..REFERENCE_LENGTH)
            .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Which number sequence to draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberKind {
    Policy,
    Invoice,
    CreditNote,
}

impl NumberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberKind::Policy => "policy",
            NumberKind::Invoice => "invoice",
            NumberKind::CreditNote => "credit_note",
        }
    }
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one pool of numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberPoolKey {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub environment: DeploymentEnvironment,
    pub kind: NumberKind,
}

impl NumberPoolKey {
    pub fn new(
        tenant_id: TenantId,
        product_id: ProductId,
        environment: DeploymentEnvironment,
        kind: NumberKind,
    ) -> Self {
        Self {
            tenant_id,
            product_id,
            environment,
            kind,
        }
    }
}

impl fmt::Display for NumberPoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} numbers for {}/{}/{}",
            self.kind, self.tenant_id, self.product_id, self.environment
        )
    }
}

/// Port for pooled document numbers
#[async_trait]
pub trait NumberPool: DomainPort + HealthCheckable {
    /// Takes the next unused number
    ///
    /// # Errors
    ///
    /// Returns `PortError::NotFound` when the pool is exhausted
    async fn consume(&self, key: NumberPoolKey) -> Result<String, PortError>;

    /// Adds numbers to a pool, skipping ones already present; returns how
    /// many were added
    async fn load(&self, key: NumberPoolKey, numbers: Vec<String>) -> Result<usize, PortError>;

    /// Count of numbers still available
    async fn available(&self, key: NumberPoolKey) -> Result<usize, PortError>;

    /// Returns a consumed number to the pool so it is handed out next
    ///
    /// Releasing a number that is unknown or already available is a no-op.
    async fn release(&self, key: NumberPoolKey, number: &str) -> Result<(), PortError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct Pool {
        available: VecDeque<String>,
        seen: HashSet<String>,
    }

    /// In-memory number pool handing numbers out in load order
    #[derive(Debug, Default)]
    pub struct InMemoryNumberPool {
        pools: RwLock<HashMap<NumberPoolKey, Pool>>,
    }

    impl InMemoryNumberPool {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for InMemoryNumberPool {}

    #[async_trait]
    impl HealthCheckable for InMemoryNumberPool {
        async fn health_check(&self) -> core_kernel::HealthCheckResult {
            core_kernel::HealthCheckResult::healthy("memory-number-pool")
        }
    }

    #[async_trait]
    impl NumberPool for InMemoryNumberPool {
        async fn consume(&self, key: NumberPoolKey) -> Result<String, PortError> {
            self.pools
                .write()
                .await
                .get_mut(&key)
                .and_then(|pool| pool.available.pop_front())
                .ok_or_else(|| PortError::not_found("number pool", key))
        }

        async fn load(&self, key: NumberPoolKey, numbers: Vec<String>) -> Result<usize, PortError> {
            let mut pools = self.pools.write().await;
            let pool = pools.entry(key).or_default();
            let mut added = 0;
            for number in numbers {
                let number = number.trim().to_string();
                if number.is_empty() || !pool.seen.insert(number.clone()) {
                    continue;
                }
                pool.available.push_back(number);
                added += 1;
            }
            Ok(added)
        }

        async fn available(&self, key: NumberPoolKey) -> Result<usize, PortError> {
            Ok(self
                .pools
                .read()
                .await
                .get(&key)
                .map_or(0, |pool| pool.available.len()))
        }

        async fn release(&self, key: NumberPoolKey, number: &str) -> Result<(), PortError> {
            let mut pools = self.pools.write().await;
            if let Some(pool) = pools.get_mut(&key) {
                if pool.seen.contains(number) && !pool.available.iter().any(|n| n == number) {
                    pool.available.push_front(number.to_string());
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::InMemoryNumberPool;
    use super::*;

    fn key(kind: NumberKind) -> NumberPoolKey {
        NumberPoolKey::new(TenantId::new(), ProductId::new(), DeploymentEnvironment::Production, kind)
    }

    #[test]
    fn test_reference_uses_unambiguous_alphabet() {
        let generator = QuoteReferenceGenerator::new();
        for _ in 0..200 {
            let reference = generator.generate();
            assert_eq!(reference.len(), REFERENCE_LENGTH);
            assert!(reference.bytes().all(|b| REFERENCE_ALPHABET.contains(&b)));
            assert!(!reference.contains('O') && !reference.contains('0') && !reference.contains('I'));
        }
    }

    #[tokio::test]
    async fn test_consume_in_load_order() {
        let pool = InMemoryNumberPool::new();
        let key = key(NumberKind::Policy);
        let added = pool
            .load(key, vec!["P-1".into(), "P-2".into(), "P-1".into()])
            .await
            .unwrap();
        assert_eq!(added, 2);

        assert_eq!(pool.consume(key).await.unwrap(), "P-1");
        assert_eq!(pool.available(key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_consumed_numbers_are_not_reloaded() {
        let pool = InMemoryNumberPool::new();
        let key = key(NumberKind::Invoice);
        pool.load(key, vec!["INV-1".into()]).await.unwrap();
        pool.consume(key).await.unwrap();

        assert_eq!(pool.load(key, vec!["INV-1".into()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_released_number_is_handed_out_next() {
        let pool = InMemoryNumberPool::new();
        let key = key(NumberKind::Policy);
        pool.load(key, vec!["P-1".into(), "P-2".into()]).await.unwrap();

        let taken = pool.consume(key).await.unwrap();
        pool.release(key, &taken).await.unwrap();
        pool.release(key, &taken).await.unwrap();
        pool.release(key, "P-99").await.unwrap();

        assert_eq!(pool.available(key).await.unwrap(), 2);
        assert_eq!(pool.consume(key).await.unwrap(), "P-1");
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_not_found() {
        let pool = InMemoryNumberPool::new();
        let err = pool.consume(key(NumberKind::CreditNote)).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

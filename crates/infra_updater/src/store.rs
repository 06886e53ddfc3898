//! Updater job persistence port

use async_trait::async_trait;

use core_kernel::{DomainPort, PortError, UpdaterJobId};

use crate::data_set::DataSetKind;
use crate::job::UpdaterJob;

#[async_trait]
pub trait UpdaterJobStore: DomainPort {
    async fn insert(&self, job: &UpdaterJob) -> Result<(), PortError>;

    /// Replaces the stored job if it is still at `job.revision`, then bumps
    /// the revision on both
    ///
    /// # Errors
    ///
    /// `Conflict` when another writer updated the job since it was read,
    /// `NotFound` if it was never inserted
    async fn update(&self, job: &mut UpdaterJob) -> Result<(), PortError>;

    async fn get(&self, id: UpdaterJobId) -> Result<Option<UpdaterJob>, PortError>;

    /// Newest first, optionally restricted to one data set
    async fn list(&self, data_set: Option<DataSetKind>) -> Result<Vec<UpdaterJob>, PortError>;

    /// Jobs that are queued or running
    async fn list_active(&self) -> Result<Vec<UpdaterJob>, PortError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    pub struct InMemoryUpdaterJobStore {
        jobs: RwLock<HashMap<UpdaterJobId, UpdaterJob>>,
    }

    impl InMemoryUpdaterJobStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for InMemoryUpdaterJobStore {}

    #[async_trait]
    impl UpdaterJobStore for InMemoryUpdaterJobStore {
        async fn insert(&self, job: &UpdaterJob) -> Result<(), PortError> {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&job.id) {
                return Err(PortError::conflict(format!("updater job {} already exists", job.id)));
            }
            jobs.insert(job.id, job.clone());
            Ok(())
        }

        async fn update(&self, job: &mut UpdaterJob) -> Result<(), PortError> {
            let mut jobs = self.jobs.write().await;
            let stored = jobs
                .get_mut(&job.id)
                .ok_or_else(|| PortError::not_found("UpdaterJob", job.id))?;
            if stored.revision != job.revision {
                return Err(PortError::conflict(format!(
                    "updater job {} is at revision {}, not {}",
                    job.id, stored.revision, job.revision
                )));
            }
            job.revision += 1;
            *stored = job.clone();
            Ok(())
        }

        async fn get(&self, id: UpdaterJobId) -> Result<Option<UpdaterJob>, PortError> {
            Ok(self.jobs.read().await.get(&id).cloned())
        }

        async fn list(&self, data_set: Option<DataSetKind>) -> Result<Vec<UpdaterJob>, PortError> {
            let mut jobs: Vec<UpdaterJob> = self
                .jobs
                .read()
                .await
                .values()
                .filter(|j| data_set.map_or(true, |d| j.data_set == d))
                .cloned()
                .collect();
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(jobs)
        }

        async fn list_active(&self) -> Result<Vec<UpdaterJob>, PortError> {
            Ok(self
                .jobs
                .read()
                .await
                .values()
                .filter(|j| j.state.is_active())
                .cloned()
                .collect())
        }
    }

    type Edit = Box<dyn FnOnce(&mut UpdaterJob) + Send>;

    /// Lets another writer change a job just before the first update lands
    pub struct InterleavedUpdaterJobStore {
        inner: Arc<InMemoryUpdaterJobStore>,
        edit: std::sync::Mutex<Option<Edit>>,
    }

    impl InterleavedUpdaterJobStore {
        pub fn new(
            inner: Arc<InMemoryUpdaterJobStore>,
            edit: impl FnOnce(&mut UpdaterJob) + Send + 'static,
        ) -> Self {
            Self {
                inner,
                edit: std::sync::Mutex::new(Some(Box::new(edit))),
            }
        }
    }

    impl DomainPort for InterleavedUpdaterJobStore {}

    #[async_trait]
    impl UpdaterJobStore for InterleavedUpdaterJobStore {
        async fn insert(&self, job: &UpdaterJob) -> Result<(), PortError> {
            self.inner.insert(job).await
        }

        async fn update(&self, job: &mut UpdaterJob) -> Result<(), PortError> {
            let edit = self.edit.lock().ok().and_then(|mut e| e.take());
            if let Some(edit) = edit {
                let mut other = self
                    .inner
                    .get(job.id)
                    .await?
                    .ok_or_else(|| PortError::not_found("UpdaterJob", job.id))?;
                edit(&mut other);
                self.inner.update(&mut other).await?;
            }
            self.inner.update(job).await
        }

        async fn get(&self, id: UpdaterJobId) -> Result<Option<UpdaterJob>, PortError> {
            self.inner.get(id).await
        }

        async fn list(&self, data_set: Option<DataSetKind>) -> Result<Vec<UpdaterJob>, PortError> {
            self.inner.list(data_set).await
        }

        async fn list_active(&self) -> Result<Vec<UpdaterJob>, PortError> {
            self.inner.list_active().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::InMemoryUpdaterJobStore;
    use super::*;

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryUpdaterJobStore::new();
        let job = UpdaterJob::new(DataSetKind::Gnaf, "file:///tmp/gnaf.zip");
        store.insert(&job).await.unwrap();

        let mut first = store.get(job.id).await.unwrap().unwrap();
        let mut second = first.clone();
        store.update(&mut first).await.unwrap();
        assert_eq!(first.revision, 1);

        second.abort_requested = true;
        assert!(store.update(&mut second).await.unwrap_err().is_conflict());
        assert_eq!(second.revision, 0);
        assert!(!store.get(job.id).await.unwrap().unwrap().abort_requested);
    }
}

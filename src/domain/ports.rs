use crate::domain::model::{
    DomainResource, EppResource, HistoryEntry, PollMessage, ResourceKey, TaskHandle,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn job_name(&self) -> &str;
    fn lease_duration(&self) -> Duration;
    fn max_lease_count(&self) -> usize;
    fn decode_failure_delay(&self) -> Duration;
    fn shard_count(&self) -> usize;
    fn reduce_concurrency(&self) -> usize;
    fn state_file(&self) -> &str;
    fn output_path(&self) -> &str;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Pull queue holding deletion work items.
///
/// A lease is advisory: once it lapses the task can be leased again by another worker.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn lease_tasks(&self, max_count: usize, lease: Duration) -> Result<Vec<TaskHandle>>;
    async fn modify_task_lease(&self, task: &TaskHandle, lease: Duration) -> Result<()>;
    async fn delete_task(&self, task: &TaskHandle) -> Result<()>;
    async fn add_task(&self, task: TaskHandle) -> Result<()>;
}

/// View of the store inside one atomic transaction.
///
/// Writes are staged and become visible to other transactions only if the
/// enclosing `transact` call commits.
pub trait Transaction: Send {
    fn now(&self) -> DateTime<Utc>;
    fn load(&self, key: &ResourceKey) -> Option<EppResource>;
    fn allocate_id(&mut self) -> u64;
    fn save_resource(&mut self, resource: EppResource);
    fn save_history_entry(&mut self, entry: HistoryEntry);
    fn save_poll_message(&mut self, message: PollMessage);
    fn mark_foreign_key_superseded(&mut self, resource: &EppResource, as_of: DateTime<Utc>);
    fn add_task(&mut self, task: TaskHandle);
    fn delete_task(&mut self, task: &TaskHandle);
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn load(&self, key: &ResourceKey) -> Result<Option<EppResource>>;
    async fn load_all_domains(&self) -> Result<Vec<DomainResource>>;

    /// Runs `work` in a new transaction. Nothing is persisted unless it returns `Ok`.
    async fn transact<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut dyn Transaction) -> Result<T> + Send;
}

/// Fire-and-forget DNS refresh requests; not part of any store transaction.
pub trait DnsQueue: Send + Sync {
    fn add_host_refresh_task(&self, host_name: &str) -> Result<()>;
}

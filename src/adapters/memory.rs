use crate::domain::model::{
    DomainResource, EppResource, ForeignKeyIndex, HistoryEntry, PollMessage, ResourceKey,
    ResourceKind, TaskHandle,
};
use crate::domain::ports::{Clock, ResourceStore, Transaction, WorkQueue};
use crate::utils::error::{DeleteError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task: TaskHandle,
    #[serde(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Serialized form of a whole registry, read and written by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub resources: Vec<EppResource>,
    #[serde(default)]
    pub tasks: Vec<QueuedTask>,
    #[serde(default)]
    pub history_entries: Vec<HistoryEntry>,
    #[serde(default)]
    pub poll_messages: Vec<PollMessage>,
    #[serde(default)]
    pub foreign_key_indexes: Vec<ForeignKeyIndex>,
    #[serde(default)]
    pub next_id: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    resources: BTreeMap<ResourceKey, EppResource>,
    tasks: BTreeMap<String, QueuedTask>,
    history_entries: Vec<HistoryEntry>,
    poll_messages: Vec<PollMessage>,
    foreign_key_indexes: BTreeMap<(ResourceKind, String), ForeignKeyIndex>,
    next_id: u64,
}

impl RegistryState {
    fn put_resource(&mut self, resource: EppResource) {
        let key = resource.key();
        let index = ForeignKeyIndex {
            kind: key.kind,
            foreign_key: resource.foreign_key().to_string(),
            resource_key: key.clone(),
            deletion_time: resource.deletion_time(),
        };
        match self
            .foreign_key_indexes
            .entry((key.kind, resource.foreign_key().to_string()))
        {
            Entry::Vacant(slot) => {
                slot.insert(index);
            }
            // 舊持有者已刪除，由新資源接手
            Entry::Occupied(mut slot)
                if slot.get().deletion_time.is_some() && slot.get().resource_key != key =>
            {
                slot.insert(index);
            }
            Entry::Occupied(_) => {}
        }
        self.resources.insert(key, resource);
    }
}

/// Registry kept in memory: resource store, async-delete pull queue and
/// foreign-key index behind one lock.
///
/// Sharing the lock is what lets a transaction delete its task atomically
/// with the resource write.
#[derive(Clone)]
pub struct InMemoryRegistry {
    state: Arc<Mutex<RegistryState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            clock,
        }
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot, clock: Arc<dyn Clock>) -> Self {
        let mut state = RegistryState {
            next_id: snapshot.next_id,
            history_entries: snapshot.history_entries,
            poll_messages: snapshot.poll_messages,
            ..Default::default()
        };
        for index in snapshot.foreign_key_indexes {
            state
                .foreign_key_indexes
                .insert((index.kind, index.foreign_key.clone()), index);
        }
        for resource in snapshot.resources {
            state.put_resource(resource);
        }
        for queued in snapshot.tasks {
            state.tasks.insert(queued.task.name.clone(), queued);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
        }
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock().await;
        RegistrySnapshot {
            resources: state.resources.values().cloned().collect(),
            tasks: state.tasks.values().cloned().collect(),
            history_entries: state.history_entries.clone(),
            poll_messages: state.poll_messages.clone(),
            foreign_key_indexes: state.foreign_key_indexes.values().cloned().collect(),
            next_id: state.next_id,
        }
    }

    /// Stores a resource outside any transaction, for seeding.
    pub async fn insert_resource(&self, resource: EppResource) {
        self.state.lock().await.put_resource(resource);
    }

    pub async fn tasks(&self) -> Vec<QueuedTask> {
        self.state.lock().await.tasks.values().cloned().collect()
    }

    pub async fn history_entries(&self) -> Vec<HistoryEntry> {
        self.state.lock().await.history_entries.clone()
    }

    pub async fn poll_messages(&self) -> Vec<PollMessage> {
        self.state.lock().await.poll_messages.clone()
    }

    pub async fn foreign_key_index(&self, kind: ResourceKind, foreign_key: &str) -> Option<ForeignKeyIndex> {
        self.state
            .lock()
            .await
            .foreign_key_indexes
            .get(&(kind, foreign_key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl WorkQueue for InMemoryRegistry {
    async fn lease_tasks(&self, max_count: usize, lease: Duration) -> Result<Vec<TaskHandle>> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut leased = Vec::new();
        for queued in state.tasks.values_mut() {
            if leased.len() >= max_count {
                break;
            }
            if queued.lease_expires_at.is_some_and(|expires| expires > now) {
                continue;
            }
            queued.lease_expires_at = Some(now + lease);
            leased.push(queued.task.clone());
        }
        tracing::debug!("Leased {} tasks until {}", leased.len(), now + lease);
        Ok(leased)
    }

    async fn modify_task_lease(&self, task: &TaskHandle, lease: Duration) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let queued = state
            .tasks
            .get_mut(&task.name)
            .ok_or_else(|| DeleteError::Queue {
                message: format!("Task {} is not in queue {}", task.name, task.queue),
            })?;
        queued.lease_expires_at = Some(now + lease);
        Ok(())
    }

    async fn delete_task(&self, task: &TaskHandle) -> Result<()> {
        if self.state.lock().await.tasks.remove(&task.name).is_none() {
            tracing::warn!("Task {} was already deleted", task.name);
        }
        Ok(())
    }

    async fn add_task(&self, task: TaskHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&task.name) {
            return Err(DeleteError::Queue {
                message: format!("Task {} already exists", task.name),
            });
        }
        state.tasks.insert(
            task.name.clone(),
            QueuedTask {
                task,
                lease_expires_at: None,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for InMemoryRegistry {
    async fn load(&self, key: &ResourceKey) -> Result<Option<EppResource>> {
        Ok(self.state.lock().await.resources.get(key).cloned())
    }

    async fn load_all_domains(&self) -> Result<Vec<DomainResource>> {
        Ok(self
            .state
            .lock()
            .await
            .resources
            .values()
            .filter_map(|resource| resource.as_domain().cloned())
            .collect())
    }

    async fn transact<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut dyn Transaction) -> Result<T> + Send,
    {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let (result, writes) = {
            let mut tx = StagedTransaction::new(&state, now);
            let result = work(&mut tx);
            (result, tx.writes)
        };
        match result {
            Ok(value) => {
                writes.apply(&mut state);
                Ok(value)
            }
            Err(e) => {
                tracing::debug!("Rolling back transaction at {}: {}", now, e);
                Err(e)
            }
        }
    }
}

#[derive(Default)]
struct StagedWrites {
    resources: BTreeMap<ResourceKey, EppResource>,
    history_entries: Vec<HistoryEntry>,
    poll_messages: Vec<PollMessage>,
    superseded: Vec<(ResourceKind, String, ResourceKey, DateTime<Utc>)>,
    added_tasks: Vec<TaskHandle>,
    deleted_tasks: Vec<String>,
    next_id: u64,
}

impl StagedWrites {
    fn apply(self, state: &mut RegistryState) {
        for (_, resource) in self.resources {
            state.put_resource(resource);
        }
        state.history_entries.extend(self.history_entries);
        state.poll_messages.extend(self.poll_messages);
        for (kind, foreign_key, resource_key, as_of) in self.superseded {
            state
                .foreign_key_indexes
                .entry((kind, foreign_key.clone()))
                .and_modify(|index| index.deletion_time = Some(as_of))
                .or_insert(ForeignKeyIndex {
                    kind,
                    foreign_key,
                    resource_key,
                    deletion_time: Some(as_of),
                });
        }
        for task in self.added_tasks {
            state.tasks.insert(
                task.name.clone(),
                QueuedTask {
                    task,
                    lease_expires_at: None,
                },
            );
        }
        for name in self.deleted_tasks {
            state.tasks.remove(&name);
        }
        state.next_id = self.next_id;
    }
}

struct StagedTransaction<'a> {
    state: &'a RegistryState,
    now: DateTime<Utc>,
    writes: StagedWrites,
}

impl<'a> StagedTransaction<'a> {
    fn new(state: &'a RegistryState, now: DateTime<Utc>) -> Self {
        Self {
            state,
            now,
            writes: StagedWrites {
                next_id: state.next_id,
                ..Default::default()
            },
        }
    }
}

impl Transaction for StagedTransaction<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn load(&self, key: &ResourceKey) -> Option<EppResource> {
        self.writes
            .resources
            .get(key)
            .or_else(|| self.state.resources.get(key))
            .cloned()
    }

    fn allocate_id(&mut self) -> u64 {
        self.writes.next_id += 1;
        self.writes.next_id
    }

    fn save_resource(&mut self, mut resource: EppResource) {
        resource.set_last_update_time(self.now);
        self.writes.resources.insert(resource.key(), resource);
    }

    fn save_history_entry(&mut self, entry: HistoryEntry) {
        self.writes.history_entries.push(entry);
    }

    fn save_poll_message(&mut self, message: PollMessage) {
        self.writes.poll_messages.push(message);
    }

    fn mark_foreign_key_superseded(&mut self, resource: &EppResource, as_of: DateTime<Utc>) {
        self.writes.superseded.push((
            resource.kind(),
            resource.foreign_key().to_string(),
            resource.key(),
            as_of,
        ));
    }

    fn add_task(&mut self, task: TaskHandle) {
        self.writes.added_tasks.push(task);
    }

    fn delete_task(&mut self, task: &TaskHandle) {
        self.writes.deleted_tasks.push(task.name.clone());
    }
}

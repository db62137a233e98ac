use crate::core::mapper::DeleteContactsAndHostsMapper;
use crate::core::mapreduce::{JobReport, MapReduceRunner, ShardInput};
use crate::core::reducer::DeleteEppResourceReducer;
use crate::domain::model::{DeletionOutcome, DeletionRequest, DomainResource};
use crate::domain::ports::{Clock, ConfigProvider, DnsQueue, ResourceStore, WorkQueue};
use crate::utils::error::Result;
use crate::utils::monitor::RunMonitor;
use chrono::Duration;
use std::sync::Arc;

pub const DEFAULT_JOB_NAME: &str = "Check for EPP resource references and then delete";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub job_name: String,
    pub lease_duration: Duration,
    pub max_lease_count: usize,
    pub decode_failure_delay: Duration,
    pub shard_count: usize,
    pub reduce_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
            lease_duration: Duration::minutes(20),
            max_lease_count: 1000,
            decode_failure_delay: Duration::days(1),
            shard_count: 4,
            reduce_concurrency: 8,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self {
            job_name: config.job_name().to_string(),
            lease_duration: config.lease_duration(),
            max_lease_count: config.max_lease_count(),
            decode_failure_delay: config.decode_failure_delay(),
            shard_count: config.shard_count().max(1),
            reduce_concurrency: config.reduce_concurrency().max(1),
        }
    }
}

/// Trigger for one asynchronous deletion pass.
///
/// Leases pending work items, decodes them, and runs the reference scan and
/// decision as one batch job over the whole domain corpus.
pub struct DeletionEngine<Q, S, D> {
    queue: Arc<Q>,
    store: Arc<S>,
    dns_queue: Arc<D>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    monitor: Option<RunMonitor>,
}

impl<Q, S, D> DeletionEngine<Q, S, D>
where
    Q: WorkQueue,
    S: ResourceStore + 'static,
    D: DnsQueue + 'static,
{
    pub fn new(
        queue: Arc<Q>,
        store: Arc<S>,
        dns_queue: Arc<D>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            queue,
            store,
            dns_queue,
            clock,
            settings,
            monitor: None,
        }
    }

    pub fn new_with_monitoring(
        queue: Arc<Q>,
        store: Arc<S>,
        dns_queue: Arc<D>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
        monitor_enabled: bool,
    ) -> Self {
        let mut engine = Self::new(queue, store, dns_queue, clock, settings);
        if monitor_enabled {
            engine.monitor = Some(RunMonitor::new(true));
        }
        engine
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs one pass. Returns `None` when no leased task decoded into a request.
    pub async fn run(&self) -> Result<Option<JobReport<DeletionOutcome>>> {
        let tasks = self
            .queue
            .lease_tasks(self.settings.max_lease_count, self.settings.lease_duration)
            .await?;
        if tasks.is_empty() {
            tracing::info!("No asynchronous deletion tasks to process");
            return Ok(None);
        }
        self.log_stats("Leased tasks");

        let now = self.clock.now();
        let mut requests = Vec::with_capacity(tasks.len());
        for task in &tasks {
            match DeletionRequest::from_task(task, self.store.as_ref(), now).await {
                Ok(request) => requests.push(request),
                Err(e) => {
                    tracing::error!(
                        "Could not parse async deletion request, delaying task for a day: {}",
                        e
                    );
                    // 解析失敗的任務延後一天再試
                    if let Err(e) = self
                        .queue
                        .modify_task_lease(task, self.settings.decode_failure_delay)
                        .await
                    {
                        tracing::warn!("Could not extend lease of task {}: {}", task.name, e);
                    }
                }
            }
        }
        if requests.is_empty() {
            tracing::info!("No asynchronous deletions to process because all were already handled.");
            return Ok(None);
        }
        tracing::info!(
            "Processing asynchronous deletion of {} contacts and hosts.",
            requests.len()
        );

        let report = self.start_job(requests).await.map_err(|e| {
            tracing::error!("Error while kicking off async deletion job: {}", e);
            e
        })?;

        for (name, value) in &report.counters {
            tracing::info!("🔢 {}: {}", name, value);
        }
        self.log_stats("Deletion job completed");
        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }
        Ok(Some(report))
    }

    async fn start_job(
        &self,
        requests: Vec<DeletionRequest>,
    ) -> Result<JobReport<DeletionOutcome>> {
        let domains = self.store.load_all_domains().await?;
        let inputs = shard_inputs(domains, self.settings.shard_count);

        let mapper = Arc::new(DeleteContactsAndHostsMapper::new(requests));
        let reducer = Arc::new(DeleteEppResourceReducer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.dns_queue),
        ));
        MapReduceRunner::new(self.settings.job_name.clone())
            .with_reduce_concurrency(self.settings.reduce_concurrency)
            .run(mapper, reducer, inputs)
            .await
    }

    fn log_stats(&self, phase: &str) {
        if let Some(monitor) = &self.monitor {
            monitor.log_stats(phase);
        }
    }
}

/// The synthetic empty unit first, then the corpus split into at most `shard_count` shards.
pub fn shard_inputs(
    domains: Vec<DomainResource>,
    shard_count: usize,
) -> Vec<ShardInput<DomainResource>> {
    let mut inputs = vec![ShardInput::Null];
    if domains.is_empty() {
        return inputs;
    }
    let chunk_size = domains.len().div_ceil(shard_count.max(1));
    let mut domains = domains.into_iter().peekable();
    while domains.peek().is_some() {
        inputs.push(ShardInput::Entities(domains.by_ref().take(chunk_size).collect()));
    }
    inputs
}

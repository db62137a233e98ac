use crate::core::counters::Counters;
use crate::utils::error::{DeleteError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One shard of map input.
#[derive(Debug, Clone)]
pub enum ShardInput<I> {
    /// Synthetic empty unit, mapped exactly once with `None`.
    Null,
    Entities(Vec<I>),
}

/// Collects what one shard emits.
pub struct MapContext<K, V> {
    emitted: Vec<(K, V)>,
    counters: Counters,
}

impl<K, V> MapContext<K, V> {
    pub fn new(counters: Counters) -> Self {
        Self {
            emitted: Vec::new(),
            counters,
        }
    }

    pub fn emit(&mut self, key: K, value: V) {
        self.emitted.push((key, value));
    }

    pub fn increment_counter(&self, name: impl Into<String>) {
        self.counters.increment(name);
    }

    pub fn into_emitted(self) -> Vec<(K, V)> {
        self.emitted
    }
}

pub trait Mapper: Send + Sync + 'static {
    type Input: Send + Sync + 'static;
    type Key: Eq + Hash + Clone + Send + 'static;
    type Value: Send + 'static;

    fn map(
        &self,
        input: Option<&Self::Input>,
        ctx: &mut MapContext<Self::Key, Self::Value>,
    ) -> Result<()>;
}

/// Every value emitted for one key.
pub struct ReducerInput<V> {
    values: std::vec::IntoIter<V>,
}

impl<V> ReducerInput<V> {
    pub fn new(values: Vec<V>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl<V> Iterator for ReducerInput<V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        self.values.next()
    }
}

#[async_trait]
pub trait Reducer: Send + Sync + 'static {
    type Key: Send + 'static;
    type Value: Send + 'static;
    type Output: Send + 'static;

    async fn reduce(
        &self,
        key: Self::Key,
        values: ReducerInput<Self::Value>,
        counters: &Counters,
    ) -> Result<Self::Output>;
}

#[derive(Debug, Clone)]
pub struct JobReport<O> {
    pub job_id: String,
    pub outputs: Vec<O>,
    pub reduce_failures: usize,
    pub counters: BTreeMap<String, u64>,
}

/// In-process batch engine.
///
/// Shards are mapped concurrently on tokio tasks. The reducer then runs
/// exactly once for every key that received at least one value, with at most
/// `reduce_concurrency` reducers in flight. A failed reduce is logged and
/// counted; it does not fail the job.
pub struct MapReduceRunner {
    job_name: String,
    reduce_concurrency: usize,
    counters: Counters,
}

impl MapReduceRunner {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            reduce_concurrency: 8,
            counters: Counters::new(),
        }
    }

    pub fn with_reduce_concurrency(mut self, reduce_concurrency: usize) -> Self {
        self.reduce_concurrency = reduce_concurrency.max(1);
        self
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub async fn run<M, R>(
        &self,
        mapper: Arc<M>,
        reducer: Arc<R>,
        inputs: Vec<ShardInput<M::Input>>,
    ) -> Result<JobReport<R::Output>>
    where
        M: Mapper,
        R: Reducer<Key = M::Key, Value = M::Value>,
    {
        let job_id = self.next_job_id();
        tracing::info!("Starting job {} over {} shards", job_id, inputs.len());

        let grouped = self.run_map_phase(mapper, inputs).await?;
        tracing::debug!("Map phase of {} emitted {} distinct keys", job_id, grouped.len());

        let (outputs, reduce_failures) = self.run_reduce_phase(reducer, grouped).await;
        tracing::info!(
            "Finished job {} ({} reduced, {} failed)",
            job_id,
            outputs.len(),
            reduce_failures
        );

        Ok(JobReport {
            job_id,
            outputs,
            reduce_failures,
            counters: self.counters.snapshot(),
        })
    }

    fn next_job_id(&self) -> String {
        let slug = self
            .job_name
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        format!("{}-{}", slug, Utc::now().format("%Y%m%dT%H%M%S%3fZ"))
    }

    async fn run_map_phase<M: Mapper>(
        &self,
        mapper: Arc<M>,
        inputs: Vec<ShardInput<M::Input>>,
    ) -> Result<Vec<(M::Key, Vec<M::Value>)>> {
        let mut shards = JoinSet::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let mapper = Arc::clone(&mapper);
            let counters = self.counters.clone();
            shards.spawn(async move {
                let mut ctx = MapContext::new(counters);
                match &input {
                    ShardInput::Null => mapper.map(None, &mut ctx)?,
                    ShardInput::Entities(units) => {
                        for unit in units {
                            mapper.map(Some(unit), &mut ctx)?;
                        }
                    }
                }
                Ok::<_, DeleteError>((index, ctx.into_emitted()))
            });
        }

        let mut shard_outputs = Vec::new();
        while let Some(joined) = shards.join_next().await {
            let (index, emitted) = joined
                .map_err(|e| DeleteError::internal(format!("Map shard panicked: {}", e)))??;
            shard_outputs.push((index, emitted));
        }
        // 依分片順序合併，讓輸出順序可預期
        shard_outputs.sort_by_key(|(index, _)| *index);

        let mut order = Vec::new();
        let mut groups: HashMap<M::Key, Vec<M::Value>> = HashMap::new();
        for (_, emitted) in shard_outputs {
            for (key, value) in emitted {
                match groups.get_mut(&key) {
                    Some(values) => values.push(value),
                    None => {
                        order.push(key.clone());
                        groups.insert(key, vec![value]);
                    }
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|key| groups.remove(&key).map(|values| (key, values)))
            .collect())
    }

    async fn run_reduce_phase<R: Reducer>(
        &self,
        reducer: Arc<R>,
        grouped: Vec<(R::Key, Vec<R::Value>)>,
    ) -> (Vec<R::Output>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.reduce_concurrency));
        let mut reducers = JoinSet::new();
        for (key, values) in grouped {
            let reducer = Arc::clone(&reducer);
            let counters = self.counters.clone();
            let semaphore = Arc::clone(&semaphore);
            reducers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| DeleteError::internal(e.to_string()))?;
                reducer
                    .reduce(key, ReducerInput::new(values), &counters)
                    .await
            });
        }

        let mut outputs = Vec::new();
        let mut failures = 0;
        while let Some(joined) = reducers.join_next().await {
            match joined {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(e)) => {
                    failures += 1;
                    self.counters.increment("reduce failures");
                    tracing::error!("Reduce failed, leaving its task for retry: {}", e);
                }
                Err(e) => {
                    failures += 1;
                    self.counters.increment("reduce failures");
                    tracing::error!("Reducer task panicked: {}", e);
                }
            }
        }
        (outputs, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ParityMapper;

    impl Mapper for ParityMapper {
        type Input = u32;
        type Key = &'static str;
        type Value = u32;

        fn map(&self, input: Option<&u32>, ctx: &mut MapContext<&'static str, u32>) -> Result<()> {
            match input {
                None => {
                    ctx.emit("even", 0);
                    ctx.emit("odd", 0);
                }
                Some(n) if n % 2 == 0 => ctx.emit("even", *n),
                Some(n) => ctx.emit("odd", *n),
            }
            ctx.increment_counter("units mapped");
            Ok(())
        }
    }

    struct SumReducer;

    #[async_trait]
    impl Reducer for SumReducer {
        type Key = &'static str;
        type Value = u32;
        type Output = (&'static str, u32, usize);

        async fn reduce(
            &self,
            key: &'static str,
            values: ReducerInput<u32>,
            counters: &Counters,
        ) -> Result<Self::Output> {
            counters.increment("keys reduced");
            let values: Vec<u32> = values.collect();
            if key == "fail" {
                return Err(DeleteError::internal("boom"));
            }
            Ok((key, values.iter().sum(), values.len()))
        }
    }

    #[tokio::test]
    async fn test_reduces_once_per_key_across_shards() {
        let runner = MapReduceRunner::new("Parity Sum").with_reduce_concurrency(2);
        let report = runner
            .run(
                Arc::new(ParityMapper),
                Arc::new(SumReducer),
                vec![
                    ShardInput::Null,
                    ShardInput::Entities(vec![1, 2, 3]),
                    ShardInput::Entities(vec![4, 5]),
                ],
            )
            .await
            .unwrap();

        assert!(report.job_id.starts_with("parity-sum-"));
        assert_eq!(report.reduce_failures, 0);
        let mut outputs = report.outputs;
        outputs.sort();
        assert_eq!(outputs, vec![("even", 6, 3), ("odd", 9, 4)]);
        assert_eq!(report.counters["keys reduced"], 2);
        assert_eq!(report.counters["units mapped"], 6);
    }

    #[tokio::test]
    async fn test_null_shard_alone_still_reaches_reducer() {
        let runner = MapReduceRunner::new("parity");
        let report = runner
            .run(
                Arc::new(ParityMapper),
                Arc::new(SumReducer),
                vec![ShardInput::Null, ShardInput::Entities(vec![])],
            )
            .await
            .unwrap();

        assert_eq!(report.outputs.len(), 2);
    }

    struct FailingKeyMapper;

    impl Mapper for FailingKeyMapper {
        type Input = u32;
        type Key = &'static str;
        type Value = u32;

        fn map(&self, _input: Option<&u32>, ctx: &mut MapContext<&'static str, u32>) -> Result<()> {
            ctx.emit("fail", 1);
            ctx.emit("ok", 1);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reduce_failures_are_counted_not_fatal() {
        let runner = MapReduceRunner::new("failing");
        let report = runner
            .run(
                Arc::new(FailingKeyMapper),
                Arc::new(SumReducer),
                vec![ShardInput::Null],
            )
            .await
            .unwrap();

        assert_eq!(report.reduce_failures, 1);
        assert_eq!(report.outputs, vec![("ok", 1, 1)]);
        assert_eq!(report.counters["reduce failures"], 1);
    }
}

pub mod counters;
pub mod decoder;
pub mod engine;
pub mod enqueuer;
pub mod mapper;
pub mod mapreduce;
pub mod reducer;
pub mod side_effects;

pub use crate::domain::ports::{ConfigProvider, ResourceStore, Storage, WorkQueue};
pub use crate::utils::error::Result;
pub use counters::Counters;
pub use engine::{DeletionEngine, EngineSettings};
pub use enqueuer::enqueue_deletion;
pub use mapper::DeleteContactsAndHostsMapper;
pub use mapreduce::{JobReport, MapReduceRunner, ShardInput};
pub use reducer::DeleteEppResourceReducer;

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::{InMemoryRegistry, LocalStorage, LoggingDnsQueue, SystemClock};
pub use crate::core::{enqueue_deletion, DeletionEngine, EngineSettings};
pub use utils::error::{DeleteError, Result};

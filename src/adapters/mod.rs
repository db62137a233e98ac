// Adapters layer: concrete implementations of the domain ports.

pub mod clock;
pub mod dns;
pub mod memory;
pub mod report;
pub mod storage;

pub use clock::{FakeClock, SystemClock};
pub use dns::LoggingDnsQueue;
pub use memory::{InMemoryRegistry, QueuedTask, RegistrySnapshot};
pub use report::{load_snapshot, persist_run, render_report_csv, save_snapshot};
pub use storage::LocalStorage;

use crate::domain::ports::DnsQueue;
use crate::utils::error::Result;
use std::sync::Mutex;

/// DNS queue that records refresh requests and logs them.
#[derive(Debug, Default)]
pub struct LoggingDnsQueue {
    refreshed: Mutex<Vec<String>>,
}

impl LoggingDnsQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refreshed_hosts(&self) -> Vec<String> {
        self.refreshed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DnsQueue for LoggingDnsQueue {
    fn add_host_refresh_task(&self, host_name: &str) -> Result<()> {
        tracing::info!("Enqueued DNS refresh for host {}", host_name);
        self.refreshed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(host_name.to_string());
        Ok(())
    }
}

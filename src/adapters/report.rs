use crate::adapters::memory::RegistrySnapshot;
use crate::domain::model::DeletionOutcome;
use crate::domain::ports::Storage;
use crate::utils::error::{DeleteError, Result};
use serde::Serialize;

pub const SNAPSHOT_FILE: &str = "registry.json";
pub const REPORT_FILE: &str = "deletion_report.csv";

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    resource_key: String,
    requesting_client_id: &'a str,
    task_name: &'a str,
    result: &'static str,
    poll_message_text: &'a str,
}

/// One CSV row per decided request, sorted by resource key.
pub fn render_report_csv(outcomes: &[DeletionOutcome]) -> Result<String> {
    let mut sorted: Vec<&DeletionOutcome> = outcomes.iter().collect();
    sorted.sort_by(|a, b| a.resource_key.cmp(&b.resource_key));

    let mut writer = csv::Writer::from_writer(Vec::new());
    for outcome in sorted {
        writer.serialize(ReportRow {
            resource_key: outcome.resource_key.to_string(),
            requesting_client_id: &outcome.requesting_client_id,
            task_name: &outcome.task_name,
            result: outcome.result.result_type.as_str(),
            poll_message_text: &outcome.result.poll_message_text,
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| DeleteError::internal(format!("Could not flush CSV report: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| DeleteError::internal(format!("CSV report is not UTF-8: {}", e)))
}

pub async fn load_snapshot<S: Storage>(storage: &S, path: &str) -> Result<RegistrySnapshot> {
    let data = storage.read_file(path).await?;
    Ok(serde_json::from_slice(&data)?)
}

pub async fn save_snapshot<S: Storage>(
    storage: &S,
    path: &str,
    snapshot: &RegistrySnapshot,
) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    storage.write_file(path, &json).await
}

/// Writes the registry snapshot and the run report under `storage`.
pub async fn persist_run<S: Storage>(
    storage: &S,
    snapshot: &RegistrySnapshot,
    outcomes: &[DeletionOutcome],
) -> Result<()> {
    save_snapshot(storage, SNAPSHOT_FILE, snapshot).await?;

    let report = render_report_csv(outcomes)?;
    storage.write_file(REPORT_FILE, report.as_bytes()).await?;
    tracing::info!(
        "Wrote {} and {} ({} rows)",
        SNAPSHOT_FILE,
        REPORT_FILE,
        outcomes.len()
    );
    Ok(())
}

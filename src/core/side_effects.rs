use crate::domain::model::{
    ContactResource, EppResource, HistoryEntry, HostResource, PollMessage, StatusValue,
    TransferStatus,
};
use crate::domain::ports::{DnsQueue, Transaction};
use crate::utils::error::{DeleteError, Result};
use chrono::{DateTime, Utc};

/// Kind-specific work that accompanies a successful delete, staged in `tx`.
pub fn perform_delete_tasks(
    tx: &mut dyn Transaction,
    existing: &EppResource,
    deletion_time: DateTime<Utc>,
    history_entry: &HistoryEntry,
    dns_queue: &dyn DnsQueue,
) -> Result<()> {
    match existing {
        EppResource::Contact(contact) => {
            handle_pending_transfer_on_delete(tx, contact, deletion_time, history_entry);
            Ok(())
        }
        EppResource::Host(host) => unlink_from_superordinate_domain(tx, host, dns_queue),
        EppResource::Domain(_) => Err(DeleteError::UnsupportedResourceKind {
            kind: existing.kind().to_string(),
        }),
    }
}

/// Tells the gaining registrar that its pending transfer died with the contact.
fn handle_pending_transfer_on_delete(
    tx: &mut dyn Transaction,
    contact: &ContactResource,
    now: DateTime<Utc>,
    history_entry: &HistoryEntry,
) {
    if !contact.status_values.contains(&StatusValue::PendingTransfer) {
        return;
    }
    let Some(transfer_data) = &contact.transfer_data else {
        return;
    };
    let id = tx.allocate_id();
    tx.save_poll_message(PollMessage {
        id,
        client_id: transfer_data.gaining_client_id.clone(),
        parent_history_entry: history_entry.id,
        event_time: now,
        message: TransferStatus::ServerCancelled.message().to_string(),
    });
}

fn unlink_from_superordinate_domain(
    tx: &mut dyn Transaction,
    host: &HostResource,
    dns_queue: &dyn DnsQueue,
) -> Result<()> {
    let Some(domain_key) = &host.superordinate_domain else {
        return Ok(());
    };

    // 盡力而為，失敗不影響交易
    if let Err(e) = dns_queue.add_host_refresh_task(&host.host_name) {
        tracing::warn!("Could not enqueue DNS refresh for {}: {}", host.host_name, e);
    }

    let mut domain = match tx.load(domain_key) {
        Some(EppResource::Domain(domain)) => domain,
        Some(other) => {
            return Err(DeleteError::internal(format!(
                "Superordinate domain key {} of host {} resolves to a {}",
                domain_key,
                host.host_name,
                other.kind()
            )))
        }
        None => {
            return Err(DeleteError::ResourceNotFound {
                key: domain_key.to_string(),
            })
        }
    };
    domain.subordinate_hosts.remove(&host.host_name);
    tx.save_resource(EppResource::Domain(domain));
    Ok(())
}

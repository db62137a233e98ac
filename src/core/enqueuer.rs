use crate::core::decoder::{
    PARAM_IS_SUPERUSER, PARAM_REQUESTING_CLIENT_ID, PARAM_RESOURCE_KEY, QUEUE_ASYNC_DELETE,
};
use crate::domain::lifecycle::project_at;
use crate::domain::model::{EppResource, HistoryEntry, ResourceKey, StatusValue, TaskHandle};
use crate::domain::ports::{ResourceStore, Transaction};
use crate::utils::error::{DeleteError, Result};
use std::collections::BTreeMap;

/// Marks a contact or host PENDING_DELETE and queues its async deletion.
///
/// Both writes are staged in one transaction, so a resource is never left
/// pending without a work item.
pub async fn enqueue_deletion<S: ResourceStore>(
    store: &S,
    key: &ResourceKey,
    requesting_client_id: &str,
    is_superuser: bool,
) -> Result<TaskHandle> {
    let key = key.clone();
    let client_id = requesting_client_id.to_string();
    let task = store
        .transact(move |tx| mark_pending_delete(tx, &key, &client_id, is_superuser))
        .await?;
    tracing::info!(
        "Enqueued async deletion task {} for {}",
        task.name,
        task.param(PARAM_RESOURCE_KEY).unwrap_or_default()
    );
    Ok(task)
}

fn mark_pending_delete(
    tx: &mut dyn Transaction,
    key: &ResourceKey,
    client_id: &str,
    is_superuser: bool,
) -> Result<TaskHandle> {
    let now = tx.now();
    if !key.kind.is_async_deletable() {
        return Err(DeleteError::UnsupportedResourceKind {
            kind: key.kind.to_string(),
        });
    }
    let stored = tx.load(key).ok_or_else(|| DeleteError::ResourceNotFound {
        key: key.to_string(),
    })?;
    let superordinate_domain = match &stored {
        EppResource::Host(host) => host
            .superordinate_domain
            .as_ref()
            .and_then(|domain_key| tx.load(domain_key))
            .and_then(|domain| domain.as_domain().cloned()),
        _ => None,
    };
    let mut resource = project_at(stored, now, superordinate_domain.as_ref());

    let precondition = |reason: &str| DeleteError::Precondition {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if resource.is_deleted_at(now) {
        return Err(precondition("resource is already deleted"));
    }
    let status = resource.status_values();
    if status.contains(&StatusValue::PendingDelete) {
        return Err(precondition("resource is already pending delete"));
    }
    if status.contains(&StatusValue::ClientDeleteProhibited)
        || status.contains(&StatusValue::ServerDeleteProhibited)
    {
        return Err(precondition("resource has a delete prohibited status"));
    }
    if !is_superuser && resource.current_sponsor_client_id() != client_id {
        return Err(precondition("requesting client is not the sponsoring registrar"));
    }

    resource.status_values_mut().insert(StatusValue::PendingDelete);
    tx.save_resource(resource);

    let history_id = tx.allocate_id();
    tx.save_history_entry(HistoryEntry {
        id: history_id,
        parent: key.clone(),
        entry_type: key.kind.pending_delete_history_type()?,
        client_id: client_id.to_string(),
        modification_time: now,
    });

    let params = BTreeMap::from([
        (PARAM_RESOURCE_KEY.to_string(), key.to_string()),
        (PARAM_REQUESTING_CLIENT_ID.to_string(), client_id.to_string()),
        (PARAM_IS_SUPERUSER.to_string(), is_superuser.to_string()),
    ]);
    let task = TaskHandle {
        name: format!("delete-{}-{}", key.repo_id, history_id),
        queue: QUEUE_ASYNC_DELETE.to_string(),
        params,
    };
    tx.add_task(task.clone());
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::FakeClock;
    use crate::adapters::memory::InMemoryRegistry;
    use crate::domain::model::{ContactResource, HistoryEntryType, HostResource};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap()
    }

    fn contact(status: &[StatusValue]) -> EppResource {
        EppResource::Contact(ContactResource {
            repo_id: "C9-ROID".to_string(),
            contact_id: "sh8013".to_string(),
            current_sponsor_client_id: "RegistrarA".to_string(),
            status_values: status.iter().copied().collect(),
            creation_time: t0() - Duration::days(3),
            last_update_time: t0() - Duration::days(3),
            ..Default::default()
        })
    }

    async fn registry_with(resource: EppResource) -> (Arc<FakeClock>, InMemoryRegistry) {
        let clock = Arc::new(FakeClock::new(t0()));
        let registry = InMemoryRegistry::new(clock.clone());
        registry.insert_resource(resource).await;
        (clock, registry)
    }

    #[tokio::test]
    async fn test_enqueue_marks_pending_and_adds_task() {
        let (_clock, registry) = registry_with(contact(&[StatusValue::Ok])).await;

        let task = enqueue_deletion(&registry, &ResourceKey::contact("C9-ROID"), "RegistrarA", false)
            .await
            .unwrap();

        assert_eq!(task.queue, QUEUE_ASYNC_DELETE);
        assert_eq!(task.param(PARAM_RESOURCE_KEY), Some("contact/C9-ROID"));
        assert_eq!(task.param(PARAM_REQUESTING_CLIENT_ID), Some("RegistrarA"));
        assert_eq!(task.param(PARAM_IS_SUPERUSER), Some("false"));

        let stored = registry
            .load(&ResourceKey::contact("C9-ROID"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.status_values().contains(&StatusValue::PendingDelete));
        assert_eq!(stored.last_update_time(), t0());

        let queued = registry.tasks().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].task, task);
        assert_eq!(
            registry.history_entries().await[0].entry_type,
            HistoryEntryType::ContactPendingDelete
        );
    }

    #[tokio::test]
    async fn test_rejects_already_pending_delete() {
        let (_clock, registry) = registry_with(contact(&[StatusValue::PendingDelete])).await;

        let err = enqueue_deletion(&registry, &ResourceKey::contact("C9-ROID"), "RegistrarA", false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeleteError::Precondition { .. }));
        assert!(registry.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_sponsor_unless_superuser() {
        let (_clock, registry) = registry_with(contact(&[])).await;
        let key = ResourceKey::contact("C9-ROID");

        let err = enqueue_deletion(&registry, &key, "RegistrarB", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sponsoring registrar"));

        let task = enqueue_deletion(&registry, &key, "RegistrarB", true)
            .await
            .unwrap();
        assert_eq!(task.param(PARAM_IS_SUPERUSER), Some("true"));
    }

    #[tokio::test]
    async fn test_rejects_delete_prohibited() {
        let (_clock, registry) =
            registry_with(contact(&[StatusValue::ClientDeleteProhibited])).await;

        let err = enqueue_deletion(&registry, &ResourceKey::contact("C9-ROID"), "RegistrarA", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("delete prohibited"));
    }

    #[tokio::test]
    async fn test_rejects_domains_and_missing_resources() {
        let (_clock, registry) = registry_with(EppResource::Host(HostResource {
            repo_id: "H9-ROID".to_string(),
            host_name: "ns9.example.tld".to_string(),
            current_sponsor_client_id: "RegistrarA".to_string(),
            creation_time: t0() - Duration::days(1),
            ..Default::default()
        }))
        .await;

        let err = enqueue_deletion(&registry, &ResourceKey::domain("D9-ROID"), "RegistrarA", false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeleteError::UnsupportedResourceKind { .. }));

        let err = enqueue_deletion(&registry, &ResourceKey::host("H404-ROID"), "RegistrarA", false)
            .await
            .unwrap_err();
        assert!(matches!(err, DeleteError::ResourceNotFound { .. }));

        assert!(
            enqueue_deletion(&registry, &ResourceKey::host("H9-ROID"), "RegistrarA", false)
                .await
                .is_ok()
        );
    }
}

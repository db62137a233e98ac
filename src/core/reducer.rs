use crate::core::counters::Counters;
use crate::core::mapreduce::{Reducer, ReducerInput};
use crate::core::side_effects::perform_delete_tasks;
use crate::domain::lifecycle::{
    check_resource_state_allows_deletion, clear_pending_delete, project_at, tombstone,
    LifecycleState,
};
use crate::domain::model::{
    DeletionOutcome, DeletionRequest, DeletionResult, EppResource, HistoryEntry, PollMessage,
};
use crate::domain::ports::{DnsQueue, ResourceStore, Transaction};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Reduce phase: decides one deletion request once every domain has been scanned.
pub struct DeleteEppResourceReducer<S, D> {
    store: Arc<S>,
    dns_queue: Arc<D>,
}

impl<S, D> DeleteEppResourceReducer<S, D>
where
    S: ResourceStore,
    D: DnsQueue,
{
    pub fn new(store: Arc<S>, dns_queue: Arc<D>) -> Self {
        Self { store, dns_queue }
    }
}

#[async_trait]
impl<S, D> Reducer for DeleteEppResourceReducer<S, D>
where
    S: ResourceStore + 'static,
    D: DnsQueue + 'static,
{
    type Key = DeletionRequest;
    type Value = bool;
    type Output = DeletionOutcome;

    async fn reduce(
        &self,
        request: DeletionRequest,
        values: ReducerInput<bool>,
        counters: &Counters,
    ) -> Result<DeletionOutcome> {
        tracing::info!("Processing async deletion request for {}", request.key);
        // 全部讀完，不提前結束
        let has_no_active_references = !values.fold(false, |found, linked| found || linked);

        let dns_queue = Arc::clone(&self.dns_queue);
        let tx_request = request.clone();
        let result = self
            .store
            .transact(move |tx| {
                let result = attempt_to_delete_resource(
                    tx,
                    &tx_request,
                    has_no_active_references,
                    dns_queue.as_ref(),
                )?;
                tx.delete_task(&tx_request.task);
                Ok(result)
            })
            .await?;

        counters.increment(
            result
                .result_type
                .render_counter_text(request.key.kind.plural()),
        );
        tracing::info!(
            "Result of async deletion for resource {}: {}",
            request.key,
            result.poll_message_text
        );

        Ok(DeletionOutcome {
            resource_key: request.key,
            requesting_client_id: request.requesting_client_id,
            task_name: request.task.name,
            result,
        })
    }
}

fn attempt_to_delete_resource(
    tx: &mut dyn Transaction,
    request: &DeletionRequest,
    has_no_active_references: bool,
    dns_queue: &dyn DnsQueue,
) -> Result<DeletionResult> {
    let now = tx.now();
    let Some(stored) = tx.load(&request.key) else {
        tracing::error!(
            "Cannot perform async deletion operation on {}: resource does not exist",
            request.key
        );
        return Ok(DeletionResult::errored());
    };
    let superordinate_domain = match &stored {
        EppResource::Host(host) => host
            .superordinate_domain
            .as_ref()
            .and_then(|key| tx.load(key))
            .and_then(|domain| domain.as_domain().cloned()),
        _ => None,
    };
    let resource = project_at(stored, now, superordinate_domain.as_ref());

    if let Err(e) = check_resource_state_allows_deletion(&resource, now) {
        tracing::error!(
            "Cannot perform async deletion operation on {} for client {}: {}",
            request.key,
            request.requesting_client_id,
            e
        );
        return Ok(DeletionResult::errored());
    }

    let requested_by_current_owner =
        resource.current_sponsor_client_id() == request.requesting_client_id;
    let delete_allowed =
        has_no_active_references && (requested_by_current_owner || request.is_superuser);

    let kind = resource.kind();
    let (delete_type, failure_type) = kind.history_type_pair()?;
    let poll_message_text = if delete_allowed {
        format!("Deleted {} {}.", kind, resource.foreign_key())
    } else if requested_by_current_owner {
        format!(
            "Can't delete {} {} because it is referenced by a domain.",
            kind,
            resource.foreign_key()
        )
    } else {
        format!(
            "Can't delete {} {} because it was transferred prior to deletion.",
            kind,
            resource.foreign_key()
        )
    };

    let history_entry = HistoryEntry {
        id: tx.allocate_id(),
        parent: request.key.clone(),
        entry_type: if delete_allowed { delete_type } else { failure_type },
        client_id: request.requesting_client_id.clone(),
        modification_time: now,
    };
    let poll_message = PollMessage {
        id: tx.allocate_id(),
        client_id: request.requesting_client_id.clone(),
        parent_history_entry: history_entry.id,
        event_time: now,
        message: poll_message_text.clone(),
    };

    let target = LifecycleState::of(&resource, now).resolve(delete_allowed);
    let updated = if delete_allowed {
        let deleted = tombstone(&resource, now);
        perform_delete_tasks(tx, &resource, now, &history_entry, dns_queue)?;
        tx.mark_foreign_key_superseded(&deleted, now);
        deleted
    } else {
        clear_pending_delete(&resource)
    };

    tx.save_resource(updated);
    tx.save_history_entry(history_entry);
    tx.save_poll_message(poll_message);

    Ok(DeletionResult::new(target.result_type(), poll_message_text))
}

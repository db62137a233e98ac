use crate::domain::model::{
    DeletionResultType, DomainResource, EppResource, StatusValue, TransferStatus,
};
use crate::utils::error::{DeleteError, Result};
use chrono::{DateTime, Utc};

/// Lifecycle of a contact or host while an async deletion is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    PendingDelete,
    /// Tombstoned. Terminal for the resource identity.
    Deleted,
    /// Live without the pending-delete marker. A later deletion needs a new request.
    Active,
    /// The request went stale before it could be decided.
    Errored,
}

impl LifecycleState {
    pub fn of(resource: &EppResource, now: DateTime<Utc>) -> Self {
        if resource.is_deleted_at(now) {
            LifecycleState::Deleted
        } else if resource
            .status_values()
            .contains(&StatusValue::PendingDelete)
        {
            LifecycleState::PendingDelete
        } else {
            LifecycleState::Active
        }
    }

    /// Target state of one decision. Only `PendingDelete` may move to `Deleted` or `Active`.
    pub fn resolve(self, delete_allowed: bool) -> LifecycleState {
        match self {
            LifecycleState::PendingDelete if delete_allowed => LifecycleState::Deleted,
            LifecycleState::PendingDelete => LifecycleState::Active,
            _ => LifecycleState::Errored,
        }
    }

    pub fn result_type(self) -> DeletionResultType {
        match self {
            LifecycleState::Deleted => DeletionResultType::Deleted,
            LifecycleState::Active => DeletionResultType::NotDeleted,
            LifecycleState::PendingDelete | LifecycleState::Errored => DeletionResultType::Errored,
        }
    }
}

pub fn check_resource_state_allows_deletion(
    resource: &EppResource,
    now: DateTime<Utc>,
) -> Result<()> {
    let key = resource.key();
    if resource.is_deleted_at(now) {
        return Err(DeleteError::Precondition {
            key: key.to_string(),
            reason: "resource is already deleted".to_string(),
        });
    }
    if !resource
        .status_values()
        .contains(&StatusValue::PendingDelete)
    {
        return Err(DeleteError::Precondition {
            key: key.to_string(),
            reason: "resource is not set as PENDING_DELETE".to_string(),
        });
    }
    Ok(())
}

/// Copy of `resource` deleted as of `now`.
///
/// Status values are cleared. Contacts lose their personal data and any
/// pending transfer is cancelled by the server.
pub fn tombstone(resource: &EppResource, now: DateTime<Utc>) -> EppResource {
    let mut deleted = resource.clone();
    if let EppResource::Contact(contact) = &mut deleted {
        if contact.status_values.contains(&StatusValue::PendingTransfer) {
            if let Some(transfer_data) = contact.transfer_data.as_mut() {
                transfer_data.transfer_status = TransferStatus::ServerCancelled;
                transfer_data.pending_transfer_expiration_time = None;
            }
        }
        contact.wipe_out();
    }
    deleted.status_values_mut().clear();
    deleted.set_deletion_time(Some(now));
    deleted
}

pub fn clear_pending_delete(resource: &EppResource) -> EppResource {
    let mut updated = resource.clone();
    updated
        .status_values_mut()
        .remove(&StatusValue::PendingDelete);
    updated
}

/// Applies the implicit status changes that have happened by `now`.
///
/// An expired pending contact transfer is server-approved. A subordinate host
/// follows the sponsor of its superordinate domain once that domain was
/// transferred after the host.
pub fn project_at(
    resource: EppResource,
    now: DateTime<Utc>,
    superordinate_domain: Option<&DomainResource>,
) -> EppResource {
    match resource {
        EppResource::Contact(mut contact) => {
            let expired = contact.status_values.contains(&StatusValue::PendingTransfer)
                && contact.transfer_data.as_ref().is_some_and(|data| {
                    data.transfer_status == TransferStatus::Pending
                        && data
                            .pending_transfer_expiration_time
                            .is_some_and(|expiration| expiration <= now)
                });
            if expired {
                if let Some(data) = contact.transfer_data.as_mut() {
                    contact.last_transfer_time = data.pending_transfer_expiration_time.take();
                    data.transfer_status = TransferStatus::ServerApproved;
                    contact.current_sponsor_client_id = data.gaining_client_id.clone();
                }
                contact.status_values.remove(&StatusValue::PendingTransfer);
            }
            EppResource::Contact(contact)
        }
        EppResource::Host(mut host) => {
            if let Some(domain) = superordinate_domain {
                if let Some(domain_transfer) = domain.last_transfer_time {
                    let transferred_after_host = domain_transfer <= now
                        && host
                            .last_transfer_time
                            .map_or(true, |host_transfer| host_transfer < domain_transfer);
                    if transferred_after_host {
                        host.current_sponsor_client_id = domain.current_sponsor_client_id.clone();
                        host.last_transfer_time = Some(domain_transfer);
                    }
                }
            }
            EppResource::Host(host)
        }
        domain @ EppResource::Domain(_) => domain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ContactResource, HostResource, ResourceKey, TransferData};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn pending_contact() -> EppResource {
        EppResource::Contact(ContactResource {
            repo_id: "C1-ROID".to_string(),
            contact_id: "sh8013".to_string(),
            current_sponsor_client_id: "RegistrarA".to_string(),
            status_values: [StatusValue::PendingDelete].into_iter().collect(),
            creation_time: t0(),
            last_update_time: t0(),
            email: Some("jdoe@example.tld".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_state_of_resource() {
        let contact = pending_contact();
        assert_eq!(
            LifecycleState::of(&contact, t0()),
            LifecycleState::PendingDelete
        );
        assert_eq!(
            LifecycleState::of(&clear_pending_delete(&contact), t0()),
            LifecycleState::Active
        );
        assert_eq!(
            LifecycleState::of(&tombstone(&contact, t0()), t0()),
            LifecycleState::Deleted
        );
    }

    #[test]
    fn test_only_pending_delete_can_transition() {
        assert_eq!(
            LifecycleState::PendingDelete.resolve(true),
            LifecycleState::Deleted
        );
        assert_eq!(
            LifecycleState::PendingDelete.resolve(false),
            LifecycleState::Active
        );
        assert_eq!(LifecycleState::Active.resolve(true), LifecycleState::Errored);
        assert_eq!(LifecycleState::Deleted.resolve(false), LifecycleState::Errored);
    }

    #[test]
    fn test_check_rejects_stale_resources() {
        let contact = pending_contact();
        assert!(check_resource_state_allows_deletion(&contact, t0()).is_ok());

        let cleared = clear_pending_delete(&contact);
        let err = check_resource_state_allows_deletion(&cleared, t0()).unwrap_err();
        assert!(err.to_string().contains("PENDING_DELETE"));

        let deleted = tombstone(&contact, t0());
        let err = check_resource_state_allows_deletion(&deleted, t0()).unwrap_err();
        assert!(err.to_string().contains("already deleted"));
    }

    #[test]
    fn test_tombstone_wipes_contact_and_cancels_transfer() {
        let mut contact = pending_contact();
        if let EppResource::Contact(c) = &mut contact {
            c.status_values.insert(StatusValue::PendingTransfer);
            c.transfer_data = Some(TransferData {
                gaining_client_id: "RegistrarB".to_string(),
                losing_client_id: "RegistrarA".to_string(),
                transfer_status: TransferStatus::Pending,
                transfer_request_time: t0(),
                pending_transfer_expiration_time: Some(t0() + Duration::days(5)),
            });
        }
        let deleted = tombstone(&contact, t0() + Duration::hours(1));
        let EppResource::Contact(c) = deleted else {
            panic!("expected a contact");
        };
        assert_eq!(c.deletion_time, Some(t0() + Duration::hours(1)));
        assert!(c.status_values.is_empty());
        assert!(c.email.is_none());
        let transfer = c.transfer_data.unwrap();
        assert_eq!(transfer.transfer_status, TransferStatus::ServerCancelled);
        assert!(transfer.pending_transfer_expiration_time.is_none());
    }

    #[test]
    fn test_projection_approves_expired_contact_transfer() {
        let mut contact = pending_contact();
        if let EppResource::Contact(c) = &mut contact {
            c.status_values.insert(StatusValue::PendingTransfer);
            c.transfer_data = Some(TransferData {
                gaining_client_id: "RegistrarB".to_string(),
                losing_client_id: "RegistrarA".to_string(),
                transfer_status: TransferStatus::Pending,
                transfer_request_time: t0(),
                pending_transfer_expiration_time: Some(t0() + Duration::days(5)),
            });
        }

        let before = project_at(contact.clone(), t0() + Duration::days(4), None);
        assert_eq!(before.current_sponsor_client_id(), "RegistrarA");

        let after = project_at(contact, t0() + Duration::days(5), None);
        assert_eq!(after.current_sponsor_client_id(), "RegistrarB");
        assert!(!after.status_values().contains(&StatusValue::PendingTransfer));
        assert!(after.status_values().contains(&StatusValue::PendingDelete));
    }

    #[test]
    fn test_projection_moves_subordinate_host_to_domain_sponsor() {
        let host = EppResource::Host(HostResource {
            repo_id: "H1-ROID".to_string(),
            host_name: "ns1.example.tld".to_string(),
            current_sponsor_client_id: "RegistrarA".to_string(),
            superordinate_domain: Some(ResourceKey::domain("D1-ROID")),
            creation_time: t0(),
            last_update_time: t0(),
            ..Default::default()
        });
        let domain = DomainResource {
            repo_id: "D1-ROID".to_string(),
            domain_name: "example.tld".to_string(),
            current_sponsor_client_id: "RegistrarB".to_string(),
            last_transfer_time: Some(t0() + Duration::days(1)),
            ..Default::default()
        };

        let projected = project_at(host.clone(), t0() + Duration::days(2), Some(&domain));
        assert_eq!(projected.current_sponsor_client_id(), "RegistrarB");

        let unprojected = project_at(host, t0() + Duration::days(2), None);
        assert_eq!(unprojected.current_sponsor_client_id(), "RegistrarA");
    }
}

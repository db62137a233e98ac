use crate::utils::error::{DeleteError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Contact,
    Host,
    Domain,
}

impl ResourceKind {
    /// Name used in client-facing messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Contact => "contact",
            ResourceKind::Host => "host",
            ResourceKind::Domain => "domain",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Contact => "contacts",
            ResourceKind::Host => "hosts",
            ResourceKind::Domain => "domains",
        }
    }

    pub fn is_async_deletable(&self) -> bool {
        matches!(self, ResourceKind::Contact | ResourceKind::Host)
    }

    /// History entry types written for a successful and a failed delete.
    pub fn history_type_pair(&self) -> Result<(HistoryEntryType, HistoryEntryType)> {
        match self {
            ResourceKind::Contact => Ok((
                HistoryEntryType::ContactDelete,
                HistoryEntryType::ContactDeleteFailure,
            )),
            ResourceKind::Host => Ok((
                HistoryEntryType::HostDelete,
                HistoryEntryType::HostDeleteFailure,
            )),
            ResourceKind::Domain => Err(DeleteError::UnsupportedResourceKind {
                kind: self.to_string(),
            }),
        }
    }

    pub fn pending_delete_history_type(&self) -> Result<HistoryEntryType> {
        match self {
            ResourceKind::Contact => Ok(HistoryEntryType::ContactPendingDelete),
            ResourceKind::Host => Ok(HistoryEntryType::HostPendingDelete),
            ResourceKind::Domain => Err(DeleteError::UnsupportedResourceKind {
                kind: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DeleteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contact" => Ok(ResourceKind::Contact),
            "host" => Ok(ResourceKind::Host),
            "domain" => Ok(ResourceKind::Domain),
            other => Err(DeleteError::InvalidResourceKey {
                value: other.to_string(),
            }),
        }
    }
}

/// Datastore identity of a resource, written as `<kind>/<repo_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub repo_id: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, repo_id: impl Into<String>) -> Self {
        Self {
            kind,
            repo_id: repo_id.into(),
        }
    }

    pub fn contact(repo_id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Contact, repo_id)
    }

    pub fn host(repo_id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Host, repo_id)
    }

    pub fn domain(repo_id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Domain, repo_id)
    }

    /// Whether `domain` links to this resource in the reference set matching its kind.
    pub fn is_referenced_by(&self, domain: &DomainResource) -> Result<bool> {
        match self.kind {
            ResourceKind::Contact => Ok(domain.contacts.contains(self)),
            ResourceKind::Host => Ok(domain.nameservers.contains(self)),
            ResourceKind::Domain => Err(DeleteError::internal(format!(
                "EPP resource key of unknown type: {}",
                self
            ))),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.repo_id)
    }
}

impl FromStr for ResourceKey {
    type Err = DeleteError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DeleteError::InvalidResourceKey {
            value: s.to_string(),
        };
        let (kind, repo_id) = s.split_once('/').ok_or_else(invalid)?;
        let kind = kind.parse::<ResourceKind>().map_err(|_| invalid())?;
        if repo_id.trim().is_empty() || repo_id.contains('/') {
            return Err(invalid());
        }
        Ok(Self::new(kind, repo_id))
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = DeleteError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusValue {
    Ok,
    ClientDeleteProhibited,
    ClientTransferProhibited,
    ClientUpdateProhibited,
    Linked,
    PendingDelete,
    PendingTransfer,
    ServerDeleteProhibited,
    ServerTransferProhibited,
    ServerUpdateProhibited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    Pending,
    ClientApproved,
    ClientCancelled,
    ClientRejected,
    ServerApproved,
    ServerCancelled,
}

impl TransferStatus {
    pub fn message(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "Transfer requested.",
            TransferStatus::ClientApproved | TransferStatus::ServerApproved => {
                "Transfer approved."
            }
            TransferStatus::ClientCancelled | TransferStatus::ServerCancelled => {
                "Transfer cancelled."
            }
            TransferStatus::ClientRejected => "Transfer rejected.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferData {
    pub gaining_client_id: String,
    pub losing_client_id: String,
    pub transfer_status: TransferStatus,
    pub transfer_request_time: DateTime<Utc>,
    #[serde(default)]
    pub pending_transfer_expiration_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactResource {
    pub repo_id: String,
    pub contact_id: String,
    pub current_sponsor_client_id: String,
    #[serde(default)]
    pub status_values: BTreeSet<StatusValue>,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transfer_data: Option<TransferData>,
    #[serde(default)]
    pub last_transfer_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

impl ContactResource {
    /// Drops personal data kept on a live contact.
    pub fn wipe_out(&mut self) {
        self.name = None;
        self.email = None;
        self.voice = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostResource {
    pub repo_id: String,
    pub host_name: String,
    pub current_sponsor_client_id: String,
    #[serde(default)]
    pub status_values: BTreeSet<StatusValue>,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub superordinate_domain: Option<ResourceKey>,
    #[serde(default)]
    pub last_transfer_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub inet_addresses: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainResource {
    pub repo_id: String,
    pub domain_name: String,
    pub current_sponsor_client_id: String,
    #[serde(default)]
    pub status_values: BTreeSet<StatusValue>,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contacts: BTreeSet<ResourceKey>,
    #[serde(default)]
    pub nameservers: BTreeSet<ResourceKey>,
    #[serde(default)]
    pub subordinate_hosts: BTreeSet<String>,
    #[serde(default)]
    pub last_transfer_time: Option<DateTime<Utc>>,
}

impl DomainResource {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::domain(self.repo_id.clone())
    }

    pub fn is_active_at(&self, time: DateTime<Utc>) -> bool {
        is_active(self.creation_time, self.deletion_time, time)
    }
}

/// `[creation, deletion)` contains `time`.
pub fn is_active(
    creation_time: DateTime<Utc>,
    deletion_time: Option<DateTime<Utc>>,
    time: DateTime<Utc>,
) -> bool {
    creation_time <= time && deletion_time.map_or(true, |deleted| time < deleted)
}

pub fn is_deleted(deletion_time: Option<DateTime<Utc>>, time: DateTime<Utc>) -> bool {
    deletion_time.is_some_and(|deleted| deleted <= time)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EppResource {
    Contact(ContactResource),
    Host(HostResource),
    Domain(DomainResource),
}

impl EppResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            EppResource::Contact(_) => ResourceKind::Contact,
            EppResource::Host(_) => ResourceKind::Host,
            EppResource::Domain(_) => ResourceKind::Domain,
        }
    }

    pub fn repo_id(&self) -> &str {
        match self {
            EppResource::Contact(c) => &c.repo_id,
            EppResource::Host(h) => &h.repo_id,
            EppResource::Domain(d) => &d.repo_id,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind(), self.repo_id())
    }

    /// Client-visible identifier: contact id, host name or domain name.
    pub fn foreign_key(&self) -> &str {
        match self {
            EppResource::Contact(c) => &c.contact_id,
            EppResource::Host(h) => &h.host_name,
            EppResource::Domain(d) => &d.domain_name,
        }
    }

    pub fn current_sponsor_client_id(&self) -> &str {
        match self {
            EppResource::Contact(c) => &c.current_sponsor_client_id,
            EppResource::Host(h) => &h.current_sponsor_client_id,
            EppResource::Domain(d) => &d.current_sponsor_client_id,
        }
    }

    pub fn status_values(&self) -> &BTreeSet<StatusValue> {
        match self {
            EppResource::Contact(c) => &c.status_values,
            EppResource::Host(h) => &h.status_values,
            EppResource::Domain(d) => &d.status_values,
        }
    }

    pub fn status_values_mut(&mut self) -> &mut BTreeSet<StatusValue> {
        match self {
            EppResource::Contact(c) => &mut c.status_values,
            EppResource::Host(h) => &mut h.status_values,
            EppResource::Domain(d) => &mut d.status_values,
        }
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        match self {
            EppResource::Contact(c) => c.creation_time,
            EppResource::Host(h) => h.creation_time,
            EppResource::Domain(d) => d.creation_time,
        }
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        match self {
            EppResource::Contact(c) => c.last_update_time,
            EppResource::Host(h) => h.last_update_time,
            EppResource::Domain(d) => d.last_update_time,
        }
    }

    pub fn set_last_update_time(&mut self, time: DateTime<Utc>) {
        match self {
            EppResource::Contact(c) => c.last_update_time = time,
            EppResource::Host(h) => h.last_update_time = time,
            EppResource::Domain(d) => d.last_update_time = time,
        }
    }

    pub fn deletion_time(&self) -> Option<DateTime<Utc>> {
        match self {
            EppResource::Contact(c) => c.deletion_time,
            EppResource::Host(h) => h.deletion_time,
            EppResource::Domain(d) => d.deletion_time,
        }
    }

    pub fn set_deletion_time(&mut self, time: Option<DateTime<Utc>>) {
        match self {
            EppResource::Contact(c) => c.deletion_time = time,
            EppResource::Host(h) => h.deletion_time = time,
            EppResource::Domain(d) => d.deletion_time = time,
        }
    }

    pub fn is_active_at(&self, time: DateTime<Utc>) -> bool {
        is_active(self.creation_time(), self.deletion_time(), time)
    }

    pub fn is_deleted_at(&self, time: DateTime<Utc>) -> bool {
        is_deleted(self.deletion_time(), time)
    }

    pub fn as_domain(&self) -> Option<&DomainResource> {
        match self {
            EppResource::Domain(d) => Some(d),
            _ => None,
        }
    }
}

/// Handle to a leased work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub name: String,
    pub queue: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TaskHandle {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// An immutable request to delete one contact or host, decoded from a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeletionRequest {
    pub key: ResourceKey,
    /// Update timestamp of the resource when the request was decoded.
    pub last_update_time: DateTime<Utc>,
    /// The registrar that asked for the deletion, which might not be the current sponsor.
    pub requesting_client_id: String,
    pub is_superuser: bool,
    pub task: TaskHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionResultType {
    Deleted,
    NotDeleted,
    Errored,
}

impl DeletionResultType {
    pub fn render_counter_text(&self, resource_name_plural: &str) -> String {
        match self {
            DeletionResultType::Deleted => format!("{} deleted", resource_name_plural),
            DeletionResultType::NotDeleted => format!("{} not deleted", resource_name_plural),
            DeletionResultType::Errored => {
                format!("{} errored out during deletion", resource_name_plural)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionResultType::Deleted => "DELETED",
            DeletionResultType::NotDeleted => "NOT_DELETED",
            DeletionResultType::Errored => "ERRORED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResult {
    pub result_type: DeletionResultType,
    pub poll_message_text: String,
}

impl DeletionResult {
    pub fn new(result_type: DeletionResultType, poll_message_text: impl Into<String>) -> Self {
        Self {
            result_type,
            poll_message_text: poll_message_text.into(),
        }
    }

    pub fn errored() -> Self {
        Self::new(DeletionResultType::Errored, "")
    }
}

/// One row of a deletion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub resource_key: ResourceKey,
    pub requesting_client_id: String,
    pub task_name: String,
    pub result: DeletionResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryEntryType {
    ContactPendingDelete,
    ContactDelete,
    ContactDeleteFailure,
    HostPendingDelete,
    HostDelete,
    HostDeleteFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub parent: ResourceKey,
    pub entry_type: HistoryEntryType,
    pub client_id: String,
    pub modification_time: DateTime<Utc>,
}

/// One-time poll message delivered to a registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollMessage {
    pub id: u64,
    pub client_id: String,
    pub parent_history_entry: u64,
    pub event_time: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyIndex {
    pub kind: ResourceKind,
    pub foreign_key: String,
    pub resource_key: ResourceKey,
    #[serde(default)]
    pub deletion_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_resource_key_round_trips_through_string() {
        let key: ResourceKey = "contact/C123-ROID".parse().unwrap();
        assert_eq!(key, ResourceKey::contact("C123-ROID"));
        assert_eq!(key.to_string(), "contact/C123-ROID");
    }

    #[test]
    fn test_resource_key_rejects_malformed_values() {
        assert!("contact".parse::<ResourceKey>().is_err());
        assert!("contact/".parse::<ResourceKey>().is_err());
        assert!("registrar/R1".parse::<ResourceKey>().is_err());
        assert!("host/a/b".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_domain_lifetime_window_is_half_open() {
        let domain = DomainResource {
            repo_id: "D1-ROID".to_string(),
            creation_time: at(1),
            deletion_time: Some(at(5)),
            ..Default::default()
        };
        assert!(!domain.is_active_at(at(0)));
        assert!(domain.is_active_at(at(1)));
        assert!(domain.is_active_at(at(4)));
        assert!(!domain.is_active_at(at(5)));
    }

    #[test]
    fn test_is_referenced_by_checks_the_set_matching_the_kind() {
        let contact = ResourceKey::contact("C1-ROID");
        let host = ResourceKey::host("H1-ROID");
        let domain = DomainResource {
            contacts: [contact.clone()].into_iter().collect(),
            ..Default::default()
        };
        assert!(contact.is_referenced_by(&domain).unwrap());
        assert!(!host.is_referenced_by(&domain).unwrap());
        assert!(ResourceKey::domain("D1")
            .is_referenced_by(&domain)
            .is_err());
    }

    #[test]
    fn test_counter_text() {
        assert_eq!(
            DeletionResultType::Deleted.render_counter_text("contacts"),
            "contacts deleted"
        );
        assert_eq!(
            DeletionResultType::Errored.render_counter_text("hosts"),
            "hosts errored out during deletion"
        );
    }

    #[test]
    fn test_epp_resource_serializes_with_kind_tag() {
        let resource = EppResource::Host(HostResource {
            repo_id: "H1-ROID".to_string(),
            host_name: "ns1.example.tld".to_string(),
            superordinate_domain: Some(ResourceKey::domain("D1-ROID")),
            ..Default::default()
        });
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["kind"], "host");
        assert_eq!(json["superordinate_domain"], "domain/D1-ROID");
        let back: EppResource = serde_json::from_value(json).unwrap();
        assert_eq!(back, resource);
    }
}

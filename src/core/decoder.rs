use crate::domain::lifecycle::check_resource_state_allows_deletion;
use crate::domain::model::{DeletionRequest, ResourceKey, TaskHandle};
use crate::domain::ports::ResourceStore;
use crate::utils::error::{DeleteError, Result};
use chrono::{DateTime, Utc};

/// Task parameter holding the key of the resource to delete.
pub const PARAM_RESOURCE_KEY: &str = "resourceKey";
pub const PARAM_REQUESTING_CLIENT_ID: &str = "requestingClientId";
pub const PARAM_IS_SUPERUSER: &str = "isSuperuser";
pub const QUEUE_ASYNC_DELETE: &str = "async-delete-pull";

impl DeletionRequest {
    /// Decodes a leased task, checking the target exists and is still pending delete.
    pub async fn from_task<S: ResourceStore>(
        task: &TaskHandle,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let raw_key = required_param(task, PARAM_RESOURCE_KEY, "Resource to delete not specified")?;
        let key: ResourceKey = raw_key
            .parse()
            .map_err(|e| DeleteError::decode(format!("{}", e)))?;

        let resource = store
            .load(&key)
            .await?
            .ok_or_else(|| DeleteError::decode(format!("Resource to delete doesn't exist: {}", key)))?;
        if !resource.kind().is_async_deletable() {
            return Err(DeleteError::decode(format!(
                "Cannot delete a {} via this action",
                resource.kind()
            )));
        }
        check_resource_state_allows_deletion(&resource, now)
            .map_err(|e| DeleteError::decode(e.to_string()))?;

        let requesting_client_id = required_param(
            task,
            PARAM_REQUESTING_CLIENT_ID,
            "Requesting client id not specified",
        )?;
        let is_superuser = parse_bool(required_param(
            task,
            PARAM_IS_SUPERUSER,
            "Is superuser not specified",
        )?)?;

        Ok(DeletionRequest {
            key,
            last_update_time: resource.last_update_time(),
            requesting_client_id: requesting_client_id.to_string(),
            is_superuser,
            task: task.clone(),
        })
    }
}

fn required_param<'a>(task: &'a TaskHandle, name: &str, message: &str) -> Result<&'a str> {
    match task.param(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(DeleteError::decode(message)),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(DeleteError::decode(format!(
            "Is superuser must be true or false, got '{}'",
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        ContactResource, DomainResource, EppResource, StatusValue,
    };
    use crate::domain::ports::Transaction;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStore {
        resources: Arc<Mutex<HashMap<ResourceKey, EppResource>>>,
    }

    impl MockStore {
        async fn insert(&self, resource: EppResource) {
            self.resources.lock().await.insert(resource.key(), resource);
        }
    }

    #[async_trait]
    impl ResourceStore for MockStore {
        async fn load(&self, key: &ResourceKey) -> Result<Option<EppResource>> {
            Ok(self.resources.lock().await.get(key).cloned())
        }

        async fn load_all_domains(&self) -> Result<Vec<DomainResource>> {
            Ok(Vec::new())
        }

        async fn transact<T, F>(&self, _work: F) -> Result<T>
        where
            T: Send,
            F: FnOnce(&mut dyn Transaction) -> Result<T> + Send,
        {
            Err(DeleteError::Store {
                message: "decoder must not open transactions".to_string(),
            })
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap()
    }

    fn contact(status: &[StatusValue]) -> EppResource {
        EppResource::Contact(ContactResource {
            repo_id: "C123-ROID".to_string(),
            contact_id: "123".to_string(),
            current_sponsor_client_id: "RegistrarA".to_string(),
            status_values: status.iter().copied().collect(),
            creation_time: t0() - Duration::days(10),
            last_update_time: t0(),
            ..Default::default()
        })
    }

    fn task(params: &[(&str, &str)]) -> TaskHandle {
        TaskHandle {
            name: "task-1".to_string(),
            queue: QUEUE_ASYNC_DELETE.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn full_params() -> Vec<(&'static str, &'static str)> {
        vec![
            (PARAM_RESOURCE_KEY, "contact/C123-ROID"),
            (PARAM_REQUESTING_CLIENT_ID, "RegistrarA"),
            (PARAM_IS_SUPERUSER, "false"),
        ]
    }

    #[tokio::test]
    async fn test_decodes_valid_task_with_snapshot_time() {
        let store = MockStore::default();
        store.insert(contact(&[StatusValue::PendingDelete])).await;

        let now = t0() + Duration::minutes(1);
        let request = DeletionRequest::from_task(&task(&full_params()), &store, now)
            .await
            .unwrap();

        assert_eq!(request.key, ResourceKey::contact("C123-ROID"));
        assert_eq!(request.last_update_time, t0());
        assert_eq!(request.requesting_client_id, "RegistrarA");
        assert!(!request.is_superuser);
        assert_eq!(request.task.name, "task-1");
    }

    #[tokio::test]
    async fn test_missing_requesting_client_id_fails() {
        let store = MockStore::default();
        store.insert(contact(&[StatusValue::PendingDelete])).await;
        let params: Vec<_> = full_params()
            .into_iter()
            .filter(|(k, _)| *k != PARAM_REQUESTING_CLIENT_ID)
            .collect();

        let err = DeletionRequest::from_task(&task(&params), &store, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DeleteError::Decode { .. }));
        assert!(err.to_string().contains("Requesting client id not specified"));
    }

    #[tokio::test]
    async fn test_unknown_resource_fails() {
        let store = MockStore::default();
        let err = DeletionRequest::from_task(&task(&full_params()), &store, t0())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("doesn't exist"));
    }

    #[tokio::test]
    async fn test_domain_resource_is_rejected() {
        let store = MockStore::default();
        store
            .insert(EppResource::Domain(DomainResource {
                repo_id: "D1-ROID".to_string(),
                status_values: [StatusValue::PendingDelete].into_iter().collect(),
                ..Default::default()
            }))
            .await;
        let mut params = full_params();
        params[0] = (PARAM_RESOURCE_KEY, "domain/D1-ROID");

        let err = DeletionRequest::from_task(&task(&params), &store, t0())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot delete a domain"));
    }

    #[tokio::test]
    async fn test_resource_not_pending_delete_fails() {
        let store = MockStore::default();
        store.insert(contact(&[StatusValue::Ok])).await;

        let err = DeletionRequest::from_task(&task(&full_params()), &store, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DeleteError::Decode { .. }));
        assert!(err.to_string().contains("PENDING_DELETE"));
    }

    #[tokio::test]
    async fn test_invalid_superuser_flag_fails() {
        let store = MockStore::default();
        store.insert(contact(&[StatusValue::PendingDelete])).await;
        let mut params = full_params();
        params[2] = (PARAM_IS_SUPERUSER, "maybe");

        assert!(DeletionRequest::from_task(&task(&params), &store, t0())
            .await
            .is_err());

        params[2] = (PARAM_IS_SUPERUSER, "TRUE");
        let request = DeletionRequest::from_task(&task(&params), &store, t0())
            .await
            .unwrap();
        assert!(request.is_superuser);
    }
}

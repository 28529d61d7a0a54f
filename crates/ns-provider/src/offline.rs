//! Workspace stand-in for runs that must never reach the remote API.

use async_trait::async_trait;
use ns_blueprint::EntityKind;
use serde_json::Value;

use crate::error::{ProviderError, ProviderErrorKind, ProviderResult};
use crate::traits::{RemoteUser, WorkspaceProvider};

/// Rejects every call with a configuration error.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineWorkspace;

impl OfflineWorkspace {
    fn refuse<T>(&self, operation: &str) -> ProviderResult<T> {
        Err(ProviderError::new(
            self.name(),
            ProviderErrorKind::Configuration,
            format!("{operation} needs a workspace token"),
        ))
    }
}

#[async_trait]
impl WorkspaceProvider for OfflineWorkspace {
    fn name(&self) -> &str {
        "offline"
    }

    async fn create_object(&self, _kind: EntityKind, _payload: &Value) -> ProviderResult<String> {
        self.refuse("create_object")
    }

    async fn update_object(
        &self,
        _kind: EntityKind,
        _remote_id: &str,
        _payload: &Value,
    ) -> ProviderResult<String> {
        self.refuse("update_object")
    }

    async fn append_blocks(&self, _remote_id: &str, _blocks: &[Value]) -> ProviderResult<()> {
        self.refuse("append_blocks")
    }

    async fn replace_blocks(&self, _remote_id: &str, _blocks: &[Value]) -> ProviderResult<()> {
        self.refuse("replace_blocks")
    }

    async fn archive_object(&self, _kind: EntityKind, _remote_id: &str) -> ProviderResult<()> {
        self.refuse("archive_object")
    }

    async fn get_object(&self, _kind: EntityKind, _remote_id: &str) -> ProviderResult<Value> {
        self.refuse("get_object")
    }

    async fn list_users(&self) -> ProviderResult<Vec<RemoteUser>> {
        self.refuse("list_users")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_call_is_a_configuration_error() {
        let workspace = OfflineWorkspace;
        let err = workspace
            .create_object(EntityKind::Page, &Value::Null)
            .await
            .expect_err("offline");
        assert_eq!(err.kind, ProviderErrorKind::Configuration);
        assert!(!err.retryable);
        assert!(workspace.list_users().await.is_err());
    }
}

use async_trait::async_trait;
use ns_blueprint::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderResult;

/// A user known to the remote workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: String,
    pub email: Option<String>,
}

/// Remote workspace capability set.
///
/// Implementations retry transient failures internally; any error returned
/// is final for that call.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Create an object of `kind` and return its remote id.
    async fn create_object(&self, kind: EntityKind, payload: &Value) -> ProviderResult<String>;

    /// Patch an existing object and return its remote id.
    async fn update_object(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
    ) -> ProviderResult<String>;

    async fn append_blocks(&self, remote_id: &str, blocks: &[Value]) -> ProviderResult<()>;

    /// Replace every child block of `remote_id` with `blocks`.
    async fn replace_blocks(&self, remote_id: &str, blocks: &[Value]) -> ProviderResult<()>;

    async fn archive_object(&self, kind: EntityKind, remote_id: &str) -> ProviderResult<()>;

    async fn get_object(&self, kind: EntityKind, remote_id: &str) -> ProviderResult<Value>;

    async fn list_users(&self) -> ProviderResult<Vec<RemoteUser>>;
}

/// Minimal view of a directory user or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryObject {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDirectoryUser {
    pub display_name: String,
    pub given_name: String,
    pub surname: String,
    pub user_principal_name: String,
    pub mail_nickname: String,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub office_location: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDirectoryGroup {
    pub display_name: String,
    pub description: Option<String>,
    pub mail_nickname: String,
}

/// Remote identity directory capability set.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn find_user_by_principal(&self, upn: &str) -> ProviderResult<Option<DirectoryObject>>;

    async fn create_user(&self, user: &NewDirectoryUser) -> ProviderResult<DirectoryObject>;

    async fn find_group_by_name(&self, name: &str) -> ProviderResult<Option<DirectoryObject>>;

    async fn create_group(&self, group: &NewDirectoryGroup) -> ProviderResult<DirectoryObject>;

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> ProviderResult<()>;
}

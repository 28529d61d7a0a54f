//! In-memory providers for testing.
//!
//! - [`RecordingWorkspace`]: records every workspace call and hands out
//!   sequential remote ids
//! - [`RecordingDirectory`]: a tiny directory with users, groups and
//!   memberships

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ns_blueprint::EntityKind;
use serde_json::{Value, json};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{
    DirectoryObject, DirectoryProvider, NewDirectoryGroup, NewDirectoryUser, RemoteUser,
    WorkspaceProvider,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// RecordingWorkspace
// ---------------------------------------------------------------------------

/// A call received by [`RecordingWorkspace`].
#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceCall {
    Create {
        kind: EntityKind,
        payload: Value,
        remote_id: String,
    },
    Update {
        kind: EntityKind,
        remote_id: String,
        payload: Value,
    },
    AppendBlocks {
        remote_id: String,
        blocks: Vec<Value>,
    },
    ReplaceBlocks {
        remote_id: String,
        blocks: Vec<Value>,
    },
    Archive {
        kind: EntityKind,
        remote_id: String,
    },
    Get {
        kind: EntityKind,
        remote_id: String,
    },
    ListUsers,
}

impl WorkspaceCall {
    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, WorkspaceCall::Get { .. } | WorkspaceCall::ListUsers)
    }
}

#[derive(Debug, Default)]
struct WorkspaceState {
    calls: Vec<WorkspaceCall>,
    next_id: u64,
    objects: HashMap<String, Value>,
    users: Vec<RemoteUser>,
    fail_next: VecDeque<ProviderError>,
    fail_for: HashMap<String, ProviderError>,
}

#[derive(Debug, Default)]
pub struct RecordingWorkspace {
    state: Mutex<WorkspaceState>,
}

impl RecordingWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = RemoteUser>) -> Self {
        let workspace = Self::default();
        lock(&workspace.state).users = users.into_iter().collect();
        workspace
    }

    /// Make the next mutating call fail with `error`.
    pub fn fail_next(&self, error: ProviderError) {
        lock(&self.state).fail_next.push_back(error);
    }

    /// Make every mutating call targeting `remote_id` fail with `error`.
    pub fn fail_for(&self, remote_id: impl Into<String>, error: ProviderError) {
        lock(&self.state).fail_for.insert(remote_id.into(), error);
    }

    pub fn calls(&self) -> Vec<WorkspaceCall> {
        lock(&self.state).calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Payloads of every create call of `kind`, in call order.
    pub fn created_payloads(&self, kind: EntityKind) -> Vec<Value> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                WorkspaceCall::Create {
                    kind: k, payload, ..
                } if *k == kind => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Last known body of a remote object.
    pub fn object(&self, remote_id: &str) -> Option<Value> {
        lock(&self.state).objects.get(remote_id).cloned()
    }

    fn check_failure(state: &mut WorkspaceState, remote_id: Option<&str>) -> ProviderResult<()> {
        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        if let Some(error) = remote_id.and_then(|id| state.fail_for.get(id)) {
            return Err(error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceProvider for RecordingWorkspace {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_object(&self, kind: EntityKind, payload: &Value) -> ProviderResult<String> {
        let mut state = lock(&self.state);
        Self::check_failure(&mut state, None)?;
        state.next_id += 1;
        let remote_id = format!("{}-{}", kind.as_str(), state.next_id);
        state.objects.insert(remote_id.clone(), payload.clone());
        state.calls.push(WorkspaceCall::Create {
            kind,
            payload: payload.clone(),
            remote_id: remote_id.clone(),
        });
        Ok(remote_id)
    }

    async fn update_object(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
    ) -> ProviderResult<String> {
        let mut state = lock(&self.state);
        Self::check_failure(&mut state, Some(remote_id))?;
        state.objects.insert(remote_id.to_string(), payload.clone());
        state.calls.push(WorkspaceCall::Update {
            kind,
            remote_id: remote_id.to_string(),
            payload: payload.clone(),
        });
        Ok(remote_id.to_string())
    }

    async fn append_blocks(&self, remote_id: &str, blocks: &[Value]) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        Self::check_failure(&mut state, Some(remote_id))?;
        state.calls.push(WorkspaceCall::AppendBlocks {
            remote_id: remote_id.to_string(),
            blocks: blocks.to_vec(),
        });
        Ok(())
    }

    async fn replace_blocks(&self, remote_id: &str, blocks: &[Value]) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        Self::check_failure(&mut state, Some(remote_id))?;
        state.calls.push(WorkspaceCall::ReplaceBlocks {
            remote_id: remote_id.to_string(),
            blocks: blocks.to_vec(),
        });
        Ok(())
    }

    async fn archive_object(&self, kind: EntityKind, remote_id: &str) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        Self::check_failure(&mut state, Some(remote_id))?;
        state.calls.push(WorkspaceCall::Archive {
            kind,
            remote_id: remote_id.to_string(),
        });
        Ok(())
    }

    async fn get_object(&self, kind: EntityKind, remote_id: &str) -> ProviderResult<Value> {
        let mut state = lock(&self.state);
        state.calls.push(WorkspaceCall::Get {
            kind,
            remote_id: remote_id.to_string(),
        });
        state.objects.get(remote_id).cloned().ok_or_else(|| {
            ProviderError::from_status("mock", 404, json!({"message": "object not found"}).to_string(), None)
        })
    }

    async fn list_users(&self) -> ProviderResult<Vec<RemoteUser>> {
        let mut state = lock(&self.state);
        state.calls.push(WorkspaceCall::ListUsers);
        Ok(state.users.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingDirectory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DirectoryState {
    next_id: u64,
    users: BTreeMap<String, DirectoryObject>,
    groups: BTreeMap<String, DirectoryObject>,
    members: BTreeSet<(String, String)>,
    created_users: Vec<NewDirectoryUser>,
    created_groups: Vec<NewDirectoryGroup>,
}

#[derive(Debug, Default)]
pub struct RecordingDirectory {
    state: Mutex<DirectoryState>,
}

impl RecordingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(state: &mut DirectoryState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    /// Seed an existing user and return its object id.
    pub fn insert_user(&self, upn: &str) -> String {
        let mut state = lock(&self.state);
        let id = Self::next_id(&mut state, "entra-user");
        state.users.insert(
            upn.to_string(),
            DirectoryObject {
                id: id.clone(),
                display_name: None,
            },
        );
        id
    }

    /// Seed an existing group and return its object id.
    pub fn insert_group(&self, name: &str) -> String {
        let mut state = lock(&self.state);
        let id = Self::next_id(&mut state, "entra-group");
        state.groups.insert(
            name.to_string(),
            DirectoryObject {
                id: id.clone(),
                display_name: Some(name.to_string()),
            },
        );
        id
    }

    pub fn created_users(&self) -> Vec<NewDirectoryUser> {
        lock(&self.state).created_users.clone()
    }

    pub fn created_groups(&self) -> Vec<NewDirectoryGroup> {
        lock(&self.state).created_groups.clone()
    }

    pub fn is_member(&self, group_id: &str, user_id: &str) -> bool {
        lock(&self.state)
            .members
            .contains(&(group_id.to_string(), user_id.to_string()))
    }
}

#[async_trait]
impl DirectoryProvider for RecordingDirectory {
    fn name(&self) -> &str {
        "mock-directory"
    }

    async fn find_user_by_principal(&self, upn: &str) -> ProviderResult<Option<DirectoryObject>> {
        Ok(lock(&self.state).users.get(upn).cloned())
    }

    async fn create_user(&self, user: &NewDirectoryUser) -> ProviderResult<DirectoryObject> {
        let mut state = lock(&self.state);
        let object = DirectoryObject {
            id: Self::next_id(&mut state, "entra-user"),
            display_name: Some(user.display_name.clone()),
        };
        state
            .users
            .insert(user.user_principal_name.clone(), object.clone());
        state.created_users.push(user.clone());
        Ok(object)
    }

    async fn find_group_by_name(&self, name: &str) -> ProviderResult<Option<DirectoryObject>> {
        Ok(lock(&self.state).groups.get(name).cloned())
    }

    async fn create_group(&self, group: &NewDirectoryGroup) -> ProviderResult<DirectoryObject> {
        let mut state = lock(&self.state);
        let object = DirectoryObject {
            id: Self::next_id(&mut state, "entra-group"),
            display_name: Some(group.display_name.clone()),
        };
        state
            .groups
            .insert(group.display_name.clone(), object.clone());
        state.created_groups.push(group.clone());
        Ok(object)
    }

    /// Adding an existing member fails with HTTP 400, as the real directory does.
    async fn add_group_member(&self, group_id: &str, user_id: &str) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        if !state.members.insert((group_id.to_string(), user_id.to_string())) {
            return Err(ProviderError::from_status(
                "mock-directory",
                400,
                json!({"error": {"message": "One or more added object references already exist"}})
                    .to_string(),
                None,
            ));
        }
        Ok(())
    }
}

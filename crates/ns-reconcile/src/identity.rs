//! Identity passes: match blueprint users to workspace users and provision
//! them (plus their groups) in the identity directory.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use ns_blueprint::{Blueprint, IdentityUser};
use ns_provider::directory::group_mail_nickname;
use ns_provider::{
    DirectoryProvider, NewDirectoryGroup, NewDirectoryUser, ProviderError, WorkspaceProvider,
};
use ns_state::{IdentityUpdate, StateStore};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::error::{ReconcileError, ReconcileResult};

const PASSWORD_TOKEN_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionMode {
    /// Create users and groups that are missing.
    #[default]
    Create,
    /// Only record what already exists.
    Sync,
}

impl ProvisionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionMode::Create => "create",
            ProvisionMode::Sync => "sync",
        }
    }
}

impl fmt::Display for ProvisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionMode {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ProvisionMode::Create),
            "sync" => Ok(ProvisionMode::Sync),
            other => Err(ReconcileError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionOptions {
    pub mode: ProvisionMode,
    /// Count what would be created without writing to the directory.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyUsersReport {
    pub matched: usize,
    pub total: usize,
    /// Lower-cased emails with no workspace user.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub created_users: usize,
    pub existing_users: usize,
    pub created_groups: usize,
    pub existing_groups: usize,
    pub memberships_added: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisioningReport {
    pub total: usize,
    pub matched: usize,
    pub missing_in_directory: Vec<String>,
    pub missing_groups: Vec<String>,
    pub missing_in_workspace: Vec<String>,
}

/// A directory group and the blueprint users that belong to it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlan<'a> {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<&'a IdentityUser>,
}

/// Groups to provision. Explicit blueprint groups win; without any, one
/// `SYNTH-<company>-<team>` group per team is derived from the users.
pub fn planned_groups(blueprint: &Blueprint) -> Vec<GroupPlan<'_>> {
    let identity = &blueprint.identity;
    let users: HashMap<&str, &IdentityUser> = identity
        .users
        .iter()
        .map(|user| (user.synth_user_id.as_str(), user))
        .collect();

    if !identity.groups.is_empty() {
        return identity
            .groups
            .iter()
            .map(|group| GroupPlan {
                name: group.name.clone(),
                description: group.description.clone(),
                members: identity
                    .memberships
                    .iter()
                    .filter(|m| m.group_synth_id == group.synth_group_id)
                    .filter_map(|m| users.get(m.user_synth_id.as_str()).copied())
                    .collect(),
            })
            .collect();
    }

    let mut by_team: BTreeMap<String, Vec<&IdentityUser>> = BTreeMap::new();
    for user in &identity.users {
        if !user.team.is_empty() {
            by_team
                .entry(format!("SYNTH-{}-{}", blueprint.company, user.team))
                .or_default()
                .push(user);
        }
    }
    by_team
        .into_iter()
        .map(|(name, members)| GroupPlan {
            name,
            description: None,
            members,
        })
        .collect()
}

/// Workspace user ids keyed by lower-cased email.
async fn workspace_users_by_email(
    workspace: &dyn WorkspaceProvider,
) -> ReconcileResult<HashMap<String, String>> {
    Ok(workspace
        .list_users()
        .await?
        .into_iter()
        .filter_map(|user| user.email.map(|email| (email.to_lowercase(), user.id)))
        .collect())
}

/// Record matched workspace ids; returns (matched, missing emails).
fn match_workspace_users(
    store: &StateStore,
    audit: &dyn AuditSink,
    users: &[IdentityUser],
    by_email: &HashMap<String, String>,
) -> ReconcileResult<(usize, Vec<String>)> {
    let mut matched = 0;
    let mut missing = Vec::new();
    for user in users {
        let email = user.email.to_lowercase();
        if email.is_empty() {
            continue;
        }
        match by_email.get(&email) {
            Some(notion_user_id) => {
                store.upsert_identity(
                    &user.synth_user_id,
                    &IdentityUpdate {
                        notion_user_id: Some(notion_user_id.clone()),
                        email: Some(email.clone()),
                        ..IdentityUpdate::default()
                    },
                )?;
                audit.record(
                    &AuditEntry::new(
                        AuditAction::WorkspaceUserMatched,
                        None,
                        &user.synth_user_id,
                        Some(notion_user_id),
                    )
                    .with_detail(serde_json::json!({ "email": email })),
                )?;
                matched += 1;
            }
            None => missing.push(email),
        }
    }
    Ok((matched, missing))
}

/// Match blueprint users to workspace users by email.
pub async fn verify_users(
    store: &StateStore,
    workspace: &dyn WorkspaceProvider,
    audit: &dyn AuditSink,
    blueprint: &Blueprint,
) -> ReconcileResult<VerifyUsersReport> {
    let by_email = workspace_users_by_email(workspace).await?;
    let users = &blueprint.identity.users;
    let (matched, missing) = match_workspace_users(store, audit, users, &by_email)?;
    tracing::info!(matched, total = users.len(), missing = missing.len(), "verified workspace users");
    Ok(VerifyUsersReport {
        matched,
        total: users.len(),
        missing,
    })
}

/// Find-or-create groups and users in the directory, then add memberships.
pub async fn provision_identity(
    store: &StateStore,
    directory: &dyn DirectoryProvider,
    audit: &dyn AuditSink,
    blueprint: &Blueprint,
    options: ProvisionOptions,
) -> ReconcileResult<ProvisionReport> {
    let mut report = ProvisionReport::default();
    let groups = planned_groups(blueprint);

    let mut group_ids: HashMap<String, String> = HashMap::new();
    for group in &groups {
        if let Some(existing) = directory.find_group_by_name(&group.name).await? {
            group_ids.insert(group.name.clone(), existing.id);
            report.existing_groups += 1;
            continue;
        }
        if options.mode == ProvisionMode::Sync {
            continue;
        }
        report.created_groups += 1;
        if options.dry_run {
            continue;
        }
        let created = directory
            .create_group(&NewDirectoryGroup {
                display_name: group.name.clone(),
                description: group.description.clone(),
                mail_nickname: group_mail_nickname(&group.name),
            })
            .await?;
        audit.record(&AuditEntry::new(
            AuditAction::DirectoryGroupCreated,
            None,
            &group.name,
            Some(&created.id),
        ))?;
        group_ids.insert(group.name.clone(), created.id);
    }

    for user in &blueprint.identity.users {
        if user.upn.is_empty() {
            return Err(ReconcileError::MissingPrincipalName(user.synth_user_id.clone()));
        }
        if let Some(existing) = directory.find_user_by_principal(&user.upn).await? {
            record_directory_id(store, user, &existing.id)?;
            report.existing_users += 1;
            continue;
        }
        if options.mode == ProvisionMode::Sync {
            continue;
        }
        report.created_users += 1;
        if options.dry_run {
            continue;
        }
        let created = directory.create_user(&new_directory_user(user)).await?;
        record_directory_id(store, user, &created.id)?;
        audit.record(
            &AuditEntry::new(
                AuditAction::DirectoryUserCreated,
                None,
                &user.synth_user_id,
                Some(&created.id),
            )
            .with_detail(serde_json::json!({ "upn": user.upn })),
        )?;
    }

    for group in &groups {
        let Some(group_id) = group_ids.get(&group.name) else {
            continue;
        };
        for member in &group.members {
            let Some(object_id) = store
                .get_identity(&member.synth_user_id)?
                .and_then(|identity| identity.entra_object_id)
            else {
                continue;
            };
            if options.dry_run {
                report.memberships_added += 1;
                continue;
            }
            match directory.add_group_member(group_id, &object_id).await {
                Ok(()) => {
                    report.memberships_added += 1;
                    audit.record(
                        &AuditEntry::new(
                            AuditAction::DirectoryMemberAdded,
                            None,
                            &member.synth_user_id,
                            Some(&object_id),
                        )
                        .with_detail(serde_json::json!({ "group": group.name })),
                    )?;
                }
                Err(err) if already_member(&err) => {
                    tracing::debug!(group = %group.name, user = %member.synth_user_id, "already a member");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    tracing::info!(
        mode = %options.mode,
        dry_run = options.dry_run,
        created_users = report.created_users,
        existing_users = report.existing_users,
        created_groups = report.created_groups,
        memberships = report.memberships_added,
        "identity provisioning finished"
    );
    Ok(report)
}

/// Report what is missing in the directory and the workspace.
pub async fn verify_provisioning(
    store: &StateStore,
    directory: &dyn DirectoryProvider,
    workspace: &dyn WorkspaceProvider,
    audit: &dyn AuditSink,
    blueprint: &Blueprint,
) -> ReconcileResult<ProvisioningReport> {
    let users = &blueprint.identity.users;
    let mut report = ProvisioningReport {
        total: users.len(),
        ..ProvisioningReport::default()
    };

    for user in users.iter().filter(|u| !u.upn.is_empty()) {
        if directory.find_user_by_principal(&user.upn).await?.is_none() {
            report.missing_in_directory.push(user.upn.clone());
        }
    }
    for group in planned_groups(blueprint) {
        if directory.find_group_by_name(&group.name).await?.is_none() {
            report.missing_groups.push(group.name);
        }
    }

    let by_email = workspace_users_by_email(workspace).await?;
    let (matched, missing) = match_workspace_users(store, audit, users, &by_email)?;
    report.matched = matched;
    report.missing_in_workspace = missing;

    tracing::info!(
        total = report.total,
        matched = report.matched,
        missing_in_directory = report.missing_in_directory.len(),
        missing_groups = report.missing_groups.len(),
        "provisioning verified"
    );
    Ok(report)
}

fn record_directory_id(store: &StateStore, user: &IdentityUser, object_id: &str) -> ReconcileResult<()> {
    store.upsert_identity(
        &user.synth_user_id,
        &IdentityUpdate {
            entra_object_id: Some(object_id.to_string()),
            email: (!user.email.is_empty()).then(|| user.email.clone()),
            ..IdentityUpdate::default()
        },
    )?;
    Ok(())
}

fn new_directory_user(user: &IdentityUser) -> NewDirectoryUser {
    let mail_nickname = user.upn.split('@').next().unwrap_or(&user.upn).to_string();
    NewDirectoryUser {
        display_name: user.display_name.clone(),
        given_name: user.given_name.clone(),
        surname: user.surname.clone(),
        user_principal_name: user.upn.clone(),
        mail_nickname,
        department: non_empty(&user.department),
        job_title: non_empty(&user.job_title),
        office_location: non_empty(&user.office_location),
        password: random_password(&mut rand::thread_rng()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Initial password meeting directory complexity rules.
fn random_password(rng: &mut impl Rng) -> String {
    let token: String = rng
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("Aa{token}1!")
}

fn already_member(err: &ProviderError) -> bool {
    err.is_status(400) || err.is_status(409)
}

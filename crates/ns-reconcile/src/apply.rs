use std::fmt;
use std::str::FromStr;

use ns_blueprint::{
    Blueprint, BlockSpec, CommentSpec, DatabaseSpec, EntityKind, PageSpec, ParentKind, RootSpec,
    RowSpec, SpecHash, pages_in_dependency_order, validate,
};
use ns_state::{ObjectRecord, ObjectUpsert};
use serde::Serialize;
use serde_json::Value;

use crate::Reconciler;
use crate::audit::{AuditAction, AuditEntry};
use crate::error::{ReconcileError, ReconcileResult};
use crate::payload::{
    block_payload, comment_payload, database_patch, database_payload, page_payload,
    page_spec_hash, page_title_patch, row_patch, row_payload, row_properties,
    segments_to_rich_text,
};
use crate::resolver::{PlaceholderResolver, ResolveMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    #[default]
    Apply,
    /// Compute outcomes without calling the workspace.
    Plan,
}

impl ApplyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyMode::Apply => "apply",
            ApplyMode::Plan => "plan",
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplyMode {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" => Ok(ApplyMode::Apply),
            "plan" => Ok(ApplyMode::Plan),
            other => Err(ReconcileError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Remote id of the existing page every root hangs under.
    pub root_page_id: String,
    pub mode: ApplyMode,
    /// Record entity failures in the report instead of aborting the pass.
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFailure {
    pub kind: EntityKind,
    pub synth_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Pages whose content was rewritten by the link-resolution pass.
    pub relinked: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EntityFailure>,
}

impl ApplyReport {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created | Outcome::PlannedCreate => self.created += 1,
            Outcome::Updated | Outcome::PlannedUpdate => self.updated += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Skipped,
    PlannedCreate,
    PlannedUpdate,
}

/// What the store says about an entity relative to its fresh hash.
enum Existing {
    Unchanged,
    Changed(ObjectRecord),
    Missing,
}

impl Existing {
    fn classify(record: Option<ObjectRecord>, hash: &SpecHash) -> Self {
        match record {
            Some(record) if record.spec_hash == hash.to_hex() => Existing::Unchanged,
            Some(record) => Existing::Changed(record),
            None => Existing::Missing,
        }
    }
}

impl Reconciler<'_> {
    /// Converge the workspace toward `blueprint`.
    ///
    /// Roots, databases, pages, rows and comments are processed in that
    /// order. In apply mode a final pass rewrites pages whose placeholders
    /// could not be resolved on first sight.
    pub async fn apply(
        &self,
        blueprint: &Blueprint,
        options: &ApplyOptions,
    ) -> ReconcileResult<ApplyReport> {
        validate(blueprint)?;
        let pages = pages_in_dependency_order(blueprint)?;
        let plan = &blueprint.plan;
        let mut report = ApplyReport::default();
        let mut pending_links: Vec<&PageSpec> = Vec::new();

        for root in &plan.roots {
            let result = self.apply_root(root, options).await;
            self.settle(&mut report, EntityKind::Page, &root.synth_id, result, options)?;
        }
        for database in &plan.databases {
            let result = self.apply_database(database, options).await;
            self.settle(&mut report, EntityKind::Database, &database.synth_id, result, options)?;
        }
        for page in pages {
            let result = self.apply_page(page, options).await.map(|(outcome, unresolved)| {
                if unresolved {
                    pending_links.push(page);
                }
                outcome
            });
            self.settle(&mut report, EntityKind::Page, &page.synth_id, result, options)?;
        }
        for row in &plan.rows {
            let result = self.apply_row(row, options).await;
            self.settle(&mut report, EntityKind::Row, &row.synth_id, result, options)?;
        }
        for comment in &plan.comments {
            let result = self.apply_comment(comment, options).await;
            self.settle(&mut report, EntityKind::Comment, &comment.synth_id, result, options)?;
        }

        if options.mode == ApplyMode::Apply && !pending_links.is_empty() {
            tracing::debug!(pages = pending_links.len(), "running link-resolution pass");
            for page in pending_links {
                match self.relink_page(page).await {
                    Ok(true) => report.relinked += 1,
                    Ok(false) => {}
                    Err(err) => {
                        self.settle(&mut report, EntityKind::Page, &page.synth_id, Err(err), options)?
                    }
                }
            }
        }

        tracing::info!(
            mode = %options.mode,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            relinked = report.relinked,
            failed = report.failures.len(),
            "apply finished"
        );
        Ok(report)
    }

    fn settle(
        &self,
        report: &mut ApplyReport,
        kind: EntityKind,
        synth_id: &str,
        result: ReconcileResult<Outcome>,
        options: &ApplyOptions,
    ) -> ReconcileResult<()> {
        match result {
            Ok(outcome) => {
                tracing::debug!(%kind, synth_id, ?outcome, "entity reconciled");
                report.tally(outcome);
                Ok(())
            }
            Err(err) if options.continue_on_error && err.is_entity_scoped() => {
                tracing::warn!(%kind, synth_id, error = %err, "entity failed, continuing");
                report.failures.push(EntityFailure {
                    kind,
                    synth_id: synth_id.to_string(),
                    error: err.to_string(),
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn planned(
        &self,
        kind: EntityKind,
        synth_id: &str,
        existing: Option<&ObjectRecord>,
    ) -> ReconcileResult<Outcome> {
        let (action, outcome) = match existing {
            Some(_) => (AuditAction::PlanUpdate, Outcome::PlannedUpdate),
            None => (AuditAction::PlanCreate, Outcome::PlannedCreate),
        };
        let remote_id = existing.map(|record| record.remote_id.as_str());
        self.audit
            .record(&AuditEntry::new(action, Some(kind), synth_id, remote_id))?;
        Ok(outcome)
    }

    /// Persist the remote id and hash, then audit the action.
    pub(crate) fn commit(
        &self,
        action: AuditAction,
        kind: EntityKind,
        synth_id: &str,
        remote_id: &str,
        parent_synth_id: Option<&str>,
        hash: &SpecHash,
    ) -> ReconcileResult<()> {
        self.store.upsert_object(&ObjectUpsert {
            synth_id,
            kind,
            provider: self.workspace.name(),
            remote_id,
            parent_synth_id,
            spec_hash: &hash.to_hex(),
        })?;
        self.audit
            .record(&AuditEntry::new(action, Some(kind), synth_id, Some(remote_id)))
    }

    /// Remote id of a database or page parent. `None` only in plan mode when
    /// the parent has not been created yet.
    fn parent_remote_id(
        &self,
        kind: EntityKind,
        synth_id: &str,
        parent_type: ParentKind,
        parent_synth_id: &str,
        options: &ApplyOptions,
    ) -> ReconcileResult<Option<String>> {
        if parent_type == ParentKind::Root {
            return Ok(Some(options.root_page_id.clone()));
        }
        match self.store.remote_id_of(parent_synth_id)? {
            Some(remote_id) => Ok(Some(remote_id)),
            None if options.mode == ApplyMode::Plan => Ok(None),
            None => Err(ReconcileError::ParentNotFound {
                kind,
                synth_id: synth_id.to_string(),
                parent: parent_synth_id.to_string(),
            }),
        }
    }

    /// Container that must exist before a row or comment can be created.
    fn container_remote_id(
        &self,
        kind: EntityKind,
        synth_id: &str,
        container_synth_id: &str,
        options: &ApplyOptions,
    ) -> ReconcileResult<Option<String>> {
        self.parent_remote_id(kind, synth_id, ParentKind::Page, container_synth_id, options)
    }

    pub(crate) fn resolve_blocks(
        &self,
        blocks: &[BlockSpec],
        mode: ResolveMode,
    ) -> ReconcileResult<(Vec<Value>, bool)> {
        let resolver = PlaceholderResolver::new(self.store);
        let mut unresolved = false;
        let mut payloads = Vec::with_capacity(blocks.len());
        for block in blocks {
            let resolution = resolver.resolve(block.text.as_deref().unwrap_or_default(), mode)?;
            unresolved |= resolution.unresolved;
            payloads.push(block_payload(block, segments_to_rich_text(&resolution.segments)));
        }
        Ok((payloads, unresolved))
    }

    async fn apply_root(&self, root: &RootSpec, options: &ApplyOptions) -> ReconcileResult<Outcome> {
        let kind = EntityKind::Page;
        let hash = page_spec_hash(&root.title, &[])?;
        let existing = Existing::classify(self.store.get_object(&root.synth_id)?, &hash);
        if options.mode == ApplyMode::Plan {
            return match existing {
                Existing::Unchanged => Ok(Outcome::Skipped),
                Existing::Changed(record) => self.planned(kind, &root.synth_id, Some(&record)),
                Existing::Missing => self.planned(kind, &root.synth_id, None),
            };
        }
        match existing {
            Existing::Unchanged => Ok(Outcome::Skipped),
            Existing::Changed(record) => {
                let remote_id = self
                    .workspace
                    .update_object(kind, &record.remote_id, &page_title_patch(&root.title))
                    .await
                    .map_err(|e| ReconcileError::entity(kind, &root.synth_id, e))?;
                self.commit(AuditAction::Updated, kind, &root.synth_id, &remote_id, None, &hash)?;
                Ok(Outcome::Updated)
            }
            Existing::Missing => {
                let payload = page_payload(&options.root_page_id, &root.title, &[]);
                let remote_id = self
                    .workspace
                    .create_object(kind, &payload)
                    .await
                    .map_err(|e| ReconcileError::entity(kind, &root.synth_id, e))?;
                self.commit(AuditAction::Created, kind, &root.synth_id, &remote_id, None, &hash)?;
                Ok(Outcome::Created)
            }
        }
    }

    async fn apply_database(
        &self,
        database: &DatabaseSpec,
        options: &ApplyOptions,
    ) -> ReconcileResult<Outcome> {
        let kind = EntityKind::Database;
        let synth_id = database.synth_id.as_str();
        let parent = self.parent_remote_id(
            kind,
            synth_id,
            database.parent_type,
            &database.parent_synth_id,
            options,
        )?;
        let Some(parent_id) = parent else {
            let record = self.store.get_object(synth_id)?;
            return self.planned(kind, synth_id, record.as_ref());
        };
        let payload = database_payload(&parent_id, database);
        let hash = SpecHash::of_json(&payload)?;
        let existing = Existing::classify(self.store.get_object(synth_id)?, &hash);
        let parent_synth_id = stored_parent(database.parent_type, &database.parent_synth_id);

        match existing {
            Existing::Unchanged => Ok(Outcome::Skipped),
            Existing::Changed(record) if options.mode == ApplyMode::Plan => {
                self.planned(kind, synth_id, Some(&record))
            }
            Existing::Missing if options.mode == ApplyMode::Plan => {
                self.planned(kind, synth_id, None)
            }
            Existing::Changed(record) => {
                let remote_id = self
                    .workspace
                    .update_object(kind, &record.remote_id, &database_patch(database))
                    .await
                    .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
                self.commit(AuditAction::Updated, kind, synth_id, &remote_id, parent_synth_id, &hash)?;
                Ok(Outcome::Updated)
            }
            Existing::Missing => {
                let remote_id = self
                    .workspace
                    .create_object(kind, &payload)
                    .await
                    .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
                self.commit(AuditAction::Created, kind, synth_id, &remote_id, parent_synth_id, &hash)?;
                Ok(Outcome::Created)
            }
        }
    }

    /// Returns the outcome and whether any placeholder stayed unresolved.
    async fn apply_page(
        &self,
        page: &PageSpec,
        options: &ApplyOptions,
    ) -> ReconcileResult<(Outcome, bool)> {
        let kind = EntityKind::Page;
        let synth_id = page.synth_id.as_str();
        let (blocks, unresolved) = self.resolve_blocks(&page.blocks, ResolveMode::Normal)?;
        let hash = page_spec_hash(&page.title, &blocks)?;
        let existing = Existing::classify(self.store.get_object(synth_id)?, &hash);

        if let Existing::Unchanged = existing {
            return Ok((Outcome::Skipped, unresolved));
        }
        if options.mode == ApplyMode::Plan {
            let outcome = match &existing {
                Existing::Changed(record) => self.planned(kind, synth_id, Some(record))?,
                _ => self.planned(kind, synth_id, None)?,
            };
            return Ok((outcome, unresolved));
        }

        let parent_synth_id = stored_parent(page.parent_type, &page.parent_synth_id);

        let outcome = if let Existing::Changed(record) = existing {
            let remote_id = self
                .workspace
                .update_object(kind, &record.remote_id, &page_title_patch(&page.title))
                .await
                .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
            self.workspace
                .replace_blocks(&remote_id, &blocks)
                .await
                .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
            self.commit(AuditAction::Updated, kind, synth_id, &remote_id, parent_synth_id, &hash)?;
            Outcome::Updated
        } else {
            let parent_id = self
                .parent_remote_id(kind, synth_id, page.parent_type, &page.parent_synth_id, options)?
                .unwrap_or_default();
            let payload = page_payload(&parent_id, &page.title, &blocks);
            let remote_id = self
                .workspace
                .create_object(kind, &payload)
                .await
                .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
            self.commit(AuditAction::Created, kind, synth_id, &remote_id, parent_synth_id, &hash)?;
            Outcome::Created
        };
        Ok((outcome, unresolved))
    }

    async fn apply_row(&self, row: &RowSpec, options: &ApplyOptions) -> ReconcileResult<Outcome> {
        let kind = EntityKind::Row;
        let synth_id = row.synth_id.as_str();
        let Some(database_id) =
            self.container_remote_id(kind, synth_id, &row.database_synth_id, options)?
        else {
            let record = self.store.get_object(synth_id)?;
            return self.planned(kind, synth_id, record.as_ref());
        };
        let properties = row_properties(&row.properties, self.store)?;
        let payload = row_payload(&database_id, &properties);
        let hash = SpecHash::of_json(&payload)?;
        let existing = Existing::classify(self.store.get_object(synth_id)?, &hash);
        let parent = Some(row.database_synth_id.as_str());

        match existing {
            Existing::Unchanged => Ok(Outcome::Skipped),
            Existing::Changed(record) if options.mode == ApplyMode::Plan => {
                self.planned(kind, synth_id, Some(&record))
            }
            Existing::Missing if options.mode == ApplyMode::Plan => {
                self.planned(kind, synth_id, None)
            }
            Existing::Changed(record) => {
                let remote_id = self
                    .workspace
                    .update_object(kind, &record.remote_id, &row_patch(&properties))
                    .await
                    .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
                self.commit(AuditAction::Updated, kind, synth_id, &remote_id, parent, &hash)?;
                Ok(Outcome::Updated)
            }
            Existing::Missing => {
                let remote_id = self
                    .workspace
                    .create_object(kind, &payload)
                    .await
                    .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
                self.commit(AuditAction::Created, kind, synth_id, &remote_id, parent, &hash)?;
                Ok(Outcome::Created)
            }
        }
    }

    /// Comments cannot be edited remotely; a changed comment is posted again
    /// and the record points at the new remote comment.
    async fn apply_comment(
        &self,
        comment: &CommentSpec,
        options: &ApplyOptions,
    ) -> ReconcileResult<Outcome> {
        let kind = EntityKind::Comment;
        let synth_id = comment.synth_id.as_str();
        let Some(page_id) =
            self.container_remote_id(kind, synth_id, &comment.page_synth_id, options)?
        else {
            let record = self.store.get_object(synth_id)?;
            return self.planned(kind, synth_id, record.as_ref());
        };
        let resolution =
            PlaceholderResolver::new(self.store).resolve(&comment.body, ResolveMode::Normal)?;
        let payload = comment_payload(&page_id, segments_to_rich_text(&resolution.segments));
        let hash = SpecHash::of_json(&payload)?;
        let existing = Existing::classify(self.store.get_object(synth_id)?, &hash);

        let (action, outcome) = match existing {
            Existing::Unchanged => return Ok(Outcome::Skipped),
            Existing::Changed(record) if options.mode == ApplyMode::Plan => {
                return self.planned(kind, synth_id, Some(&record));
            }
            Existing::Missing if options.mode == ApplyMode::Plan => {
                return self.planned(kind, synth_id, None);
            }
            Existing::Changed(_) => (AuditAction::Updated, Outcome::Updated),
            Existing::Missing => (AuditAction::Created, Outcome::Created),
        };
        let remote_id = self
            .workspace
            .create_object(kind, &payload)
            .await
            .map_err(|e| ReconcileError::entity(kind, synth_id, e))?;
        self.commit(action, kind, synth_id, &remote_id, Some(&comment.page_synth_id), &hash)?;
        Ok(outcome)
    }

    /// Rewrite a page's blocks with forced resolution. Returns whether the
    /// content changed.
    async fn relink_page(&self, page: &PageSpec) -> ReconcileResult<bool> {
        let kind = EntityKind::Page;
        let Some(record) = self.store.get_object(&page.synth_id)? else {
            return Ok(false);
        };
        let (blocks, _) = self.resolve_blocks(&page.blocks, ResolveMode::Force)?;
        let hash = page_spec_hash(&page.title, &blocks)?;
        if record.spec_hash == hash.to_hex() {
            return Ok(false);
        }
        self.workspace
            .replace_blocks(&record.remote_id, &blocks)
            .await
            .map_err(|e| ReconcileError::entity(kind, &page.synth_id, e))?;
        self.commit(
            AuditAction::Relinked,
            kind,
            &page.synth_id,
            &record.remote_id,
            record.parent_synth_id.as_deref(),
            &hash,
        )?;
        Ok(true)
    }
}

/// Root-anchored entities have no parent record.
fn stored_parent(parent_type: ParentKind, parent_synth_id: &str) -> Option<&str> {
    match parent_type {
        ParentKind::Root => None,
        ParentKind::Page => Some(parent_synth_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_known_names() {
        assert_eq!("apply".parse::<ApplyMode>().expect("apply"), ApplyMode::Apply);
        assert_eq!("plan".parse::<ApplyMode>().expect("plan"), ApplyMode::Plan);
        assert!(matches!(
            "destroy".parse::<ApplyMode>(),
            Err(ReconcileError::InvalidMode(mode)) if mode == "destroy"
        ));
    }

    #[test]
    fn report_tallies_planned_outcomes_as_their_counterparts() {
        let mut report = ApplyReport::default();
        for outcome in [
            Outcome::Created,
            Outcome::PlannedCreate,
            Outcome::Updated,
            Outcome::PlannedUpdate,
            Outcome::Skipped,
        ] {
            report.tally(outcome);
        }
        assert_eq!((report.created, report.updated, report.skipped), (2, 2, 1));
    }
}

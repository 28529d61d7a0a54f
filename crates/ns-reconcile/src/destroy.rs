use std::collections::{HashMap, HashSet};

use ns_blueprint::EntityKind;
use serde::Serialize;

use crate::Reconciler;
use crate::apply::EntityFailure;
use crate::audit::{AuditAction, AuditEntry};
use crate::error::{ReconcileError, ReconcileResult};

/// Kinds archived by destroy, in order. Comments go away with their page.
const DESTROY_ORDER: [EntityKind; 3] = [EntityKind::Page, EntityKind::Database, EntityKind::Row];

#[derive(Debug, Clone, Default)]
pub struct DestroyOptions {
    /// Keep archiving after a failure and report it instead of aborting.
    pub continue_on_error: bool,
    /// Delete the store records of archived objects.
    pub forget: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DestroyReport {
    /// Distinct remote objects archived.
    pub archived: usize,
    pub forgotten: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EntityFailure>,
}

impl Reconciler<'_> {
    /// Archive every tracked remote object exactly once.
    pub async fn destroy(&self, options: &DestroyOptions) -> ReconcileResult<DestroyReport> {
        let mut report = DestroyReport::default();
        // remote id -> archived successfully
        let mut attempted: HashMap<String, bool> = HashMap::new();
        let mut forgotten_pages: HashSet<String> = HashSet::new();

        for kind in DESTROY_ORDER {
            for record in self.store.list_objects_by_kind(kind)? {
                let archived = match attempted.get(&record.remote_id) {
                    Some(archived) => *archived,
                    None => {
                        let result = self.workspace.archive_object(kind, &record.remote_id).await;
                        match result {
                            Ok(()) => {
                                self.audit.record(&AuditEntry::new(
                                    AuditAction::Archived,
                                    Some(kind),
                                    &record.synth_id,
                                    Some(&record.remote_id),
                                ))?;
                                report.archived += 1;
                                attempted.insert(record.remote_id.clone(), true);
                                true
                            }
                            Err(source) if options.continue_on_error => {
                                let err = ReconcileError::entity(kind, &record.synth_id, source);
                                tracing::warn!(%kind, synth_id = %record.synth_id, error = %err, "archive failed, continuing");
                                report.failures.push(EntityFailure {
                                    kind,
                                    synth_id: record.synth_id.clone(),
                                    error: err.to_string(),
                                });
                                attempted.insert(record.remote_id.clone(), false);
                                false
                            }
                            Err(source) => {
                                return Err(ReconcileError::entity(kind, &record.synth_id, source));
                            }
                        }
                    }
                };

                if archived && options.forget {
                    self.forget(&record.synth_id, kind, &record.remote_id, &mut report)?;
                    if kind == EntityKind::Page {
                        forgotten_pages.insert(record.synth_id.clone());
                    }
                }
            }
        }

        if options.forget {
            for comment in self.store.list_objects_by_kind(EntityKind::Comment)? {
                let orphaned = comment
                    .parent_synth_id
                    .as_deref()
                    .is_some_and(|page| forgotten_pages.contains(page));
                if orphaned {
                    self.forget(&comment.synth_id, EntityKind::Comment, &comment.remote_id, &mut report)?;
                }
            }
        }

        tracing::info!(
            archived = report.archived,
            forgotten = report.forgotten,
            failed = report.failures.len(),
            "destroy finished"
        );
        Ok(report)
    }

    fn forget(
        &self,
        synth_id: &str,
        kind: EntityKind,
        remote_id: &str,
        report: &mut DestroyReport,
    ) -> ReconcileResult<()> {
        if self.store.delete_object(synth_id)? {
            report.forgotten += 1;
            self.audit.record(&AuditEntry::new(
                AuditAction::Forgotten,
                Some(kind),
                synth_id,
                Some(remote_id),
            ))?;
        }
        Ok(())
    }
}

//! Blueprint reconciliation: converge a remote workspace toward a blueprint,
//! archive what was created, replay scheduled activity, and provision the
//! identities that placeholders and people properties point at.
//!
//! Every engine works through an explicit [`Reconciler`] holding the state
//! store, the workspace provider and the audit sink.

pub mod activity;
pub mod apply;
pub mod audit;
pub mod destroy;
mod error;
pub mod identity;
pub mod payload;
pub mod resolver;

pub use activity::{ActivityOptions, ActivityReport, TickReport};
pub use apply::{ApplyMode, ApplyOptions, ApplyReport, EntityFailure};
pub use audit::{AuditAction, AuditEntry, AuditSink, JsonlAuditLog, MemoryAudit, redact_value};
pub use destroy::{DestroyOptions, DestroyReport};
pub use error::{ReconcileError, ReconcileResult};
pub use identity::{
    ProvisionMode, ProvisionOptions, ProvisionReport, ProvisioningReport, VerifyUsersReport,
    provision_identity, verify_provisioning, verify_users,
};
pub use resolver::{PlaceholderResolver, Resolution, ResolveMode, Segment};

use ns_provider::WorkspaceProvider;
use ns_state::StateStore;

/// Handles shared by the apply, destroy and activity engines.
#[derive(Clone, Copy)]
pub struct Reconciler<'a> {
    store: &'a StateStore,
    workspace: &'a dyn WorkspaceProvider,
    audit: &'a dyn AuditSink,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a StateStore,
        workspace: &'a dyn WorkspaceProvider,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            store,
            workspace,
            audit,
        }
    }

    pub fn store(&self) -> &'a StateStore {
        self.store
    }
}

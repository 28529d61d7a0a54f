use std::path::PathBuf;

use ns_blueprint::{BlueprintError, EntityKind};
use ns_provider::ProviderError;
use ns_state::StateError;
use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Blueprint(#[from] BlueprintError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{kind} '{synth_id}' failed: {source}")]
    Entity {
        kind: EntityKind,
        synth_id: String,
        #[source]
        source: ProviderError,
    },
    #[error("parent synth id not found for {kind} '{synth_id}': {parent}")]
    ParentNotFound {
        kind: EntityKind,
        synth_id: String,
        parent: String,
    },
    #[error("invalid mode '{0}'")]
    InvalidMode(String),
    #[error("user '{0}' has no principal name; directory provisioning needs one")]
    MissingPrincipalName(String),
    #[error("audit log {path:?}: {source}")]
    Audit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("hash encoding failed: {0}")]
    Hash(#[from] serde_json::Error),
}

impl ReconcileError {
    pub(crate) fn entity(kind: EntityKind, synth_id: &str, source: ProviderError) -> Self {
        ReconcileError::Entity {
            kind,
            synth_id: synth_id.to_string(),
            source,
        }
    }

    /// Failures scoped to one entity; the rest of the pass may continue.
    pub fn is_entity_scoped(&self) -> bool {
        matches!(
            self,
            ReconcileError::Entity { .. } | ReconcileError::ParentNotFound { .. }
        )
    }
}

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Structural problems with a blueprint document. All of these are fatal and
/// are raised before any remote call is made.
#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("blueprint JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported blueprint format_version {found} (expected {expected})")]
    UnsupportedFormatVersion { found: u32, expected: u32 },
    #[error("duplicate synthetic id '{0}'")]
    DuplicateSynthId(String),
    #[error("duplicate activity event id '{0}'")]
    DuplicateEventId(String),
    #[error("{kind} '{synth_id}' references unknown parent '{parent}'")]
    UnresolvedParent {
        kind: &'static str,
        synth_id: String,
        parent: String,
    },
    #[error("database '{synth_id}' has page parent '{parent}' which is not a root")]
    DatabaseParentNotRoot { synth_id: String, parent: String },
    #[error("page '{0}' is part of a parent cycle")]
    ParentCycle(String),
    #[error("invalid {field} '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> BlueprintError {
    BlueprintError::Io {
        path: path.into(),
        source: err,
    }
}

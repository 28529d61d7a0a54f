//! Durable reconciliation state: synthetic id to remote id mappings with their
//! spec hashes, the identity map, the run ledger and the activity ledger.
//!
//! Every mutation commits immediately, so an interrupted run leaves the store
//! valid and a rerun resumes from whatever already converged.

mod records;
mod store;

pub use records::{
    IdentityRecord, IdentityUpdate, ObjectRecord, ObjectUpsert, RunRecord, RunStatus,
};
pub use store::StateStore;

use std::path::PathBuf;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("state store lock poisoned")]
    Poisoned,
    #[error("unknown run '{0}'")]
    UnknownRun(String),
}

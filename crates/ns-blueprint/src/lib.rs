//! Blueprint data model: the immutable, versioned plan of synthetic workspace
//! entities, plus the canonical hashing used to detect no-op reapplication.

pub mod activity;
mod error;
pub mod hash;
mod model;
pub mod validate;

pub use activity::{ActivityAction, ActivityEvent, ActivityKind, parse_timestamp};
pub use error::BlueprintError;
pub use hash::{SpecHash, to_canonical_json};
pub use model::*;
pub use validate::{pages_in_dependency_order, validate};

use std::path::Path;

impl Blueprint {
    /// Decode and validate a blueprint document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, BlueprintError> {
        let blueprint: Blueprint = serde_json::from_slice(bytes)?;
        validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Hash of the whole document, recorded in the run ledger.
    pub fn content_hash(&self) -> Result<SpecHash, BlueprintError> {
        Ok(SpecHash::of_json(self)?)
    }
}

/// Read, decode and validate a blueprint file.
pub fn load_blueprint(path: impl AsRef<Path>) -> Result<Blueprint, BlueprintError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| error::io_error(path, e))?;
    Blueprint::from_json_slice(&bytes)
}

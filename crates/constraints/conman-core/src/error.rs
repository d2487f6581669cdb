//! Error type shared by every engine operation.

use thiserror::Error;

use crate::ids::StableId;
use crate::record::RecordKey;
use crate::scene::SceneError;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConManError {
    /// Creation needs at least one driver followed by the target.
    #[error("select two or more objects to constrain (got {found})")]
    InsufficientSelection { found: usize },

    #[error("{node} is a '{node_type}' node; only parent, point, orient and scale constraints are supported")]
    UnsupportedNodeKind { node: StableId, node_type: String },

    #[error("constraint {node} drives more than one object: {found:?}")]
    AmbiguousTarget { node: StableId, found: Vec<StableId> },

    #[error("constraint {node} does not drive any object")]
    UnconstrainedNode { node: StableId },

    #[error("constraint {key} refers to an entity that no longer exists: {missing}")]
    StaleRecord { key: RecordKey, missing: StableId },

    #[error("driver index {index} out of range for constraint {key} with {count} driver(s)")]
    InvalidDriverIndex {
        key: RecordKey,
        index: usize,
        count: usize,
    },

    #[error("{host} {version} is unsupported; version {required} or newer with stable ids is required")]
    UnsupportedHostVersion {
        host: String,
        version: u32,
        required: u32,
    },

    #[error("stored constraint data could not be decoded: {reason}")]
    PersistenceDecodeFailure { reason: String },

    #[error("constraint data could not be encoded: {reason}")]
    PersistenceEncodeFailure { reason: String },

    #[error("constraint {key} is not tracked")]
    NotTracked { key: RecordKey },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

pub type Result<T> = std::result::Result<T, ConManError>;

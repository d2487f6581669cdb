//! conman-core: constraint-relationship tracking and weight switching (host-agnostic)
//!
//! Tracks multi-driver constraint relationships on a host scene by stable id,
//! reconciles them against the live scene, switches driver weights with
//! optional pose preservation and timeline history, and persists the tracked
//! set into a document metadata slot. All host access goes through the
//! [`Scene`] trait; adapters implement it on top of the host API.

pub mod config;
pub mod error;
pub mod factory;
pub mod history;
pub mod ids;
pub mod manager;
pub mod persist;
pub mod record;
pub mod registry;
pub mod scene;
pub mod switch;

// Re-exports for consumers (adapters)
pub use config::{AxisMask, Config, CreateOptions, SwitchOptions};
pub use error::{ConManError, Result};
pub use history::{HistoryRecorder, HistorySample, PriorValue};
pub use ids::{EntityRef, StableId};
pub use manager::ConstraintManager;
pub use persist::Persisted;
pub use record::{ConstraintKind, ConstraintRecord, NodeClass, RecordKey};
pub use registry::{ListEntry, Registry};
pub use scene::{
    AttrRef, Axis, ConnectionRole, Downstream, HostInfo, Matrix, RelationshipSpec, Scene,
    SceneError, SceneResult,
};
pub use switch::{apply_switch, plan_weights, SwitchMode, SwitchReport, SwitchRequest};

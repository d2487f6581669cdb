//! Scene collaborator contract.
//!
//! The engine never touches host data directly. Adapters implement [`Scene`]
//! on top of the host API (create/delete relationship nodes, transforms,
//! animation curves, document metadata) and pass it into every engine call.
//! Live handles are never cached across calls; everything is re-resolved by
//! stable id immediately before use.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::ids::StableId;
use crate::record::ConstraintKind;

/// Column-major 4x4 world matrix, as reported by the host.
pub type Matrix = [f64; 16];

pub const IDENTITY: Matrix = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Build a pure translation matrix.
pub fn translation(t: [f64; 3]) -> Matrix {
    let mut m = IDENTITY;
    m[12] = t[0];
    m[13] = t[1];
    m[14] = t[2];
    m
}

/// Component-wise comparison within `tolerance`.
pub fn poses_match(a: &Matrix, b: &Matrix, tolerance: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tolerance)
}

/// Host identity and capabilities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub name: String,
    pub version: u32,
    /// Whether entity ids survive a save/reload cycle.
    pub stable_ids: bool,
}

/// Address of one scalar, animatable attribute on an entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttrRef {
    pub entity: StableId,
    pub name: String,
}

impl AttrRef {
    pub fn new(entity: StableId, name: impl Into<String>) -> Self {
        Self {
            entity,
            name: name.into(),
        }
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

/// Everything the host needs to build one relationship node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub kind: ConstraintKind,
    pub maintain_offset: bool,
    /// Numeric offset; `None` for `Parent`, which only stores per-driver offsets.
    pub offset: Option<[f64; 3]>,
    pub skip_translate: Vec<Axis>,
    pub skip_rotate: Vec<Axis>,
    pub skip_scale: Vec<Axis>,
    pub weight: f64,
}

/// How a relationship node's output reaches a downstream entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionRole {
    /// Output plugs straight into the entity's channels.
    Direct,
    /// Output is routed through an intermediate blend node that feeds the entity.
    ThroughBlend,
    /// The node's own weight attributes driven back from an entity; never a target.
    WeightFeedback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downstream {
    pub entity: StableId,
    pub role: ConnectionRole,
}

/// Failures reported by a collaborator implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("entity not found: {0}")]
    EntityNotFound(StableId),
    #[error("attribute not found: {0}")]
    AttributeNotFound(String),
    #[error("host rejected operation: {0}")]
    Rejected(String),
}

pub type SceneResult<T> = std::result::Result<T, SceneError>;

/// Narrow interface onto the host scene graph, animation curves and document metadata.
pub trait Scene {
    fn host_info(&self) -> HostInfo;

    /// Current display name for a live entity, `None` when the id is stale.
    fn resolve(&self, id: &StableId) -> Option<String>;

    /// Current host selection, in selection order.
    fn selection(&self) -> Vec<StableId>;

    /// Host type name of an entity (e.g. `"parentConstraint"`).
    fn node_type(&self, id: &StableId) -> SceneResult<String>;

    /// Entities fed by a relationship node's outputs.
    fn downstream(&self, node: &StableId) -> SceneResult<Vec<Downstream>>;

    /// Ordered driver list of a relationship node.
    fn target_list(&self, node: &StableId) -> SceneResult<Vec<StableId>>;

    fn create_relationship(
        &mut self,
        spec: &RelationshipSpec,
        drivers: &[StableId],
        target: &StableId,
    ) -> SceneResult<StableId>;

    fn delete(&mut self, id: &StableId) -> SceneResult<()>;

    fn world_transform(&self, id: &StableId) -> SceneResult<Matrix>;

    fn set_world_transform(&mut self, id: &StableId, m: &Matrix) -> SceneResult<()>;

    /// Recompute the node's stored offsets so the active drivers reproduce the
    /// target's current world pose.
    fn recompute_offset(&mut self, node: &StableId, drivers: &[StableId]) -> SceneResult<()>;

    /// Weight attribute for the driver at `index`.
    fn weight_attr(&self, node: &StableId, index: usize) -> SceneResult<AttrRef>;

    /// Blend control, present only when the relationship is layered beneath free animation.
    fn blend_control(&self, node: &StableId) -> SceneResult<Option<AttrRef>>;

    /// Offset attributes recomputed by [`Scene::recompute_offset`].
    fn offset_attrs(&self, node: &StableId) -> SceneResult<Vec<AttrRef>>;

    /// Target channels currently driven through the node (directly or via a blend node).
    fn driven_channels(&self, node: &StableId) -> SceneResult<Vec<AttrRef>>;

    fn get_attr(&self, attr: &AttrRef) -> SceneResult<f64>;

    fn set_attr(&mut self, attr: &AttrRef, value: f64) -> SceneResult<()>;

    /// Value of the nearest animation sample strictly before `position`, if any.
    fn sample_before(&self, attr: &AttrRef, position: f64) -> SceneResult<Option<f64>>;

    fn write_sample(&mut self, attr: &AttrRef, position: f64, value: f64) -> SceneResult<()>;

    fn current_position(&self) -> f64;

    fn read_metadata(&self, key: &str) -> Option<String>;

    fn write_metadata(&mut self, key: &str, value: &str);

    fn remove_metadata(&mut self, key: &str);

    fn get_weight(&self, node: &StableId, index: usize) -> SceneResult<f64> {
        let attr = self.weight_attr(node, index)?;
        self.get_attr(&attr)
    }

    fn set_weight(&mut self, node: &StableId, index: usize, value: f64) -> SceneResult<()> {
        let attr = self.weight_attr(node, index)?;
        self.set_attr(&attr, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_places_components_in_last_column() {
        let m = translation([1.0, 2.0, 3.0]);
        assert_eq!(&m[12..15], &[1.0, 2.0, 3.0]);
        assert!(poses_match(&m, &m, 0.0));
        assert!(!poses_match(&m, &IDENTITY, 1e-6));
    }

    #[test]
    fn attr_display() {
        let a = AttrRef::new(StableId::new("N1"), "w0");
        assert_eq!(a.to_string(), "N1.w0");
    }
}

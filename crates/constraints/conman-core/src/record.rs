//! Constraint records: one tracked relationship per (target, kind).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{EntityRef, StableId};
use crate::scene::{Scene, SceneResult};

/// The four supported relationship kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintKind {
    Parent,
    Point,
    Orient,
    Scale,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 4] = [
        ConstraintKind::Parent,
        ConstraintKind::Point,
        ConstraintKind::Orient,
        ConstraintKind::Scale,
    ];

    /// Host node type implementing this kind.
    pub fn node_type(self) -> &'static str {
        match self {
            ConstraintKind::Parent => "parentConstraint",
            ConstraintKind::Point => "pointConstraint",
            ConstraintKind::Orient => "orientConstraint",
            ConstraintKind::Scale => "scaleConstraint",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConstraintKind::Parent => "Parent",
            ConstraintKind::Point => "Point",
            ConstraintKind::Orient => "Orient",
            ConstraintKind::Scale => "Scale",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification of an arbitrary host node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeClass {
    Constraint(ConstraintKind),
    Unsupported(String),
}

impl NodeClass {
    pub fn classify(node_type: &str) -> Self {
        match node_type {
            "parentConstraint" => NodeClass::Constraint(ConstraintKind::Parent),
            "pointConstraint" => NodeClass::Constraint(ConstraintKind::Point),
            "orientConstraint" => NodeClass::Constraint(ConstraintKind::Orient),
            "scaleConstraint" => NodeClass::Constraint(ConstraintKind::Scale),
            other => NodeClass::Unsupported(other.to_string()),
        }
    }
}

/// Registry key: one record per target and kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub target: StableId,
    pub kind: ConstraintKind,
}

impl RecordKey {
    pub fn new(target: impl Into<StableId>, kind: ConstraintKind) -> Self {
        Self {
            target: target.into(),
            kind,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target, self.kind)
    }
}

/// One tracked relationship.
///
/// `drivers` order is the index space the host uses for per-driver weight and
/// offset attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub kind: ConstraintKind,
    pub target: EntityRef,
    pub node: EntityRef,
    pub drivers: Vec<EntityRef>,
}

impl ConstraintRecord {
    pub fn new(
        kind: ConstraintKind,
        target: EntityRef,
        node: EntityRef,
        drivers: Vec<EntityRef>,
    ) -> Self {
        Self {
            kind,
            target,
            node,
            drivers,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.target.id.clone(), self.kind)
    }

    pub fn driver_ids(&self) -> Vec<StableId> {
        self.drivers.iter().map(|d| d.id.clone()).collect()
    }

    /// First of target/node that fails to resolve, if any.
    pub fn stale_entity(&self, scene: &dyn Scene) -> Option<StableId> {
        [&self.target, &self.node]
            .into_iter()
            .find(|r| !r.is_live(scene))
            .map(|r| r.id.clone())
    }

    pub fn weight(&self, scene: &dyn Scene, index: usize) -> SceneResult<f64> {
        scene.get_weight(&self.node.id, index)
    }

    pub fn set_weight(&self, scene: &mut dyn Scene, index: usize, value: f64) -> SceneResult<()> {
        scene.set_weight(&self.node.id, index, value)
    }

    /// Current weight of every driver, in driver order.
    pub fn weights(&self, scene: &dyn Scene) -> SceneResult<Vec<f64>> {
        (0..self.drivers.len())
            .map(|i| self.weight(scene, i))
            .collect()
    }

    /// Refresh cached display names from the scene. Stale references keep their old name.
    pub fn refresh_names(&mut self, scene: &dyn Scene) {
        let refs = std::iter::once(&mut self.target)
            .chain(std::iter::once(&mut self.node))
            .chain(self.drivers.iter_mut());
        for r in refs {
            if let Some(name) = scene.resolve(&r.id) {
                r.display_name = name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_closed_set() {
        for kind in ConstraintKind::ALL {
            assert_eq!(NodeClass::classify(kind.node_type()), NodeClass::Constraint(kind));
        }
        assert_eq!(
            NodeClass::classify("aimConstraint"),
            NodeClass::Unsupported("aimConstraint".into())
        );
    }

    #[test]
    fn key_orders_by_target_then_kind() {
        let a = RecordKey::new("A", ConstraintKind::Scale);
        let b = RecordKey::new("A", ConstraintKind::Parent);
        let c = RecordKey::new("B", ConstraintKind::Parent);
        let mut keys = vec![c.clone(), a.clone(), b.clone()];
        keys.sort();
        assert_eq!(keys, vec![b, a, c]);
    }
}

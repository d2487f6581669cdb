//! Building new relationships and adopting existing ones.
//!
//! Both paths resolve everything they need before touching the registry, so a
//! failed create or adopt leaves the registry exactly as it was.

use log::{info, warn};

use crate::config::CreateOptions;
use crate::error::{ConManError, Result};
use crate::ids::{EntityRef, StableId};
use crate::record::{ConstraintKind, ConstraintRecord, NodeClass};
use crate::registry::Registry;
use crate::scene::{ConnectionRole, RelationshipSpec, Scene, SceneError};

/// Route creation options to the channels each kind actually uses.
pub fn relationship_spec(kind: ConstraintKind, opts: &CreateOptions) -> RelationshipSpec {
    let weight = opts.weight.clamp(0.0, 1.0);
    let mut spec = RelationshipSpec {
        kind,
        maintain_offset: opts.maintain_offset,
        offset: Some(opts.offset),
        skip_translate: Vec::new(),
        skip_rotate: Vec::new(),
        skip_scale: Vec::new(),
        weight,
    };
    match kind {
        ConstraintKind::Parent => {
            spec.offset = None;
            spec.skip_translate = opts.translate.skipped();
            spec.skip_rotate = opts.rotate.skipped();
        }
        ConstraintKind::Point => spec.skip_translate = opts.translate.skipped(),
        ConstraintKind::Orient => spec.skip_rotate = opts.rotate.skipped(),
        ConstraintKind::Scale => spec.skip_scale = opts.scale.skipped(),
    }
    spec
}

/// Split a selection into `(drivers, target)`: the last entry is the target.
pub fn split_selection(selection: &[StableId]) -> Result<(&[StableId], &StableId)> {
    match selection.split_last() {
        Some((target, drivers)) if !drivers.is_empty() => Ok((drivers, target)),
        _ => Err(ConManError::InsufficientSelection {
            found: selection.len(),
        }),
    }
}

fn live_ref(scene: &dyn Scene, id: &StableId) -> Result<EntityRef> {
    EntityRef::from_id(id.clone())
        .resolve(scene)
        .ok_or_else(|| SceneError::EntityNotFound(id.clone()).into())
}

/// Build a new relationship from `selection` (drivers..., target) and track it.
pub fn create(
    scene: &mut dyn Scene,
    registry: &mut Registry,
    kind: ConstraintKind,
    selection: &[StableId],
    opts: &CreateOptions,
) -> Result<ConstraintRecord> {
    let (driver_ids, target_id) = split_selection(selection)?;
    let target = live_ref(scene, target_id)?;
    let drivers = driver_ids
        .iter()
        .map(|id| live_ref(scene, id))
        .collect::<Result<Vec<_>>>()?;

    let spec = relationship_spec(kind, opts);
    let node_id = scene.create_relationship(&spec, driver_ids, target_id)?;
    let node = match live_ref(scene, &node_id) {
        Ok(node) => node,
        Err(err) => {
            // the host built a node it cannot resolve; do not leave it behind
            if let Err(cleanup) = scene.delete(&node_id) {
                warn!("could not delete unresolvable constraint node {node_id}: {cleanup}");
            }
            return Err(err);
        }
    };

    let record = ConstraintRecord::new(kind, target, node, drivers);
    info!(
        "created {} constraint {} on {} with {} driver(s)",
        kind,
        record.node,
        record.target,
        record.drivers.len()
    );
    if let Some(previous) = registry.add(record.clone()) {
        info!(
            "replaced tracked {} constraint {} on {}",
            kind, previous.node, record.target
        );
    }
    Ok(record)
}

/// Derive a record from a relationship node that already exists in the scene.
///
/// The kind comes from the node's host type, the target from its outputs
/// (weight feedback excluded, blend nodes followed through) and the drivers
/// from its ordered target list. The record is not added to any registry.
pub fn derive_record(scene: &dyn Scene, node_id: &StableId) -> Result<ConstraintRecord> {
    let node = live_ref(scene, node_id)?;
    let kind = match NodeClass::classify(&scene.node_type(node_id)?) {
        NodeClass::Constraint(kind) => kind,
        NodeClass::Unsupported(node_type) => {
            return Err(ConManError::UnsupportedNodeKind {
                node: node_id.clone(),
                node_type,
            })
        }
    };

    let mut targets: Vec<StableId> = Vec::new();
    for conn in scene.downstream(node_id)? {
        if conn.role == ConnectionRole::WeightFeedback {
            continue;
        }
        if !targets.contains(&conn.entity) {
            targets.push(conn.entity);
        }
    }
    let target_id = match targets.len() {
        0 => {
            return Err(ConManError::UnconstrainedNode {
                node: node_id.clone(),
            })
        }
        1 => targets.remove(0),
        _ => {
            return Err(ConManError::AmbiguousTarget {
                node: node_id.clone(),
                found: targets,
            })
        }
    };
    let target = live_ref(scene, &target_id)?;

    let drivers = scene
        .target_list(node_id)?
        .iter()
        .map(|id| live_ref(scene, id))
        .collect::<Result<Vec<_>>>()?;

    Ok(ConstraintRecord::new(kind, target, node, drivers))
}

/// Adopt an existing relationship node and track it.
pub fn adopt(
    scene: &dyn Scene,
    registry: &mut Registry,
    node_id: &StableId,
) -> Result<ConstraintRecord> {
    let record = derive_record(scene, node_id)?;
    info!(
        "adopted {} constraint {} on {}",
        record.kind, record.node, record.target
    );
    registry.add(record.clone());
    Ok(record)
}

/// Adopt every selected relationship node, skipping unsupported ones.
///
/// Every record is derived before any is tracked: a failure other than an
/// unsupported node kind leaves the registry untouched.
pub fn adopt_selection(
    scene: &dyn Scene,
    registry: &mut Registry,
) -> Result<Vec<ConstraintRecord>> {
    let selection = scene.selection();
    if selection.is_empty() {
        return Err(ConManError::InsufficientSelection { found: 0 });
    }

    let mut derived = Vec::new();
    let mut first_unsupported = None;
    for node_id in &selection {
        match derive_record(scene, node_id) {
            Ok(record) => derived.push(record),
            Err(err @ ConManError::UnsupportedNodeKind { .. }) => {
                warn!("skipping {node_id}: {err}");
                first_unsupported.get_or_insert(err);
            }
            Err(err) => return Err(err),
        }
    }

    if let Some(err) = first_unsupported.filter(|_| derived.is_empty()) {
        return Err(err);
    }
    for record in &derived {
        info!(
            "adopted {} constraint {} on {}",
            record.kind, record.node, record.target
        );
        registry.add(record.clone());
    }
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisMask;
    use crate::scene::Axis;

    #[test]
    fn split_requires_driver_and_target() {
        let ids: Vec<StableId> = ["A", "B", "T"].into_iter().map(StableId::from).collect();
        let (drivers, target) = split_selection(&ids).unwrap();
        assert_eq!(drivers, &ids[..2]);
        assert_eq!(target, &ids[2]);

        assert_eq!(
            split_selection(&ids[..1]).unwrap_err(),
            ConManError::InsufficientSelection { found: 1 }
        );
        assert_eq!(
            split_selection(&[]).unwrap_err(),
            ConManError::InsufficientSelection { found: 0 }
        );
    }

    #[test]
    fn parent_spec_has_no_numeric_offset() {
        let opts = CreateOptions {
            offset: [1.0, 2.0, 3.0],
            translate: AxisMask::only(true, false, true),
            rotate: AxisMask::only(false, true, true),
            scale: AxisMask::only(false, false, false),
            ..CreateOptions::default()
        };
        let spec = relationship_spec(ConstraintKind::Parent, &opts);
        assert_eq!(spec.offset, None);
        assert_eq!(spec.skip_translate, vec![Axis::Y]);
        assert_eq!(spec.skip_rotate, vec![Axis::X]);
        assert!(spec.skip_scale.is_empty());
    }

    #[test]
    fn scale_spec_uses_scale_mask_and_clamps_weight() {
        let opts = CreateOptions {
            offset: [1.0, 1.0, 1.0],
            translate: AxisMask::only(false, false, false),
            scale: AxisMask::only(true, true, false),
            weight: 3.0,
            ..CreateOptions::default()
        };
        let spec = relationship_spec(ConstraintKind::Scale, &opts);
        assert_eq!(spec.offset, Some([1.0, 1.0, 1.0]));
        assert!(spec.skip_translate.is_empty());
        assert_eq!(spec.skip_scale, vec![Axis::Z]);
        assert_eq!(spec.weight, 1.0);
    }
}

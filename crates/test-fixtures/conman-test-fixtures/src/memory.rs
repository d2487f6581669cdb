//! In-memory host used by tests.
//!
//! Evaluation model: translation and per-axis scale are evaluated, rotation is
//! stored but never driven (orient constraints leave the world matrix alone).
//! A driven channel group evaluates to
//! `blend * weighted_average(driver + offset) + (1 - blend) * free`, where
//! `free` is the entity's own (undriven) value and `blend` is 1 unless the
//! relationship is layered beneath animation.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use conman_core::scene::{translation, SceneResult};
use conman_core::{
    AttrRef, Axis, ConnectionRole, ConstraintKind, Downstream, HostInfo, Matrix, NodeClass,
    RelationshipSpec, Scene, SceneError, StableId,
};

const MAX_DEPTH: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Group {
    Translate,
    Rotate,
    Scale,
}

impl Group {
    fn prefix(self) -> &'static str {
        match self {
            Group::Translate => "t",
            Group::Rotate => "r",
            Group::Scale => "s",
        }
    }

    fn of_channel(name: &str) -> Option<(Group, usize)> {
        let mut chars = name.chars();
        let group = match chars.next()? {
            't' => Group::Translate,
            'r' => Group::Rotate,
            's' => Group::Scale,
            _ => return None,
        };
        let axis = match chars.next()? {
            'x' => 0,
            'y' => 1,
            'z' => 2,
            _ => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some((group, axis))
    }
}

fn drives(kind: ConstraintKind, group: Group) -> bool {
    matches!(
        (kind, group),
        (ConstraintKind::Parent, Group::Translate)
            | (ConstraintKind::Point, Group::Translate)
            | (ConstraintKind::Scale, Group::Scale)
    )
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
        Axis::Z => 2,
    }
}

fn axis_suffix(i: usize) -> &'static str {
    ["X", "Y", "Z"][i]
}

#[derive(Clone, Debug)]
struct Entity {
    name: String,
    node_type: String,
    translate: [f64; 3],
    rotate: [f64; 3],
    scale: [f64; 3],
}

impl Entity {
    fn free(&self, group: Group) -> [f64; 3] {
        match group {
            Group::Translate => self.translate,
            Group::Rotate => self.rotate,
            Group::Scale => self.scale,
        }
    }

    fn free_mut(&mut self, group: Group) -> &mut [f64; 3] {
        match group {
            Group::Translate => &mut self.translate,
            Group::Rotate => &mut self.rotate,
            Group::Scale => &mut self.scale,
        }
    }
}

#[derive(Clone, Debug)]
struct Relationship {
    kind: Option<ConstraintKind>,
    target: StableId,
    drivers: Vec<StableId>,
    weight_aliases: Vec<String>,
    layered: bool,
    via_blend: bool,
    skip: [Vec<Axis>; 3],
    feedback: Vec<StableId>,
    extra_outputs: Vec<StableId>,
    detached: bool,
}

impl Relationship {
    fn skip_for(&self, group: Group) -> &[Axis] {
        match group {
            Group::Translate => &self.skip[0],
            Group::Rotate => &self.skip[1],
            Group::Scale => &self.skip[2],
        }
    }
}

fn blend_attr_name(kind: ConstraintKind) -> String {
    format!("blend{}1", kind.label())
}

fn parent_offset_name(driver: usize, rotate: bool, axis: usize) -> String {
    let what = if rotate { "Rotate" } else { "Translate" };
    format!("target[{driver}].targetOffset{what}{}", axis_suffix(axis))
}

fn offset_name(axis: usize) -> String {
    format!("offset{}", axis_suffix(axis))
}

/// In-memory [`Scene`] implementation.
#[derive(Clone, Debug)]
pub struct MemoryScene {
    host: HostInfo,
    position: f64,
    entities: BTreeMap<StableId, Entity>,
    relationships: BTreeMap<StableId, Relationship>,
    attrs: BTreeMap<AttrRef, f64>,
    curves: BTreeMap<AttrRef, Vec<(f64, f64)>>,
    metadata: BTreeMap<String, String>,
    selection: Vec<StableId>,
    rejected_ops: BTreeSet<String>,
    hidden: BTreeSet<StableId>,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new(HostInfo {
            name: "memory".to_string(),
            version: 2018,
            stable_ids: true,
        })
    }
}

impl MemoryScene {
    pub fn new(host: HostInfo) -> Self {
        Self {
            host,
            position: 1.0,
            entities: BTreeMap::new(),
            relationships: BTreeMap::new(),
            attrs: BTreeMap::new(),
            curves: BTreeMap::new(),
            metadata: BTreeMap::new(),
            selection: Vec::new(),
            rejected_ops: BTreeSet::new(),
            hidden: BTreeSet::new(),
        }
    }

    /// Add a transform entity with a fresh id.
    pub fn add_transform(&mut self, name: &str, translate: [f64; 3]) -> StableId {
        let id = StableId::new(Uuid::new_v4().to_string().to_uppercase());
        self.insert_entity(id.clone(), name, "transform", translate, [1.0; 3]);
        id
    }

    fn insert_entity(
        &mut self,
        id: StableId,
        name: &str,
        node_type: &str,
        translate: [f64; 3],
        scale: [f64; 3],
    ) {
        self.entities.insert(
            id,
            Entity {
                name: name.to_string(),
                node_type: node_type.to_string(),
                translate,
                rotate: [0.0; 3],
                scale,
            },
        );
    }

    /// Look an entity up by its current display name.
    pub fn id_of(&self, name: &str) -> Option<StableId> {
        self.entities
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(id, _)| id.clone())
    }

    pub fn rename(&mut self, id: &StableId, name: &str) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| anyhow!("no entity {id}"))?;
        entity.name = name.to_string();
        Ok(())
    }

    pub fn set_selection(&mut self, ids: Vec<StableId>) {
        self.selection = ids;
    }

    pub fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn set_host(&mut self, host: HostInfo) {
        self.host = host;
    }

    /// Make every later call of `op` fail with `SceneError::Rejected`.
    ///
    /// `"resolve_new_node"` is special: relationship nodes created afterwards
    /// exist but never resolve.
    pub fn reject(&mut self, op: &str) {
        self.rejected_ops.insert(op.to_string());
    }

    fn check(&self, op: &str) -> SceneResult<()> {
        if self.rejected_ops.contains(op) {
            return Err(SceneError::Rejected(op.to_string()));
        }
        Ok(())
    }

    /// Move an entity's undriven translation.
    pub fn set_translate(&mut self, id: &StableId, t: [f64; 3]) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| anyhow!("no entity {id}"))?;
        entity.translate = t;
        Ok(())
    }

    /// Timeline samples of an attribute, sorted by position.
    pub fn samples(&self, attr: &AttrRef) -> &[(f64, f64)] {
        self.curves.get(attr).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every attribute that has at least one timeline sample.
    pub fn keyed_attrs(&self) -> Vec<AttrRef> {
        self.curves.keys().cloned().collect()
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Evaluated world translation.
    pub fn world_translate(&self, id: &StableId) -> [f64; 3] {
        self.eval(id, Group::Translate, 0)
    }

    fn relationship_for(&self, target: &StableId, group: Group) -> Option<(&StableId, &Relationship)> {
        self.relationships.iter().find(|(_, r)| {
            &r.target == target && r.kind.is_some_and(|k| drives(k, group))
        })
    }

    fn attr_value(&self, entity: &StableId, name: &str) -> f64 {
        self.attrs
            .get(&AttrRef::new(entity.clone(), name))
            .copied()
            .unwrap_or(0.0)
    }

    fn shared_offset(&self, node: &StableId) -> [f64; 3] {
        [0, 1, 2].map(|a| self.attr_value(node, &offset_name(a)))
    }

    fn parent_offset(&self, node: &StableId, driver: usize) -> [f64; 3] {
        [0, 1, 2].map(|a| self.attr_value(node, &parent_offset_name(driver, false, a)))
    }

    fn weights(&self, node: &StableId, rel: &Relationship) -> Vec<f64> {
        rel.weight_aliases
            .iter()
            .map(|alias| self.attr_value(node, alias))
            .collect()
    }

    fn eval(&self, id: &StableId, group: Group, depth: usize) -> [f64; 3] {
        let Some(entity) = self.entities.get(id) else {
            return [0.0; 3];
        };
        let free = entity.free(group);
        if depth > MAX_DEPTH {
            return free;
        }
        let Some((node, rel)) = self.relationship_for(id, group) else {
            return free;
        };
        let Some(kind) = rel.kind else {
            return free;
        };

        let weights = self.weights(node, rel);
        let sum: f64 = weights.iter().sum();
        let driven = if sum <= 0.0 {
            free
        } else {
            let mut acc = [0.0; 3];
            for (i, (driver, w)) in rel.drivers.iter().zip(&weights).enumerate() {
                let d = self.eval(driver, group, depth + 1);
                let off = if kind == ConstraintKind::Parent {
                    self.parent_offset(node, i)
                } else {
                    [0.0; 3]
                };
                for a in 0..3 {
                    acc[a] += w * (d[a] + off[a]);
                }
            }
            let shared = if kind == ConstraintKind::Parent {
                [0.0; 3]
            } else {
                self.shared_offset(node)
            };
            [0, 1, 2].map(|a| acc[a] / sum + shared[a])
        };

        let blend = if rel.layered {
            self.attr_value(&rel.target, &blend_attr_name(kind))
        } else {
            1.0
        };
        let skip = rel.skip_for(group);
        let mut out = free;
        for a in 0..3 {
            if skip.iter().any(|s| axis_index(*s) == a) {
                continue;
            }
            out[a] = blend * driven[a] + (1.0 - blend) * free[a];
        }
        out
    }

    fn rel(&self, node: &StableId) -> SceneResult<&Relationship> {
        self.relationships
            .get(node)
            .ok_or_else(|| SceneError::EntityNotFound(node.clone()))
    }

    fn entity(&self, id: &StableId) -> SceneResult<&Entity> {
        self.entities
            .get(id)
            .ok_or_else(|| SceneError::EntityNotFound(id.clone()))
    }

    fn unique_name(&self, base: &str) -> String {
        let taken = |n: &str| self.entities.values().any(|e| e.name == n);
        (1..)
            .map(|i| format!("{base}{i}"))
            .find(|n| !taken(n))
            .unwrap_or_else(|| base.to_string())
    }

    fn target_is_keyed(&self, target: &StableId) -> bool {
        self.curves
            .keys()
            .any(|a| &a.entity == target && Group::of_channel(&a.name).is_some())
    }

    fn store_offsets(&mut self, node: &StableId) -> SceneResult<()> {
        let rel = self.rel(node)?.clone();
        let Some(kind) = rel.kind else {
            return Ok(());
        };
        let group = match kind {
            ConstraintKind::Parent | ConstraintKind::Point => Group::Translate,
            ConstraintKind::Scale => Group::Scale,
            ConstraintKind::Orient => return Ok(()),
        };
        let free = self.entity(&rel.target)?.free(group);
        match kind {
            ConstraintKind::Parent => {
                for (i, driver) in rel.drivers.iter().enumerate() {
                    let d = self.eval(driver, group, 1);
                    for a in 0..3 {
                        self.attrs.insert(
                            AttrRef::new(node.clone(), parent_offset_name(i, false, a)),
                            free[a] - d[a],
                        );
                    }
                }
            }
            _ => {
                let weights = self.weights(node, &rel);
                let sum: f64 = weights.iter().sum();
                if sum <= 0.0 {
                    return Ok(());
                }
                let mut avg = [0.0; 3];
                for (driver, w) in rel.drivers.iter().zip(&weights) {
                    let d = self.eval(driver, group, 1);
                    for a in 0..3 {
                        avg[a] += w * d[a] / sum;
                    }
                }
                for a in 0..3 {
                    self.attrs
                        .insert(AttrRef::new(node.clone(), offset_name(a)), free[a] - avg[a]);
                }
            }
        }
        Ok(())
    }

    /// Add a relationship node directly (fixture loading and adoption tests).
    #[allow(clippy::too_many_arguments)]
    pub fn insert_relationship(
        &mut self,
        id: StableId,
        name: &str,
        node_type: &str,
        target: StableId,
        drivers: Vec<StableId>,
        weights: &[f64],
        layered: bool,
    ) -> Result<()> {
        if !self.entities.contains_key(&target) {
            bail!("relationship {name}: unknown target {target}");
        }
        for d in &drivers {
            if !self.entities.contains_key(d) {
                bail!("relationship {name}: unknown driver {d}");
            }
        }
        let kind = match NodeClass::classify(node_type) {
            NodeClass::Constraint(kind) => Some(kind),
            NodeClass::Unsupported(_) => None,
        };
        let weight_aliases: Vec<String> = drivers
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{}W{}", self.entities[d].name, i))
            .collect();
        for (i, alias) in weight_aliases.iter().enumerate() {
            let w = weights.get(i).copied().unwrap_or(1.0);
            self.attrs.insert(AttrRef::new(id.clone(), alias.clone()), w);
        }
        if let Some(kind) = kind {
            if kind == ConstraintKind::Parent {
                for i in 0..drivers.len() {
                    for a in 0..3 {
                        for rotate in [false, true] {
                            self.attrs
                                .insert(AttrRef::new(id.clone(), parent_offset_name(i, rotate, a)), 0.0);
                        }
                    }
                }
            } else {
                for a in 0..3 {
                    self.attrs.insert(AttrRef::new(id.clone(), offset_name(a)), 0.0);
                }
            }
            if layered {
                self.attrs
                    .insert(AttrRef::new(target.clone(), blend_attr_name(kind)), 1.0);
            }
        }
        self.insert_entity(id.clone(), name, node_type, [0.0; 3], [1.0; 3]);
        self.relationships.insert(
            id,
            Relationship {
                kind,
                target,
                drivers,
                weight_aliases,
                layered,
                via_blend: layered,
                skip: [Vec::new(), Vec::new(), Vec::new()],
                feedback: Vec::new(),
                extra_outputs: Vec::new(),
                detached: false,
            },
        );
        Ok(())
    }

    /// Set a relationship's stored offset (shared offset, or driver 0 for parent).
    pub fn set_offset(&mut self, node: &StableId, offset: [f64; 3]) -> Result<()> {
        let rel = self
            .relationships
            .get(node)
            .ok_or_else(|| anyhow!("no relationship {node}"))?;
        for a in 0..3 {
            let name = if rel.kind == Some(ConstraintKind::Parent) {
                parent_offset_name(0, false, a)
            } else {
                offset_name(a)
            };
            self.attrs.insert(AttrRef::new(node.clone(), name), offset[a]);
        }
        Ok(())
    }

    /// Entities that drive the node's weights back (never a constrained target).
    pub fn add_weight_feedback(&mut self, node: &StableId, from: StableId) -> Result<()> {
        let rel = self
            .relationships
            .get_mut(node)
            .ok_or_else(|| anyhow!("no relationship {node}"))?;
        rel.feedback.push(from);
        Ok(())
    }

    /// Disconnect the node from its target (outputs other than feedback are dropped).
    pub fn detach(&mut self, node: &StableId) -> Result<()> {
        let rel = self
            .relationships
            .get_mut(node)
            .ok_or_else(|| anyhow!("no relationship {node}"))?;
        rel.detached = true;
        rel.extra_outputs.clear();
        Ok(())
    }

    /// Wire an additional output of the node into another entity.
    pub fn add_extra_output(&mut self, node: &StableId, to: StableId) -> Result<()> {
        let rel = self
            .relationships
            .get_mut(node)
            .ok_or_else(|| anyhow!("no relationship {node}"))?;
        rel.extra_outputs.push(to);
        Ok(())
    }

    pub fn add_sample(&mut self, attr: AttrRef, position: f64, value: f64) {
        let curve = self.curves.entry(attr).or_default();
        match curve.iter_mut().find(|(t, _)| *t == position) {
            Some(sample) => sample.1 = value,
            None => {
                curve.push((position, value));
                curve.sort_by(|a, b| a.0.total_cmp(&b.0));
            }
        }
    }
}

impl Scene for MemoryScene {
    fn host_info(&self) -> HostInfo {
        self.host.clone()
    }

    fn resolve(&self, id: &StableId) -> Option<String> {
        if self.hidden.contains(id) {
            return None;
        }
        self.entities.get(id).map(|e| e.name.clone())
    }

    fn selection(&self) -> Vec<StableId> {
        self.selection
            .iter()
            .filter(|id| self.entities.contains_key(*id))
            .cloned()
            .collect()
    }

    fn node_type(&self, id: &StableId) -> SceneResult<String> {
        Ok(self.entity(id)?.node_type.clone())
    }

    fn downstream(&self, node: &StableId) -> SceneResult<Vec<Downstream>> {
        let rel = self.rel(node)?;
        let role = if rel.via_blend {
            ConnectionRole::ThroughBlend
        } else {
            ConnectionRole::Direct
        };
        let wired = if rel.detached { 0 } else { 3 };
        // one connection per driven axis, like the host reports them
        let mut out: Vec<Downstream> = (0..wired)
            .map(|_| Downstream {
                entity: rel.target.clone(),
                role,
            })
            .collect();
        out.extend(rel.extra_outputs.iter().map(|e| Downstream {
            entity: e.clone(),
            role: ConnectionRole::Direct,
        }));
        out.extend(rel.feedback.iter().map(|e| Downstream {
            entity: e.clone(),
            role: ConnectionRole::WeightFeedback,
        }));
        Ok(out)
    }

    fn target_list(&self, node: &StableId) -> SceneResult<Vec<StableId>> {
        Ok(self.rel(node)?.drivers.clone())
    }

    fn create_relationship(
        &mut self,
        spec: &RelationshipSpec,
        drivers: &[StableId],
        target: &StableId,
    ) -> SceneResult<StableId> {
        self.check("create_relationship")?;
        let target_name = self.entity(target)?.name.clone();
        for d in drivers {
            self.entity(d)?;
        }
        let node_type = spec.kind.node_type();
        let name = self.unique_name(&format!("{target_name}_{node_type}"));
        let id = StableId::new(Uuid::new_v4().to_string().to_uppercase());
        let layered = self.target_is_keyed(target);
        let weights = vec![spec.weight; drivers.len()];
        self.insert_relationship(
            id.clone(),
            &name,
            node_type,
            target.clone(),
            drivers.to_vec(),
            &weights,
            layered,
        )
        .map_err(|e| SceneError::Rejected(e.to_string()))?;
        if let Some(rel) = self.relationships.get_mut(&id) {
            rel.skip = [
                spec.skip_translate.clone(),
                spec.skip_rotate.clone(),
                spec.skip_scale.clone(),
            ];
        }
        if self.check("resolve_new_node").is_err() {
            self.hidden.insert(id.clone());
        }
        if spec.maintain_offset {
            self.store_offsets(&id)?;
        } else if let Some(offset) = spec.offset {
            for (a, v) in offset.iter().enumerate() {
                self.attrs.insert(AttrRef::new(id.clone(), offset_name(a)), *v);
            }
        }
        Ok(id)
    }

    fn delete(&mut self, id: &StableId) -> SceneResult<()> {
        self.check("delete")?;
        if self.entities.remove(id).is_none() {
            return Err(SceneError::EntityNotFound(id.clone()));
        }
        if let Some(rel) = self.relationships.remove(id) {
            if let Some(kind) = rel.kind {
                self.attrs
                    .remove(&AttrRef::new(rel.target.clone(), blend_attr_name(kind)));
            }
        }
        self.attrs.retain(|a, _| &a.entity != id);
        self.curves.retain(|a, _| &a.entity != id);
        self.selection.retain(|s| s != id);
        self.hidden.remove(id);
        Ok(())
    }

    fn world_transform(&self, id: &StableId) -> SceneResult<Matrix> {
        self.entity(id)?;
        let t = self.eval(id, Group::Translate, 0);
        let s = self.eval(id, Group::Scale, 0);
        let mut m = translation(t);
        m[0] = s[0];
        m[5] = s[1];
        m[10] = s[2];
        Ok(m)
    }

    fn set_world_transform(&mut self, id: &StableId, m: &Matrix) -> SceneResult<()> {
        self.check("set_world_transform")?;
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| SceneError::EntityNotFound(id.clone()))?;
        entity.translate = [m[12], m[13], m[14]];
        entity.scale = [m[0], m[5], m[10]];
        Ok(())
    }

    fn recompute_offset(&mut self, node: &StableId, drivers: &[StableId]) -> SceneResult<()> {
        self.check("recompute_offset")?;
        let rel = self.rel(node)?;
        if rel.drivers.as_slice() != drivers {
            return Err(SceneError::Rejected(format!(
                "driver list does not match constraint {node}"
            )));
        }
        self.store_offsets(node)
    }

    fn weight_attr(&self, node: &StableId, index: usize) -> SceneResult<AttrRef> {
        let rel = self.rel(node)?;
        rel.weight_aliases
            .get(index)
            .map(|alias| AttrRef::new(node.clone(), alias.clone()))
            .ok_or_else(|| SceneError::AttributeNotFound(format!("{node}.target[{index}]")))
    }

    fn blend_control(&self, node: &StableId) -> SceneResult<Option<AttrRef>> {
        let rel = self.rel(node)?;
        Ok(match (rel.layered, rel.kind) {
            (true, Some(kind)) => Some(AttrRef::new(rel.target.clone(), blend_attr_name(kind))),
            _ => None,
        })
    }

    fn offset_attrs(&self, node: &StableId) -> SceneResult<Vec<AttrRef>> {
        let rel = self.rel(node)?;
        Ok(match rel.kind {
            Some(ConstraintKind::Parent) => (0..rel.drivers.len())
                .flat_map(|i| {
                    [false, true].into_iter().flat_map(move |rotate| {
                        (0..3).map(move |a| parent_offset_name(i, rotate, a))
                    })
                })
                .map(|name| AttrRef::new(node.clone(), name))
                .collect(),
            Some(_) => (0..3)
                .map(|a| AttrRef::new(node.clone(), offset_name(a)))
                .collect(),
            None => Vec::new(),
        })
    }

    fn driven_channels(&self, node: &StableId) -> SceneResult<Vec<AttrRef>> {
        let rel = self.rel(node)?;
        let groups: &[Group] = match rel.kind {
            Some(ConstraintKind::Parent) => &[Group::Translate, Group::Rotate],
            Some(ConstraintKind::Point) => &[Group::Translate],
            Some(ConstraintKind::Orient) => &[Group::Rotate],
            Some(ConstraintKind::Scale) => &[Group::Scale],
            None => &[],
        };
        let mut out = Vec::new();
        for group in groups {
            let skip = rel.skip_for(*group);
            for (a, axis) in ["x", "y", "z"].iter().enumerate() {
                if skip.iter().any(|s| axis_index(*s) == a) {
                    continue;
                }
                out.push(AttrRef::new(
                    rel.target.clone(),
                    format!("{}{}", group.prefix(), axis),
                ));
            }
        }
        Ok(out)
    }

    fn get_attr(&self, attr: &AttrRef) -> SceneResult<f64> {
        self.entity(&attr.entity)?;
        if let Some((group, a)) = Group::of_channel(&attr.name) {
            return Ok(self.eval(&attr.entity, group, 0)[a]);
        }
        self.attrs
            .get(attr)
            .copied()
            .ok_or_else(|| SceneError::AttributeNotFound(attr.to_string()))
    }

    fn set_attr(&mut self, attr: &AttrRef, value: f64) -> SceneResult<()> {
        self.check("set_attr")?;
        if let Some((group, a)) = Group::of_channel(&attr.name) {
            let entity = self
                .entities
                .get_mut(&attr.entity)
                .ok_or_else(|| SceneError::EntityNotFound(attr.entity.clone()))?;
            entity.free_mut(group)[a] = value;
            return Ok(());
        }
        match self.attrs.get_mut(attr) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SceneError::AttributeNotFound(attr.to_string())),
        }
    }

    fn sample_before(&self, attr: &AttrRef, position: f64) -> SceneResult<Option<f64>> {
        Ok(self
            .samples(attr)
            .iter()
            .rev()
            .find(|(t, _)| *t < position)
            .map(|(_, v)| *v))
    }

    fn write_sample(&mut self, attr: &AttrRef, position: f64, value: f64) -> SceneResult<()> {
        self.check("write_sample")?;
        self.entity(&attr.entity)?;
        self.add_sample(attr.clone(), position, value);
        Ok(())
    }

    fn current_position(&self) -> f64 {
        self.position
    }

    fn read_metadata(&self, key: &str) -> Option<String> {
        self.metadata.get(key).cloned()
    }

    fn write_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    fn remove_metadata(&mut self, key: &str) {
        self.metadata.remove(key);
    }
}

/// JSON description of a scene, as stored under `fixtures/scenes`.
#[derive(Debug, Deserialize, Serialize)]
pub struct SceneDoc {
    pub host: HostInfo,
    #[serde(default = "default_position")]
    pub position: f64,
    #[serde(default)]
    pub entities: Vec<EntityDoc>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDoc>,
    #[serde(default)]
    pub curves: Vec<CurveDoc>,
    #[serde(default)]
    pub selection: Vec<StableId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_position() -> f64 {
    1.0
}

fn default_scale() -> [f64; 3] {
    [1.0; 3]
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EntityDoc {
    pub id: StableId,
    pub name: String,
    #[serde(default)]
    pub translate: [f64; 3],
    #[serde(default = "default_scale")]
    pub scale: [f64; 3],
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RelationshipDoc {
    pub id: StableId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub target: StableId,
    pub drivers: Vec<StableId>,
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub layered: bool,
    #[serde(default)]
    pub offset: Option<[f64; 3]>,
    #[serde(default)]
    pub feedback: Vec<StableId>,
    #[serde(default)]
    pub extra_outputs: Vec<StableId>,
    #[serde(default)]
    pub detached: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CurveDoc {
    pub entity: StableId,
    pub attr: String,
    pub samples: Vec<(f64, f64)>,
}

impl MemoryScene {
    pub fn from_doc(doc: SceneDoc) -> Result<Self> {
        let mut scene = MemoryScene::new(doc.host);
        scene.position = doc.position;
        for e in doc.entities {
            if scene.entities.contains_key(&e.id) {
                bail!("duplicate entity id {}", e.id);
            }
            scene.insert_entity(e.id, &e.name, "transform", e.translate, e.scale);
        }
        for c in doc.curves {
            let attr = AttrRef::new(c.entity, c.attr);
            for (t, v) in c.samples {
                scene.add_sample(attr.clone(), t, v);
            }
        }
        for r in doc.relationships {
            let id = r.id.clone();
            scene.insert_relationship(
                r.id,
                &r.name,
                &r.node_type,
                r.target,
                r.drivers,
                &r.weights,
                r.layered,
            )?;
            if let Some(offset) = r.offset {
                scene.set_offset(&id, offset)?;
            }
            for f in r.feedback {
                scene.add_weight_feedback(&id, f)?;
            }
            for o in r.extra_outputs {
                scene.add_extra_output(&id, o)?;
            }
            if r.detached {
                scene.detach(&id)?;
            }
        }
        scene.selection = doc.selection;
        scene.metadata = doc.metadata;
        Ok(scene)
    }
}

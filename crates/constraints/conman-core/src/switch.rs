//! Weight-switch engine.
//!
//! Order of operations for one switch:
//! 1. re-resolve target, node and drivers (stale -> error, nothing mutated)
//! 2. capture the target's world pose when the pose is to be kept
//! 3. plan the new driver weights and blend value
//! 4. write "before" history samples (and "after" samples for weights/blend)
//! 5. apply weights and blend
//! 6. restore the pose and recompute offsets
//! 7. write "after" samples for offsets and driven channels
//!
//! There is no rollback: if the host rejects a step, earlier steps stay applied.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{Config, SwitchOptions};
use crate::error::{ConManError, Result};
use crate::history::{HistoryRecorder, HistorySample};
use crate::record::{ConstraintKind, ConstraintRecord, RecordKey};
use crate::scene::{AttrRef, Scene, SceneResult};

const W_ON: f64 = 1.0;
const W_OFF: f64 = 0.0;

/// Requested driver configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchMode {
    /// Every weight and the blend control to zero (fully free).
    Off,
    /// Every weight and the blend control to one.
    All,
    /// Only the driver at this index is active.
    Single(usize),
}

/// Target weights for a mode, before anything is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightPlan {
    pub weights: Vec<f64>,
    pub blend: f64,
}

/// Compute weights for `driver_count` drivers. Fails with the offending
/// index when a `Single` index is out of range.
pub fn plan_weights(mode: SwitchMode, driver_count: usize) -> std::result::Result<WeightPlan, usize> {
    match mode {
        SwitchMode::Off => Ok(WeightPlan {
            weights: vec![W_OFF; driver_count],
            blend: W_OFF,
        }),
        SwitchMode::All => Ok(WeightPlan {
            weights: vec![W_ON; driver_count],
            blend: W_ON,
        }),
        SwitchMode::Single(k) if k < driver_count => Ok(WeightPlan {
            weights: (0..driver_count)
                .map(|i| if i == k { W_ON } else { W_OFF })
                .collect(),
            blend: W_ON,
        }),
        SwitchMode::Single(k) => Err(k),
    }
}

/// One switch on exactly one record.
#[derive(Clone, Debug)]
pub struct SwitchRequest<'a> {
    pub record: &'a ConstraintRecord,
    pub mode: SwitchMode,
    pub maintain_pose: bool,
    pub record_history: bool,
}

impl<'a> SwitchRequest<'a> {
    pub fn new(record: &'a ConstraintRecord, mode: SwitchMode, opts: SwitchOptions) -> Self {
        Self {
            record,
            mode,
            maintain_pose: opts.maintain_pose,
            record_history: opts.record_history,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchReport {
    pub key: RecordKey,
    pub weights: Vec<f64>,
    /// Blend value applied, when the relationship has a blend control.
    pub blend: Option<f64>,
    pub offsets_recomputed: bool,
    pub history: Vec<HistorySample>,
}

fn ensure_live(scene: &dyn Scene, record: &ConstraintRecord) -> Result<()> {
    let refs = [&record.target, &record.node]
        .into_iter()
        .chain(record.drivers.iter());
    for r in refs {
        if !r.is_live(scene) {
            return Err(ConManError::StaleRecord {
                key: record.key(),
                missing: r.id.clone(),
            });
        }
    }
    Ok(())
}

/// Run one weight switch against the scene.
pub fn apply_switch(scene: &mut dyn Scene, req: &SwitchRequest<'_>, cfg: &Config) -> Result<SwitchReport> {
    let record = req.record;
    let key = record.key();
    let node = &record.node.id;
    let target = &record.target.id;

    ensure_live(scene, record)?;
    let plan = plan_weights(req.mode, record.drivers.len()).map_err(|index| {
        ConManError::InvalidDriverIndex {
            key: key.clone(),
            index,
            count: record.drivers.len(),
        }
    })?;
    debug!("switch {key}: {:?} -> weights {:?}", req.mode, plan.weights);

    let pose_before = if req.maintain_pose {
        Some(scene.world_transform(target)?)
    } else {
        None
    };

    let weight_attrs = (0..record.drivers.len())
        .map(|i| scene.weight_attr(node, i))
        .collect::<SceneResult<Vec<AttrRef>>>()?;
    let blend_attr = scene.blend_control(node)?;

    let mut recorder = if req.record_history {
        Some(HistoryRecorder::at_current(scene, cfg.history_step))
    } else {
        None
    };
    let channels = match (&recorder, record.kind) {
        (Some(_), ConstraintKind::Parent) => scene.driven_channels(node)?,
        _ => Vec::new(),
    };
    let offsets = if recorder.is_some() && req.maintain_pose {
        scene.offset_attrs(node)?
    } else {
        Vec::new()
    };

    if let Some(rec) = recorder.as_mut() {
        for attr in weight_attrs
            .iter()
            .chain(blend_attr.iter())
            .chain(channels.iter())
            .chain(offsets.iter())
        {
            rec.record_before(scene, attr)?;
        }
        for (attr, w) in weight_attrs.iter().zip(&plan.weights) {
            rec.record_after(scene, attr, *w)?;
        }
        if let Some(attr) = &blend_attr {
            rec.record_after(scene, attr, plan.blend)?;
        }
    }

    for (attr, w) in weight_attrs.iter().zip(&plan.weights) {
        scene.set_attr(attr, *w)?;
    }
    if let Some(attr) = &blend_attr {
        scene.set_attr(attr, plan.blend)?;
    }

    let offsets_recomputed = match &pose_before {
        Some(pose) => {
            scene.set_world_transform(target, pose)?;
            scene.recompute_offset(node, &record.driver_ids())?;
            true
        }
        None => false,
    };

    if let Some(rec) = recorder.as_mut() {
        for attr in offsets.iter().chain(channels.iter()) {
            rec.record_after_current(scene, attr)?;
        }
    }

    Ok(SwitchReport {
        key,
        weights: plan.weights,
        blend: blend_attr.map(|_| plan.blend),
        offsets_recomputed,
        history: recorder.map(HistoryRecorder::into_samples).unwrap_or_default(),
    })
}

//! Two-sample history recording.
//!
//! A switch is recorded as a hard step on each affected attribute's timeline:
//! the pre-switch value at `position - step` and the post-switch value at
//! `position`. Samples earlier than `position - step` are left untouched.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::scene::{AttrRef, Scene, SceneResult};

/// Where the "before" value came from.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PriorValue {
    /// Copied from the nearest existing sample before the current position.
    Sampled(f64),
    /// No earlier sample exists; synthesized from the attribute's current value.
    Current(f64),
}

impl PriorValue {
    pub fn value(self) -> f64 {
        match self {
            PriorValue::Sampled(v) | PriorValue::Current(v) => v,
        }
    }

    /// Look up the value an attribute had just before `position`.
    pub fn read(scene: &dyn Scene, attr: &AttrRef, position: f64) -> SceneResult<Self> {
        match scene.sample_before(attr, position)? {
            Some(v) => Ok(PriorValue::Sampled(v)),
            None => Ok(PriorValue::Current(scene.get_attr(attr)?)),
        }
    }
}

/// One sample written to a timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub attr: AttrRef,
    pub position: f64,
    pub value: f64,
}

#[derive(Debug)]
pub struct HistoryRecorder {
    position: f64,
    step: f64,
    samples: Vec<HistorySample>,
}

impl HistoryRecorder {
    pub fn new(position: f64, step: f64) -> Self {
        Self {
            position,
            step,
            samples: Vec::new(),
        }
    }

    /// Recorder anchored at the scene's current timeline position.
    pub fn at_current(scene: &dyn Scene, step: f64) -> Self {
        Self::new(scene.current_position(), step)
    }

    pub fn before_position(&self) -> f64 {
        self.position - self.step
    }

    /// Write the attribute's prior value at `position - step`.
    pub fn record_before(&mut self, scene: &mut dyn Scene, attr: &AttrRef) -> SceneResult<PriorValue> {
        let prior = PriorValue::read(scene, attr, self.position)?;
        let at = self.before_position();
        self.write(scene, attr, at, prior.value())?;
        Ok(prior)
    }

    /// Write `value` at the current position.
    pub fn record_after(&mut self, scene: &mut dyn Scene, attr: &AttrRef, value: f64) -> SceneResult<()> {
        let at = self.position;
        self.write(scene, attr, at, value)
    }

    /// Write the attribute's live value at the current position.
    pub fn record_after_current(&mut self, scene: &mut dyn Scene, attr: &AttrRef) -> SceneResult<()> {
        let value = scene.get_attr(attr)?;
        self.record_after(scene, attr, value)
    }

    fn write(&mut self, scene: &mut dyn Scene, attr: &AttrRef, at: f64, value: f64) -> SceneResult<()> {
        scene.write_sample(attr, at, value)?;
        debug!("history: {attr} @ {at} = {value}");
        self.samples.push(HistorySample {
            attr: attr.clone(),
            position: at,
            value,
        });
        Ok(())
    }

    pub fn into_samples(self) -> Vec<HistorySample> {
        self.samples
    }
}

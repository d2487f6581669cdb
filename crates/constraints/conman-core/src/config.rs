//! Core configuration for conman-core.

use serde::{Deserialize, Serialize};

use crate::scene::Axis;

/// Engine-wide settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document metadata slot holding the persisted registry.
    pub metadata_key: String,
    /// Oldest host release that exposes stable entity ids.
    pub min_host_version: u32,
    /// Distance between the "before" and "after" history samples.
    pub history_step: f64,
    /// Per-component tolerance used when comparing world poses.
    pub pose_tolerance: f64,
    /// Persist the registry after every mutating manager call.
    pub auto_save: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_key: "ConMan_data".to_string(),
            min_host_version: 2016,
            history_step: 1.0,
            pose_tolerance: 1e-6,
            auto_save: true,
        }
    }
}

/// Which axes of one channel group take part in a relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMask {
    pub all: bool,
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl AxisMask {
    pub const ALL: AxisMask = AxisMask {
        all: true,
        x: false,
        y: false,
        z: false,
    };

    pub fn only(x: bool, y: bool, z: bool) -> Self {
        Self {
            all: false,
            x,
            y,
            z,
        }
    }

    /// Axes the host should leave alone. `all` wins over the per-axis flags.
    pub fn skipped(&self) -> Vec<Axis> {
        if self.all {
            return Vec::new();
        }
        Axis::ALL
            .into_iter()
            .filter(|axis| match axis {
                Axis::X => !self.x,
                Axis::Y => !self.y,
                Axis::Z => !self.z,
            })
            .collect()
    }
}

impl Default for AxisMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Options used when building a new relationship.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    pub maintain_offset: bool,
    /// Numeric offset for point/orient/scale; ignored for parent.
    pub offset: [f64; 3],
    pub translate: AxisMask,
    pub rotate: AxisMask,
    pub scale: AxisMask,
    /// Initial driver weight, clamped to [0, 1].
    pub weight: f64,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            maintain_offset: true,
            offset: [0.0; 3],
            translate: AxisMask::ALL,
            rotate: AxisMask::ALL,
            scale: AxisMask::ALL,
            weight: 1.0,
        }
    }
}

/// Per-call switch behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchOptions {
    /// Keep the target's world pose by recomputing offsets after the switch.
    pub maintain_pose: bool,
    /// Write a two-sample transition onto every changed attribute.
    pub record_history: bool,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            maintain_pose: true,
            record_history: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_mask_skips_nothing() {
        assert!(AxisMask::ALL.skipped().is_empty());
        let mut m = AxisMask::only(false, false, false);
        m.all = true;
        assert!(m.skipped().is_empty());
    }

    #[test]
    fn partial_mask_skips_disabled_axes() {
        assert_eq!(AxisMask::only(true, false, true).skipped(), vec![Axis::Y]);
        assert_eq!(
            AxisMask::only(false, false, false).skipped(),
            vec![Axis::X, Axis::Y, Axis::Z]
        );
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: Config = serde_json::from_str(r#"{ "history_step": 2.0 }"#).unwrap();
        assert_eq!(cfg.metadata_key, "ConMan_data");
        assert_eq!(cfg.history_step, 2.0);
        assert!(cfg.auto_save);
    }
}

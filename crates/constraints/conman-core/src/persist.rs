//! Persistence codec: registry <-> one document metadata slot.
//!
//! The slot holds base64 (standard alphabet) over a JSON snapshot. Only stable
//! ids are stored. Writes always replace the whole slot. Reads never fail the
//! caller: an absent slot or an undecodable blob both yield an empty registry.
//!
//! Older documents only stored the relationship node ids; those are rebuilt
//! by adopting each node from the live scene.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{ConManError, Result};
use crate::factory;
use crate::ids::StableId;
use crate::record::ConstraintRecord;
use crate::registry::Registry;
use crate::scene::Scene;

pub const SCHEMA_VERSION: u32 = 2;

/// Current stored form: every record in full.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub schema: u32,
    pub records: Vec<ConstraintRecord>,
}

/// Stored form written before full records were kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacySnapshot {
    pub nodes: Vec<StableId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Persisted {
    Records(RegistrySnapshot),
    Nodes(LegacySnapshot),
    NodeList(Vec<StableId>),
}

impl Persisted {
    /// Snapshot of a registry, records in key order.
    pub fn from_registry(registry: &Registry) -> Self {
        let records = registry
            .keys()
            .iter()
            .filter_map(|key| registry.get(key).cloned())
            .collect();
        Persisted::Records(RegistrySnapshot {
            schema: SCHEMA_VERSION,
            records,
        })
    }
}

/// Encode a stored form into the printable blob kept in the metadata slot.
pub fn encode(persisted: &Persisted) -> Result<String> {
    let bytes = serde_json::to_vec(persisted).map_err(|e| ConManError::PersistenceEncodeFailure {
        reason: e.to_string(),
    })?;
    Ok(STANDARD.encode(bytes))
}

/// Decode a blob. Fails with `PersistenceDecodeFailure` on bad base64 or bad JSON.
pub fn decode(blob: &str) -> Result<Persisted> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|e| ConManError::PersistenceDecodeFailure {
            reason: format!("base64: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| ConManError::PersistenceDecodeFailure {
        reason: format!("json: {e}"),
    })
}

/// Serialize `registry` and replace the metadata slot. Returns the written blob.
pub fn write(scene: &mut dyn Scene, registry: &Registry, cfg: &Config) -> Result<String> {
    let blob = encode(&Persisted::from_registry(registry))?;
    scene.write_metadata(&cfg.metadata_key, &blob);
    Ok(blob)
}

/// Load the registry from the metadata slot, degrading to empty on any problem.
pub fn read(scene: &dyn Scene, cfg: &Config) -> Registry {
    let Some(blob) = scene.read_metadata(&cfg.metadata_key) else {
        info!("no constraint manager data found under '{}'", cfg.metadata_key);
        return Registry::new();
    };
    match decode(&blob) {
        Ok(persisted) => restore(scene, persisted),
        Err(err) => {
            warn!("{err}; starting with an empty constraint list");
            Registry::new()
        }
    }
}

/// Build a registry from a decoded stored form.
pub fn restore(scene: &dyn Scene, persisted: Persisted) -> Registry {
    let mut registry = Registry::new();
    match persisted {
        Persisted::Records(snapshot) => {
            if snapshot.schema > SCHEMA_VERSION {
                warn!(
                    "constraint data schema {} is newer than supported {}; loading what is readable",
                    snapshot.schema, SCHEMA_VERSION
                );
            }
            for mut record in snapshot.records {
                record.refresh_names(scene);
                registry.add(record);
            }
        }
        Persisted::Nodes(LegacySnapshot { nodes }) | Persisted::NodeList(nodes) => {
            info!("rebuilding {} constraint(s) from node ids", nodes.len());
            for node in &nodes {
                if let Err(err) = factory::adopt(scene, &mut registry, node) {
                    warn!("could not rebuild constraint from node {node}: {err}");
                }
            }
        }
    }
    registry
}

/// Remove the metadata slot entirely.
pub fn clear(scene: &mut dyn Scene, cfg: &Config) {
    scene.remove_metadata(&cfg.metadata_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityRef;
    use crate::record::ConstraintKind;

    fn sample_registry() -> Registry {
        let mut reg = Registry::new();
        reg.add(ConstraintRecord::new(
            ConstraintKind::Point,
            EntityRef::from_id("T"),
            EntityRef::from_id("N1"),
            vec![EntityRef::from_id("B"), EntityRef::from_id("A")],
        ));
        reg.add(ConstraintRecord::new(
            ConstraintKind::Parent,
            EntityRef::from_id("T"),
            EntityRef::from_id("N2"),
            vec![EntityRef::from_id("A")],
        ));
        reg
    }

    #[test]
    fn encode_decode_keeps_records_and_driver_order() {
        let reg = sample_registry();
        let blob = encode(&Persisted::from_registry(&reg)).unwrap();
        assert!(blob.is_ascii());
        match decode(&blob).unwrap() {
            Persisted::Records(snapshot) => {
                assert_eq!(snapshot.schema, SCHEMA_VERSION);
                assert_eq!(snapshot.records.len(), 2);
                assert_eq!(snapshot.records[0].kind, ConstraintKind::Parent);
                let drivers: Vec<&str> = snapshot.records[1]
                    .drivers
                    .iter()
                    .map(|d| d.id.as_str())
                    .collect();
                assert_eq!(drivers, vec!["B", "A"]);
            }
            other => panic!("unexpected stored form: {other:?}"),
        }
    }

    #[test]
    fn legacy_forms_decode_as_node_lists() {
        let blob = STANDARD.encode(br#"{"nodes":["N1","N2"]}"#);
        assert_eq!(
            decode(&blob).unwrap(),
            Persisted::Nodes(LegacySnapshot {
                nodes: vec!["N1".into(), "N2".into()]
            })
        );
        let blob = STANDARD.encode(br#"["N1"]"#);
        assert_eq!(decode(&blob).unwrap(), Persisted::NodeList(vec!["N1".into()]));
    }

    #[test]
    fn malformed_blobs_are_decode_failures() {
        let wrong_shape = STANDARD.encode(br#"{"records": 3}"#);
        for blob in ["%%% not base64 %%%", "", wrong_shape.as_str()] {
            assert!(matches!(
                decode(blob),
                Err(ConManError::PersistenceDecodeFailure { .. })
            ));
        }
    }
}

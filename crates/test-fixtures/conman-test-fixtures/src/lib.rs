use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

mod memory;

pub use memory::{CurveDoc, EntityDoc, MemoryScene, RelationshipDoc, SceneDoc};

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    scenes: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod scenes {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.scenes.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.scenes, "scene", name)?;
        read_to_string(rel)
    }

    pub fn doc(name: &str) -> Result<SceneDoc> {
        let text = json(name)?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse scene fixture {name}"))
    }

    /// Build a live in-memory scene from a named fixture.
    pub fn load(name: &str) -> Result<MemoryScene> {
        MemoryScene::from_doc(doc(name)?).with_context(|| format!("invalid scene fixture {name}"))
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.scenes, "scene", name)?;
        Ok(resolve_path(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conman_core::Scene;

    #[test]
    fn every_manifest_scene_loads() {
        for name in scenes::keys() {
            scenes::load(&name).unwrap_or_else(|e| panic!("{name}: {e:#}"));
        }
    }

    #[test]
    fn unknown_scene_is_an_error() {
        assert!(scenes::load("no-such-scene").is_err());
    }

    #[test]
    fn point_fixture_evaluates_active_driver() {
        let scene = scenes::load("point-two-drivers").unwrap();
        let target = scene.id_of("ctrl").unwrap();
        let loc_a = scene.id_of("locA").unwrap();
        assert_eq!(
            scene.world_translate(&target),
            scene.world_translate(&loc_a)
        );
        assert_eq!(scene.host_info().version, 2018);
    }
}

use conman_core::persist::{self, LegacySnapshot};
use conman_core::{
    ConManError, Config, ConstraintKind, ConstraintManager, CreateOptions, Persisted, RecordKey,
    Scene,
};
use conman_test_fixtures::{scenes, MemoryScene};

fn rig() -> (MemoryScene, ConstraintManager) {
    let mut scene = MemoryScene::default();
    let a = scene.add_transform("locA", [0.0; 3]);
    let b = scene.add_transform("locB", [3.0, 0.0, 0.0]);
    let arm = scene.add_transform("arm", [1.0, 1.0, 0.0]);
    let leg = scene.add_transform("leg", [0.0, -1.0, 0.0]);
    let mut mgr = ConstraintManager::new(Config::default(), &scene).unwrap();
    let opts = CreateOptions::default();
    mgr.create(&mut scene, ConstraintKind::Parent, &[b.clone(), a.clone(), arm.clone()], &opts)
        .unwrap();
    mgr.create(&mut scene, ConstraintKind::Orient, &[a.clone(), arm], &opts)
        .unwrap();
    mgr.create(&mut scene, ConstraintKind::Point, &[a, b, leg], &opts)
        .unwrap();
    (scene, mgr)
}

/// it should restore the same records, driver order included, after a reload
#[test]
fn write_then_read_round_trips() {
    let (scene, mgr) = rig();
    let reloaded = ConstraintManager::load(Config::default(), &scene).unwrap();

    assert_eq!(reloaded.registry().keys(), mgr.registry().keys());
    for key in mgr.registry().keys() {
        let original = mgr.get(&key).unwrap();
        let restored = reloaded.get(&key).unwrap();
        assert_eq!(restored.node, original.node);
        assert_eq!(restored.driver_ids(), original.driver_ids());
        assert_eq!(restored.target.display_name, original.target.display_name);
    }
}

/// it should store a printable blob holding ids only
#[test]
fn stored_blob_is_printable_and_decodable() {
    let (scene, mgr) = rig();
    let blob = scene.metadata("ConMan_data").unwrap();
    assert!(blob.bytes().all(|b| b.is_ascii_graphic()));
    match persist::decode(blob).unwrap() {
        Persisted::Records(snapshot) => {
            assert_eq!(snapshot.schema, persist::SCHEMA_VERSION);
            assert_eq!(snapshot.records.len(), mgr.registry().len());
        }
        other => panic!("unexpected stored form {other:?}"),
    }
}

/// it should refresh display names from the live scene on load
#[test]
fn reload_uses_live_names() {
    let (mut scene, _) = rig();
    let arm = scene.id_of("arm").unwrap();
    scene.rename(&arm, "arm_L").unwrap();

    let reloaded = ConstraintManager::load(Config::default(), &scene).unwrap();
    let record = reloaded
        .get(&RecordKey::new(arm, ConstraintKind::Parent))
        .unwrap();
    assert_eq!(record.target.display_name, "arm_L");
}

/// it should drop stored records whose entities were deleted before the reload
#[test]
fn reload_skips_stale_records() {
    let (mut scene, _) = rig();
    let leg = scene.id_of("leg").unwrap();
    scene.delete(&leg).unwrap();

    let reloaded = ConstraintManager::load(Config::default(), &scene).unwrap();
    assert_eq!(reloaded.registry().len(), 2);
    assert!(reloaded
        .get(&RecordKey::new(leg, ConstraintKind::Point))
        .is_none());
}

/// it should start empty when the slot is absent
#[test]
fn absent_slot_gives_empty_registry() {
    let scene = scenes::load("point-two-drivers").unwrap();
    assert!(scene.metadata("ConMan_data").is_none());
    let mgr = ConstraintManager::load(Config::default(), &scene).unwrap();
    assert!(mgr.registry().is_empty());
}

/// it should start empty, not fail, when the slot holds garbage
#[test]
fn malformed_slot_gives_empty_registry() {
    for garbage in ["", "@@@ not base64 @@@", "eyJub3QiOiAianNvbiJ9"] {
        let mut scene = scenes::load("point-two-drivers").unwrap();
        scene.write_metadata("ConMan_data", garbage);
        let mgr = ConstraintManager::load(Config::default(), &scene).unwrap();
        assert!(mgr.registry().is_empty(), "{garbage:?}");
    }
}

/// it should rebuild a node-only document by adopting each node
#[test]
fn legacy_node_list_is_rebuilt() {
    let scene = scenes::load("legacy-document").unwrap();
    let mgr = ConstraintManager::load(Config::default(), &scene).unwrap();

    let head = scene.id_of("head").unwrap();
    let neck = scene.id_of("neck").unwrap();
    assert_eq!(
        mgr.registry().keys(),
        {
            let mut keys = vec![
                RecordKey::new(head.clone(), ConstraintKind::Orient),
                RecordKey::new(neck, ConstraintKind::Point),
            ];
            keys.sort();
            keys
        }
    );
    let head_record = mgr
        .get(&RecordKey::new(head, ConstraintKind::Orient))
        .unwrap();
    let drivers: Vec<&str> = head_record
        .drivers
        .iter()
        .map(|d| d.display_name.as_str())
        .collect();
    assert_eq!(drivers, vec!["locA", "locB"]);
}

/// it should upgrade a rebuilt legacy document to the current form on save
#[test]
fn legacy_document_is_rewritten_on_save() {
    let mut scene = scenes::load("legacy-document").unwrap();
    let mgr = ConstraintManager::load(Config::default(), &scene).unwrap();
    let blob = mgr.save(&mut scene).unwrap();
    assert!(matches!(persist::decode(&blob).unwrap(), Persisted::Records(_)));

    let bare = persist::encode(&Persisted::Nodes(LegacySnapshot { nodes: vec![] })).unwrap();
    assert_ne!(blob, bare);
}

/// it should honour a custom metadata slot name
#[test]
fn custom_metadata_key() {
    let (mut scene, _) = rig();
    let cfg = Config {
        metadata_key: "rig_constraints".to_string(),
        ..Config::default()
    };
    let mgr = ConstraintManager::load(cfg.clone(), &scene).unwrap();
    assert!(mgr.registry().is_empty());

    let donor = ConstraintManager::load(Config::default(), &scene).unwrap();
    persist::write(&mut scene, donor.registry(), &cfg).unwrap();
    let mgr = ConstraintManager::load(cfg, &scene).unwrap();
    assert_eq!(mgr.registry().len(), 3);
}

/// it should leave the slot alone when auto save is off
#[test]
fn auto_save_off_defers_writes() {
    let mut scene = MemoryScene::default();
    let a = scene.add_transform("locA", [0.0; 3]);
    let t = scene.add_transform("ctrl", [0.0; 3]);
    let cfg = Config {
        auto_save: false,
        ..Config::default()
    };
    let mut mgr = ConstraintManager::new(cfg, &scene).unwrap();
    mgr.create(&mut scene, ConstraintKind::Point, &[a, t], &CreateOptions::default())
        .unwrap();
    assert!(scene.metadata("ConMan_data").is_none());

    mgr.save(&mut scene).unwrap();
    assert!(scene.metadata("ConMan_data").is_some());
}

/// it should rewrite the slot without stale records on clean
#[test]
fn clean_stale_rewrites_slot() {
    let (mut scene, mut mgr) = rig();
    let leg = scene.id_of("leg").unwrap();
    scene.delete(&leg).unwrap();

    let dropped = mgr.clean_stale(&mut scene).unwrap();
    assert_eq!(dropped, vec![RecordKey::new(leg, ConstraintKind::Point)]);
    match persist::decode(scene.metadata("ConMan_data").unwrap()).unwrap() {
        Persisted::Records(snapshot) => assert_eq!(snapshot.records.len(), 2),
        other => panic!("unexpected stored form {other:?}"),
    }
}

/// it should forget everything and remove the slot on purge
#[test]
fn purge_clears_registry_and_slot() {
    let (mut scene, mut mgr) = rig();
    mgr.purge(&mut scene);
    assert!(mgr.registry().is_empty());
    assert!(scene.metadata("ConMan_data").is_none());

    let reloaded = ConstraintManager::load(Config::default(), &scene).unwrap();
    assert!(reloaded.registry().is_empty());
}

/// it should refuse hosts without stable ids
#[test]
fn old_host_is_rejected() {
    let scene = scenes::load("old-host").unwrap();
    let err = ConstraintManager::load(Config::default(), &scene).unwrap_err();
    assert_eq!(
        err,
        ConManError::UnsupportedHostVersion {
            host: "maya".to_string(),
            version: 2015,
            required: 2016,
        }
    );
}

use conman_core::{Config, ConstraintKind, ConstraintManager, CreateOptions, RecordKey};
use conman_test_fixtures::MemoryScene;

/// it should order by target name, then kind, and label as "<name>  |  <Kind>"
#[test]
fn listing_is_ordered_and_labelled() {
    let mut scene = MemoryScene::default();
    let drv = scene.add_transform("driver", [0.0; 3]);
    let beta = scene.add_transform("beta", [0.0; 3]);
    let alpha = scene.add_transform("alpha", [0.0; 3]);
    let upper = scene.add_transform("Alpha", [0.0; 3]);
    let mut mgr = ConstraintManager::new(Config::default(), &scene).unwrap();
    let opts = CreateOptions::default();

    for (kind, target) in [
        (ConstraintKind::Point, &beta),
        (ConstraintKind::Orient, &alpha),
        (ConstraintKind::Point, &alpha),
        (ConstraintKind::Parent, &upper),
    ] {
        mgr.create(&mut scene, kind, &[drv.clone(), target.clone()], &opts)
            .unwrap();
    }

    let labels: Vec<String> = mgr.listing(&scene).map(|entry| entry.label).collect();
    assert_eq!(
        labels,
        vec![
            "Alpha  |  Parent",
            "alpha  |  Point",
            "alpha  |  Orient",
            "beta  |  Point",
        ]
    );

    let third = mgr.record_at(&scene, 2).unwrap();
    assert_eq!(third.key(), RecordKey::new(alpha, ConstraintKind::Orient));
    assert!(mgr.record_at(&scene, 4).is_none());
}

/// it should follow renames and hide records whose target is gone
#[test]
fn listing_tracks_scene_changes() {
    let mut scene = MemoryScene::default();
    let drv = scene.add_transform("driver", [0.0; 3]);
    let first = scene.add_transform("a_first", [0.0; 3]);
    let second = scene.add_transform("b_second", [0.0; 3]);
    let mut mgr = ConstraintManager::new(Config::default(), &scene).unwrap();
    let opts = CreateOptions::default();
    mgr.create(&mut scene, ConstraintKind::Point, &[drv.clone(), first.clone()], &opts)
        .unwrap();
    mgr.create(&mut scene, ConstraintKind::Point, &[drv, second.clone()], &opts)
        .unwrap();

    scene.rename(&first, "z_first").unwrap();
    let names: Vec<String> = mgr.listing(&scene).map(|e| e.target_name).collect();
    assert_eq!(names, vec!["b_second", "z_first"]);

    conman_core::Scene::delete(&mut scene, &second).unwrap();
    let keys: Vec<RecordKey> = mgr.listing(&scene).map(|e| e.key()).collect();
    assert_eq!(keys, vec![RecordKey::new(first, ConstraintKind::Point)]);
}

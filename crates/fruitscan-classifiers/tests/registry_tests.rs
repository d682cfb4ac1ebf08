//! Model registry lifecycle tests

mod common;

use common::{registry_with, scenario_a_logits, MockLoader};
use fruitscan_classifiers::{ModelRegistry, ModelState};
use fruitscan_core::{ClassifierKind, Error};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::time::Duration;

#[test]
fn test_second_call_returns_cached_handle() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new(scenario_a_logits()));
    let registry = registry_with(dir.path(), Arc::clone(&loader));

    assert_eq!(registry.state(ClassifierKind::Shape), ModelState::Unloaded);

    let first = registry.get_or_load(ClassifierKind::Shape, None).unwrap();
    let second = registry.get_or_load(ClassifierKind::Shape, None).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.load_count(), 1);
    assert_eq!(registry.load_count(ClassifierKind::Shape), 1);
    assert_eq!(registry.state(ClassifierKind::Shape), ModelState::Ready);
    assert_eq!(first.spec().kind, ClassifierKind::Shape);
}

#[test]
fn test_kinds_are_cached_independently() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new(scenario_a_logits()));
    let registry = registry_with(dir.path(), Arc::clone(&loader));

    registry.get_or_load(ClassifierKind::Size, None).unwrap();

    assert_eq!(registry.state(ClassifierKind::Size), ModelState::Ready);
    assert_eq!(registry.state(ClassifierKind::Shape), ModelState::Unloaded);
    assert!(registry.get(ClassifierKind::Shape).is_none());
    assert_eq!(registry.load_count(ClassifierKind::Shape), 0);
}

#[test]
fn test_missing_override_path_is_model_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new(scenario_a_logits()));
    let registry = registry_with(dir.path(), Arc::clone(&loader));
    let wrong = dir.path().join("nowhere").join("size.safetensors");

    let err = registry
        .get_or_load(ClassifierKind::Size, Some(&wrong))
        .unwrap_err();

    match err {
        Error::ModelNotFound { path } => assert_eq!(path, wrong),
        other => panic!("expected ModelNotFound, got {}", other),
    }
    assert_eq!(loader.load_count(), 0);
    assert_eq!(registry.state(ClassifierKind::Size), ModelState::Unloaded);

    // The default artifact still loads afterwards.
    registry.get_or_load(ClassifierKind::Size, None).unwrap();
    assert_eq!(registry.state(ClassifierKind::Size), ModelState::Ready);
}

#[test]
fn test_failed_load_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new(scenario_a_logits()).failing_first(1));
    let registry = registry_with(dir.path(), Arc::clone(&loader));

    let err = registry.get_or_load(ClassifierKind::Shape, None).unwrap_err();
    assert!(matches!(err, Error::ArchitectureMismatch { .. }));
    assert_eq!(registry.state(ClassifierKind::Shape), ModelState::Unloaded);
    assert!(registry.get(ClassifierKind::Shape).is_none());

    let handle = registry.get_or_load(ClassifierKind::Shape, None).unwrap();
    assert_eq!(loader.load_count(), 2);
    assert_eq!(registry.load_count(ClassifierKind::Shape), 2);
    assert!(Arc::ptr_eq(&handle, &registry.get(ClassifierKind::Shape).unwrap()));
}

#[test]
fn test_override_ignored_once_ready() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new(scenario_a_logits()));
    let registry = registry_with(dir.path(), Arc::clone(&loader));

    let first = registry.get_or_load(ClassifierKind::Shape, None).unwrap();
    let again = registry
        .get_or_load(ClassifierKind::Shape, Some(Path::new("/does/not/exist.safetensors")))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(loader.load_count(), 1);
    assert!(first
        .weights_path()
        .ends_with("durian_shape_best.pth"));
}

#[test]
fn test_concurrent_first_access_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new(scenario_a_logits()).with_latency(Duration::from_millis(50)));
    let registry = registry_with(dir.path(), Arc::clone(&loader));
    let start = Barrier::new(8);

    let handles: Vec<_> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    registry.get_or_load(ClassifierKind::Size, None).unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(loader.load_count(), 1);
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
}

#[test]
fn test_loading_state_is_observable() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Barrier::new(2));
    let loader = Arc::new(MockLoader::new(scenario_a_logits()).gated(Arc::clone(&gate)));
    let registry: Arc<ModelRegistry> = registry_with(dir.path(), loader);

    let worker = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || registry.get_or_load(ClassifierKind::Shape, None).is_ok())
    };

    // Loader has entered and holds the per-kind lock.
    gate.wait();
    assert_eq!(registry.state(ClassifierKind::Shape), ModelState::Loading);
    assert_eq!(registry.state(ClassifierKind::Size), ModelState::Unloaded);
    gate.wait();

    assert!(worker.join().unwrap());
    assert_eq!(registry.state(ClassifierKind::Shape), ModelState::Ready);
}

#[test]
fn test_preload_all_kinds() {
    let dir = tempfile::tempdir().unwrap();
    let loader = Arc::new(MockLoader::new(scenario_a_logits()));
    let registry = registry_with(dir.path(), Arc::clone(&loader));

    registry.preload(&ClassifierKind::ALL).unwrap();

    for kind in ClassifierKind::ALL {
        assert_eq!(registry.state(kind), ModelState::Ready);
    }
    assert_eq!(loader.load_count(), 2);
}

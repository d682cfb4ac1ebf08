//! End-to-end classification through the real EfficientNet backbones
//!
//! Artifacts are freshly initialized networks saved in the timm parameter
//! layout, so these tests exercise the actual loader and forward pass.

mod common;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use common::png_bytes;
use fruitscan_classifiers::inference::argmax;
use fruitscan_classifiers::{
    round_confidence, AttributeClassifier, ClassifierConfig, ClassifierSpec, EfficientNet,
    ImageSource, ModelState,
};
use fruitscan_core::{ClassifierKind, ErrorKind};
use std::path::{Path, PathBuf};

fn write_artifact(dir: &Path, kind: ClassifierKind) -> PathBuf {
    let spec = ClassifierSpec::of(kind);
    let path = dir.join(format!("{}.safetensors", kind));

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    EfficientNet::new(vb, spec.architecture.config(), spec.num_classes()).unwrap();
    varmap.save(&path).unwrap();
    path
}

fn classify_with_real_network(kind: ClassifierKind) {
    let dir = tempfile::tempdir().unwrap();
    let weights = write_artifact(dir.path(), kind);
    let config = ClassifierConfig::default()
        .with_models_dir(dir.path())
        .with_weights(kind, &weights);
    let classifier = AttributeClassifier::from_config(config).unwrap();

    let image = ImageSource::from(png_bytes(96, 64, [180, 150, 70]));
    let result = classifier.classify(&image, kind, None);

    let prediction = result
        .as_success()
        .unwrap_or_else(|| panic!("{} classification failed: {:?}", kind, result));
    let raw = &prediction.raw_probabilities;
    let spec = ClassifierSpec::of(kind);

    assert_eq!(raw.len(), spec.num_classes());
    let total: f32 = raw.iter().sum();
    assert!((total - 1.0).abs() < 1e-4, "probabilities sum to {}", total);
    assert_eq!(Some(prediction.class_index), argmax(raw));
    assert_eq!(prediction.confidence, round_confidence(raw[prediction.class_index]));
    assert!(spec.labels.contains(&prediction.label.as_str()));
    assert_eq!(classifier.registry().state(kind), ModelState::Ready);
}

#[test]
fn test_size_classifier_runs_b0() {
    classify_with_real_network(ClassifierKind::Size);
}

#[test]
fn test_shape_classifier_runs_b3() {
    classify_with_real_network(ClassifierKind::Shape);
}

#[test]
fn test_artifact_for_other_scale_is_architecture_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    // B0 weights offered to the B3 shape classifier
    let weights = write_artifact(dir.path(), ClassifierKind::Size);
    let config = ClassifierConfig::default()
        .with_models_dir(dir.path())
        .with_weights(ClassifierKind::Shape, &weights);
    let classifier = AttributeClassifier::from_config(config).unwrap();

    let image = ImageSource::from(png_bytes(32, 32, [10, 20, 30]));
    let result = classifier.classify(&image, ClassifierKind::Shape, None);

    let failure = result.as_failure().expect("expected a failure");
    assert_eq!(failure.error, ErrorKind::ArchitectureMismatch);
    assert!(!failure.message.contains("backtrace"), "{}", failure.message);
}

//! Mock loaders and image fixtures for integration tests
//!
//! `MockLoader` builds modules that ignore their input and emit fixed
//! logits, so registry and reporter behavior can be tested without real
//! EfficientNet weights.

#![allow(dead_code)]

use candle_core::{Device, Tensor};
use candle_nn::Module;
use fruitscan_classifiers::{
    AttributeClassifier, ClassifierConfig, ClassifierSpec, ModelLoader, ModelRegistry,
};
use fruitscan_core::{ClassifierKind, Error, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

/// Logits whose softmax is exactly `[0.7, 0.2, 0.1]`
pub fn scenario_a_logits() -> Vec<f32> {
    vec![0.7f32.ln(), 0.2f32.ln(), 0.1f32.ln()]
}

/// Module returning the same `[1, n]` logits for every input
pub struct FixedLogits {
    logits: Vec<f32>,
}

impl Module for FixedLogits {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        Tensor::new(self.logits.as_slice(), xs.device())?.unsqueeze(0)
    }
}

/// Module that panics on every forward pass
pub struct PanickingModule;

impl Module for PanickingModule {
    fn forward(&self, _xs: &Tensor) -> candle_core::Result<Tensor> {
        panic!("simulated kernel fault")
    }
}

/// A configurable mock loader
pub struct MockLoader {
    logits: Vec<f32>,
    simulated_latency: Option<Duration>,
    failures_remaining: AtomicUsize,
    panics: bool,
    gate: Option<Arc<Barrier>>,
    load_count: AtomicUsize,
}

impl MockLoader {
    /// Create a loader producing modules with these logits
    pub fn new(logits: Vec<f32>) -> Self {
        Self {
            logits,
            simulated_latency: None,
            failures_remaining: AtomicUsize::new(0),
            panics: false,
            gate: None,
            load_count: AtomicUsize::new(0),
        }
    }

    /// Sleep inside every load
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    /// Fail the first `n` loads with an architecture mismatch
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Build modules that panic when run
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Wait on `gate` twice inside each load: once on entry, once before returning
    pub fn gated(mut self, gate: Arc<Barrier>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of times `load` was called
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }
}

impl ModelLoader for MockLoader {
    fn load(
        &self,
        spec: &ClassifierSpec,
        _weights_path: &Path,
        _device: &Device,
    ) -> Result<Box<dyn Module + Send + Sync>> {
        self.load_count.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.wait();
            gate.wait();
        }

        if let Some(latency) = self.simulated_latency {
            std::thread::sleep(latency);
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::architecture_mismatch(
                spec.architecture.as_str(),
                "shape mismatch for classifier.weight",
            ));
        }

        if self.panics {
            return Ok(Box::new(PanickingModule));
        }

        Ok(Box::new(FixedLogits {
            logits: self.logits.clone(),
        }))
    }
}

/// Models directory containing placeholder artifacts for every kind
pub fn models_dir_with_defaults(dir: &Path) -> PathBuf {
    let models = dir.join("models");
    std::fs::create_dir_all(&models).unwrap();
    for kind in ClassifierKind::ALL {
        std::fs::write(models.join(ClassifierSpec::of(kind).default_weights), b"weights").unwrap();
    }
    models
}

/// Registry over `loader` whose default artifacts all exist
pub fn registry_with(dir: &Path, loader: Arc<MockLoader>) -> Arc<ModelRegistry> {
    let config = ClassifierConfig::default().with_models_dir(models_dir_with_defaults(dir));
    Arc::new(ModelRegistry::with_loader(config, loader).unwrap())
}

/// Classifier over `loader` whose default artifacts all exist
pub fn classifier_with(dir: &Path, loader: Arc<MockLoader>) -> AttributeClassifier {
    AttributeClassifier::new(registry_with(dir, loader))
}

/// In-memory PNG of a solid color
pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Write a PNG fixture to disk
pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_bytes(320, 240, [120, 160, 40])).unwrap();
    path
}

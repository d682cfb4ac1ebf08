//! Lazily loaded, per-kind model cache

use crate::config::ClassifierConfig;
use crate::model_loader::{EfficientNetLoader, ModelHandle, ModelLoader};
use crate::spec::ClassifierSpec;
use candle_core::Device;
use fruitscan_core::{ClassifierKind, Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Observable lifecycle of one classifier kind.
///
/// A failed load leaves no trace: the kind reads as `Unloaded` again and the
/// next request retries from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Default)]
struct ModelSlot {
    /// Written at most once, read without locking afterwards
    ready: OnceLock<Arc<ModelHandle>>,
    /// Serializes the first-access race for this kind only
    load_lock: Mutex<()>,
    /// Number of deserializations attempted
    loads: AtomicUsize,
}

/// Registry owning the inference-ready handle for every classifier kind
pub struct ModelRegistry {
    config: ClassifierConfig,
    loader: Arc<dyn ModelLoader>,
    device: Device,
    slots: [ModelSlot; ClassifierKind::COUNT],
}

impl ModelRegistry {
    /// Create a registry using the EfficientNet loader
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        Self::with_loader(config, Arc::new(EfficientNetLoader))
    }

    /// Create a registry with a custom loader
    pub fn with_loader(config: ClassifierConfig, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        let device = config.device.to_device_type().create_device()?;
        info!(
            "Model registry using {} from {}",
            if device.is_cpu() { "cpu" } else { "accelerator" },
            config.models_dir.display()
        );

        Ok(Self {
            config,
            loader,
            device,
            slots: std::array::from_fn(|_| ModelSlot::default()),
        })
    }

    fn slot(&self, kind: ClassifierKind) -> &ModelSlot {
        &self.slots[kind.index()]
    }

    /// Registry configuration
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Device handles are loaded onto
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Weight path used when loading `kind`.
    ///
    /// Explicit override, then the configured per-kind path, then the kind's
    /// default file inside the models directory.
    pub fn resolve_weights_path(&self, kind: ClassifierKind, weights_path: Option<&Path>) -> PathBuf {
        if let Some(path) = weights_path {
            return path.to_path_buf();
        }
        if let Some(path) = self.config.weights.get(&kind) {
            return path.clone();
        }
        self.config
            .models_dir
            .join(ClassifierSpec::of(kind).default_weights)
    }

    /// Return the cached handle for `kind`, loading it on first use.
    ///
    /// Concurrent first calls for the same kind block on a per-kind lock;
    /// exactly one of them deserializes and the rest observe its result.
    /// Failures are not cached.
    pub fn get_or_load(
        &self,
        kind: ClassifierKind,
        weights_path: Option<&Path>,
    ) -> Result<Arc<ModelHandle>> {
        let slot = self.slot(kind);
        if let Some(handle) = slot.ready.get() {
            log_override_ignored(handle, weights_path);
            return Ok(Arc::clone(handle));
        }

        let _guard = slot.load_lock.lock();
        if let Some(handle) = slot.ready.get() {
            debug!("{} model loaded by a concurrent caller", kind);
            log_override_ignored(handle, weights_path);
            return Ok(Arc::clone(handle));
        }

        let path = self.resolve_weights_path(kind, weights_path);
        if !path.exists() {
            warn!("{} model not found at {}", kind, path.display());
            record_load(kind, "not_found");
            return Err(Error::model_not_found(path));
        }

        let spec = ClassifierSpec::of(kind);
        info!(
            "Loading {} model ({}, {} classes) from {}",
            kind,
            spec.architecture,
            spec.num_classes(),
            path.display()
        );

        slot.loads.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let model = match self.loader.load(spec, &path, &self.device) {
            Ok(model) => model,
            Err(e) => {
                warn!("Failed to load {} model from {}: {}", kind, path.display(), e);
                record_load(kind, e.kind().as_str());
                return Err(e);
            }
        };

        let handle = Arc::new(ModelHandle::new(spec, model, self.device.clone(), path));
        // Only the lock holder writes, so the slot is still empty here.
        let _ = slot.ready.set(Arc::clone(&handle));

        info!(
            "✓ Loaded {} model in {}ms",
            kind,
            start.elapsed().as_millis()
        );
        record_load(kind, "ok");

        Ok(handle)
    }

    /// Cached handle, if `kind` is ready
    pub fn get(&self, kind: ClassifierKind) -> Option<Arc<ModelHandle>> {
        self.slot(kind).ready.get().cloned()
    }

    /// Current lifecycle state of `kind`
    pub fn state(&self, kind: ClassifierKind) -> ModelState {
        let slot = self.slot(kind);
        if slot.ready.get().is_some() {
            ModelState::Ready
        } else if slot.load_lock.is_locked() {
            ModelState::Loading
        } else {
            ModelState::Unloaded
        }
    }

    /// Number of deserializations performed for `kind`
    pub fn load_count(&self, kind: ClassifierKind) -> usize {
        self.slot(kind).loads.load(Ordering::SeqCst)
    }

    /// Load every listed kind from its resolved default path
    pub fn preload(&self, kinds: &[ClassifierKind]) -> Result<()> {
        for kind in kinds {
            self.get_or_load(*kind, None)?;
        }
        Ok(())
    }
}

fn log_override_ignored(handle: &ModelHandle, weights_path: Option<&Path>) {
    if let Some(path) = weights_path {
        if path != handle.weights_path() {
            debug!(
                "{} model already loaded from {}, ignoring {}",
                handle.spec().kind,
                handle.weights_path().display(),
                path.display()
            );
        }
    }
}

fn record_load(kind: ClassifierKind, outcome: &'static str) {
    metrics::counter!(
        "fruitscan_model_loads_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

//! Model loading for Candle-based image classifiers

use crate::efficientnet::EfficientNet;
use crate::spec::ClassifierSpec;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Module, VarBuilder};
use fruitscan_core::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// CPU inference (always available)
    Cpu,
    /// CUDA GPU inference (if available)
    Cuda(usize), // GPU index
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl DeviceType {
    /// Create the Candle device
    pub fn create_device(self) -> Result<Device> {
        match self {
            Self::Cpu => Ok(Device::Cpu),
            Self::Cuda(idx) => Device::new_cuda(idx).map_err(|e| {
                Error::config(format!("Failed to create CUDA device: {}", candle_message(&e)))
            }),
            Self::Metal(idx) => Device::new_metal(idx).map_err(|e| {
                Error::config(format!("Failed to create Metal device: {}", candle_message(&e)))
            }),
        }
    }
}

/// Weight artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// SafeTensors format (recommended)
    SafeTensors,
    /// PyTorch state dict
    PyTorch,
}

impl ModelFormat {
    /// Pick the format from the artifact extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pth") | Some("pt") | Some("bin") => Self::PyTorch,
            _ => Self::SafeTensors,
        }
    }
}

/// Builds an inference-ready network for a classifier from a weight artifact.
///
/// The registry has already checked that `weights_path` exists when this is
/// called. Implementations map structural problems to
/// `Error::ArchitectureMismatch`.
pub trait ModelLoader: Send + Sync {
    /// Deserialize the artifact into a forward-only module
    fn load(
        &self,
        spec: &ClassifierSpec,
        weights_path: &Path,
        device: &Device,
    ) -> Result<Box<dyn Module + Send + Sync>>;
}

/// Default loader: EfficientNet backbones with a resized classification head
#[derive(Debug, Clone, Copy, Default)]
pub struct EfficientNetLoader;

impl ModelLoader for EfficientNetLoader {
    fn load(
        &self,
        spec: &ClassifierSpec,
        weights_path: &Path,
        device: &Device,
    ) -> Result<Box<dyn Module + Send + Sync>> {
        let vb = load_var_builder(weights_path, device)?;

        // Head width comes from the label list, not from the artifact.
        let model = EfficientNet::new(vb, spec.architecture.config(), spec.num_classes())
            .map_err(|e| {
                Error::architecture_mismatch(spec.architecture.as_str(), candle_message(&e))
            })?;

        Ok(Box::new(model))
    }
}

fn load_var_builder(weights_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    match ModelFormat::from_path(weights_path) {
        ModelFormat::SafeTensors => {
            // SAFETY: the artifact is treated as read-only for the process lifetime.
            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)
            };
            vb.map_err(|e| {
                Error::internal(format!(
                    "Failed to read SafeTensors {}: {}",
                    weights_path.display(),
                    candle_message(&e)
                ))
            })
        }
        ModelFormat::PyTorch => VarBuilder::from_pth(weights_path, DType::F32, device).map_err(|e| {
            Error::internal(format!(
                "Failed to read PyTorch weights {}: {}",
                weights_path.display(),
                candle_message(&e)
            ))
        }),
    }
}

/// Operator-facing text for a Candle error.
///
/// Candle wraps errors in backtrace, context and path layers whose `Display`
/// either repeats the backtrace or drops the context, so unwrap them here.
pub(crate) fn candle_message(err: &candle_core::Error) -> String {
    match err {
        candle_core::Error::WithBacktrace { inner, .. } => candle_message(inner),
        candle_core::Error::Context { inner, context } => {
            format!("{}: {}", context, candle_message(inner))
        }
        candle_core::Error::WithPath { inner, path } => {
            format!("{}: {}", path.display(), candle_message(inner))
        }
        other => other.to_string(),
    }
}

/// Immutable, inference-only model bound to its classifier description.
///
/// Only the registry constructs handles; everyone else shares them through
/// `Arc` and never mutates them.
pub struct ModelHandle {
    spec: &'static ClassifierSpec,
    model: Box<dyn Module + Send + Sync>,
    device: Device,
    weights_path: PathBuf,
}

impl ModelHandle {
    pub(crate) fn new(
        spec: &'static ClassifierSpec,
        model: Box<dyn Module + Send + Sync>,
        device: Device,
        weights_path: PathBuf,
    ) -> Self {
        Self {
            spec,
            model,
            device,
            weights_path,
        }
    }

    /// Spec this handle was built for
    pub fn spec(&self) -> &'static ClassifierSpec {
        self.spec
    }

    /// Device holding the weights
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Artifact the weights were read from
    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    /// Raw logits for a preprocessed batch
    pub(crate) fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        self.model.forward(input)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("kind", &self.spec.kind)
            .field("architecture", &self.spec.architecture)
            .field("device", &self.device)
            .field("weights_path", &self.weights_path)
            .finish()
    }
}

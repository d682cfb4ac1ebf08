//! fruitscan Classifiers
//!
//! Shape and size classification of fruit photos with two independently
//! trained EfficientNet classifiers.
//!
//! The subsystem is split into four stages:
//! - `registry`: lazily loads and caches one immutable model per kind
//! - `preprocess`: decodes, resizes and normalizes an image into a tensor
//! - `inference`: forward pass, softmax and argmax
//! - `reporter`: orchestrates the stages and returns a uniform envelope
//!
//! Every call is blocking and CPU-bound. Callers that need timeouts or
//! cancellation wrap the call themselves.

pub mod config;
pub mod efficientnet;
pub mod inference;
pub mod model_loader;
pub mod preprocess;
pub mod registry;
pub mod reporter;
pub mod spec;

pub use config::{ClassifierConfig, DeviceSpec};
pub use efficientnet::{EfficientNet, EfficientNetConfig};
pub use inference::Inference;
pub use model_loader::{DeviceType, EfficientNetLoader, ModelFormat, ModelHandle, ModelLoader};
pub use preprocess::ImageSource;
pub use registry::{ModelRegistry, ModelState};
pub use reporter::{
    round_confidence, AttributeClassifier, Prediction, PredictionFailure, PredictionResult,
};
pub use spec::{Architecture, ClassifierSpec, Normalization, IMAGENET, SHAPE_SPEC, SIZE_SPEC};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::ClassifierConfig;
    pub use crate::preprocess::ImageSource;
    pub use crate::registry::ModelRegistry;
    pub use crate::reporter::{AttributeClassifier, PredictionResult};
    pub use fruitscan_core::{ClassifierKind, ErrorKind};
}

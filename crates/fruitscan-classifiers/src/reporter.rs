//! Classification entry point and result envelopes
//!
//! `AttributeClassifier::classify` never fails and never panics outward:
//! every error or panic from the registry, preprocessor or inference engine
//! comes back as a `PredictionResult::Failure`.

use crate::config::ClassifierConfig;
use crate::inference::{self, Inference};
use crate::preprocess::{self, ImageSource};
use crate::registry::ModelRegistry;
use fruitscan_core::{ClassifierKind, Error, ErrorKind, Result};
use image::RgbImage;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Round a confidence to the 4 decimal places shown to users
pub fn round_confidence(confidence: f32) -> f64 {
    (f64::from(confidence) * 10_000.0).round() / 10_000.0
}

/// Successful prediction
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub kind: ClassifierKind,
    pub label: String,
    /// Rounded for display; compare against `raw_probabilities` instead
    pub confidence: f64,
    pub class_index: usize,
    /// Full-precision softmax output, one entry per class
    pub raw_probabilities: Vec<f32>,
}

/// Failed prediction
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionFailure {
    pub kind: ClassifierKind,
    pub error: ErrorKind,
    pub message: String,
}

/// Envelope returned for every classification request
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionResult {
    Success(Prediction),
    Failure(PredictionFailure),
}

impl PredictionResult {
    /// Build a failure envelope from an error
    pub fn from_error(kind: ClassifierKind, error: &Error) -> Self {
        Self::Failure(PredictionFailure {
            kind,
            error: error.kind(),
            message: error.to_string(),
        })
    }

    fn from_inference(kind: ClassifierKind, label: String, inference: Inference) -> Self {
        Self::Success(Prediction {
            kind,
            label,
            confidence: round_confidence(inference.confidence),
            class_index: inference.class_index,
            raw_probabilities: inference.probabilities,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Classifier kind the result belongs to
    pub fn kind(&self) -> ClassifierKind {
        match self {
            Self::Success(prediction) => prediction.kind,
            Self::Failure(failure) => failure.kind,
        }
    }

    pub fn as_success(&self) -> Option<&Prediction> {
        match self {
            Self::Success(prediction) => Some(prediction),
            Self::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&PredictionFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Error kind on failure
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.as_failure().map(|failure| failure.error)
    }
}

impl Serialize for PredictionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Success(prediction) => {
                let mut map = serializer.serialize_map(Some(5))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry(prediction.kind.label_field(), &prediction.label)?;
                map.serialize_entry("confidence", &prediction.confidence)?;
                map.serialize_entry("class_index", &prediction.class_index)?;
                map.serialize_entry("raw", &prediction.raw_probabilities)?;
                map.end()
            }
            Self::Failure(failure) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", &failure.error)?;
                map.serialize_entry("message", &failure.message)?;
                map.end()
            }
        }
    }
}

/// Decodes the source on first use and keeps the pixels for later kinds
struct LazyImage<'a> {
    source: &'a ImageSource,
    decoded: Option<RgbImage>,
}

impl<'a> LazyImage<'a> {
    fn new(source: &'a ImageSource) -> Self {
        Self {
            source,
            decoded: None,
        }
    }

    fn get(&mut self) -> Result<&RgbImage> {
        if self.decoded.is_none() {
            self.decoded = Some(preprocess::decode(self.source)?);
        }
        self.decoded
            .as_ref()
            .ok_or_else(|| Error::internal("decoded image missing"))
    }
}

/// Shape and size classification over a shared model registry
#[derive(Clone)]
pub struct AttributeClassifier {
    registry: Arc<ModelRegistry>,
}

impl AttributeClassifier {
    /// Create a classifier over an existing registry
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Create a classifier with its own EfficientNet-backed registry
    pub fn from_config(config: ClassifierConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(ModelRegistry::new(config)?)))
    }

    /// Underlying model registry
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Classify one image with one classifier kind.
    ///
    /// `weights_path` only matters on the first successful load of `kind`.
    pub fn classify(
        &self,
        source: &ImageSource,
        kind: ClassifierKind,
        weights_path: Option<&Path>,
    ) -> PredictionResult {
        let mut image = LazyImage::new(source);
        self.classify_lazy(&mut image, kind, weights_path)
    }

    /// Classify one image with several kinds, decoding it at most once
    pub fn classify_all(
        &self,
        source: &ImageSource,
        kinds: &[ClassifierKind],
    ) -> Vec<PredictionResult> {
        let mut image = LazyImage::new(source);
        kinds
            .iter()
            .map(|kind| self.classify_lazy(&mut image, *kind, None))
            .collect()
    }

    fn classify_lazy(
        &self,
        image: &mut LazyImage<'_>,
        kind: ClassifierKind,
        weights_path: Option<&Path>,
    ) -> PredictionResult {
        let start = Instant::now();
        let result = match catch_fault(|| self.run(image, kind, weights_path)) {
            Ok(result) => result,
            Err(e) => PredictionResult::from_error(kind, &e),
        };

        record_outcome(&result, start);
        result
    }

    fn run(
        &self,
        image: &mut LazyImage<'_>,
        kind: ClassifierKind,
        weights_path: Option<&Path>,
    ) -> Result<PredictionResult> {
        let handle = self.registry.get_or_load(kind, weights_path)?;
        let spec = handle.spec();

        let input = preprocess::prepare_rgb(image.get()?, spec, handle.device())?;
        let inference = inference::infer(&handle, &input)?;
        let label = inference::resolve_label(spec, inference.class_index);

        debug!(
            "{} classified as {} ({:.4})",
            kind, label, inference.confidence
        );

        Ok(PredictionResult::from_inference(kind, label, inference))
    }
}

/// Run `f`, converting a panic into `Error::Internal`
fn catch_fault<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Error::internal(format!(
            "classifier panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

fn record_outcome(result: &PredictionResult, start: Instant) {
    let kind = result.kind();
    let outcome = match result {
        PredictionResult::Success(_) => "success",
        PredictionResult::Failure(failure) => {
            warn!(
                "{} classification failed ({}): {}",
                kind, failure.error, failure.message
            );
            failure.error.as_str()
        }
    };

    metrics::counter!(
        "fruitscan_predictions_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("fruitscan_inference_latency_us", "kind" => kind.as_str())
        .record(start.elapsed().as_micros() as f64);
}

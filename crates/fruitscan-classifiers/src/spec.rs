//! Static classifier descriptions
//!
//! One `ClassifierSpec` exists per `ClassifierKind`. A spec bundles the
//! backbone, the input contract and the label ordering so the three cannot
//! drift apart.
//!
//! # Label ordering (deployment contract)
//!
//! `labels` must equal the alphabetical ordering of the category folders the
//! classifier was trained on. The classifier head emits one logit per folder
//! in that order; nothing in the weight artifact records the names, so a
//! reordering here silently mislabels every prediction. Operators replacing
//! an artifact must check its training folders against `fruitscan specs`.
//!
//! # Load failures
//!
//! There is no failed model state. A load that errors leaves the kind
//! `Unloaded`, so `fruitscan preload` reports `unloaded` together with the
//! error kind and message, and the next request retries the load.

use crate::efficientnet::EfficientNetConfig;
use fruitscan_core::ClassifierKind;
use serde::Serialize;
use std::fmt;

/// Backbone architectures known to the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Architecture {
    /// EfficientNet-B0 (224px native)
    #[serde(rename = "efficientnet_b0")]
    EfficientNetB0,
    /// EfficientNet-B3 (300px native)
    #[serde(rename = "efficientnet_b3")]
    EfficientNetB3,
}

impl Architecture {
    /// Identifier used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EfficientNetB0 => "efficientnet_b0",
            Self::EfficientNetB3 => "efficientnet_b3",
        }
    }

    /// Compound-scaling coefficients for this scale
    pub fn config(&self) -> EfficientNetConfig {
        match self {
            Self::EfficientNetB0 => EfficientNetConfig::B0,
            Self::EfficientNetB3 => EfficientNetConfig::B3,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel normalization constants (RGB order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Standard ImageNet statistics
pub const IMAGENET: Normalization = Normalization {
    mean: [0.485, 0.456, 0.406],
    std: [0.229, 0.224, 0.225],
};

/// Static description of one classifier
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierSpec {
    pub kind: ClassifierKind,
    pub architecture: Architecture,
    /// Square input side in pixels
    pub resolution: u32,
    pub normalization: Normalization,
    /// Alphabetical order of the training folders
    pub labels: &'static [&'static str],
    /// Artifact file name inside the models directory
    pub default_weights: &'static str,
}

pub static SHAPE_SPEC: ClassifierSpec = ClassifierSpec {
    kind: ClassifierKind::Shape,
    architecture: Architecture::EfficientNetB3,
    resolution: 300,
    normalization: IMAGENET,
    labels: &["Elongated", "Irregular", "Round"],
    default_weights: "durian_shape_best.pth",
};

pub static SIZE_SPEC: ClassifierSpec = ClassifierSpec {
    kind: ClassifierKind::Size,
    architecture: Architecture::EfficientNetB0,
    resolution: 224,
    normalization: IMAGENET,
    labels: &["large", "medium", "small"],
    default_weights: "durian_size_best.pth",
};

impl ClassifierSpec {
    /// Spec for a classifier kind
    pub fn of(kind: ClassifierKind) -> &'static ClassifierSpec {
        match kind {
            ClassifierKind::Shape => &SHAPE_SPEC,
            ClassifierKind::Size => &SIZE_SPEC,
        }
    }

    /// Width of the classification head
    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Expected preprocessed tensor shape
    pub fn input_dims(&self) -> [usize; 4] {
        let side = self.resolution as usize;
        [1, 3, side, side]
    }

    /// Label for a class index, or the stringified index when out of range
    pub fn label(&self, class_index: usize) -> String {
        self.labels
            .get(class_index)
            .map(|label| label.to_string())
            .unwrap_or_else(|| class_index.to_string())
    }
}

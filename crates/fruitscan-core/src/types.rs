//! Core types for fruitscan

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which attribute classifier to run.
///
/// The set is closed: every kind has exactly one static `ClassifierSpec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Fruit shape category
    Shape,
    /// Fruit size category
    Size,
}

impl ClassifierKind {
    /// Number of kinds
    pub const COUNT: usize = 2;

    /// Every kind, in a stable order
    pub const ALL: [ClassifierKind; Self::COUNT] = [ClassifierKind::Shape, ClassifierKind::Size];

    /// Lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shape => "shape",
            Self::Size => "size",
        }
    }

    /// Envelope key carrying the predicted label (`shape_class`, `size_class`)
    pub fn label_field(&self) -> &'static str {
        match self {
            Self::Shape => "shape_class",
            Self::Size => "size_class",
        }
    }

    /// Dense index, usable for fixed-size per-kind tables
    pub fn index(&self) -> usize {
        match self {
            Self::Shape => 0,
            Self::Size => 1,
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shape" => Ok(Self::Shape),
            "size" => Ok(Self::Size),
            other => Err(format!("unknown classifier kind '{}' (expected shape or size)", other)),
        }
    }
}

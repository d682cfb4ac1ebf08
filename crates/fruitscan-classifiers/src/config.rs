//! Configuration for classifiers and model loading

use crate::model_loader::DeviceType;
use fruitscan_core::{ClassifierKind, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration for the classifier subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Directory holding the weight artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Per-kind weight artifact overrides
    #[serde(default)]
    pub weights: HashMap<ClassifierKind, PathBuf>,
}

/// Device selection (for config files and flags)
///
/// Written the same way in YAML and on the command line: `cpu`, `cuda`,
/// `cuda:N`, `metal` or `metal:N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

impl DeviceSpec {
    /// Convert to the loader's device type
    pub fn to_device_type(self) -> DeviceType {
        match self {
            Self::Cpu => DeviceType::Cpu,
            Self::Cuda { index } => DeviceType::Cuda(index.unwrap_or(0)),
            Self::Metal { index } => DeviceType::Metal(index.unwrap_or(0)),
        }
    }
}

impl std::str::FromStr for DeviceSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let (name, index) = match lower.split_once(':') {
            Some((name, idx)) => {
                let idx = idx
                    .parse::<usize>()
                    .map_err(|_| format!("invalid device index in '{}'", s))?;
                (name.to_string(), Some(idx))
            }
            None => (lower, None),
        };

        match name.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda { index }),
            "metal" | "mps" => Ok(Self::Metal { index }),
            _ => Err(format!("unknown device '{}' (expected cpu, cuda[:N] or metal[:N])", s)),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(device: DeviceSpec) -> Self {
        device.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda { index: None } => write!(f, "cuda"),
            Self::Cuda { index: Some(idx) } => write!(f, "cuda:{}", idx),
            Self::Metal { index: None } => write!(f, "metal"),
            Self::Metal { index: Some(idx) } => write!(f, "metal:{}", idx),
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            device: DeviceSpec::default(),
            weights: HashMap::new(),
        }
    }
}

impl ClassifierConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::config(format!("invalid classifier config {}: {}", path.display(), e)))
    }

    /// Load configuration from a file if it exists, otherwise defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No classifier config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid classifier config: {}", e)))
    }

    /// Set the models directory
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    /// Set the device
    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.device = device;
        self
    }

    /// Override the weight artifact for one kind
    pub fn with_weights(mut self, kind: ClassifierKind, path: impl Into<PathBuf>) -> Self {
        self.weights.insert(kind, path.into());
        self
    }
}

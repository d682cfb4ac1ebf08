//! Subcommand runners
//!
//! Classification is CPU-bound, so every call runs on tokio's blocking pool.
//! A caller-imposed timeout stops waiting for the result; the blocking task
//! itself runs to completion in the background.

use fruitscan_classifiers::{
    AttributeClassifier, ClassifierSpec, ImageSource, ModelRegistry, ModelState, PredictionResult,
};
use fruitscan_core::{ClassifierKind, Error, ErrorKind, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Await a blocking task, optionally bounded by `timeout`
pub async fn join_with_timeout<T>(task: JoinHandle<T>, timeout: Option<Duration>) -> Result<T> {
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
            Error::internal(format!(
                "classification timed out after {}ms",
                limit.as_millis()
            ))
        })?,
        None => task.await,
    };

    joined.map_err(|e| Error::internal(format!("classification task failed: {}", e)))
}

/// Classify one image with one kind
pub async fn classify(
    classifier: AttributeClassifier,
    kind: ClassifierKind,
    image: PathBuf,
    weights: Option<PathBuf>,
    timeout: Option<Duration>,
) -> PredictionResult {
    debug!("Classifying {} with the {} classifier", image.display(), kind);
    let source = ImageSource::from(image);
    let task = tokio::task::spawn_blocking(move || {
        classifier.classify(&source, kind, weights.as_deref())
    });

    join_with_timeout(task, timeout)
        .await
        .unwrap_or_else(|e| PredictionResult::from_error(kind, &e))
}

/// Classify one image with every kind, keyed by kind name
pub async fn scan(
    classifier: AttributeClassifier,
    image: PathBuf,
    timeout: Option<Duration>,
) -> BTreeMap<&'static str, PredictionResult> {
    debug!("Scanning {}", image.display());
    let source = ImageSource::from(image);
    let task = tokio::task::spawn_blocking(move || {
        classifier.classify_all(&source, &ClassifierKind::ALL)
    });

    let results = match join_with_timeout(task, timeout).await {
        Ok(results) => results,
        Err(e) => ClassifierKind::ALL
            .iter()
            .map(|kind| PredictionResult::from_error(*kind, &e))
            .collect(),
    };

    results
        .into_iter()
        .map(|result| (result.kind().as_str(), result))
        .collect()
}

/// One classifier's static description plus the artifact it would load
#[derive(Debug, Serialize)]
pub struct SpecReport {
    #[serde(flatten)]
    pub spec: &'static ClassifierSpec,
    pub weights: PathBuf,
}

/// Describe every classifier kind
pub fn specs(registry: &ModelRegistry) -> Vec<SpecReport> {
    ClassifierKind::ALL
        .iter()
        .map(|kind| SpecReport {
            spec: ClassifierSpec::of(*kind),
            weights: registry.resolve_weights_path(*kind, None),
        })
        .collect()
}

/// Outcome of warming up one kind
#[derive(Debug, Serialize)]
pub struct LoadReport {
    pub state: ModelState,
    pub weights: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LoadReport {
    pub fn is_ready(&self) -> bool {
        self.state == ModelState::Ready
    }
}

/// Load every kind, reporting each outcome separately
pub async fn preload(
    classifier: AttributeClassifier,
) -> Result<BTreeMap<&'static str, LoadReport>> {
    let task = tokio::task::spawn_blocking(move || {
        let registry = classifier.registry();
        ClassifierKind::ALL
            .iter()
            .map(|kind| {
                let weights = registry.resolve_weights_path(*kind, None);
                let outcome = registry.get_or_load(*kind, None);
                let report = LoadReport {
                    state: registry.state(*kind),
                    weights,
                    error: outcome.as_ref().err().map(Error::kind),
                    message: outcome.err().map(|e| e.to_string()),
                };
                (kind.as_str(), report)
            })
            .collect::<BTreeMap<_, _>>()
    });

    let reports = join_with_timeout(task, None).await?;
    let ready = reports.values().filter(|r| r.is_ready()).count();
    info!("{}/{} classifiers ready", ready, reports.len());
    Ok(reports)
}

//! Forward pass, softmax and argmax over a cached model handle

use crate::model_loader::{candle_message, ModelHandle};
use crate::spec::ClassifierSpec;
use candle_core::{Tensor, D};
use fruitscan_core::{Error, Result};

/// Probability distribution and decision for one image
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    /// Softmax over the logits, full precision
    pub probabilities: Vec<f32>,
    /// Index of the largest probability, lowest index on ties
    pub class_index: usize,
    /// `probabilities[class_index]`
    pub confidence: f32,
}

/// Run `handle` on a preprocessed `[1, 3, H, W]` tensor.
///
/// Weights are plain tensors rather than trainable variables, so no gradient
/// state is ever built during the pass.
pub fn infer(handle: &ModelHandle, input: &Tensor) -> Result<Inference> {
    let expected = handle.spec().input_dims();
    if input.dims() != expected.as_slice() {
        return Err(Error::internal(format!(
            "input tensor has shape {:?}, {} classifier expects {:?}",
            input.dims(),
            handle.spec().kind,
            expected
        )));
    }

    let logits = handle.forward(input).map_err(|e| {
        Error::internal(format!("Model forward pass failed: {}", candle_message(&e)))
    })?;

    from_probabilities(softmax(&logits)?)
}

/// Softmax over the class dimension of `[1, num_classes]` logits
pub fn softmax(logits: &Tensor) -> Result<Vec<f32>> {
    match logits.dims() {
        [1, _] => {}
        dims => {
            return Err(Error::internal(format!(
                "expected logits of shape [1, num_classes], got {:?}",
                dims
            )))
        }
    }

    candle_nn::ops::softmax(logits, D::Minus1)
        .and_then(|probs| probs.squeeze(0))
        .and_then(|probs| probs.to_vec1::<f32>())
        .map_err(|e| Error::internal(format!("Softmax failed: {}", candle_message(&e))))
}

/// Pick the predicted class out of a probability vector
pub fn from_probabilities(probabilities: Vec<f32>) -> Result<Inference> {
    if let Some(bad) = probabilities.iter().find(|p| !p.is_finite()) {
        return Err(Error::internal(format!(
            "non-finite probability {} in model output",
            bad
        )));
    }

    let class_index = argmax(&probabilities)
        .ok_or_else(|| Error::internal("model produced no class scores"))?;
    let confidence = probabilities[class_index];

    Ok(Inference {
        probabilities,
        class_index,
        confidence,
    })
}

/// Index of the maximum; the first one wins on ties
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Label for `class_index`, falling back to the stringified index.
///
/// An out-of-range index means the artifact's head is wider than the configured
/// label list, which is a deployment error rather than a property of the
/// image.
pub fn resolve_label(spec: &ClassifierSpec, class_index: usize) -> String {
    if class_index >= spec.num_classes() {
        tracing::warn!(
            "{} classifier predicted index {} but only {} labels are configured",
            spec.kind,
            class_index,
            spec.num_classes()
        );
    }
    spec.label(class_index)
}

//! Semantic embedding via a fixed pretrained convolutional classifier.
//!
//! The extractor is a classifier with its head removed: images go in,
//! one feature vector comes out, and the Euclidean distance between the
//! two vectors of a pair is the pipeline's global-dissimilarity signal.
//!
//! The concrete implementation runs an ONNX model through `tract`. It is
//! deliberately hidden behind the [`FeatureEmbedder`] trait so the
//! pipeline never touches inference machinery directly and tests can
//! inject a stub.

use std::path::Path;

use image::{RgbImage, imageops};
use tract_onnx::prelude::*;

use crate::types::AnalysisError;

/// Input edge length expected by the extractor.
pub const INPUT_SIZE: u32 = 224;

/// Per-channel means of the extractor's training distribution (RGB).
const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviations of the training distribution (RGB).
const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Produces one embedding vector per image.
///
/// Implementations must be immutable after construction: `embed` takes
/// `&self` and has no observable side effects, so one instance can be
/// shared read-only across threads without locking.
pub trait FeatureEmbedder: Send + Sync {
    /// Compute the embedding vector for one RGB image.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Extractor`] when inference fails.
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, AnalysisError>;
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Fixed pretrained feature extractor executed with `tract-onnx`.
///
/// Loading parses and optimizes the model graph, which is expensive:
/// construct the extractor once per process at startup and share the
/// handle (it is `Send + Sync`, an `Arc` works). The weights are never
/// mutated after [`load`](Self::load) returns.
pub struct OnnxFeatureExtractor {
    plan: OnnxPlan,
}

impl OnnxFeatureExtractor {
    /// Load an ONNX image classifier with its classification head
    /// removed (the model's output must be the penultimate feature
    /// vector, e.g. an exported ResNet-50 with `fc` replaced by the
    /// identity).
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Extractor`] when the model file cannot
    /// be read, parsed, or optimized. Callers should treat this as fatal
    /// at process-startup granularity rather than per analysis.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let plan = (|| -> TractResult<OnnxPlan> {
            tract_onnx::onnx()
                .model_for_path(path)?
                .with_input_fact(
                    0,
                    f32::fact([1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize]).into(),
                )?
                .into_optimized()?
                .into_runnable()
        })()
        .map_err(|e| {
            AnalysisError::Extractor(format!(
                "failed to load model from {}: {e}",
                path.display(),
            ))
        })?;

        Ok(Self { plan })
    }
}

impl FeatureEmbedder for OnnxFeatureExtractor {
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, AnalysisError> {
        let resized = imageops::resize(
            image,
            INPUT_SIZE,
            INPUT_SIZE,
            imageops::FilterType::Triangle,
        );

        // NCHW float tensor, normalized per channel to the training
        // distribution.
        let input: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
            |(_, c, y, x)| {
                #[allow(clippy::cast_possible_truncation)]
                let v = f32::from(resized.get_pixel(x as u32, y as u32).0[c]) / 255.0;
                (v - CHANNEL_MEAN[c]) / CHANNEL_STD[c]
            },
        )
        .into();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| AnalysisError::Extractor(format!("inference failed: {e}")))?;
        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| AnalysisError::Extractor(format!("unexpected model output: {e}")))?;

        Ok(view.iter().copied().collect())
    }
}

/// Euclidean distance between two embedding vectors.
///
/// Trailing elements of the longer vector are ignored; in practice both
/// vectors come from the same extractor and have equal length.
#[must_use]
pub fn embedding_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

//! stonewatch-pipeline: pairwise structural-change detection (sans-IO).
//!
//! Compares two photographs of the same physical structure taken at
//! different times and produces a localized, risk-graded report:
//! geometric alignment -> global similarity scoring -> multi-signal
//! difference fusion -> false-positive suppression -> region extraction
//! -> spatial clustering -> deterministic risk scoring.
//!
//! This crate has no I/O dependencies beyond reading the ONNX model file
//! at extractor construction -- it operates on decoded in-memory images
//! and returns structured data. Decoding helpers live here
//! ([`decode`]); persistence and presentation live in the collaborating
//! crates.

use std::borrow::Cow;

use image::{RgbImage, imageops};
use tracing::debug;

pub mod align;
pub mod cluster;
pub mod config;
pub mod decode;
pub mod embed;
pub mod fuse;
pub mod regions;
pub mod risk;
pub mod ssim;
pub mod suppress;
pub mod types;

pub use config::DetectorConfig;
pub use decode::decode;
pub use embed::{FeatureEmbedder, OnnxFeatureExtractor, embedding_distance};
pub use types::{
    AnalysisError, AnalysisResult, BoundingBox, Detection, Point, RiskAssessment, RiskLevel,
    RiskMetrics,
};

/// Run the full change-detection pipeline over one image pair.
///
/// `past` is the earlier photograph, `current` the later one; `current`
/// defines the output pixel frame. The embedder is a read-only handle to
/// the process-wide feature extractor (see
/// [`OnnxFeatureExtractor::load`]); the configuration is never mutated.
///
/// Images of differing dimensions are first resized symmetrically to
/// the element-wise minimum of the two sizes, so a dimension mismatch is
/// never an error. Alignment failure degrades to an unaligned
/// comparison and is logged, never raised.
///
/// # Pipeline steps
///
/// 1. Symmetric resize to common dimensions (when needed)
/// 2. Keypoint alignment of `past` onto `current`'s frame
/// 3. Embedding distance and unrelated-subjects classification
/// 4. Structural similarity (scalar score + per-pixel map)
/// 5. Three-signal difference fusion and morphological smoothing
/// 6. Unwanted-surface suppression (vegetation, bright foreign objects)
/// 7. Connected-region extraction with shape filtering
/// 8. Density-based clustering of nearby regions
/// 9. Risk scoring
///
/// # Errors
///
/// Returns [`AnalysisError::Extractor`] when embedding inference fails
/// and [`AnalysisError::Similarity`] when the SSIM computation fails.
/// An unrelated-subjects pair is *not* an error: it yields a normal
/// result with the `ERROR` risk level set.
pub fn analyze(
    past: &RgbImage,
    current: &RgbImage,
    embedder: &dyn FeatureEmbedder,
    config: &DetectorConfig,
) -> Result<AnalysisResult, AnalysisError> {
    // 1. Shape-conform the pair.
    let (past, current) = conform_dimensions(past, current);

    // 2. Register the earlier image onto the later frame.
    let (aligned_past, _outcome) = align::align(past.as_ref(), current.as_ref());

    // 3. Global semantic signal.
    let past_embedding = embedder.embed(&aligned_past)?;
    let current_embedding = embedder.embed(current.as_ref())?;
    let cnn_distance = embedding_distance(&past_embedding, &current_embedding);
    let is_completely_different = cnn_distance > config.completely_different_threshold;

    // 4. Global structural signal.
    let gray_past = imageops::grayscale(&aligned_past);
    let gray_current = imageops::grayscale(current.as_ref());
    let (ssim_score, ssim_map) = ssim::structural_similarity(&gray_past, &gray_current)?;

    // 5-6. Per-pixel change mask, cleaned of unwanted surfaces.
    let fused = fuse::fuse_differences(&ssim_map, &gray_past, &gray_current, config);
    let (filtered, unwanted_area_pixels) =
        suppress::suppress_unwanted(&fused, current.as_ref(), config);

    // 7-8. Localize and de-fragment.
    let raw_regions = regions::extract_regions(&filtered, config);
    let detections = cluster::cluster_detections(raw_regions, config);

    debug!(
        cnn_distance,
        ssim_score,
        detections = detections.len(),
        unwanted_area_pixels,
        "pipeline signals computed",
    );

    // 9. Deterministic risk grading.
    let risk_assessment = risk::assess_risk(
        &detections,
        cnn_distance,
        ssim_score,
        is_completely_different,
        config,
    );

    let total_changes = detections.len();
    Ok(AnalysisResult {
        cnn_distance,
        ssim_score,
        detections,
        risk_assessment,
        total_changes,
        unwanted_area_pixels,
        is_completely_different,
    })
}

/// Resize both images to the element-wise minimum of their dimensions.
///
/// Returns the inputs untouched (borrowed) when they already agree, so
/// the common case costs nothing.
fn conform_dimensions<'a>(
    past: &'a RgbImage,
    current: &'a RgbImage,
) -> (Cow<'a, RgbImage>, Cow<'a, RgbImage>) {
    if past.dimensions() == current.dimensions() {
        return (Cow::Borrowed(past), Cow::Borrowed(current));
    }

    let width = past.width().min(current.width());
    let height = past.height().min(current.height());
    debug!(width, height, "dimension mismatch, resizing both images");
    (
        Cow::Owned(imageops::resize(
            past,
            width,
            height,
            imageops::FilterType::Triangle,
        )),
        Cow::Owned(imageops::resize(
            current,
            width,
            height,
            imageops::FilterType::Triangle,
        )),
    )
}

//! Structural similarity between the aligned grayscale pair.
//!
//! Produces both the scalar SSIM score (the global signal fed to risk
//! assessment) and a dense per-pixel similarity map rescaled to 8 bits
//! (255 = identical), which the difference fuser thresholds.

use image::{GrayImage, imageops};
use image_compare::Algorithm;

use crate::types::AnalysisError;

/// Compute the structural similarity index of two equally-sized
/// grayscale images.
///
/// Returns the scalar score in `[-1, 1]` and the 8-bit similarity map.
/// The map is resampled to the input dimensions if the windowed
/// computation returns a smaller raster, so callers can combine it
/// pixelwise with other signals.
///
/// # Errors
///
/// Returns [`AnalysisError::Similarity`] when the images cannot be
/// compared (dimension mismatch; prevented upstream by the symmetric
/// resize).
pub fn structural_similarity(
    a: &GrayImage,
    b: &GrayImage,
) -> Result<(f64, GrayImage), AnalysisError> {
    let similarity = image_compare::gray_similarity_structure(&Algorithm::MSSIMSimple, a, b)?;

    // `Similarity::image` is an opaque enum whose inner buffer is not
    // publicly reachable; `to_color_map()` is the crate's only public
    // accessor. For the grayscale algorithm it yields an 8-bit luma
    // raster (per-pixel similarity clamped to `[0, 1]` and scaled to 255).
    let map = similarity.image.to_color_map().into_luma8();

    let map = if map.dimensions() == a.dimensions() {
        map
    } else {
        imageops::resize(
            &map,
            a.width(),
            a.height(),
            imageops::FilterType::Nearest,
        )
    };

    Ok((similarity.score, map))
}

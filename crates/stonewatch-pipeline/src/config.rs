//! Detector configuration and named threshold presets.
//!
//! All tunables are explicit, documented fields on an immutable value —
//! never a free-form map. Two presets are provided: [`enhanced`]
//! (permissive thresholds, the default) and [`baseline`] (conservative).
//!
//! [`enhanced`]: DetectorConfig::enhanced
//! [`baseline`]: DetectorConfig::baseline

use serde::{Deserialize, Serialize};

/// Configuration for one analysis invocation.
///
/// Construct via [`DetectorConfig::enhanced`], [`DetectorConfig::baseline`]
/// or `Default` (which is the enhanced preset), then adjust individual
/// fields with struct-update syntax if needed. The value is never mutated
/// by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Embedding distance above which the two photographs are classified
    /// as unrelated subjects rather than two states of one structure.
    pub completely_different_threshold: f64,

    /// Pixels of the 8-bit SSIM map (255 = identical) *below* this value
    /// are marked as changed.
    pub ssim_diff_cutoff: u8,

    /// Absolute grayscale intensity difference above which a pixel is
    /// marked as changed.
    pub intensity_diff_threshold: u8,

    /// Absolute difference of the two Canny edge maps above which a pixel
    /// is marked as changed.
    pub edge_diff_threshold: u8,

    /// Canny low threshold for the edge-difference signal.
    pub canny_low: f32,

    /// Canny high threshold for the edge-difference signal.
    pub canny_high: f32,

    /// Regions smaller than this (pixels) are rejected.
    pub min_region_area: f64,

    /// Regions larger than this (pixels) are rejected.
    pub max_region_area: f64,

    /// Edge length of the square structuring element used to close and
    /// open the fused change mask. Must be odd.
    pub morphology_kernel_size: u8,

    /// Plausible width/height range for a structural region; regions
    /// outside it are rejected as noise-like.
    pub aspect_ratio_range: (f64, f64),

    /// Minimum fill ratio (area / bbox area); rejects thin sparse shapes.
    pub min_extent: f64,

    /// Region area at which the base confidence saturates at 1.0.
    pub confidence_saturation_area: f64,

    /// Aspect-ratio band considered typical of structural damage; regions
    /// inside it receive the confidence bonus.
    pub plausible_aspect_range: (f64, f64),

    /// Multiplier applied to the base confidence inside the plausible
    /// aspect band. Greater than 1.0; the product is re-clamped to 1.0.
    pub plausible_aspect_bonus: f64,

    /// Neighbourhood radius (pixels, over centroids) for clustering.
    pub cluster_eps: f64,

    /// Minimum neighbours (including the point itself) within
    /// `cluster_eps` for a detection to seed a cluster.
    pub cluster_min_samples: usize,

    /// Change count at or above which the lowest count tier applies.
    pub risk_count_low: usize,

    /// Change count at or above which the middle count tier applies.
    pub risk_count_medium: usize,

    /// Change count at or above which the highest count tier applies.
    pub risk_count_high: usize,

    /// Whether very-low-saturation texture (weathered stone, foliage
    /// litter) is suppressed along with vegetation and artificial hues.
    pub suppress_low_saturation: bool,

    /// Saturation (0..255) below which a pixel counts as low-saturation
    /// texture. Only used when `suppress_low_saturation` is set.
    pub low_saturation_threshold: u8,
}

impl DetectorConfig {
    /// Permissive "enhanced detection" preset. The canonical default.
    ///
    /// Tuned to catch small changes at the cost of more candidate regions
    /// reaching the shape filters.
    #[must_use]
    pub const fn enhanced() -> Self {
        Self {
            completely_different_threshold: 5.0,
            ssim_diff_cutoff: 150,
            intensity_diff_threshold: 20,
            edge_diff_threshold: 30,
            canny_low: 30.0,
            canny_high: 100.0,
            min_region_area: 300.0,
            max_region_area: 50_000.0,
            morphology_kernel_size: 7,
            aspect_ratio_range: (0.1, 10.0),
            min_extent: 0.2,
            confidence_saturation_area: 5_000.0,
            plausible_aspect_range: (0.3, 3.0),
            plausible_aspect_bonus: 1.3,
            cluster_eps: 30.0,
            cluster_min_samples: 2,
            risk_count_low: 2,
            risk_count_medium: 5,
            risk_count_high: 10,
            suppress_low_saturation: true,
            low_saturation_threshold: 50,
        }
    }

    /// Conservative preset: stricter thresholds, fewer but
    /// higher-certainty detections.
    #[must_use]
    pub const fn baseline() -> Self {
        Self {
            intensity_diff_threshold: 30,
            min_region_area: 500.0,
            morphology_kernel_size: 5,
            cluster_eps: 50.0,
            cluster_min_samples: 3,
            risk_count_low: 3,
            risk_count_medium: 7,
            risk_count_high: 12,
            ..Self::enhanced()
        }
    }

    /// Radius of the square structuring element (`kernel_size / 2`).
    #[must_use]
    pub const fn morphology_radius(&self) -> u8 {
        self.morphology_kernel_size / 2
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::enhanced()
    }
}

//! Shared types for the stonewatch change-detection pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` so downstream crates can reference decoded
/// images without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `GrayImage` for intermediate raster data (masks, edge maps,
/// similarity maps).
pub use image::GrayImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// An axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Create a new bounding box.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            f64::from(self.x) + f64::from(self.width) / 2.0,
            f64::from(self.y) + f64::from(self.height) / 2.0,
        )
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let x_min = self.x.min(other.x);
        let y_min = self.y.min(other.y);
        let x_max = (self.x + self.width).max(other.x + other.width);
        let y_max = (self.y + self.height).max(other.y + other.height);
        Self::new(x_min, y_min, x_max - x_min, y_max - y_min)
    }
}

/// One localized structural change surviving region filtering.
///
/// `merged_count == 1` marks a raw region straight out of the extractor;
/// `merged_count > 1` marks the fusion of that many raw regions by the
/// spatial clusterer (union bbox, summed area, mean confidence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Axis-aligned bounding box of the changed region.
    pub bbox: BoundingBox,
    /// Region area in pixels (summed over members when merged).
    pub area: f64,
    /// Confidence heuristic, clamped to `[0, 1]`.
    pub confidence: f64,
    /// Bounding-box width divided by height.
    pub aspect_ratio: f64,
    /// Area divided by bounding-box area (fill ratio).
    pub extent: f64,
    /// Bounding-box center.
    pub centroid: Point,
    /// Number of raw regions fused into this detection. Always `>= 1`.
    pub merged_count: u32,
}

/// Ordinal severity classification for one analyzed image pair.
///
/// `Error` is not a processing failure: it marks a pair whose global
/// embedding distance says the two photographs show unrelated subjects,
/// so localized change detection is meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// No significant change.
    Safe,
    /// Minor changes worth noting during routine maintenance.
    Low,
    /// Moderate changes; schedule an inspection.
    Medium,
    /// Significant changes; professional inspection soon.
    High,
    /// Severe damage; immediate action.
    Critical,
    /// The two images do not show the same subject.
    Error,
}

impl RiskLevel {
    /// Canonical uppercase name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw aggregate metrics the risk score was derived from.
///
/// Always populated, whatever the classification, so callers can apply
/// independent downstream policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Number of detections after clustering.
    pub change_count: usize,
    /// Summed detection area in pixels.
    pub total_area: f64,
    /// Mean detection confidence.
    pub avg_confidence: f64,
    /// Euclidean distance between the two embedding vectors.
    pub cnn_distance: f64,
    /// Structural similarity score over the aligned grayscale pair.
    pub ssim_score: f64,
}

/// Risk classification for one analyzed image pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Overall severity level.
    pub level: RiskLevel,
    /// Accumulated integer score the level was mapped from.
    pub score: u32,
    /// Human-readable one-line summary.
    pub description: String,
    /// Which scoring tiers contributed, in evaluation order. Audit trail
    /// only; the score never depends on this list.
    pub factors: Vec<String>,
    /// Recommended actions, ordered by urgency.
    pub recommendations: Vec<String>,
    /// The aggregates the score was computed from.
    pub metrics: RiskMetrics,
    /// `true` only for the unrelated-subjects classification.
    pub is_error: bool,
}

/// Complete output of [`analyze`](crate::analyze) for one image pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Euclidean distance between the pair's embedding vectors.
    pub cnn_distance: f64,
    /// Structural similarity score, in `[-1, 1]` (1 = identical).
    pub ssim_score: f64,
    /// Clustered detections, one per physical change event.
    pub detections: Vec<Detection>,
    /// Risk classification derived from the detections and global signals.
    pub risk_assessment: RiskAssessment,
    /// Number of entries in `detections`.
    pub total_changes: usize,
    /// Pixels suppressed as vegetation / artificial-surface / natural
    /// texture before region extraction.
    pub unwanted_area_pixels: u64,
    /// `true` when the embedding distance exceeded the
    /// unrelated-subjects threshold.
    pub is_completely_different: bool,
}

/// Errors the pipeline can surface to a caller.
///
/// Recoverable conditions (alignment failure, dimension mismatch) are
/// handled internally and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input bytes as an image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The pretrained feature extractor failed to load or run.
    #[error("feature extractor failure: {0}")]
    Extractor(String),

    /// Structural similarity computation failed.
    #[error("similarity computation failed: {0}")]
    Similarity(#[from] image_compare::CompareError),
}

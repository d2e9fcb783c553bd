//! Region extraction: connected foreground regions of the filtered
//! change mask become candidate detections.
//!
//! Each 8-connected region is measured (pixel-count area, bounding box,
//! aspect ratio, fill ratio), filtered against the configured shape and
//! size bounds, and scored with a confidence heuristic that grows with
//! area and favours plausibly structural aspect ratios.

use image::GrayImage;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::config::DetectorConfig;
use crate::types::{BoundingBox, Detection};

/// Per-label accumulator for one connected region.
#[derive(Debug, Clone, Copy)]
struct RegionStats {
    count: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl RegionStats {
    const fn new(x: u32, y: u32) -> Self {
        Self {
            count: 1,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn absorb(&mut self, x: u32, y: u32) {
        self.count += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Extract filtered, confidence-scored detections from a binary mask.
///
/// Regions are reported in label order (top-left first), so the output
/// is deterministic for a given mask.
#[must_use]
pub fn extract_regions(mask: &GrayImage, config: &DetectorConfig) -> Vec<Detection> {
    let labels = connected_components(mask, Connectivity::Eight, image::Luma([0u8]));

    // Labels are dense small integers; index an on-demand Vec by label.
    let mut stats: Vec<Option<RegionStats>> = Vec::new();
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= stats.len() {
            stats.resize(label + 1, None);
        }
        match &mut stats[label] {
            Some(region) => region.absorb(x, y),
            slot => *slot = Some(RegionStats::new(x, y)),
        }
    }

    stats
        .into_iter()
        .flatten()
        .filter_map(|region| measure(&region, config))
        .collect()
}

/// Measure one region and apply the shape/size filters.
///
/// Returns `None` when the region is rejected. The area bounds are
/// inclusive: a region of exactly `min_region_area` survives.
fn measure(region: &RegionStats, config: &DetectorConfig) -> Option<Detection> {
    #[allow(clippy::cast_precision_loss)]
    let area = region.count as f64;
    if area < config.min_region_area || area > config.max_region_area {
        return None;
    }

    let width = region.max_x - region.min_x + 1;
    let height = region.max_y - region.min_y + 1;
    let bbox = BoundingBox::new(region.min_x, region.min_y, width, height);

    let aspect_ratio = f64::from(width) / f64::from(height);
    let extent = area / (f64::from(width) * f64::from(height));

    let (aspect_min, aspect_max) = config.aspect_ratio_range;
    if aspect_ratio < aspect_min || aspect_ratio > aspect_max || extent < config.min_extent {
        return None;
    }

    let mut confidence = (area / config.confidence_saturation_area)
        .mul_add(0.8, 0.2)
        .min(1.0);
    let (plausible_min, plausible_max) = config.plausible_aspect_range;
    if aspect_ratio > plausible_min && aspect_ratio < plausible_max {
        confidence *= config.plausible_aspect_bonus;
    }

    Some(Detection {
        bbox,
        area,
        confidence: confidence.clamp(0.0, 1.0),
        aspect_ratio,
        extent,
        centroid: bbox.center(),
        merged_count: 1,
    })
}

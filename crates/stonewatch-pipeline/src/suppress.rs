//! False-positive suppression: mask out surfaces whose changes are not
//! structurally meaningful.
//!
//! Vegetation growth, brightly colored foreign objects (tarps, clothing,
//! signage) and low-saturation natural texture (weathered stone, foliage
//! litter) all produce high-confidence pixel changes between visits that
//! say nothing about the structure itself. This module builds an
//! "unwanted surface" mask from HSV ranges over the later image and
//! subtracts it from the fused change mask before region extraction.

use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};

use crate::config::DetectorConfig;
use crate::fuse::FOREGROUND;

/// Kernel radius for cleaning the unwanted mask (fixed 5x5 element).
const CLEANUP_RADIUS: u8 = 2;

/// One inclusive HSV detection range. Hue uses the halved 0..=180 scale;
/// saturation and value upper bounds are always 255, so only the minima
/// are stored.
struct HsvRange {
    h_min: u8,
    h_max: u8,
    s_min: u8,
    v_min: u8,
}

impl HsvRange {
    const fn contains(&self, (h, s, v): (u8, u8, u8)) -> bool {
        h >= self.h_min && h <= self.h_max && s >= self.s_min && v >= self.v_min
    }
}

/// Vegetation: green hues at moderate-to-high saturation.
const VEGETATION: HsvRange = HsvRange {
    h_min: 30,
    h_max: 90,
    s_min: 30,
    v_min: 30,
};

/// Bright artificial-surface and foreign-object hues: red wraps around
/// the hue circle, then blue, yellow/orange, purple/pink.
const ARTIFICIAL: [HsvRange; 5] = [
    HsvRange {
        h_min: 0,
        h_max: 10,
        s_min: 100,
        v_min: 100,
    },
    HsvRange {
        h_min: 170,
        h_max: 180,
        s_min: 100,
        v_min: 100,
    },
    HsvRange {
        h_min: 100,
        h_max: 130,
        s_min: 100,
        v_min: 100,
    },
    HsvRange {
        h_min: 15,
        h_max: 35,
        s_min: 100,
        v_min: 100,
    },
    HsvRange {
        h_min: 140,
        h_max: 170,
        s_min: 100,
        v_min: 100,
    },
];

/// Subtract unwanted surfaces from the fused change mask.
///
/// The unwanted mask is computed over `current` (the later, reference
/// frame), cleaned by a close/open pass, then removed from `change_mask`
/// with AND-NOT. Returns the filtered mask and the number of unwanted
/// pixels (reported as [`unwanted_area_pixels`]).
///
/// [`unwanted_area_pixels`]: crate::types::AnalysisResult::unwanted_area_pixels
#[must_use]
pub fn suppress_unwanted(
    change_mask: &GrayImage,
    current: &RgbImage,
    config: &DetectorConfig,
) -> (GrayImage, u64) {
    let unwanted = unwanted_mask(current, config);
    let unwanted_pixels = unwanted.pixels().filter(|p| p.0[0] > 0).count() as u64;

    let filtered = GrayImage::from_fn(change_mask.width(), change_mask.height(), |x, y| {
        if unwanted.get_pixel(x, y).0[0] > 0 {
            image::Luma([0])
        } else {
            *change_mask.get_pixel(x, y)
        }
    });

    (filtered, unwanted_pixels)
}

/// Build the cleaned unwanted-surface mask for one RGB image.
#[must_use]
pub fn unwanted_mask(image: &RgbImage, config: &DetectorConfig) -> GrayImage {
    let raw = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let hsv = rgb_to_hsv(r, g, b);
        if is_unwanted(hsv, config) {
            image::Luma([FOREGROUND])
        } else {
            image::Luma([0])
        }
    });

    open(
        &close(&raw, Norm::LInf, CLEANUP_RADIUS),
        Norm::LInf,
        CLEANUP_RADIUS,
    )
}

fn is_unwanted(hsv: (u8, u8, u8), config: &DetectorConfig) -> bool {
    if VEGETATION.contains(hsv) {
        return true;
    }
    if ARTIFICIAL.iter().any(|range| range.contains(hsv)) {
        return true;
    }
    config.suppress_low_saturation && hsv.1 < config.low_saturation_threshold
}

/// RGB to HSV with the halved hue scale (H in 0..=180, S and V in
/// 0..=255), matching the range constants above.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let rf = f32::from(r);
    let gf = f32::from(g);
    let bf = f32::from(b);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let value = max;
    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let hue_degrees = if delta <= f32::EPSILON {
        0.0
    } else if (max - rf).abs() < f32::EPSILON {
        60.0 * (((gf - bf) / delta).rem_euclid(6.0))
    } else if (max - gf).abs() < f32::EPSILON {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };

    (
        (hue_degrees / 2.0).round() as u8,
        saturation.round() as u8,
        value.round() as u8,
    )
}

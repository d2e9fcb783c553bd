//! Difference fusion: three independent per-pixel change signals
//! combined into one binary mask.
//!
//! The signals are (1) low structural similarity, (2) large absolute
//! grayscale difference, and (3) disagreement between the two images'
//! Canny edge maps. Any one of them marks a pixel as changed. The fused
//! mask is then closed (bridging small gaps inside one change region)
//! and opened (removing isolated speckle) with the configured square
//! kernel.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::{close, open};

use crate::config::DetectorConfig;

/// Binary foreground value used by every mask in the pipeline.
pub const FOREGROUND: u8 = 255;

/// Fuse the three change signals into one smoothed binary mask.
///
/// `ssim_map` is the 8-bit similarity map (255 = identical) from
/// [`structural_similarity`](crate::ssim::structural_similarity); the
/// grayscale pair must already be aligned and equally sized.
#[must_use]
pub fn fuse_differences(
    ssim_map: &GrayImage,
    gray_past: &GrayImage,
    gray_current: &GrayImage,
    config: &DetectorConfig,
) -> GrayImage {
    // Signal 1: structural dissimilarity.
    let ssim_mask = threshold_at_most(ssim_map, config.ssim_diff_cutoff);

    // Signal 2: raw intensity difference.
    let intensity = absolute_difference(gray_past, gray_current);
    let intensity_mask = threshold_above(&intensity, config.intensity_diff_threshold);

    // Signal 3: edge-map disagreement, from per-image edge detection.
    let edges_past = canny(gray_past, config.canny_low, config.canny_high);
    let edges_current = canny(gray_current, config.canny_low, config.canny_high);
    let edge_diff = absolute_difference(&edges_past, &edges_current);
    let edge_mask = threshold_above(&edge_diff, config.edge_diff_threshold);

    let fused = binary_or(&binary_or(&ssim_mask, &intensity_mask), &edge_mask);
    smooth(fused, config.morphology_radius())
}

/// Close twice then open once with a square (L∞) structuring element.
fn smooth(mask: GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask;
    }
    let closed = close(&close(&mask, Norm::LInf, radius), Norm::LInf, radius);
    open(&closed, Norm::LInf, radius)
}

/// Per-pixel absolute difference of two equally-sized grayscale images.
#[must_use]
pub fn absolute_difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        image::Luma([a.get_pixel(x, y).0[0].abs_diff(b.get_pixel(x, y).0[0])])
    })
}

/// Mark pixels with value at most `cutoff` as foreground.
fn threshold_at_most(map: &GrayImage, cutoff: u8) -> GrayImage {
    GrayImage::from_fn(map.width(), map.height(), |x, y| {
        if map.get_pixel(x, y).0[0] <= cutoff {
            image::Luma([FOREGROUND])
        } else {
            image::Luma([0])
        }
    })
}

/// Mark pixels with value strictly above `cutoff` as foreground.
fn threshold_above(map: &GrayImage, cutoff: u8) -> GrayImage {
    GrayImage::from_fn(map.width(), map.height(), |x, y| {
        if map.get_pixel(x, y).0[0] > cutoff {
            image::Luma([FOREGROUND])
        } else {
            image::Luma([0])
        }
    })
}

/// Pixelwise OR of two binary masks.
#[must_use]
pub fn binary_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        image::Luma([a.get_pixel(x, y).0[0] | b.get_pixel(x, y).0[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    fn foreground_count(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] > 0).count()
    }

    #[test]
    fn identical_pair_produces_empty_mask() {
        let img = uniform(64, 64, 120);
        let perfect_similarity = uniform(64, 64, 255);
        let mask = fuse_differences(
            &perfect_similarity,
            &img,
            &img,
            &DetectorConfig::enhanced(),
        );
        assert_eq!(foreground_count(&mask), 0);
    }

    #[test]
    fn intensity_change_survives_fusion() {
        // 20x20 bright block on a mid-gray background, at (20, 20).
        let past = uniform(64, 64, 100);
        let mut current = uniform(64, 64, 100);
        for y in 20..40 {
            for x in 20..40 {
                current.put_pixel(x, y, image::Luma([200]));
            }
        }
        let perfect_similarity = uniform(64, 64, 255);
        let mask = fuse_differences(
            &perfect_similarity,
            &past,
            &current,
            &DetectorConfig::enhanced(),
        );
        // The block interior is marked as changed.
        assert_eq!(mask.get_pixel(30, 30).0[0], FOREGROUND);
        assert!(foreground_count(&mask) >= 20 * 20);
    }

    #[test]
    fn low_similarity_alone_marks_pixels() {
        let img = uniform(64, 64, 100);
        let mut similarity = uniform(64, 64, 255);
        for y in 16..48 {
            for x in 16..48 {
                similarity.put_pixel(x, y, image::Luma([40]));
            }
        }
        let mask = fuse_differences(&similarity, &img, &img, &DetectorConfig::enhanced());
        assert_eq!(mask.get_pixel(32, 32).0[0], FOREGROUND);
    }

    #[test]
    fn isolated_speckle_is_opened_away() {
        let past = uniform(64, 64, 100);
        let mut current = uniform(64, 64, 100);
        // Single changed pixel: speckle, not structure.
        current.put_pixel(32, 32, image::Luma([255]));
        let perfect_similarity = uniform(64, 64, 255);
        let mask = fuse_differences(
            &perfect_similarity,
            &past,
            &current,
            &DetectorConfig::enhanced(),
        );
        assert_eq!(foreground_count(&mask), 0);
    }

    #[test]
    fn nearby_fragments_are_bridged() {
        let past = uniform(96, 96, 100);
        let mut current = uniform(96, 96, 100);
        // Two 10x10 blocks separated by a 4-pixel horizontal gap.
        for y in 40..50 {
            for x in 20..30 {
                current.put_pixel(x, y, image::Luma([220]));
            }
            for x in 34..44 {
                current.put_pixel(x, y, image::Luma([220]));
            }
        }
        let perfect_similarity = uniform(96, 96, 255);
        let mask = fuse_differences(
            &perfect_similarity,
            &past,
            &current,
            &DetectorConfig::enhanced(),
        );
        // Closing with the 7x7 kernel fills the gap between the blocks.
        assert_eq!(mask.get_pixel(32, 45).0[0], FOREGROUND);
    }

    #[test]
    fn absolute_difference_is_symmetric() {
        let a = uniform(8, 8, 30);
        let b = uniform(8, 8, 200);
        let d1 = absolute_difference(&a, &b);
        let d2 = absolute_difference(&b, &a);
        assert_eq!(d1.as_raw(), d2.as_raw());
        assert_eq!(d1.get_pixel(0, 0).0[0], 170);
    }
}

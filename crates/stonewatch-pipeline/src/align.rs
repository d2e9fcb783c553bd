//! Geometric alignment: register the earlier photograph onto the later
//! photograph's pixel frame.
//!
//! Keypoints are detected with FAST-9, described with 256-bit BRIEF
//! descriptors, and matched by mutual-nearest-neighbour Hamming distance.
//! A homography is then estimated from the best matches with a RANSAC
//! loop over 4-point minimal samples and used to warp the earlier image.
//!
//! Alignment is best-effort: every failure mode collapses into an
//! explicit [`AlignmentOutcome::Skipped`] and the pipeline continues with
//! the unaligned pair. Nothing in this module returns an error.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::binary_descriptors::BinaryDescriptor;
use imageproc::binary_descriptors::brief::{BriefDescriptor, TestPair, brief};
use imageproc::corners::corners_fast9;
use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use imageproc::point::Point as PixelPoint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Keypoint budget per image.
const MAX_KEYPOINTS: usize = 1000;

/// BRIEF descriptor length in bits.
const DESCRIPTOR_BITS: usize = 256;

/// FAST-9 corner threshold.
const FAST_THRESHOLD: u8 = 20;

/// Keypoints closer than this to any border are discarded; the BRIEF
/// sampling patch must fit entirely inside the image.
const BORDER_MARGIN: u32 = 24;

/// Number of best matches retained for homography estimation.
const KEEP_BEST_MATCHES: usize = 50;

/// Minimum cross-checked matches for alignment to proceed.
const MIN_MATCHES: usize = 10;

/// RANSAC iterations over 4-point minimal samples.
const RANSAC_ITERATIONS: usize = 512;

/// Maximum reprojection error (pixels) for a match to count as an inlier.
const REPROJECTION_THRESHOLD: f32 = 5.0;

/// Fixed RANSAC seed: alignment is deterministic for a given image pair.
const RANSAC_SEED: u64 = 7919;

/// Why alignment was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// One of the images yielded no usable descriptors.
    NoDescriptors,
    /// Fewer than [`MIN_MATCHES`] cross-checked matches survived.
    TooFewMatches,
    /// RANSAC found no transform with enough inlier support.
    DegenerateTransform,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDescriptors => f.write_str("no usable descriptors"),
            Self::TooFewMatches => f.write_str("too few cross-checked matches"),
            Self::DegenerateTransform => f.write_str("no transform with inlier support"),
        }
    }
}

/// Outcome of an alignment attempt.
///
/// A skip is a documented degraded path, not an error: the pipeline
/// proceeds with the unaligned images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentOutcome {
    /// The earlier image was warped into the later image's frame.
    Aligned {
        /// Cross-checked matches fed to RANSAC.
        matches: usize,
        /// Matches consistent with the estimated homography.
        inliers: usize,
    },
    /// Alignment was skipped; both images passed through unchanged.
    Skipped(SkipReason),
}

/// Register `past` onto `current`'s pixel frame.
///
/// Returns the (possibly warped) earlier image together with the
/// [`AlignmentOutcome`]. The later image is never modified, so only the
/// earlier one is returned. Both inputs must already share dimensions.
#[must_use]
pub fn align(past: &RgbImage, current: &RgbImage) -> (RgbImage, AlignmentOutcome) {
    let gray_past = image::imageops::grayscale(past);
    let gray_current = image::imageops::grayscale(current);

    let Some((kp_past, desc_past, pairs)) = detect_and_describe(&gray_past, None) else {
        debug!(reason = %SkipReason::NoDescriptors, "alignment skipped");
        return (past.clone(), AlignmentOutcome::Skipped(SkipReason::NoDescriptors));
    };
    // Reuse the first image's sampled test pairs so descriptors from the
    // two images are comparable.
    let Some((kp_current, desc_current, _)) = detect_and_describe(&gray_current, Some(&pairs))
    else {
        debug!(reason = %SkipReason::NoDescriptors, "alignment skipped");
        return (past.clone(), AlignmentOutcome::Skipped(SkipReason::NoDescriptors));
    };

    let mut matches = mutual_matches(&desc_past, &desc_current);
    if matches.len() < MIN_MATCHES {
        debug!(
            matches = matches.len(),
            reason = %SkipReason::TooFewMatches,
            "alignment skipped",
        );
        return (past.clone(), AlignmentOutcome::Skipped(SkipReason::TooFewMatches));
    }
    matches.sort_by_key(|m| m.distance);
    matches.truncate(KEEP_BEST_MATCHES);

    let src: Vec<(f32, f32)> = matches
        .iter()
        .map(|m| point_to_f32(kp_past[m.query]))
        .collect();
    let dst: Vec<(f32, f32)> = matches
        .iter()
        .map(|m| point_to_f32(kp_current[m.train]))
        .collect();

    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let Some((projection, inliers)) = estimate_homography(&src, &dst, &mut rng) else {
        debug!(
            matches = matches.len(),
            reason = %SkipReason::DegenerateTransform,
            "alignment skipped",
        );
        return (
            past.clone(),
            AlignmentOutcome::Skipped(SkipReason::DegenerateTransform),
        );
    };

    debug!(matches = matches.len(), inliers, "alignment succeeded");
    let warped = warp(past, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]));
    (
        warped,
        AlignmentOutcome::Aligned {
            matches: matches.len(),
            inliers,
        },
    )
}

/// Detect FAST corners and compute BRIEF descriptors.
///
/// Corners are ranked strongest-first and capped at [`MAX_KEYPOINTS`];
/// corners inside the border margin are discarded before description.
/// Returns `None` when no descriptors can be produced.
fn detect_and_describe(
    gray: &GrayImage,
    test_pairs: Option<&Vec<TestPair>>,
) -> Option<(Vec<PixelPoint<u32>>, Vec<BriefDescriptor>, Vec<TestPair>)> {
    let (width, height) = gray.dimensions();
    if width <= 2 * BORDER_MARGIN || height <= 2 * BORDER_MARGIN {
        return None;
    }

    let mut corners = corners_fast9(gray, FAST_THRESHOLD);
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners.truncate(MAX_KEYPOINTS);

    let keypoints: Vec<PixelPoint<u32>> = corners
        .iter()
        .filter(|c| {
            c.x >= BORDER_MARGIN
                && c.y >= BORDER_MARGIN
                && c.x < width - BORDER_MARGIN
                && c.y < height - BORDER_MARGIN
        })
        .map(|c| PixelPoint::new(c.x, c.y))
        .collect();
    if keypoints.is_empty() {
        return None;
    }

    match brief(gray, &keypoints, DESCRIPTOR_BITS, test_pairs) {
        Ok((descriptors, pairs)) if !descriptors.is_empty() => {
            Some((keypoints, descriptors, pairs))
        }
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "descriptor extraction failed");
            None
        }
    }
}

/// One cross-checked descriptor match.
#[derive(Debug, Clone, Copy)]
struct DescriptorMatch {
    /// Index into the earlier image's keypoints.
    query: usize,
    /// Index into the later image's keypoints.
    train: usize,
    /// Hamming distance between the two descriptors.
    distance: u32,
}

/// Brute-force mutual-nearest-neighbour matching.
///
/// A pair survives only when each descriptor is the other's single
/// nearest neighbour (the cross-check), which discards most ambiguous
/// correspondences without a ratio test.
fn mutual_matches(
    queries: &[BriefDescriptor],
    database: &[BriefDescriptor],
) -> Vec<DescriptorMatch> {
    let forward: Vec<Option<(usize, u32)>> =
        queries.iter().map(|q| nearest(q, database)).collect();
    let backward: Vec<Option<(usize, u32)>> =
        database.iter().map(|d| nearest(d, queries)).collect();

    forward
        .iter()
        .enumerate()
        .filter_map(|(qi, entry)| {
            let (ti, distance) = (*entry)?;
            let (back, _) = backward[ti]?;
            (back == qi).then_some(DescriptorMatch {
                query: qi,
                train: ti,
                distance,
            })
        })
        .collect()
}

/// Nearest neighbour of `query` in `candidates` by Hamming distance.
fn nearest(query: &BriefDescriptor, candidates: &[BriefDescriptor]) -> Option<(usize, u32)> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, query.hamming_distance(c)))
        .min_by_key(|&(_, d)| d)
}

/// RANSAC homography estimation from point correspondences.
///
/// Draws 4-point minimal samples, fits a projective transform to each,
/// and keeps the transform with the most inliers (reprojection error at
/// most [`REPROJECTION_THRESHOLD`]). Returns `None` when no hypothesis
/// reaches [`MIN_MATCHES`] inliers.
fn estimate_homography(
    src: &[(f32, f32)],
    dst: &[(f32, f32)],
    rng: &mut StdRng,
) -> Option<(Projection, usize)> {
    debug_assert_eq!(src.len(), dst.len());
    if src.len() < 4 {
        return None;
    }

    let threshold_sq = REPROJECTION_THRESHOLD * REPROJECTION_THRESHOLD;
    let mut best: Option<(Projection, usize)> = None;

    for _ in 0..RANSAC_ITERATIONS {
        let sample = distinct_sample(src.len(), rng);
        let from = [
            src[sample[0]],
            src[sample[1]],
            src[sample[2]],
            src[sample[3]],
        ];
        let to = [
            dst[sample[0]],
            dst[sample[1]],
            dst[sample[2]],
            dst[sample[3]],
        ];
        let Some(candidate) = Projection::from_control_points(from, to) else {
            // Degenerate (collinear) sample.
            continue;
        };

        let inliers = src
            .iter()
            .zip(dst)
            .filter(|&(&s, &d)| {
                let (px, py) = candidate * s;
                let (dx, dy) = (px - d.0, py - d.1);
                dx.mul_add(dx, dy * dy) <= threshold_sq
            })
            .count();

        let improved = best
            .as_ref()
            .is_none_or(|&(_, best_inliers)| inliers > best_inliers);
        if improved {
            best = Some((candidate, inliers));
        }
    }

    best.filter(|&(_, inliers)| inliers >= MIN_MATCHES)
}

/// Draw four distinct indices in `0..len` by rejection sampling.
fn distinct_sample(len: usize, rng: &mut StdRng) -> [usize; 4] {
    loop {
        let sample = [
            rng.gen_range(0..len),
            rng.gen_range(0..len),
            rng.gen_range(0..len),
            rng.gen_range(0..len),
        ];
        let distinct = sample
            .iter()
            .enumerate()
            .all(|(i, a)| sample[i + 1..].iter().all(|b| a != b));
        if distinct {
            return sample;
        }
    }
}

fn point_to_f32(p: PixelPoint<u32>) -> (f32, f32) {
    (p.x as f32, p.y as f32)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Deterministic textured image: enough corner structure for FAST.
    fn textured(width: u32, height: u32, shift_x: u32, shift_y: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let sx = x.wrapping_add(shift_x);
            let sy = y.wrapping_add(shift_y);
            // Integer hash keeps the pattern reproducible and corner-rich.
            let v = sx
                .wrapping_mul(2_654_435_761)
                .wrapping_add(sy.wrapping_mul(40_503))
                .wrapping_mul(2_246_822_519);
            let v = (v >> 13) as u8;
            Rgb([v, v.wrapping_mul(3), v.wrapping_mul(7)])
        })
    }

    #[test]
    fn blank_images_skip_alignment() {
        let blank = RgbImage::from_pixel(128, 128, Rgb([127, 127, 127]));
        let (out, outcome) = align(&blank, &blank);
        assert_eq!(
            outcome,
            AlignmentOutcome::Skipped(SkipReason::NoDescriptors),
        );
        // Pass-through: the earlier image is returned unchanged.
        assert_eq!(out.as_raw(), blank.as_raw());
    }

    #[test]
    fn tiny_images_skip_alignment() {
        let small = textured(32, 32, 0, 0);
        let (_, outcome) = align(&small, &small);
        assert!(matches!(outcome, AlignmentOutcome::Skipped(_)));
    }

    #[test]
    fn output_dimensions_match_input() {
        let past = textured(160, 120, 0, 0);
        let current = textured(160, 120, 2, 1);
        let (out, _) = align(&past, &current);
        assert_eq!(out.dimensions(), (160, 120));
    }

    #[test]
    fn ransac_recovers_translation() {
        // 40 correspondences under a pure (12, -7) translation.
        let src: Vec<(f32, f32)> = (0..40)
            .map(|i| {
                let i = i as f32;
                (10.0 + 13.0 * i % 97.0, 20.0 + 29.0 * i % 83.0)
            })
            .collect();
        let dst: Vec<(f32, f32)> = src.iter().map(|&(x, y)| (x + 12.0, y - 7.0)).collect();

        let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
        let (projection, inliers) = estimate_homography(&src, &dst, &mut rng).unwrap();
        assert!(inliers >= MIN_MATCHES);

        let (px, py) = projection * (50.0, 50.0);
        assert!((px - 62.0).abs() < 1.0, "px = {px}");
        assert!((py - 43.0).abs() < 1.0, "py = {py}");
    }

    #[test]
    fn ransac_survives_outliers() {
        let src: Vec<(f32, f32)> = (0..30)
            .map(|i| {
                let i = i as f32;
                (15.0 + 17.0 * i % 101.0, 25.0 + 23.0 * i % 89.0)
            })
            .collect();
        let mut dst: Vec<(f32, f32)> = src.iter().map(|&(x, y)| (x + 5.0, y + 3.0)).collect();
        // Corrupt a quarter of the correspondences.
        for (i, d) in dst.iter_mut().enumerate() {
            if i % 4 == 0 {
                d.0 += 250.0;
                d.1 -= 180.0;
            }
        }

        let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
        let (projection, _) = estimate_homography(&src, &dst, &mut rng).unwrap();
        let (px, py) = projection * (40.0, 60.0);
        assert!((px - 45.0).abs() < 1.0, "px = {px}");
        assert!((py - 63.0).abs() < 1.0, "py = {py}");
    }

    /// Deterministically scattered points over a 400x400 domain.
    fn scattered(seed: u32, n: usize) -> Vec<(f32, f32)> {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 16) as f32 % 400.0
        };
        (0..n).map(|_| (next(), next())).collect()
    }

    #[test]
    fn ransac_rejects_pure_noise() {
        // Uncorrelated scatters: no transform explains 10+ of them.
        let src = scattered(1, 20);
        let dst = scattered(99, 20);

        let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
        assert!(estimate_homography(&src, &dst, &mut rng).is_none());
    }

    #[test]
    fn distinct_sample_has_no_duplicates() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let s = distinct_sample(5, &mut rng);
            for i in 0..4 {
                for j in i + 1..4 {
                    assert_ne!(s[i], s[j]);
                }
            }
        }
    }
}

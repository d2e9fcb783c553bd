//! Scenario tests: full pipeline runs over synthetic monitoring pairs.

#![allow(clippy::unwrap_used)]

use image::{Rgb, RgbImage};
use stonewatch_pipeline::{
    AnalysisError, AnalysisResult, DetectorConfig, FeatureEmbedder, RiskLevel, analyze,
};

/// Embedder returning a fixed vector: every pair reads as the same
/// subject, isolating the localized-change path.
struct ConstantEmbedder;

impl FeatureEmbedder for ConstantEmbedder {
    fn embed(&self, _image: &RgbImage) -> Result<Vec<f32>, AnalysisError> {
        Ok(vec![0.0; 8])
    }
}

/// Neutral gray background: suppressed as low-saturation texture, so
/// only the inserted blocks reach region extraction.
fn background(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([128, 128, 128]))
}

/// Saturated hue outside every suppressed HSV band.
const BLOCK: Rgb<u8> = Rgb([127, 0, 255]);

fn insert_block(image: &mut RgbImage, x0: u32, y0: u32, width: u32, height: u32) {
    for y in y0..y0 + height {
        for x in x0..x0 + width {
            image.put_pixel(x, y, BLOCK);
        }
    }
}

#[test]
fn fragmented_change_is_clustered_into_one_event() {
    // Two 40x16 fragments, 13 pixels apart vertically: far enough that
    // morphological closing keeps them separate regions, close enough
    // (centroid distance 29 < eps 30) that clustering fuses them.
    let past = background(300, 300);
    let mut current = past.clone();
    insert_block(&mut current, 100, 100, 40, 16);
    insert_block(&mut current, 100, 129, 40, 16);

    let result = analyze(
        &past,
        &current,
        &ConstantEmbedder,
        &DetectorConfig::enhanced(),
    )
    .unwrap();

    assert_eq!(result.total_changes, 1, "detections: {:?}", result.detections);
    let merged = &result.detections[0];
    assert_eq!(merged.merged_count, 2);
    assert!(
        (merged.area - 2.0 * 40.0 * 16.0).abs() <= 100.0,
        "area = {}",
        merged.area,
    );
    // Union envelope spans both fragments.
    assert!(merged.bbox.height >= 40, "bbox = {:?}", merged.bbox);
}

#[test]
fn presets_disagree_on_marginal_regions() {
    // An 18x18 block (324 px) sits between the enhanced minimum (300)
    // and the baseline minimum (500).
    let past = background(200, 200);
    let mut current = past.clone();
    insert_block(&mut current, 60, 60, 18, 18);

    let enhanced = analyze(
        &past,
        &current,
        &ConstantEmbedder,
        &DetectorConfig::enhanced(),
    )
    .unwrap();
    assert_eq!(enhanced.total_changes, 1);

    let baseline = analyze(
        &past,
        &current,
        &ConstantEmbedder,
        &DetectorConfig::baseline(),
    )
    .unwrap();
    assert_eq!(baseline.total_changes, 0);
    assert_eq!(baseline.risk_assessment.level, RiskLevel::Safe);
}

#[test]
fn result_survives_json_persistence() {
    let past = background(200, 200);
    let mut current = past.clone();
    insert_block(&mut current, 50, 50, 30, 30);

    let result = analyze(
        &past,
        &current,
        &ConstantEmbedder,
        &DetectorConfig::enhanced(),
    )
    .unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let restored: AnalysisResult = serde_json::from_str(&json).unwrap();
    assert_eq!(result, restored);
}

//! Deterministic risk scoring: aggregated detection signals in, discrete
//! risk level with justification and recommended actions out.
//!
//! The score is a pure, order-independent sum of four tier
//! contributions (change count, total area, embedding distance, mean
//! confidence), each contributing at most once. The `factors` list is an
//! audit trail of the tiers that fired, in evaluation order; it never
//! feeds back into the score.

use crate::config::DetectorConfig;
use crate::types::{Detection, RiskAssessment, RiskLevel, RiskMetrics};

/// Total affected area (pixels) for the larger area-tier contribution.
const AREA_TIER_MAJOR: f64 = 10_000.0;

/// Total affected area (pixels) for the smaller area-tier contribution.
const AREA_TIER_MINOR: f64 = 5_000.0;

/// Embedding distance for the larger distance-tier contribution.
const DISTANCE_TIER_MAJOR: f64 = 2.0;

/// Embedding distance for the smaller distance-tier contribution.
const DISTANCE_TIER_MINOR: f64 = 1.5;

/// Mean confidence above which the confidence bonus applies.
const CONFIDENCE_BONUS_THRESHOLD: f64 = 0.8;

/// Classify one analyzed pair.
///
/// The unrelated-subjects flag short-circuits scoring entirely and
/// yields the `ERROR` level; zero detections yield `SAFE` with score 0.
/// Raw `cnn_distance` and `ssim_score` are carried in the metrics in
/// every branch.
#[must_use]
pub fn assess_risk(
    detections: &[Detection],
    cnn_distance: f64,
    ssim_score: f64,
    is_completely_different: bool,
    config: &DetectorConfig,
) -> RiskAssessment {
    if is_completely_different {
        return RiskAssessment {
            level: RiskLevel::Error,
            score: 0,
            description: "Images appear to show completely different structures or locations"
                .to_string(),
            factors: vec![
                "Extremely high embedding distance indicates different subjects".to_string(),
            ],
            recommendations: vec![
                "Verify both photographs show the same structure".to_string(),
                "Ensure both images are taken from similar viewpoints".to_string(),
            ],
            metrics: RiskMetrics {
                change_count: 0,
                total_area: 0.0,
                avg_confidence: 0.0,
                cnn_distance,
                ssim_score,
            },
            is_error: true,
        };
    }

    if detections.is_empty() {
        return RiskAssessment {
            level: RiskLevel::Safe,
            score: 0,
            description: "No structural changes detected".to_string(),
            factors: Vec::new(),
            recommendations: vec!["Continue normal monitoring schedule".to_string()],
            metrics: RiskMetrics {
                change_count: 0,
                total_area: 0.0,
                avg_confidence: 0.0,
                cnn_distance,
                ssim_score,
            },
            is_error: false,
        };
    }

    let change_count = detections.len();
    let total_area: f64 = detections.iter().map(|d| d.area).sum();
    #[allow(clippy::cast_precision_loss)]
    let avg_confidence =
        detections.iter().map(|d| d.confidence).sum::<f64>() / change_count as f64;

    let mut score = 0u32;
    let mut factors = Vec::new();

    if change_count >= config.risk_count_high {
        score += 7;
        factors.push(format!(
            "High number of structural changes detected ({change_count})"
        ));
    } else if change_count >= config.risk_count_medium {
        score += 4;
        factors.push(format!(
            "Moderate number of structural changes detected ({change_count})"
        ));
    } else if change_count >= config.risk_count_low {
        score += 2;
        factors.push(format!(
            "Few structural changes detected ({change_count})"
        ));
    }

    if total_area > AREA_TIER_MAJOR {
        score += 3;
        factors.push("Large total area affected".to_string());
    } else if total_area > AREA_TIER_MINOR {
        score += 2;
        factors.push("Moderate total area affected".to_string());
    }

    if cnn_distance > DISTANCE_TIER_MAJOR {
        score += 3;
        factors.push("Significant overall structural change detected".to_string());
    } else if cnn_distance > DISTANCE_TIER_MINOR {
        score += 1;
        factors.push("Moderate overall structural change detected".to_string());
    }

    if avg_confidence > CONFIDENCE_BONUS_THRESHOLD {
        score += 1;
        factors.push("High confidence in detected changes".to_string());
    }

    let level = level_for_score(score);
    let (description, recommendations) = level_profile(level);

    RiskAssessment {
        level,
        score,
        description: description.to_string(),
        factors,
        recommendations: recommendations.iter().map(ToString::to_string).collect(),
        metrics: RiskMetrics {
            change_count,
            total_area,
            avg_confidence,
            cnn_distance,
            ssim_score,
        },
        is_error: false,
    }
}

/// Fixed score-to-level cutoffs.
const fn level_for_score(score: u32) -> RiskLevel {
    match score {
        8.. => RiskLevel::Critical,
        5.. => RiskLevel::High,
        3.. => RiskLevel::Medium,
        1.. => RiskLevel::Low,
        0 => RiskLevel::Safe,
    }
}

/// Canned description and escalating recommendations per level.
fn level_profile(level: RiskLevel) -> (&'static str, &'static [&'static str]) {
    match level {
        RiskLevel::Critical => (
            "Severe structural damage detected - immediate inspection required",
            &[
                "Immediate professional structural assessment required",
                "Restrict access to affected areas",
                "Document all changes with detailed photography",
                "Consider emergency stabilization measures",
            ],
        ),
        RiskLevel::High => (
            "Significant structural changes detected",
            &[
                "Schedule professional inspection within 1-2 weeks",
                "Monitor affected areas closely",
                "Document changes for historical records",
                "Consider visitor access restrictions if necessary",
            ],
        ),
        RiskLevel::Medium => (
            "Moderate structural changes detected",
            &[
                "Schedule routine inspection within 1 month",
                "Continue regular monitoring",
                "Document changes for maintenance planning",
            ],
        ),
        RiskLevel::Low => (
            "Minor structural changes detected",
            &[
                "Include in routine maintenance checks",
                "Continue regular monitoring schedule",
            ],
        ),
        RiskLevel::Safe | RiskLevel::Error => (
            "No significant structural changes detected",
            &["Continue normal monitoring schedule"],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Point};

    /// Detection with the given area and confidence; geometry chosen so
    /// no other scoring tier is disturbed.
    fn det(area: f64, confidence: f64) -> Detection {
        Detection {
            bbox: BoundingBox::new(0, 0, 10, 10),
            area,
            confidence,
            aspect_ratio: 1.0,
            extent: 1.0,
            centroid: Point::new(5.0, 5.0),
            merged_count: 1,
        }
    }

    fn quiet_detections(count: usize) -> Vec<Detection> {
        // Small area, sub-bonus confidence: only the count tier fires.
        vec![det(100.0, 0.5); count]
    }

    fn config() -> DetectorConfig {
        DetectorConfig::enhanced()
    }

    #[test]
    fn unrelated_subjects_short_circuit_to_error() {
        // Even with many detections present, the flag wins.
        let detections = quiet_detections(20);
        let assessment = assess_risk(&detections, 7.5, 0.1, true, &config());
        assert_eq!(assessment.level, RiskLevel::Error);
        assert_eq!(assessment.score, 0);
        assert!(assessment.is_error);
        // Raw global metrics are still carried.
        assert!((assessment.metrics.cnn_distance - 7.5).abs() < f64::EPSILON);
        assert!((assessment.metrics.ssim_score - 0.1).abs() < f64::EPSILON);
        assert_eq!(assessment.metrics.change_count, 0);
    }

    #[test]
    fn no_detections_is_safe() {
        let assessment = assess_risk(&[], 0.2, 0.98, false, &config());
        assert_eq!(assessment.level, RiskLevel::Safe);
        assert_eq!(assessment.score, 0);
        assert!(!assessment.is_error);
        assert!(assessment.factors.is_empty());
        assert_eq!(
            assessment.recommendations,
            vec!["Continue normal monitoring schedule".to_string()],
        );
    }

    #[test]
    fn level_cutoffs_are_exact() {
        assert_eq!(level_for_score(0), RiskLevel::Safe);
        assert_eq!(level_for_score(1), RiskLevel::Low);
        assert_eq!(level_for_score(2), RiskLevel::Low);
        assert_eq!(level_for_score(3), RiskLevel::Medium);
        assert_eq!(level_for_score(4), RiskLevel::Medium);
        assert_eq!(level_for_score(5), RiskLevel::High);
        assert_eq!(level_for_score(6), RiskLevel::High);
        assert_eq!(level_for_score(7), RiskLevel::High);
        assert_eq!(level_for_score(8), RiskLevel::Critical);
        assert_eq!(level_for_score(14), RiskLevel::Critical);
    }

    #[test]
    fn count_tiers_contribute_expected_points() {
        // One quiet detection: below every tier.
        let assessment = assess_risk(&quiet_detections(1), 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.level, RiskLevel::Safe);

        // Low tier (count >= 2): +2.
        let assessment = assess_risk(&quiet_detections(2), 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 2);
        assert_eq!(assessment.level, RiskLevel::Low);

        // Medium tier (count >= 5): +4.
        let assessment = assess_risk(&quiet_detections(5), 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 4);
        assert_eq!(assessment.level, RiskLevel::Medium);

        // High tier (count >= 10): +7.
        let assessment = assess_risk(&quiet_detections(10), 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 7);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    #[test]
    fn score_is_monotone_in_change_count() {
        let mut previous = 0;
        for count in 1..=15 {
            let assessment = assess_risk(&quiet_detections(count), 1.6, 0.9, false, &config());
            assert!(
                assessment.score >= previous,
                "score dropped from {previous} to {} at count {count}",
                assessment.score,
            );
            previous = assessment.score;
        }
    }

    #[test]
    fn area_tiers_are_strictly_greater_than() {
        // Exactly 5 000 total: below the minor tier.
        let assessment = assess_risk(&[det(5_000.0, 0.5)], 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 0);

        // Just above the minor tier: +2.
        let assessment = assess_risk(&[det(5_001.0, 0.5)], 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 2);

        // Exactly 10 000: still the minor tier.
        let assessment = assess_risk(&[det(10_000.0, 0.5)], 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 2);

        // Above the major tier: +3.
        let assessment = assess_risk(&[det(10_001.0, 0.5)], 0.0, 1.0, false, &config());
        assert_eq!(assessment.score, 3);
        assert_eq!(assessment.level, RiskLevel::Medium);
    }

    #[test]
    fn distance_and_confidence_tiers_combine() {
        // count 2 (+2), area quiet, distance 1.6 (+1), confidence 0.9 (+1).
        let detections = vec![det(100.0, 0.9), det(100.0, 0.9)];
        let assessment = assess_risk(&detections, 1.6, 0.8, false, &config());
        assert_eq!(assessment.score, 4);
        assert_eq!(assessment.level, RiskLevel::Medium);
        assert_eq!(assessment.factors.len(), 3);

        // Raising the distance above 2.0 swaps +1 for +3.
        let assessment = assess_risk(&detections, 2.5, 0.8, false, &config());
        assert_eq!(assessment.score, 6);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    #[test]
    fn maximum_score_reaches_critical() {
        // All four tiers at their largest contribution: 7 + 3 + 3 + 1.
        let detections = vec![det(1_500.0, 0.95); 10];
        let assessment = assess_risk(&detections, 2.5, 0.4, false, &config());
        assert_eq!(assessment.score, 14);
        assert_eq!(assessment.level, RiskLevel::Critical);
        assert_eq!(assessment.factors.len(), 4);
    }

    #[test]
    fn factors_follow_evaluation_order() {
        let detections = vec![det(6_000.0, 0.9); 2];
        let assessment = assess_risk(&detections, 2.5, 0.5, false, &config());
        // count, area, distance, confidence.
        assert_eq!(assessment.score, 2 + 3 + 3 + 1);
        assert!(assessment.factors[0].contains("structural changes detected (2)"));
        assert_eq!(assessment.factors[1], "Large total area affected");
        assert_eq!(
            assessment.factors[2],
            "Significant overall structural change detected",
        );
        assert_eq!(assessment.factors[3], "High confidence in detected changes");
    }

    #[test]
    fn baseline_preset_uses_its_own_count_tiers() {
        let config = DetectorConfig::baseline();
        // Two detections: below the baseline low tier of 3.
        let assessment = assess_risk(&quiet_detections(2), 0.0, 1.0, false, &config);
        assert_eq!(assessment.score, 0);
        // Three detections reach the low tier.
        let assessment = assess_risk(&quiet_detections(3), 0.0, 1.0, false, &config);
        assert_eq!(assessment.score, 2);
    }
}

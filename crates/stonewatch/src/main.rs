//! Analyze a pair of monitoring photographs of one structure and report
//! localized, risk-graded changes.
//!
//! This binary is the record-keeping collaborator around the pure
//! pipeline: it decodes the two stored files, constructs the feature
//! extractor once at startup, runs the analysis, prints a human
//! summary, and optionally persists the JSON report and the annotated
//! raster.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ab_glyph::FontVec;
use clap::{Parser, ValueEnum};
use stonewatch_pipeline::{AnalysisResult, DetectorConfig, OnnxFeatureExtractor, analyze, decode};
use stonewatch_render::annotate;
use tracing::{info, warn};

/// Analyze structural change between two photographs of one structure.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Earlier photograph.
    past: PathBuf,

    /// Later photograph. Defines the output pixel frame.
    current: PathBuf,

    /// ONNX feature-extractor model: a pretrained image classifier with
    /// its classification head removed.
    #[arg(short, long, value_name = "PATH")]
    model: PathBuf,

    /// Threshold preset to analyze with.
    #[arg(long, value_enum, default_value_t = Preset::Enhanced)]
    preset: Preset,

    /// Write the full analysis result as JSON.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Write an annotated PNG of the later photograph.
    #[arg(long, value_name = "PATH")]
    annotated: Option<PathBuf>,

    /// TrueType font for annotation labels.
    #[arg(
        long,
        value_name = "PATH",
        default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
    )]
    font: PathBuf,
}

/// Named threshold presets of the detection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// Permissive thresholds tuned for small changes (default).
    Enhanced,
    /// Conservative thresholds: fewer, higher-certainty detections.
    Baseline,
}

impl Preset {
    const fn config(self) -> DetectorConfig {
        match self {
            Self::Enhanced => DetectorConfig::enhanced(),
            Self::Baseline => DetectorConfig::baseline(),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(&Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    // Decode failures are fatal: there is no degraded path without
    // two usable images.
    let past = decode(&fs::read(&args.past)?)?;
    let current = decode(&fs::read(&args.current)?)?;

    // The extractor loads once per process; a load failure surfaces
    // here, at startup granularity, not per analysis.
    info!(model = %args.model.display(), "loading feature extractor");
    let extractor = OnnxFeatureExtractor::load(&args.model)?;

    let config = args.preset.config();
    info!(preset = ?args.preset, "running analysis");
    let result = analyze(&past, &current, &extractor, &config)?;

    print_summary(&result);

    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&result)?)?;
        info!(path = %path.display(), "report written");
    }

    if let Some(path) = &args.annotated {
        let annotated = match load_font(&args.font) {
            Some(font) => annotate(&current, &result, Some(&font)),
            None => annotate::<FontVec>(&current, &result, None),
        };
        annotated.save(path)?;
        info!(path = %path.display(), "annotated image written");
    }

    Ok(())
}

/// Load the label font, degrading to box-only annotation when the file
/// is missing or unreadable.
fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "font unavailable, labels skipped");
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "font invalid, labels skipped");
            None
        }
    }
}

fn print_summary(result: &AnalysisResult) {
    let assessment = &result.risk_assessment;
    println!("Risk level:    {} (score {})", assessment.level, assessment.score);
    println!("Description:   {}", assessment.description);
    println!("Changes:       {}", result.total_changes);
    println!("SSIM score:    {:.3}", result.ssim_score);
    println!("CNN distance:  {:.3}", result.cnn_distance);
    println!("Suppressed px: {}", result.unwanted_area_pixels);

    if !assessment.factors.is_empty() {
        println!("Factors:");
        for factor in &assessment.factors {
            println!("  - {factor}");
        }
    }
    println!("Recommendations:");
    for recommendation in &assessment.recommendations {
        println!("  - {recommendation}");
    }

    for (index, detection) in result.detections.iter().enumerate() {
        let bbox = detection.bbox;
        println!(
            "Change {}: bbox ({}, {}) {}x{}, area {:.0}px, confidence {:.2}{}",
            index + 1,
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height,
            detection.area,
            detection.confidence,
            if detection.merged_count > 1 {
                format!(" ({} regions merged)", detection.merged_count)
            } else {
                String::new()
            },
        );
    }
}

//! stonewatch-render: annotated raster rendering (sans-IO).
//!
//! Draws an [`AnalysisResult`] onto a copy of the later photograph for
//! human review: one bounding box per detection in a color keyed to the
//! overall risk level, per-box labels, and a summary block. The input
//! image is never mutated.
//!
//! Text is rendered with a caller-supplied font; this crate ships no
//! binary assets. When no font is given the geometric annotations are
//! still drawn and the textual labels are skipped.

use ab_glyph::{Font, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use stonewatch_pipeline::{AnalysisResult, Detection, RiskLevel};

/// Label text size in pixels.
const LABEL_SCALE: f32 = 16.0;

/// Summary text size in pixels.
const SUMMARY_SCALE: f32 = 20.0;

/// Vertical spacing between summary lines.
const SUMMARY_LINE_HEIGHT: i32 = 30;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Box and label color for each overall risk level.
#[must_use]
pub const fn risk_color(level: RiskLevel) -> Rgb<u8> {
    match level {
        RiskLevel::Safe => Rgb([0, 255, 0]),
        RiskLevel::Low => Rgb([255, 255, 0]),
        RiskLevel::Medium => Rgb([255, 165, 0]),
        RiskLevel::High => Rgb([255, 69, 0]),
        RiskLevel::Critical => Rgb([255, 0, 0]),
        RiskLevel::Error => Rgb([128, 128, 128]),
    }
}

/// Render an annotated copy of `current` for one analysis result.
///
/// Every detection gets a 2-pixel hollow box plus (font permitting) an
/// index/confidence label above and an area annotation below. A summary
/// block in the top-left corner reports the risk level, change count,
/// SSIM score and embedding distance, drawn with a contrasting outline
/// for legibility on any background.
#[must_use]
pub fn annotate<F: Font>(
    current: &RgbImage,
    result: &AnalysisResult,
    font: Option<&F>,
) -> RgbImage {
    let mut canvas = current.clone();
    let color = risk_color(result.risk_assessment.level);

    for (index, detection) in result.detections.iter().enumerate() {
        draw_detection(&mut canvas, detection, index, color, font);
    }

    if let Some(font) = font {
        let summary = [
            format!("Risk Level: {}", result.risk_assessment.level),
            format!("Changes Detected: {}", result.total_changes),
            format!("SSIM Score: {:.3}", result.ssim_score),
            format!("CNN Distance: {:.3}", result.cnn_distance),
        ];
        let mut y = SUMMARY_LINE_HEIGHT;
        for line in &summary {
            draw_outlined_text(&mut canvas, line, 10, y, SUMMARY_SCALE, font);
            y += SUMMARY_LINE_HEIGHT;
        }
    }

    canvas
}

/// Draw one detection's box and labels.
fn draw_detection<F: Font>(
    canvas: &mut RgbImage,
    detection: &Detection,
    index: usize,
    color: Rgb<u8>,
    font: Option<&F>,
) {
    let bbox = detection.bbox;
    draw_box(canvas, bbox.x, bbox.y, bbox.width, bbox.height, color);

    let Some(font) = font else {
        return;
    };
    let x = to_i32(bbox.x);
    let label = format!("Change {} ({:.2})", index + 1, detection.confidence);
    draw_text_mut(
        canvas,
        color,
        x,
        (to_i32(bbox.y) - 20).max(0),
        PxScale::from(LABEL_SCALE),
        font,
        &label,
    );
    let area = format!("Area: {:.0}px", detection.area);
    draw_text_mut(
        canvas,
        color,
        x,
        to_i32(bbox.y) + to_i32(bbox.height) + 4,
        PxScale::from(LABEL_SCALE),
        font,
        &area,
    );
}

/// Hollow rectangle with 2-pixel line thickness.
fn draw_box(canvas: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    draw_hollow_rect_mut(
        canvas,
        Rect::at(to_i32(x), to_i32(y)).of_size(width.max(1), height.max(1)),
        color,
    );
    if width > 2 && height > 2 {
        draw_hollow_rect_mut(
            canvas,
            Rect::at(to_i32(x) + 1, to_i32(y) + 1).of_size(width - 2, height - 2),
            color,
        );
    }
}

/// Text with a 1-pixel contrasting outline: white surround, black fill.
fn draw_outlined_text<F: Font>(
    canvas: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    scale: f32,
    font: &F,
) {
    let scale = PxScale::from(scale);
    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        draw_text_mut(canvas, WHITE, x + dx, y + dy, scale, font, text);
    }
    draw_text_mut(canvas, BLACK, x, y, scale, font, text);
}

#[allow(clippy::cast_possible_wrap)]
const fn to_i32(v: u32) -> i32 {
    v as i32
}

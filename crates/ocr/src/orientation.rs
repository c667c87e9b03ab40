//! Page rotation correction.
//!
//! The OCR engine's orientation estimate is trusted first; when it fails, or leaves
//! a page landscape while portrait is preferred, every quarter turn is scored with a
//! fast OCR pass and the most readable one wins.

use albaran_core::OrientationConfig;
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::recognizer::OcrBackend;
use crate::types::PageSegMode;

/// Quarter turns tried by the brute-force search, in evaluation order.
pub const CANDIDATE_ANGLES: [u32; 4] = [0, 90, 180, 270];

/// Readability statistics for one OCR pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextScore {
    pub alpha: usize,
    pub words: usize,
    pub lines: usize,
}

impl TextScore {
    pub fn of(text: &str) -> Self {
        Self {
            alpha: text.chars().filter(|c| c.is_alphabetic()).count(),
            words: text
                .split_whitespace()
                .filter(|w| w.chars().count() > 2 && w.chars().all(char::is_alphabetic))
                .count(),
            lines: text.lines().filter(|l| !l.trim().is_empty()).count(),
        }
    }

    pub fn value(&self) -> f64 {
        self.alpha as f64 + 5.0 * self.words as f64 + 2.0 * self.lines as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RotationCandidate {
    /// Counter-clockwise rotation applied to the input.
    pub angle: u32,
    pub score: f64,
    /// `None` when the OCR pass failed for this angle.
    pub text: Option<TextScore>,
}

#[derive(Debug, Clone)]
pub struct RotationSearch {
    pub image: DynamicImage,
    pub angle: u32,
    pub candidates: Vec<RotationCandidate>,
}

/// Rotate counter-clockwise by a multiple of 90°; other angles leave the image as is.
pub fn rotate_ccw(img: &DynamicImage, degrees: u32) -> DynamicImage {
    match degrees % 360 {
        90 => img.rotate270(),
        180 => img.rotate180(),
        270 => img.rotate90(),
        _ => img.clone(),
    }
}

fn is_portrait_or_square(img: &DynamicImage) -> bool {
    img.height() >= img.width()
}

/// Bring a page upright. Always returns an image, whatever the engine does.
pub fn normalize_orientation<R: OcrBackend + ?Sized>(
    img: DynamicImage,
    backend: &R,
    lang: &str,
    config: &OrientationConfig,
) -> DynamicImage {
    let img = match backend.detect_orientation(&img, lang) {
        Ok(rotation) => {
            let rotation = rotation % 360;
            if rotation == 0 {
                img
            } else {
                info!(rotation, "Rotating page to correct orientation");
                // The estimate is clockwise; rotate_ccw takes the opposite sense.
                rotate_ccw(&img, 360 - rotation)
            }
        }
        Err(e) => {
            warn!(error = %e, "Orientation detection failed, trying all rotations");
            return try_rotations(img, backend, lang, config).image;
        }
    };

    if config.prefer_portrait && !is_portrait_or_square(&img) {
        debug!(width = img.width(), height = img.height(), "Page still landscape, trying all rotations");
        return try_rotations(img, backend, lang, config).image;
    }
    img
}

/// Score the four quarter turns and keep the best; ties go to the earliest angle.
///
/// An OCR failure scores the angle 0 but keeps it in the running.
pub fn try_rotations<R: OcrBackend + ?Sized>(
    img: DynamicImage,
    backend: &R,
    lang: &str,
    config: &OrientationConfig,
) -> RotationSearch {
    let mut candidates = Vec::with_capacity(CANDIDATE_ANGLES.len());

    for angle in CANDIDATE_ANGLES {
        let rotated;
        let candidate = if angle == 0 {
            &img
        } else {
            rotated = rotate_ccw(&img, angle);
            &rotated
        };

        let (score, text) = match backend.recognize(candidate, lang, PageSegMode::UniformBlock) {
            Ok(ocr_text) => {
                let stats = TextScore::of(&ocr_text);
                let mut score = stats.value();
                if config.prefer_portrait && is_portrait_or_square(candidate) {
                    score += config.portrait_bonus;
                }
                (score, Some(stats))
            }
            Err(e) => {
                warn!(angle, error = %e, "OCR failed while scoring rotation");
                (0.0, None)
            }
        };
        debug!(
            angle,
            score,
            alpha = text.map(|t| t.alpha),
            words = text.map(|t| t.words),
            lines = text.map(|t| t.lines),
            "Scored rotation"
        );
        candidates.push(RotationCandidate { angle, score, text });
    }

    let best = candidates
        .iter()
        .fold(None::<&RotationCandidate>, |best, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        })
        .map(|c| c.angle)
        .unwrap_or(0);

    if best != 0 {
        info!(angle = best, "Best rotation found");
    }
    let image = if best == 0 { img } else { rotate_ccw(&img, best) };
    RotationSearch { image, angle: best, candidates }
}

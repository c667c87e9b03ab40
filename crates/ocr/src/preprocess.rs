use albaran_core::BinarizeConfig;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageDecoder, ImageReader, Luma};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Decode a page and apply its embedded capture orientation (EXIF) losslessly.
pub fn load_page(data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let mut decoder = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

pub fn load_page_file(path: &Path) -> Result<DynamicImage, PreprocessError> {
    load_page(&std::fs::read(path)?)
}

/// Outcome of binarizing one page.
#[derive(Debug, Clone)]
pub struct Binarization {
    /// Pixels are exactly 0 or 255.
    pub image: GrayImage,
    /// Threshold actually applied (pixels strictly above it become white).
    pub threshold: u8,
    /// Otsu's threshold, whether or not it was kept.
    pub otsu_threshold: u8,
    /// White fraction the Otsu threshold produced.
    pub otsu_white_fraction: f64,
    pub used_fallback: bool,
}

/// Grayscale, upscale, contrast, sharpen, median-filter, then threshold.
pub fn prepare_for_ocr(img: &DynamicImage, config: &BinarizeConfig) -> Binarization {
    binarize(&enhance(img, config), config)
}

/// Grayscale enhancement applied ahead of thresholding.
pub fn enhance(img: &DynamicImage, config: &BinarizeConfig) -> GrayImage {
    let mut gray = img.to_luma8();

    if gray.width() > 0 && gray.width() < config.target_width {
        let scale = config.target_width as f64 / gray.width() as f64;
        let height = ((gray.height() as f64 * scale) as u32).max(1);
        gray = imageops::resize(&gray, config.target_width, height, FilterType::Lanczos3);
    }

    let gray = adjust_contrast(&gray, config.contrast);
    let gray = adjust_sharpness(&gray, config.sharpness);
    imageproc::filter::median_filter(&gray, config.median_radius, config.median_radius)
}

/// Scale every pixel's distance from the mean gray level by `factor`.
fn adjust_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    let n = gray.pixels().len();
    if n == 0 {
        return gray.clone();
    }
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    let mean = (sum as f64 / n as f64 + 0.5).floor() as f32;
    blend(gray, |_, _| mean, factor)
}

/// Extrapolate away from a smoothed copy by `factor`; 1.0 is the identity.
fn adjust_sharpness(gray: &GrayImage, factor: f32) -> GrayImage {
    let smooth: GrayImage =
        imageops::filter3x3(gray, &[1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0]);
    let (w, h) = gray.dimensions();
    blend(
        gray,
        |x, y| {
            // Borders keep the original pixels.
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                gray.get_pixel(x, y)[0] as f32
            } else {
                smooth.get_pixel(x, y)[0] as f32
            }
        },
        factor,
    )
}

fn blend(gray: &GrayImage, base: impl Fn(u32, u32) -> f32, factor: f32) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let b = base(x, y);
        let v = b + factor * (gray.get_pixel(x, y)[0] as f32 - b);
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

pub fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }
    hist
}

/// Otsu's method: the split `t` maximizing `w1·w2·(mean1−mean2)²`, where class 1 holds
/// levels `0..=t`. All 256 splits are examined; the first maximum wins.
pub fn otsu_threshold(hist: &[u64; 256]) -> u8 {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }
    let total = total as f64;
    let grand_sum: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut best = (0u8, f64::NEG_INFINITY);
    let (mut w1, mut sum1) = (0.0f64, 0.0f64);
    for (t, &count) in hist.iter().enumerate() {
        w1 += count as f64 / total;
        sum1 += t as f64 * count as f64 / total;
        let w2 = 1.0 - w1;
        let variance = if w1 <= 0.0 || w2 <= 1e-12 {
            0.0
        } else {
            let mean1 = sum1 / w1;
            let mean2 = (grand_sum / total - sum1) / w2;
            w1 * w2 * (mean1 - mean2).powi(2)
        };
        if variance > best.1 {
            best = (t as u8, variance);
        }
    }
    best.0
}

pub fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y)[0] > level { 255 } else { 0 }])
    })
}

pub fn white_fraction(binary: &GrayImage) -> f64 {
    let n = binary.pixels().len();
    if n == 0 {
        return 0.0;
    }
    binary.pixels().filter(|p| p[0] == 255).count() as f64 / n as f64
}

/// Threshold at Otsu's level, re-thresholding at the fixed fallback level when the
/// result is nearly all black or all white.
pub fn binarize(gray: &GrayImage, config: &BinarizeConfig) -> Binarization {
    let otsu = otsu_threshold(&histogram(gray));
    let image = threshold(gray, otsu);
    let fraction = white_fraction(&image);

    if (config.min_white_fraction..=config.max_white_fraction).contains(&fraction) {
        return Binarization {
            image,
            threshold: otsu,
            otsu_threshold: otsu,
            otsu_white_fraction: fraction,
            used_fallback: false,
        };
    }

    tracing::debug!(
        otsu,
        white_fraction = fraction,
        fallback = config.fallback_threshold,
        "Otsu threshold degenerate, using fixed threshold"
    );
    Binarization {
        image: threshold(gray, config.fallback_threshold),
        threshold: config.fallback_threshold,
        otsu_threshold: otsu,
        otsu_white_fraction: fraction,
        used_fallback: true,
    }
}

pub(crate) fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_gray(width: u32, height: u32, value: u8) -> GrayImage {
        ImageBuffer::from_fn(width, height, |_, _| Luma([value]))
    }

    fn bimodal_hist(low: usize, high: usize) -> [u64; 256] {
        let mut hist = [0u64; 256];
        for d in 0..5 {
            hist[low - 2 + d] = 100;
            hist[high - 2 + d] = 300;
        }
        hist
    }

    #[test]
    fn otsu_falls_between_peaks() {
        let t = otsu_threshold(&bimodal_hist(40, 200)) as usize;
        // Every split between the two occupied ranges separates them; the first wins.
        assert!(t > 40 && t < 200, "threshold was {t}");
        assert_eq!(t, 42);
    }

    #[test]
    fn otsu_is_deterministic_on_flat_histograms() {
        // Single occupied level: every split has zero variance, so the first wins.
        let mut hist = [0u64; 256];
        hist[255] = 1000;
        assert_eq!(otsu_threshold(&hist), 0);
        assert_eq!(otsu_threshold(&[0u64; 256]), 0);
    }

    #[test]
    fn binarized_page_has_only_two_levels() {
        let gray: GrayImage =
            ImageBuffer::from_fn(40, 40, |x, _| Luma([if x < 20 { 30 } else { 220 }]));
        let b = binarize(&gray, &BinarizeConfig::default());
        assert!(!b.used_fallback);
        assert!(b.image.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!((white_fraction(&b.image) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fallback_iff_otsu_result_degenerate() {
        let config = BinarizeConfig::default();
        let inputs = [
            solid_gray(20, 20, 255),
            solid_gray(20, 20, 0),
            ImageBuffer::from_fn(20, 20, |x, y| Luma([if x == 0 && y == 0 { 0 } else { 250 }])),
            ImageBuffer::from_fn(20, 20, |x, _| Luma([if x < 10 { 10 } else { 240 }])),
        ];
        for gray in &inputs {
            let b = binarize(gray, &config);
            let degenerate = !(0.02..=0.98).contains(&b.otsu_white_fraction);
            assert_eq!(b.used_fallback, degenerate);
            if b.used_fallback {
                assert_eq!(b.threshold, 128);
                assert_eq!(b.image, threshold(gray, 128));
            }
        }
    }

    #[test]
    fn all_white_page_uses_fixed_threshold() {
        let b = binarize(&solid_gray(10, 10, 255), &BinarizeConfig::default());
        assert!(b.used_fallback);
        assert_eq!(white_fraction(&b.image), 1.0);
    }

    #[test]
    fn narrow_pages_are_upscaled_preserving_aspect() {
        let config = BinarizeConfig { target_width: 200, ..Default::default() };
        let img = DynamicImage::ImageLuma8(solid_gray(50, 70, 200));
        let gray = enhance(&img, &config);
        assert_eq!(gray.width(), 200);
        assert_eq!(gray.height(), 280);
    }

    #[test]
    fn wide_pages_keep_their_size() {
        let config = BinarizeConfig { target_width: 50, ..Default::default() };
        let img = DynamicImage::ImageLuma8(solid_gray(60, 30, 200));
        let gray = enhance(&img, &config);
        assert_eq!(gray.dimensions(), (60, 30));
    }

    #[test]
    fn contrast_pushes_levels_away_from_mean() {
        let gray: GrayImage =
            ImageBuffer::from_fn(4, 1, |x, _| Luma([if x < 2 { 100 } else { 140 }]));
        let out = adjust_contrast(&gray, 2.5);
        assert_eq!(out.get_pixel(0, 0)[0], 70);
        assert_eq!(out.get_pixel(3, 0)[0], 170);
    }

    #[test]
    fn unit_sharpness_is_identity() {
        let gray: GrayImage = ImageBuffer::from_fn(8, 8, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));
        assert_eq!(adjust_sharpness(&gray, 1.0), gray);
    }

    #[test]
    fn load_page_round_trips_png() {
        let img = DynamicImage::ImageLuma8(solid_gray(6, 4, 100));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        let loaded = load_page(&png).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (6, 4));
    }

    #[test]
    fn load_page_rejects_garbage() {
        assert!(load_page(b"definitely not an image").is_err());
    }
}

//! Chart screenshot preprocessing
//!
//! Steps, in order: crop the chart chrome, boost saturation/value inside the
//! bullish and bearish hue bands, classify pixels into two masks, recolor
//! near-black wick pixels next to the masks, sharpen, flatten everything outside
//! the masks to one background color, and erase thin full-width lines.

use image::{imageops, DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::helpers::{
    connected_regions, is_near_black, rgb_to_hsv, hsv_to_rgb, window, GRID_LINE_MAX_HEIGHT,
    MASK_OFF, MASK_ON, MIN_CHART_HEIGHT, MIN_CHART_WIDTH,
};
use crate::{CandleColor, ChartError, Result};

/// 3x3 sharpen kernel, sums to 1
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

// ============================================================
// CONFIG
// ============================================================

/// Pixels removed from each edge of the screenshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropMargins {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropMargins {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Inclusive hue band in degrees. A band with `min > max` wraps through 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HueBand {
    pub min: f32,
    pub max: f32,
}

impl HueBand {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, hue: f32) -> bool {
        if self.min <= self.max {
            hue >= self.min && hue <= self.max
        } else {
            hue >= self.min || hue <= self.max
        }
    }

    fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}

/// Preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub crop: CropMargins,
    pub bullish_hue: HueBand,
    pub bearish_hue: HueBand,
    /// Pure color written into repaired bullish wick pixels
    pub bullish_color: [u8; 3],
    /// Pure color written into repaired bearish wick pixels
    pub bearish_color: [u8; 3],
    pub background: [u8; 3],
    /// Pixels below this saturation are left alone by the boost
    pub boost_min_saturation: f32,
    pub saturation_boost: f32,
    pub value_boost: f32,
    pub mask_min_saturation: f32,
    pub mask_min_value: f32,
    /// Channel ceiling for a near-black pixel
    pub near_black_max: u8,
    pub wick_radius: u32,
    /// Fraction of the chart width a thin region must span to count as a grid line
    pub grid_line_min_span: f32,
    /// Regions with fewer pixels are dropped as noise
    pub min_candle_area: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            crop: CropMargins::default(),
            bullish_hue: HueBand::new(80.0, 190.0),
            bearish_hue: HueBand::new(340.0, 20.0),
            bullish_color: [0, 255, 0],
            bearish_color: [255, 0, 0],
            background: [255, 255, 255],
            boost_min_saturation: 0.15,
            saturation_boost: 1.6,
            value_boost: 1.3,
            mask_min_saturation: 0.35,
            mask_min_value: 0.35,
            near_black_max: 60,
            wick_radius: 2,
            grid_line_min_span: 0.6,
            min_candle_area: 4,
        }
    }
}

impl PreprocessConfig {
    #[inline]
    pub fn color_of(&self, color: CandleColor) -> [u8; 3] {
        match color {
            CandleColor::Bullish => self.bullish_color,
            CandleColor::Bearish => self.bearish_color,
        }
    }

    /// Mask color of an enhanced pixel, if any
    pub fn classify_pixel(&self, rgb: [u8; 3]) -> Option<CandleColor> {
        let (hue, saturation, value) = rgb_to_hsv(rgb);
        if saturation < self.mask_min_saturation || value < self.mask_min_value {
            return None;
        }
        if self.bullish_hue.contains(hue) {
            Some(CandleColor::Bullish)
        } else if self.bearish_hue.contains(hue) {
            Some(CandleColor::Bearish)
        } else {
            None
        }
    }

    /// Clamp fractions into 0..=1 and boosts to at least 1
    pub(crate) fn sanitize(&mut self) -> Vec<ChartError> {
        let mut issues = Vec::new();
        let mut clamp = |field: &'static str, value: &mut f32, min: f32, max: f32| {
            if value.is_nan() || *value < min || *value > max {
                let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
                warn!(field, value = *value, clamped, "preprocess value out of range, clamped");
                issues.push(ChartError::OutOfRange {
                    field,
                    value: *value as f64,
                    min: min as f64,
                    max: max as f64,
                });
                *value = clamped;
            }
        };

        clamp("boost_min_saturation", &mut self.boost_min_saturation, 0.0, 1.0);
        clamp("saturation_boost", &mut self.saturation_boost, 1.0, 10.0);
        clamp("value_boost", &mut self.value_boost, 1.0, 10.0);
        clamp("mask_min_saturation", &mut self.mask_min_saturation, 0.0, 1.0);
        clamp("mask_min_value", &mut self.mask_min_value, 0.0, 1.0);
        clamp("grid_line_min_span", &mut self.grid_line_min_span, 0.0, 1.0);

        issues
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.bullish_hue.is_finite() || !self.bearish_hue.is_finite() {
            return Err(ChartError::InvalidConfig("hue band bounds must be finite".into()));
        }
        let overlap = (0..360)
            .map(|h| h as f32)
            .find(|&h| self.bullish_hue.contains(h) && self.bearish_hue.contains(h));
        if let Some(hue) = overlap {
            return Err(ChartError::InvalidConfig(format!(
                "bullish and bearish hue bands overlap at {hue} degrees"
            )));
        }
        Ok(())
    }
}

// ============================================================
// MASKS
// ============================================================

/// One binary mask per candle color, same size as the cropped chart
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMasks {
    pub bullish: GrayImage,
    pub bearish: GrayImage,
}

impl ColorMasks {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            bullish: GrayImage::new(width, height),
            bearish: GrayImage::new(width, height),
        }
    }

    #[inline]
    pub fn get(&self, color: CandleColor) -> &GrayImage {
        match color {
            CandleColor::Bullish => &self.bullish,
            CandleColor::Bearish => &self.bearish,
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.bullish.dimensions()
    }

    /// Color whose mask is set at `(x, y)`; bullish wins if both are
    #[inline]
    pub fn color_at(&self, x: u32, y: u32) -> Option<CandleColor> {
        CandleColor::ALL
            .into_iter()
            .find(|&color| self.get(color).get_pixel(x, y)[0] != MASK_OFF)
    }

    #[inline]
    pub fn set(&mut self, color: CandleColor, x: u32, y: u32) {
        let mask = match color {
            CandleColor::Bullish => &mut self.bullish,
            CandleColor::Bearish => &mut self.bearish,
        };
        mask.put_pixel(x, y, Luma([MASK_ON]));
    }

    /// Clear `(x, y)` in both masks
    #[inline]
    pub fn clear(&mut self, x: u32, y: u32) {
        self.bullish.put_pixel(x, y, Luma([MASK_OFF]));
        self.bearish.put_pixel(x, y, Luma([MASK_OFF]));
    }

    /// Number of set pixels per mask
    pub fn counts(&self) -> (usize, usize) {
        let count = |mask: &GrayImage| mask.pixels().filter(|p| p[0] != MASK_OFF).count();
        (count(&self.bullish), count(&self.bearish))
    }
}

/// Output of [`preprocess`]
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Enhanced, flattened chart
    pub image: RgbImage,
    pub masks: ColorMasks,
}

// ============================================================
// PIPELINE
// ============================================================

/// Run every preprocessing step on a decoded screenshot
pub fn preprocess(image: &DynamicImage, cfg: &PreprocessConfig) -> Result<Preprocessed> {
    let cropped = crop(image, &cfg.crop)?;
    let mut enhanced = boost_colors(&cropped, cfg);
    let mut masks = classify_pixels(&enhanced, cfg);
    let repaired = repair_wicks(&mut enhanced, &mut masks, cfg);
    let mut image = sharpen(&enhanced);
    flatten_background(&mut image, &masks, cfg.background);
    let grid_lines = remove_grid_lines(&mut image, &mut masks, cfg);

    let (bullish, bearish) = masks.counts();
    debug!(
        width = image.width(),
        height = image.height(),
        bullish,
        bearish,
        repaired,
        grid_lines,
        "chart preprocessed"
    );

    Ok(Preprocessed { image, masks })
}

/// Cut the margins off and convert to RGB
pub fn crop(image: &DynamicImage, margins: &CropMargins) -> Result<RgbImage> {
    let width = image
        .width()
        .saturating_sub(margins.left.saturating_add(margins.right));
    let height = image
        .height()
        .saturating_sub(margins.top.saturating_add(margins.bottom));

    if width < MIN_CHART_WIDTH || height < MIN_CHART_HEIGHT {
        return Err(ChartError::Geometry {
            width,
            height,
            min_width: MIN_CHART_WIDTH,
            min_height: MIN_CHART_HEIGHT,
        });
    }

    Ok(image
        .crop_imm(margins.left, margins.top, width, height)
        .to_rgb8())
}

/// Scale saturation and value of pixels inside either candle hue band
pub fn boost_colors(image: &RgbImage, cfg: &PreprocessConfig) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let (hue, saturation, value) = rgb_to_hsv(pixel.0);
        if saturation < cfg.boost_min_saturation {
            continue;
        }
        if cfg.bullish_hue.contains(hue) || cfg.bearish_hue.contains(hue) {
            pixel.0 = hsv_to_rgb(
                hue,
                (saturation * cfg.saturation_boost).min(1.0),
                (value * cfg.value_boost).min(1.0),
            );
        }
    }
    out
}

/// Build both masks from an enhanced image
pub fn classify_pixels(image: &RgbImage, cfg: &PreprocessConfig) -> ColorMasks {
    let (width, height) = image.dimensions();
    let mut masks = ColorMasks::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        if let Some(color) = cfg.classify_pixel(pixel.0) {
            masks.set(color, x, y);
        }
    }
    masks
}

/// Recolor near-black pixels within `wick_radius` of a candle region.
///
/// One dilation pass against the masks as classified; repaired pixels do
/// not seed further repair. When both colors are in reach the first mask
/// pixel of the window in row-major order decides. Returns the repaired
/// count.
pub fn repair_wicks(image: &mut RgbImage, masks: &mut ColorMasks, cfg: &PreprocessConfig) -> usize {
    let (width, height) = image.dimensions();
    let original = masks.clone();

    let mut repaired = 0;
    for y in 0..height {
        for x in 0..width {
            if original.color_at(x, y).is_some()
                || !is_near_black(image.get_pixel(x, y).0, cfg.near_black_max)
            {
                continue;
            }
            let owner = window(x, y, cfg.wick_radius, width, height)
                .find_map(|(nx, ny)| original.color_at(nx, ny));
            if let Some(color) = owner {
                masks.set(color, x, y);
                image.put_pixel(x, y, Rgb(cfg.color_of(color)));
                repaired += 1;
            }
        }
    }

    repaired
}

pub fn sharpen(image: &RgbImage) -> RgbImage {
    imageops::filter3x3(image, &SHARPEN_KERNEL)
}

/// Paint every pixel outside both masks with `background`
pub fn flatten_background(image: &mut RgbImage, masks: &ColorMasks, background: [u8; 3]) {
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if masks.color_at(x, y).is_none() {
            *pixel = Rgb(background);
        }
    }
}

/// Erase thin regions spanning most of the chart width from masks and image.
/// Returns the number of erased regions.
pub fn remove_grid_lines(image: &mut RgbImage, masks: &mut ColorMasks, cfg: &PreprocessConfig) -> usize {
    let min_span = (image.width() as f32 * cfg.grid_line_min_span).ceil() as u32;
    let mut removed = 0;

    for color in CandleColor::ALL {
        let lines: Vec<_> = connected_regions(masks.get(color))
            .into_iter()
            .filter(|r| r.height() < GRID_LINE_MAX_HEIGHT && r.width() >= min_span)
            .collect();

        for region in &lines {
            for &(x, y) in &region.pixels {
                masks.clear(x, y);
                image.put_pixel(x, y, Rgb(cfg.background));
            }
        }
        removed += lines.len();
    }

    removed
}

// ============================================================
// TESTS
// ============================================================

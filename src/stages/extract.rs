//! Candle extraction
//!
//! Connected mask regions become candle boxes. Boxes from both masks are
//! merged left to right; two boxes sharing an `x_center` keep the larger one.
//! Arrow numbers count backward from the newest completed candle.

use tracing::{debug, trace};

use super::helpers::{connected_regions, Region};
use super::preprocess::ColorMasks;
use crate::{CandleColor, CandleRecord};

/// Bounding box of one mask region before ordering and numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleBox {
    pub x_center: u32,
    pub top_y: u32,
    pub bottom_y: u32,
    /// Pixel count of the source region
    pub area: usize,
    pub color: CandleColor,
}

impl CandleBox {
    pub const fn new(x_center: u32, top_y: u32, bottom_y: u32, area: usize, color: CandleColor) -> Self {
        Self {
            x_center,
            top_y,
            bottom_y,
            area,
            color,
        }
    }

    pub fn from_region(region: &Region, color: CandleColor) -> Self {
        Self {
            x_center: region.x_center(),
            top_y: region.min_y,
            bottom_y: region.max_y,
            area: region.area(),
            color,
        }
    }
}

/// Candle records from both color masks
pub fn extract_candles(masks: &ColorMasks, min_area: usize) -> Vec<CandleRecord> {
    let mut boxes = Vec::new();
    let mut noise = 0usize;

    for color in CandleColor::ALL {
        for region in connected_regions(masks.get(color)) {
            if region.area() < min_area {
                noise += 1;
                continue;
            }
            boxes.push(CandleBox::from_region(&region, color));
        }
    }

    let regions = boxes.len();
    let candles = assemble_candles(boxes);
    debug!(
        regions,
        noise,
        candles = candles.len(),
        "candles extracted"
    );
    candles
}

/// Order boxes left to right, drop `x_center` collisions and number them.
///
/// On a collision the larger area wins; equal areas keep the bullish box,
/// then the higher one. The newest box gets no arrow number.
pub fn assemble_candles(mut boxes: Vec<CandleBox>) -> Vec<CandleRecord> {
    boxes.sort_by(|a, b| {
        a.x_center
            .cmp(&b.x_center)
            .then(b.area.cmp(&a.area))
            .then(a.color.cmp(&b.color))
            .then(a.top_y.cmp(&b.top_y))
            .then(a.bottom_y.cmp(&b.bottom_y))
    });

    let before = boxes.len();
    boxes.dedup_by_key(|b| b.x_center);
    if boxes.len() < before {
        trace!(dropped = before - boxes.len(), "x_center collisions resolved");
    }

    let newest = boxes.len().saturating_sub(1);
    boxes
        .into_iter()
        .enumerate()
        .map(|(i, b)| CandleRecord {
            sequence_index: i,
            arrow_number: (i < newest).then(|| (newest - i) as u32),
            x_center: b.x_center,
            top_y: b.top_y,
            bottom_y: b.bottom_y,
            color: b.color,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    use crate::stages::helpers::MASK_ON;

    fn fill(mask: &mut image::GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
    }

    #[test]
    fn test_assemble_orders_and_numbers() {
        let boxes = vec![
            CandleBox::new(50, 10, 40, 100, CandleColor::Bearish),
            CandleBox::new(10, 20, 30, 100, CandleColor::Bullish),
            CandleBox::new(30, 15, 35, 100, CandleColor::Bullish),
        ];
        let candles = assemble_candles(boxes);

        let xs: Vec<_> = candles.iter().map(|c| c.x_center).collect();
        assert_eq!(xs, vec![10, 30, 50]);
        let arrows: Vec<_> = candles.iter().map(|c| c.arrow_number).collect();
        assert_eq!(arrows, vec![Some(2), Some(1), None]);
        assert!(candles[2].is_in_progress());
    }

    #[test]
    fn test_collision_keeps_larger_area() {
        let boxes = vec![
            CandleBox::new(20, 5, 8, 12, CandleColor::Bullish),
            CandleBox::new(20, 10, 60, 300, CandleColor::Bearish),
            CandleBox::new(40, 10, 60, 300, CandleColor::Bullish),
        ];
        let candles = assemble_candles(boxes);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].color, CandleColor::Bearish);
        assert_eq!(candles[0].top_y, 10);
    }

    #[test]
    fn test_fewer_than_two_candles() {
        assert!(assemble_candles(Vec::new()).is_empty());
        let single = assemble_candles(vec![CandleBox::new(5, 1, 9, 20, CandleColor::Bullish)]);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].arrow_number, None);
    }

    #[test]
    fn test_extract_from_masks_drops_noise() {
        let mut masks = ColorMasks::new(60, 60);
        fill(&mut masks.bullish, 5, 10, 9, 40);
        fill(&mut masks.bearish, 20, 15, 24, 50);
        // single-pixel speck
        masks.bearish.put_pixel(40, 40, Luma([MASK_ON]));

        let candles = extract_candles(&masks, 4);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].x_center, 7);
        assert_eq!(candles[0].top_y, 10);
        assert_eq!(candles[0].bottom_y, 40);
        assert_eq!(candles[1].color, CandleColor::Bearish);
        assert_eq!(candles[1].height(), 36);
    }
}

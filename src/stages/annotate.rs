//! Chart annotation
//!
//! Draws candle outlines, swing markers (highs above the candle, lows below)
//! and every trend line with its extension over a copy of the cropped chart.

use image::{Rgb, RgbImage};

use crate::{Analysis, CandleRecord, PixelPoint, SwingKind, SwingPoint, TrendDirection};

pub const CANDLE_OUTLINE: Rgb<u8> = Rgb([40, 40, 40]);
pub const HIGH_MARKER: Rgb<u8> = Rgb([0, 90, 255]);
pub const LOW_MARKER: Rgb<u8> = Rgb([255, 140, 0]);
pub const DESCENDING_LINE: Rgb<u8> = Rgb([160, 0, 200]);
pub const ASCENDING_LINE: Rgb<u8> = Rgb([0, 160, 160]);
pub const EXTENSION_LINE: Rgb<u8> = Rgb([128, 128, 128]);

/// Marker half width in pixels
const MARKER_RADIUS: i64 = 3;
/// Gap between a candle extreme and its marker
const MARKER_GAP: i64 = 4;
/// Outline half width; candle records carry no body width
const OUTLINE_HALF_WIDTH: f64 = 4.0;

pub fn annotate(base: &RgbImage, analysis: &Analysis) -> RgbImage {
    let mut canvas = base.clone();

    for candle in &analysis.candles {
        draw_outline(&mut canvas, candle);
    }

    for line in &analysis.trendlines {
        let color = match line.direction {
            TrendDirection::Descending => DESCENDING_LINE,
            TrendDirection::Ascending => ASCENDING_LINE,
        };
        draw_line(&mut canvas, line.start, line.end, color);
        draw_line(&mut canvas, line.end, line.extension, EXTENSION_LINE);
    }

    for point in analysis.swings.highs.iter().chain(&analysis.swings.lows) {
        draw_marker(&mut canvas, point);
    }

    canvas
}

/// One pixel box just outside the candle's extremes
fn draw_outline(canvas: &mut RgbImage, candle: &CandleRecord) {
    let left = candle.x_center as f64 - OUTLINE_HALF_WIDTH;
    let right = candle.x_center as f64 + OUTLINE_HALF_WIDTH;
    let top = candle.top_y as f64 - 1.0;
    let bottom = candle.bottom_y as f64 + 1.0;

    let corners = [
        PixelPoint::new(left, top),
        PixelPoint::new(right, top),
        PixelPoint::new(right, bottom),
        PixelPoint::new(left, bottom),
    ];
    for (i, &corner) in corners.iter().enumerate() {
        draw_line(canvas, corner, corners[(i + 1) % corners.len()], CANDLE_OUTLINE);
    }
}

/// Filled triangle pointing at the candle extreme
fn draw_marker(canvas: &mut RgbImage, point: &SwingPoint) {
    let x = point.x as i64;
    let y = point.y as i64;
    let (color, tip, step) = match point.kind {
        SwingKind::High => (HIGH_MARKER, y - MARKER_GAP, -1),
        SwingKind::Low => (LOW_MARKER, y + MARKER_GAP, 1),
    };

    for row in 0..=MARKER_RADIUS {
        for dx in -row..=row {
            put(canvas, x + dx, tip + step * row, color);
        }
    }
}

/// Bresenham segment, clipped to the canvas
pub fn draw_line(canvas: &mut RgbImage, from: PixelPoint, to: PixelPoint, color: Rgb<u8>) {
    let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(canvas, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[inline]
fn put(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::swing::SwingSet;
    use crate::CandleColor;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn test_line_is_clipped() {
        let mut canvas = RgbImage::from_pixel(10, 10, WHITE);
        draw_line(
            &mut canvas,
            PixelPoint::new(-5.0, 5.0),
            PixelPoint::new(20.0, 5.0),
            DESCENDING_LINE,
        );
        assert!((0..10).all(|x| *canvas.get_pixel(x, 5) == DESCENDING_LINE));
        assert_eq!(*canvas.get_pixel(0, 4), WHITE);
    }

    #[test]
    fn test_markers_sit_outside_the_candle() {
        let candle = CandleRecord {
            sequence_index: 0,
            arrow_number: Some(1),
            x_center: 10,
            top_y: 10,
            bottom_y: 20,
            color: CandleColor::Bullish,
        };
        let analysis = Analysis {
            width: 30,
            height: 30,
            candles: vec![candle],
            swings: SwingSet {
                highs: vec![SwingPoint::new(&candle, SwingKind::High, 1)],
                lows: vec![SwingPoint::new(&candle, SwingKind::Low, 1)],
            },
            trendlines: Vec::new(),
        };
        let base = RgbImage::from_pixel(30, 30, WHITE);
        let out = annotate(&base, &analysis);

        assert_eq!(*out.get_pixel(10, 6), HIGH_MARKER);
        assert_eq!(*out.get_pixel(10, 24), LOW_MARKER);
        assert_eq!(*out.get_pixel(10, 15), WHITE);
        assert_eq!(*out.get_pixel(6, 15), CANDLE_OUTLINE);
        assert_eq!(*out.get_pixel(10, 21), CANDLE_OUTLINE);
        assert_eq!(*base.get_pixel(10, 6), WHITE);
    }
}

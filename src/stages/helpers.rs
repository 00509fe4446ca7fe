//! Shared pixel, color and line helpers
//!
//! Thresholds used by several stages live here so they are defined once.

use image::GrayImage;

use crate::PixelPoint;

// ============================================================
// THRESHOLDS
// ============================================================

/// Mask value of a set pixel
pub const MASK_ON: u8 = 255;
/// Mask value of a cleared pixel
pub const MASK_OFF: u8 = 0;

/// Smallest chart width left after cropping
pub const MIN_CHART_WIDTH: u32 = 20;
/// Smallest chart height left after cropping
pub const MIN_CHART_HEIGHT: u32 = 20;

/// Regions strictly thinner than this are grid-line candidates
pub const GRID_LINE_MAX_HEIGHT: u32 = 5;

/// Vertical tolerance of the trend line crossing check (pixels)
pub const CROSSING_TOLERANCE: u32 = 20;
/// Height of the stoploss box projected from the order parent (pixels)
pub const STOPLOSS_BOX_HEIGHT: u32 = 40;
/// Same-kind swing points after the partner that expire a pending order
pub const EXPIRY_SWING_COUNT: usize = 3;

// ============================================================
// COLOR
// ============================================================

/// 8-bit RGB to (hue in degrees 0..360, saturation 0..=1, value 0..=1)
#[inline]
pub fn rgb_to_hsv(rgb: [u8; 3]) -> (f32, f32, f32) {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };

    (hue, saturation, max)
}

/// Inverse of [`rgb_to_hsv`]
#[inline]
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let chroma = value * saturation;
    let sector = hue.rem_euclid(360.0) / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());

    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    let channel = |c: f32| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;

    [channel(r), channel(g), channel(b)]
}

/// All three channels at or below `max`
#[inline]
pub fn is_near_black(rgb: [u8; 3], max: u8) -> bool {
    rgb.iter().all(|&c| c <= max)
}

// ============================================================
// PIXEL NEIGHBORHOODS
// ============================================================

/// The up-to-8 in-bounds neighbors of `(x, y)`
pub fn neighbors8(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    const OFFSETS: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];
    OFFSETS.iter().filter_map(move |&(dx, dy)| {
        let nx = x as i64 + dx;
        let ny = y as i64 + dy;
        (nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64)
            .then_some((nx as u32, ny as u32))
    })
}

/// In-bounds pixels within Chebyshev distance `radius` of `(x, y)`, row-major
pub fn window(
    x: u32,
    y: u32,
    radius: u32,
    width: u32,
    height: u32,
) -> impl Iterator<Item = (u32, u32)> {
    let x0 = x.saturating_sub(radius);
    let x1 = x.saturating_add(radius).min(width.saturating_sub(1));
    let y0 = y.saturating_sub(radius);
    let y1 = y.saturating_add(radius).min(height.saturating_sub(1));
    (y0..=y1).flat_map(move |wy| (x0..=x1).map(move |wx| (wx, wy)))
}

// ============================================================
// CONNECTED REGIONS
// ============================================================

/// One 8-connected component of a mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixels: Vec<(u32, u32)>,
}

impl Region {
    fn seed(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixels: Vec::new(),
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixels.push((x, y));
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    #[inline]
    pub fn x_center(&self) -> u32 {
        (self.min_x + self.max_x) / 2
    }
}

/// 8-connected components of the set pixels of `mask`, in row-major
/// discovery order
pub fn connected_regions(mask: &GrayImage) -> Vec<Region> {
    let (width, height) = mask.dimensions();
    let index = |x: u32, y: u32| y as usize * width as usize + x as usize;
    let mut visited = vec![false; width as usize * height as usize];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if visited[index(x, y)] || mask.get_pixel(x, y)[0] == MASK_OFF {
                continue;
            }
            visited[index(x, y)] = true;
            stack.push((x, y));

            let mut region = Region::seed(x, y);
            while let Some((px, py)) = stack.pop() {
                region.include(px, py);
                for (nx, ny) in neighbors8(px, py, width, height) {
                    let i = index(nx, ny);
                    if !visited[i] && mask.get_pixel(nx, ny)[0] != MASK_OFF {
                        visited[i] = true;
                        stack.push((nx, ny));
                    }
                }
            }
            regions.push(region);
        }
    }

    regions
}

// ============================================================
// LINES
// ============================================================

/// Row of the straight line through `a` and `b` at column `x`
#[inline]
pub fn interpolate_y(a: PixelPoint, b: PixelPoint, x: f64) -> f64 {
    let dx = b.x - a.x;
    if dx.abs() <= f64::EPSILON {
        return a.y;
    }
    a.y + (b.y - a.y) * (x - a.x) / dx
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_hsv_round_trip_primaries() {
        for rgb in [[0, 255, 0], [255, 0, 0], [0, 0, 255], [255, 255, 255], [0, 0, 0]] {
            let (h, s, v) = rgb_to_hsv(rgb);
            assert_eq!(hsv_to_rgb(h, s, v), rgb);
        }
    }

    #[test]
    fn test_hue_of_candle_colors() {
        let (green, _, _) = rgb_to_hsv([0, 200, 0]);
        let (red, _, _) = rgb_to_hsv([220, 0, 0]);
        assert!((green - 120.0).abs() < 0.5);
        assert!(red.abs() < 0.5);
    }

    #[test]
    fn test_window_clips_at_edges() {
        let pixels: Vec<_> = window(0, 0, 2, 10, 10).collect();
        assert_eq!(pixels.len(), 9);
        assert_eq!(pixels[0], (0, 0));
        assert_eq!(window(5, 5, 1, 10, 10).count(), 9);
    }

    #[test]
    fn test_connected_regions_diagonal_and_split() {
        let mut mask = GrayImage::new(10, 10);
        // diagonal pair joins under 8-connectivity
        mask.put_pixel(1, 1, Luma([MASK_ON]));
        mask.put_pixel(2, 2, Luma([MASK_ON]));
        // separate block
        for y in 5..8 {
            for x in 6..8 {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }

        let regions = connected_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].area(), 2);
        assert_eq!(regions[1].area(), 6);
        assert_eq!(regions[1].width(), 2);
        assert_eq!(regions[1].height(), 3);
        assert_eq!(regions[1].x_center(), 6);
    }

    #[test]
    fn test_interpolate_y() {
        let a = PixelPoint::new(0.0, 10.0);
        let b = PixelPoint::new(10.0, 30.0);
        assert!((interpolate_y(a, b, 5.0) - 20.0).abs() < 1e-9);
        assert!((interpolate_y(a, b, 20.0) - 50.0).abs() < 1e-9);
        assert!((interpolate_y(a, a, 20.0) - 10.0).abs() < 1e-9);
    }
}

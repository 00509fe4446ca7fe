//! Parent swing point detection
//!
//! Run once per [`SwingKind`]. Phase A keeps candles that are more extreme
//! than their immediate neighbors. Phase B walks the candidate list outward
//! from each candidate: a less extreme neighbor counts toward the side's
//! requirement and the walk stops once the requirement is met, while any
//! other neighbor seen on the way marks the candidate as not dominant. Only
//! candidates meeting both counts without a single violation are promoted.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{CandleRecord, SwingKind, SwingPoint};

/// Neighbor requirements of the dominance scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dominance {
    pub left_required: usize,
    pub right_required: usize,
}

impl Dominance {
    pub const fn new(left_required: usize, right_required: usize) -> Self {
        Self {
            left_required,
            right_required,
        }
    }
}

/// Parent highs and lows of one chart, each in x order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwingSet {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

impl SwingSet {
    #[inline]
    pub fn of_kind(&self, kind: SwingKind) -> &[SwingPoint] {
        match kind {
            SwingKind::High => &self.highs,
            SwingKind::Low => &self.lows,
        }
    }

    /// Highs and lows merged in x order; at equal x the high comes first
    pub fn merged(&self) -> Vec<&SwingPoint> {
        let mut points: Vec<&SwingPoint> = self.highs.iter().chain(&self.lows).collect();
        points.sort_by_key(|p| (p.x, p.kind));
        points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.highs.len() + self.lows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.highs.is_empty() && self.lows.is_empty()
    }

    /// Point carrying `label` ("PH7", "PL3", ...)
    pub fn find(&self, label: &str) -> Option<&SwingPoint> {
        self.highs.iter().chain(&self.lows).find(|p| p.label == label)
    }
}

/// Detect parent highs and lows
pub fn detect_swings(candles: &[CandleRecord], dominance: Dominance) -> SwingSet {
    let highs = detect_kind(candles, SwingKind::High, dominance);
    let lows = detect_kind(candles, SwingKind::Low, dominance);

    debug!(
        candles = candles.len(),
        highs = highs.len(),
        lows = lows.len(),
        left_required = dominance.left_required,
        right_required = dominance.right_required,
        "swing points detected"
    );

    SwingSet { highs, lows }
}

/// Parent swing points of one kind
pub fn detect_kind(candles: &[CandleRecord], kind: SwingKind, dominance: Dominance) -> Vec<SwingPoint> {
    let candidates = local_candidates(candles, kind);
    let values: Vec<u32> = candidates.iter().map(|&i| kind.extreme(&candles[i])).collect();

    candidates
        .iter()
        .enumerate()
        .filter(|&(pos, _)| dominance_scan(&values, pos, kind, dominance))
        .filter_map(|(_, &i)| {
            let candle = &candles[i];
            match candle.arrow_number {
                Some(arrow) => Some(SwingPoint::new(candle, kind, arrow)),
                None => {
                    trace!(sequence_index = i, "dominant candle has no arrow number, skipped");
                    None
                }
            }
        })
        .collect()
}

/// Phase A: sequence indices of candles more extreme than every immediate
/// neighbor. The newest candle is never a candidate but serves as a neighbor.
pub fn local_candidates(candles: &[CandleRecord], kind: SwingKind) -> Vec<usize> {
    if candles.len() < 2 {
        return Vec::new();
    }

    (0..candles.len() - 1)
        .filter(|&i| {
            let value = kind.extreme(&candles[i]);
            let left = i.checked_sub(1).map(|j| kind.extreme(&candles[j]));
            let right = kind.extreme(&candles[i + 1]);
            left.into_iter()
                .chain(Some(right))
                .all(|neighbor| kind.beyond(value, neighbor))
        })
        .collect()
}

/// Phase B for the candidate at `pos` of `values` (candidate extremes in x
/// order)
pub fn dominance_scan(values: &[u32], pos: usize, kind: SwingKind, dominance: Dominance) -> bool {
    let value = values[pos];
    let mut dominant = true;

    let mut left_count = 0;
    let mut j = pos;
    while left_count < dominance.left_required && j > 0 {
        j -= 1;
        if kind.beyond(value, values[j]) {
            left_count += 1;
        } else {
            dominant = false;
        }
    }

    let mut right_count = 0;
    let mut j = pos + 1;
    while right_count < dominance.right_required && j < values.len() {
        if kind.beyond(value, values[j]) {
            right_count += 1;
        } else {
            dominant = false;
        }
        j += 1;
    }

    left_count >= dominance.left_required && right_count >= dominance.right_required && dominant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::extract::{assemble_candles, CandleBox};
    use crate::CandleColor;

    /// Candles 20px apart with the given bottoms and a fixed top
    fn lows(bottoms: &[u32]) -> Vec<CandleRecord> {
        assemble_candles(
            bottoms
                .iter()
                .enumerate()
                .map(|(i, &b)| CandleBox::new(10 + i as u32 * 20, 10, b, 50, CandleColor::Bullish))
                .collect(),
        )
    }

    #[test]
    fn test_local_candidates_edges() {
        // first candle only compares to its right neighbor
        let candles = lows(&[90, 50, 60, 80, 70]);
        assert_eq!(local_candidates(&candles, SwingKind::Low), vec![0, 3]);
    }

    #[test]
    fn test_newest_candle_never_candidate() {
        let candles = lows(&[50, 60, 90]);
        assert_eq!(local_candidates(&candles, SwingKind::Low), Vec::<usize>::new());
    }

    #[test]
    fn test_equal_neighbor_not_candidate() {
        let candles = lows(&[50, 80, 80, 50]);
        assert!(local_candidates(&candles, SwingKind::Low).is_empty());
    }

    #[test]
    fn test_dominance_stops_at_required_count() {
        // left: 40 (shallower) reached first, deeper 95 further out is never seen
        let values = [95, 40, 90];
        assert!(dominance_scan(&values, 2, SwingKind::Low, Dominance::new(1, 0)));
        assert!(!dominance_scan(&values, 2, SwingKind::Low, Dominance::new(2, 0)));
    }

    #[test]
    fn test_violation_before_threshold_rejects() {
        // 95 is deeper than 90, seen before the two shallower ones
        let values = [40, 50, 95, 90];
        assert!(!dominance_scan(&values, 3, SwingKind::Low, Dominance::new(2, 0)));
    }

    #[test]
    fn test_zero_requirements_promote_every_candidate() {
        let candles = lows(&[50, 90, 60, 70, 65, 55]);
        let points = detect_kind(&candles, SwingKind::Low, Dominance::new(0, 0));
        let labels: Vec<_> = points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["PL4", "PL2"]);
    }

    #[test]
    fn test_highs_use_top() {
        let candles = assemble_candles(vec![
            CandleBox::new(10, 40, 90, 50, CandleColor::Bullish),
            CandleBox::new(30, 20, 90, 50, CandleColor::Bullish),
            CandleBox::new(50, 45, 90, 50, CandleColor::Bearish),
            CandleBox::new(70, 30, 90, 50, CandleColor::Bearish),
        ]);
        let swings = detect_swings(&candles, Dominance::new(0, 0));
        assert_eq!(swings.highs.len(), 1);
        assert_eq!(swings.highs[0].label, "PH2");
        assert_eq!(swings.highs[0].y, 20);
        assert!(swings.lows.is_empty());
    }

    #[test]
    fn test_merged_orders_by_x_then_kind() {
        let candles = lows(&[50, 90, 60]);
        let point_low = SwingPoint::new(&candles[1], SwingKind::Low, 1);
        let point_high = SwingPoint::new(&candles[1], SwingKind::High, 1);
        let set = SwingSet {
            highs: vec![point_high],
            lows: vec![point_low],
        };
        let merged = set.merged();
        assert_eq!(merged[0].kind, SwingKind::High);
        assert_eq!(merged[1].kind, SwingKind::Low);
        assert_eq!(set.find("PL1").unwrap().y, 90);
    }
}

//! Trend line construction
//!
//! For every sender swing point the nearest unused swing point to its right
//! is tried as partner: of the same kind, or of the opposite kind under
//! [`ConnectionRule::OppositeKind`]. The line runs from the sender to the
//! receiver candle, `offset` candles past the partner, and must:
//!
//! - move in the line's direction (lower highs / higher lows),
//! - span at least `distance_threshold` pixels vertically,
//! - stay clear of every other swing point by `crossing_tolerance` pixels,
//!   both between its anchors and along its extension to the right edge,
//! - not be broken through by an intervening same-kind extreme.
//!
//! A rejected partner moves the search on to the next one. Each sender gets
//! at most one line per direction, so `(direction, sender, receiver)` is
//! unique by construction.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::helpers::{interpolate_y, CROSSING_TOLERANCE};
use super::swing::SwingSet;
use crate::{
    CandleRecord, ConnectionRule, DistanceThreshold, OrderStatus, PixelPoint, SwingPoint,
    TrendDirection, TrendLine, TrendlineOffset,
};

/// Trend line construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendlineParams {
    pub offset: TrendlineOffset,
    pub distance_threshold: DistanceThreshold,
    pub crossing_tolerance: u32,
    /// 0 = no lines
    pub max_trendlines: usize,
    /// Allow the in-progress candle as receiver
    pub allow_terminal: bool,
    pub rule: ConnectionRule,
}

impl Default for TrendlineParams {
    fn default() -> Self {
        Self {
            offset: TrendlineOffset::default(),
            distance_threshold: DistanceThreshold::default(),
            crossing_tolerance: CROSSING_TOLERANCE,
            max_trendlines: 10,
            allow_terminal: false,
            rule: ConnectionRule::default(),
        }
    }
}

/// Why a sender/partner connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No candle `offset` positions past the partner
    NoReceiver,
    /// Receiver would be the in-progress candle
    TerminalReceiver,
    /// Receiver does not move in the line's direction
    NotProgressing,
    BelowDistance { distance: u32 },
    /// A swing point between the anchors sits within tolerance of the line
    Crossing { x: u32 },
    /// A same-kind swing point between the anchors lies beyond the line
    BrokenThrough { x: u32 },
    /// A swing point past the receiver sits within tolerance of the extension
    ExtensionCrossing { x: u32 },
}

/// Build, validate and extend trend lines of both directions.
///
/// Returned lines are ordered by sender x and left unclassified
/// ([`OrderStatus::Invalid`]).
pub fn build_trendlines(
    candles: &[CandleRecord],
    swings: &SwingSet,
    width: u32,
    params: &TrendlineParams,
) -> Vec<TrendLine> {
    if params.max_trendlines == 0 {
        debug!("max_trendlines is 0, labels only");
        return Vec::new();
    }

    let all_points = swings.merged();
    let mut lines = Vec::new();

    for direction in TrendDirection::ALL {
        let kind = direction.swing_kind();
        let partners = swings.of_kind(params.rule.partner_kind(kind));
        let mut used = BTreeSet::new();

        for sender in swings.of_kind(kind) {
            for partner in partners.iter().filter(|p| p.x > sender.x) {
                if used.contains(&partner.candle) {
                    continue;
                }
                match connect(candles, &all_points, sender, partner, direction, width, params) {
                    Ok(line) => {
                        used.insert(partner.candle);
                        lines.push(line);
                        break;
                    }
                    Err(reason) => {
                        trace!(
                            ?direction,
                            sender = %sender.label,
                            partner = %partner.label,
                            ?reason,
                            "connection rejected"
                        );
                    }
                }
            }
        }
    }

    lines.sort_by_key(|l| (l.sender.x, l.direction));
    if lines.len() > params.max_trendlines {
        let excess = lines.len() - params.max_trendlines;
        lines.drain(..excess);
    }

    debug!(trendlines = lines.len(), "trend lines built");
    lines
}

/// Try one sender/partner connection
pub fn connect(
    candles: &[CandleRecord],
    all_points: &[&SwingPoint],
    sender: &SwingPoint,
    partner: &SwingPoint,
    direction: TrendDirection,
    width: u32,
    params: &TrendlineParams,
) -> Result<TrendLine, Rejection> {
    let receiver_index = partner.candle + params.offset.get();
    let receiver = candles.get(receiver_index).ok_or(Rejection::NoReceiver)?;
    if !params.allow_terminal && receiver.is_in_progress() {
        return Err(Rejection::TerminalReceiver);
    }

    let receiver_y = direction.swing_kind().extreme(receiver);
    if !direction.progresses(sender.y, receiver_y) {
        return Err(Rejection::NotProgressing);
    }
    let distance = sender.y.abs_diff(receiver_y);
    if distance < params.distance_threshold.get() {
        return Err(Rejection::BelowDistance { distance });
    }

    let start = sender.point();
    let end = PixelPoint::new(receiver.x_center as f64, receiver_y as f64);
    let right_edge = width.saturating_sub(1) as f64;
    check_crossings(
        all_points,
        start,
        end,
        right_edge,
        direction,
        &[sender, partner],
        params.crossing_tolerance,
    )?;

    let extension = PixelPoint::new(right_edge, interpolate_y(start, end, right_edge));

    Ok(TrendLine {
        direction,
        sender: sender.clone(),
        partner: partner.clone(),
        receiver: receiver_index,
        start,
        end,
        extension,
        breakout_parent: None,
        order_parent: None,
        execution: None,
        levels: None,
        order_status: OrderStatus::Invalid,
        stoploss_status: None,
    })
}

/// Crossing check of the segment `start..end` and its extension to
/// `right_edge`. Points at the anchors' or the receiver's x are ignored.
pub fn check_crossings(
    points: &[&SwingPoint],
    start: PixelPoint,
    end: PixelPoint,
    right_edge: f64,
    direction: TrendDirection,
    anchors: &[&SwingPoint],
    tolerance: u32,
) -> Result<(), Rejection> {
    let tolerance = tolerance as f64;

    for point in points {
        if anchors
            .iter()
            .any(|a| a.candle == point.candle && a.kind == point.kind)
        {
            continue;
        }

        let x = point.x as f64;
        if x <= start.x || x == end.x || x > right_edge {
            continue;
        }

        let gap = point.y as f64 - interpolate_y(start, end, x);
        if x < end.x {
            if gap.abs() <= tolerance {
                return Err(Rejection::Crossing { x: point.x });
            }
            if point.kind == direction.swing_kind() && direction.outside(gap) {
                return Err(Rejection::BrokenThrough { x: point.x });
            }
        } else if gap.abs() <= tolerance {
            return Err(Rejection::ExtensionCrossing { x: point.x });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::extract::{assemble_candles, CandleBox};
    use crate::stages::swing::{detect_swings, Dominance};
    use crate::{CandleColor, SwingKind};

    fn point(candle: usize, kind: SwingKind, x: u32, y: u32) -> SwingPoint {
        SwingPoint {
            candle,
            kind,
            x,
            y,
            arrow_number: 10 - candle as u32,
            label: format!("{}{}", kind.label_prefix(), 10 - candle as u32),
        }
    }

    /// Candles 20px apart from (top, bottom) pairs
    fn candles(boxes: &[(u32, u32)]) -> Vec<CandleRecord> {
        assemble_candles(
            boxes
                .iter()
                .enumerate()
                .map(|(i, &(t, b))| CandleBox::new(10 + i as u32 * 20, t, b, 50, CandleColor::Bearish))
                .collect(),
        )
    }

    #[test]
    fn test_collinear_middle_point_rejects_then_moved_accepts() {
        let sender = point(0, SwingKind::High, 0, 100);
        let partner = point(4, SwingKind::High, 80, 140);
        let mut middle = point(2, SwingKind::Low, 40, 125);
        let start = sender.point();
        let end = PixelPoint::new(100.0, 150.0);

        let points = vec![&sender, &middle, &partner];
        let res = check_crossings(&points, start, end, 199.0, TrendDirection::Descending, &[&sender, &partner], 20);
        assert_eq!(res, Err(Rejection::Crossing { x: 40 }));

        // same height, moved left of the sender: off the path
        middle.x = 0;
        middle.candle = 9;
        let points = vec![&middle, &sender, &partner];
        let res = check_crossings(&points, start, end, 199.0, TrendDirection::Descending, &[&sender, &partner], 20);
        assert_eq!(res, Ok(()));
    }

    #[test]
    fn test_extension_crossing_rejects() {
        let sender = point(0, SwingKind::High, 0, 100);
        let partner = point(4, SwingKind::High, 80, 140);
        let later = point(7, SwingKind::Low, 150, 172);
        let start = sender.point();
        let end = PixelPoint::new(100.0, 150.0);
        let points = vec![&sender, &partner, &later];
        // extension at x=150 sits at y=175
        let res = check_crossings(&points, start, end, 199.0, TrendDirection::Descending, &[&sender, &partner], 20);
        assert_eq!(res, Err(Rejection::ExtensionCrossing { x: 150 }));
    }

    #[test]
    fn test_broken_through_by_higher_high() {
        let sender = point(0, SwingKind::High, 0, 100);
        let partner = point(4, SwingKind::High, 80, 140);
        let spike = point(2, SwingKind::High, 40, 60);
        let start = sender.point();
        let end = PixelPoint::new(100.0, 150.0);
        let points = vec![&sender, &spike, &partner];
        let res = check_crossings(&points, start, end, 199.0, TrendDirection::Descending, &[&sender, &partner], 20);
        assert_eq!(res, Err(Rejection::BrokenThrough { x: 40 }));
    }

    /// Lower highs at 1 and 3 with lows well below
    fn descending_chart() -> Vec<CandleRecord> {
        candles(&[
            (60, 120),
            (20, 100),
            (70, 200),
            (50, 130),
            (90, 210),
            (80, 180),
        ])
    }

    #[test]
    fn test_descending_line_built_and_extended() {
        let candles = descending_chart();
        let swings = detect_swings(&candles, Dominance::new(0, 0));
        assert_eq!(swings.highs.len(), 2);

        let params = TrendlineParams::default();
        let lines = build_trendlines(&candles, &swings, 200, &params);
        let line = lines
            .iter()
            .find(|l| l.direction == TrendDirection::Descending)
            .unwrap();

        assert_eq!(line.sender.label, "PH4");
        assert_eq!(line.partner.label, "PH2");
        assert_eq!(line.receiver, 4);
        assert_eq!(line.start, PixelPoint::new(30.0, 20.0));
        assert_eq!(line.end, PixelPoint::new(90.0, 90.0));
        assert_eq!(line.extension.x, 199.0);
        assert!((line.extension.y - (20.0 + 70.0 * 169.0 / 60.0)).abs() < 1e-9);
        assert_eq!(line.order_status, OrderStatus::Invalid);
    }

    #[test]
    fn test_distance_threshold_and_terminal_receiver() {
        let candles = descending_chart();
        let swings = detect_swings(&candles, Dominance::new(0, 0));

        let far = TrendlineParams {
            distance_threshold: DistanceThreshold::new(100).unwrap(),
            ..TrendlineParams::default()
        };
        assert!(build_trendlines(&candles, &swings, 200, &far)
            .iter()
            .all(|l| l.direction != TrendDirection::Descending));

        // offset 2 lands on the newest candle
        let terminal = TrendlineParams {
            offset: TrendlineOffset::new(2).unwrap(),
            ..TrendlineParams::default()
        };
        let sender = swings.find("PH4").unwrap();
        let partner = swings.find("PH2").unwrap();
        let all = swings.merged();
        let res = connect(&candles, &all, sender, partner, TrendDirection::Descending, 200, &terminal);
        assert_eq!(res.unwrap_err(), Rejection::TerminalReceiver);

        let allowed = TrendlineParams {
            allow_terminal: true,
            ..terminal
        };
        let line = connect(&candles, &all, sender, partner, TrendDirection::Descending, 200, &allowed).unwrap();
        assert_eq!(line.receiver, 5);
    }

    #[test]
    fn test_opposite_kind_rule_connects_high_to_low() {
        let candles = descending_chart();
        let swings = detect_swings(&candles, Dominance::new(0, 0));
        let params = TrendlineParams {
            rule: ConnectionRule::OppositeKind,
            ..TrendlineParams::default()
        };
        let lines = build_trendlines(&candles, &swings, 200, &params);

        // PH2 only reaches the newest candle and no low sender ever rises
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.direction, TrendDirection::Descending);
        assert_eq!(line.sender.label, "PH4");
        assert_eq!(line.partner.label, "PL3");
        assert_eq!(line.partner.kind, SwingKind::Low);
        assert_eq!(line.receiver, 3);
        assert_eq!(line.end, PixelPoint::new(70.0, 50.0));
    }

    #[test]
    fn test_one_line_per_sender_and_direction() {
        let candles = candles(&[
            (60, 120),
            (20, 100),
            (70, 200),
            (50, 130),
            (90, 210),
            (80, 180),
            (110, 230),
            (95, 190),
            (130, 250),
            (120, 240),
        ]);
        let swings = detect_swings(&candles, Dominance::new(0, 0));

        for rule in [ConnectionRule::SameKind, ConnectionRule::OppositeKind] {
            let params = TrendlineParams {
                rule,
                ..TrendlineParams::default()
            };
            let lines = build_trendlines(&candles, &swings, 400, &params);
            let keys: BTreeSet<_> = lines.iter().map(|l| (l.direction, l.sender.candle)).collect();
            assert_eq!(keys.len(), lines.len(), "{rule:?}");
            let partners: BTreeSet<_> = lines.iter().map(|l| (l.direction, l.partner.candle)).collect();
            assert_eq!(partners.len(), lines.len(), "{rule:?}");
        }
    }

    #[test]
    fn test_max_trendlines_zero_is_labels_only() {
        let candles = descending_chart();
        let swings = detect_swings(&candles, Dominance::new(0, 0));
        let params = TrendlineParams {
            max_trendlines: 0,
            ..TrendlineParams::default()
        };
        assert!(build_trendlines(&candles, &swings, 200, &params).is_empty());
    }
}

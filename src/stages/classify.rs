//! Order state classification
//!
//! For a line whose partner is `R`, the breakout parent is the first later
//! swing point of R's kind that goes beyond R, and the order parent is the
//! swing point right before it, which must be of the opposite kind. What
//! counts as execution depends on the [`ClassificationPolicy`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::helpers::{EXPIRY_SWING_COUNT, STOPLOSS_BOX_HEIGHT};
use super::swing::SwingSet;
use crate::{
    CandleRecord, ClassificationPolicy, OrderLevels, OrderStatus, StoplossStatus, SwingKind,
    SwingPoint, TrendDirection, TrendLine,
};

/// Classification parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyParams {
    pub policy: ClassificationPolicy,
    pub expiry_swing_count: usize,
    pub stoploss_box_height: u32,
}

impl Default for ClassifyParams {
    fn default() -> Self {
        Self {
            policy: ClassificationPolicy::default(),
            expiry_swing_count: EXPIRY_SWING_COUNT,
            stoploss_box_height: STOPLOSS_BOX_HEIGHT,
        }
    }
}

/// Classify every line in place
pub fn classify_all(
    lines: &mut [TrendLine],
    candles: &[CandleRecord],
    swings: &SwingSet,
    params: &ClassifyParams,
) {
    for line in lines.iter_mut() {
        classify(line, candles, swings, params);
    }

    let executed = lines
        .iter()
        .filter(|l| l.order_status == OrderStatus::Executed)
        .count();
    let pending = lines
        .iter()
        .filter(|l| l.order_status == OrderStatus::Pending)
        .count();
    debug!(
        lines = lines.len(),
        executed,
        pending,
        policy = ?params.policy,
        "trend lines classified"
    );
}

/// Record breakout parent, order parent, order status and stoploss status
pub fn classify(
    line: &mut TrendLine,
    candles: &[CandleRecord],
    swings: &SwingSet,
    params: &ClassifyParams,
) {
    let Some((breakout, order)) = locate_parents(line, swings) else {
        trace!(sender = %line.sender.label, partner = %line.partner.label, "no breakout/order parent");
        line.order_status = OrderStatus::Invalid;
        return;
    };

    let execution = candles
        .iter()
        .skip(breakout.candle + 1)
        .find(|c| match params.policy {
            ClassificationPolicy::BreakoutOrderParent => crosses_order_level(c, &candles[order.candle], order.kind),
            ClassificationPolicy::MissedEntry => touches_line(c, line),
        })
        .map(|c| c.sequence_index);

    let limit_x = execution.map_or(u32::MAX, |i| candles[i].x_center);
    let accumulated = swings
        .of_kind(breakout.kind)
        .iter()
        .filter(|p| p.x > line.partner.x && p.x < limit_x)
        .count();
    let expired = accumulated >= params.expiry_swing_count;

    let status = match (execution, expired, params.policy) {
        (_, true, ClassificationPolicy::BreakoutOrderParent) => OrderStatus::PendingExpired,
        (_, true, ClassificationPolicy::MissedEntry) => OrderStatus::MissedEntry,
        (Some(_), false, _) => OrderStatus::Executed,
        (None, false, _) => OrderStatus::Pending,
    };

    let levels = order_levels(line, &candles[order.candle], &order, &breakout, params);
    line.stoploss_status = match (status, execution) {
        (OrderStatus::Executed, Some(at)) => Some(stoploss_status(&candles[at..], &order, &breakout, levels.stoploss_y)),
        _ => None,
    };
    line.execution = execution.filter(|_| status == OrderStatus::Executed);
    line.levels = Some(levels);
    line.order_status = status;
    line.breakout_parent = Some(breakout);
    line.order_parent = Some(order);
}

/// Breakout parent and order parent of a line, if both exist and the order
/// parent is of the opposite kind
pub fn locate_parents(line: &TrendLine, swings: &SwingSet) -> Option<(SwingPoint, SwingPoint)> {
    let partner = &line.partner;
    let kind = partner.kind;

    let breakout = swings
        .of_kind(kind)
        .iter()
        .find(|p| p.x > partner.x && kind.beyond(p.y, partner.y))?;

    // at equal x the opposite kind is the nearer predecessor
    let order = swings
        .merged()
        .into_iter()
        .filter(|p| p.x < breakout.x)
        .max_by_key(|p| (p.x, p.kind != kind))?;

    if order.kind == kind {
        return None;
    }

    Some((breakout.clone(), order.clone()))
}

/// Whether `candle` reaches the order parent's level: the top of a low order
/// parent from above, the bottom of a high order parent from below
#[inline]
pub fn crosses_order_level(candle: &CandleRecord, order_candle: &CandleRecord, order_kind: SwingKind) -> bool {
    match order_kind {
        SwingKind::Low => candle.bottom_y >= order_candle.top_y,
        SwingKind::High => candle.top_y <= order_candle.bottom_y,
    }
}

/// Whether `candle` retests the line at its x
#[inline]
pub fn touches_line(candle: &CandleRecord, line: &TrendLine) -> bool {
    let line_y = line.y_at(candle.x_center as f64);
    match line.direction {
        TrendDirection::Descending => candle.bottom_y as f64 >= line_y,
        TrendDirection::Ascending => candle.top_y as f64 <= line_y,
    }
}

fn order_levels(
    line: &TrendLine,
    order_candle: &CandleRecord,
    order: &SwingPoint,
    breakout: &SwingPoint,
    params: &ClassifyParams,
) -> OrderLevels {
    let entry_y = match params.policy {
        ClassificationPolicy::BreakoutOrderParent => match order.kind {
            SwingKind::Low => order_candle.top_y,
            SwingKind::High => order_candle.bottom_y,
        },
        ClassificationPolicy::MissedEntry => line.extension.y.round().max(0.0) as u32,
    };
    let stoploss_y = match order.kind {
        SwingKind::Low => order_candle.bottom_y.saturating_add(params.stoploss_box_height),
        SwingKind::High => order_candle.top_y.saturating_sub(params.stoploss_box_height),
    };

    OrderLevels {
        entry_y,
        stoploss_y,
        target_y: breakout.y,
    }
}

/// Walk candles from the execution candle: reaching `stoploss_y` is a hit,
/// extending beyond the breakout parent first leaves the stop free
pub fn stoploss_status(
    from_execution: &[CandleRecord],
    order: &SwingPoint,
    breakout: &SwingPoint,
    stoploss_y: u32,
) -> StoplossStatus {
    for candle in from_execution {
        let (hit, target_reached) = match order.kind {
            SwingKind::Low => (candle.bottom_y >= stoploss_y, candle.top_y < breakout.y),
            SwingKind::High => (candle.top_y <= stoploss_y, candle.bottom_y > breakout.y),
        };
        if hit {
            return StoplossStatus::Hit;
        }
        if target_reached {
            return StoplossStatus::Free;
        }
    }
    StoplossStatus::Free
}

//! # chartswing - Chart screenshot to price-action events
//!
//! Deterministic vision-to-symbolic pipeline: a rendered candlestick chart goes
//! in, and candle boxes, parent swing highs/lows, trend lines and classified
//! order candidates come out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chartswing::prelude::*;
//!
//! fn main() -> chartswing::Result<()> {
//!     let analyzer = AnalyzerBuilder::new()
//!         .left_required(2)
//!         .right_required(2)
//!         .trendline_offset(2)
//!         .build()?;
//!
//!     let analysis = analyzer.analyze_path("chart.png")?;
//!     for line in &analysis.trendlines {
//!         println!("{} -> {}: {}", line.sender.label, line.partner.label, line.order_status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Stages
//!
//! 1. [`stages::preprocess`] - crop, color boost, wick repair, background flattening
//! 2. [`stages::extract`] - connected regions to ordered, arrow-numbered candles
//! 3. [`stages::swing`] - local extrema and the dominance scan
//! 4. [`stages::trendline`] - sender/receiver connections, crossing checks, extension
//! 5. [`stages::classify`] - breakout parent, order parent, execution state

use std::path::Path;

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod params;
pub mod stages;

pub mod prelude {
    pub use crate::{
        // Batch
        analyze_parallel,
        // Parameters
        params::{ParamMeta, ParamType, ANALYSIS_PARAMS},
        // Stages
        stages::*,
        // Engine
        AnalysisConfig,
        AnalyzerBuilder,
        BatchReport,
        // Data model
        Analysis,
        CandleColor,
        CandleRecord,
        ChartAnalyzer,
        // Errors
        ChartError,
        ClassificationPolicy,
        ConnectionRule,
        DistanceThreshold,
        OrderCandidate,
        OrderLevels,
        OrderSide,
        OrderStatus,
        PixelPoint,
        Result,
        StoplossStatus,
        SwingKind,
        SwingPoint,
        TrendDirection,
        TrendLine,
        TrendlineOffset,
        UnitError,
        UnitResult,
        UnitSkip,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ChartError>;

/// Errors that can occur while analyzing a chart
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChartError {
    #[error("Image load failed: {0}")]
    ImageLoad(String),

    #[error("Chart is {width}x{height} after cropping, need at least {min_width}x{min_height}")]
    Geometry {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<image::ImageError> for ChartError {
    fn from(err: image::ImageError) -> Self {
        ChartError::ImageLoad(err.to_string())
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Candles walked past the partner swing point to reach the receiver (1..=5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrendlineOffset(usize);

impl TrendlineOffset {
    pub const MIN: usize = 1;
    pub const MAX: usize = 5;

    /// Create a new offset, rejecting values outside 1..=5
    pub fn new(value: usize) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ChartError::OutOfRange {
                field: "trendline_offset",
                value: value as f64,
                min: Self::MIN as f64,
                max: Self::MAX as f64,
            });
        }
        Ok(Self(value))
    }

    /// Create an offset, clamping into 1..=5
    pub fn clamped(value: usize) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for TrendlineOffset {
    fn default() -> Self {
        Self(1)
    }
}

impl Serialize for TrendlineOffset {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for TrendlineOffset {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = i64::deserialize(d)?;
        let clamped = Self::clamped(value.max(0) as usize);
        if clamped.get() as i64 != value {
            warn!(value, clamped = clamped.get(), "trendline_offset out of range, clamped");
        }
        Ok(clamped)
    }
}

/// Minimum vertical pixel distance between sender and receiver.
///
/// Only the values in [`DistanceThreshold::CHOICES`] are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DistanceThreshold(u32);

impl DistanceThreshold {
    pub const CHOICES: [u32; 6] = [0, 10, 20, 50, 100, 200];

    /// Create a new threshold, rejecting values outside [`Self::CHOICES`]
    pub fn new(value: u32) -> Result<Self> {
        if !Self::CHOICES.contains(&value) {
            return Err(ChartError::InvalidValue(
                "distance_threshold must be one of 0, 10, 20, 50, 100, 200",
            ));
        }
        Ok(Self(value))
    }

    /// Snap to the nearest choice; ties go to the smaller one
    pub fn clamped(value: i64) -> Self {
        let nearest = Self::CHOICES
            .iter()
            .copied()
            .min_by_key(|&c| ((c as i64) - value).abs())
            .unwrap_or(0);
        Self(nearest)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Serialize for DistanceThreshold {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for DistanceThreshold {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = i64::deserialize(d)?;
        let clamped = Self::clamped(value);
        if clamped.get() as i64 != value {
            warn!(value, clamped = clamped.get(), "distance_threshold not a valid choice, snapped");
        }
        Ok(clamped)
    }
}

// ============================================================
// CANDLES
// ============================================================

/// Candle body color as classified from the chart pixels
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CandleColor {
    Bullish,
    Bearish,
}

impl CandleColor {
    pub const ALL: [CandleColor; 2] = [CandleColor::Bullish, CandleColor::Bearish];
}

/// One extracted candlestick box.
///
/// Pixel coordinates are in the cropped chart frame; `y` grows downward so a
/// larger `bottom_y` is a lower price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleRecord {
    /// Position in the left-to-right sequence, 0 = oldest
    pub sequence_index: usize,
    /// 1 = most recent completed candle; `None` for the in-progress newest candle
    pub arrow_number: Option<u32>,
    pub x_center: u32,
    pub top_y: u32,
    pub bottom_y: u32,
    pub color: CandleColor,
}

impl CandleRecord {
    #[inline]
    pub fn height(&self) -> u32 {
        self.bottom_y - self.top_y + 1
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.color == CandleColor::Bullish
    }

    /// True for the in-progress candle that carries no arrow number
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        self.arrow_number.is_none()
    }
}

// ============================================================
// SWING POINTS
// ============================================================

/// Which extreme a swing point marks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    pub const ALL: [SwingKind; 2] = [SwingKind::High, SwingKind::Low];

    /// The pixel row this kind reads from a candle
    #[inline]
    pub fn extreme(self, candle: &CandleRecord) -> u32 {
        match self {
            SwingKind::High => candle.top_y,
            SwingKind::Low => candle.bottom_y,
        }
    }

    /// True if `a` is a more extreme price than `b` for this kind
    #[inline]
    pub fn beyond(self, a: u32, b: u32) -> bool {
        match self {
            SwingKind::High => a < b,
            SwingKind::Low => a > b,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            SwingKind::High => SwingKind::Low,
            SwingKind::Low => SwingKind::High,
        }
    }

    #[inline]
    pub fn label_prefix(self) -> &'static str {
        match self {
            SwingKind::High => "PH",
            SwingKind::Low => "PL",
        }
    }
}

/// A parent high or low promoted by the dominance scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwingPoint {
    /// Sequence index of the candle
    pub candle: usize,
    pub kind: SwingKind,
    pub x: u32,
    /// `top_y` for highs, `bottom_y` for lows
    pub y: u32,
    pub arrow_number: u32,
    /// "PH7" / "PL7"
    pub label: String,
}

impl SwingPoint {
    pub fn new(candle: &CandleRecord, kind: SwingKind, arrow_number: u32) -> Self {
        Self {
            candle: candle.sequence_index,
            kind,
            x: candle.x_center,
            y: kind.extreme(candle),
            arrow_number,
            label: format!("{}{}", kind.label_prefix(), arrow_number),
        }
    }

    /// Rank equals the arrow number of the candle
    #[inline]
    pub fn rank(&self) -> u32 {
        self.arrow_number
    }

    #[inline]
    pub fn point(&self) -> PixelPoint {
        PixelPoint::new(self.x as f64, self.y as f64)
    }
}

impl std::fmt::Display for SwingPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

// ============================================================
// TREND LINES
// ============================================================

/// A point in chart pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Directional rule a trend line follows
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Parent highs, each receiver lower than its sender
    Descending,
    /// Parent lows, each receiver higher than its sender
    Ascending,
}

impl TrendDirection {
    pub const ALL: [TrendDirection; 2] = [TrendDirection::Descending, TrendDirection::Ascending];

    /// Kind of swing point the line connects
    #[inline]
    pub fn swing_kind(self) -> SwingKind {
        match self {
            TrendDirection::Descending => SwingKind::High,
            TrendDirection::Ascending => SwingKind::Low,
        }
    }

    /// True if moving from `sender_y` to `receiver_y` follows this direction
    #[inline]
    pub fn progresses(self, sender_y: u32, receiver_y: u32) -> bool {
        match self {
            TrendDirection::Descending => receiver_y > sender_y,
            TrendDirection::Ascending => receiver_y < sender_y,
        }
    }

    /// True if a same-kind extreme at `point_y - line_y == gap` lies on the
    /// price side the line is supposed to bound
    #[inline]
    pub fn outside(self, gap: f64) -> bool {
        match self {
            TrendDirection::Descending => gap < 0.0,
            TrendDirection::Ascending => gap > 0.0,
        }
    }
}

/// Execution state of a trend line's order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "pending order")]
    Pending,
    #[serde(rename = "pending order (expired)")]
    PendingExpired,
    #[serde(rename = "executed")]
    Executed,
    #[serde(rename = "missed entry")]
    MissedEntry,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Invalid => "invalid",
            OrderStatus::Pending => "pending order",
            OrderStatus::PendingExpired => "pending order (expired)",
            OrderStatus::Executed => "executed",
            OrderStatus::MissedEntry => "missed entry",
        }
    }

    /// Statuses that still describe a live or filled order
    #[inline]
    pub fn is_actionable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Executed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an executed order's projected stoploss was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoplossStatus {
    Hit,
    Free,
}

impl std::fmt::Display for StoplossStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StoplossStatus::Hit => "hit",
            StoplossStatus::Free => "free",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Pixel rows of the order derived from a classified line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLevels {
    pub entry_y: u32,
    pub stoploss_y: u32,
    /// Extreme of the breakout parent
    pub target_y: u32,
}

/// A validated trend line plus its classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub direction: TrendDirection,
    pub sender: SwingPoint,
    /// Swing point the receiver offset is counted from
    pub partner: SwingPoint,
    /// Sequence index of the receiver candle
    pub receiver: usize,
    pub start: PixelPoint,
    pub end: PixelPoint,
    /// Line extrapolated to the chart's right edge
    pub extension: PixelPoint,
    pub breakout_parent: Option<SwingPoint>,
    pub order_parent: Option<SwingPoint>,
    /// Sequence index of the candle that executed the order
    pub execution: Option<usize>,
    pub levels: Option<OrderLevels>,
    pub order_status: OrderStatus,
    pub stoploss_status: Option<StoplossStatus>,
}

impl TrendLine {
    /// Interpolated line row at `x`
    #[inline]
    pub fn y_at(&self, x: f64) -> f64 {
        stages::helpers::interpolate_y(self.start, self.end, x)
    }

    /// Order view of this line, present while the status is actionable
    pub fn order_candidate(&self) -> Option<OrderCandidate> {
        if !self.order_status.is_actionable() {
            return None;
        }
        let order_parent = self.order_parent.clone()?;
        let breakout_parent = self.breakout_parent.clone()?;
        let levels = self.levels?;
        let side = match order_parent.kind {
            SwingKind::Low => OrderSide::Buy,
            SwingKind::High => OrderSide::Sell,
        };
        Some(OrderCandidate {
            direction: self.direction,
            side,
            status: self.order_status,
            stoploss_status: self.stoploss_status,
            levels,
            order_parent,
            breakout_parent,
        })
    }
}

/// Actionable order derived from a trend line; pricing happens downstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCandidate {
    pub direction: TrendDirection,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub stoploss_status: Option<StoplossStatus>,
    pub levels: OrderLevels,
    pub order_parent: SwingPoint,
    pub breakout_parent: SwingPoint,
}

// ============================================================
// ANALYSIS RESULT
// ============================================================

/// Structured output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Cropped chart width
    pub width: u32,
    /// Cropped chart height
    pub height: u32,
    pub candles: Vec<CandleRecord>,
    /// Serialized as top-level `highs` and `lows`
    #[serde(flatten)]
    pub swings: SwingSet,
    pub trendlines: Vec<TrendLine>,
}

impl Analysis {
    #[inline]
    pub fn highs(&self) -> &[SwingPoint] {
        &self.swings.highs
    }

    #[inline]
    pub fn lows(&self) -> &[SwingPoint] {
        &self.swings.lows
    }

    /// Candle carrying the given arrow number
    pub fn candle_by_arrow(&self, arrow_number: u32) -> Option<&CandleRecord> {
        let newest = self.candles.len().checked_sub(1)?;
        let index = newest.checked_sub(arrow_number as usize)?;
        (arrow_number > 0).then(|| &self.candles[index])
    }

    /// Order candidates of every actionable line
    pub fn order_candidates(&self) -> Vec<OrderCandidate> {
        self.trendlines
            .iter()
            .filter_map(TrendLine::order_candidate)
            .collect()
    }

    /// Draw swing markers and trend lines over `base`
    pub fn annotate(&self, base: &RgbImage) -> RgbImage {
        stages::annotate::annotate(base, self)
    }
}

// ============================================================
// CONFIGURATION
// ============================================================

/// Order classification strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPolicy {
    /// Entry at the order parent's level once a breakout parent exists
    #[default]
    BreakoutOrderParent,
    /// Entry on a retest of the broken trend line
    MissedEntry,
}

/// Which later swing points a trend line sender may connect to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRule {
    /// Highs to later highs, lows to later lows
    #[default]
    SameKind,
    /// Highs to later lows, lows to later highs
    OppositeKind,
}

impl ConnectionRule {
    #[inline]
    pub fn partner_kind(self, sender: SwingKind) -> SwingKind {
        match self {
            ConnectionRule::SameKind => sender,
            ConnectionRule::OppositeKind => sender.opposite(),
        }
    }
}

/// Tunable parameters of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Shallower candidates required to the left of a parent swing point
    pub left_required: usize,
    /// Shallower candidates required to the right of a parent swing point
    pub right_required: usize,
    pub trendline_offset: TrendlineOffset,
    pub distance_threshold: DistanceThreshold,
    /// 0 = swing labels only
    pub max_trendlines: usize,
    /// Allow the in-progress candle to act as a receiver
    pub allow_terminal_trendline: bool,
    pub connection: ConnectionRule,
    /// Vertical pixel tolerance of the crossing check
    pub crossing_tolerance: u32,
    pub stoploss_box_height: u32,
    /// Same-kind swing points after the partner that expire a pending order
    pub expiry_swing_count: usize,
    pub classification: ClassificationPolicy,
    pub preprocess: PreprocessConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            left_required: 2,
            right_required: 2,
            trendline_offset: TrendlineOffset::default(),
            distance_threshold: DistanceThreshold::default(),
            max_trendlines: 10,
            allow_terminal_trendline: false,
            connection: ConnectionRule::default(),
            crossing_tolerance: stages::helpers::CROSSING_TOLERANCE,
            stoploss_box_height: stages::helpers::STOPLOSS_BOX_HEIGHT,
            expiry_swing_count: stages::helpers::EXPIRY_SWING_COUNT,
            classification: ClassificationPolicy::default(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Clamp every out-of-range value to the nearest valid one.
    ///
    /// Returns one [`ChartError::OutOfRange`] per clamped field; each is also
    /// logged at warn level. Never fails.
    pub fn sanitize(&mut self) -> Vec<ChartError> {
        let mut issues = Vec::new();

        for meta in params::ANALYSIS_PARAMS {
            let Some(value) = self.numeric(meta.name) else {
                continue;
            };
            if meta.validate(value).is_ok() {
                continue;
            }
            let clamped = meta.clamp(value);
            warn!(field = meta.name, value, clamped, "config value out of range, clamped");
            let (min, max) = meta.bounds;
            issues.push(ChartError::OutOfRange {
                field: meta.name,
                value,
                min,
                max,
            });
            self.set_numeric(meta.name, clamped);
        }

        issues.extend(self.preprocess.sanitize());
        issues
    }

    /// Reject configurations that cannot be clamped into something usable
    pub fn validate(&self) -> Result<()> {
        self.preprocess.validate()
    }

    /// Build a config from named numeric values; missing keys keep defaults.
    ///
    /// Unlike [`AnalysisConfig::sanitize`], out-of-range values are errors.
    pub fn with_params(values: &std::collections::HashMap<&str, f64>) -> Result<Self> {
        let mut config = Self::default();
        for meta in params::ANALYSIS_PARAMS {
            if let Some(&value) = values.get(meta.name) {
                meta.validate(value)?;
                config.set_numeric(meta.name, value);
            }
        }
        Ok(config)
    }

    pub(crate) fn numeric(&self, name: &str) -> Option<f64> {
        let value = match name {
            "left_required" => self.left_required as f64,
            "right_required" => self.right_required as f64,
            "trendline_offset" => self.trendline_offset.get() as f64,
            "distance_threshold" => self.distance_threshold.get() as f64,
            "max_trendlines" => self.max_trendlines as f64,
            "crossing_tolerance" => self.crossing_tolerance as f64,
            "stoploss_box_height" => self.stoploss_box_height as f64,
            "expiry_swing_count" => self.expiry_swing_count as f64,
            _ => return None,
        };
        Some(value)
    }

    pub(crate) fn set_numeric(&mut self, name: &str, value: f64) {
        let count = value.max(0.0).round() as usize;
        match name {
            "left_required" => self.left_required = count,
            "right_required" => self.right_required = count,
            "trendline_offset" => self.trendline_offset = TrendlineOffset::clamped(count),
            "distance_threshold" => {
                self.distance_threshold = DistanceThreshold::clamped(value.round() as i64)
            }
            "max_trendlines" => self.max_trendlines = count,
            "crossing_tolerance" => self.crossing_tolerance = count as u32,
            "stoploss_box_height" => self.stoploss_box_height = count as u32,
            "expiry_swing_count" => self.expiry_swing_count = count,
            _ => {}
        }
    }

    #[inline]
    pub fn dominance(&self) -> Dominance {
        Dominance {
            left_required: self.left_required,
            right_required: self.right_required,
        }
    }

    pub fn trendline_params(&self) -> TrendlineParams {
        TrendlineParams {
            offset: self.trendline_offset,
            distance_threshold: self.distance_threshold,
            crossing_tolerance: self.crossing_tolerance,
            max_trendlines: self.max_trendlines,
            allow_terminal: self.allow_terminal_trendline,
            rule: self.connection,
        }
    }

    pub fn classify_params(&self) -> ClassifyParams {
        ClassifyParams {
            policy: self.classification,
            expiry_swing_count: self.expiry_swing_count,
            stoploss_box_height: self.stoploss_box_height,
        }
    }
}

// ============================================================
// CHART ANALYZER
// ============================================================

use stages::*;

/// Runs the five pipeline stages with a fixed configuration.
///
/// Holds no state between runs; one analyzer can be shared across threads.
#[derive(Debug, Clone)]
pub struct ChartAnalyzer {
    config: AnalysisConfig,
}

impl ChartAnalyzer {
    /// Create an analyzer, clamping out-of-range values
    pub fn new(mut config: AnalysisConfig) -> Result<Self> {
        config.sanitize();
        config.validate()?;
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    // ===========================================
    // LOW-LEVEL: Individual stages
    // ===========================================

    /// Stage 1: crop, enhance and mask the screenshot
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Preprocessed> {
        preprocess::preprocess(image, &self.config.preprocess)
    }

    /// Stage 2: candle boxes from the color masks
    pub fn extract_candles(&self, masks: &ColorMasks) -> Vec<CandleRecord> {
        extract::extract_candles(masks, self.config.preprocess.min_candle_area)
    }

    /// Stage 3: parent highs and lows
    pub fn detect_swings(&self, candles: &[CandleRecord]) -> SwingSet {
        swing::detect_swings(candles, self.config.dominance())
    }

    /// Stage 4: validated trend lines, unclassified
    pub fn build_trendlines(
        &self,
        candles: &[CandleRecord],
        swings: &SwingSet,
        width: u32,
    ) -> Vec<TrendLine> {
        trendline::build_trendlines(candles, swings, width, &self.config.trendline_params())
    }

    /// Stage 5: order status of each line
    pub fn classify(&self, lines: &mut [TrendLine], candles: &[CandleRecord], swings: &SwingSet) {
        classify::classify_all(lines, candles, swings, &self.config.classify_params());
    }

    // ===========================================
    // MID-LEVEL: Candles onward
    // ===========================================

    /// Run stages 3-5 on an already extracted candle sequence
    pub fn analyze_candles(&self, candles: Vec<CandleRecord>, width: u32, height: u32) -> Analysis {
        let swings = self.detect_swings(&candles);
        let mut trendlines = self.build_trendlines(&candles, &swings, width);
        self.classify(&mut trendlines, &candles, &swings);

        debug!(
            candles = candles.len(),
            highs = swings.highs.len(),
            lows = swings.lows.len(),
            trendlines = trendlines.len(),
            "chart analyzed"
        );

        Analysis {
            width,
            height,
            candles,
            swings,
            trendlines,
        }
    }

    // ===========================================
    // HIGH-LEVEL: Whole images
    // ===========================================

    /// Run the full pipeline on a decoded image
    pub fn analyze(&self, image: &DynamicImage) -> Result<Analysis> {
        self.analyze_staged(image).map(|(analysis, _)| analysis)
    }

    /// Run the full pipeline and also return the enhanced image for annotation
    pub fn analyze_staged(&self, image: &DynamicImage) -> Result<(Analysis, RgbImage)> {
        let prepared = self.preprocess(image)?;
        let (width, height) = prepared.image.dimensions();
        let candles = self.extract_candles(&prepared.masks);
        Ok((self.analyze_candles(candles, width, height), prepared.image))
    }

    /// Decode encoded image bytes (PNG, JPEG, BMP) and analyze them
    pub fn analyze_bytes(&self, bytes: &[u8]) -> Result<Analysis> {
        let image = image::load_from_memory(bytes)?;
        self.analyze(&image)
    }

    /// Read and decode an image file and analyze it
    pub fn analyze_path(&self, path: impl AsRef<Path>) -> Result<Analysis> {
        let image = image::open(path.as_ref())?;
        self.analyze(&image)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`ChartAnalyzer`]
#[derive(Debug, Clone, Default)]
pub struct AnalyzerBuilder {
    config: AnalysisConfig,
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn left_required(mut self, count: usize) -> Self {
        self.config.left_required = count;
        self
    }

    pub fn right_required(mut self, count: usize) -> Self {
        self.config.right_required = count;
        self
    }

    /// Receiver offset; clamped into 1..=5
    pub fn trendline_offset(mut self, offset: usize) -> Self {
        let clamped = TrendlineOffset::clamped(offset);
        if clamped.get() != offset {
            warn!(offset, clamped = clamped.get(), "trendline_offset out of range, clamped");
        }
        self.config.trendline_offset = clamped;
        self
    }

    /// Minimum sender/receiver distance; snapped to the nearest valid choice
    pub fn distance_threshold(mut self, pixels: u32) -> Self {
        let snapped = DistanceThreshold::clamped(pixels as i64);
        if snapped.get() != pixels {
            warn!(pixels, snapped = snapped.get(), "distance_threshold snapped");
        }
        self.config.distance_threshold = snapped;
        self
    }

    pub fn max_trendlines(mut self, count: usize) -> Self {
        self.config.max_trendlines = count;
        self
    }

    pub fn allow_terminal_trendline(mut self, allow: bool) -> Self {
        self.config.allow_terminal_trendline = allow;
        self
    }

    pub fn connection_rule(mut self, rule: ConnectionRule) -> Self {
        self.config.connection = rule;
        self
    }

    pub fn crossing_tolerance(mut self, pixels: u32) -> Self {
        self.config.crossing_tolerance = pixels;
        self
    }

    pub fn stoploss_box_height(mut self, pixels: u32) -> Self {
        self.config.stoploss_box_height = pixels;
        self
    }

    pub fn expiry_swing_count(mut self, count: usize) -> Self {
        self.config.expiry_swing_count = count;
        self
    }

    pub fn classification(mut self, policy: ClassificationPolicy) -> Self {
        self.config.classification = policy;
        self
    }

    pub fn crop(mut self, margins: CropMargins) -> Self {
        self.config.preprocess.crop = margins;
        self
    }

    pub fn preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.config.preprocess = preprocess;
        self
    }

    /// Build the analyzer
    pub fn build(self) -> Result<ChartAnalyzer> {
        ChartAnalyzer::new(self.config)
    }
}

// ============================================================
// PARALLEL BATCH
// ============================================================

use rayon::prelude::*;

/// A unit of work that produced an analysis
#[derive(Debug)]
pub struct UnitResult {
    pub unit: String,
    pub analysis: Analysis,
}

/// A unit of work whose chart held too few candles to analyze
#[derive(Debug)]
pub struct UnitSkip {
    pub unit: String,
    pub candles: usize,
}

/// A unit of work that failed
#[derive(Debug)]
pub struct UnitError {
    pub unit: String,
    pub error: ChartError,
}

/// Per-unit outcomes of [`analyze_parallel`], in input order within each list
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<UnitResult>,
    pub skipped: Vec<UnitSkip>,
    pub failed: Vec<UnitError>,
}

impl BatchReport {
    #[inline]
    pub fn total(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.failed.len()
    }
}

/// Analyze many encoded charts (e.g. one per market/timeframe pair) on the
/// rayon pool. A failing unit never affects its siblings.
pub fn analyze_parallel<'a, I>(analyzer: &ChartAnalyzer, units: I) -> BatchReport
where
    I: IntoParallelIterator<Item = (&'a str, &'a [u8])>,
{
    let outcomes: Vec<_> = units
        .into_par_iter()
        .map(|(unit, bytes)| (unit.to_string(), analyzer.analyze_bytes(bytes)))
        .collect();

    let mut report = BatchReport::default();

    for (unit, outcome) in outcomes {
        match outcome {
            Ok(analysis) if analysis.candles.len() < 2 => {
                debug!(unit = %unit, candles = analysis.candles.len(), "unit skipped");
                report.skipped.push(UnitSkip {
                    unit,
                    candles: analysis.candles.len(),
                });
            }
            Ok(analysis) => report.completed.push(UnitResult { unit, analysis }),
            Err(error) => {
                warn!(unit = %unit, %error, "unit failed");
                report.failed.push(UnitError { unit, error });
            }
        }
    }

    report
}

// ============================================================
// TESTS
// ============================================================

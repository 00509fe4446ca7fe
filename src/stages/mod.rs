//! Pipeline stages
//!
//! Each stage is a pure function of the previous stage's output plus its
//! parameters:
//!
//! - **preprocess**: screenshot to enhanced image and bullish/bearish masks
//! - **extract**: masks to ordered, arrow-numbered candle records
//! - **swing**: candles to parent highs and lows
//! - **trendline**: swing points to validated, extended trend lines
//! - **classify**: trend lines to order / stoploss status
//!
//! `annotate` draws a finished analysis over the enhanced image.

pub mod helpers;

pub mod annotate;
pub mod classify;
pub mod extract;
pub mod preprocess;
pub mod swing;
pub mod trendline;

pub use classify::ClassifyParams;
pub use extract::CandleBox;
pub use preprocess::{ColorMasks, CropMargins, HueBand, PreprocessConfig, Preprocessed};
pub use swing::{Dominance, SwingSet};
pub use trendline::{Rejection, TrendlineParams};

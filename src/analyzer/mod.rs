// Analyzer module: price-series computations feeding the fact pack.

pub mod frame;
pub mod indicators;
pub mod levels;

pub use frame::Frame;
pub use indicators::IndicatorSet;
pub use levels::{LevelDetector, LevelSet};

//! Domain types for fvgwatch.

pub mod candle;
pub mod direction;
pub mod level;
pub mod signal;
pub mod timeframe;

pub use candle::{completed, last_completed_close, Candle};
pub use direction::{ExpectedDirection, FvgDirection};
pub use level::{LevelId, PriceLevel, DEFAULT_LEVEL_COLOR};
pub use signal::Signal;
pub use timeframe::{Timeframe, TimeframeError};

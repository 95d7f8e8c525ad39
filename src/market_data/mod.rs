pub mod candle_builder;

pub use candle_builder::{Candle, CandleStore, Timeframe};

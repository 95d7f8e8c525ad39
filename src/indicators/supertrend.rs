// =============================================================================
// SuperTrend — ATR-band trend follower
// =============================================================================
//
// Bands around the bar midpoint hl2 = (H + L) / 2:
//   upper = hl2 + multiplier · ATR
//   lower = hl2 - multiplier · ATR
// with the usual ratcheting: the lower band may only rise while price holds
// above it, the upper band may only fall while price holds below it. The
// close crossing the active band flips the trend.
// =============================================================================

use crate::indicators::atr::atr;
use crate::market_data::Candle;
use crate::types::Direction;

/// SuperTrend read for the most recent candle.
#[derive(Debug, Clone, Copy)]
pub struct SuperTrendState {
    /// Active band value (the stop line under/over price).
    pub band: f64,
    /// Buy while price rides above the lower band, sell below the upper.
    pub direction: Direction,
    /// Consecutive candles spent on the current side.
    pub bars_in_trend: u32,
}

/// Compute SuperTrend over `candles` (oldest first).
///
/// `None` when the window cannot seed the ATR (`< period + 1` candles).
pub fn supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Option<SuperTrendState> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut final_upper = f64::MAX;
    let mut final_lower = f64::MIN;
    let mut uptrend = true;
    let mut bars_in_trend: u32 = 0;

    for i in period..candles.len() {
        let window = &candles[..=i];
        let band_width = multiplier * atr(window, period)?;
        let c = &candles[i];
        let hl2 = (c.high + c.low) / 2.0;
        let upper = hl2 + band_width;
        let lower = hl2 - band_width;
        let prev_close = candles[i - 1].close;

        // Band ratcheting.
        final_upper = if upper < final_upper || prev_close > final_upper {
            upper
        } else {
            final_upper
        };
        final_lower = if lower > final_lower || prev_close < final_lower {
            lower
        } else {
            final_lower
        };

        let was_up = uptrend;
        uptrend = if was_up {
            c.close >= final_lower
        } else {
            c.close > final_upper
        };

        if uptrend == was_up {
            bars_in_trend = bars_in_trend.saturating_add(1);
        } else {
            bars_in_trend = 1;
            // Reset the inactive band on a flip.
            if uptrend {
                final_lower = lower;
            } else {
                final_upper = upper;
            }
        }
    }

    let (band, direction) = if uptrend {
        (final_lower, Direction::Buy)
    } else {
        (final_upper, Direction::Sell)
    };

    band.is_finite().then_some(SuperTrendState {
        band,
        direction,
        bars_in_trend,
    })
}

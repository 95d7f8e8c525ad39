// =============================================================================
// Parabolic SAR — stop-and-reverse trail
// =============================================================================
//
// Standard Wilder parameters: acceleration starts at 0.02, steps by 0.02 on
// each new extreme, and caps at 0.2. The SAR may never enter the prior two
// bars' range; a close crossing the SAR reverses the trend.
// =============================================================================

use crate::market_data::Candle;
use crate::types::Direction;

const AF_START: f64 = 0.02;
const AF_STEP: f64 = 0.02;
const AF_MAX: f64 = 0.2;

/// Parabolic SAR read for the most recent candle.
#[derive(Debug, Clone, Copy)]
pub struct SarState {
    pub sar: f64,
    pub direction: Direction,
    /// Candles since the last reversal.
    pub bars_in_trend: u32,
}

/// Compute the SAR over `candles` (oldest first). Needs at least 5 bars to
/// produce a stable read.
pub fn parabolic_sar(candles: &[Candle]) -> Option<SarState> {
    if candles.len() < 5 {
        return None;
    }

    // Seed from the first two bars.
    let mut uptrend = candles[1].close >= candles[0].close;
    let mut sar = if uptrend { candles[0].low } else { candles[0].high };
    let mut extreme = if uptrend { candles[1].high } else { candles[1].low };
    let mut af = AF_START;
    let mut bars_in_trend: u32 = 1;

    for i in 2..candles.len() {
        let c = &candles[i];
        sar += af * (extreme - sar);

        // SAR must stay outside the prior two bars' range.
        if uptrend {
            sar = sar.min(candles[i - 1].low).min(candles[i - 2].low);
        } else {
            sar = sar.max(candles[i - 1].high).max(candles[i - 2].high);
        }

        let reversed = if uptrend { c.low < sar } else { c.high > sar };
        if reversed {
            uptrend = !uptrend;
            sar = extreme;
            extreme = if uptrend { c.high } else { c.low };
            af = AF_START;
            bars_in_trend = 1;
            continue;
        }

        bars_in_trend = bars_in_trend.saturating_add(1);
        let new_extreme = if uptrend {
            c.high > extreme
        } else {
            c.low < extreme
        };
        if new_extreme {
            extreme = if uptrend { c.high } else { c.low };
            af = (af + AF_STEP).min(AF_MAX);
        }
    }

    sar.is_finite().then_some(SarState {
        sar,
        direction: if uptrend { Direction::Buy } else { Direction::Sell },
        bars_in_trend,
    })
}

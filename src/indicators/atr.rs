// =============================================================================
// Average True Range (ATR)
// =============================================================================
//
// The true range of a bar widens its wick span to cover any gap against the
// prior close:
//
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// and the ATR is the Wilder average of that stream. A damaged bar (non-finite
// OHLC) poisons the accumulator so the gauge reads unavailable.
// =============================================================================

use crate::indicators::wilder::WilderSmoother;
use crate::market_data::Candle;

/// ATR of the final bar over a copied-out window (oldest first). Needs
/// `period + 1` candles, one true range per consecutive pair.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut average = WilderSmoother::new(period);
    let mut value = None;
    for pair in candles.windows(2) {
        value = average.update(true_range(&pair[1], pair[0].close));
    }
    value
}

/// ATR as a percentage of the latest close; the input to the volatility
/// regime bucketing.
pub fn atr_pct(candles: &[Candle], period: usize) -> Option<f64> {
    let atr = atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close == 0.0 {
        return None;
    }
    Some((atr / last_close) * 100.0)
}

fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    // Propagate damage explicitly: max() would silently drop a NaN operand.
    if !(candle.high.is_finite() && candle.low.is_finite() && prev_close.is_finite()) {
        return f64::NAN;
    }
    let span = candle.high - candle.low;
    span.max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

// =============================================================================
// Volume-weighted price measures: VWAP and VWMA
// =============================================================================

use crate::market_data::Candle;

/// Session VWAP over the given candles (typically the day's 1m ring):
/// Σ(typical_price · volume) / Σ(volume), typical price = (H + L + C) / 3.
///
/// `None` when no candle carries volume.
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    let mut pv = 0.0;
    let mut vol = 0.0;
    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        let v = c.volume as f64;
        pv += typical * v;
        vol += v;
    }
    if vol <= 0.0 {
        return None;
    }
    let out = pv / vol;
    out.is_finite().then_some(out)
}

/// Volume-weighted moving average of the close over the trailing `period`
/// candles. Falls back to `None` when the window is short or carries no
/// volume.
pub fn vwma(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let mut pv = 0.0;
    let mut vol = 0.0;
    for c in window {
        let v = c.volume as f64;
        pv += c.close * v;
        vol += v;
    }
    if vol <= 0.0 {
        return None;
    }
    let out = pv / vol;
    out.is_finite().then_some(out)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Timeframe;
    use crate::types::Symbol;

    fn candle(close: f64, volume: u64) -> Candle {
        Candle {
            symbol: Symbol::Nifty,
            timeframe: Timeframe::M1,
            open_ts: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume,
            oi_close: None,
        }
    }

    #[test]
    fn vwap_weights_by_volume() {
        // Flat candles: typical price == close.
        let candles = vec![candle(100.0, 100), candle(200.0, 300)];
        let v = vwap(&candles).unwrap();
        assert!((v - 175.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_none_without_volume() {
        let candles = vec![candle(100.0, 0), candle(101.0, 0)];
        assert!(vwap(&candles).is_none());
        assert!(vwap(&[]).is_none());
    }

    #[test]
    fn vwma_uses_trailing_window() {
        let mut candles = vec![candle(10.0, 1000)];
        candles.extend([candle(100.0, 100), candle(200.0, 300)]);
        // Window of 2 skips the first candle entirely.
        let v = vwma(&candles, 2).unwrap();
        assert!((v - 175.0).abs() < 1e-9);
    }

    #[test]
    fn vwma_needs_full_window() {
        let candles = vec![candle(100.0, 10); 5];
        assert!(vwma(&candles, 20).is_none());
        assert!(vwma(&candles, 0).is_none());
    }
}

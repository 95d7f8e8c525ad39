// =============================================================================
// Momentum signals: SuperTrend, Parabolic SAR, RSI combo, VWMA
// =============================================================================

use crate::indicators::{sar, supertrend};
use crate::signals::{Signal, SignalContext, SignalKind};
use crate::types::Direction;

/// SuperTrend(10, 2): direction is the side of the ATR band; the longer the
/// close has held that side, the higher the confidence (cap 98).
pub fn super_trend(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::SuperTrend;
    let state = match supertrend::supertrend(ctx.candles_5m, 10, 2.0) {
        Some(s) => s,
        None => return Signal::insufficient(kind, "need 11 closed 5m candles"),
    };

    let confidence = (55.0 + state.bars_in_trend as f64 * 3.0).min(98.0);
    let side = match state.direction {
        Direction::Buy => "above",
        _ => "below",
    };
    Signal::new(
        kind,
        state.direction,
        confidence,
        format!(
            "close {side} band {:.1} for {} bars",
            state.band, state.bars_in_trend
        ),
    )
}

/// Parabolic SAR trail side, weighted by time in trend. Capped at 70.
pub fn parabolic_sar(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::ParabolicSar;
    let state = match sar::parabolic_sar(ctx.candles_5m) {
        Some(s) => s,
        None => return Signal::insufficient(kind, "need 5 closed 5m candles"),
    };

    let confidence = (48.0 + state.bars_in_trend as f64 * 2.0).min(70.0);
    Signal::new(
        kind,
        state.direction,
        confidence,
        format!("SAR {:.1}, {} bars in trend", state.sar, state.bars_in_trend),
    )
}

/// Dual-timeframe RSI gate: BUY when RSI(5m) > 60 with RSI(15m) > 50, SELL
/// when RSI(5m) < 40 with RSI(15m) < 50. Confidence scales with distance
/// from the trigger lines, capped at 95.
pub fn rsi_combo(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::RsiCombo;
    let (rsi5, rsi15) = match (
        ctx.indicators.rsi_5m.get(),
        ctx.indicators.rsi_15m.get(),
    ) {
        (Some(a), Some(b)) => (a, b),
        _ => return Signal::insufficient(kind, "RSI windows not seeded"),
    };

    if rsi5 > 60.0 && rsi15 > 50.0 {
        let confidence = (50.0 + (rsi5 - 60.0) * 1.5 + (rsi15 - 50.0) * 0.5).min(95.0);
        Signal::new(
            kind,
            Direction::Buy,
            confidence,
            format!("RSI 5m {rsi5:.1} > 60 with 15m {rsi15:.1} confirming"),
        )
    } else if rsi5 < 40.0 && rsi15 < 50.0 {
        let confidence = (50.0 + (40.0 - rsi5) * 1.5 + (50.0 - rsi15) * 0.5).min(95.0);
        Signal::new(
            kind,
            Direction::Sell,
            confidence,
            format!("RSI 5m {rsi5:.1} < 40 with 15m {rsi15:.1} confirming"),
        )
    } else {
        Signal::new(
            kind,
            Direction::Neutral,
            50.0,
            format!("RSI 5m {rsi5:.1} / 15m {rsi15:.1} in the dead zone"),
        )
    }
}

/// Price against VWMA20 with a small bonus when volume supports the side.
/// Deliberately low conviction (cap 65).
pub fn vwma(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::Vwma;
    let vwma = match ctx.indicators.vwma20.get() {
        Some(v) => v,
        None => return Signal::insufficient(kind, "VWMA window not seeded"),
    };
    if ctx.last_price <= 0.0 || vwma <= 0.0 {
        return Signal::insufficient(kind, "no traded price yet");
    }

    let dist_pct = (ctx.last_price - vwma) / vwma * 100.0;
    let supportive = ctx.volume_ratio().map(|r| r >= 1.0).unwrap_or(false);
    let volume_bonus = if supportive { 5.0 } else { 0.0 };
    let confidence = (50.0 + dist_pct.abs() * 25.0 + volume_bonus).min(65.0);

    if dist_pct > 0.05 {
        Signal::new(
            kind,
            Direction::Buy,
            confidence,
            format!("price {dist_pct:.2}% above VWMA20 {vwma:.1}"),
        )
    } else if dist_pct < -0.05 {
        Signal::new(
            kind,
            Direction::Sell,
            confidence,
            format!("price {:.2}% below VWMA20 {vwma:.1}", dist_pct.abs()),
        )
    } else {
        Signal::new(kind, Direction::Neutral, 50.0, "hugging VWMA20")
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorInputs, IndicatorSnapshot};
    use crate::market_data::{Candle, Timeframe};
    use crate::types::Symbol;

    fn candle(tf: Timeframe, i: i64, close: f64, volume: u64) -> Candle {
        Candle {
            symbol: Symbol::Nifty,
            timeframe: tf,
            open_ts: i * tf.duration_ms(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
            oi_close: None,
        }
    }

    fn trending(tf: Timeframe, n: usize, slope: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(tf, i as i64, 100.0 + i as f64 * slope, 100))
            .collect()
    }

    fn snapshot_for(m1: &[Candle], m5: &[Candle], m15: &[Candle], price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot::compute(&IndicatorInputs {
            candles_1m: m1,
            candles_5m: m5,
            candles_15m: m15,
            last_price: price,
            prev_day: None,
            orb: None,
            oi_history: &[],
        })
    }

    #[test]
    fn supertrend_follows_the_trend() {
        let m5 = trending(Timeframe::M5, 40, 2.0);
        let snap = snapshot_for(&[], &m5, &[], 180.0);
        let ctx = SignalContext {
            indicators: &snap,
            candles_1m: &[],
            candles_5m: &m5,
            partial_5m: None,
            last_price: 180.0,
        };
        let s = super_trend(&ctx);
        assert_eq!(s.direction, Direction::Buy);
        assert!(s.confidence > 55.0 && s.confidence <= 98.0);
    }

    #[test]
    fn sar_sells_a_falling_tape() {
        let m5 = trending(Timeframe::M5, 30, -1.5);
        let snap = snapshot_for(&[], &m5, &[], 60.0);
        let ctx = SignalContext {
            indicators: &snap,
            candles_1m: &[],
            candles_5m: &m5,
            partial_5m: None,
            last_price: 60.0,
        };
        let s = parabolic_sar(&ctx);
        assert_eq!(s.direction, Direction::Sell);
        assert!(s.confidence <= 70.0);
    }

    #[test]
    fn rsi_combo_buys_dual_timeframe_strength() {
        let m5 = trending(Timeframe::M5, 40, 1.0);
        let m15 = trending(Timeframe::M15, 40, 1.0);
        let snap = snapshot_for(&[], &m5, &m15, 140.0);
        let ctx = SignalContext {
            indicators: &snap,
            candles_1m: &[],
            candles_5m: &m5,
            partial_5m: None,
            last_price: 140.0,
        };
        let s = rsi_combo(&ctx);
        assert_eq!(s.direction, Direction::Buy);
        assert!(s.confidence <= 95.0);
    }

    #[test]
    fn rsi_combo_needs_both_windows() {
        let m5 = trending(Timeframe::M5, 40, 1.0);
        let snap = snapshot_for(&[], &m5, &[], 140.0);
        let ctx = SignalContext {
            indicators: &snap,
            candles_1m: &[],
            candles_5m: &m5,
            partial_5m: None,
            last_price: 140.0,
        };
        let s = rsi_combo(&ctx);
        assert_eq!(s.direction, Direction::Neutral);
        assert!(s.status_text.contains("insufficient"));
    }

    #[test]
    fn vwma_caps_at_65() {
        let m5 = trending(Timeframe::M5, 40, 1.0);
        let snap = snapshot_for(&[], &m5, &[], 200.0);
        let ctx = SignalContext {
            indicators: &snap,
            candles_1m: &[],
            candles_5m: &m5,
            partial_5m: None,
            last_price: 200.0,
        };
        let s = vwma(&ctx);
        assert_eq!(s.direction, Direction::Buy);
        assert!(s.confidence <= 65.0);
    }
}

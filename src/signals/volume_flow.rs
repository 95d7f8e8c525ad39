// =============================================================================
// Volume & flow signals: volume pulse, anomaly scanner, smart money, OI
// =============================================================================

use crate::signals::{Signal, SignalContext, SignalKind};
use crate::types::Direction;

/// Volume ratio at which a candle's direction is considered confirmed.
const PULSE_RATIO: f64 = 1.3;
/// Z-score at which volume counts as anomalous.
const ANOMALY_Z: f64 = 2.0;

/// The candle's direction counts only when volume runs at or above 1.3x the
/// 20-bar average; quiet tape stays neutral. Cap 75.
pub fn volume_pulse(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::VolumePulse;
    let ratio = match ctx.volume_ratio() {
        Some(r) => r,
        None => return Signal::insufficient(kind, "need 20 closed 5m candles of volume"),
    };
    let candle = match ctx.active_candle() {
        Some(c) => c,
        None => return Signal::insufficient(kind, "no candle formed yet"),
    };

    if ratio < PULSE_RATIO {
        return Signal::new(
            kind,
            Direction::Neutral,
            50.0,
            format!("volume {ratio:.2}x average, below the {PULSE_RATIO}x pulse bar"),
        );
    }

    let direction = if candle.close >= candle.open {
        Direction::Buy
    } else {
        Direction::Sell
    };
    let confidence = (50.0 + (ratio - PULSE_RATIO) * 25.0).min(75.0);
    Signal::new(
        kind,
        direction,
        confidence,
        format!("volume {ratio:.2}x average confirming the candle"),
    )
}

/// Statistical volume anomaly detector. Direction follows the candle that
/// printed the spike; confidence from the z-score, capped at 80.
pub fn high_volume_scanner(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::HighVolumeScanner;
    if ctx.candles_5m.len() < 20 {
        return Signal::insufficient(kind, "need 20 closed 5m candles");
    }
    let candle = match ctx.active_candle() {
        Some(c) => c,
        None => return Signal::insufficient(kind, "no candle formed yet"),
    };

    let window: Vec<f64> = ctx
        .candles_5m
        .iter()
        .rev()
        .take(20)
        .map(|c| c.volume as f64)
        .collect();
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let variance =
        window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
    let std = variance.sqrt();
    if std <= 0.0 {
        return Signal::new(kind, Direction::Neutral, 50.0, "volume series is flat");
    }

    let z = (candle.volume as f64 - mean) / std;
    if z < ANOMALY_Z {
        return Signal::new(
            kind,
            Direction::Neutral,
            50.0,
            format!("volume z-score {z:.2}, no anomaly"),
        );
    }

    let direction = if candle.close >= candle.open {
        Direction::Buy
    } else {
        Direction::Sell
    };
    let confidence = (50.0 + z * 8.0).min(80.0);
    Signal::new(
        kind,
        direction,
        confidence,
        format!("volume anomaly z={z:.2} with the candle"),
    )
}

/// Accumulation/distribution test over the recent 5m window. The money-flow
/// multiplier `((C-L)-(H-C))/(H-L)` weighted by volume is summed over the
/// two halves of the window; a later half winning marks accumulation (BUY)
/// or distribution (SELL). Cap 85.
pub fn smart_money_flow(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::SmartMoneyFlow;
    if ctx.candles_5m.len() < 12 {
        return Signal::insufficient(kind, "need 12 closed 5m candles");
    }

    let window = &ctx.candles_5m[ctx.candles_5m.len() - 12..];
    let money_flow = |candles: &[crate::market_data::Candle]| -> f64 {
        candles
            .iter()
            .filter(|c| c.high > c.low)
            .map(|c| {
                let multiplier = ((c.close - c.low) - (c.high - c.close)) / (c.high - c.low);
                multiplier * c.volume as f64
            })
            .sum()
    };

    let early = money_flow(&window[..6]);
    let late = money_flow(&window[6..]);
    let total_volume: f64 = window.iter().map(|c| c.volume as f64).sum();
    if total_volume <= 0.0 {
        return Signal::new(kind, Direction::Neutral, 50.0, "no volume in window");
    }

    let shift = (late - early) / total_volume;
    let confidence = (50.0 + shift.abs() * 120.0).min(85.0);

    if shift > 0.05 {
        Signal::new(
            kind,
            Direction::Buy,
            confidence,
            format!("accumulation building (flow shift {shift:.2})"),
        )
    } else if shift < -0.05 {
        Signal::new(
            kind,
            Direction::Sell,
            confidence,
            format!("distribution underway (flow shift {shift:.2})"),
        )
    } else {
        Signal::new(kind, Direction::Neutral, 50.0, "money flow balanced")
    }
}

/// The standard (price change, OI change) quadrant table:
///
///   price up,   OI up:   long build-up    (BUY)
///   price down, OI up:   short build-up   (SELL)
///   price down, OI down: long unwinding   (SELL, dampened)
///   price up,   OI down: short covering   (BUY, dampened)
///
/// Confidence from the magnitude of the OI change, capped at 95.
pub fn oi_momentum(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::OiMomentum;
    let oi_pct = match ctx.indicators.oi_change_pct.get() {
        Some(v) => v,
        None => return Signal::insufficient(kind, "no OI observations yet"),
    };
    let price_pct = match ctx.price_change_pct(15) {
        Some(v) => v,
        None => return Signal::insufficient(kind, "need 15 closed 1m candles"),
    };

    if oi_pct.abs() < 0.1 || price_pct.abs() < 0.05 {
        return Signal::new(
            kind,
            Direction::Neutral,
            50.0,
            format!("flat: ΔOI {oi_pct:.2}%, Δprice {price_pct:.2}%"),
        );
    }

    let (direction, label, dampen) = match (price_pct > 0.0, oi_pct > 0.0) {
        (true, true) => (Direction::Buy, "long build-up", 1.0),
        (false, true) => (Direction::Sell, "short build-up", 1.0),
        (false, false) => (Direction::Sell, "long unwinding", 0.6),
        (true, false) => (Direction::Buy, "short covering", 0.6),
    };

    let confidence = (50.0 + oi_pct.abs() * 8.0 * dampen).min(95.0);
    Signal::new(
        kind,
        direction,
        confidence,
        format!("{label}: ΔOI {oi_pct:.2}%, Δprice {price_pct:.2}%"),
    )
}

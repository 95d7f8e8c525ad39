// =============================================================================
// Price-action signals: trend structure, candle anatomy, and level plays
// =============================================================================

use crate::signals::{Signal, SignalContext, SignalKind};
use crate::types::Direction;

/// Proximity threshold for "near a level", as a percent of price.
const LEVEL_PROXIMITY_PCT: f64 = 0.25;

/// Trend Base — swing structure confirmed by the EMA stack.
///
/// BUY needs higher lows and price above EMA50; SELL the mirror. Confidence
/// scales with the EMA20/EMA50 separation, capped at 95.
pub fn trend_base(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::TrendBase;
    let (e20, e50) = match (ctx.indicators.ema20.get(), ctx.indicators.ema50.get()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Signal::insufficient(kind, "EMA stack not seeded"),
    };
    if ctx.candles_5m.len() < 6 {
        return Signal::insufficient(kind, "need 6 closed 5m candles for swing structure");
    }

    let window = &ctx.candles_5m[ctx.candles_5m.len() - 6..];
    let early_low = window[..3].iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let late_low = window[3..].iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let early_high = window[..3].iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let late_high = window[3..].iter().map(|c| c.high).fold(f64::MIN, f64::max);

    let higher_lows = late_low > early_low;
    let lower_highs = late_high < early_high;

    let separation_pct = if e50 != 0.0 {
        (e20 - e50).abs() / e50 * 100.0
    } else {
        0.0
    };
    let confidence = (50.0 + separation_pct * 40.0).min(95.0);

    if higher_lows && ctx.last_price > e50 {
        Signal::new(
            kind,
            Direction::Buy,
            confidence,
            format!("higher lows above EMA50; stack separation {separation_pct:.2}%"),
        )
    } else if lower_highs && ctx.last_price < e50 {
        Signal::new(
            kind,
            Direction::Sell,
            confidence,
            format!("lower highs below EMA50; stack separation {separation_pct:.2}%"),
        )
    } else {
        Signal::new(kind, Direction::Neutral, 50.0, "no clean swing structure")
    }
}

/// Reads the anatomy of the active candle: a dominant body closing near its
/// extreme carries intent, a small body is indecision. Capped at 90.
pub fn candle_intent(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::CandleIntent;
    let candle = match ctx.active_candle() {
        Some(c) => c,
        None => return Signal::insufficient(kind, "no candle formed yet"),
    };

    let range = candle.high - candle.low;
    if range <= 0.0 {
        return Signal::new(kind, Direction::Neutral, 50.0, "flat candle");
    }
    let body = (candle.close - candle.open).abs();
    let body_ratio = body / range;
    let close_pos = (candle.close - candle.low) / range;

    if body_ratio < 0.3 {
        return Signal::new(
            kind,
            Direction::Neutral,
            50.0,
            format!("indecision candle (body {:.0}% of range)", body_ratio * 100.0),
        );
    }

    let bullish = candle.close > candle.open;
    // Strong close in the direction of the body raises conviction.
    let position_score = if bullish { close_pos } else { 1.0 - close_pos };
    let confidence = (45.0 + body_ratio * 30.0 + position_score * 15.0).min(90.0);

    Signal::new(
        kind,
        if bullish { Direction::Buy } else { Direction::Sell },
        confidence,
        format!(
            "body {:.0}% of range, close at {:.0}% of bar",
            body_ratio * 100.0,
            close_pos * 100.0
        ),
    )
}

/// BUY near classical supports, SELL near resistances. Confidence rises the
/// closer price sits to the level (cap 80).
pub fn pivot_points(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::PivotPoints;
    let pivots = match &ctx.indicators.pivots {
        Some(p) => p,
        None => return Signal::insufficient(kind, "prior-day OHLC unavailable"),
    };
    if ctx.last_price <= 0.0 {
        return Signal::insufficient(kind, "no traded price yet");
    }

    let support = pivots.nearest_support_distance(ctx.last_price);
    let resistance = pivots.nearest_resistance_distance(ctx.last_price);

    let near = |dist_frac: f64| dist_frac * 100.0 <= LEVEL_PROXIMITY_PCT;
    let proximity_conf = |dist_frac: f64| {
        let dist_pct = dist_frac * 100.0;
        (50.0 + (LEVEL_PROXIMITY_PCT - dist_pct) / LEVEL_PROXIMITY_PCT * 30.0).min(80.0)
    };

    match (support, resistance) {
        (Some((level, dist)), _) if near(dist) => Signal::new(
            kind,
            Direction::Buy,
            proximity_conf(dist),
            format!("price {:.1} holding support {level:.1}", ctx.last_price),
        ),
        (_, Some((level, dist))) if near(dist) => Signal::new(
            kind,
            Direction::Sell,
            proximity_conf(dist),
            format!("price {:.1} pressing resistance {level:.1}", ctx.last_price),
        ),
        _ => Signal::new(kind, Direction::Neutral, 50.0, "between pivot levels"),
    }
}

/// Break of the frozen first-15-minutes range, confirmed by volume (cap 85).
pub fn orb_breakout(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::OrbBreakout;
    let orb = match &ctx.indicators.orb {
        Some(o) => o,
        None => return Signal::insufficient(kind, "opening range not yet frozen"),
    };
    let vol_ratio = ctx.volume_ratio();

    let breakout = orb.breakout_fraction(ctx.last_price);
    if breakout == 0.0 {
        return Signal::new(
            kind,
            Direction::Neutral,
            50.0,
            format!("inside opening range {:.1}–{:.1}", orb.low, orb.high),
        );
    }

    let distance_pct = breakout.abs() * 100.0;
    let volume_bonus = vol_ratio.map(|r| ((r - 1.0).max(0.0) * 10.0).min(15.0)).unwrap_or(0.0);
    let confidence = (55.0 + distance_pct * 40.0 + volume_bonus).min(85.0);

    if breakout > 0.0 {
        Signal::new(
            kind,
            Direction::Buy,
            confidence,
            format!("break above ORB high {:.1} by {distance_pct:.2}%", orb.high),
        )
    } else {
        Signal::new(
            kind,
            Direction::Sell,
            confidence,
            format!("break below ORB low {:.1} by {distance_pct:.2}%", orb.low),
        )
    }
}

/// Camarilla rails: H3/H4 breakout buys, L3/L4 breakdown sells. Cap 75.
pub fn camarilla(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::Camarilla;
    let rails = match &ctx.indicators.camarilla {
        Some(c) => c,
        None => return Signal::insufficient(kind, "prior-day OHLC unavailable"),
    };
    let price = ctx.last_price;
    if price <= 0.0 {
        return Signal::insufficient(kind, "no traded price yet");
    }

    let dist_conf = |level: f64| {
        let dist_pct = (price - level).abs() / price * 100.0;
        (55.0 + dist_pct * 40.0).min(75.0)
    };

    if price > rails.h3 {
        let status = if price > rails.h4 {
            format!("above H4 {:.1} — runaway breakout", rails.h4)
        } else {
            format!("H3–H4 breakout zone above {:.1}", rails.h3)
        };
        Signal::new(kind, Direction::Buy, dist_conf(rails.h3), status)
    } else if price < rails.l3 {
        let status = if price < rails.l4 {
            format!("below L4 {:.1} — runaway breakdown", rails.l4)
        } else {
            format!("L3–L4 breakdown zone below {:.1}", rails.l3)
        };
        Signal::new(kind, Direction::Sell, dist_conf(rails.l3), status)
    } else {
        Signal::new(kind, Direction::Neutral, 50.0, "inside the Camarilla rails")
    }
}

/// Position of price inside the S1..S2 buy zone or R1..R2 sell zone. Cap 80.
pub fn trade_zones(ctx: &SignalContext<'_>) -> Signal {
    let kind = SignalKind::TradeZones;
    let pivots = match &ctx.indicators.pivots {
        Some(p) => p,
        None => return Signal::insufficient(kind, "prior-day OHLC unavailable"),
    };
    let price = ctx.last_price;
    if price <= 0.0 {
        return Signal::insufficient(kind, "no traded price yet");
    }

    // Depth into a zone, 0 at the outer edge, 1 at the inner edge.
    let depth = |inner: f64, outer: f64| ((price - outer) / (inner - outer)).clamp(0.0, 1.0);

    if price <= pivots.s1 && price >= pivots.s2 {
        let d = depth(pivots.s1, pivots.s2);
        Signal::new(
            kind,
            Direction::Buy,
            (50.0 + (1.0 - d) * 30.0).min(80.0),
            format!("in buy zone S2 {:.1} – S1 {:.1}", pivots.s2, pivots.s1),
        )
    } else if price >= pivots.r1 && price <= pivots.r2 {
        let d = depth(pivots.r1, pivots.r2);
        Signal::new(
            kind,
            Direction::Sell,
            (50.0 + (1.0 - d) * 30.0).min(80.0),
            format!("in sell zone R1 {:.1} – R2 {:.1}", pivots.r1, pivots.r2),
        )
    } else {
        Signal::new(kind, Direction::Neutral, 50.0, "outside the trade zones")
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorInputs, IndicatorSnapshot, OrbRange};
    use crate::market_data::{Candle, Timeframe};
    use crate::types::{DayOhlc, Symbol};

    fn candle(tf: Timeframe, i: i64, open: f64, close: f64, volume: u64) -> Candle {
        Candle {
            symbol: Symbol::Nifty,
            timeframe: tf,
            open_ts: i * tf.duration_ms(),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume,
            oi_close: None,
        }
    }

    fn rising_5m(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(Timeframe::M5, i as i64, base, base + 1.8, 100)
            })
            .collect()
    }

    struct Fixture {
        snapshot: IndicatorSnapshot,
        candles_1m: Vec<Candle>,
        candles_5m: Vec<Candle>,
        last_price: f64,
    }

    fn fixture(last_price: f64) -> Fixture {
        let candles_1m: Vec<Candle> = (0..220)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                candle(Timeframe::M1, i as i64, base, base + 0.4, 50)
            })
            .collect();
        let candles_5m = rising_5m(40);
        let snapshot = IndicatorSnapshot::compute(&IndicatorInputs {
            candles_1m: &candles_1m,
            candles_5m: &candles_5m,
            candles_15m: &[],
            last_price,
            prev_day: Some(DayOhlc {
                open: 150.0,
                high: 190.0,
                low: 140.0,
                close: 180.0,
            }),
            orb: Some(OrbRange { high: 120.0, low: 100.0 }),
            oi_history: &[],
        });
        Fixture {
            snapshot,
            candles_1m,
            candles_5m,
            last_price,
        }
    }

    fn ctx(f: &Fixture) -> SignalContext<'_> {
        SignalContext {
            indicators: &f.snapshot,
            candles_1m: &f.candles_1m,
            candles_5m: &f.candles_5m,
            partial_5m: None,
            last_price: f.last_price,
        }
    }

    #[test]
    fn trend_base_buys_rising_structure() {
        let f = fixture(210.0);
        let s = trend_base(&ctx(&f));
        assert_eq!(s.direction, Direction::Buy);
        assert!(s.confidence > 50.0 && s.confidence <= 95.0);
    }

    #[test]
    fn trend_base_degrades_without_emas() {
        let f = fixture(210.0);
        let empty_1m: Vec<Candle> = Vec::new();
        let snapshot = IndicatorSnapshot::compute(&IndicatorInputs {
            candles_1m: &empty_1m,
            candles_5m: &f.candles_5m,
            candles_15m: &[],
            last_price: 210.0,
            prev_day: None,
            orb: None,
            oi_history: &[],
        });
        let c = SignalContext {
            indicators: &snapshot,
            candles_1m: &empty_1m,
            candles_5m: &f.candles_5m,
            partial_5m: None,
            last_price: 210.0,
        };
        let s = trend_base(&c);
        assert_eq!(s.direction, Direction::Neutral);
        assert_eq!(s.confidence, 50.0);
        assert!(s.status_text.contains("insufficient"));
    }

    #[test]
    fn candle_intent_reads_the_body() {
        let f = fixture(180.0);
        let mut c = ctx(&f);
        let strong = candle(Timeframe::M5, 99, 100.0, 108.0, 100);
        c.partial_5m = Some(&strong);
        let s = candle_intent(&c);
        assert_eq!(s.direction, Direction::Buy);
        assert!(s.confidence > 60.0 && s.confidence <= 90.0);
    }

    #[test]
    fn candle_intent_doji_is_neutral() {
        let f = fixture(180.0);
        let mut c = ctx(&f);
        let doji = Candle {
            symbol: Symbol::Nifty,
            timeframe: Timeframe::M5,
            open_ts: 0,
            open: 100.0,
            high: 105.0,
            low: 95.0,
            close: 100.2,
            volume: 100,
            oi_close: None,
        };
        c.partial_5m = Some(&doji);
        let s = candle_intent(&c);
        assert_eq!(s.direction, Direction::Neutral);
    }

    #[test]
    fn pivot_points_buy_near_support() {
        let f = fixture(180.0);
        let pivots = f.snapshot.pivots.as_ref().unwrap();
        let price = pivots.s1 + pivots.s1 * 0.001; // 0.1% above S1
        let mut c = ctx(&f);
        c.last_price = price;
        let s = pivot_points(&c);
        assert_eq!(s.direction, Direction::Buy);
        assert!(s.confidence <= 80.0);
    }

    #[test]
    fn orb_breakout_buy_with_distance() {
        let f = fixture(121.5);
        let s = orb_breakout(&ctx(&f));
        assert_eq!(s.direction, Direction::Buy);
        assert!(s.confidence > 55.0 && s.confidence <= 85.0);
    }

    #[test]
    fn orb_inside_range_is_neutral() {
        let f = fixture(110.0);
        let s = orb_breakout(&ctx(&f));
        assert_eq!(s.direction, Direction::Neutral);
    }

    #[test]
    fn camarilla_breakout_directions() {
        let f = fixture(0.0);
        let rails = f.snapshot.camarilla.unwrap();
        let mut c = ctx(&f);

        c.last_price = rails.h3 + 1.0;
        assert_eq!(camarilla(&c).direction, Direction::Buy);

        c.last_price = rails.l4 - 1.0;
        let s = camarilla(&c);
        assert_eq!(s.direction, Direction::Sell);
        assert!(s.status_text.contains("L4"));

        c.last_price = (rails.h3 + rails.l3) / 2.0;
        assert_eq!(camarilla(&c).direction, Direction::Neutral);
    }

    #[test]
    fn trade_zones_bracket_price() {
        let f = fixture(0.0);
        let pivots = f.snapshot.pivots.as_ref().unwrap();
        let mut c = ctx(&f);

        c.last_price = (pivots.s1 + pivots.s2) / 2.0;
        assert_eq!(trade_zones(&c).direction, Direction::Buy);

        c.last_price = (pivots.r1 + pivots.r2) / 2.0;
        assert_eq!(trade_zones(&c).direction, Direction::Sell);

        c.last_price = pivots.pivot;
        assert_eq!(trade_zones(&c).direction, Direction::Neutral);
    }
}

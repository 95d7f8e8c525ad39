// =============================================================================
// Opening Range Breakout (ORB)
// =============================================================================
//
// The opening range is the high/low of the first 15 minutes of the regular
// session (09:15–09:30 IST). Once that window has fully closed the range is
// frozen for the rest of the day.
// =============================================================================

use chrono::Timelike;
use serde::Serialize;

use crate::market_data::Candle;
use crate::session::ist_from_millis;

/// Frozen opening range for the current session.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrbRange {
    pub high: f64,
    pub low: f64,
}

/// Minutes-from-midnight bounds of the opening window (09:15 .. 09:30 IST).
const WINDOW_START_MIN: u32 = 9 * 60 + 15;
const WINDOW_END_MIN: u32 = 9 * 60 + 30;

fn minute_of_day(ts: i64) -> u32 {
    let dt = ist_from_millis(ts);
    dt.hour() * 60 + dt.minute()
}

/// Compute the opening range from the day's 1m candles.
///
/// Returns `None` until at least one candle at or past 09:30 proves the
/// window has fully closed (the range must not drift while it is forming).
pub fn opening_range(candles_1m: &[Candle]) -> Option<OrbRange> {
    let mut high = f64::MIN;
    let mut low = f64::MAX;
    let mut window_closed = false;
    let mut seen = false;

    for c in candles_1m {
        let minute = minute_of_day(c.open_ts);
        if minute >= WINDOW_END_MIN {
            window_closed = true;
        }
        if (WINDOW_START_MIN..WINDOW_END_MIN).contains(&minute) {
            seen = true;
            high = high.max(c.high);
            low = low.min(c.low);
        }
    }

    (seen && window_closed).then_some(OrbRange { high, low })
}

impl OrbRange {
    /// Breakout distance above the range high (or below the low, negative),
    /// as a fraction of the range midpoint. Zero when price is inside.
    pub fn breakout_fraction(&self, price: f64) -> f64 {
        let mid = (self.high + self.low) / 2.0;
        if mid <= 0.0 {
            return 0.0;
        }
        if price > self.high {
            (price - self.high) / mid
        } else if price < self.low {
            (price - self.low) / mid
        } else {
            0.0
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Timeframe;
    use crate::session::ist;
    use crate::types::Symbol;
    use chrono::TimeZone;

    fn candle_at(h: u32, m: u32, high: f64, low: f64) -> Candle {
        let ts = ist()
            .with_ymd_and_hms(2025, 7, 1, h, m, 0)
            .unwrap()
            .timestamp_millis();
        Candle {
            symbol: Symbol::Nifty,
            timeframe: Timeframe::M1,
            open_ts: ts,
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 10,
            oi_close: None,
        }
    }

    #[test]
    fn range_unavailable_while_window_forms() {
        let candles = vec![
            candle_at(9, 15, 101.0, 99.0),
            candle_at(9, 20, 103.0, 100.0),
        ];
        assert!(opening_range(&candles).is_none());
    }

    #[test]
    fn range_freezes_after_window_close() {
        let mut candles: Vec<Candle> = (0..15)
            .map(|i| candle_at(9, 15 + i, 100.0 + i as f64, 99.0 - i as f64 * 0.1))
            .collect();
        candles.push(candle_at(9, 30, 150.0, 50.0)); // outside the window
        let orb = opening_range(&candles).unwrap();
        assert!((orb.high - 114.0).abs() < 1e-9);
        assert!((orb.low - (99.0 - 1.4)).abs() < 1e-9);
    }

    #[test]
    fn pre_open_candles_are_ignored() {
        let mut candles = vec![candle_at(9, 10, 500.0, 1.0)];
        candles.extend((0..15).map(|i| candle_at(9, 15 + i, 101.0, 99.0)));
        candles.push(candle_at(9, 31, 101.5, 100.0));
        let orb = opening_range(&candles).unwrap();
        assert!((orb.high - 101.0).abs() < 1e-9);
        assert!((orb.low - 99.0).abs() < 1e-9);
    }

    #[test]
    fn breakout_fraction_signs() {
        let orb = OrbRange { high: 110.0, low: 90.0 };
        assert!(orb.breakout_fraction(115.0) > 0.0);
        assert!(orb.breakout_fraction(85.0) < 0.0);
        assert_eq!(orb.breakout_fraction(100.0), 0.0);
    }
}

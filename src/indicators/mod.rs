// =============================================================================
// Indicator pool — the per-symbol derived battery
// =============================================================================
//
// Every indicator is a pure function over a copied-out candle window. When a
// window is too shallow the corresponding gauge carries `available = false`
// instead of a fabricated value, so downstream signal logic can tell "no
// data" apart from a genuinely neutral reading.
// =============================================================================

pub mod atr;
pub mod ema;
pub mod orb;
pub mod pivots;
pub mod rsi;
pub mod sar;
pub mod supertrend;
pub mod volume_profile;
pub mod vwap;
pub mod wilder;

use serde::Serialize;

use crate::market_data::Candle;
use crate::types::DayOhlc;

pub use orb::OrbRange;
pub use pivots::{CamarillaLevels, PivotLevels};
pub use sar::SarState;
pub use supertrend::SuperTrendState;
pub use volume_profile::{ProfilePosition, VolumeProfileSummary};

/// A scalar indicator reading with an explicit availability flag.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Gauge {
    pub value: f64,
    pub available: bool,
}

impl Gauge {
    pub fn missing() -> Self {
        Self {
            value: 0.0,
            available: false,
        }
    }

    pub fn from_option(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Self {
                value: v,
                available: true,
            },
            _ => Self::missing(),
        }
    }

    /// The reading, if one was computed.
    pub fn get(&self) -> Option<f64> {
        self.available.then_some(self.value)
    }
}

/// Everything the pool needs for one evaluation, copied out of the stores so
/// the computation holds no locks.
pub struct IndicatorInputs<'a> {
    pub candles_1m: &'a [Candle],
    pub candles_5m: &'a [Candle],
    pub candles_15m: &'a [Candle],
    pub last_price: f64,
    pub prev_day: Option<DayOhlc>,
    /// Frozen opening range, once the first 15 minutes have closed.
    pub orb: Option<OrbRange>,
    /// Recent (ts, oi) observations, oldest first.
    pub oi_history: &'a [(i64, u64)],
}

/// The flat indicator record attached to each evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub ema20: Gauge,
    pub ema50: Gauge,
    pub ema100: Gauge,
    pub ema200: Gauge,
    pub vwap: Gauge,
    pub vwma20: Gauge,
    pub rsi_5m: Gauge,
    pub rsi_15m: Gauge,
    pub atr14: Gauge,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pivots: Option<PivotLevels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camarilla: Option<CamarillaLevels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orb: Option<OrbRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_profile: Option<VolumeProfileSummary>,
    /// Change in open interest over the observation window (contracts).
    pub oi_delta: Gauge,
    /// Same change as a percentage of the window's starting OI.
    pub oi_change_pct: Gauge,
}

impl IndicatorSnapshot {
    /// Evaluate the full battery. Never fails; gaps surface as unavailable
    /// gauges or absent level sets.
    pub fn compute(inputs: &IndicatorInputs<'_>) -> Self {
        let closes_1m: Vec<f64> = inputs.candles_1m.iter().map(|c| c.close).collect();
        let closes_5m: Vec<f64> = inputs.candles_5m.iter().map(|c| c.close).collect();
        let closes_15m: Vec<f64> = inputs.candles_15m.iter().map(|c| c.close).collect();

        let (oi_delta, oi_change_pct) = oi_window_change(inputs.oi_history);

        Self {
            ema20: Gauge::from_option(ema::last_ema(&closes_1m, 20)),
            ema50: Gauge::from_option(ema::last_ema(&closes_1m, 50)),
            ema100: Gauge::from_option(ema::last_ema(&closes_1m, 100)),
            ema200: Gauge::from_option(ema::last_ema(&closes_1m, 200)),
            vwap: Gauge::from_option(vwap::vwap(inputs.candles_1m)),
            vwma20: Gauge::from_option(vwap::vwma(inputs.candles_5m, 20)),
            rsi_5m: Gauge::from_option(rsi::last_rsi(&closes_5m, 14)),
            rsi_15m: Gauge::from_option(rsi::last_rsi(&closes_15m, 14)),
            atr14: Gauge::from_option(atr::atr(inputs.candles_5m, 14)),
            pivots: inputs.prev_day.as_ref().map(pivots::classical),
            camarilla: inputs.prev_day.as_ref().map(pivots::camarilla),
            orb: inputs.orb,
            volume_profile: volume_profile::volume_profile(inputs.candles_1m, inputs.last_price),
            oi_delta,
            oi_change_pct,
        }
    }
}

/// OI change over the observation window: absolute and percent.
fn oi_window_change(history: &[(i64, u64)]) -> (Gauge, Gauge) {
    let (first, last) = match (history.first(), history.last()) {
        (Some(f), Some(l)) if f.0 < l.0 => (f.1, l.1),
        _ => return (Gauge::missing(), Gauge::missing()),
    };
    let delta = last as f64 - first as f64;
    let pct = if first > 0 {
        Some(delta / first as f64 * 100.0)
    } else {
        None
    };
    (Gauge::from_option(Some(delta)), Gauge::from_option(pct))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Timeframe;
    use crate::types::Symbol;

    fn candle(tf: Timeframe, i: i64, close: f64) -> Candle {
        Candle {
            symbol: Symbol::Nifty,
            timeframe: tf,
            open_ts: i * tf.duration_ms(),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 100,
            oi_close: None,
        }
    }

    fn series(tf: Timeframe, n: usize) -> Vec<Candle> {
        (0..n).map(|i| candle(tf, i as i64, 100.0 + i as f64 * 0.2)).collect()
    }

    #[test]
    fn empty_inputs_mark_everything_unavailable() {
        let inputs = IndicatorInputs {
            candles_1m: &[],
            candles_5m: &[],
            candles_15m: &[],
            last_price: 0.0,
            prev_day: None,
            orb: None,
            oi_history: &[],
        };
        let snap = IndicatorSnapshot::compute(&inputs);
        assert!(!snap.ema20.available);
        assert!(!snap.rsi_5m.available);
        assert!(!snap.atr14.available);
        assert!(!snap.oi_delta.available);
        assert!(snap.pivots.is_none());
        assert!(snap.volume_profile.is_none());
    }

    #[test]
    fn deep_windows_light_the_gauges() {
        let m1 = series(Timeframe::M1, 220);
        let m5 = series(Timeframe::M5, 40);
        let m15 = series(Timeframe::M15, 40);
        let history = vec![(0_i64, 1_000_000_u64), (60_000, 1_050_000)];
        let inputs = IndicatorInputs {
            candles_1m: &m1,
            candles_5m: &m5,
            candles_15m: &m15,
            last_price: m1.last().unwrap().close,
            prev_day: Some(DayOhlc {
                open: 100.0,
                high: 150.0,
                low: 95.0,
                close: 140.0,
            }),
            orb: None,
            oi_history: &history,
        };
        let snap = IndicatorSnapshot::compute(&inputs);
        assert!(snap.ema20.available);
        assert!(snap.ema200.available);
        assert!(snap.vwap.available);
        assert!(snap.vwma20.available);
        assert!(snap.rsi_5m.available && snap.rsi_15m.available);
        assert!(snap.atr14.available);
        assert!(snap.pivots.is_some() && snap.camarilla.is_some());
        assert!((snap.oi_delta.value - 50_000.0).abs() < 1e-9);
        assert!((snap.oi_change_pct.value - 5.0).abs() < 1e-9);
    }

    #[test]
    fn gauge_option_roundtrip() {
        assert!(Gauge::from_option(None).get().is_none());
        assert!(Gauge::from_option(Some(f64::NAN)).get().is_none());
        assert_eq!(Gauge::from_option(Some(3.5)).get(), Some(3.5));
    }
}

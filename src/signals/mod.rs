// =============================================================================
// Signal engine — fourteen independent reads of the same tape
// =============================================================================
//
// Every signal is a pure function `(indicators, candle window) -> Signal` and
// always emits: when its inputs are missing it degrades to NEUTRAL at
// confidence 50 with a status_text naming the gap. Evaluation order carries
// no meaning; the outlook aggregation is order-independent.
// =============================================================================

pub mod momentum;
pub mod outlook;
pub mod price_action;
pub mod volume_flow;

use serde::Serialize;

use crate::indicators::IndicatorSnapshot;
use crate::market_data::Candle;
use crate::types::Direction;

pub use outlook::{Outlook, OutlookLabel};

/// The fourteen signal kinds, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    TrendBase,
    VolumePulse,
    CandleIntent,
    PivotPoints,
    OrbBreakout,
    SuperTrend,
    ParabolicSar,
    RsiCombo,
    Camarilla,
    Vwma,
    HighVolumeScanner,
    SmartMoneyFlow,
    TradeZones,
    OiMomentum,
}

impl SignalKind {
    pub const ALL: [SignalKind; 14] = [
        SignalKind::TrendBase,
        SignalKind::VolumePulse,
        SignalKind::CandleIntent,
        SignalKind::PivotPoints,
        SignalKind::OrbBreakout,
        SignalKind::SuperTrend,
        SignalKind::ParabolicSar,
        SignalKind::RsiCombo,
        SignalKind::Camarilla,
        SignalKind::Vwma,
        SignalKind::HighVolumeScanner,
        SignalKind::SmartMoneyFlow,
        SignalKind::TradeZones,
        SignalKind::OiMomentum,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::TrendBase => "Trend Base",
            Self::VolumePulse => "Volume Pulse",
            Self::CandleIntent => "Candle Intent",
            Self::PivotPoints => "Pivot Points",
            Self::OrbBreakout => "Opening Range Breakout",
            Self::SuperTrend => "SuperTrend",
            Self::ParabolicSar => "Parabolic SAR",
            Self::RsiCombo => "RSI 60/40",
            Self::Camarilla => "Camarilla",
            Self::Vwma => "VWMA 20",
            Self::HighVolumeScanner => "High Volume Scanner",
            Self::SmartMoneyFlow => "Smart Money Flow",
            Self::TradeZones => "Trade Zones",
            Self::OiMomentum => "OI Momentum",
        }
    }
}

/// One scored read: a direction, a confidence in [0, 100], and a line of
/// rationale for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub direction: Direction,
    pub confidence: f64,
    pub status_text: String,
}

impl Signal {
    pub fn new(
        kind: SignalKind,
        direction: Direction,
        confidence: f64,
        status_text: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            direction,
            confidence: confidence.clamp(0.0, 100.0),
            status_text: status_text.into(),
        }
    }

    /// The degraded form every signal falls back to when its inputs are
    /// missing. Distinct from a computed neutral by its status_text.
    pub fn insufficient(kind: SignalKind, gap: impl std::fmt::Display) -> Self {
        Self::new(
            kind,
            Direction::Neutral,
            50.0,
            format!("{}: insufficient data ({gap})", kind.display_name()),
        )
    }
}

/// Everything a signal evaluation may look at, copied out in advance.
pub struct SignalContext<'a> {
    pub indicators: &'a IndicatorSnapshot,
    pub candles_1m: &'a [Candle],
    pub candles_5m: &'a [Candle],
    /// The forming 5m candle, when one exists.
    pub partial_5m: Option<&'a Candle>,
    pub last_price: f64,
}

impl SignalContext<'_> {
    /// The candle signals read: the forming 5m bar, else the last closed one.
    pub fn active_candle(&self) -> Option<&Candle> {
        self.partial_5m.or_else(|| self.candles_5m.last())
    }

    /// Ratio of the active candle's volume to the 20-bar 5m average.
    pub fn volume_ratio(&self) -> Option<f64> {
        let active = self.active_candle()?;
        let lookback: Vec<&Candle> = self
            .candles_5m
            .iter()
            .rev()
            .take(20)
            .collect();
        if lookback.len() < 20 {
            return None;
        }
        let mean: f64 =
            lookback.iter().map(|c| c.volume as f64).sum::<f64>() / lookback.len() as f64;
        if mean <= 0.0 {
            return None;
        }
        Some(active.volume as f64 / mean)
    }

    /// Percent price change across the trailing `bars` 1m candles.
    pub fn price_change_pct(&self, bars: usize) -> Option<f64> {
        if self.candles_1m.len() < bars || bars == 0 {
            return None;
        }
        let base = self.candles_1m[self.candles_1m.len() - bars].close;
        if base == 0.0 {
            return None;
        }
        Some((self.last_price - base) / base * 100.0)
    }
}

/// Evaluate all fourteen signals. Deterministic and side-effect free.
pub fn evaluate_all(ctx: &SignalContext<'_>) -> Vec<Signal> {
    vec![
        price_action::trend_base(ctx),
        volume_flow::volume_pulse(ctx),
        price_action::candle_intent(ctx),
        price_action::pivot_points(ctx),
        price_action::orb_breakout(ctx),
        momentum::super_trend(ctx),
        momentum::parabolic_sar(ctx),
        momentum::rsi_combo(ctx),
        price_action::camarilla(ctx),
        momentum::vwma(ctx),
        volume_flow::high_volume_scanner(ctx),
        volume_flow::smart_money_flow(ctx),
        price_action::trade_zones(ctx),
        volume_flow::oi_momentum(ctx),
    ]
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{IndicatorInputs, IndicatorSnapshot};

    #[test]
    fn all_fourteen_always_emit() {
        // Fully empty context: every signal must still produce a record.
        let snapshot = IndicatorSnapshot::compute(&IndicatorInputs {
            candles_1m: &[],
            candles_5m: &[],
            candles_15m: &[],
            last_price: 0.0,
            prev_day: None,
            orb: None,
            oi_history: &[],
        });
        let ctx = SignalContext {
            indicators: &snapshot,
            candles_1m: &[],
            candles_5m: &[],
            partial_5m: None,
            last_price: 0.0,
        };
        let signals = evaluate_all(&ctx);
        assert_eq!(signals.len(), 14);
        for (i, s) in signals.iter().enumerate() {
            assert_eq!(s.kind, SignalKind::ALL[i]);
            assert_eq!(s.direction, Direction::Neutral);
            assert!((s.confidence - 50.0).abs() < 1e-9);
            assert!(!s.status_text.is_empty());
        }
    }

    #[test]
    fn evaluation_is_byte_for_byte_deterministic() {
        use crate::market_data::{Candle, Timeframe};
        use crate::types::{DayOhlc, Symbol};

        let make = |tf: Timeframe, i: i64| {
            let open = 100.0 + ((i * 13) % 7) as f64;
            let close = 101.0 + ((i * 17) % 5) as f64;
            Candle {
                symbol: Symbol::Nifty,
                timeframe: tf,
                open_ts: i * tf.duration_ms(),
                open,
                high: open.max(close) + 2.0,
                low: open.min(close) - 2.0,
                close,
                volume: 80 + ((i * 31) % 60) as u64,
                oi_close: Some(1_000_000 + i as u64 * 100),
            }
        };
        let m1: Vec<Candle> = (0..220).map(|i| make(Timeframe::M1, i)).collect();
        let m5: Vec<Candle> = (0..40).map(|i| make(Timeframe::M5, i)).collect();
        let m15: Vec<Candle> = (0..40).map(|i| make(Timeframe::M15, i)).collect();
        let oi: Vec<(i64, u64)> = (0..20).map(|i| (i * 60_000, 1_000_000 + i as u64 * 2_000)).collect();

        let inputs = IndicatorInputs {
            candles_1m: &m1,
            candles_5m: &m5,
            candles_15m: &m15,
            last_price: 104.5,
            prev_day: Some(DayOhlc { open: 99.0, high: 106.0, low: 97.0, close: 103.0 }),
            orb: None,
            oi_history: &oi,
        };
        let snapshot = IndicatorSnapshot::compute(&inputs);
        let ctx = SignalContext {
            indicators: &snapshot,
            candles_1m: &m1,
            candles_5m: &m5,
            partial_5m: None,
            last_price: 104.5,
        };

        let a = serde_json::to_string(&evaluate_all(&ctx)).unwrap();
        let b = serde_json::to_string(&evaluate_all(&ctx)).unwrap();
        assert_eq!(a, b);

        // And every confidence stays in range on this mixed fixture.
        for s in evaluate_all(&ctx) {
            assert!((0.0..=100.0).contains(&s.confidence), "{:?}", s.kind);
        }
    }

    #[test]
    fn confidence_is_clamped() {
        let s = Signal::new(SignalKind::TrendBase, Direction::Buy, 250.0, "x");
        assert_eq!(s.confidence, 100.0);
        let s = Signal::new(SignalKind::TrendBase, Direction::Sell, -3.0, "x");
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn kind_serialises_screaming_snake() {
        let json = serde_json::to_string(&SignalKind::OrbBreakout).unwrap();
        assert_eq!(json, "\"ORB_BREAKOUT\"");
        let json = serde_json::to_string(&SignalKind::OiMomentum).unwrap();
        assert_eq!(json, "\"OI_MOMENTUM\"");
    }
}

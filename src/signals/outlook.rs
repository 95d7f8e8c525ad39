// =============================================================================
// Outlook — aggregate of the fourteen signals
// =============================================================================

use serde::Serialize;

use crate::signals::Signal;
use crate::types::{Direction, Symbol};

/// Aggregate label over the signal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutlookLabel {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl OutlookLabel {
    pub fn direction(self) -> Direction {
        match self {
            Self::StrongBuy | Self::Buy => Direction::Buy,
            Self::StrongSell | Self::Sell => Direction::Sell,
            Self::Neutral => Direction::Neutral,
        }
    }
}

impl std::fmt::Display for OutlookLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Neutral => "NEUTRAL",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        };
        write!(f, "{s}")
    }
}

/// The aggregated market outlook for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct Outlook {
    pub symbol: Symbol,
    pub bullish: u32,
    pub bearish: u32,
    pub neutral: u32,
    /// Mean confidence across all signals, [0, 100].
    pub overall_confidence: f64,
    /// 100 · (bull − bear) / N, rounded to one decimal. [−100, 100].
    pub trend_percent: f64,
    pub label: OutlookLabel,
    pub signals: Vec<Signal>,
    /// Epoch millis of the evaluation that produced this outlook.
    pub version_ts: i64,
}

impl Outlook {
    /// Aggregate a full signal set. The result is invariant under permutation
    /// of `signals`.
    pub fn from_signals(symbol: Symbol, signals: Vec<Signal>, version_ts: i64) -> Self {
        let total = signals.len().max(1) as f64;

        let bullish = signals.iter().filter(|s| s.direction == Direction::Buy).count() as u32;
        let bearish = signals.iter().filter(|s| s.direction == Direction::Sell).count() as u32;
        let neutral = signals.len() as u32 - bullish - bearish;

        let overall_confidence = signals.iter().map(|s| s.confidence).sum::<f64>() / total;

        let margin = bullish as i64 - bearish as i64;
        let trend_percent = (margin as f64 / total * 1000.0).round() / 10.0;

        let label = if margin > 3 && overall_confidence > 70.0 {
            OutlookLabel::StrongBuy
        } else if margin > 0 {
            OutlookLabel::Buy
        } else if margin < -3 && overall_confidence > 70.0 {
            OutlookLabel::StrongSell
        } else if margin < 0 {
            OutlookLabel::Sell
        } else {
            OutlookLabel::Neutral
        };

        Self {
            symbol,
            bullish,
            bearish,
            neutral,
            overall_confidence,
            trend_percent,
            label,
            signals,
            version_ts,
        }
    }
}

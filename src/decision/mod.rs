// =============================================================================
// Decision engine — outlook + market indices → one actionable verdict
// =============================================================================
//
// The final score is a conviction measure in the direction of the outlook:
// index adjustments that confirm the outlook raise it, contradicting ones
// lower it, and the volatility penalty only ever subtracts. Outside
// MARKET_OPEN (or on a dead feed) every decision collapses to WAIT at the
// confidence floor.
//
// Trader-action text comes from a data table (see `playbook`), not from
// branching code.
// =============================================================================

pub mod playbook;

use serde::Serialize;

use crate::market_indices::{
    BreadthLabel, MarketIndices, OiMomentum, PcrSentiment, VolatilityLevel,
};
use crate::signals::Outlook;
use crate::types::{Direction, SessionState, Symbol};

pub use playbook::TraderActions;

/// Final decision action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    StrongBuy,
    Buy,
    Hold,
    Wait,
    Sell,
    StrongSell,
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Wait => "WAIT",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        };
        write!(f, "{s}")
    }
}

/// Risk classification attached to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Per-index contributions, exposed for auditability: the final confidence is
/// a deterministic function of these numbers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreComponents {
    /// Mean signal confidence from the outlook.
    pub base: f64,
    pub pcr_adjustment: f64,
    pub oi_adjustment: f64,
    pub volatility_adjustment: f64,
    pub breadth_adjustment: f64,
    /// base + 0.30·pcr + 0.30·oi + 0.20·vol + 0.20·breadth, clipped to
    /// [0, 100].
    pub final_score: f64,
}

impl ScoreComponents {
    /// Recompute the final score from the parts. Used by tests to prove the
    /// published confidence matches its components.
    pub fn recompute(&self) -> f64 {
        (self.base
            + 0.30 * self.pcr_adjustment
            + 0.30 * self.oi_adjustment
            + 0.20 * self.volatility_adjustment
            + 0.20 * self.breadth_adjustment)
            .clamp(0.0, 100.0)
    }
}

/// The full decision envelope for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub symbol: Symbol,
    pub action: DecisionAction,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub score_components: ScoreComponents,
    pub trader_actions: TraderActions,
    /// Conditions worth watching while the decision stands.
    pub monitor: Vec<String>,
    pub version_ts: i64,
}

// =============================================================================
// Adjustment tables (bullish axis; sign-flipped for a bearish outlook)
// =============================================================================

fn pcr_adjustment(sentiment: PcrSentiment) -> f64 {
    match sentiment {
        PcrSentiment::VeryBullish => 15.0,
        PcrSentiment::Bullish => 10.0,
        PcrSentiment::Neutral => 0.0,
        PcrSentiment::Bearish => -10.0,
        PcrSentiment::VeryBearish => -15.0,
    }
}

fn oi_adjustment(momentum: OiMomentum) -> f64 {
    match momentum {
        OiMomentum::LongBuildUp => 10.0,
        OiMomentum::ShortBuildUp => -10.0,
        OiMomentum::ShortCovering => 5.0,
        OiMomentum::LongUnwinding => -5.0,
        OiMomentum::Flat => 0.0,
    }
}

fn breadth_adjustment(label: BreadthLabel) -> f64 {
    match label {
        BreadthLabel::StronglyPositive => 8.0,
        BreadthLabel::Positive => 4.0,
        BreadthLabel::Flat => 0.0,
        BreadthLabel::Negative => -4.0,
        BreadthLabel::StronglyNegative => -8.0,
    }
}

/// Volatility only ever penalizes confidence, bounded at −10.
fn volatility_adjustment(level: VolatilityLevel) -> f64 {
    match level {
        VolatilityLevel::High => -10.0,
        VolatilityLevel::Low => -3.0,
        VolatilityLevel::Normal => 0.0,
    }
}

fn risk_level(score: f64, volatility: VolatilityLevel) -> RiskLevel {
    match volatility {
        VolatilityLevel::High => RiskLevel::High,
        _ if score >= 75.0 => RiskLevel::Low,
        _ if score >= 55.0 => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

// =============================================================================
// The engine
// =============================================================================

/// Combine an outlook with the market indices into a decision. Deterministic
/// and side-effect free.
///
/// `feed_ok` is false while the ingest session cannot prove fresh data
/// (stale watchdog, token expired); that collapses the action to WAIT.
pub fn decide(outlook: &Outlook, indices: &MarketIndices, feed_ok: bool) -> Decision {
    let direction = outlook.label.direction();
    // A bearish-confirming index must raise conviction in a bearish outlook.
    let axis = match direction {
        Direction::Sell => -1.0,
        _ => 1.0,
    };

    let components = ScoreComponents {
        base: outlook.overall_confidence,
        pcr_adjustment: axis * pcr_adjustment(indices.pcr_sentiment),
        oi_adjustment: axis * oi_adjustment(indices.oi_momentum),
        volatility_adjustment: volatility_adjustment(indices.volatility_level),
        breadth_adjustment: axis * breadth_adjustment(indices.breadth_label),
        final_score: 0.0,
    };
    let score = components.recompute();
    let components = ScoreComponents {
        final_score: score,
        ..components
    };

    let market_live = indices.session_state == SessionState::MarketOpen && feed_ok;

    let (action, confidence) = if !market_live {
        // Confidence floor: a WAIT outside the session carries no conviction
        // either way.
        (DecisionAction::Wait, 50.0)
    } else {
        let action = match direction {
            Direction::Buy => {
                if score >= 80.0 {
                    DecisionAction::StrongBuy
                } else if score >= 65.0 {
                    DecisionAction::Buy
                } else if score >= 50.0 {
                    DecisionAction::Hold
                } else {
                    DecisionAction::Wait
                }
            }
            Direction::Sell => {
                if score >= 80.0 {
                    DecisionAction::StrongSell
                } else if score >= 65.0 {
                    DecisionAction::Sell
                } else if score >= 50.0 {
                    DecisionAction::Hold
                } else {
                    DecisionAction::Wait
                }
            }
            Direction::Neutral => {
                if score >= 50.0 {
                    DecisionAction::Hold
                } else {
                    DecisionAction::Wait
                }
            }
        };
        (action, score)
    };

    let risk = risk_level(confidence, indices.volatility_level);
    let trader_actions = playbook::lookup(action, risk, indices.volatility_level);
    let monitor = build_monitor(outlook, indices, market_live);

    Decision {
        symbol: outlook.symbol,
        action,
        confidence,
        risk_level: risk,
        score_components: components,
        trader_actions,
        monitor,
        version_ts: outlook.version_ts,
    }
}

fn build_monitor(outlook: &Outlook, indices: &MarketIndices, market_live: bool) -> Vec<String> {
    let mut items = Vec::with_capacity(4);
    if !market_live {
        items.push("market session / feed recovery".to_string());
    }
    if let Some(pcr) = indices.pcr_value {
        items.push(format!("PCR {pcr:.2} for a sentiment shift"));
    }
    if indices.oi_momentum != OiMomentum::Flat {
        items.push(format!("OI momentum ({:?}) persistence", indices.oi_momentum));
    }
    if indices.volatility_level == VolatilityLevel::High {
        items.push("elevated volatility — widen stops".to_string());
    }
    items.push(format!(
        "signal balance {}:{} holding",
        outlook.bullish, outlook.bearish
    ));
    items
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{Signal, SignalKind};

    fn outlook(bull: usize, bear: usize, confidence: f64) -> Outlook {
        let signals: Vec<Signal> = SignalKind::ALL
            .iter()
            .enumerate()
            .map(|(i, &kind)| {
                let dir = if i < bull {
                    Direction::Buy
                } else if i < bull + bear {
                    Direction::Sell
                } else {
                    Direction::Neutral
                };
                Signal::new(kind, dir, confidence, "t")
            })
            .collect();
        Outlook::from_signals(Symbol::Nifty, signals, 42)
    }

    fn indices(
        pcr: PcrSentiment,
        oi: OiMomentum,
        breadth: BreadthLabel,
        vol: VolatilityLevel,
        session: SessionState,
    ) -> MarketIndices {
        MarketIndices {
            pcr_value: Some(1.0),
            pcr_sentiment: pcr,
            oi_momentum: oi,
            breadth_ad_ratio: Some(1.0),
            breadth_label: breadth,
            volatility_pct: Some(0.1),
            volatility_level: vol,
            session_state: session,
        }
    }

    #[test]
    fn confirming_indices_upgrade_a_bullish_outlook() {
        let o = outlook(10, 1, 72.0);
        let idx = indices(
            PcrSentiment::VeryBullish,
            OiMomentum::LongBuildUp,
            BreadthLabel::StronglyPositive,
            VolatilityLevel::Normal,
            SessionState::MarketOpen,
        );
        let d = decide(&o, &idx, true);
        // 72 + 4.5 + 3 + 0 + 1.6 = 81.1
        assert_eq!(d.action, DecisionAction::StrongBuy);
        assert!((d.confidence - 81.1).abs() < 1e-9);
        assert_eq!(d.risk_level, RiskLevel::Low);
    }

    #[test]
    fn bearish_outlook_mirrors_with_confirming_indices() {
        let o = outlook(1, 10, 72.0);
        let idx = indices(
            PcrSentiment::VeryBearish,
            OiMomentum::ShortBuildUp,
            BreadthLabel::StronglyNegative,
            VolatilityLevel::Normal,
            SessionState::MarketOpen,
        );
        let d = decide(&o, &idx, true);
        // Sign flip: every bearish confirmation adds conviction.
        assert_eq!(d.action, DecisionAction::StrongSell);
        assert!(d.confidence > 80.0);
    }

    #[test]
    fn contradicting_indices_demote() {
        let o = outlook(9, 2, 70.0);
        let idx = indices(
            PcrSentiment::VeryBearish,
            OiMomentum::ShortBuildUp,
            BreadthLabel::StronglyNegative,
            VolatilityLevel::High,
            SessionState::MarketOpen,
        );
        let d = decide(&o, &idx, true);
        // 70 - 4.5 - 3 - 2 - 1.6 = 58.9 → HOLD at high risk.
        assert_eq!(d.action, DecisionAction::Hold);
        assert_eq!(d.risk_level, RiskLevel::High);
    }

    #[test]
    fn confidence_equals_component_function() {
        let o = outlook(8, 3, 66.0);
        let idx = indices(
            PcrSentiment::Bullish,
            OiMomentum::ShortCovering,
            BreadthLabel::Positive,
            VolatilityLevel::Low,
            SessionState::MarketOpen,
        );
        let d = decide(&o, &idx, true);
        assert!((d.confidence - d.score_components.recompute()).abs() < 1e-9);
        assert!((d.score_components.final_score - d.confidence).abs() < 1e-9);
    }

    #[test]
    fn outside_market_hours_collapses_to_wait() {
        let o = outlook(12, 0, 90.0);
        for session in [
            SessionState::PreOpen,
            SessionState::AfterHours,
            SessionState::Closed,
            SessionState::Holiday,
        ] {
            let idx = indices(
                PcrSentiment::VeryBullish,
                OiMomentum::LongBuildUp,
                BreadthLabel::StronglyPositive,
                VolatilityLevel::Normal,
                session,
            );
            let d = decide(&o, &idx, true);
            assert_eq!(d.action, DecisionAction::Wait);
            assert_eq!(d.confidence, 50.0);
        }
    }

    #[test]
    fn dead_feed_collapses_to_wait() {
        let o = outlook(12, 0, 90.0);
        let idx = indices(
            PcrSentiment::VeryBullish,
            OiMomentum::LongBuildUp,
            BreadthLabel::StronglyPositive,
            VolatilityLevel::Normal,
            SessionState::MarketOpen,
        );
        let d = decide(&o, &idx, false);
        assert_eq!(d.action, DecisionAction::Wait);
        assert_eq!(d.confidence, 50.0);
    }

    #[test]
    fn decision_is_deterministic() {
        let o = outlook(7, 4, 68.0);
        let idx = indices(
            PcrSentiment::Bullish,
            OiMomentum::LongBuildUp,
            BreadthLabel::Positive,
            VolatilityLevel::Normal,
            SessionState::MarketOpen,
        );
        let a = decide(&o, &idx, true);
        let b = decide(&o, &idx, true);
        assert_eq!(a.action, b.action);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.risk_level, b.risk_level);
    }

    #[test]
    fn confidence_is_always_bounded() {
        let o = outlook(14, 0, 99.0);
        let idx = indices(
            PcrSentiment::VeryBullish,
            OiMomentum::LongBuildUp,
            BreadthLabel::StronglyPositive,
            VolatilityLevel::Normal,
            SessionState::MarketOpen,
        );
        let d = decide(&o, &idx, true);
        assert!(d.confidence <= 100.0);

        let o = outlook(0, 14, 5.0);
        let idx = indices(
            PcrSentiment::VeryBullish,
            OiMomentum::LongBuildUp,
            BreadthLabel::StronglyPositive,
            VolatilityLevel::High,
            SessionState::MarketOpen,
        );
        let d = decide(&o, &idx, true);
        assert!(d.confidence >= 0.0);
    }
}

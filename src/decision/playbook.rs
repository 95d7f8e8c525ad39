// =============================================================================
// Trader-action playbook — a data table, not code branches
// =============================================================================
//
// Rows are matched on (action, risk_level, volatility_level); `None` in a key
// column is a wildcard. The first matching row wins, and the final row is a
// catch-all so a lookup can never come back empty.
// =============================================================================

use serde::Serialize;

use crate::decision::{DecisionAction, RiskLevel};
use crate::market_indices::VolatilityLevel;

/// The four lines of guidance attached to every decision.
#[derive(Debug, Clone, Serialize)]
pub struct TraderActions {
    pub entry_setup: String,
    pub position_management: String,
    pub risk_management: String,
    pub timeframe: String,
}

struct PlaybookRow {
    action: Option<DecisionAction>,
    risk: Option<RiskLevel>,
    volatility: Option<VolatilityLevel>,
    entry_setup: &'static str,
    position_management: &'static str,
    risk_management: &'static str,
    timeframe: &'static str,
}

const PLAYBOOK: &[PlaybookRow] = &[
    PlaybookRow {
        action: Some(DecisionAction::StrongBuy),
        risk: Some(RiskLevel::Low),
        volatility: None,
        entry_setup: "Enter long on the next minor pullback; add on strength above the day high",
        position_management: "Scale in up to full size; trail below successive higher lows",
        risk_management: "Initial stop under the last 5m swing low; risk at most 1R per add",
        timeframe: "Intraday, hold while the 5m trend structure is intact",
    },
    PlaybookRow {
        action: Some(DecisionAction::StrongBuy),
        risk: None,
        volatility: Some(VolatilityLevel::High),
        entry_setup: "Enter long on confirmation only — wait for a 5m close in the direction",
        position_management: "Half size; take partial profit at 1R and trail the rest",
        risk_management: "Wider ATR-based stop; cut immediately on a failed breakout",
        timeframe: "Short intraday bursts; reassess every 15 minutes",
    },
    PlaybookRow {
        action: Some(DecisionAction::StrongBuy),
        risk: None,
        volatility: None,
        entry_setup: "Enter long at market or on a shallow retest of the breakout level",
        position_management: "Standard size; add only after a higher low forms",
        risk_management: "Stop below the breakout level; move to breakeven at 1R",
        timeframe: "Intraday swing into the afternoon session",
    },
    PlaybookRow {
        action: Some(DecisionAction::Buy),
        risk: Some(RiskLevel::High),
        volatility: None,
        entry_setup: "Small probing long near support only; no chasing",
        position_management: "Quarter size; exit into the first bounce",
        risk_management: "Tight stop under support; accept frequent small losses",
        timeframe: "Scalps of 5–15 minutes",
    },
    PlaybookRow {
        action: Some(DecisionAction::Buy),
        risk: None,
        volatility: None,
        entry_setup: "Buy pullbacks toward VWAP or the nearest pivot support",
        position_management: "Standard size; trail under the 5m swing lows",
        risk_management: "Stop under VWAP; reduce if momentum signals flip",
        timeframe: "Intraday, review at each 15m close",
    },
    PlaybookRow {
        action: Some(DecisionAction::StrongSell),
        risk: Some(RiskLevel::Low),
        volatility: None,
        entry_setup: "Enter short on the next weak bounce; add below the day low",
        position_management: "Scale in up to full size; trail above successive lower highs",
        risk_management: "Initial stop over the last 5m swing high; risk at most 1R per add",
        timeframe: "Intraday, hold while the downtrend structure is intact",
    },
    PlaybookRow {
        action: Some(DecisionAction::StrongSell),
        risk: None,
        volatility: Some(VolatilityLevel::High),
        entry_setup: "Short on confirmation only — wait for a 5m close below the level",
        position_management: "Half size; cover partials into spikes down",
        risk_management: "Wider ATR-based stop; cover fast on reclaim of the level",
        timeframe: "Short intraday bursts; reassess every 15 minutes",
    },
    PlaybookRow {
        action: Some(DecisionAction::StrongSell),
        risk: None,
        volatility: None,
        entry_setup: "Enter short at market or on a weak retest of the breakdown level",
        position_management: "Standard size; add only after a lower high forms",
        risk_management: "Stop above the breakdown level; move to breakeven at 1R",
        timeframe: "Intraday swing into the afternoon session",
    },
    PlaybookRow {
        action: Some(DecisionAction::Sell),
        risk: None,
        volatility: None,
        entry_setup: "Sell bounces toward VWAP or the nearest pivot resistance",
        position_management: "Standard size; trail above the 5m swing highs",
        risk_management: "Stop above VWAP; reduce if momentum signals flip",
        timeframe: "Intraday, review at each 15m close",
    },
    PlaybookRow {
        action: Some(DecisionAction::Hold),
        risk: None,
        volatility: None,
        entry_setup: "No new entries; manage what is already on",
        position_management: "Hold existing positions with trailed stops",
        risk_management: "Tighten stops to the nearest structure level",
        timeframe: "Reassess on the next 15m close or signal change",
    },
    // Catch-all: WAIT and anything unmatched above.
    PlaybookRow {
        action: None,
        risk: None,
        volatility: None,
        entry_setup: "Stand aside — conditions do not favour a position",
        position_management: "Flat book; no averaging into weakness",
        risk_management: "Capital preservation first; wait for the next clean setup",
        timeframe: "Recheck after the next session transition or fresh signal",
    },
];

/// Find the guidance for a decision. The trailing catch-all row guarantees a
/// match.
pub fn lookup(
    action: DecisionAction,
    risk: RiskLevel,
    volatility: VolatilityLevel,
) -> TraderActions {
    let row = PLAYBOOK
        .iter()
        .find(|row| {
            row.action.map_or(true, |a| a == action)
                && row.risk.map_or(true, |r| r == risk)
                && row.volatility.map_or(true, |v| v == volatility)
        })
        .unwrap_or(&PLAYBOOK[PLAYBOOK.len() - 1]);

    TraderActions {
        entry_setup: row.entry_setup.to_string(),
        position_management: row.position_management.to_string(),
        risk_management: row.risk_management.to_string(),
        timeframe: row.timeframe.to_string(),
    }
}

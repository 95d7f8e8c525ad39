// =============================================================================
// Market-wide indices — the context a single symbol's outlook is judged in
// =============================================================================
//
// PCR sentiment, OI momentum, breadth across the tracked universe, the
// volatility regime, and the session phase. These feed the decision engine's
// adjustment table.
// =============================================================================

use serde::Serialize;

use crate::types::SessionState;

/// Put-call-ratio sentiment buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PcrSentiment {
    VeryBullish,
    Bullish,
    Neutral,
    Bearish,
    VeryBearish,
}

/// Bucket a raw put/call OI ratio. High PCR (puts heavy) reads bullish for
/// index options: put writers are committed below the market.
pub fn pcr_sentiment(pcr: f64) -> PcrSentiment {
    if pcr >= 1.3 {
        PcrSentiment::VeryBullish
    } else if pcr >= 1.1 {
        PcrSentiment::Bullish
    } else if pcr <= 0.7 {
        PcrSentiment::VeryBearish
    } else if pcr <= 0.9 {
        PcrSentiment::Bearish
    } else {
        PcrSentiment::Neutral
    }
}

/// The four-quadrant OI read plus a flat state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OiMomentum {
    LongBuildUp,
    ShortBuildUp,
    LongUnwinding,
    ShortCovering,
    Flat,
}

/// Classify the (Δprice%, ΔOI%) pair into the standard quadrant table.
pub fn classify_oi(price_change_pct: f64, oi_change_pct: f64) -> OiMomentum {
    if oi_change_pct.abs() < 0.1 || price_change_pct.abs() < 0.05 {
        return OiMomentum::Flat;
    }
    match (price_change_pct > 0.0, oi_change_pct > 0.0) {
        (true, true) => OiMomentum::LongBuildUp,
        (false, true) => OiMomentum::ShortBuildUp,
        (false, false) => OiMomentum::LongUnwinding,
        (true, false) => OiMomentum::ShortCovering,
    }
}

/// Advance/decline breadth across the tracked universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreadthLabel {
    StronglyPositive,
    Positive,
    Flat,
    Negative,
    StronglyNegative,
}

/// Label an advance/decline ratio. `advances` and `declines` count symbols
/// trading above/below their day open.
pub fn breadth(advances: usize, declines: usize) -> (Option<f64>, BreadthLabel) {
    if advances + declines == 0 {
        return (None, BreadthLabel::Flat);
    }
    // Avoid division by zero with a unit floor on declines.
    let ratio = advances as f64 / declines.max(1) as f64;
    let label = if declines == 0 && advances > 0 {
        BreadthLabel::StronglyPositive
    } else if ratio >= 2.0 {
        BreadthLabel::StronglyPositive
    } else if ratio >= 1.2 {
        BreadthLabel::Positive
    } else if ratio <= 0.5 {
        BreadthLabel::StronglyNegative
    } else if ratio <= 0.8 {
        BreadthLabel::Negative
    } else {
        BreadthLabel::Flat
    };
    (Some(ratio), label)
}

/// Volatility regime from ATR as a percent of price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityLevel {
    Low,
    Normal,
    High,
}

pub fn volatility_level(atr_pct: Option<f64>) -> VolatilityLevel {
    match atr_pct {
        Some(v) if v >= 0.20 => VolatilityLevel::High,
        Some(v) if v < 0.06 => VolatilityLevel::Low,
        Some(_) => VolatilityLevel::Normal,
        None => VolatilityLevel::Normal,
    }
}

/// The full market-index record handed to the decision engine.
#[derive(Debug, Clone, Serialize)]
pub struct MarketIndices {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcr_value: Option<f64>,
    pub pcr_sentiment: PcrSentiment,
    pub oi_momentum: OiMomentum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breadth_ad_ratio: Option<f64>,
    pub breadth_label: BreadthLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility_pct: Option<f64>,
    pub volatility_level: VolatilityLevel,
    pub session_state: SessionState,
}

impl MarketIndices {
    /// Compose the record from its raw ingredients. A missing PCR degrades to
    /// the neutral bucket rather than blocking the decision.
    pub fn compose(
        pcr: Option<f64>,
        price_change_pct: f64,
        oi_change_pct: Option<f64>,
        advances: usize,
        declines: usize,
        atr_pct: Option<f64>,
        session_state: SessionState,
    ) -> Self {
        let (breadth_ad_ratio, breadth_label) = breadth(advances, declines);
        Self {
            pcr_value: pcr,
            pcr_sentiment: pcr.map(pcr_sentiment).unwrap_or(PcrSentiment::Neutral),
            oi_momentum: oi_change_pct
                .map(|oi| classify_oi(price_change_pct, oi))
                .unwrap_or(OiMomentum::Flat),
            breadth_ad_ratio,
            breadth_label,
            volatility_pct: atr_pct,
            volatility_level: volatility_level(atr_pct),
            session_state,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcr_buckets() {
        assert_eq!(pcr_sentiment(1.45), PcrSentiment::VeryBullish);
        assert_eq!(pcr_sentiment(1.15), PcrSentiment::Bullish);
        assert_eq!(pcr_sentiment(1.0), PcrSentiment::Neutral);
        assert_eq!(pcr_sentiment(0.85), PcrSentiment::Bearish);
        assert_eq!(pcr_sentiment(0.6), PcrSentiment::VeryBearish);
    }

    #[test]
    fn oi_quadrants_and_flat() {
        assert_eq!(classify_oi(0.5, 1.0), OiMomentum::LongBuildUp);
        assert_eq!(classify_oi(-0.5, 1.0), OiMomentum::ShortBuildUp);
        assert_eq!(classify_oi(-0.5, -1.0), OiMomentum::LongUnwinding);
        assert_eq!(classify_oi(0.5, -1.0), OiMomentum::ShortCovering);
        assert_eq!(classify_oi(0.01, 2.0), OiMomentum::Flat);
        assert_eq!(classify_oi(1.0, 0.02), OiMomentum::Flat);
    }

    #[test]
    fn breadth_labels() {
        assert_eq!(breadth(3, 0).1, BreadthLabel::StronglyPositive);
        assert_eq!(breadth(2, 1).1, BreadthLabel::StronglyPositive);
        assert_eq!(breadth(1, 2).1, BreadthLabel::StronglyNegative);
        assert_eq!(breadth(1, 1).1, BreadthLabel::Flat);
        assert_eq!(breadth(0, 0), (None, BreadthLabel::Flat));
    }

    #[test]
    fn volatility_thresholds() {
        assert_eq!(volatility_level(Some(0.25)), VolatilityLevel::High);
        assert_eq!(volatility_level(Some(0.03)), VolatilityLevel::Low);
        assert_eq!(volatility_level(Some(0.1)), VolatilityLevel::Normal);
        assert_eq!(volatility_level(None), VolatilityLevel::Normal);
    }

    #[test]
    fn compose_degrades_missing_inputs() {
        let idx = MarketIndices::compose(
            None,
            0.0,
            None,
            0,
            0,
            None,
            SessionState::Closed,
        );
        assert_eq!(idx.pcr_sentiment, PcrSentiment::Neutral);
        assert_eq!(idx.oi_momentum, OiMomentum::Flat);
        assert_eq!(idx.breadth_label, BreadthLabel::Flat);
        assert_eq!(idx.volatility_level, VolatilityLevel::Normal);
        assert!(idx.pcr_value.is_none());
    }
}

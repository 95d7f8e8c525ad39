// =============================================================================
// Day pivot levels — classical floor pivots and Camarilla rails
// =============================================================================
//
// Both sets derive from the prior trading day's OHLC:
//
//   classical:  P = (H + L + C) / 3
//               R1 = 2P - L      S1 = 2P - H
//               R2 = P + (H - L) S2 = P - (H - L)
//               R3 = H + 2(P-L)  S3 = L - 2(H-P)
//
//   camarilla:  H3 = C + (H - L) · 1.1/4    L3 = C - (H - L) · 1.1/4
//               H4 = C + (H - L) · 1.1/2    L4 = C - (H - L) · 1.1/2
//               H3/H4 and L3/L4 are the actionable rails.
// =============================================================================

use serde::Serialize;

use crate::types::DayOhlc;

/// Classical floor-trader pivots.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Camarilla intraday rails.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CamarillaLevels {
    pub h4: f64,
    pub h3: f64,
    pub l3: f64,
    pub l4: f64,
}

pub fn classical(day: &DayOhlc) -> PivotLevels {
    let p = (day.high + day.low + day.close) / 3.0;
    let range = day.high - day.low;
    PivotLevels {
        pivot: p,
        r1: 2.0 * p - day.low,
        r2: p + range,
        r3: day.high + 2.0 * (p - day.low),
        s1: 2.0 * p - day.high,
        s2: p - range,
        s3: day.low - 2.0 * (day.high - p),
    }
}

pub fn camarilla(day: &DayOhlc) -> CamarillaLevels {
    let range = day.high - day.low;
    CamarillaLevels {
        h4: day.close + range * 1.1 / 2.0,
        h3: day.close + range * 1.1 / 4.0,
        l3: day.close - range * 1.1 / 4.0,
        l4: day.close - range * 1.1 / 2.0,
    }
}

impl PivotLevels {
    /// Distance from `price` to the nearest support level, as a fraction of
    /// price. Negative values mean price is below every support.
    pub fn nearest_support_distance(&self, price: f64) -> Option<(f64, f64)> {
        self.nearest_below(price, &[self.s1, self.s2, self.s3])
    }

    /// Distance from `price` to the nearest resistance level above it.
    pub fn nearest_resistance_distance(&self, price: f64) -> Option<(f64, f64)> {
        if price <= 0.0 {
            return None;
        }
        [self.r1, self.r2, self.r3]
            .into_iter()
            .filter(|level| *level >= price)
            .map(|level| (level, (level - price) / price))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn nearest_below(&self, price: f64, levels: &[f64]) -> Option<(f64, f64)> {
        if price <= 0.0 {
            return None;
        }
        levels
            .iter()
            .filter(|level| **level <= price)
            .map(|level| (*level, (price - level) / price))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

// =============================================================================
// Volume profile — where the session's volume actually traded
// =============================================================================
//
// Candle volume is binned by typical price into a fixed number of buckets
// across the observed range. The point of control (POC) is the bucket with
// the most volume; the summary label places the last price relative to it.
// =============================================================================

use serde::Serialize;

use crate::market_data::Candle;

const BUCKETS: usize = 20;

/// Position of the last price relative to the point of control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfilePosition {
    AbovePoc,
    AtPoc,
    BelowPoc,
}

/// Volume-profile summary for the session window.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VolumeProfileSummary {
    /// Price level of the highest-volume bucket.
    pub poc: f64,
    /// Share of total volume in the POC bucket, 0..1.
    pub poc_share: f64,
    pub position: ProfilePosition,
}

/// Build the profile over `candles` and place `last_price` against the POC.
///
/// `None` when the window is empty, carries no volume, or spans a degenerate
/// price range.
pub fn volume_profile(candles: &[Candle], last_price: f64) -> Option<VolumeProfileSummary> {
    if candles.is_empty() {
        return None;
    }

    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for c in candles {
        min = min.min(c.low);
        max = max.max(c.high);
    }
    if !(min.is_finite() && max.is_finite()) || max <= min {
        return None;
    }

    let width = (max - min) / BUCKETS as f64;
    let mut bins = [0.0_f64; BUCKETS];
    let mut total = 0.0;
    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        let idx = (((typical - min) / width) as usize).min(BUCKETS - 1);
        bins[idx] += c.volume as f64;
        total += c.volume as f64;
    }
    if total <= 0.0 {
        return None;
    }

    let (poc_idx, poc_volume) = bins
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, v)| (i, *v))?;

    let poc = min + (poc_idx as f64 + 0.5) * width;
    let position = if last_price > poc + width / 2.0 {
        ProfilePosition::AbovePoc
    } else if last_price < poc - width / 2.0 {
        ProfilePosition::BelowPoc
    } else {
        ProfilePosition::AtPoc
    };

    Some(VolumeProfileSummary {
        poc,
        poc_share: poc_volume / total,
        position,
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Timeframe;
    use crate::types::Symbol;

    fn candle(price: f64, volume: u64) -> Candle {
        Candle {
            symbol: Symbol::Nifty,
            timeframe: Timeframe::M1,
            open_ts: 0,
            open: price,
            high: price + 1.0,
            low: price - 1.0,
            close: price,
            volume,
            oi_close: None,
        }
    }

    #[test]
    fn poc_lands_on_the_heavy_price() {
        let mut candles = vec![candle(100.0, 50); 3];
        candles.extend(vec![candle(120.0, 500); 3]); // heavy zone
        candles.extend(vec![candle(140.0, 50); 3]);
        let profile = volume_profile(&candles, 141.0).unwrap();
        assert!((profile.poc - 120.0).abs() < 5.0);
        assert_eq!(profile.position, ProfilePosition::AbovePoc);
        assert!(profile.poc_share > 0.5);
    }

    #[test]
    fn below_poc_position() {
        let mut candles = vec![candle(120.0, 500); 3];
        candles.push(candle(100.0, 10));
        let profile = volume_profile(&candles, 100.0).unwrap();
        assert_eq!(profile.position, ProfilePosition::BelowPoc);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(volume_profile(&[], 100.0).is_none());
        let flat = vec![candle(100.0, 0); 5];
        assert!(volume_profile(&flat, 100.0).is_none());
    }
}

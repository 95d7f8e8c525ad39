// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// Close-to-close deltas are split into a gain stream and a loss stream, each
// run through its own Wilder accumulator. The index is then the gain share
// of total movement:
//
//   RSI = 100 * avg_gain / (avg_gain + avg_loss)
//
// which is the textbook 100 - 100/(1 + RS) with the division-by-zero cases
// folded away: an all-gain window reads 100, all-loss reads 0, and a window
// with no movement at all reads 50.
// =============================================================================

use crate::indicators::wilder::WilderSmoother;

/// RSI of the final close over a copied-out window. Needs `period + 1`
/// closes (one delta per close pair); `None` otherwise or on a damaged
/// series.
pub fn last_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gains = WilderSmoother::new(period);
    let mut losses = WilderSmoother::new(period);
    let mut rsi = None;
    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        // NaN must fall through to the accumulators so it poisons the
        // series; `f64::max(0.0)` would swallow it.
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        let avg_gain = gains.update(gain);
        let avg_loss = losses.update(loss);
        rsi = match (avg_gain, avg_loss) {
            (Some(g), Some(l)) => strength_index(g, l),
            _ => None,
        };
    }
    rsi
}

/// Gain share of total averaged movement, in [0, 100].
fn strength_index(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let movement = avg_gain + avg_loss;
    if movement == 0.0 {
        // A window with no movement has nothing to be overbought about.
        return Some(50.0);
    }
    let rsi = 100.0 * avg_gain / movement;
    rsi.is_finite().then_some(rsi)
}

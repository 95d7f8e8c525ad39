// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Maintained incrementally, one blend per candle close:
//
//   next = prev + alpha * (close - prev),   alpha = 2 / (period + 1)
//
// The accumulator warms up on a plain mean of the first `period` closes, so
// the very first emitted value is the SMA seed. Like the Wilder accumulator,
// a non-finite close (or a zero period) poisons the state: a damaged series
// reads as unavailable rather than carrying a stale number forward.
// =============================================================================

/// Incremental EMA accumulator for one (symbol, period) series.
#[derive(Debug, Clone)]
pub struct EmaState {
    period: usize,
    alpha: f64,
    warmup_sum: f64,
    seen: usize,
    current: Option<f64>,
    poisoned: bool,
}

impl EmaState {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            warmup_sum: 0.0,
            seen: 0,
            current: None,
            poisoned: period == 0,
        }
    }

    /// Feed one close. Returns the EMA once the seed window is full, `None`
    /// while warming up or after poisoning.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if !close.is_finite() {
            self.poisoned = true;
        }
        if self.poisoned {
            self.current = None;
            return None;
        }

        self.current = match self.current {
            None => {
                self.warmup_sum += close;
                self.seen += 1;
                (self.seen == self.period).then(|| self.warmup_sum / self.period as f64)
            }
            Some(prev) => Some(prev + self.alpha * (close - prev)),
        };
        self.current
    }

    pub fn value(&self) -> Option<f64> {
        self.current
    }
}

/// EMA of the final close over a copied-out window, or `None` when the
/// window cannot seed the accumulator.
pub fn last_ema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let mut ema = EmaState::new(period);
    let mut last = None;
    for &close in closes {
        last = ema.update(close);
    }
    last
}

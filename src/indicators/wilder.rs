// =============================================================================
// Wilder smoothing accumulator
// =============================================================================
//
// RSI and ATR both average their raw samples the same way: collect `period`
// samples to seed a plain mean, then blend each new sample in with
//
//   next = prev + (sample - prev) / period
//
// This accumulator owns that lifecycle once, so the indicator functions only
// supply their sample streams. A non-finite sample (or a zero period) poisons
// the accumulator permanently; a poisoned series reads as "unavailable"
// downstream, never as a number.
// =============================================================================

/// Incremental Wilder average over a sample stream.
#[derive(Debug, Clone)]
pub struct WilderSmoother {
    period: usize,
    warmup_sum: f64,
    seen: usize,
    current: Option<f64>,
    poisoned: bool,
}

impl WilderSmoother {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            warmup_sum: 0.0,
            seen: 0,
            current: None,
            poisoned: period == 0,
        }
    }

    /// Feed one sample. Returns the smoothed value once the seed window is
    /// full, `None` while warming up or after poisoning.
    pub fn update(&mut self, sample: f64) -> Option<f64> {
        if !sample.is_finite() {
            self.poisoned = true;
        }
        if self.poisoned {
            self.current = None;
            return None;
        }

        self.current = match self.current {
            None => {
                self.warmup_sum += sample;
                self.seen += 1;
                (self.seen == self.period).then(|| self.warmup_sum / self.period as f64)
            }
            Some(prev) => Some(prev + (sample - prev) / self.period as f64),
        };
        self.current
    }

    pub fn value(&self) -> Option<f64> {
        self.current
    }
}

// =============================================================================
// Candle builder — per-(symbol, timeframe) OHLCV rings built from raw ticks
// =============================================================================
//
// Buckets are aligned to the IST wall clock. The currently-forming candle is
// exposed as a mutable "partial"; a candle is finalized exactly once, when a
// tick lands in a later bucket, and finalized candles are never mutated again.
//
// Volume is derived from positive diffs of the tick's cumulative volume; a
// decrease re-baselines (session reset on the upstream feed). Out-of-order
// ticks are applied only when they still fall inside the current bucket,
// otherwise they are dropped and counted.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::session::IST_OFFSET_SECS;
use crate::types::{Symbol, Tick};

/// Late ticks older than this against the current partial are discarded.
const LATE_TOLERANCE_MS: i64 = 2_000;

/// Candle timeframes the engine maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M1, Timeframe::M5, Timeframe::M15];

    pub fn duration_ms(self) -> i64 {
        match self {
            Self::M1 => 60_000,
            Self::M5 => 300_000,
            Self::M15 => 900_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
        }
    }

    /// Finalized candles retained per ring. The 1m ring is deep enough to
    /// seed the slowest EMA intraday.
    fn capacity(self) -> usize {
        match self {
            Self::M1 => 240,
            Self::M5 => 60,
            Self::M15 => 60,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single OHLCV candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    /// Bucket start, epoch milliseconds (IST-aligned).
    pub open_ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oi_close: Option<u64>,
}

/// IST-aligned bucket start for a timestamp.
pub fn bucket_start(ts: i64, timeframe: Timeframe) -> i64 {
    let offset = IST_OFFSET_SECS as i64 * 1000;
    let tf = timeframe.duration_ms();
    (ts + offset).div_euclid(tf) * tf - offset
}

// =============================================================================
// Per-series builder
// =============================================================================

#[derive(Debug)]
struct SeriesBuilder {
    symbol: Symbol,
    timeframe: Timeframe,
    ring: VecDeque<Candle>,
    partial: Option<Candle>,
    last_ts: i64,
    dropped_late: u64,
}

impl SeriesBuilder {
    fn new(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self {
            symbol,
            timeframe,
            ring: VecDeque::with_capacity(timeframe.capacity() + 1),
            partial: None,
            last_ts: 0,
            dropped_late: 0,
        }
    }

    fn open_candle(&self, tick: &Tick, volume_delta: u64, bucket: i64) -> Candle {
        Candle {
            symbol: self.symbol,
            timeframe: self.timeframe,
            open_ts: bucket,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: volume_delta,
            oi_close: tick.oi,
        }
    }

    /// Apply one tick; returns the finalized candle when the tick crosses a
    /// bucket boundary.
    ///
    /// Out-of-order ticks inside the tolerance window are applied when they
    /// still belong to the current bucket; anything older is dropped.
    fn apply(&mut self, tick: &Tick, volume_delta: u64) -> Option<Candle> {
        if tick.ts + LATE_TOLERANCE_MS < self.last_ts {
            self.dropped_late += 1;
            return None;
        }
        self.last_ts = self.last_ts.max(tick.ts);

        let bucket = bucket_start(tick.ts, self.timeframe);

        let partial = match self.partial.as_mut() {
            None => {
                self.partial = Some(self.open_candle(tick, volume_delta, bucket));
                return None;
            }
            Some(p) => p,
        };

        if bucket == partial.open_ts {
            partial.high = partial.high.max(tick.price);
            partial.low = partial.low.min(tick.price);
            partial.close = tick.price;
            partial.volume += volume_delta;
            if tick.oi.is_some() {
                partial.oi_close = tick.oi;
            }
            return None;
        }

        if bucket < partial.open_ts {
            // In tolerance but on the wrong side of the boundary: the closed
            // bucket is immutable, so the tick is discarded.
            self.dropped_late += 1;
            return None;
        }

        // Boundary crossed: finalize the partial, open the next one.
        let finalized = self.partial.take().expect("partial checked above");
        self.ring.push_back(finalized.clone());
        while self.ring.len() > self.timeframe.capacity() {
            self.ring.pop_front();
        }
        self.partial = Some(self.open_candle(tick, volume_delta, bucket));
        Some(finalized)
    }

    fn closed(&self, count: usize) -> Vec<Candle> {
        let start = self.ring.len().saturating_sub(count);
        self.ring.iter().skip(start).cloned().collect()
    }
}

// =============================================================================
// CandleStore — shared facade over all series
// =============================================================================

/// Thread-safe candle store. The analysis engine is the sole writer; readers
/// copy out bounded windows so finalized candles can never be mutated through
/// a shared reference.
pub struct CandleStore {
    series: RwLock<HashMap<(Symbol, Timeframe), SeriesBuilder>>,
    /// Per-symbol cumulative-volume baseline for delta computation.
    volume_baseline: RwLock<HashMap<Symbol, u64>>,
}

impl Default for CandleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleStore {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            volume_baseline: RwLock::new(HashMap::new()),
        }
    }

    /// Positive diff of cumulative volume; a decrease re-baselines to zero.
    fn volume_delta(&self, tick: &Tick) -> u64 {
        let cum = match tick.cumulative_volume {
            Some(v) => v,
            None => return 0,
        };
        let mut baselines = self.volume_baseline.write();
        let delta = match baselines.get(&tick.symbol) {
            Some(&prev) if cum >= prev => cum - prev,
            // First observation or session reset upstream.
            _ => 0,
        };
        baselines.insert(tick.symbol, cum);
        delta
    }

    /// Feed one tick through every timeframe. Returns candles finalized by
    /// this tick (at most one per timeframe).
    pub fn apply_tick(&self, tick: &Tick) -> Vec<Candle> {
        let delta = self.volume_delta(tick);
        let mut finalized = Vec::new();
        let mut series = self.series.write();
        for tf in Timeframe::ALL {
            let builder = series
                .entry((tick.symbol, tf))
                .or_insert_with(|| SeriesBuilder::new(tick.symbol, tf));
            if let Some(candle) = builder.apply(tick, delta) {
                finalized.push(candle);
            }
        }
        finalized
    }

    /// Copy out the most recent `count` finalized candles (oldest first).
    pub fn closed(&self, symbol: Symbol, timeframe: Timeframe, count: usize) -> Vec<Candle> {
        self.series
            .read()
            .get(&(symbol, timeframe))
            .map(|b| b.closed(count))
            .unwrap_or_default()
    }

    /// Copy of the currently-forming candle, if any.
    pub fn partial(&self, symbol: Symbol, timeframe: Timeframe) -> Option<Candle> {
        self.series
            .read()
            .get(&(symbol, timeframe))
            .and_then(|b| b.partial.clone())
    }

    /// Finalized-candle count for a series.
    pub fn closed_count(&self, symbol: Symbol, timeframe: Timeframe) -> usize {
        self.series
            .read()
            .get(&(symbol, timeframe))
            .map(|b| b.ring.len())
            .unwrap_or(0)
    }

    /// Ticks dropped as too old across all series for a symbol.
    pub fn dropped_late(&self, symbol: Symbol) -> u64 {
        self.series
            .read()
            .iter()
            .filter(|((s, _), _)| *s == symbol)
            .map(|(_, b)| b.dropped_late)
            .sum()
    }

}

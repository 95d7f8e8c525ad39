// =============================================================================
// Analysis engine — the per-tick evaluation pipeline
// =============================================================================
//
// Consumes the tick bus, maintains the candle store, and on each trigger
// (candle close, or a 500ms-throttled tick) recomputes indicators → signals →
// outlook → market indices → decision for the ticking symbol. Results land in
// the cache (short TTL) and fan out through the hub.
//
// The engine owns all of its mutable working state (ORB freeze, OI history,
// throttle clocks); nothing here is reachable by another writer.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::cache;
use crate::decision::{self, Decision};
use crate::hub::Topic;
use crate::indicators::{orb, IndicatorInputs, IndicatorSnapshot, OrbRange};
use crate::market_data::Timeframe;
use crate::market_indices::MarketIndices;
use crate::signals::{self, Outlook, SignalContext};
use crate::types::{SessionState, Symbol, Tick};

/// Minimum spacing between partial-candle evaluations per symbol.
const EVAL_THROTTLE: Duration = Duration::from_millis(500);
/// OI observations retained per symbol (ts, oi), oldest first.
const OI_WINDOW: usize = 120;
/// OI observations older than this against the newest are dropped.
const OI_RETENTION_MS: i64 = 30 * 60 * 1000;

/// Cache TTLs per artifact kind.
fn snapshot_ttl(session: SessionState) -> Duration {
    if session == SessionState::MarketOpen {
        Duration::from_secs(5)
    } else {
        Duration::from_secs(60)
    }
}
const OUTLOOK_TTL: Duration = Duration::from_secs(60);
const DECISION_TTL: Duration = Duration::from_secs(60);

/// The per-symbol snapshot served by `/api/analysis/analyze` and pushed on
/// the `snapshot` topic.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSnapshot {
    pub symbol: Symbol,
    pub display_name: &'static str,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<f64>,
    /// False whenever the live feed cannot prove freshness; stale numbers are
    /// flagged, never silently served.
    pub is_live: bool,
    pub session: SessionState,
    pub indicators: IndicatorSnapshot,
    pub outlook_label: crate::signals::OutlookLabel,
    pub overall_confidence: f64,
    pub version_ts: i64,
}

pub struct AnalysisEngine {
    state: Arc<AppState>,
    orb: HashMap<Symbol, OrbRange>,
    oi_history: HashMap<Symbol, VecDeque<(i64, u64)>>,
    tick_pcr: HashMap<Symbol, f64>,
    last_price: HashMap<Symbol, f64>,
    last_eval: HashMap<Symbol, Instant>,
    /// Monotonic guard: version of the last published snapshot per symbol.
    published_ts: HashMap<Symbol, i64>,
}

impl AnalysisEngine {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            orb: HashMap::new(),
            oi_history: HashMap::new(),
            tick_pcr: HashMap::new(),
            last_price: HashMap::new(),
            last_eval: HashMap::new(),
            published_ts: HashMap::new(),
        }
    }

    /// Consume the bus until it closes. The receiver stays with the caller so
    /// a supervising restart can resume on the same queue.
    pub async fn run(mut self, ticks: &mut mpsc::Receiver<Tick>) {
        info!("analysis engine running");
        while let Some(tick) = ticks.recv().await {
            self.on_tick(&tick);
        }
        warn!("tick bus closed — analysis engine stopping");
    }

    /// Apply one tick: book-keeping, candle update, and (when due) a full
    /// evaluation.
    pub fn on_tick(&mut self, tick: &Tick) {
        let symbol = tick.symbol;
        self.last_price.insert(symbol, tick.price);
        self.absorb_day_fields(tick);
        self.absorb_oi(tick);
        if let Some(pcr) = tick.pcr {
            self.tick_pcr.insert(symbol, pcr);
        }

        let finalized = self.state.candles.apply_tick(tick);
        for candle in &finalized {
            debug!(symbol = %symbol, timeframe = %candle.timeframe, close = candle.close, "candle finalized");
        }

        // Fan the raw tick out ahead of the evaluation.
        if let Ok(data) = serde_json::to_value(tick) {
            self.state.hub.publish(Topic::Tick, symbol, data);
        }

        let due = finalized.iter().any(|c| c.timeframe == Timeframe::M1)
            || self
                .last_eval
                .get(&symbol)
                .map(|at| at.elapsed() >= EVAL_THROTTLE)
                .unwrap_or(true);
        if due {
            self.last_eval.insert(symbol, Instant::now());
            self.evaluate(symbol, tick.ts);
        }
    }

    /// Carry day-level tick fields into the shared day context.
    fn absorb_day_fields(&mut self, tick: &Tick) {
        let mut contexts = self.state.day_context.write();
        let ctx = contexts.entry(tick.symbol).or_default();
        if tick.day_open.is_some() {
            ctx.day_open = tick.day_open;
        }
        if tick.day_high.is_some() {
            ctx.day_high = tick.day_high;
        }
        if tick.day_low.is_some() {
            ctx.day_low = tick.day_low;
        }
        if tick.prev_close.is_some() {
            ctx.prev_close = tick.prev_close;
        }
    }

    fn absorb_oi(&mut self, tick: &Tick) {
        let Some(oi) = tick.oi else { return };
        let history = self.oi_history.entry(tick.symbol).or_default();
        history.push_back((tick.ts, oi));
        while history.len() > OI_WINDOW {
            history.pop_front();
        }
        let newest = tick.ts;
        while history
            .front()
            .map(|(ts, _)| newest - ts > OI_RETENTION_MS)
            .unwrap_or(false)
        {
            history.pop_front();
        }
    }

    /// Advance/decline counts across the universe from day opens.
    fn breadth_counts(&self) -> (usize, usize) {
        let contexts = self.state.day_context.read();
        let mut advances = 0;
        let mut declines = 0;
        for symbol in Symbol::ALL {
            let (Some(price), Some(open)) = (
                self.last_price.get(&symbol),
                contexts.get(&symbol).and_then(|c| c.day_open),
            ) else {
                continue;
            };
            if *price > open {
                advances += 1;
            } else if *price < open {
                declines += 1;
            }
        }
        (advances, declines)
    }

    /// Run one full evaluation for a symbol and publish everything.
    pub fn evaluate(&mut self, symbol: Symbol, version_ts: i64) {
        // Snapshots may never move backwards in time.
        if self
            .published_ts
            .get(&symbol)
            .map(|prev| version_ts < *prev)
            .unwrap_or(false)
        {
            return;
        }

        let candles_1m = self.state.candles.closed(symbol, Timeframe::M1, 240);
        let candles_5m = self.state.candles.closed(symbol, Timeframe::M5, 60);
        let candles_15m = self.state.candles.closed(symbol, Timeframe::M15, 60);
        let partial_5m = self.state.candles.partial(symbol, Timeframe::M5);
        let last_price = self.last_price.get(&symbol).copied().unwrap_or(0.0);

        // Freeze the opening range once the first 15 minutes have closed.
        if !self.orb.contains_key(&symbol) {
            if let Some(range) = orb::opening_range(&candles_1m) {
                info!(symbol = %symbol, high = range.high, low = range.low, "opening range frozen");
                self.orb.insert(symbol, range);
            }
        }

        let day = self
            .state
            .day_context
            .read()
            .get(&symbol)
            .cloned()
            .unwrap_or_default();
        let oi_history: Vec<(i64, u64)> = self
            .oi_history
            .get(&symbol)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();

        let indicators = IndicatorSnapshot::compute(&IndicatorInputs {
            candles_1m: &candles_1m,
            candles_5m: &candles_5m,
            candles_15m: &candles_15m,
            last_price,
            prev_day: day.prev_day,
            orb: self.orb.get(&symbol).copied(),
            oi_history: &oi_history,
        });

        let ctx = SignalContext {
            indicators: &indicators,
            candles_1m: &candles_1m,
            candles_5m: &candles_5m,
            partial_5m: partial_5m.as_ref(),
            last_price,
        };
        let outlook = Outlook::from_signals(symbol, signals::evaluate_all(&ctx), version_ts);

        let session = self.state.session_info().state;
        let (advances, declines) = self.breadth_counts();
        let pcr = self
            .state
            .chain_pcr
            .read()
            .get(&symbol)
            .copied()
            .or_else(|| self.tick_pcr.get(&symbol).copied());
        let price_change = ctx.price_change_pct(15).unwrap_or(0.0);
        let indices = MarketIndices::compose(
            pcr,
            price_change,
            indicators.oi_change_pct.get(),
            advances,
            declines,
            crate::indicators::atr::atr_pct(&candles_5m, 14),
            session,
        );

        let decision = decision::decide(&outlook, &indices, self.state.ingest.feed_usable());

        let snapshot = AnalysisSnapshot {
            symbol,
            display_name: symbol.display_name(),
            price: last_price,
            change_pct: day.prev_close.and_then(|pc| {
                (pc > 0.0).then(|| (last_price - pc) / pc * 100.0)
            }),
            day_open: day.day_open,
            day_high: day.day_high,
            day_low: day.day_low,
            prev_close: day.prev_close,
            is_live: self.state.ingest.is_live(),
            session,
            indicators,
            outlook_label: outlook.label,
            overall_confidence: outlook.overall_confidence,
            version_ts,
        };

        self.publish(symbol, snapshot, outlook, decision, &indices, session);
        self.published_ts.insert(symbol, version_ts);
    }

    fn publish(
        &self,
        symbol: Symbol,
        snapshot: AnalysisSnapshot,
        outlook: Outlook,
        decision: Decision,
        indices: &MarketIndices,
        session: SessionState,
    ) {
        let cache = self.state.cache.as_ref();

        if let Ok(data) = serde_json::to_value(&snapshot) {
            cache.set_with_ttl(&cache::key("snapshot", symbol), data.clone(), snapshot_ttl(session));
            self.state.hub.publish(Topic::Snapshot, symbol, data);
        }
        if let Ok(data) = serde_json::to_value(&outlook) {
            cache.set_with_ttl(&cache::key("outlook", symbol), data.clone(), OUTLOOK_TTL);
            self.state.hub.publish(Topic::Outlook, symbol, data);
        }
        if let Ok(data) = serde_json::to_value(&decision) {
            cache.set_with_ttl(&cache::key("decision", symbol), data.clone(), DECISION_TTL);
            self.state.hub.publish(Topic::Decision, symbol, data);
        }
        let oi_update = serde_json::json!({
            "oi_momentum": indices.oi_momentum,
            "oi_delta": snapshot.indicators.oi_delta,
            "oi_change_pct": snapshot.indicators.oi_change_pct,
        });
        self.state.hub.publish(Topic::OiMomentum, symbol, oi_update);

        self.state.last_analysis.write().insert(symbol, snapshot);
        self.state.last_outlook.write().insert(symbol, outlook);
        self.state.last_decision.write().insert(symbol, decision);
    }
}

// =============================================================================
// Background pollers owned by main
// =============================================================================

/// Refresh prior-day OHLC per symbol (startup, then hourly — the values only
/// change across sessions).
pub async fn day_context_poller(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        for symbol in Symbol::ALL {
            match state.broker.prev_day_ohlc(symbol).await {
                Ok(ohlc) => {
                    state.day_context.write().entry(symbol).or_default().prev_day = Some(ohlc);
                    debug!(symbol = %symbol, "prior-day OHLC refreshed");
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "prior-day OHLC fetch failed");
                    state.push_error(
                        format!("prev-day OHLC fetch failed for {symbol}: {e}"),
                        Some("PREV_DAY_FETCH".into()),
                    );
                }
            }
        }
    }
}

/// Refresh option-chain PCR per symbol every minute during trading hours.
pub async fn option_chain_poller(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if !state.session_info().state.expects_ticks() {
            continue;
        }
        for symbol in Symbol::ALL {
            let Some(snapshot) = state.last_analysis.read().get(&symbol).map(|s| s.price) else {
                continue;
            };
            match state.broker.option_chain(symbol, snapshot, 5).await {
                Ok(rows) => {
                    if let Some(pcr) = crate::broker::pcr_from_chain(&rows) {
                        state.chain_pcr.write().insert(symbol, pcr);
                        debug!(symbol = %symbol, pcr, "chain PCR refreshed");
                    }
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "option chain fetch failed");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_state;
    use crate::types::TickSource;

    fn tick(ts: i64, price: f64, cum_vol: u64, oi: u64) -> Tick {
        Tick {
            symbol: Symbol::Nifty,
            price,
            ts,
            last_traded_qty: Some(50),
            cumulative_volume: Some(cum_vol),
            oi: Some(oi),
            pcr: Some(1.2),
            day_open: Some(24_400.0),
            day_high: None,
            day_low: None,
            prev_close: Some(24_350.0),
            source: TickSource::Ws,
        }
    }

    // 2025-07-01 09:15:00 IST.
    const T0: i64 = 1_751_341_500_000;

    #[tokio::test]
    async fn rising_ticks_produce_bullish_artifacts() {
        let state = test_state(SessionState::MarketOpen).await;
        let mut engine = AnalysisEngine::new(state.clone());

        // 50 rising ticks 200ms apart, then cross the minute boundary.
        for i in 0..50 {
            engine.on_tick(&tick(
                T0 + i * 200,
                24_400.0 + i as f64 * 2.0,
                1_000 + i as u64 * 10,
                1_000_000 + i as u64 * 500,
            ));
        }
        engine.on_tick(&tick(T0 + 61_000, 24_510.0, 2_000, 1_030_000));

        assert_eq!(state.candles.closed_count(Symbol::Nifty, Timeframe::M1), 1);

        let analysis = state.last_analysis.read().get(&Symbol::Nifty).cloned().unwrap();
        assert!(analysis.price > 24_400.0);
        assert!(analysis.change_pct.unwrap() > 0.0);

        let outlook = state.last_outlook.read().get(&Symbol::Nifty).cloned().unwrap();
        assert_eq!(outlook.bullish + outlook.bearish + outlook.neutral, 14);

        let decision = state.last_decision.read().get(&Symbol::Nifty).cloned().unwrap();
        assert!((0.0..=100.0).contains(&decision.confidence));

        // Cached artifacts present.
        assert!(state.cache.get(&cache::key("snapshot", Symbol::Nifty)).is_some());
        assert!(state.cache.get(&cache::key("outlook", Symbol::Nifty)).is_some());
        assert!(state.cache.get(&cache::key("decision", Symbol::Nifty)).is_some());
    }

    #[tokio::test]
    async fn snapshots_never_move_backwards() {
        let state = test_state(SessionState::MarketOpen).await;
        let mut engine = AnalysisEngine::new(state.clone());

        engine.on_tick(&tick(T0 + 10_000, 24_500.0, 100, 1_000_000));
        engine.evaluate(Symbol::Nifty, T0 + 10_000);
        let v1 = state.last_analysis.read().get(&Symbol::Nifty).unwrap().version_ts;

        // An older evaluation request must be ignored.
        engine.evaluate(Symbol::Nifty, T0 + 5_000);
        let v2 = state.last_analysis.read().get(&Symbol::Nifty).unwrap().version_ts;
        assert_eq!(v1, v2);
        assert!(v2 >= v1);
    }

    #[tokio::test]
    async fn hub_receives_tick_and_snapshot_envelopes() {
        let state = test_state(SessionState::MarketOpen).await;
        let client = state.hub.register();
        let mut engine = AnalysisEngine::new(state.clone());

        for i in 0..5 {
            engine.on_tick(&tick(T0 + i * 700, 24_450.0 + i as f64, 100 + i as u64, 1_000_000));
        }

        let batch = client.try_drain();
        let ticks = batch
            .iter()
            .filter(|e| matches!(e.kind, crate::hub::EnvelopeKind::Tick))
            .count();
        let snapshots = batch
            .iter()
            .filter(|e| matches!(e.kind, crate::hub::EnvelopeKind::Snapshot))
            .count();
        assert_eq!(ticks, 5);
        assert!(snapshots >= 1);
    }

    #[tokio::test]
    async fn outside_market_open_decision_waits() {
        let state = test_state(SessionState::AfterHours).await;
        let mut engine = AnalysisEngine::new(state.clone());

        engine.on_tick(&tick(T0, 24_500.0, 100, 1_000_000));
        let decision = state.last_decision.read().get(&Symbol::Nifty).cloned().unwrap();
        assert_eq!(decision.action, crate::decision::DecisionAction::Wait);
        assert_eq!(decision.confidence, 50.0);
    }
}

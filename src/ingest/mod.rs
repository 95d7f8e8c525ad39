// =============================================================================
// Ingest supervisor — owns the upstream tick session
// =============================================================================
//
// One supervisor per broker identity. It is the single writer of ticks: the
// connection task pumps broker frames into a private queue, the supervisor
// normalizes ordering (stale ticks are dropped, never re-published) and
// forwards to the bus.
//
// State machine:
//
//   INIT → CONNECTING → SUBSCRIBED → HEALTHY
//     reconnectable failures detour through BACKOFF (exponential, jittered);
//     a stale watchdog forces HEALTHY → DEGRADED → CONNECTING;
//     three consecutive auth failures park the machine in TOKEN_EXPIRED until
//     a fresh token arrives; prolonged degradation during market hours turns
//     on the REST polling fallback (FALLBACK_REST) which yields the moment
//     live ticks resume.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::broker::BrokerAdapter;
use crate::bus::TickBus;
use crate::cache::{self, Cache};
use crate::types::{SessionState, Symbol, Tick, TickSource};

/// Consecutive auth failures before the machine parks itself.
const MAX_AUTH_FAILURES: u32 = 3;
/// Reconnect backoff bounds.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);
/// Staleness thresholds by session phase.
const STALE_MARKET_OPEN: Duration = Duration::from_secs(15);
const STALE_PRE_OPEN: Duration = Duration::from_secs(120);
/// Degradation budget before the REST fallback starts.
const FALLBACK_AFTER: Duration = Duration::from_secs(30);
/// REST fallback polling cadence.
const FALLBACK_POLL: Duration = Duration::from_secs(2);
/// Transport failures during first-ever connect before startup is declared
/// fatal.
const STARTUP_MAX_FAILURES: u32 = 5;

/// Supervisor states, exposed verbatim on diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestState {
    Init,
    Connecting,
    Subscribed,
    Healthy,
    Degraded,
    Backoff,
    TokenExpired,
    FallbackRest,
    Stopped,
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Connecting => "CONNECTING",
            Self::Subscribed => "SUBSCRIBED",
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Backoff => "BACKOFF",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::FallbackRest => "FALLBACK_REST",
            Self::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}

/// Commands accepted by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestCommand {
    Open,
    Close,
    ForceReconnect,
    TokenRefreshed,
}

/// Diagnostics snapshot of the supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct IngestHealth {
    pub state: IngestState,
    pub last_tick_age_ms: HashMap<Symbol, u64>,
    pub stale: bool,
    pub auth_failures: u32,
    pub reconnects: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct IngestSupervisor {
    broker: Arc<dyn BrokerAdapter>,
    bus: Arc<TickBus>,
    cache: Arc<dyn Cache>,
    symbols: Vec<Symbol>,
    session: Arc<RwLock<SessionState>>,

    state: RwLock<IngestState>,
    /// Wall-clock receive instant of the last live (WS) tick per symbol.
    last_ws_tick: RwLock<HashMap<Symbol, Instant>>,
    /// Exchange timestamp high-watermark per symbol; older ticks are dropped.
    ts_watermark: RwLock<HashMap<Symbol, i64>>,
    auth_failures: AtomicU32,
    reconnects: AtomicU64,
    /// Bumped to cancel an in-flight connection task.
    generation: AtomicU64,
    desired_open: AtomicBool,
    stale_flagged: AtomicBool,
    degraded_since: RwLock<Option<Instant>>,
    last_error: RwLock<Option<String>>,
    startup_connected: AtomicBool,
    startup_failures: AtomicU32,
    fatal_startup: AtomicBool,

    commands: mpsc::UnboundedSender<IngestCommand>,
}

impl IngestSupervisor {
    /// Build the supervisor and its command receiver. Call [`Self::run`] on a
    /// task with the receiver to start the control loop.
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        bus: Arc<TickBus>,
        cache: Arc<dyn Cache>,
        symbols: Vec<Symbol>,
        session: Arc<RwLock<SessionState>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<IngestCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sup = Arc::new(Self {
            broker,
            bus,
            cache,
            symbols,
            session,
            state: RwLock::new(IngestState::Init),
            last_ws_tick: RwLock::new(HashMap::new()),
            ts_watermark: RwLock::new(HashMap::new()),
            auth_failures: AtomicU32::new(0),
            reconnects: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            desired_open: AtomicBool::new(false),
            stale_flagged: AtomicBool::new(false),
            degraded_since: RwLock::new(None),
            last_error: RwLock::new(None),
            startup_connected: AtomicBool::new(false),
            startup_failures: AtomicU32::new(0),
            fatal_startup: AtomicBool::new(false),
            commands: tx,
        });
        (sup, rx)
    }

    // ── Public surface ──────────────────────────────────────────────────

    pub fn send(&self, command: IngestCommand) {
        let _ = self.commands.send(command);
    }

    pub fn state(&self) -> IngestState {
        *self.state.read()
    }

    /// True while the live stream is proving itself with fresh ticks.
    pub fn is_live(&self) -> bool {
        self.state() == IngestState::Healthy && !self.stale_flagged.load(Ordering::Relaxed)
    }

    /// False only when the session is unusable for decisions (token parked).
    pub fn feed_usable(&self) -> bool {
        self.state() != IngestState::TokenExpired
    }

    /// True when repeated transport failures before the first successful
    /// connect make startup hopeless.
    pub fn startup_failed(&self) -> bool {
        self.fatal_startup.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> IngestHealth {
        let now = Instant::now();
        let ages = self
            .last_ws_tick
            .read()
            .iter()
            .map(|(sym, at)| (*sym, now.duration_since(*at).as_millis() as u64))
            .collect();
        IngestHealth {
            state: self.state(),
            last_tick_age_ms: ages,
            stale: self.stale_flagged.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
        }
    }

    // ── Control loop ────────────────────────────────────────────────────

    /// Drive commands and the watchdog until the command channel closes.
    pub async fn run(
        self: Arc<Self>,
        mut commands: mpsc::UnboundedReceiver<IngestCommand>,
    ) {
        let mut conn_task: Option<JoinHandle<()>> = None;
        let mut fallback_task: Option<JoinHandle<()>> = None;
        let mut watchdog = tokio::time::interval(Duration::from_secs(2));
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        IngestCommand::Open => {
                            if !self.desired_open.swap(true, Ordering::SeqCst) {
                                info!("ingest opening");
                                self.spawn_connection(&mut conn_task);
                            }
                        }
                        IngestCommand::Close => {
                            if self.desired_open.swap(false, Ordering::SeqCst) {
                                info!("ingest closing");
                                self.stop_tasks(&mut conn_task, &mut fallback_task);
                                *self.state.write() = IngestState::Stopped;
                            }
                        }
                        IngestCommand::ForceReconnect => {
                            self.force_reconnect(&mut conn_task, &mut fallback_task);
                        }
                        IngestCommand::TokenRefreshed => {
                            self.auth_failures.store(0, Ordering::SeqCst);
                            if self.desired_open.load(Ordering::SeqCst) {
                                info!("token refreshed — reconnecting");
                                self.restart_connection(&mut conn_task);
                            }
                        }
                    }
                }
                _ = watchdog.tick() => {
                    self.watchdog_check(&mut conn_task, &mut fallback_task);
                }
            }
        }

        self.stop_tasks(&mut conn_task, &mut fallback_task);
    }

    fn stop_tasks(
        &self,
        conn: &mut Option<JoinHandle<()>>,
        fallback: &mut Option<JoinHandle<()>>,
    ) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = conn.take() {
            task.abort();
        }
        if let Some(task) = fallback.take() {
            task.abort();
        }
    }

    fn spawn_connection(self: &Arc<Self>, conn: &mut Option<JoinHandle<()>>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = conn.take() {
            old.abort();
        }
        let sup = self.clone();
        *conn = Some(tokio::spawn(async move {
            sup.connection_loop(generation).await;
        }));
    }

    fn restart_connection(self: &Arc<Self>, conn: &mut Option<JoinHandle<()>>) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        self.spawn_connection(conn);
    }

    /// Admin reset: purge caches *before* the new session may publish, clear
    /// tick memory, reset the watchdog, reconnect.
    fn force_reconnect(
        self: &Arc<Self>,
        conn: &mut Option<JoinHandle<()>>,
        fallback: &mut Option<JoinHandle<()>>,
    ) {
        warn!("force-reconnect requested");
        for symbol in &self.symbols {
            cache::purge_symbol(self.cache.as_ref(), *symbol);
        }
        self.last_ws_tick.write().clear();
        self.ts_watermark.write().clear();
        self.stale_flagged.store(false, Ordering::SeqCst);
        *self.degraded_since.write() = None;
        if let Some(task) = fallback.take() {
            task.abort();
        }
        if self.desired_open.load(Ordering::SeqCst) {
            self.restart_connection(conn);
        }
    }

    // ── Watchdog & fallback ─────────────────────────────────────────────

    fn stale_threshold(&self) -> Option<Duration> {
        match *self.session.read() {
            SessionState::MarketOpen => Some(STALE_MARKET_OPEN),
            SessionState::PreOpen => Some(STALE_PRE_OPEN),
            _ => None,
        }
    }

    fn watchdog_check(
        self: &Arc<Self>,
        conn: &mut Option<JoinHandle<()>>,
        fallback: &mut Option<JoinHandle<()>>,
    ) {
        if !self.desired_open.load(Ordering::SeqCst) {
            return;
        }
        let state = self.state();
        if matches!(state, IngestState::TokenExpired | IngestState::Stopped) {
            return;
        }
        let Some(threshold) = self.stale_threshold() else {
            return;
        };

        let now = Instant::now();
        let stale = {
            let ticks = self.last_ws_tick.read();
            if ticks.is_empty() {
                // Nothing received yet this session; the connection loop's
                // own backoff covers that case.
                false
            } else {
                ticks
                    .values()
                    .any(|at| now.duration_since(*at) > threshold)
            }
        };

        if stale {
            // Fire once per staleness episode.
            if !self.stale_flagged.swap(true, Ordering::SeqCst) {
                warn!("watchdog: feed stale — forcing reconnect");
                *self.state.write() = IngestState::Degraded;
                *self.degraded_since.write() = Some(now);
                self.restart_connection(conn);
            }
        }

        // Prolonged degradation during market hours: turn on REST polling.
        let degraded_long = self
            .degraded_since
            .read()
            .map(|t| now.duration_since(t) > FALLBACK_AFTER)
            .unwrap_or(false);
        let in_market = *self.session.read() == SessionState::MarketOpen;
        let fallback_running = fallback.as_ref().map(|t| !t.is_finished()).unwrap_or(false);

        if degraded_long && in_market && !fallback_running && self.state() != IngestState::Healthy
        {
            info!("starting REST polling fallback");
            *self.state.write() = IngestState::FallbackRest;
            let sup = self.clone();
            *fallback = Some(tokio::spawn(async move {
                sup.fallback_loop().await;
            }));
        }

        // Live ticks resumed: retire the fallback.
        if !stale && fallback_running && self.state() == IngestState::Healthy {
            info!("live ticks resumed — stopping REST fallback");
            if let Some(task) = fallback.take() {
                task.abort();
            }
        }
    }

    async fn fallback_loop(self: Arc<Self>) {
        let mut poll = tokio::time::interval(FALLBACK_POLL);
        loop {
            poll.tick().await;
            // Yield immediately once the WS feed is back.
            if self.state() == IngestState::Healthy {
                return;
            }
            for symbol in &self.symbols {
                match self.broker.quote(*symbol).await {
                    Ok(snapshot) => {
                        let tick = snapshot.into_tick();
                        self.forward(tick).await;
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "fallback quote failed");
                        *self.last_error.write() = Some(e.to_string());
                    }
                }
            }
        }
    }

    // ── Connection loop ─────────────────────────────────────────────────

    fn generation_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn connection_loop(self: Arc<Self>, generation: u64) {
        let mut backoff = BACKOFF_BASE;

        while self.generation_current(generation) && self.desired_open.load(Ordering::SeqCst) {
            *self.state.write() = IngestState::Connecting;

            let (tx, mut rx) = mpsc::channel::<Tick>(1024);
            let broker = self.broker.clone();
            let symbols = self.symbols.clone();
            let mut stream =
                Box::pin(async move { broker.stream_ticks(&symbols, tx).await });

            *self.state.write() = IngestState::Subscribed;
            let mut received_any = false;

            let result = loop {
                tokio::select! {
                    tick = rx.recv() => match tick {
                        Some(tick) => {
                            received_any = true;
                            self.note_live_tick();
                            self.forward(tick).await;
                        }
                        // Sender dropped: the stream future is about to
                        // resolve; await its verdict.
                        None => break stream.await,
                    },
                    res = &mut stream => {
                        // Drain anything already queued before judging.
                        while let Ok(tick) = rx.try_recv() {
                            self.note_live_tick();
                            self.forward(tick).await;
                        }
                        break res;
                    }
                }
            };

            if !self.generation_current(generation) {
                return;
            }

            match result {
                Err(e) if e.is_auth() => {
                    let failures = self.auth_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    *self.last_error.write() = Some(e.to_string());
                    error!(failures, error = %e, "auth failure on tick stream");
                    if failures >= MAX_AUTH_FAILURES {
                        *self.state.write() = IngestState::TokenExpired;
                        return;
                    }
                }
                Err(e) => {
                    *self.last_error.write() = Some(e.to_string());
                    warn!(error = %e, "tick stream ended with error");
                    if !self.startup_connected.load(Ordering::SeqCst) {
                        let n = self.startup_failures.fetch_add(1, Ordering::SeqCst) + 1;
                        if n >= STARTUP_MAX_FAILURES {
                            error!("startup: upstream unreachable after bounded retries");
                            self.fatal_startup.store(true, Ordering::SeqCst);
                        }
                    }
                }
                Ok(()) => {
                    warn!("tick stream ended cleanly — reconnecting");
                }
            }

            if received_any {
                self.startup_connected.store(true, Ordering::SeqCst);
                backoff = BACKOFF_BASE;
            }

            *self.state.write() = IngestState::Degraded;
            if self.degraded_since.read().is_none() {
                *self.degraded_since.write() = Some(Instant::now());
            }

            *self.state.write() = IngestState::Backoff;
            tokio::time::sleep(jitter(backoff)).await;
            backoff = (backoff * 2).min(BACKOFF_CAP);
        }
    }

    fn note_live_tick(&self) {
        self.auth_failures.store(0, Ordering::SeqCst);
        self.stale_flagged.store(false, Ordering::SeqCst);
        *self.degraded_since.write() = None;
        if self.state() != IngestState::Healthy {
            *self.state.write() = IngestState::Healthy;
        }
    }

    /// Normalize and publish: per-symbol timestamps may never move backwards
    /// on the bus.
    async fn forward(&self, tick: Tick) {
        {
            let mut watermarks = self.ts_watermark.write();
            let mark = watermarks.entry(tick.symbol).or_insert(i64::MIN);
            if tick.ts < *mark {
                return;
            }
            *mark = tick.ts;
        }
        if tick.source == TickSource::Ws {
            self.last_ws_tick.write().insert(tick.symbol, Instant::now());
        }
        if !self.bus.publish(tick).await {
            warn!("tick bus closed — dropping tick");
        }
    }
}

/// Backoff with ±20% jitter.
fn jitter(base: Duration) -> Duration {
    let millis = base.as_millis() as f64;
    let factor = rand::rng().random_range(0.8..1.2);
    Duration::from_millis((millis * factor) as u64)
}

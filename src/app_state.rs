// =============================================================================
// Central application state — TradePulse engine
// =============================================================================
//
// The wiring hub for the long-lived components. Each subsystem owns its own
// working state; AppState holds the shared read surface the REST/WS gateway
// serves from (last published artifacts, session info, error ring) plus Arc
// handles to the components themselves.
//
// Thread safety: parking_lot::RwLock around every shared collection, atomics
// where a counter suffices.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::broker::BrokerAdapter;
use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::decision::Decision;
use crate::engine::AnalysisSnapshot;
use crate::hub::FanoutHub;
use crate::ingest::IngestSupervisor;
use crate::market_data::CandleStore;
use crate::session::SessionInfo;
use crate::signals::Outlook;
use crate::types::{DayOhlc, SessionState, Symbol};

/// Retained error-ring depth.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded component error for the diagnostics surface.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Per-symbol daily context assembled from broker reads and tick carries.
#[derive(Debug, Clone, Default)]
pub struct DayContext {
    pub prev_day: Option<DayOhlc>,
    pub day_open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub prev_close: Option<f64>,
}

pub struct AppState {
    /// Unique id for this process instance, surfaced on diagnostics so
    /// dashboards can detect restarts.
    pub instance_id: String,
    pub config: EngineConfig,
    pub cache: Arc<dyn Cache>,
    pub hub: Arc<FanoutHub>,
    pub candles: Arc<CandleStore>,
    pub broker: Arc<dyn BrokerAdapter>,
    pub ingest: Arc<IngestSupervisor>,

    /// Full session snapshot maintained by the scheduler task.
    pub session: RwLock<SessionInfo>,
    /// Lightweight session state shared with the ingest watchdog.
    pub session_state: Arc<RwLock<SessionState>>,

    /// Day context per symbol (prior-day OHLC for pivots, day OHLC carries).
    pub day_context: RwLock<HashMap<Symbol, DayContext>>,
    /// Latest option-chain PCR per symbol.
    pub chain_pcr: RwLock<HashMap<Symbol, f64>>,

    /// Last published artifacts, served cache-first by the gateway.
    pub last_analysis: RwLock<HashMap<Symbol, AnalysisSnapshot>>,
    pub last_outlook: RwLock<HashMap<Symbol, Outlook>>,
    pub last_decision: RwLock<HashMap<Symbol, Decision>>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    pub start_time: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        cache: Arc<dyn Cache>,
        hub: Arc<FanoutHub>,
        candles: Arc<CandleStore>,
        broker: Arc<dyn BrokerAdapter>,
        ingest: Arc<IngestSupervisor>,
        session: SessionInfo,
        session_state: Arc<RwLock<SessionState>>,
    ) -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            config,
            cache,
            hub,
            candles,
            broker,
            ingest,
            session: RwLock::new(session),
            session_state,
            day_context: RwLock::new(HashMap::new()),
            chain_pcr: RwLock::new(HashMap::new()),
            last_analysis: RwLock::new(HashMap::new()),
            last_outlook: RwLock::new(HashMap::new()),
            last_decision: RwLock::new(HashMap::new()),
            recent_errors: RwLock::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    pub fn push_error(&self, message: impl Into<String>, code: Option<String>) {
        let record = ErrorRecord {
            message: message.into(),
            code,
            at: Utc::now().to_rfc3339(),
        };
        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Update the session snapshot; the scheduler task is the only caller.
    pub fn set_session(&self, info: SessionInfo) {
        *self.session_state.write() = info.state;
        *self.session.write() = info;
    }

    pub fn session_info(&self) -> SessionInfo {
        *self.session.read()
    }
}

// =============================================================================
// Shared test fixtures
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::app_state::AppState;
use crate::broker::{BrokerAdapter, BrokerError, BrokerResult, OptionChainRow, QuoteSnapshot};
use crate::bus::TickBus;
use crate::cache::InMemoryCache;
use crate::config::EngineConfig;
use crate::hub::FanoutHub;
use crate::ingest::IngestSupervisor;
use crate::market_data::CandleStore;
use crate::session::SessionInfo;
use crate::types::{DayOhlc, SessionState, Symbol, Tick};

/// A broker that answers nothing; tests drive the pipeline directly.
pub struct NullBroker;

#[async_trait]
impl BrokerAdapter for NullBroker {
    async fn stream_ticks(
        &self,
        _symbols: &[Symbol],
        _sink: mpsc::Sender<Tick>,
    ) -> BrokerResult<()> {
        Err(BrokerError::Transport("no upstream in tests".into()))
    }

    async fn quote(&self, _symbol: Symbol) -> BrokerResult<QuoteSnapshot> {
        Err(BrokerError::Transport("no upstream in tests".into()))
    }

    async fn prev_day_ohlc(&self, _symbol: Symbol) -> BrokerResult<DayOhlc> {
        Err(BrokerError::Transport("no upstream in tests".into()))
    }

    async fn option_chain(
        &self,
        _symbol: Symbol,
        _around: f64,
        _depth: usize,
    ) -> BrokerResult<Vec<OptionChainRow>> {
        Err(BrokerError::Transport("no upstream in tests".into()))
    }

    fn set_access_token(&self, _token: String) {}

    fn login_url(&self) -> String {
        "stub://login".into()
    }

    async fn exchange_request_token(&self, _request_token: &str) -> BrokerResult<String> {
        Ok("test-access-token".into())
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        host: "127.0.0.1".into(),
        port: 0,
        broker_api_key: "test-key".into(),
        broker_api_secret: "test-secret".into(),
        broker_access_token: "test-token".into(),
        enable_scheduler: true,
        cache_url: None,
        admin_token: "test-admin".into(),
        holiday_file: None,
    }
}

/// A fully wired AppState with a null broker and an idle ingest supervisor.
pub async fn test_state(session: SessionState) -> Arc<AppState> {
    let cache = Arc::new(InMemoryCache::new());
    let hub = Arc::new(FanoutHub::new());
    let candles = Arc::new(CandleStore::new());
    let broker: Arc<dyn BrokerAdapter> = Arc::new(NullBroker);

    let (bus, _engine_rx) = TickBus::new();
    let session_state = Arc::new(RwLock::new(session));
    let (ingest, _commands) = IngestSupervisor::new(
        broker.clone(),
        Arc::new(bus),
        cache.clone(),
        Symbol::ALL.to_vec(),
        session_state.clone(),
    );

    let info = SessionInfo {
        state: session,
        last_transition_ts: 0,
        next_transition_ts: 0,
    };

    Arc::new(AppState::new(
        test_config(),
        cache,
        hub,
        candles,
        broker,
        ingest,
        info,
        session_state,
    ))
}

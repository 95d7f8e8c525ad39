// =============================================================================
// TradePulse — Main Entry Point
// =============================================================================
//
// Real-time market intelligence for Indian index derivatives. The process
// wires the long-lived tasks together and then supervises: scheduler drives
// ingest, ingest feeds the tick bus, the analysis engine turns ticks into
// signals and decisions, and the gateway serves dashboards over REST/WS.
//
// Exit codes: 0 normal shutdown, 1 configuration error, 2 unrecoverable
// ingest failure during startup.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod broker;
mod bus;
mod cache;
mod config;
mod decision;
mod engine;
mod hub;
mod indicators;
mod ingest;
mod market_data;
mod market_indices;
mod session;
mod signals;
#[cfg(test)]
mod testing;
mod types;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::broker::{BrokerAdapter, KiteBroker};
use crate::bus::TickBus;
use crate::cache::InMemoryCache;
use crate::config::EngineConfig;
use crate::engine::AnalysisEngine;
use crate::hub::FanoutHub;
use crate::ingest::{IngestCommand, IngestSupervisor};
use crate::market_data::CandleStore;
use crate::session::{ist_now, HolidayTable, Scheduler};
use crate::types::{SessionState, Symbol};

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("TradePulse starting up");

    // ── 1. Configuration (fatal on error: exit 1) ────────────────────────
    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };
    let holidays = match HolidayTable::load_or_default(config.holiday_file.as_deref()) {
        Ok(table) => table,
        Err(e) => {
            error!(error = %e, "holiday table error");
            std::process::exit(1);
        }
    };
    if let Some(url) = &config.cache_url {
        warn!(url = %url, "CACHE_URL set but this build ships the in-memory backend only");
    }
    if !config.enable_scheduler {
        warn!("scheduler disabled — session pinned to MARKET_OPEN (dev mode)");
    }

    // ── 2. Shared components ─────────────────────────────────────────────
    let cache = Arc::new(InMemoryCache::new());
    let hub = Arc::new(FanoutHub::new());
    let candles = Arc::new(CandleStore::new());
    let broker: Arc<dyn BrokerAdapter> = Arc::new(KiteBroker::new(
        config.broker_api_key.clone(),
        config.broker_api_secret.clone(),
        config.broker_access_token.clone(),
    ));

    let (bus, engine_rx) = TickBus::new();
    let bus = Arc::new(bus);

    let mut scheduler = Scheduler::new(holidays, !config.enable_scheduler);
    let (initial_session, initial_command) = scheduler.tick(ist_now());
    let session_state: Arc<RwLock<SessionState>> = Arc::new(RwLock::new(initial_session.state));

    let (ingest, ingest_commands) = IngestSupervisor::new(
        broker.clone(),
        bus.clone(),
        cache.clone(),
        Symbol::ALL.to_vec(),
        session_state.clone(),
    );

    let state = Arc::new(AppState::new(
        config,
        cache,
        hub,
        candles,
        broker,
        ingest.clone(),
        initial_session,
        session_state,
    ));

    // ── 3. Ingest supervisor ─────────────────────────────────────────────
    tokio::spawn(ingest.clone().run(ingest_commands));
    ingest.send(match initial_command {
        session::FeedCommand::Open => IngestCommand::Open,
        _ => IngestCommand::Close,
    });

    // ── 4. Scheduler loop (60s tick) ─────────────────────────────────────
    {
        let state = state.clone();
        let ingest = ingest.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            // First firing is immediate; the initial command was already sent.
            interval.tick().await;
            loop {
                interval.tick().await;
                let (info, command) = scheduler.tick(ist_now());
                state.set_session(info);
                match command {
                    session::FeedCommand::Open => {
                        info!(session = %info.state, "scheduler: opening feed");
                        ingest.send(IngestCommand::Open);
                    }
                    session::FeedCommand::Close => {
                        info!(session = %info.state, "scheduler: closing feed");
                        ingest.send(IngestCommand::Close);
                    }
                    session::FeedCommand::Noop => {}
                }
            }
        });
    }

    // ── 5. Analysis engine (supervised: a panic restarts the task) ───────
    {
        let state = state.clone();
        tokio::spawn(async move {
            use futures_util::FutureExt;
            let mut engine_rx = engine_rx;
            loop {
                let engine = AnalysisEngine::new(state.clone());
                let run = std::panic::AssertUnwindSafe(engine.run(&mut engine_rx));
                match run.catch_unwind().await {
                    Ok(()) => break, // bus closed, orderly stop
                    Err(_) => {
                        error!("analysis engine panicked — restarting");
                        state.push_error(
                            "analysis engine panicked and was restarted",
                            Some("ENGINE_PANIC".into()),
                        );
                    }
                }
            }
        });
    }

    // ── 6. Background pollers ────────────────────────────────────────────
    tokio::spawn(engine::day_context_poller(state.clone()));
    tokio::spawn(engine::option_chain_poller(state.clone()));

    // ── 7. Hub heartbeats (5s) ───────────────────────────────────────────
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                state.hub.heartbeat_round(state.ingest.is_live());
            }
        });
    }

    // ── 8. Diagnostics tick sampler ──────────────────────────────────────
    {
        let mut observer = bus.observe();
        tokio::spawn(async move {
            let mut count: u64 = 0;
            let mut window = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    tick = observer.recv() => match tick {
                        Ok(_) => count += 1,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            count += n;
                        }
                        Err(_) => break,
                    },
                    _ = window.tick() => {
                        if count > 0 {
                            info!(ticks_per_min = count, "tick throughput");
                        }
                        count = 0;
                    }
                }
            }
        });
    }

    // ── 9. Gateway ───────────────────────────────────────────────────────
    let bind_addr = state.config.bind_addr();
    let app = api::rest::router(state.clone());
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %bind_addr, error = %e, "failed to bind gateway");
            std::process::exit(1);
        }
    };
    info!(addr = %bind_addr, "gateway listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "gateway server failed");
        }
    });

    // ── 10. Startup failure monitor (exit 2) ─────────────────────────────
    {
        let ingest = ingest.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                if ingest.startup_failed() {
                    error!("ingest could not reach the broker during startup — exiting");
                    std::process::exit(2);
                }
            }
        });
    }

    info!("all subsystems running");

    // ── 11. Graceful shutdown ────────────────────────────────────────────
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("shutdown signal received — stopping"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }
    ingest.send(IngestCommand::Close);
    info!("TradePulse shut down complete");
}

// =============================================================================
// Broker adapter — the narrow seam between the engine and the upstream broker
// =============================================================================
//
// The engine never talks to the broker directly; everything flows through
// this trait so tests can substitute a scripted stub and the ingest
// supervisor can treat auth failures differently from transport failures.
// =============================================================================

pub mod kite;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{DayOhlc, Symbol, Tick, TickSource};

pub use kite::KiteBroker;

/// Broker-facing failures, split by how the supervisor must react.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Credentials rejected. Retrying without a fresh token is pointless.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Connection-level failure; retry with backoff.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The broker answered but refused the request.
    #[error("broker api error: {0}")]
    Api(String),

    /// The upstream closed the stream without an error frame.
    #[error("stream closed by upstream")]
    StreamClosed,
}

impl BrokerError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map_or(false, |s| s.as_u16() == 401 || s.as_u16() == 403) {
            Self::Auth(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// One REST quote observation, convertible into a synthetic tick for the
/// polling fallback.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteSnapshot {
    pub symbol: Symbol,
    pub price: f64,
    /// Epoch millis.
    pub ts: i64,
    pub cumulative_volume: Option<u64>,
    pub oi: Option<u64>,
    pub day_open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub prev_close: Option<f64>,
}

impl QuoteSnapshot {
    /// Synthetic tick marked `source=rest` for the fallback path.
    pub fn into_tick(self) -> Tick {
        Tick {
            symbol: self.symbol,
            price: self.price,
            ts: self.ts,
            last_traded_qty: None,
            cumulative_volume: self.cumulative_volume,
            oi: self.oi,
            pcr: None,
            day_open: self.day_open,
            day_high: self.day_high,
            day_low: self.day_low,
            prev_close: self.prev_close,
            source: TickSource::Rest,
        }
    }
}

/// One strike row of an option chain read.
#[derive(Debug, Clone, Serialize)]
pub struct OptionChainRow {
    pub strike: f64,
    pub call_oi: u64,
    pub put_oi: u64,
    pub call_volume: u64,
    pub put_volume: u64,
}

/// Put/call ratio over a chain window: Σ put OI / Σ call OI.
pub fn pcr_from_chain(rows: &[OptionChainRow]) -> Option<f64> {
    let call_oi: u64 = rows.iter().map(|r| r.call_oi).sum();
    let put_oi: u64 = rows.iter().map(|r| r.put_oi).sum();
    if call_oi == 0 {
        return None;
    }
    Some(put_oi as f64 / call_oi as f64)
}

/// Everything the core needs from a broker. Implementations must be cheap to
/// clone behind an `Arc`.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Connect the live tick stream for `symbols` and pump normalized ticks
    /// into `sink` until the stream ends or fails. The caller owns
    /// reconnection policy; this method simply runs one session.
    async fn stream_ticks(
        &self,
        symbols: &[Symbol],
        sink: mpsc::Sender<Tick>,
    ) -> BrokerResult<()>;

    /// One REST snapshot for the polling fallback and day-context reads.
    async fn quote(&self, symbol: Symbol) -> BrokerResult<QuoteSnapshot>;

    /// Prior trading day's OHLC for pivot levels.
    async fn prev_day_ohlc(&self, symbol: Symbol) -> BrokerResult<DayOhlc>;

    /// Option-chain window centered on `around_strike`, `depth` strikes each
    /// side on the symbol's strike grid.
    async fn option_chain(
        &self,
        symbol: Symbol,
        around_strike: f64,
        depth: usize,
    ) -> BrokerResult<Vec<OptionChainRow>>;

    /// Rotate the access token after a re-auth.
    fn set_access_token(&self, token: String);

    /// Where the operator completes the interactive login.
    fn login_url(&self) -> String;

    /// Exchange a login redirect's request token for an access token.
    async fn exchange_request_token(&self, request_token: &str) -> BrokerResult<String>;
}

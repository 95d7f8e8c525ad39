// =============================================================================
// Shared types used across the TradePulse engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// The fixed universe of tracked index derivatives.
///
/// Each symbol carries its broker instrument token, a display name, and the
/// strike grid spacing used for option-chain reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Symbol {
    Nifty,
    BankNifty,
    Sensex,
}

impl Symbol {
    /// Every tracked symbol, in canonical order.
    pub const ALL: [Symbol; 3] = [Symbol::Nifty, Symbol::BankNifty, Symbol::Sensex];

    /// Broker instrument token for the index spot feed.
    pub fn instrument_token(self) -> u32 {
        match self {
            Self::Nifty => 256_265,
            Self::BankNifty => 260_105,
            Self::Sensex => 265,
        }
    }

    /// Human-readable exchange name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Nifty => "NIFTY 50",
            Self::BankNifty => "NIFTY BANK",
            Self::Sensex => "SENSEX",
        }
    }

    /// Strike grid spacing for option-chain reads.
    pub fn strike_step(self) -> f64 {
        match self {
            Self::Nifty => 50.0,
            Self::BankNifty => 100.0,
            Self::Sensex => 100.0,
        }
    }

    /// Canonical API identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nifty => "NIFTY",
            Self::BankNifty => "BANKNIFTY",
            Self::Sensex => "SENSEX",
        }
    }

    /// Case-insensitive parse of an API symbol parameter.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "NIFTY" => Some(Self::Nifty),
            "BANKNIFTY" => Some(Self::BankNifty),
            "SENSEX" => Some(Self::Sensex),
            _ => None,
        }
    }

    /// Reverse lookup from a broker instrument token.
    pub fn from_instrument_token(token: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.instrument_token() == token)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction tag attached to every signal and outlook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Neutral,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Where a tick came from: the live WebSocket feed or the REST polling
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickSource {
    Ws,
    Rest,
}

/// A single normalized market tick.
///
/// Not every field is present on every upstream frame; the candle builder
/// carries forward last-seen values. Ticks are idempotent on `(symbol, ts)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub price: f64,
    /// Exchange timestamp, epoch milliseconds (IST wall clock).
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_traded_qty: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_volume: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<f64>,
    pub source: TickSource,
}

/// Session phase of the Indian cash/derivatives market, derived from the IST
/// wall clock and the holiday table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    PreOpen,
    MarketOpen,
    AfterHours,
    Closed,
    Holiday,
}

impl SessionState {
    /// Whether the upstream feed is expected to deliver ticks in this phase.
    pub fn expects_ticks(self) -> bool {
        matches!(self, Self::PreOpen | Self::MarketOpen)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PreOpen => "PRE_OPEN",
            Self::MarketOpen => "MARKET_OPEN",
            Self::AfterHours => "AFTER_HOURS",
            Self::Closed => "CLOSED",
            Self::Holiday => "HOLIDAY",
        };
        write!(f, "{s}")
    }
}

/// Prior-day OHLC used for pivot and Camarilla levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DayOhlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

// =============================================================================
// Kite-style broker client — REST quotes, historical OHLC, option chain,
// and the binary tick WebSocket
// =============================================================================
//
// REST requests authenticate with `Authorization: token api_key:access_token`
// and carry a 5 second timeout. The tick feed is the broker's binary
// protocol: each WebSocket binary frame packs a u16 packet count followed by
// length-prefixed packets of big-endian i32 fields; prices are paise
// (divide by 100). Index instruments use the short 28/32-byte layout, quoted
// derivatives the 44/184-byte layout carrying volume and OI.
// =============================================================================

use chrono::Duration as ChronoDuration;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use async_trait::async_trait;

use crate::broker::{BrokerAdapter, BrokerError, BrokerResult, OptionChainRow, QuoteSnapshot};
use crate::session::ist_now;
use crate::types::{DayOhlc, Symbol, Tick, TickSource};

const API_BASE: &str = "https://api.kite.trade";
const WS_BASE: &str = "wss://ws.kite.trade";
const LOGIN_BASE: &str = "https://kite.zerodha.com/connect/login";

/// Outbound broker calls time out after this long.
const HTTP_TIMEOUT_SECS: u64 = 5;

pub struct KiteBroker {
    api_key: String,
    api_secret: String,
    access_token: RwLock<String>,
    http: reqwest::Client,
    api_base: String,
    ws_base: String,
}

impl KiteBroker {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build http client");

        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            access_token: RwLock::new(access_token.into()),
            http,
            api_base: API_BASE.to_string(),
            ws_base: WS_BASE.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token.read())
    }

    /// SHA-256 checksum over api_key + request_token + api_secret, hex
    /// encoded, as required by the token-exchange endpoint.
    fn checksum(&self, request_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.api_key.as_bytes());
        hasher.update(request_token.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Exchange-qualified quote identifier for the index spot.
    fn quote_id(symbol: Symbol) -> &'static str {
        match symbol {
            Symbol::Nifty => "NSE:NIFTY 50",
            Symbol::BankNifty => "NSE:NIFTY BANK",
            Symbol::Sensex => "BSE:SENSEX",
        }
    }

    /// Tradingsymbol prefix for the derivatives segment.
    fn option_prefix(symbol: Symbol) -> &'static str {
        match symbol {
            Symbol::Nifty => "NIFTY",
            Symbol::BankNifty => "BANKNIFTY",
            Symbol::Sensex => "SENSEX",
        }
    }

    fn option_exchange(symbol: Symbol) -> &'static str {
        match symbol {
            Symbol::Sensex => "BFO",
            _ => "NFO",
        }
    }

    async fn get_json(&self, url: &str) -> BrokerResult<serde_json::Value> {
        let resp = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .header("X-Kite-Version", "3")
            .send()
            .await?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let msg = body["message"].as_str().unwrap_or("token rejected");
            return Err(BrokerError::Auth(msg.to_string()));
        }
        if !status.is_success() {
            let msg = body["message"].as_str().unwrap_or("request failed");
            return Err(BrokerError::Api(format!("{status}: {msg}")));
        }
        Ok(body)
    }

    fn parse_quote(symbol: Symbol, data: &serde_json::Value) -> BrokerResult<QuoteSnapshot> {
        let entry = &data["data"][Self::quote_id(symbol)];
        let price = entry["last_price"]
            .as_f64()
            .ok_or_else(|| BrokerError::Api("quote missing last_price".to_string()))?;
        let ohlc = &entry["ohlc"];

        Ok(QuoteSnapshot {
            symbol,
            price,
            ts: ist_now().timestamp_millis(),
            cumulative_volume: entry["volume"].as_u64(),
            oi: entry["oi"].as_u64(),
            day_open: ohlc["open"].as_f64(),
            day_high: ohlc["high"].as_f64(),
            day_low: ohlc["low"].as_f64(),
            prev_close: ohlc["close"].as_f64(),
        })
    }
}

// =============================================================================
// Binary tick codec
// =============================================================================

/// Prices on the wire are in paise.
const PRICE_DIVISOR: f64 = 100.0;

fn read_i32(payload: &[u8], offset: usize) -> Option<i64> {
    let bytes: [u8; 4] = payload.get(offset..offset + 4)?.try_into().ok()?;
    Some(i32::from_be_bytes(bytes) as i64)
}

fn read_price(payload: &[u8], offset: usize) -> Option<f64> {
    read_i32(payload, offset).map(|v| v as f64 / PRICE_DIVISOR)
}

/// Decode one binary WebSocket frame into normalized ticks.
///
/// `now_ms` substitutes for packets that omit an exchange timestamp.
/// Unknown instrument tokens and runt packets are skipped, never fatal.
pub fn parse_binary_frame(frame: &[u8], now_ms: i64) -> Vec<Tick> {
    // Single-byte frames are upstream heartbeats.
    if frame.len() < 4 {
        return Vec::new();
    }

    let count = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let mut ticks = Vec::with_capacity(count);
    let mut cursor = 2;

    for _ in 0..count {
        let Some(len_bytes) = frame.get(cursor..cursor + 2) else {
            break;
        };
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        cursor += 2;
        let Some(payload) = frame.get(cursor..cursor + len) else {
            break;
        };
        cursor += len;

        if let Some(tick) = parse_packet(payload, now_ms) {
            ticks.push(tick);
        }
    }

    ticks
}

fn parse_packet(payload: &[u8], now_ms: i64) -> Option<Tick> {
    let token = read_i32(payload, 0)? as u32;
    let symbol = Symbol::from_instrument_token(token)?;
    let price = read_price(payload, 4)?;

    match payload.len() {
        // Index packet: ltp, high, low, open, close, change [, exchange ts].
        28 | 32 => {
            let ts = read_i32(payload, 28)
                .filter(|&s| s > 0)
                .map(|s| s * 1000)
                .unwrap_or(now_ms);
            Some(Tick {
                symbol,
                price,
                ts,
                last_traded_qty: None,
                cumulative_volume: None,
                oi: None,
                pcr: None,
                day_open: read_price(payload, 16),
                day_high: read_price(payload, 8),
                day_low: read_price(payload, 12),
                prev_close: read_price(payload, 20),
                source: TickSource::Ws,
            })
        }
        // Quote (44) / full (184) packet for derivatives.
        44 | 184 => {
            let ts = read_i32(payload, 60)
                .filter(|&s| s > 0)
                .map(|s| s * 1000)
                .unwrap_or(now_ms);
            Some(Tick {
                symbol,
                price,
                ts,
                last_traded_qty: read_i32(payload, 8).map(|v| v as u32),
                cumulative_volume: read_i32(payload, 16).map(|v| v as u64),
                oi: read_i32(payload, 48).map(|v| v as u64),
                pcr: None,
                day_open: read_price(payload, 28),
                day_high: read_price(payload, 32),
                day_low: read_price(payload, 36),
                prev_close: read_price(payload, 40),
                source: TickSource::Ws,
            })
        }
        // LTP-only packets carry too little to be useful downstream, and
        // anything else is an unknown layout.
        _ => None,
    }
}

/// Text frames carry control/error envelopes.
fn classify_text_frame(text: &str) -> Option<BrokerError> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value["type"].as_str() != Some("error") {
        return None;
    }
    let message = value["data"].as_str().unwrap_or("upstream error");
    if message.contains("Token") || message.contains("token") || message.contains("auth") {
        Some(BrokerError::Auth(message.to_string()))
    } else {
        Some(BrokerError::Api(message.to_string()))
    }
}

// =============================================================================
// BrokerAdapter implementation
// =============================================================================

#[async_trait]
impl BrokerAdapter for KiteBroker {
    async fn stream_ticks(
        &self,
        symbols: &[Symbol],
        sink: mpsc::Sender<Tick>,
    ) -> BrokerResult<()> {
        let url = format!(
            "{}?api_key={}&access_token={}",
            self.ws_base,
            self.api_key,
            self.access_token.read()
        );

        let (ws, _response) = connect_async(&url).await.map_err(|e| {
            let text = e.to_string();
            if text.contains("403") || text.contains("401") {
                BrokerError::Auth(text)
            } else {
                BrokerError::Transport(text)
            }
        })?;
        info!(symbols = symbols.len(), "tick stream connected");

        let (mut write, mut read) = ws.split();

        let tokens: Vec<u32> = symbols.iter().map(|s| s.instrument_token()).collect();
        let subscribe = serde_json::json!({ "a": "subscribe", "v": tokens });
        let mode = serde_json::json!({ "a": "mode", "v": ["full", tokens] });
        for msg in [subscribe, mode] {
            write
                .send(Message::Text(msg.to_string().into()))
                .await
                .map_err(|e| BrokerError::Transport(e.to_string()))?;
        }

        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Binary(data)) => {
                    let now_ms = ist_now().timestamp_millis();
                    for tick in parse_binary_frame(&data, now_ms) {
                        // A full engine-side queue applies backpressure here;
                        // a closed queue means the supervisor is gone.
                        if sink.send(tick).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Ok(Message::Text(text)) => {
                    if let Some(err) = classify_text_frame(&text) {
                        warn!(error = %err, "control frame ended the stream");
                        return Err(err);
                    }
                    debug!(msg = %text, "control frame");
                }
                Ok(Message::Close(_)) => return Err(BrokerError::StreamClosed),
                Ok(_) => {} // Ping/Pong handled by tungstenite.
                Err(e) => return Err(BrokerError::Transport(e.to_string())),
            }
        }

        Err(BrokerError::StreamClosed)
    }

    async fn quote(&self, symbol: Symbol) -> BrokerResult<QuoteSnapshot> {
        let url = format!(
            "{}/quote?i={}",
            self.api_base,
            urlencode(Self::quote_id(symbol))
        );
        let body = self.get_json(&url).await?;
        Self::parse_quote(symbol, &body)
    }

    async fn prev_day_ohlc(&self, symbol: Symbol) -> BrokerResult<DayOhlc> {
        let to = ist_now().date_naive();
        let from = to - ChronoDuration::days(10);
        let url = format!(
            "{}/instruments/historical/{}/day?from={}&to={}",
            self.api_base,
            symbol.instrument_token(),
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
        );
        let body = self.get_json(&url).await?;

        let candles = body["data"]["candles"]
            .as_array()
            .ok_or_else(|| BrokerError::Api("historical response missing candles".to_string()))?;

        // The last row may be today's forming day; the prior row is the last
        // completed session.
        let today = to.format("%Y-%m-%d").to_string();
        let completed: Vec<&serde_json::Value> = candles
            .iter()
            .filter(|row| {
                row[0]
                    .as_str()
                    .map(|ts| !ts.starts_with(&today))
                    .unwrap_or(false)
            })
            .collect();
        let row = completed
            .last()
            .ok_or_else(|| BrokerError::Api("no completed daily candle".to_string()))?;

        let field = |i: usize| -> BrokerResult<f64> {
            row[i]
                .as_f64()
                .ok_or_else(|| BrokerError::Api(format!("daily candle field {i} missing")))
        };
        Ok(DayOhlc {
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
        })
    }

    async fn option_chain(
        &self,
        symbol: Symbol,
        around_strike: f64,
        depth: usize,
    ) -> BrokerResult<Vec<OptionChainRow>> {
        let step = symbol.strike_step();
        let atm = (around_strike / step).round() * step;
        let expiry = expiry_tag(ist_now().date_naive());
        let exchange = Self::option_exchange(symbol);
        let prefix = Self::option_prefix(symbol);

        let mut strikes = Vec::with_capacity(depth * 2 + 1);
        for i in -(depth as i64)..=(depth as i64) {
            strikes.push(atm + i as f64 * step);
        }

        // One batched quote call: i=NFO:NIFTY25AUG24500CE&i=...
        let params: Vec<String> = strikes
            .iter()
            .flat_map(|strike| {
                let s = *strike as i64;
                [
                    format!("i={}", urlencode(&format!("{exchange}:{prefix}{expiry}{s}CE"))),
                    format!("i={}", urlencode(&format!("{exchange}:{prefix}{expiry}{s}PE"))),
                ]
            })
            .collect();
        let url = format!("{}/quote?{}", self.api_base, params.join("&"));
        let body = self.get_json(&url).await?;
        let data = &body["data"];

        let mut rows = Vec::with_capacity(strikes.len());
        for strike in strikes {
            let s = strike as i64;
            let call = &data[format!("{exchange}:{prefix}{expiry}{s}CE")];
            let put = &data[format!("{exchange}:{prefix}{expiry}{s}PE")];
            // Strikes absent from the response (illiquid tails) are skipped.
            if call.is_null() && put.is_null() {
                continue;
            }
            rows.push(OptionChainRow {
                strike,
                call_oi: call["oi"].as_u64().unwrap_or(0),
                put_oi: put["oi"].as_u64().unwrap_or(0),
                call_volume: call["volume"].as_u64().unwrap_or(0),
                put_volume: put["volume"].as_u64().unwrap_or(0),
            });
        }
        Ok(rows)
    }

    fn set_access_token(&self, token: String) {
        *self.access_token.write() = token;
        info!("broker access token rotated");
    }

    fn login_url(&self) -> String {
        format!("{LOGIN_BASE}?v=3&api_key={}", self.api_key)
    }

    async fn exchange_request_token(&self, request_token: &str) -> BrokerResult<String> {
        let checksum = self.checksum(request_token);
        let resp = self
            .http
            .post(format!("{}/session/token", self.api_base))
            .header("X-Kite-Version", "3")
            .form(&[
                ("api_key", self.api_key.as_str()),
                ("request_token", request_token),
                ("checksum", checksum.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            let msg = body["message"].as_str().unwrap_or("token exchange failed");
            return Err(BrokerError::Auth(msg.to_string()));
        }

        body["data"]["access_token"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BrokerError::Api("token exchange response missing access_token".into()))
    }
}

/// Monthly contract tag, e.g. `25AUG`.
fn expiry_tag(date: chrono::NaiveDate) -> String {
    use chrono::Datelike;
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    format!("{:02}{}", date.year() % 100, MONTHS[date.month0() as usize])
}

/// Minimal percent-encoding for quote identifiers (spaces and colons appear
/// in index names).
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

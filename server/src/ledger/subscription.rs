use alloy_primitives::{Bytes, B256};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::contract::{self, OracleRequestLog};
use super::LedgerError;
use crate::config::ServerConfig;
use crate::models::{Address, OracleRequest};

const SUBSCRIBE_REQUEST_ID: u64 = 1;
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Exponential reconnect delay: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next reconnect, without jitter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.min(MAX_BACKOFF_EXPONENT));
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// [`Backoff::next_delay`] plus up to 10% random jitter, still capped at `max`.
    pub fn next_delay_with_jitter(&mut self) -> Duration {
        let delay = self.next_delay();
        let jitter_ms = (delay.as_millis() / 10) as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        (delay + jitter).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Why a single subscription session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    ReceiverClosed,
    Disconnected,
}

/// A decoded websocket frame
#[derive(Debug, PartialEq)]
enum Frame {
    Subscribed(String),
    Log(Value),
    Failed { code: i64, message: String },
    Ignored,
}

/// Liveness settings for one subscription session.
///
/// The session pings the node every `ping_interval` and gives up once nothing
/// at all (pong, log, or otherwise) has arrived for `idle_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

/// `eth_subscribe("logs")` feed of `OracleRequest` events from the latest
/// block onward. Runs on its own task and reconnects with backoff whenever
/// the connection drops or goes silent.
pub struct OracleRequestSubscription {
    ws_url: String,
    app_address: Address,
    backoff: Backoff,
    keepalive: Keepalive,
}

impl OracleRequestSubscription {
    pub fn new(
        ws_url: impl Into<String>,
        app_address: Address,
        backoff: Backoff,
        keepalive: Keepalive,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            app_address,
            backoff,
            keepalive,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.ledger.websocket_url(),
            config.ledger.app_address,
            Backoff::new(config.reconnect_base, config.reconnect_max),
            Keepalive {
                ping_interval: config.subscription_ping_interval,
                idle_timeout: config.subscription_idle_timeout,
            },
        )
    }

    /// Start delivering requests into `sender`. The task stops once the
    /// receiving half is dropped.
    pub fn spawn(self, sender: mpsc::Sender<OracleRequest>) -> JoinHandle<()> {
        tokio::spawn(self.run(sender))
    }

    async fn run(mut self, sender: mpsc::Sender<OracleRequest>) {
        info!(ws_url = %self.ws_url, contract = %self.app_address, "OracleRequest subscription started");

        loop {
            match self.session(&sender).await {
                Ok(SessionEnd::ReceiverClosed) => break,
                Ok(SessionEnd::Disconnected) => warn!("ledger subscription closed by peer"),
                Err(err) => warn!(error = %err, "ledger subscription failed"),
            }

            if sender.is_closed() {
                break;
            }

            let delay = self.backoff.next_delay_with_jitter();
            warn!(
                attempt = self.backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "ledger subscription reconnect backoff"
            );
            sleep(delay).await;
        }

        info!("request receiver dropped; OracleRequest subscription stopped");
    }

    async fn session(
        &mut self,
        sender: &mpsc::Sender<OracleRequest>,
    ) -> Result<SessionEnd, LedgerError> {
        let (mut ws, _) = connect_async(self.ws_url.as_str()).await?;
        ws.send(Message::Text(self.subscribe_request().to_string()))
            .await?;

        let Keepalive {
            ping_interval,
            idle_timeout,
        } = self.keepalive;
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        loop {
            let message = tokio::select! {
                message = ws.next() => message,
                _ = ping.tick() => {
                    ws.send(Message::Ping(Vec::new())).await?;
                    continue;
                }
                _ = sleep_until(last_seen + idle_timeout) => {
                    warn!(
                        idle_ms = idle_timeout.as_millis() as u64,
                        "ledger node went silent; dropping subscription"
                    );
                    return Ok(SessionEnd::Disconnected);
                }
            };

            let Some(message) = message else {
                return Ok(SessionEnd::Disconnected);
            };
            last_seen = Instant::now();

            let text = match message? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(SessionEnd::Disconnected),
                _ => continue,
            };
            if let Some(end) = self.handle_frame(&text, sender).await? {
                return Ok(end);
            }
        }
    }

    async fn handle_frame(
        &mut self,
        text: &str,
        sender: &mpsc::Sender<OracleRequest>,
    ) -> Result<Option<SessionEnd>, LedgerError> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "ignoring non-JSON subscription frame");
                return Ok(None);
            }
        };

        match classify_frame(&value) {
            Frame::Subscribed(id) => {
                info!(subscription_id = %id, "subscribed to OracleRequest events");
                self.backoff.reset();
            }
            Frame::Failed { code, message } => {
                return Err(LedgerError::Rpc { code, message });
            }
            Frame::Log(log) => match decode_log(&log) {
                Ok(Some(event)) => {
                    debug!(
                        index = event.index,
                        airline = %event.request.airline,
                        flight = %event.request.flight,
                        timestamp = %event.request.timestamp,
                        "OracleRequest received"
                    );
                    if sender.send(event.request).await.is_err() {
                        return Ok(Some(SessionEnd::ReceiverClosed));
                    }
                }
                Ok(None) => debug!("skipping removed OracleRequest log"),
                Err(err) => warn!(error = %err, "skipping undecodable OracleRequest log"),
            },
            Frame::Ignored => {}
        }
        Ok(None)
    }

    fn subscribe_request(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_REQUEST_ID,
            "method": "eth_subscribe",
            "params": [
                "logs",
                {
                    "address": self.app_address,
                    "topics": [contract::oracle_request_topic()],
                }
            ],
        })
    }
}

fn classify_frame(value: &Value) -> Frame {
    if value.get("id").and_then(Value::as_u64) == Some(SUBSCRIBE_REQUEST_ID) {
        if let Some(error) = value.get("error") {
            return Frame::Failed {
                code: error.pointer("/code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .pointer("/message")
                    .and_then(Value::as_str)
                    .unwrap_or("subscription refused")
                    .to_string(),
            };
        }
        if let Some(id) = value.get("result").and_then(Value::as_str) {
            return Frame::Subscribed(id.to_string());
        }
    }

    if value.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        if let Some(log) = value.pointer("/params/result") {
            return Frame::Log(log.clone());
        }
    }

    Frame::Ignored
}

/// `Ok(None)` for logs dropped by a chain reorganisation.
fn decode_log(log: &Value) -> Result<Option<OracleRequestLog>, LedgerError> {
    if log.get("removed").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(None);
    }

    let topics: Vec<B256> = log
        .get("topics")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| LedgerError::Malformed(format!("log topics: {e}")))?
        .ok_or_else(|| LedgerError::Malformed("log without topics".to_string()))?;
    let data: Bytes = log
        .get("data")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| LedgerError::Malformed(format!("log data: {e}")))?
        .ok_or_else(|| LedgerError::Malformed("log without data".to_string()))?;
    Ok(Some(contract::decode_oracle_request(&topics, &data)?))
}

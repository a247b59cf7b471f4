/// WebSocket trade-feed connectors, one long-lived stream per symbol
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::data::TickBuffer;
use crate::error::{PipelineError, Result};
use crate::types::{Config, Tick};

/// Inbound trade message wire format
#[derive(Debug, Deserialize)]
struct TradeMessage {
    #[serde(rename = "T")]
    event_time_ms: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
}

fn parse_tick(text: &str) -> Result<Tick> {
    let msg: TradeMessage = serde_json::from_str(text)?;

    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(msg.event_time_ms)
        .ok_or_else(|| {
            PipelineError::MalformedMessage(format!("bad event time: {}", msg.event_time_ms))
        })?;
    let price: f64 = msg
        .price
        .parse()
        .map_err(|_| PipelineError::MalformedMessage(format!("bad price: {}", msg.price)))?;
    let quantity: f64 = msg
        .quantity
        .parse()
        .map_err(|_| PipelineError::MalformedMessage(format!("bad quantity: {}", msg.quantity)))?;

    Ok(Tick {
        timestamp,
        symbol: msg.symbol.to_lowercase(),
        price,
        quantity,
    })
}

struct StreamHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Registry of per-symbol feed subscriptions sharing one tick buffer.
///
/// `start` is idempotent; `stop` signals the stream task, which unblocks an
/// in-flight backoff sleep and skips the next connection attempt.
pub struct StreamConnector {
    feed_url: String,
    buffer: Arc<TickBuffer>,
    backoff_start: Duration,
    backoff_cap: Duration,
    streams: RwLock<HashMap<String, StreamHandle>>,
}

impl StreamConnector {
    pub fn new(buffer: Arc<TickBuffer>, config: &Config) -> Self {
        StreamConnector {
            feed_url: config.feed_url.clone(),
            buffer,
            backoff_start: Duration::from_secs(config.backoff_start_secs),
            backoff_cap: Duration::from_secs(config.backoff_cap_secs),
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Begin a subscription for `symbol` if none is active
    pub async fn start(&self, symbol: &str) {
        let symbol = symbol.to_lowercase();
        let mut streams = self.streams.write().await;
        if streams.contains_key(&symbol) {
            debug!("Stream already active for {}", symbol);
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let url = format!("{}/{}@trade", self.feed_url, symbol);
        let task = tokio::spawn(run_stream(
            url,
            symbol.clone(),
            Arc::clone(&self.buffer),
            stop_rx,
            self.backoff_start,
            self.backoff_cap,
        ));

        streams.insert(symbol.clone(), StreamHandle { stop_tx, task });
        info!("Started stream for {}", symbol);
    }

    /// Signal termination and deregister the subscription
    pub async fn stop(&self, symbol: &str) {
        let symbol = symbol.to_lowercase();
        let mut streams = self.streams.write().await;
        if let Some(handle) = streams.remove(&symbol) {
            let _ = handle.stop_tx.send(true);
            info!("Stopped stream for {}", symbol);
        }
    }

    /// Stop every active subscription and wait for the tasks to exit
    pub async fn stop_all(&self) {
        let mut streams = self.streams.write().await;
        for (symbol, handle) in streams.drain() {
            let _ = handle.stop_tx.send(true);
            let _ = handle.task.await;
            info!("Stopped stream for {}", symbol);
        }
    }

    /// Currently active symbols
    pub async fn status(&self) -> Vec<String> {
        let streams = self.streams.read().await;
        let mut symbols: Vec<String> = streams.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

/// Connection loop for one symbol: connect, pump messages into the buffer,
/// and on any failure or clean close reconnect with exponential backoff
/// (doubling per attempt, capped, reset after a successful connection).
async fn run_stream(
    url: String,
    symbol: String,
    buffer: Arc<TickBuffer>,
    mut stop_rx: watch::Receiver<bool>,
    backoff_start: Duration,
    backoff_cap: Duration,
) {
    let mut backoff = backoff_start;

    while !*stop_rx.borrow() {
        match connect_async(&url).await {
            Ok((ws_stream, _)) => {
                info!("Feed connected for {}", symbol);
                backoff = backoff_start;

                let (_write, mut read) = ws_stream.split();

                loop {
                    tokio::select! {
                        changed = stop_rx.changed() => {
                            // A dropped stop handle counts as a stop signal
                            if changed.is_err() || *stop_rx.borrow() {
                                info!("Feed stream for {} stopping", symbol);
                                return;
                            }
                        }
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                match parse_tick(&text) {
                                    Ok(tick) => buffer.offer(tick),
                                    // A single bad message never kills the connection
                                    Err(e) => debug!("Dropping malformed message for {}: {}", symbol, e),
                                }
                            }
                            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                            Some(Ok(Message::Close(_))) | None => {
                                warn!("Feed closed for {}", symbol);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("Feed error for {}: {}", symbol, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Feed connect failed for {}: {}", symbol, e);
            }
        }

        if *stop_rx.borrow() {
            break;
        }

        debug!("Reconnecting {} in {:?}", symbol, backoff);
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
        backoff = (backoff * 2).min(backoff_cap);
    }

    info!("Feed stream for {} terminated", symbol);
}

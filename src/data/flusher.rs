/// Background loop draining the tick buffer into durable storage
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::data::{BarStore, TickBuffer};
use crate::error::Result;
use crate::types::{Bar, Config, Tick, Timeframe};

/// Bar being accumulated from one batch's ticks for one window
#[derive(Debug, Clone)]
struct BarAccumulator {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl BarAccumulator {
    fn new(tick: &Tick) -> Self {
        BarAccumulator {
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.quantity,
            first_seen: tick.timestamp,
            last_seen: tick.timestamp,
        }
    }

    fn update(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.volume += tick.quantity;
        // Open and close follow event time, not arrival order
        if tick.timestamp < self.first_seen {
            self.first_seen = tick.timestamp;
            self.open = tick.price;
        }
        if tick.timestamp >= self.last_seen {
            self.last_seen = tick.timestamp;
            self.close = tick.price;
        }
    }

    fn finish(self, symbol: String, open_time: DateTime<Utc>) -> Bar {
        Bar {
            symbol,
            open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Bucket one batch's ticks into boundary-aligned windows per symbol
pub fn aggregate_bars(batch: &[Tick], timeframe: Timeframe) -> Vec<Bar> {
    let mut buckets: HashMap<(String, DateTime<Utc>), BarAccumulator> = HashMap::new();

    for tick in batch {
        let open_time = timeframe.window_start(tick.timestamp);
        buckets
            .entry((tick.symbol.clone(), open_time))
            .and_modify(|acc| acc.update(tick))
            .or_insert_with(|| BarAccumulator::new(tick));
    }

    let mut bars: Vec<Bar> = buckets
        .into_iter()
        .map(|((symbol, open_time), acc)| acc.finish(symbol, open_time))
        .collect();
    bars.sort_by(|a, b| (&a.symbol, a.open_time).cmp(&(&b.symbol, b.open_time)));
    bars
}

/// Sole consumer of the tick buffer and sole writer of bars.
///
/// Each cycle drains up to `batch_size` ticks (waiting at most
/// `flush_interval` total), bulk-inserts the raw ticks, upserts bars for
/// every timeframe, and periodically prunes ticks past the retention
/// horizon. A persistence failure abandons the cycle without retry; the
/// drained ticks are lost and the next cycle starts fresh.
pub struct AggregationFlusher {
    buffer: Arc<TickBuffer>,
    store: Arc<BarStore>,
    batch_size: usize,
    flush_interval: Duration,
    retention_hours: i64,
    prune_interval: Duration,
}

impl AggregationFlusher {
    pub fn new(buffer: Arc<TickBuffer>, store: Arc<BarStore>, config: &Config) -> Self {
        AggregationFlusher {
            buffer,
            store,
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
            retention_hours: config.retention_hours,
            prune_interval: Duration::from_secs(config.prune_interval_secs),
        }
    }

    pub async fn run(self, stop_rx: watch::Receiver<bool>) {
        info!(
            "Flush loop started (batch_size={}, flush_interval={:?})",
            self.batch_size, self.flush_interval
        );

        let mut last_prune = Instant::now();

        while !*stop_rx.borrow() {
            let batch = self.drain_batch().await;

            if !batch.is_empty() {
                if let Err(e) = self.persist_batch(&batch) {
                    // Cycle abandoned; the drained ticks are lost
                    warn!("Flush cycle failed, dropping {} ticks: {}", batch.len(), e);
                }
            }

            if last_prune.elapsed() >= self.prune_interval {
                if let Err(e) = self.store.prune_ticks_older_than(self.retention_hours) {
                    warn!("Tick pruning failed: {}", e);
                }
                last_prune = Instant::now();
            }
        }

        info!("Flush loop stopped");
    }

    /// Collect up to `batch_size` ticks, waiting no longer than
    /// `flush_interval` total; an empty batch is a normal idle outcome
    async fn drain_batch(&self) -> Vec<Tick> {
        let deadline = Instant::now() + self.flush_interval;
        let mut batch = Vec::with_capacity(self.batch_size);

        while batch.len() < self.batch_size {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => break,
            };
            match self.buffer.take(remaining).await {
                Some(tick) => batch.push(tick),
                None => break,
            }
        }

        batch
    }

    fn persist_batch(&self, batch: &[Tick]) -> Result<()> {
        self.store.insert_ticks_bulk(batch)?;

        for timeframe in Timeframe::ALL {
            let bars = aggregate_bars(batch, timeframe);
            // Last-writer-wins per cycle: each upsert replaces the prior
            // row from this cycle's own view of the window
            self.store.upsert_bars(timeframe, &bars)?;
        }

        debug!("Flushed batch of {} ticks", batch.len());
        Ok(())
    }
}

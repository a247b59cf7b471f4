/// Top-level owning context wiring connectors, buffer, flusher, and store
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::analytics;
use crate::data::{AggregationFlusher, BarStore, TickBuffer};
use crate::error::Result;
use crate::feed::StreamConnector;
use crate::types::{Config, PairSnapshot, PipelineStatus, Timeframe};

struct FlusherHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns every moving part of the ingestion pipeline. No process-wide
/// registries: lifecycle follows this struct.
pub struct Pipeline {
    config: Config,
    buffer: Arc<TickBuffer>,
    store: Arc<BarStore>,
    connector: StreamConnector,
    flusher: RwLock<Option<FlusherHandle>>,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        let buffer = Arc::new(TickBuffer::new(config.buffer_capacity));
        let store = Arc::new(BarStore::open(&config.db_path)?);
        let connector = StreamConnector::new(Arc::clone(&buffer), &config);

        Ok(Pipeline {
            config,
            buffer,
            store,
            connector,
            flusher: RwLock::new(None),
        })
    }

    /// Subscribe a symbol, spawning the flush worker on first use (or if a
    /// previous worker died)
    pub async fn start_stream(&self, symbol: &str) {
        self.ensure_flusher().await;
        self.connector.start(symbol).await;
    }

    pub async fn stop_stream(&self, symbol: &str) {
        self.connector.stop(symbol).await;
    }

    /// Health surface: active symbols, buffer occupancy, flush-worker
    /// liveness
    pub async fn status(&self) -> PipelineStatus {
        let flusher_alive = {
            let flusher = self.flusher.read().await;
            flusher.as_ref().map_or(false, |h| !h.task.is_finished())
        };

        PipelineStatus {
            active_symbols: self.connector.status().await,
            buffer_len: self.buffer.len(),
            flusher_alive,
        }
    }

    pub fn store(&self) -> &Arc<BarStore> {
        &self.store
    }

    /// Pairs statistics over durable bars, aligned to the shorter series
    pub fn pair_snapshot(
        &self,
        symbol_1: &str,
        symbol_2: &str,
        timeframe: Timeframe,
    ) -> Result<PairSnapshot> {
        let (closes_1, closes_2) = analytics::load_aligned_closes(
            &self.store,
            symbol_1,
            symbol_2,
            timeframe,
            self.config.lookback_hours,
        )?;
        analytics::pair_snapshot(&closes_1, &closes_2, self.config.rolling_window)
    }

    /// Stop all connectors, then the flush worker
    pub async fn shutdown(&self) {
        self.connector.stop_all().await;

        let handle = self.flusher.write().await.take();
        if let Some(handle) = handle {
            let _ = handle.stop_tx.send(true);
            let _ = handle.task.await;
        }
        info!("Pipeline shut down");
    }

    async fn ensure_flusher(&self) {
        let mut flusher = self.flusher.write().await;
        let alive = flusher.as_ref().map_or(false, |h| !h.task.is_finished());
        if alive {
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = AggregationFlusher::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.store),
            &self.config,
        );
        let task = tokio::spawn(worker.run(stop_rx));
        *flusher = Some(FlusherHandle { stop_tx, task });
    }
}

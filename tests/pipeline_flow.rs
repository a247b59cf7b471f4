/// End-to-end flow: ticks through the buffer and flush worker into SQLite,
/// then pairs analytics over the persisted bars.
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::watch;

use tickspread::analytics;
use tickspread::data::{AggregationFlusher, BarStore, TickBuffer};
use tickspread::types::{Bar, Config, Tick, Timeframe};
use tickspread::Pipeline;

fn tick(symbol: &str, millis: i64, price: f64, quantity: f64) -> Tick {
    Tick {
        timestamp: Utc.timestamp_millis_opt(millis).unwrap(),
        symbol: symbol.to_string(),
        price,
        quantity,
    }
}

#[tokio::test]
async fn ticks_flow_through_flusher_into_bars() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.db_path = dir.path().join("flow.db").to_string_lossy().into_owned();
    config.flush_interval_ms = 50;

    let buffer = Arc::new(TickBuffer::new(config.buffer_capacity));
    let store = Arc::new(BarStore::open(&config.db_path).unwrap());
    let flusher = AggregationFlusher::new(Arc::clone(&buffer), Arc::clone(&store), &config);

    // Ticks at t=0.1s, 0.4s, 0.9s for symbol "x", enqueued before the
    // flush loop starts so they land in a single batch
    buffer.offer(tick("x", 100, 100.0, 1.0));
    buffer.offer(tick("x", 400, 101.0, 2.0));
    buffer.offer(tick("x", 900, 99.0, 3.0));

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(flusher.run(stop_rx));

    // Let at least one flush cycle complete
    tokio::time::sleep(Duration::from_millis(300)).await;
    stop_tx.send(true).unwrap();
    task.await.unwrap();

    // Raw ticks persisted append-only
    let ticks = store.load_ticks(Some("x"), None, None).unwrap();
    assert_eq!(ticks.len(), 3);

    // The 1s bar at open_time=0 carries the full OHLCV of the three ticks
    let bars = store.load_bars(Timeframe::OneSecond, Some("x"), None).unwrap();
    assert_eq!(bars.len(), 1);
    let bar = &bars[0];
    assert_eq!(bar.open_time, Utc.timestamp_millis_opt(0).unwrap());
    assert_eq!(bar.open, 100.0);
    assert_eq!(bar.high, 101.0);
    assert_eq!(bar.low, 99.0);
    assert_eq!(bar.close, 99.0);
    assert_eq!(bar.volume, 6.0);

    // Coarser timeframes carry the same batch
    let bars_1m = store.load_bars(Timeframe::OneMinute, Some("x"), None).unwrap();
    assert_eq!(bars_1m.len(), 1);
    assert_eq!(bars_1m[0].volume, 6.0);
}

#[tokio::test]
async fn second_cycle_overwrites_partial_window() {
    // Batch-local aggregation: a later cycle's upsert replaces the earlier
    // row for the same window rather than merging into it.
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.db_path = dir.path().join("overwrite.db").to_string_lossy().into_owned();
    config.flush_interval_ms = 40;

    let buffer = Arc::new(TickBuffer::new(64));
    let store = Arc::new(BarStore::open(&config.db_path).unwrap());
    let flusher = AggregationFlusher::new(Arc::clone(&buffer), Arc::clone(&store), &config);

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(flusher.run(stop_rx));

    buffer.offer(tick("x", 100, 100.0, 1.0));
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Same 1s window, later cycle
    buffer.offer(tick("x", 800, 105.0, 2.0));
    tokio::time::sleep(Duration::from_millis(150)).await;

    stop_tx.send(true).unwrap();
    task.await.unwrap();

    let bars = store.load_bars(Timeframe::OneSecond, Some("x"), None).unwrap();
    assert_eq!(bars.len(), 1);
    // Only the second cycle's slice survives
    assert_eq!(bars[0].open, 105.0);
    assert_eq!(bars[0].volume, 2.0);
}

#[tokio::test]
async fn pair_snapshot_over_persisted_bars() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.db_path = dir.path().join("pairs.db").to_string_lossy().into_owned();
    config.feed_url = "ws://127.0.0.1:9".to_string();

    let pipeline = Pipeline::new(config).unwrap();
    let store = Arc::clone(pipeline.store());

    // Two cointegrated series: eth tracks half of btc plus noise
    let mut bars_btc = Vec::new();
    let mut bars_eth = Vec::new();
    let mut seed: u32 = 12345;
    let mut noise = || {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (seed as f64 / u32::MAX as f64) - 0.5
    };
    for i in 0..120 {
        let open_time =
            Timeframe::OneMinute.window_start(Utc::now() - ChronoDuration::minutes(120 - i));
        let btc = 40_000.0 + i as f64 * 10.0 + noise() * 20.0;
        let eth = btc / 2.0 + noise() * 5.0;
        for (symbol, close, out) in [
            ("btcusdt", btc, &mut bars_btc),
            ("ethusdt", eth, &mut bars_eth),
        ] {
            out.push(Bar {
                symbol: symbol.to_string(),
                open_time,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            });
        }
    }
    store.upsert_bars(Timeframe::OneMinute, &bars_btc).unwrap();
    store.upsert_bars(Timeframe::OneMinute, &bars_eth).unwrap();

    let snapshot = pipeline
        .pair_snapshot("btcusdt", "ethusdt", Timeframe::OneMinute)
        .unwrap();

    assert!((snapshot.hedge_ratio - 2.0).abs() < 0.05);
    assert_eq!(snapshot.spread.len(), 120);
    assert_eq!(snapshot.zscore.len(), 120);
    // Default rolling window is 20: first 19 positions undefined
    assert!(snapshot.rolling_corr[18].is_none());
    assert!(snapshot.rolling_corr[19].is_some());
    assert!(snapshot.adf_pvalue <= 1.0 && snapshot.adf_pvalue > 0.0);

    // Alignment drops the unmatched head of the longer series
    let (c1, c2) =
        analytics::load_aligned_closes(&store, "btcusdt", "ethusdt", Timeframe::OneMinute, 6)
            .unwrap();
    assert_eq!(c1.len(), c2.len());

    pipeline.shutdown().await;
}

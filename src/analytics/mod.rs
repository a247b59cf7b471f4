pub mod pairs;

pub use pairs::{adf_test, hedge_ratio, pair_snapshot, rolling_corr, spread, zscore};

use crate::data::BarStore;
use crate::error::{PipelineError, Result};
use crate::types::Timeframe;

/// Load close-price series for two symbols at one timeframe, trimmed to the
/// shorter tail so both are time-aligned over the same recent range.
pub fn load_aligned_closes(
    store: &BarStore,
    symbol_1: &str,
    symbol_2: &str,
    timeframe: Timeframe,
    lookback_hours: i64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let bars_1 = store.load_bars(timeframe, Some(symbol_1), Some(lookback_hours))?;
    let bars_2 = store.load_bars(timeframe, Some(symbol_2), Some(lookback_hours))?;

    let n = bars_1.len().min(bars_2.len());
    if n == 0 {
        return Err(PipelineError::InsufficientData(format!(
            "no overlapping {} bars for {}/{}",
            timeframe.as_str(),
            symbol_1,
            symbol_2
        )));
    }

    let closes_1 = bars_1[bars_1.len() - n..].iter().map(|b| b.close).collect();
    let closes_2 = bars_2[bars_2.len() - n..].iter().map(|b| b.close).collect();
    Ok((closes_1, closes_2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bar;
    use chrono::{Duration, Utc};

    fn bar(symbol: &str, minutes_ago: i64, close: f64) -> Bar {
        let open_time = Timeframe::OneMinute.window_start(Utc::now() - Duration::minutes(minutes_ago));
        Bar {
            symbol: symbol.to_string(),
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_alignment_keeps_recent_tail() {
        let store = BarStore::open_in_memory().unwrap();
        let bars = vec![
            bar("btcusdt", 5, 1.0),
            bar("btcusdt", 4, 2.0),
            bar("btcusdt", 3, 3.0),
            bar("ethusdt", 4, 20.0),
            bar("ethusdt", 3, 30.0),
        ];
        store.upsert_bars(Timeframe::OneMinute, &bars).unwrap();

        let (c1, c2) =
            load_aligned_closes(&store, "btcusdt", "ethusdt", Timeframe::OneMinute, 6).unwrap();
        assert_eq!(c1, vec![2.0, 3.0]);
        assert_eq!(c2, vec![20.0, 30.0]);
    }

    #[test]
    fn test_alignment_empty_side_errors() {
        let store = BarStore::open_in_memory().unwrap();
        store
            .upsert_bars(Timeframe::OneMinute, &[bar("btcusdt", 3, 1.0)])
            .unwrap();

        assert!(matches!(
            load_aligned_closes(&store, "btcusdt", "ethusdt", Timeframe::OneMinute, 6),
            Err(PipelineError::InsufficientData(_))
        ));
    }
}

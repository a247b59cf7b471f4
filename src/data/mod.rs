pub mod bar_store;
pub mod flusher;
pub mod tick_buffer;

pub use bar_store::BarStore;
pub use flusher::{aggregate_bars, AggregationFlusher};
pub use tick_buffer::TickBuffer;

/// Bounded tick queue between the feed connectors and the flusher
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::types::Tick;

/// Fixed-capacity FIFO shared by all connectors (producers) and the
/// flusher (sole consumer).
///
/// `offer` never blocks: at capacity the oldest queued tick is evicted to
/// make room for the new one. Eviction is silent and is the only lossy
/// operation; surviving items keep their relative order.
pub struct TickBuffer {
    queue: Mutex<VecDeque<Tick>>,
    capacity: usize,
    len: AtomicUsize,
    notify: Notify,
}

impl TickBuffer {
    pub fn new(capacity: usize) -> Self {
        TickBuffer {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            len: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Enqueue a tick, evicting the oldest item if the buffer is full
    pub fn offer(&self, tick: Tick) {
        {
            let mut queue = self.queue.lock().expect("tick buffer lock poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
            }
            queue.push_back(tick);
            self.len.store(queue.len(), Ordering::Relaxed);
        }
        self.notify.notify_one();
    }

    /// Dequeue one tick, waiting up to `timeout` for an item
    pub async fn take(&self, timeout: Duration) -> Option<Tick> {
        let deadline = Instant::now() + timeout;

        loop {
            // Arm the waiter before checking to avoid a missed wakeup
            let notified = self.notify.notified();

            if let Some(tick) = self.pop_front() {
                return Some(tick);
            }

            let remaining = deadline.checked_duration_since(Instant::now())?;
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return self.pop_front();
            }
        }
    }

    /// Instantaneous occupancy; racy but safe, for health reporting
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn pop_front(&self) -> Option<Tick> {
        let mut queue = self.queue.lock().expect("tick buffer lock poisoned");
        let tick = queue.pop_front();
        self.len.store(queue.len(), Ordering::Relaxed);
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tick(price: f64) -> Tick {
        Tick {
            timestamp: Utc::now(),
            symbol: "btcusdt".to_string(),
            price,
            quantity: 1.0,
        }
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let buffer = TickBuffer::new(10);

        for i in 0..5 {
            buffer.offer(tick(i as f64));
        }

        for i in 0..5 {
            let t = buffer.take(Duration::from_millis(10)).await.unwrap();
            assert_eq!(t.price, i as f64);
        }
        assert!(buffer.take(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_drop_oldest_at_capacity() {
        let capacity = 100;
        let extra = 7;
        let buffer = TickBuffer::new(capacity);

        for i in 0..(capacity + extra) {
            buffer.offer(tick(i as f64));
        }
        assert_eq!(buffer.len(), capacity);

        // Exactly the earliest `extra` ticks are gone; the rest match the
        // tail of the input in order, with no duplicates.
        for i in extra..(capacity + extra) {
            let t = buffer.take(Duration::from_millis(10)).await.unwrap();
            assert_eq!(t.price, i as f64);
        }
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_take_times_out_when_idle() {
        let buffer = TickBuffer::new(10);
        let start = std::time::Instant::now();

        assert!(buffer.take(Duration::from_millis(50)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_take_wakes_on_offer() {
        let buffer = std::sync::Arc::new(TickBuffer::new(10));

        let producer = std::sync::Arc::clone(&buffer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.offer(tick(42.0));
        });

        let t = buffer.take(Duration::from_secs(5)).await.unwrap();
        assert_eq!(t.price, 42.0);
    }
}

//! Request pacing for rate-limited upstreams
//!
//! Spaces successive calls at least `interval` apart. Callers reserve a slot
//! under the lock and sleep outside it, so concurrent callers get distinct
//! slots and never fire together. `restart` measures the next interval from
//! the end of a unit of work instead of from its start.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct Pacer {
    /// Next free slot, in milliseconds since `epoch`
    next_available_ms: Mutex<u64>,
    epoch: Instant,
    interval: Duration,
    name: String,
    total_waits: AtomicU64,
}

impl Pacer {
    pub fn new(interval: Duration, name: &str) -> Self {
        Self {
            next_available_ms: Mutex::new(0),
            epoch: Instant::now(),
            interval,
            name: name.to_string(),
            total_waits: AtomicU64::new(0),
        }
    }

    /// Number of calls that had to sleep
    pub fn waits(&self) -> u64 {
        self.total_waits.load(Ordering::Relaxed)
    }

    /// Wait until this caller's slot comes up.
    ///
    /// The first call returns immediately. A zero interval never waits.
    pub async fn pace(&self) {
        if self.interval.is_zero() {
            return;
        }

        let now_ms = self.now_ms();
        let interval_ms = self.interval.as_millis() as u64;

        let slot_ms = {
            let mut next_available = self.next_available_ms.lock().await;
            let slot = (*next_available).max(now_ms);
            *next_available = slot + interval_ms;
            slot
        };

        if slot_ms > now_ms {
            self.total_waits.fetch_add(1, Ordering::Relaxed);
            let target = self.epoch + Duration::from_millis(slot_ms);
            let wait = target.saturating_duration_since(Instant::now());
            debug!("[PACER:{}] waiting {:?}", self.name, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Push the next free slot to a full interval from now
    pub async fn restart(&self) {
        if self.interval.is_zero() {
            return;
        }

        let next_ms = self.now_ms() + self.interval.as_millis() as u64;
        let mut next_available = self.next_available_ms.lock().await;
        *next_available = (*next_available).max(next_ms);
    }

    fn now_ms(&self) -> u64 {
        Instant::now().duration_since(self.epoch).as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_call_immediate() {
        let pacer = Pacer::new(Duration::from_millis(100), "test");

        let start = Instant::now();
        pacer.pace().await;
        assert!(start.elapsed().as_millis() < 20);
        assert_eq!(pacer.waits(), 0);
    }

    #[tokio::test]
    async fn test_second_call_waits() {
        let pacer = Pacer::new(Duration::from_millis(100), "test");
        pacer.pace().await;

        let start = Instant::now();
        pacer.pace().await;
        let elapsed = start.elapsed();

        assert!(elapsed.as_millis() >= 90, "only waited {:?}", elapsed);
        assert_eq!(pacer.waits(), 1);
    }

    #[tokio::test]
    async fn test_restart_waits_full_interval_after_slow_work() {
        let pacer = Pacer::new(Duration::from_millis(100), "test");
        pacer.pace().await;

        // Work that outlasts the interval
        tokio::time::sleep(Duration::from_millis(150)).await;
        pacer.restart().await;

        let start = Instant::now();
        pacer.pace().await;
        let elapsed = start.elapsed();

        assert!(elapsed.as_millis() >= 90, "only waited {:?}", elapsed);
        assert_eq!(pacer.waits(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let pacer = Pacer::new(Duration::ZERO, "test");
        let start = Instant::now();
        for _ in 0..5 {
            pacer.pace().await;
        }
        assert!(start.elapsed().as_millis() < 20);
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        let pacer = Arc::new(Pacer::new(Duration::from_millis(50), "concurrent"));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pacer = Arc::clone(&pacer);
            handles.push(tokio::spawn(async move {
                pacer.pace().await;
                start.elapsed()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        for pair in times.windows(2) {
            assert!((pair[1] - pair[0]).as_millis() >= 40);
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Blocked,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub blocked: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    total: AtomicU64,
    blocked: AtomicU64,
    errors: AtomicU64,
}

impl Metrics {
    pub fn record(&self, outcome: Outcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Ok => {}
            Outcome::Blocked => {
                self.blocked.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Metrics, MetricsSnapshot, Outcome};

    #[test]
    fn starts_at_zero() {
        assert_eq!(Metrics::default().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn counts_each_outcome() {
        let metrics = Metrics::default();
        metrics.record(Outcome::Ok);
        metrics.record(Outcome::Blocked);
        metrics.record(Outcome::Error);
        metrics.record(Outcome::Blocked);

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                total: 4,
                blocked: 2,
                errors: 1,
            }
        );
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let metrics = Metrics::default();
        let before = metrics.snapshot();
        metrics.record(Outcome::Error);

        assert_eq!(before.total, 0);
        assert_eq!(metrics.snapshot().total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_are_not_lost() {
        let metrics = Arc::new(Metrics::default());

        let handles = (0..1000)
            .map(|_| {
                let metrics = metrics.clone();
                tokio::spawn(async move { metrics.record(Outcome::Blocked) })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.expect("record task should not panic");
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocked, 1000);
        assert_eq!(snapshot.total, 1000);
        assert_eq!(snapshot.errors, 0);
    }
}

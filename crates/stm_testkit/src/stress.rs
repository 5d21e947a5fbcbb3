//! Concurrent stress harness exercising the batcher under write load.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use stm_core::Region;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions attempted.
    pub total_ops: usize,
    /// Transactions whose write committed without conflict.
    pub successful_ops: usize,
    /// Transactions that self-aborted on conflict.
    pub failed_ops: usize,
    /// Total wall-clock duration.
    pub duration: Duration,
    /// Transactions per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Builds a result from raw counts and an elapsed duration.
    #[must_use]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a human-readable summary.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total transactions: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Conflicted: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} tx/sec", self.ops_per_second);
    }
}

/// Configuration for a concurrent writer stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writer transactions performed per thread.
    pub operations_per_thread: usize,
    /// Number of concurrent writer threads.
    pub threads: usize,
    /// Whether every thread targets the same word (maximal contention)
    /// or a thread-private word (no contention).
    pub shared_target: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations_per_thread: 200,
            threads: 4,
            shared_target: true,
        }
    }
}

/// Runs `config.threads` writer threads, each performing
/// `config.operations_per_thread` single-word writes against `region`,
/// and tallies how many committed versus self-aborted on conflict.
///
/// When `shared_target` is `false`, `region` must have at least
/// `config.threads` words so each thread can claim a distinct one.
#[must_use]
pub fn run_concurrent_writers(region: &Arc<Region>, config: &StressConfig) -> StressTestResult {
    let align = region.align();
    let word_count = (region.size() / align).max(1);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    thread::scope(|scope| {
        for thread_index in 0..config.threads {
            let region = Arc::clone(region);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let shared_target = config.shared_target;
            let operations = config.operations_per_thread;

            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..operations {
                    let word = if shared_target { 0 } else { thread_index % word_count };
                    let target = region.start_address().offset_words(word as u32);
                    let payload = vec![rng.gen::<u8>(); align];

                    let tx = region.begin(false);
                    if tx.write(&payload, target) {
                        successful.fetch_add(1, Ordering::SeqCst);
                    } else {
                        failed.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = tx.end();
                }
            });
        }
    });

    StressTestResult::new(
        successful.load(Ordering::SeqCst),
        failed.load(Ordering::SeqCst),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stm_core::StmConfig;

    #[test]
    fn contended_stress_run_accounts_for_every_transaction() {
        let region = Region::create(64, 8, StmConfig::default().batch_size(4)).unwrap();
        let config = StressConfig {
            operations_per_thread: 20,
            threads: 4,
            shared_target: true,
        };
        let result = run_concurrent_writers(&region, &config);
        assert_eq!(result.total_ops, 80);
        assert_eq!(result.successful_ops + result.failed_ops, 80);
    }

    #[test]
    fn disjoint_targets_never_conflict() {
        let region = Region::create(64, 8, StmConfig::default().batch_size(4)).unwrap();
        let config = StressConfig {
            operations_per_thread: 10,
            threads: 4,
            shared_target: false,
        };
        let result = run_concurrent_writers(&region, &config);
        assert_eq!(result.failed_ops, 0);
    }
}

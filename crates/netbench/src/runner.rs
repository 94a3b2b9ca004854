//! The concurrency-bounded request driver.
//!
//! Owns the gate, the worker set and the collector task for exactly one
//! run; no synchronization primitive outlives the `run()` call that created
//! it. Termination follows either a total-count rule or a wall-clock
//! deadline, after which in-flight workers drain naturally, the entry
//! channel closes and the collector finalizes.

use crate::collector::entry::GlobalStatistic;
use crate::collector::StatCollector;
use crate::config::validation;
use crate::models::error::BenchError;
use crate::models::settings::RunSettings;
use crate::protocols::ProtocolAdapter;
use log::{debug, error};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Count-mode runs larger than this print progress every tenth of the
/// total.
const PROGRESS_REQUEST_THRESHOLD: u64 = 100;
/// Duration-mode runs longer than this print progress every tenth of the
/// duration.
const PROGRESS_TIME_THRESHOLD: Duration = Duration::from_secs(600);
/// Entry channel depth; producers briefly block when the collector lags.
const ENTRY_CHANNEL_CAPACITY: usize = 1024;

/// Drives one benchmark run to completion.
pub struct Runner {
    settings: RunSettings,
    adapter: ProtocolAdapter,
    collector: Arc<StatCollector>,
}

impl Runner {
    /// Builds a runner from settings, constructing the matching
    /// adapter/collector pair. Invalid settings are rejected here, before
    /// any work starts.
    pub fn from_settings(settings: RunSettings) -> Result<Self, BenchError> {
        validation::ensure_valid(&settings)?;
        let (adapter, collector) = ProtocolAdapter::from_settings(settings.protocol.clone());
        Ok(Runner {
            settings,
            adapter,
            collector: Arc::new(collector),
        })
    }

    /// Handle to the collector, usable for snapshots after the run.
    pub fn collector_handle(&self) -> Arc<StatCollector> {
        self.collector.clone()
    }

    /// Runs the benchmark: dispatch, drain, finalize, report. Returns the
    /// final aggregates.
    pub async fn run(self) -> Result<GlobalStatistic, BenchError> {
        let Runner {
            settings,
            mut adapter,
            collector,
        } = self;

        let (tx, rx) = mpsc::channel(ENTRY_CHANNEL_CAPACITY);
        adapter.initialize(tx).await?;

        let count_mode = settings.duration.is_zero();
        if count_mode && settings.total_requests > PROGRESS_REQUEST_THRESHOLD {
            collector.set_progress_every(settings.total_requests / 10);
        }

        let consumer = {
            let collector = collector.clone();
            tokio::spawn(async move { collector.consume(rx).await })
        };

        let gate = Arc::new(Semaphore::new(settings.concurrency as usize));
        let adapter = Arc::new(adapter);
        let mut workers = JoinSet::new();

        if count_mode {
            for _ in 0..settings.total_requests {
                let permit = gate
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("gate closed mid-run");
                spawn_worker(&mut workers, &adapter, permit);
            }
        } else {
            dispatch_until_deadline(settings.duration, &collector, &gate, &adapter, &mut workers)
                .await;
        }

        // Drain: every dispatched worker runs to natural completion.
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!("worker task failed: {}", err);
            }
        }

        // All worker-held senders are gone; dropping the adapter releases
        // the last one and closes the entry channel.
        drop(adapter);
        consumer.await.map_err(|e| BenchError::Config {
            message: format!("stat collector task failed: {}", e),
        })?;

        let stats = collector.global_stats();
        print_final_result(&stats);
        Ok(stats)
    }
}

/// Duration-mode scheduling loop: keep dispatching as the gate permits
/// until the deadline fires. The deadline stops dispatch only; in-flight
/// workers are never cancelled.
async fn dispatch_until_deadline(
    duration: Duration,
    collector: &StatCollector,
    gate: &Arc<Semaphore>,
    adapter: &Arc<ProtocolAdapter>,
    workers: &mut JoinSet<()>,
) {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    // The progress timer exists only on runs long enough to want it.
    if duration > PROGRESS_TIME_THRESHOLD {
        let period = duration / 10;
        let mut progress = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                permit = gate.clone().acquire_owned() => {
                    spawn_worker(workers, adapter, permit.expect("gate closed mid-run"));
                }
                _ = progress.tick() => collector.print_progress(),
            }
        }
    } else {
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                permit = gate.clone().acquire_owned() => {
                    spawn_worker(workers, adapter, permit.expect("gate closed mid-run"));
                }
            }
        }
    }
    debug!("duration deadline reached, draining in-flight workers");
}

/// Dispatches one gated worker and reaps any finished results so the set
/// does not grow with the run length.
fn spawn_worker(
    workers: &mut JoinSet<()>,
    adapter: &Arc<ProtocolAdapter>,
    permit: OwnedSemaphorePermit,
) {
    let adapter = adapter.clone();
    workers.spawn(async move {
        adapter.start_benchmark().await;
        drop(permit);
    });
    while let Some(joined) = workers.try_join_next() {
        if let Err(err) = joined {
            error!("worker task failed: {}", err);
        }
    }
}

/// Prints the final summary to stdout.
fn print_final_result(stats: &GlobalStatistic) {
    println!(
        "\nTotal requests: {}, total duration: {}, total recv/send bytes: {}\n\
         Successful requests: {}, failed requests: {}, avg latency: {}\n\
         Requests/sec: {:.2}, throughput: {:.6} MB/s",
        stats.total_requests,
        humantime::format_duration(Duration::from_millis(
            stats.total_duration.as_millis() as u64
        )),
        stats.total_bytes,
        stats.successful,
        stats.failed,
        humantime::format_duration(Duration::from_millis(
            stats.average_duration.as_millis() as u64
        )),
        stats.requests_per_sec(),
        stats.throughput_mb_per_sec,
    );
}

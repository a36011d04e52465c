use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::session::AccountSession;
use crate::sync::trigger::{CycleReport, SyncExtras, SyncTrigger};

/// Periodic cadence with an inexact firing window.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    interval: Duration,
    flex: Duration,
}

impl Cadence {
    pub fn new(interval: Duration, flex: Duration) -> Self {
        Self {
            interval,
            flex: flex.min(interval),
        }
    }

    pub fn delay(&self) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(&mut rng)
    }

    /// Picks a point in `[interval - flex, interval]`.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let interval_ms = self.interval.as_millis().min(u128::from(u64::MAX)) as u64;
        let flex_ms = self.flex.as_millis().min(u128::from(u64::MAX)) as u64;
        let early_ms = if flex_ms == 0 {
            0
        } else {
            rng.gen_range(0..=flex_ms)
        };
        Duration::from_millis(interval_ms.saturating_sub(early_ms))
    }
}

/// Requests on-demand cycles from a running scheduler.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncExtras>,
}

impl SyncHandle {
    pub fn sync_now(&self) -> bool {
        self.request(SyncExtras::manual())
    }

    pub fn upload_to_folder(&self, folder_id: impl Into<String>) -> bool {
        self.request(SyncExtras::upload_to_folder(folder_id))
    }

    /// Returns false once the scheduler has stopped.
    pub fn request(&self, extras: SyncExtras) -> bool {
        self.tx.send(extras).is_ok()
    }
}

pub struct Scheduler {
    cadence: Cadence,
    sync_on_start: bool,
    requests: mpsc::UnboundedReceiver<SyncExtras>,
}

impl Scheduler {
    pub fn new(config: &SyncConfig) -> (Self, SyncHandle) {
        let (tx, requests) = mpsc::unbounded_channel();
        let scheduler = Self {
            cadence: Cadence::new(config.interval, config.flex),
            sync_on_start: config.sync_on_start,
            requests,
        };
        (scheduler, SyncHandle { tx })
    }

    /// Runs cycles until `shutdown` fires. Returns the number of cycles run.
    pub async fn run<S: AccountSession>(
        mut self,
        trigger: &SyncTrigger<S>,
        shutdown: CancellationToken,
    ) -> usize {
        let mut cycles = 0usize;
        if self.sync_on_start && !shutdown.is_cancelled() {
            log_report(&trigger.run_cycle(SyncExtras::manual()).await);
            cycles += 1;
        }

        // On-demand cycles leave the periodic deadline alone.
        let periodic = tokio::time::sleep(self.cadence.delay());
        tokio::pin!(periodic);
        let mut requests_open = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = &mut periodic => {
                    log_report(&trigger.run_cycle(SyncExtras::periodic()).await);
                    cycles += 1;
                    periodic.as_mut().reset(Instant::now() + self.cadence.delay());
                }
                request = self.requests.recv(), if requests_open => match request {
                    Some(extras) => {
                        log_report(&trigger.run_cycle(extras).await);
                        cycles += 1;
                    }
                    None => requests_open = false,
                },
            }
        }
        info!(cycles, "scheduler stopped");
        cycles
    }
}

fn log_report(report: &CycleReport) {
    match report {
        CycleReport::Completed(Ok(success)) => {
            info!(file_id = %success.file_id, "sync cycle completed");
        }
        CycleReport::Completed(Err(err)) => warn!("sync cycle failed: {err}"),
        CycleReport::NeedsDestination => {
            warn!("sync cycle needs a destination folder; run with --select-folder <ID>");
        }
        CycleReport::Skipped(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use drivesync_core::DriveClient;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    use super::*;
    use crate::session::SessionError;
    use crate::storage::DestinationStore;

    /// Offline session; every cycle ends at the connectivity check.
    #[derive(Default)]
    struct OfflineSession {
        probes: AtomicUsize,
    }

    impl AccountSession for OfflineSession {
        type Client = DriveClient;

        fn account(&self) -> Option<&str> {
            Some("user@example.com")
        }

        async fn is_online(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            false
        }

        async fn connect(&self) -> Result<DriveClient, SessionError> {
            Err(SessionError::MissingToken("user@example.com".into()))
        }
    }

    fn config(sync_on_start: bool) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(100),
            flex: Duration::ZERO,
            sync_on_start,
            ..SyncConfig::default()
        }
    }

    fn offline_trigger(config: &SyncConfig) -> SyncTrigger<OfflineSession> {
        let dir = tempdir().unwrap();
        let store = DestinationStore::new(dir.path().join("destination.json"));
        SyncTrigger::new(OfflineSession::default(), store, config)
    }

    fn probes(trigger: &SyncTrigger<OfflineSession>) -> usize {
        trigger.session().probes.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn start_up_sync_runs_before_first_period() {
        let config = config(true);
        let trigger = offline_trigger(&config);
        let (scheduler, _handle) = Scheduler::new(&config);
        let shutdown = CancellationToken::new();

        let (cycles, ()) = tokio::join!(scheduler.run(&trigger, shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            shutdown.cancel();
        });

        assert_eq!(cycles, 1);
        assert_eq!(probes(&trigger), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_cycles_fire_each_interval() {
        let config = config(false);
        let trigger = offline_trigger(&config);
        let (scheduler, _handle) = Scheduler::new(&config);
        let shutdown = CancellationToken::new();

        let (cycles, ()) = tokio::join!(scheduler.run(&trigger, shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(250)).await;
            shutdown.cancel();
        });

        assert_eq!(cycles, 2);
        assert_eq!(probes(&trigger), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_sync_keeps_periodic_deadline() {
        let config = config(false);
        let trigger = offline_trigger(&config);
        let (scheduler, handle) = Scheduler::new(&config);
        let shutdown = CancellationToken::new();

        let (cycles, ()) = tokio::join!(scheduler.run(&trigger, shutdown.clone()), async {
            tokio::time::sleep(Duration::from_secs(90)).await;
            assert!(handle.sync_now());
            tokio::time::sleep(Duration::from_secs(60)).await;
            shutdown.cancel();
        });

        assert_eq!(cycles, 2);
        assert_eq!(probes(&trigger), 2);
    }

    #[test]
    fn delay_stays_inside_flex_window() {
        let cadence = Cadence::new(Duration::from_secs(900), Duration::from_secs(300));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let delay = cadence.delay_with_rng(&mut rng);
            assert!(delay >= Duration::from_secs(600));
            assert!(delay <= Duration::from_secs(900));
        }
    }

    #[test]
    fn zero_flex_is_exact() {
        let cadence = Cadence::new(Duration::from_millis(1500), Duration::ZERO);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(cadence.delay_with_rng(&mut rng), Duration::from_millis(1500));
    }

    #[test]
    fn flex_is_capped_at_interval() {
        let cadence = Cadence::new(Duration::from_secs(10), Duration::from_secs(60));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert!(cadence.delay_with_rng(&mut rng) <= Duration::from_secs(10));
        }
    }

    #[test]
    fn handle_reports_stopped_scheduler() {
        let (scheduler, handle) = Scheduler::new(&SyncConfig::default());
        assert!(handle.sync_now());
        drop(scheduler);
        assert!(!handle.upload_to_folder("abc"));
    }
}

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::session::TokenSession;
use crate::storage::DestinationStore;
use crate::sync::scheduler::{Scheduler, SyncHandle};
use crate::sync::trigger::{CycleReport, SyncExtras, SyncTrigger};

pub struct DaemonRuntime {
    config: DaemonConfig,
    trigger: SyncTrigger<TokenSession>,
    shutdown: CancellationToken,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.sync.state_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create state directory at {:?}",
                    config.sync.state_dir
                )
            })?;
        if config.session.account.is_none() {
            warn!("DRIVESYNC_ACCOUNT is not set; sync cycles will be skipped");
        }

        let shutdown = CancellationToken::new();
        let store = DestinationStore::new(config.sync.destination_path());
        let trigger = SyncTrigger::new(
            TokenSession::new(config.session.clone()),
            store,
            &config.sync,
        )
        .with_cancellation(shutdown.child_token());

        Ok(Self {
            config,
            trigger,
            shutdown,
        })
    }

    pub async fn run_once(&self, extras: SyncExtras) -> CycleReport {
        self.trigger.run_cycle(extras).await
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            account = self.config.session.account.as_deref().unwrap_or("<none>"),
            interval_secs = self.config.sync.interval.as_secs(),
            flex_secs = self.config.sync.flex.as_secs(),
            state = %self.config.sync.destination_path().display(),
            "started"
        );

        let (scheduler, handle) = Scheduler::new(&self.config.sync);
        let shutdown = self.shutdown.clone();
        let (cycles, (), signal) = tokio::join!(
            scheduler.run(&self.trigger, self.shutdown.clone()),
            forward_sync_signals(handle, self.shutdown.clone()),
            async {
                let res = tokio::signal::ctrl_c().await;
                shutdown.cancel();
                res
            }
        );
        signal.context("failed waiting for shutdown signal")?;
        info!(cycles, "stopped");
        Ok(())
    }
}

/// SIGUSR1 requests an immediate sync cycle.
#[cfg(unix)]
async fn forward_sync_signals(handle: SyncHandle, shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut stream = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!("on-demand sync signal unavailable: {err}");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = stream.recv() => {
                if received.is_none() {
                    break;
                }
                info!("sync requested by signal");
                if !handle.sync_now() {
                    break;
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn forward_sync_signals(_handle: SyncHandle, shutdown: CancellationToken) {
    shutdown.cancelled().await;
}

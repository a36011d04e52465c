use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use drivesync_core::{UploadOutcome, UploadTask};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::session::AccountSession;
use crate::storage::{DestinationPrefs, DestinationStore, DestinationStoreError};
use crate::sync::listener::LoggingListener;
use crate::sync::payload::PayloadSource;

/// Parameters carried with a sync request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncExtras {
    pub manual: bool,
    pub expedited: bool,
    /// Overrides the stored upload-to-folder preference when set.
    pub upload_to_folder: Option<bool>,
    pub folder_id: Option<String>,
}

impl SyncExtras {
    pub fn periodic() -> Self {
        Self::default()
    }

    pub fn manual() -> Self {
        Self {
            manual: true,
            expedited: true,
            ..Self::default()
        }
    }

    pub fn upload_to_folder(folder_id: impl Into<String>) -> Self {
        Self {
            upload_to_folder: Some(true),
            folder_id: Some(folder_id.into()),
            ..Self::manual()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Busy,
    NoAccount,
    Offline,
    ConnectFailed(String),
    StateUnavailable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("sync is disabled"),
            SkipReason::Busy => f.write_str("another sync cycle is running"),
            SkipReason::NoAccount => f.write_str("no sync account is configured"),
            SkipReason::Offline => f.write_str("storage service is unreachable"),
            SkipReason::ConnectFailed(message) => write!(f, "connection failed: {message}"),
            SkipReason::StateUnavailable(message) => {
                write!(f, "destination preferences unavailable: {message}")
            }
        }
    }
}

#[derive(Debug)]
pub enum CycleReport {
    /// The upload task was not invoked.
    Skipped(SkipReason),
    /// A folder upload was requested without a folder id; a selection is
    /// recorded as pending for the next cycle.
    NeedsDestination,
    Completed(UploadOutcome),
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleReport::Completed(Ok(_)))
    }
}

/// Runs at most one upload per sync cycle for a single account.
pub struct SyncTrigger<S: AccountSession> {
    session: S,
    store: DestinationStore,
    payload: PayloadSource,
    chunk_size: usize,
    syncable: AtomicBool,
    cancel: CancellationToken,
    client: Mutex<Option<S::Client>>,
}

impl<S: AccountSession> SyncTrigger<S> {
    pub fn new(session: S, store: DestinationStore, config: &SyncConfig) -> Self {
        Self {
            session,
            store,
            payload: config.payload.clone(),
            chunk_size: config.chunk_size,
            syncable: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            client: Mutex::new(None),
        }
    }

    /// Token honored by running uploads at each stage boundary.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn store(&self) -> &DestinationStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &S {
        &self.session
    }

    pub fn is_syncable(&self) -> bool {
        self.syncable.load(Ordering::SeqCst)
    }

    /// Disabling drops the cached client; later cycles are skipped until
    /// sync is enabled again.
    pub fn set_syncable(&self, syncable: bool) {
        self.syncable.store(syncable, Ordering::SeqCst);
        if !syncable && let Ok(mut client) = self.client.try_lock() {
            client.take();
        }
        info!(syncable, "sync availability changed");
    }

    pub async fn run_cycle(&self, extras: SyncExtras) -> CycleReport {
        if !self.is_syncable() {
            return skipped(SkipReason::Disabled);
        }
        let Ok(mut client_slot) = self.client.try_lock() else {
            return skipped(SkipReason::Busy);
        };
        let Some(account) = self.session.account().map(str::to_string) else {
            return skipped(SkipReason::NoAccount);
        };
        if !self.session.is_online().await {
            return skipped(SkipReason::Offline);
        }

        let client = match client_slot.take() {
            Some(client) => client,
            None => match self.session.connect().await {
                Ok(client) => client,
                Err(err) => return skipped(SkipReason::ConnectFailed(err.to_string())),
            },
        };

        let mut prefs = match self.resolve_prefs(&extras).await {
            Ok(prefs) => prefs,
            Err(err) => {
                self.park_client(&mut client_slot, client);
                return skipped(SkipReason::StateUnavailable(err.to_string()));
            }
        };

        info!(
            %account,
            manual = extras.manual,
            to_folder = prefs.upload_to_folder,
            "sync cycle started"
        );
        let request = self
            .payload
            .request(prefs.destination(), OffsetDateTime::now_utc());
        let mut listener = LoggingListener::new(account.as_str(), request.title());
        let outcome = UploadTask::new(request)
            .with_listener(&mut listener)
            .with_cancellation(self.cancel.clone())
            .with_chunk_size(self.chunk_size)
            .run(&client)
            .await;
        self.park_client(&mut client_slot, client);

        if matches!(&outcome, Err(err) if err.is_missing_destination()) {
            prefs.folder_selection_pending = true;
            if let Err(err) = self.store.save(&prefs).await {
                warn!("failed to record pending folder selection: {err}");
            }
            info!(%account, "folder upload requested without a folder; selection required");
            return CycleReport::NeedsDestination;
        }
        CycleReport::Completed(outcome)
    }

    /// Keeps the client for the next cycle unless sync was disabled meanwhile.
    fn park_client(&self, slot: &mut Option<S::Client>, client: S::Client) {
        if self.is_syncable() {
            *slot = Some(client);
        }
    }

    async fn resolve_prefs(
        &self,
        extras: &SyncExtras,
    ) -> Result<DestinationPrefs, DestinationStoreError> {
        let mut prefs = self.store.load().await?;
        let mut changed = false;
        if let Some(flag) = extras.upload_to_folder
            && flag != prefs.upload_to_folder
        {
            prefs.upload_to_folder = flag;
            changed = true;
        }
        if let Some(id) = extras
            .folder_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            && prefs.folder_id.as_deref() != Some(id)
        {
            prefs.folder_id = Some(id.to_string());
            prefs.folder_selection_pending = false;
            changed = true;
        }
        if changed {
            self.store.save(&prefs).await?;
        }
        Ok(prefs)
    }
}

fn skipped(reason: SkipReason) -> CycleReport {
    info!("sync cycle skipped: {reason}");
    CycleReport::Skipped(reason)
}

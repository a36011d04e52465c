use std::time::Duration;

use drivesync_core::{DriveClient, DriveClientError, RemoteStorage};
use thiserror::Error;
use tokio::net::TcpStream;
use url::Url;

use crate::config::SessionConfig;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no access token configured for account {0}")]
    MissingToken(String),
    #[error("drive client setup failed: {0}")]
    Client(#[from] DriveClientError),
}

/// Account state the sync trigger checks before each cycle.
#[allow(async_fn_in_trait)]
pub trait AccountSession {
    type Client: RemoteStorage;

    fn account(&self) -> Option<&str>;

    async fn is_online(&self) -> bool;

    /// Returns a ready, authenticated client for the account.
    async fn connect(&self) -> Result<Self::Client, SessionError>;
}

/// Session backed by a pre-issued access token.
pub struct TokenSession {
    config: SessionConfig,
}

impl TokenSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl AccountSession for TokenSession {
    type Client = DriveClient;

    fn account(&self) -> Option<&str> {
        self.config.account.as_deref()
    }

    async fn is_online(&self) -> bool {
        probe_reachable(&self.config.base_url).await
    }

    async fn connect(&self) -> Result<DriveClient, SessionError> {
        let token = self.config.token.as_deref().ok_or_else(|| {
            SessionError::MissingToken(self.account().unwrap_or_default().to_string())
        })?;
        Ok(DriveClient::with_base_url(self.config.base_url.as_str(), token)?)
    }
}

async fn probe_reachable(base_url: &Url) -> bool {
    let Some(host) = base_url.host_str() else {
        return false;
    };
    let Some(port) = base_url.port_or_known_default() else {
        return false;
    };
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use drivesync_core::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use url::Url;

use crate::sync::payload::PayloadSource;

const DEFAULT_BASE_URL: &str = "https://drive.example.com";
const DEFAULT_INTERVAL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_UPLOAD_TITLE: &str = "drivesync-heartbeat.txt";
const STATE_DIR_NAME: &str = "drivesync";
const DESTINATION_FILE_NAME: &str = "destination.json";

/// Cadence and payload settings for the sync trigger.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub interval: Duration,
    /// Width of the window before `interval` in which a periodic cycle may fire.
    pub flex: Duration,
    pub sync_on_start: bool,
    pub state_dir: PathBuf,
    pub payload: PayloadSource,
    pub chunk_size: usize,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let interval = Duration::from_secs(read_u64_env(
            "DRIVESYNC_INTERVAL_SECS",
            DEFAULT_INTERVAL_SECS,
        ));
        let flex = std::env::var("DRIVESYNC_FLEX_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| default_flex(interval))
            .min(interval);
        let sync_on_start = read_bool_env("DRIVESYNC_SYNC_ON_START", true);
        let state_dir = std::env::var("DRIVESYNC_STATE_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(default_state_dir);
        let title = std::env::var("DRIVESYNC_UPLOAD_TITLE").ok();
        let payload = match std::env::var("DRIVESYNC_UPLOAD_SOURCE") {
            Ok(value) if !value.trim().is_empty() => PayloadSource::File {
                path: expand_with_home(value.trim(), &home),
                title,
            },
            _ => PayloadSource::Generated {
                title: title.unwrap_or_else(|| DEFAULT_UPLOAD_TITLE.to_string()),
            },
        };
        let chunk_size = clamp_chunk_size(read_u64_env(
            "DRIVESYNC_CHUNK_SIZE",
            DEFAULT_CHUNK_SIZE as u64,
        ));

        Ok(Self {
            interval,
            flex,
            sync_on_start,
            state_dir,
            payload,
            chunk_size,
        })
    }

    pub fn destination_path(&self) -> PathBuf {
        self.state_dir.join(DESTINATION_FILE_NAME)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        let interval = Duration::from_secs(DEFAULT_INTERVAL_SECS);
        Self {
            interval,
            flex: default_flex(interval),
            sync_on_start: true,
            state_dir: default_state_dir(),
            payload: PayloadSource::Generated {
                title: DEFAULT_UPLOAD_TITLE.to_string(),
            },
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Account the daemon syncs for. Credentials are issued elsewhere.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub account: Option<String>,
    pub token: Option<String>,
    pub base_url: Url,
}

impl SessionConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url =
            std::env::var("DRIVESYNC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("invalid DRIVESYNC_BASE_URL: {base_url}"))?;
        Ok(Self {
            account: read_non_empty_env("DRIVESYNC_ACCOUNT"),
            token: read_non_empty_env("DRIVESYNC_TOKEN"),
            base_url,
        })
    }
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub sync: SyncConfig,
    pub session: SessionConfig,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            sync: SyncConfig::from_env()?,
            session: SessionConfig::from_env()?,
        })
    }
}

fn clamp_chunk_size(value: u64) -> usize {
    usize::try_from(value)
        .unwrap_or(MAX_CHUNK_SIZE)
        .clamp(1, MAX_CHUNK_SIZE)
}

pub(crate) fn default_flex(interval: Duration) -> Duration {
    interval / 3
}

fn default_state_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STATE_DIR_NAME)
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}

fn read_non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

use std::io;
use std::path::PathBuf;

use drivesync_core::Destination;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DestinationStoreError {
    #[error("destination store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("destination store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

/// Upload target carried between sync cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationPrefs {
    #[serde(default)]
    pub upload_to_folder: bool,
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Set when a folder upload had no folder id; cleared once one is chosen.
    #[serde(default)]
    pub folder_selection_pending: bool,
}

impl DestinationPrefs {
    /// A folder upload without an id yields `Folder("")`, which the upload
    /// task rejects before any remote call.
    pub fn destination(&self) -> Destination {
        if self.upload_to_folder {
            Destination::Folder(self.folder_id.clone().unwrap_or_default())
        } else {
            Destination::Root
        }
    }
}

pub struct DestinationStore {
    path: PathBuf,
}

impl DestinationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<DestinationPrefs, DestinationStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(DestinationPrefs::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, prefs: &DestinationPrefs) -> Result<(), DestinationStoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(prefs)?;
        let partial = self.path.with_extension("json.partial");
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(partial, &self.path).await?;
        Ok(())
    }

    /// Stores the folder chosen by a picker and switches uploads to it.
    pub async fn select_folder(&self, folder_id: &str) -> Result<DestinationPrefs, DestinationStoreError> {
        let prefs = DestinationPrefs {
            upload_to_folder: true,
            folder_id: Some(folder_id.trim().to_string()).filter(|id| !id.is_empty()),
            folder_selection_pending: false,
        };
        self.save(&prefs).await?;
        Ok(prefs)
    }

    /// Switches uploads back to the account root. A corrupt file is replaced.
    pub async fn use_root(&self) -> Result<DestinationPrefs, DestinationStoreError> {
        let mut prefs = match self.load().await {
            Ok(prefs) => prefs,
            Err(DestinationStoreError::Json(_)) => DestinationPrefs::default(),
            Err(err) => return Err(err),
        };
        prefs.upload_to_folder = false;
        prefs.folder_selection_pending = false;
        self.save(&prefs).await?;
        Ok(prefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_root_defaults() {
        let dir = tempdir().unwrap();
        let store = DestinationStore::new(dir.path().join("destination.json"));

        let prefs = store.load().await.unwrap();

        assert_eq!(prefs, DestinationPrefs::default());
        assert_eq!(prefs.destination(), Destination::Root);
    }

    #[tokio::test]
    async fn saved_prefs_survive_reload() {
        let dir = tempdir().unwrap();
        let store = DestinationStore::new(dir.path().join("nested/destination.json"));

        store.select_folder("DriveId:abc").await.unwrap();
        let prefs = store.load().await.unwrap();

        assert!(prefs.upload_to_folder);
        assert_eq!(prefs.destination(), Destination::Folder("DriveId:abc".into()));
        assert!(!dir.path().join("nested/destination.json.partial").exists());
    }

    #[tokio::test]
    async fn use_root_keeps_folder_id_for_later() {
        let dir = tempdir().unwrap();
        let store = DestinationStore::new(dir.path().join("destination.json"));
        store.select_folder("abc").await.unwrap();

        let prefs = store.use_root().await.unwrap();

        assert_eq!(prefs.destination(), Destination::Root);
        assert_eq!(prefs.folder_id.as_deref(), Some("abc"));
    }

    #[test]
    fn folder_upload_without_id_yields_empty_folder() {
        let prefs = DestinationPrefs {
            upload_to_folder: true,
            folder_id: None,
            folder_selection_pending: false,
        };
        assert_eq!(prefs.destination(), Destination::Folder(String::new()));
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("destination.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = DestinationStore::new(path).load().await.unwrap_err();

        assert!(matches!(err, DestinationStoreError::Json(_)));
    }

    #[tokio::test]
    async fn use_root_recovers_from_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("destination.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = DestinationStore::new(path);

        let prefs = store.use_root().await.unwrap();

        assert_eq!(prefs, DestinationPrefs::default());
        assert_eq!(store.load().await.unwrap().destination(), Destination::Root);
    }
}

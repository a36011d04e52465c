use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TEXT_PLAIN: &str = "text/plain";

/// Failure reported by a remote storage call.
///
/// Only success or failure is observable; the message is kept verbatim so it
/// can be surfaced to whoever started the upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Writable buffer on the remote side that becomes a file's content once a
/// file is created from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentsHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle(pub String);

impl fmt::Display for ContentsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FolderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes attached to a file when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFile {
    pub title: String,
    pub mime_type: String,
}

impl NewFile {
    pub fn text(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            mime_type: TEXT_PLAIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub title: String,
    pub mime_type: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Capability set of an authenticated remote storage account.
///
/// Implementations own transport and auth. Callers borrow a connected handle
/// and never close or reconnect it.
#[allow(async_fn_in_trait)]
pub trait RemoteStorage {
    async fn create_contents(&self) -> Result<ContentsHandle, RemoteError>;

    /// Appends `bytes` to the contents buffer.
    async fn write(&self, contents: &ContentsHandle, bytes: &[u8]) -> Result<(), RemoteError>;

    async fn root_folder(&self) -> Result<FolderHandle, RemoteError>;

    /// Decodes an encoded folder identifier into a folder handle.
    fn resolve_folder(&self, id: &str) -> Result<FolderHandle, RemoteError>;

    async fn create_file(
        &self,
        folder: &FolderHandle,
        metadata: &NewFile,
        contents: &ContentsHandle,
    ) -> Result<FileHandle, RemoteError>;

    async fn fetch_metadata(&self, file: &FileHandle) -> Result<FileMetadata, RemoteError>;
}

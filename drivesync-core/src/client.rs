use std::fmt;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::storage::{
    ContentsHandle, FileHandle, FileMetadata, FolderHandle, NewFile, RemoteError, RemoteStorage,
};

const DEFAULT_BASE_URL: &str = "https://drive.example.com";
const ENCODED_ID_PREFIX: &str = "DriveId:";

#[derive(Debug, Error)]
pub enum DriveClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("invalid folder id: {0:?}")]
    InvalidFolderId(String),
}

impl DriveClientError {
    /// Message surfaced to upload listeners: the provider's body when there
    /// is one, the status reason otherwise.
    pub fn provider_message(&self) -> String {
        match self {
            DriveClientError::Api { status, body } if body.trim().is_empty() => status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string()),
            DriveClientError::Api { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

impl From<DriveClientError> for RemoteError {
    fn from(err: DriveClientError) -> Self {
        RemoteError::new(err.provider_message())
    }
}

/// REST binding of the drive account.
#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveClientError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveClientError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn new_contents(&self) -> Result<ContentsHandle, DriveClientError> {
        let url = self.endpoint("/v1/contents")?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let created: IdResponse = Self::handle_response(response).await?;
        Ok(ContentsHandle(created.id))
    }

    pub async fn append_contents(
        &self,
        contents: &ContentsHandle,
        bytes: &[u8],
    ) -> Result<(), DriveClientError> {
        let url = self.endpoint(&format!("/v1/contents/{}", contents.0))?;
        let response = self
            .http
            .patch(url)
            .header("Authorization", self.auth_header_value())
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;
        Self::check_status(response).await
    }

    pub async fn get_root_folder(&self) -> Result<FolderHandle, DriveClientError> {
        let url = self.endpoint("/v1/folders/root")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let root: IdResponse = Self::handle_response(response).await?;
        Ok(FolderHandle(root.id))
    }

    pub async fn create_file_in(
        &self,
        folder: &FolderHandle,
        metadata: &NewFile,
        contents: &ContentsHandle,
    ) -> Result<FileHandle, DriveClientError> {
        let url = self.endpoint("/v1/files")?;
        let body = CreateFileBody {
            title: &metadata.title,
            mime_type: &metadata.mime_type,
            parent_id: &folder.0,
            contents_id: &contents.0,
        };
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&body)
            .send()
            .await?;
        let created: IdResponse = Self::handle_response(response).await?;
        Ok(FileHandle(created.id))
    }

    pub async fn get_file_metadata(&self, file: &FileHandle) -> Result<FileMetadata, DriveClientError> {
        let url = self.endpoint(&format!("/v1/files/{}", file.0))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveClientError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveClientError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveClientError::Api { status, body })
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<(), DriveClientError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveClientError::Api { status, body })
        }
    }
}

impl RemoteStorage for DriveClient {
    async fn create_contents(&self) -> Result<ContentsHandle, RemoteError> {
        Ok(self.new_contents().await?)
    }

    async fn write(&self, contents: &ContentsHandle, bytes: &[u8]) -> Result<(), RemoteError> {
        Ok(self.append_contents(contents, bytes).await?)
    }

    async fn root_folder(&self) -> Result<FolderHandle, RemoteError> {
        Ok(self.get_root_folder().await?)
    }

    fn resolve_folder(&self, id: &str) -> Result<FolderHandle, RemoteError> {
        Ok(decode_folder_id(id)?)
    }

    async fn create_file(
        &self,
        folder: &FolderHandle,
        metadata: &NewFile,
        contents: &ContentsHandle,
    ) -> Result<FileHandle, RemoteError> {
        Ok(self.create_file_in(folder, metadata, contents).await?)
    }

    async fn fetch_metadata(&self, file: &FileHandle) -> Result<FileMetadata, RemoteError> {
        Ok(self.get_file_metadata(file).await?)
    }
}

/// Decodes the encoded form produced by folder pickers (`DriveId:<id>`) or a
/// bare id.
pub fn decode_folder_id(encoded: &str) -> Result<FolderHandle, DriveClientError> {
    let trimmed = encoded.trim();
    let id = trimmed.strip_prefix(ENCODED_ID_PREFIX).unwrap_or(trimmed);
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if !valid {
        return Err(DriveClientError::InvalidFolderId(encoded.to_string()));
    }
    Ok(FolderHandle(id.to_string()))
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateFileBody<'a> {
    title: &'a str,
    mime_type: &'a str,
    parent_id: &'a str,
    contents_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_prefixed_and_bare_ids() {
        assert_eq!(
            decode_folder_id("DriveId:0B7abc_-9").unwrap(),
            FolderHandle("0B7abc_-9".into())
        );
        assert_eq!(
            decode_folder_id("  folder42 ").unwrap(),
            FolderHandle("folder42".into())
        );
    }

    #[test]
    fn rejects_empty_or_malformed_ids() {
        assert!(decode_folder_id("DriveId:").is_err());
        assert!(decode_folder_id("").is_err());
        assert!(decode_folder_id("../etc").is_err());
    }

    #[test]
    fn debug_output_hides_token() {
        let client = DriveClient::with_base_url("http://127.0.0.1:9", "secret-token").unwrap();
        let rendered = format!("{client:?}");
        assert!(rendered.contains("127.0.0.1:9"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn provider_message_prefers_body() {
        let err = DriveClientError::Api {
            status: StatusCode::INSUFFICIENT_STORAGE,
            body: "quota exceeded".into(),
        };
        assert_eq!(err.provider_message(), "quota exceeded");

        let err = DriveClientError::Api {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert_eq!(err.provider_message(), "Unauthorized");
    }
}

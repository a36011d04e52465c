use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::storage::{ContentsHandle, FileMetadata, NewFile, RemoteError, RemoteStorage};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
/// Largest chunk a file payload is read in.
pub const MAX_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Remote steps of an upload, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    CreatingContents,
    WritingPayload,
    CreatingFile,
    FetchingMetadata,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::CreatingContents,
        Stage::WritingPayload,
        Stage::CreatingFile,
        Stage::FetchingMetadata,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::CreatingContents => "creating contents",
            Stage::WritingPayload => "writing payload",
            Stage::CreatingFile => "creating file",
            Stage::FetchingMetadata => "fetching metadata",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Root,
    /// Encoded folder identifier, decoded by the storage client.
    Folder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    /// Local file streamed in chunks instead of being held in memory.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    title: String,
    payload: Payload,
    destination: Destination,
}

impl UploadRequest {
    pub fn new(title: impl Into<String>, payload: Payload, destination: Destination) -> Self {
        Self {
            title: title.into(),
            payload,
            destination,
        }
    }

    pub fn text(title: impl Into<String>, text: impl Into<String>, destination: Destination) -> Self {
        Self::new(
            title,
            Payload::Bytes(text.into().into_bytes()),
            destination,
        )
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload destination folder id is missing")]
    MissingDestination,
    #[error("{stage} failed: {source}")]
    Remote {
        stage: Stage,
        #[source]
        source: RemoteError,
    },
    #[error("{stage} failed: local I/O error: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: io::Error,
    },
    #[error("upload cancelled before {stage}")]
    Cancelled { stage: Stage },
}

impl UploadError {
    /// Stage the failure belongs to, `None` when no stage was entered.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UploadError::MissingDestination => None,
            UploadError::Remote { stage, .. }
            | UploadError::Io { stage, .. }
            | UploadError::Cancelled { stage } => Some(*stage),
        }
    }

    /// Provider message for remote failures, otherwise a description.
    pub fn message(&self) -> String {
        match self {
            UploadError::Remote { source, .. } => source.message().to_string(),
            UploadError::Io { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_missing_destination(&self) -> bool {
        matches!(self, UploadError::MissingDestination)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSuccess {
    pub file_id: String,
    pub bytes_written: u64,
    pub metadata: FileMetadata,
}

pub type UploadOutcome = Result<UploadSuccess, UploadError>;

/// Observer of a single upload run.
///
/// Callbacks run synchronously on whatever context drives the task. A run
/// emits `on_started` once, `on_progress` once per entered stage and then
/// exactly one of `on_success` or `on_error`.
pub trait TaskListener {
    fn on_started(&mut self) {}

    fn on_progress(&mut self, _stage: Stage) {}

    fn on_success(&mut self, success: &UploadSuccess);

    fn on_error(&mut self, error: &UploadError);
}

/// Drives one upload through the four remote stages.
///
/// `run` consumes the task; nothing is retried and the first failure ends the
/// run.
pub struct UploadTask<'a> {
    request: UploadRequest,
    listener: Option<&'a mut dyn TaskListener>,
    cancel: Option<CancellationToken>,
    chunk_size: usize,
}

impl<'a> UploadTask<'a> {
    pub fn new(request: UploadRequest) -> Self {
        Self {
            request,
            listener: None,
            cancel: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_listener(mut self, listener: &'a mut dyn TaskListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub async fn run<C: RemoteStorage>(self, client: &C) -> UploadOutcome {
        let UploadTask {
            request,
            listener,
            cancel,
            chunk_size,
        } = self;
        let mut reporter = Reporter { listener, cancel };

        reporter.started();
        let outcome = execute(&request, client, &mut reporter, chunk_size).await;
        reporter.finish(&outcome);
        outcome
    }
}

async fn execute<C: RemoteStorage>(
    request: &UploadRequest,
    client: &C,
    reporter: &mut Reporter<'_>,
    chunk_size: usize,
) -> UploadOutcome {
    if let Destination::Folder(id) = request.destination()
        && id.trim().is_empty()
    {
        return Err(UploadError::MissingDestination);
    }

    reporter.enter(Stage::CreatingContents)?;
    let contents = client
        .create_contents()
        .await
        .map_err(remote(Stage::CreatingContents))?;

    reporter.enter(Stage::WritingPayload)?;
    let bytes_written = write_payload(client, &contents, request.payload(), chunk_size).await?;

    reporter.enter(Stage::CreatingFile)?;
    let folder = match request.destination() {
        Destination::Root => client.root_folder().await,
        Destination::Folder(id) => client.resolve_folder(id.trim()),
    }
    .map_err(remote(Stage::CreatingFile))?;
    let file = client
        .create_file(&folder, &NewFile::text(request.title()), &contents)
        .await
        .map_err(remote(Stage::CreatingFile))?;

    reporter.enter(Stage::FetchingMetadata)?;
    let metadata = client
        .fetch_metadata(&file)
        .await
        .map_err(remote(Stage::FetchingMetadata))?;

    let file_id = if metadata.id.is_empty() {
        file.0
    } else {
        metadata.id.clone()
    };
    Ok(UploadSuccess {
        file_id,
        bytes_written,
        metadata,
    })
}

async fn write_payload<C: RemoteStorage>(
    client: &C,
    contents: &ContentsHandle,
    payload: &Payload,
    chunk_size: usize,
) -> Result<u64, UploadError> {
    match payload {
        Payload::Bytes(bytes) => {
            client
                .write(contents, bytes)
                .await
                .map_err(remote(Stage::WritingPayload))?;
            Ok(bytes.len() as u64)
        }
        Payload::File(path) => {
            let mut file = tokio::fs::File::open(path)
                .await
                .map_err(local_io(Stage::WritingPayload))?;
            let len = file
                .metadata()
                .await
                .map_err(local_io(Stage::WritingPayload))?
                .len();
            let buf_len =
                usize::try_from(len).map_or(chunk_size, |len| chunk_size.min(len.max(1)));
            let mut buf = vec![0u8; buf_len];
            let mut total = 0u64;
            loop {
                let read = fill_chunk(&mut file, &mut buf)
                    .await
                    .map_err(local_io(Stage::WritingPayload))?;
                if read == 0 {
                    break;
                }
                client
                    .write(contents, &buf[..read])
                    .await
                    .map_err(remote(Stage::WritingPayload))?;
                total = total.saturating_add(read as u64);
            }
            Ok(total)
        }
    }
}

/// Reads until `buf` is full or the source is exhausted, so every chunk but
/// the last has the configured size.
async fn fill_chunk<R: AsyncRead + Unpin>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = source.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

fn remote(stage: Stage) -> impl FnOnce(RemoteError) -> UploadError {
    move |source| UploadError::Remote { stage, source }
}

fn local_io(stage: Stage) -> impl FnOnce(io::Error) -> UploadError {
    move |source| UploadError::Io { stage, source }
}

struct Reporter<'a> {
    listener: Option<&'a mut dyn TaskListener>,
    cancel: Option<CancellationToken>,
}

impl Reporter<'_> {
    fn started(&mut self) {
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.on_started();
        }
    }

    fn enter(&mut self, stage: Stage) -> Result<(), UploadError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(UploadError::Cancelled { stage });
        }
        debug!(%stage, "upload stage started");
        if let Some(listener) = self.listener.as_deref_mut() {
            listener.on_progress(stage);
        }
        Ok(())
    }

    fn finish(&mut self, outcome: &UploadOutcome) {
        let Some(listener) = self.listener.as_deref_mut() else {
            return;
        };
        match outcome {
            Ok(success) => listener.on_success(success),
            Err(err) => listener.on_error(err),
        }
    }
}

mod client;
mod storage;
mod task;

pub use client::{DriveClient, DriveClientError, decode_folder_id};
pub use storage::{
    ContentsHandle, FileHandle, FileMetadata, FolderHandle, NewFile, RemoteError, RemoteStorage,
    TEXT_PLAIN,
};
pub use task::{
    DEFAULT_CHUNK_SIZE, Destination, MAX_CHUNK_SIZE, Payload, Stage, TaskListener, UploadError,
    UploadOutcome, UploadRequest, UploadSuccess, UploadTask,
};

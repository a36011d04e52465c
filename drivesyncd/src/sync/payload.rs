use std::path::PathBuf;

use drivesync_core::{Destination, Payload, UploadRequest};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// What a sync cycle uploads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadSource {
    /// Local file streamed as-is; the title defaults to the file name.
    File {
        path: PathBuf,
        title: Option<String>,
    },
    /// Small text note stamped with the cycle time.
    Generated { title: String },
}

impl PayloadSource {
    pub fn request(&self, destination: Destination, now: OffsetDateTime) -> UploadRequest {
        match self {
            PayloadSource::File { path, title } => {
                let title = title.clone().unwrap_or_else(|| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "upload.bin".to_string())
                });
                UploadRequest::new(title, Payload::File(path.clone()), destination)
            }
            PayloadSource::Generated { title } => {
                UploadRequest::text(title.clone(), heartbeat_text(now), destination)
            }
        }
    }
}

fn heartbeat_text(now: OffsetDateTime) -> String {
    let stamp = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("drivesync heartbeat {stamp}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_payload_carries_timestamp() {
        let source = PayloadSource::Generated {
            title: "beat.txt".into(),
        };
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();

        let request = source.request(Destination::Root, now);

        assert_eq!(request.title(), "beat.txt");
        assert_eq!(
            request.payload(),
            &Payload::Bytes(b"drivesync heartbeat 2023-11-14T22:13:20Z\n".to_vec())
        );
    }

    #[test]
    fn file_payload_defaults_title_to_file_name() {
        let source = PayloadSource::File {
            path: PathBuf::from("/var/backups/app.db"),
            title: None,
        };

        let request = source.request(
            Destination::Folder("abc".into()),
            OffsetDateTime::UNIX_EPOCH,
        );

        assert_eq!(request.title(), "app.db");
        assert_eq!(request.destination(), &Destination::Folder("abc".into()));
        assert_eq!(
            request.payload(),
            &Payload::File(PathBuf::from("/var/backups/app.db"))
        );
    }
}

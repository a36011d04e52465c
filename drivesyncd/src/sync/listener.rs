use drivesync_core::{Stage, TaskListener, UploadError, UploadSuccess};
use tracing::{debug, info, warn};

/// Logs upload lifecycle events for one sync cycle.
pub struct LoggingListener {
    account: String,
    title: String,
    stages_entered: usize,
}

impl LoggingListener {
    pub fn new(account: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            title: title.into(),
            stages_entered: 0,
        }
    }
}

impl TaskListener for LoggingListener {
    fn on_started(&mut self) {
        debug!(account = %self.account, title = %self.title, "upload started");
    }

    fn on_progress(&mut self, stage: Stage) {
        self.stages_entered += 1;
        debug!(account = %self.account, %stage, "upload in progress");
    }

    fn on_success(&mut self, success: &UploadSuccess) {
        info!(
            account = %self.account,
            title = %self.title,
            file_id = %success.file_id,
            bytes = success.bytes_written,
            stages = self.stages_entered,
            "upload finished"
        );
    }

    fn on_error(&mut self, error: &UploadError) {
        match error.stage() {
            Some(stage) => warn!(
                account = %self.account,
                title = %self.title,
                %stage,
                stages = self.stages_entered,
                message = %error.message(),
                "upload failed"
            ),
            None => warn!(account = %self.account, title = %self.title, "upload skipped: {error}"),
        }
    }
}

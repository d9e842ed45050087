//! Per-attempt log file with timestamped, durably flushed lines.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::{Dir, OpenOptions};
use chrono::Local;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{FilesystemError, Result, TrainbotError};
use crate::job::JobId;

const FILE_STAMP: &str = "%Y%m%d_%H%M%S";
const LINE_STAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log file for one attempt of one job.
pub(super) struct LogSink {
    path: Utf8PathBuf,
    file: File,
    job_id: JobId,
}

impl LogSink {
    /// Create `training_<stamp>_<short-id>_attempt<N>.log` under `log_dir`,
    /// creating the directory if needed.
    pub(super) async fn create(log_dir: &Utf8Path, job_id: &JobId, attempt: u32) -> Result<Self> {
        tokio::fs::create_dir_all(log_dir)
            .await
            .map_err(|e| io_error(log_dir, &e))?;

        let file_name = format!(
            "training_{}_{}_attempt{attempt}.log",
            Local::now().format(FILE_STAMP),
            job_id.short()
        );
        let dir =
            Dir::open_ambient_dir(log_dir, ambient_authority()).map_err(|e| io_error(log_dir, &e))?;
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        let path = log_dir.join(&file_name);
        let file = dir
            .open_with(&file_name, &options)
            .map_err(|e| io_error(&path, &e))?;

        Ok(Self {
            path,
            file: File::from_std(file.into_std()),
            job_id: job_id.clone(),
        })
    }

    pub(super) fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Decode `chunk`, then append each non-blank line with a timestamp and
    /// mirror it to the tracing sink. The file is synced before returning.
    ///
    /// Returns the number of lines written.
    pub(super) async fn write_chunk(&mut self, chunk: &[u8]) -> Result<usize> {
        let text = String::from_utf8_lossy(chunk);
        let mut written = 0_usize;

        for line in text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
            let stamped = format!("[{}] {line}\n", Local::now().format(LINE_STAMP));
            self.file
                .write_all(stamped.as_bytes())
                .await
                .map_err(|e| io_error(&self.path, &e))?;
            info!(job_id = %self.job_id, "[TRAIN] {line}");
            written = written.saturating_add(1);
        }

        if written > 0 {
            self.file.flush().await.map_err(|e| io_error(&self.path, &e))?;
            self.file
                .sync_data()
                .await
                .map_err(|e| io_error(&self.path, &e))?;
        }
        Ok(written)
    }
}

fn io_error(path: &Utf8Path, error: &std::io::Error) -> TrainbotError {
    FilesystemError::IoError {
        path: path.as_std_path().to_path_buf(),
        message: error.to_string(),
    }
    .into()
}

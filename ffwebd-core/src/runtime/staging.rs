//! Input staging.
//!
//! Every job's input is materialized into a private file under the temp
//! root before the transcoder sees it. URL inputs are streamed through a
//! byte counter enforcing the size cap; local inputs are stat-checked
//! and then copied (never symlinked, so the transcoder only ever reads
//! the private copy).

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::runtime::types::TaskError;

/// A staged input file.
///
/// Dropping the guard removes the file, which is how release-on-every-
/// exit-path is guaranteed: the driver holds the guard for the duration
/// of the run, so the staged file is gone before the task can reach a
/// terminal state.
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
}

impl StagedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Materialize `input_media` into the temp root, bounded by `max_bytes`.
///
/// The returned file is flushed and closed. Cancellation is cooperative:
/// callers drop this future when interrupted, which aborts any in-flight
/// HTTP transfer; the guard (created up front) still removes whatever
/// was partially written.
pub async fn stage(
    client: &reqwest::Client,
    temp_root: &Path,
    input_media: &str,
    task_id: &str,
    max_bytes: u64,
) -> Result<StagedInput, TaskError> {
    let nonce = Uuid::new_v4().simple().to_string();
    let path = temp_root.join(format!("{task_id}_input_{nonce}"));
    let staged = StagedInput { path: path.clone() };

    if input_media.starts_with("http://") || input_media.starts_with("https://") {
        let mut response = client.get(input_media).send().await?;
        if !response.status().is_success() {
            return Err(TaskError::Upstream {
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(&path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(TaskError::InputTooLarge { limit: max_bytes });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        debug!(task_id, bytes = written, "staged URL input");
    } else if input_media.starts_with("data:") {
        return Err(TaskError::UnsupportedScheme {
            scheme: "data".into(),
        });
    } else {
        let meta = tokio::fs::metadata(input_media).await?;
        if meta.len() > max_bytes {
            return Err(TaskError::InputTooLarge { limit: max_bytes });
        }
        tokio::fs::copy(input_media, &path).await?;
        debug!(task_id, bytes = meta.len(), "staged local input");
    }

    Ok(staged)
}

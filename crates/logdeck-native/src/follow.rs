use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use logdeck_logs::LogParser;
use logdeck_types::{RawLogRecord, now_millis};

use crate::hub::NativeLogHub;

#[derive(Clone, Debug)]
pub struct FollowOptions {
    /// How often to check the file for new data
    pub poll_interval: Duration,
    /// Emit the existing content first instead of starting at the end
    pub from_start: bool,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            from_start: false,
        }
    }
}

/// Tails a log file, emitting each batch of complete new lines through a hub.
///
/// A file that shrinks is treated as rotated and read again from the start.
pub struct FileFollower {
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FileFollower {
    /// Must be called within a tokio runtime
    pub fn start(path: PathBuf, hub: NativeLogHub, options: FollowOptions) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(follow_file(path, hub, options, cancel.clone()));

        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FileFollower {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read position and the trailing partial line
struct Cursor {
    position: u64,
    partial: Vec<u8>,
}

async fn follow_file(
    path: PathBuf,
    hub: NativeLogHub,
    options: FollowOptions,
    cancel: CancellationToken,
) {
    let position = if options.from_start {
        0
    } else {
        tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .unwrap_or_default()
    };
    let mut cursor = Cursor {
        position,
        partial: Vec::new(),
    };
    let mut last_ts = now_millis();

    tracing::debug!(path = %path.display(), position, "following log file");

    loop {
        match read_new_lines(&path, &mut cursor).await {
            Ok(lines) if !lines.is_empty() => {
                let batch: Vec<RawLogRecord> = lines
                    .iter()
                    .filter_map(|line| {
                        let entry = LogParser::parse_line(line, last_ts)?;
                        last_ts = entry.timestamp;
                        Some(RawLogRecord::from(entry))
                    })
                    .collect();
                hub.emit(batch);
            }
            Ok(_) => {}
            // Not created yet, or briefly missing during rotation
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read followed file");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }
}

async fn read_new_lines(path: &PathBuf, cursor: &mut Cursor) -> std::io::Result<Vec<String>> {
    let mut file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();

    if len < cursor.position {
        tracing::debug!(path = %path.display(), "followed file shrank, reading from start");
        cursor.position = 0;
        cursor.partial.clear();
    }
    if len == cursor.position {
        return Ok(Vec::new());
    }

    file.seek(SeekFrom::Start(cursor.position)).await?;
    let mut buf = Vec::new();
    (&mut file)
        .take(len - cursor.position)
        .read_to_end(&mut buf)
        .await?;
    cursor.position += buf.len() as u64;
    cursor.partial.extend_from_slice(&buf);

    let mut lines = Vec::new();
    while let Some(idx) = cursor.partial.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = cursor.partial.drain(..=idx).collect();
        let line = String::from_utf8_lossy(&line);
        lines.push(line.trim_end_matches(['\r', '\n']).to_string());
    }
    Ok(lines)
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use logdeck_logs::SourceError;
use logdeck_types::SessionFile;

/// Extension of session log files written by the backend
const SESSION_EXTENSION: &str = "log";

/// Directory of historical session log files
#[derive(Clone, Debug)]
pub struct SessionDirectory {
    dir: PathBuf,
}

impl SessionDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List `*.log` files. A missing directory means no sessions yet.
    pub async fn list(&self) -> Result<Vec<SessionFile>, SourceError> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXTENSION) {
                continue;
            }

            let metadata = match dir_entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                    continue;
                }
            };

            files.push(SessionFile {
                name: dir_entry.file_name().to_string_lossy().into_owned(),
                path: path.to_string_lossy().into_owned(),
                size_bytes: metadata.len(),
                modified_at: metadata.modified().map(epoch_millis).unwrap_or_default(),
            });
        }

        Ok(files)
    }

    /// Read one file's raw content. Paths outside the directory are refused.
    pub async fn read(&self, path: &str) -> Result<String, SourceError> {
        let resolved = self.resolve(path).await?;
        let bytes = tokio::fs::read(&resolved).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Path for a session file name (not checked for existence)
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn resolve(&self, path: &str) -> Result<PathBuf, SourceError> {
        let not_found = || SourceError::NotFound(path.to_string());

        let root = tokio::fs::canonicalize(&self.dir)
            .await
            .map_err(|_| not_found())?;
        let candidate = Path::new(path);
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.dir.join(candidate)
        };
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| not_found())?;

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(not_found())
        }
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_only_log_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session-1.log"), "hello\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.log")).unwrap();

        let sessions = SessionDirectory::new(dir.path());
        let files = sessions.list().await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "session-1.log");
        assert_eq!(files[0].size_bytes, 6);
        assert!(files[0].modified_at > 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionDirectory::new(dir.path().join("not-yet"));
        assert!(sessions.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_by_listed_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "line\n").unwrap();

        let sessions = SessionDirectory::new(dir.path());
        let files = sessions.list().await.unwrap();
        assert_eq!(sessions.read(&files[0].path).await.unwrap(), "line\n");
        assert_eq!(sessions.read("a.log").await.unwrap(), "line\n");
    }

    #[tokio::test]
    async fn test_refuses_paths_outside_directory() {
        let root = tempfile::tempdir().unwrap();
        let sessions_dir = root.path().join("sessions");
        std::fs::create_dir(&sessions_dir).unwrap();
        std::fs::write(root.path().join("secret.log"), "nope").unwrap();

        let sessions = SessionDirectory::new(&sessions_dir);
        let outside = root.path().join("secret.log");

        assert!(matches!(
            sessions.read(&outside.to_string_lossy()).await,
            Err(SourceError::NotFound(_))
        ));
        assert!(matches!(
            sessions.read("../secret.log").await,
            Err(SourceError::NotFound(_))
        ));
    }
}

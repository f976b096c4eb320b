// src/core/sink.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::error::SinkWriteError;
use crate::core::models::{MatchRecord, OutputFormat};

/// Receives every confirmed match as it is written.
pub trait MatchObserver: Send + Sync {
    fn on_match(&self, record: &MatchRecord);
}

/// Default observer: the notification goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl MatchObserver for LogObserver {
    fn on_match(&self, record: &MatchRecord) {
        info!("{}", record.notification());
    }
}

/// Append-only output file shared by every in-flight domain of one scan.
///
/// Appends are serialised behind an async mutex and each line goes out in
/// a single `write_all` followed by a flush, so records never interleave.
/// Line order across domains is whatever order they finish in.
pub struct ResultSink {
    path: PathBuf,
    file: Mutex<File>,
    format: OutputFormat,
    observer: Arc<dyn MatchObserver>,
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink")
            .field("path", &self.path)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl ResultSink {
    /// Creates (or truncates) the output file.
    pub async fn create(
        path: &Path,
        format: OutputFormat,
        observer: Arc<dyn MatchObserver>,
    ) -> Result<Self, SinkWriteError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|source| SinkWriteError {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            format,
            observer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists one record and notifies the observer.
    pub async fn append(&self, record: &MatchRecord) -> Result<(), SinkWriteError> {
        let line = record.output_line(self.format);
        {
            let mut file = self.file.lock().await;
            file.write_all(line.as_bytes())
                .await
                .map_err(|source| self.write_error(source))?;
            file.flush().await.map_err(|source| self.write_error(source))?;
        }
        self.observer.on_match(record);
        Ok(())
    }

    /// Flushes file contents to disk. Called once the scan has finished.
    pub async fn sync(&self) -> Result<(), SinkWriteError> {
        let file = self.file.lock().await;
        file.sync_data().await.map_err(|source| self.write_error(source))
    }

    fn write_error(&self, source: std::io::Error) -> SinkWriteError {
        SinkWriteError {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Protocol;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Collect(StdMutex<Vec<String>>);

    impl MatchObserver for Collect {
        fn on_match(&self, record: &MatchRecord) {
            self.0.lock().unwrap().push(record.notification());
        }
    }

    fn record(domain: &str, terms: &[&str]) -> MatchRecord {
        MatchRecord::new(
            domain,
            Protocol::Http,
            terms.iter().map(|t| t.to_string()).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_truncates_existing_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "stale line\n").unwrap();

        let sink = ResultSink::create(&path, OutputFormat::WithTerms, Arc::new(LogObserver))
            .await
            .unwrap();
        sink.append(&record("example.com", &["Apache"])).await.unwrap();
        sink.sync().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "example.com: Apache\n");
    }

    #[tokio::test]
    async fn domain_only_format_and_notifications() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let observer = Arc::new(Collect::default());

        let sink = ResultSink::create(&path, OutputFormat::DomainOnly, observer.clone())
            .await
            .unwrap();
        sink.append(&record("a.example", &["x", "y"])).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.example\n");
        assert_eq!(
            observer.0.lock().unwrap().as_slice(),
            ["[*] Found: a.example (http) - Terms: x, y"]
        );
    }

    #[tokio::test]
    async fn concurrent_appends_keep_lines_whole() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let sink = Arc::new(
            ResultSink::create(&path, OutputFormat::WithTerms, Arc::new(LogObserver))
                .await
                .unwrap(),
        );

        let long_term = "T".repeat(4096);
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..64 {
            let sink = sink.clone();
            let term = long_term.clone();
            tasks.spawn(async move {
                let rec = record(&format!("host{i}.example"), &[term.as_str(), "end"]);
                sink.append(&rec).await.unwrap();
            });
        }
        while tasks.join_next().await.is_some() {}

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 64);
        for line in lines {
            assert!(line.starts_with("host"));
            assert!(line.ends_with(&format!("{long_term}, end")));
        }
    }

    #[tokio::test]
    async fn unwritable_destination_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("out.txt");

        let err = ResultSink::create(&path, OutputFormat::WithTerms, Arc::new(LogObserver))
            .await
            .unwrap_err();
        assert_eq!(err.path, path);
    }
}

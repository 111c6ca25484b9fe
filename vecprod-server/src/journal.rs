//! Append-only error log and session journal.
//!
//! Both sinks are fire-and-forget: a line that cannot be written is
//! reported through `tracing` and otherwise dropped, never surfaced to
//! the session that produced it. File access runs on the blocking pool.

use std::fmt;
use std::fs::OpenOptions;
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Local;

/// Local wall-clock time as `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[derive(Debug, Clone)]
struct LogFile {
    path: PathBuf,
}

impl LogFile {
    fn append(&self, line: String) -> impl Future<Output = ()> + Send + 'static {
        let path = self.path.clone();
        async move {
            let result = tokio::task::spawn_blocking({
                let path = path.clone();
                // One write per line so concurrent sessions never interleave mid-line.
                move || {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .and_then(|mut file| file.write_all(line.as_bytes()))
                }
            })
            .await;

            let result = match result {
                Ok(result) => result,
                Err(e) => Err(std::io::Error::other(e)),
            };
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "failed to append log line");
            }
        }
    }
}

/// Timestamped error lines: `[YYYY-MM-DD HH:MM:SS.mmm] ERROR: <message>`.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    file: LogFile,
}

impl ErrorLog {
    /// Log to `path`, creating it on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: LogFile { path: path.into() },
        }
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Append one error line.
    ///
    /// The line is formatted immediately; the returned future performs
    /// the write.
    pub fn record(&self, message: impl fmt::Display) -> impl Future<Output = ()> + Send + 'static {
        self.file
            .append(format!("[{}] ERROR: {}\n", timestamp(), message))
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVerdict {
    /// Authenticated and every vector answered.
    Completed,
    /// Login named no known user.
    UserNotFound,
    /// Response hash did not match.
    AuthFailed,
    /// I/O failure or internal fault.
    Aborted,
}

impl SessionVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionVerdict::Completed => "ok",
            SessionVerdict::UserNotFound => "user_not_found",
            SessionVerdict::AuthFailed => "auth_failed",
            SessionVerdict::Aborted => "aborted",
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone)]
pub struct SessionRecord<'a> {
    pub peer: SocketAddr,
    pub username: Option<&'a str>,
    pub verdict: SessionVerdict,
    pub results: &'a [u32],
}

impl fmt::Display for SessionRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} user={} outcome={} vectors={} results=",
            self.peer,
            self.username.unwrap_or("-"),
            self.verdict.as_str(),
            self.results.len()
        )?;
        for (i, value) in self.results.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// Per-session audit trail.
#[derive(Debug, Clone)]
pub struct Journal {
    file: LogFile,
}

impl Journal {
    /// Journal to `path`, creating it on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: LogFile { path: path.into() },
        }
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Append one session line.
    pub fn record(&self, record: &SessionRecord<'_>) -> impl Future<Output = ()> + Send + 'static {
        self.file.append(format!("[{}] {}\n", timestamp(), record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn is_timestamp(s: &str) -> bool {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.3f").is_ok() && s.len() == 23
    }

    #[test]
    fn test_timestamp_format() {
        assert!(is_timestamp(&timestamp()));
    }

    #[tokio::test]
    async fn test_error_log_line_format() {
        let dir = tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("server.log"));

        log.record("bind failed: address in use").await;
        log.record(format!("vector {} rejected", 3)).await;

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let (stamp, rest) = lines[0].strip_prefix('[').unwrap().split_once("] ").unwrap();
        assert!(is_timestamp(stamp), "bad timestamp: {stamp}");
        assert_eq!(rest, "ERROR: bind failed: address in use");
        assert!(lines[1].ends_with("] ERROR: vector 3 rejected"));
    }

    #[tokio::test]
    async fn test_error_log_appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "previous\n").unwrap();

        ErrorLog::new(&path).record("next").await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("previous\n"));
        assert!(contents.ends_with("ERROR: next\n"));
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_swallowed() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending.
        let log = ErrorLog::new(dir.path());
        log.record("dropped").await;
        let journal = Journal::new(dir.path());
        journal.record(&SessionRecord {
            peer: "127.0.0.1:1".parse().unwrap(),
            username: None,
            verdict: SessionVerdict::Aborted,
            results: &[],
        })
        .await;
    }

    #[tokio::test]
    async fn test_journal_record() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("journal.log"));

        journal.record(&SessionRecord {
            peer: "127.0.0.1:4000".parse().unwrap(),
            username: Some("alice"),
            verdict: SessionVerdict::Completed,
            results: &[1000, 0, u32::MAX],
        })
        .await;
        journal.record(&SessionRecord {
            peer: "127.0.0.1:4001".parse().unwrap(),
            username: None,
            verdict: SessionVerdict::UserNotFound,
            results: &[],
        })
        .await;

        let contents = std::fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[0].ends_with(
            "127.0.0.1:4000 user=alice outcome=ok vectors=3 results=1000,0,4294967295"
        ));
        assert!(lines[1].ends_with("127.0.0.1:4001 user=- outcome=user_not_found vectors=0 results="));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_appends_keep_whole_lines() {
        let dir = tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("server.log"));

        let writers: Vec<_> = (0..32)
            .map(|i| tokio::spawn(log.record(format!("session {} failed", i))))
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 32);
        for i in 0..32 {
            let expected = format!("ERROR: session {} failed", i);
            assert!(lines.iter().any(|line| line.ends_with(&expected)));
        }
    }
}

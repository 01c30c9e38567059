use std::{
    fmt,
    path::{Path, PathBuf},
};

use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::mpsc,
};
use tracing::{debug, warn};

/// Audit events emitted by session lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Joined { name: String },
    Left { name: String },
    Message { name: String, text: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Joined { name } => write!(f, "{name} joined"),
            Event::Left { name } => write!(f, "{name} left"),
            Event::Message { name, text } => write!(f, "{name}: {text}"),
        }
    }
}

/// Handle to the append-only audit sink.
///
/// Recording is best-effort by contract: sessions fire events and move on,
/// and any trouble opening or writing the log file is reported through
/// `tracing` without ever touching chat delivery. The writer task owns the
/// file and serializes appends, so no two events interleave mid-line.
#[derive(Clone)]
pub struct EventLog {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventLog {
    /// Spawns the writer task. With no path configured, events are still
    /// drained and surfaced at debug level only.
    pub fn spawn(path: Option<PathBuf>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_events(path, rx));
        Self { tx }
    }

    pub fn record(&self, event: Event) {
        if self.tx.send(event).is_err() {
            warn!("event log writer is gone, dropping event");
        }
    }
}

async fn write_events(path: Option<PathBuf>, mut rx: mpsc::UnboundedReceiver<Event>) {
    let mut file = match &path {
        Some(path) => open_log_file(path).await,
        None => None,
    };

    while let Some(event) = rx.recv().await {
        debug!(%event, "audit event");
        if let Some(handle) = file.as_mut() {
            let line = format!("{event}\n");
            if let Err(error) = handle.write_all(line.as_bytes()).await {
                warn!(?error, "failed to append audit event, disabling log file");
                file = None;
                continue;
            }
            if let Err(error) = handle.flush().await {
                warn!(?error, "failed to flush audit log");
            }
        }
    }
}

async fn open_log_file(path: &Path) -> Option<File> {
    match OpenOptions::new().append(true).create(true).open(path).await {
        Ok(file) => Some(file),
        Err(error) => {
            warn!(?error, path = %path.display(), "could not open audit log, events will not be persisted");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    #[tokio::test]
    async fn events_render_like_the_audit_format() {
        let joined = Event::Joined { name: "alice".into() };
        let message = Event::Message {
            name: "alice".into(),
            text: "hello".into(),
        };
        let left = Event::Left { name: "alice".into() };

        assert_eq!(joined.to_string(), "alice joined");
        assert_eq!(message.to_string(), "alice: hello");
        assert_eq!(left.to_string(), "alice left");
    }

    #[tokio::test]
    async fn events_are_appended_to_the_log_file() {
        let path = std::env::temp_dir().join(format!("chat-relay-events-{}.log", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let log = EventLog::spawn(Some(path.clone()));
        log.record(Event::Joined { name: "alice".into() });
        log.record(Event::Message {
            name: "alice".into(),
            text: "hello".into(),
        });
        log.record(Event::Left { name: "alice".into() });

        // The writer task appends asynchronously; give it a moment.
        let mut contents = String::new();
        for _ in 0..50 {
            sleep(Duration::from_millis(20)).await;
            contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if contents.lines().count() == 3 {
                break;
            }
        }

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["alice joined", "alice: hello", "alice left"]);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_log_path_is_not_an_error() {
        let log = EventLog::spawn(None);
        log.record(Event::Joined { name: "bob".into() });
        // Nothing to assert beyond "does not panic"; the contract is
        // best-effort.
        sleep(Duration::from_millis(10)).await;
    }
}

//! JSON-lines outbox.
//!
//! Each notification becomes one line appended to the outbox file. The
//! renderer and poster run as separate processes and consume the file, so
//! appends happen under an exclusive `fs2` lock.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::{Notification, NotificationChannel, SendResult};

pub struct OutboxChannel {
    path: PathBuf,
}

impl OutboxChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()?;
        let written = writeln!(file, "{}", line).and_then(|_| file.sync_data());
        file.unlock()?;
        written
    }
}

impl NotificationChannel for OutboxChannel {
    fn name(&self) -> &str {
        "outbox"
    }

    fn required(&self) -> bool {
        true
    }

    fn send(&self, notification: &Notification<'_>) -> SendResult {
        let line = match serde_json::to_string(notification) {
            Ok(line) => line,
            Err(e) => return SendResult::Failed(format!("encode: {}", e)),
        };
        match self.append(&line) {
            Ok(()) => SendResult::Sent,
            Err(e) => SendResult::Failed(format!("{}: {}", self.path.display(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchContext;
    use crate::model::{Decision, Reading, Severity, Trigger};
    use chrono::{TimeZone, Utc};

    fn send_one(channel: &OutboxChannel, level: f64) -> SendResult {
        let at = Utc.with_ymd_and_hms(2026, 1, 10, 15, 0, 0).unwrap();
        let decision = Decision {
            should_notify: true,
            severity: Severity::Critical,
            trigger: Trigger::SevereLevel,
            min_reinterval_minutes: 15,
            reason: format!("severe level ({}cm)", level),
        };
        let reading = Reading::new("56696000", at, level);
        let context = DispatchContext {
            trend_label: "rising (+12cm)".to_string(),
            ..DispatchContext::default()
        };
        channel.send(&Notification {
            created_at: at,
            decision: &decision,
            reading: &reading,
            context: &context,
        })
    }

    #[test]
    fn test_appends_one_json_line_per_notification() {
        let dir = tempfile::tempdir().unwrap();
        let channel = OutboxChannel::new(dir.path().join("out").join("outbox.jsonl"));

        assert_eq!(send_one(&channel, 780.0), SendResult::Sent);
        assert_eq!(send_one(&channel, 790.0), SendResult::Sent);

        let text = fs::read_to_string(channel.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["decision"]["severity"], "critical");
        assert_eq!(first["decision"]["trigger"], "severe_level");
        assert_eq!(first["reading"]["level_cm"], 780.0);
        assert_eq!(first["context"]["trend_label"], "rising (+12cm)");
    }

    #[test]
    fn test_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let channel = OutboxChannel::new(dir.path());
        assert!(matches!(send_one(&channel, 780.0), SendResult::Failed(_)));
    }
}

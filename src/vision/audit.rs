//! Vision audit log - one JSON object per iteration, append-only

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

use crate::broker::VisionAction;

/// One audited vision-loop iteration
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub iter: u32,
    pub action: VisionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(i32, i32)>,
    pub confidence: f64,
    pub reasoning: String,
    pub clamped: bool,
    pub loop_detected: bool,
    pub critical: bool,
    /// "executed", "completed", "rejected", "denied", ...
    pub outcome: String,
}

/// Append-only JSON-lines audit sink. Disabled instances swallow records.
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(enabled: bool, path: PathBuf) -> Self {
        Self {
            path: enabled.then_some(path),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append one record. Audit failures are logged, never fatal.
    pub fn append(&self, record: &AuditRecord) {
        let Some(path) = &self.path else {
            return;
        };

        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "audit: unserializable record");
                return;
            }
        };

        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            warn!(?path, error = %e, "audit: append failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(iter: u32) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            request_id: "req-1".to_string(),
            iter,
            action: VisionAction::Click,
            coordinates: Some((10, 20)),
            confidence: 0.9,
            reasoning: "button".to_string(),
            clamped: false,
            loop_detected: false,
            critical: false,
            outcome: "executed".to_string(),
        }
    }

    #[test]
    fn test_appends_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(true, path.clone());

        log.append(&record(1));
        log.append(&record(2));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["iter"], 1);
        assert_eq!(first["action"], "click");
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::new(false, path.clone());
        log.append(&record(1));
        assert!(!path.exists());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let log = AuditLog::new(true, path.clone());
        log.append(&record(1));
        assert!(path.exists());
    }
}

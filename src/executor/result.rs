//! Execution results and the per-action observability record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

use crate::errors::ErrorKind;

/// Terminal (or planner-synthesized) status of a protocol execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Paused,
    Stopped,
    /// Synthesized by the planner when no status arrived in time
    Timeout,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Stopped => "stopped",
            ExecutionStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Where and how an execution failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub action_index: usize,
    pub action_name: String,
    /// Params after substitution, as the handler saw them
    pub params: Value,
    pub kind: ErrorKind,
    pub trace: String,
}

/// The outcome of one protocol execution, published on the status channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub protocol_id: String,
    pub status: ExecutionStatus,
    pub actions_completed: usize,
    pub actions_total: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context_snapshot: HashMap<String, Value>,
}

impl ExecutionResult {
    /// A synthetic timeout result, used by the planner when the executor
    /// never reported back
    pub fn timed_out(protocol_id: impl Into<String>, waited_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            protocol_id: protocol_id.into(),
            status: ExecutionStatus::Timeout,
            actions_completed: 0,
            actions_total: 0,
            duration_ms: waited_ms,
            started_at: now,
            finished_at: now,
            error: Some(format!("no status received after {} ms", waited_ms)),
            error_details: None,
            context_snapshot: HashMap::new(),
        }
    }

    /// A validation rejection produced before any action ran
    pub fn rejected(protocol_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        let now = Utc::now();
        let message = message.into();
        Self {
            protocol_id: protocol_id.into(),
            status: ExecutionStatus::Failed,
            actions_completed: 0,
            actions_total: 0,
            duration_ms: 0,
            started_at: now,
            finished_at: now,
            error: Some(message.clone()),
            error_details: Some(ErrorDetails {
                action_index: 0,
                action_name: String::new(),
                params: Value::Null,
                kind,
                trace: message,
            }),
            context_snapshot: HashMap::new(),
        }
    }
}

/// Emitted after every executed action (nested macro actions included)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    /// Top-level action index this record belongs to
    pub index: usize,
    pub name: String,
    pub substituted_params: Value,
    /// "ok" or the failure kind
    pub outcome: String,
    pub duration_ms: u64,
}

/// Pluggable per-action progress sink
pub trait ExecutionObserver: Send + Sync {
    fn action_completed(&self, record: &ActionRecord);
}

/// Default sink: one info line per action
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn action_completed(&self, record: &ActionRecord) {
        info!(
            index = record.index,
            name = %record.name,
            outcome = %record.outcome,
            duration_ms = record.duration_ms,
            "action completed"
        );
    }
}

/// Test sink keeping the full record sequence in memory
#[derive(Default)]
pub struct RingBufferObserver {
    records: Mutex<Vec<ActionRecord>>,
}

impl RingBufferObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActionRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl ExecutionObserver for RingBufferObserver {
    fn action_completed(&self, record: &ActionRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

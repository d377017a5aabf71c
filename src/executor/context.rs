//! Per-protocol execution state and the shared control flags

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Mutable state for one protocol execution.
///
/// Variables live in a single flat space: macro `vars` are merged in before
/// the body runs (call vars win on conflict) and writes made inside a macro
/// stay visible to the rest of the protocol.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Variable map seeded by the caller and grown by handler outputs
    pub variables: HashMap<String, Value>,

    /// Index of the top-level action currently executing
    pub action_index: usize,

    /// When execution started
    pub started_at: Instant,
}

impl ExecutionContext {
    pub fn new(initial_vars: HashMap<String, Value>) -> Self {
        Self {
            variables: initial_vars,
            action_index: 0,
            started_at: Instant::now(),
        }
    }

    /// Merge handler outputs into the variable space
    pub fn merge(&mut self, outputs: HashMap<String, Value>) {
        for (key, value) in outputs {
            debug!(%key, "context: merged output variable");
            self.variables.insert(key, value);
        }
    }

    /// Snapshot for `ExecutionResult.context_snapshot`: every variable, with
    /// oversized strings truncated (screenshot payloads have no business in
    /// a result summary).
    pub fn snapshot(&self) -> HashMap<String, Value> {
        const MAX_STRING: usize = 256;
        self.variables
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) if s.len() > MAX_STRING => {
                        Value::String(format!("{}...[{} chars]", &s[..MAX_STRING], s.len()))
                    }
                    other => other.clone(),
                };
                (k.clone(), v)
            })
            .collect()
    }
}

/// Thread-safe pause/stop flags shared with signal handlers and callers.
///
/// Cloning yields a handle to the same flags.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        debug!("control: pause");
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        debug!("control: resume");
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Request a stop. Idempotent; there is no way back to running.
    pub fn stop(&self) {
        debug!("control: stop requested");
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Sleep for `duration`, waking early when a stop is requested.
///
/// Returns `false` when interrupted by a stop. The stop flag is checked
/// every `poll` at most.
pub async fn sleep_cancellable(duration: Duration, poll: Duration, control: &ControlHandle) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if control.is_stop_requested() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites() {
        let mut cx = ExecutionContext::new(HashMap::from([("a".to_string(), json!(1))]));
        cx.merge(HashMap::from([("a".to_string(), json!(2)), ("b".to_string(), json!("x"))]));
        assert_eq!(cx.variables["a"], json!(2));
        assert_eq!(cx.variables["b"], json!("x"));
    }

    #[test]
    fn test_snapshot_truncates_long_strings() {
        let long = "s".repeat(1000);
        let cx = ExecutionContext::new(HashMap::from([("blob".to_string(), json!(long))]));
        let snap = cx.snapshot();
        let s = snap["blob"].as_str().unwrap();
        assert!(s.len() < 300);
        assert!(s.contains("[1000 chars]"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let control = ControlHandle::new();
        assert!(!control.is_stop_requested());
        control.stop();
        assert!(control.is_stop_requested());
        control.stop();
        assert!(control.is_stop_requested());
    }

    #[test]
    fn test_clones_share_flags() {
        let control = ControlHandle::new();
        let other = control.clone();
        other.pause();
        assert!(control.is_paused());
        control.resume();
        assert!(!other.is_paused());
    }

    #[tokio::test]
    async fn test_sleep_cancellable_full_duration() {
        let control = ControlHandle::new();
        let start = Instant::now();
        let completed = sleep_cancellable(Duration::from_millis(60), Duration::from_millis(10), &control).await;
        assert!(completed);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_sleep_cancellable_interrupts() {
        let control = ControlHandle::new();
        let stopper = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.stop();
        });

        let start = Instant::now();
        let completed = sleep_cancellable(Duration::from_secs(5), Duration::from_millis(10), &control).await;
        assert!(!completed);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

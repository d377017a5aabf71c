//! ProtocolExecutor - deterministic sequencing of validated protocols

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::actions::{ActionRegistry, HandlerContext};
use crate::config::{ExecutionConfig, VisionConfig};
use crate::errors::{ActionError, ErrorKind};
use crate::protocol::{Action, Protocol};

use super::context::{ControlHandle, ExecutionContext, sleep_cancellable};
use super::result::{ActionRecord, ErrorDetails, ExecutionObserver, ExecutionResult, ExecutionStatus, TracingObserver};
use super::substitute::substitute_params;

/// Executes already-validated protocols against an action registry.
///
/// One executor can run protocols back to back; each execution gets a fresh
/// [`ExecutionContext`]. The control handle is shared across executions so
/// a SIGINT handler installed once keeps working.
pub struct ProtocolExecutor {
    registry: Arc<ActionRegistry>,
    config: ExecutionConfig,
    vision: VisionConfig,
    control: ControlHandle,
    observer: Arc<dyn ExecutionObserver>,
}

impl ProtocolExecutor {
    pub fn new(registry: Arc<ActionRegistry>, config: ExecutionConfig, vision: VisionConfig) -> Self {
        Self {
            registry,
            config,
            vision,
            control: ControlHandle::new(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the per-action progress sink
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Handle for pause/resume/stop; clones share the same flags
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Execute a protocol to a terminal result. Blocking until terminal.
    pub async fn execute(&self, protocol: &Protocol, initial_vars: HashMap<String, Value>) -> ExecutionResult {
        let protocol_id = protocol.protocol_id();
        let started_at = Utc::now();
        let started = Instant::now();
        let mut cx = ExecutionContext::new(initial_vars);
        let total = protocol.actions.len();
        let mut completed = 0usize;

        info!(%protocol_id, actions = total, dry_run = self.config.dry_run, "execution started");

        for (index, action) in protocol.actions.iter().enumerate() {
            cx.action_index = index;

            let outcome = self.run_action(protocol, action, &mut cx, 0).await;
            match outcome {
                Ok(()) => {
                    completed += 1;
                    if let Err(e) = self.wait_after(action).await {
                        // Only a stop can interrupt the inter-action delay
                        debug!(%protocol_id, index, "stopped during inter-action delay");
                        return self.terminal(protocol_id, started_at, started, completed, total, &cx, Err(e.into()));
                    }
                }
                Err(error) => {
                    // State a handler recorded before failing stays visible
                    // in the result snapshot
                    cx.merge(error.vars.clone());
                    return self.terminal(
                        protocol_id,
                        started_at,
                        started,
                        completed,
                        total,
                        &cx,
                        Err(self.annotate(error, action, &cx)),
                    );
                }
            }
        }

        self.terminal(protocol_id, started_at, started, completed, total, &cx, Ok(()))
    }

    /// Run one action (or macro invocation), merging outputs into the
    /// context. Boxed because macro expansion recurses through here.
    fn run_action<'a>(
        &'a self,
        protocol: &'a Protocol,
        action: &'a Action,
        cx: &'a mut ExecutionContext,
        depth: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>> {
        Box::pin(async move {
            if self.control.is_stop_requested() {
                return Err(ActionError::cancelled("stop requested"));
            }
            self.wait_while_paused().await?;

            if action.is_macro() {
                return self.run_macro(protocol, action, cx, depth).await;
            }

            let substituted = substitute_params(&action.params, &cx.variables)?;
            let start = Instant::now();

            let invocation = if !self.registry.is_enabled(&action.name) {
                Err(ActionError::validation(format!("action \"{}\" is disabled by configuration", action.name)))
            } else if let Some(handler) = self.registry.lookup(&action.name) {
                if self.config.dry_run {
                    info!(name = %action.name, params = %substituted, "dry-run: skipping handler");
                    Ok(crate::actions::ActionOutput::none())
                } else {
                    let hcx = HandlerContext::new(
                        self.registry.deps(),
                        &cx.variables,
                        &self.control,
                        &self.vision,
                        self.config.control_poll_ms,
                    );
                    handler.invoke(&substituted, &hcx).await
                }
            } else {
                Err(ActionError::new(
                    ErrorKind::UnknownAction,
                    format!("no handler registered for \"{}\"", action.name),
                ))
            };

            let record = ActionRecord {
                index: cx.action_index,
                name: action.name.clone(),
                substituted_params: substituted,
                outcome: match &invocation {
                    Ok(_) => "ok".to_string(),
                    Err(e) => e.kind.to_string(),
                },
                duration_ms: start.elapsed().as_millis() as u64,
            };
            self.observer.action_completed(&record);

            match invocation {
                Ok(output) => {
                    cx.merge(output.vars);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Expand a macro invocation in place
    async fn run_macro(
        &self,
        protocol: &Protocol,
        action: &Action,
        cx: &mut ExecutionContext,
        depth: u32,
    ) -> Result<(), ActionError> {
        let name = action
            .macro_name()
            .ok_or_else(|| ActionError::new(ErrorKind::UnresolvedMacro, "macro invocation without params.name"))?;
        let body = protocol
            .macros
            .get(name)
            .ok_or_else(|| ActionError::new(ErrorKind::UnresolvedMacro, format!("macro \"{}\" is not defined", name)))?;

        if depth >= self.config.max_macro_depth {
            return Err(ActionError::new(
                ErrorKind::CyclicMacro,
                format!("macro expansion exceeded depth {}", self.config.max_macro_depth),
            ));
        }

        // Call vars are substituted against the caller's context, then
        // merged into the flat variable space (call vars win).
        if let Some(vars) = action.params.get("vars") {
            let substituted = substitute_params(vars, &cx.variables)?;
            let map = substituted
                .as_object()
                .ok_or_else(|| ActionError::validation("macro vars must be an object"))?;
            for (k, v) in map {
                cx.variables.insert(k.clone(), v.clone());
            }
        }

        debug!(macro_name = %name, depth, body = body.len(), "macro expansion");
        for child in body {
            self.run_action(protocol, child, cx, depth + 1).await?;
            self.wait_after(child).await?;
        }
        Ok(())
    }

    /// Honor `wait_after_ms` (or the configured default) cooperatively
    async fn wait_after(&self, action: &Action) -> Result<(), ActionError> {
        let ms = if action.wait_after_ms > 0 {
            action.wait_after_ms as u64
        } else {
            self.config.default_wait_ms
        };
        if ms == 0 {
            return Ok(());
        }
        let poll = Duration::from_millis(self.config.control_poll_ms);
        if !sleep_cancellable(Duration::from_millis(ms), poll, &self.control).await {
            return Err(ActionError::cancelled("stopped during inter-action delay"));
        }
        Ok(())
    }

    /// Sleep-poll while paused; a stop request wins over pause
    async fn wait_while_paused(&self) -> Result<(), ActionError> {
        while self.control.is_paused() {
            if self.control.is_stop_requested() {
                return Err(ActionError::cancelled("stop requested while paused"));
            }
            tokio::time::sleep(Duration::from_millis(self.config.control_poll_ms)).await;
        }
        Ok(())
    }

    /// Attach the failing action's identity and substituted params
    fn annotate(&self, error: ActionError, action: &Action, cx: &ExecutionContext) -> FailedAction {
        let params = substitute_params(&action.params, &cx.variables).unwrap_or_else(|_| action.params.clone());
        FailedAction {
            error,
            action_name: action.name.clone(),
            params,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn terminal(
        &self,
        protocol_id: String,
        started_at: chrono::DateTime<Utc>,
        started: Instant,
        completed: usize,
        total: usize,
        cx: &ExecutionContext,
        outcome: Result<(), FailedAction>,
    ) -> ExecutionResult {
        let (status, error, error_details) = match outcome {
            Ok(()) => (ExecutionStatus::Success, None, None),
            Err(failed) if failed.error.kind == ErrorKind::Cancelled => (ExecutionStatus::Stopped, None, None),
            Err(failed) => {
                let details = ErrorDetails {
                    action_index: cx.action_index,
                    action_name: failed.action_name,
                    params: failed.params,
                    kind: failed.error.kind,
                    trace: failed.error.to_string(),
                };
                (ExecutionStatus::Failed, Some(failed.error.message), Some(details))
            }
        };

        info!(%protocol_id, %status, completed, total, "execution finished");
        ExecutionResult {
            protocol_id,
            status,
            actions_completed: completed,
            actions_total: total,
            duration_ms: started.elapsed().as_millis() as u64,
            started_at,
            finished_at: Utc::now(),
            error,
            error_details,
            context_snapshot: cx.snapshot(),
        }
    }
}

/// An action failure plus the identity the result's error details need
struct FailedAction {
    error: ActionError,
    action_name: String,
    params: Value,
}

impl From<ActionError> for FailedAction {
    fn from(error: ActionError) -> Self {
        Self {
            error,
            action_name: String::new(),
            params: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::HandlerDeps;
    use crate::broker::MemoryBus;
    use crate::driver::{DriverCall, RecordingDriver};
    use crate::executor::result::RingBufferObserver;
    use crate::mouse::MouseController;
    use crate::protocol::{Metadata, PROTOCOL_VERSION};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn protocol(actions: Vec<Action>, macros: BTreeMap<String, Vec<Action>>) -> Protocol {
        Protocol {
            version: PROTOCOL_VERSION.to_string(),
            metadata: Metadata::new("test"),
            macros,
            actions,
        }
    }

    fn executor_with(driver: Arc<RecordingDriver>) -> ProtocolExecutor {
        let mut registry = ActionRegistry::standard();
        registry.inject(HandlerDeps::new(
            driver.clone(),
            Arc::new(MemoryBus::new()),
            Arc::new(MouseController::new(driver).with_steps(2).with_step_delay(Duration::ZERO)),
        ));
        ProtocolExecutor::new(Arc::new(registry), ExecutionConfig::default(), VisionConfig::default())
    }

    #[tokio::test]
    async fn test_smoke_protocol() {
        let driver = Arc::new(RecordingDriver::new());
        let executor = executor_with(driver.clone());

        let p = protocol(
            vec![Action {
                name: "press_key".to_string(),
                params: json!({"key": "enter"}),
                wait_after_ms: 50,
                description: None,
            }],
            BTreeMap::new(),
        );

        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.actions_completed, 1);
        assert_eq!(result.actions_total, 1);
        assert_eq!(driver.calls(), vec![DriverCall::KeyPress { key: "enter".into() }]);
    }

    #[tokio::test]
    async fn test_macro_with_vars() {
        let driver = Arc::new(RecordingDriver::new());
        let executor = executor_with(driver.clone());

        let mut macros = BTreeMap::new();
        macros.insert(
            "search".to_string(),
            vec![
                Action::new("type", json!({"text": "{{query}}"})),
                Action::new("press_key", json!({"key": "enter"})),
            ],
        );
        let p = protocol(
            vec![Action::new("macro", json!({"name": "search", "vars": {"query": "hello"}}))],
            macros,
        );

        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        // Macro counts once at the top level
        assert_eq!(result.actions_completed, 1);
        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::TypeText { text: "hello".into() },
                DriverCall::KeyPress { key: "enter".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_type_preservation_through_context() {
        let driver = Arc::new(RecordingDriver::new());
        let executor = executor_with(driver.clone());

        let p = protocol(
            vec![Action::new("mouse_move", json!({"x": "{{verified_x}}", "y": "{{verified_y}}", "smooth": false}))],
            BTreeMap::new(),
        );

        let vars = HashMap::from([
            ("verified_x".to_string(), json!(330)),
            ("verified_y".to_string(), json!(450)),
        ]);
        let result = executor.execute(&p, vars).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(driver.calls(), vec![DriverCall::MouseMove { x: 330, y: 450 }]);
    }

    #[tokio::test]
    async fn test_missing_variable_fails_with_details() {
        let driver = Arc::new(RecordingDriver::new());
        let executor = executor_with(driver);

        let p = protocol(
            vec![Action::new("mouse_move", json!({"x": "{{verified_x}}", "y": "{{verified_y}}"}))],
            BTreeMap::new(),
        );

        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        let details = result.error_details.unwrap();
        assert_eq!(details.kind, ErrorKind::VariableMissing);
        assert_eq!(details.action_index, 0);
        assert_eq!(details.action_name, "mouse_move");
        assert!(result.error.unwrap().contains("verified_x"));
    }

    #[tokio::test]
    async fn test_dry_run_completes_without_driver_calls() {
        let driver = Arc::new(RecordingDriver::new());
        let mut registry = ActionRegistry::standard();
        registry.inject(HandlerDeps::new(
            driver.clone(),
            Arc::new(MemoryBus::new()),
            Arc::new(MouseController::new(driver.clone()).with_steps(2).with_step_delay(Duration::ZERO)),
        ));
        let config = ExecutionConfig {
            dry_run: true,
            ..Default::default()
        };
        let executor = ProtocolExecutor::new(Arc::new(registry), config, VisionConfig::default());

        let p = protocol(
            vec![
                Action::new("press_key", json!({"key": "enter"})),
                Action::new("type", json!({"text": "hello"})),
                Action::new("mouse_move", json!({"x": 1, "y": 2})),
            ],
            BTreeMap::new(),
        );

        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.actions_completed, 3);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_wait_after_lower_bound() {
        let driver = Arc::new(RecordingDriver::new());
        let executor = executor_with(driver);

        let p = protocol(
            vec![Action {
                name: "press_key".to_string(),
                params: json!({"key": "a"}),
                wait_after_ms: 80,
                description: None,
            }],
            BTreeMap::new(),
        );

        let start = Instant::now();
        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_stop_terminates_with_stopped() {
        let driver = Arc::new(RecordingDriver::new());
        let executor = executor_with(driver);
        let control = executor.control();

        let p = protocol(
            vec![
                Action {
                    name: "press_key".to_string(),
                    params: json!({"key": "a"}),
                    wait_after_ms: 5_000,
                    description: None,
                },
                Action::new("press_key", json!({"key": "b"})),
            ],
            BTreeMap::new(),
        );

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            control.stop();
        });

        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Stopped);
        assert!(result.actions_completed <= 1);
    }

    #[tokio::test]
    async fn test_pause_resume() {
        let driver = Arc::new(RecordingDriver::new());
        let executor = executor_with(driver);
        let control = executor.control();

        let p = protocol(
            vec![
                Action::new("press_key", json!({"key": "a"})),
                Action::new("press_key", json!({"key": "b"})),
            ],
            BTreeMap::new(),
        );

        control.pause();
        let resumer = {
            let control = control.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                control.resume();
            })
        };

        let start = Instant::now();
        let result = executor.execute(&p, HashMap::new()).await;
        resumer.await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_disabled_action_fails() {
        let driver = Arc::new(RecordingDriver::new());
        let mut registry = ActionRegistry::standard().with_library(crate::config::ActionLibraryConfig {
            enabled_categories: Vec::new(),
            disabled_actions: vec!["press_key".to_string()],
        });
        registry.inject(HandlerDeps::new(
            driver.clone(),
            Arc::new(MemoryBus::new()),
            Arc::new(MouseController::new(driver).with_steps(2).with_step_delay(Duration::ZERO)),
        ));
        let executor =
            ProtocolExecutor::new(Arc::new(registry), ExecutionConfig::default(), VisionConfig::default());

        let p = protocol(vec![Action::new("press_key", json!({"key": "a"}))], BTreeMap::new());
        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error_details.unwrap().kind, ErrorKind::ValidationFailure);
    }

    #[tokio::test]
    async fn test_observer_sees_nested_actions() {
        let driver = Arc::new(RecordingDriver::new());
        let observer = Arc::new(RingBufferObserver::new());
        let mut registry = ActionRegistry::standard();
        registry.inject(HandlerDeps::new(
            driver.clone(),
            Arc::new(MemoryBus::new()),
            Arc::new(MouseController::new(driver).with_steps(2).with_step_delay(Duration::ZERO)),
        ));
        let executor = ProtocolExecutor::new(Arc::new(registry), ExecutionConfig::default(), VisionConfig::default())
            .with_observer(observer.clone());

        let mut macros = BTreeMap::new();
        macros.insert(
            "two".to_string(),
            vec![
                Action::new("press_key", json!({"key": "a"})),
                Action::new("press_key", json!({"key": "b"})),
            ],
        );
        let p = protocol(vec![Action::new("macro", json!({"name": "two"}))], macros);

        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.actions_completed, 1);
        // Observer records both nested actions
        assert_eq!(observer.records().len(), 2);
    }

    #[tokio::test]
    async fn test_runtime_macro_depth_guard() {
        let driver = Arc::new(RecordingDriver::new());
        let config = ExecutionConfig {
            max_macro_depth: 1,
            ..Default::default()
        };
        let mut registry = ActionRegistry::standard();
        registry.inject(HandlerDeps::new(
            driver.clone(),
            Arc::new(MemoryBus::new()),
            Arc::new(MouseController::new(driver).with_steps(2).with_step_delay(Duration::ZERO)),
        ));
        let executor = ProtocolExecutor::new(Arc::new(registry), config, VisionConfig::default());

        let mut macros = BTreeMap::new();
        macros.insert("outer".to_string(), vec![Action::new("macro", json!({"name": "inner"}))]);
        macros.insert("inner".to_string(), vec![Action::new("press_key", json!({"key": "a"}))]);
        let p = protocol(vec![Action::new("macro", json!({"name": "outer"}))], macros);

        let result = executor.execute(&p, HashMap::new()).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error_details.unwrap().kind, ErrorKind::CyclicMacro);
    }
}

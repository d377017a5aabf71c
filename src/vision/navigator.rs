//! VisionNavigator - the planner-side iterate loop
//!
//! capture state -> analyze -> act -> verify, bounded by the iteration
//! budget and wrapped in the safety envelope (coordinate clamping, loop
//! detection, critical-keyword confirmation).

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::{
    ActionCmdStatus, BrokerMessage, Channel, MessageBus, MessageType, NavStatus, VisionAction, VisualActionCmd,
    VisualActionResult, VisualNavOutcome, VisualNavRequest, VisualStateRequest, VisualStateResponse,
};
use crate::config::{PlannerConfig, VisionConfig};
use crate::errors::ErrorKind;
use crate::llm::LlmClient;

use super::audit::{AuditLog, AuditRecord};
use super::history::ActionHistory;
use super::prompt::{VisionNavigationResult, build_prompt, parse_response};
use super::safety::{CoordinateCheck, CoordinateValidator, critical_keywords_in};

/// Blocking yes/no gate for critical actions.
///
/// The planner binary installs an interactive implementation; everywhere
/// else (unattended runs, tests) the default denies, which aborts the loop.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// The unattended default: every critical action is denied
pub struct DenyAllPrompt;

#[async_trait]
impl ConfirmationPrompt for DenyAllPrompt {
    async fn confirm(&self, message: &str) -> bool {
        warn!(%message, "critical action denied (no interactive channel)");
        false
    }
}

/// Drives one `visual_nav_request` to a terminal outcome
pub struct VisionNavigator {
    bus: Arc<dyn MessageBus>,
    llm: Arc<dyn LlmClient>,
    config: VisionConfig,
    state_timeout: Duration,
    action_timeout: Duration,
    /// Ceiling for one analysis call; a slower model forfeits the iteration
    iteration_timeout: Duration,
    confirmer: Arc<dyn ConfirmationPrompt>,
    audit: AuditLog,
}

impl VisionNavigator {
    pub fn new(bus: Arc<dyn MessageBus>, llm: Arc<dyn LlmClient>, config: VisionConfig, planner: &PlannerConfig) -> Self {
        let audit = AuditLog::new(config.enable_audit_log, config.audit_log_path.clone());
        let iteration_timeout = Duration::from_secs(config.iteration_timeout_s.max(1));
        Self {
            bus,
            llm,
            config,
            state_timeout: Duration::from_secs(planner.state_timeout_s),
            action_timeout: Duration::from_secs(planner.action_timeout_s),
            iteration_timeout,
            confirmer: Arc::new(DenyAllPrompt),
            audit,
        }
    }

    /// Replace the critical-action gate
    pub fn with_confirmer(mut self, confirmer: Arc<dyn ConfirmationPrompt>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Run the bounded iteration loop for one request.
    ///
    /// Always returns a terminal outcome; the caller publishes it as the
    /// `visual_nav_response`.
    pub async fn run(&self, request: &VisualNavRequest) -> VisualNavOutcome {
        let request_id = &request.request_id;
        let max_iterations = request.max_iterations.clamp(1, self.config.max_iterations.max(1));
        info!(%request_id, task = %request.task, max_iterations, "vision loop started");

        let validator = CoordinateValidator::from_config(&self.config);
        let mut history = ActionHistory::new(self.config.loop_detection_buffer_size, self.config.loop_detection_threshold);
        let mut actions_taken = 0u32;
        let mut last_coordinates: Option<(i32, i32)> = None;
        // Post-action screenshot carried over from a followup reply
        let mut pending: Option<(Vec<u8>, (i32, i32), (u32, u32))> = None;

        for iter in 1..=max_iterations {
            // Capture state: reuse the followup screenshot when we have one
            let (screenshot, mouse_xy, screen_wh) = match pending.take() {
                Some(state) => state,
                None => match self.request_state(request_id).await {
                    Ok(state) => state,
                    Err(outcome) => return self.finish(request_id, outcome, actions_taken, last_coordinates),
                },
            };

            // Analyze
            let prompt = build_prompt(&request.task, &request.goal, screen_wh, mouse_xy, &history.summary());
            let mut vnr = self.analyze(&prompt, &screenshot).await;
            debug!(%request_id, iter, action = %vnr.action, confidence = vnr.confidence, "vision analysis");

            if vnr.confidence < self.config.confidence_threshold && vnr.action != VisionAction::Complete {
                warn!(%request_id, iter, confidence = vnr.confidence, "low-confidence vision proposal");
            }

            if vnr.action == VisionAction::Complete {
                self.record(request_id, iter, &vnr, false, false, false, "completed");
                let final_coordinates = vnr.coordinates.or(last_coordinates);
                info!(%request_id, iter, actions_taken, "vision loop complete");
                return VisualNavOutcome {
                    request_id: request_id.clone(),
                    status: NavStatus::Success,
                    actions_taken,
                    final_coordinates,
                    reason: None,
                    error: None,
                };
            }

            if vnr.action == VisionAction::NoAction {
                self.record(request_id, iter, &vnr, false, false, false, "no_action");
                continue;
            }

            // Validate coordinates
            let mut clamped = false;
            if vnr.action.needs_coordinates() {
                let Some((x, y)) = vnr.coordinates else {
                    self.record(request_id, iter, &vnr, false, false, false, "rejected");
                    continue;
                };
                match validator.check(x, y, screen_wh.0, screen_wh.1) {
                    CoordinateCheck::Ok { .. } => {}
                    CoordinateCheck::Clamped { x, y } => {
                        clamped = true;
                        vnr.coordinates = Some((x, y));
                        vnr.confidence *= 0.9;
                        warn!(%request_id, iter, x, y, "coordinates clamped to screen margins");
                    }
                    CoordinateCheck::Rejected { reason } => {
                        warn!(%request_id, iter, %reason, "unsafe coordinates rejected");
                        self.record(request_id, iter, &vnr, false, false, false, "rejected");
                        continue;
                    }
                }
            }

            // Critical-keyword gate
            let critical = if self.config.require_confirmation_for_critical {
                let found = critical_keywords_in(&vnr.reasoning, &self.config.critical_keywords);
                if !found.is_empty() {
                    let message = format!(
                        "Vision model proposes \"{}\" with critical keywords [{}]: {}",
                        vnr.action,
                        found.join(", "),
                        vnr.reasoning
                    );
                    if !self.confirmer.confirm(&message).await {
                        self.record(request_id, iter, &vnr, clamped, false, true, "denied");
                        return self.finish(
                            request_id,
                            FailureOutcome::new(NavStatus::Failed, ErrorKind::CriticalDenied, "critical action denied"),
                            actions_taken,
                            last_coordinates,
                        );
                    }
                    true
                } else {
                    false
                }
            } else {
                false
            };

            // Loop detection
            if history.would_loop(vnr.action, vnr.coordinates) {
                self.record(request_id, iter, &vnr, clamped, true, critical, "loop_detected");
                return self.finish(
                    request_id,
                    FailureOutcome::new(
                        NavStatus::Failed,
                        ErrorKind::LoopDetected,
                        format!("repeated {} proposals at {:?}", vnr.action, vnr.coordinates),
                    ),
                    actions_taken,
                    last_coordinates,
                );
            }

            // Dispatch to the executor
            match self.dispatch(request_id, &vnr).await {
                Ok(result) => {
                    if result.status == ActionCmdStatus::Error {
                        warn!(%request_id, iter, error = ?result.error, "vision action failed on the executor");
                        self.record(request_id, iter, &vnr, clamped, false, critical, "executor_error");
                        continue;
                    }
                    if let Some(b64) = result.followup_screenshot_b64 {
                        if let Ok(jpeg) = BASE64.decode(b64.as_bytes()) {
                            pending = Some((jpeg, result.mouse_xy, screen_wh));
                        }
                    }
                    history.push(vnr.action, vnr.coordinates);
                    actions_taken += 1;
                    if vnr.coordinates.is_some() {
                        last_coordinates = vnr.coordinates;
                    }
                    self.record(request_id, iter, &vnr, clamped, false, critical, "executed");
                }
                Err(outcome) => {
                    self.record(request_id, iter, &vnr, clamped, false, critical, "timeout");
                    return self.finish(request_id, outcome, actions_taken, last_coordinates);
                }
            }
        }

        info!(%request_id, actions_taken, "vision loop exhausted its iteration budget");
        VisualNavOutcome {
            request_id: request_id.clone(),
            status: NavStatus::Timeout,
            actions_taken,
            final_coordinates: last_coordinates,
            reason: Some(ErrorKind::IterationLimit),
            error: Some(format!("no completion within {} iterations", max_iterations)),
        }
    }

    /// Screenshot + mouse + screen size from the executor
    async fn request_state(&self, request_id: &str) -> Result<(Vec<u8>, (i32, i32), (u32, u32)), FailureOutcome> {
        let payload = VisualStateRequest {
            request_id: request_id.to_string(),
        };
        let message = BrokerMessage::from_payload(MessageType::VisualStateRequest, request_id, &payload)
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?;
        self.bus
            .send(message)
            .await
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?;

        let response = self
            .bus
            .receive(Channel::VisualStateResponse, self.state_timeout, Some(request_id))
            .await
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?
            .ok_or_else(|| {
                FailureOutcome::new(
                    NavStatus::Failed,
                    ErrorKind::Timeout,
                    format!("no visual_state_response within {:?}", self.state_timeout),
                )
            })?;

        let state: VisualStateResponse = response
            .payload_as()
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?;
        let jpeg = BASE64
            .decode(state.screenshot_b64.as_bytes())
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?;
        Ok((jpeg, state.mouse_xy, state.screen_wh))
    }

    /// One vision analysis, bounded by the per-iteration ceiling; retried
    /// once on a retryable provider error
    async fn analyze(&self, prompt: &str, screenshot: &[u8]) -> VisionNavigationResult {
        let call = tokio::time::timeout(self.iteration_timeout, self.llm.complete_vision(prompt, screenshot));
        match call.await {
            Err(_) => VisionNavigationResult::no_action(format!(
                "vision analysis exceeded the {:?} iteration ceiling",
                self.iteration_timeout
            )),
            Ok(Ok(text)) => parse_response(&text),
            Ok(Err(e)) if e.is_retryable() => {
                warn!(error = %e, "vision analysis failed, retrying once");
                let retry = tokio::time::timeout(self.iteration_timeout, self.llm.complete_vision(prompt, screenshot));
                match retry.await {
                    Ok(Ok(text)) => parse_response(&text),
                    Ok(Err(e)) => VisionNavigationResult::no_action(format!("vision model unavailable: {}", e)),
                    Err(_) => VisionNavigationResult::no_action("vision retry exceeded the iteration ceiling"),
                }
            }
            Ok(Err(e)) => VisionNavigationResult::no_action(format!("vision model error: {}", e)),
        }
    }

    /// Send a `visual_action_cmd` and wait for its result
    async fn dispatch(&self, request_id: &str, vnr: &VisionNavigationResult) -> Result<VisualActionResult, FailureOutcome> {
        let cmd = VisualActionCmd {
            request_id: request_id.to_string(),
            action: vnr.action,
            coordinates: vnr.coordinates,
            text: vnr.text_to_type.clone(),
            request_followup: vnr.requires_followup,
        };
        let message = BrokerMessage::from_payload(MessageType::VisualActionCmd, request_id, &cmd)
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?;
        self.bus
            .send(message)
            .await
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?;

        let response = self
            .bus
            .receive(Channel::VisualActionResult, self.action_timeout, Some(request_id))
            .await
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))?
            .ok_or_else(|| {
                FailureOutcome::new(
                    NavStatus::Failed,
                    ErrorKind::Timeout,
                    format!("no visual_action_result within {:?}", self.action_timeout),
                )
            })?;

        response
            .payload_as()
            .map_err(|e| FailureOutcome::new(NavStatus::Failed, ErrorKind::ExternalCallFailure, e.to_string()))
    }

    fn finish(
        &self,
        request_id: &str,
        failure: FailureOutcome,
        actions_taken: u32,
        last_coordinates: Option<(i32, i32)>,
    ) -> VisualNavOutcome {
        warn!(%request_id, kind = %failure.reason, error = %failure.error, "vision loop aborted");
        VisualNavOutcome {
            request_id: request_id.to_string(),
            status: failure.status,
            actions_taken,
            final_coordinates: last_coordinates,
            reason: Some(failure.reason),
            error: Some(failure.error),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        request_id: &str,
        iter: u32,
        vnr: &VisionNavigationResult,
        clamped: bool,
        loop_detected: bool,
        critical: bool,
        outcome: &str,
    ) {
        self.audit.append(&AuditRecord {
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            iter,
            action: vnr.action,
            coordinates: vnr.coordinates,
            confidence: vnr.confidence,
            reasoning: vnr.reasoning.clone(),
            clamped,
            loop_detected,
            critical,
            outcome: outcome.to_string(),
        });
    }
}

/// Internal abort value carrying the status and reason for the outcome
struct FailureOutcome {
    status: NavStatus,
    reason: ErrorKind,
    error: String,
}

impl FailureOutcome {
    fn new(status: NavStatus, reason: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            error: error.into(),
        }
    }
}

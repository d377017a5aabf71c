//! Vision actions (executor side)
//!
//! `visual_navigate` hands control to the planner's vision loop and, while
//! waiting for the terminal outcome, services the screen-state and action
//! commands that loop generates. The verify/find family reuses the same
//! exchange with a one-iteration locate request.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::actions::{
    ActionHandler, ActionOutput, Category, HandlerContext, optional_i64, optional_str, require_str,
};
use crate::broker::{
    ActionCmdStatus, BrokerMessage, Channel, MessageBus, MessageType, NavStatus, VisionAction, VisualActionCmd,
    VisualActionResult, VisualNavOutcome, VisualNavRequest, VisualStateResponse,
};
use crate::driver::{MouseButton, PlatformDriver};
use crate::errors::{ActionError, ErrorKind};
use crate::mouse::MouseController;
use crate::vision::{CoordinateCheck, CoordinateValidator};

pub fn handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(VisualNavigateHandler),
        Arc::new(VerifyScreenAction),
        Arc::new(VerifyElementAction),
        Arc::new(FindElementAction),
        Arc::new(VerifyTextAction),
    ]
}

/// Extra slack on top of the planner's iteration budget so the outer wait
/// strictly outlives the loop it is waiting on
const OUTER_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Run the executor side of one vision exchange: publish the request, then
/// service state/action commands until the terminal outcome arrives.
async fn run_vision_exchange(
    cx: &HandlerContext<'_>,
    request: VisualNavRequest,
    outer_timeout: Duration,
) -> Result<VisualNavOutcome, ActionError> {
    let bus = cx.bus()?.clone();
    let driver = cx.driver()?.clone();
    let mouse = cx.mouse()?.clone();
    let validator = CoordinateValidator::from_config(cx.vision);
    let request_id = request.request_id.clone();
    let poll = Duration::from_millis(cx.poll_interval_ms.max(20));

    bus.send(BrokerMessage::from_payload(MessageType::VisualNavRequest, &*request_id, &request).map_err(
        |e| ActionError::new(ErrorKind::ExternalCallFailure, format!("cannot encode nav request: {}", e)),
    )?)
    .await?;
    debug!(%request_id, task = %request.task, "visual exchange: request sent");

    let deadline = Instant::now() + outer_timeout;
    loop {
        if cx.control.is_stop_requested() {
            return Err(ActionError::cancelled("stop requested during visual navigation"));
        }
        if Instant::now() >= deadline {
            return Err(ActionError::timeout(format!(
                "no visual_nav_response for {} within {:?}",
                request_id, outer_timeout
            )));
        }

        // Terminal outcome?
        if let Some(message) = bus.try_receive(Channel::VisualNavResponse, Some(&request_id)).await? {
            let outcome: VisualNavOutcome = message
                .payload_as()
                .map_err(|e| ActionError::new(ErrorKind::ExternalCallFailure, format!("bad nav response: {}", e)))?;
            debug!(%request_id, status = ?outcome.status, "visual exchange: terminal outcome");
            return Ok(outcome);
        }

        // Screenshot request?
        if let Some(message) = bus.try_receive(Channel::VisualStateRequest, Some(&request_id)).await? {
            serve_state_request(&bus, &driver, cx.vision.screenshot_quality, &message.request_id).await?;
            continue;
        }

        // Action command?
        if let Some(message) = bus.try_receive(Channel::VisualActionCmd, Some(&request_id)).await? {
            match message.payload_as::<VisualActionCmd>() {
                Ok(cmd) => {
                    serve_action_cmd(&bus, &driver, &mouse, &validator, cx.vision.screenshot_quality, cmd).await?;
                }
                Err(e) => warn!(%request_id, error = %e, "visual exchange: unreadable action cmd"),
            }
            continue;
        }

        tokio::time::sleep(poll).await;
    }
}

/// Reply to a `visual_state_request` with a fresh screenshot and mouse state
async fn serve_state_request(
    bus: &Arc<dyn MessageBus>,
    driver: &Arc<dyn PlatformDriver>,
    quality: u8,
    request_id: &str,
) -> Result<(), ActionError> {
    let shot = driver.capture_screen(quality).await?;
    let mouse_xy = driver.mouse_position().await?;
    let response = VisualStateResponse {
        request_id: request_id.to_string(),
        screenshot_b64: BASE64.encode(&shot.jpeg),
        mouse_xy,
        screen_wh: (shot.width, shot.height),
    };
    bus.send(
        BrokerMessage::from_payload(MessageType::VisualStateResponse, request_id, &response)
            .map_err(|e| ActionError::new(ErrorKind::ExternalCallFailure, e.to_string()))?,
    )
    .await?;
    debug!(%request_id, "visual exchange: state served");
    Ok(())
}

/// Validate and execute one `visual_action_cmd`, replying with the result
async fn serve_action_cmd(
    bus: &Arc<dyn MessageBus>,
    driver: &Arc<dyn PlatformDriver>,
    mouse: &Arc<MouseController>,
    validator: &CoordinateValidator,
    quality: u8,
    cmd: VisualActionCmd,
) -> Result<(), ActionError> {
    let request_id = cmd.request_id.clone();
    let mut error: Option<String> = None;

    // Re-validate against the real screen bounds; the planner's clamp used
    // the dimensions it was told, this one uses the dimensions we have.
    let coordinates = match (cmd.action.needs_coordinates(), cmd.coordinates) {
        (true, Some((x, y))) => {
            let (w, h) = driver.screen_size().await?;
            match validator.check(x, y, w, h) {
                CoordinateCheck::Ok { x, y } => Some((x, y)),
                CoordinateCheck::Clamped { x, y } => Some((x, y)),
                CoordinateCheck::Rejected { reason } => {
                    error = Some(format!("{}: {}", ErrorKind::UnsafeCoordinates, reason));
                    None
                }
            }
        }
        (true, None) => {
            error = Some(format!("{}: {} requires coordinates", ErrorKind::UnsafeCoordinates, cmd.action));
            None
        }
        (false, _) => None,
    };

    if error.is_none() {
        let dispatch = match cmd.action {
            VisionAction::Click => {
                let (x, y) = coordinates.expect("validated above");
                mouse.click_at(x, y, MouseButton::Left).await
            }
            VisionAction::DoubleClick => {
                let (x, y) = coordinates.expect("validated above");
                mouse.double_click_at(x, y, MouseButton::Left).await
            }
            VisionAction::RightClick => {
                let (x, y) = coordinates.expect("validated above");
                mouse.click_at(x, y, MouseButton::Right).await
            }
            VisionAction::Type => match &cmd.text {
                Some(text) => driver.type_text(text).await,
                None => {
                    error = Some("type command without text".to_string());
                    Ok(())
                }
            },
            VisionAction::NoAction | VisionAction::Complete => Ok(()),
        };
        if let Err(e) = dispatch {
            error = Some(format!("{}: {}", ErrorKind::DriverFailure, e));
        }
    }

    let followup_screenshot_b64 = if cmd.request_followup && error.is_none() {
        Some(BASE64.encode(&driver.capture_screen(quality).await?.jpeg))
    } else {
        None
    };

    let ok = error.is_none();
    let result = VisualActionResult {
        request_id: request_id.clone(),
        status: if ok { ActionCmdStatus::Ok } else { ActionCmdStatus::Error },
        error,
        followup_screenshot_b64,
        mouse_xy: driver.mouse_position().await?,
    };
    bus.send(
        BrokerMessage::from_payload(MessageType::VisualActionResult, &*request_id, &result)
            .map_err(|e| ActionError::new(ErrorKind::ExternalCallFailure, e.to_string()))?,
    )
    .await?;
    debug!(%request_id, action = %cmd.action, ok, "visual exchange: action served");
    Ok(())
}

/// Drive the screen toward a goal through the planner's vision loop
pub struct VisualNavigateHandler;

#[async_trait]
impl ActionHandler for VisualNavigateHandler {
    fn name(&self) -> &'static str {
        "visual_navigate"
    }

    fn category(&self) -> Category {
        Category::Vision
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["task"]
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["goal", "max_iterations", "fallback_coordinates", "timeout"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["verified_x", "verified_y", "last_vision_status", "last_vision_actions_taken"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let task = require_str(params, "task", self.name())?;
        let goal = optional_str(params, "goal").unwrap_or(task);
        let max_iterations = optional_i64(params, "max_iterations").unwrap_or(10).max(1) as u32;
        let timeout_s = optional_i64(params, "timeout").unwrap_or(60).max(1) as u64;
        let fallback = parse_fallback(params)?;

        // The outer wait must strictly outlive the planner's loop budget
        let budget = Duration::from_secs(max_iterations as u64 * cx.vision.iteration_timeout_s);
        let outer_timeout = Duration::from_secs(timeout_s).max(budget + OUTER_TIMEOUT_SLACK);

        let request = VisualNavRequest {
            request_id: Uuid::now_v7().to_string(),
            task: task.to_string(),
            goal: goal.to_string(),
            max_iterations,
        };

        let outcome = run_vision_exchange(cx, request, outer_timeout).await?;
        let status_text = match outcome.status {
            NavStatus::Success => "success",
            NavStatus::Failed => "failed",
            NavStatus::Timeout => "timeout",
        };

        let mut output = ActionOutput::var("last_vision_status", json!(status_text))
            .and("last_vision_actions_taken", json!(outcome.actions_taken));

        match outcome.status {
            NavStatus::Success => {
                if let Some((x, y)) = outcome.final_coordinates {
                    output = output.and("verified_x", json!(x)).and("verified_y", json!(y));
                }
                Ok(output)
            }
            NavStatus::Failed | NavStatus::Timeout => match fallback {
                Some((x, y)) => {
                    // Honor the fallback and report the action as succeeded;
                    // protocols branch on last_vision_status if they care.
                    warn!(x, y, status = status_text, "visual_navigate: using fallback coordinates");
                    cx.mouse()?.click_at(x, y, MouseButton::Left).await?;
                    Ok(output.and("verified_x", json!(x)).and("verified_y", json!(y)))
                }
                None => {
                    let kind = outcome.reason.unwrap_or(match outcome.status {
                        NavStatus::Timeout => ErrorKind::Timeout,
                        _ => ErrorKind::ExternalCallFailure,
                    });
                    Err(ActionError::new(
                        kind,
                        outcome
                            .error
                            .unwrap_or_else(|| format!("vision navigation ended with status {}", status_text)),
                    )
                    .with_vars(output.vars))
                }
            },
        }
    }
}

fn parse_fallback(params: &Value) -> Result<Option<(i32, i32)>, ActionError> {
    match params.get("fallback_coordinates") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) if items.len() == 2 => {
            let x = items[0].as_i64();
            let y = items[1].as_i64();
            match (x, y) {
                (Some(x), Some(y)) => Ok(Some((x as i32, y as i32))),
                _ => Err(ActionError::validation("fallback_coordinates must be two integers")),
            }
        }
        Some(_) => Err(ActionError::validation("fallback_coordinates must be an [x, y] array")),
    }
}

/// One-iteration locate request shared by the verify/find family
async fn locate(cx: &HandlerContext<'_>, task: String, goal: String) -> Result<VisualNavOutcome, ActionError> {
    let outer_timeout = Duration::from_secs(cx.vision.iteration_timeout_s) + OUTER_TIMEOUT_SLACK;
    let request = VisualNavRequest {
        request_id: Uuid::now_v7().to_string(),
        task,
        goal,
        max_iterations: 1,
    };
    run_vision_exchange(cx, request, outer_timeout).await
}

fn verification_output(outcome: &VisualNavOutcome) -> ActionOutput {
    let safe = outcome.status == NavStatus::Success;
    let mut output = ActionOutput::var("last_verification_safe", json!(safe)).and(
        "last_verification_status",
        json!(match outcome.status {
            NavStatus::Success => "success",
            NavStatus::Failed => "failed",
            NavStatus::Timeout => "timeout",
        }),
    );
    if let Some((x, y)) = outcome.final_coordinates {
        output = output.and("verified_x", json!(x)).and("verified_y", json!(y));
    }
    output
}

/// Soft screen-state verification; records its outcome instead of failing
pub struct VerifyScreenAction;

#[async_trait]
impl ActionHandler for VerifyScreenAction {
    fn name(&self) -> &'static str {
        "verify_screen"
    }

    fn category(&self) -> Category {
        Category::Vision
    }

    fn optional_params(&self) -> &'static [&'static str] {
        &["expectation"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["last_verification_safe", "last_verification_status", "verified_x", "verified_y"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let expectation = optional_str(params, "expectation").unwrap_or("the screen is in the expected state");
        let task = format!("Verify without acting: {}. Locate the most relevant element.", expectation);
        match locate(cx, task, expectation.to_string()).await {
            Ok(outcome) => Ok(verification_output(&outcome)),
            Err(e) => {
                // Soft: verification trouble is data, not a protocol failure
                warn!(error = %e, "verify_screen: recording failed verification");
                Ok(ActionOutput::var("last_verification_safe", json!(false))
                    .and("last_verification_status", json!("failed")))
            }
        }
    }
}

/// Soft element verification; sets `verified_x`/`verified_y` when found
pub struct VerifyElementAction;

#[async_trait]
impl ActionHandler for VerifyElementAction {
    fn name(&self) -> &'static str {
        "verify_element"
    }

    fn category(&self) -> Category {
        Category::Vision
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["description"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["last_verification_safe", "last_verification_status", "verified_x", "verified_y"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let description = require_str(params, "description", self.name())?;
        let task = format!("Locate without acting: {}", description);
        match locate(cx, task, description.to_string()).await {
            Ok(outcome) => Ok(verification_output(&outcome)),
            Err(e) => {
                warn!(error = %e, "verify_element: recording failed verification");
                Ok(ActionOutput::var("last_verification_safe", json!(false))
                    .and("last_verification_status", json!("failed")))
            }
        }
    }
}

/// Hard element lookup; fails the protocol when the element is not found
pub struct FindElementAction;

#[async_trait]
impl ActionHandler for FindElementAction {
    fn name(&self) -> &'static str {
        "find_element"
    }

    fn category(&self) -> Category {
        Category::Vision
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["description"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["verified_x", "verified_y"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let description = require_str(params, "description", self.name())?;
        let task = format!("Locate without acting: {}", description);
        let outcome = locate(cx, task, description.to_string()).await?;
        match (outcome.status, outcome.final_coordinates) {
            (NavStatus::Success, Some((x, y))) => {
                Ok(ActionOutput::var("verified_x", json!(x)).and("verified_y", json!(y)))
            }
            _ => Err(ActionError::new(
                ErrorKind::ExternalCallFailure,
                format!("element not found: {}", description),
            )),
        }
    }
}

/// Soft text-visibility verification
pub struct VerifyTextAction;

#[async_trait]
impl ActionHandler for VerifyTextAction {
    fn name(&self) -> &'static str {
        "verify_text"
    }

    fn category(&self) -> Category {
        Category::Vision
    }

    fn required_params(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["last_verification_safe", "last_verification_status"]
    }

    async fn invoke(&self, params: &Value, cx: &HandlerContext<'_>) -> Result<ActionOutput, ActionError> {
        let text = require_str(params, "text", self.name())?;
        let task = format!("Verify without acting that the text \"{}\" is visible on screen", text);
        match locate(cx, task, format!("text \"{}\" visible", text)).await {
            Ok(outcome) => Ok(verification_output(&outcome)),
            Err(e) => {
                warn!(error = %e, "verify_text: recording failed verification");
                Ok(ActionOutput::var("last_verification_safe", json!(false))
                    .and("last_verification_status", json!("failed")))
            }
        }
    }
}

//! Broker message envelope and vision-loop payload types
//!
//! Every message on the broker is a typed envelope carrying a JSON payload.
//! `request_id` correlates the vision-loop exchanges; for protocol messages
//! it is the protocol id.

use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::errors::ErrorKind;

/// Message type discriminator, one per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Protocol,
    ProtocolStatus,
    VisualNavRequest,
    VisualNavResponse,
    VisualStateRequest,
    VisualStateResponse,
    VisualActionCmd,
    VisualActionResult,
}

/// The typed envelope written to a channel directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub message_type: MessageType,
    pub request_id: String,
    /// Sender clock, epoch milliseconds; doubles as the filename sort key
    pub timestamp: i64,
    pub payload: Value,
}

impl BrokerMessage {
    /// Build an envelope stamped with the current wall clock
    pub fn new(message_type: MessageType, request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type,
            request_id: request_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            payload,
        }
    }

    /// Build an envelope from a serializable payload struct
    pub fn from_payload<T: Serialize>(
        message_type: MessageType,
        request_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(message_type, request_id, serde_json::to_value(payload)?))
    }

    /// Decode the payload into a typed struct
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Actions the vision model can propose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisionAction {
    Click,
    DoubleClick,
    RightClick,
    Type,
    NoAction,
    Complete,
}

impl VisionAction {
    /// Whether this action needs coordinates to execute
    pub fn needs_coordinates(&self) -> bool {
        matches!(self, VisionAction::Click | VisionAction::DoubleClick | VisionAction::RightClick)
    }
}

impl std::fmt::Display for VisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VisionAction::Click => "click",
            VisionAction::DoubleClick => "double_click",
            VisionAction::RightClick => "right_click",
            VisionAction::Type => "type",
            VisionAction::NoAction => "no_action",
            VisionAction::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Terminal status of a vision navigation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavStatus {
    Success,
    Failed,
    Timeout,
}

/// Executor -> Planner: a `visual_navigate` action wants a vision loop run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualNavRequest {
    pub request_id: String,
    pub task: String,
    pub goal: String,
    pub max_iterations: u32,
}

/// Planner -> Executor: terminal outcome concluding the outer action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualNavOutcome {
    pub request_id: String,
    pub status: NavStatus,
    pub actions_taken: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_coordinates: Option<(i32, i32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Planner -> Executor: capture the current screen and mouse state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualStateRequest {
    pub request_id: String,
}

/// Executor -> Planner: current screen state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualStateResponse {
    pub request_id: String,
    pub screenshot_b64: String,
    pub mouse_xy: (i32, i32),
    pub screen_wh: (u32, u32),
}

/// Planner -> Executor: perform one vision-proposed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualActionCmd {
    pub request_id: String,
    pub action: VisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(i32, i32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub request_followup: bool,
}

/// Executor -> Planner: result of one vision action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualActionResult {
    pub request_id: String,
    pub status: ActionCmdStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_screenshot_b64: Option<String>,
    pub mouse_xy: (i32, i32),
}

/// Per-command outcome inside a vision loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCmdStatus {
    Ok,
    Error,
}

//! Message broker between the planner and executor processes
//!
//! Per-type channels with at-most-once, FIFO-per-channel delivery. The
//! production transport is a watched directory tree ([`FsBroker`]); tests
//! swap in [`MemoryBus`]. Core code depends only on [`MessageBus`].

mod fs;
mod memory;
mod message;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use fs::{FsBroker, sanitize_request_id};
pub use memory::MemoryBus;
pub use message::{
    ActionCmdStatus, BrokerMessage, MessageType, NavStatus, VisionAction, VisualActionCmd, VisualActionResult,
    VisualNavOutcome, VisualNavRequest, VisualStateRequest, VisualStateResponse,
};

/// One channel per message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Protocols,
    Status,
    VisualNavRequest,
    VisualNavResponse,
    VisualStateRequest,
    VisualStateResponse,
    VisualActionCmd,
    VisualActionResult,
}

impl Channel {
    /// All channels, used to lay out the broker root
    pub const ALL: [Channel; 8] = [
        Channel::Protocols,
        Channel::Status,
        Channel::VisualNavRequest,
        Channel::VisualNavResponse,
        Channel::VisualStateRequest,
        Channel::VisualStateResponse,
        Channel::VisualActionCmd,
        Channel::VisualActionResult,
    ];

    /// Directory name under the broker root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Channel::Protocols => "protocols",
            Channel::Status => "status",
            Channel::VisualNavRequest => "visual_nav_request",
            Channel::VisualNavResponse => "visual_nav_response",
            Channel::VisualStateRequest => "visual_state_request",
            Channel::VisualStateResponse => "visual_state_response",
            Channel::VisualActionCmd => "visual_action_cmd",
            Channel::VisualActionResult => "visual_action_result",
        }
    }

    /// The channel a message type travels on
    pub fn for_type(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Protocol => Channel::Protocols,
            MessageType::ProtocolStatus => Channel::Status,
            MessageType::VisualNavRequest => Channel::VisualNavRequest,
            MessageType::VisualNavResponse => Channel::VisualNavResponse,
            MessageType::VisualStateRequest => Channel::VisualStateRequest,
            MessageType::VisualStateResponse => Channel::VisualStateResponse,
            MessageType::VisualActionCmd => Channel::VisualActionCmd,
            MessageType::VisualActionResult => Channel::VisualActionResult,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Broker transport failure
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Typed channel transport between the two processes.
///
/// Delivery semantics: at-most-once (delete-after-read), FIFO per channel,
/// no cross-channel ordering, no content validation.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a message on its channel. Visible to the receiver atomically.
    async fn send(&self, message: BrokerMessage) -> Result<(), BrokerError>;

    /// Wait up to `timeout` for the next message on `channel`.
    ///
    /// With `request_id`, only a matching message is returned and others are
    /// left in place. Returns `None` on timeout. The returned message is
    /// deleted from the channel before this call returns.
    async fn receive(
        &self,
        channel: Channel,
        timeout: Duration,
        request_id: Option<&str>,
    ) -> Result<Option<BrokerMessage>, BrokerError>;

    /// Single non-waiting scan of `channel`
    async fn try_receive(&self, channel: Channel, request_id: Option<&str>) -> Result<Option<BrokerMessage>, BrokerError> {
        self.receive(channel, Duration::ZERO, request_id).await
    }
}

//! DeskPilot - natural-language desktop automation
//!
//! DeskPilot turns natural-language commands into declarative JSON protocols
//! and executes them against the host OS. Two processes cooperate through a
//! filesystem message broker:
//!
//! - **Planner**: parses intent, generates protocols with an LLM, and drives
//!   the vision-feedback loop for `visual_navigate` actions.
//! - **Executor**: validates and sequences protocol actions against the
//!   platform driver, and services vision state/action exchanges mid-action.
//!
//! # Core Concepts
//!
//! - **Protocols Are Data**: a validated JSON document of actions + macros,
//!   immutable once accepted
//! - **One Shared Directory**: the broker is the only state the two
//!   processes share; atomic rename in, delete-after-read out
//! - **Vision Closes the Loop**: screenshot in, coordinates out, with a
//!   safety envelope (clamping, loop detection, critical-keyword gate)
//!
//! # Modules
//!
//! - [`protocol`] - protocol data model, parser and validator
//! - [`executor`] - protocol execution engine and executor service loop
//! - [`actions`] - action registry and builtin handler library
//! - [`broker`] - filesystem message channels between the two processes
//! - [`planner`] - interactive planner session and protocol generation
//! - [`vision`] - vision navigation loop and safety checks
//! - [`llm`] - LLM client trait and Anthropic implementation
//! - [`driver`] - platform driver trait (OS capability boundary)
//! - [`config`] - configuration types and loading

pub mod actions;
pub mod broker;
pub mod cli;
pub mod config;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod mouse;
pub mod planner;
pub mod protocol;
pub mod vision;

// Re-export commonly used types
pub use actions::{ActionHandler, ActionOutput, ActionRegistry, Category, HandlerDeps};
pub use broker::{BrokerError, BrokerMessage, Channel, FsBroker, MemoryBus, MessageBus, MessageType};
pub use config::{
    ActionLibraryConfig, BrokerConfig, Config, ExecutionConfig, LlmConfig, PlannerConfig, ValidationConfig,
    VisionConfig,
};
pub use driver::{MouseButton, NullDriver, PlatformDriver, RecordingDriver, Screenshot, WindowInfo};
pub use errors::{ActionError, ErrorKind};
pub use executor::{
    ActionRecord, ControlHandle, ExecutionContext, ExecutionResult, ExecutionStatus, ExecutorService,
    ExecutionObserver, ProtocolExecutor, RingBufferObserver, TracingObserver, substitute_params,
};
pub use llm::{AnthropicClient, LlmClient, LlmError, create_client};
pub use mouse::MouseController;
pub use planner::{CommandIntent, PlannerSession, ProtocolGenerator, spawn_input_reader};
pub use protocol::{Action, Complexity, Metadata, ParseIssue, Protocol, ProtocolError, ProtocolParser};
pub use vision::{
    ActionHistory, ConfirmationPrompt, CoordinateCheck, CoordinateValidator, DenyAllPrompt, VisionNavigator,
    VisionNavigationResult,
};

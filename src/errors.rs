//! Stable error vocabulary shared across results, status messages and logs

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds used in execution results, broker status payloads and the
/// vision audit log. The serialized form is part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Validation
    VersionMismatch,
    MetadataMissing,
    EmptyActions,
    MalformedAction,
    UnknownAction,
    UnresolvedMacro,
    CyclicMacro,
    BadDelay,
    ParamMissing,
    ParamUnknown,

    // Runtime
    VariableMissing,
    DriverFailure,
    ValidationFailure,
    Timeout,
    UnsafeCoordinates,
    LoopDetected,
    IterationLimit,
    CriticalDenied,
    ExternalCallFailure,
    Cancelled,
}

impl ErrorKind {
    /// The wire-format name (SCREAMING_SNAKE_CASE), also used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::VersionMismatch => "VERSION_MISMATCH",
            ErrorKind::MetadataMissing => "METADATA_MISSING",
            ErrorKind::EmptyActions => "EMPTY_ACTIONS",
            ErrorKind::MalformedAction => "MALFORMED_ACTION",
            ErrorKind::UnknownAction => "UNKNOWN_ACTION",
            ErrorKind::UnresolvedMacro => "UNRESOLVED_MACRO",
            ErrorKind::CyclicMacro => "CYCLIC_MACRO",
            ErrorKind::BadDelay => "BAD_DELAY",
            ErrorKind::ParamMissing => "PARAM_MISSING",
            ErrorKind::ParamUnknown => "PARAM_UNKNOWN",
            ErrorKind::VariableMissing => "VARIABLE_MISSING",
            ErrorKind::DriverFailure => "DRIVER_FAILURE",
            ErrorKind::ValidationFailure => "VALIDATION_FAILURE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::UnsafeCoordinates => "UNSAFE_COORDINATES",
            ErrorKind::LoopDetected => "LOOP_DETECTED",
            ErrorKind::IterationLimit => "ITERATION_LIMIT",
            ErrorKind::CriticalDenied => "CRITICAL_DENIED",
            ErrorKind::ExternalCallFailure => "EXTERNAL_CALL_FAILURE",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Validation kinds reject a protocol before it runs; everything else
    /// is a runtime failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::VersionMismatch
                | ErrorKind::MetadataMissing
                | ErrorKind::EmptyActions
                | ErrorKind::MalformedAction
                | ErrorKind::UnknownAction
                | ErrorKind::UnresolvedMacro
                | ErrorKind::CyclicMacro
                | ErrorKind::BadDelay
                | ErrorKind::ParamMissing
                | ErrorKind::ParamUnknown
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by an action handler or the execution engine.
///
/// Carries one of the stable [`ErrorKind`]s plus a human-readable message;
/// the executor copies both into `ExecutionResult.error_details`. A handler
/// that recorded state before failing (vision handlers set
/// `last_vision_status` even on a failed loop) attaches it as `vars`, which
/// the engine merges into the context before terminating.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
    pub vars: std::collections::HashMap<String, serde_json::Value>,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            vars: std::collections::HashMap::new(),
        }
    }

    /// Attach context variables that survive this failure
    pub fn with_vars(mut self, vars: std::collections::HashMap<String, serde_json::Value>) -> Self {
        self.vars = vars;
        self
    }

    /// A required parameter is absent or has the wrong shape
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailure, message)
    }

    /// The platform driver reported a failure
    pub fn driver(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DriverFailure, message)
    }

    /// A broker receive exceeded its deadline
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// A stop request interrupted the action
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}

impl From<crate::driver::DriverError> for ActionError {
    fn from(e: crate::driver::DriverError) -> Self {
        ActionError::driver(e.to_string())
    }
}

impl From<crate::broker::BrokerError> for ActionError {
    fn from(e: crate::broker::BrokerError) -> Self {
        ActionError::new(ErrorKind::ExternalCallFailure, e.to_string())
    }
}

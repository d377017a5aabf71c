//! Protocol execution: context, substitution, engine and the service loop

mod context;
mod engine;
mod result;
mod service;
mod substitute;

pub use context::{ControlHandle, ExecutionContext, sleep_cancellable};
pub use engine::ProtocolExecutor;
pub use result::{
    ActionRecord, ErrorDetails, ExecutionObserver, ExecutionResult, ExecutionStatus, RingBufferObserver,
    TracingObserver,
};
pub use service::ExecutorService;
pub use substitute::{substitute_params, substitute_value};

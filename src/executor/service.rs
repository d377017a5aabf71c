//! ExecutorService - the executor process main loop
//!
//! Polls the protocols channel, re-validates on receipt (the planner
//! already validated, but the broker performs no content checks), executes,
//! and publishes the result on the status channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::actions::{ActionRegistry, HandlerDeps};
use crate::broker::{BrokerError, BrokerMessage, Channel, MessageBus, MessageType};
use crate::config::Config;
use crate::driver::PlatformDriver;
use crate::mouse::MouseController;
use crate::protocol::ProtocolParser;

use super::context::ControlHandle;
use super::engine::ProtocolExecutor;
use super::result::ExecutionResult;

/// The executor side of the two-process pair
pub struct ExecutorService {
    bus: Arc<dyn MessageBus>,
    registry: Arc<ActionRegistry>,
    config: Config,
    executor: ProtocolExecutor,
}

impl ExecutorService {
    /// Wire up the registry, collaborators and engine for one process
    pub fn new(config: Config, driver: Arc<dyn PlatformDriver>, bus: Arc<dyn MessageBus>) -> Self {
        let mouse = Arc::new(MouseController::new(driver.clone()));
        let mut registry = ActionRegistry::standard().with_library(config.effective_library());
        registry.inject(HandlerDeps::new(driver, bus.clone(), mouse));
        let registry = Arc::new(registry);

        let executor = ProtocolExecutor::new(registry.clone(), config.execution.clone(), config.vision.clone());

        Self {
            bus,
            registry,
            config,
            executor,
        }
    }

    /// Pause/resume/stop handle, shared with signal handlers
    pub fn control(&self) -> ControlHandle {
        self.executor.control()
    }

    /// Poll-and-execute until a stop is requested
    pub async fn run(&self) -> Result<(), BrokerError> {
        info!("executor service started");
        let control = self.control();
        loop {
            if control.is_stop_requested() {
                info!("executor service stopping");
                return Ok(());
            }
            self.poll_once().await?;
        }
    }

    /// One poll of the protocols channel; true when a protocol was handled
    pub async fn poll_once(&self) -> Result<bool, BrokerError> {
        let timeout = Duration::from_millis(self.config.broker.poll_interval_ms);
        let Some(message) = self.bus.receive(Channel::Protocols, timeout, None).await? else {
            return Ok(false);
        };
        self.handle_protocol(message).await?;
        Ok(true)
    }

    async fn handle_protocol(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let request_id = message.request_id.clone();
        info!(%request_id, "protocol received");

        let parser = ProtocolParser::new(&*self.registry)
            .strict(self.config.validation.strict_mode)
            .max_macro_depth(self.config.execution.max_macro_depth);

        let result = match parser.parse_value(&message.payload) {
            Err(e) => {
                warn!(%request_id, error = %e, "rejecting protocol");
                ExecutionResult::rejected(request_id.clone(), e.kind(), e.to_string())
            }
            Ok(parsed) => {
                match self.config.validation.warning_level.as_str() {
                    "silent" => {}
                    "print" => {
                        for warning in &parsed.warnings {
                            eprintln!("protocol warning ({}): {}", request_id, warning);
                        }
                    }
                    _ => {
                        for warning in &parsed.warnings {
                            warn!(%request_id, %warning, "protocol warning");
                        }
                    }
                }
                self.executor.execute(&parsed.protocol, HashMap::new()).await
            }
        };

        let status = BrokerMessage::from_payload(MessageType::ProtocolStatus, &*request_id, &result)?;
        self.bus.send(status).await
    }
}

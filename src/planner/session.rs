//! PlannerSession - the interactive planner main loop
//!
//! A cooperative single-task loop that multiplexes two sources: incoming
//! vision requests from the executor (checked first every tick) and user
//! command lines from the stdin producer thread. The wait-for-status loop
//! after sending a protocol keeps servicing vision requests, because the
//! protocol being waited on is usually the one generating them.

use colored::Colorize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::broker::{BrokerError, BrokerMessage, Channel, MessageBus, MessageType, VisualNavRequest};
use crate::config::Config;
use crate::executor::{ControlHandle, ExecutionResult, ExecutionStatus};
use crate::llm::LlmClient;
use crate::vision::VisionNavigator;

use super::generator::ProtocolGenerator;
use super::input::InputReceiver;
use super::intent::parse_intent;

/// The planner side of the two-process pair
pub struct PlannerSession {
    bus: Arc<dyn MessageBus>,
    llm: Arc<dyn LlmClient>,
    generator: ProtocolGenerator,
    navigator: VisionNavigator,
    config: Config,
    input: InputReceiver,
    control: ControlHandle,
    last_result: Option<ExecutionResult>,
}

impl PlannerSession {
    pub fn new(
        config: Config,
        bus: Arc<dyn MessageBus>,
        llm: Arc<dyn LlmClient>,
        navigator: VisionNavigator,
        input: InputReceiver,
    ) -> Self {
        let registry = Arc::new(crate::actions::ActionRegistry::standard().with_library(config.effective_library()));
        let generator = ProtocolGenerator::new(llm.clone(), registry)
            .strict(config.validation.strict_mode)
            .max_macro_depth(config.execution.max_macro_depth);

        Self {
            bus,
            llm,
            generator,
            navigator,
            config,
            input,
            control: ControlHandle::new(),
            last_result: None,
        }
    }

    /// Stop handle for the SIGINT hook
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Run until quit or stop
    pub async fn run(&mut self) -> Result<(), BrokerError> {
        self.print_welcome();
        loop {
            if self.control.is_stop_requested() {
                info!("planner session stopping");
                return Ok(());
            }
            if !self.tick().await? {
                return Ok(());
            }
        }
    }

    /// One multiplexer tick; false means quit
    pub async fn tick(&mut self) -> Result<bool, BrokerError> {
        // Vision requests take priority over user commands
        let tick_timeout = Duration::from_millis(self.config.broker.poll_interval_ms);
        if let Some(message) = self.bus.receive(Channel::VisualNavRequest, tick_timeout, None).await? {
            self.handle_vision_request(message).await?;
            return Ok(true);
        }

        let line = self.input.lock().await.try_recv();
        match line {
            Ok(line) => Ok(self.handle_line(line.trim()).await?),
            Err(TryRecvError::Empty) => Ok(true),
            Err(TryRecvError::Disconnected) => {
                debug!("input channel closed");
                Ok(false)
            }
        }
    }

    /// Run the vision loop for one incoming request and publish the outcome
    async fn handle_vision_request(&self, message: BrokerMessage) -> Result<(), BrokerError> {
        let request: VisualNavRequest = match message.payload_as() {
            Ok(request) => request,
            Err(e) => {
                warn!(request_id = %message.request_id, error = %e, "unreadable visual_nav_request");
                return Ok(());
            }
        };
        info!(request_id = %request.request_id, task = %request.task, "vision request received");

        let outcome = self.navigator.run(&request).await;
        let response = BrokerMessage::from_payload(MessageType::VisualNavResponse, &*request.request_id, &outcome)?;
        self.bus.send(response).await
    }

    /// Process one user line; false means quit
    async fn handle_line(&mut self, line: &str) -> Result<bool, BrokerError> {
        if line.is_empty() {
            return Ok(true);
        }
        if let Some(command) = line.strip_prefix('/') {
            return Ok(self.handle_slash_command(command));
        }
        self.process_command(line).await?;
        Ok(true)
    }

    fn handle_slash_command(&self, command: &str) -> bool {
        match command.split_whitespace().next().unwrap_or("") {
            "quit" | "q" | "exit" => {
                println!("Goodbye!");
                false
            }
            "help" | "h" => {
                self.print_help();
                true
            }
            "status" => {
                match &self.last_result {
                    Some(result) => self.print_result(result),
                    None => println!("No protocol has run yet."),
                }
                true
            }
            other => {
                println!("Unknown command: /{}. Try {}.", other, "/help".yellow());
                true
            }
        }
    }

    /// The full user-command pipeline: intent -> protocol -> send -> wait
    async fn process_command(&mut self, text: &str) -> Result<(), BrokerError> {
        // 1. Intent
        let intent = match parse_intent(&self.llm, text).await {
            Ok(intent) => intent,
            Err(e) => {
                println!("{} {}", "Intent parsing failed:".bright_red(), e);
                return Ok(());
            }
        };
        if intent.confidence < self.config.planner.confidence_threshold {
            println!(
                "{} understood as \"{} {}\" with low confidence {:.2}",
                "Warning:".yellow(),
                intent.action,
                intent.target,
                intent.confidence
            );
            if self.config.planner.refuse_low_confidence {
                println!("Refusing to act on a low-confidence command. Rephrase and try again.");
                return Ok(());
            }
        }

        // 2. Protocol
        let (protocol, warnings) = match self.generator.generate(text).await {
            Ok(result) => result,
            Err(e) => {
                println!("{} {}", "Protocol generation failed:".bright_red(), e);
                return Ok(());
            }
        };
        for warning in &warnings {
            println!("{} {}", "Validation warning:".yellow(), warning);
        }

        // 3. Display and optionally confirm
        println!("{} {}", "Generated:".bright_cyan(), protocol.summary());
        if self.config.planner.confirm_protocols {
            println!("{}", protocol.to_pretty_json());
            println!("{}", "Send this protocol? [y/N]".yellow());
            if !self.read_confirmation().await {
                println!("Discarded.");
                return Ok(());
            }
        }

        // 4. Send and wait, servicing vision requests meanwhile
        let protocol_id = protocol.protocol_id();
        let payload = serde_json::to_value(&protocol)?;
        self.bus
            .send(BrokerMessage::new(MessageType::Protocol, &*protocol_id, payload))
            .await?;
        info!(%protocol_id, "protocol sent");

        let result = self.wait_for_status(&protocol_id).await?;
        self.print_result(&result);
        self.last_result = Some(result);
        Ok(())
    }

    /// Wait for the protocol's status while keeping the vision loop alive.
    ///
    /// The deadline extends every time a vision request completes - a
    /// protocol in a long vision loop is making progress, not hanging.
    async fn wait_for_status(&self, protocol_id: &str) -> Result<ExecutionResult, BrokerError> {
        let base = Duration::from_secs(self.config.planner.status_timeout_s);
        let tick = Duration::from_millis(self.config.broker.poll_interval_ms);
        let started = Instant::now();
        let mut deadline = Instant::now() + base;

        loop {
            if let Some(message) = self.bus.receive(Channel::Status, tick, Some(protocol_id)).await? {
                match message.payload_as::<ExecutionResult>() {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        warn!(%protocol_id, error = %e, "unreadable status payload");
                        return Ok(ExecutionResult::timed_out(protocol_id, started.elapsed().as_millis() as u64));
                    }
                }
            }

            if let Some(message) = self.bus.try_receive(Channel::VisualNavRequest, None).await? {
                self.handle_vision_request(message).await?;
                deadline = Instant::now() + base;
                debug!(%protocol_id, "status wait extended after vision activity");
            }

            if self.control.is_stop_requested() || Instant::now() >= deadline {
                warn!(%protocol_id, "no status received in time");
                return Ok(ExecutionResult::timed_out(protocol_id, started.elapsed().as_millis() as u64));
            }
        }
    }

    async fn read_confirmation(&self) -> bool {
        let answer = tokio::time::timeout(Duration::from_secs(60), async {
            self.input.lock().await.recv().await
        })
        .await;
        matches!(answer, Ok(Some(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "DeskPilot Planner".bright_cyan().bold());
        println!("Type a command in plain language, {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  {}          show this help", "/help".yellow());
        println!("  {}        show the last protocol result", "/status".yellow());
        println!("  {}          exit", "/quit".yellow());
        println!("Anything else is treated as a desktop automation command.");
    }

    /// Categorized result summary
    fn print_result(&self, result: &ExecutionResult) {
        let status = match result.status {
            ExecutionStatus::Success => "success".bright_green().bold(),
            ExecutionStatus::Failed => "failed".bright_red().bold(),
            ExecutionStatus::Timeout => "timeout".bright_red().bold(),
            ExecutionStatus::Stopped => "stopped".yellow().bold(),
            ExecutionStatus::Paused => "paused".yellow().bold(),
        };
        println!();
        println!(
            "{} {} ({}/{} actions, {} ms)",
            "Result:".bright_cyan(),
            status,
            result.actions_completed,
            result.actions_total,
            result.duration_ms
        );
        if let Some(details) = &result.error_details {
            println!(
                "  failed at action {} ({}) with {}",
                details.action_index, details.action_name, details.kind
            );
        }
        if let Some(error) = &result.error {
            println!("  {}", error);
        }
        if let Some(status) = result.context_snapshot.get("last_vision_status") {
            println!("  last vision status: {}", status);
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBus, NavStatus, VisualNavOutcome};
    use crate::config::Config;
    use crate::llm::mock::MockLlmClient;
    use crate::planner::input::channel_input;
    use crate::vision::VisionNavigator;
    use serde_json::json;

    fn session(
        bus: Arc<MemoryBus>,
        llm: Arc<MockLlmClient>,
        input: InputReceiver,
    ) -> PlannerSession {
        let mut config = Config::default();
        config.vision.enable_audit_log = false;
        config.planner.status_timeout_s = 2;
        config.planner.state_timeout_s = 1;
        config.planner.action_timeout_s = 1;
        config.broker.poll_interval_ms = 10;
        let navigator = VisionNavigator::new(bus.clone(), llm.clone(), config.vision.clone(), &config.planner);
        PlannerSession::new(config, bus, llm, navigator, input)
    }

    #[tokio::test]
    async fn test_command_roundtrip_with_executor_stub() {
        let bus = Arc::new(MemoryBus::new());
        let llm = Arc::new(MockLlmClient::new(vec![
            json!({"action": "open", "target": "nothing", "confidence": 0.9}).to_string(),
            json!({
                "version": "1.0",
                "metadata": {"description": "press enter", "complexity": "simple", "uses_vision": false},
                "actions": [{"action": "press_key", "params": {"key": "enter"}}]
            })
            .to_string(),
        ]));
        let (tx, input) = channel_input();
        let mut session = session(bus.clone(), llm, input);

        // Executor stub: echo a success status for whatever protocol arrives
        let stub = {
            let bus = (*bus).clone();
            tokio::spawn(async move {
                let message = bus
                    .receive(Channel::Protocols, Duration::from_secs(2), None)
                    .await
                    .unwrap()
                    .expect("protocol");
                let result = ExecutionResult {
                    protocol_id: message.request_id.clone(),
                    status: ExecutionStatus::Success,
                    actions_completed: 1,
                    actions_total: 1,
                    duration_ms: 5,
                    started_at: chrono::Utc::now(),
                    finished_at: chrono::Utc::now(),
                    error: None,
                    error_details: None,
                    context_snapshot: Default::default(),
                };
                bus.send(
                    BrokerMessage::from_payload(MessageType::ProtocolStatus, &*message.request_id, &result).unwrap(),
                )
                .await
                .unwrap();
            })
        };

        tx.send("press enter".to_string()).await.unwrap();
        // First tick processes the command end to end
        let mut done = false;
        for _ in 0..50 {
            session.tick().await.unwrap();
            if session.last_result.is_some() {
                done = true;
                break;
            }
        }
        stub.await.unwrap();
        assert!(done);
        assert_eq!(session.last_result.as_ref().unwrap().status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_vision_request_answered_from_tick() {
        let bus = Arc::new(MemoryBus::new());
        // Navigator will time out waiting for state (no executor); it still
        // must publish a terminal outcome.
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let (_tx, input) = channel_input();
        let mut session = session(bus.clone(), llm, input);

        let request = VisualNavRequest {
            request_id: "req-9".to_string(),
            task: "t".to_string(),
            goal: "g".to_string(),
            max_iterations: 1,
        };
        bus.send(BrokerMessage::from_payload(MessageType::VisualNavRequest, "req-9", &request).unwrap())
            .await
            .unwrap();

        session.tick().await.unwrap();

        let response = bus
            .receive(Channel::VisualNavResponse, Duration::from_secs(1), Some("req-9"))
            .await
            .unwrap()
            .expect("terminal outcome");
        let outcome: VisualNavOutcome = response.payload_as().unwrap();
        assert_eq!(outcome.status, NavStatus::Failed);
    }

    #[tokio::test]
    async fn test_quit_command_ends_session() {
        let bus = Arc::new(MemoryBus::new());
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let (tx, input) = channel_input();
        let mut session = session(bus, llm, input);

        tx.send("/quit".to_string()).await.unwrap();
        let mut alive = true;
        for _ in 0..10 {
            alive = session.tick().await.unwrap();
            if !alive {
                break;
            }
        }
        assert!(!alive);
    }
}

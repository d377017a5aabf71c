//! DeskPilot configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main DeskPilot configuration
///
/// Both binaries load the same file; the planner reads `planner`, `vision`
/// and `llm`, the executor reads `execution`, `actions` and `vision`, and
/// both read `broker` (they must agree on the root directory).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Protocol validation settings
    pub validation: ValidationConfig,

    /// Protocol execution settings
    pub execution: ExecutionConfig,

    /// Message broker settings
    pub broker: BrokerConfig,

    /// Vision navigation settings
    pub vision: VisionConfig,

    /// Action library gating
    pub actions: ActionLibraryConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Planner session settings
    pub planner: PlannerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .deskpilot.yml
        let local_config = PathBuf::from(".deskpilot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/deskpilot/deskpilot.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("deskpilot").join("deskpilot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Action-library gating with the vision master switch applied: when
    /// vision is off, the whole vision family is disabled.
    pub fn effective_library(&self) -> ActionLibraryConfig {
        let mut library = self.actions.clone();
        if !self.vision.enabled {
            library.disabled_actions.extend(
                ["verify_screen", "verify_element", "find_element", "verify_text", "visual_navigate"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        library
    }
}

/// Protocol validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Promote validation warnings to errors
    #[serde(rename = "strict-mode")]
    pub strict_mode: bool,

    /// Log validation warnings ("silent", "log", "print")
    #[serde(rename = "warning-level")]
    pub warning_level: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            warning_level: "log".to_string(),
        }
    }
}

/// Protocol execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Substitute and log every action without touching the driver
    #[serde(rename = "dry-run")]
    pub dry_run: bool,

    /// Delay applied after actions that do not specify `wait_after_ms`
    #[serde(rename = "default-wait-ms")]
    pub default_wait_ms: u64,

    /// Maximum macro nesting depth
    #[serde(rename = "max-macro-depth")]
    pub max_macro_depth: u32,

    /// Poll interval for pause/stop checks and cancellable sleeps
    #[serde(rename = "control-poll-ms")]
    pub control_poll_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            default_wait_ms: 0,
            max_macro_depth: 5,
            control_poll_ms: 50,
        }
    }
}

/// Message broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Shared root directory holding one subdirectory per channel
    #[serde(rename = "root-dir")]
    pub root_dir: PathBuf,

    /// Directory poll interval for `receive`
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_broker_root(),
            poll_interval_ms: 100,
        }
    }
}

/// Default broker root under the platform data-local directory
fn default_broker_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("deskpilot")
        .join("messages")
}

/// Vision navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Master switch for `visual_navigate` and the vision action family
    pub enabled: bool,

    /// Iteration budget per `visual_navigate` action
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Ceiling for a single iteration (state + analysis + action)
    #[serde(rename = "iteration-timeout-s")]
    pub iteration_timeout_s: u64,

    /// Proposals below this confidence are executed but logged loudly
    #[serde(rename = "confidence-threshold")]
    pub confidence_threshold: f64,

    /// Ask the user before acting on reasoning that mentions a critical keyword
    #[serde(rename = "require-confirmation-for-critical")]
    pub require_confirmation_for_critical: bool,

    /// Keywords that mark an action as critical
    #[serde(rename = "critical-keywords")]
    pub critical_keywords: Vec<String>,

    /// Identical proposals within 5 px required to declare a loop
    #[serde(rename = "loop-detection-threshold")]
    pub loop_detection_threshold: usize,

    /// Ring buffer size for the action history
    #[serde(rename = "loop-detection-buffer-size")]
    pub loop_detection_buffer_size: usize,

    /// JPEG quality for screenshots sent to the vision model
    #[serde(rename = "screenshot-quality")]
    pub screenshot_quality: u8,

    /// Append one JSON object per iteration to the audit log
    #[serde(rename = "enable-audit-log")]
    pub enable_audit_log: bool,

    /// Audit log path (JSON lines)
    #[serde(rename = "audit-log-path")]
    pub audit_log_path: PathBuf,

    /// Minimum distance from every screen edge, in pixels
    #[serde(rename = "coordinate-margin")]
    pub coordinate_margin: i32,

    /// Out-of-margin overshoot that is clamped instead of rejected
    #[serde(rename = "coordinate-clamp-tolerance")]
    pub coordinate_clamp_tolerance: i32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 10,
            iteration_timeout_s: 30,
            confidence_threshold: 0.5,
            require_confirmation_for_critical: true,
            critical_keywords: default_critical_keywords(),
            loop_detection_threshold: 3,
            loop_detection_buffer_size: 10,
            screenshot_quality: 85,
            enable_audit_log: false,
            audit_log_path: default_audit_log_path(),
            coordinate_margin: 5,
            coordinate_clamp_tolerance: 10,
        }
    }
}

fn default_critical_keywords() -> Vec<String> {
    ["delete", "format", "shutdown", "remove", "erase", "destroy", "wipe", "reset"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_audit_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("deskpilot")
        .join("vision_audit.jsonl")
}

/// Action library gating
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLibraryConfig {
    /// Categories available to protocols; empty means all
    #[serde(rename = "enabled-categories")]
    pub enabled_categories: Vec<String>,

    /// Individually disabled action names
    #[serde(rename = "disabled-actions")]
    pub disabled_actions: Vec<String>,
}

impl Default for ActionLibraryConfig {
    fn default() -> Self {
        Self {
            enabled_categories: Vec::new(),
            disabled_actions: Vec::new(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier for text completions
    pub model: String,

    /// Model identifier for vision completions (defaults to `model`)
    #[serde(rename = "vision-model")]
    pub vision_model: Option<String>,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            vision_model: None,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 8192,
            timeout_ms: 120_000,
        }
    }
}

/// Planner session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Base wait for a protocol status, extended on vision activity
    #[serde(rename = "status-timeout-s")]
    pub status_timeout_s: u64,

    /// Wait for a visual state response (screenshot roundtrip)
    #[serde(rename = "state-timeout-s")]
    pub state_timeout_s: u64,

    /// Wait for a visual action result
    #[serde(rename = "action-timeout-s")]
    pub action_timeout_s: u64,

    /// Warn below this intent confidence
    #[serde(rename = "confidence-threshold")]
    pub confidence_threshold: f64,

    /// Refuse (instead of warn) below the confidence threshold
    #[serde(rename = "refuse-low-confidence")]
    pub refuse_low_confidence: bool,

    /// Show the generated protocol and ask before sending
    #[serde(rename = "confirm-protocols")]
    pub confirm_protocols: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            status_timeout_s: 60,
            state_timeout_s: 10,
            action_timeout_s: 10,
            confidence_threshold: 0.6,
            refuse_low_confidence: false,
            confirm_protocols: false,
        }
    }
}

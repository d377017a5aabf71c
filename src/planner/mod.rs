//! Planner process: input plumbing, intent parsing, protocol generation
//! and the interactive session loop

mod generator;
mod input;
mod intent;
mod session;

pub use generator::{GenerateError, ProtocolGenerator, repair_json};
pub use input::{InputReceiver, StdinConfirmer, channel_input, spawn_input_reader};
pub use intent::{CommandIntent, parse_intent};
pub use session::PlannerSession;

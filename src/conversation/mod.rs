//! Multi-turn dialogue: one clarifying question, then one query

pub mod orchestrator;
pub mod session;
pub mod state;

pub use orchestrator::{Event, Orchestrator, OrchestratorSettings, StepOutcome, Stepped};
pub use session::{DispatchError, SessionStore};
pub use state::{Answer, ConversationState, Rejection, Role, Stage, Turn};

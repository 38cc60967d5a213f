//! The bareagent turn loop.
//!
//! A turn follows an **Invoke → Dispatch → Observe** cycle:
//!
//! 1. **Invoke** the model with the transcript and the tool schemas
//! 2. **If tool calls**: run them all concurrently, record the results in
//!    call order, and invoke again
//! 3. **If text only**: the turn is done
//!
//! [`Session`] queues inputs in front of an [`AgentLoop`] and lets the
//! caller cancel the turn in progress. [`SubtaskTool`] lets the model hand
//! work to a nested loop.

pub mod dispatch;
pub mod loop_runner;
pub mod session;
pub mod subtask;

#[cfg(test)]
mod test_helpers;

pub use dispatch::Dispatcher;
pub use loop_runner::AgentLoop;
pub use session::{Session, SessionState, TurnOutcome};
pub use subtask::{SubagentBackend, SubtaskTool};

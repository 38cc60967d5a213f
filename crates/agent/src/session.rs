//! Session controller: a FIFO input queue in front of one [`AgentLoop`].
//!
//! Inputs are processed strictly one at a time by a single worker task.
//! The caller may keep submitting while a turn runs; inputs wait in the
//! queue. A cancel request only affects the turn in progress.
//!
//! Tool set and model changes are staged and applied by the worker before
//! it starts the next turn, never during one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bareagent_core::context::ToolContext;
use bareagent_core::error::Error;
use bareagent_core::message::{Message, SharedConversation};
use bareagent_core::provider::{InvokeOptions, ProviderAdapter};
use bareagent_core::tool::ToolSet;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::loop_runner::AgentLoop;

/// Whether the worker is currently running a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Busy,
}

/// The result of processing one submitted input.
#[derive(Debug)]
pub struct TurnOutcome {
    pub input: String,
    pub result: Result<String, Error>,
}

/// Changes staged for the start of the next turn.
#[derive(Default)]
struct Staged {
    tools: Option<ToolSet>,
    model: Option<String>,
    backend: Option<(Arc<dyn ProviderAdapter>, InvokeOptions)>,
    clear: bool,
}

#[derive(Default)]
struct Shared {
    /// Cancellation token of the turn in progress.
    active: Mutex<Option<CancellationToken>>,
    staged: Mutex<Staged>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running session: queue, worker, and shared transcript.
pub struct Session {
    inputs: Option<mpsc::UnboundedSender<String>>,
    outcomes: mpsc::UnboundedReceiver<TurnOutcome>,
    state: watch::Receiver<SessionState>,
    shared: Arc<Shared>,
    conversation: SharedConversation,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session with an empty conversation.
    pub fn start(agent: AgentLoop, ctx: ToolContext) -> Self {
        Self::resume(agent, ctx, SharedConversation::default())
    }

    /// Start a session continuing `conversation`.
    pub fn resume(agent: AgentLoop, ctx: ToolContext, conversation: SharedConversation) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let shared = Arc::new(Shared::default());

        let worker = Worker {
            agent,
            ctx,
            conversation: conversation.clone(),
            shared: Arc::clone(&shared),
            state: state_tx,
            outcomes: outcome_tx,
        };
        let handle = tokio::spawn(worker.run(input_rx));

        Self {
            inputs: Some(input_tx),
            outcomes: outcome_rx,
            state: state_rx,
            shared,
            conversation,
            worker: Some(handle),
        }
    }

    /// Queue an input. Never waits for the turn.
    pub fn submit(&self, input: impl Into<String>) -> Result<(), Error> {
        let sender = self.inputs.as_ref().ok_or(Error::SessionClosed)?;
        sender.send(input.into()).map_err(|_| Error::SessionClosed)
    }

    /// Cancel the turn in progress. Returns whether there was one.
    pub fn request_cancel(&self) -> bool {
        match lock(&self.shared.active).as_ref() {
            Some(token) => {
                info!("Cancelling active turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Read-only copy of the transcript.
    pub fn conversation(&self) -> Vec<Message> {
        self.conversation.snapshot()
    }

    /// The shared transcript handle.
    pub fn shared_conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    /// Use `tools` from the next turn on.
    pub fn set_tools(&self, tools: ToolSet) {
        lock(&self.shared.staged).tools = Some(tools);
    }

    /// Use `model` as the primary model from the next turn on.
    pub fn set_model(&self, model: impl Into<String>) {
        lock(&self.shared.staged).model = Some(model.into());
    }

    /// Use another backend from the next turn on.
    pub fn set_backend(&self, adapter: Arc<dyn ProviderAdapter>, options: InvokeOptions) {
        let mut staged = lock(&self.shared.staged);
        staged.backend = Some((adapter, options));
        staged.model = None;
    }

    /// Empty the transcript before the next turn.
    pub fn clear(&self) {
        lock(&self.shared.staged).clear = true;
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait for the next processed input, in submission order. `None` once
    /// the session is closed and drained.
    pub async fn next_outcome(&mut self) -> Option<TurnOutcome> {
        self.outcomes.recv().await
    }

    /// Stop accepting inputs, finish the queued ones, and join the worker.
    pub async fn close(&mut self) {
        self.inputs.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Session worker ended abnormally");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.request_cancel();
        }
    }
}

struct Worker {
    agent: AgentLoop,
    ctx: ToolContext,
    conversation: SharedConversation,
    shared: Arc<Shared>,
    state: watch::Sender<SessionState>,
    outcomes: mpsc::UnboundedSender<TurnOutcome>,
}

impl Worker {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<String>) {
        while let Some(input) = inputs.recv().await {
            self.apply_staged();

            let turn_ctx = self.ctx.child();
            *lock(&self.shared.active) = Some(turn_ctx.cancellation_token().clone());
            self.state.send_replace(SessionState::Busy);

            let result = self
                .agent
                .run_turn(&self.conversation, &input, turn_ctx)
                .await;

            lock(&self.shared.active).take();
            self.state.send_replace(SessionState::Idle);

            if self.outcomes.send(TurnOutcome { input, result }).is_err() {
                debug!("Outcome receiver dropped");
            }
        }
        debug!("Session worker finished");
    }

    fn apply_staged(&mut self) {
        let staged = std::mem::take(&mut *lock(&self.shared.staged));
        if let Some((adapter, options)) = staged.backend {
            info!(provider = adapter.name(), model = ?options.primary_model(), "Switching backend");
            self.agent.set_adapter(adapter, options);
        }
        if let Some(model) = staged.model {
            info!(model = %model, "Switching model");
            self.agent.set_model(model);
        }
        if let Some(tools) = staged.tools {
            info!(tools = tools.len(), "Replacing tool set");
            self.agent.set_tools(tools);
        }
        if staged.clear {
            self.conversation.clear();
        }
    }
}

//! Ambient tool context: state a turn hands down to its tool calls.
//!
//! A [`ToolContext`] carries the working directory, an optional approval
//! handler, typed bindings and the turn's cancellation signal. The turn
//! loop binds one with [`ToolContext::scope`]; every tool task spawned
//! during dispatch receives a snapshot taken at spawn time.
//!
//! Snapshot semantics:
//! - the binding table is copied per task, so [`ToolContext::insert`]
//!   inside one tool is never seen by a sibling;
//! - values stored behind interior mutability (for example an
//!   `Arc<Mutex<T>>` bound with [`ToolContext::insert_shared`]) are shared
//!   by reference. Their mutations outlive the turn and are visible to the
//!   caller, but concurrent siblings see them last-write-wins with no
//!   ordering guarantee. Tools that need read-after-write within one turn
//!   must be serialized by the caller.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static CURRENT: ToolContext;
}

/// Asks the user (or a policy) whether a side-effecting tool may proceed.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn approve(&self, tool: &str, summary: &str) -> bool;
}

/// Approves everything.
pub struct AutoApprove;

#[async_trait]
impl ApprovalHandler for AutoApprove {
    async fn approve(&self, _tool: &str, _summary: &str) -> bool {
        true
    }
}

type Binding = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
pub struct ToolContext {
    working_dir: PathBuf,
    sandboxed: bool,
    approval: Option<Arc<dyn ApprovalHandler>>,
    bindings: HashMap<TypeId, Binding>,
    cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            sandboxed: false,
            approval: None,
            bindings: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Restrict file tools to relative paths inside the working directory.
    pub fn with_sandbox(mut self, sandboxed: bool) -> Self {
        self.sandboxed = sandboxed;
        self
    }

    pub fn with_approval(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval = Some(handler);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Builder form of [`ToolContext::insert`].
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Builder form of [`ToolContext::insert_shared`].
    pub fn with_shared<T: Send + Sync + 'static>(mut self, value: Arc<T>) -> Self {
        self.insert_shared(value);
        self
    }

    /// Bind a value by type, replacing any previous binding of that type in
    /// this snapshot only.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.insert_shared(Arc::new(value));
    }

    /// Bind a shared object; the caller keeps its own handle.
    pub fn insert_shared<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.bindings.insert(TypeId::of::<T>(), value);
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.bindings
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|binding| binding.downcast::<T>().ok())
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed
    }

    /// Ask the approval handler, approving when none is installed.
    pub async fn approve(&self, tool: &str, summary: &str) -> bool {
        match &self.approval {
            Some(handler) => handler.approve(tool, summary).await,
            None => true,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the owning turn is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Copy of this context whose cancellation is a child of ours.
    pub fn child(&self) -> Self {
        let mut child = self.clone();
        child.cancel = self.cancel.child_token();
        child
    }

    /// Run `fut` with this context bound as the current one.
    pub fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        CURRENT.scope(self, fut)
    }

    /// The context bound to the running task, if any.
    pub fn current() -> Option<ToolContext> {
        CURRENT.try_with(ToolContext::clone).ok()
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("working_dir", &self.working_dir)
            .field("sandboxed", &self.sandboxed)
            .field("approval", &self.approval.is_some())
            .field("bindings", &self.bindings.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Spawn `fut` on the runtime with `ctx` bound as its current context.
pub fn spawn_with_context<F>(ctx: ToolContext, fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(ctx.scope(fut))
}

/// Spawn `fut` with a snapshot of the caller's current context.
pub fn spawn_inherit<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    spawn_with_context(ToolContext::current().unwrap_or_default(), fut)
}

//! Terminal input shared by the prompt loop and edit approvals.

use std::io::{BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use bareagent_core::context::ApprovalHandler;
use tokio::sync::{Mutex, mpsc};

/// Lines read from stdin on a background thread.
#[derive(Clone)]
pub struct Console {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl Console {
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next line, or `None` at end of input.
    pub async fn read_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

/// Asks on the terminal before a tool changes anything.
pub struct ConsoleApproval {
    console: Console,
}

impl ConsoleApproval {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

#[async_trait]
impl ApprovalHandler for ConsoleApproval {
    async fn approve(&self, tool: &str, summary: &str) -> bool {
        eprint!("  Allow {tool}: {summary}? [y/N] ");
        let _ = std::io::stderr().flush();
        matches!(
            self.console.read_line().await.as_deref().map(str::trim),
            Some("y" | "Y" | "yes")
        )
    }
}

//! Tool dispatch: run every call of one model response concurrently.
//!
//! Each call gets its own tokio task carrying a snapshot of the caller's
//! [`ToolContext`]. Results are gathered as they settle and handed back
//! in call order. A cancel request stops the wait: settled results are
//! kept, everything still running is reported as interrupted and left
//! detached.

use std::sync::Arc;
use std::time::Instant;

use bareagent_core::context::{ToolContext, spawn_with_context};
use bareagent_core::event::{AgentEvent, EventBus};
use bareagent_core::provider::ProviderAdapter;
use bareagent_core::tool::{ToolCall, ToolResult, ToolSet};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{Instrument, debug, info_span, warn};

/// Everything a dispatch batch needs besides the calls themselves.
#[derive(Clone)]
pub struct Dispatcher {
    adapter: Arc<dyn ProviderAdapter>,
    tools: ToolSet,
    events: Option<EventBus>,
}

impl Dispatcher {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, tools: ToolSet) -> Self {
        Self {
            adapter,
            tools,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Execute `calls` and return one result per call, in call order.
    ///
    /// Never fails. When `ctx` is cancelled before a call settles, that
    /// call's result is [`ToolResult::interrupted`].
    pub async fn dispatch(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolResult> {
        let started = Instant::now();
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let mut running = FuturesUnordered::new();

        for (index, call) in calls.iter().enumerate() {
            self.publish(AgentEvent::ToolStarted {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
            });

            let adapter = Arc::clone(&self.adapter);
            let tools = self.tools.clone();
            let task_ctx = ctx.clone();
            let task_call = call.clone();
            let span = info_span!("tool", tool = %call.name, call_id = %call.id);
            let handle = spawn_with_context(
                ctx.clone(),
                async move { adapter.dispatch_tool(&task_call, &tools, task_ctx).await }
                    .instrument(span),
            );
            running.push(async move { (index, handle.await) });
        }

        let cancel = ctx.cancellation_token().clone();
        while !running.is_empty() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(unresolved = running.len(), "Dispatch cancelled");
                    break;
                }
                Some((index, outcome)) = running.next() => {
                    let call = &calls[index];
                    let result = match outcome {
                        Ok(result) => result,
                        Err(e) => {
                            warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool task failed");
                            ToolResult::error(
                                &call.id,
                                format!("Error calling tool {}: {}", call.name, task_failure(&e)),
                            )
                        }
                    };
                    self.finished(call, &result, started);
                    slots[index] = Some(result);
                }
            }
        }

        slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| {
                slot.unwrap_or_else(|| {
                    let result = ToolResult::interrupted(&call.id);
                    self.finished(call, &result, started);
                    result
                })
            })
            .collect()
    }

    fn finished(&self, call: &ToolCall, result: &ToolResult, started: Instant) {
        self.publish(AgentEvent::ToolFinished {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: result.status,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    fn publish(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn task_failure(e: &tokio::task::JoinError) -> &'static str {
    if e.is_panic() {
        "tool panicked"
    } else {
        "tool task was aborted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedAdapter, call, test_tools};
    use bareagent_core::tool::ToolStatus;
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(ScriptedAdapter::new(vec![])), test_tools())
    }

    #[tokio::test(start_paused = true)]
    async fn results_come_back_in_call_order() {
        let calls = vec![
            call("c1", "sleep", json!({"ms": 60, "label": "slow"})),
            call("c2", "sleep", json!({"ms": 5, "label": "fast"})),
            call("c3", "sleep", json!({"ms": 30, "label": "mid"})),
        ];
        let results = dispatcher().dispatch(&calls, &ToolContext::default()).await;

        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        let labels: Vec<_> = results.iter().map(|r| r.content.to_text()).collect();
        assert_eq!(labels, vec!["slow", "fast", "mid"]);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_run_concurrently() {
        let calls: Vec<_> = (0..4)
            .map(|i| call(&format!("c{i}"), "sleep", json!({"ms": 200, "label": "x"})))
            .collect();
        let start = tokio::time::Instant::now();
        let results = dispatcher().dispatch(&calls, &ToolContext::default()).await;
        assert!(results.iter().all(ToolResult::is_ok));
        // Run back to back these would take 800ms of clock time.
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn failures_do_not_affect_siblings() {
        let calls = vec![
            call("a", "fail", json!({})),
            call("b", "nonexistent", json!({})),
            call("c", "panic", json!({})),
            call("d", "sleep", json!({"ms": 1, "label": "fine"})),
        ];
        let results = dispatcher().dispatch(&calls, &ToolContext::default()).await;

        assert_eq!(results[0].status, ToolStatus::Error);
        assert!(results[0].content.to_text().starts_with("Error calling tool fail:"));
        assert_eq!(results[1].content.to_text(), "unknown tool: nonexistent");
        assert_eq!(results[2].status, ToolStatus::Error);
        assert!(results[2].content.to_text().contains("panicked"));
        assert!(results[3].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_unresolved_calls() {
        let token = CancellationToken::new();
        let ctx = ToolContext::default().with_cancellation(token.clone());
        let calls = vec![
            call("quick", "sleep", json!({"ms": 1, "label": "done"})),
            call("slow", "sleep", json!({"ms": 10_000, "label": "never"})),
        ];

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let results = dispatcher().dispatch(&calls, &ctx).await;
        canceller.await.unwrap();

        assert!(results[0].is_ok());
        assert_eq!(results[1].status, ToolStatus::Interrupted);
        assert_eq!(results[1].content.to_text(), "Interrupted");
    }

    #[tokio::test]
    async fn already_cancelled_interrupts_everything() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ToolContext::default().with_cancellation(token);
        let calls = vec![
            call("a", "sleep", json!({"ms": 500, "label": "a"})),
            call("b", "sleep", json!({"ms": 500, "label": "b"})),
        ];
        let results = dispatcher().dispatch(&calls, &ctx).await;
        assert!(results.iter().all(|r| r.status == ToolStatus::Interrupted));
    }

    #[tokio::test]
    async fn each_task_sees_the_dispatch_context() {
        let ctx = ToolContext::default().with(String::from("tenant-7"));
        let calls = vec![call("a", "whoami", json!({})), call("b", "whoami", json!({}))];
        let results = dispatcher().dispatch(&calls, &ctx).await;
        assert!(results.iter().all(|r| r.content.to_text() == "tenant-7"));
    }

    #[tokio::test]
    async fn events_published_per_call() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher().with_events(Some(bus));
        let calls = vec![call("a", "sleep", json!({"ms": 1, "label": "a"}))];
        dispatcher.dispatch(&calls, &ToolContext::default()).await;

        assert!(matches!(rx.recv().await.unwrap().as_ref(), AgentEvent::ToolStarted { call_id, .. } if call_id == "a"));
        assert!(matches!(
            rx.recv().await.unwrap().as_ref(),
            AgentEvent::ToolFinished { status: ToolStatus::Ok, .. }
        ));
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        assert!(dispatcher().dispatch(&[], &ToolContext::default()).await.is_empty());
    }
}

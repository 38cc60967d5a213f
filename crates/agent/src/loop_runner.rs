//! The turn loop.
//!
//! One turn: send the transcript to the model; if the reply asks for
//! tools, run them all, record the results, and ask again. The turn ends
//! when the model answers without requesting a tool.
//!
//! Transcript writes are batched. A turn's messages are buffered and
//! committed to the [`SharedConversation`] only when a round completes
//! (assistant reply plus its tool results, or the final reply), so readers
//! never see an assistant message whose tool results are missing.

use std::sync::Arc;

use bareagent_core::context::ToolContext;
use bareagent_core::error::Error;
use bareagent_core::event::{AgentEvent, EventBus, TurnState};
use bareagent_core::message::{Message, SharedConversation};
use bareagent_core::provider::{InvokeOptions, ProviderAdapter, RawResponse, WireSchema};
use bareagent_core::tool::ToolSet;
use chrono::Utc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::dispatch::Dispatcher;

/// Drives turns against one provider adapter and tool set.
pub struct AgentLoop {
    /// The LLM provider adapter
    adapter: Arc<dyn ProviderAdapter>,

    /// Registered tools
    tools: ToolSet,

    /// Wire schemas for `tools`, encoded once per tool set
    schemas: Vec<WireSchema>,

    /// Models, system prompt and limits for each invocation
    options: InvokeOptions,

    /// Optional cap on tool rounds per turn
    max_round_trips: Option<usize>,

    events: Option<EventBus>,
}

impl AgentLoop {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, tools: ToolSet, options: InvokeOptions) -> Self {
        let schemas = adapter.encode_schemas(&tools);
        Self {
            adapter,
            tools,
            schemas,
            options,
            max_round_trips: None,
            events: None,
        }
    }

    /// Publish progress on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// End a turn with [`Error::RoundTripLimit`] after `limit` tool rounds.
    pub fn with_max_round_trips(mut self, limit: usize) -> Self {
        self.max_round_trips = Some(limit);
        self
    }

    /// Replace the tool set, re-encoding its schemas.
    pub fn set_tools(&mut self, tools: ToolSet) {
        self.schemas = self.adapter.encode_schemas(&tools);
        self.tools = tools;
    }

    /// Switch the primary model, keeping configured fallbacks.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.options.set_primary(model);
    }

    /// Switch to another backend entirely.
    pub fn set_adapter(&mut self, adapter: Arc<dyn ProviderAdapter>, options: InvokeOptions) {
        self.schemas = adapter.encode_schemas(&self.tools);
        self.adapter = adapter;
        self.options = options;
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn options(&self) -> &InvokeOptions {
        &self.options
    }

    /// Run one turn for `input` and return the model's final text.
    ///
    /// On a provider error nothing from the failing round is recorded; if
    /// it was the first round the transcript is left exactly as it was. On
    /// cancellation while tools run, the round is recorded with every
    /// unfinished call marked interrupted, then [`Error::Cancelled`] is
    /// returned.
    pub async fn run_turn(
        &self,
        conversation: &SharedConversation,
        input: &str,
        ctx: ToolContext,
    ) -> Result<String, Error> {
        let conversation_id = conversation.id().to_string();
        info!(
            conversation_id = %conversation_id,
            messages = conversation.len(),
            "Processing turn"
        );
        self.publish(AgentEvent::TurnStarted {
            conversation_id: conversation_id.clone(),
            input: input.to_string(),
            timestamp: Utc::now(),
        });

        let mut round_trips = 0;
        let span = info_span!("turn", conversation_id = %conversation_id);
        let outcome = self
            .drive(conversation, input, &ctx, &mut round_trips)
            .instrument(span)
            .await;

        match &outcome {
            Ok(_) => {
                self.state(TurnState::Done);
                self.publish(AgentEvent::TurnCompleted {
                    conversation_id,
                    round_trips,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                if e.is_cancelled() {
                    info!(conversation_id = %conversation_id, round_trips, "Turn cancelled");
                    self.state(TurnState::Cancelled);
                } else {
                    warn!(conversation_id = %conversation_id, error = %e, "Turn failed");
                }
                self.publish(AgentEvent::TurnFailed {
                    conversation_id,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        outcome
    }

    async fn drive(
        &self,
        conversation: &SharedConversation,
        input: &str,
        ctx: &ToolContext,
        round_trips: &mut usize,
    ) -> Result<String, Error> {
        let dispatcher = Dispatcher::new(Arc::clone(&self.adapter), self.tools.clone())
            .with_events(self.events.clone());

        // Messages of the round in flight, not yet visible to readers.
        let mut pending = vec![Message::user(input)];
        let mut tool_rounds = 0;

        loop {
            *round_trips += 1;
            debug!(round = *round_trips, "Agent loop iteration");

            self.state(TurnState::AwaitingModel);
            let response = self.invoke(conversation, &pending, ctx).await?;
            let (text, calls) = self.adapter.split_response(&response)?;
            if !text.is_empty() {
                self.publish(AgentEvent::AssistantText {
                    model: response.model.clone(),
                    text: text.clone(),
                });
            }
            pending.extend(self.adapter.append_assistant(response));

            if calls.is_empty() {
                conversation.append(pending);
                return Ok(text);
            }

            debug!(tool_count = calls.len(), "Executing tool calls");
            self.state(TurnState::DispatchingTools);
            let results = dispatcher.dispatch(&calls, ctx).await;
            pending.extend(self.adapter.append_tool_results(results));
            conversation.append(std::mem::take(&mut pending));

            if ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tool_rounds += 1;
            if let Some(limit) = self.max_round_trips {
                if tool_rounds >= limit {
                    warn!(limit, "Round trip limit reached");
                    return Err(Error::RoundTripLimit { limit });
                }
            }
        }
    }

    /// Invoke the model on the committed transcript plus `pending`,
    /// giving up as soon as the turn is cancelled.
    async fn invoke(
        &self,
        conversation: &SharedConversation,
        pending: &[Message],
        ctx: &ToolContext,
    ) -> Result<RawResponse, Error> {
        let mut transcript = conversation.snapshot();
        transcript.extend_from_slice(pending);

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            response = self.adapter.invoke(&transcript, &self.schemas, &self.options) => {
                Ok(response?)
            }
        }
    }

    fn state(&self, state: TurnState) {
        self.publish(AgentEvent::StateChanged { state });
    }

    fn publish(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedAdapter, Step, call, calls, test_tools, text};
    use bareagent_core::error::ProviderError;
    use bareagent_core::message::{Conversation, Role};
    use bareagent_core::tool::ToolStatus;
    use serde_json::json;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn agent(steps: Vec<Step>) -> (Arc<ScriptedAdapter>, AgentLoop) {
        let adapter = Arc::new(ScriptedAdapter::new(steps));
        let agent = AgentLoop::new(adapter.clone(), test_tools(), InvokeOptions::new("mock-model"));
        (adapter, agent)
    }

    #[tokio::test]
    async fn simple_text_response() {
        let (adapter, agent) = agent(vec![text("Hello! How can I help?")]);
        let conv = SharedConversation::default();

        let reply = agent
            .run_turn(&conv, "Hello!", ToolContext::default())
            .await
            .unwrap();
        assert_eq!(reply, "Hello! How can I help?");
        assert_eq!(adapter.call_count(), 1);

        let messages = conv.snapshot();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let (adapter, agent) = agent(vec![
            calls(
                "Checking.",
                vec![
                    call("c1", "sleep", json!({"ms": 20, "label": "first"})),
                    call("c2", "sleep", json!({"ms": 1, "label": "second"})),
                ],
            ),
            text("Both done."),
        ]);
        let conv = SharedConversation::default();

        let reply = agent
            .run_turn(&conv, "run both", ToolContext::default())
            .await
            .unwrap();
        assert_eq!(reply, "Both done.");
        assert_eq!(adapter.call_count(), 2);

        // Second invocation saw user, assistant(calls), results.
        let second = &adapter.seen()[1];
        assert_eq!(second.len(), 3);
        let results = &second[2].tool_results;
        assert_eq!(results[0].call_id, "c1");
        assert_eq!(results[0].content.to_text(), "first");
        assert_eq!(results[1].call_id, "c2");

        assert_eq!(conv.len(), 4);
        assert!(conv.conversation().validate().is_ok());
    }

    #[tokio::test]
    async fn tool_failures_are_fed_back() {
        let (adapter, agent) = agent(vec![
            calls("", vec![call("c1", "fail", json!({}))]),
            text("The tool failed."),
        ]);
        let conv = SharedConversation::default();
        let reply = agent
            .run_turn(&conv, "try it", ToolContext::default())
            .await
            .unwrap();
        assert_eq!(reply, "The tool failed.");

        let result = &adapter.seen()[1][2].tool_results[0];
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(
            result.content.to_text(),
            "Error calling tool fail: fail failed: boom"
        );
    }

    #[tokio::test]
    async fn first_round_provider_error_leaves_transcript_untouched() {
        let (_, agent) = agent(vec![Step::Fail(ProviderError::ApiError {
            status_code: 500,
            message: "overloaded".into(),
        })]);
        let mut existing = Conversation::new();
        existing.push(Message::user("earlier"));
        existing.push(Message::assistant("earlier reply"));
        let conv = SharedConversation::new(existing);

        let err = agent
            .run_turn(&conv, "hello", ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::ApiError { status_code: 500, .. })));
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn later_round_provider_error_keeps_completed_rounds() {
        let (_, agent) = agent(vec![
            calls("", vec![call("c1", "sleep", json!({"ms": 1, "label": "x"}))]),
            Step::Fail(ProviderError::Network("connection reset".into())),
        ]);
        let conv = SharedConversation::default();
        let err = agent
            .run_turn(&conv, "go", ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
        assert_eq!(conv.len(), 3);
        assert!(conv.conversation().validate().is_ok());
    }

    #[tokio::test]
    async fn cancel_while_awaiting_model() {
        let (_, agent) = agent(vec![Step::Hang]);
        let conv = SharedConversation::default();
        let token = CancellationToken::new();
        let ctx = ToolContext::default().with_cancellation(token.clone());

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let err = agent.run_turn(&conv, "hello", ctx).await.unwrap_err();
        cancel.await.unwrap();

        assert!(err.is_cancelled());
        assert!(conv.is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_dispatch_records_interrupted_results() {
        let (adapter, agent) = agent(vec![calls(
            "",
            vec![
                call("c1", "sleep", json!({"ms": 10_000, "label": "a"})),
                call("c2", "sleep", json!({"ms": 10_000, "label": "b"})),
            ],
        )]);
        let conv = SharedConversation::default();
        let token = CancellationToken::new();
        let ctx = ToolContext::default().with_cancellation(token.clone());

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let err = agent.run_turn(&conv, "go", ctx).await.unwrap_err();
        cancel.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(adapter.call_count(), 1);
        let messages = conv.snapshot();
        assert_eq!(messages.len(), 3);
        let results = &messages[2].tool_results;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == ToolStatus::Interrupted
            && r.content.to_text() == "Interrupted"));
        assert!(conv.conversation().validate().is_ok());
    }

    #[tokio::test]
    async fn round_trip_limit_is_opt_in() {
        let looping = || {
            calls("", vec![call("c", "sleep", json!({"ms": 1, "label": "again"}))])
        };
        let (adapter, agent) = agent(vec![looping(), looping(), looping()]);
        let agent = agent.with_max_round_trips(2);
        let conv = SharedConversation::default();

        let err = agent
            .run_turn(&conv, "loop", ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RoundTripLimit { limit: 2 }));
        assert_eq!(adapter.call_count(), 2);
        assert!(conv.conversation().validate().is_ok());
    }

    #[tokio::test]
    async fn set_model_changes_next_invocation() {
        let (adapter, mut agent) = agent(vec![text("one"), text("two")]);
        let conv = SharedConversation::default();
        agent.run_turn(&conv, "a", ToolContext::default()).await.unwrap();
        agent.set_model("other-model");
        agent.run_turn(&conv, "b", ToolContext::default()).await.unwrap();
        assert_eq!(adapter.models(), vec!["mock-model", "other-model"]);
    }

    #[tokio::test]
    async fn events_trace_the_turn() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let (_, agent) = agent(vec![
            calls("Looking.", vec![call("c1", "sleep", json!({"ms": 1, "label": "x"}))]),
            text("Done."),
        ]);
        let agent = agent.with_events(bus);
        agent
            .run_turn(&SharedConversation::default(), "go", ToolContext::default())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                AgentEvent::TurnStarted { .. } => "started",
                AgentEvent::StateChanged { .. } => "state",
                AgentEvent::AssistantText { .. } => "text",
                AgentEvent::ToolStarted { .. } => "tool_started",
                AgentEvent::ToolFinished { .. } => "tool_finished",
                AgentEvent::TurnCompleted { round_trips, .. } => {
                    assert_eq!(*round_trips, 2);
                    "completed"
                }
                AgentEvent::TurnFailed { .. } => "failed",
            });
        }
        assert_eq!(kinds.first(), Some(&"started"));
        assert_eq!(kinds.last(), Some(&"completed"));
        assert!(kinds.contains(&"tool_started"));
        assert!(kinds.contains(&"tool_finished"));
        assert!(!kinds.contains(&"failed"));
    }
}

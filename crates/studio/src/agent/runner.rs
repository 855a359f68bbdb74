use super::finalize::Finalizer;
use super::types::*;
use crate::memory::RetrievalContext;
use crate::persistence::{ChatMessage, Conversation};
use crate::render::{classify, Annotation, ContentProjector};
use crate::tools::{duplicate_call_payload, wants_tools, ToolRuntime};
use crate::ui::{NoticeLevel, ToolStatus, UiEvent, UserInterface};
use llm::{
    ChatRequest, ChatTransport, GenerationOptions, StreamError, StreamEvent, StreamReader,
    WireMessage,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on model requests per submission
pub const MAX_ITERATIONS: usize = 5;

/// Collaborators required to construct a `TurnOrchestrator`.
pub struct OrchestratorComponents {
    pub transport: Arc<dyn ChatTransport>,
    pub tools: Arc<ToolRuntime>,
    pub ui: Arc<dyn UserInterface>,
    pub retrieval: Option<Arc<dyn RetrievalContext>>,
    pub finalizer: Option<Finalizer>,
}

#[derive(Debug, Clone, Default)]
pub struct TurnConfig {
    pub model: String,
    pub system_prompt: String,
    pub options: GenerationOptions,
    pub tools_enabled: bool,
}

/// How a pass through the tool loop ended
enum LoopExit {
    Finished(SubmitOutcome),
    /// The model refused a request that carried tools
    ToolsRejected { turn_ids: Vec<u64> },
}

/// Drives one user submission from request to final answer, executing
/// requested tools in between.
pub struct TurnOrchestrator {
    transport: Arc<dyn ChatTransport>,
    tools: Arc<ToolRuntime>,
    ui: Arc<dyn UserInterface>,
    retrieval: Option<Arc<dyn RetrievalContext>>,
    finalizer: Option<Finalizer>,
    capabilities: SessionCapabilities,
    config: TurnConfig,
    state: OrchestratorState,
    handle: GenerationHandle,
    next_turn_id: u64,
}

impl TurnOrchestrator {
    pub fn new(components: OrchestratorComponents, config: TurnConfig) -> Self {
        Self {
            transport: components.transport,
            tools: components.tools,
            ui: components.ui,
            retrieval: components.retrieval,
            finalizer: components.finalizer,
            capabilities: SessionCapabilities::default(),
            config,
            state: OrchestratorState::Idle,
            handle: GenerationHandle::default(),
            next_turn_id: 1,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn handle(&self) -> GenerationHandle {
        self.handle.clone()
    }

    #[cfg(test)]
    pub fn capabilities(&self) -> &SessionCapabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = model.into();
    }

    /// Submits user input and runs the tool loop until a final answer.
    ///
    /// Recoverable conditions never surface as errors; the outcome tells how
    /// the submission ended.
    pub async fn submit(
        &mut self,
        conversation: &mut Conversation,
        input: UserInput,
    ) -> SubmitOutcome {
        let Some(guard) = self.handle.begin() else {
            debug!("Rejecting submission while another one is in flight");
            return SubmitOutcome::Rejected(RejectReason::Busy);
        };
        if self.config.model.trim().is_empty() {
            return SubmitOutcome::Rejected(RejectReason::NoModel);
        }
        if input.is_empty() {
            return SubmitOutcome::Rejected(RejectReason::EmptyInput);
        }
        let token = guard.token();
        let model = self.config.model.clone();

        conversation.model = Some(model.clone());
        conversation.push_user(&input.text, input.attachments.clone());
        let user_index = conversation.messages.len() - 1;
        let query = conversation.messages[user_index].content_with_attachments();

        let prefix = self.request_prefix(&query).await;
        let offer_tools = self.should_offer_tools(&input.text);

        let outcome = match self
            .run_loop(conversation, &prefix, offer_tools, &token)
            .await
        {
            LoopExit::Finished(outcome) => outcome,
            LoopExit::ToolsRejected { turn_ids } => {
                info!("Model {model} does not support tools, retrying without them");
                self.capabilities.mark_tools_unsupported(&model);
                self.set_state(OrchestratorState::ToolRejectedRetry {
                    original_input: input.text.clone(),
                })
                .await;

                conversation.truncate(user_index + 1);
                for turn_id in turn_ids {
                    self.emit(UiEvent::TurnRemoved { turn_id }).await;
                }
                self.emit(UiEvent::Notice {
                    level: NoticeLevel::Warning,
                    message: format!(
                        "{model} does not support tool calling; tools are disabled for it"
                    ),
                })
                .await;
                self.emit(UiEvent::Notice {
                    level: NoticeLevel::Info,
                    message: "Retrying without tools...".to_string(),
                })
                .await;

                match self.run_loop(conversation, &prefix, false, &token).await {
                    LoopExit::Finished(outcome) => outcome,
                    LoopExit::ToolsRejected { .. } => {
                        let message = "Cannot retry: the request was rejected again".to_string();
                        self.emit(UiEvent::Notice {
                            level: NoticeLevel::Error,
                            message: message.clone(),
                        })
                        .await;
                        SubmitOutcome::Failed(message)
                    }
                }
            }
        };

        if let SubmitOutcome::Completed {
            exhausted: false, ..
        } = outcome
        {
            tokio::select! {
                _ = token.cancelled() => debug!("Finalization cancelled"),
                _ = self.finalize(conversation, &model, &input.text) => {}
            }
        }

        self.set_state(OrchestratorState::Idle).await;
        drop(guard);
        outcome
    }

    fn should_offer_tools(&self, text: &str) -> bool {
        self.config.tools_enabled
            && self.tools.has_tools()
            && self.capabilities.may_offer_tools(&self.config.model)
            && wants_tools(text)
    }

    /// System prompt and retrieved context that precede the history
    async fn request_prefix(&self, query: &str) -> Vec<WireMessage> {
        let mut prefix = Vec::new();
        if !self.config.system_prompt.trim().is_empty() {
            prefix.push(WireMessage::system(self.config.system_prompt.clone()));
        }

        if let Some(retrieval) = &self.retrieval {
            match retrieval.context_for(query).await {
                Ok(Some(context)) => {
                    self.emit(UiEvent::RetrievalHits {
                        count: context.hits,
                    })
                    .await;
                    prefix.push(WireMessage::system(context.message));
                }
                Ok(None) => {}
                Err(e) => warn!("Retrieval query failed: {e:#}"),
            }
        }
        prefix
    }

    async fn run_loop(
        &mut self,
        conversation: &mut Conversation,
        prefix: &[WireMessage],
        offer_tools: bool,
        token: &CancellationToken,
    ) -> LoopExit {
        let mut messages = prefix.to_vec();
        messages.extend(conversation.wire_messages());

        let mut dedup = DedupSet::default();
        let mut turn_ids = Vec::new();
        let mut last_turn: Option<(u64, ContentProjector)> = None;

        for iteration in 1..=MAX_ITERATIONS {
            // Tools are only ever offered on the first request
            let tools_offered = offer_tools && iteration == 1;
            let mut request = ChatRequest::streaming(self.config.model.clone(), messages.clone())
                .with_options(self.config.options.clone());
            if tools_offered {
                request = request.with_tools(self.tools.declarations());
            }

            let mut turn = Turn::new(self.next_turn_id);
            self.next_turn_id += 1;
            turn_ids.push(turn.id);
            let mut projector = ContentProjector::new();
            self.emit(UiEvent::TurnStarted { turn_id: turn.id }).await;
            self.set_state(OrchestratorState::AwaitingFirstToken).await;

            if let Err(error) = self
                .stream_turn(&request, &mut turn, &mut projector, token)
                .await
            {
                if error.is_tools_unsupported() && tools_offered {
                    return LoopExit::ToolsRejected { turn_ids };
                }

                turn.close_reasoning();
                projector.project(&turn.accumulated_text, false);
                let outcome = if error.is_aborted() {
                    debug!("Turn {} aborted: {error}", turn.id);
                    projector.annotate(Annotation::Aborted);
                    SubmitOutcome::Aborted
                } else {
                    let message = if error.is_tools_unsupported() {
                        "Request failed".to_string()
                    } else {
                        error.to_string()
                    };
                    warn!("Turn {} failed: {message}", turn.id);
                    projector.annotate(Annotation::Error(message.clone()));
                    SubmitOutcome::Failed(message)
                };
                self.publish(turn.id, &projector, Default::default()).await;

                if !turn.accumulated_text.trim().is_empty() {
                    conversation.push(ChatMessage::assistant(turn.accumulated_text));
                }
                return LoopExit::Finished(outcome);
            }

            turn.finish();
            let effects = projector.project(&turn.accumulated_text, false);
            self.publish(turn.id, &projector, effects).await;

            if turn.tool_calls.is_empty() {
                conversation.push(ChatMessage::assistant(turn.accumulated_text));
                return LoopExit::Finished(SubmitOutcome::Completed {
                    iterations: iteration,
                    exhausted: false,
                });
            }

            if tools_offered {
                self.capabilities.mark_tools_supported(&self.config.model);
            }
            self.set_state(OrchestratorState::ToolExecuting).await;

            messages.push(WireMessage::assistant_with_tool_calls(
                turn.accumulated_text.clone(),
                &turn.tool_calls,
            ));
            conversation.push(ChatMessage::assistant_with_tool_calls(
                turn.accumulated_text.clone(),
                &turn.tool_calls,
            ));

            for call in &turn.tool_calls {
                let result = if dedup.insert(call) {
                    self.emit(UiEvent::ToolStatus {
                        turn_id: turn.id,
                        name: call.name.clone(),
                        status: ToolStatus::Calling,
                    })
                    .await;
                    let result = tokio::select! {
                        _ = token.cancelled() => None,
                        result = self.tools.execute(call) => Some(result),
                    };
                    let Some(result) = result else {
                        debug!("Turn {} aborted during {}", turn.id, call.name);
                        projector.annotate(Annotation::Aborted);
                        self.publish(turn.id, &projector, Default::default()).await;
                        return LoopExit::Finished(SubmitOutcome::Aborted);
                    };
                    self.emit(UiEvent::ToolStatus {
                        turn_id: turn.id,
                        name: call.name.clone(),
                        status: ToolStatus::from_result(&result),
                    })
                    .await;
                    result
                } else {
                    warn!("Duplicate tool call detected: {}", call.signature());
                    self.emit(UiEvent::ToolStatus {
                        turn_id: turn.id,
                        name: call.name.clone(),
                        status: ToolStatus::Duplicate,
                    })
                    .await;
                    duplicate_call_payload()
                };

                messages.push(WireMessage::tool(call.name.clone(), result.clone()));
                conversation.push(ChatMessage::tool(call.name.clone(), result));
            }

            last_turn = Some((turn.id, projector));
        }

        warn!("Max tool iterations reached");
        if let Some((turn_id, mut projector)) = last_turn {
            projector.annotate(Annotation::Warning(format!(
                "reached the maximum number of tool iterations ({MAX_ITERATIONS})"
            )));
            self.publish(turn_id, &projector, Default::default()).await;
        }
        LoopExit::Finished(SubmitOutcome::Completed {
            iterations: MAX_ITERATIONS,
            exhausted: true,
        })
    }

    /// Streams one response into `turn`, projecting after every event
    async fn stream_turn(
        &mut self,
        request: &ChatRequest,
        turn: &mut Turn,
        projector: &mut ContentProjector,
        token: &CancellationToken,
    ) -> Result<(), StreamError> {
        let source = tokio::select! {
            _ = token.cancelled() => {
                return Err(StreamError::Aborted("request cancelled".to_string()));
            }
            opened = self.transport.open_stream(request) => opened?,
        };

        let mut reader = StreamReader::new(source).with_cancellation(token.clone());
        let mut first_event = true;
        while let Some(event) = reader.next_event().await? {
            match event {
                StreamEvent::ContentDelta(text) => turn.push_content(&text),
                StreamEvent::ReasoningDelta(text) => turn.push_reasoning(&text),
                StreamEvent::ToolCallDelta(calls) => turn.tool_calls.extend(calls),
                StreamEvent::Done => break,
            }

            if first_event {
                first_event = false;
                self.set_state(OrchestratorState::Streaming).await;
            }
            let effects = projector.project(&turn.accumulated_text, true);
            self.publish(turn.id, projector, effects).await;
        }
        Ok(())
    }

    async fn finalize(&self, conversation: &mut Conversation, model: &str, user_text: &str) {
        let Some(finalizer) = &self.finalizer else {
            return;
        };
        let Some(answer) = conversation.messages.last().map(|m| m.content.clone()) else {
            return;
        };
        let answer = classify(&answer).final_text;
        finalizer
            .finalize(conversation, model, user_text, &answer)
            .await;
    }

    async fn publish(
        &self,
        turn_id: u64,
        projector: &ContentProjector,
        effects: crate::render::ProjectionEffects,
    ) {
        self.emit(UiEvent::TurnUpdated {
            turn_id,
            presentation: projector.presentation().clone(),
            effects,
        })
        .await;
    }

    async fn set_state(&mut self, state: OrchestratorState) {
        if self.state == state {
            return;
        }
        self.state = state.clone();
        self.emit(UiEvent::StateChanged(state)).await;
    }

    async fn emit(&self, event: UiEvent) {
        if let Err(e) = self.ui.send_event(event).await {
            warn!("Failed to deliver UI event: {e}");
        }
    }
}

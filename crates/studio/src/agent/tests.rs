use super::runner::MAX_ITERATIONS;
use super::types::EMPTY_RESPONSE_PLACEHOLDER;
use super::*;
use crate::memory::{RetrievalContext, RetrievedContext};
use crate::persistence::Conversation;
use crate::render::{Annotation, Presentation};
use crate::tests::mocks::*;
use crate::tools::{duplicate_call_payload, ToolRuntime};
use crate::ui::{ToolStatus, UiEvent};
use anyhow::Result;
use async_trait::async_trait;
use llm::{GenerationOptions, MessageRole, StreamError};
use std::sync::Arc;
use std::time::Duration;

const MODEL: &str = "qwen3:8b";

struct Harness {
    orchestrator: TurnOrchestrator,
    transport: MockTransport,
    search: MockSearchProvider,
    ui: MockUI,
}

fn config(model: &str) -> TurnConfig {
    TurnConfig {
        model: model.to_string(),
        system_prompt: String::new(),
        options: GenerationOptions::default(),
        tools_enabled: true,
    }
}

fn harness(transport: MockTransport, search: MockSearchProvider) -> Harness {
    harness_with(transport, search, None, None, config(MODEL))
}

fn harness_with(
    transport: MockTransport,
    search: MockSearchProvider,
    retrieval: Option<Arc<dyn RetrievalContext>>,
    finalizer: Option<Finalizer>,
    config: TurnConfig,
) -> Harness {
    let ui = MockUI::default();
    let orchestrator = TurnOrchestrator::new(
        OrchestratorComponents {
            transport: Arc::new(transport.clone()),
            tools: Arc::new(ToolRuntime::with_web_search(Arc::new(search.clone()))),
            ui: Arc::new(ui.clone()),
            retrieval,
            finalizer,
        },
        config,
    );
    Harness {
        orchestrator,
        transport,
        search,
        ui,
    }
}

fn last_presentation(events: &[UiEvent]) -> Presentation {
    events
        .iter()
        .rev()
        .find_map(|event| match event {
            UiEvent::TurnUpdated { presentation, .. } => Some(presentation.clone()),
            _ => None,
        })
        .expect("at least one projected turn")
}

fn tool_statuses(events: &[UiEvent]) -> Vec<ToolStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::ToolStatus { status, .. } => Some(status.clone()),
            _ => None,
        })
        .collect()
}

fn state_changes(events: &[UiEvent]) -> Vec<OrchestratorState> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::StateChanged(state) => Some(state.clone()),
            _ => None,
        })
        .collect()
}

struct StaticRetrieval;

#[async_trait]
impl RetrievalContext for StaticRetrieval {
    async fn context_for(&self, query: &str) -> Result<Option<RetrievedContext>> {
        assert_eq!(query, "Explain ownership");
        Ok(Some(RetrievedContext {
            message: "[retrieved memories]".to_string(),
            hits: 2,
        }))
    }
}

#[tokio::test]
async fn test_plain_answer_completes_in_one_iteration() {
    let mut h = harness(
        MockTransport::new(vec![MockReply::Chunks(vec![
            content_line("Ownership "),
            content_line("moves values."),
            done_line(),
        ])]),
        MockSearchProvider::default(),
    );
    let mut conversation = Conversation::new();

    let outcome = h
        .orchestrator
        .submit(&mut conversation, UserInput::text("Explain ownership"))
        .await;

    assert_eq!(
        outcome,
        SubmitOutcome::Completed {
            iterations: 1,
            exhausted: false
        }
    );
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[1].role, MessageRole::Assistant);
    assert_eq!(conversation.messages[1].content, "Ownership moves values.");
    assert_eq!(conversation.model.as_deref(), Some(MODEL));
    assert_eq!(h.orchestrator.state(), &OrchestratorState::Idle);
    assert!(!h.orchestrator.handle().is_generating());

    // No lookup intent, so no tools were offered
    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].tools.is_none());
    assert!(requests[0].stream);

    let presentation = last_presentation(&h.ui.events());
    assert_eq!(presentation.final_panel.unwrap().text, "Ownership moves values.");
    assert_eq!(presentation.typing, None);
}

#[tokio::test]
async fn test_prefix_has_system_prompt_and_retrieved_context() {
    let mut turn_config = config(MODEL);
    turn_config.system_prompt = "Be brief.".to_string();
    let mut h = harness_with(
        MockTransport::new(vec![answer("Sure.")]),
        MockSearchProvider::default(),
        Some(Arc::new(StaticRetrieval)),
        None,
        turn_config,
    );
    let mut conversation = Conversation::new();

    h.orchestrator
        .submit(&mut conversation, UserInput::text("Explain ownership"))
        .await;

    let request = &h.transport.requests()[0];
    let roles: Vec<MessageRole> = request.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::System, MessageRole::System, MessageRole::User]
    );
    assert_eq!(request.messages[0].content, "Be brief.");
    assert_eq!(request.messages[1].content, "[retrieved memories]");
    assert!(h
        .ui
        .events()
        .contains(&UiEvent::RetrievalHits { count: 2 }));
}

#[tokio::test]
async fn test_duplicate_tool_call_is_not_executed_twice() {
    let mut h = harness(
        MockTransport::new(vec![
            MockReply::Chunks(vec![search_call_line("rust news"), done_line()]),
            MockReply::Chunks(vec![
                raw_search_call_line(r#"{ "query": "rust news" }"#),
                done_line(),
            ]),
            answer("Here is what I found."),
        ]),
        MockSearchProvider::new(vec![Ok(vec![search_hit("Rust")])]),
    );
    let mut conversation = Conversation::new();

    let outcome = h
        .orchestrator
        .submit(&mut conversation, UserInput::text("latest rust news"))
        .await;

    assert_eq!(
        outcome,
        SubmitOutcome::Completed {
            iterations: 3,
            exhausted: false
        }
    );
    assert_eq!(h.search.queries(), vec!["rust news"]);

    let roles: Vec<MessageRole> = conversation.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant,
        ]
    );
    assert!(conversation.messages[2].content.contains("\"results_count\":1"));
    assert_eq!(conversation.messages[4].content, duplicate_call_payload());
    assert_eq!(conversation.messages[4].name.as_deref(), Some("web_search"));

    // Tools only on the first request
    let requests = h.transport.streaming_requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].tools.is_some());
    assert!(requests[1].tools.is_none());
    assert!(requests[2].tools.is_none());
    // The second request carries the first tool exchange
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2].role, MessageRole::Tool);

    assert_eq!(
        tool_statuses(&h.ui.events()),
        vec![
            ToolStatus::Calling,
            ToolStatus::Succeeded { results_count: 1 },
            ToolStatus::Duplicate,
        ]
    );
    assert_eq!(h.orchestrator.capabilities().supports_tools(MODEL), Some(true));
}

#[tokio::test]
async fn test_tool_loop_stops_after_max_iterations() {
    let replies = (1..=MAX_ITERATIONS + 1)
        .map(|i| MockReply::Chunks(vec![search_call_line(&format!("query {i}")), done_line()]))
        .collect();
    let mut h = harness(MockTransport::new(replies), MockSearchProvider::default());
    let mut conversation = Conversation::new();

    let outcome = h
        .orchestrator
        .submit(&mut conversation, UserInput::text("search for rust releases"))
        .await;

    assert_eq!(
        outcome,
        SubmitOutcome::Completed {
            iterations: MAX_ITERATIONS,
            exhausted: true
        }
    );
    assert_eq!(h.transport.streaming_requests().len(), MAX_ITERATIONS);
    assert_eq!(h.search.queries().len(), MAX_ITERATIONS);

    let presentation = last_presentation(&h.ui.events());
    assert!(matches!(
        presentation.annotations.as_slice(),
        [Annotation::Warning(message)] if message.contains("maximum")
    ));
}

#[tokio::test]
async fn test_tools_unsupported_retries_once_without_tools() {
    let mut h = harness(
        MockTransport::new(vec![
            MockReply::Fail(StreamError::Status {
                status: 400,
                message: "registry.ollama.ai/library/gemma:2b does not support tools".to_string(),
            }),
            answer("No tools needed."),
            answer("Still no tools."),
        ]),
        MockSearchProvider::default(),
    );
    let mut conversation = Conversation::new();

    let outcome = h
        .orchestrator
        .submit(&mut conversation, UserInput::text("what is the latest news"))
        .await;

    assert_eq!(
        outcome,
        SubmitOutcome::Completed {
            iterations: 1,
            exhausted: false
        }
    );
    assert_eq!(h.orchestrator.capabilities().supports_tools(MODEL), Some(false));
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].content, "what is the latest news");
    assert_eq!(conversation.messages[1].content, "No tools needed.");

    let events = h.ui.events();
    assert!(events.contains(&UiEvent::TurnRemoved { turn_id: 1 }));
    assert!(events.contains(&UiEvent::StateChanged(
        OrchestratorState::ToolRejectedRetry {
            original_input: "what is the latest news".to_string()
        }
    )));

    // The model is never offered tools again in this session
    h.orchestrator
        .submit(&mut conversation, UserInput::text("weather today?"))
        .await;
    let requests = h.transport.streaming_requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].tools.is_some());
    assert!(requests[1].tools.is_none());
    assert!(requests[2].tools.is_none());
}

#[tokio::test]
async fn test_state_transitions_through_a_tool_round() {
    let mut h = harness(
        MockTransport::new(vec![
            MockReply::Chunks(vec![search_call_line("rust news"), done_line()]),
            answer("Rust 1.90 is out."),
        ]),
        MockSearchProvider::new(vec![Ok(vec![search_hit("Rust")])]),
    );
    let mut conversation = Conversation::new();

    h.orchestrator
        .submit(&mut conversation, UserInput::text("latest rust news"))
        .await;

    assert_eq!(
        state_changes(&h.ui.events()),
        vec![
            OrchestratorState::AwaitingFirstToken,
            OrchestratorState::Streaming,
            OrchestratorState::ToolExecuting,
            OrchestratorState::AwaitingFirstToken,
            OrchestratorState::Streaming,
            OrchestratorState::Idle,
        ]
    );
}

#[tokio::test]
async fn test_state_transitions_when_tools_are_rejected() {
    let mut h = harness(
        MockTransport::new(vec![
            MockReply::Fail(StreamError::Status {
                status: 400,
                message: "gemma:2b does not support tools".to_string(),
            }),
            answer("No tools needed."),
        ]),
        MockSearchProvider::default(),
    );
    let mut conversation = Conversation::new();

    h.orchestrator
        .submit(&mut conversation, UserInput::text("what is the latest news"))
        .await;

    assert_eq!(
        state_changes(&h.ui.events()),
        vec![
            OrchestratorState::AwaitingFirstToken,
            OrchestratorState::ToolRejectedRetry {
                original_input: "what is the latest news".to_string()
            },
            OrchestratorState::AwaitingFirstToken,
            OrchestratorState::Streaming,
            OrchestratorState::Idle,
        ]
    );
}

#[tokio::test]
async fn test_cancellation_during_tool_execution() {
    let mut h = harness(
        MockTransport::new(vec![
            MockReply::Chunks(vec![search_call_line("rust news"), done_line()]),
            answer("never requested"),
        ]),
        MockSearchProvider::default().with_delay(Duration::from_secs(30)),
    );
    let handle = h.orchestrator.handle();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });
    let mut conversation = Conversation::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        h.orchestrator
            .submit(&mut conversation, UserInput::text("latest rust news")),
    )
    .await
    .expect("cancellation interrupts the search");
    canceller.await.unwrap();

    assert_eq!(outcome, SubmitOutcome::Aborted);
    assert_eq!(h.search.queries(), vec!["rust news"]);
    assert_eq!(h.transport.streaming_requests().len(), 1);

    let events = h.ui.events();
    assert_eq!(tool_statuses(&events), vec![ToolStatus::Calling]);
    assert_eq!(last_presentation(&events).annotations, vec![Annotation::Aborted]);
    assert_eq!(state_changes(&events).last(), Some(&OrchestratorState::Idle));
    assert!(!h.orchestrator.handle().is_generating());
}

#[tokio::test]
async fn test_cancellation_during_finalization() {
    let transport = MockTransport::new(vec![answer("Use Arc.")])
        .with_completions(vec![Ok("Shared ownership".to_string())])
        .with_completion_delay(Duration::from_secs(30));
    let memory = MockMemoryStore::default();
    let finalizer = Finalizer::new(
        Arc::new(transport.clone()),
        Some(Arc::new(memory.clone())),
    );
    let mut h = harness_with(
        transport,
        MockSearchProvider::default(),
        None,
        Some(finalizer),
        config(MODEL),
    );
    let handle = h.orchestrator.handle();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });
    let mut conversation = Conversation::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        h.orchestrator.submit(
            &mut conversation,
            UserInput::text("How do I share data between threads?"),
        ),
    )
    .await
    .expect("cancellation interrupts the title request");
    canceller.await.unwrap();

    // The answer itself was complete before the cancel
    assert_eq!(
        outcome,
        SubmitOutcome::Completed {
            iterations: 1,
            exhausted: false
        }
    );
    assert_ne!(conversation.title, "Shared ownership");
    assert_eq!(conversation.messages.last().unwrap().content, "Use Arc.");
    assert!(memory.remembered().is_empty());
    assert!(!h.orchestrator.handle().is_generating());
}

#[tokio::test]
async fn test_cancellation_keeps_partial_answer() {
    let mut h = harness(
        MockTransport::new(vec![MockReply::SlowChunks(
            vec![
                content_line("Partial "),
                content_line("answer"),
                content_line(" never arrives"),
                done_line(),
            ],
            Duration::from_millis(100),
        )]),
        MockSearchProvider::default(),
    );
    let handle = h.orchestrator.handle();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.cancel();
    });
    let mut conversation = Conversation::new();

    let outcome = h
        .orchestrator
        .submit(&mut conversation, UserInput::text("Tell me a story"))
        .await;
    canceller.await.unwrap();

    assert_eq!(outcome, SubmitOutcome::Aborted);
    assert_eq!(conversation.messages.last().unwrap().content, "Partial answer");

    let presentation = last_presentation(&h.ui.events());
    assert_eq!(presentation.annotations, vec![Annotation::Aborted]);
    assert_eq!(presentation.final_panel.unwrap().text, "Partial answer");
    assert!(!h.orchestrator.handle().is_generating());
}

#[tokio::test]
async fn test_server_error_is_annotated() {
    let mut h = harness(
        MockTransport::new(vec![MockReply::Chunks(vec![
            content_line("Half"),
            "{\"error\":\"model crashed\"}\n".to_string(),
        ])]),
        MockSearchProvider::default(),
    );
    let mut conversation = Conversation::new();

    let outcome = h
        .orchestrator
        .submit(&mut conversation, UserInput::text("Explain lifetimes"))
        .await;

    assert_eq!(
        outcome,
        SubmitOutcome::Failed("Server error: model crashed".to_string())
    );
    let presentation = last_presentation(&h.ui.events());
    assert_eq!(
        presentation.annotations,
        vec![Annotation::Error("Server error: model crashed".to_string())]
    );
    assert_eq!(conversation.messages.last().unwrap().content, "Half");
}

#[tokio::test]
async fn test_submission_rejections() {
    let mut h = harness(MockTransport::new(vec![]), MockSearchProvider::default());
    let mut conversation = Conversation::new();

    assert_eq!(
        h.orchestrator
            .submit(&mut conversation, UserInput::text("  "))
            .await,
        SubmitOutcome::Rejected(RejectReason::EmptyInput)
    );

    let handle = h.orchestrator.handle();
    let guard = handle.begin().unwrap();
    assert_eq!(
        h.orchestrator
            .submit(&mut conversation, UserInput::text("hello"))
            .await,
        SubmitOutcome::Rejected(RejectReason::Busy)
    );
    drop(guard);

    h.orchestrator.set_model("");
    assert_eq!(
        h.orchestrator
            .submit(&mut conversation, UserInput::text("hello"))
            .await,
        SubmitOutcome::Rejected(RejectReason::NoModel)
    );

    assert!(conversation.messages.is_empty());
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn test_native_reasoning_is_folded_into_turn() {
    let mut h = harness(
        MockTransport::new(vec![MockReply::Chunks(vec![
            thinking_line("Consider "),
            thinking_line("options."),
            content_line("Final."),
            done_line(),
        ])]),
        MockSearchProvider::default(),
    );
    let mut conversation = Conversation::new();

    h.orchestrator
        .submit(&mut conversation, UserInput::text("Pick one"))
        .await;

    assert_eq!(
        conversation.messages[1].content,
        "<think>Consider options.</think>Final."
    );

    let events = h.ui.events();
    let completed = events.iter().any(|event| {
        matches!(event, UiEvent::TurnUpdated { effects, .. } if effects.reasoning_completed.is_some())
    });
    assert!(completed);

    let presentation = last_presentation(&events);
    let reasoning = presentation.reasoning.unwrap();
    assert_eq!(reasoning.text, "Consider options.");
    assert!(reasoning.complete);
    assert!(!reasoning.expanded);
    assert_eq!(presentation.final_panel.unwrap().text, "Final.");
}

#[tokio::test]
async fn test_empty_response_gets_placeholder() {
    let mut h = harness(
        MockTransport::new(vec![MockReply::Chunks(vec![done_line()])]),
        MockSearchProvider::default(),
    );
    let mut conversation = Conversation::new();

    h.orchestrator
        .submit(&mut conversation, UserInput::text("Say something"))
        .await;

    assert_eq!(
        conversation.messages[1].content,
        EMPTY_RESPONSE_PLACEHOLDER
    );
}

#[tokio::test]
async fn test_final_answer_is_titled_and_remembered() {
    let transport = MockTransport::new(vec![answer("<think>easy</think>Use Arc for shared ownership.")])
        .with_completions(vec![
            Ok("\"Shared ownership\"".to_string()),
            Ok("```json\n{\"content\": \"User is learning Rust\", \"category\": \"Technical\"}\n```"
                .to_string()),
        ]);
    let memory = MockMemoryStore::default();
    let finalizer = Finalizer::new(
        Arc::new(transport.clone()),
        Some(Arc::new(memory.clone())),
    );
    let mut h = harness_with(
        transport,
        MockSearchProvider::default(),
        None,
        Some(finalizer),
        config(MODEL),
    );
    let mut conversation = Conversation::new();

    h.orchestrator
        .submit(
            &mut conversation,
            UserInput::text("How do I share data between threads?"),
        )
        .await;

    assert_eq!(conversation.title, "Shared ownership");
    assert_eq!(
        memory.remembered(),
        vec![("User is learning Rust".to_string(), "Technical".to_string())]
    );

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 3);
    let title_request = &requests[1];
    assert!(!title_request.stream);
    let options = title_request.options.as_ref().unwrap();
    assert_eq!(options.temperature, Some(0.3));
    assert_eq!(options.max_output_tokens, Some(30));
    assert!(title_request.messages[0]
        .content
        .contains("Assistant: Use Arc for shared ownership."));
    assert_eq!(requests[2].options.as_ref().unwrap().temperature, Some(0.1));
}

mod agent;
mod cli;
mod logging;
mod memory;
mod persistence;
mod render;
mod settings;
mod tools;
mod ui;

#[cfg(test)]
mod tests;

use crate::agent::{
    Finalizer, GenerationHandle, OrchestratorComponents, RejectReason, SubmitOutcome, TurnConfig,
    TurnOrchestrator, UserInput,
};
use crate::cli::Args;
use crate::logging::{setup_logging, setup_logging_for_terminal_ui};
use crate::memory::{MemoryStore, RagClient, RetrievalContext};
use crate::persistence::{format_file_size, Attachment, Conversation, FileChatStore};
use crate::settings::{get_settings, SearchBackend, Settings};
use crate::tools::ToolRuntime;
use crate::ui::terminal::TerminalUI;
use crate::ui::transcript::write_transcript;
use anyhow::{Context, Result};
use llm::{ChatTransport, OllamaClient};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};
use web::{DuckDuckGoClient, SearchProvider, SearchServiceClient};

/// Settings with command line overrides applied
fn effective_settings(args: &Args) -> Settings {
    let mut settings = get_settings().clone();
    if let Some(endpoint) = &args.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if let Some(system) = &args.system {
        settings.system_prompt = system.clone();
    }
    if let Some(backend) = args.search_backend {
        settings.search_backend = backend;
    }
    if args.no_tools {
        settings.web_search_enabled = false;
    }
    if args.no_rag {
        settings.rag_enabled = false;
    }
    settings
}

async fn resolve_model(args: &Args, settings: &Settings, client: &OllamaClient) -> Result<String> {
    if let Some(model) = args.model.clone().or_else(|| settings.default_model.clone()) {
        return Ok(model);
    }
    let models = client
        .list_models()
        .await
        .context("Failed to list models; pass --model explicitly")?;
    models
        .into_iter()
        .next()
        .map(|model| model.name)
        .ok_or_else(|| anyhow::anyhow!("No chat models installed on {}", client.base_url()))
}

fn build_orchestrator(
    settings: &Settings,
    model: String,
    client: Arc<OllamaClient>,
    ui: Arc<TerminalUI>,
) -> TurnOrchestrator {
    let transport: Arc<dyn ChatTransport> = client;
    let search: Arc<dyn SearchProvider> = match settings.search_backend {
        SearchBackend::Service => Arc::new(SearchServiceClient::new(settings.companion_url.clone())),
        SearchBackend::DuckDuckGo => Arc::new(DuckDuckGoClient::new()),
    };

    let rag = settings.rag_enabled.then(|| {
        Arc::new(RagClient::new(
            settings.companion_url.clone(),
            settings.rag_limit,
            settings.rag_threshold,
        ))
    });
    let retrieval = rag.clone().map(|rag| rag as Arc<dyn RetrievalContext>);
    let memory = rag.map(|rag| rag as Arc<dyn MemoryStore>);

    TurnOrchestrator::new(
        OrchestratorComponents {
            transport: transport.clone(),
            tools: Arc::new(ToolRuntime::with_web_search(search)),
            ui,
            retrieval,
            finalizer: Some(Finalizer::new(transport, memory)),
        },
        TurnConfig {
            model,
            system_prompt: settings.system_prompt.clone(),
            options: settings.generation_options(),
            tools_enabled: settings.web_search_enabled,
        },
    )
}

/// Forwards Ctrl-C to the running submission
fn spawn_interrupt_handler(handle: GenerationHandle) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling generation");
            handle.cancel();
        }
    });
}

fn load_attachments(args: &Args) -> Result<Vec<Attachment>> {
    args.attachments
        .iter()
        .map(|path| Attachment::from_path(path))
        .collect()
}

async fn submit(
    orchestrator: &mut TurnOrchestrator,
    conversation: &mut Conversation,
    store: &FileChatStore,
    ui: &TerminalUI,
    input: UserInput,
) -> SubmitOutcome {
    ui.record_user(&input.text);
    let outcome = orchestrator.submit(conversation, input).await;
    match &outcome {
        SubmitOutcome::Rejected(RejectReason::Busy) => eprintln!("A response is still being generated"),
        SubmitOutcome::Rejected(RejectReason::NoModel) => eprintln!("No model selected"),
        SubmitOutcome::Rejected(RejectReason::EmptyInput) => {}
        _ => {
            if let Err(e) = store.save(conversation) {
                warn!("Failed to save chat {}: {e:#}", conversation.id);
            }
        }
    }
    outcome
}

async fn run_interactive(
    orchestrator: &mut TurnOrchestrator,
    conversation: &mut Conversation,
    store: &FileChatStore,
    ui: &TerminalUI,
    mut attachments: Vec<Attachment>,
) -> Result<()> {
    println!(
        "Chatting with {} ({}). Ctrl-C stops a response, Ctrl-D exits.",
        orchestrator.config().model,
        conversation.title
    );
    for attachment in &attachments {
        println!("Attached {} ({})", attachment.name, format_file_size(attachment.size));
    }

    while let Some(line) = ui.read_line()? {
        if line == "/exit" || line == "/quit" {
            break;
        }
        if line.is_empty() && attachments.is_empty() {
            continue;
        }
        let input = UserInput::text(line).with_attachments(std::mem::take(&mut attachments));
        submit(orchestrator, conversation, store, ui, input).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if args.is_interactive() {
        setup_logging_for_terminal_ui(args.verbose);
    } else {
        setup_logging(args.verbose, false);
    }

    let settings = effective_settings(&args);
    let client = Arc::new(OllamaClient::new(settings.endpoint.clone()));
    let store = FileChatStore::default_location()?;

    if args.list_models {
        for model in client.list_models().await? {
            match model.size {
                Some(size) => println!("{}  {}", model.name, format_file_size(size)),
                None => println!("{}", model.name),
            }
        }
        return Ok(());
    }

    if args.list_chats {
        for chat in store.list()? {
            println!(
                "{}  {}  ({} messages, updated {})",
                chat.id,
                chat.title,
                chat.message_count,
                chat.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
        return Ok(());
    }

    let model = resolve_model(&args, &settings, &client).await?;
    let mut conversation = match &args.chat_id {
        Some(id) => store.load(id)?,
        None => Conversation::new(),
    };
    let attachments = load_attachments(&args)?;

    let ui = Arc::new(if args.is_interactive() {
        TerminalUI::new()?
    } else {
        TerminalUI::with_writer(Box::new(io::stdout()))
    });
    let mut orchestrator = build_orchestrator(&settings, model, client, ui.clone());
    spawn_interrupt_handler(orchestrator.handle());

    let result = match args.task.clone() {
        Some(task) => {
            let input = UserInput::text(task).with_attachments(attachments);
            match submit(&mut orchestrator, &mut conversation, &store, &ui, input).await {
                SubmitOutcome::Failed(message) => Err(anyhow::anyhow!(message)),
                SubmitOutcome::Rejected(reason) => {
                    Err(anyhow::anyhow!("Submission rejected: {reason:?}"))
                }
                _ => Ok(()),
            }
        }
        None => run_interactive(&mut orchestrator, &mut conversation, &store, &ui, attachments).await,
    };

    if let Some(path) = &args.html {
        write_transcript(path, &conversation.title, &ui.transcript())?;
        println!("Transcript written to {}", path.display());
    }

    result
}

use crate::settings::SearchBackend;
use clap::Parser;
use std::path::PathBuf;

/// Define the application arguments
#[derive(Parser, Debug)]
#[command(version, about = "Terminal chat client for a local Ollama server", long_about = None)]
pub struct Args {
    /// Model to chat with (defaults to the configured or first installed model)
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Base URL of the model server
    #[arg(long)]
    pub endpoint: Option<String>,

    /// System prompt to prepend to every request
    #[arg(long)]
    pub system: Option<String>,

    /// Send a single message and exit instead of starting the interactive prompt
    #[arg(short, long)]
    pub task: Option<String>,

    /// Attach a file to the first message (repeatable)
    #[arg(long = "attach", value_name = "FILE")]
    pub attachments: Vec<PathBuf>,

    /// Continue a stored chat
    #[arg(long)]
    pub chat_id: Option<String>,

    /// List stored chats and exit
    #[arg(long)]
    pub list_chats: bool,

    /// List installed chat models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Never offer tools to the model
    #[arg(long)]
    pub no_tools: bool,

    /// Skip retrieval memory lookups and memory extraction
    #[arg(long)]
    pub no_rag: bool,

    /// Search backend used by the web_search tool
    #[arg(long)]
    pub search_backend: Option<SearchBackend>,

    /// Write the rendered transcript to an HTML file on exit
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn parse() -> Self {
        <Args as Parser>::parse()
    }

    /// Whether the interactive prompt should run
    pub fn is_interactive(&self) -> bool {
        self.task.is_none() && !self.list_chats && !self.list_models
    }
}

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use llm::{MessageRole, WireMessage, WireToolCall};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PROVISIONAL_TITLE_CHARS: usize = 20;
const DEFAULT_TITLE: &str = "New chat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AttachmentKind {
    Image { base64: String },
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub size: u64,
    #[serde(flatten)]
    pub kind: AttachmentKind,
}

impl Attachment {
    /// Reads a file and classifies it by extension and content
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let kind = match extension.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => AttachmentKind::Image {
                base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            },
            "mp3" | "wav" | "ogg" | "m4a" | "flac" | "webm" => AttachmentKind::Audio,
            _ => AttachmentKind::Document {
                text: String::from_utf8(bytes.clone()).ok(),
            },
        };

        Ok(Self {
            name,
            size: bytes.len() as u64,
            kind,
        })
    }
}

pub fn format_file_size(size: u64) -> String {
    const KB: f64 = 1024.0;
    let size_f = size as f64;
    if size_f < KB {
        format!("{size} B")
    } else if size_f < KB * KB {
        format!("{:.1} KB", size_f / KB)
    } else {
        format!("{:.1} MB", size_f / (KB * KB))
    }
}

/// A stored conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    /// Tool name for `tool` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            attachments,
            tool_calls: Vec::new(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            ..Self::user(content, Vec::new())
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: &[llm::ToolCall]) -> Self {
        Self {
            tool_calls: calls.iter().map(WireToolCall::from).collect(),
            ..Self::assistant(content)
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            name: Some(name.into()),
            ..Self::user(content, Vec::new())
        }
    }

    /// Text content with document and audio attachments folded in
    pub fn content_with_attachments(&self) -> String {
        let mut content = self.content.clone();

        let mut documents_with_text = Vec::new();
        let mut documents_without_text = Vec::new();
        let mut audio = Vec::new();
        for attachment in &self.attachments {
            match &attachment.kind {
                AttachmentKind::Document { text: Some(text) } => {
                    documents_with_text.push(format!("[{}]\n{}", attachment.name, text))
                }
                AttachmentKind::Document { text: None } => documents_without_text.push(format!(
                    "{} ({})",
                    attachment.name,
                    format_file_size(attachment.size)
                )),
                AttachmentKind::Audio => audio.push(attachment.name.clone()),
                AttachmentKind::Image { .. } => {}
            }
        }

        if !documents_with_text.is_empty() {
            content.push_str(&format!(
                "\n\n[Document content]\n{}\n[End of document content]",
                documents_with_text.join("\n\n")
            ));
        }
        if !documents_without_text.is_empty() {
            content.push_str(&format!(
                "\n\n[Document attachments]\n{}",
                documents_without_text.join("\n")
            ));
        }
        if !audio.is_empty() {
            content.push_str(&format!("\n\n[Audio attachments]\n{}", audio.join(", ")));
        }
        content.trim().to_string()
    }

    pub fn images(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter_map(|attachment| match &attachment.kind {
                AttachmentKind::Image { base64 } if !base64.is_empty() => Some(base64.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            role: self.role,
            content: self.content_with_attachments(),
            images: None,
            tool_calls: (!self.tool_calls.is_empty()).then(|| self.tool_calls.clone()),
            name: self.name.clone(),
        }
        .with_images(self.images())
    }
}

/// A complete conversation with its history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis().to_string(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            model: None,
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Appends the user message, titling the conversation after its first one
    pub fn push_user(&mut self, text: &str, attachments: Vec<Attachment>) {
        if self.messages.is_empty() {
            let seed = if !text.is_empty() {
                text.to_string()
            } else {
                attachments
                    .first()
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| DEFAULT_TITLE.to_string())
            };
            self.title = provisional_title(&seed);
        }
        self.push(ChatMessage::user(text, attachments));
    }

    /// Drops every message after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
        self.updated_at = Utc::now();
    }

    pub fn wire_messages(&self) -> Vec<WireMessage> {
        self.messages.iter().map(ChatMessage::to_wire).collect()
    }
}

fn provisional_title(seed: &str) -> String {
    let mut title: String = seed.chars().take(PROVISIONAL_TITLE_CHARS).collect();
    if seed.chars().count() > PROVISIONAL_TITLE_CHARS {
        title.push_str("...");
    }
    title
}

/// Listing entry for a stored conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMetadata {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Stores one JSON file per conversation
pub struct FileChatStore {
    root_dir: PathBuf,
}

impl FileChatStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// `<config dir>/ollama-studio/chats`
    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        let root_dir = config_dir.join("ollama-studio").join("chats");
        info!("Storing chats in: {}", root_dir.display());
        Ok(Self::new(root_dir))
    }

    fn ensure_root(&self) -> Result<&Path> {
        if !self.root_dir.exists() {
            std::fs::create_dir_all(&self.root_dir)?;
        }
        Ok(&self.root_dir)
    }

    fn chat_file_path(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(anyhow::anyhow!("Invalid chat id: {id}"));
        }
        Ok(self.ensure_root()?.join(format!("{id}.json")))
    }

    pub fn save(&self, conversation: &Conversation) -> Result<()> {
        let path = self.chat_file_path(&conversation.id)?;
        debug!("Saving chat to {}", path.display());
        let json = serde_json::to_string_pretty(conversation)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Conversation> {
        let path = self.chat_file_path(id)?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Chat {id} not found"))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// All stored chats, most recently updated first
    pub fn list(&self) -> Result<Vec<ChatMetadata>> {
        let mut chats = Vec::new();
        for entry in std::fs::read_dir(self.ensure_root()?)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|content| Ok(serde_json::from_str::<Conversation>(&content)?));
            match parsed {
                Ok(chat) => chats.push(ChatMetadata {
                    id: chat.id,
                    title: chat.title,
                    updated_at: chat.updated_at,
                    message_count: chat.messages.len(),
                }),
                Err(e) => warn!("Skipping unreadable chat {}: {}", path.display(), e),
            }
        }
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }
}

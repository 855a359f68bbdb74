use crate::memory::MemoryStore;
use crate::persistence::Conversation;
use llm::{ChatRequest, ChatTransport, GenerationOptions, WireMessage};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Conversations with at most this many stored messages get a generated title
const AUTO_TITLE_MAX_MESSAGES: usize = 3;
const TITLE_EXCERPT_CHARS: usize = 300;

static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid reasoning block pattern"));

#[derive(Debug, Deserialize)]
struct ExtractedMemory {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Follow-up work after a final answer: naming the chat and remembering facts
pub struct Finalizer {
    transport: Arc<dyn ChatTransport>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl Finalizer {
    pub fn new(transport: Arc<dyn ChatTransport>, memory: Option<Arc<dyn MemoryStore>>) -> Self {
        Self { transport, memory }
    }

    pub async fn finalize(
        &self,
        conversation: &mut Conversation,
        model: &str,
        user_text: &str,
        answer: &str,
    ) {
        if conversation.messages.len() <= AUTO_TITLE_MAX_MESSAGES {
            match self.generate_title(model, user_text, answer).await {
                Ok(Some(title)) => {
                    debug!("Generated chat title: {title}");
                    conversation.title = title;
                }
                Ok(None) => {}
                Err(e) => warn!("Auto-title generation failed: {e:#}"),
            }
        }

        if let Some(memory) = &self.memory {
            if let Err(e) = self.extract_memory(memory.as_ref(), model, user_text, answer).await {
                warn!("Memory extraction failed: {e:#}");
            }
        }
    }

    pub async fn generate_title(
        &self,
        model: &str,
        user_text: &str,
        answer: &str,
    ) -> anyhow::Result<Option<String>> {
        let answer = strip_reasoning(answer);
        let prompt = format!(
            "Write a short, concise title (at most 8 words) for the conversation below.\n\
             Do not use quotes and do not prefix it with \"Title\"; output only the title.\n\
             Conversation:\n\
             User: {}\n\
             Assistant: {}",
            excerpt(user_text),
            excerpt(&answer)
        );

        let request = ChatRequest::single(model, vec![WireMessage::user(prompt)]).with_options(
            GenerationOptions {
                temperature: Some(0.3),
                max_output_tokens: Some(30),
                ..Default::default()
            },
        );
        let response = self.transport.complete(&request).await?;
        Ok(response.text().and_then(clean_title))
    }

    async fn extract_memory(
        &self,
        memory: &dyn MemoryStore,
        model: &str,
        user_text: &str,
        answer: &str,
    ) -> anyhow::Result<()> {
        let prompt = format!(
            "\nAnalyze the following conversation and extract ONE key fact, user preference, or technical detail that is worth remembering for future context.\n\
             If nothing is worth remembering (e.g., casual greeting, simple question), return \"NULL\".\n\
             Also categorize the memory into one of: \"User Preference\", \"Technical\", \"General\", \"Project\".\n\n\
             Format the output as JSON: {{\"content\": \"...\", \"category\": \"...\"}}\n\n\
             Conversation:\n\
             User: {user_text}\n\
             Assistant: {answer}\n"
        );

        let request = ChatRequest::single(model, vec![WireMessage::user(prompt)]).with_options(
            GenerationOptions {
                temperature: Some(0.1),
                ..Default::default()
            },
        );
        let response = self.transport.complete(&request).await?;
        let Some((content, category)) = response.text().and_then(parse_extracted_memory) else {
            return Ok(());
        };

        memory.remember(&content, &category).await?;
        debug!("Memory saved ({category}): {content}");
        Ok(())
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(TITLE_EXCERPT_CHARS).collect()
}

fn strip_reasoning(text: &str) -> String {
    REASONING_BLOCK.replace_all(text, "").trim().to_string()
}

fn is_title_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '《' | '》')
}

/// Removes reasoning and one surrounding quote on either side
fn clean_title(raw: &str) -> Option<String> {
    let title = strip_reasoning(raw);
    let title = title.strip_prefix(is_title_quote).unwrap_or(&title);
    let title = title.strip_suffix(is_title_quote).unwrap_or(title);
    if title.trim().is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Parses the model's `{"content","category"}` answer; `NULL` means nothing to keep
fn parse_extracted_memory(raw: &str) -> Option<(String, String)> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.contains("NULL") {
        return None;
    }

    let extracted: ExtractedMemory = match serde_json::from_str(cleaned) {
        Ok(extracted) => extracted,
        Err(e) => {
            warn!("Failed to parse memory extraction: {e}");
            return None;
        }
    };
    let content = extracted.content.filter(|c| !c.is_empty() && c != "NULL")?;
    let category = extracted
        .category
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "General".to_string());
    Some((content, category))
}

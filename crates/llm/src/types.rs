use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message as it is sent to the model server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: MessageRole,
    pub content: String,
    /// Base64 payloads of attached images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    /// Name of the tool that produced a `tool` message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl WireMessage {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
            tool_calls: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    /// An assistant message announcing the tool calls it made
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: &[ToolCall]) -> Self {
        Self {
            tool_calls: Some(calls.iter().map(WireToolCall::from).collect()),
            ..Self::plain(MessageRole::Assistant, content)
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::plain(MessageRole::Tool, content)
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        if !images.is_empty() {
            self.images = Some(images);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Arguments of a tool call, kept in the form the model produced them
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    /// Textual (usually JSON-encoded) arguments
    Raw(String),
    Structured(Map<String, Value>),
}

impl ToolArguments {
    /// Canonical text used to recognise repeated calls.
    ///
    /// Mappings, and raw text that parses as one, serialize as compact JSON with
    /// sorted keys. Any other raw text is used verbatim.
    pub fn signature_text(&self) -> String {
        match self {
            ToolArguments::Structured(map) => canonical_json(map),
            ToolArguments::Raw(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => canonical_json(&map),
                _ => text.clone(),
            },
        }
    }
}

fn canonical_json(map: &Map<String, Value>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

impl From<Value> for ToolArguments {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => ToolArguments::Raw(text),
            Value::Object(map) => ToolArguments::Structured(map),
            Value::Null => ToolArguments::Structured(Map::new()),
            other => ToolArguments::Raw(other.to_string()),
        }
    }
}

impl From<&ToolArguments> for Value {
    fn from(arguments: &ToolArguments) -> Self {
        match arguments {
            ToolArguments::Raw(text) => Value::String(text.clone()),
            ToolArguments::Structured(map) => Value::Object(map.clone()),
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Identity of the call for duplicate suppression
    pub fn signature(&self) -> String {
        format!("{}:{}", self.name, self.arguments.signature_text())
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        Self {
            name: call.function.name,
            arguments: call.function.arguments.into(),
        }
    }
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: None,
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: Value::from(&call.arguments),
            },
        }
    }
}

/// Sampling options, serialized with the server's option names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(rename = "num_ctx", skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(rename = "num_predict", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    /// Omitted entirely when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Function declaration offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDeclaration {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDeclaration>>,
}

impl ChatRequest {
    pub fn streaming(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            options: None,
            tools: None,
        }
    }

    pub fn single(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            stream: false,
            ..Self::streaming(model, messages)
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Attaches tool declarations; an empty list leaves the request tool-free
    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }
}

/// Message part of a response record
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// One record of a streamed response, or the whole body of a non-streaming one
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    /// Completion-style servers answer with a bare `response` field
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatResponse {
    /// Text of the reply, from `message.content` or else `response`
    pub fn text(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .or(self.response.as_deref())
    }
}

/// Events decoded from a streaming response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ContentDelta(String),
    /// Reasoning reported in a separate field rather than inline
    ReasoningDelta(String),
    ToolCallDelta(Vec<ToolCall>),
    Done,
}

/// An installed model as listed by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl ModelInfo {
    /// Embedding models cannot chat and are hidden from selection
    pub fn is_chat_model(&self) -> bool {
        let name = self.name.to_lowercase();
        !name.contains("embed") && !name.contains("bert")
    }
}

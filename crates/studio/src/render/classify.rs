use regex::Regex;
use std::sync::LazyLock;

static REASONING_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<think>|&lt;think&gt;|<thinking>|&lt;thinking&gt;|\[THINKING\]")
        .expect("valid reasoning start pattern")
});

static REASONING_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</think>|&lt;/think&gt;|</thinking>|&lt;/thinking&gt;|\[/THINKING\]")
        .expect("valid reasoning end pattern")
});

/// Accumulated text split into its reasoning and answer parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedContent {
    pub reasoning_text: Option<String>,
    pub final_text: String,
    /// An opener was seen but its closer has not arrived yet
    pub reasoning_open: bool,
}

/// Splits `text` on the first reasoning delimiter pair.
///
/// The closer is only searched after the opener, and the whole text is
/// re-examined on every call so a delimiter split across deliveries is found
/// once it is complete.
pub fn classify(text: &str) -> ClassifiedContent {
    let Some(start) = REASONING_START.find(text) else {
        return ClassifiedContent {
            reasoning_text: None,
            final_text: text.trim().to_string(),
            reasoning_open: false,
        };
    };

    let prefix = &text[..start.start()];
    let remaining = &text[start.end()..];

    match REASONING_END.find(remaining) {
        None => ClassifiedContent {
            reasoning_text: Some(remaining.trim().to_string()),
            final_text: prefix.trim().to_string(),
            reasoning_open: true,
        },
        Some(end) => {
            let reasoning = &remaining[..end.start()];
            let suffix = &remaining[end.end()..];
            ClassifiedContent {
                reasoning_text: Some(reasoning.trim().to_string()),
                final_text: format!("{prefix}{suffix}").trim().to_string(),
                reasoning_open: false,
            }
        }
    }
}

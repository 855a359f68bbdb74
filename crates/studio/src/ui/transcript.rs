//! Standalone HTML rendering of a chat session

use crate::render::inline::escape_html;
use crate::render::Presentation;
use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    User(String),
    Assistant {
        turn_id: u64,
        presentation: Presentation,
    },
}

const STYLE: &str = r#"body{font-family:system-ui,sans-serif;max-width:860px;margin:2rem auto;padding:0 1rem;line-height:1.5}
.message{margin:1rem 0;padding:.75rem 1rem;border-radius:8px}
.message-user{background:#eef3ff;white-space:pre-wrap}
.message-assistant{background:#f7f7f7}
details.reasoning{color:#666;font-size:.9em;margin-bottom:.5rem}
.code-block{background:#1e1e1e;color:#ddd;border-radius:6px;margin:.5rem 0}
.code-block-header{display:flex;justify-content:space-between;padding:.25rem .5rem;font-size:.8em}
.code-block pre{margin:0;padding:.5rem;overflow-x:auto}
.copy-btn{display:none}
.annotation{font-size:.85em;font-style:italic}
.annotation.warning,.annotation.error{color:#c60}
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.25rem .5rem}
.inline-image{max-width:100%}"#;

pub fn render_transcript(title: &str, entries: &[TranscriptEntry]) -> String {
    let mut body = String::new();
    for entry in entries {
        match entry {
            TranscriptEntry::User(text) => body.push_str(&format!(
                "<div class=\"message message-user\">{}</div>\n",
                escape_html(text)
            )),
            TranscriptEntry::Assistant { presentation, .. } => body.push_str(&format!(
                "<div class=\"message message-assistant\">{}</div>\n",
                presentation.to_html()
            )),
        }
    }

    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
    )
}

pub fn write_transcript(path: &Path, title: &str, entries: &[TranscriptEntry]) -> Result<()> {
    std::fs::write(path, render_transcript(title, entries))
        .with_context(|| format!("Failed to write transcript to {}", path.display()))
}

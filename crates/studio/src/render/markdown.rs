//! Fence-aware markdown rendering
//!
//! Complete fenced code blocks are cut out in a first pass so the block parser
//! never has to reason about fences. While streaming, a fence that has been
//! opened but not closed yet is rendered as an in-progress code block.

use super::blocks::render_blocks;
use super::inline::escape_html;
use regex::Regex;
use std::sync::LazyLock;

const FENCE_MARKER: &str = "```";

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([\w-]+)?\n(.*?)```").expect("valid fence pattern"));

pub fn render_markdown(text: &str, streaming: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut html = String::new();
    let mut last_index = 0;
    for caps in FENCE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        html.push_str(&render_blocks(&text[last_index..whole.start()]));
        html.push_str(&render_code_block(
            caps.get(1).map_or("", |m| m.as_str()),
            caps.get(2).map_or("", |m| m.as_str()),
        ));
        last_index = whole.end();
    }

    let remaining = &text[last_index..];
    if streaming {
        if let Some(fence_start) = remaining.rfind(FENCE_MARKER) {
            html.push_str(&render_blocks(&remaining[..fence_start]));
            let fence_text = &remaining[fence_start + FENCE_MARKER.len()..];
            let (lang, code) = match fence_text.find('\n') {
                Some(newline) => (fence_text[..newline].trim(), &fence_text[newline + 1..]),
                None => (fence_text.trim(), ""),
            };
            html.push_str(&render_code_block(lang, code));
            return html;
        }
    }

    html.push_str(&render_blocks(remaining));
    html
}

/// Isolated code block with a language label and a copy affordance
pub fn render_code_block(lang: &str, code: &str) -> String {
    let lang = lang.to_lowercase();
    let auto = lang.is_empty() || lang == "plaintext";
    let (label, class) = if auto {
        ("auto".to_string(), String::new())
    } else {
        (escape_html(&lang), format!(r#" class="language-{}""#, escape_html(&lang)))
    };
    format!(
        concat!(
            r#"<div class="code-block">"#,
            r#"<div class="code-block-header"><span class="code-lang">{label}</span>"#,
            r#"<button class="copy-btn" type="button" data-action="copy">Copy</button></div>"#,
            r#"<pre><code{class}>{code}</code></pre></div>"#
        ),
        label = label,
        class = class,
        code = escape_html(code)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_fence_is_extracted() {
        let html = render_markdown("Intro\n```rust\nfn main() {}\n```\nOutro", false);
        assert_eq!(
            html,
            format!(
                "<p>Intro</p>{}<p>Outro</p>",
                render_code_block("rust", "fn main() {}\n")
            )
        );
        assert!(html.contains(r#"<code class="language-rust">fn main() {}"#));
    }

    #[test]
    fn test_unterminated_fence_while_streaming() {
        let text = "text ```python\ncode";
        let html = render_markdown(text, true);
        assert_eq!(
            html,
            format!("<p>text </p>{}", render_code_block("python", "code"))
        );
        assert!(!html.contains("```"));
    }

    #[test]
    fn test_unterminated_fence_after_streaming_is_plain_text() {
        let html = render_markdown("text ```python\ncode", false);
        assert!(!html.contains("code-block"));
        assert!(html.starts_with("<p>"));
    }

    #[test]
    fn test_fence_closing_in_later_update() {
        let streaming = render_markdown("```python\nprint(1)", true);
        assert_eq!(streaming, render_code_block("python", "print(1)"));

        let closed = render_markdown("```python\nprint(1)\n```", false);
        assert_eq!(closed, render_code_block("python", "print(1)\n"));
    }

    #[test]
    fn test_language_label() {
        assert!(render_code_block("", "x").contains(r#"<span class="code-lang">auto</span>"#));
        assert!(render_code_block("PlainText", "x").contains("<pre><code>x</code></pre>"));
        assert!(render_code_block("TypeScript", "x").contains("language-typescript"));
    }

    #[test]
    fn test_code_is_escaped() {
        let html = render_markdown("```html\n<b>&</b>\n```", false);
        assert!(html.contains("&lt;b&gt;&amp;&lt;/b&gt;"));
    }

    #[test]
    fn test_rendering_is_idempotent() {
        let text = "# T\n\n| a | b |\n|:-|-:|\n| 1 | 2 |\n\n```js\nlet x;\n```\n- item **x**\n> quote\n```py\nopen";
        assert_eq!(render_markdown(text, true), render_markdown(text, true));
        assert_eq!(render_markdown(text, false), render_markdown(text, false));
    }
}

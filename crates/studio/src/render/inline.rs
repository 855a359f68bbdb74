use regex::Regex;
use std::sync::LazyLock;

struct InlineRule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> InlineRule {
    InlineRule {
        pattern: Regex::new(pattern).expect("valid inline pattern"),
        replacement,
    }
}

// Applied in order against escaped text. Later rules also see the output of
// earlier ones, so markers inside a code span are still transformed.
static INLINE_RULES: LazyLock<Vec<InlineRule>> = LazyLock::new(|| {
    vec![
        rule(r"`([^`]+)`", "<code>$1</code>"),
        rule(r"\*\*([^*]+)\*\*", "<strong>$1</strong>"),
        rule(r"__([^_]+)__", "<strong>$1</strong>"),
        rule(r"\*([^*]+)\*", "<em>$1</em>"),
        rule(r"_([^_]+)_", "<em>$1</em>"),
        rule(
            r"!\[([^\]]*)\]\(([^)]+)\)",
            r#"<img src="$2" alt="$1" class="inline-image" />"#,
        ),
        rule(
            r"\[([^\]]+)\]\((https?://[^\s)]+)\)",
            r#"<a href="$2" target="_blank" rel="noopener noreferrer">$1</a>"#,
        ),
    ]
});

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escapes `text` and applies code, emphasis, image and link markup
pub fn render_inline(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    INLINE_RULES
        .iter()
        .fold(escape_html(text), |acc, rule| {
            rule.pattern.replace_all(&acc, rule.replacement).into_owned()
        })
}

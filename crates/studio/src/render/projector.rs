use super::classify::classify;
use super::inline::escape_html;
use super::markdown::render_markdown;
use std::time::{Duration, Instant};

/// Panel that currently shows the typing cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingTarget {
    Reasoning,
    Final,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningPanel {
    pub html: String,
    pub text: String,
    pub expanded: bool,
    /// Reasoning is still open and the turn is streaming
    pub active: bool,
    pub complete: bool,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FinalPanel {
    pub html: String,
    pub text: String,
}

/// Inert notes appended below the final panel
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Aborted,
    Warning(String),
    Error(String),
}

impl Annotation {
    pub fn label(&self) -> String {
        match self {
            Annotation::Aborted => "[aborted]".to_string(),
            Annotation::Warning(message) => format!("[warning: {message}]"),
            Annotation::Error(message) => format!("[Error: {message}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Presentation {
    pub reasoning: Option<ReasoningPanel>,
    pub final_panel: Option<FinalPanel>,
    pub typing: Option<TypingTarget>,
    pub annotations: Vec<Annotation>,
}

impl Presentation {
    /// Standalone markup of both panels and their annotations
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        if let Some(reasoning) = &self.reasoning {
            let summary = match reasoning.elapsed {
                Some(elapsed) => format!("Reasoning ({:.1}s)", elapsed.as_secs_f64()),
                None => "Reasoning".to_string(),
            };
            let open = if reasoning.expanded { " open" } else { "" };
            html.push_str(&format!(
                r#"<details class="reasoning"{open}><summary>{summary}</summary><div class="reasoning-content">{}</div></details>"#,
                reasoning.html
            ));
        }
        if let Some(final_panel) = &self.final_panel {
            html.push_str(&format!(
                r#"<div class="final-content">{}</div>"#,
                final_panel.html
            ));
        }
        for annotation in &self.annotations {
            let class = match annotation {
                Annotation::Aborted => "aborted",
                Annotation::Warning(_) => "warning",
                Annotation::Error(_) => "error",
            };
            html.push_str(&format!(
                r#"<div class="annotation {class}">{}</div>"#,
                escape_html(&annotation.label())
            ));
        }
        html
    }
}

/// One-shot transitions observed by a single projection
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectionEffects {
    pub reasoning_created: bool,
    /// Reasoning just finished; the panel collapses once
    pub reasoning_completed: Option<Duration>,
    pub reasoning_removed: bool,
}

/// Keeps the two presentation panels of a turn in sync with its text.
///
/// Panels are recomputed from the full text on each call. Only the reasoning
/// lifecycle (creation time, completion, collapse) carries over between calls.
#[derive(Debug, Default)]
pub struct ContentProjector {
    presentation: Presentation,
    reasoning_started: Option<Instant>,
}

impl ContentProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.presentation.annotations.push(annotation);
    }

    pub fn project(&mut self, text: &str, streaming: bool) -> ProjectionEffects {
        let classified = classify(text);
        let mut effects = ProjectionEffects::default();

        let reasoning_text = classified
            .reasoning_text
            .filter(|reasoning| !reasoning.trim().is_empty());
        let has_reasoning = reasoning_text.is_some();

        match reasoning_text {
            Some(reasoning) => {
                let started = *self.reasoning_started.get_or_insert_with(Instant::now);
                let panel = self.presentation.reasoning.get_or_insert_with(|| {
                    effects.reasoning_created = true;
                    ReasoningPanel {
                        html: String::new(),
                        text: String::new(),
                        expanded: true,
                        active: false,
                        complete: false,
                        elapsed: None,
                    }
                });
                panel.html = render_markdown(&reasoning, streaming);
                panel.text = reasoning;
                panel.active = classified.reasoning_open && streaming;

                if !classified.reasoning_open && !panel.complete {
                    let elapsed = started.elapsed();
                    panel.complete = true;
                    panel.elapsed = Some(elapsed);
                    panel.expanded = false;
                    effects.reasoning_completed = Some(elapsed);
                }
            }
            None => {
                if self.presentation.reasoning.take().is_some() {
                    effects.reasoning_removed = true;
                }
                self.reasoning_started = None;
            }
        }

        let final_panel = self
            .presentation
            .final_panel
            .get_or_insert_with(FinalPanel::default);
        final_panel.html = render_markdown(&classified.final_text, streaming);
        final_panel.text = classified.final_text;

        self.presentation.typing = match (streaming, has_reasoning && classified.reasoning_open) {
            (false, _) => None,
            (true, true) => Some(TypingTarget::Reasoning),
            (true, false) => Some(TypingTarget::Final),
        };

        effects
    }
}

use super::transcript::TranscriptEntry;
use super::{NoticeLevel, ToolStatus, UIError, UiEvent, UserInterface};
use crate::render::{Presentation, ProjectionEffects};
use async_trait::async_trait;
use crossterm::style::{self, Color, Stylize};
use rustyline::{error::ReadlineError, history::DefaultHistory, Config, Editor};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

/// What has already been written for the turn being streamed
#[derive(Default)]
struct TurnProgress {
    turn_id: u64,
    reasoning: String,
    final_text: String,
    annotations: usize,
    line_open: bool,
}

#[derive(Default)]
struct DisplayState {
    progress: TurnProgress,
    transcript: Vec<TranscriptEntry>,
}

/// Line-oriented terminal front end that prints streamed text incrementally
pub struct TerminalUI {
    line_editor: Option<Mutex<Editor<(), DefaultHistory>>>,
    writer: Mutex<Box<dyn Write + Send>>,
    state: Mutex<DisplayState>,
}

impl TerminalUI {
    pub fn new() -> Result<Self, UIError> {
        let config = Config::builder()
            .edit_mode(rustyline::EditMode::Emacs)
            .build();
        let editor = Editor::with_config(config)
            .map_err(|e| UIError::IOError(io::Error::other(e.to_string())))?;

        Ok(Self {
            line_editor: Some(Mutex::new(editor)),
            writer: Mutex::new(Box::new(io::stdout())),
            state: Mutex::new(DisplayState::default()),
        })
    }

    /// Output only, for one-shot runs and tests
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            line_editor: None,
            writer: Mutex::new(writer),
            state: Mutex::new(DisplayState::default()),
        }
    }

    /// Reads one line of input; `None` on Ctrl-D or Ctrl-C at the prompt
    pub fn read_line(&self) -> Result<Option<String>, UIError> {
        let editor = self.line_editor.as_ref().ok_or(UIError::InputNotSupported)?;
        let mut editor = lock(editor);

        let colored_prompt = format!("{}{} ", ">".with(Color::Green), style::ResetColor);
        match editor.readline(&colored_prompt) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                Ok(Some(line.trim().to_string()))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(UIError::IOError(io::Error::other(e.to_string()))),
        }
    }

    /// Adds the user's message to the transcript
    pub fn record_user(&self, text: &str) {
        lock(&self.state)
            .transcript
            .push(TranscriptEntry::User(text.to_string()));
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        lock(&self.state).transcript.clone()
    }

    fn write(&self, text: &str) -> Result<(), UIError> {
        let mut writer = lock(&self.writer);
        write!(writer, "{text}")?;
        writer.flush()?;
        Ok(())
    }

    fn write_line(&self, text: &str) -> Result<(), UIError> {
        self.close_open_line()?;
        self.write(&format!("{text}\n"))
    }

    fn close_open_line(&self) -> Result<(), UIError> {
        let was_open = std::mem::take(&mut lock(&self.state).progress.line_open);
        if was_open {
            self.write("\n")?;
        }
        Ok(())
    }

    fn show_turn(
        &self,
        turn_id: u64,
        presentation: &Presentation,
        effects: ProjectionEffects,
    ) -> Result<(), UIError> {
        let mut output = String::new();
        {
            let mut state = lock(&self.state);
            record_presentation(&mut state.transcript, turn_id, presentation);

            let progress = &mut state.progress;
            if progress.turn_id != turn_id {
                *progress = TurnProgress {
                    turn_id,
                    ..Default::default()
                };
            }

            if let Some(reasoning) = &presentation.reasoning {
                let delta = unseen_suffix(&mut progress.reasoning, &reasoning.text);
                if !delta.is_empty() {
                    output.push_str(&style::style(delta).with(Color::DarkGrey).to_string());
                    progress.line_open = true;
                }
            }
            if let Some(elapsed) = effects.reasoning_completed {
                if progress.line_open {
                    output.push('\n');
                }
                let label = format!("Reasoning ({:.1}s)", elapsed.as_secs_f64());
                output.push_str(&format!("{}\n", style::style(label).with(Color::DarkGrey).italic()));
                progress.line_open = false;
            }

            if let Some(final_panel) = &presentation.final_panel {
                let delta = unseen_suffix(&mut progress.final_text, &final_panel.text);
                if !delta.is_empty() {
                    output.push_str(&delta);
                    progress.line_open = true;
                }
            }

            for annotation in presentation.annotations.iter().skip(progress.annotations) {
                if progress.line_open {
                    output.push('\n');
                }
                let color = match annotation {
                    crate::render::Annotation::Aborted => Color::DarkGrey,
                    _ => Color::Yellow,
                };
                output.push_str(&format!("{}\n", style::style(annotation.label()).with(color)));
                progress.line_open = false;
            }
            progress.annotations = presentation.annotations.len();

            if presentation.typing.is_none() && progress.line_open {
                output.push('\n');
                progress.line_open = false;
            }
        }

        if output.is_empty() {
            return Ok(());
        }
        self.write(&output)
    }

    fn format_tool_status(name: &str, status: &ToolStatus) -> String {
        match status {
            ToolStatus::Calling => format!("{} Calling tool: {name}...", "⚙".with(Color::Blue)),
            ToolStatus::Duplicate => format!(
                "{} Duplicate call detected, skipped",
                "⚠".with(Color::Yellow)
            ),
            ToolStatus::Succeeded { results_count } if *results_count > 0 => format!(
                "{} Found {results_count} search results",
                "✓".with(Color::Green)
            ),
            ToolStatus::Succeeded { .. } => format!("{} Tool finished", "✓".with(Color::Green)),
            ToolStatus::Failed { error } => {
                format!("{} Tool failed: {error}", "✗".with(Color::Red))
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns what `current` adds to what was printed, updating the record.
///
/// Text that no longer extends the printed prefix is reprinted on a new line.
fn unseen_suffix(printed: &mut String, current: &str) -> String {
    let delta = match current.strip_prefix(printed.as_str()) {
        Some(rest) => rest.to_string(),
        None => format!("\n{current}"),
    };
    *printed = current.to_string();
    delta
}

fn record_presentation(entries: &mut Vec<TranscriptEntry>, turn_id: u64, presentation: &Presentation) {
    let entry = TranscriptEntry::Assistant {
        turn_id,
        presentation: presentation.clone(),
    };
    let position = entries.iter().rposition(
        |existing| matches!(existing, TranscriptEntry::Assistant { turn_id: id, .. } if *id == turn_id),
    );
    match position {
        Some(index) => entries[index] = entry,
        None => entries.push(entry),
    }
}

#[async_trait]
impl UserInterface for TerminalUI {
    async fn send_event(&self, event: UiEvent) -> Result<(), UIError> {
        match event {
            UiEvent::TurnUpdated {
                turn_id,
                presentation,
                effects,
            } => self.show_turn(turn_id, &presentation, effects)?,
            UiEvent::TurnRemoved { turn_id } => {
                lock(&self.state).transcript.retain(|entry| {
                    !matches!(entry, TranscriptEntry::Assistant { turn_id: id, .. } if *id == turn_id)
                });
                self.write_line(&"(discarded attempt)".with(Color::DarkGrey).to_string())?;
            }
            UiEvent::ToolStatus { name, status, .. } => {
                self.write_line(&Self::format_tool_status(&name, &status))?;
            }
            UiEvent::RetrievalHits { count } => {
                self.write_line(&format!(
                    "{} Retrieved {count} related memories",
                    "•".with(Color::Blue)
                ))?;
            }
            UiEvent::Notice { level, message } => {
                let color = match level {
                    NoticeLevel::Info => Color::Blue,
                    NoticeLevel::Warning => Color::Yellow,
                    NoticeLevel::Error => Color::Red,
                };
                self.write_line(&style::style(message).with(color).to_string())?;
            }
            UiEvent::TurnStarted { .. } | UiEvent::StateChanged(_) => {}
        }
        Ok(())
    }
}

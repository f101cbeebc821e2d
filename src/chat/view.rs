//! Chat presentation: the [`ChatView`] seam plus HTML and terminal views.

use std::collections::VecDeque;
use std::io::Write;

use colored::*;
use minijinja::context;
use serde::Serialize;
use tracing::error;

use super::session::TranscriptEntry;
use crate::html;

/// Everything the chat controller needs from a UI.
pub trait ChatView {
    /// Show the empty-room placeholder and the nickname prompt.
    fn show_placeholder(&mut self);

    fn clear_placeholder(&mut self);

    /// Switch to message-entry mode for `username`.
    fn show_joined(&mut self, username: &str);

    /// Render one new transcript entry. `own` marks the local user's messages.
    fn append(&mut self, entry: &TranscriptEntry, own: bool);

    fn scroll_to_newest(&mut self) {}

    fn set_user_count(&mut self, count: u32);

    fn clear_input(&mut self) {}

    /// Blocking notice the user has to acknowledge.
    fn alert(&mut self, message: &str);

    /// Non-fatal notice; local state stays as it is.
    fn warn(&mut self, message: &str);

    /// Cancelable yes/no question.
    fn confirm(&mut self, question: &str) -> bool;
}

pub fn user_count_label(count: u32) -> String {
    format!("{count} online")
}

#[derive(Serialize)]
struct MessageModel<'a> {
    own: bool,
    initial: String,
    username: &'a str,
    text: &'a str,
    time: String,
}

/// Render a single transcript entry as escaped markup.
pub fn render_entry(entry: &TranscriptEntry, own: bool) -> Result<String, crate::DevroomError> {
    match entry {
        TranscriptEntry::Chat(msg) => html::render(
            "chat_message.html",
            MessageModel {
                own,
                initial: msg.avatar_initial(),
                username: &msg.username,
                text: &msg.text,
                time: msg.time_label(),
            },
        ),
        TranscriptEntry::System { text } => html::render("chat_system.html", context! { text => text }),
    }
}

// ---------------------------------------------------------------------------
// HTML view
// ---------------------------------------------------------------------------

/// Accumulates transcript markup for embedding in a page.
#[derive(Debug, Default)]
pub struct HtmlChatView {
    pub placeholder: bool,
    pub entries: Vec<String>,
    pub status_label: String,
    pub user_count_label: String,
    pub input_enabled: bool,
    pub alerts: Vec<String>,
    pub warnings: Vec<String>,
    /// Answer returned by [`ChatView::confirm`].
    pub auto_confirm: bool,
}

impl HtmlChatView {
    pub fn new(auto_confirm: bool) -> Self {
        Self {
            placeholder: true,
            auto_confirm,
            ..Self::default()
        }
    }

    /// The whole transcript container.
    pub fn to_html(&self) -> Result<String, crate::DevroomError> {
        html::render(
            "chat_transcript.html",
            context! { placeholder => self.placeholder, entries => &self.entries },
        )
    }
}

impl ChatView for HtmlChatView {
    fn show_placeholder(&mut self) {
        self.placeholder = true;
        self.entries.clear();
        self.input_enabled = false;
        self.status_label.clear();
    }

    fn clear_placeholder(&mut self) {
        self.placeholder = false;
    }

    fn show_joined(&mut self, username: &str) {
        self.input_enabled = true;
        self.status_label = format!("Connected as {username}");
    }

    fn append(&mut self, entry: &TranscriptEntry, own: bool) {
        match render_entry(entry, own) {
            Ok(markup) => self.entries.push(markup),
            Err(e) => error!(error = %e, "chat entry could not be rendered"),
        }
    }

    fn set_user_count(&mut self, count: u32) {
        self.user_count_label = user_count_label(count);
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn confirm(&mut self, _question: &str) -> bool {
        self.auto_confirm
    }
}

// ---------------------------------------------------------------------------
// Terminal view
// ---------------------------------------------------------------------------

/// Line-oriented colored output for the interactive CLI.
///
/// Confirmation answers are queued by the caller (the CLI reads them from the
/// same stdin stream as chat input) and consumed by [`ChatView::confirm`];
/// with nothing queued the question is treated as cancelled.
pub struct TerminalChatView<W: Write> {
    out: W,
    answers: VecDeque<bool>,
}

impl<W: Write> TerminalChatView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            answers: VecDeque::new(),
        }
    }

    pub fn queue_answer(&mut self, yes: bool) {
        self.answers.push_back(yes);
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl<W: Write> ChatView for TerminalChatView<W> {
    fn show_placeholder(&mut self) {
        self.line("Welcome! Enter a nickname to start chatting.".bright_blue());
    }

    fn clear_placeholder(&mut self) {}

    fn show_joined(&mut self, username: &str) {
        self.line(
            format!("Connected as {username}. Type a message, or /leave to exit.").bright_green(),
        );
    }

    fn append(&mut self, entry: &TranscriptEntry, own: bool) {
        match entry {
            TranscriptEntry::Chat(msg) => {
                let name = if own {
                    msg.username.bright_cyan().bold()
                } else {
                    msg.username.bright_yellow().bold()
                };
                let time = format!("[{}]", msg.time_label()).dimmed();
                self.line(format!("{time} {name}: {}", msg.text));
            }
            TranscriptEntry::System { text } => {
                self.line(format!("* {text}").dimmed());
            }
        }
    }

    fn set_user_count(&mut self, count: u32) {
        self.line(format!("({})", user_count_label(count)).dimmed());
    }

    fn alert(&mut self, message: &str) {
        self.line(message.bright_red().bold());
    }

    fn warn(&mut self, message: &str) {
        self.line(message.yellow());
    }

    fn confirm(&mut self, question: &str) -> bool {
        let answer = self.answers.pop_front().unwrap_or(false);
        if !answer {
            self.line(format!("{question} cancelled.").dimmed());
        }
        answer
    }
}

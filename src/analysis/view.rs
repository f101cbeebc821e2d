//! Analysis presentation: the [`AnalysisView`] seam plus HTML and terminal views.

use std::io::Write;

use colored::*;
use minijinja::context;
use serde::Serialize;
use tracing::error;

use super::outcome::{AnalysisOutcome, Section};
use crate::error::DevroomError;
use crate::html;

/// Everything the analysis controller needs from a UI.
pub trait AnalysisView {
    /// Hide every result section before a new request.
    fn hide_all(&mut self);

    fn show_progress(&mut self, message: &str);

    fn hide_progress(&mut self);

    /// Disable (`true`) or re-enable the analyze action.
    fn set_busy(&mut self, busy: bool);

    /// Render the single outcome chosen for a response.
    fn present(&mut self, outcome: &AnalysisOutcome);

    fn set_total_errors(&mut self, total: u64);

    fn set_line_count(&mut self, _label: &str) {}

    fn set_file_name(&mut self, _name: &str) {}
}

/// Drive two views at once, e.g. the terminal plus an HTML report.
impl<A: AnalysisView, B: AnalysisView> AnalysisView for (A, B) {
    fn hide_all(&mut self) {
        self.0.hide_all();
        self.1.hide_all();
    }

    fn show_progress(&mut self, message: &str) {
        self.0.show_progress(message);
        self.1.show_progress(message);
    }

    fn hide_progress(&mut self) {
        self.0.hide_progress();
        self.1.hide_progress();
    }

    fn set_busy(&mut self, busy: bool) {
        self.0.set_busy(busy);
        self.1.set_busy(busy);
    }

    fn present(&mut self, outcome: &AnalysisOutcome) {
        self.0.present(outcome);
        self.1.present(outcome);
    }

    fn set_total_errors(&mut self, total: u64) {
        self.0.set_total_errors(total);
        self.1.set_total_errors(total);
    }

    fn set_line_count(&mut self, label: &str) {
        self.0.set_line_count(label);
        self.1.set_line_count(label);
    }

    fn set_file_name(&mut self, name: &str) {
        self.0.set_file_name(name);
        self.1.set_file_name(name);
    }
}

// ---------------------------------------------------------------------------
// HTML view
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SectionModel<'a> {
    id: &'static str,
    html: &'a str,
}

/// Keeps the visible sections as rendered markup.
#[derive(Debug, Default)]
pub struct HtmlAnalysisView {
    pub sections: Vec<(Section, String)>,
    /// Progress message while a request is in flight.
    pub progress: Option<String>,
    pub busy: bool,
    pub total_errors: u64,
    pub line_count: String,
    pub file_name: Option<String>,
}

impl HtmlAnalysisView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, which: Section) -> Option<&str> {
        self.sections
            .iter()
            .find(|(s, _)| *s == which)
            .map(|(_, html)| html.as_str())
    }

    pub fn is_visible(&self, which: Section) -> bool {
        self.section(which).is_some()
    }

    /// A standalone HTML page with every visible section.
    pub fn to_document(&self, title: &str) -> Result<String, DevroomError> {
        let sections: Vec<SectionModel<'_>> = self
            .sections
            .iter()
            .map(|(s, html)| SectionModel { id: s.id(), html })
            .collect();
        html::render(
            "report.html",
            context! {
                title => title,
                file_name => &self.file_name,
                total_errors => self.total_errors,
                sections => sections,
            },
        )
    }
}

impl AnalysisView for HtmlAnalysisView {
    fn hide_all(&mut self) {
        self.sections.clear();
    }

    fn show_progress(&mut self, message: &str) {
        self.progress = Some(message.to_string());
    }

    fn hide_progress(&mut self) {
        self.progress = None;
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    fn present(&mut self, outcome: &AnalysisOutcome) {
        match outcome.render() {
            Ok(sections) => {
                for (section, markup) in sections {
                    self.sections.retain(|(s, _)| *s != section);
                    self.sections.push((section, markup));
                }
            }
            Err(e) => error!(error = %e, outcome = outcome.kind(), "analysis view could not be rendered"),
        }
    }

    fn set_total_errors(&mut self, total: u64) {
        self.total_errors = total;
    }

    fn set_line_count(&mut self, label: &str) {
        self.line_count = label.to_string();
    }

    fn set_file_name(&mut self, name: &str) {
        self.file_name = Some(name.to_string());
    }
}

// ---------------------------------------------------------------------------
// Terminal view
// ---------------------------------------------------------------------------

/// Colored report for the CLI.
pub struct TerminalAnalysisView<W: Write> {
    out: W,
}

impl<W: Write> TerminalAnalysisView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{text}");
    }

    fn block(&mut self, text: &str) {
        for l in text.lines() {
            self.line(format!("    {l}"));
        }
    }
}

impl<W: Write> AnalysisView for TerminalAnalysisView<W> {
    fn hide_all(&mut self) {}

    fn show_progress(&mut self, message: &str) {
        self.line(message.dimmed());
    }

    fn hide_progress(&mut self) {
        let _ = self.out.flush();
    }

    fn set_busy(&mut self, _busy: bool) {}

    fn present(&mut self, outcome: &AnalysisOutcome) {
        match outcome {
            AnalysisOutcome::TopLevelError { message } => {
                self.line(format!("error: {message}").bright_red().bold());
            }
            AnalysisOutcome::SyntaxError(view) => {
                let at = view.line.map(|l| format!(" (line {l})")).unwrap_or_default();
                self.line(format!("{}{at}: {}", view.error_type, view.message).bright_red().bold());
                if let Some(text) = &view.text {
                    self.block(text.trim_end());
                }
            }
            AnalysisOutcome::MissingPackages { packages } => {
                self.line("Missing packages:".yellow().bold());
                for pkg in packages {
                    self.line(format!("  {}  ->  {}", pkg.name.bold(), pkg.install_command.cyan()));
                }
            }
            AnalysisOutcome::ExecutionSucceeded { elapsed, stdout } => {
                self.line(format!("Code ran successfully in {elapsed}s").bright_green().bold());
                if !stdout.is_empty() {
                    self.line("Output:".bold());
                    self.block(stdout);
                }
            }
            AnalysisOutcome::Classified {
                error,
                solutions,
                similar,
            } => {
                let at = error.line.map(|l| format!(" (line {l})")).unwrap_or_default();
                self.line(
                    format!("{}{at} [{}]", error.error_type, error.severity)
                        .bright_red()
                        .bold(),
                );
                self.line(&error.message);
                if !error.description.is_empty() {
                    self.line(error.description.dimmed());
                }
                if !solutions.is_empty() {
                    self.line("Solutions:".bold());
                    for (i, s) in solutions.iter().enumerate() {
                        let text = if s.copyable {
                            s.text.cyan().to_string()
                        } else {
                            s.text.clone()
                        };
                        self.line(format!("  {}. {text}", i + 1));
                    }
                }
                if !similar.is_empty() {
                    self.line("Similar errors seen before:".bold());
                    for e in similar {
                        let times = if e.occurrences > 1 {
                            format!(" (seen {} times)", e.occurrences)
                        } else {
                            String::new()
                        };
                        self.line(format!("  [{}] {}: {}{times}", e.label.dimmed(), e.error_type, e.message));
                    }
                }
            }
            AnalysisOutcome::ExecutionFailed { stderr } => {
                self.line("Execution failed".bright_red().bold());
                self.block(stderr);
            }
            AnalysisOutcome::ValidationPassed => {
                self.line("Code validated successfully: no syntax errors, every import resolves.".bright_green());
            }
        }
        let _ = self.out.flush();
    }

    fn set_total_errors(&mut self, total: u64) {
        self.line(format!("Total recorded errors: {total}").dimmed());
    }

    fn set_line_count(&mut self, label: &str) {
        self.line(label.dimmed());
    }

    fn set_file_name(&mut self, name: &str) {
        self.line(name.bold());
    }
}

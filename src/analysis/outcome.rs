//! Response dispatch: turns one [`AnalyzeResponse`] into exactly one
//! [`AnalysisOutcome`], and outcomes into HTML sections.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;

use super::types::{AnalyzeResponse, ErrorAnalysis, SimilarError, SyntaxReport};
use crate::error::DevroomError;
use crate::html;

const GENERIC_FAILURE: &str = "Analysis failed.";
const COPYABLE_MARKERS: [&str; 2] = ["pip install", "npm install"];

/// Region of the result page an outcome writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Section {
    Result,
    Error,
    Solutions,
    Similar,
}

impl Section {
    pub fn id(&self) -> &'static str {
        match self {
            Section::Result => "resultSection",
            Section::Error => "errorSection",
            Section::Solutions => "solutionsSection",
            Section::Similar => "similarSection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntaxErrorView {
    pub error_type: String,
    pub line: Option<u32>,
    pub message: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingPackage {
    pub name: String,
    pub install_command: String,
}

impl MissingPackage {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let install_command = format!("pip install {name}");
        Self {
            name,
            install_command,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedError {
    pub error_type: String,
    pub line: Option<u32>,
    pub severity: String,
    pub message: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionItem {
    pub text: String,
    /// Carries an install command worth copying on its own.
    pub copyable: bool,
}

impl SolutionItem {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let copyable = COPYABLE_MARKERS.iter().any(|m| text.contains(m));
        Self { text, copyable }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarErrorItem {
    pub error_type: String,
    /// Local date/time of the prior occurrence.
    pub label: String,
    pub message: String,
    pub description: Option<String>,
    pub occurrences: u32,
}

impl From<&SimilarError> for SimilarErrorItem {
    fn from(e: &SimilarError) -> Self {
        Self {
            error_type: e.error_type.clone(),
            label: occurrence_label(&e.timestamp),
            message: e.error_message.clone(),
            description: e.description.clone().filter(|d| !d.is_empty()),
            occurrences: e.occurrence_count,
        }
    }
}

/// The single view chosen for a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    TopLevelError {
        message: String,
    },
    SyntaxError(SyntaxErrorView),
    MissingPackages {
        packages: Vec<MissingPackage>,
    },
    ExecutionSucceeded {
        /// Seconds, three decimals.
        elapsed: String,
        stdout: String,
    },
    Classified {
        error: ClassifiedError,
        solutions: Vec<SolutionItem>,
        similar: Vec<SimilarErrorItem>,
    },
    ExecutionFailed {
        stderr: String,
    },
    ValidationPassed,
}

/// Pick the outcome for `resp`. Checks run in priority order and the first
/// match wins; later parts of the response are not looked at.
pub fn classify(resp: &AnalyzeResponse) -> AnalysisOutcome {
    if !resp.success {
        let message = resp
            .error
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(GENERIC_FAILURE);
        return AnalysisOutcome::TopLevelError {
            message: message.to_string(),
        };
    }

    let Some(analysis) = resp.analysis.as_ref() else {
        return AnalysisOutcome::ValidationPassed;
    };

    if let Some(validation) = &analysis.validation {
        if let Some(syntax) = validation.syntax.as_ref().filter(|s| !s.valid) {
            return AnalysisOutcome::SyntaxError(syntax_view(syntax));
        }
        let missing = validation
            .imports
            .as_ref()
            .map(|i| i.missing())
            .unwrap_or_default();
        if !missing.is_empty() {
            return AnalysisOutcome::MissingPackages {
                packages: missing.into_iter().map(MissingPackage::new).collect(),
            };
        }
    }

    match (&analysis.execution, &analysis.error_analysis) {
        (Some(exec), _) if exec.success => AnalysisOutcome::ExecutionSucceeded {
            elapsed: format!("{:.3}", exec.execution_time),
            stdout: exec.stdout.clone(),
        },
        (Some(_), Some(ea)) => classified(ea, &analysis.similar_errors),
        (Some(exec), None) => AnalysisOutcome::ExecutionFailed {
            stderr: exec.stderr.clone(),
        },
        (None, _) => AnalysisOutcome::ValidationPassed,
    }
}

fn syntax_view(syntax: &SyntaxReport) -> SyntaxErrorView {
    SyntaxErrorView {
        error_type: syntax
            .error_type
            .clone()
            .unwrap_or_else(|| "SyntaxError".to_string()),
        line: syntax.line,
        message: syntax
            .error
            .clone()
            .unwrap_or_else(|| "Invalid syntax".to_string()),
        text: syntax.text.clone().filter(|t| !t.trim().is_empty()),
    }
}

fn classified(ea: &ErrorAnalysis, similar: &[SimilarError]) -> AnalysisOutcome {
    AnalysisOutcome::Classified {
        error: ClassifiedError {
            error_type: ea.error_type.clone(),
            line: ea.line_number,
            severity: ea.severity.clone(),
            message: ea.error_message.clone(),
            description: ea.description.clone(),
        },
        solutions: ea.solutions.iter().map(SolutionItem::new).collect(),
        similar: similar.iter().map(SimilarErrorItem::from).collect(),
    }
}

/// Local `YYYY-MM-DD HH:MM:SS` for an RFC 3339 or naive (UTC) SQL timestamp.
/// Anything else is returned unchanged.
pub fn occurrence_label(timestamp: &str) -> String {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return dt.with_timezone(&Local).format(FORMAT).to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, FORMAT) {
        return DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
            .with_timezone(&Local)
            .format(FORMAT)
            .to_string();
    }
    timestamp.to_string()
}

impl AnalysisOutcome {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisOutcome::TopLevelError { .. } => "top_level_error",
            AnalysisOutcome::SyntaxError(_) => "syntax_error",
            AnalysisOutcome::MissingPackages { .. } => "missing_packages",
            AnalysisOutcome::ExecutionSucceeded { .. } => "execution_succeeded",
            AnalysisOutcome::Classified { .. } => "classified",
            AnalysisOutcome::ExecutionFailed { .. } => "execution_failed",
            AnalysisOutcome::ValidationPassed => "validation_passed",
        }
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, AnalysisOutcome::Classified { .. })
    }

    /// Render into the sections this outcome occupies, in page order.
    pub fn render(&self) -> Result<Vec<(Section, String)>, DevroomError> {
        use minijinja::context;

        let sections = match self {
            AnalysisOutcome::TopLevelError { message } => {
                vec![(Section::Error, html::render("top_error.html", context! { message => message })?)]
            }
            AnalysisOutcome::SyntaxError(view) => {
                vec![(Section::Error, html::render("syntax_error.html", view)?)]
            }
            AnalysisOutcome::MissingPackages { packages } => vec![(
                Section::Solutions,
                html::render("missing_packages.html", context! { packages => packages })?,
            )],
            AnalysisOutcome::ExecutionSucceeded { elapsed, stdout } => vec![(
                Section::Result,
                html::render("execution_success.html", context! { elapsed => elapsed, stdout => stdout })?,
            )],
            AnalysisOutcome::Classified {
                error,
                solutions,
                similar,
            } => {
                let mut out = vec![(Section::Error, html::render("error_analysis.html", error)?)];
                if !solutions.is_empty() {
                    out.push((
                        Section::Solutions,
                        html::render("solutions.html", context! { solutions => solutions })?,
                    ));
                }
                if !similar.is_empty() {
                    out.push((
                        Section::Similar,
                        html::render("similar_errors.html", context! { errors => similar })?,
                    ));
                }
                out
            }
            AnalysisOutcome::ExecutionFailed { stderr } => vec![(
                Section::Error,
                html::render("execution_failure.html", context! { stderr => stderr })?,
            )],
            AnalysisOutcome::ValidationPassed => vec![(
                Section::Result,
                html::render("validation_success.html", context! {})?,
            )],
        };
        Ok(sections)
    }
}

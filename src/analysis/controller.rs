//! The analysis request controller.
//!
//! Holds the code buffer and its metadata, issues at most one request at a
//! time and hands the response to [`classify`] to pick the single view to
//! show. Every request is bounded by a timeout and can be cancelled through a
//! [`CancellationToken`].

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::AnalysisBackend;
use super::outcome::{classify, AnalysisOutcome};
use super::types::{AnalyzeRequest, AnalyzeResponse, FileType, ValidateRequest};
use super::view::AnalysisView;
use crate::error::DevroomError;

const EMPTY_INPUT_MESSAGE: &str = "Please enter some code to analyze.";
const PROGRESS_MESSAGE: &str = "Analyzing code...";
const VALIDATE_PROGRESS_MESSAGE: &str = "Validating code...";

/// `"1 line"` / `"N lines"`, counting `\n`-separated lines like an editor.
pub fn line_count_label(code: &str) -> String {
    let lines = code.split('\n').count();
    if lines == 1 {
        "1 line".to_string()
    } else {
        format!("{lines} lines")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Analyze,
    Validate,
}

pub struct AnalysisController<B: AnalysisBackend, V: AnalysisView> {
    backend: B,
    view: V,
    code: String,
    file_type: FileType,
    file_name: Option<String>,
    execute: bool,
    save_history: bool,
    timeout: Duration,
    total_errors: u64,
    last_outcome: Option<AnalysisOutcome>,
}

impl<B: AnalysisBackend, V: AnalysisView> AnalysisController<B, V> {
    pub fn new(backend: B, mut view: V) -> Self {
        view.set_line_count(&line_count_label(""));
        view.set_total_errors(0);
        Self {
            backend,
            view,
            code: String::new(),
            file_type: FileType::default(),
            file_name: None,
            execute: true,
            save_history: true,
            timeout: Duration::from_secs(30),
            total_errors: 0,
            last_outcome: None,
        }
    }

    /// Upper bound on one analysis round trip (default 30 s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        let label = line_count_label(&self.code);
        self.view.set_line_count(&label);
    }

    pub fn set_file_type(&mut self, file_type: FileType) {
        self.file_type = file_type;
    }

    pub fn set_execute(&mut self, execute: bool) {
        self.execute = execute;
    }

    pub fn set_save_history(&mut self, save_history: bool) {
        self.save_history = save_history;
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn last_outcome(&self) -> Option<&AnalysisOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn into_view(self) -> V {
        self.view
    }

    /// Load `path` into the code buffer and detect its type from the extension.
    ///
    /// # Errors
    /// - [`DevroomError::Validation`] for an unsupported extension; the buffer
    ///   is left untouched.
    /// - [`DevroomError::Io`] when the file cannot be read as UTF-8 text.
    pub async fn load_file(&mut self, path: &Path) -> Result<FileType, DevroomError> {
        let Some(file_type) = FileType::from_path(path) else {
            let message = format!(
                "Unsupported file type: {}. Use .py, .js, .html, .css or .json.",
                path.display()
            );
            self.view.hide_all();
            self.present(AnalysisOutcome::TopLevelError {
                message: message.clone(),
            });
            return Err(DevroomError::Validation(message));
        };

        let code = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!(file = %name, file_type = %file_type, bytes = code.len(), "loaded file");
        self.view.set_file_name(&name);
        self.file_name = Some(name);
        self.file_type = file_type;
        self.set_code(code);
        Ok(file_type)
    }

    /// Analyze the current buffer. See [`analyze_with_cancel`](Self::analyze_with_cancel).
    pub async fn analyze(&mut self) -> Result<AnalysisOutcome, DevroomError> {
        self.analyze_with_cancel(&CancellationToken::new()).await
    }

    /// Send the buffer to `POST /analyze` and present the outcome.
    ///
    /// The outcome is presented in every case, including failures, before the
    /// result is returned.
    ///
    /// # Errors
    /// - [`DevroomError::EmptyInput`] for a blank buffer; no request is made.
    /// - [`DevroomError::RequestFailure`] on transport failure, timeout or
    ///   cancellation.
    /// - [`DevroomError::ServerReported`] when the response says `success: false`.
    pub async fn analyze_with_cancel(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, DevroomError> {
        self.run(Call::Analyze, cancel).await
    }

    /// Static checks only (`POST /validate`); nothing is executed.
    pub async fn validate(&mut self) -> Result<AnalysisOutcome, DevroomError> {
        self.run(Call::Validate, &CancellationToken::new()).await
    }

    async fn run(
        &mut self,
        call: Call,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, DevroomError> {
        let code = self.code.trim();
        if code.is_empty() {
            self.view.hide_all();
            self.present(AnalysisOutcome::TopLevelError {
                message: EMPTY_INPUT_MESSAGE.to_string(),
            });
            return Err(DevroomError::EmptyInput);
        }
        let code = code.to_string();

        self.view.hide_all();
        self.view.show_progress(match call {
            Call::Analyze => PROGRESS_MESSAGE,
            Call::Validate => VALIDATE_PROGRESS_MESSAGE,
        });
        self.view.set_busy(true);

        let result = self.send(call, code, cancel).await;

        self.view.hide_progress();
        self.view.set_busy(false);

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "analysis request failed");
                let detail = match &e {
                    DevroomError::RequestFailure { detail, .. } => detail.clone(),
                    other => other.to_string(),
                };
                self.present(AnalysisOutcome::TopLevelError {
                    message: format!("Could not reach the analysis server: {detail}"),
                });
                return Err(e);
            }
        };

        let outcome = classify(&resp);
        info!(outcome = outcome.kind(), "analysis finished");
        self.present(outcome.clone());

        if !resp.success {
            let message = match &outcome {
                AnalysisOutcome::TopLevelError { message } => message.clone(),
                _ => String::new(),
            };
            return Err(DevroomError::ServerReported(message));
        }
        if outcome.is_classified() {
            // Bounded by the same timeout and token as the analysis call.
            let timeout = self.timeout;
            tokio::select! {
                _ = cancel.cancelled() => debug!("statistics refresh cancelled"),
                r = tokio::time::timeout(timeout, self.refresh_statistics()) => {
                    if r.is_err() {
                        warn!(timeout = ?timeout, "statistics refresh timed out");
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn send(
        &self,
        call: Call,
        code: String,
        cancel: &CancellationToken,
    ) -> Result<AnalyzeResponse, DevroomError> {
        let path = match call {
            Call::Analyze => "analyze",
            Call::Validate => "validate",
        };
        let url = format!("{}/{path}", self.backend.base_url());

        let request = async {
            match call {
                Call::Analyze => {
                    let req = AnalyzeRequest {
                        code,
                        file_type: self.file_type,
                        execute: self.execute,
                        save_history: self.save_history,
                    };
                    self.backend.analyze(&req).await
                }
                Call::Validate => self
                    .backend
                    .validate(&ValidateRequest { code })
                    .await
                    .map(AnalyzeResponse::from_validation),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(url = %url, "analysis cancelled");
                Err(DevroomError::RequestFailure { url, detail: "request cancelled".to_string() })
            }
            r = tokio::time::timeout(self.timeout, request) => match r {
                Ok(inner) => inner,
                Err(_) => Err(DevroomError::RequestFailure {
                    url,
                    detail: format!("timed out after {:?}", self.timeout),
                }),
            },
        }
    }

    /// Refresh the aggregate error count. Never fails: a transport error
    /// shows 0, a `success: false` answer leaves the count as it was.
    pub async fn refresh_statistics(&mut self) -> u64 {
        match self.backend.statistics().await {
            Ok(resp) => match resp.statistics.filter(|_| resp.success) {
                Some(stats) => self.total_errors = stats.total_errors,
                None => debug!(error = ?resp.error, "statistics unavailable"),
            },
            Err(e) => {
                warn!(error = %e, "statistics refresh failed");
                self.total_errors = 0;
            }
        }
        self.view.set_total_errors(self.total_errors);
        self.total_errors
    }

    fn present(&mut self, outcome: AnalysisOutcome) {
        self.view.present(&outcome);
        self.last_outcome = Some(outcome);
    }
}

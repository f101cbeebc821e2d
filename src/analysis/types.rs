//! Request/response shapes of the analysis HTTP API.
//!
//! The backend grows fields over time, so every response struct tolerates
//! missing keys (`#[serde(default)]`) and ignores unknown ones.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Language of the code buffer. Only `python` is executed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Python,
    Javascript,
    Html,
    Css,
    Json,
}

impl FileType {
    /// Detect the type from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "py" => Some(FileType::Python),
            "js" => Some(FileType::Javascript),
            "html" => Some(FileType::Html),
            "css" => Some(FileType::Css),
            "json" => Some(FileType::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Python => "python",
            FileType::Javascript => "javascript",
            FileType::Html => "html",
            FileType::Css => "css",
            FileType::Json => "json",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub code: String,
    pub file_type: FileType,
    pub execute: bool,
    pub save_history: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
}

impl AnalyzeResponse {
    /// Wrap a validate-only result so it can go through the same dispatch as
    /// a full analysis (it never carries an `execution` key).
    pub fn from_validation(resp: ValidateResponse) -> Self {
        Self {
            success: resp.success,
            error: resp.error,
            analysis: Some(Analysis {
                validation: resp.validation,
                ..Analysis::default()
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub validation: Option<Validation>,
    #[serde(default)]
    pub execution: Option<Execution>,
    #[serde(default)]
    pub error_analysis: Option<ErrorAnalysis>,
    #[serde(default)]
    pub similar_errors: Vec<SimilarError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default)]
    pub syntax: Option<SyntaxReport>,
    #[serde(default)]
    pub imports: Option<ImportsReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub error_type: Option<String>,
    /// Offending source line, when the parser reported one.
    #[serde(default)]
    pub text: Option<String>,
}

/// Import check. Older backends put `missing` at the top level, newer ones
/// nest it under `availability`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportsReport {
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub availability: Option<ImportAvailability>,
}

impl ImportsReport {
    /// Missing packages from either shape, first occurrence wins.
    pub fn missing(&self) -> Vec<String> {
        let nested = self.availability.iter().flat_map(|a| a.missing.iter());
        let mut out: Vec<String> = Vec::new();
        for pkg in self.missing.iter().chain(nested) {
            if !out.contains(pkg) {
                out.push(pkg.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportAvailability {
    #[serde(default)]
    pub all_available: Option<bool>,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub available: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Seconds.
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub timed_out: bool,
    /// The sandbox refused to run the code.
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub solutions: Vec<String>,
    #[serde(default)]
    pub severity: String,
}

/// A prior occurrence from the backend's error history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarError {
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub line_number: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub solutions: Vec<String>,
    #[serde(default, alias = "created_at")]
    pub timestamp: String,
    #[serde(default = "one")]
    pub occurrence_count: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub total_errors: u64,
    #[serde(default)]
    pub error_by_type: BTreeMap<String, u64>,
    #[serde(default)]
    pub most_common_patterns: Vec<PatternCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternCount {
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub rag_enabled: bool,
}

/// Body of `POST /validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub validation: Option<Validation>,
    #[serde(default)]
    pub error: Option<String>,
}

//! Code-error analysis client.
//!
//! [`AnalysisController`] sends the code buffer to an [`AnalysisBackend`],
//! [`classify`] reduces the response to one [`AnalysisOutcome`], and an
//! [`AnalysisView`] shows it.

pub mod backend;
pub mod controller;
pub mod outcome;
pub mod types;
pub mod view;

pub use backend::{AnalysisBackend, HttpAnalysisBackend, HttpAnalysisBackendBuilder};
pub use controller::{line_count_label, AnalysisController};
pub use outcome::{classify, occurrence_label, AnalysisOutcome, Section};
pub use types::{AnalyzeRequest, AnalyzeResponse, FileType, StatisticsResponse};
pub use view::{AnalysisView, HtmlAnalysisView, TerminalAnalysisView};

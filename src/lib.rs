// src/lib.rs

//! Extracts repository URLs from catalog index documents and reports the
//! recent commit activity of each repository.

pub mod analyzer;
pub mod catalog;
pub mod cli;
pub mod error;
pub mod index;
pub mod model;
pub mod narrative;
pub mod pipeline;
pub mod renderer;
pub mod retry;

pub use catalog::CatalogRenderer;
pub use error::{AnalyzerError, ErrorKind, Result};
pub use index::{IndexParser, RepositorySet};
pub use model::{ActivitySummary, AnalysisWindow, CommitRecord, ContributorRank, RepositoryRef};
pub use pipeline::{Pipeline, PipelineConfig};
pub use renderer::{ReportFormatter, RepositoryOutcome, RunReport};

use std::path::Path;

/// Unique repository URLs referenced by the catalog at `path`
pub fn extract_repositories(path: &Path) -> Result<RepositorySet> {
    IndexParser::new().extract_repositories(path)
}

/// Activity of one repository over the last `days` days, with default settings
pub fn analyze_repository(url: &str, branch: Option<&str>, days: i64) -> Result<ActivitySummary> {
    Pipeline::new(&PipelineConfig::default()).analyze_repository(url, branch, days)
}

/// Analyze `urls` in order with default settings
pub fn process_all<S: AsRef<str> + Sync>(urls: &[S]) -> RunReport {
    Pipeline::new(&PipelineConfig::default()).process_all(urls)
}

// src/pipeline.rs

use crate::analyzer::{CommitHistoryAnalyzer, RepositoryAnalyzer, DEFAULT_MAX_DIFF_DELTAS};
use crate::error::{AnalyzerError, ErrorKind, Result};
use crate::index::{IndexParser, RepositorySet};
use crate::model::{ActivitySummary, AnalysisWindow};
use crate::narrative::{ExternalTool, NarrativeTool};
use crate::renderer::{FailureRecord, ReportFormatter, RepositoryOutcome, RunReport};
use crate::retry::{RetryExecutor, DEFAULT_MAX_RETRIES};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub work_dir: PathBuf,
    /// `None` analyzes `main`, falling back to `master`
    pub branch: Option<String>,
    pub lookback_days: i64,
    pub max_retries: usize,
    /// Values above 1 analyze repositories in parallel
    pub jobs: usize,
    pub max_diff_deltas: usize,
    pub narrative: NarrativeTool,
    pub formatter: ReportFormatter,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp-repos"),
            branch: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_retries: DEFAULT_MAX_RETRIES,
            jobs: 1,
            max_diff_deltas: DEFAULT_MAX_DIFF_DELTAS,
            narrative: NarrativeTool::None,
            formatter: ReportFormatter::default(),
        }
    }
}

/// Catalog ingestion followed by per-repository analysis.
///
/// Only catalog ingestion can fail the whole run; a repository that cannot be
/// analyzed becomes a failure section in the report.
pub struct Pipeline<A = CommitHistoryAnalyzer> {
    parser: IndexParser,
    analyzer: A,
    retry: RetryExecutor,
    formatter: ReportFormatter,
    branch: Option<String>,
    lookback_days: i64,
    jobs: usize,
}

impl Pipeline<CommitHistoryAnalyzer> {
    pub fn new(config: &PipelineConfig) -> Self {
        let mut analyzer =
            CommitHistoryAnalyzer::new(&config.work_dir).with_max_diff_deltas(config.max_diff_deltas);
        if let Some(tool) = ExternalTool::for_tool(config.narrative) {
            analyzer = analyzer.with_narrative(Arc::new(tool));
        }
        Self::with_analyzer(config, analyzer)
    }

    /// Branches of `url`, main/master first
    pub fn list_branches(&self, url: &str) -> Result<Vec<String>> {
        self.retry
            .run(&format!("list branches of {}", url), || self.analyzer.list_branches(url))
    }
}

impl<A: RepositoryAnalyzer> Pipeline<A> {
    pub fn with_analyzer(config: &PipelineConfig, analyzer: A) -> Self {
        Self {
            parser: IndexParser::new(),
            analyzer,
            retry: RetryExecutor::new(config.max_retries),
            formatter: config.formatter,
            branch: config.branch.clone(),
            lookback_days: config.lookback_days,
            jobs: config.jobs.max(1),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn formatter(&self) -> &ReportFormatter {
        &self.formatter
    }

    pub fn extract_repositories(&self, catalog: &Path) -> Result<RepositorySet> {
        let repositories = self.parser.extract_repositories(catalog)?;
        info!("Found {} unique repositories in {}", repositories.len(), catalog.display());
        Ok(repositories)
    }

    /// Analyze one repository over the last `days` days, retrying transient failures
    pub fn analyze_repository(&self, url: &str, branch: Option<&str>, days: i64) -> Result<ActivitySummary> {
        if days <= 0 {
            return Err(AnalyzerError::new(ErrorKind::Validation, "lookback must be a positive number of days")
                .with_context("days", days));
        }
        let window = AnalysisWindow::lookback(days);
        self.retry.run(&format!("analyze repository {}", url), || {
            self.analyzer.analyze(url, branch, &window)
        })
    }

    /// Analyze every repository, recording failures instead of aborting
    pub fn process_all<S: AsRef<str> + Sync>(&self, urls: &[S]) -> RunReport {
        let window = AnalysisWindow::lookback(self.lookback_days);
        let bar = ProgressBar::new(urls.len() as u64);
        bar.set_message("Analyzing repositories");

        let outcomes = if self.jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => pool.install(|| {
                    urls.par_iter()
                        .enumerate()
                        .progress_with(bar.clone())
                        .map(|(i, url)| {
                            let analyzer = self.analyzer.for_job(i);
                            self.outcome(&analyzer, url.as_ref(), &window)
                        })
                        .collect::<Vec<_>>()
                }),
                Err(e) => {
                    warn!("Failed to start worker pool ({}), processing sequentially", e);
                    self.sequential(urls, &window, &bar)
                }
            }
        } else {
            self.sequential(urls, &window, &bar)
        };
        bar.finish_with_message("Analysis complete");

        let report = RunReport::new(outcomes);
        let summary = report.summary();
        info!(
            "Processed {} repositories (Success: {}, Failed: {})",
            summary.total, summary.succeeded, summary.failed
        );
        report
    }

    fn sequential<S: AsRef<str>>(&self, urls: &[S], window: &AnalysisWindow, bar: &ProgressBar) -> Vec<RepositoryOutcome> {
        urls.iter()
            .enumerate()
            .map(|(i, url)| {
                info!("Processing repository {}/{}: {}", i + 1, urls.len(), url.as_ref());
                let outcome = self.outcome(&self.analyzer, url.as_ref(), window);
                bar.inc(1);
                outcome
            })
            .collect()
    }

    fn outcome(&self, analyzer: &A, url: &str, window: &AnalysisWindow) -> RepositoryOutcome {
        let result = self.retry.run(&format!("process repository {}", url), || {
            analyzer.analyze(url, self.branch.as_deref(), window)
        });
        match result {
            Ok(summary) => RepositoryOutcome::Success(summary),
            Err(e) => {
                error!("Failed to generate release notes for {}: {}", url, e);
                RepositoryOutcome::Failure(FailureRecord::new(url, &e))
            }
        }
    }
}

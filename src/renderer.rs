// src/renderer.rs

use crate::error::{AnalyzerError, ErrorKind};
use crate::model::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Bumped whenever the structured report layout changes
pub const REPORT_FORMAT_VERSION: u32 = 1;

pub const DEFAULT_MAX_CONTRIBUTORS: usize = 5;
pub const DEFAULT_MAX_COMMITS: usize = 50;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RULE_WIDTH: usize = 80;

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DATE_FORMAT).to_string()
}

/// A failure as it appears in the report
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub repository: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Full error text, including the underlying cause
    pub detail: String,
    pub context: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(repository: &str, err: &AnalyzerError) -> Self {
        Self {
            repository: repository.to_string(),
            kind: err.kind,
            message: err.message.clone(),
            detail: err.to_string(),
            context: err.context.clone(),
            timestamp: err.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepositoryOutcome {
    Success(ActivitySummary),
    Failure(FailureRecord),
}

impl RepositoryOutcome {
    pub fn repository(&self) -> &str {
        match self {
            RepositoryOutcome::Success(summary) => &summary.repository,
            RepositoryOutcome::Failure(failure) => &failure.repository,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RepositoryOutcome::Success(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Percentage of repositories processed successfully
    pub success_rate: f64,
}

/// Every outcome of one run, in input order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub format_version: u32,
    pub generated_at: DateTime<Utc>,
    pub outcomes: Vec<RepositoryOutcome>,
}

impl RunReport {
    pub fn new(outcomes: Vec<RepositoryOutcome>) -> Self {
        Self {
            format_version: REPORT_FORMAT_VERSION,
            generated_at: Utc::now(),
            outcomes,
        }
    }

    pub fn summary(&self) -> RunSummary {
        let total = self.outcomes.len();
        let succeeded = self.outcomes.iter().filter(|o| o.is_success()).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64 * 100.0
        };
        RunSummary {
            total,
            succeeded,
            failed: total - succeeded,
            success_rate,
        }
    }

    pub fn render_text(&self, formatter: &ReportFormatter) -> String {
        let mut out = String::new();
        let header = format!("Release Notes Generated on: {}", timestamp(&self.generated_at));
        let _ = writeln!(out, "{}", header);
        let _ = writeln!(out, "{}\n", "=".repeat(header.len()));

        for outcome in &self.outcomes {
            match outcome {
                RepositoryOutcome::Success(summary) => out.push_str(&formatter.render(summary)),
                RepositoryOutcome::Failure(failure) => out.push_str(&formatter.render_failure_record(failure)),
            }
        }

        let summary = self.summary();
        let _ = writeln!(out, "\n=== PROCESSING SUMMARY ===");
        let _ = writeln!(out, "Total Repositories: {}", summary.total);
        let _ = writeln!(out, "Successfully Processed: {}", summary.succeeded);
        let _ = writeln!(out, "Failed: {}", summary.failed);
        let _ = writeln!(out, "Success Rate: {:.1}%", summary.success_rate);
        let _ = writeln!(out, "Generated on: {}", timestamp(&Utc::now()));
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            #[serde(flatten)]
            report: &'a RunReport,
            summary: RunSummary,
        }
        serde_json::to_string_pretty(&Document {
            report: self,
            summary: self.summary(),
        })
    }
}

/// Renders per-repository report sections
#[derive(Debug, Clone, Copy)]
pub struct ReportFormatter {
    pub max_contributors: usize,
    pub max_commits: usize,
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self {
            max_contributors: DEFAULT_MAX_CONTRIBUTORS,
            max_commits: DEFAULT_MAX_COMMITS,
        }
    }
}

impl ReportFormatter {
    pub fn render(&self, summary: &ActivitySummary) -> String {
        let mut out = String::new();
        let window = &summary.window;
        let days = window.days();

        let _ = writeln!(out, "Release Notes for {}", repo_name(&summary.repository));
        let _ = writeln!(out, "Repository: {}", summary.repository);
        let _ = writeln!(out, "Branch: {}", summary.branch);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        let _ = writeln!(
            out,
            "Analysis Period: Last {} day{} (since {})",
            days,
            if days == 1 { "" } else { "s" },
            timestamp(&window.since)
        );
        let _ = writeln!(out, "Analysis Start: {}", timestamp(&window.since));
        let _ = writeln!(out, "Analysis End: {}\n", timestamp(&window.until));

        let latest = &summary.latest_commit;
        let _ = writeln!(out, "=== LATEST COMMIT INFORMATION ===");
        let _ = writeln!(out, "Hash: {}", latest.short_hash);
        let _ = writeln!(out, "Message: {}", latest.message);
        let _ = writeln!(out, "Author: {}", latest.author);
        let _ = writeln!(out, "Date: {}\n", timestamp(&latest.timestamp));

        let _ = writeln!(out, "=== ACTIVITY SUMMARY ===");
        let _ = writeln!(out, "Total Commits: {}", summary.total_commits);
        let _ = writeln!(out, "Total Lines Changed: {}", summary.total_lines_changed);
        let _ = writeln!(out, "Active Contributors: {}\n", summary.distinct_authors);

        if !summary.contributors.is_empty() {
            let _ = writeln!(out, "=== TOP CONTRIBUTORS ===");
            for c in summary.contributors.iter().take(self.max_contributors) {
                let _ = writeln!(out, "{}", contributor_line(c));
            }
            out.push('\n');
        }

        if summary.commits.is_empty() {
            let _ = writeln!(out, "=== NO COMMITS IN THIS PERIOD ===");
            let _ = writeln!(
                out,
                "No commits found on {} during the analysis period.",
                summary.branch
            );
        } else {
            let _ = writeln!(out, "=== COMMITS IN THIS PERIOD ===");
            let total = summary.commits.len();
            if total > self.max_commits {
                let _ = writeln!(out, "(Showing first {} of {} commits)", self.max_commits, total);
            }
            for commit in summary.commits.iter().take(self.max_commits) {
                let _ = writeln!(
                    out,
                    "- {} ({}) by {} on {}",
                    commit.message.trim(),
                    commit.short_hash,
                    commit.author,
                    timestamp(&commit.timestamp)
                );
            }
        }

        if let Some(narrative) = &summary.narrative {
            let _ = writeln!(out, "\n=== NARRATIVE ===");
            let _ = writeln!(out, "{}", narrative.trim_end());
        }

        out.push_str("\n\n");
        out
    }

    pub fn render_failure(&self, repository: &str, err: &AnalyzerError) -> String {
        self.render_failure_record(&FailureRecord::new(repository, err))
    }

    pub fn render_failure_record(&self, failure: &FailureRecord) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Repository: {}", failure.repository);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        let _ = writeln!(out, "=== ERROR PROCESSING REPOSITORY ===");
        let _ = writeln!(out, "Error Kind: {}", failure.kind);
        let _ = writeln!(out, "Error: {}", failure.detail);
        let _ = writeln!(out, "Timestamp: {}", timestamp(&failure.timestamp));
        let _ = writeln!(out, "This repository could not be processed successfully.\n");
        out
    }
}

fn contributor_line(c: &ContributorRank) -> String {
    format!("{}. {} ({} commits)", c.rank, c.author, c.commit_count)
}

/// Parse a rendered `N. name (K commits)` line back into its parts
pub fn parse_contributor_line(line: &str) -> Option<ContributorRank> {
    let (rank, rest) = line.trim().split_once(". ")?;
    let (author, count) = rest.rsplit_once(" (")?;
    let count = count.strip_suffix(" commits)")?;
    Some(ContributorRank {
        author: author.to_string(),
        commit_count: count.parse().ok()?,
        rank: rank.parse().ok()?,
    })
}

// src/model.rs

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

pub const MIN_LOOKBACK_DAYS: i64 = 1;
pub const MAX_LOOKBACK_DAYS: i64 = 365;

/// Clamp a user-supplied lookback to the supported range
pub fn clamp_lookback_days(days: i64) -> i64 {
    days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS)
}

/// A repository URL that passed scheme validation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RepositoryRef(String);

impl RepositoryRef {
    /// Accepts `http://`, `https://` and `git@` URLs only
    pub fn parse(url: &str) -> Option<Self> {
        let valid = ["http://", "https://", "git@"]
            .iter()
            .any(|scheme| url.starts_with(scheme));
        valid.then(|| Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment with any `.git` suffix removed
    pub fn name(&self) -> &str {
        repo_name(&self.0)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepositoryRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Directory-friendly name for a repository URL
pub fn repo_name(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    match trimmed.rsplit(['/', ':']).next() {
        Some(name) if !name.is_empty() => name,
        _ => "unknown-repo",
    }
}

/// Half-open interval `[since, until)` bounding commit traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl AnalysisWindow {
    /// Window of `days` ending now
    pub fn lookback(days: i64) -> Self {
        Self::ending_at(Utc::now(), Duration::days(days))
    }

    pub fn ending_at(until: DateTime<Utc>, length: Duration) -> Self {
        Self {
            since: until - length,
            until,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.since <= ts && ts < self.until
    }

    pub fn days(&self) -> i64 {
        (self.until - self.since).num_days()
    }
}

/// One traversed commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub short_hash: String,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub lines_added: usize,
    pub lines_deleted: usize,
}

impl CommitRecord {
    pub fn lines_changed(&self) -> usize {
        self.lines_added + self.lines_deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributorRank {
    pub author: String,
    pub commit_count: usize,
    /// 1-based position by descending commit count
    pub rank: usize,
}

/// Activity of one repository branch over one window
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub repository: String,
    pub branch: String,
    pub window: AnalysisWindow,
    /// Branch tip, regardless of whether it falls inside the window
    pub latest_commit: CommitRecord,
    pub total_commits: usize,
    pub total_lines_changed: usize,
    pub distinct_authors: usize,
    pub commits: Vec<CommitRecord>,
    pub contributors: Vec<ContributorRank>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn repository_ref_accepts_supported_schemes() {
        assert!(RepositoryRef::parse("https://github.com/a/b").is_some());
        assert!(RepositoryRef::parse("http://example.com/a.git").is_some());
        assert!(RepositoryRef::parse("git@github.com:a/b.git").is_some());
        assert!(RepositoryRef::parse("ftp://example.com/a").is_none());
        assert!(RepositoryRef::parse("github.com/a/b").is_none());
        assert!(RepositoryRef::parse("").is_none());
    }

    #[test]
    fn repo_name_strips_suffixes() {
        assert_eq!(repo_name("https://github.com/openshift/api.git"), "api");
        assert_eq!(repo_name("https://github.com/openshift/api/"), "api");
        assert_eq!(repo_name("git@github.com:openshift/api.git"), "api");
        assert_eq!(repo_name("git@host:solo"), "solo");
        assert_eq!(repo_name(""), "unknown-repo");
    }

    #[test]
    fn lookback_is_clamped() {
        assert_eq!(clamp_lookback_days(0), 1);
        assert_eq!(clamp_lookback_days(-4), 1);
        assert_eq!(clamp_lookback_days(30), 30);
        assert_eq!(clamp_lookback_days(1000), 365);
    }

    #[test]
    fn window_is_half_open() {
        let until = Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap();
        let window = AnalysisWindow::ending_at(until, Duration::days(7));

        assert_eq!(window.since, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert!(window.contains(window.since));
        assert!(window.contains(until - Duration::seconds(1)));
        assert!(!window.contains(until));
        assert!(!window.contains(window.since - Duration::seconds(1)));
        assert_eq!(window.days(), 7);
    }
}

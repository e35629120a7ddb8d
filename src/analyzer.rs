// src/analyzer.rs

use crate::error::{AnalyzerError, ErrorKind, Result, CLONE_FAILED};
use crate::model::*;
use crate::narrative::NarrativeSource;
use chrono::{DateTime, TimeZone, Utc};
use git2::{Commit, Direction, DiffOptions, Remote, Repository, Sort};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];
pub const DEFAULT_MAX_DIFF_DELTAS: usize = 10_000;

/// Anything that can turn a repository URL into an activity summary
pub trait RepositoryAnalyzer: Send + Sync {
    fn analyze(&self, url: &str, branch: Option<&str>, window: &AnalysisWindow) -> Result<ActivitySummary>;

    /// Copy of this analyzer for one parallel job, isolated from the others
    fn for_job(&self, job: usize) -> Self
    where
        Self: Sized;
}

/// Lines touched by one commit against its first parent
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub deleted: usize,
}

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("diff touches {deltas} files (limit {limit})")]
    Oversized { deltas: usize, limit: usize },

    #[error("git2 error: {0}")]
    Git(#[from] git2::Error),
}

/// Clones repositories into a work directory and walks their history
#[derive(Clone)]
pub struct CommitHistoryAnalyzer {
    work_dir: PathBuf,
    max_diff_deltas: usize,
    narrative: Option<Arc<dyn NarrativeSource>>,
}

impl CommitHistoryAnalyzer {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            max_diff_deltas: DEFAULT_MAX_DIFF_DELTAS,
            narrative: None,
        }
    }

    #[must_use]
    pub fn with_max_diff_deltas(mut self, limit: usize) -> Self {
        self.max_diff_deltas = limit;
        self
    }

    #[must_use]
    pub fn with_narrative(mut self, source: Arc<dyn NarrativeSource>) -> Self {
        self.narrative = Some(source);
        self
    }

    /// Same settings, rooted in a subdirectory of the current work directory
    #[must_use]
    pub fn in_subdir(&self, name: &str) -> Self {
        Self {
            work_dir: self.work_dir.join(name),
            ..self.clone()
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn clone_repository(&self, url: &str) -> Result<(WorkingCopy, Repository)> {
        let path = self.work_dir.join(repo_name(url));
        let copy = WorkingCopy::prepare(path)?;

        info!("Cloning repository: {}", url);
        let repo = git2::build::RepoBuilder::new()
            .bare(self.narrative.is_none())
            .clone(url, &copy.path)
            .map_err(|e| {
                AnalyzerError::new(ErrorKind::VersionControl, CLONE_FAILED)
                    .with_source(e)
                    .with_context("repository", url)
                    .with_context("repo_path", copy.path.display())
            })?;
        Ok((copy, repo))
    }

    fn diff_stats(&self, repo: &Repository, commit: &Commit) -> std::result::Result<DiffStats, StatsError> {
        let tree = commit.tree()?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(commit.parent(0)?.tree()?),
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_filemode(true);

        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
        let deltas = diff.deltas().len();
        if deltas > self.max_diff_deltas {
            return Err(StatsError::Oversized {
                deltas,
                limit: self.max_diff_deltas,
            });
        }
        let stats = diff.stats()?;
        Ok(DiffStats {
            added: stats.insertions(),
            deleted: stats.deletions(),
        })
    }

    fn stats_or_zero(&self, repo: &Repository, commit: &Commit) -> DiffStats {
        self.diff_stats(repo, commit).unwrap_or_else(|e| {
            warn!("Failed to calculate stats for commit {}: {}", short_hash(commit), e);
            DiffStats::default()
        })
    }

    fn walk(&self, repo: &Repository, tip: &Commit, window: &AnalysisWindow) -> Result<Walk> {
        let vcs = |e: git2::Error| {
            AnalyzerError::new(ErrorKind::VersionControl, "failed to walk commit history").with_source(e)
        };

        let mut revwalk = repo.revwalk().map_err(vcs)?;
        revwalk.push(tip.id()).map_err(vcs)?;
        revwalk.set_sorting(Sort::TIME).map_err(vcs)?;

        let mut walk = Walk::default();
        let mut author_map: HashMap<String, usize> = HashMap::new();

        for oid in revwalk {
            let commit = repo.find_commit(oid.map_err(vcs)?).map_err(vcs)?;
            let committed = to_utc(commit.time().seconds());
            // Sort::TIME orders by committer time; a skewed child clock ends the walk here
            if committed < window.since {
                break;
            }
            if committed >= window.until {
                continue;
            }

            let record = commit_record(&commit, self.stats_or_zero(repo, &commit));
            let author_id = *author_map.entry(record.author.clone()).or_insert_with(|| {
                walk.authors.push((record.author.clone(), 0));
                walk.authors.len() - 1
            });
            walk.authors[author_id].1 += 1;
            walk.lines_changed += record.lines_changed();
            walk.commits.push(record);
        }
        Ok(walk)
    }

    /// List the branches of a remote without cloning it
    pub fn list_branches(&self, url: &str) -> Result<Vec<String>> {
        let mut remote = Remote::create_detached(url).map_err(|e| {
            AnalyzerError::new(ErrorKind::Validation, "invalid repository URL")
                .with_source(e)
                .with_context("repository", url)
        })?;
        remote.connect(Direction::Fetch).map_err(|e| {
            AnalyzerError::new(ErrorKind::Network, "failed to list remote branches")
                .with_source(e)
                .with_context("repository", url)
        })?;

        let heads = remote.list().map_err(|e| {
            AnalyzerError::new(ErrorKind::VersionControl, "failed to read remote references")
                .with_source(e)
                .with_context("repository", url)
        })?;
        let branches = heads
            .iter()
            .filter_map(|head| head.name().strip_prefix("refs/heads/"))
            .map(String::from)
            .collect();
        Ok(sort_branches(branches))
    }
}

impl RepositoryAnalyzer for CommitHistoryAnalyzer {
    fn analyze(&self, url: &str, branch: Option<&str>, window: &AnalysisWindow) -> Result<ActivitySummary> {
        let (copy, repo) = self.clone_repository(url)?;
        let (branch_name, tip) = resolve_branch(&repo, branch).map_err(|e| e.with_context("repository", url))?;

        info!(
            "Analyzing {} ({}) since {}",
            url,
            branch_name,
            window.since.format("%Y-%m-%d %H:%M:%S")
        );
        let walk = self.walk(&repo, &tip, window).map_err(|e| e.with_context("repository", url))?;

        let narrative = self
            .narrative
            .as_ref()
            .and_then(|source| source.generate(&copy.path, &branch_name, window));

        let latest_commit = match walk.commits.first() {
            Some(first) if first.short_hash == short_hash(&tip) => first.clone(),
            _ => commit_record(&tip, self.stats_or_zero(&repo, &tip)),
        };
        let contributors = rank_contributors(walk.authors);
        debug!("{}: {} commits by {} authors", url, walk.commits.len(), contributors.len());

        Ok(ActivitySummary {
            repository: url.to_string(),
            branch: branch_name,
            window: *window,
            latest_commit,
            total_commits: walk.commits.len(),
            total_lines_changed: walk.lines_changed,
            distinct_authors: contributors.len(),
            commits: walk.commits,
            contributors,
            narrative,
        })
    }

    fn for_job(&self, job: usize) -> Self {
        self.in_subdir(&format!("job-{}", job))
    }
}

#[derive(Default)]
struct Walk {
    commits: Vec<CommitRecord>,
    /// Authors in encounter order with their commit counts
    authors: Vec<(String, usize)>,
    lines_changed: usize,
}

/// Clone target that is removed again when dropped
struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    fn prepare(path: PathBuf) -> Result<Self> {
        let fs_err = |msg: &str, e: std::io::Error, path: &Path| {
            AnalyzerError::new(ErrorKind::FileSystem, msg)
                .with_source(e)
                .with_context("repo_path", path.display())
        };
        match fs::remove_dir_all(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(fs_err("failed to remove stale working copy", e, &path));
            }
            _ => {}
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| fs_err("failed to create work directory", e, parent))?;
        }
        Ok(Self { path })
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean up repository directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Resolve `branch` (or main/master) to its tip, preferring the local
/// branch over the remote-tracking one
fn resolve_branch<'r>(repo: &'r Repository, branch: Option<&str>) -> Result<(String, Commit<'r>)> {
    let candidates: Vec<&str> = match branch {
        Some(name) => vec![name],
        None => DEFAULT_BRANCHES.to_vec(),
    };

    for name in &candidates {
        for refname in [format!("refs/heads/{}", name), format!("refs/remotes/origin/{}", name)] {
            if let Ok(commit) = repo.find_reference(&refname).and_then(|r| r.peel_to_commit()) {
                debug!("Resolved branch {} via {}", name, refname);
                return Ok((name.to_string(), commit));
            }
        }
    }

    let err = match branch {
        Some(name) => AnalyzerError::new(ErrorKind::VersionControl, "branch not found").with_context("branch", name),
        None => AnalyzerError::new(ErrorKind::VersionControl, "failed to get main/master branch reference"),
    };
    Err(err)
}

/// Rank authors by commit count, descending; ties keep encounter order
pub fn rank_contributors(mut authors: Vec<(String, usize)>) -> Vec<ContributorRank> {
    authors.sort_by(|a, b| b.1.cmp(&a.1));
    authors
        .into_iter()
        .enumerate()
        .map(|(i, (author, commit_count))| ContributorRank {
            author,
            commit_count,
            rank: i + 1,
        })
        .collect()
}

/// `main`, `master`, then `release-*` newest first, then the rest
pub fn sort_branches(mut branches: Vec<String>) -> Vec<String> {
    fn group(name: &str) -> u8 {
        match name {
            "main" => 0,
            "master" => 1,
            n if n.starts_with("release-") => 2,
            _ => 3,
        }
    }

    branches.sort_by(|a, b| match group(a).cmp(&group(b)) {
        Ordering::Equal if group(a) == 2 => b.cmp(a),
        Ordering::Equal => a.cmp(b),
        other => other,
    });
    branches.dedup();
    branches
}

fn commit_record(commit: &Commit, stats: DiffStats) -> CommitRecord {
    let message = String::from_utf8_lossy(commit.message_bytes());
    let author = commit.author();
    CommitRecord {
        short_hash: short_hash(commit),
        message: message.trim().lines().next().unwrap_or_default().to_string(),
        author: author.name().unwrap_or("Unknown").to_string(),
        timestamp: to_utc(author.when().seconds()),
        lines_added: stats.added,
        lines_deleted: stats.deleted,
    }
}

fn short_hash(commit: &Commit) -> String {
    commit.id().to_string().chars().take(8).collect()
}

fn to_utc(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use git2::{Oid, Signature, Time};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Builds a repository on branch `main` with commits at given offsets
    struct Fixture {
        dir: TempDir,
        repo: Repository,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let repo = Repository::init(dir.path()).unwrap();
            repo.set_head("refs/heads/main").unwrap();
            Self {
                dir,
                repo,
                now: Utc::now(),
            }
        }

        fn url(&self) -> String {
            self.dir.path().to_str().unwrap().to_string()
        }

        fn commit(&self, author: &str, days_ago: i64, file: &str, content: &str, message: &str) -> Oid {
            std::fs::write(self.dir.path().join(file), content).unwrap();
            let mut index = self.repo.index().unwrap();
            index.add_path(Path::new(file)).unwrap();
            index.write().unwrap();
            let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();

            let when = (self.now - Duration::days(days_ago)).timestamp();
            let sig = Signature::new(author, "dev@example.com", &Time::new(when, 0)).unwrap();
            let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
            let parents: Vec<&Commit> = parent.iter().collect();
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
                .unwrap()
        }

        fn window(&self, days: i64) -> AnalysisWindow {
            AnalysisWindow::ending_at(self.now + Duration::seconds(1), Duration::days(days))
        }
    }

    fn analyzer() -> (TempDir, CommitHistoryAnalyzer) {
        let work = TempDir::new().unwrap();
        let analyzer = CommitHistoryAnalyzer::new(work.path());
        (work, analyzer)
    }

    #[test]
    fn summarizes_commits_inside_window() {
        let fx = Fixture::new();
        fx.commit("Old Timer", 30, "a.txt", "one\n", "ancient history");
        fx.commit("Alice", 3, "a.txt", "one\ntwo\nthree\n", "add lines\n\nlong body");
        fx.commit("Bob", 2, "b.txt", "x\n", "new file");
        fx.commit("Alice", 1, "a.txt", "one\n", "trim a");

        let (_work, analyzer) = analyzer();
        let summary = analyzer.analyze(&fx.url(), Some("main"), &fx.window(7)).unwrap();

        assert_eq!(summary.branch, "main");
        assert_eq!(summary.total_commits, 3);
        assert_eq!(summary.distinct_authors, 2);
        // +2, +1, -2
        assert_eq!(summary.total_lines_changed, 5);

        let messages: Vec<&str> = summary.commits.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["trim a", "new file", "add lines"]);
        assert_eq!(summary.commits[2].lines_added, 2);
        assert_eq!(summary.commits[0].lines_deleted, 2);
        assert!(summary.commits.iter().all(|c| c.short_hash.len() == 8));

        assert_eq!(summary.contributors[0].author, "Alice");
        assert_eq!(summary.contributors[0].commit_count, 2);
        assert_eq!(summary.contributors[0].rank, 1);
        assert_eq!(summary.contributors[1].author, "Bob");
        assert_eq!(summary.contributors[1].rank, 2);

        assert_eq!(summary.latest_commit, summary.commits[0]);
    }

    #[test]
    fn empty_window_still_reports_tip() {
        let fx = Fixture::new();
        fx.commit("Alice", 40, "a.txt", "a\n", "initial");
        fx.commit("Alice", 20, "a.txt", "b\n", "last change");

        let (_work, analyzer) = analyzer();
        let summary = analyzer.analyze(&fx.url(), None, &fx.window(7)).unwrap();

        assert_eq!(summary.total_commits, 0);
        assert!(summary.commits.is_empty());
        assert!(summary.contributors.is_empty());
        assert_eq!(summary.latest_commit.message, "last change");
        assert_eq!(summary.latest_commit.short_hash.len(), 8);
        assert_eq!(summary.latest_commit.lines_added, 1);
        assert_eq!(summary.latest_commit.lines_deleted, 1);
    }

    #[test]
    fn default_branch_falls_back_to_master() {
        let fx = Fixture::new();
        let oid = fx.commit("Alice", 1, "a.txt", "a\n", "on main");
        let commit = fx.repo.find_commit(oid).unwrap();
        fx.repo.branch("master", &commit, false).unwrap();
        fx.repo.set_head("refs/heads/master").unwrap();
        fx.repo.find_reference("refs/heads/main").unwrap().delete().unwrap();

        let (_work, analyzer) = analyzer();
        let summary = analyzer.analyze(&fx.url(), None, &fx.window(7)).unwrap();
        assert_eq!(summary.branch, "master");
    }

    #[test]
    fn non_default_branch_resolves_through_remote_tracking_ref() {
        let fx = Fixture::new();
        let oid = fx.commit("Alice", 2, "a.txt", "a\n", "base");
        let base = fx.repo.find_commit(oid).unwrap();
        fx.repo.branch("release-4.16", &base, false).unwrap();
        fx.commit("Bob", 1, "a.txt", "b\n", "main only");

        let (_work, analyzer) = analyzer();
        let summary = analyzer
            .analyze(&fx.url(), Some("release-4.16"), &fx.window(7))
            .unwrap();
        assert_eq!(summary.branch, "release-4.16");
        assert_eq!(summary.total_commits, 1);
        assert_eq!(summary.latest_commit.message, "base");
    }

    #[test]
    fn missing_branch_is_terminal() {
        let fx = Fixture::new();
        fx.commit("Alice", 1, "a.txt", "a\n", "only");

        let (_work, analyzer) = analyzer();
        let err = analyzer
            .analyze(&fx.url(), Some("does-not-exist"), &fx.window(7))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::VersionControl);
        assert_eq!(err.message, "branch not found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn clone_failure_is_retryable_and_cleans_up() {
        let (work, analyzer) = analyzer();
        let missing = work.path().join("nowhere").join("repo.git");
        let err = analyzer
            .analyze(missing.to_str().unwrap(), None, &AnalysisWindow::lookback(7))
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::VersionControl);
        assert_eq!(err.message, CLONE_FAILED);
        assert!(err.is_retryable());
        assert!(!work.path().join("repo").exists());
    }

    #[test]
    fn working_copy_is_removed_after_success() {
        let fx = Fixture::new();
        fx.commit("Alice", 1, "a.txt", "a\n", "only");

        let (work, analyzer) = analyzer();
        analyzer.analyze(&fx.url(), None, &fx.window(7)).unwrap();
        let name = repo_name(&fx.url()).to_string();
        assert!(!work.path().join(name).exists());
    }

    #[test]
    fn oversized_diffs_count_as_zero_lines() {
        let fx = Fixture::new();
        fx.commit("Alice", 1, "a.txt", "1\n2\n3\n", "big");

        let (_work, analyzer) = analyzer();
        let summary = analyzer
            .with_max_diff_deltas(0)
            .analyze(&fx.url(), None, &fx.window(7))
            .unwrap();
        assert_eq!(summary.total_commits, 1);
        assert_eq!(summary.total_lines_changed, 0);
        assert_eq!(summary.commits[0].author, "Alice");
    }

    struct Recorder(Mutex<Vec<(bool, String)>>);

    impl NarrativeSource for Recorder {
        fn generate(&self, repo_path: &Path, branch: &str, _window: &AnalysisWindow) -> Option<String> {
            let has_tree = repo_path.join("a.txt").exists();
            self.0.lock().unwrap().push((has_tree, branch.to_string()));
            Some("narrated".to_string())
        }
    }

    #[test]
    fn narrative_runs_against_checked_out_copy() {
        let fx = Fixture::new();
        fx.commit("Alice", 1, "a.txt", "a\n", "only");

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let (_work, analyzer) = analyzer();
        let summary = analyzer
            .with_narrative(recorder.clone())
            .analyze(&fx.url(), None, &fx.window(7))
            .unwrap();

        assert_eq!(summary.narrative.as_deref(), Some("narrated"));
        assert_eq!(*recorder.0.lock().unwrap(), vec![(true, "main".to_string())]);
    }

    #[test]
    fn lists_remote_branches_in_priority_order() {
        let fx = Fixture::new();
        let oid = fx.commit("Alice", 1, "a.txt", "a\n", "only");
        let commit = fx.repo.find_commit(oid).unwrap();
        for name in ["feature-x", "release-4.9", "release-4.10", "master"] {
            fx.repo.branch(name, &commit, false).unwrap();
        }

        let (_work, analyzer) = analyzer();
        let branches = analyzer.list_branches(&fx.url()).unwrap();
        assert_eq!(
            branches,
            vec!["main", "master", "release-4.9", "release-4.10", "feature-x"]
        );
    }

    #[test]
    fn branch_sort_orders_groups() {
        let sorted = sort_branches(
            ["zeta", "release-1.0", "master", "alpha", "release-2.0", "main"]
                .map(String::from)
                .to_vec(),
        );
        assert_eq!(
            sorted,
            vec!["main", "master", "release-2.0", "release-1.0", "alpha", "zeta"]
        );
    }

    #[test]
    fn ranking_is_stable_for_ties() {
        let ranked = rank_contributors(vec![
            ("carol".to_string(), 1),
            ("alice".to_string(), 3),
            ("bob".to_string(), 1),
        ]);
        let order: Vec<(&str, usize)> = ranked.iter().map(|r| (r.author.as_str(), r.rank)).collect();
        assert_eq!(order, vec![("alice", 1), ("carol", 2), ("bob", 3)]);
    }
}

// src/narrative.rs

//! Optional release-notes narratives from tools installed on the host.
//! Every failure path yields `None` so the plain report is always produced.

use crate::model::AnalysisWindow;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Shorter output is treated as a tool error message rather than notes
const MIN_NARRATIVE_LEN: usize = 50;

pub trait NarrativeSource: Send + Sync {
    fn generate(&self, repo_path: &Path, branch: &str, window: &AnalysisWindow) -> Option<String>;
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NarrativeTool {
    /// Plain report only
    None,
    /// `vibe-tools release-notes`
    VibeTools,
    /// `cursor-agent vibe-tools release-notes`
    CursorAgent,
}

/// An external release-notes generator
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: String,
    leading_args: Vec<String>,
}

impl ExternalTool {
    pub fn vibe_tools() -> Self {
        Self {
            program: "vibe-tools".to_string(),
            leading_args: Vec::new(),
        }
    }

    pub fn cursor_agent() -> Self {
        Self {
            program: "cursor-agent".to_string(),
            leading_args: vec!["vibe-tools".to_string()],
        }
    }

    pub fn for_tool(tool: NarrativeTool) -> Option<Self> {
        match tool {
            NarrativeTool::None => None,
            NarrativeTool::VibeTools => Some(Self::vibe_tools()),
            NarrativeTool::CursorAgent => Some(Self::cursor_agent()),
        }
    }

    /// Location of the program on `PATH`, if installed
    pub fn locate(&self) -> Option<PathBuf> {
        find_program(&self.program)
    }

    fn run(&self, program: &Path, repo_path: &Path, branch: &str, since: Option<&str>) -> Option<String> {
        let mut cmd = Command::new(program);
        cmd.args(&self.leading_args)
            .arg("release-notes")
            .arg("--repo")
            .arg(repo_path)
            .arg("--branch")
            .arg(branch)
            .current_dir(repo_path);
        if let Some(since) = since {
            cmd.arg("--since").arg(since);
        }

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                debug!("{} could not be started: {}", self.program, e);
                return None;
            }
        };
        if !output.status.success() {
            debug!("{} exited with {}", self.program, output.status);
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (text.len() >= MIN_NARRATIVE_LEN).then_some(text)
    }
}

/// First `PATH` entry containing `program`
pub(crate) fn find_program(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

impl NarrativeSource for ExternalTool {
    fn generate(&self, repo_path: &Path, branch: &str, window: &AnalysisWindow) -> Option<String> {
        let Some(program) = self.locate() else {
            info!("{} not found, falling back to basic release notes", self.program);
            return None;
        };

        let since = window.since.format("%Y-%m-%d").to_string();
        self.run(&program, repo_path, branch, Some(&since)).or_else(|| {
            info!("{} with date range failed, trying without date filter", self.program);
            self.run(&program, repo_path, branch, None)
        })
    }
}

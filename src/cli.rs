// src/cli.rs

use crate::catalog::DEFAULT_INDEX_IMAGE;
use crate::model::clamp_lookback_days;
use crate::narrative::NarrativeTool;
use crate::pipeline::{PipelineConfig, DEFAULT_LOOKBACK_DAYS};
use crate::renderer::{ReportFormatter, DEFAULT_MAX_COMMITS, DEFAULT_MAX_CONTRIBUTORS};
use crate::retry::DEFAULT_MAX_RETRIES;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Catalog index document listing the repositories to analyze
    #[arg(short, long, env = "INDEX_FILE", default_value = "index.json")]
    pub index_file: PathBuf,

    /// Operator index image rendered with `opm` when the index file is missing
    #[arg(long, env = "INDEX_IMAGE", default_value = DEFAULT_INDEX_IMAGE)]
    pub index_image: String,

    /// Directory used for temporary clones
    #[arg(short, long, env = "WORK_DIR", default_value = "temp-repos")]
    pub work_dir: PathBuf,

    /// Directory for the generated report when --output is not given
    #[arg(long, env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Report file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Branch to analyze (default: main, then master)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Size of the lookback window, in days (1-365)
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    pub days: i64,

    /// Retries for transient clone and network failures
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_CONTRIBUTORS)]
    pub max_contributors: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_COMMITS)]
    pub max_commits: usize,

    /// Repositories analyzed concurrently, each in its own work subdirectory
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// External release-notes generator, used only if installed
    #[arg(long, value_enum, default_value_t = NarrativeTool::None)]
    pub narrative: NarrativeTool,

    /// Print the branches of this repository and exit
    #[arg(long, value_name = "URL")]
    pub list_branches: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum Format {
    /// Plain-text release notes
    Text,
    /// Versioned JSON document
    Json,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            work_dir: self.work_dir.clone(),
            branch: self.branch.clone(),
            lookback_days: clamp_lookback_days(self.days),
            max_retries: self.max_retries,
            jobs: self.jobs,
            narrative: self.narrative,
            formatter: ReportFormatter {
                max_contributors: self.max_contributors,
                max_commits: self.max_commits,
            },
            ..PipelineConfig::default()
        }
    }

    /// `--output`, or a timestamped file inside `--output-dir`
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let extension = match self.format {
                Format::Text => "txt",
                Format::Json => "json",
            };
            let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
            self.output_dir
                .join(format!("release-notes-{}.{}", stamp, extension))
        })
    }
}

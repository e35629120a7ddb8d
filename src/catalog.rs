// src/catalog.rs

//! Renders a catalog index document from an operator index image with
//! `opm render` when no document exists yet.

use crate::error::{AnalyzerError, ErrorKind, Result};
use crate::narrative::find_program;
use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

pub const DEFAULT_INDEX_IMAGE: &str = "quay.io/prega/prega-operator-index:v4.21";

#[derive(Debug, Clone)]
pub struct CatalogRenderer {
    program: String,
}

impl Default for CatalogRenderer {
    fn default() -> Self {
        Self::with_program("opm")
    }
}

impl CatalogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Render `image` into `path` unless `path` already exists.
    /// Returns whether a new document was written.
    pub fn ensure(&self, image: &str, path: &Path) -> Result<bool> {
        if path.exists() {
            debug!("Using existing index file {}", path.display());
            return Ok(false);
        }
        info!("Index file {} not found, rendering it from {}", path.display(), image);
        self.render(image, path)?;
        Ok(true)
    }

    /// Write the JSON rendering of `image` to `path`
    pub fn render(&self, image: &str, path: &Path) -> Result<()> {
        let program = find_program(&self.program).ok_or_else(|| {
            AnalyzerError::new(ErrorKind::Validation, "opm command not found in PATH")
                .with_context("program", &self.program)
        })?;
        debug!("Found {} at {}", self.program, program.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AnalyzerError::new(ErrorKind::FileSystem, "failed to create index directory")
                    .with_source(e)
                    .with_context("file_path", parent.display())
            })?;
        }
        let output = File::create(path).map_err(|e| {
            AnalyzerError::new(ErrorKind::FileSystem, "failed to create index file")
                .with_source(e)
                .with_context("file_path", path.display())
        })?;

        debug!("Executing: {} render {} --output=json > {}", self.program, image, path.display());
        let status = Command::new(&program)
            .arg("render")
            .arg(image)
            .arg("--output=json")
            .stdout(Stdio::from(output))
            .stderr(Stdio::inherit())
            .status();

        let failure = match status {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => AnalyzerError::new(ErrorKind::Validation, "failed to render index image")
                .with_context("status", status),
            Err(e) => AnalyzerError::new(ErrorKind::Validation, "failed to render index image").with_source(e),
        };
        let _ = fs::remove_file(path);
        Err(failure
            .with_context("index_image", image)
            .with_context("file_path", path.display()))
    }
}

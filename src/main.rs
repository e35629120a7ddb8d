// src/main.rs

use anyhow::Context;
use clap::Parser;
use repo_pulse::cli::{Args, Format};
use repo_pulse::{CatalogRenderer, Pipeline, RepositoryRef};
use std::fs;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);
    let start_time = Instant::now();

    let config = args.pipeline_config();
    let pipeline = Pipeline::new(&config);

    if let Some(url) = &args.list_branches {
        for branch in pipeline.list_branches(url)? {
            println!("{}", branch);
        }
        return Ok(());
    }

    let generated = CatalogRenderer::new()
        .ensure(&args.index_image, &args.index_file)
        .with_context(|| format!("could not generate index file from {}", args.index_image))?;

    let repositories = pipeline
        .extract_repositories(&args.index_file)
        .with_context(|| format!("could not read repositories from {}", args.index_file.display()))?;

    println!("Unique repository URLs:");
    for repository in &repositories {
        println!("{}", repository);
    }

    let output = args.output_path();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create output directory {}", parent.display()))?;
    }

    let urls: Vec<&str> = repositories.iter().map(RepositoryRef::as_str).collect();
    let report = pipeline.process_all(&urls);

    let rendered = match args.format {
        Format::Text => report.render_text(pipeline.formatter()),
        Format::Json => report.render_json()?,
    };
    fs::write(&output, rendered).with_context(|| format!("could not write report to {}", output.display()))?;

    if config.work_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&config.work_dir) {
            warn!("Failed to remove work directory {}: {}", config.work_dir.display(), e);
        }
    }

    if generated {
        if let Err(e) = fs::remove_file(&args.index_file) {
            warn!("Failed to remove generated index file {}: {}", args.index_file.display(), e);
        }
    }

    let summary = report.summary();
    info!("Release notes written to {}", output.display());
    println!(
        "Processed {} repositories ({} succeeded, {} failed) in {:.2?}. Report: {}",
        summary.total,
        summary.succeeded,
        summary.failed,
        start_time.elapsed(),
        output.display()
    );
    Ok(())
}

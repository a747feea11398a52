//! CLI entry point for wgpu-codegen.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// wgpu-codegen: regenerate and check the wgpu Python API from webgpu.idl and wgpu.h.
#[derive(Parser, Debug)]
#[command(name = "wgpu-codegen", version, about)]
struct Cli {
    /// Path to the codegen.toml configuration file.
    #[arg(default_value = "codegen.toml")]
    config: PathBuf,

    /// Log per-declaration parse diagnostics.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "wgpu_codegen=debug" } else { "wgpu_codegen=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let summary = wgpu_codegen::run(&cli.config)?;
    tracing::info!(
        generated = summary.generated.len(),
        patched = summary.patched.len(),
        report = %summary.report.display(),
        "codegen finished"
    );
    Ok(())
}

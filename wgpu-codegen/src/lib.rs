//! wgpu-codegen: keeps the wgpu Python binding in sync with `webgpu.idl`
//! and `wgpu.h`.
//!
//! One run parses both descriptors, cross-checks them, regenerates
//! `flags.py`, `enums.py` and `_mappings.py`, and refreshes the marker
//! comments and signatures in the hand-written API modules. Everything worth
//! reading ends up in a markdown report that is kept under version control.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let summary = wgpu_codegen::run(Path::new("codegen.toml")).unwrap();
//! println!("report written to {}", summary.report.display());
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub mod config;
pub mod emit;
pub mod error;
pub mod format;
pub mod header;
pub mod idl;
pub mod model;
pub mod patch;
pub mod reconcile;
pub mod report;
mod scan;

use format::{Formatter, Layout};
use report::Report;

/// What a run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// Generated modules, in the order they were written.
    pub generated: Vec<PathBuf>,
    /// Hand-written modules that were patched.
    pub patched: Vec<PathBuf>,
    pub report: PathBuf,
    /// Every report line, as written to the report file.
    pub lines: Vec<String>,
}

/// Run the full pipeline for the `codegen.toml` at `config_path`.
///
/// Relative paths in the config resolve against the config file's directory.
pub fn run(config_path: &Path) -> Result<RunSummary> {
    let cfg = config::load_config(config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    run_from_config(&cfg, base_dir)
}

/// Run the pipeline with an already-loaded [`config::Config`].
pub fn run_from_config(cfg: &config::Config, base_dir: &Path) -> Result<RunSummary> {
    let out_dir = cfg.output_dir(base_dir);
    let report_path = out_dir.join(&cfg.output.report);
    let mut report = Report::create(&report_path)?;
    let formatter = format::from_config(&cfg.format);

    info!(
        idl = %cfg.input.idl.display(),
        header = %cfg.input.header.display(),
        patch_targets = cfg.patch.len(),
        "loaded configuration"
    );

    report.line("# wgpu-py codegen report")?;
    report.line(format!("Running {}", env!("CARGO_PKG_NAME")))?;

    // Parse descriptors
    let idl_path = base_dir.join(&cfg.input.idl);
    let idl_src = std::fs::read_to_string(&idl_path)
        .with_context(|| format!("reading IDL from {}", idl_path.display()))?;
    let idl = idl::parse(&idl_src, &idl_path.display().to_string(), &cfg.naming.idl_prefix)?;

    let header_path = base_dir.join(&cfg.input.header);
    let header_src = std::fs::read_to_string(&header_path)
        .with_context(|| format!("reading header from {}", header_path.display()))?;
    let native = header::parse(
        &header_src,
        &header_path.display().to_string(),
        &cfg.naming.native_prefix,
    )?;

    let table = reconcile::reconcile(&native, &idl, &cfg.reconcile, &mut report)?;

    // Generated modules
    report.heading(2, "Generate API code")?;
    let layout = Layout::Standard {
        line_width: cfg.format.line_width,
    };
    let outputs = [
        (&cfg.output.flags, emit::flags_module(&idl)),
        (&cfg.output.enums, emit::enums_module(&idl)),
        (
            &cfg.output.mappings,
            emit::mappings_module(&table, &native, &idl, &cfg.naming.native_prefix),
        ),
    ];
    let mut generated = Vec::with_capacity(outputs.len());
    for (name, src) in outputs {
        let path = out_dir.join(name);
        write_formatted(formatter.as_ref(), &path, &src, layout)?;
        report.line(format!("Written to {}", name.display()))?;
        generated.push(path);
    }

    // Hand-written modules
    report.heading(2, "Checking and patching hand-written API code")?;
    let patcher = patch::Patcher {
        idl: &idl,
        formatter: formatter.as_ref(),
        prefix: &cfg.naming.idl_prefix,
        line_width: cfg.format.line_width,
    };
    let mut patched = Vec::with_capacity(cfg.patch.len());
    for target in &cfg.patch {
        let path = out_dir.join(&target.file);
        let label = target.file.display().to_string();
        patcher.patch_file(&path, &label, target.echo_idl, &mut report)?;
        patched.push(path);
    }

    let lines = report
        .finish()
        .with_context(|| format!("closing report {}", report_path.display()))?;
    info!(
        path = %report_path.display(),
        lines = lines.len(),
        "wrote report"
    );

    Ok(RunSummary {
        generated,
        patched,
        report: report_path,
        lines,
    })
}

fn write_formatted(
    formatter: &dyn Formatter,
    path: &Path,
    src: &str,
    layout: Layout,
) -> Result<()> {
    let code = formatter
        .format(src, layout)
        .with_context(|| format!("formatting {}", path.display()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    std::fs::write(path, &code).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), size = code.len(), "wrote generated module");
    Ok(())
}

//! Configuration types for `codegen.toml`.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Hand-written sources to check and patch, in order.
    #[serde(default)]
    pub patch: Vec<PatchConfig>,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub format: FormatConfig,
}

/// Descriptor files, relative to the config file.
#[derive(Debug, Deserialize)]
pub struct InputConfig {
    pub idl: PathBuf,
    pub header: PathBuf,
}

/// Generated files. `dir` is relative to the config file; everything else
/// is relative to `dir`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub flags: PathBuf,
    pub enums: PathBuf,
    pub mappings: PathBuf,
    pub report: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            flags: PathBuf::from("flags.py"),
            enums: PathBuf::from("enums.py"),
            mappings: PathBuf::from("_mappings.py"),
            report: PathBuf::from("resources/codegen_report.md"),
        }
    }
}

/// A hand-maintained source file to patch.
#[derive(Debug, Deserialize)]
pub struct PatchConfig {
    /// Path relative to the output directory (e.g. `backend/rs.py`).
    pub file: PathBuf,
    /// Also inject an `# IDL:` line echoing the IDL declaration.
    #[serde(default)]
    pub echo_idl: bool,
}

/// Namespace prefixes stripped from descriptor names.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Prefix of IDL definitions and of Python class names (`GPU`).
    pub idl_prefix: String,
    /// Prefix of header declarations (`WGPU`).
    pub native_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            idl_prefix: "GPU".to_string(),
            native_prefix: "WGPU".to_string(),
        }
    }
}

/// Struct comparison rules.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Normalized header field names left out of the comparison.
    pub native_ignored_fields: Vec<String>,
    /// Lower-cased IDL field names left out of the comparison.
    pub idl_ignored_fields: Vec<String>,
    /// Suffix of the length half of `(pointer, length)` field pairs.
    pub length_suffix: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            native_ignored_fields: vec!["todo".to_string()],
            idl_ignored_fields: vec!["label".to_string()],
            length_suffix: "_length".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatEngine {
    /// In-process formatter.
    Builtin,
    /// External `black` process.
    Black,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub engine: FormatEngine,
    pub line_width: usize,
    /// Executable used when `engine = "black"`.
    pub program: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            engine: FormatEngine::Builtin,
            line_width: 88,
            program: "black".to_string(),
        }
    }
}

impl Config {
    pub fn output_dir(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.output.dir)
    }
}

/// Load and parse a `codegen.toml` configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Parse configuration text.
pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

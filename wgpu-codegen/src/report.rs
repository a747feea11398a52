//! The codegen report: every diagnostic goes to stdout and to a markdown file
//! kept under version control, in the same order.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

/// Collector for report lines.
///
/// Lines whose text starts with `#` (after leading whitespace) are markdown
/// headings and are written to the file as-is; every other line becomes a
/// `* ` bullet.
pub struct Report {
    sink: Option<Box<dyn Write>>,
    echo: bool,
    lines: Vec<String>,
}

impl Report {
    /// Create (or truncate) the report file at `path` and echo to stdout.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        Ok(Self {
            sink: Some(Box::new(BufWriter::new(file))),
            echo: true,
            lines: Vec::new(),
        })
    }

    /// A report that only keeps lines in memory.
    pub fn capture() -> Self {
        Self {
            sink: None,
            echo: false,
            lines: Vec::new(),
        }
    }

    /// Append one line (or several, if `text` contains newlines).
    pub fn line(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        for raw in text.as_ref().split('\n') {
            if self.echo {
                println!("{raw}");
            }
            let formatted = if raw.trim().is_empty() || raw.trim_start().starts_with('#') {
                raw.to_string()
            } else {
                format!("* {raw}")
            };
            if let Some(sink) = self.sink.as_mut() {
                writeln!(sink, "{formatted}")?;
                sink.flush()?;
            }
            self.lines.push(formatted);
        }
        Ok(())
    }

    /// Start a new section: a blank line followed by the heading.
    pub fn heading(&mut self, level: usize, title: &str) -> io::Result<()> {
        self.line(format!("\n{} {title}", "#".repeat(level)))
    }

    /// Every line written so far, as it appears in the report file.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Flush and close the report file.
    pub fn finish(mut self) -> io::Result<Vec<String>> {
        if let Some(mut sink) = self.sink.take() {
            sink.flush()?;
        }
        Ok(self.lines)
    }
}

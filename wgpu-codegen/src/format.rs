//! Python source formatting.
//!
//! The patcher scans signatures line by line, so it first asks for a
//! [`Layout::SingleLine`] rendering where every `def`/`class` header sits on
//! one line. Everything that is written back goes through
//! [`Layout::Standard`].

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::config::{FormatConfig, FormatEngine};
use crate::error::FormatError;
use crate::scan::{bracket_balance, matching_close, split_top_level, triple_quoted};

/// Line width handed to `black` for the single-line layout.
const UNBOUNDED_WIDTH: usize = 9_999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Normal output, long signatures wrapped at `line_width`.
    Standard { line_width: usize },
    /// Every signature on a single line.
    SingleLine,
}

pub trait Formatter {
    fn format(&self, src: &str, layout: Layout) -> Result<String, FormatError>;
}

/// Build the formatter selected in the config.
pub fn from_config(cfg: &FormatConfig) -> Box<dyn Formatter> {
    match cfg.engine {
        FormatEngine::Builtin => Box::new(Builtin),
        FormatEngine::Black => Box::new(Black {
            program: cfg.program.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// black
// ---------------------------------------------------------------------------

/// Runs `black -l <width> -` as a blocking subprocess.
pub struct Black {
    pub program: String,
}

impl Formatter for Black {
    fn format(&self, src: &str, layout: Layout) -> Result<String, FormatError> {
        let width = match layout {
            Layout::Standard { line_width } => line_width,
            Layout::SingleLine => UNBOUNDED_WIDTH,
        };
        let spawn_err = |err| FormatError::Spawn {
            program: self.program.clone(),
            err,
        };

        let mut child = Command::new(&self.program)
            .args(["-l", &width.to_string(), "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        // Feed stdin from a thread so a large output cannot fill the stdout
        // pipe while we are still writing.
        let stdin = child.stdin.take();
        let input = src.to_owned();
        let writer = std::thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(input.as_bytes()),
            None => Ok(()),
        });
        let output = child.wait_with_output().map_err(spawn_err)?;

        let writer = writer
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));

        // A formatter that gives up early closes stdin, so its own complaint
        // takes precedence over the broken pipe.
        let log = String::from_utf8_lossy(&output.stderr);
        debug!(program = %self.program, width, log = %log.trim(), "formatter finished");
        if log.to_lowercase().contains("error") || !output.status.success() {
            return Err(FormatError::Reported {
                program: self.program.clone(),
                log: log.into_owned(),
            });
        }
        writer.map_err(spawn_err)?;

        let result = String::from_utf8(output.stdout).map_err(|_| FormatError::Encoding {
            program: self.program.clone(),
        })?;
        Ok(match layout {
            Layout::SingleLine => join_split_headers(&result),
            Layout::Standard { .. } => result,
        })
    }
}

// ---------------------------------------------------------------------------
// Builtin
// ---------------------------------------------------------------------------

/// Deterministic in-process formatter.
///
/// It only touches what the codegen depends on: trailing whitespace, blank
/// line runs, the final newline and the layout of `def`/`class` headers.
/// Function bodies pass through unchanged, and so does everything inside a
/// triple-quoted string.
pub struct Builtin;

impl Formatter for Builtin {
    fn format(&self, src: &str, layout: Layout) -> Result<String, FormatError> {
        let lines = source_lines(src);
        let lines = match layout {
            Layout::SingleLine => join_headers(lines),
            Layout::Standard { line_width } => lines
                .into_iter()
                .flat_map(|line| {
                    if line.in_string {
                        return vec![line];
                    }
                    split_header(line.text, line_width)
                        .into_iter()
                        .map(SourceLine::code)
                        .collect()
                })
                .collect(),
        };
        Ok(normalize_blank_lines(lines))
    }
}

/// Black keeps a signature split when it carries a magic trailing comma, even
/// at unbounded width.
fn join_split_headers(src: &str) -> String {
    normalize_blank_lines(join_headers(source_lines(src)))
}

struct SourceLine {
    text: String,
    /// Starts inside a triple-quoted string; never reformatted.
    in_string: bool,
}

impl SourceLine {
    fn code(text: String) -> Self {
        SourceLine {
            text,
            in_string: false,
        }
    }
}

/// Split `src` into lines, trimming trailing whitespace except where it
/// belongs to a string literal.
fn source_lines(src: &str) -> Vec<SourceLine> {
    let raw: Vec<&str> = src.lines().collect();
    raw.iter()
        .zip(triple_quoted(&raw))
        .map(|(line, state)| SourceLine {
            text: if state.ends_inside {
                line.to_string()
            } else {
                line.trim_end().to_string()
            },
            in_string: state.starts_inside,
        })
        .collect()
}

fn is_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("def ")
        || trimmed.starts_with("async def ")
        || trimmed.starts_with("class ")
}

/// Merge every header whose brackets span several lines into one line.
fn join_headers(lines: Vec<SourceLine>) -> Vec<SourceLine> {
    let mut out = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter();
    while let Some(line) = iter.next() {
        let mut depth = bracket_balance(&line.text);
        if line.in_string || !is_header(&line.text) || depth <= 0 {
            out.push(line);
            continue;
        }
        let mut joined = line.text;
        for next in iter.by_ref() {
            depth += bracket_balance(&next.text);
            let piece = next.text.trim();
            if piece.is_empty() || piece.starts_with('#') {
                // nothing
            } else if piece.starts_with(')') || piece.starts_with(']') {
                if joined.ends_with(',') {
                    joined.pop();
                }
                joined.push_str(piece);
            } else if joined.ends_with('(') || joined.ends_with('[') {
                joined.push_str(piece);
            } else {
                joined.push(' ');
                joined.push_str(piece);
            }
            if depth <= 0 {
                break;
            }
        }
        out.push(SourceLine::code(joined));
    }
    out
}

/// Wrap a single-line `def` header longer than `width` the way black does:
/// arguments on one indented line if they fit, otherwise one per line with
/// a trailing comma.
fn split_header(line: String, width: usize) -> Vec<String> {
    let trimmed = line.trim_start();
    let is_def = trimmed.starts_with("def ") || trimmed.starts_with("async def ");
    if !is_def || line.chars().count() <= width || bracket_balance(&line) != 0 {
        return vec![line];
    }
    let Some(open) = line.find('(') else {
        return vec![line];
    };
    let Some(close) = matching_close(&line, open) else {
        return vec![line];
    };
    let args = line[open + 1..close].trim();
    if args.is_empty() {
        return vec![line];
    }

    let indent = &line[..line.len() - trimmed.len()];
    let inner = format!("{indent}    ");
    let head = line[..=open].to_string();
    let tail = format!("{indent}{}", &line[close..]);

    if inner.len() + args.chars().count() <= width {
        return vec![head, format!("{inner}{args}"), tail];
    }
    let mut out = vec![head];
    out.extend(
        split_top_level(args, ',')
            .into_iter()
            .map(|arg| format!("{inner}{arg},")),
    );
    out.push(tail);
    out
}

/// At most two consecutive blank lines, none at the start, exactly one
/// newline at the end. Blank lines inside strings are content.
fn normalize_blank_lines(lines: Vec<SourceLine>) -> String {
    let mut out = String::new();
    let mut blanks = 0;
    let mut started = false;
    for SourceLine { text: line, in_string } in lines {
        if line.is_empty() && !in_string {
            blanks += 1;
            continue;
        }
        if started {
            for _ in 0..blanks.min(2) {
                out.push('\n');
            }
        }
        blanks = 0;
        started = true;
        out.push_str(&line);
        out.push('\n');
    }
    out
}

//! Typed failures that abort a codegen run.

use thiserror::Error;

/// Descriptor syntax the parsers cannot tolerate.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file}:{line}: unterminated {what}")]
    Unterminated {
        file: String,
        line: usize,
        what: &'static str,
    },
    #[error("{file}:{line}:{column}: {message}")]
    Syntax {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("{file}:{line}: struct `{name}` declares no fields")]
    EmptyStruct {
        file: String,
        line: usize,
        name: String,
    },
}

/// The source formatter failed; its message is surfaced verbatim.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to run formatter `{program}`: {err}")]
    Spawn {
        program: String,
        #[source]
        err: std::io::Error,
    },
    #[error("formatter `{program}` reported an error:\n{log}")]
    Reported { program: String, log: String },
    #[error("formatter `{program}` produced non-UTF-8 output")]
    Encoding { program: String },
}

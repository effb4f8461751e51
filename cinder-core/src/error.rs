use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the compilation pipeline.
///
/// The user-facing variants (`Lex`, `Parse`, `Type`, cycle errors) carry a
/// fully rendered message: `file:line:col:` prefix plus the source context
/// block produced by [`crate::diag`]. Compilation is fail-fast, so the first
/// of these aborts the run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("unsupported source file `{0}`, expected a .cdr file")]
    UnsupportedFormat(String),
    #[error("module `{module}` was not found in any search path ({searched:?})")]
    MissingModule { module: String, searched: Vec<PathBuf> },
    #[error("{message}")]
    Lex { message: String },
    #[error("{message}")]
    Parse { message: String },
    #[error("{message}")]
    Type { message: String },
    #[error("warning treated as error: {message}")]
    Warning { message: String },
    #[error("import cycle: {message}")]
    ImportCycle { message: String },
    #[error("struct definition cycle: {message}")]
    StructCycle { message: String },
}

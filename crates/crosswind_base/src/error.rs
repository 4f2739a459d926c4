//! Located compiler errors.
//!
//! All failures in the frontend are fatal to their phase and surface as
//! a single [`CompileError`]: a phase taxonomy kind, a [`SrcLoc`], and a
//! human-readable message. There is no recovery; the first error unwinds
//! through `Result` to the driver.

use crate::intern::Interner;
use crate::srcloc::SrcLoc;
use std::fmt;

/// Which phase rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed s-expression, unknown field, surplus tokens, truncated file.
    Parse,
    /// Missing module file, non-terminating import fixed point, module cycle.
    Import,
    /// Unresolved id, duplicate global, shadowed local, non-public access.
    Symbol,
    /// Unknown macro, nesting exceeded, bad macro argument.
    Macro,
    /// Arity mismatch, incompatible types, bad lhs, unknown field,
    /// un-dispatchable polymorphic call, undefined array dimension.
    Type,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Import => "import",
            ErrorKind::Symbol => "symbol",
            ErrorKind::Macro => "macro",
            ErrorKind::Type => "type",
        }
    }
}

/// An error annotated with its phase and source location.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub loc: SrcLoc,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, loc: SrcLoc, message: impl Into<String>) -> Self {
        Self {
            kind,
            loc,
            message: message.into(),
        }
    }

    /// Full rendering with the file path resolved, for the driver.
    pub fn render(&self, interner: &Interner) -> String {
        format!(
            "{} error at {}: {}",
            self.kind.as_str(),
            self.loc.render(interner),
            self.message
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error at line {}: {}",
            self.kind.as_str(),
            self.loc.line,
            self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// Alias used as the return type of every fallible frontend operation.
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn display_shows_kind_and_line() {
        let err = CompileError::new(
            ErrorKind::Symbol,
            SrcLoc::new(crate::Sym::NONE, 9),
            "cannot resolve `foo`",
        );
        let text = err.to_string();
        assert!(text.contains("symbol error"));
        assert!(text.contains("line 9"));
        assert!(text.contains("foo"));
    }

    #[test]
    fn render_resolves_file() {
        let mut interner = Interner::new();
        let loc = SrcLoc::new(interner.intern("a/b.cw"), 4);
        let err = CompileError::new(ErrorKind::Type, loc, "mismatch");
        assert_eq!(err.render(&interner), "type error at a/b.cw:4: mismatch");
    }
}

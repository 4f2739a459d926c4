//! Source locations.
//!
//! Every AST node and every error carries a [`SrcLoc`]: an interned file
//! path plus a 1-based line number. Locations are `Copy` and cheap to
//! store per node; rendering to `file:line` goes through the
//! [`Interner`](crate::Interner) that interned the path.

use crate::intern::{Interner, Sym};

/// A file/line position in crosswind source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SrcLoc {
    /// Interned path of the source file.
    pub file: Sym,
    /// 1-based line number; 0 means "no location".
    pub line: u32,
}

impl SrcLoc {
    pub fn new(file: Sym, line: u32) -> Self {
        Self { file, line }
    }

    /// A location that points nowhere, for synthesized nodes.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn render(&self, interner: &Interner) -> String {
        let file = interner.resolve(self.file);
        if file.is_empty() {
            format!("line {}", self.line)
        } else {
            format!("{}:{}", file, self.line)
        }
    }
}

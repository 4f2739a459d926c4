//! String interning.
//!
//! The frontend stores every source file path exactly once and passes
//! around [`Sym`] handles instead. Handles are `Copy`, compare in O(1),
//! and resolve back to `&str` through the owning [`Interner`].

use std::collections::HashMap;

/// Handle to an interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Sym(u32);

impl Sym {
    /// The empty string, pre-interned at index 0.
    pub const NONE: Sym = Sym(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for Sym {
    fn default() -> Self {
        Sym::NONE
    }
}

/// Owns the interned strings. Interning the same text twice yields the
/// same [`Sym`].
#[derive(Debug)]
pub struct Interner {
    map: HashMap<String, Sym>,
    strings: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        let mut out = Interner {
            map: HashMap::new(),
            strings: Vec::new(),
        };
        out.strings.push(String::new());
        out
    }

    pub fn intern(&mut self, text: &str) -> Sym {
        if let Some(&sym) = self.map.get(text) {
            return sym;
        }
        let sym = Sym(self.strings.len() as u32);
        self.strings.push(text.to_string());
        self.map.insert(text.to_string(), sym);
        sym
    }

    /// # Panics
    ///
    /// Panics if `sym` came from a different interner.
    pub fn resolve(&self, sym: Sym) -> &str {
        &self.strings[sym.0 as usize]
    }

    /// Looks up without inserting.
    pub fn get(&self, text: &str) -> Option<Sym> {
        self.map.get(text).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 1
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_sym() {
        let mut interner = Interner::new();
        let a = interner.intern("lib/os.cw");
        let b = interner.intern("lib/os.cw");
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_different_sym() {
        let mut interner = Interner::new();
        let a = interner.intern("main.cw");
        let b = interner.intern("util.cw");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_round_trips() {
        let mut interner = Interner::new();
        let sym = interner.intern("foo/bar.cw");
        assert_eq!(interner.resolve(sym), "foo/bar.cw");
    }

    #[test]
    fn none_is_empty_string() {
        let interner = Interner::new();
        assert_eq!(interner.resolve(Sym::NONE), "");
    }

    #[test]
    fn get_does_not_insert() {
        let mut interner = Interner::new();
        assert!(interner.get("missing").is_none());
        let sym = interner.intern("present");
        assert_eq!(interner.get("present"), Some(sym));
    }
}

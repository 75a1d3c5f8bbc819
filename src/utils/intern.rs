//! Interning for loop names.
//!
//! Loop names are scoped to a single function body, so each function's loop
//! graph owns its own [`SymbolInterner`]. Symbols from different interners
//! must not be compared.

use serde::{Deserialize, Serialize};
use std::fmt;
use string_interner::{backend::StringBackend, DefaultSymbol, StringInterner, Symbol as SymbolTrait};

/// Type alias for our interner backend
type Backend = StringBackend<DefaultSymbol>;

/// A symbol representing an interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(u32);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// A symbol interner for efficient string storage.
#[derive(Debug, Clone)]
pub struct SymbolInterner {
    interner: StringInterner<Backend>,
}

impl Default for SymbolInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolInterner {
    pub fn new() -> Self {
        Self { interner: StringInterner::new() }
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        let sym = self.interner.get_or_intern(s);
        Symbol(sym.to_usize() as u32)
    }

    pub fn resolve(&self, sym: Symbol) -> Option<&str> {
        let internal_sym = DefaultSymbol::try_from_usize(sym.0 as usize)?;
        self.interner.resolve(internal_sym)
    }

    /// Look up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.interner.get(s).map(|sym| Symbol(sym.to_usize() as u32))
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interner() {
        let mut interner = SymbolInterner::new();
        let sym1 = interner.intern("i");
        let sym2 = interner.intern("j");
        let sym3 = interner.intern("i");
        assert_eq!(sym1, sym3);
        assert_ne!(sym1, sym2);
        assert_eq!(interner.resolve(sym1), Some("i"));
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_get_does_not_intern() {
        let mut interner = SymbolInterner::new();
        assert_eq!(interner.get("outer"), None);
        let sym = interner.intern("outer");
        assert_eq!(interner.get("outer"), Some(sym));
        assert_eq!(interner.len(), 1);
    }
}

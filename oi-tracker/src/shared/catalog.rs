//! Symbol catalog
//!
//! The full list of futures symbols, loaded once at start-up. Immutable afterwards.

use super::types::SymbolDescriptor;

/// Known symbols in server order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolCatalog {
    symbols: Vec<SymbolDescriptor>,
}

impl SymbolCatalog {
    pub fn new(symbols: Vec<SymbolDescriptor>) -> Self {
        Self { symbols }
    }

    /// Catalog left empty after a failed load
    pub fn empty() -> Self {
        Self::default()
    }

    /// Symbols containing `query`, in catalog order, truncated to `limit`.
    ///
    /// `query` is expected uppercased already.
    pub fn filter(&self, query: &str, limit: usize) -> Vec<SymbolDescriptor> {
        self.symbols
            .iter()
            .filter(|s| s.symbol.contains(query))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Exact lookup
    pub fn get(&self, symbol: &str) -> Option<&SymbolDescriptor> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

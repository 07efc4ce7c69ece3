//! Search box state
//!
//! Thin filter over the catalog. The query is the trimmed, uppercased input; the match
//! list opens for a non-empty query. Confirming a match makes it the selection, and a
//! confirmed selection can be added once it is neither tracked nor over capacity.

use super::catalog::SymbolCatalog;
use super::session::SessionSnapshot;
use super::types::{SymbolDescriptor, TrackedEntry};

/// Outcome of confirming (Enter) in the search box
#[derive(Debug, Clone, PartialEq)]
pub enum SearchAction {
    None,
    /// Highlighted match became the selection
    Selected(SymbolDescriptor),
    /// Confirmed selection should be added to the tracked set
    Add(TrackedEntry),
}

/// Match badge: whether the OI/supply ratio will be available
pub fn badge(descriptor: &SymbolDescriptor) -> &'static str {
    if descriptor.supported {
        "OI/SUPPLY"
    } else {
        "OI ONLY"
    }
}

#[derive(Debug, Clone)]
pub struct SearchBox {
    input: String,
    query: String,
    matches: Vec<SymbolDescriptor>,
    open: bool,
    highlighted: Option<usize>,
    selected: Option<SymbolDescriptor>,
    limit: usize,
}

impl SearchBox {
    pub fn new(limit: usize) -> Self {
        Self {
            input: String::new(),
            query: String::new(),
            matches: Vec::new(),
            open: false,
            highlighted: None,
            selected: None,
            limit,
        }
    }

    /// Replace the input text. Any confirmed selection is cleared.
    pub fn set_input(&mut self, text: impl Into<String>, catalog: &SymbolCatalog) {
        self.input = text.into();
        self.selected = None;
        self.highlighted = None;
        self.query = self.input.trim().to_uppercase();

        if self.query.is_empty() {
            self.matches.clear();
            self.open = false;
        } else {
            self.matches = catalog.filter(&self.query, self.limit);
            self.open = true;
        }
    }

    pub fn push_char(&mut self, c: char, catalog: &SymbolCatalog) {
        let mut text = std::mem::take(&mut self.input);
        text.push(c);
        self.set_input(text, catalog);
    }

    pub fn backspace(&mut self, catalog: &SymbolCatalog) {
        let mut text = std::mem::take(&mut self.input);
        text.pop();
        self.set_input(text, catalog);
    }

    pub fn move_down(&mut self) {
        if !self.open || self.matches.is_empty() {
            return;
        }
        self.highlighted = match self.highlighted {
            None => Some(0),
            Some(i) if i + 1 < self.matches.len() => Some(i + 1),
            current => current,
        };
    }

    pub fn move_up(&mut self) {
        if !self.open {
            return;
        }
        if let Some(i) = self.highlighted {
            if i > 0 {
                self.highlighted = Some(i - 1);
            }
        }
    }

    /// Confirm the highlighted match, or add the confirmed selection when allowed
    pub fn enter(&mut self, snapshot: &SessionSnapshot) -> SearchAction {
        if self.open {
            if let Some(descriptor) = self.highlighted.and_then(|i| self.matches.get(i)).cloned() {
                self.select(descriptor.clone());
                return SearchAction::Selected(descriptor);
            }
        }

        if self.can_add(snapshot) {
            if let Some(entry) = self.take_selection() {
                return SearchAction::Add(entry);
            }
        }
        SearchAction::None
    }

    /// Make `descriptor` the confirmed selection and close the list
    pub fn select(&mut self, descriptor: SymbolDescriptor) {
        self.input = descriptor.symbol.clone();
        self.query = descriptor.symbol.clone();
        self.selected = Some(descriptor);
        self.open = false;
        self.highlighted = None;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.highlighted = None;
    }

    /// Adding is allowed for a confirmed selection that is not tracked, with a free slot
    pub fn can_add(&self, snapshot: &SessionSnapshot) -> bool {
        self.selected
            .as_ref()
            .map(|s| !snapshot.is_tracked(&s.symbol) && !snapshot.is_full())
            .unwrap_or(false)
    }

    /// Take the confirmed selection, resetting the box
    pub fn take_selection(&mut self) -> Option<TrackedEntry> {
        let selected = self.selected.take()?;
        self.input.clear();
        self.query.clear();
        self.matches.clear();
        self.open = false;
        self.highlighted = None;
        Some(selected.into())
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[SymbolDescriptor] {
        &self.matches
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn selected(&self) -> Option<&SymbolDescriptor> {
        self.selected.as_ref()
    }

    /// List is open but nothing matched
    pub fn no_results(&self) -> bool {
        self.open && self.matches.is_empty()
    }
}

//! Card state store
//!
//! Owns the bounded, ordered tracked set and one `CardState` per tracked symbol.
//! Entry and state live in the same map slot, so they can never drift apart.
//! Every insert gets a fresh generation, so results fetched for an earlier card with
//! the same symbol can be told apart and dropped.

use indexmap::IndexMap;

use super::error::{AddError, FetchError};
use super::types::{CardMetrics, CardState, TrackedEntry};

/// One tracked symbol and its lifecycle state
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub entry: TrackedEntry,
    pub state: CardState,
    /// Insert generation; fetches carry it back with their result
    pub generation: u64,
}

/// Ordered tracked set (insertion order) with capacity and dedup enforcement
#[derive(Debug, Clone)]
pub struct CardStore {
    cards: IndexMap<String, Card>,
    capacity: usize,
    next_generation: u64,
}

impl CardStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            cards: IndexMap::with_capacity(capacity),
            capacity,
            next_generation: 0,
        }
    }

    /// Append a tracked entry with a fresh `Loading` card
    pub fn insert(&mut self, entry: TrackedEntry) -> Result<(), AddError> {
        if self.cards.contains_key(&entry.symbol) {
            return Err(AddError::Duplicate(entry.symbol));
        }
        if self.is_full() {
            return Err(AddError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.cards.insert(
            entry.symbol.clone(),
            Card {
                entry,
                state: CardState::loading(),
                generation,
            },
        );
        Ok(())
    }

    /// Remove a tracked entry and its card, keeping the order of the rest
    pub fn remove(&mut self, symbol: &str) -> Option<Card> {
        self.cards.shift_remove(symbol)
    }

    /// Move a card into `Loading` for a re-fetch. False if not tracked.
    pub fn set_loading(&mut self, symbol: &str) -> bool {
        match self.cards.get_mut(symbol) {
            Some(card) => {
                let state = std::mem::replace(&mut card.state, CardState::loading());
                card.state = state.into_loading();
                true
            }
            None => false,
        }
    }

    /// Apply a fetch outcome. False (and no change) if the symbol is no longer tracked,
    /// or was removed and re-added since the fetch started.
    pub fn apply(
        &mut self,
        symbol: &str,
        generation: u64,
        result: Result<CardMetrics, FetchError>,
    ) -> bool {
        match self.cards.get_mut(symbol) {
            Some(card) if card.generation == generation => {
                card.state = match result {
                    Ok(metrics) => CardState::Loaded(metrics),
                    Err(e) => CardState::Error(e.message()),
                };
                true
            }
            _ => false,
        }
    }

    /// Generation of the tracked card for `symbol`
    pub fn generation(&self, symbol: &str) -> Option<u64> {
        self.cards.get(symbol).map(|card| card.generation)
    }

    pub fn state(&self, symbol: &str) -> Option<&CardState> {
        self.cards.get(symbol).map(|card| &card.state)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.cards.contains_key(symbol)
    }

    pub fn is_full(&self) -> bool {
        self.cards.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tracked entries in display order
    pub fn entries(&self) -> Vec<TrackedEntry> {
        self.cards.values().map(|card| card.entry.clone()).collect()
    }

    /// Tracked symbols in display order
    pub fn symbols(&self) -> Vec<String> {
        self.cards.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }
}

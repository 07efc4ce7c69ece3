//! Session state
//!
//! The single owner of the tracked set, card states, countdown and global status.
//! Every mutation goes through a method here, which persists the tracked set when
//! it changes and publishes the matching `SessionEvent`s. No I/O besides persistence,
//! so the whole lifecycle is testable without a runtime or a terminal.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::cards::{Card, CardStore};
use super::error::{AddError, FetchError};
use super::events::{EventBus, SessionEvent};
use super::persistence::TrackedStore;
use super::scheduler::{Phase, RefreshScheduler, Tick};
use super::types::{CardMetrics, CardState, GlobalStatus, TrackedEntry};

/// Point-in-time copy of the session for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Cards in display order
    pub cards: Vec<Card>,
    pub capacity: usize,
    pub countdown: u32,
    pub period: u32,
    pub progress: f64,
    pub fraction: f64,
    pub urgent: bool,
    pub status: GlobalStatus,
    /// A refresh batch is in flight after start-up
    pub refreshing: bool,
}

impl SessionSnapshot {
    /// View shown before the engine exists: no cards, full countdown, `Loading`
    pub fn starting(capacity: usize, refresh_secs: u32) -> Self {
        let scheduler = RefreshScheduler::new(refresh_secs);
        Self {
            cards: Vec::new(),
            capacity,
            countdown: scheduler.countdown(),
            period: scheduler.period(),
            progress: scheduler.progress(),
            fraction: scheduler.fraction(),
            urgent: scheduler.is_urgent(),
            status: GlobalStatus::Loading,
            refreshing: false,
        }
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.cards.iter().any(|card| card.entry.symbol == symbol)
    }

    pub fn is_full(&self) -> bool {
        self.cards.len() >= self.capacity
    }

    pub fn card(&self, symbol: &str) -> Option<&Card> {
        self.cards.iter().find(|card| card.entry.symbol == symbol)
    }

    /// Header label, distinguishing a refresh from the initial load
    pub fn status_label(&self) -> &'static str {
        match self.status {
            GlobalStatus::Loading if self.refreshing => "REFRESHING",
            status => status.as_str(),
        }
    }
}

/// Tracker session
#[derive(Debug)]
pub struct Session {
    cards: CardStore,
    scheduler: RefreshScheduler,
    status: GlobalStatus,
    catalog_failed: bool,
    started: bool,
    store: TrackedStore,
    events: EventBus,
}

impl Session {
    pub fn new(max_cards: usize, refresh_secs: u32, store: TrackedStore) -> Self {
        Self {
            cards: CardStore::new(max_cards),
            scheduler: RefreshScheduler::new(refresh_secs),
            status: GlobalStatus::Loading,
            catalog_failed: false,
            started: false,
            store,
            events: EventBus::new(),
        }
    }

    /// Register an observer of session events
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Restore the persisted tracked set, capped at capacity with duplicates skipped.
    ///
    /// Returns the restored symbols, each in `Loading` and due one fetch.
    pub fn restore(&mut self) -> Vec<String> {
        let mut restored = Vec::new();
        for entry in self.store.load() {
            if self.cards.is_full() {
                debug!("Tracked set full, dropping remaining saved entries");
                break;
            }
            let symbol = entry.symbol.clone();
            match self.cards.insert(entry) {
                Ok(()) => restored.push(symbol),
                Err(e) => debug!("Skipping saved entry: {}", e),
            }
        }

        if !restored.is_empty() {
            info!("Restored {} tracked symbols", restored.len());
            self.publish_tracked_set();
            for symbol in &restored {
                self.events.publish(SessionEvent::CardStateChanged {
                    symbol: symbol.clone(),
                });
            }
        }
        restored
    }

    /// Catalog failed to load. Error status sticks until the next full reload.
    pub fn set_catalog_failed(&mut self) {
        self.catalog_failed = true;
        self.set_status(GlobalStatus::Error);
    }

    /// Start-up finished: go live unless the catalog failed or a batch is still out
    pub fn finish_startup(&mut self) {
        self.started = true;
        if self.scheduler.phase() == Phase::Counting {
            self.set_status(self.settled_status());
        }
    }

    /// Track a symbol. Rejected adds leave the session untouched.
    pub fn add(&mut self, entry: TrackedEntry) -> Result<(), AddError> {
        let symbol = entry.symbol.clone();
        self.cards.insert(entry)?;
        self.store.save(&self.cards.entries());

        info!("Tracking {} ({}/{})", symbol, self.cards.len(), self.cards.capacity());
        self.publish_tracked_set();
        self.events.publish(SessionEvent::CardStateChanged { symbol });
        Ok(())
    }

    /// Stop tracking a symbol. No-op if absent.
    pub fn remove(&mut self, symbol: &str) -> bool {
        if self.cards.remove(symbol).is_none() {
            return false;
        }
        self.store.save(&self.cards.entries());

        info!("Stopped tracking {}", symbol);
        self.publish_tracked_set();
        true
    }

    /// Move a tracked card into `Loading` ahead of a re-fetch
    pub fn mark_loading(&mut self, symbol: &str) -> bool {
        let changed = self.cards.set_loading(symbol);
        if changed {
            self.events.publish(SessionEvent::CardStateChanged {
                symbol: symbol.to_string(),
            });
        }
        changed
    }

    /// Apply a fetch outcome started against card `generation`. Results for symbols no
    /// longer tracked, or tracked again since the fetch started, are discarded.
    pub fn apply_fetch_result(
        &mut self,
        symbol: &str,
        generation: u64,
        result: Result<CardMetrics, FetchError>,
    ) -> bool {
        if let Err(e) = &result {
            warn!("Fetch failed for {}: {}", symbol, e);
        }

        if !self.cards.apply(symbol, generation, result) {
            debug!("Discarding stale result for {} (generation {})", symbol, generation);
            return false;
        }
        self.events.publish(SessionEvent::CardStateChanged {
            symbol: symbol.to_string(),
        });
        true
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self) -> Tick {
        let tick = self.scheduler.tick();
        self.events.publish(SessionEvent::CountdownTicked {
            remaining: self.scheduler.countdown(),
            progress: self.scheduler.progress(),
        });
        tick
    }

    /// A refresh batch was issued for `symbols`
    pub fn begin_refresh(&mut self, symbols: &[String]) {
        self.scheduler.begin_batch();
        for symbol in symbols {
            self.mark_loading(symbol);
        }
        self.set_status(GlobalStatus::Loading);
    }

    /// A refresh batch finished; settle the status once none is outstanding
    pub fn finish_refresh(&mut self) {
        if self.scheduler.finish_batch() {
            self.set_status(self.settled_status());
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            cards: self.cards.iter().cloned().collect(),
            capacity: self.cards.capacity(),
            countdown: self.scheduler.countdown(),
            period: self.scheduler.period(),
            progress: self.scheduler.progress(),
            fraction: self.scheduler.fraction(),
            urgent: self.scheduler.is_urgent(),
            status: self.status,
            refreshing: self.started && self.scheduler.phase() == Phase::Refreshing,
        }
    }

    pub fn status(&self) -> GlobalStatus {
        self.status
    }

    pub fn countdown(&self) -> u32 {
        self.scheduler.countdown()
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.cards.contains(symbol)
    }

    pub fn is_full(&self) -> bool {
        self.cards.is_full()
    }

    pub fn tracked_len(&self) -> usize {
        self.cards.len()
    }

    pub fn tracked_entries(&self) -> Vec<TrackedEntry> {
        self.cards.entries()
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.cards.symbols()
    }

    pub fn card_state(&self, symbol: &str) -> Option<&CardState> {
        self.cards.state(symbol)
    }

    /// Generation of the tracked card for `symbol`, to tag fetches with
    pub fn generation(&self, symbol: &str) -> Option<u64> {
        self.cards.generation(symbol)
    }

    /// Status once no work is in flight: a catalog failure takes precedence
    fn settled_status(&self) -> GlobalStatus {
        if self.catalog_failed {
            GlobalStatus::Error
        } else {
            GlobalStatus::Active
        }
    }

    fn set_status(&mut self, status: GlobalStatus) {
        if self.status != status {
            debug!("Global status {} -> {}", self.status, status);
            self.status = status;
            self.events
                .publish(SessionEvent::GlobalStatusChanged { status });
        }
    }

    fn publish_tracked_set(&mut self) {
        self.events.publish(SessionEvent::TrackedSetChanged {
            symbols: self.cards.symbols(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::persistence::MemorySlot;
    use chrono::Utc;

    fn entry(symbol: &str, supported: bool) -> TrackedEntry {
        TrackedEntry {
            symbol: symbol.to_string(),
            supported,
        }
    }

    fn metrics(ratio: Option<f64>) -> CardMetrics {
        CardMetrics {
            price: 100.0,
            change_pct: 0.5,
            open_interest: 10.0,
            open_interest_usdt: 1000.0,
            circulating_supply: ratio.map(|_| 1_000.0),
            volume_usdt: 50_000.0,
            oi_supply_ratio: ratio,
            fetched_at: Utc::now(),
        }
    }

    fn session_with(slot: &MemorySlot) -> Session {
        Session::new(4, 30, TrackedStore::new(slot.clone()))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_add_persists_and_creates_loading_card() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        let mut rx = session.subscribe();

        session.add(entry("BTCUSDT", true)).unwrap();

        assert_eq!(session.card_state("BTCUSDT"), Some(&CardState::loading()));
        assert_eq!(
            TrackedStore::new(slot.clone()).load(),
            vec![entry("BTCUSDT", true)]
        );
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::TrackedSetChanged {
                    symbols: vec!["BTCUSDT".to_string()]
                },
                SessionEvent::CardStateChanged {
                    symbol: "BTCUSDT".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_add_at_capacity_is_noop() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"] {
            session.add(entry(symbol, true)).unwrap();
        }
        let saved_before = slot.value();
        let mut rx = session.subscribe();

        assert_eq!(
            session.add(entry("DOGEUSDT", true)),
            Err(AddError::CapacityExceeded { capacity: 4 })
        );
        assert_eq!(session.tracked_len(), 4);
        assert!(session.card_state("DOGEUSDT").is_none());
        assert_eq!(slot.value(), saved_before);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_add_duplicate_is_noop() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        session.add(entry("BTCUSDT", true)).unwrap();

        assert!(matches!(
            session.add(entry("BTCUSDT", true)),
            Err(AddError::Duplicate(_))
        ));
        assert_eq!(session.tracked_symbols(), vec!["BTCUSDT"]);
    }

    #[test]
    fn test_remove_deletes_entry_and_card_then_discards_stale_result() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        session.add(entry("BTCUSDT", true)).unwrap();
        session.add(entry("ETHUSDT", true)).unwrap();

        assert!(session.remove("BTCUSDT"));
        assert!(session.card_state("BTCUSDT").is_none());
        assert_eq!(session.tracked_symbols(), vec!["ETHUSDT"]);
        assert_eq!(
            TrackedStore::new(slot.clone()).load(),
            vec![entry("ETHUSDT", true)]
        );

        assert!(!session.apply_fetch_result("BTCUSDT", 0, Ok(metrics(Some(1.0)))));
        assert!(session.card_state("BTCUSDT").is_none());
        assert_eq!(session.tracked_len(), 1);

        // Removing again is a no-op
        assert!(!session.remove("BTCUSDT"));
    }

    #[test]
    fn test_result_for_previous_card_is_discarded_after_readd() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        session.add(entry("BTCUSDT", true)).unwrap();
        let first = session.generation("BTCUSDT").unwrap();

        session.remove("BTCUSDT");
        session.add(entry("BTCUSDT", true)).unwrap();
        let second = session.generation("BTCUSDT").unwrap();
        assert!(session.apply_fetch_result("BTCUSDT", second, Ok(metrics(Some(0.4)))));

        let mut rx = session.subscribe();
        assert!(!session.apply_fetch_result(
            "BTCUSDT",
            first,
            Err(FetchError::Transport("connection reset".to_string()))
        ));
        assert!(session.card_state("BTCUSDT").unwrap().is_loaded());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_restore_caps_and_dedups() {
        let slot = MemorySlot::with_value(
            r#"[
                {"symbol":"BTCUSDT","supported":true},
                {"symbol":"BTCUSDT","supported":true},
                {"symbol":"ETHUSDT","supported":true},
                {"symbol":"XYZUSDT","supported":false},
                {"symbol":"SOLUSDT","supported":true},
                {"symbol":"XRPUSDT","supported":true}
            ]"#,
        );
        let mut session = session_with(&slot);

        let restored = session.restore();
        assert_eq!(restored, vec!["BTCUSDT", "ETHUSDT", "XYZUSDT", "SOLUSDT"]);
        assert!(session.is_full());
        assert!(restored
            .iter()
            .all(|s| session.card_state(s) == Some(&CardState::loading())));
    }

    #[test]
    fn test_restore_corrupt_storage_starts_empty() {
        let slot = MemorySlot::with_value("not json at all");
        let mut session = session_with(&slot);
        assert!(session.restore().is_empty());
        assert_eq!(session.tracked_len(), 0);
    }

    #[test]
    fn test_refresh_cycle_status_transitions() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        session.finish_startup();
        assert_eq!(session.status(), GlobalStatus::Active);

        session.add(entry("BTCUSDT", true)).unwrap();
        session.add(entry("XYZUSDT", false)).unwrap();
        let btc = session.generation("BTCUSDT").unwrap();
        let xyz = session.generation("XYZUSDT").unwrap();
        session.apply_fetch_result("BTCUSDT", btc, Ok(metrics(Some(0.4))));

        let symbols = session.tracked_symbols();
        session.begin_refresh(&symbols);
        assert_eq!(session.status(), GlobalStatus::Loading);
        assert_eq!(session.phase(), Phase::Refreshing);
        assert!(session.snapshot().refreshing);
        assert_eq!(session.snapshot().status_label(), "REFRESHING");
        assert!(session.card_state("BTCUSDT").unwrap().is_loading());

        session.apply_fetch_result("BTCUSDT", btc, Ok(metrics(Some(2.5))));
        session.apply_fetch_result(
            "XYZUSDT",
            xyz,
            Err(FetchError::Status {
                status: 404,
                message: "HTTP 404".to_string(),
            }),
        );
        session.finish_refresh();

        assert!(session.card_state("BTCUSDT").unwrap().is_loaded());
        assert_eq!(
            session.card_state("XYZUSDT"),
            Some(&CardState::Error("HTTP 404".to_string()))
        );
        assert_eq!(session.status(), GlobalStatus::Active);
        assert_eq!(session.phase(), Phase::Counting);
    }

    #[test]
    fn test_catalog_failure_is_sticky() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        session.set_catalog_failed();
        session.finish_startup();
        assert_eq!(session.status(), GlobalStatus::Error);

        session.add(entry("BTCUSDT", true)).unwrap();
        session.begin_refresh(&["BTCUSDT".to_string()]);
        assert_eq!(session.status(), GlobalStatus::Loading);
        session.finish_refresh();
        assert_eq!(session.status(), GlobalStatus::Error);
    }

    #[test]
    fn test_tick_publishes_countdown() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        let mut rx = session.subscribe();

        assert_eq!(session.tick(), Tick::Counting { remaining: 29 });
        match drain(&mut rx).as_slice() {
            [SessionEvent::CountdownTicked {
                remaining,
                progress,
            }] => {
                assert_eq!(*remaining, 29);
                assert!((progress - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_reflects_session() {
        let slot = MemorySlot::new();
        let mut session = session_with(&slot);
        session.add(entry("BTCUSDT", true)).unwrap();

        let snapshot = session.snapshot();
        assert!(snapshot.is_tracked("BTCUSDT"));
        assert!(!snapshot.is_full());
        assert_eq!(snapshot.capacity, 4);
        assert_eq!(snapshot.countdown, 30);
        assert_eq!(snapshot.status_label(), "LOADING");
        assert!(snapshot.card("BTCUSDT").unwrap().state.is_loading());
    }

    #[test]
    fn test_starting_snapshot_matches_fresh_session() {
        let slot = MemorySlot::new();
        let session = session_with(&slot);

        let starting = SessionSnapshot::starting(4, 30);
        assert_eq!(starting, session.snapshot());
        assert_eq!(starting.status_label(), "LOADING");
        assert!(starting.cards.is_empty());
    }
}

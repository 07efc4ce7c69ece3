//! Session engine
//!
//! Single-writer actor owning the `Session`. Ticks, user commands and fetch completions
//! are processed one at a time, so the session needs no locking. Fetches run as spawned
//! tasks and report back over the engine's own channel; the latest `SessionSnapshot` is
//! published on a watch channel for the presentation loop.
//!
//! Each fetch carries the generation of the card it was started for, so a result that
//! arrives after its symbol was removed (and possibly re-added) never lands on the new card.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::api::MarketApi;
use super::catalog::SymbolCatalog;
use super::config::TrackerConfig;
use super::error::FetchError;
use super::events::SessionEvent;
use super::persistence::TrackedStore;
use super::scheduler::Tick;
use super::session::{Session, SessionSnapshot};
use super::types::{CardMetrics, TrackedEntry};

/// User intent sent to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Add(TrackedEntry),
    Remove(String),
    /// Re-fetch a single card. Leaves the countdown alone.
    Refresh(String),
    Shutdown,
}

#[derive(Debug)]
enum EngineMessage {
    Command(EngineCommand),
    Fetched {
        symbol: String,
        generation: u64,
        result: Result<CardMetrics, FetchError>,
        scheduled: bool,
    },
    BatchFinished {
        startup: bool,
    },
}

/// Cloneable front of a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    catalog: Arc<SymbolCatalog>,
}

impl EngineHandle {
    pub fn add(&self, entry: TrackedEntry) -> bool {
        self.send(EngineCommand::Add(entry))
    }

    pub fn remove(&self, symbol: impl Into<String>) -> bool {
        self.send(EngineCommand::Remove(symbol.into()))
    }

    pub fn refresh(&self, symbol: impl Into<String>) -> bool {
        self.send(EngineCommand::Refresh(symbol.into()))
    }

    pub fn shutdown(&self) -> bool {
        self.send(EngineCommand::Shutdown)
    }

    /// False once the engine has stopped
    pub fn send(&self, command: EngineCommand) -> bool {
        self.tx.send(EngineMessage::Command(command)).is_ok()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait for the next published snapshot. False once the engine has stopped.
    pub async fn changed(&mut self) -> bool {
        self.snapshot_rx.changed().await.is_ok()
    }

    pub fn catalog(&self) -> &SymbolCatalog {
        &self.catalog
    }
}

/// Session engine
pub struct Engine {
    api: Arc<dyn MarketApi>,
    session: Session,
    tx: mpsc::UnboundedSender<EngineMessage>,
    rx: mpsc::UnboundedReceiver<EngineMessage>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Symbols with an unresolved scheduled fetch, by card generation
    scheduled_in_flight: HashMap<String, u64>,
    /// Spawned fetch tasks that have not reported completion
    pending: usize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("session", &self.session)
            .field("scheduled_in_flight", &self.scheduled_in_flight)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Load the catalog, restore the tracked set and start the first fetch of each
    /// restored card.
    ///
    /// A catalog failure leaves the catalog empty and the status at `Error`; the
    /// engine is still returned and fully usable.
    pub async fn bootstrap(
        api: Arc<dyn MarketApi>,
        store: TrackedStore,
        config: &TrackerConfig,
    ) -> (Engine, EngineHandle) {
        let mut session = Session::new(config.max_cards, config.refresh_secs, store);

        let catalog = match api.fetch_symbols().await {
            Ok(symbols) => {
                info!("Loaded {} catalog symbols", symbols.len());
                SymbolCatalog::new(symbols)
            }
            Err(e) => {
                warn!("Symbol catalog unavailable: {}", e);
                session.set_catalog_failed();
                SymbolCatalog::empty()
            }
        };

        let restored = session.restore();
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let mut engine = Engine {
            api,
            session,
            tx: tx.clone(),
            rx,
            snapshot_tx,
            scheduled_in_flight: HashMap::new(),
            pending: 0,
        };

        if restored.is_empty() {
            engine.session.finish_startup();
        } else {
            engine.start_batch(restored, true);
        }
        engine.publish();

        let handle = EngineHandle {
            tx,
            snapshot_rx,
            catalog: Arc::new(catalog),
        };
        (engine, handle)
    }

    /// Register an observer of session events
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.session.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Drive the session until `Shutdown`: one tick per second plus messages as they arrive
    pub async fn run(mut self) {
        let period = Duration::from_secs(1);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Engine started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(),
                Some(message) = self.rx.recv() => {
                    if !self.handle(message) {
                        break;
                    }
                }
            }
            self.publish();
        }
        info!("Engine stopped");
    }

    /// One second elapsed
    pub fn on_tick(&mut self) {
        if self.session.tick() == Tick::Expired {
            self.refresh_all();
        }
    }

    /// Apply a command. False on `Shutdown`.
    pub fn apply_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::Add(entry) => {
                let symbol = entry.symbol.clone();
                match self.session.add(entry) {
                    Ok(()) => self.spawn_fetch(symbol),
                    Err(e) => debug!("Ignoring add of {}: {}", symbol, e),
                }
            }
            EngineCommand::Remove(symbol) => {
                if self.session.remove(&symbol) {
                    self.scheduled_in_flight.remove(&symbol);
                }
            }
            EngineCommand::Refresh(symbol) => {
                if self.session.mark_loading(&symbol) {
                    debug!("Manual refresh of {}", symbol);
                    self.spawn_fetch(symbol);
                }
            }
            EngineCommand::Shutdown => return false,
        }
        true
    }

    /// Process messages until every spawned fetch has reported back
    pub async fn settle(&mut self) {
        while self.pending > 0 {
            match self.rx.recv().await {
                Some(message) => {
                    if !self.handle(message) {
                        break;
                    }
                }
                None => break,
            }
        }
        self.publish();
    }

    fn handle(&mut self, message: EngineMessage) -> bool {
        match message {
            EngineMessage::Command(command) => return self.apply_command(command),
            EngineMessage::Fetched {
                symbol,
                generation,
                result,
                scheduled,
            } => {
                if scheduled {
                    if self.scheduled_in_flight.get(&symbol) == Some(&generation) {
                        self.scheduled_in_flight.remove(&symbol);
                    }
                } else {
                    self.pending = self.pending.saturating_sub(1);
                }
                self.session.apply_fetch_result(&symbol, generation, result);
            }
            EngineMessage::BatchFinished { startup } => {
                self.pending = self.pending.saturating_sub(1);
                self.session.finish_refresh();
                if startup {
                    self.session.finish_startup();
                }
            }
        }
        true
    }

    /// Countdown expired: re-fetch every tracked symbol without an unresolved scheduled fetch
    fn refresh_all(&mut self) {
        let symbols: Vec<String> = self
            .session
            .tracked_symbols()
            .into_iter()
            .filter(|symbol| !self.scheduled_in_flight.contains_key(symbol))
            .collect();

        if symbols.is_empty() {
            debug!("Nothing to refresh");
            return;
        }

        info!("Refreshing {} symbols", symbols.len());
        self.start_batch(symbols, false);
    }

    fn start_batch(&mut self, symbols: Vec<String>, startup: bool) {
        self.session.begin_refresh(&symbols);
        let targets: Vec<(String, u64)> = symbols
            .into_iter()
            .filter_map(|symbol| {
                let generation = self.session.generation(&symbol)?;
                Some((symbol, generation))
            })
            .collect();
        self.scheduled_in_flight.extend(targets.iter().cloned());
        self.pending += 1;

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut fetches: FuturesUnordered<_> = targets
                .into_iter()
                .map(|(symbol, generation)| {
                    let api = Arc::clone(&api);
                    async move {
                        let result = api.fetch_coin(&symbol).await;
                        (symbol, generation, result)
                    }
                })
                .collect();

            while let Some((symbol, generation, result)) = fetches.next().await {
                let _ = tx.send(EngineMessage::Fetched {
                    symbol,
                    generation,
                    result,
                    scheduled: true,
                });
            }
            let _ = tx.send(EngineMessage::BatchFinished { startup });
        });
    }

    fn spawn_fetch(&mut self, symbol: String) {
        let Some(generation) = self.session.generation(&symbol) else {
            return;
        };
        self.pending += 1;

        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_coin(&symbol).await;
            let _ = tx.send(EngineMessage::Fetched {
                symbol,
                generation,
                result,
                scheduled: false,
            });
        });
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::error::CatalogError;
    use crate::shared::persistence::MemorySlot;
    use crate::shared::types::{CardState, GlobalStatus, SymbolDescriptor};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    struct MockApi {
        symbols: Result<Vec<SymbolDescriptor>, CatalogError>,
        calls: Mutex<Vec<String>>,
        gate: Option<Arc<Semaphore>>,
        /// Calls with a lower index wait on the gate
        gated_calls: usize,
        /// Gated calls fail once released
        held_fails: bool,
    }

    impl MockApi {
        fn new() -> Self {
            Self {
                symbols: Ok(vec![
                    descriptor("BTCUSDT", true),
                    descriptor("ETHUSDT", true),
                    descriptor("XYZUSDT", false),
                ]),
                calls: Mutex::new(Vec::new()),
                gate: None,
                gated_calls: 0,
                held_fails: false,
            }
        }

        fn failing_catalog() -> Self {
            Self {
                symbols: Err(CatalogError::Transport("connection refused".to_string())),
                ..Self::new()
            }
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                gated_calls: usize::MAX,
                ..Self::new()
            }
        }

        /// Only the first call waits on the gate, and fails once released
        fn holding_first(gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                gated_calls: 1,
                held_fails: true,
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl MarketApi for MockApi {
        async fn fetch_symbols(&self) -> Result<Vec<SymbolDescriptor>, CatalogError> {
            self.symbols.clone()
        }

        async fn fetch_coin(&self, symbol: &str) -> Result<CardMetrics, FetchError> {
            let index = {
                let mut calls = self.calls.lock();
                calls.push(symbol.to_string());
                calls.len() - 1
            };
            if let Some(gate) = self.gate.as_ref().filter(|_| index < self.gated_calls) {
                let _permit = gate.acquire().await;
                if self.held_fails {
                    return Err(FetchError::Transport("connection reset".to_string()));
                }
            }

            if symbol.starts_with("XYZ") {
                return Err(FetchError::Status {
                    status: 404,
                    message: format!("{} not found", symbol),
                });
            }
            Ok(CardMetrics {
                price: 67_000.0,
                change_pct: 1.5,
                open_interest: 80_000.0,
                open_interest_usdt: 5_360_000_000.0,
                circulating_supply: Some(19_700_000.0),
                volume_usdt: 1_000_000.0,
                oi_supply_ratio: Some(0.4061),
                fetched_at: Utc::now(),
            })
        }
    }

    fn descriptor(symbol: &str, supported: bool) -> SymbolDescriptor {
        SymbolDescriptor {
            symbol: symbol.to_string(),
            supported,
        }
    }

    fn entry(symbol: &str) -> TrackedEntry {
        TrackedEntry {
            symbol: symbol.to_string(),
            supported: true,
        }
    }

    fn config() -> TrackerConfig {
        TrackerConfig::default().without_log_file()
    }

    async fn start(api: Arc<MockApi>, slot: MemorySlot) -> (Engine, EngineHandle) {
        Engine::bootstrap(api, TrackedStore::new(slot), &config()).await
    }

    #[tokio::test]
    async fn test_startup_restores_and_fetches() {
        let api = Arc::new(MockApi::new());
        let slot = MemorySlot::with_value(
            r#"[{"symbol":"BTCUSDT","supported":true},{"symbol":"XYZUSDT","supported":false}]"#,
        );
        let (mut engine, handle) = start(Arc::clone(&api), slot).await;
        assert_eq!(handle.catalog().len(), 3);
        assert_eq!(engine.session().status(), GlobalStatus::Loading);

        engine.settle().await;

        let snapshot = handle.snapshot();
        assert!(snapshot.card("BTCUSDT").unwrap().state.is_loaded());
        assert_eq!(
            snapshot.card("XYZUSDT").unwrap().state,
            CardState::Error("XYZUSDT not found".to_string())
        );
        assert_eq!(snapshot.status, GlobalStatus::Active);
        assert_eq!(snapshot.status_label(), "LIVE");

        let mut calls = api.calls();
        calls.sort();
        assert_eq!(calls, vec!["BTCUSDT", "XYZUSDT"]);
    }

    #[tokio::test]
    async fn test_full_countdown_issues_one_batch() {
        let api = Arc::new(MockApi::new());
        let (mut engine, _handle) = start(Arc::clone(&api), MemorySlot::new()).await;
        assert_eq!(engine.session().status(), GlobalStatus::Active);

        engine.apply_command(EngineCommand::Add(entry("BTCUSDT")));
        engine.settle().await;
        assert_eq!(api.calls().len(), 1);

        for _ in 0..29 {
            engine.on_tick();
        }
        assert_eq!(engine.session().countdown(), 1);
        engine.settle().await;
        assert_eq!(api.calls().len(), 1);

        engine.on_tick();
        assert_eq!(engine.session().status(), GlobalStatus::Loading);
        assert!(engine.snapshot().refreshing);
        engine.settle().await;

        assert_eq!(api.calls(), vec!["BTCUSDT", "BTCUSDT"]);
        assert_eq!(engine.session().countdown(), 30);
        assert_eq!(engine.session().status(), GlobalStatus::Active);
        assert!(engine.session().card_state("BTCUSDT").unwrap().is_loaded());
    }

    #[tokio::test]
    async fn test_empty_tracked_set_issues_no_fetch() {
        let api = Arc::new(MockApi::new());
        let (mut engine, _handle) = start(Arc::clone(&api), MemorySlot::new()).await;

        for _ in 0..30 {
            engine.on_tick();
        }
        engine.settle().await;

        assert!(api.calls().is_empty());
        assert_eq!(engine.session().countdown(), 30);
        assert_eq!(engine.session().status(), GlobalStatus::Active);
    }

    #[tokio::test]
    async fn test_stale_result_after_remove_is_discarded() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(MockApi::gated(Arc::clone(&gate)));
        let slot = MemorySlot::new();
        let (mut engine, _handle) = start(Arc::clone(&api), slot.clone()).await;

        engine.apply_command(EngineCommand::Add(entry("BTCUSDT")));
        engine.apply_command(EngineCommand::Remove("BTCUSDT".to_string()));
        gate.add_permits(1);
        engine.settle().await;

        assert_eq!(api.calls(), vec!["BTCUSDT"]);
        assert!(engine.session().card_state("BTCUSDT").is_none());
        assert_eq!(engine.session().tracked_len(), 0);
        assert_eq!(slot.value().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_readded_symbol_ignores_result_of_removed_card() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(MockApi::holding_first(Arc::clone(&gate)));
        let slot = MemorySlot::with_value(r#"[{"symbol":"BTCUSDT","supported":true}]"#);
        let (mut engine, _handle) = start(Arc::clone(&api), slot).await;

        // Start-up fetch is issued and held open
        while api.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        engine.apply_command(EngineCommand::Remove("BTCUSDT".to_string()));
        engine.apply_command(EngineCommand::Add(entry("BTCUSDT")));
        let message = engine.rx.recv().await.unwrap();
        engine.handle(message);
        assert!(engine.session().card_state("BTCUSDT").unwrap().is_loaded());

        // The re-added card is due its own scheduled fetch
        for _ in 0..30 {
            engine.on_tick();
        }
        assert_eq!(
            engine.scheduled_in_flight.get("BTCUSDT"),
            engine.session().generation("BTCUSDT").as_ref()
        );

        gate.add_permits(1);
        engine.settle().await;

        assert_eq!(api.calls(), vec!["BTCUSDT", "BTCUSDT", "BTCUSDT"]);
        assert!(engine.session().card_state("BTCUSDT").unwrap().is_loaded());
        assert!(engine.scheduled_in_flight.is_empty());
        assert_eq!(engine.session().status(), GlobalStatus::Active);
    }

    #[tokio::test]
    async fn test_unresolved_scheduled_fetch_is_not_reissued() {
        let gate = Arc::new(Semaphore::new(0));
        let api = Arc::new(MockApi::gated(Arc::clone(&gate)));
        let slot = MemorySlot::with_value(r#"[{"symbol":"BTCUSDT","supported":true}]"#);
        let (mut engine, _handle) = start(Arc::clone(&api), slot).await;

        // Start-up fetch still hanging when the countdown expires
        for _ in 0..30 {
            engine.on_tick();
        }
        assert_eq!(engine.session().countdown(), 30);

        gate.add_permits(10);
        engine.settle().await;

        assert_eq!(api.calls(), vec!["BTCUSDT"]);
        assert_eq!(engine.session().status(), GlobalStatus::Active);
        assert!(engine.session().card_state("BTCUSDT").unwrap().is_loaded());
    }

    #[tokio::test]
    async fn test_rejected_adds_are_noops() {
        let api = Arc::new(MockApi::new());
        let (mut engine, _handle) = start(Arc::clone(&api), MemorySlot::new()).await;

        for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"] {
            engine.apply_command(EngineCommand::Add(entry(symbol)));
        }
        engine.apply_command(EngineCommand::Add(entry("DOGEUSDT")));
        engine.apply_command(EngineCommand::Add(entry("BTCUSDT")));
        engine.settle().await;

        assert_eq!(api.calls().len(), 4);
        assert_eq!(
            engine.session().tracked_symbols(),
            vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"]
        );
        assert!(engine.session().card_state("DOGEUSDT").is_none());
    }

    #[tokio::test]
    async fn test_catalog_failure_is_sticky() {
        let api = Arc::new(MockApi::failing_catalog());
        let (mut engine, handle) = start(Arc::clone(&api), MemorySlot::new()).await;

        assert!(handle.catalog().is_empty());
        assert_eq!(handle.snapshot().status, GlobalStatus::Error);

        engine.apply_command(EngineCommand::Add(entry("BTCUSDT")));
        engine.settle().await;
        assert!(engine.session().card_state("BTCUSDT").unwrap().is_loaded());

        for _ in 0..30 {
            engine.on_tick();
        }
        assert_eq!(engine.session().status(), GlobalStatus::Loading);
        engine.settle().await;
        assert_eq!(engine.session().status(), GlobalStatus::Error);
    }

    #[tokio::test]
    async fn test_manual_refresh_keeps_countdown() {
        let api = Arc::new(MockApi::new());
        let (mut engine, _handle) = start(Arc::clone(&api), MemorySlot::new()).await;

        engine.apply_command(EngineCommand::Add(entry("BTCUSDT")));
        engine.settle().await;
        for _ in 0..3 {
            engine.on_tick();
        }

        engine.apply_command(EngineCommand::Refresh("BTCUSDT".to_string()));
        let state = engine.session().card_state("BTCUSDT").unwrap();
        assert!(state.is_loading());
        assert!(state.metrics().is_some());

        // Untracked symbols are ignored
        engine.apply_command(EngineCommand::Refresh("ETHUSDT".to_string()));
        engine.settle().await;

        assert_eq!(api.calls(), vec!["BTCUSDT", "BTCUSDT"]);
        assert_eq!(engine.session().countdown(), 27);
        assert_eq!(engine.session().status(), GlobalStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drives_countdown_and_commands() {
        let api = Arc::new(MockApi::new());
        let (engine, mut handle) = start(Arc::clone(&api), MemorySlot::new()).await;
        let task = tokio::spawn(engine.run());

        assert!(handle.add(entry("BTCUSDT")));
        while !handle
            .snapshot()
            .card("BTCUSDT")
            .map(|card| card.state.is_loaded())
            .unwrap_or(false)
        {
            assert!(handle.changed().await);
        }

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(api.calls().len(), 2);
        assert_eq!(handle.snapshot().countdown, 30);

        assert!(handle.shutdown());
        task.await.unwrap();
        assert!(!handle.add(entry("ETHUSDT")));
    }
}

/// OI Tracker - Shared Library
///
/// Session engine behind the `oi-tracker` terminal app:
/// - Bounded, persisted set of tracked futures symbols
/// - One-second countdown driving concurrent per-symbol refreshes
/// - Open interest / circulating supply ratio classification
///
/// The engine talks to the metrics API through `MarketApi` and publishes
/// `SessionSnapshot`s and `SessionEvent`s for the presentation layer.
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{CardMetrics, CardState, GlobalStatus, SymbolDescriptor, TrackedEntry};

pub use shared::api::{HttpMarketApi, MarketApi};
pub use shared::config::TrackerConfig;
pub use shared::engine::{Engine, EngineCommand, EngineHandle};
pub use shared::error::{AddError, CatalogError, FetchError, PersistenceError, TrackerError};
pub use shared::events::SessionEvent;
pub use shared::logging::init_logging;
pub use shared::persistence::TrackedStore;
pub use shared::ratio::{classify, RatioSignal, Severity};
pub use shared::search::{SearchAction, SearchBox};
pub use shared::session::{Session, SessionSnapshot};
pub use shared::widget::{render_tracker, Focus, ViewState};

/// Core data types for the tracker
///
/// These types match the JSON format of the metrics API
/// (`/api/symbols`, `/api/coin/{symbol}`) and of the persisted tracked set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A futures symbol known to the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SymbolDescriptor {
    /// Uppercase ticker (e.g., "BTCUSDT")
    pub symbol: String,
    /// Whether circulating supply (and so the OI/supply ratio) is available
    pub supported: bool,
}

/// A symbol the user has chosen to monitor
///
/// Denormalized copy of the catalog descriptor, so the persisted tracked set
/// restores even when the catalog fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TrackedEntry {
    pub symbol: String,
    pub supported: bool,
}

impl From<SymbolDescriptor> for TrackedEntry {
    fn from(descriptor: SymbolDescriptor) -> Self {
        Self {
            symbol: descriptor.symbol,
            supported: descriptor.supported,
        }
    }
}

impl From<&SymbolDescriptor> for TrackedEntry {
    fn from(descriptor: &SymbolDescriptor) -> Self {
        Self::from(descriptor.clone())
    }
}

/// Derived metrics for one symbol, as returned by `/api/coin/{symbol}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CardMetrics {
    /// Last traded price
    pub price: f64,
    /// 24h price change in percent
    pub change_pct: f64,
    /// Open interest in coins
    pub open_interest: f64,
    /// Open interest notional in USDT
    pub open_interest_usdt: f64,
    /// Circulating supply (None when no supply source knows the coin)
    #[serde(default)]
    pub circulating_supply: Option<f64>,
    /// 24h quote volume in USDT
    pub volume_usdt: f64,
    /// Open interest / circulating supply, in percent
    #[serde(default)]
    pub oi_supply_ratio: Option<f64>,
    /// Receipt time (stamped client side, the server does not send it)
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

/// Lifecycle of a single tracked card
#[derive(Debug, Clone, PartialEq)]
pub enum CardState {
    /// Fetch in flight. Keeps the last loaded snapshot, if any, for display.
    Loading { previous: Option<Box<CardMetrics>> },
    Loaded(CardMetrics),
    Error(String),
}

impl CardState {
    /// Fresh card with nothing to show yet
    pub fn loading() -> Self {
        CardState::Loading { previous: None }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, CardState::Loading { .. })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, CardState::Loaded(_))
    }

    /// Metrics to display: the loaded snapshot, or the one kept while re-fetching
    pub fn metrics(&self) -> Option<&CardMetrics> {
        match self {
            CardState::Loaded(metrics) => Some(metrics),
            CardState::Loading { previous } => previous.as_deref(),
            CardState::Error(_) => None,
        }
    }

    /// Transition into `Loading`, carrying over any loaded snapshot
    pub fn into_loading(self) -> Self {
        match self {
            CardState::Loaded(metrics) => CardState::Loading {
                previous: Some(Box::new(metrics)),
            },
            CardState::Loading { previous } => CardState::Loading { previous },
            CardState::Error(_) => CardState::loading(),
        }
    }
}

/// Global status shown in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalStatus {
    Loading,
    Active,
    Error,
}

impl GlobalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalStatus::Loading => "LOADING",
            GlobalStatus::Active => "LIVE",
            GlobalStatus::Error => "CONNECTION ERROR",
        }
    }
}

impl std::fmt::Display for GlobalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session change notifications for presentation sinks
use tokio::sync::mpsc;

use super::types::GlobalStatus;

/// State change emitted by the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Tracked set membership or order changed
    TrackedSetChanged { symbols: Vec<String> },
    /// A card moved to a new state
    CardStateChanged { symbol: String },
    /// One second elapsed
    CountdownTicked { remaining: u32, progress: f64 },
    GlobalStatusChanged { status: GlobalStatus },
}

/// Fan-out of session events to registered observers
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver to every live observer, dropping closed ones
    pub fn publish(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

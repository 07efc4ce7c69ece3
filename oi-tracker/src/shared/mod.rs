/// Shared modules for the OI tracker
pub mod api;
pub mod cards;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod format;
pub mod logging;
pub mod persistence;
pub mod ratio;
pub mod scheduler;
pub mod search;
pub mod session;
pub mod types;
pub mod widget;

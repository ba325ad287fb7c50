//! Unit Ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod catalog;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod outbox;
pub mod posting;
pub mod projection;
pub mod state;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use domain::{Amount, AmountError, DomainError, OperationContext};
pub use error::{AppError, AppResult};
pub use state::AppState;

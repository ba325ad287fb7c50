//! Command Handlers module
//!
//! Handlers that orchestrate ledger writes: manual maintenance and the
//! settlement workflow.

mod commands;
mod ledger_handler;
mod settlement_handler;
mod unit_lock;

#[cfg(test)]
mod tests;

pub use commands::*;
pub use ledger_handler::LedgerHandler;
pub use settlement_handler::SettlementHandler;
pub use unit_lock::UnitLocks;

//! Posting Outbox
//!
//! Durable queue between the after-save hook and the posting engine.
//! Delivery is at-least-once; the posting id makes repeats harmless.

mod model;
mod service;

pub use model::{dedupe_key, OutboxStatus, PendingPosting};
pub use service::{HookReceipt, OutboxReport, OutboxService};

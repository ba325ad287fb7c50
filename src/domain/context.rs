//! Operation Context
//!
//! Contains metadata about the current operation for logging and for the
//! `responsible_party` of rows written on behalf of a staff member.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Context for an operation, used for attribution and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Acting staff member (from the X-Actor header)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            actor: None,
            correlation_id: None,
            client_ip: None,
        }
    }

    /// Context for work done by the system itself (outbox worker, scheduler)
    pub fn system() -> Self {
        Self::new().with_correlation_id(Uuid::new_v4())
    }

    /// Create context with the acting staff member. Blank names are ignored.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        let actor = actor.into();
        let trimmed = actor.trim();
        if !trimmed.is_empty() {
            self.actor = Some(trimmed.to_string());
        }
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    /// The acting staff member, or the automatic label of the unit.
    pub fn responsible_party_for(&self, unit: &str) -> String {
        self.actor
            .clone()
            .unwrap_or_else(|| format!("{} (Otomatis)", unit))
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let correlation_id = Uuid::new_v4();

        let context = OperationContext::new()
            .with_actor("Ust. Hasan")
            .with_correlation_id(correlation_id);

        assert_eq!(context.actor.as_deref(), Some("Ust. Hasan"));
        assert_eq!(context.correlation_id, Some(correlation_id));
    }

    #[test]
    fn test_blank_actor_ignored() {
        let context = OperationContext::new().with_actor("   ");
        assert!(context.actor.is_none());
    }

    #[test]
    fn test_ensure_correlation_id() {
        let mut context = OperationContext::new();
        assert!(context.correlation_id.is_none());

        let id = context.ensure_correlation_id();
        assert_eq!(context.correlation_id, Some(id));

        // Calling again should return the same ID
        assert_eq!(context.ensure_correlation_id(), id);
    }

    #[test]
    fn test_responsible_party_defaults_to_unit() {
        let anonymous = OperationContext::new();
        assert_eq!(anonymous.responsible_party_for("Keamanan"), "Keamanan (Otomatis)");

        let staff = OperationContext::new().with_actor("Ahmad");
        assert_eq!(staff.responsible_party_for("Keamanan"), "Ahmad");
    }
}

//! Posting triggers
//!
//! Domain events raised by other modules after a successful save, which may
//! produce a fee posting on a unit ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which domain rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    LeaveRequestSaved,
    ItemRegistrationSaved,
    HealthStatusChanged,
    StudentStatusMutated,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::LeaveRequestSaved => "leave_request_saved",
            TriggerKind::ItemRegistrationSaved => "item_registration_saved",
            TriggerKind::HealthStatusChanged => "health_status_changed",
            TriggerKind::StudentStatusMutated => "student_status_mutated",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger with its trigger-specific fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum PostingTrigger {
    /// A leave request ("perizinan") was saved
    LeaveRequestSaved { reason: String },

    /// An item (vehicle, electronics, instrument) was registered
    ItemRegistrationSaved {
        category: String,
        #[serde(default)]
        item_type: Option<String>,
    },

    /// A health visit changed a student's status
    HealthStatusChanged { status: String },

    /// A student's status was mutated (boyong, pindah, ...)
    StudentStatusMutated { mutation: String },
}

impl PostingTrigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            PostingTrigger::LeaveRequestSaved { .. } => TriggerKind::LeaveRequestSaved,
            PostingTrigger::ItemRegistrationSaved { .. } => TriggerKind::ItemRegistrationSaved,
            PostingTrigger::HealthStatusChanged { .. } => TriggerKind::HealthStatusChanged,
            PostingTrigger::StudentStatusMutated { .. } => TriggerKind::StudentStatusMutated,
        }
    }

    /// The field rules match on first (reason, category, status, mutation)
    pub fn primary_value(&self) -> &str {
        match self {
            PostingTrigger::LeaveRequestSaved { reason } => reason,
            PostingTrigger::ItemRegistrationSaved { category, .. } => category,
            PostingTrigger::HealthStatusChanged { status } => status,
            PostingTrigger::StudentStatusMutated { mutation } => mutation,
        }
    }

    /// Sub-type, only item registrations carry one
    pub fn secondary_value(&self) -> Option<&str> {
        match self {
            PostingTrigger::ItemRegistrationSaved { item_type, .. } => item_type.as_deref(),
            _ => None,
        }
    }
}

/// Everything the posting engine needs to know about a saved domain record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRequest {
    #[serde(flatten)]
    pub trigger: PostingTrigger,
    pub unit: String,
    pub subject_name: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub responsible_party: Option<String>,
    pub date: NaiveDate,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
    /// Id of the triggering record in its own module, used to deduplicate hook calls
    #[serde(default)]
    pub source_id: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl PostingRequest {
    pub fn new(
        trigger: PostingTrigger,
        unit: impl Into<String>,
        subject_name: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            trigger,
            unit: unit.into(),
            subject_name: subject_name.into(),
            subject_id: None,
            responsible_party: None,
            date,
            quantity: default_quantity(),
            note: None,
            source_id: None,
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn with_responsible_party(mut self, party: impl Into<String>) -> Self {
        self.responsible_party = Some(party.into());
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialize_flattened_trigger() {
        let json = r#"{
            "trigger": "leave_request_saved",
            "reason": "Pulang",
            "unit": "Keamanan",
            "subject_name": "Muhammad Faiz",
            "date": "2024-01-15"
        }"#;

        let request: PostingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.trigger.kind(), TriggerKind::LeaveRequestSaved);
        assert_eq!(request.trigger.primary_value(), "Pulang");
        assert_eq!(request.quantity, 1);
        assert!(request.source_id.is_none());
    }

    #[test]
    fn test_item_registration_values() {
        let trigger = PostingTrigger::ItemRegistrationSaved {
            category: "Kendaraan".to_string(),
            item_type: Some("Motor".to_string()),
        };

        assert_eq!(trigger.primary_value(), "Kendaraan");
        assert_eq!(trigger.secondary_value(), Some("Motor"));
        assert_eq!(trigger.kind().as_str(), "item_registration_saved");
    }
}

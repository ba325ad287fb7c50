//! Posting rules
//!
//! Data-driven mapping from a domain trigger to the billable service it
//! produces. The first matching rule wins.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{Amount, PostingRequest, TriggerKind};

/// Category written on cash movements produced by postings
pub const DEFAULT_CATEGORY: &str = "Pendapatan Layanan";

/// One row of the rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRule {
    pub trigger: TriggerKind,

    /// Accepted values of the trigger's primary field. Empty matches any.
    #[serde(default)]
    pub values: Vec<String>,

    /// Accepted sub-types (item type). Empty matches any, including none.
    #[serde(default)]
    pub sub_types: Vec<String>,

    /// Only fire for requests from this unit
    #[serde(default)]
    pub unit: Option<String>,

    /// Service name, may contain `{value}` and `{unit}`
    pub service_name: String,

    /// Unit whose ledger receives the posting instead of the requesting unit
    #[serde(default)]
    pub unit_override: Option<String>,

    #[serde(default = "default_category")]
    pub category: String,

    /// Price used when the fee catalog has no entry
    pub default_price: Amount,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl PostingRule {
    fn new(trigger: TriggerKind, values: &[&str], service_name: &str, default_price: i64) -> Self {
        Self {
            trigger,
            values: values.iter().map(|v| v.to_string()).collect(),
            sub_types: Vec::new(),
            unit: None,
            service_name: service_name.to_string(),
            unit_override: None,
            category: default_category(),
            default_price: Amount::from_integer(default_price).unwrap_or_default(),
        }
    }

    fn with_sub_types(mut self, sub_types: &[&str]) -> Self {
        self.sub_types = sub_types.iter().map(|v| v.to_string()).collect();
        self
    }

    fn with_unit_override(mut self, unit: &str) -> Self {
        self.unit_override = Some(unit.to_string());
        self
    }

    pub fn matches(&self, request: &PostingRequest) -> bool {
        if self.trigger != request.trigger.kind() {
            return false;
        }

        if let Some(unit) = &self.unit {
            if unit != request.unit.trim() {
                return false;
            }
        }

        let value = request.trigger.primary_value().trim();
        if !self.values.is_empty() && !self.values.iter().any(|v| v == value) {
            return false;
        }

        if !self.sub_types.is_empty() {
            let sub_type = request.trigger.secondary_value().map(str::trim);
            if !sub_type.map_or(false, |s| self.sub_types.iter().any(|t| t == s)) {
                return false;
            }
        }

        true
    }

    fn render(&self, template: &str, request: &PostingRequest) -> String {
        template
            .replace("{value}", request.trigger.primary_value().trim())
            .replace("{unit}", request.unit.trim())
    }
}

/// Outcome of matching a request against the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPosting {
    pub service_name: String,
    /// Ledger that receives the posting
    pub unit: String,
    pub category: String,
    pub default_price: Amount,
}

/// Errors loading a rule table
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse rule file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid rule #{index}: {reason}")]
    Invalid { index: usize, reason: String },
}

/// Ordered posting rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: Vec<PostingRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<PostingRule>) -> Result<Self, RuleError> {
        for (index, rule) in rules.iter().enumerate() {
            if rule.service_name.trim().is_empty() {
                return Err(RuleError::Invalid {
                    index,
                    reason: "service_name is empty".to_string(),
                });
            }
            if matches!(&rule.unit_override, Some(u) if u.trim().is_empty()) {
                return Err(RuleError::Invalid {
                    index,
                    reason: "unit_override is blank".to_string(),
                });
            }
        }
        Ok(Self { rules })
    }

    /// The rules the institution runs with out of the box.
    pub fn builtin() -> Self {
        use TriggerKind::*;

        let rules = vec![
            PostingRule::new(LeaveRequestSaved, &["Pulang"], "Izin Pulang", 2000),
            PostingRule::new(LeaveRequestSaved, &["Izin Sekolah"], "Izin Sekolah", 2000),
            PostingRule::new(ItemRegistrationSaved, &["Kendaraan"], "Registrasi Motor", 10000)
                .with_sub_types(&["Motor"]),
            PostingRule::new(ItemRegistrationSaved, &["Kendaraan"], "Registrasi Sepeda", 5000)
                .with_sub_types(&["Sepeda"]),
            PostingRule::new(ItemRegistrationSaved, &["Kendaraan"], "Registrasi Kendaraan", 10000),
            PostingRule::new(ItemRegistrationSaved, &["Elektronik"], "Registrasi Elektronik", 5000),
            PostingRule::new(ItemRegistrationSaved, &["Alat Musik"], "Sewa Rebana Jam'iyyah", 15000)
                .with_sub_types(&["Rebana"])
                .with_unit_override("Jam'iyyah"),
            PostingRule::new(HealthStatusChanged, &["Izin Sakit"], "Surat Izin Sakit", 2000),
            PostingRule::new(StudentStatusMutated, &["Boyong", "Pindah"], "Surat {value}", 10000),
        ];

        Self { rules }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RuleError> {
        let rules: Vec<PostingRule> = serde_json::from_str(json)?;
        Self::new(rules)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn rules(&self) -> &[PostingRule] {
        &self.rules
    }

    /// First rule matching `request`, rendered for it.
    pub fn resolve(&self, request: &PostingRequest) -> Option<ResolvedPosting> {
        let rule = self.rules.iter().find(|rule| rule.matches(request))?;

        let unit = match &rule.unit_override {
            Some(unit) => unit.clone(),
            None => request.unit.trim().to_string(),
        };

        Some(ResolvedPosting {
            service_name: rule.render(&rule.service_name, request),
            unit,
            category: rule.category.clone(),
            default_price: rule.default_price,
        })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::utils::same_tax_id;
use shared::TargetSystem;
use std::collections::HashSet;

/// Canonical invoice shape produced by both portal clients.
///
/// Built fresh for every query response and never mutated afterwards.
/// `value` is always non-negative; sources with a missing or malformed
/// amount yield zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceRecord {
    pub source: TargetSystem,
    /// Opaque document identifier; its format depends on the portal.
    pub access_key: String,
    pub number: String,
    pub issue_date: Option<NaiveDate>,
    pub value: Decimal,
    pub provider_tax_id: String,
    pub provider_name: String,
    pub customer_tax_id: String,
    pub customer_name: String,
    pub service_description: String,
    pub municipality_code: String,
    /// Municipal verification code, needed for the public viewer link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_source: Option<String>,
}

impl InvoiceRecord {
    pub fn empty(source: TargetSystem) -> Self {
        Self {
            source,
            access_key: String::new(),
            number: String::new(),
            issue_date: None,
            value: Decimal::ZERO,
            provider_tax_id: String::new(),
            provider_name: String::new(),
            customer_tax_id: String::new(),
            customer_name: String::new(),
            service_description: String::new(),
            municipality_code: String::new(),
            verification_code: None,
            raw_source: None,
        }
    }

    pub fn is_for_customer(&self, customer_tax_id: &str) -> bool {
        same_tax_id(&self.customer_tax_id, customer_tax_id)
    }
}

/// Keep the first record for every access key; records without a key are kept as-is.
pub fn dedupe_by_access_key(records: Vec<InvoiceRecord>) -> Vec<InvoiceRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| record.access_key.is_empty() || seen.insert(record.access_key.clone()))
        .collect()
}

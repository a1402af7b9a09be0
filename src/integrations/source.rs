//! One capability interface over both portals.

use super::municipal::MunicipalQueryClient;
use super::national::NationalDistributionClient;
use crate::error::{IntegrationError, Result};
use crate::models::InvoiceRecord;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::TargetSystem;

/// Portal-agnostic query. `municipal_registration` is required by the municipal portal only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceQuery {
    pub provider_tax_id: String,
    pub municipal_registration: Option<String>,
    pub customer_tax_id: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Identifies the rendering of one invoice on its portal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DocumentReference {
    National {
        access_key: String,
    },
    Municipal {
        provider_tax_id: String,
        municipal_registration: String,
        document_number: String,
        verification_code: String,
    },
}

impl DocumentReference {
    pub fn target(&self) -> TargetSystem {
        match self {
            DocumentReference::National { .. } => TargetSystem::National,
            DocumentReference::Municipal { .. } => TargetSystem::Municipal,
        }
    }

    /// Stable key used in logs, audit subjects and artifact names.
    pub fn key(&self) -> String {
        match self {
            DocumentReference::National { access_key } => access_key.clone(),
            DocumentReference::Municipal {
                document_number,
                verification_code,
                ..
            } => format!("{}-{}", document_number, verification_code),
        }
    }

    /// Reference for a record returned by a query. Municipal records need the
    /// provider's registration, which the record itself does not carry.
    pub fn for_record(record: &InvoiceRecord, municipal_registration: Option<&str>) -> Option<Self> {
        match record.source {
            TargetSystem::National => Some(DocumentReference::National {
                access_key: record.access_key.clone(),
            }),
            TargetSystem::Municipal => Some(DocumentReference::Municipal {
                provider_tax_id: record.provider_tax_id.clone(),
                municipal_registration: municipal_registration?.to_string(),
                document_number: record.number.clone(),
                verification_code: record.verification_code.clone()?,
            }),
        }
    }
}

#[async_trait]
pub trait InvoiceSource: Send + Sync {
    fn target(&self) -> TargetSystem;

    async fn query(&self, query: &InvoiceQuery) -> Result<Vec<InvoiceRecord>>;

    async fn fetch_rendered_document(&self, reference: &DocumentReference) -> Result<Bytes>;
}

fn wrong_reference(expected: TargetSystem, reference: &DocumentReference) -> IntegrationError {
    IntegrationError::invalid_request(format!(
        "{} reference passed to the {} portal",
        reference.target(),
        expected
    ))
}

#[async_trait]
impl InvoiceSource for NationalDistributionClient {
    fn target(&self) -> TargetSystem {
        TargetSystem::National
    }

    async fn query(&self, query: &InvoiceQuery) -> Result<Vec<InvoiceRecord>> {
        match query.customer_tax_id.as_deref() {
            Some(customer) => {
                self.query_by_customer(&query.provider_tax_id, customer, query.start, query.end)
                    .await
            }
            None => {
                let period = self.resolve_period(query.start, query.end);
                self.query_by_period(&query.provider_tax_id, period.start, period.end)
                    .await
            }
        }
    }

    async fn fetch_rendered_document(&self, reference: &DocumentReference) -> Result<Bytes> {
        match reference {
            DocumentReference::National { access_key } => {
                NationalDistributionClient::fetch_rendered_document(self, access_key).await
            }
            other => Err(wrong_reference(TargetSystem::National, other)),
        }
    }
}

#[async_trait]
impl InvoiceSource for MunicipalQueryClient {
    fn target(&self) -> TargetSystem {
        TargetSystem::Municipal
    }

    async fn query(&self, query: &InvoiceQuery) -> Result<Vec<InvoiceRecord>> {
        let registration = query
            .municipal_registration
            .as_deref()
            .ok_or_else(|| IntegrationError::invalid_request("municipal registration is required"))?;

        self.query_by_customer(
            &query.provider_tax_id,
            registration,
            query.customer_tax_id.as_deref(),
            query.start,
            query.end,
        )
        .await
    }

    async fn fetch_rendered_document(&self, reference: &DocumentReference) -> Result<Bytes> {
        match reference {
            DocumentReference::Municipal {
                provider_tax_id,
                municipal_registration,
                document_number,
                verification_code,
            } => {
                MunicipalQueryClient::fetch_rendered_document(
                    self,
                    provider_tax_id,
                    municipal_registration,
                    document_number,
                    verification_code,
                )
                .await
            }
            other => Err(wrong_reference(TargetSystem::Municipal, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_for_municipal_record_needs_registration_and_code() {
        let mut record = InvoiceRecord::empty(TargetSystem::Municipal);
        record.number = "10".to_string();
        record.provider_tax_id = "12345678000199".to_string();
        assert_eq!(DocumentReference::for_record(&record, Some("123")), None);

        record.verification_code = Some("ABC".to_string());
        assert_eq!(DocumentReference::for_record(&record, None), None);

        let reference = DocumentReference::for_record(&record, Some("123")).unwrap();
        assert_eq!(reference.target(), TargetSystem::Municipal);
        assert_eq!(reference.key(), "10-ABC");
    }

    #[test]
    fn test_reference_for_national_record() {
        let mut record = InvoiceRecord::empty(TargetSystem::National);
        record.access_key = "3550".to_string();
        let reference = DocumentReference::for_record(&record, None).unwrap();
        assert_eq!(reference, DocumentReference::National { access_key: "3550".to_string() });
    }
}

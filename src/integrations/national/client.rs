use super::document::{
    decode_payload, record_from_xml, AccessKeyResponse, DistributionResponse, RawDocument,
    STATUS_NO_DOCUMENTS,
};
use super::pagination::{collect_period, DistributionFeed};
use crate::certificates::CertificateRegistry;
use crate::error::{IntegrationError, Result};
use crate::models::InvoiceRecord;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Local, NaiveDate};
use reqwest::StatusCode;
use shared::utils::digits_only;
use shared::{Period, TargetSystem};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TARGET: TargetSystem = TargetSystem::National;

/// REST client for the national NFS-e distribution portal (ADN).
///
/// Every call captures the national identity from the registry at its
/// start and uses that identity's mutual-TLS client until it returns.
#[derive(Debug, Clone)]
pub struct NationalDistributionClient {
    registry: Arc<CertificateRegistry>,
    base_url: String,
    default_window_days: i64,
}

impl NationalDistributionClient {
    pub fn new(registry: Arc<CertificateRegistry>, base_url: impl Into<String>) -> Self {
        Self {
            registry,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_window_days: 30,
        }
    }

    pub fn with_default_window_days(mut self, days: i64) -> Self {
        self.default_window_days = days;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One page of distributed documents for `interested_party` starting after `cursor`.
    pub async fn fetch_page(&self, interested_party: &str, cursor: u64) -> Result<Vec<RawDocument>> {
        let identity = self.registry.require(TARGET)?;
        let url = format!("{}/contribuintes/DFe/{}", self.base_url, cursor);
        debug!("🌐 Fetching distribution page: {} (cursor {})", url, cursor);

        let response = identity
            .client()
            .get(&url)
            .query(&[("cnpjConsulta", digits_only(interested_party).as_str()), ("lote", "true")])
            .send()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;

        if status == StatusCode::NOT_FOUND {
            // The portal reports an exhausted feed as 404 with a regular status body.
            if let Ok(page) = serde_json::from_str::<DistributionResponse>(&body) {
                if page.status == STATUS_NO_DOCUMENTS {
                    return Ok(Vec::new());
                }
            }
        }

        if !status.is_success() {
            return Err(IntegrationError::Status {
                target: TARGET,
                status: status.as_u16(),
                body,
            });
        }

        let page: DistributionResponse = serde_json::from_str(&body)
            .map_err(|e| IntegrationError::malformed(TARGET, format!("distribution page: {}", e)))?;

        if !page.errors.is_empty() {
            warn!("⚠️ Distribution page at cursor {} carried errors: {:?}", cursor, page.errors);
        }
        Ok(page.documents)
    }

    /// Point lookup of a single invoice. `None` when the portal does not know the key.
    pub async fn fetch_by_access_key(&self, access_key: &str) -> Result<Option<InvoiceRecord>> {
        let identity = self.registry.require(TARGET)?;
        let url = format!("{}/contribuintes/NFSe/{}", self.base_url, access_key.trim());

        let response = identity
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("🔍 Access key {} not found on national portal", access_key);
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;
        if !status.is_success() {
            return Err(IntegrationError::Status {
                target: TARGET,
                status: status.as_u16(),
                body,
            });
        }

        let lookup: AccessKeyResponse = serde_json::from_str(&body)
            .map_err(|e| IntegrationError::malformed(TARGET, format!("access key lookup: {}", e)))?;
        let xml = decode_payload(&lookup.payload)
            .map_err(|e| IntegrationError::malformed(TARGET, e.to_string()))?;

        let key = if lookup.access_key.is_empty() {
            access_key
        } else {
            lookup.access_key.as_str()
        };
        Ok(Some(record_from_xml(&xml, key)))
    }

    /// Rendered PDF (DANFSe) for an access key.
    pub async fn fetch_rendered_document(&self, access_key: &str) -> Result<Bytes> {
        let identity = self.registry.require(TARGET)?;
        let url = format!("{}/contribuintes/danfse/{}", self.base_url, access_key.trim());

        let response = identity
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(IntegrationError::not_available(access_key));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Status {
                target: TARGET,
                status: status.as_u16(),
                body,
            });
        }

        let pdf = response
            .bytes()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;
        if pdf.is_empty() {
            return Err(IntegrationError::not_available(access_key));
        }

        info!("📥 Downloaded DANFSe for {} ({} bytes)", access_key, pdf.len());
        Ok(pdf)
    }

    /// Every invoice issued by `provider_tax_id` with an issue date in `[start, end]`.
    pub async fn query_by_period(
        &self,
        provider_tax_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<InvoiceRecord>> {
        if start > end {
            return Err(IntegrationError::invalid_request(format!(
                "period start {} is after end {}",
                start, end
            )));
        }
        collect_period(self, &digits_only(provider_tax_id), Period::new(start, end)).await
    }

    /// Fill missing bounds from the trailing window ending today.
    pub fn resolve_period(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Period {
        Period::resolve(start, end, Local::now().date_naive(), self.default_window_days)
    }

    /// Invoices for one customer; the period defaults to the trailing window ending today.
    pub async fn query_by_customer(
        &self,
        provider_tax_id: &str,
        customer_tax_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<InvoiceRecord>> {
        let period = self.resolve_period(start, end);
        let records = self
            .query_by_period(provider_tax_id, period.start, period.end)
            .await?;

        Ok(records
            .into_iter()
            .filter(|record| record.is_for_customer(customer_tax_id))
            .collect())
    }
}

#[async_trait]
impl DistributionFeed for NationalDistributionClient {
    async fn fetch_page(&self, interested_party: &str, cursor: u64) -> Result<Vec<RawDocument>> {
        NationalDistributionClient::fetch_page(self, interested_party, cursor).await
    }
}

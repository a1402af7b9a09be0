use super::envelope::{soap_envelope, ServiceQuery, SOAP_ACTION};
use super::response::parse_response;
use crate::certificates::CertificateRegistry;
use crate::error::{IntegrationError, Result};
use crate::models::{dedupe_by_access_key, InvoiceRecord};
use bytes::Bytes;
use chrono::{Local, NaiveDate};
use reqwest::{Client, StatusCode};
use shared::config::MunicipalConfig;
use shared::utils::digits_only;
use shared::{Period, TargetSystem};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const TARGET: TargetSystem = TargetSystem::Municipal;

/// SOAP client for an ABRASF municipal NFS-e web service.
#[derive(Debug, Clone)]
pub struct MunicipalQueryClient {
    registry: Arc<CertificateRegistry>,
    endpoint_url: String,
    viewer_url: String,
    soap_version: String,
    max_pages: u32,
    default_window_days: i64,
    public_client: Client,
}

impl MunicipalQueryClient {
    pub fn new(registry: Arc<CertificateRegistry>, config: &MunicipalConfig, timeout: Duration) -> Result<Self> {
        let public_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IntegrationError::transport(TARGET, e))?;

        Ok(Self {
            registry,
            endpoint_url: config.endpoint_url.clone(),
            viewer_url: config.viewer_url.clone(),
            soap_version: config.soap_version.clone(),
            max_pages: config.max_pages.max(1),
            default_window_days: 30,
            public_client,
        })
    }

    pub fn with_default_window_days(mut self, days: i64) -> Self {
        self.default_window_days = days;
        self
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Invoices issued by the provider in `[start, end]`, optionally for one customer.
    ///
    /// A rejection reported inside the response (return message list) ends
    /// the query with whatever was collected so far and a warning.
    pub async fn query_by_period(
        &self,
        provider_tax_id: &str,
        municipal_registration: &str,
        start: NaiveDate,
        end: NaiveDate,
        customer_tax_id: Option<&str>,
    ) -> Result<Vec<InvoiceRecord>> {
        if start > end {
            return Err(IntegrationError::invalid_request(format!(
                "period start {} is after end {}",
                start, end
            )));
        }
        if municipal_registration.trim().is_empty() {
            return Err(IntegrationError::invalid_request("municipal registration is required"));
        }

        let identity = self.registry.require(TARGET)?;
        let mut query = ServiceQuery {
            provider_tax_id: digits_only(provider_tax_id),
            municipal_registration: municipal_registration.trim().to_string(),
            start,
            end,
            customer_tax_id: customer_tax_id.map(digits_only),
            page: 1,
        };
        let mut records = Vec::new();

        loop {
            let body = self.post_envelope(identity.client(), &query).await?;
            let parsed = parse_response(&body)
                .map_err(|e| IntegrationError::malformed(TARGET, e.to_string()))?;

            if parsed.is_rejection() {
                for message in &parsed.messages {
                    warn!(
                        "⚠️ Municipal portal rejected query for IM {}: [{}] {} {}",
                        query.municipal_registration, message.code, message.message, message.correction
                    );
                }
                break;
            }

            debug!("📄 Municipal page {} returned {} invoices", query.page, parsed.records.len());
            records.extend(parsed.records);

            match parsed.next_page {
                Some(next) if next > query.page && next <= self.max_pages => query.page = next,
                Some(next) if next > self.max_pages => {
                    warn!(
                        "⚠️ Municipal results truncated: page {} exceeds the limit of {} page(s)",
                        next, self.max_pages
                    );
                    break;
                }
                _ => break,
            }
        }

        info!("✅ Municipal query returned {} invoice(s)", records.len());
        Ok(dedupe_by_access_key(records))
    }

    /// Same as [`query_by_period`](Self::query_by_period) with the trailing window ending today.
    pub async fn query_by_customer(
        &self,
        provider_tax_id: &str,
        municipal_registration: &str,
        customer_tax_id: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<InvoiceRecord>> {
        let period = Period::resolve(start, end, Local::now().date_naive(), self.default_window_days);
        self.query_by_period(
            provider_tax_id,
            municipal_registration,
            period.start,
            period.end,
            customer_tax_id,
        )
        .await
    }

    /// Public viewer link for a municipal invoice. No network access.
    pub fn viewer_link(&self, document_number: &str, verification_code: &str, municipal_registration: &str) -> String {
        let params = [
            ("ccm", digits_only(municipal_registration)),
            ("nf", document_number.trim().to_string()),
            ("cod", verification_code.trim().to_string()),
        ];
        match Url::parse_with_params(&self.viewer_url, &params) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}?ccm={}&nf={}&cod={}",
                self.viewer_url, params[0].1, params[1].1, params[2].1
            ),
        }
    }

    /// Download the portal's rendering from its public link; no certificate is used.
    pub async fn fetch_rendered_document(
        &self,
        provider_tax_id: &str,
        municipal_registration: &str,
        document_number: &str,
        verification_code: &str,
    ) -> Result<Bytes> {
        let link = self.viewer_link(document_number, verification_code, municipal_registration);
        let key = format!("{}-{}", document_number, verification_code);

        let response = self
            .public_client
            .get(&link)
            .query(&[("cnpj", digits_only(provider_tax_id))])
            .send()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(IntegrationError::not_available(key));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Status {
                target: TARGET,
                status: status.as_u16(),
                body,
            });
        }

        let document = response
            .bytes()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;
        if document.is_empty() {
            return Err(IntegrationError::not_available(key));
        }

        info!("📥 Downloaded municipal rendering {} ({} bytes)", key, document.len());
        Ok(document)
    }

    async fn post_envelope(&self, client: &Client, query: &ServiceQuery) -> Result<String> {
        let envelope = soap_envelope(query, &self.soap_version);
        debug!("🌐 Posting ABRASF query page {} to {}", query.page, self.endpoint_url);

        let response = client
            .post(&self.endpoint_url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope)
            .send()
            .await
            .map_err(|e| IntegrationError::transport(TARGET, e))?;

        let status = response.status();
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
        Ok(body)
    }
}

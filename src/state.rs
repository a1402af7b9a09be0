use crate::archive::{ArchiveStream, BatchArchiveBuilder};
use crate::certificates::{CertificateRegistry, CertificateSummary};
use crate::error::{ArchiveError, CertificateError, Result};
use crate::integrations::{
    DocumentReference, InvoiceQuery, InvoiceSource, MunicipalQueryClient, NationalDistributionClient,
};
use crate::models::{ArchiveItem, AuditEvent, AuditEventType, InvoiceRecord};
use crate::status::IntegrationStatus;
use crate::storage::{ArtifactStore, AuditLog};
use bytes::Bytes;
use chrono::NaiveDate;
use shared::{IntegrationConfig, TargetSystem};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Shared integration state.
/// Holds the certificate registry, both portal clients and the storage collaborators.
#[derive(Clone)]
pub struct InvoiceIntegration {
    pub config: IntegrationConfig,
    pub certificates: Arc<CertificateRegistry>,
    pub national: Arc<NationalDistributionClient>,
    pub municipal: Arc<MunicipalQueryClient>,
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub audit_log: Arc<dyn AuditLog>,
}

impl InvoiceIntegration {
    pub fn new(
        config: IntegrationConfig,
        artifact_store: Arc<dyn ArtifactStore>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_seconds);
        let certificates = Arc::new(CertificateRegistry::new(timeout));

        let national = NationalDistributionClient::new(certificates.clone(), config.national.base_url.clone())
            .with_default_window_days(config.default_window_days);
        let municipal = MunicipalQueryClient::new(certificates.clone(), &config.municipal, timeout)?
            .with_default_window_days(config.default_window_days);

        info!(
            "🚀 NFS-e integration initialized (national: {}, municipal: {})",
            national.base_url(),
            municipal.endpoint_url()
        );

        Ok(Self {
            config,
            certificates,
            national: Arc::new(national),
            municipal: Arc::new(municipal),
            artifact_store,
            audit_log,
        })
    }

    // ========================================================================
    // CERTIFICATES
    // ========================================================================

    /// `false` when the bundle cannot be unlocked; the previous identity stays in place.
    pub fn configure_certificate(&self, bundle: &[u8], secret: &str, target: TargetSystem) -> bool {
        match self.try_configure_certificate(bundle, secret, target) {
            Ok(summary) => {
                info!(
                    "🔐 Certificate configured for {} portal: {} (expires {:?})",
                    target, summary.subject, summary.expires_at
                );
                true
            }
            Err(e) => {
                error!("❌ Certificate configuration for {} portal failed: {}", target, e);
                false
            }
        }
    }

    pub fn try_configure_certificate(
        &self,
        bundle: &[u8],
        secret: &str,
        target: TargetSystem,
    ) -> std::result::Result<CertificateSummary, CertificateError> {
        self.certificates.configure(bundle, secret, target)
    }

    pub fn is_configured(&self, target: TargetSystem) -> bool {
        self.certificates.is_configured(target)
    }

    pub fn status(&self) -> IntegrationStatus {
        IntegrationStatus::collect(&self.certificates, |target| match target {
            TargetSystem::National => self.national.base_url().to_string(),
            TargetSystem::Municipal => self.municipal.endpoint_url().to_string(),
        })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn source(&self, target: TargetSystem) -> &dyn InvoiceSource {
        match target {
            TargetSystem::National => self.national.as_ref(),
            TargetSystem::Municipal => self.municipal.as_ref(),
        }
    }

    /// National invoices for the provider, optionally for one customer.
    /// Missing bounds default to the trailing window ending today.
    pub async fn query_national(
        &self,
        provider_tax_id: &str,
        customer_tax_id: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<InvoiceRecord>> {
        let query = InvoiceQuery {
            provider_tax_id: provider_tax_id.to_string(),
            municipal_registration: None,
            customer_tax_id: customer_tax_id.map(str::to_string),
            start,
            end,
        };
        self.national.query(&query).await
    }

    pub async fn query_municipal(
        &self,
        provider_tax_id: &str,
        municipal_registration: &str,
        customer_tax_id: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<InvoiceRecord>> {
        let query = InvoiceQuery {
            provider_tax_id: provider_tax_id.to_string(),
            municipal_registration: Some(municipal_registration.to_string()),
            customer_tax_id: customer_tax_id.map(str::to_string),
            start,
            end,
        };
        self.municipal.query(&query).await
    }

    // ========================================================================
    // RENDERED DOCUMENTS
    // ========================================================================

    pub async fn fetch_rendered_document(&self, reference: &DocumentReference) -> Result<Bytes> {
        self.source(reference.target())
            .fetch_rendered_document(reference)
            .await
    }

    pub fn viewer_link(&self, document_number: &str, verification_code: &str, municipal_registration: &str) -> String {
        self.municipal
            .viewer_link(document_number, verification_code, municipal_registration)
    }

    /// Fetch a rendering, write it to the artifact store and record a `download` audit event.
    /// Returns the stored location.
    pub async fn store_rendered_document(&self, reference: &DocumentReference, actor: &str) -> Result<String> {
        let document = self.fetch_rendered_document(reference).await?;
        let size = document.len();
        let artifact_ref = artifact_reference(reference);

        let location = self
            .artifact_store
            .write_artifact(&artifact_ref, document)
            .await?;
        info!("💾 Stored rendering {} at {}", reference.key(), location);

        let event = AuditEvent::new(AuditEventType::Download)
            .actor(actor)
            .subject(reference.key())
            .detail(serde_json::json!({
                "source": reference.target(),
                "location": location,
                "bytes": size,
            }));
        if let Err(e) = self.audit_log.record(event).await {
            warn!("⚠️ Failed to record download audit event for {}: {}", reference.key(), e);
        }

        Ok(location)
    }

    // ========================================================================
    // BATCH ARCHIVES
    // ========================================================================

    pub fn batch_archive_builder(&self) -> BatchArchiveBuilder {
        BatchArchiveBuilder::new(self.artifact_store.clone())
            .with_audit(self.audit_log.clone())
            .with_concurrency(self.config.archive.concurrency)
    }

    pub fn build_batch_archive(
        &self,
        actor: &str,
        items: Vec<ArchiveItem>,
    ) -> std::result::Result<ArchiveStream, ArchiveError> {
        self.batch_archive_builder().build(actor, items)
    }
}

/// `{source}/{key}.pdf` with path separators in the key replaced.
fn artifact_reference(reference: &DocumentReference) -> String {
    let key: String = reference
        .key()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}/{}.pdf", reference.target(), key)
}

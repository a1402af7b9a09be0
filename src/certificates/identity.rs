use crate::error::CertificateError;
use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use reqwest::{Client, Identity};
use serde::{Deserialize, Serialize};
use shared::TargetSystem;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("nfse_ws/", env!("CARGO_PKG_VERSION"));

/// Display data recorded when a certificate is configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateSummary {
    pub target: TargetSystem,
    pub subject: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CertificateSummary {
    /// Informational only; expired certificates are still used and left to the TLS handshake.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// A client certificate unlocked from a PKCS#12 bundle, with a ready mutual-TLS client.
///
/// Every derived part is built in `from_pkcs12`; an identity either exists
/// whole or not at all.
pub struct CertificateIdentity {
    target: TargetSystem,
    bundle: Vec<u8>,
    certificate: X509,
    private_key: PKey<Private>,
    client: Client,
    summary: CertificateSummary,
}

impl CertificateIdentity {
    pub fn from_pkcs12(
        bundle: &[u8],
        secret: &str,
        target: TargetSystem,
        timeout: Duration,
    ) -> Result<Self, CertificateError> {
        let container = Pkcs12::from_der(bundle)
            .map_err(|e| CertificateError::invalid_bundle(e.to_string()))?;

        // A MAC mismatch is the only thing openssl reports for a bad password.
        let parsed = container.parse2(secret).map_err(|e| {
            debug!("PKCS#12 unlock failed: {}", e);
            CertificateError::WrongSecret
        })?;

        // Without a matching key openssl moves the leaf certificate into `ca`.
        let has_any_certificate =
            parsed.cert.is_some() || parsed.ca.as_ref().map(|ca| !ca.is_empty()).unwrap_or(false);
        let private_key = match parsed.pkey {
            Some(key) => key,
            None if has_any_certificate => return Err(CertificateError::MissingPrivateKey),
            None => return Err(CertificateError::MissingCertificate),
        };
        let certificate = parsed.cert.ok_or(CertificateError::MissingCertificate)?;

        let identity = Identity::from_pkcs12_der(bundle, secret)
            .map_err(|e| CertificateError::transport(e.to_string()))?;

        let client = Client::builder()
            .use_native_tls()
            .identity(identity)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CertificateError::transport(e.to_string()))?;

        let summary = CertificateSummary {
            target,
            subject: common_name(&certificate),
            expires_at: asn1_to_utc(certificate.not_after()),
        };

        info!(
            "🔐 Certificate '{}' unlocked for {} portal (expires {:?})",
            summary.subject, target, summary.expires_at
        );

        Ok(Self {
            target,
            bundle: bundle.to_vec(),
            certificate,
            private_key,
            client,
            summary,
        })
    }

    pub fn target(&self) -> TargetSystem {
        self.target
    }

    pub fn bundle(&self) -> &[u8] {
        &self.bundle
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// Mutual-TLS transport context bound to this identity.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn summary(&self) -> &CertificateSummary {
        &self.summary
    }
}

impl std::fmt::Debug for CertificateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateIdentity")
            .field("target", &self.target)
            .field("subject", &self.summary.subject)
            .field("expires_at", &self.summary.expires_at)
            .finish_non_exhaustive()
    }
}

fn common_name(certificate: &X509) -> String {
    certificate
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
        .unwrap_or_default()
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Option<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0).ok()?;
    let diff = epoch.diff(time).ok()?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

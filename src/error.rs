//! Error types for certificate handling, portal calls and batch archives

use shared::TargetSystem;
use thiserror::Error;

// ============================================================================
// CERTIFICATE ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Invalid certificate bundle: {message}")]
    InvalidBundle { message: String },

    #[error("Certificate password does not unlock the bundle")]
    WrongSecret,

    #[error("Certificate bundle has no certificate")]
    MissingCertificate,

    #[error("Certificate bundle has no private key")]
    MissingPrivateKey,

    #[error("Failed to build TLS client: {message}")]
    Transport { message: String },
}

impl CertificateError {
    pub fn invalid_bundle(message: impl Into<String>) -> Self {
        Self::InvalidBundle {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

// ============================================================================
// INTEGRATION ERRORS
// ============================================================================

pub type Result<T> = std::result::Result<T, IntegrationError>;

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("No certificate configured for the {target} portal")]
    NotConfigured { target: TargetSystem },

    #[error("Transport error talking to the {target} portal: {message}")]
    Transport { target: TargetSystem, message: String },

    #[error("The {target} portal answered HTTP {status}: {body}")]
    Status {
        target: TargetSystem,
        status: u16,
        body: String,
    },

    #[error("Rendered document not available for {key}")]
    NotAvailable { key: String },

    #[error("Malformed response from the {target} portal: {message}")]
    MalformedResponse { target: TargetSystem, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Artifact store error: {message}")]
    Store { message: String },

    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),
}

impl IntegrationError {
    pub fn transport(target: TargetSystem, err: reqwest::Error) -> Self {
        Self::Transport {
            target,
            message: err.to_string(),
        }
    }

    pub fn malformed(target: TargetSystem, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            target,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn not_available(key: impl Into<String>) -> Self {
        Self::NotAvailable { key: key.into() }
    }

    /// True when the caller has to configure a certificate before retrying.
    pub fn is_not_configured(&self) -> bool {
        matches!(
            self,
            IntegrationError::NotConfigured { .. } | IntegrationError::Certificate(_)
        )
    }

    /// HTTP status returned by the portal, when the failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            IntegrationError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            IntegrationError::NotConfigured { .. } => "NOT_CONFIGURED",
            IntegrationError::Transport { .. } => "TRANSPORT_ERROR",
            IntegrationError::Status { .. } => "HTTP_STATUS_ERROR",
            IntegrationError::NotAvailable { .. } => "NOT_AVAILABLE",
            IntegrationError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            IntegrationError::InvalidRequest { .. } => "INVALID_REQUEST",
            IntegrationError::Store { .. } => "STORE_ERROR",
            IntegrationError::Certificate(_) => "CERTIFICATE_ERROR",
        }
    }
}

// ============================================================================
// ARCHIVE ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Batch archive requested with no invoices")]
    EmptyBatch,

    #[error("Failed to write archive output: {message}")]
    Output { message: String },

    #[error("Artifact store error: {message}")]
    Store { message: String },

    #[error("Archive build was aborted before it was finalized")]
    Aborted,
}

impl ArchiveError {
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::output(err.to_string())
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::output(err.to_string())
    }
}

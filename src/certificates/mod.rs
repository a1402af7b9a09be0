//! Client certificate lifecycle for the mutual-TLS portal channels.

pub mod identity;
pub mod registry;

pub use identity::{CertificateIdentity, CertificateSummary};
pub use registry::CertificateRegistry;

use super::identity::{CertificateIdentity, CertificateSummary};
use crate::error::{CertificateError, IntegrationError};
use parking_lot::RwLock;
use shared::TargetSystem;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Process-wide holder of the configured client certificates, one per target.
///
/// Constructed once and shared (behind `Arc`) by both portal clients.
/// Replacing an identity swaps the `Arc`; in-flight requests keep the
/// identity they captured when they started.
#[derive(Debug)]
pub struct CertificateRegistry {
    slots: RwLock<HashMap<TargetSystem, Arc<CertificateIdentity>>>,
    timeout: Duration,
}

impl CertificateRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Unlock `bundle` and make it the identity for `target`.
    ///
    /// Parsing happens before the lock is taken; on failure the previous
    /// identity (if any) is left untouched.
    pub fn configure(
        &self,
        bundle: &[u8],
        secret: &str,
        target: TargetSystem,
    ) -> Result<CertificateSummary, CertificateError> {
        let identity = match CertificateIdentity::from_pkcs12(bundle, secret, target, self.timeout) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("⚠️ Rejected certificate for {} portal: {}", target, e);
                return Err(e);
            }
        };
        Ok(self.install(identity))
    }

    /// Swap in an already-built identity for its own target.
    pub fn install(&self, identity: CertificateIdentity) -> CertificateSummary {
        let summary = identity.summary().clone();
        let previous = self
            .slots
            .write()
            .insert(identity.target(), Arc::new(identity));

        if previous.is_some() {
            info!("🔄 Replaced certificate for {} portal", summary.target);
        }
        summary
    }

    pub fn clear(&self, target: TargetSystem) -> bool {
        let removed = self.slots.write().remove(&target).is_some();
        if removed {
            info!("🗑️ Certificate for {} portal removed", target);
        }
        removed
    }

    pub fn get(&self, target: TargetSystem) -> Option<Arc<CertificateIdentity>> {
        self.slots.read().get(&target).cloned()
    }

    pub fn require(&self, target: TargetSystem) -> Result<Arc<CertificateIdentity>, IntegrationError> {
        self.get(target)
            .ok_or(IntegrationError::NotConfigured { target })
    }

    pub fn is_configured(&self, target: TargetSystem) -> bool {
        self.slots.read().contains_key(&target)
    }

    pub fn summary(&self, target: TargetSystem) -> Option<CertificateSummary> {
        self.get(target).map(|identity| identity.summary().clone())
    }
}

impl Default for CertificateRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

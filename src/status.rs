//! Read-only view of which portal channels are ready for use.

use crate::certificates::CertificateRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::TargetSystem;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelStatus {
    pub target: TargetSystem,
    pub configured: bool,
    pub subject: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub endpoint: String,
}

impl ChannelStatus {
    /// Display hint only; requests still go out with an expired certificate.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationStatus {
    pub channels: Vec<ChannelStatus>,
    pub checked_at: DateTime<Utc>,
}

impl IntegrationStatus {
    /// Snapshot of `registry`, one entry per target in declaration order.
    pub fn collect<F>(registry: &CertificateRegistry, endpoint: F) -> Self
    where
        F: Fn(TargetSystem) -> String,
    {
        let channels = TargetSystem::ALL
            .iter()
            .map(|&target| {
                let summary = registry.summary(target);
                ChannelStatus {
                    target,
                    configured: summary.is_some(),
                    subject: summary.as_ref().map(|s| s.subject.clone()),
                    expires_at: summary.and_then(|s| s.expires_at),
                    endpoint: endpoint(target),
                }
            })
            .collect();

        Self {
            channels,
            checked_at: Utc::now(),
        }
    }

    pub fn channel(&self, target: TargetSystem) -> Option<&ChannelStatus> {
        self.channels.iter().find(|c| c.target == target)
    }

    pub fn is_configured(&self, target: TargetSystem) -> bool {
        self.channel(target).map(|c| c.configured).unwrap_or(false)
    }
}

// ============================================================================
// AUDIT LOG MODELS
// ============================================================================
// Events handed to the external audit log after downloads and batch exports.
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    #[serde(rename = "download")]
    Download,
    #[serde(rename = "batch-download")]
    BatchDownload,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Download => "download",
            AuditEventType::BatchDownload => "batch-download",
        }
    }
}

// ============================================================================
// AUDIT EVENT BUILDER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub actor: String,
    pub subject: String,
    pub detail: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            actor: String::new(),
            subject: String::new(),
            detail: serde_json::json!({}),
            occurred_at: Utc::now(),
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }
}

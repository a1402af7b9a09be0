use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One stored invoice requested for a batch export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveItem {
    pub id: String,
    /// Reference understood by the artifact store (path, object key, ...).
    pub artifact_ref: String,
    pub customer_tax_id: String,
    pub customer_name: String,
    pub issue_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Included { entry_name: String },
    Skipped { reason: String },
}

/// Per-item outcome of a finished batch archive, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub job_id: String,
    pub outcomes: Vec<(String, EntryOutcome)>,
    pub representative_customer: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ArchiveReport {
    pub fn included(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, EntryOutcome::Included { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.included()
    }

    pub fn entry_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                EntryOutcome::Included { entry_name } => Some(entry_name.as_str()),
                EntryOutcome::Skipped { .. } => None,
            })
            .collect()
    }
}

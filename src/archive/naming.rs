//! Deterministic entry names for batch archives.

use crate::models::ArchiveItem;
use shared::utils::digits_only;
use std::collections::HashSet;

const MAX_NAME_CHARS: usize = 30;

/// Customer name reduced to ASCII alphanumerics, spaces turned into `_`, at most 30 chars.
pub fn name_component(name: &str) -> String {
    deunicode::deunicode(name.trim())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .map(|c| if c == ' ' { '_' } else { c })
        .take(MAX_NAME_CHARS)
        .collect()
}

/// `{tax id digits}_{name}_{YYYY-MM-DD}_NFS-e.pdf`
pub fn entry_name(item: &ArchiveItem) -> String {
    format!(
        "{}_{}_{}_NFS-e.pdf",
        digits_only(&item.customer_tax_id),
        name_component(&item.customer_name),
        item.issue_date.format("%Y-%m-%d")
    )
}

/// Hands out entry names, suffixing `_2`, `_3`, ... when a name repeats in one archive.
#[derive(Debug, Default)]
pub struct EntryNamer {
    used: HashSet<String>,
}

impl EntryNamer {
    pub fn next(&mut self, item: &ArchiveItem) -> String {
        let base = entry_name(item);
        if self.used.insert(base.clone()) {
            return base;
        }

        let stem = base.trim_end_matches(".pdf");
        let mut counter = 2;
        loop {
            let candidate = format!("{}_{}.pdf", stem, counter);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

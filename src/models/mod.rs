pub mod archive;
pub mod audit_log;
pub mod invoice;

pub use archive::{ArchiveItem, ArchiveReport, EntryOutcome};
pub use audit_log::{AuditEvent, AuditEventType};
pub use invoice::{dedupe_by_access_key, InvoiceRecord};

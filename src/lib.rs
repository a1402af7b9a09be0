pub mod archive;
pub mod certificates;
pub mod error;
pub mod integrations;
pub mod models;
pub mod state;
pub mod status;
pub mod storage;

pub use archive::{ArchiveStream, BatchArchiveBuilder};
pub use certificates::{CertificateIdentity, CertificateRegistry, CertificateSummary};
pub use error::{ArchiveError, CertificateError, IntegrationError};
pub use integrations::{
    DocumentReference, InvoiceQuery, InvoiceSource, MunicipalQueryClient, NationalDistributionClient,
};
pub use models::{ArchiveItem, ArchiveReport, AuditEvent, AuditEventType, EntryOutcome, InvoiceRecord};
pub use shared::{IntegrationConfig, Period, TargetSystem};
pub use state::InvoiceIntegration;
pub use status::{ChannelStatus, IntegrationStatus};
pub use storage::{ArtifactStore, AuditLog, FsArtifactStore, MemoryArtifactStore, MemoryAuditLog};

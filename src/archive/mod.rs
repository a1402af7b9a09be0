//! Batch export of stored invoice PDFs into one streamed zip archive.

pub mod builder;
pub mod naming;

pub use builder::{ArchiveStream, BatchArchiveBuilder};
pub use naming::entry_name;

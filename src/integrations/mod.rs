//! Portal integrations and the shared parsing helpers they use.

pub mod municipal;
pub mod national;
pub mod source;
pub mod xml;

pub use municipal::MunicipalQueryClient;
pub use national::NationalDistributionClient;
pub use source::{DocumentReference, InvoiceQuery, InvoiceSource};

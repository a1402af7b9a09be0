//! Municipal NFS-e web service (ABRASF SOAP).

pub mod client;
pub mod envelope;
pub mod response;

pub use client::MunicipalQueryClient;
pub use response::{ParsedResponse, ReturnMessage};

//! National NFS-e distribution portal (REST, cursor-paginated).

pub mod client;
pub mod document;
pub mod pagination;

pub use client::NationalDistributionClient;
pub use document::{DistributionResponse, RawDocument};
pub use pagination::{DistributionFeed, PAGE_SIZE};

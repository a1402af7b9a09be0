//! Configuration management for the NFS-e integrations

use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_NATIONAL_BASE_URL: &str = "https://adn.nfse.gov.br";
pub const DEFAULT_MUNICIPAL_ENDPOINT_URL: &str = "https://nfse.prefeitura.gov.br/ws/nfse.asmx";
pub const DEFAULT_MUNICIPAL_VIEWER_URL: &str = "https://nfse.prefeitura.gov.br/contribuinte/notaprint.aspx";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub national: NationalConfig,
    pub municipal: MunicipalConfig,
    pub archive: ArchiveConfig,
    pub request_timeout_seconds: u64,
    pub default_window_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NationalConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MunicipalConfig {
    pub endpoint_url: String,
    pub viewer_url: String,
    pub soap_version: String,
    pub max_pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Upper bound on simultaneous artifact reads while building a batch.
    pub concurrency: usize,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            national: NationalConfig {
                base_url: DEFAULT_NATIONAL_BASE_URL.to_string(),
            },
            municipal: MunicipalConfig {
                endpoint_url: DEFAULT_MUNICIPAL_ENDPOINT_URL.to_string(),
                viewer_url: DEFAULT_MUNICIPAL_VIEWER_URL.to_string(),
                soap_version: "2.04".to_string(),
                max_pages: 50,
            },
            archive: ArchiveConfig { concurrency: 4 },
            request_timeout_seconds: 30,
            default_window_days: 30,
        }
    }
}

impl IntegrationConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(IntegrationConfig {
            national: NationalConfig {
                base_url: env::var("NFSE_NATIONAL_BASE_URL")
                    .unwrap_or(defaults.national.base_url),
            },
            municipal: MunicipalConfig {
                endpoint_url: env::var("NFSE_MUNICIPAL_ENDPOINT_URL")
                    .unwrap_or(defaults.municipal.endpoint_url),
                viewer_url: env::var("NFSE_MUNICIPAL_VIEWER_URL")
                    .unwrap_or(defaults.municipal.viewer_url),
                soap_version: env::var("NFSE_MUNICIPAL_SOAP_VERSION")
                    .unwrap_or(defaults.municipal.soap_version),
                max_pages: env::var("NFSE_MUNICIPAL_MAX_PAGES")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()?,
            },
            archive: ArchiveConfig {
                concurrency: env::var("NFSE_ARCHIVE_CONCURRENCY")
                    .unwrap_or_else(|_| "4".to_string())
                    .parse()?,
            },
            request_timeout_seconds: env::var("NFSE_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            default_window_days: env::var("NFSE_DEFAULT_WINDOW_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        })
    }

    pub fn with_national_base_url(mut self, url: impl Into<String>) -> Self {
        self.national.base_url = url.into();
        self
    }

    pub fn with_municipal_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.municipal.endpoint_url = url.into();
        self
    }

    pub fn with_municipal_viewer_url(mut self, url: impl Into<String>) -> Self {
        self.municipal.viewer_url = url.into();
        self
    }

    pub fn with_archive_concurrency(mut self, concurrency: usize) -> Self {
        self.archive.concurrency = concurrency.max(1);
        self
    }
}

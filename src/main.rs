use anyhow::{Context, Result};
use nfse_ws::{FsArtifactStore, IntegrationConfig, InvoiceIntegration, MemoryAuditLog, TargetSystem};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn configure_certificate_from_env(integration: &InvoiceIntegration) -> Result<()> {
    let Ok(path) = std::env::var("NFSE_CERT_PATH") else {
        info!("ℹ️ NFSE_CERT_PATH not set, no certificate configured");
        return Ok(());
    };
    let password = std::env::var("NFSE_CERT_PASSWORD").unwrap_or_default();
    let target: TargetSystem = std::env::var("NFSE_CERT_TARGET")
        .unwrap_or_else(|_| "national".to_string())
        .parse()
        .map_err(|e| anyhow::anyhow!("NFSE_CERT_TARGET: {}", e))?;

    let bundle = std::fs::read(&path).with_context(|| format!("failed to read certificate {}", path))?;
    if !integration.configure_certificate(&bundle, &password, target) {
        warn!("⚠️ Certificate at {} was not accepted for the {} portal", path, target);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Carga las variables de entorno desde el archivo .env. Falla silenciosamente si no existe.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = IntegrationConfig::from_env()?;
    let storage_root = std::env::var("NFSE_STORAGE_DIR").unwrap_or_else(|_| "storage".to_string());
    let integration = InvoiceIntegration::new(
        config,
        Arc::new(FsArtifactStore::new(storage_root)),
        Arc::new(MemoryAuditLog::new()),
    )?;

    configure_certificate_from_env(&integration)?;
    println!("{}", serde_json::to_string_pretty(&integration.status())?);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("national") => {
            let provider = args
                .get(1)
                .context("usage: nfse_ws national <providerTaxId> [customerTaxId]")?;
            let customer = args.get(2).map(String::as_str);

            let records = integration.query_national(provider, customer, None, None).await?;
            info!("📄 {} invoice(s) found", records.len());
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Some(other) => anyhow::bail!("unknown command: {}", other),
        None => {}
    }

    Ok(())
}

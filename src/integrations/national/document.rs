use crate::integrations::xml;
use crate::models::InvoiceRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use shared::utils::{digits_only, parse_amount, parse_issue_date};
use shared::TargetSystem;
use std::io::Read;
use thiserror::Error;

/// Processing status used by the distribution API when nothing is left to deliver.
pub const STATUS_NO_DOCUMENTS: &str = "NENHUM_DOCUMENTO_LOCALIZADO";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload could not be decompressed: {0}")]
    Gzip(#[from] std::io::Error),
}

/// One page of the distribution feed (`/contribuintes/DFe/{nsu}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionResponse {
    #[serde(rename = "StatusProcessamento", default)]
    pub status: String,
    #[serde(rename = "LoteDFe", default)]
    pub documents: Vec<RawDocument>,
    #[serde(rename = "Alertas", default)]
    pub alerts: Vec<serde_json::Value>,
    #[serde(rename = "Erros", default)]
    pub errors: Vec<serde_json::Value>,
}

/// A distributed document as delivered: gzip-compressed XML, base64 encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(rename = "NSU", default)]
    pub nsu: Option<u64>,
    #[serde(rename = "ChaveAcesso", default)]
    pub access_key: String,
    #[serde(rename = "TipoDocumento", default)]
    pub document_type: String,
    #[serde(rename = "ArquivoXml", default)]
    pub payload: String,
    #[serde(rename = "DataHoraGeracao", default)]
    pub generated_at: Option<String>,
}

/// Point lookup answer (`/contribuintes/NFSe/{chave}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessKeyResponse {
    #[serde(rename = "ChaveAcesso", default)]
    pub access_key: String,
    #[serde(rename = "NfseXmlGZipB64", default)]
    pub payload: String,
}

impl RawDocument {
    /// Invoices only; events (cancellations, substitutions) share the feed.
    pub fn is_invoice(&self) -> bool {
        self.document_type.is_empty() || self.document_type.eq_ignore_ascii_case("NFSE")
    }

    pub fn decode(&self) -> Result<InvoiceRecord, DecodeError> {
        let xml = decode_payload(&self.payload)?;
        Ok(record_from_xml(&xml, &self.access_key))
    }
}

/// Base64 decode, then gunzip when the gzip magic is present.
pub fn decode_payload(payload: &str) -> Result<String, DecodeError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;

    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut xml = String::new();
        GzDecoder::new(bytes.as_slice()).read_to_string(&mut xml)?;
        Ok(xml)
    } else {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Map a national NFS-e XML onto the canonical record by tag scanning.
///
/// `access_key` comes from the distribution envelope; when it is empty the
/// `Id` of `infNFSe` (minus its `NFS` prefix) is used instead.
pub fn record_from_xml(xml: &str, access_key: &str) -> InvoiceRecord {
    let access_key = if access_key.trim().is_empty() {
        xml::attribute(xml, "infNFSe", "Id")
            .map(|id| id.trim_start_matches("NFS").to_string())
            .unwrap_or_default()
    } else {
        access_key.trim().to_string()
    };

    let provider = xml::section(xml, "emit")
        .or_else(|| xml::section(xml, "prest"))
        .unwrap_or_default();
    let customer = xml::section(xml, "toma").unwrap_or_default();

    InvoiceRecord {
        access_key,
        number: xml::text(xml, "nNFSe"),
        issue_date: parse_issue_date(&xml::first_text(xml, &["dhEmi", "dCompet", "dhProc"])),
        value: parse_amount(&xml::first_text(xml, &["vLiq", "vServ"])),
        provider_tax_id: digits_only(&xml::first_text(provider, &["CNPJ", "CPF"])),
        provider_name: xml::text(provider, "xNome"),
        customer_tax_id: digits_only(&xml::first_text(customer, &["CNPJ", "CPF", "NIF"])),
        customer_name: xml::text(customer, "xNome"),
        service_description: xml::text(xml, "xDescServ"),
        municipality_code: xml::first_text(xml, &["cLocIncid", "cLocPrestacao", "cLocEmi"]),
        raw_source: Some(xml.to_string()),
        ..InvoiceRecord::empty(TargetSystem::National)
    }
}

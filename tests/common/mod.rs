#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::GzEncoder, Compression};
use nfse_ws::{IntegrationConfig, InvoiceIntegration, MemoryArtifactStore, MemoryAuditLog, TargetSystem};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509};
use std::io::Write;
use std::sync::Arc;

pub const CERT_SECRET: &str = "teste123";
pub const PROVIDER: &str = "12345678000199";

/// Self-signed PKCS#12 bundle, the shape an A1 certificate file has.
pub fn synthetic_bundle(common_name: &str, secret: &str) -> Vec<u8> {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    Pkcs12::builder()
        .name("nfse")
        .pkey(&key)
        .cert(&builder.build())
        .build2(secret)
        .unwrap()
        .to_der()
        .unwrap()
}

/// Integration pointed at `server_uri` for both portals, with in-memory collaborators.
pub fn integration(server_uri: &str) -> (InvoiceIntegration, Arc<MemoryArtifactStore>, Arc<MemoryAuditLog>) {
    let config = IntegrationConfig::default()
        .with_national_base_url(server_uri)
        .with_municipal_endpoint_url(format!("{}/ws/nfse.asmx", server_uri))
        .with_municipal_viewer_url(format!("{}/contribuinte/notaprint.aspx", server_uri));
    let store = Arc::new(MemoryArtifactStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let integration = InvoiceIntegration::new(config, store.clone(), audit.clone()).unwrap();
    (integration, store, audit)
}

pub fn configure(integration: &InvoiceIntegration, target: TargetSystem) {
    let bundle = synthetic_bundle("EMPRESA TESTE LTDA:12345678000199", CERT_SECRET);
    assert!(integration.configure_certificate(&bundle, CERT_SECRET, target));
}

// ============================================================================
// NATIONAL FEED FIXTURES
// ============================================================================

pub fn nfse_xml(number: &str, issued: &str, value: &str, customer: &str) -> String {
    format!(
        concat!(
            r#"<NFSe versao="1.00" xmlns="http://www.sped.fazenda.gov.br/nfse"><infNFSe Id="NFS{number}">"#,
            "<nNFSe>{number}</nNFSe><cLocIncid>3550308</cLocIncid>",
            "<emit><CNPJ>12345678000199</CNPJ><xNome>PRESTADORA LTDA</xNome></emit>",
            "<valores><vLiq>{value}</vLiq></valores>",
            "<DPS><infDPS><dhEmi>{issued}T10:00:00-03:00</dhEmi>",
            "<toma><CNPJ>{customer}</CNPJ><xNome>CLIENTE SA</xNome></toma>",
            "<serv><cServ><xDescServ>Consultoria</xDescServ></cServ></serv>",
            "</infDPS></DPS></infNFSe></NFSe>"
        ),
        number = number,
        issued = issued,
        value = value,
        customer = customer,
    )
}

pub fn gzip_base64(xml: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

/// One `LoteDFe` entry.
pub fn distributed(nsu: u64, key: &str, issued: &str, customer: &str) -> serde_json::Value {
    serde_json::json!({
        "NSU": nsu,
        "ChaveAcesso": key,
        "TipoDocumento": "NFSE",
        "ArquivoXml": gzip_base64(&nfse_xml(&nsu.to_string(), issued, "150.00", customer)),
        "DataHoraGeracao": format!("{}T10:05:00", issued),
    })
}

pub fn distribution_page(documents: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "StatusProcessamento": "DOCUMENTOS_LOCALIZADOS",
        "LoteDFe": documents,
        "Alertas": [],
        "Erros": [],
    })
}

// ============================================================================
// MUNICIPAL FIXTURES
// ============================================================================

pub fn comp_nfse(number: &str, code: &str, issued: &str, value: &str, customer: &str) -> String {
    format!(
        concat!(
            "<CompNfse><Nfse versao=\"2.04\"><InfNfse Id=\"N{number}\">",
            "<Numero>{number}</Numero><CodigoVerificacao>{code}</CodigoVerificacao>",
            "<DataEmissao>{issued}T09:30:00</DataEmissao>",
            "<ValoresNfse><ValorLiquidoNfse>{value}</ValorLiquidoNfse></ValoresNfse>",
            "<PrestadorServico><IdentificacaoPrestador><CpfCnpj><Cnpj>12345678000199</Cnpj></CpfCnpj>",
            "<InscricaoMunicipal>1234567</InscricaoMunicipal></IdentificacaoPrestador>",
            "<RazaoSocial>PRESTADORA LTDA</RazaoSocial></PrestadorServico>",
            "<DeclaracaoPrestacaoServico><InfDeclaracaoPrestacaoServico>",
            "<Servico><Discriminacao>Manutencao predial</Discriminacao>",
            "<CodigoMunicipio>3550308</CodigoMunicipio></Servico>",
            "<TomadorServico><IdentificacaoTomador><CpfCnpj><Cnpj>{customer}</Cnpj></CpfCnpj></IdentificacaoTomador>",
            "<RazaoSocial>CLIENTE SA</RazaoSocial></TomadorServico>",
            "</InfDeclaracaoPrestacaoServico></DeclaracaoPrestacaoServico>",
            "</InfNfse></Nfse></CompNfse>"
        ),
        number = number,
        code = code,
        issued = issued,
        value = value,
        customer = customer,
    )
}

pub fn consult_response(body: &str) -> String {
    format!(
        concat!(
            "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>",
            "<ConsultarNfseServicoPrestadoResposta xmlns=\"http://www.abrasf.org.br/nfse.xsd\">{}",
            "</ConsultarNfseServicoPrestadoResposta></soap:Body></soap:Envelope>"
        ),
        body
    )
}

//! ABRASF `ConsultarNfseServicoPrestado` request envelope.

use chrono::NaiveDate;
use shared::utils::digits_only;

pub const ABRASF_NAMESPACE: &str = "http://www.abrasf.org.br/nfse.xsd";
pub const SOAP_ACTION: &str = "http://nfse.abrasf.org.br/ConsultarNfseServicoPrestado";

/// Parameters of one query page sent to the municipal web service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceQuery {
    pub provider_tax_id: String,
    pub municipal_registration: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub customer_tax_id: Option<String>,
    pub page: u32,
}

/// CPF (11 digits) or CNPJ identification block.
fn tax_id_block(tax_id: &str) -> String {
    let digits = digits_only(tax_id);
    if digits.len() == 11 {
        format!("<CpfCnpj><Cpf>{}</Cpf></CpfCnpj>", digits)
    } else {
        format!("<CpfCnpj><Cnpj>{}</Cnpj></CpfCnpj>", digits)
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Business payload carried inside `nfseDadosMsg`.
pub fn query_payload(query: &ServiceQuery) -> String {
    let customer = query
        .customer_tax_id
        .as_deref()
        .filter(|tax_id| !digits_only(tax_id).is_empty())
        .map(|tax_id| format!("<Tomador>{}</Tomador>", tax_id_block(tax_id)))
        .unwrap_or_default();

    format!(
        concat!(
            r#"<ConsultarNfseServicoPrestadoEnvio xmlns="{ns}">"#,
            "<Prestador>{prestador}<InscricaoMunicipal>{im}</InscricaoMunicipal></Prestador>",
            "<PeriodoEmissao><DataInicial>{start}</DataInicial><DataFinal>{end}</DataFinal></PeriodoEmissao>",
            "{customer}",
            "<Pagina>{page}</Pagina>",
            "</ConsultarNfseServicoPrestadoEnvio>"
        ),
        ns = ABRASF_NAMESPACE,
        prestador = tax_id_block(&query.provider_tax_id),
        im = escape(query.municipal_registration.trim()),
        start = query.start.format("%Y-%m-%d"),
        end = query.end.format("%Y-%m-%d"),
        customer = customer,
        page = query.page.max(1),
    )
}

/// Full SOAP 1.1 envelope with header and data messages wrapped in CDATA.
pub fn soap_envelope(query: &ServiceQuery, version: &str) -> String {
    let header = format!(
        r#"<cabecalho versao="{v}" xmlns="{ns}"><versaoDados>{v}</versaoDados></cabecalho>"#,
        v = escape(version),
        ns = ABRASF_NAMESPACE
    );

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:nfse="http://nfse.abrasf.org.br">"#,
            "<soapenv:Header/>",
            "<soapenv:Body>",
            "<nfse:ConsultarNfseServicoPrestado>",
            "<nfseCabecMsg><![CDATA[{header}]]></nfseCabecMsg>",
            "<nfseDadosMsg><![CDATA[{payload}]]></nfseDadosMsg>",
            "</nfse:ConsultarNfseServicoPrestado>",
            "</soapenv:Body>",
            "</soapenv:Envelope>"
        ),
        header = header,
        payload = query_payload(query),
    )
}

//! ABRASF response parsing with namespace-agnostic XPath.
//!
//! A rejected query still arrives as a well-formed document whose
//! `ListaMensagemRetorno` explains the rejection; it is returned as
//! messages next to an empty record list, never as an error.

use crate::models::InvoiceRecord;
use serde::{Deserialize, Serialize};
use shared::utils::{digits_only, parse_amount, parse_issue_date};
use shared::TargetSystem;
use sxd_document::parser;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};
use thiserror::Error;

/// Wrapper elements some gateways use to return the ABRASF XML as escaped text.
const OUTPUT_WRAPPERS: [&str; 3] = ["outputXML", "ConsultarNfseServicoPrestadoResult", "return"];

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("response is not well-formed XML: {0}")]
    Xml(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReturnMessage {
    pub code: String,
    pub message: String,
    pub correction: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub records: Vec<InvoiceRecord>,
    pub messages: Vec<ReturnMessage>,
    pub next_page: Option<u32>,
}

impl ParsedResponse {
    pub fn is_rejection(&self) -> bool {
        !self.messages.is_empty()
    }
}

pub fn parse_response(body: &str) -> Result<ParsedResponse, ResponseError> {
    let package = parser::parse(body).map_err(|e| ResponseError::Xml(format!("{:?}", e)))?;
    let document = package.as_document();
    let root: Node = document.root().into();

    for wrapper in OUTPUT_WRAPPERS {
        let inner = text(root, wrapper);
        if inner.starts_with('<') {
            return parse_business_document(&inner);
        }
    }

    Ok(extract(root))
}

fn parse_business_document(xml: &str) -> Result<ParsedResponse, ResponseError> {
    let package = parser::parse(xml).map_err(|e| ResponseError::Xml(format!("{:?}", e)))?;
    let document = package.as_document();
    Ok(extract(document.root().into()))
}

fn extract(root: Node) -> ParsedResponse {
    let messages = nodes(root, "ListaMensagemRetorno/MensagemRetorno")
        .into_iter()
        .map(|node| ReturnMessage {
            code: text(node, "Codigo"),
            message: text(node, "Mensagem"),
            correction: text(node, "Correcao"),
        })
        .filter(|message| !message.code.is_empty() || !message.message.is_empty())
        .collect();

    let records = nodes(root, "CompNfse").into_iter().map(record_from_node).collect();

    let next_page = text(root, "ProximaPagina").parse().ok();

    ParsedResponse {
        records,
        messages,
        next_page,
    }
}

fn record_from_node(comp: Node) -> InvoiceRecord {
    let number = text(comp, "InfNfse/Numero");
    let verification_code = text(comp, "InfNfse/CodigoVerificacao");

    let customer = nodes(comp, "TomadorServico")
        .into_iter()
        .chain(nodes(comp, "Tomador"))
        .next();

    let access_key = if verification_code.is_empty() {
        number.clone()
    } else {
        format!("{}-{}", number, verification_code)
    };

    InvoiceRecord {
        access_key,
        issue_date: parse_issue_date(&first_text(comp, &["InfNfse/DataEmissao", "Competencia"])),
        value: parse_amount(&first_text(
            comp,
            &[
                "ValoresNfse/ValorLiquidoNfse",
                "Servico/Valores/ValorLiquidoNfse",
                "Servico/Valores/ValorServicos",
            ],
        )),
        provider_tax_id: digits_only(&first_text(
            comp,
            &[
                "PrestadorServico/IdentificacaoPrestador/CpfCnpj/Cnpj",
                "PrestadorServico/IdentificacaoPrestador/CpfCnpj/Cpf",
                "PrestadorServico/IdentificacaoPrestador/Cnpj",
                "Prestador/CpfCnpj/Cnpj",
                "Prestador/CpfCnpj/Cpf",
            ],
        )),
        provider_name: first_text(comp, &["PrestadorServico/RazaoSocial", "PrestadorServico/NomeFantasia"]),
        customer_tax_id: customer
            .map(|node| {
                digits_only(&first_text(
                    node,
                    &[
                        "IdentificacaoTomador/CpfCnpj/Cnpj",
                        "IdentificacaoTomador/CpfCnpj/Cpf",
                    ],
                ))
            })
            .unwrap_or_default(),
        customer_name: customer.map(|node| text(node, "RazaoSocial")).unwrap_or_default(),
        service_description: text(comp, "Servico/Discriminacao"),
        municipality_code: first_text(comp, &["OrgaoGerador/CodigoMunicipio", "Servico/CodigoMunicipio"]),
        verification_code: Some(verification_code).filter(|code| !code.is_empty()),
        number,
        ..InvoiceRecord::empty(TargetSystem::Municipal)
    }
}

/// `A/B` becomes `*[local-name()='A']/*[local-name()='B']`.
fn local_path(path: &str) -> String {
    path.split('/')
        .map(|step| format!("*[local-name()='{}']", step))
        .collect::<Vec<_>>()
        .join("/")
}

fn evaluate<'d>(node: Node<'d>, expression: &str) -> Option<Value<'d>> {
    let factory = Factory::new();
    let xpath = factory.build(expression).ok()??;
    let context = Context::new();
    xpath.evaluate(&context, node).ok()
}

fn nodes<'d>(node: Node<'d>, path: &str) -> Vec<Node<'d>> {
    match evaluate(node, &format!(".//{}", local_path(path))) {
        Some(Value::Nodeset(set)) => set.document_order(),
        _ => Vec::new(),
    }
}

fn text(node: Node, path: &str) -> String {
    evaluate(node, &format!("string(.//{})", local_path(path)))
        .map(|value| value.string().trim().to_string())
        .unwrap_or_default()
}

fn first_text(node: Node, paths: &[&str]) -> String {
    paths
        .iter()
        .map(|path| text(node, path))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

mod common;

use chrono::{Duration, Local};
use common::*;
use nfse_ws::{DocumentReference, IntegrationError, TargetSystem};
use rust_decimal::Decimal;
use std::str::FromStr;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

fn days_ago(days: i64) -> String {
    (Local::now().date_naive() - Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

#[tokio::test]
async fn test_query_without_certificate_is_not_configured() {
    let mock_server = MockServer::start().await;
    let (integration, _, _) = integration(&mock_server.uri());

    let err = integration
        .query_national(PROVIDER, None, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, IntegrationError::NotConfigured { target: TargetSystem::National }));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pagination_follows_nsu_cursor_until_short_page() {
    // 1. Full first page (50 documents, NSU 1..=50), short second page (NSU 51..=53)
    let mock_server = MockServer::start().await;
    let first: Vec<_> = (1..=50)
        .map(|nsu| distributed(nsu, &format!("KEY{:03}", nsu), &today(), "98765432000155"))
        .collect();
    let second: Vec<_> = (51..=53)
        .map(|nsu| distributed(nsu, &format!("KEY{:03}", nsu), &today(), "98765432000155"))
        .collect();

    Mock::given(method("GET"))
        .and(path("/contribuintes/DFe/0"))
        .and(query_param("cnpjConsulta", PROVIDER))
        .and(query_param("lote", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(distribution_page(first)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contribuintes/DFe/50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(distribution_page(second)))
        .expect(1)
        .mount(&mock_server)
        .await;

    // 2. Query with a certificate configured
    let (integration, _, _) = integration(&mock_server.uri());
    configure(&integration, TargetSystem::National);
    let records = integration
        .query_national("12.345.678/0001-99", None, None, None)
        .await
        .unwrap();

    // 3. Every document came back in delivery order, two pages fetched
    assert_eq!(records.len(), 53);
    assert_eq!(records[0].access_key, "KEY001");
    assert_eq!(records[52].access_key, "KEY053");
    assert_eq!(records[0].value, Decimal::from_str("150.00").unwrap());
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_not_found_page_means_no_documents() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contribuintes/DFe/0"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "StatusProcessamento": "NENHUM_DOCUMENTO_LOCALIZADO",
            "LoteDFe": [],
            "Alertas": [],
            "Erros": [],
        })))
        .mount(&mock_server)
        .await;

    let (integration, _, _) = integration(&mock_server.uri());
    configure(&integration, TargetSystem::National);

    let records = integration
        .query_national(PROVIDER, None, None, None)
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_default_window_is_trailing_thirty_days() {
    let mock_server = MockServer::start().await;
    let page = distribution_page(vec![
        distributed(1, "TODAY", &today(), "98765432000155"),
        distributed(2, "EDGE", &days_ago(30), "98765432000155"),
        distributed(3, "TOO-OLD", &days_ago(31), "98765432000155"),
    ]);
    Mock::given(method("GET"))
        .and(path("/contribuintes/DFe/0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(&mock_server)
        .await;

    let (integration, _, _) = integration(&mock_server.uri());
    configure(&integration, TargetSystem::National);

    let records = integration
        .query_national(PROVIDER, Some("98765432000155"), None, None)
        .await
        .unwrap();
    let keys: Vec<_> = records.iter().map(|r| r.access_key.as_str()).collect();
    assert_eq!(keys, vec!["TODAY", "EDGE"]);
}

#[tokio::test]
async fn test_customer_filter_ignores_tax_id_formatting() {
    let mock_server = MockServer::start().await;
    let page = distribution_page(vec![
        distributed(1, "MINE", &today(), "12.345.678/0001-99"),
        distributed(2, "OTHER", &today(), "11222333000181"),
        distributed(3, "ALSO-MINE", &today(), "12345678000199"),
    ]);
    Mock::given(method("GET"))
        .and(path("/contribuintes/DFe/0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(&mock_server)
        .await;

    let (integration, _, _) = integration(&mock_server.uri());
    configure(&integration, TargetSystem::National);

    for customer in ["12.345.678/0001-99", "12345678000199"] {
        let records = integration
            .query_national(PROVIDER, Some(customer), None, None)
            .await
            .unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.access_key.as_str()).collect();
        assert_eq!(keys, vec!["MINE", "ALSO-MINE"], "customer query {}", customer);
    }
}

#[tokio::test]
async fn test_server_error_is_surfaced_with_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contribuintes/DFe/0"))
        .respond_with(ResponseTemplate::new(500).set_body_string("falha interna"))
        .mount(&mock_server)
        .await;

    let (integration, _, _) = integration(&mock_server.uri());
    configure(&integration, TargetSystem::National);

    let err = integration
        .query_national(PROVIDER, None, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert!(!err.is_not_configured());
}

#[tokio::test]
async fn test_access_key_lookup() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contribuintes/NFSe/KNOWN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ChaveAcesso": "KNOWN",
            "NfseXmlGZipB64": gzip_base64(&nfse_xml("42", "2025-03-01", "99.90", "98765432000155")),
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contribuintes/NFSe/UNKNOWN"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let (integration, _, _) = integration(&mock_server.uri());
    configure(&integration, TargetSystem::National);

    let record = integration
        .national
        .fetch_by_access_key("KNOWN")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.access_key, "KNOWN");
    assert_eq!(record.number, "42");
    assert_eq!(record.customer_tax_id, "98765432000155");

    assert!(integration
        .national
        .fetch_by_access_key("UNKNOWN")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_rendered_document_download_and_store() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contribuintes/danfse/KEY001"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 danfse".to_vec()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contribuintes/danfse/MISSING"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let (integration, store, audit) = integration(&mock_server.uri());
    configure(&integration, TargetSystem::National);

    let missing = DocumentReference::National {
        access_key: "MISSING".to_string(),
    };
    assert!(matches!(
        integration.fetch_rendered_document(&missing).await,
        Err(IntegrationError::NotAvailable { .. })
    ));

    let reference = DocumentReference::National {
        access_key: "KEY001".to_string(),
    };
    let location = integration
        .store_rendered_document(&reference, "operador@empresa")
        .await
        .unwrap();

    assert_eq!(location, "memory://national/KEY001.pdf");
    assert_eq!(store.len(), 1);
    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].subject, "KEY001");
    assert_eq!(events[0].actor, "operador@empresa");
}

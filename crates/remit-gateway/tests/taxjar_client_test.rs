//! Contract tests for TaxJarClient against `POST /v2/taxes`.

use remit_gateway::{TaxApiConfig, TaxApiError, TaxJarClient, TaxJarLineItem, TaxJarRequest};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(mock_server: &MockServer) -> TaxJarClient {
    TaxJarClient::new(&TaxApiConfig::local_mock(&mock_server.uri()).unwrap()).unwrap()
}

fn request() -> TaxJarRequest {
    TaxJarRequest {
        from_country: "US".into(),
        from_zip: Some("92093".into()),
        from_state: Some("CA".into()),
        from_city: None,
        from_street: None,
        to_country: "US".into(),
        to_zip: "90002".into(),
        to_state: Some("CA".into()),
        to_city: Some("Los Angeles".into()),
        to_street: None,
        amount: 15.0,
        shipping: 1.5,
        nexus_addresses: None,
        line_items: vec![
            TaxJarLineItem {
                id: "item-1".into(),
                quantity: 1,
                unit_price: 15.0,
                discount: 0.0,
                product_tax_code: None,
            },
            TaxJarLineItem {
                id: "surcharge".into(),
                quantity: 1,
                unit_price: 0.5,
                discount: 0.0,
                product_tax_code: None,
            },
        ],
    }
}

#[tokio::test]
async fn calculate_posts_order_and_parses_tax() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/taxes"))
        .and(header("authorization", "Bearer tj_key"))
        .and(body_partial_json(serde_json::json!({
            "to_zip": "90002",
            "amount": 15.0,
            "shipping": 1.5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tax": {
                "amount_to_collect": 1.43,
                "rate": 0.095,
                "breakdown": {
                    "state_tax_collectable": 0.94,
                    "county_tax_collectable": 0.04,
                    "city_tax_collectable": 0.0,
                    "special_district_tax_collectable": 0.45,
                    "combined_tax_rate": 0.095
                },
                "jurisdictions": { "state": "CA", "county": "LOS ANGELES", "city": "LOS ANGELES" }
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let tax = test_client(&mock_server)
        .calculate("tj_key", &request())
        .await
        .unwrap();
    assert_eq!(tax.amount_to_collect, Some(1.43));
    assert_eq!(tax.effective_rate(), Some(0.095));
    let breakdown = tax.breakdown.unwrap();
    assert_eq!(breakdown.special_district_tax_collectable, Some(0.45));
    assert_eq!(tax.jurisdictions.unwrap().state.as_deref(), Some("CA"));
}

#[tokio::test]
async fn auth_failures_count_as_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/taxes"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .calculate("bad", &request())
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn bad_request_is_a_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/taxes"))
        .respond_with(ResponseTemplate::new(400).set_body_string("to_zip invalid"))
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .calculate("tj_key", &request())
        .await
        .unwrap_err();
    assert!(!err.is_unavailable());
    assert!(matches!(err, TaxApiError::Status { status: 400, .. }));
}

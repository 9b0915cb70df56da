//! Contract tests for RemitianClient.
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/payments` | `create_payment_*` |
//! | GET    | `/payments/{id}` | `get_payment_status_*` |
//! | GET    | `/recipients` | `list_recipients_*` |
//! | POST   | `/bank-accounts` | `link_bank_account_*` |

use remit_core::{Cents, ExternalAccountId, ExternalPaymentId};
use remit_gateway::{
    AchGateway, AchGatewayConfig, AchGatewayError, BankAccountType, CreatePaymentRequest,
    LinkBankAccountRequest, RemitianClient, TaxType,
};
use remit_state::{AchPaymentStatus, RecipientType};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

fn test_client(mock_server: &MockServer) -> RemitianClient {
    let config = AchGatewayConfig::local_mock(&mock_server.uri(), "test-key").unwrap();
    RemitianClient::new(config).unwrap()
}

fn payment_request() -> CreatePaymentRequest {
    CreatePaymentRequest {
        amount: Cents::new(50_000),
        recipient_name: "Texas Comptroller of Public Accounts".into(),
        recipient_type: RecipientType::State,
        routing_number: Zeroizing::new("111000614".into()),
        account_number: Zeroizing::new("1234567890".into()),
        memo: "Tax remittance for period 2024-01-01 - 2024-01-31".into(),
        source_account_id: ExternalAccountId::new("acct_42").unwrap(),
    }
}

// ── POST /payments ───────────────────────────────────────────────────

#[tokio::test]
async fn create_payment_sends_cents_with_bearer_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payments"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(serde_json::json!({
            "amount": 50000,
            "recipient_name": "Texas Comptroller of Public Accounts",
            "recipient_type": "state",
            "routing_number": "111000614",
            "account_number": "1234567890",
            "memo": "Tax remittance for period 2024-01-01 - 2024-01-31",
            "source_account_id": "acct_42"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "payment_id": "pay_001",
            "status": "processing"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let created = test_client(&mock_server)
        .create_payment(&payment_request())
        .await
        .unwrap();
    assert_eq!(created.external_payment_id.as_str(), "pay_001");
    assert_eq!(created.status, AchPaymentStatus::Pending);
}

#[tokio::test]
async fn create_payment_accepts_plain_id_field() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "pay_002" })))
        .mount(&mock_server)
        .await;

    let created = test_client(&mock_server)
        .create_payment(&payment_request())
        .await
        .unwrap();
    assert_eq!(created.external_payment_id.as_str(), "pay_002");
    assert_eq!(created.status, AchPaymentStatus::Pending);
}

#[tokio::test]
async fn create_payment_maps_4xx_to_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(422).set_body_string("recipient account closed"))
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .create_payment(&payment_request())
        .await
        .unwrap_err();
    match err {
        AchGatewayError::PaymentRejected { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("closed"));
        }
        other => panic!("expected PaymentRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn create_payment_is_never_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .create_payment(&payment_request())
        .await
        .unwrap_err();
    assert!(matches!(err, AchGatewayError::Unavailable { .. }));
}

// ── GET /payments/{id} ───────────────────────────────────────────────

#[tokio::test]
async fn get_payment_status_parses_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/pay_001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "payment_id": "pay_001",
            "status": "completed",
            "amount": 50000,
            "recipient_name": "Texas Comptroller of Public Accounts",
            "confirmation_number": "C1",
            "processed_at": "2024-02-05T16:00:00Z"
        })))
        .mount(&mock_server)
        .await;

    let report = test_client(&mock_server)
        .get_payment_status(&ExternalPaymentId::new("pay_001").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.status, AchPaymentStatus::Completed);
    assert_eq!(report.confirmation_number.as_deref(), Some("C1"));
    assert!(report.processed_at.is_some());
}

#[tokio::test]
async fn get_payment_status_maps_processing_to_pending() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/pay_003"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pay_003",
            "status": "processing"
        })))
        .mount(&mock_server)
        .await;

    let report = test_client(&mock_server)
        .get_payment_status(&ExternalPaymentId::new("pay_003").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.status, AchPaymentStatus::Pending);
}

#[tokio::test]
async fn get_payment_status_retries_through_throttling() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/pay_004"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/payments/pay_004"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "payment_id": "pay_004",
            "status": "failed",
            "error_message": "R01"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = test_client(&mock_server)
        .get_payment_status(&ExternalPaymentId::new("pay_004").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.status, AchPaymentStatus::Failed);
    assert_eq!(report.error_message.as_deref(), Some("R01"));
}

#[tokio::test]
async fn get_payment_status_returns_none_on_404() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let report = test_client(&mock_server)
        .get_payment_status(&ExternalPaymentId::new("missing").unwrap())
        .await
        .unwrap();
    assert!(report.is_none());
}

#[tokio::test]
async fn get_payment_status_rejects_unknown_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/pay_004"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "teleported"
        })))
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .get_payment_status(&ExternalPaymentId::new("pay_004").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AchGatewayError::Deserialization { .. }));
}

// ── GET /recipients ──────────────────────────────────────────────────

#[tokio::test]
async fn list_recipients_is_cached_until_invalidated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recipients"))
        .and(query_param("state", "CA"))
        .and(query_param("tax_type", "sales_tax"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "recipients": [{
                "name": "CDTFA",
                "recipient_type": "state",
                "routing_number": "121042882",
                "account_number": "555",
                "state": "CA",
                "tax_type": "sales_tax"
            }]
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = test_client(&mock_server);
    let first = client.list_recipients("ca", TaxType::SalesTax).await.unwrap();
    let second = client.list_recipients("CA", TaxType::SalesTax).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].account_number, "555");

    client.invalidate_recipients();
    client.list_recipients("CA", TaxType::SalesTax).await.unwrap();
}

#[tokio::test]
async fn list_recipients_falls_back_to_builtin_directory() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recipients"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let recipients = test_client(&mock_server)
        .list_recipients("TX", TaxType::SalesTax)
        .await
        .unwrap();
    assert_eq!(recipients.len(), 1);
    assert_eq!(recipients[0].name, "Texas Comptroller of Public Accounts");
    assert_eq!(recipients[0].routing_number, "111000614");
}

// ── POST /bank-accounts ──────────────────────────────────────────────

fn link_request() -> LinkBankAccountRequest {
    LinkBankAccountRequest {
        routing_number: Zeroizing::new("121042882".into()),
        account_number: Zeroizing::new("000123456789".into()),
        account_type: BankAccountType::Checking,
        account_holder_name: "Taco Truck LLC".into(),
    }
}

#[tokio::test]
async fn link_bank_account_returns_external_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bank-accounts"))
        .and(body_json(serde_json::json!({
            "routing_number": "121042882",
            "account_number": "000123456789",
            "account_type": "checking",
            "account_holder_name": "Taco Truck LLC"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "account_id": "acct_77"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let id = test_client(&mock_server)
        .link_bank_account(&link_request())
        .await
        .unwrap();
    assert_eq!(id.as_str(), "acct_77");
}

#[tokio::test]
async fn link_bank_account_maps_4xx_to_invalid_details() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bank-accounts"))
        .respond_with(ResponseTemplate::new(400).set_body_string("routing number not found"))
        .mount(&mock_server)
        .await;

    let err = test_client(&mock_server)
        .link_bank_account(&link_request())
        .await
        .unwrap_err();
    assert!(matches!(err, AchGatewayError::InvalidBankDetails(_)));
}

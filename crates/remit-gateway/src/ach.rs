//! Typed client for the Remitian ACH API.
//!
//! Base URL: `https://api.remitian.com/v1` (production),
//! `https://sandbox-api.remitian.com/v1` (sandbox).
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/bank-accounts` | Link a tenant funding account |
//! | POST   | `/payments` | Create an ACH payment (amount in cents) |
//! | GET    | `/payments/{id}` | Payment status |
//! | GET    | `/recipients?state=&tax_type=` | Government recipient directory |
//!
//! Webhooks are signed with HMAC-SHA256 over the raw body and carry the
//! hex digest in `x-remitian-signature`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use remit_core::{Cents, ExternalAccountId, ExternalPaymentId};
use remit_state::{AchPaymentStatus, PaymentReport, RecipientType};

use crate::cache::TtlCache;
use crate::config::{AchGatewayConfig, ConfigError};
use crate::error::AchGatewayError;
use crate::retry::{send_read, GatewayRead, RetryPolicy};

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-remitian-signature";

const RECIPIENT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

// -- Request / response types -------------------------------------------------

/// Funding account type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankAccountType {
    Checking,
    Savings,
}

impl BankAccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
        }
    }
}

impl std::str::FromStr for BankAccountType {
    type Err = remit_core::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checking" => Ok(Self::Checking),
            "savings" => Ok(Self::Savings),
            _ => Err(remit_core::ValidationError::UnknownVariant {
                kind: "bank account type",
                value: s.to_string(),
            }),
        }
    }
}

/// Kind of tax a recipient collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    #[default]
    SalesTax,
    IncomeTax,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SalesTax => "sales_tax",
            Self::IncomeTax => "income_tax",
        }
    }
}

impl std::str::FromStr for TaxType {
    type Err = remit_core::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales_tax" => Ok(Self::SalesTax),
            "income_tax" => Ok(Self::IncomeTax),
            _ => Err(remit_core::ValidationError::UnknownVariant {
                kind: "tax type",
                value: s.to_string(),
            }),
        }
    }
}

/// Tenant bank account to link as an ACH funding source.
pub struct LinkBankAccountRequest {
    pub routing_number: Zeroizing<String>,
    pub account_number: Zeroizing<String>,
    pub account_type: BankAccountType,
    pub account_holder_name: String,
}

impl std::fmt::Debug for LinkBankAccountRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkBankAccountRequest")
            .field("routing_number", &"[REDACTED]")
            .field("account_number", &"[REDACTED]")
            .field("account_type", &self.account_type)
            .field("account_holder_name", &self.account_holder_name)
            .finish()
    }
}

impl LinkBankAccountRequest {
    /// Shape checks the gateway would also reject: a 9-digit routing number,
    /// a 4-17 digit account number and a holder name.
    pub fn validate(&self) -> Result<(), AchGatewayError> {
        let routing = self.routing_number.trim();
        if routing.len() != 9 || !routing.chars().all(|c| c.is_ascii_digit()) {
            return Err(AchGatewayError::InvalidBankDetails(
                "routing number must be 9 digits".to_string(),
            ));
        }
        let account = self.account_number.trim();
        if !(4..=17).contains(&account.len()) || !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(AchGatewayError::InvalidBankDetails(
                "account number must be 4-17 digits".to_string(),
            ));
        }
        if self.account_holder_name.trim().is_empty() {
            return Err(AchGatewayError::InvalidBankDetails(
                "account holder name is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// An ACH transfer to a government recipient.
pub struct CreatePaymentRequest {
    pub amount: Cents,
    pub recipient_name: String,
    pub recipient_type: RecipientType,
    pub routing_number: Zeroizing<String>,
    pub account_number: Zeroizing<String>,
    pub memo: String,
    pub source_account_id: ExternalAccountId,
}

impl std::fmt::Debug for CreatePaymentRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatePaymentRequest")
            .field("amount", &self.amount)
            .field("recipient_name", &self.recipient_name)
            .field("recipient_type", &self.recipient_type)
            .field("routing_number", &"[REDACTED]")
            .field("account_number", &"[REDACTED]")
            .field("memo", &self.memo)
            .field("source_account_id", &self.source_account_id)
            .finish()
    }
}

/// Gateway acknowledgement of a new payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    pub external_payment_id: ExternalPaymentId,
    pub status: AchPaymentStatus,
}

/// Directory entry for a government tax authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernmentRecipient {
    pub name: String,
    #[serde(alias = "recipientType")]
    pub recipient_type: RecipientType,
    #[serde(alias = "routingNumber")]
    pub routing_number: String,
    #[serde(alias = "accountNumber")]
    pub account_number: String,
    pub state: String,
    #[serde(alias = "taxType")]
    pub tax_type: TaxType,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Webhook body posted by Remitian.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemitianWebhook {
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub confirmation_number: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct CreatePaymentBody<'a> {
    amount: i64,
    recipient_name: &'a str,
    recipient_type: RecipientType,
    routing_number: &'a str,
    account_number: &'a str,
    memo: &'a str,
    source_account_id: &'a str,
}

#[derive(Deserialize)]
struct CreatePaymentResponse {
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct PaymentStatusResponse {
    status: String,
    #[serde(default)]
    confirmation_number: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    processed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct LinkAccountBody<'a> {
    routing_number: &'a str,
    account_number: &'a str,
    account_type: BankAccountType,
    account_holder_name: &'a str,
}

#[derive(Deserialize)]
struct LinkAccountResponse {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct RecipientsResponse {
    #[serde(default)]
    recipients: Vec<GovernmentRecipient>,
}

// -- Trait --------------------------------------------------------------------

/// Operations against an ACH payment rail.
#[async_trait]
pub trait AchGateway: Send + Sync {
    /// Register a tenant funding account. 4xx means the details were refused.
    async fn link_bank_account(
        &self,
        req: &LinkBankAccountRequest,
    ) -> Result<ExternalAccountId, AchGatewayError>;

    /// Submit a payment. Sent once, never retried.
    async fn create_payment(
        &self,
        req: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, AchGatewayError>;

    /// Current status, or `None` when the gateway does not know the id.
    async fn get_payment_status(
        &self,
        id: &ExternalPaymentId,
    ) -> Result<Option<PaymentReport>, AchGatewayError>;

    async fn list_recipients(
        &self,
        state: &str,
        tax_type: TaxType,
    ) -> Result<Vec<GovernmentRecipient>, AchGatewayError>;

    /// Drop any cached recipient directory entries.
    fn invalidate_recipients(&self);

    /// Constant-time HMAC-SHA256 check of a webhook body.
    fn verify_webhook_signature(&self, body: &[u8], signature: Option<&str>, secret: &str) -> bool {
        remit_crypto::verify_webhook_signature(body, signature, secret)
    }
}

// -- Built-in directory -------------------------------------------------------

/// Recipients used when the gateway has no directory for a state.
pub fn fallback_recipients(state: &str, tax_type: TaxType) -> Vec<GovernmentRecipient> {
    let entry = |name: &str, routing: &str, st: &str, notes: &str| GovernmentRecipient {
        name: name.to_string(),
        recipient_type: RecipientType::State,
        routing_number: routing.to_string(),
        account_number: "1234567890".to_string(),
        state: st.to_string(),
        tax_type: TaxType::SalesTax,
        notes: Some(notes.to_string()),
    };
    let all = match state.trim().to_ascii_uppercase().as_str() {
        "CA" => vec![entry(
            "California Department of Tax and Fee Administration (CDTFA)",
            "121042882",
            "CA",
            "Sales and Use Tax",
        )],
        "TX" => vec![entry(
            "Texas Comptroller of Public Accounts",
            "111000614",
            "TX",
            "Sales Tax",
        )],
        "NY" => vec![entry(
            "New York State Department of Taxation and Finance",
            "021000021",
            "NY",
            "Sales Tax",
        )],
        _ => Vec::new(),
    };
    all.into_iter().filter(|r| r.tax_type == tax_type).collect()
}

// -- Client -------------------------------------------------------------------

/// HTTP client for the Remitian API.
#[derive(Debug)]
pub struct RemitianClient {
    http: reqwest::Client,
    base_url: String,
    recipients: TtlCache<(String, TaxType), Vec<GovernmentRecipient>>,
    retry: RetryPolicy,
}

impl RemitianClient {
    pub fn new(config: AchGatewayConfig) -> Result<Self, AchGatewayError> {
        let mut auth =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.as_str()))
                .map_err(|_| AchGatewayError::Config(ConfigError::MissingApiKey("REMITIAN_API_KEY")))?;
        auth.set_sensitive(true);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| AchGatewayError::transport("client_init", &e))?;

        Ok(Self {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            recipients: TtlCache::new(RECIPIENT_CACHE_TTL),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the recipient directory cache lifetime.
    pub fn with_recipient_ttl(mut self, ttl: Duration) -> Self {
        self.recipients = TtlCache::new(ttl);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn error_body(resp: reqwest::Response) -> String {
    resp.text()
        .await
        .unwrap_or_else(|e| format!("<failed to read response body: {e}>"))
}

fn is_unavailable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl AchGateway for RemitianClient {
    async fn link_bank_account(
        &self,
        req: &LinkBankAccountRequest,
    ) -> Result<ExternalAccountId, AchGatewayError> {
        let endpoint = "POST /bank-accounts";
        let body = LinkAccountBody {
            routing_number: req.routing_number.trim(),
            account_number: req.account_number.trim(),
            account_type: req.account_type,
            account_holder_name: &req.account_holder_name,
        };
        let resp = self
            .http
            .post(self.url("/bank-accounts"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AchGatewayError::transport(endpoint, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = error_body(resp).await;
            if is_unavailable_status(status) {
                return Err(AchGatewayError::Unavailable {
                    endpoint: endpoint.into(),
                    reason: format!("{}: {text}", status.as_u16()),
                });
            }
            return Err(AchGatewayError::InvalidBankDetails(text));
        }

        let parsed: LinkAccountResponse = resp
            .json()
            .await
            .map_err(|e| AchGatewayError::deserialization(endpoint, &e))?;
        let raw = parsed.account_id.or(parsed.id).unwrap_or_default();
        ExternalAccountId::new(raw).map_err(|e| AchGatewayError::Deserialization {
            endpoint: endpoint.into(),
            reason: e.to_string(),
        })
    }

    async fn create_payment(
        &self,
        req: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, AchGatewayError> {
        let endpoint = "POST /payments";
        let body = CreatePaymentBody {
            amount: req.amount.as_i64(),
            recipient_name: &req.recipient_name,
            recipient_type: req.recipient_type,
            routing_number: req.routing_number.as_str(),
            account_number: req.account_number.as_str(),
            memo: &req.memo,
            source_account_id: req.source_account_id.as_str(),
        };
        let resp = self
            .http
            .post(self.url("/payments"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AchGatewayError::transport(endpoint, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = error_body(resp).await;
            if is_unavailable_status(status) {
                return Err(AchGatewayError::Unavailable {
                    endpoint: endpoint.into(),
                    reason: format!("{}: {text}", status.as_u16()),
                });
            }
            return Err(AchGatewayError::PaymentRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: CreatePaymentResponse = resp
            .json()
            .await
            .map_err(|e| AchGatewayError::deserialization(endpoint, &e))?;
        let raw_id = parsed.payment_id.or(parsed.id).unwrap_or_default();
        let external_payment_id =
            ExternalPaymentId::new(raw_id).map_err(|e| AchGatewayError::Deserialization {
                endpoint: endpoint.into(),
                reason: e.to_string(),
            })?;
        let status = match parsed.status.as_deref() {
            None => AchPaymentStatus::Pending,
            Some(raw) => AchPaymentStatus::from_gateway(raw).unwrap_or_else(|| {
                tracing::warn!(
                    external_payment_id = %external_payment_id,
                    status = raw,
                    "unrecognized status on new payment, treating as pending"
                );
                AchPaymentStatus::Pending
            }),
        };
        Ok(CreatedPayment {
            external_payment_id,
            status,
        })
    }

    async fn get_payment_status(
        &self,
        id: &ExternalPaymentId,
    ) -> Result<Option<PaymentReport>, AchGatewayError> {
        let read = GatewayRead::PaymentStatus(id);
        let endpoint = read.endpoint();
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_str().as_bytes()).collect();
        let url = self.url(&format!("/payments/{encoded}"));

        let resp = send_read(read, &self.retry, || self.http.get(&url).send())
            .await
            .map_err(|e| AchGatewayError::transport(&endpoint, &e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = error_body(resp).await;
            if is_unavailable_status(status) {
                return Err(AchGatewayError::Unavailable {
                    endpoint,
                    reason: format!("{}: {text}", status.as_u16()),
                });
            }
            return Err(AchGatewayError::UnexpectedResponse {
                endpoint,
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: PaymentStatusResponse = resp
            .json()
            .await
            .map_err(|e| AchGatewayError::deserialization(&endpoint, &e))?;
        let status = AchPaymentStatus::from_gateway(&parsed.status).ok_or_else(|| {
            AchGatewayError::Deserialization {
                endpoint: endpoint.clone(),
                reason: format!("unrecognized payment status {:?}", parsed.status),
            }
        })?;
        Ok(Some(PaymentReport {
            status,
            confirmation_number: parsed.confirmation_number,
            error_message: parsed.error_message,
            processed_at: parsed.processed_at,
        }))
    }

    async fn list_recipients(
        &self,
        state: &str,
        tax_type: TaxType,
    ) -> Result<Vec<GovernmentRecipient>, AchGatewayError> {
        let key = (state.trim().to_ascii_uppercase(), tax_type);
        if let Some(hit) = self.recipients.get(&key) {
            return Ok(hit);
        }

        let endpoint = "GET /recipients";
        let mut url = url::Url::parse(&self.url("/recipients")).map_err(|e| {
            AchGatewayError::Config(ConfigError::InvalidUrl("recipients".into(), e.to_string()))
        })?;
        url.query_pairs_mut()
            .append_pair("state", &key.0)
            .append_pair("tax_type", tax_type.as_str());

        let read = GatewayRead::Recipients { state: &key.0 };
        let resp = send_read(read, &self.retry, || self.http.get(url.clone()).send())
            .await
            .map_err(|e| AchGatewayError::transport(endpoint, &e))?;

        let recipients = if resp.status().is_success() {
            resp.json::<RecipientsResponse>()
                .await
                .map_err(|e| AchGatewayError::deserialization(endpoint, &e))?
                .recipients
        } else {
            tracing::info!(
                state = %key.0,
                status = resp.status().as_u16(),
                "recipient directory unavailable, using built-in entries"
            );
            fallback_recipients(&key.0, tax_type)
        };

        self.recipients.insert(key, recipients.clone());
        Ok(recipients)
    }

    fn invalidate_recipients(&self) {
        self.recipients.invalidate();
    }
}

//! Gateway client error types.

/// Errors from ACH gateway calls.
#[derive(Debug, thiserror::Error)]
pub enum AchGatewayError {
    /// Transport failure, timeout, auth failure or 5xx. For `create_payment`
    /// the outcome is unknown.
    #[error("ACH gateway unavailable at {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },

    /// The gateway refused the bank account.
    #[error("invalid bank details: {0}")]
    InvalidBankDetails(String),

    /// The gateway refused the payment.
    #[error("payment rejected ({status}): {body}")]
    PaymentRejected { status: u16, body: String },

    /// Non-2xx status outside the documented cases.
    #[error("ACH gateway {endpoint} returned {status}: {body}")]
    UnexpectedResponse {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Response body did not match the expected schema.
    #[error("failed to deserialize response from {endpoint}: {reason}")]
    Deserialization { endpoint: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl AchGatewayError {
    pub(crate) fn transport(endpoint: &str, source: &reqwest::Error) -> Self {
        Self::Unavailable {
            endpoint: endpoint.to_string(),
            reason: source.to_string(),
        }
    }

    pub(crate) fn deserialization(endpoint: &str, source: &reqwest::Error) -> Self {
        Self::Deserialization {
            endpoint: endpoint.to_string(),
            reason: source.to_string(),
        }
    }
}

/// Errors from the tax calculation API.
#[derive(Debug, thiserror::Error)]
pub enum TaxApiError {
    /// Transport failure or timeout.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },

    /// Non-2xx status.
    #[error("tax API {endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl TaxApiError {
    /// Whether the failure is on the provider's side (retrying later or
    /// elsewhere may succeed) rather than a rejection of this request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Deserialization { .. } | Self::Config(_) => true,
            Self::Status { status, .. } => *status == 401 || *status == 403 || *status >= 500,
        }
    }
}

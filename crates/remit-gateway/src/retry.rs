//! Backoff for the Remitian reads that are safe to repeat.
//!
//! A read is repeated after a transport failure or a throttled/unavailable
//! answer (429, 502, 503, 504). Every other response, 404 included, goes
//! straight back to the caller. Payment creation never comes through here:
//! a repeated `POST /payments` could move money twice.

use std::time::Duration;

use reqwest::StatusCode;

use remit_core::ExternalPaymentId;

/// Ceiling on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(5);

/// The idempotent gateway reads.
#[derive(Debug, Clone, Copy)]
pub(crate) enum GatewayRead<'a> {
    /// `GET /payments/{id}`, polled by reconciliation.
    PaymentStatus(&'a ExternalPaymentId),
    /// `GET /recipients`, for one state.
    Recipients { state: &'a str },
}

impl GatewayRead<'_> {
    pub(crate) fn endpoint(&self) -> String {
        match self {
            Self::PaymentStatus(id) => format!("GET /payments/{id}"),
            Self::Recipients { .. } => "GET /recipients".to_string(),
        }
    }

    fn note_retry(&self, attempt: u32, policy: &RetryPolicy, delay: Duration, cause: &str) {
        match self {
            Self::PaymentStatus(id) => tracing::warn!(
                external_payment_id = %id,
                attempt,
                max_retries = policy.max_retries,
                "payment status read failed, retrying in {delay:?}: {cause}"
            ),
            Self::Recipients { state } => tracing::warn!(
                state,
                attempt,
                max_retries = policy.max_retries,
                "recipient directory read failed, retrying in {delay:?}: {cause}"
            ),
        }
    }
}

/// Attempt count and backoff base for gateway reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Retries after the first request.
    pub max_retries: u32,
    /// First delay; doubles per attempt (200ms, 400ms, 800ms by default).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Issue `read`, repeating transient failures under `policy`.
///
/// The last attempt's outcome is returned as-is, so a gateway that stays
/// at 503 surfaces as a 503 response rather than an error.
pub(crate) async fn send_read<F, Fut>(
    read: GatewayRead<'_>,
    policy: &RetryPolicy,
    f: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..policy.max_retries {
        let (delay, cause) = match f().await {
            Ok(resp) if !is_transient(resp.status()) => return Ok(resp),
            Ok(resp) => {
                let delay = retry_after(&resp).unwrap_or_else(|| policy.backoff(attempt));
                (delay, format!("gateway answered {}", resp.status().as_u16()))
            }
            Err(e) => (policy.backoff(attempt), e.to_string()),
        };
        read.note_retry(attempt + 1, policy, delay, &cause);
        tokio::time::sleep(delay).await;
    }
    f().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(0), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(800));
    }

    #[test]
    fn endpoint_names_the_payment() {
        let id = ExternalPaymentId::new("pay_9").unwrap();
        assert_eq!(GatewayRead::PaymentStatus(&id).endpoint(), "GET /payments/pay_9");
        assert_eq!(GatewayRead::Recipients { state: "TX" }.endpoint(), "GET /recipients");
    }

    #[tokio::test]
    async fn exhausts_attempts_on_connection_refused() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let id = ExternalPaymentId::new("pay_refused").unwrap();

        let result = send_read(GatewayRead::PaymentStatus(&id), &quick(), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                reqwest::Client::builder()
                    .timeout(Duration::from_millis(50))
                    .build()
                    .unwrap()
                    .get("http://127.0.0.1:1/")
                    .send()
                    .await
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unavailable_status_is_retried_until_it_clears() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_busy"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_busy"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/payments/pay_busy", server.uri());
        let id = ExternalPaymentId::new("pay_busy").unwrap();
        let resp = send_read(GatewayRead::PaymentStatus(&id), &quick(), || http.get(&url).send())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn not_found_is_returned_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/recipients", server.uri());
        let resp = send_read(GatewayRead::Recipients { state: "TX" }, &quick(), || {
            http.get(&url).send()
        })
        .await
        .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persistent_unavailability_surfaces_the_last_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let url = format!("{}/recipients", server.uri());
        let resp = send_read(GatewayRead::Recipients { state: "CA" }, &quick(), || {
            http.get(&url).send()
        })
        .await
        .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }
}

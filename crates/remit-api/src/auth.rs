//! # Operator Authentication
//!
//! A single static bearer token guards every `/v1/*` route except the ACH
//! webhook, which the gateway authenticates with an HMAC signature instead.
//!
//! ```text
//! Authorization: Bearer {AUTH_TOKEN}
//! ```
//!
//! With no `AUTH_TOKEN` configured every request passes (local development
//! and tests).

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{ErrorBody, ErrorDetail};

/// Expected operator token, shared into request extensions.
#[derive(Clone, Default)]
pub struct AuthConfig {
    token: Option<Arc<Zeroizing<String>>>,
}

impl AuthConfig {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.map(|t| Arc::new(Zeroizing::new(t))),
        }
    }

    fn check(&self, header_value: Option<&str>) -> Result<(), Rejection> {
        let Some(expected) = &self.token else {
            return Ok(());
        };
        let value = header_value.ok_or(Rejection::Missing)?;
        let provided = value.strip_prefix("Bearer ").ok_or(Rejection::WrongScheme)?;
        if tokens_match(provided.trim().as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(Rejection::BadToken)
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.token.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Missing,
    WrongScheme,
    BadToken,
}

impl Rejection {
    fn message(self) -> &'static str {
        match self {
            Self::Missing => "missing authorization header",
            Self::WrongScheme => "authorization header must use Bearer scheme",
            Self::BadToken => "invalid bearer token",
        }
    }
}

/// Length leaks; contents do not.
fn tokens_match(provided: &[u8], expected: &[u8]) -> bool {
    provided.len() == expected.len() && bool::from(provided.ct_eq(expected))
}

/// Reject the request unless it carries the operator token.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let config = request
        .extensions()
        .get::<AuthConfig>()
        .cloned()
        .unwrap_or_default();
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match config.check(header_value) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                reason = rejection.message(),
                "rejected operator request"
            );
            let body = ErrorBody {
                error: ErrorDetail {
                    code: "UNAUTHORIZED".to_string(),
                    message: rejection.message().to_string(),
                    details: None,
                },
            };
            (StatusCode::UNAUTHORIZED, Json(body)).into_response()
        }
    }
}

//! Tax quotes with builtin fallback.
//!
//! The configured provider is tried once. Any [`ProviderError`] is caught
//! here, logged, audited, and replaced by the builtin calculation with a
//! warning. Quoting therefore never fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use remit_core::{Cents, TaxRate};

use crate::audit::{emit, AuditEvent, AuditSink};
use crate::model::{QuoteRequest, TenantTaxSettings};
use crate::provider::{
    BuiltinProvider, ProviderError, ProviderQuote, QuoteBreakdown, TaxProvider,
    UnimplementedProvider,
};

/// Result of [`QuoteService::get_quote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxQuote {
    pub amount: Cents,
    pub rate: TaxRate,
    pub provider_used: String,
    #[serde(default)]
    pub breakdown: QuoteBreakdown,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl TaxQuote {
    fn from_provider(quote: ProviderQuote, provider_used: &str, warnings: Vec<String>) -> Self {
        Self {
            amount: quote.amount,
            rate: quote.rate,
            provider_used: provider_used.to_string(),
            breakdown: quote.breakdown,
            warnings,
        }
    }
}

/// Resolves a tenant's provider and quotes with builtin fallback.
pub struct QuoteService {
    builtin: BuiltinProvider,
    external: Arc<dyn TaxProvider>,
    audit: Arc<dyn AuditSink>,
}

impl QuoteService {
    /// `external` serves tenants configured for `taxjar` / `external-api`.
    pub fn new(external: Arc<dyn TaxProvider>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            builtin: BuiltinProvider,
            external,
            audit,
        }
    }

    pub async fn get_quote(&self, settings: &TenantTaxSettings, request: &QuoteRequest) -> TaxQuote {
        if request.is_empty() {
            return TaxQuote {
                amount: Cents::ZERO,
                rate: TaxRate::ZERO,
                provider_used: "builtin".into(),
                breakdown: QuoteBreakdown::default(),
                warnings: Vec::new(),
            };
        }

        let configured = settings.tax_provider.trim().to_ascii_lowercase();
        let result = match configured.as_str() {
            "" | "builtin" => {
                return TaxQuote::from_provider(
                    self.builtin.compute(settings, request),
                    "builtin",
                    Vec::new(),
                )
            }
            "taxjar" | "external-api" => self.external.quote(settings, request).await,
            other => UnimplementedProvider::new(other).quote(settings, request).await,
        };

        match result {
            Ok(quote) => TaxQuote::from_provider(quote, &configured, Vec::new()),
            Err(err) => self.fall_back(settings, request, &configured, err).await,
        }
    }

    async fn fall_back(
        &self,
        settings: &TenantTaxSettings,
        request: &QuoteRequest,
        configured: &str,
        err: ProviderError,
    ) -> TaxQuote {
        let kind = match err {
            ProviderError::Unavailable(_) => "unavailable",
            ProviderError::Rejected(_) => "rejected",
        };
        tracing::warn!(
            tenant_id = %settings.tenant_id,
            provider = configured,
            kind,
            error = %err,
            "tax provider failed, falling back to builtin"
        );
        emit(
            self.audit.as_ref(),
            AuditEvent::new(
                settings.tenant_id,
                "quote.fallback",
                None,
                serde_json::json!({
                    "provider": configured,
                    "kind": kind,
                    "reason": err.to_string(),
                }),
            ),
        )
        .await;

        let warning = format!("{err}, falling back to builtin tax calculation");
        TaxQuote::from_provider(
            self.builtin.compute(settings, request),
            "builtin",
            vec![warning],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::model::QuoteItem;
    use async_trait::async_trait;
    use remit_core::TenantId;

    struct FixedProvider(Result<ProviderQuote, ProviderError>);

    #[async_trait]
    impl TaxProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn quote(
            &self,
            _settings: &TenantTaxSettings,
            _request: &QuoteRequest,
        ) -> Result<ProviderQuote, ProviderError> {
            self.0.clone()
        }
    }

    fn service(result: Result<ProviderQuote, ProviderError>) -> (QuoteService, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (
            QuoteService::new(Arc::new(FixedProvider(result)), audit.clone()),
            audit,
        )
    }

    fn settings(provider: &str) -> TenantTaxSettings {
        let mut s = TenantTaxSettings::new(TenantId::new());
        s.tax_provider = provider.into();
        s
    }

    fn ten_dollars() -> QuoteRequest {
        QuoteRequest {
            items: vec![QuoteItem {
                id: "a".into(),
                quantity: 1,
                unit_price: Cents::new(1_000),
                tax_code: None,
            }],
            subtotal: Cents::new(1_000),
            ..QuoteRequest::default()
        }
    }

    #[tokio::test]
    async fn empty_order_is_zero_without_provider_call() {
        let (svc, audit) = service(Err(ProviderError::Unavailable("down".into())));
        let q = svc.get_quote(&settings("taxjar"), &QuoteRequest::default()).await;
        assert_eq!(q.amount, Cents::ZERO);
        assert!(q.rate.is_zero());
        assert_eq!(q.provider_used, "builtin");
        assert!(q.warnings.is_empty());
        assert!(audit.events().is_empty());
    }

    #[tokio::test]
    async fn external_success_reports_configured_provider() {
        let (svc, _) = service(Ok(ProviderQuote {
            amount: Cents::new(95),
            rate: TaxRate::parse("0.095").unwrap(),
            breakdown: QuoteBreakdown::default(),
        }));
        let q = svc.get_quote(&settings("External-API"), &ten_dollars()).await;
        assert_eq!(q.amount, Cents::new(95));
        assert_eq!(q.provider_used, "external-api");
        assert!(q.warnings.is_empty());
    }

    #[tokio::test]
    async fn rejection_falls_back_with_warning_and_audit() {
        let (svc, audit) = service(Err(ProviderError::Rejected("bad zip".into())));
        let q = svc.get_quote(&settings("taxjar"), &ten_dollars()).await;
        assert_eq!(q.amount, Cents::new(83));
        assert_eq!(q.provider_used, "builtin");
        assert_eq!(
            q.warnings,
            vec!["bad zip, falling back to builtin tax calculation".to_string()]
        );
        assert_eq!(audit.names(), vec!["quote.fallback"]);
    }

    #[tokio::test]
    async fn unknown_provider_falls_back() {
        let (svc, _) = service(Ok(ProviderQuote {
            amount: Cents::new(1),
            rate: TaxRate::ZERO,
            breakdown: QuoteBreakdown::default(),
        }));
        let q = svc.get_quote(&settings("avalara"), &ten_dollars()).await;
        assert_eq!(q.provider_used, "builtin");
        assert!(q.warnings[0].contains("avalara"));
    }
}

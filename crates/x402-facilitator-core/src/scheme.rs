//! Component A: the scheme registry (`spec.md` §4.A).

use std::sync::Arc;
use x402_types::error::{SettleErrorReason, VerifyErrorReason};
use x402_types::{ChainId, ChainIdPattern, SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

/// Errors a concrete scheme implementation (`ExactEvm`, `UptoEvm`, `ExactSvm`, ...) can
/// raise. The registry and facilitator core only ever see these kinds, never a
/// chain-library-specific error type.
#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error(transparent)]
    Verify(#[from] VerifyErrorReason),
    #[error(transparent)]
    Settle(#[from] SettleErrorReason),
    /// Chain I/O failed in a way that doesn't map to a taxonomy kind (RPC timeout,
    /// connection refused, ...). Captured as a short, stable string per `spec.md` §7's
    /// propagation policy — never bubbled as a panic.
    #[error("chain error: {0}")]
    Chain(String),
}

/// A `Scheme` implements verify/settle/advertisement for one `(network-pattern,
/// scheme-name)` pair. Concrete implementations: `ExactEvm`, `UptoEvm` (in
/// `x402-chain-evm`), `ExactSvm` (in `x402-chain-solana`), `ExactStarknet` (in
/// `x402-chain-starknet`).
#[async_trait::async_trait]
pub trait Scheme: Send + Sync {
    fn scheme_name(&self) -> &str;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, SchemeError>;
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, SchemeError>;
    async fn supported(&self) -> Result<SupportedResponse, SchemeError>;
}

#[derive(Clone)]
struct Entry {
    pattern: ChainIdPattern,
    scheme_name: String,
    scheme: Arc<dyn Scheme>,
}

/// Maps `(CAIP-2 network, scheme-name)` to the `Scheme` that implements it. Populated
/// at startup and read lock-free afterward (`spec.md` §5: "runtime `register` calls are
/// not supported on a running server").
#[derive(Default, Clone)]
pub struct SchemeRegistry {
    entries: Vec<Entry>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, pattern: ChainIdPattern, scheme_name: impl Into<String>, scheme: Arc<dyn Scheme>) -> &mut Self {
        self.entries.push(Entry {
            pattern,
            scheme_name: scheme_name.into(),
            scheme,
        });
        self
    }

    pub fn and_register(mut self, pattern: ChainIdPattern, scheme_name: impl Into<String>, scheme: Arc<dyn Scheme>) -> Self {
        self.register(pattern, scheme_name, scheme);
        self
    }

    /// Resolves the `Scheme` for a `(network, scheme)` pair. Exact network patterns win
    /// over wildcards; if several exact registrations match (shouldn't happen for a
    /// well-formed config) the first registered wins.
    pub fn resolve(&self, network: &ChainId, scheme_name: &str) -> Option<&Arc<dyn Scheme>> {
        self.entries
            .iter()
            .filter(|entry| entry.scheme_name == scheme_name && entry.pattern.matches(network))
            .max_by_key(|entry| entry.pattern.specificity())
            .map(|entry| &entry.scheme)
    }

    pub fn schemes(&self) -> impl Iterator<Item = &Arc<dyn Scheme>> {
        self.entries.iter().map(|entry| &entry.scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402_types::PaymentRequirements;

    struct StubScheme {
        name: &'static str,
    }

    #[async_trait::async_trait]
    impl Scheme for StubScheme {
        fn scheme_name(&self) -> &str {
            self.name
        }
        async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResponse, SchemeError> {
            Ok(VerifyResponse::valid("0xP"))
        }
        async fn settle(&self, _request: &SettleRequest) -> Result<SettleResponse, SchemeError> {
            Ok(SettleResponse::Success {
                payer: "0xP".into(),
                transaction: "0xtx".into(),
                network: ChainId::new("eip155", "8453"),
            })
        }
        async fn supported(&self) -> Result<SupportedResponse, SchemeError> {
            Ok(SupportedResponse::default())
        }
    }

    fn dummy_requirements(network: ChainId) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network,
            asset: "0xasset".into(),
            amount: "1".into(),
            pay_to: "0xpay".into(),
            max_timeout_seconds: 60,
            extra: None,
            resource: None,
            description: None,
            mime_type: None,
            output_schema: None,
        }
    }

    #[test]
    fn exact_network_wins_over_wildcard() {
        let mut registry = SchemeRegistry::new();
        registry.register(
            ChainIdPattern::wildcard("eip155"),
            "exact",
            Arc::new(StubScheme { name: "exact-wildcard" }),
        );
        registry.register(
            ChainIdPattern::exact("eip155", "8453"),
            "exact",
            Arc::new(StubScheme { name: "exact-base" }),
        );
        let resolved = registry.resolve(&ChainId::new("eip155", "8453"), "exact").unwrap();
        assert_eq!(resolved.scheme_name(), "exact-base");

        let resolved_other = registry.resolve(&ChainId::new("eip155", "1"), "exact").unwrap();
        assert_eq!(resolved_other.scheme_name(), "exact-wildcard");
    }

    #[test]
    fn unmatched_scheme_returns_none() {
        let registry = SchemeRegistry::new();
        assert!(registry.resolve(&ChainId::new("eip155", "8453"), "exact").is_none());
        let _ = dummy_requirements(ChainId::new("eip155", "8453"));
    }
}

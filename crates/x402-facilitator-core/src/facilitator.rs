//! The top-level `Facilitator` capability consumed by the HTTP surface (component H)
//! and the resource-server middleware (component G), and `FacilitatorLocal`, the
//! registry-backed implementation of it.

use crate::scheme::{SchemeError, SchemeRegistry};
use std::collections::HashMap;
use x402_types::error::VerifyErrorReason;
use x402_types::{SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

#[async_trait::async_trait]
pub trait Facilitator: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error>;
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error>;
    async fn supported(&self) -> Result<SupportedResponse, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    #[error(transparent)]
    Verification(SchemeError),
    #[error(transparent)]
    Settlement(SchemeError),
}

/// Routes `/verify` and `/settle` to the scheme registered for
/// `payment_requirements.(network, scheme)`, and aggregates `/supported` across every
/// registered scheme (`spec.md` §4.A `GetSupported`, de-duplicating signer addresses per
/// namespace the way the wildcard/exact matching rules imply).
#[derive(Clone)]
pub struct FacilitatorLocal {
    registry: SchemeRegistry,
}

impl FacilitatorLocal {
    pub fn new(registry: SchemeRegistry) -> Self {
        Self { registry }
    }

    fn resolve(&self, request: &VerifyRequest) -> Option<&std::sync::Arc<dyn crate::scheme::Scheme>> {
        self.registry
            .resolve(&request.payment_requirements.network, &request.payment_requirements.scheme)
    }
}

#[async_trait::async_trait]
impl Facilitator for FacilitatorLocal {
    type Error = FacilitatorLocalError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        let Some(scheme) = self.resolve(request) else {
            return Ok(VerifyResponse::invalid(VerifyErrorReason::UnsupportedScheme));
        };
        scheme.verify(request).await.map_err(FacilitatorLocalError::Verification)
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        let Some(scheme) = self.resolve(request) else {
            return Ok(SettleResponse::Error {
                reason: x402_types::error::SettleErrorReason::TransactionFailed,
                network: request.payment_requirements.network.clone(),
                message: None,
            });
        };
        scheme.settle(request).await.map_err(FacilitatorLocalError::Settlement)
    }

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        let mut kinds = Vec::new();
        let mut signers: HashMap<String, Vec<String>> = HashMap::new();
        for scheme in self.registry.schemes() {
            if let Ok(supported) = scheme.supported().await {
                kinds.extend(supported.kinds);
                for (namespace_pattern, addresses) in supported.signers {
                    signers.entry(namespace_pattern).or_insert(addresses);
                }
            }
        }
        Ok(SupportedResponse { kinds, signers })
    }
}

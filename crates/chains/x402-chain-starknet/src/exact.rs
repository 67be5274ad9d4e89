use async_trait::async_trait;
use std::sync::Arc;
use x402_facilitator_core::{Scheme, SchemeError};
use x402_types::error::{SettleErrorReason, VerifyErrorReason};
use x402_types::{
    ChainId, ChainIdPattern, SettleRequest, SettleResponse, SupportedPaymentKind, SupportedResponse, VerifyRequest,
    VerifyResponse, SCHEME_EXACT, X402_VERSION,
};

use crate::paymaster::StarknetPaymaster;
use crate::types::ExactStarknetPayload;

/// Structural-only validation plus paymaster delegation (`spec.md` §1 non-goal:
/// "Starknet's paymaster ... beyond their scheme glue" — no SNIP-12 signature
/// cryptography is performed here, that's the paymaster's job).
pub struct ExactStarknetScheme {
    network: ChainId,
    paymaster: Arc<dyn StarknetPaymaster>,
}

impl ExactStarknetScheme {
    pub fn new(network: ChainId, paymaster: Arc<dyn StarknetPaymaster>) -> Self {
        Self { network, paymaster }
    }

    fn parse_payload(request: &VerifyRequest) -> Result<ExactStarknetPayload, SchemeError> {
        serde_json::from_value(request.payment_payload.payload.clone())
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))
    }

    fn assert_common(&self, request: &VerifyRequest) -> Result<ExactStarknetPayload, SchemeError> {
        if request.payment_payload.accepted != request.payment_requirements {
            return Err(SchemeError::Verify(VerifyErrorReason::AcceptedRequirementsMismatch));
        }
        if request.payment_requirements.network != self.network {
            return Err(SchemeError::Verify(VerifyErrorReason::NetworkMismatch));
        }
        let payload = Self::parse_payload(request)?;
        if payload.signature.is_empty() {
            return Err(SchemeError::Verify(VerifyErrorReason::InvalidSignature));
        }
        if !payload.typed_data.is_object() {
            return Err(SchemeError::Verify(VerifyErrorReason::InvalidSignature));
        }
        Ok(payload)
    }
}

#[async_trait]
impl Scheme for ExactStarknetScheme {
    fn scheme_name(&self) -> &str {
        SCHEME_EXACT
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, SchemeError> {
        match self.assert_common(request) {
            Ok(_) => Ok(VerifyResponse::valid("delegated-to-paymaster")),
            Err(SchemeError::Verify(reason)) => Ok(VerifyResponse::Invalid { reason, payer: None }),
            Err(other) => Err(other),
        }
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, SchemeError> {
        let payload = match self.assert_common(request) {
            Ok(payload) => payload,
            Err(SchemeError::Verify(reason)) => {
                return Ok(SettleResponse::Error {
                    reason: map_verify_to_settle(reason),
                    network: self.network.clone(),
                    message: None,
                })
            }
            Err(other) => return Err(other),
        };
        match self
            .paymaster
            .submit(&payload, &request.payment_requirements.pay_to, &request.payment_requirements.amount)
            .await
        {
            Ok(transaction) => Ok(SettleResponse::Success {
                payer: "delegated-to-paymaster".into(),
                transaction,
                network: self.network.clone(),
            }),
            Err(_) => Ok(SettleResponse::Error {
                reason: SettleErrorReason::TransactionFailed,
                network: self.network.clone(),
                message: None,
            }),
        }
    }

    async fn supported(&self) -> Result<SupportedResponse, SchemeError> {
        let mut signers = std::collections::HashMap::new();
        signers.insert(ChainIdPattern::from(self.network.clone()).to_string(), Vec::new());
        Ok(SupportedResponse {
            kinds: vec![SupportedPaymentKind {
                x402_version: X402_VERSION,
                scheme: SCHEME_EXACT.to_string(),
                network: self.network.clone(),
                extra: None,
            }],
            signers,
        })
    }
}

fn map_verify_to_settle(_reason: VerifyErrorReason) -> SettleErrorReason {
    SettleErrorReason::TransactionFailed
}

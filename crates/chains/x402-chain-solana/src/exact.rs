//! The `exact` Solana scheme: the payer pre-signs an SPL token transfer, the
//! facilitator co-signs as fee payer and submits it (`spec.md` §1 "thin Solana
//! support: exact scheme only").

use async_trait::async_trait;
use solana_message::VersionedMessage;
use solana_signer::Signer as _;
use solana_transaction::versioned::VersionedTransaction;
use std::sync::Arc;
use x402_facilitator_core::{Scheme, SchemeError};
use x402_types::error::{SettleErrorReason, VerifyErrorReason};
use x402_types::{
    ChainIdPattern, SettleRequest, SettleResponse, SupportedPaymentKind, SupportedResponse, VerifyRequest,
    VerifyResponse, SCHEME_EXACT, X402_VERSION,
};

use crate::provider::SvmChainProvider;
use crate::types::ExactSvmPayload;

pub struct ExactSvmScheme {
    provider: Arc<SvmChainProvider>,
}

impl ExactSvmScheme {
    pub fn new(provider: Arc<SvmChainProvider>) -> Self {
        Self { provider }
    }

    fn parse_payload(request: &VerifyRequest) -> Result<ExactSvmPayload, SchemeError> {
        serde_json::from_value(request.payment_payload.payload.clone())
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))
    }

    fn decode_transaction(payload: &ExactSvmPayload) -> Result<VersionedTransaction, SchemeError> {
        let bytes = bs58::decode(&payload.transaction)
            .into_vec()
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))?;
        bincode::deserialize(&bytes).map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))
    }

    async fn assert_common(&self, request: &VerifyRequest) -> Result<VersionedTransaction, SchemeError> {
        if request.payment_payload.accepted != request.payment_requirements {
            return Err(SchemeError::Verify(VerifyErrorReason::AcceptedRequirementsMismatch));
        }
        if request.payment_requirements.network != self.provider.network {
            return Err(SchemeError::Verify(VerifyErrorReason::NetworkMismatch));
        }
        let payload = Self::parse_payload(request)?;
        let transaction = Self::decode_transaction(&payload)?;
        if transaction.signatures.is_empty() {
            return Err(SchemeError::Verify(VerifyErrorReason::InvalidSignature));
        }
        Ok(transaction)
    }

    async fn verify_payment(&self, request: &VerifyRequest) -> Result<String, SchemeError> {
        let transaction = self.assert_common(request).await?;
        let simulation = self
            .provider
            .rpc
            .simulate_transaction(&transaction)
            .await
            .map_err(|err| SchemeError::Chain(err.to_string()))?;
        if simulation.value.err.is_some() {
            return Err(SchemeError::Verify(VerifyErrorReason::InvalidSignature));
        }
        let payer = match &transaction.message {
            VersionedMessage::Legacy(message) => message.account_keys.first(),
            VersionedMessage::V0(message) => message.account_keys.first(),
        }
        .ok_or(SchemeError::Verify(VerifyErrorReason::InvalidSignature))?;
        Ok(payer.to_string())
    }

    async fn settle_payment(&self, request: &SettleRequest) -> Result<(String, String), SchemeError> {
        let mut transaction = self.assert_common(request).await?;
        let fee_payer = self.provider.fee_payer();

        let message_bytes = match &transaction.message {
            VersionedMessage::Legacy(message) => message.serialize(),
            VersionedMessage::V0(message) => message.serialize(),
        };
        let fee_payer_signature = fee_payer.sign_message(&message_bytes);
        if let Some(slot) = transaction.signatures.iter().position(|s| s == &solana_signature::Signature::default()) {
            transaction.signatures[slot] = fee_payer_signature;
        }

        let signature = self
            .provider
            .rpc
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|_| SchemeError::Settle(SettleErrorReason::TransactionFailed))?;

        let payer = match &transaction.message {
            VersionedMessage::Legacy(message) => message.account_keys.first(),
            VersionedMessage::V0(message) => message.account_keys.first(),
        }
        .map(|key| key.to_string())
        .unwrap_or_default();
        Ok((payer, signature.to_string()))
    }
}

#[async_trait]
impl Scheme for ExactSvmScheme {
    fn scheme_name(&self) -> &str {
        SCHEME_EXACT
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, SchemeError> {
        match self.verify_payment(request).await {
            Ok(payer) => Ok(VerifyResponse::valid(payer)),
            Err(SchemeError::Verify(reason)) => Ok(VerifyResponse::Invalid { reason, payer: None }),
            Err(other) => Err(other),
        }
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, SchemeError> {
        match self.settle_payment(request).await {
            Ok((payer, transaction)) => Ok(SettleResponse::Success {
                payer,
                transaction,
                network: self.provider.network.clone(),
            }),
            Err(SchemeError::Settle(reason)) => Ok(SettleResponse::Error {
                reason,
                network: self.provider.network.clone(),
                message: None,
            }),
            Err(SchemeError::Chain(_)) => Ok(SettleResponse::Error {
                reason: SettleErrorReason::TransactionFailed,
                network: self.provider.network.clone(),
                message: None,
            }),
            Err(other) => Err(other),
        }
    }

    async fn supported(&self) -> Result<SupportedResponse, SchemeError> {
        let mut signers = std::collections::HashMap::new();
        signers.insert(
            ChainIdPattern::from(self.provider.network.clone()).to_string(),
            self.provider.signer_addresses().iter().map(|pk| pk.to_string()).collect(),
        );
        Ok(SupportedResponse {
            kinds: vec![SupportedPaymentKind {
                x402_version: X402_VERSION,
                scheme: SCHEME_EXACT.to_string(),
                network: self.provider.network.clone(),
                extra: None,
            }],
            signers,
        })
    }
}


//! Component B: the `exact` EVM scheme — EIP-3009 `transferWithAuthorization`
//! (`spec.md` §4.B).

use alloy_primitives::{Address, FixedBytes, U256};
use alloy_signer::k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use alloy_sol_types::{Eip712Domain, SolStruct};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use x402_facilitator_core::{Scheme, SchemeError};
use x402_types::error::{SettleErrorReason, VerifyErrorReason};
use x402_types::{
    ChainId, ChainIdPattern, SettleRequest, SettleResponse, SupportedPaymentKind, SupportedResponse, VerifyRequest,
    VerifyResponse, SCHEME_EXACT, X402_VERSION,
};

use crate::abi::IEIP3009;
use crate::chain::{assert_domain, assert_enough_balance, assert_enough_value, assert_time, balance_of, EvmChainProvider, ProviderError};
use crate::types::ExactEvmPayload;

alloy_sol_types::sol! {
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

pub struct ExactEvmScheme {
    provider: Arc<EvmChainProvider>,
}

impl ExactEvmScheme {
    pub fn new(provider: Arc<EvmChainProvider>) -> Self {
        Self { provider }
    }

    fn parse_payload(request: &VerifyRequest) -> Result<ExactEvmPayload, SchemeError> {
        serde_json::from_value(request.payment_payload.payload.clone())
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))
    }

    fn assert_common(&self, request: &VerifyRequest, payload: &ExactEvmPayload) -> Result<(), SchemeError> {
        if request.payment_payload.accepted != request.payment_requirements {
            return Err(SchemeError::Verify(VerifyErrorReason::AcceptedRequirementsMismatch));
        }
        if request.payment_requirements.network != self.provider.network {
            return Err(SchemeError::Verify(VerifyErrorReason::NetworkMismatch));
        }
        let pay_to = Address::from_str(&request.payment_requirements.pay_to)
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::RecipientMismatch))?;
        if payload.to != pay_to {
            return Err(SchemeError::Verify(VerifyErrorReason::RecipientMismatch));
        }
        assert_time(payload.valid_after.to::<u64>(), payload.valid_before.to::<u64>())
            .map_err(SchemeError::Verify)?;
        let required: U256 = request
            .payment_requirements
            .amount
            .parse()
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::AmountMismatch))?;
        assert_enough_value(&payload.value, &required).map_err(SchemeError::Verify)?;
        Ok(())
    }

    /// Recovers the signer of the EIP-712 `TransferWithAuthorization` struct and checks
    /// it against `payload.from`. A 65-byte signature is treated as a plain EOA
    /// signature; anything else (EIP-6492 wrapped, ERC-1271 contract signature) is out
    /// of scope for the default EVM chain adapter and rejected as unsupported, per the
    /// three-way dispatch note in this repo's expanded design.
    async fn verify_signature(
        &self,
        domain: &Eip712Domain,
        payload: &ExactEvmPayload,
    ) -> Result<(), SchemeError> {
        let nonce = FixedBytes::<32>::from_str(&payload.nonce)
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))?;
        let message = TransferWithAuthorization {
            from: payload.from,
            to: payload.to,
            value: payload.value,
            validAfter: payload.valid_after,
            validBefore: payload.valid_before,
            nonce,
        };
        let signing_hash = message.eip712_signing_hash(domain);

        let sig_bytes = hex::decode(payload.signature.trim_start_matches("0x"))
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))?;
        if sig_bytes.len() != 65 {
            return Err(SchemeError::Verify(VerifyErrorReason::InvalidSignature));
        }
        let recovery_id = RecoveryId::from_byte(sig_bytes[64].saturating_sub(27))
            .ok_or(SchemeError::Verify(VerifyErrorReason::InvalidSignature))?;
        let signature = K256Signature::from_slice(&sig_bytes[..64])
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))?;
        let recovered = VerifyingKey::recover_from_prehash(signing_hash.as_slice(), &signature, recovery_id)
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidSignature))?;
        let recovered_address = alloy_primitives::Address::from_public_key(&recovered);
        if recovered_address != payload.from {
            return Err(SchemeError::Verify(VerifyErrorReason::InvalidSignature));
        }
        Ok(())
    }

    async fn verify_payment(&self, request: &VerifyRequest) -> Result<String, SchemeError> {
        let payload = Self::parse_payload(request)?;
        self.assert_common(request, &payload)?;

        let asset = Address::from_str(&request.payment_requirements.asset)
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidChainId))?;
        let domain = assert_domain(
            self.provider.provider(),
            asset,
            self.provider.chain_id,
            request.payment_requirements.extra.as_ref(),
        )
        .await
        .map_err(SchemeError::Verify)?;
        self.verify_signature(&domain, &payload).await?;

        let balance = balance_of(self.provider.provider(), asset, payload.from).await.map_err(SchemeError::Verify)?;
        assert_enough_balance(balance, payload.value).map_err(SchemeError::Verify)?;

        Ok(format!("{:#x}", payload.from))
    }

    async fn settle_payment(&self, request: &SettleRequest) -> Result<(String, String), SchemeError> {
        let payload = Self::parse_payload(request)?;
        self.assert_common(request, &payload)?;

        let asset = Address::from_str(&request.payment_requirements.asset)
            .map_err(|_| SchemeError::Settle(SettleErrorReason::TransactionFailed))?;
        let domain = assert_domain(
            self.provider.provider(),
            asset,
            self.provider.chain_id,
            request.payment_requirements.extra.as_ref(),
        )
        .await
        .map_err(SchemeError::Verify)?;
        self.verify_signature(&domain, &payload).await?;

        let sig_bytes = hex::decode(payload.signature.trim_start_matches("0x"))
            .map_err(|_| SchemeError::Settle(SettleErrorReason::TransactionFailed))?;
        let nonce = FixedBytes::<32>::from_str(&payload.nonce)
            .map_err(|_| SchemeError::Settle(SettleErrorReason::TransactionFailed))?;

        let contract = IEIP3009::new(asset, self.provider.provider());
        let call = contract.transferWithAuthorization(
            payload.from,
            payload.to,
            payload.value,
            payload.valid_after,
            payload.valid_before,
            nonce,
            sig_bytes[64],
            FixedBytes::<32>::from_slice(&sig_bytes[..32]),
            FixedBytes::<32>::from_slice(&sig_bytes[32..64]),
        );
        let request_tx = call.into_transaction_request();
        let tx_hash = self.provider.send_and_wait(request_tx, U256::ZERO).await.map_err(|err| match err {
            ProviderError::Reverted(_) => SchemeError::Settle(SettleErrorReason::InvalidTransactionState),
            _ => SchemeError::Settle(SettleErrorReason::TransactionFailed),
        })?;

        Ok((format!("{:#x}", payload.from), format!("{tx_hash:#x}")))
    }
}

#[async_trait]
impl Scheme for ExactEvmScheme {
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
            self.provider.signer_addresses().iter().map(|a| format!("{a:#x}")).collect(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_from_str_for_chain_id() {
        let network = ChainId::new("eip155", "8453");
        assert_eq!(network.to_string(), "eip155:8453");
    }
}

//! Component C ("the core of the core"): the `upto` EVM scheme — an ERC-2612 Permit
//! reused as a standing spending cap, batch-settled by the session machinery in
//! `x402-facilitator-core` rather than per-request (`spec.md` §4.C).

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
    VerifyResponse, SCHEME_UPTO, X402_VERSION,
};

use tracing::warn;

use crate::abi::{IERC20, IERC2612};
use crate::chain::{assert_domain, assert_time, EvmChainProvider, ProviderError};
use crate::types::UptoEvmPayload;

alloy_sol_types::sol! {
    #[derive(Debug)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

pub struct UptoEvmScheme {
    provider: Arc<EvmChainProvider>,
}

impl UptoEvmScheme {
    pub fn new(provider: Arc<EvmChainProvider>) -> Self {
        Self { provider }
    }

    fn parse_payload(request: &VerifyRequest) -> Result<UptoEvmPayload, SchemeError> {
        serde_json::from_value(request.payment_payload.payload.clone())
            .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidUptoEvmPayload))
    }

    /// Verify-time checks common to both `verify` and the first `settle` of a session:
    /// requirements match, network match, spender is one of our signers, cap covers the
    /// `maxAmountRequired` hint if present, deadline hasn't passed, signature recovers
    /// to `owner`.
    async fn assert_common(&self, request: &VerifyRequest, payload: &UptoEvmPayload) -> Result<(), SchemeError> {
        if request.payment_payload.accepted != request.payment_requirements {
            return Err(SchemeError::Verify(VerifyErrorReason::AcceptedRequirementsMismatch));
        }
        if request.payment_requirements.network != self.provider.network {
            return Err(SchemeError::Verify(VerifyErrorReason::NetworkMismatch));
        }
        let signer_addresses = self.provider.signer_addresses();
        if !signer_addresses.contains(&payload.spender) {
            return Err(SchemeError::Verify(VerifyErrorReason::SpenderNotFacilitator));
        }
        check_cap(payload.cap, request.payment_requirements.max_amount_required(), &request.payment_requirements.amount)
            .map_err(SchemeError::Verify)?;
        assert_time(0, payload.deadline.to::<u64>()).map_err(SchemeError::Verify)?;

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
        verify_permit_signature(&domain, payload)?;
        Ok(())
    }

    /// Ensures the Permit has been submitted on-chain for this owner/nonce. A session's
    /// first settle calls `permit()`; every subsequent settle of the same session finds
    /// the allowance already in place and skips straight to `transferFrom`.
    ///
    /// If `permit()` reverts (stale nonce from a race, owner already approved the
    /// spender out-of-band, etc.), this falls back to whatever allowance already exists
    /// on-chain rather than failing the settle outright (`spec.md` §4.C MUST, seed
    /// scenario E5). A zero allowance after a revert means there's truly nothing to fall
    /// back to, so that case still surfaces `PermitFailed`.
    async fn ensure_permit_applied(&self, asset: Address, payload: &UptoEvmPayload) -> Result<(), SchemeError> {
        let token = IERC2612::new(asset, self.provider.provider());
        let current_nonce = token
            .nonces(payload.owner)
            .call()
            .await
            .map(|result| result._0)
            .map_err(|err| SchemeError::Chain(err.to_string()))?;
        if permit_already_consumed(current_nonce, payload.nonce) {
            return Ok(());
        }
        let sig_bytes = hex::decode(payload.signature.trim_start_matches("0x"))
            .map_err(|_| SchemeError::Settle(SettleErrorReason::PermitFailed))?;
        if sig_bytes.len() != 65 {
            return Err(SchemeError::Settle(SettleErrorReason::PermitFailed));
        }
        let call = token.permit(
            payload.owner,
            payload.spender,
            payload.cap,
            payload.deadline,
            sig_bytes[64],
            FixedBytes::<32>::from_slice(&sig_bytes[..32]),
            FixedBytes::<32>::from_slice(&sig_bytes[32..64]),
        );
        let request_tx = call.into_transaction_request();
        if let Err(err) = self.provider.send_and_wait(request_tx, U256::ZERO).await {
            warn!(owner = %payload.owner, spender = %payload.spender, error = %err, "permit call failed, falling back to existing allowance");
            let allowance = IERC20::new(asset, self.provider.provider())
                .allowance(payload.owner, payload.spender)
                .call()
                .await
                .map(|result| result._0)
                .map_err(|chain_err| SchemeError::Chain(chain_err.to_string()))?;
            allowance_covers_fallback(allowance).map_err(SchemeError::Settle)?;
        }
        Ok(())
    }

    async fn verify_payment(&self, request: &VerifyRequest) -> Result<String, SchemeError> {
        let payload = Self::parse_payload(request)?;
        self.assert_common(request, &payload).await?;
        Ok(format!("{:#x}", payload.owner))
    }

    /// Settles one batch: `amount` comes from `request.payment_requirements.amount`,
    /// which the session machinery overwrites with the session's `pendingSpent`
    /// snapshot before calling this (`spec.md` §4.F `settleSession`).
    async fn settle_payment(&self, request: &SettleRequest) -> Result<(String, String), SchemeError> {
        let payload = Self::parse_payload(request)?;
        self.assert_common(request, &payload).await?;

        let asset = Address::from_str(&request.payment_requirements.asset)
            .map_err(|_| SchemeError::Settle(SettleErrorReason::TransactionFailed))?;
        let amount: U256 = request
            .payment_requirements
            .amount
            .parse()
            .map_err(|_| SchemeError::Settle(SettleErrorReason::TransactionFailed))?;
        let pay_to = Address::from_str(&request.payment_requirements.pay_to)
            .map_err(|_| SchemeError::Settle(SettleErrorReason::TransactionFailed))?;

        self.ensure_permit_applied(asset, &payload).await?;

        let token = IERC20::new(asset, self.provider.provider());
        let allowance = token
            .allowance(payload.owner, payload.spender)
            .call()
            .await
            .map(|result| result._0)
            .map_err(|err| SchemeError::Chain(err.to_string()))?;
        if !allowance_covers_amount(allowance, amount) {
            return Err(SchemeError::Settle(SettleErrorReason::InsufficientAllowance));
        }

        let call = token.transferFrom(payload.owner, pay_to, amount);
        let request_tx = call.into_transaction_request();
        let tx_hash = self.provider.send_and_wait(request_tx, U256::ZERO).await.map_err(|err| match err {
            ProviderError::Reverted(_) => SchemeError::Settle(SettleErrorReason::InvalidTransactionState),
            _ => SchemeError::Settle(SettleErrorReason::TransactionFailed),
        })?;

        Ok((format!("{:#x}", payload.owner), format!("{tx_hash:#x}")))
    }
}

/// Checks a Permit's `cap` against both `requirements.amount` and the optional
/// `extra.maxAmountRequired` hint.
fn check_cap(cap: U256, max_required_hint: Option<&str>, required_str: &str) -> Result<(), VerifyErrorReason> {
    if let Some(max_required) = max_required_hint {
        let max_required: U256 = max_required.parse().map_err(|_| VerifyErrorReason::CapBelowRequiredMax)?;
        if cap < max_required {
            return Err(VerifyErrorReason::CapBelowRequiredMax);
        }
    }
    let required: U256 = required_str.parse().map_err(|_| VerifyErrorReason::CapTooLow)?;
    if cap < required {
        return Err(VerifyErrorReason::CapTooLow);
    }
    Ok(())
}

/// Recovers the signer of the EIP-712 `Permit` struct and checks it against
/// `payload.owner`. Doesn't touch chain state, so it's usable standalone in tests.
fn verify_permit_signature(domain: &Eip712Domain, payload: &UptoEvmPayload) -> Result<(), SchemeError> {
    let message = Permit {
        owner: payload.owner,
        spender: payload.spender,
        value: payload.cap,
        nonce: payload.nonce,
        deadline: payload.deadline,
    };
    let signing_hash = message.eip712_signing_hash(domain);

    let sig_bytes = hex::decode(payload.signature.trim_start_matches("0x"))
        .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature))?;
    if sig_bytes.len() != 65 {
        return Err(SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature));
    }
    let recovery_id = RecoveryId::from_byte(sig_bytes[64].saturating_sub(27))
        .ok_or(SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature))?;
    let signature = K256Signature::from_slice(&sig_bytes[..64])
        .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature))?;
    let recovered = VerifyingKey::recover_from_prehash(signing_hash.as_slice(), &signature, recovery_id)
        .map_err(|_| SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature))?;
    if alloy_primitives::Address::from_public_key(&recovered) != payload.owner {
        return Err(SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature));
    }
    Ok(())
}

/// True once an earlier settle in the session has already consumed this Permit's nonce
/// on-chain, so `ensure_permit_applied` can skip straight to the allowance check.
fn permit_already_consumed(current_nonce: U256, payload_nonce: U256) -> bool {
    current_nonce > payload_nonce
}

/// Decides the outcome of a reverted `permit()` call: a nonzero allowance means the
/// owner approved the spender some other way and settlement can proceed; a zero
/// allowance means there's truly nothing to fall back to (`spec.md` §4.C MUST, seed
/// scenario E5).
fn allowance_covers_fallback(allowance: U256) -> Result<(), SettleErrorReason> {
    if allowance.is_zero() {
        Err(SettleErrorReason::PermitFailed)
    } else {
        Ok(())
    }
}

fn allowance_covers_amount(allowance: U256, amount: U256) -> bool {
    allowance >= amount
}

#[async_trait]
impl Scheme for UptoEvmScheme {
    fn scheme_name(&self) -> &str {
        SCHEME_UPTO
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
                scheme: SCHEME_UPTO.to_string(),
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
    use alloy_signer::Signer as _;
    use alloy_signer_local::PrivateKeySigner;

    fn domain() -> Eip712Domain {
        Eip712Domain::new(
            Some("USD Coin".into()),
            Some("2".into()),
            Some(U256::from(8453u64)),
            Some(Address::repeat_byte(0x11)),
            None,
        )
    }

    async fn signed_payload(signer: &PrivateKeySigner, cap: U256, nonce: U256, deadline: U256) -> UptoEvmPayload {
        let owner = signer.address();
        let spender = Address::repeat_byte(0x22);
        let message = Permit { owner, spender, value: cap, nonce, deadline };
        let signing_hash = message.eip712_signing_hash(&domain());
        let signature = signer.sign_hash(&signing_hash).await.expect("signing a local hash never fails");
        UptoEvmPayload {
            owner,
            spender,
            cap,
            nonce,
            deadline,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        }
    }

    #[tokio::test]
    async fn valid_permit_signature_recovers_owner() {
        let signer = PrivateKeySigner::random();
        let payload = signed_payload(&signer, U256::from(1_000u64), U256::ZERO, U256::from(9_999_999_999u64)).await;
        assert!(verify_permit_signature(&domain(), &payload).is_ok());
    }

    #[tokio::test]
    async fn tampered_cap_fails_signature_recovery() {
        let signer = PrivateKeySigner::random();
        let mut payload = signed_payload(&signer, U256::from(1_000u64), U256::ZERO, U256::from(9_999_999_999u64)).await;
        payload.cap = U256::from(1_000_000u64);
        let err = verify_permit_signature(&domain(), &payload).unwrap_err();
        assert!(matches!(err, SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature)));
    }

    #[tokio::test]
    async fn signature_from_a_different_owner_is_rejected() {
        let signer = PrivateKeySigner::random();
        let mut payload = signed_payload(&signer, U256::from(1_000u64), U256::ZERO, U256::from(9_999_999_999u64)).await;
        payload.owner = Address::repeat_byte(0x33);
        let err = verify_permit_signature(&domain(), &payload).unwrap_err();
        assert!(matches!(err, SchemeError::Verify(VerifyErrorReason::InvalidPermitSignature)));
    }

    #[test]
    fn cap_below_requirements_amount_is_rejected() {
        let err = check_cap(U256::from(50u64), None, "100").unwrap_err();
        assert_eq!(err, VerifyErrorReason::CapTooLow);
    }

    #[test]
    fn cap_below_max_amount_required_hint_is_rejected() {
        let err = check_cap(U256::from(50u64), Some("100"), "10").unwrap_err();
        assert_eq!(err, VerifyErrorReason::CapBelowRequiredMax);
    }

    #[test]
    fn cap_covering_both_thresholds_is_accepted() {
        assert!(check_cap(U256::from(100u64), Some("80"), "50").is_ok());
    }

    #[test]
    fn permit_not_yet_consumed_when_chain_nonce_is_behind() {
        assert!(!permit_already_consumed(U256::ZERO, U256::ZERO));
        assert!(!permit_already_consumed(U256::from(3u64), U256::from(3u64)));
    }

    #[test]
    fn permit_already_consumed_when_chain_nonce_is_ahead() {
        assert!(permit_already_consumed(U256::from(4u64), U256::from(3u64)));
    }

    /// Seed scenario E5: `permit()` reverts on-chain, but the owner already holds an
    /// allowance for the spender (approved out-of-band, or left over from an earlier
    /// settle) — settlement must fall back to it instead of failing outright.
    #[test]
    fn permit_revert_falls_back_to_existing_nonzero_allowance() {
        assert!(allowance_covers_fallback(U256::from(500u64)).is_ok());
    }

    /// The other half of E5: a reverted `permit()` with zero allowance has nothing to
    /// fall back to, so it must still surface `PermitFailed`.
    #[test]
    fn permit_revert_with_zero_allowance_still_fails() {
        let err = allowance_covers_fallback(U256::ZERO).unwrap_err();
        assert_eq!(err, SettleErrorReason::PermitFailed);
    }

    #[test]
    fn allowance_exactly_matching_amount_is_sufficient() {
        assert!(allowance_covers_amount(U256::from(100u64), U256::from(100u64)));
    }

    #[test]
    fn allowance_below_amount_is_insufficient() {
        assert!(!allowance_covers_amount(U256::from(99u64), U256::from(100u64)));
    }

    #[test]
    fn payload_round_trips_through_camel_case_json() {
        let json = serde_json::json!({
            "owner": format!("{:#x}", Address::repeat_byte(0x01)),
            "spender": format!("{:#x}", Address::repeat_byte(0x02)),
            "cap": "1000",
            "nonce": "0",
            "deadline": "9999999999",
            "signature": "0xabc123",
        });
        let request = VerifyRequest {
            payment_payload: x402_types::PaymentPayload {
                x402_version: x402_types::X402_VERSION,
                accepted: dummy_requirements(),
                payload: json,
            },
            payment_requirements: dummy_requirements(),
        };
        let payload = UptoEvmScheme::parse_payload(&request).expect("well-formed upto-evm payload parses");
        assert_eq!(payload.cap, U256::from(1000u64));
        assert_eq!(payload.deadline, U256::from(9_999_999_999u64));
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let request = VerifyRequest {
            payment_payload: x402_types::PaymentPayload {
                x402_version: x402_types::X402_VERSION,
                accepted: dummy_requirements(),
                payload: serde_json::json!({"owner": "not-an-address"}),
            },
            payment_requirements: dummy_requirements(),
        };
        let err = UptoEvmScheme::parse_payload(&request).unwrap_err();
        assert!(matches!(err, SchemeError::Verify(VerifyErrorReason::InvalidUptoEvmPayload)));
    }

    fn dummy_requirements() -> x402_types::PaymentRequirements {
        x402_types::PaymentRequirements {
            scheme: SCHEME_UPTO.into(),
            network: ChainId::new("eip155", "8453"),
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
}

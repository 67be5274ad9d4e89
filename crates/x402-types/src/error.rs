//! The error taxonomy of `spec.md` §7, expressed as kind enums rather than exception
//! type names so that every layer (scheme, facilitator core, middleware) can match on
//! them without downcasting.

use serde::{Deserialize, Serialize};

/// Reasons a `/verify` call can fail. Serializes in `snake_case`, matching the wire
/// taxonomy clients are expected to branch on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorReason {
    #[error("unsupported scheme")]
    UnsupportedScheme,
    #[error("network mismatch")]
    NetworkMismatch,
    #[error("recipient mismatch")]
    RecipientMismatch,
    #[error("amount mismatch")]
    AmountMismatch,
    #[error("missing EIP-712 domain in requirements.extra")]
    MissingEip712Domain,
    #[error("invalid upto-evm payload shape")]
    InvalidUptoEvmPayload,
    #[error("spender is not one of the facilitator's signer addresses")]
    SpenderNotFacilitator,
    #[error("authorized cap is below the required amount")]
    CapTooLow,
    #[error("authorized cap is below requirements.extra.maxAmountRequired")]
    CapBelowRequiredMax,
    #[error("authorization window has expired or is too close to expiring")]
    AuthorizationExpired,
    #[error("chain id could not be parsed from the network identifier")]
    InvalidChainId,
    #[error("permit signature did not recover to the claimed owner")]
    InvalidPermitSignature,
    #[error("signature is invalid")]
    InvalidSignature,
    #[error("payer balance is insufficient for the authorized amount")]
    InsufficientBalance,
    #[error("payload's accepted requirements do not match the requested requirements")]
    AcceptedRequirementsMismatch,
}

/// Reasons a `/settle` call can fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum SettleErrorReason {
    #[error("signature is not a supported format for on-chain settlement")]
    UnsupportedSignatureType,
    #[error("on-chain permit call failed and no usable fallback allowance exists")]
    PermitFailed,
    #[error("existing allowance is insufficient to cover the settlement amount")]
    InsufficientAllowance,
    #[error("transaction submission failed")]
    TransactionFailed,
    #[error("transaction was included but reverted")]
    InvalidTransactionState,
    #[error("settlement aborted by a before-settle hook")]
    HookAborted,
}

/// Reasons the resource-server middleware's upto tracking can fail (`spec.md` §4.G).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum TrackingErrorReason {
    #[error("payment payload is malformed")]
    InvalidPayload,
    #[error("a settlement is already in progress for this session")]
    SettlingInProgress,
    #[error("session is closed")]
    SessionClosed,
    #[error("session cap is exhausted")]
    CapExhausted,
}

impl TrackingErrorReason {
    /// HTTP status mapping from `spec.md` §4.G: `invalid_payload → 400`,
    /// `settling_in_progress → 409`, `session_closed → 402`, `cap_exhausted → 402`.
    pub fn http_status(&self) -> u16 {
        match self {
            TrackingErrorReason::InvalidPayload => 400,
            TrackingErrorReason::SettlingInProgress => 409,
            TrackingErrorReason::SessionClosed => 402,
            TrackingErrorReason::CapExhausted => 402,
        }
    }
}

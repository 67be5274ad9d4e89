//! Wire shapes for `PaymentPayload.payload` on EVM chains (`spec.md` §3).

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// The `exact-evm` payload: an EIP-3009 `TransferWithAuthorization` plus its signature.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    pub from: Address,
    pub to: Address,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub value: U256,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub valid_after: U256,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub valid_before: U256,
    pub nonce: String,
    pub signature: String,
}

/// The `upto-evm` payload: an ERC-2612 Permit plus its signature — a reusable spending
/// cap rather than a one-shot transfer authorization.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptoEvmPayload {
    pub owner: Address,
    pub spender: Address,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub cap: U256,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub nonce: U256,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub deadline: U256,
    pub signature: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Eip3009AuthorizationExtra {
    pub nonce: Option<String>,
}

//! EVM chain wiring configuration, loaded by the `facilitator` binary's config layer
//! and handed to [`super::provider::EvmChainProvider::connect`].

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;
use x402_types::ChainId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmChainConfig {
    pub network: ChainId,
    /// RPC endpoints, tried in order with automatic fallover
    /// (`spec.md` §5 "transient RPC failures ... transparent retry/fallback").
    pub rpc_urls: Vec<Url>,
    /// Hex-encoded secp256k1 private keys, one per signer. Multiple signers let the
    /// facilitator round-robin nonce pressure across addresses under load.
    #[serde(default)]
    pub signer_keys: Vec<String>,
    /// Numeric EIP-155 chain id, used to validate `rpc_urls` actually point at the
    /// network named by `network`.
    pub chain_id: u64,
    /// Whether the chain's fee market supports EIP-1559 (`maxFeePerGas` /
    /// `maxPriorityFeePerGas`) or only legacy `gasPrice`.
    #[serde(default = "default_eip1559")]
    pub eip1559: bool,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

fn default_eip1559() -> bool {
    true
}

fn default_receipt_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone)]
pub struct SpenderSet {
    pub addresses: Vec<Address>,
}

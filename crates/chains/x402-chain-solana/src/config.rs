use serde::{Deserialize, Serialize};
use url::Url;
use x402_types::ChainId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmChainConfig {
    pub network: ChainId,
    pub rpc_url: Url,
    /// Base58-encoded keypairs, one per fee-payer/facilitator signer.
    #[serde(default)]
    pub signer_keys: Vec<String>,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_commitment() -> String {
    "confirmed".into()
}

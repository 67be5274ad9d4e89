//! Solana connection wrapper: one facilitator-funded fee payer plus an RPC client used
//! for balance reads and transaction submission.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer as _;
use x402_types::ChainId;

use crate::config::SvmChainConfig;

#[derive(Debug, thiserror::Error)]
pub enum SvmProviderError {
    #[error("no signer configured for network")]
    NoSigner,
    #[error("invalid keypair: {0}")]
    InvalidKey(String),
    #[error("rpc error: {0}")]
    Rpc(String),
}

pub struct SvmChainProvider {
    pub network: ChainId,
    pub rpc: RpcClient,
    signers: Vec<Keypair>,
}

impl SvmChainProvider {
    pub fn connect(config: &SvmChainConfig) -> Result<Self, SvmProviderError> {
        let mut signers = Vec::with_capacity(config.signer_keys.len());
        for key in &config.signer_keys {
            let bytes = bs58::decode(key).into_vec().map_err(|err| SvmProviderError::InvalidKey(err.to_string()))?;
            let keypair = Keypair::try_from(bytes.as_slice()).map_err(|err| SvmProviderError::InvalidKey(err.to_string()))?;
            signers.push(keypair);
        }
        if signers.is_empty() {
            return Err(SvmProviderError::NoSigner);
        }
        let commitment = match config.commitment.as_str() {
            "finalized" => CommitmentConfig::finalized(),
            "processed" => CommitmentConfig::processed(),
            _ => CommitmentConfig::confirmed(),
        };
        let rpc = RpcClient::new_with_commitment(config.rpc_url.to_string(), commitment);
        Ok(Self { network: config.network.clone(), rpc, signers })
    }

    pub fn fee_payer(&self) -> &Keypair {
        &self.signers[0]
    }

    pub fn signer_addresses(&self) -> Vec<Pubkey> {
        self.signers.iter().map(|k| k.pubkey()).collect()
    }
}

//! Builds the scheme registry from the server's chain configuration: one
//! `EvmChainProvider`/`SvmChainProvider` per configured chain, registered against both
//! `exact` and (for EVM) `upto`.

use std::sync::Arc;
use x402_chain_evm::{EvmChainProvider, ExactEvmScheme, UptoEvmScheme};
use x402_chain_solana::{ExactSvmScheme, SvmChainProvider};
use x402_facilitator_core::SchemeRegistry;
use x402_types::{ChainIdPattern, SCHEME_EXACT, SCHEME_UPTO};

use crate::config::ChainConfig;

#[derive(Debug, thiserror::Error)]
pub enum ChainRegistryError {
    #[error("failed to connect eip155 provider for {network}: {source}")]
    Evm {
        network: x402_types::ChainId,
        #[source]
        source: x402_chain_evm::ProviderError,
    },
    #[error("failed to connect solana provider for {network}: {source}")]
    Solana {
        network: x402_types::ChainId,
        #[source]
        source: x402_chain_solana::SvmProviderError,
    },
}

pub async fn build_registry(chains: &[ChainConfig]) -> Result<SchemeRegistry, ChainRegistryError> {
    let mut registry = SchemeRegistry::new();

    for chain in chains {
        match chain {
            ChainConfig::Eip155(config) => {
                let provider = EvmChainProvider::connect(config)
                    .await
                    .map_err(|source| ChainRegistryError::Evm { network: config.network.clone(), source })?;
                let provider = Arc::new(provider);
                let pattern = ChainIdPattern::from(config.network.clone());
                registry.register(pattern.clone(), SCHEME_EXACT, Arc::new(ExactEvmScheme::new(provider.clone())));
                registry.register(pattern, SCHEME_UPTO, Arc::new(UptoEvmScheme::new(provider)));
            }
            ChainConfig::Solana(config) => {
                let provider = SvmChainProvider::connect(config)
                    .map_err(|source| ChainRegistryError::Solana { network: config.network.clone(), source })?;
                let provider = Arc::new(provider);
                let pattern = ChainIdPattern::from(config.network.clone());
                registry.register(pattern, SCHEME_EXACT, Arc::new(ExactSvmScheme::new(provider)));
            }
        }
    }

    Ok(registry)
}

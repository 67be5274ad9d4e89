//! Exact and upto payment schemes for EVM chains, plus the shared multi-signer,
//! multi-endpoint provider both dial through.

pub mod abi;
pub mod chain;
pub mod exact;
pub mod types;
pub mod upto;

pub use chain::{EvmChainConfig, EvmChainProvider, ProviderError, SharedEvmChainProvider};
pub use exact::ExactEvmScheme;
pub use upto::UptoEvmScheme;

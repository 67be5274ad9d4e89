//! Thin exact-scheme support for Solana: the facilitator only ever co-signs as fee
//! payer and relays a payer-signed SPL token transfer.

pub mod config;
pub mod exact;
pub mod provider;
pub mod types;

pub use config::SvmChainConfig;
pub use exact::ExactSvmScheme;
pub use provider::{SvmChainProvider, SvmProviderError};

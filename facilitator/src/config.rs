//! Configuration for the x402 facilitator server.
//!
//! Fields use serde defaults that fall back to environment variables, then to
//! hardcoded defaults.

use clap::Parser;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use x402_chain_evm::EvmChainConfig;
use x402_chain_solana::SvmChainConfig;
use x402_types::ChainId;

/// CLI arguments for the x402 facilitator server.
#[derive(Parser, Debug)]
#[command(name = "x402-facilitator")]
#[command(about = "x402 Facilitator HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    chains: ChainsConfig,
}

/// Per-chain wiring configuration, keyed in the config file by CAIP-2 chain id.
///
/// Starknet has no entry here: `x402-chain-starknet` settles through an externally
/// injected `StarknetPaymaster`, which isn't a thing a JSON config file can construct,
/// so wiring a Starknet chain into this binary is left to a caller embedding
/// `x402-facilitator-core` directly rather than driven by this config format.
#[derive(Debug, Clone)]
pub enum ChainConfig {
    Eip155(Box<EvmChainConfig>),
    Solana(Box<SvmChainConfig>),
}

#[derive(Debug, Clone, Default)]
pub struct ChainsConfig(pub Vec<ChainConfig>);

impl Serialize for ChainsConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for chain in &self.0 {
            match chain {
                ChainConfig::Eip155(config) => map.serialize_entry(&config.network, config)?,
                ChainConfig::Solana(config) => map.serialize_entry(&config.network, config)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ChainsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::{MapAccess, Visitor};
        use std::fmt;

        struct ChainsVisitor;

        impl<'de> Visitor<'de> for ChainsVisitor {
            type Value = ChainsConfig;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of CAIP-2 chain identifiers to chain configurations")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut chains = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(chain_id) = access.next_key::<ChainId>()? {
                    let chain = match chain_id.namespace() {
                        "eip155" => {
                            let config: EvmChainConfig = access.next_value()?;
                            ChainConfig::Eip155(Box::new(config))
                        }
                        "solana" => {
                            let config: SvmChainConfig = access.next_value()?;
                            ChainConfig::Solana(Box::new(config))
                        }
                        other => {
                            return Err(serde::de::Error::custom(format!(
                                "unsupported chain namespace: {other}"
                            )));
                        }
                    };
                    chains.push(chain);
                }
                Ok(ChainsConfig(chains))
            }
        }

        deserializer.deserialize_map(ChainsVisitor)
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    pub fn default_port() -> u16 {
        env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT)
    }

    pub fn default_host() -> IpAddr {
        env::var("HOST").ok().and_then(|s| s.parse().ok()).unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains.0
    }

    /// Loads configuration from `--config <path>` (defaulting to `./config.json`).
    /// Missing fields fall back to the per-field env vars/defaults above.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_config_round_trips_through_json() {
        let json = serde_json::json!({
            "eip155:8453": {
                "network": "eip155:8453",
                "rpc_urls": ["https://base.example/rpc"],
                "signer_keys": [],
                "chain_id": 8453,
            },
            "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp": {
                "network": "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
                "rpc_url": "https://solana.example/rpc",
            },
        });
        let chains: ChainsConfig = serde_json::from_value(json).unwrap();
        assert_eq!(chains.0.len(), 2);
    }
}

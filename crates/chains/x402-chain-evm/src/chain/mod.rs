pub mod config;
pub mod provider;

pub use config::EvmChainConfig;
pub use provider::{EvmChainProvider, ProviderError, SharedEvmChainProvider};

use alloy_primitives::{Address, U256};
use alloy_sol_types::Eip712Domain;
use std::time::{SystemTime, UNIX_EPOCH};
use x402_types::error::VerifyErrorReason;

use crate::abi::IERC5267;

/// Seconds subtracted from `validBefore`/`deadline` before comparing against `now`, so
/// an authorization that expires within this window is rejected up front rather than
/// accepted and then racing its own expiry during settlement.
const EXPIRY_BUFFER_SECS: u64 = 6;

/// Common verify-time assertions shared by the exact and upto EVM schemes
/// (`spec.md` §4.B / §4.C steps 1-4, which are identical across both schemes before
/// they diverge on the payload shape itself).
pub fn assert_time(valid_after: u64, valid_before: u64) -> Result<(), VerifyErrorReason> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    if now < valid_after || now >= valid_before.saturating_sub(EXPIRY_BUFFER_SECS) {
        return Err(VerifyErrorReason::AuthorizationExpired);
    }
    Ok(())
}

pub fn assert_enough_value(authorized: &U256, required: &U256) -> Result<(), VerifyErrorReason> {
    if authorized < required {
        return Err(VerifyErrorReason::AmountMismatch);
    }
    Ok(())
}

/// Reads the token's EIP-5267 `eip712Domain()` when available; otherwise falls back to
/// the `name`/`version` hints carried in `PaymentRequirements.extra`
/// (`spec.md` §3 `PaymentRequirements.extra` for EVM assets).
pub async fn assert_domain<P: alloy_provider::Provider>(
    provider: &P,
    asset: Address,
    chain_id: u64,
    extra: Option<&serde_json::Value>,
) -> Result<Eip712Domain, VerifyErrorReason> {
    let contract = IERC5267::new(asset, provider);
    if let Ok(call) = contract.eip712Domain().call().await {
        return Ok(Eip712Domain::new(
            Some(call.name.into()),
            Some(call.version.into()),
            Some(U256::from(chain_id)),
            Some(asset),
            None,
        ));
    }
    let name = extra
        .and_then(|value| value.get("name"))
        .and_then(|value| value.as_str())
        .ok_or(VerifyErrorReason::MissingEip712Domain)?;
    let version = extra
        .and_then(|value| value.get("version"))
        .and_then(|value| value.as_str())
        .unwrap_or("1");
    Ok(Eip712Domain::new(
        Some(name.to_string().into()),
        Some(version.to_string().into()),
        Some(U256::from(chain_id)),
        Some(asset),
        None,
    ))
}

pub async fn balance_of<P: alloy_provider::Provider>(
    provider: &P,
    asset: Address,
    owner: Address,
) -> Result<U256, VerifyErrorReason> {
    let contract = crate::abi::IERC20::new(asset, provider);
    contract
        .balanceOf(owner)
        .call()
        .await
        .map(|result| result._0)
        .map_err(|_| VerifyErrorReason::InsufficientBalance)
}

pub fn assert_enough_balance(balance: U256, required: U256) -> Result<(), VerifyErrorReason> {
    if balance < required {
        return Err(VerifyErrorReason::InsufficientBalance);
    }
    Ok(())
}

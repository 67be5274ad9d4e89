//! The capability boundary between this crate and an external Starknet paymaster
//! service. Shaped the same way as `x402-reqwest`'s `FacilitatorClient` — a narrow
//! async trait the binary wires a concrete implementation into, with no concrete
//! implementation shipped here (`spec.md` §1: "Starknet's paymaster ... beyond their
//! scheme glue").

use async_trait::async_trait;

use crate::types::ExactStarknetPayload;

#[derive(Debug, thiserror::Error)]
pub enum PaymasterError {
    #[error("paymaster rejected the request: {0}")]
    Rejected(String),
    #[error("paymaster unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait StarknetPaymaster: Send + Sync {
    /// Submits the signed typed-data bundle for sponsored execution and returns the
    /// resulting transaction hash once accepted by the paymaster (not necessarily
    /// finalized on L2 yet).
    async fn submit(&self, payload: &ExactStarknetPayload, pay_to: &str, amount: &str) -> Result<String, PaymasterError>;
}

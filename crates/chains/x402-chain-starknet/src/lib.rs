//! Thin Starknet adapter: structural payload validation only, settlement delegated to
//! an external paymaster via [`paymaster::StarknetPaymaster`].

pub mod exact;
pub mod paymaster;
pub mod types;

pub use exact::ExactStarknetScheme;
pub use paymaster::{PaymasterError, StarknetPaymaster};
pub use types::ExactStarknetPayload;

//! Facilitator core: the chain-agnostic engine around a [`scheme::SchemeRegistry`] —
//! dispatch (component A), lifecycle hooks (component F), the session store (component
//! D), the sweeper (component E), and the facilitator's own HTTP surface (component H).
//!
//! Concrete payment schemes (exact/upto EVM, exact Solana, exact Starknet) live in the
//! `x402-chain-*` crates and register themselves into a [`scheme::SchemeRegistry`] built
//! by the `facilitator` binary at startup.

pub mod facilitator;
pub mod handlers;
pub mod hooks;
pub mod scheme;
pub mod session;
pub mod sweeper;

pub use facilitator::{Facilitator, FacilitatorLocal, FacilitatorLocalError};
pub use hooks::{FacilitatorCore, HookError, SettleContext, SettleHook, VerifyContext, VerifyHook};
pub use scheme::{Scheme, SchemeError, SchemeRegistry};
pub use session::{
    derive_session_id, normalize_low_s, settle_session, InMemorySessionStore, LastSettlement, Session,
    SessionStatus, SessionStore, SettleSessionError,
};
pub use sweeper::{run as run_sweeper, DEFAULT_SWEEP_INTERVAL};

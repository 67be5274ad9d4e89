//! Shared wire types for the x402 payment facilitator: CAIP-2 chain identifiers, the
//! `PaymentRequirements`/`PaymentPayload`/`PaymentRequired` data model, the facilitator
//! HTTP surface's request/response bodies, and the verify/settle/tracking error
//! taxonomy.

mod b64;
mod chain_id;
pub mod error;
pub mod money;
mod proto;

pub use b64::{HeaderCodecError, decode as decode_header, encode as encode_header};
pub use chain_id::{ChainId, ChainIdFormatError, ChainIdPattern};
pub use proto::*;

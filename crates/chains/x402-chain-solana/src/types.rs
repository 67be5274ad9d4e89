use serde::{Deserialize, Serialize};

/// The `exact-svm` payload (`spec.md` §3): a base58-encoded, fully owner-signed
/// transaction containing a single SPL token `Transfer`/`TransferChecked` instruction.
/// The facilitator only adds the fee-payer signature and submits it unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSvmPayload {
    pub transaction: String,
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `exact-starknet` payload (`spec.md` §3): an opaque SNIP-12 typed-data bundle the
/// facilitator hands to the paymaster unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactStarknetPayload {
    pub typed_data: Value,
    pub signature: Vec<String>,
}

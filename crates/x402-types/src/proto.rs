//! Wire types for the x402 protocol (`spec.md` §3, §4.H, §6).

use crate::error::{SettleErrorReason, VerifyErrorReason};
use crate::ChainId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const X402_VERSION: u32 = 1;

pub const SCHEME_EXACT: &str = "exact";
pub const SCHEME_UPTO: &str = "upto";

/// The server's ask for one payment option (`spec.md` §3 `PaymentRequirements`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: ChainId,
    pub asset: String,
    /// Decimal integer, base units, as a string (values may exceed 2^53).
    pub amount: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    /// Opaque map; for EVM carries `{name, version}` (EIP-712 domain) and, for
    /// `upto`, `maxAmountRequired`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

impl PaymentRequirements {
    pub fn extra_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.as_ref().and_then(|v| v.get(key))
    }

    pub fn eip712_domain(&self) -> Option<(String, String)> {
        let name = self.extra_field("name")?.as_str()?.to_string();
        let version = self.extra_field("version")?.as_str()?.to_string();
        Some((name, version))
    }

    pub fn max_amount_required(&self) -> Option<&str> {
        self.extra_field("maxAmountRequired").and_then(|v| v.as_str())
    }
}

/// The 402 body (`spec.md` §3 `PaymentRequired`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl PaymentRequired {
    pub fn new(accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: None,
            accepts,
            payer: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// The payment payload signed by the payer (`spec.md` §3 `PaymentPayload`), carried in
/// the `PAYMENT-SIGNATURE` header. `payload` is scheme-specific and deliberately kept
/// as raw JSON here — the scheme selected by `accepted.scheme`/`accepted.network`
/// decides how to parse it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub accepted: PaymentRequirements,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

pub type SettleRequest = VerifyRequest;

/// `{isValid, payer, invalidReason}`, hand-rolled so the wire shape matches
/// `spec.md` §4.B step 6 exactly (a tagged sum internally, a flat object on the wire).
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyResponse {
    Valid { payer: String },
    Invalid { reason: VerifyErrorReason, payer: Option<String> },
}

impl VerifyResponse {
    pub fn valid(payer: impl Into<String>) -> Self {
        VerifyResponse::Valid { payer: payer.into() }
    }

    pub fn invalid(reason: VerifyErrorReason) -> Self {
        VerifyResponse::Invalid { reason, payer: None }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResponse::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<VerifyErrorReason>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            VerifyResponse::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(payer.clone()),
                invalid_reason: None,
            },
            VerifyResponse::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(reason.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(VerifyResponse::Valid { payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(VerifyResponse::Invalid {
                reason,
                payer: wire.payer,
            })
        }
    }
}

/// `{success, transaction?, payer?, network, errorReason?}`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleResponse {
    Success {
        payer: String,
        transaction: String,
        network: ChainId,
    },
    Error {
        reason: SettleErrorReason,
        network: ChainId,
        /// Free-text detail for reasons that don't fit the closed taxonomy, e.g. a
        /// `before_settle` hook's abort message (`spec.md` §4.F: "a thrown error aborts
        /// settlement with `errorReason = hook-message`").
        message: Option<String>,
    },
}

impl SettleResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, SettleResponse::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    network: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<SettleErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl Serialize for SettleResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            SettleResponse::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                payer: Some(payer.clone()),
                transaction: Some(transaction.clone()),
                network: network.clone(),
                error_reason: None,
                error_message: None,
            },
            SettleResponse::Error { reason, network, message } => SettleResponseWire {
                success: false,
                payer: None,
                transaction: None,
                network: network.clone(),
                error_reason: Some(reason.clone()),
                error_message: message.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let payer = wire.payer.ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            Ok(SettleResponse::Success {
                payer,
                transaction,
                network: wire.network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(SettleResponse::Error {
                reason,
                network: wire.network,
                message: wire.error_message,
            })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: u32,
    pub scheme: String,
    pub network: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// `GetSupported` output (`spec.md` §4.A): computed fresh on every call, never cached.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedPaymentKind>,
    /// Keyed by CAIP-2 namespace wildcard pattern, e.g. `"eip155:*"`.
    pub signers: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: SCHEME_EXACT.into(),
            network: ChainId::new("eip155", "8453"),
            asset: "0x8335ade1629cd92913".into(),
            amount: "10000".into(),
            pay_to: "0xM".into(),
            max_timeout_seconds: 300,
            extra: None,
            resource: None,
            description: None,
            mime_type: None,
            output_schema: None,
        }
    }

    #[test]
    fn verify_response_valid_roundtrips() {
        let response = VerifyResponse::valid("0xP");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"isValid\":true"));
        let back: VerifyResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn verify_response_invalid_roundtrips() {
        let response = VerifyResponse::invalid(VerifyErrorReason::CapTooLow);
        let json = serde_json::to_string(&response).unwrap();
        let back: VerifyResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn settle_response_success_roundtrips() {
        let response = SettleResponse::Success {
            payer: "0xP".into(),
            transaction: "0xtx".into(),
            network: ChainId::new("eip155", "8453"),
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: SettleResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response, back);
    }

    #[test]
    fn payment_requirements_extracts_eip712_domain() {
        let mut req = requirements();
        req.extra = Some(serde_json::json!({"name": "USD Coin", "version": "2"}));
        assert_eq!(
            req.eip712_domain(),
            Some(("USD Coin".to_string(), "2".to_string()))
        );
    }
}

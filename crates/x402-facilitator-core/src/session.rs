//! Component D (Session Store) and the `settleSession` transition from component F
//! (`spec.md` §3 `Session`, §4.D, §4.F).

use alloy_primitives::U256;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use x402_types::{ChainId, PaymentPayload, PaymentRequirements, SettleRequest, SettleResponse};

use crate::facilitator::Facilitator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Settling,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastSettlement {
    pub at_ms: u64,
    pub reason: String,
    pub receipt: SettleResponse,
}

/// `spec.md` §3 `Session`. Amounts are `U256` (base units, unbounded non-negative
/// integers, since on-chain token amounts can exceed 2^53).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub cap: U256,
    pub pending_spent: U256,
    pub settled_total: U256,
    /// Unix seconds — the Permit's `deadline`.
    pub deadline: u64,
    pub status: SessionStatus,
    /// Monotonic milliseconds of the last accepted (verified) request.
    pub last_activity_ms: u64,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
    pub last_settlement: Option<LastSettlement>,
}

impl Session {
    /// Invariant 1 of `spec.md` §3: `settledTotal + pendingSpent ≤ cap`.
    pub fn is_within_cap(&self) -> bool {
        self.settled_total.saturating_add(self.pending_spent) <= self.cap
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Secp256k1 group order `n`, used to normalize signatures to low-`s` form before
/// hashing them into a session id (`spec.md` §9 open question: "implementers should
/// normalize the signature (low-s form) before hashing").
const SECP256K1_N: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xBA, 0xAE, 0xDC,
    0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Normalizes a 65-byte `(r, s, v)` ECDSA signature (hex, optionally `0x`-prefixed) to
/// low-`s` form, flipping `v`'s parity to compensate. Signatures that aren't exactly 65
/// bytes are passed through unchanged — non-standard signature shapes are rejected
/// elsewhere (settle's `unsupported_signature_type`), not here.
pub fn normalize_low_s(signature_hex: &str) -> String {
    let trimmed = signature_hex.trim_start_matches("0x");
    let Ok(bytes) = hex::decode(trimmed) else {
        return signature_hex.to_string();
    };
    if bytes.len() != 65 {
        return signature_hex.to_string();
    }
    let n = U256::from_be_bytes(SECP256K1_N);
    let half_n = n / U256::from(2u8);
    let s = U256::from_be_bytes::<32>(bytes[32..64].try_into().unwrap());
    if s <= half_n {
        return signature_hex.to_string();
    }
    let new_s = n - s;
    let mut out = bytes.clone();
    out[32..64].copy_from_slice(&new_s.to_be_bytes::<32>());
    let v = bytes[64];
    out[64] = match v {
        27 => 28,
        28 => 27,
        0 => 1,
        1 => 0,
        other => other,
    };
    format!("0x{}", hex::encode(out))
}

#[derive(Serialize)]
struct SessionIdInput<'a> {
    network: &'a ChainId,
    asset: &'a str,
    owner: &'a str,
    spender: &'a str,
    cap: &'a str,
    nonce: &'a str,
    deadline: u64,
    signature: &'a str,
}

/// `spec.md` §3 session-id: `SHA-256` over the canonical JSON of
/// `{network, asset, owner, spender, cap, nonce, deadline, signature}`, with the
/// signature normalized to low-`s` form so two signing libraries producing different
/// `s` representations of the same logical Permit land on the same session id.
pub fn derive_session_id(
    network: &ChainId,
    asset: &str,
    owner: &str,
    spender: &str,
    cap: &str,
    nonce: &str,
    deadline: u64,
    signature: &str,
) -> String {
    let normalized_signature = normalize_low_s(signature);
    let input = SessionIdInput {
        network,
        asset,
        owner,
        spender,
        cap,
        nonce,
        deadline,
        signature: &normalized_signature,
    };
    let canonical = serde_json::to_vec(&input).expect("session id input always serializes");
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Option<Session>;
    async fn set(&self, id: String, session: Session);
    async fn delete(&self, id: &str);
    async fn entries(&self) -> Vec<(String, Session)>;
}

/// Default in-memory session store (`spec.md` §4.D): no TTL, no persistence across
/// restarts, at-least-once linearizable `set` provided by `dashmap`'s per-shard
/// locking.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    async fn set(&self, id: String, session: Session) {
        self.sessions.insert(id, session);
    }

    async fn delete(&self, id: &str) {
        self.sessions.remove(id);
    }

    async fn entries(&self) -> Vec<(String, Session)> {
        self.sessions.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettleSessionError {
    #[error("facilitator settle call failed: {0}")]
    Facilitator(String),
}

/// The `settleSession` transition of `spec.md` §4.F, executed under the session's
/// logical lock (the `status` field itself: `open → settling → open|closed`).
pub async fn settle_session<F: Facilitator>(
    store: &dyn SessionStore,
    facilitator: &F,
    session_id: &str,
    reason: &str,
    close_after: bool,
) -> Result<(), SettleSessionError> {
    const DEADLINE_BUFFER_SECS: u64 = 60;

    let Some(mut session) = store.get(session_id).await else {
        return Ok(());
    };
    if session.status == SessionStatus::Settling {
        return Ok(());
    }
    if session.pending_spent.is_zero() {
        if close_after {
            session.status = SessionStatus::Closed;
            store.set(session_id.to_string(), session).await;
        }
        return Ok(());
    }

    let settle_amount = session.pending_spent;
    let previous_status = session.status;
    session.status = SessionStatus::Settling;
    store.set(session_id.to_string(), session.clone()).await;

    let mut requirements = session.payment_requirements.clone();
    requirements.amount = settle_amount.to_string();
    let request = SettleRequest {
        payment_payload: session.payment_payload.clone(),
        payment_requirements: requirements,
    };

    let network = session.payment_requirements.network.clone();
    let outcome = facilitator.settle(&request).await;

    let receipt = match outcome {
        Ok(response) => response,
        Err(err) => {
            session.status = if close_after { SessionStatus::Closed } else { previous_status };
            session.last_settlement = Some(LastSettlement {
                at_ms: now_millis(),
                reason: reason.to_string(),
                receipt: SettleResponse::Error {
                    reason: x402_types::error::SettleErrorReason::TransactionFailed,
                    network,
                    message: Some(err.to_string()),
                },
            });
            store.set(session_id.to_string(), session).await;
            return Err(SettleSessionError::Facilitator(err.to_string()));
        }
    };

    if receipt.is_success() {
        session.settled_total = session.settled_total.saturating_add(settle_amount);
        session.pending_spent = U256::ZERO;
        let now_s = now_unix();
        session.status = if close_after
            || session.settled_total >= session.cap
            || session.deadline <= now_s.saturating_add(DEADLINE_BUFFER_SECS)
        {
            SessionStatus::Closed
        } else {
            SessionStatus::Open
        };
    } else {
        session.status = if close_after { SessionStatus::Closed } else { previous_status };
    }
    session.last_settlement = Some(LastSettlement {
        at_ms: now_millis(),
        reason: reason.to_string(),
        receipt,
    });
    store.set(session_id.to_string(), session).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_deterministic_for_same_permit() {
        let network = ChainId::new("eip155", "8453");
        let id_a = derive_session_id(&network, "0xasset", "0xowner", "0xspender", "50000", "0", 9999, "0xsig");
        let id_b = derive_session_id(&network, "0xasset", "0xowner", "0xspender", "50000", "0", 9999, "0xsig");
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn session_id_changes_with_nonce() {
        let network = ChainId::new("eip155", "8453");
        let id_a = derive_session_id(&network, "0xasset", "0xowner", "0xspender", "50000", "0", 9999, "0xsig");
        let id_b = derive_session_id(&network, "0xasset", "0xowner", "0xspender", "50000", "1", 9999, "0xsig");
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn normalize_low_s_is_idempotent() {
        // A signature with a high s should normalize to the same value twice.
        let high_s_sig = format!(
            "0x{}{}{}",
            "11".repeat(32),
            hex::encode(SECP256K1_N),
            "1c"
        );
        let once = normalize_low_s(&high_s_sig);
        let twice = normalize_low_s(&once);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn within_cap_invariant_holds_after_construction() {
        let session = Session {
            cap: U256::from(100u64),
            pending_spent: U256::from(40u64),
            settled_total: U256::from(60u64),
            deadline: now_unix() + 3600,
            status: SessionStatus::Open,
            last_activity_ms: now_millis(),
            payment_payload: PaymentPayload {
                x402_version: x402_types::X402_VERSION,
                accepted: dummy_requirements(),
                payload: serde_json::json!({}),
            },
            payment_requirements: dummy_requirements(),
            last_settlement: None,
        };
        assert!(session.is_within_cap());
    }

    fn dummy_requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "upto".into(),
            network: ChainId::new("eip155", "8453"),
            asset: "0xasset".into(),
            amount: "1".into(),
            pay_to: "0xpay".into(),
            max_timeout_seconds: 60,
            extra: None,
            resource: None,
            description: None,
            mime_type: None,
            output_schema: None,
        }
    }
}

//! `spec.md` §4.G step 5: upto session tracking on the resource-server side. Computes
//! the session id for a freshly verified `upto` payload, creates the session if it's
//! new, and enforces the cap/status checks before the handler runs.

use x402_facilitator_core::{derive_session_id, Session, SessionStatus, SessionStore};
use x402_types::error::TrackingErrorReason;
use x402_types::{PaymentPayload, PaymentRequirements};

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct UptoPayloadFields {
    owner: String,
    spender: String,
    cap: String,
    nonce: serde_json::Value,
    deadline: u64,
    signature: String,
}

pub async fn track_request(
    store: &dyn SessionStore,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<String, TrackingErrorReason> {
    let fields: UptoPayloadFields =
        serde_json::from_value(payload.payload.clone()).map_err(|_| TrackingErrorReason::InvalidPayload)?;
    let nonce = fields.nonce.to_string();

    let session_id = derive_session_id(
        &requirements.network,
        &requirements.asset,
        &fields.owner,
        &fields.spender,
        &fields.cap,
        &nonce,
        fields.deadline,
        &fields.signature,
    );

    let amount: alloy_primitives::U256 =
        requirements.amount.parse().map_err(|_| TrackingErrorReason::InvalidPayload)?;
    let cap: alloy_primitives::U256 = fields.cap.parse().map_err(|_| TrackingErrorReason::InvalidPayload)?;

    let mut session = match store.get(&session_id).await {
        Some(session) => session,
        None => Session {
            cap,
            pending_spent: alloy_primitives::U256::ZERO,
            settled_total: alloy_primitives::U256::ZERO,
            deadline: fields.deadline,
            status: SessionStatus::Open,
            last_activity_ms: x402_facilitator_core::session::now_millis(),
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
            last_settlement: None,
        },
    };

    match session.status {
        SessionStatus::Settling => return Err(TrackingErrorReason::SettlingInProgress),
        SessionStatus::Closed => return Err(TrackingErrorReason::SessionClosed),
        SessionStatus::Open => {}
    }

    let projected = session.settled_total.saturating_add(session.pending_spent).saturating_add(amount);
    if projected > session.cap {
        return Err(TrackingErrorReason::CapExhausted);
    }

    session.pending_spent = session.pending_spent.saturating_add(amount);
    session.last_activity_ms = x402_facilitator_core::session::now_millis();
    store.set(session_id.clone(), session).await;

    Ok(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402_facilitator_core::InMemorySessionStore;
    use x402_types::ChainId;

    fn requirements(amount: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "upto".into(),
            network: ChainId::new("eip155", "8453"),
            asset: "0xasset".into(),
            amount: amount.into(),
            pay_to: "0xpay".into(),
            max_timeout_seconds: 60,
            extra: None,
            resource: None,
            description: None,
            mime_type: None,
            output_schema: None,
        }
    }

    fn payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: x402_types::X402_VERSION,
            accepted: requirements("1"),
            payload: serde_json::json!({
                "owner": "0xowner",
                "spender": "0xspender",
                "cap": "100",
                "nonce": 0,
                "deadline": 9999999999u64,
                "signature": "0xsig"
            }),
        }
    }

    #[tokio::test]
    async fn first_request_opens_a_session_within_cap() {
        let store = InMemorySessionStore::new();
        let session_id = track_request(&store, &payload(), &requirements("10")).await.unwrap();
        let session = store.get(&session_id).await.unwrap();
        assert_eq!(session.pending_spent, alloy_primitives::U256::from(10u64));
    }

    #[tokio::test]
    async fn request_exceeding_cap_is_rejected() {
        let store = InMemorySessionStore::new();
        let requirements = requirements("200");
        let err = track_request(&store, &payload(), &requirements).await.unwrap_err();
        assert_eq!(err, TrackingErrorReason::CapExhausted);
    }
}

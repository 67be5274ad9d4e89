//! Component E: the sweeper (`spec.md` §4.E).
//!
//! A periodic background task that walks every open session and settles or closes it
//! according to a fixed priority order, so that a resource server's hung HTTP request
//! can never be the only thing standing between a session and settlement.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::facilitator::Facilitator;
use crate::session::{now_unix, settle_session, Session, SessionStatus, SessionStore};

/// Default sweep cadence (`spec.md` §4.E).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const LONG_IDLE_CLOSE: u64 = 30 * 60;
const IDLE_SETTLE: u64 = 2 * 60;
const DEADLINE_BUFFER: u64 = 60;
const CAP_THRESHOLD_NUM: u128 = 9;
const CAP_THRESHOLD_DEN: u128 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepAction {
    Skip,
    None,
    SettleAndClose,
    Settle,
}

/// Picks the action for one session, applying the five tiers in priority order: a
/// session already `settling` is left alone; otherwise long-idle, then
/// deadline-approaching, then cap-approaching all settle-and-close (even with nothing
/// pending — `settle_session` closes a zero-pending session outright, which is how a
/// fully-settled or past-deadline session ever leaves `open`); short-idle settles
/// without closing so the session can keep accumulating, but only makes sense when
/// there's something pending to settle.
fn classify(session: &Session, now: u64) -> SweepAction {
    if session.status == SessionStatus::Settling {
        return SweepAction::Skip;
    }
    if session.status == SessionStatus::Closed {
        return SweepAction::Skip;
    }

    let idle_secs = now.saturating_sub(session.last_activity_ms / 1000);
    if idle_secs >= LONG_IDLE_CLOSE {
        return SweepAction::SettleAndClose;
    }
    if session.deadline <= now.saturating_add(DEADLINE_BUFFER) {
        return SweepAction::SettleAndClose;
    }
    if !session.cap.is_zero() {
        let pending = session.pending_spent.saturating_add(session.settled_total);
        // pending / cap >= 9 / 10  <=>  pending * 10 >= cap * 9
        let lhs = pending.saturating_mul(alloy_primitives::U256::from(CAP_THRESHOLD_DEN));
        let rhs = session.cap.saturating_mul(alloy_primitives::U256::from(CAP_THRESHOLD_NUM));
        if lhs >= rhs {
            return SweepAction::SettleAndClose;
        }
    }
    if session.pending_spent.is_zero() {
        return SweepAction::None;
    }
    if idle_secs >= IDLE_SETTLE {
        return SweepAction::Settle;
    }
    SweepAction::None
}

/// Runs the sweep loop until `cancel` is triggered. Intended to be spawned as a single
/// background task per facilitator process (`spec.md` §5: "at most one sweep may run
/// concurrently").
pub async fn run<F: Facilitator + Send + Sync + 'static>(
    store: Arc<dyn SessionStore>,
    facilitator: Arc<F>,
    cancel: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                sweep_once(store.as_ref(), facilitator.as_ref()).await;
            }
        }
    }
}

pub async fn sweep_once<F: Facilitator>(store: &dyn SessionStore, facilitator: &F) {
    let now = now_unix();
    for (id, session) in store.entries().await {
        let action = classify(&session, now);
        let (reason, close_after) = match action {
            SweepAction::Skip | SweepAction::None => continue,
            SweepAction::SettleAndClose => ("sweeper", true),
            SweepAction::Settle => ("sweeper", false),
        };
        if let Err(err) = settle_session(store, facilitator, &id, reason, close_after).await {
            warn!(session_id = %id, error = %err, "sweep settle failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402_types::{ChainId, PaymentPayload, PaymentRequirements};

    fn base_session(pending: u64, cap: u64, deadline_offset: i64, idle_secs: u64) -> Session {
        let now = now_unix();
        let deadline = (now as i64 + deadline_offset).max(0) as u64;
        let last_activity_ms = (now.saturating_sub(idle_secs)) * 1000;
        let requirements = PaymentRequirements {
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
        };
        Session {
            cap: alloy_primitives::U256::from(cap),
            pending_spent: alloy_primitives::U256::from(pending),
            settled_total: alloy_primitives::U256::ZERO,
            deadline,
            status: SessionStatus::Open,
            last_activity_ms,
            payment_payload: PaymentPayload {
                x402_version: x402_types::X402_VERSION,
                accepted: requirements.clone(),
                payload: serde_json::json!({}),
            },
            payment_requirements: requirements,
            last_settlement: None,
        }
    }

    #[test]
    fn idle_session_with_no_pending_spend_is_left_alone() {
        let session = base_session(0, 1000, 3600, 0);
        assert_eq!(classify(&session, now_unix()), SweepAction::None);
    }

    #[test]
    fn long_idle_session_settles_and_closes() {
        let session = base_session(10, 1000, 3600, LONG_IDLE_CLOSE + 5);
        assert_eq!(classify(&session, now_unix()), SweepAction::SettleAndClose);
    }

    #[test]
    fn near_deadline_session_settles_and_closes() {
        let session = base_session(10, 1000, 30, 0);
        assert_eq!(classify(&session, now_unix()), SweepAction::SettleAndClose);
    }

    #[test]
    fn near_cap_session_settles_and_closes() {
        let session = base_session(920, 1000, 3600, 0);
        assert_eq!(classify(&session, now_unix()), SweepAction::SettleAndClose);
    }

    #[test]
    fn short_idle_session_settles_without_closing() {
        let session = base_session(10, 1000, 3600, IDLE_SETTLE + 5);
        assert_eq!(classify(&session, now_unix()), SweepAction::Settle);
    }

    #[test]
    fn zero_pending_session_past_deadline_still_settles_and_closes() {
        let session = base_session(0, 1000, -5, 0);
        assert_eq!(classify(&session, now_unix()), SweepAction::SettleAndClose);
    }

    #[test]
    fn settling_session_is_skipped() {
        let mut session = base_session(10, 1000, 3600, LONG_IDLE_CLOSE + 5);
        session.status = SessionStatus::Settling;
        assert_eq!(classify(&session, now_unix()), SweepAction::Skip);
    }
}

//! Component F: lifecycle hooks around verify/settle (`spec.md` §4.F).
//!
//! Six hook points — `onBeforeVerify`, `onAfterVerify`, `onVerifyFailure`,
//! `onBeforeSettle`, `onAfterSettle`, `onSettleFailure` — each an ordered list of
//! callbacks invoked in registration order. A `before_*` hook may abort the operation by
//! returning an error; `after_*`/`*_failure` hooks are observational and cannot change
//! the outcome.

use crate::facilitator::Facilitator;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use x402_types::{PaymentPayload, PaymentRequirements, SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        HookError(message.into())
    }
}

pub struct VerifyContext {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
    pub result: Option<VerifyResponse>,
}

pub struct SettleContext {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
    pub result: Option<SettleResponse>,
}

/// A hook observing/gating the verify path. Default method bodies are no-ops, so a hook
/// only needs to implement the points it cares about.
#[async_trait::async_trait]
pub trait VerifyHook: Send + Sync {
    async fn before_verify(&self, _ctx: &mut VerifyContext) -> Result<(), HookError> {
        Ok(())
    }
    async fn after_verify(&self, _ctx: &VerifyContext) {}
    async fn verify_failure(&self, _ctx: &VerifyContext, _error: &str) {}
}

/// A hook observing/gating the settle path.
#[async_trait::async_trait]
pub trait SettleHook: Send + Sync {
    async fn before_settle(&self, _ctx: &mut SettleContext) -> Result<(), HookError> {
        Ok(())
    }
    async fn after_settle(&self, _ctx: &SettleContext) {}
    async fn settle_failure(&self, _ctx: &SettleContext, _error: &str) {}
}

fn tracking_key(payload: &PaymentPayload, requirements: &PaymentRequirements) -> String {
    let joined = serde_json::json!({"payload": payload, "requirements": requirements});
    // Stable enough for an in-process dedup key: same struct, same field order.
    joined.to_string()
}

/// How long a successful `/verify` remains eligible to authorize a matching `/settle`
/// under the default "verified-before-settled" hook (`spec.md` §3 invariant 5).
const VERIFIED_TTL: Duration = Duration::from_secs(5 * 60);

/// The built-in hook enforcing "a settle may only fire after a successful verify for
/// the same `(payload, requirements)` pair". Always installed first in the settle hook
/// chain; user hooks run after it and may tighten further but cannot loosen it.
struct VerifiedBeforeSettleHook {
    verified: Arc<DashMap<String, Instant>>,
}

#[async_trait::async_trait]
impl SettleHook for VerifiedBeforeSettleHook {
    async fn before_settle(&self, ctx: &mut SettleContext) -> Result<(), HookError> {
        let key = tracking_key(&ctx.payment_payload, &ctx.payment_requirements);
        match self.verified.get(&key) {
            Some(at) if at.elapsed() <= VERIFIED_TTL => Ok(()),
            _ => Err(HookError::new(
                "no prior successful verify found for this exact payload/requirements pair",
            )),
        }
    }
}

/// Wraps a `Facilitator` with the six lifecycle hook points and the default
/// verified-before-settled enforcement.
pub struct FacilitatorCore<F> {
    inner: F,
    verify_hooks: Vec<Arc<dyn VerifyHook>>,
    settle_hooks: Vec<Arc<dyn SettleHook>>,
    verified: Arc<DashMap<String, Instant>>,
}

impl<F: Facilitator> FacilitatorCore<F> {
    pub fn new(inner: F) -> Self {
        let verified = Arc::new(DashMap::new());
        Self {
            inner,
            verify_hooks: Vec::new(),
            settle_hooks: vec![Arc::new(VerifiedBeforeSettleHook {
                verified: verified.clone(),
            })],
            verified,
        }
    }

    pub fn with_verify_hook(mut self, hook: Arc<dyn VerifyHook>) -> Self {
        self.verify_hooks.push(hook);
        self
    }

    pub fn with_settle_hook(mut self, hook: Arc<dyn SettleHook>) -> Self {
        self.settle_hooks.push(hook);
        self
    }

    fn mark_verified(&self, payload: &PaymentPayload, requirements: &PaymentRequirements) {
        self.verified.insert(tracking_key(payload, requirements), Instant::now());
    }

    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, String> {
        let mut ctx = VerifyContext {
            payment_payload: request.payment_payload.clone(),
            payment_requirements: request.payment_requirements.clone(),
            result: None,
        };
        for hook in &self.verify_hooks {
            if let Err(err) = hook.before_verify(&mut ctx).await {
                let response = VerifyResponse::Invalid {
                    reason: x402_types::error::VerifyErrorReason::InvalidSignature,
                    payer: None,
                };
                for hook in &self.verify_hooks {
                    hook.verify_failure(&ctx, &err.0).await;
                }
                return Ok(response);
            }
        }
        match self.inner.verify(request).await {
            Ok(response) => {
                ctx.result = Some(response.clone());
                if response.is_valid() {
                    self.mark_verified(&request.payment_payload, &request.payment_requirements);
                }
                for hook in &self.verify_hooks {
                    hook.after_verify(&ctx).await;
                }
                Ok(response)
            }
            Err(err) => {
                let message = err.to_string();
                for hook in &self.verify_hooks {
                    hook.verify_failure(&ctx, &message).await;
                }
                Err(message)
            }
        }
    }

    pub async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, String> {
        let mut ctx = SettleContext {
            payment_payload: request.payment_payload.clone(),
            payment_requirements: request.payment_requirements.clone(),
            result: None,
        };
        for hook in &self.settle_hooks {
            if let Err(err) = hook.before_settle(&mut ctx).await {
                tracing::warn!(reason = %err.0, "before_settle hook aborted settlement");
                for hook in &self.settle_hooks {
                    hook.settle_failure(&ctx, &err.0).await;
                }
                return Ok(SettleResponse::Error {
                    reason: x402_types::error::SettleErrorReason::HookAborted,
                    network: request.payment_requirements.network.clone(),
                    message: Some(err.0),
                });
            }
        }
        match self.inner.settle(request).await {
            Ok(response) => {
                ctx.result = Some(response.clone());
                for hook in &self.settle_hooks {
                    hook.after_settle(&ctx).await;
                }
                Ok(response)
            }
            Err(err) => {
                let message = err.to_string();
                for hook in &self.settle_hooks {
                    hook.settle_failure(&ctx, &message).await;
                }
                Err(message)
            }
        }
    }

    pub async fn supported(&self) -> Result<x402_types::SupportedResponse, String> {
        self.inner.supported().await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilitator::FacilitatorLocal;
    use crate::scheme::SchemeRegistry;
    use x402_types::{ChainId, PaymentRequirements};

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
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

    fn payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: x402_types::X402_VERSION,
            accepted: requirements(),
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn settle_without_prior_verify_is_rejected() {
        let core = FacilitatorCore::new(FacilitatorLocal::new(SchemeRegistry::new()));
        let request = VerifyRequest {
            payment_payload: payload(),
            payment_requirements: requirements(),
        };
        let response = core.settle(&request).await.unwrap();
        assert!(!response.is_success());
    }
}

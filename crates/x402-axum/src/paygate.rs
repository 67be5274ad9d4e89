//! Component G: the resource-server middleware — the 7-step pipeline of `spec.md`
//! §4.G as a single tower `Layer` wrapping an entire axum `Router`, dispatching against
//! a [`RouteTable`] rather than one middleware instance per protected route.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use tracing::{instrument, warn};

use x402_facilitator_core::{Facilitator, SessionStore};
use x402_types::error::TrackingErrorReason;
use x402_types::{
    decode_header, encode_header, PaymentPayload, PaymentRequired, PaymentRequirements, SettleRequest, VerifyRequest,
    VerifyResponse, SCHEME_UPTO,
};

use crate::paywall::{prefers_html, PaywallProvider};
use crate::route::RouteTable;
use crate::tracking::track_request;

pub const PAYMENT_SIGNATURE_HEADER: &str = "payment-signature";
pub const PAYMENT_SIGNATURE_HEADER_ALIAS: &str = "x-payment";
pub const PAYMENT_REQUIRED_HEADER: &str = "payment-required";
pub const PAYMENT_RESPONSE_HEADER: &str = "payment-response";
pub const UPTO_SESSION_ID_HEADER: &str = "x-upto-session-id";

#[derive(Clone)]
pub struct X402Layer<F> {
    routes: Arc<RouteTable>,
    facilitator: Arc<F>,
    session_store: Arc<dyn SessionStore>,
    paywall: Option<Arc<dyn PaywallProvider>>,
}

impl<F> X402Layer<F> {
    pub fn new(routes: RouteTable, facilitator: F, session_store: Arc<dyn SessionStore>) -> Self {
        Self { routes: Arc::new(routes), facilitator: Arc::new(facilitator), session_store, paywall: None }
    }

    pub fn with_paywall(mut self, paywall: Arc<dyn PaywallProvider>) -> Self {
        self.paywall = Some(paywall);
        self
    }
}

impl<S, F> Layer<S> for X402Layer<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    F: Facilitator + Send + Sync + 'static,
{
    type Service = X402Service<F>;

    fn layer(&self, inner: S) -> Self::Service {
        X402Service {
            routes: self.routes.clone(),
            facilitator: self.facilitator.clone(),
            session_store: self.session_store.clone(),
            paywall: self.paywall.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

#[derive(Clone)]
pub struct X402Service<F> {
    routes: Arc<RouteTable>,
    facilitator: Arc<F>,
    session_store: Arc<dyn SessionStore>,
    paywall: Option<Arc<dyn PaywallProvider>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Service<Request> for X402Service<F>
where
    F: Facilitator + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let routes = self.routes.clone();
        let facilitator = self.facilitator.clone();
        let session_store = self.session_store.clone();
        let paywall = self.paywall.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move { Ok(handle_request(routes, facilitator, session_store, paywall, &mut inner, req).await) })
    }
}

fn payment_required_response(accepts: Vec<PaymentRequirements>, error: &str, paywall: Option<&Arc<dyn PaywallProvider>>, wants_html: bool) -> Response {
    let body = PaymentRequired::new(accepts).with_error(error);
    if wants_html {
        if let Some(paywall) = paywall {
            let html = paywall.render(&body);
            return Response::builder()
                .status(StatusCode::PAYMENT_REQUIRED)
                .header("content-type", "text/html")
                .body(Body::from(html))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    }
    let Ok(encoded) = encode_header(&body) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let mut response = (StatusCode::PAYMENT_REQUIRED, axum::Json(body)).into_response();
    if let Ok(header_value) = HeaderValue::from_str(&encoded) {
        response.headers_mut().insert(PAYMENT_REQUIRED_HEADER, header_value);
    }
    response
}

fn tracking_error_response(reason: TrackingErrorReason) -> Response {
    let status = StatusCode::from_u16(reason.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, axum::Json(serde_json::json!({ "error": reason }))).into_response()
}

#[instrument(skip_all)]
async fn handle_request<F>(
    routes: Arc<RouteTable>,
    facilitator: Arc<F>,
    session_store: Arc<dyn SessionStore>,
    paywall: Option<Arc<dyn PaywallProvider>>,
    inner: &mut BoxCloneSyncService<Request, Response, Infallible>,
    req: Request,
) -> Response
where
    F: Facilitator + Send + Sync + 'static,
{
    // Step 1: route match.
    let Some(route) = routes.find(req.method(), req.uri().path()).cloned() else {
        return call_inner(inner, req).await;
    };

    let wants_html = prefers_html(req.headers().get("accept").and_then(|v| v.to_str().ok()));

    // Step 2: header read.
    let header_value = req
        .headers()
        .get(PAYMENT_SIGNATURE_HEADER)
        .or_else(|| req.headers().get(PAYMENT_SIGNATURE_HEADER_ALIAS))
        .and_then(|value| value.to_str().ok());
    let Some(header_value) = header_value else {
        return payment_required_response(route.accepts.clone(), "payment required", paywall.as_ref(), wants_html);
    };
    let payload: PaymentPayload = match decode_header(header_value) {
        Ok(payload) => payload,
        Err(_) => return payment_required_response(route.accepts.clone(), "malformed payment header", paywall.as_ref(), wants_html),
    };

    // Step 3: select requirement.
    let Some(selected) = route
        .accepts
        .iter()
        .find(|requirement| requirement.network == payload.accepted.network && requirement.scheme == payload.accepted.scheme)
        .cloned()
    else {
        return payment_required_response(route.accepts.clone(), "no matching payment requirement", paywall.as_ref(), wants_html);
    };

    // Step 4: verify.
    let verify_request = VerifyRequest { payment_payload: payload.clone(), payment_requirements: selected.clone() };
    let verify_response = match facilitator.verify(&verify_request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "verify call failed");
            return payment_required_response(route.accepts.clone(), "verification failed", paywall.as_ref(), wants_html);
        }
    };
    if let VerifyResponse::Invalid { reason, .. } = &verify_response {
        return payment_required_response(route.accepts.clone(), &format!("{reason:?}"), paywall.as_ref(), wants_html);
    }

    // Step 5: upto tracking.
    let mut session_id_header = None;
    if selected.scheme == SCHEME_UPTO && route.auto_track {
        match track_request(session_store.as_ref(), &payload, &selected).await {
            Ok(session_id) => session_id_header = Some(session_id),
            Err(reason) => return tracking_error_response(reason),
        }
    }

    // Step 6: handler.
    let response = call_inner(inner, req).await;
    if response.status().is_client_error() || response.status().is_server_error() {
        return response;
    }
    let mut response = response;

    // Step 7: after handler.
    if selected.scheme == SCHEME_UPTO {
        if let Some(session_id) = session_id_header {
            if let Ok(value) = HeaderValue::from_str(&session_id) {
                response.headers_mut().insert(UPTO_SESSION_ID_HEADER, value);
            }
        }
        return response;
    }
    if route.auto_settle {
        let settle_request: SettleRequest = verify_request;
        match facilitator.settle(&settle_request).await {
            Ok(settlement) if settlement.is_success() => {
                if let Ok(encoded) = encode_header(&settlement) {
                    if let Ok(value) = HeaderValue::from_str(&encoded) {
                        response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
                    }
                }
            }
            Ok(_) => warn!("settle returned a non-success response; response body left untouched"),
            Err(err) => warn!(error = %err, "settle call failed; response body left untouched"),
        }
    }
    response
}

async fn call_inner(inner: &mut BoxCloneSyncService<Request, Response, Infallible>, req: Request) -> Response {
    match tower::ServiceExt::oneshot(inner.clone(), req).await {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    }
}

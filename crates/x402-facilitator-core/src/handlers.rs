//! Component H: the facilitator's own HTTP surface (`spec.md` §4.H).
//!
//! `POST /verify`, `POST /settle`, `GET /supported` — a thin axum layer over
//! [`FacilitatorCore`]. Kept generic over the wrapped `Facilitator` so a resource server
//! embedding the facilitator in-process never needs to go over HTTP to itself.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::instrument;
use x402_types::{SettleRequest, VerifyRequest};

use crate::facilitator::Facilitator;
use crate::hooks::FacilitatorCore;

pub fn routes<F: Facilitator + Send + Sync + 'static>() -> Router<Arc<FacilitatorCore<F>>> {
    Router::new()
        .route("/verify", post(verify::<F>))
        .route("/settle", post(settle::<F>))
        .route("/supported", get(supported::<F>))
}

#[instrument(skip_all)]
async fn verify<F: Facilitator + Send + Sync + 'static>(
    State(core): State<Arc<FacilitatorCore<F>>>,
    Json(request): Json<VerifyRequest>,
) -> impl IntoResponse {
    match core.verify(&request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(message) => {
            tracing::error!(error = %message, "verify failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": message }))).into_response()
        }
    }
}

#[instrument(skip_all)]
async fn settle<F: Facilitator + Send + Sync + 'static>(
    State(core): State<Arc<FacilitatorCore<F>>>,
    Json(request): Json<SettleRequest>,
) -> impl IntoResponse {
    match core.settle(&request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(message) => {
            tracing::error!(error = %message, "settle failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": message }))).into_response()
        }
    }
}

#[instrument(skip_all)]
async fn supported<F: Facilitator + Send + Sync + 'static>(
    State(core): State<Arc<FacilitatorCore<F>>>,
) -> impl IntoResponse {
    match core.supported().await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(message) => {
            tracing::error!(error = %message, "supported failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": message }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facilitator::FacilitatorLocal;
    use crate::scheme::SchemeRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn supported_with_empty_registry_returns_empty_lists() {
        let core = Arc::new(FacilitatorCore::new(FacilitatorLocal::new(SchemeRegistry::new())));
        let app = routes::<FacilitatorLocal>().with_state(core);
        let response = app
            .oneshot(Request::builder().uri("/supported").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

//! The HTTPS front-end: receives AdmissionReview requests, forwards the
//! object to every webhook registered on the URL path and answers with the
//! combined verdict and patch.

use crate::reload::ConfigLoader;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use gwh_core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use json_patch::{Patch, PatchOperation};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info, warn, Level};

/// Build the router serving `/healthz` and the configured webhook paths.
pub fn app(loader: Arc<ConfigLoader>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/{*path}", post(admit))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        .with_state(loader)
}

async fn healthz() -> &'static str {
    "I'm alive\n"
}

/// Dispatch an AdmissionReview to the webhooks registered on the URL path.
///
/// Webhooks sharing a path are chained in declaration order: each sees the
/// object as patched by its predecessors, the verdict is the conjunction of
/// all verdicts (short-circuiting on the first deny) and the response patch
/// is the concatenation of every delta.
async fn admit(
    State(loader): State<Arc<ConfigLoader>>,
    Path(path): Path<String>,
    Json(review): Json<AdmissionReview>,
) -> Response {
    let path = format!("/{path}");
    let req: AdmissionRequest = match review.try_into() {
        Ok(req) => req,
        Err(err) => {
            error!(error = %err, "invalid admission review");
            return Json(AdmissionResponse::invalid(err).into_review()).into_response();
        }
    };

    let manifest = loader.manifest();
    let webhooks: Vec<_> = manifest
        .webhooks()
        .iter()
        .filter(|wh| wh.path() == path)
        .collect();
    if webhooks.is_empty() {
        warn!(%path, "no webhook is registered on this path");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut object = req.object.clone().unwrap_or(Value::Null);
    let mut accumulated: Vec<PatchOperation> = Vec::new();
    let mut allowed = true;
    for webhook in webhooks {
        match webhook.process(&object) {
            Ok((accept, patch)) => {
                if !patch.0.is_empty() {
                    if let Err(err) = json_patch::patch(&mut object, &patch.0) {
                        error!(webhook = webhook.name(), error = %err, "patch failed to apply");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                    accumulated.extend(patch.0);
                }
                if !accept {
                    allowed = false;
                    break;
                }
            }
            Err(err) => {
                error!(webhook = webhook.name(), error = %err, "evaluation failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    let mut res = AdmissionResponse::from(&req);
    if allowed {
        info!(uid = %req.uid, %path, "accepted");
        res = match res.with_patch(&Patch(accumulated)) {
            Ok(res) => res,
            Err(err) => {
                error!(error = %err, "failed to serialize patch");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
    } else {
        info!(uid = %req.uid, %path, "denied");
        res.allowed = false;
    }
    Json(res.into_review()).into_response()
}

/// Serve the router, with TLS when a certificate and key are provided.
pub async fn serve(
    app: Router,
    addr: SocketAddr,
    tls: Option<(PathBuf, PathBuf)>,
    handle: Handle<SocketAddr>,
) -> std::io::Result<()> {
    match tls {
        Some((cert, key)) => {
            let config = RustlsConfig::from_pem_file(cert, key).await?;
            info!(%addr, "serving webhooks over https");
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!(%addr, "serving webhooks over plain http");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    }
}

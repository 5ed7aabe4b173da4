//! Axum middleware that traces requests carrying the dump header.
//!
//! Traced requests get a [`TraceHandle`] in their extensions (handlers read
//! it through [`crate::RequestTrace`]). The handler's response is buffered
//! and replaced by the serialized trace. If a breakpoint halts the request,
//! the handler future is dropped at its next await point and only the trace
//! is sent.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ApixtError, Result};
use crate::handle::TraceHandle;
use crate::recorder::{Apixt, CapturedResponse};

/// Content type of a serialized trace.
pub const TRACE_CONTENT_TYPE: &str = "text/json";

/// Wrap every route of `router` with [`trace_requests`].
pub fn instrument(router: Router, apixt: Arc<Apixt>) -> Router {
    router.layer(from_fn_with_state(apixt, trace_requests))
}

/// Middleware function for `axum::middleware::from_fn_with_state`.
pub async fn trace_requests(
    State(apixt): State<Arc<Apixt>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !apixt.check_request(request.headers()) {
        return next.run(request).await;
    }

    let handle = apixt.bind(request.headers());
    request.extensions_mut().insert(handle.clone());
    let mut halted = handle.halt_signal();

    let response = tokio::select! {
        response = next.run(request) => Some(response),
        () = wait_for_halt(&mut halted) => None,
    };

    let captured = match response {
        Some(response) => Some(capture(response, apixt.config().max_body_bytes).await),
        None => {
            info!(trace_id = %handle.trace_id(), "Handler abandoned at breakpoint");
            None
        }
    };

    trace_response(&apixt, &handle, captured.as_ref())
}

/// Resolves once the tree halts; never resolves otherwise.
async fn wait_for_halt(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|halted| *halted).await.is_err() {
        // The tree was dropped without halting.
        std::future::pending::<()>().await;
    }
}

async fn capture(response: Response, limit: usize) -> CapturedResponse {
    let (parts, body) = response.into_parts();
    let body = match buffer_body(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to buffer response body for trace");
            Bytes::new()
        }
    };
    CapturedResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    }
}

async fn buffer_body(body: Body, limit: usize) -> Result<Bytes> {
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| ApixtError::Body(format!("{e} (limit {limit} bytes)")))
}

fn trace_response(
    apixt: &Apixt,
    handle: &TraceHandle,
    response: Option<&CapturedResponse>,
) -> Response {
    match apixt.finish(handle, response) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TRACE_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize trace");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

//! apixt-server: a small orders API instrumented with apixt
//!
//! The binary in `main.rs` wires configuration and logging around the
//! router built here; the integration tests drive the same router over a
//! real socket.

pub mod demo;

use std::future::Future;
use std::sync::Arc;

use apixt::{Apixt, Config, instrument};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use demo::{AppState, DemoError, NewOrder, Order, OrderStore};

/// Initialize apixt from `config` and register the demo routes with it.
pub fn build(config: Config) -> apixt::Result<Arc<Apixt>> {
    let mut apixt = Apixt::init(config)?;
    demo::register_routes(&mut apixt);
    Ok(Arc::new(apixt))
}

/// The full application router: demo routes, the apixt layer and HTTP
/// request logging.
pub fn app(apixt: Arc<Apixt>) -> Router {
    let state = AppState::new(apixt.clone(), OrderStore::seeded());
    instrument(demo::router(state), apixt).layer(TraceLayer::new_for_http())
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn run_with_shutdown(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Starting apixt demo server");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

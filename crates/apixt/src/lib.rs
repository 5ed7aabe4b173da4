//! apixt: request tracing for axum services
//!
//! This crate connects the [`apixt_trace`] recorder to live HTTP traffic:
//! - Configuration loading, environment overrides and validation
//! - Per-request binding of a trace tree, keyed on a request header
//! - Breakpoint tokens read from a second header
//! - Response and timer dumping, and final serialization of the trace
//! - An axum middleware and handler extractor tying it together
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use apixt::{Apixt, Config, RequestTrace, instrument};
//! use apixt_trace::BlockData;
//! use axum::{Router, routing::get};
//!
//! async fn orders(trace: RequestTrace) -> &'static str {
//!     trace.block("Load orders", BlockData::text("text/plain", "SELECT * FROM orders"));
//!     "[]"
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut apixt = Apixt::init(Config::new("orders", "http://localhost:3000", "/_apixt"))?;
//! apixt.register_route("/orders", ["GET"]);
//!
//! let app = instrument(Router::new().route("/orders", get(orders)), Arc::new(apixt));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handle;
pub mod middleware;
pub mod recorder;
pub mod routes;

pub use client::{BootConfig, ClientConfig, HostingApi};
pub use config::{APIXT_DIR, CONFIG_FILE, Config, ConfigValidationError};
pub use error::{ApixtError, Result};
pub use handle::{RequestTrace, TraceHandle};
pub use middleware::{TRACE_CONTENT_TYPE, instrument, trace_requests};
pub use recorder::{
    Apixt, CapturedResponse, RESPONSE_SECTION, RESPONSE_TAG, TIMERS_BLOCK,
};
pub use routes::{Route, RouteRegistry};

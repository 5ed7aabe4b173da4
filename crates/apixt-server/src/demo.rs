//! Demo orders API.
//!
//! `GET /orders/{id}` records three checkpoints in order: `Query`, `Row`
//! and `Render`. Each is followed by a short await so a breakpoint on any
//! of them visibly cuts the handler off.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use apixt::{Apixt, BootConfig, ClientConfig, RequestTrace};
use apixt_trace::{BlockData, Footer};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Pause between checkpoints, standing in for real I/O.
const STEP_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub item: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub item: String,
    pub quantity: u32,
}

/// In-memory order table.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: Mutex<Vec<Order>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding a couple of sample orders.
    pub fn seeded() -> Self {
        let store = Self::new();
        store.insert(NewOrder {
            item: "keyboard".to_string(),
            quantity: 1,
        });
        store.insert(NewOrder {
            item: "cable".to_string(),
            quantity: 3,
        });
        store
    }

    pub fn get(&self, id: u64) -> Option<Order> {
        self.lock().iter().find(|order| order.id == id).cloned()
    }

    pub fn insert(&self, new: NewOrder) -> Order {
        let mut orders = self.lock();
        let order = Order {
            id: orders.len() as u64 + 1,
            item: new.item,
            quantity: new.quantity,
        };
        orders.push(order.clone());
        order
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Order>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub apixt: Arc<Apixt>,
    pub orders: Arc<OrderStore>,
}

impl AppState {
    pub fn new(apixt: Arc<Apixt>, orders: OrderStore) -> Self {
        Self {
            apixt,
            orders: Arc::new(orders),
        }
    }
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("Order {0} not found")]
    NotFound(u64),

    #[error("Trace error: {0}")]
    Trace(#[from] apixt_trace::TraceError),

    #[error(transparent)]
    Apixt(#[from] apixt::ApixtError),
}

impl IntoResponse for DemoError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Trace(_) | Self::Apixt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Record the demo routes for the viewer.
pub fn register_routes(apixt: &mut Apixt) {
    apixt.register_route("/health", ["GET"]);
    apixt.register_route("/orders", ["POST"]);
    apixt.register_route("/orders/{id}", ["GET"]);
}

pub fn router(state: AppState) -> Router {
    let dump_path = state.apixt.config().dump_path.trim_end_matches('/').to_string();

    Router::new()
        .route("/health", get(health))
        .route("/orders", axum::routing::post(create_order))
        .route("/orders/{id}", get(get_order))
        .route(&format!("{dump_path}/boot"), get(boot_config))
        .route(&format!("{dump_path}/config"), get(client_config))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn boot_config(State(state): State<AppState>) -> Json<BootConfig> {
    Json(state.apixt.boot_config())
}

async fn client_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(state.apixt.client_config())
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    trace: RequestTrace,
) -> Result<Json<Order>, DemoError> {
    let lookup = trace.section("Lookup");
    trace.start_timer("db");
    trace.block_in(
        lookup,
        "Query",
        BlockData::text("text/x-sql", format!("SELECT * FROM orders WHERE id = {id}")),
    );
    tokio::time::sleep(STEP_DELAY).await;

    let order = state.orders.get(id);
    if let Err(e) = trace.stop_timer("db") {
        warn!(error = %e, "Timer was not running");
    }
    let row = BlockData::json(&order)?
        .with_footer(Footer::new().with("Rows", u8::from(order.is_some())));
    trace.block_in(lookup, "Row", row);
    trace.close(lookup);
    tokio::time::sleep(STEP_DELAY).await;

    let order = order.ok_or(DemoError::NotFound(id))?;
    trace.block("Render", BlockData::json(&order)?);
    tokio::time::sleep(STEP_DELAY).await;

    Ok(Json(order))
}

async fn create_order(
    State(state): State<AppState>,
    trace: RequestTrace,
    Json(new): Json<NewOrder>,
) -> (StatusCode, Json<Order>) {
    let new = trace.d(new);
    let order = state.orders.insert(new);
    trace.block("Stored", BlockData::new(order.id));
    (StatusCode::CREATED, Json(order))
}

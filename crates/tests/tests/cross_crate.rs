//! Cross-crate integration and E2E tests
//!
//! These tests run the demo server on a real socket and drive it over
//! HTTP, checking the traces the middleware sends back.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use apixt::{Apixt, Config, RESPONSE_SECTION, TIMERS_BLOCK, TRACE_CONTENT_TYPE};
use apixt_trace::parse_lines;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const DUMP: &str = "Tls-Apixt-Dump";
const HALT: &str = "Tls-Apixt-Halt";

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(config: Config) -> Self {
        let apixt: Arc<Apixt> = apixt_server::build(config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(apixt_server::run_with_shutdown(
            listener,
            apixt_server::app(apixt),
            async {
                shutdown_rx.await.ok();
            },
        ));

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    async fn demo() -> Self {
        Self::start(Config::new("orders", "http://127.0.0.1", "/_apixt")).await
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        let _ = self.handle.await;
    }
}

async fn trace_lines(response: reqwest::Response) -> Vec<Value> {
    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(content_type.as_deref(), Some(TRACE_CONTENT_TYPE));
    parse_lines(&response.text().await.unwrap()).unwrap()
}

fn codes(lines: &[Value]) -> Vec<u64> {
    lines.iter().map(|v| v["cmd"].as_u64().unwrap()).collect()
}

fn block_names(lines: &[Value]) -> Vec<&str> {
    lines
        .iter()
        .filter(|v| v["cmd"] == 6)
        .filter_map(|v| v["name"].as_str())
        .collect()
}

/// E2E Test: requests without the dump header are served normally
#[tokio::test]
async fn test_e2e_untraced_request_passes_through() {
    let server = TestServer::demo().await;

    let response = reqwest::get(server.url("/orders/1")).await.unwrap();
    assert_eq!(response.status(), 200);
    let order: Value = response.json().await.unwrap();
    assert_eq!(order["id"], 1);
    assert_eq!(order["item"], "keyboard");

    server.stop().await;
}

/// E2E Test: the dump header replaces the response with its trace
#[tokio::test]
async fn test_e2e_traced_request_returns_trace() {
    let server = TestServer::demo().await;

    let response = reqwest::Client::new()
        .get(server.url("/orders/1"))
        .header(DUMP, "1")
        .send()
        .await
        .unwrap();
    let lines = trace_lines(response).await;

    assert_eq!(codes(&lines), [1, 6, 6, 2, 6, 1, 3, 6, 4, 6, 2, 6, 0]);
    assert_eq!(lines[0]["name"], "Lookup");
    assert_eq!(
        block_names(&lines),
        ["Query", "Row", "Render", "Headers", "Body", TIMERS_BLOCK]
    );
    assert_eq!(lines[5]["name"], RESPONSE_SECTION);

    let body = lines.iter().find(|v| v["name"] == "Body").unwrap();
    assert_eq!(body["mime"], "application/json");
    assert_eq!(body["footer"]["Status"], 200);
    assert_eq!(body["isError"], false);
    let order: Value = serde_json::from_str(body["content"].as_str().unwrap()).unwrap();
    assert_eq!(order["id"], 1);

    let timers = lines.iter().find(|v| v["name"] == TIMERS_BLOCK).unwrap();
    let names: Vec<&str> = timers["content"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"db"));
    assert!(names.contains(&"total"));

    server.stop().await;
}

/// E2E Test: a breakpoint stops the handler at the named block
#[tokio::test]
async fn test_e2e_breakpoint_halts_handler() {
    let server = TestServer::demo().await;

    let response = reqwest::Client::new()
        .get(server.url("/orders/1"))
        .header(DUMP, "1")
        .header(HALT, "Row")
        .send()
        .await
        .unwrap();
    let lines = trace_lines(response).await;

    assert_eq!(codes(&lines), [1, 6, 6, 2, 7, 0]);
    assert_eq!(block_names(&lines), ["Query", "Row"]);
    assert_eq!(lines[4]["status"], "Halted at Row");
    assert_eq!(lines[4]["next"], "-Row");

    server.stop().await;
}

/// E2E Test: resuming with the returned token stops at the next block
#[tokio::test]
async fn test_e2e_resume_token_steps_forward() {
    let server = TestServer::demo().await;

    let response = reqwest::Client::new()
        .get(server.url("/orders/1"))
        .header(DUMP, "1")
        .header(HALT, "-Row")
        .send()
        .await
        .unwrap();
    let lines = trace_lines(response).await;

    assert_eq!(codes(&lines), [1, 6, 6, 2, 6, 7, 0]);
    assert_eq!(block_names(&lines), ["Query", "Row", "Render"]);
    assert_eq!(lines[5]["next"], "-Render");

    server.stop().await;
}

/// E2E Test: stepping past the handler's last block halts inside the
/// response dump and still returns the trace
#[tokio::test]
async fn test_e2e_resume_past_handler_halts_in_response() {
    let server = TestServer::demo().await;

    let response = reqwest::Client::new()
        .get(server.url("/orders/1"))
        .header(DUMP, "1")
        .header(HALT, "-Render")
        .send()
        .await
        .unwrap();
    let lines = trace_lines(response).await;

    assert_eq!(codes(&lines), [1, 6, 6, 2, 6, 1, 3, 6, 4, 2, 7, 0]);
    assert_eq!(block_names(&lines), ["Query", "Row", "Render", "Headers"]);
    assert_eq!(lines[10]["next"], "-Headers");

    server.stop().await;
}

/// E2E Test: an unknown checkpoint never halts
#[tokio::test]
async fn test_e2e_unknown_checkpoint_runs_to_completion() {
    let server = TestServer::demo().await;

    let response = reqwest::Client::new()
        .get(server.url("/orders/1"))
        .header(DUMP, "1")
        .header(HALT, "nowhere")
        .send()
        .await
        .unwrap();
    let lines = trace_lines(response).await;

    assert!(!codes(&lines).contains(&7));
    assert_eq!(codes(&lines).last(), Some(&0));

    server.stop().await;
}

/// E2E Test: error responses are flagged in the trace
#[tokio::test]
async fn test_e2e_error_response_is_flagged() {
    let server = TestServer::demo().await;

    let response = reqwest::Client::new()
        .get(server.url("/orders/99"))
        .header(DUMP, "1")
        .send()
        .await
        .unwrap();
    let lines = trace_lines(response).await;

    assert!(!block_names(&lines).contains(&"Render"));
    let row = lines.iter().find(|v| v["name"] == "Row").unwrap();
    assert_eq!(row["content"], Value::Null);

    let body = lines.iter().find(|v| v["name"] == "Body").unwrap();
    assert_eq!(body["footer"]["Status"], 404);
    assert_eq!(body["isError"], true);

    server.stop().await;
}

/// E2E Test: debug dumps from a POST handler reach the trace
#[tokio::test]
async fn test_e2e_debug_dump_recorded() {
    let server = TestServer::demo().await;

    let response = reqwest::Client::new()
        .post(server.url("/orders"))
        .header(DUMP, "1")
        .json(&serde_json::json!({ "item": "monitor", "quantity": 2 }))
        .send()
        .await
        .unwrap();
    let lines = trace_lines(response).await;

    let debug = lines.iter().find(|v| v["cmd"] == 5).unwrap();
    assert!(debug["name"].as_str().unwrap().starts_with("d() "));
    assert_eq!(debug["vars"][0]["value"]["item"], "monitor");

    let body = lines.iter().find(|v| v["name"] == "Body").unwrap();
    assert_eq!(body["footer"]["Status"], 201);

    server.stop().await;
}

/// E2E Test: a disabled layer ignores the dump header
#[tokio::test]
async fn test_e2e_disabled_layer_passes_through() {
    let mut config = Config::new("orders", "http://127.0.0.1", "/_apixt");
    config.enabled = false;
    let server = TestServer::start(config).await;

    let response = reqwest::Client::new()
        .get(server.url("/orders/2"))
        .header(DUMP, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let order: Value = response.json().await.unwrap();
    assert_eq!(order["item"], "cable");

    server.stop().await;
}

/// E2E Test: the viewer's config endpoints
#[tokio::test]
async fn test_e2e_viewer_config_endpoints() {
    let server = TestServer::demo().await;

    let boot: Value = reqwest::get(server.url("/_apixt/boot"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(boot["apiId"], "orders");
    assert_eq!(boot["jwtCookieKey"], "tls.apixt.orders.jwt");

    let client: Value = reqwest::get(server.url("/_apixt/config"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(client["haltHeader"], HALT);
    let paths: Vec<&str> = client["routes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["path"].as_str())
        .collect();
    assert!(paths.contains(&"/orders/{id}"));

    server.stop().await;
}

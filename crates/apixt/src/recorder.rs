//! The per-process entry point: binds trees to requests and finalizes them.

use apixt_trace::{BlockData, Footer, Tree};
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode, header};
use tracing::debug;

use crate::client::{BootConfig, ClientConfig, jwt_cookie_key};
use crate::config::Config;
use crate::error::Result;
use crate::handle::TraceHandle;
use crate::routes::RouteRegistry;

/// Section holding the dumped HTTP response.
pub const RESPONSE_SECTION: &str = "API Response";
/// Block holding the drained timer summary.
pub const TIMERS_BLOCK: &str = "Execution Times";
/// Tag attached to the response body block.
pub const RESPONSE_TAG: &str = "api.response";

/// A response as the handler produced it, captured for the trace.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Tracing layer state shared by every request.
#[derive(Debug)]
pub struct Apixt {
    config: Config,
    routes: RouteRegistry,
}

impl Apixt {
    /// Validate `config` and build the layer.
    pub fn init(config: Config) -> Result<Self> {
        let config = config.validated()?;
        debug!(api_id = %config.api_id, enabled = config.enabled, "Initialized apixt");
        Ok(Self {
            config,
            routes: RouteRegistry::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.config.enabled
    }

    /// Record a route for the viewer's route list.
    pub fn register_route<I, M>(&mut self, path: impl Into<String>, methods: I)
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        self.routes.register(path, methods);
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.config, &self.routes)
    }

    pub fn boot_config(&self) -> BootConfig {
        BootConfig::new(&self.config)
    }

    pub fn jwt_cookie_key(&self) -> String {
        jwt_cookie_key(&self.config)
    }

    /// Whether a request with these headers should be traced.
    pub fn check_request(&self, headers: &HeaderMap) -> bool {
        self.config.enabled && headers.contains_key(self.config.dump_header.as_str())
    }

    /// Create the tree for one traced request.
    ///
    /// The breakpoint token is read from the halt header; a missing or
    /// non-UTF-8 value leaves the tree without a breakpoint.
    pub fn bind(&self, headers: &HeaderMap) -> TraceHandle {
        let token = headers
            .get(self.config.halt_header.as_str())
            .and_then(|value| value.to_str().ok());
        let tree = Tree::with_halt_token(token);
        debug!(trace_id = %tree.trace_id(), halt = ?token, "Bound trace to request");
        TraceHandle::new(tree)
    }

    /// Write the handler's response into the trace.
    pub fn dump_http_response(
        &self,
        handle: &TraceHandle,
        response: &CapturedResponse,
    ) -> Result<()> {
        let content_type = response
            .headers
            .get(header::CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_else(|| "text/plain".to_string());
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let header_lines = response
            .headers
            .iter()
            .map(|(name, value)| {
                format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let status = response.status.as_u16();
        let footer = Footer::new()
            .with("Status", status)
            .with("Content-Type", content_type);
        let body = BlockData::text(mime, String::from_utf8_lossy(&response.body))
            .with_footer(footer)
            .with_tag(RESPONSE_TAG)
            .with_error(!(200..400).contains(&status));

        handle.with(|tree| -> Result<()> {
            let section = tree.add_section(RESPONSE_SECTION);
            tree.open_details(section);
            tree.add_block_in(
                section,
                "Headers",
                BlockData::text("text/plain", header_lines),
            );
            tree.close_details(section)?;
            tree.add_block_in(section, "Body", body);
            tree.close_section(section);
            Ok(())
        })
    }

    /// Drain the timers into a summary block.
    pub fn dump_timers(&self, handle: &TraceHandle) -> Result<()> {
        handle.with(|tree| -> Result<()> {
            let summary = tree.drain_timers();
            tree.add_block(TIMERS_BLOCK, BlockData::json(&summary)?);
            Ok(())
        })
    }

    /// Finalize the trace and return its body.
    ///
    /// A tree that is still open gets the response and timer summary
    /// appended and is closed; a halted tree is serialized as is.
    pub fn finish(
        &self,
        handle: &TraceHandle,
        response: Option<&CapturedResponse>,
    ) -> Result<String> {
        if !handle.is_closed() {
            if let Some(response) = response {
                self.dump_http_response(handle, response)?;
            }
            self.dump_timers(handle)?;
            handle.with(Tree::end);
        }
        Ok(handle.with(Tree::body)?)
    }
}

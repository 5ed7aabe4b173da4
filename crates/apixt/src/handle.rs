//! Shared per-request access to a trace tree.
//!
//! A request's handler code runs across await points, so the tree lives
//! behind an `Arc<Mutex<_>>`. The lock is only ever held for the duration
//! of a single recorder call, never across an `.await`.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use apixt_trace::{BlockData, BlockRef, SectionId, Tree};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::Result;

/// Cloneable handle to the tree of one in-flight request.
#[derive(Debug, Clone)]
pub struct TraceHandle {
    tree: Arc<Mutex<Tree>>,
}

impl TraceHandle {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree: Arc::new(Mutex::new(tree)),
        }
    }

    /// Lock the tree for direct access.
    pub fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the tree.
    pub fn with<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn add_section(&self, name: impl Into<String>) -> SectionId {
        self.lock().add_section(name)
    }

    pub fn add_section_in(&self, parent: SectionId, name: impl Into<String>) -> SectionId {
        self.lock().add_section_in(parent, name)
    }

    pub fn add_block(&self, name: impl Into<String>, data: BlockData) -> BlockRef {
        self.lock().add_block(name, data)
    }

    pub fn add_block_in(
        &self,
        section: SectionId,
        name: impl Into<String>,
        data: BlockData,
    ) -> BlockRef {
        self.lock().add_block_in(section, name, data)
    }

    pub fn open_details(&self, section: SectionId) {
        self.lock().open_details(section);
    }

    pub fn close_details(&self, section: SectionId) -> Result<()> {
        Ok(self.lock().close_details(section)?)
    }

    pub fn close_section(&self, section: SectionId) {
        self.lock().close_section(section);
    }

    pub fn start_timer(&self, name: &str) {
        self.lock().start_timer(name);
    }

    pub fn stop_timer(&self, name: &str) -> Result<()> {
        Ok(self.lock().stop_timer(name)?)
    }

    /// Record `value` as a debug dump and hand it back.
    #[track_caller]
    pub fn d<T: Serialize>(&self, value: T) -> T {
        self.lock().d(value)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    pub fn is_halted(&self) -> bool {
        self.lock().is_halted()
    }

    pub fn halt_signal(&self) -> watch::Receiver<bool> {
        self.lock().halt_signal()
    }

    pub fn trace_id(&self) -> String {
        self.lock().trace_id().to_string()
    }
}

/// Handler-side access to the current request's trace.
///
/// Always extracts successfully; holds `None` when the request is not
/// being traced, in which case every recording call is a no-op.
#[derive(Debug, Clone, Default)]
pub struct RequestTrace(Option<TraceHandle>);

impl RequestTrace {
    pub fn new(handle: Option<TraceHandle>) -> Self {
        Self(handle)
    }

    pub fn handle(&self) -> Option<&TraceHandle> {
        self.0.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }

    /// Run `f` against the tree if the request is traced.
    pub fn with<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> Option<R> {
        self.0.as_ref().map(|handle| handle.with(f))
    }

    /// Record a top-level block if the request is traced.
    pub fn block(&self, name: impl Into<String>, data: BlockData) {
        if let Some(handle) = &self.0 {
            handle.add_block(name, data);
        }
    }

    /// Open a top-level section if the request is traced.
    pub fn section(&self, name: impl Into<String>) -> Option<SectionId> {
        self.0.as_ref().map(|handle| handle.add_section(name))
    }

    /// Record a block in `section`, or at the top level when `section` is `None`.
    pub fn block_in(&self, section: Option<SectionId>, name: impl Into<String>, data: BlockData) {
        match (&self.0, section) {
            (Some(handle), Some(section)) => {
                handle.add_block_in(section, name, data);
            }
            (Some(handle), None) => {
                handle.add_block(name, data);
            }
            (None, _) => {}
        }
    }

    pub fn close(&self, section: Option<SectionId>) {
        if let (Some(handle), Some(section)) = (&self.0, section) {
            handle.close_section(section);
        }
    }

    pub fn start_timer(&self, name: &str) {
        if let Some(handle) = &self.0 {
            handle.start_timer(name);
        }
    }

    pub fn stop_timer(&self, name: &str) -> Result<()> {
        match &self.0 {
            Some(handle) => handle.stop_timer(name),
            None => Ok(()),
        }
    }

    /// Record `value` as a debug dump if the request is traced.
    #[track_caller]
    pub fn d<T: Serialize>(&self, value: T) -> T {
        match &self.0 {
            Some(handle) => handle.d(value),
            None => value,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestTrace {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<TraceHandle>().cloned()))
    }
}

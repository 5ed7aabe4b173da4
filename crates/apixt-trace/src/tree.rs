//! The per-request trace tree.
//!
//! A [`Tree`] owns every record of one request. Sections and blocks are
//! addressed by small copyable ids ([`SectionId`], [`BlockRef`]) instead of
//! references, so the tree stays the single owner of its command log.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::command::{BlockData, Command, DebugVar, Footer};
use crate::error::{Result, TraceError};
use crate::halt::{HaltCheck, HaltController};
use crate::log::{CommandLog, Slot};
use crate::serialize;
use crate::timer::{TimerRegistry, TimerResult};

/// Name of the timer every tree starts on construction.
pub const TOTAL_TIMER: &str = "total";

/// Handle to a section of a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId(usize);

/// Handle to a block of a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    slot: Slot,
}

impl BlockRef {
    pub fn slot(&self) -> Slot {
        self.slot
    }
}

#[derive(Debug)]
struct SectionState {
    name: String,
    slot: Slot,
    children: Vec<Slot>,
    details_open: bool,
    closed: bool,
    /// Created after its parent closed; records nothing.
    inert: bool,
}

/// Ordered record of what one request did.
#[derive(Debug)]
pub struct Tree {
    trace_id: String,
    log: CommandLog,
    children: HashMap<Slot, Vec<Slot>>,
    sections: Vec<SectionState>,
    by_name: HashMap<String, SectionId>,
    timers: TimerRegistry,
    halt: Option<HaltController>,
    halted: watch::Sender<bool>,
    closed: bool,
}

impl Tree {
    /// Create a tree without a breakpoint.
    pub fn new() -> Self {
        let (halted, _) = watch::channel(false);
        let mut timers = TimerRegistry::new();
        timers.start(TOTAL_TIMER);
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            log: CommandLog::new(),
            children: HashMap::new(),
            sections: Vec::new(),
            by_name: HashMap::new(),
            timers,
            halt: None,
            halted,
            closed: false,
        }
    }

    /// Create a tree armed with a raw breakpoint token.
    pub fn with_halt_token(token: Option<&str>) -> Self {
        let mut tree = Self::new();
        tree.set_halt_token(token);
        tree
    }

    /// Replace the breakpoint with one parsed from `token`.
    pub fn set_halt_token(&mut self, token: Option<&str>) {
        self.halt = HaltController::parse(token);
        if let Some(halt) = &self.halt {
            debug!(
                trace_id = %self.trace_id,
                target = halt.target(),
                mode = ?halt.mode(),
                "Breakpoint armed"
            );
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn halt(&self) -> Option<&HaltController> {
        self.halt.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.borrow()
    }

    /// Receiver that flips to `true` when a breakpoint stops the request.
    pub fn halt_signal(&self) -> watch::Receiver<bool> {
        self.halted.subscribe()
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    /// Open a top-level section.
    pub fn add_section(&mut self, name: impl Into<String>) -> SectionId {
        let inert = self.closed;
        self.open_section(name.into(), inert)
    }

    /// Open a section nested in `parent`.
    pub fn add_section_in(&mut self, parent: SectionId, name: impl Into<String>) -> SectionId {
        let inert = self.closed || self.state(parent).closed;
        let id = self.open_section(name.into(), inert);
        let slot = self.sections[id.0].slot;
        self.link(parent, slot);
        id
    }

    fn open_section(&mut self, name: String, inert: bool) -> SectionId {
        let slot = self.log.reserve();
        if !inert {
            self.log.set(slot, Command::SectionOpen { name: name.clone() });
        }
        trace!(trace_id = %self.trace_id, slot, name = %name, inert, "Section opened");

        let id = SectionId(self.sections.len());
        self.sections.push(SectionState {
            name: name.clone(),
            slot,
            children: Vec::new(),
            details_open: false,
            closed: inert,
            inert,
        });
        self.by_name.insert(name, id);
        id
    }

    /// Latest section opened under `name`.
    pub fn section_named(&self, name: &str) -> Option<SectionId> {
        self.by_name.get(name).copied()
    }

    pub fn section_name(&self, section: SectionId) -> &str {
        &self.state(section).name
    }

    pub fn is_section_closed(&self, section: SectionId) -> bool {
        self.state(section).closed
    }

    /// Start a collapsible region inside `section`.
    pub fn open_details(&mut self, section: SectionId) {
        let slot = self.log.reserve();
        let tree_closed = self.closed;
        let state = &mut self.sections[section.0];
        if tree_closed || state.closed {
            return;
        }
        state.details_open = true;
        state.children.push(slot);
        self.log.set(slot, Command::DetailsOpen);
    }

    /// End the collapsible region opened by [`Tree::open_details`].
    ///
    /// Once the section or the tree is closed (a halt included), the call
    /// only reserves its slot.
    pub fn close_details(&mut self, section: SectionId) -> Result<()> {
        let state = &self.sections[section.0];
        if !state.details_open && (self.closed || state.closed) {
            self.log.reserve();
            return Ok(());
        }
        if !state.details_open {
            return Err(TraceError::protocol(format!(
                "Cannot close details in section \"{}\" because no details were opened before",
                state.name
            )));
        }
        let slot = self.log.reserve();
        let state = &mut self.sections[section.0];
        state.details_open = false;
        state.children.push(slot);
        self.log.set(slot, Command::DetailsClose);
        Ok(())
    }

    /// Close `section`, finalizing its children. Closing twice is a no-op.
    pub fn close_section(&mut self, section: SectionId) {
        let state = &self.sections[section.0];
        if state.inert || state.closed {
            return;
        }
        if state.details_open {
            // Cannot fail: the region is open.
            let _ = self.close_details(section);
        }

        let slot = self.log.push(Command::SectionClose);
        let state = &mut self.sections[section.0];
        state.closed = true;
        state.children.push(slot);

        let mut children = std::mem::take(&mut state.children);
        children.sort_unstable();
        self.children.insert(state.slot, children);
        trace!(trace_id = %self.trace_id, slot = state.slot, name = %state.name, "Section closed");
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Record a top-level block.
    pub fn add_block(&mut self, name: impl Into<String>, data: BlockData) -> BlockRef {
        let name = name.into();
        let block = self.record_block(name.clone(), data, self.closed);
        self.check_halt(&name);
        block
    }

    /// Record a block inside `section`.
    pub fn add_block_in(
        &mut self,
        section: SectionId,
        name: impl Into<String>,
        data: BlockData,
    ) -> BlockRef {
        let name = name.into();
        let suppressed = self.closed || self.state(section).closed;
        let block = self.record_block(name.clone(), data, suppressed);
        if !suppressed {
            self.link(section, block.slot);
        }
        self.check_halt(&name);
        block
    }

    fn record_block(&mut self, name: String, data: BlockData, suppressed: bool) -> BlockRef {
        let slot = self.log.reserve();
        if !suppressed {
            trace!(trace_id = %self.trace_id, slot, name = %name, "Block recorded");
            self.log.set(slot, Command::Block { name, data });
        }
        BlockRef { slot }
    }

    /// Attach a footer to an already recorded block.
    pub fn set_footer(&mut self, block: BlockRef, footer: Footer) {
        if let Some(data) = self.block_data_mut(block) {
            data.footer = Some(footer);
        }
    }

    /// Flag an already recorded block as an error (or not).
    pub fn set_error(&mut self, block: BlockRef, is_error: bool) {
        if let Some(data) = self.block_data_mut(block) {
            data.is_error = Some(is_error);
        }
    }

    fn block_data_mut(&mut self, block: BlockRef) -> Option<&mut BlockData> {
        match self.log.get_mut(block.slot) {
            Some(Command::Block { data, .. }) => Some(data),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Debug dumps
    // ------------------------------------------------------------------

    /// Record `value` as a debug dump and hand it back.
    #[track_caller]
    pub fn d<T: Serialize>(&mut self, value: T) -> T {
        self.debug_vars(vec![DebugVar::of(&value)]);
        value
    }

    /// Record several captured values as one debug dump.
    ///
    /// The record is labelled with the caller's source location.
    #[track_caller]
    pub fn debug_vars(&mut self, vars: Vec<DebugVar>) {
        let location = std::panic::Location::caller();
        let name = format!("d() {}:{}", location.file(), location.line());
        debug!(trace_id = %self.trace_id, vars = ?vars, "{}", name);

        let slot = self.log.reserve();
        if !self.closed {
            self.log.set(slot, Command::Debug { name, vars });
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub fn start_timer(&mut self, name: &str) {
        self.timers.start(name);
    }

    pub fn stop_timer(&mut self, name: &str) -> Result<()> {
        self.timers.stop(name)
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Remove and summarize every timer.
    pub fn drain_timers(&mut self) -> Vec<TimerResult> {
        self.timers.drain()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Close the trace. Later records are suppressed.
    pub fn end(&mut self) {
        if self.closed {
            return;
        }
        self.finalize();
    }

    fn finalize(&mut self) {
        self.closed = true;
        self.log.push(Command::End);
    }

    fn check_halt(&mut self, name: &str) {
        let Some(halt) = self.halt.as_mut() else {
            return;
        };
        if halt.check(name) == HaltCheck::Continue {
            return;
        }
        let status = halt.status().unwrap_or_default();
        let next = halt.resume_token().unwrap_or_default();
        info!(trace_id = %self.trace_id, checkpoint = name, "Request halted at checkpoint");

        self.closed = true;
        for index in (0..self.sections.len()).rev() {
            self.close_section(SectionId(index));
        }
        self.log.push(Command::Abort { status, next });
        self.finalize();
        self.halted.send_replace(true);
    }

    /// Serialize every not yet emitted record as newline-delimited JSON.
    ///
    /// Emitted records are cleared, so a second call only returns what was
    /// recorded in between.
    pub fn body(&mut self) -> Result<String> {
        serialize::render(&mut self.log, &self.children)
    }

    fn state(&self, section: SectionId) -> &SectionState {
        &self.sections[section.0]
    }

    fn link(&mut self, parent: SectionId, slot: Slot) {
        let state = &mut self.sections[parent.0];
        if !state.closed {
            state.children.push(slot);
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

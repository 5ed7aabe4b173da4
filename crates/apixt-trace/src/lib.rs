//! Per-request execution-trace recorder.
//!
//! This crate records what the code handling one request did, as an ordered
//! tree of diagnostic records:
//!
//! - **Log**: append-only, slot-addressed command storage
//! - **Tree**: sections, blocks, details regions and debug dumps for one request
//! - **Timers**: named, reentrant elapsed-time counters
//! - **Halt**: breakpoint tokens that stop a request at a named checkpoint
//! - **Serialize**: newline-delimited JSON for the diagnostic viewer
//!
//! # Usage
//!
//! ```rust
//! use apixt_trace::{BlockData, Footer, Tree};
//!
//! let mut tree = Tree::new();
//! let db = tree.add_section("Database");
//! tree.open_details(db);
//! tree.add_block_in(db, "Query", BlockData::text("text/sql", "SELECT 1"));
//! tree.close_details(db).unwrap();
//! let rows = tree.add_block_in(db, "Rows", BlockData::new(1));
//! tree.set_footer(rows, Footer::new().with("Count", 1));
//! tree.close_section(db);
//! tree.end();
//!
//! let body = tree.body().unwrap();
//! assert_eq!(body.lines().count(), 7);
//! ```
//!
//! # Breakpoints
//!
//! A tree built with [`Tree::with_halt_token`] stops at the named block:
//! every open section is closed, an abort record carrying a resume token is
//! appended, and [`Tree::halt_signal`] flips so the caller can drop the
//! in-flight handler and send the trace instead.

pub mod command;
pub mod error;
pub mod halt;
pub mod log;
pub mod serialize;
pub mod timer;
pub mod tree;

pub use command::{BlockData, Command, DebugVar, Footer};
pub use error::{Result, TraceError};
pub use halt::{HaltCheck, HaltController, NextMode, RESUME_PREFIX};
pub use log::{CommandLog, Slot};
pub use serialize::parse_lines;
pub use timer::{Timer, TimerRegistry, TimerResult};
pub use tree::{BlockRef, SectionId, TOTAL_TIMER, Tree};

/// Record one or more values as a debug dump and evaluate to the first.
///
/// ```rust
/// use apixt_trace::{Tree, d};
///
/// let mut tree = Tree::new();
/// let id = d!(tree, 7u32, "lookup");
/// assert_eq!(id, 7);
/// ```
#[macro_export]
macro_rules! d {
    ($tree:expr, $main:expr $(, $rest:expr)* $(,)?) => {{
        let main = $main;
        let vars = vec![
            $crate::DebugVar::of(&main)
            $(, $crate::DebugVar::of(&$rest))*
        ];
        $tree.debug_vars(vars);
        main
    }};
}

//! Newline-delimited JSON rendering of a command log.
//!
//! Records are walked in slot order. Each emitted record is followed by its
//! finalized children (depth-first, ascending slot), and cleared from the log
//! so it can never be emitted twice.

use std::collections::HashMap;

use crate::error::Result;
use crate::log::{CommandLog, Slot};

/// Drain every defined record of `log` into a JSONL string.
pub fn render(log: &mut CommandLog, children: &HashMap<Slot, Vec<Slot>>) -> Result<String> {
    let mut body = String::new();
    let mut stack = Vec::new();

    for top in 0..log.len() {
        if log.get(top).is_none_or(|cmd| cmd.is_undefined()) {
            continue;
        }

        stack.push(top);
        while let Some(slot) = stack.pop() {
            let command = log.take(slot);
            if command.is_undefined() {
                continue;
            }
            let line = serde_json::to_string(&command)?;
            body.push_str(&line);
            body.push('\n');

            if let Some(kids) = children.get(&slot) {
                stack.extend(kids.iter().rev());
            }
        }
    }

    Ok(body)
}

/// Parse a rendered body back into JSON values, one per line.
pub fn parse_lines(body: &str) -> Result<Vec<serde_json::Value>> {
    let values: std::result::Result<Vec<_>, _> = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect();
    Ok(values?)
}

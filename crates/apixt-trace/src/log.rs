//! Append-only command log.
//!
//! Positions are handed out before their record exists so a parent can
//! claim its slot first and fill in children afterwards.

use std::mem;

use crate::command::Command;

/// Index of a record in the [`CommandLog`].
pub type Slot = usize;

/// Ordered, slot-addressed sequence of trace records.
#[derive(Debug, Default)]
pub struct CommandLog {
    commands: Vec<Command>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a placeholder and return its slot.
    ///
    /// Slots are strictly increasing and never reused.
    pub fn reserve(&mut self) -> Slot {
        self.commands.push(Command::Undefined);
        self.commands.len() - 1
    }

    /// Reserve a slot and fill it in one step.
    pub fn push(&mut self, command: Command) -> Slot {
        let slot = self.reserve();
        self.set(slot, command);
        slot
    }

    /// Overwrite the record at `slot`. Unknown slots are ignored.
    pub fn set(&mut self, slot: Slot, command: Command) {
        if let Some(entry) = self.commands.get_mut(slot) {
            *entry = command;
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&Command> {
        self.commands.get(slot)
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Command> {
        self.commands.get_mut(slot)
    }

    /// Clear `slot` back to [`Command::Undefined`], returning what it held.
    pub fn take(&mut self, slot: Slot) -> Command {
        self.commands
            .get_mut(slot)
            .map(mem::take)
            .unwrap_or_default()
    }

    /// Number of slots reserved so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Command)> {
        self.commands.iter().enumerate()
    }
}

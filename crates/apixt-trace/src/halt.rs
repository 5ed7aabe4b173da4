//! Breakpoint ("halt") evaluation.
//!
//! A client names a checkpoint (a block name) in a request header. When the
//! instrumented code reaches that block the request is aborted and the trace
//! carries a resume token. Sending the resume token on the next request
//! passes the checkpoint once and halts at whatever block follows it.

/// Marks a token as "stop after the named checkpoint".
pub const RESUME_PREFIX: &str = "-";

/// What to do when the target checkpoint is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextMode {
    /// Halt at the target itself.
    Immediate,
    /// Pass the target, then halt at the next block.
    SkipOne,
    /// The target has been passed; halt at the next block of any name.
    Forced,
}

/// Outcome of checking one block against the breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCheck {
    Continue,
    Halt,
}

/// Per-request breakpoint state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltController {
    target: String,
    mode: NextMode,
    stopped_at: Option<String>,
}

impl HaltController {
    /// Parse a raw header token.
    ///
    /// Returns `None` for missing, empty, or prefix-only tokens; a bad token
    /// means "no breakpoint", never an error.
    pub fn parse(token: Option<&str>) -> Option<Self> {
        let token = token?.trim();
        let (target, mode) = match token.strip_prefix(RESUME_PREFIX) {
            Some(rest) => (rest, NextMode::SkipOne),
            None => (token, NextMode::Immediate),
        };
        if target.is_empty() {
            return None;
        }
        Some(Self {
            target: target.to_string(),
            mode,
            stopped_at: None,
        })
    }

    /// Evaluate the block `name` that was just recorded.
    ///
    /// Once halted, every further check is a no-op.
    pub fn check(&mut self, name: &str) -> HaltCheck {
        if self.stopped_at.is_some() {
            return HaltCheck::Continue;
        }

        let halt = match self.mode {
            NextMode::Forced => true,
            NextMode::Immediate => name == self.target,
            NextMode::SkipOne => {
                if name == self.target {
                    self.mode = NextMode::Forced;
                }
                false
            }
        };

        if !halt {
            return HaltCheck::Continue;
        }
        self.stopped_at = Some(name.to_string());
        HaltCheck::Halt
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn mode(&self) -> NextMode {
        self.mode
    }

    pub fn stopped_at(&self) -> Option<&str> {
        self.stopped_at.as_deref()
    }

    /// Token that resumes past the checkpoint this request stopped at.
    pub fn resume_token(&self) -> Option<String> {
        self.stopped_at
            .as_ref()
            .map(|name| format!("{RESUME_PREFIX}{name}"))
    }

    /// Human-readable status for the abort record.
    pub fn status(&self) -> Option<String> {
        self.stopped_at
            .as_ref()
            .map(|name| format!("Halted at {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        let halt = HaltController::parse(Some("checkpointA")).unwrap();
        assert_eq!(halt.target(), "checkpointA");
        assert_eq!(halt.mode(), NextMode::Immediate);

        let halt = HaltController::parse(Some("-checkpointA")).unwrap();
        assert_eq!(halt.target(), "checkpointA");
        assert_eq!(halt.mode(), NextMode::SkipOne);

        assert!(HaltController::parse(None).is_none());
        assert!(HaltController::parse(Some("")).is_none());
        assert!(HaltController::parse(Some("-")).is_none());
    }

    #[test]
    fn test_immediate_halts_at_target() {
        let mut halt = HaltController::parse(Some("checkpointA")).unwrap();
        assert_eq!(halt.check("x"), HaltCheck::Continue);
        assert_eq!(halt.check("checkpointA"), HaltCheck::Halt);
        assert_eq!(halt.stopped_at(), Some("checkpointA"));
        assert_eq!(halt.resume_token().as_deref(), Some("-checkpointA"));
        assert_eq!(halt.status().as_deref(), Some("Halted at checkpointA"));
    }

    #[test]
    fn test_skip_one_halts_after_target() {
        let mut halt = HaltController::parse(Some("-checkpointA")).unwrap();
        assert_eq!(halt.check("checkpointA"), HaltCheck::Continue);
        assert_eq!(halt.mode(), NextMode::Forced);
        assert_eq!(halt.check("z"), HaltCheck::Halt);
        assert_eq!(halt.stopped_at(), Some("z"));
        assert_eq!(halt.resume_token().as_deref(), Some("-z"));
    }

    #[test]
    fn test_checks_after_halt_are_noops() {
        let mut halt = HaltController::parse(Some("a")).unwrap();
        assert_eq!(halt.check("a"), HaltCheck::Halt);
        assert_eq!(halt.check("a"), HaltCheck::Continue);
        assert_eq!(halt.stopped_at(), Some("a"));
    }
}

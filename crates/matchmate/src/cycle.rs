//! Per-cycle bookkeeping for the orchestrator.
//!
//! One cycle runs from a user message to its finalized assistant turn. The state
//! only ever moves along the edges accepted by [`CycleState::can_advance_to`];
//! anything else is a bug in the orchestrator and surfaces as an internal error.

use serde::Serialize;
use std::fmt;

use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleState {
    AwaitingUserInput,
    Generating,
    StreamingOnly,
    ToolCallDetected,
    ToolExecuting,
    ToolExecutionFailed,
    ResultAppended,
    FollowupGenerating,
    TurnFinalized,
}

impl CycleState {
    pub fn can_advance_to(self, next: CycleState) -> bool {
        use CycleState::*;

        matches!(
            (self, next),
            (AwaitingUserInput, Generating)
                | (Generating, StreamingOnly)
                | (Generating, ToolCallDetected)
                | (Generating, TurnFinalized)
                | (StreamingOnly, ToolCallDetected)
                | (StreamingOnly, TurnFinalized)
                | (ToolCallDetected, ToolExecuting)
                | (ToolExecuting, ResultAppended)
                | (ToolExecuting, ToolExecutionFailed)
                | (ToolExecutionFailed, ResultAppended)
                | (ResultAppended, FollowupGenerating)
                | (FollowupGenerating, TurnFinalized)
                | (TurnFinalized, AwaitingUserInput)
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Transient state of one assistant cycle. Never persisted.
#[derive(Debug, Clone)]
pub struct AssistantCycleState {
    state: CycleState,
    text: String,
    tool_consumed: bool,
}

impl Default for AssistantCycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantCycleState {
    pub fn new() -> Self {
        Self {
            state: CycleState::AwaitingUserInput,
            text: String::new(),
            tool_consumed: false,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Text accumulated by the current generation
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_consumed(&self) -> bool {
        self.tool_consumed
    }

    pub fn advance(&mut self, next: CycleState) -> AgentResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(AgentError::Internal(format!(
                "illegal cycle transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "cycle transition");

        match next {
            CycleState::ToolExecuting => self.tool_consumed = true,
            // The finalized turn carries the follow-up answer, not the lead-in
            CycleState::FollowupGenerating => self.text.clear(),
            CycleState::AwaitingUserInput => {
                self.text.clear();
                self.tool_consumed = false;
            }
            _ => {}
        }
        self.state = next;
        Ok(())
    }

    /// Record streamed text, moving out of `Generating` on the first delta
    pub fn push_text(&mut self, delta: &str) -> AgentResult<()> {
        if self.state == CycleState::Generating {
            self.advance(CycleState::StreamingOnly)?;
        }
        self.text.push_str(delta);
        Ok(())
    }

    /// Abandon the cycle after a gateway failure
    pub fn abort(&mut self) {
        tracing::debug!(from = %self.state, "cycle aborted");
        self.state = CycleState::AwaitingUserInput;
        self.text.clear();
        self.tool_consumed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CycleState::*;

    #[test]
    fn test_tool_path() -> AgentResult<()> {
        let mut cycle = AssistantCycleState::new();
        cycle.advance(Generating)?;
        cycle.push_text("Let me check. ")?;
        assert_eq!(cycle.state(), StreamingOnly);

        cycle.advance(ToolCallDetected)?;
        cycle.advance(ToolExecuting)?;
        assert!(cycle.tool_consumed());
        cycle.advance(ToolExecutionFailed)?;
        cycle.advance(ResultAppended)?;
        cycle.advance(FollowupGenerating)?;
        assert_eq!(cycle.text(), "");

        cycle.push_text("Sorry, the lookup failed.")?;
        assert_eq!(cycle.state(), FollowupGenerating);
        cycle.advance(TurnFinalized)?;
        assert_eq!(cycle.text(), "Sorry, the lookup failed.");

        cycle.advance(AwaitingUserInput)?;
        assert!(!cycle.tool_consumed());
        assert_eq!(cycle.text(), "");
        Ok(())
    }

    #[test]
    fn test_text_only_path() -> AgentResult<()> {
        let mut cycle = AssistantCycleState::new();
        cycle.advance(Generating)?;
        cycle.push_text("Hello")?;
        cycle.push_text(" there")?;
        cycle.advance(TurnFinalized)?;
        assert_eq!(cycle.text(), "Hello there");
        assert!(!cycle.tool_consumed());
        Ok(())
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut cycle = AssistantCycleState::new();
        let err = cycle.advance(ToolExecuting).unwrap_err();
        assert!(matches!(err, AgentError::Internal(_)));
        assert_eq!(cycle.state(), AwaitingUserInput);

        assert!(!FollowupGenerating.can_advance_to(ToolCallDetected));
        assert!(!ToolExecutionFailed.can_advance_to(FollowupGenerating));
        assert!(!TurnFinalized.can_advance_to(Generating));
    }

    #[test]
    fn test_abort_resets() -> AgentResult<()> {
        let mut cycle = AssistantCycleState::new();
        cycle.advance(Generating)?;
        cycle.push_text("partial")?;
        cycle.abort();
        assert_eq!(cycle.state(), AwaitingUserInput);
        assert_eq!(cycle.text(), "");
        Ok(())
    }
}

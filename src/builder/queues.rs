//! Command queues fed by tooling instead of devices.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::debug_check_invariants;
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::ticcmd::TickCommand;

/// Precomputed commands replayed while skipping ahead (batch replays, search
/// tools). Every pop decrements the depth; the pop that brings it to zero
/// ends skip mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedQueue {
    commands: VecDeque<TickCommand>,
    depth: usize,
}

/// A command popped from a [`ScriptedQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptedCommand {
    /// The command to use this tick.
    pub cmd: TickCommand,
    /// The queue is now empty; skip mode should end.
    pub exhausted: bool,
}

impl ScriptedQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends commands to be replayed after those already queued.
    pub fn extend(&mut self, commands: impl IntoIterator<Item = TickCommand>) {
        for cmd in commands {
            self.commands.push_back(cmd);
            self.depth += 1;
        }
        debug_check_invariants!(self, "after extend");
    }

    /// Commands left.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Takes the next command.
    pub fn pop(&mut self) -> Option<ScriptedCommand> {
        let cmd = self.commands.pop_front()?;
        self.depth = self.depth.saturating_sub(1);
        debug_check_invariants!(self, "after pop");
        Some(ScriptedCommand {
            cmd,
            exhausted: self.depth == 0,
        })
    }

    /// Drops everything queued.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.depth = 0;
    }
}

impl InvariantChecker for ScriptedQueue {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.depth != self.commands.len() {
            return Err(
                InvariantViolation::new("ScriptedQueue", "depth does not match queued commands")
                    .with_details(format!(
                        "depth={}, queued={}",
                        self.depth,
                        self.commands.len()
                    )),
            );
        }
        Ok(())
    }
}

/// Candidate commands produced by an external brute-force search, one per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BruteForceQueue {
    active: bool,
    candidates: VecDeque<TickCommand>,
}

impl BruteForceQueue {
    /// Creates an inactive queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a search run with the given candidates.
    pub fn start(&mut self, candidates: impl IntoIterator<Item = TickCommand>) {
        self.candidates = candidates.into_iter().collect();
        self.active = true;
    }

    /// Adds the next candidate of a running search.
    pub fn push(&mut self, cmd: TickCommand) {
        self.candidates.push_back(cmd);
    }

    /// Ends the search run.
    pub fn stop(&mut self) {
        self.active = false;
        self.candidates.clear();
    }

    /// Returns `true` while a search run is in progress.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Candidates left.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns `true` when no candidates are left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Takes this tick's candidate.
    pub fn pop(&mut self) -> Option<TickCommand> {
        if !self.active {
            return None;
        }
        self.candidates.pop_front()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn forward(n: i8) -> TickCommand {
        TickCommand {
            forward: n,
            ..TickCommand::EMPTY
        }
    }

    #[test]
    fn scripted_depth_counts_down_to_exit() {
        let mut queue = ScriptedQueue::new();
        queue.extend([forward(1), forward(2)]);
        assert_eq!(queue.depth(), 2);
        let first = queue.pop().unwrap();
        assert_eq!(first.cmd.forward, 1);
        assert!(!first.exhausted);
        let second = queue.pop().unwrap();
        assert!(second.exhausted);
        assert!(queue.pop().is_none());
        assert!(queue.check_invariants().is_ok());
    }

    #[test]
    fn scripted_clear() {
        let mut queue = ScriptedQueue::new();
        queue.extend([forward(1)]);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.check_invariants().is_ok());
    }

    #[test]
    fn brute_force_only_pops_while_active() {
        let mut queue = BruteForceQueue::new();
        queue.push(forward(3));
        assert_eq!(queue.pop(), None);
        queue.start([forward(4), forward(5)]);
        assert_eq!(queue.pop(), Some(forward(4)));
        assert_eq!(queue.len(), 1);
        queue.stop();
        assert!(!queue.is_active());
        assert!(queue.is_empty());
    }
}

//! Explicit search stack.
//!
//! Each frame holds the partial solution it extends, its ordered
//! alternatives, the index of the one being explored, and the board state
//! to go back to when that alternative is left.

use tracing::trace;

use super::circuit::{NetMatch, SearchState};
use crate::board::{Board, BoardSnapshot, TraceCuts};
use crate::ids::MatchId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ideal,
    Wires,
    Cuts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Seed,
    Net { net: usize, phase: Phase },
    Combos,
}

#[derive(Debug, Clone)]
pub enum Alternative {
    Seed { reference: String, placement: MatchId },
    Net(NetMatch),
    Cut { net: NetMatch, cuts: TraceCuts },
    Combo(Vec<NetMatch>),
}

#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
    pub state: SearchState,
    pub alternatives: Vec<Alternative>,
    pub index: usize,
    pub snapshot: Option<BoardSnapshot>,
}

impl Frame {
    pub fn new(kind: FrameKind, state: SearchState, alternatives: Vec<Alternative>) -> Self {
        Self {
            kind,
            state,
            alternatives,
            index: 0,
            snapshot: None,
        }
    }

    pub fn current(&self) -> Option<&Alternative> {
        self.alternatives.get(self.index)
    }
}

#[derive(Debug, Default)]
pub struct SearchStack {
    frames: Vec<Frame>,
}

impl SearchStack {
    pub fn push_frame(&mut self, frame: Frame) {
        trace!(
            depth = self.frames.len() + 1,
            kind = ?frame.kind,
            alternatives = frame.alternatives.len(),
            "frame pushed"
        );
        self.frames.push(frame);
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Leaves the top frame's current alternative, restoring the board, and
    /// moves `k` alternatives ahead. False on an empty stack.
    pub fn advance(&mut self, board: &mut Board, k: usize) -> bool {
        let Some(top) = self.frames.last_mut() else {
            return false;
        };
        if let Some(snapshot) = top.snapshot.take() {
            board.restore(snapshot);
        }
        top.index += k;
        true
    }

    pub fn pop(&mut self, board: &mut Board) -> Option<Frame> {
        let mut frame = self.frames.pop()?;
        if let Some(snapshot) = frame.snapshot.take() {
            board.restore(snapshot);
        }
        trace!(depth = self.frames.len(), "frame popped");
        Some(frame)
    }

    /// `(index, alternatives)` per frame, bottom first.
    pub fn positions(&self) -> Vec<(usize, usize)> {
        self.frames
            .iter()
            .map(|f| (f.index, f.alternatives.len()))
            .collect()
    }
}

//! Move Engine
//!
//! Validates a proposed edge and applies it to the board.
//! No I/O: the caller decides what to tell connected parties from the
//! returned [`MoveOutcome`].
//!
//! ## Validation order (short-circuit)
//!
//! 1. Acting player must hold the turn.
//! 2. Both dots present and on the grid.
//! 3. Dots adjacent.
//! 4. Edge not yet drawn (a repeat is a harmless [`MoveOutcome::Duplicate`]).
//!
//! ## Scoring
//!
//! Every cell next to the new edge that is unowned and now fully enclosed
//! goes to the mover (at most two per move). Completing at least one cell
//! keeps the turn; otherwise it rotates to the next player.

use crate::core::grid::{adjacent_cells, cell_edges, is_adjacent, Cell, Dot, Edge};
use crate::game::state::{BoardState, Line, PlayerNumber};

/// A move as received, before validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProposedMove {
    /// Acting player (`None` for spectators).
    pub player: Option<PlayerNumber>,
    /// First endpoint.
    pub start: Option<Dot>,
    /// Second endpoint.
    pub end: Option<Dot>,
}

impl ProposedMove {
    /// A fully specified move.
    pub fn new(player: PlayerNumber, start: Dot, end: Dot) -> Self {
        Self {
            player: Some(player),
            start: Some(start),
            end: Some(end),
        }
    }
}

/// Why a move was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Acting player does not hold the turn.
    #[error("Not this player's turn")]
    NotYourTurn,
    /// Start or end dot missing.
    #[error("Missing dot")]
    MissingDot,
    /// A dot lies off the grid.
    #[error("Dot outside grid")]
    OutOfBounds,
    /// Dots are not one unit apart.
    #[error("Dots not adjacent")]
    NotAdjacent,
}

/// Deltas produced by an applied move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    /// Normalized edge drawn.
    pub edge: Edge,
    /// Cells completed by this edge (0 to 2).
    pub completed: Vec<Cell>,
    /// Points gained by the mover.
    pub score_delta: u32,
    /// Whether the turn moved to another player.
    pub turn_changed: bool,
    /// Turn after the move.
    pub next_turn: PlayerNumber,
}

/// Result of [`apply_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Rejected; board untouched.
    Rejected(RejectReason),
    /// Edge already drawn; board untouched.
    Duplicate,
    /// Edge drawn.
    Applied(AppliedMove),
}

impl MoveOutcome {
    /// Whether the board changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveOutcome::Applied(_))
    }

    /// Whether connected parties should receive a fresh snapshot.
    ///
    /// Duplicates re-sync clients that drew an edge they had not yet seen.
    pub fn should_broadcast(&self) -> bool {
        !matches!(self, MoveOutcome::Rejected(_))
    }
}

/// Validate and apply a move.
pub fn apply_move(state: &mut BoardState, mv: &ProposedMove) -> MoveOutcome {
    let player = match mv.player {
        Some(player) if player == state.turn() => player,
        _ => return MoveOutcome::Rejected(RejectReason::NotYourTurn),
    };

    let (start, end) = match (mv.start, mv.end) {
        (Some(start), Some(end)) => (start, end),
        _ => return MoveOutcome::Rejected(RejectReason::MissingDot),
    };

    let size = state.size();
    if !size.contains(start) || !size.contains(end) {
        return MoveOutcome::Rejected(RejectReason::OutOfBounds);
    }

    if !is_adjacent(start, end) {
        return MoveOutcome::Rejected(RejectReason::NotAdjacent);
    }

    let edge = Edge::new(start, end);
    if state.has_edge(edge) {
        return MoveOutcome::Duplicate;
    }

    state.add_edge(edge);
    state.record_line(Line {
        start,
        end,
        player_number: player,
    });
    state.mark_started();

    let completed: Vec<Cell> = adjacent_cells(edge, size)
        .into_iter()
        .filter(|cell| state.owner(*cell).is_none() && is_enclosed(state, *cell))
        .collect();

    let mut score_delta = 0;
    for cell in &completed {
        if state.set_owner(*cell, player) {
            state.increment_score(player);
            score_delta += 1;
        }
    }

    // Bonus turn on any completion
    if completed.is_empty() {
        state.set_turn(player.next_in(state.player_count()));
    }

    let next_turn = state.turn();
    MoveOutcome::Applied(AppliedMove {
        edge,
        completed,
        score_delta,
        turn_changed: next_turn != player,
        next_turn,
    })
}

fn is_enclosed(state: &BoardState, cell: Cell) -> bool {
    cell_edges(cell).iter().all(|edge| state.has_edge(*edge))
}

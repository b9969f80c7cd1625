//! Game Logic Module
//!
//! The authoritative board and the rules that mutate it.
//!
//! ## Module Structure
//!
//! - `state`: Board state, lines, ownership, scores, turn
//! - `engine`: Move validation and application
//! - `registry`: Session identity to player number mapping

pub mod state;
pub mod engine;
pub mod registry;

// Re-export key types
pub use state::{BoardState, Line, PlayerNumber};
pub use engine::{apply_move, AppliedMove, MoveOutcome, ProposedMove, RejectReason};
pub use registry::{connect, JoinError, JoinOutcome, SessionToken};

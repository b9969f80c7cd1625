//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object tagged with `"type"`; payload fields are
//! camelCase to match browser clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::grid::Dot;
use crate::game::engine::ProposedMove;
use crate::game::state::{BoardState, Line, PlayerNumber};

/// Notice sent to new identities once the game is under way.
pub const GAME_FULL_MESSAGE: &str = "Game has already started. No new players allowed.";

/// Notice sent when the handshake carries no usable session identity.
pub const INVALID_SESSION_MESSAGE: &str = "Invalid session.";

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Propose drawing an edge.
    NewLine(NewLine),

    /// Ask for the current snapshot.
    RequestState,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Proposed edge.
///
/// Dots are optional on the wire so that incomplete proposals reach the
/// move engine and are rejected there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLine {
    /// Player number the client believes it holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_number: Option<PlayerNumber>,
    /// First endpoint.
    #[serde(default)]
    pub start: Option<Dot>,
    /// Second endpoint.
    #[serde(default)]
    pub end: Option<Dot>,
}

impl NewLine {
    /// Build the engine input for a sender resolved to `sender`.
    ///
    /// A claimed player number that disagrees with the sender's own number
    /// leaves the move without an acting player.
    pub fn to_proposed_move(&self, sender: Option<PlayerNumber>) -> ProposedMove {
        let player = match (sender, self.player_number) {
            (Some(own), Some(claimed)) if own != claimed => None,
            (own, _) => own,
        };

        ProposedMove {
            player,
            start: self.start,
            end: self.end,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Player number assigned to this connection.
    SetPlayerNumber {
        /// Assigned number.
        #[serde(rename = "playerNumber")]
        player_number: PlayerNumber,
    },

    /// Connection admitted as a viewer only.
    GameFull {
        /// Human-readable notice.
        message: String,
    },

    /// Snapshot for this connection only.
    LoadState(Snapshot),

    /// Snapshot broadcast after a move.
    UpdateState(Snapshot),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall clock (ms since epoch).
        #[serde(rename = "serverTime")]
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Full game state as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Lines in draw order.
    pub lines: Vec<Line>,
    /// `[row][col]` owner per cell, 0 if unowned.
    pub cell_owners: Vec<Vec<u32>>,
    /// Score per player.
    pub scores: BTreeMap<PlayerNumber, u32>,
    /// Player whose move is legal.
    pub turn: PlayerNumber,
}

impl Snapshot {
    /// Capture the current board.
    pub fn of(state: &BoardState) -> Self {
        Self {
            lines: state.lines().to_vec(),
            cell_owners: state.owner_grid(),
            scores: state.scores().clone(),
            turn: state.turn(),
        }
    }
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing or unusable session identity.
    InvalidSession,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// The spectator notice.
    pub fn game_full() -> Self {
        ServerMessage::GameFull {
            message: GAME_FULL_MESSAGE.to_string(),
        }
    }

    /// The invalid-session rejection.
    pub fn invalid_session() -> Self {
        ServerMessage::Error(ServerError {
            code: ErrorCode::InvalidSession,
            message: INVALID_SESSION_MESSAGE.to_string(),
        })
    }
}

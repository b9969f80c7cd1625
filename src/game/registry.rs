//! Session / Player Registry
//!
//! Maps a stable session identity to a player number.
//!
//! ```text
//!   NotJoined ──(first contact, game not started)──▶ Joined(n)
//!   NotJoined ──(first contact, game started)──────▶ spectator (stays NotJoined)
//!   Joined(n) ──(reconnect, any time)──────────────▶ Joined(n)
//! ```
//!
//! Disconnecting never frees a slot.

use std::fmt;

use crate::game::state::{BoardState, PlayerNumber};

/// Join errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// Missing, blank or oversized session identity.
    #[error("Invalid session")]
    InvalidSession,
}

/// A validated session identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Longest accepted token, in bytes.
    pub const MAX_LEN: usize = 128;

    /// Validate a raw token.
    pub fn parse(raw: &str) -> Result<Self, JoinError> {
        if raw.trim().is_empty() || raw.len() > Self::MAX_LEN {
            return Err(JoinError::InvalidSession);
        }
        Ok(Self(raw.to_string()))
    }

    /// Raw token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The identity holds a player number.
    Joined {
        /// Assigned number.
        player: PlayerNumber,
        /// True if the identity was already known.
        rejoined: bool,
    },
    /// New identity after the game started: view only.
    Spectator,
}

impl JoinOutcome {
    /// Player number, if any.
    pub fn player(&self) -> Option<PlayerNumber> {
        match self {
            JoinOutcome::Joined { player, .. } => Some(*player),
            JoinOutcome::Spectator => None,
        }
    }
}

/// Resolve a connecting session identity against the board.
pub fn connect(state: &mut BoardState, raw_token: Option<&str>) -> Result<JoinOutcome, JoinError> {
    let token = SessionToken::parse(raw_token.ok_or(JoinError::InvalidSession)?)?;

    if let Some(player) = state.player_for(&token) {
        return Ok(JoinOutcome::Joined {
            player,
            rejoined: true,
        });
    }

    if state.is_started() {
        return Ok(JoinOutcome::Spectator);
    }

    let player = state.register_player(token);
    Ok(JoinOutcome::Joined {
        player,
        rejoined: false,
    })
}

//! Game State Definitions
//!
//! The authoritative board model.
//! Uses BTreeMap/BTreeSet for deterministic iteration order.
//!
//! Edge membership and cell ownership are monotonic: entries are only ever
//! added, never removed or overwritten.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};

use crate::core::grid::{Cell, Dot, Edge, GridSize};
use crate::game::registry::SessionToken;

// =============================================================================
// PLAYER NUMBER
// =============================================================================

/// 1-based player identity, assigned in join order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PlayerNumber(pub u32);

impl PlayerNumber {
    /// The first player to join.
    pub const FIRST: PlayerNumber = PlayerNumber(1);

    /// Create from a raw number.
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// Raw number.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Next player in rotation among `1..=player_count`, wrapping to 1.
    ///
    /// Returns `self` unchanged when `player_count` is zero.
    pub fn next_in(self, player_count: u32) -> Self {
        if player_count == 0 {
            return self;
        }
        Self(self.0 % player_count + 1)
    }
}

// Also accepts numeric strings: JSON object keys arrive as strings, and
// tagged enums buffer them before the key deserializer can convert.
impl<'de> Deserialize<'de> for PlayerNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PlayerNumberVisitor;

        impl Visitor<'_> for PlayerNumberVisitor {
            type Value = PlayerNumber;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a player number")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PlayerNumber, E> {
                u32::try_from(v)
                    .map(PlayerNumber)
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PlayerNumber, E> {
                v.parse()
                    .map(PlayerNumber)
                    .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(PlayerNumberVisitor)
    }
}

impl fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// LINE
// =============================================================================

/// A drawn edge as the player proposed it (endpoints not normalized).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    /// First endpoint, as sent.
    pub start: Dot,
    /// Second endpoint, as sent.
    pub end: Dot,
    /// Player who drew it.
    pub player_number: PlayerNumber,
}

impl Line {
    /// Normalized edge identity of this line.
    pub fn edge(&self) -> Edge {
        Edge::new(self.start, self.end)
    }
}

// =============================================================================
// BOARD STATE
// =============================================================================

/// Complete state of one game.
#[derive(Clone, Debug)]
pub struct BoardState {
    /// Board dimensions
    size: GridSize,

    /// Normalized drawn edges
    edges: BTreeSet<Edge>,

    /// Drawn lines in draw order (append-only)
    lines: Vec<Line>,

    /// Owner per cell, indexed `[row][col]`
    owners: Vec<Vec<Option<PlayerNumber>>>,

    /// Score per registered player
    scores: BTreeMap<PlayerNumber, u32>,

    /// Player whose move is currently legal
    turn: PlayerNumber,

    /// Set by the first applied move
    started: bool,

    /// Session identity -> player number
    sessions: BTreeMap<SessionToken, PlayerNumber>,

    /// Number of registered players
    player_count: u32,
}

impl BoardState {
    /// Create an empty board.
    pub fn new(size: GridSize) -> Self {
        let owners = (0..size.cell_rows())
            .map(|_| vec![None; size.cell_cols() as usize])
            .collect();

        Self {
            size,
            edges: BTreeSet::new(),
            lines: Vec::new(),
            owners,
            scores: BTreeMap::new(),
            turn: PlayerNumber::FIRST,
            started: false,
            sessions: BTreeMap::new(),
            player_count: 0,
        }
    }

    /// Board dimensions.
    pub fn size(&self) -> GridSize {
        self.size
    }

    // -------------------------------------------------------------------------
    // Edges and lines
    // -------------------------------------------------------------------------

    /// Whether an edge has been drawn.
    pub fn has_edge(&self, edge: Edge) -> bool {
        self.edges.contains(&edge)
    }

    /// Insert an edge. Returns false (no-op) if already present.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        self.edges.insert(edge)
    }

    /// Number of drawn edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Append a line record.
    pub fn record_line(&mut self, line: Line) {
        self.lines.push(line);
    }

    /// Lines in draw order.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    // -------------------------------------------------------------------------
    // Cells
    // -------------------------------------------------------------------------

    /// Owner of a cell, `None` if unowned or off the grid.
    pub fn owner(&self, cell: Cell) -> Option<PlayerNumber> {
        self.owners
            .get(cell.row as usize)
            .and_then(|row| row.get(cell.col as usize))
            .copied()
            .flatten()
    }

    /// Set a cell's owner.
    ///
    /// Returns false and leaves the board untouched if the cell is already
    /// owned or lies off the grid.
    pub fn set_owner(&mut self, cell: Cell, player: PlayerNumber) -> bool {
        let slot = self
            .owners
            .get_mut(cell.row as usize)
            .and_then(|row| row.get_mut(cell.col as usize));

        match slot {
            Some(slot) if slot.is_none() => {
                *slot = Some(player);
                true
            }
            _ => false,
        }
    }

    /// Owners as a `[row][col]` grid with 0 for unowned cells.
    pub fn owner_grid(&self) -> Vec<Vec<u32>> {
        self.owners
            .iter()
            .map(|row| row.iter().map(|o| o.map_or(0, PlayerNumber::get)).collect())
            .collect()
    }

    /// Number of owned cells.
    pub fn owned_cell_count(&self) -> usize {
        self.owners.iter().flatten().filter(|o| o.is_some()).count()
    }

    /// Whether every cell has an owner.
    pub fn is_complete(&self) -> bool {
        self.owned_cell_count() == self.size.cell_count()
    }

    // -------------------------------------------------------------------------
    // Scores and turn
    // -------------------------------------------------------------------------

    /// Add one point to a player.
    pub fn increment_score(&mut self, player: PlayerNumber) {
        let score = self.scores.entry(player).or_insert(0);
        *score = score.saturating_add(1);
    }

    /// A player's score (0 if unknown).
    pub fn score(&self, player: PlayerNumber) -> u32 {
        self.scores.get(&player).copied().unwrap_or(0)
    }

    /// All scores, ordered by player number.
    pub fn scores(&self) -> &BTreeMap<PlayerNumber, u32> {
        &self.scores
    }

    /// Player whose move is currently legal.
    pub fn turn(&self) -> PlayerNumber {
        self.turn
    }

    /// Hand the turn to a player.
    pub fn set_turn(&mut self, player: PlayerNumber) {
        self.turn = player;
    }

    /// Whether a move has been applied yet.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Mark the game as started. Never reverts.
    pub fn mark_started(&mut self) {
        self.started = true;
    }

    // -------------------------------------------------------------------------
    // Players
    // -------------------------------------------------------------------------

    /// Register a session identity and return its player number.
    ///
    /// A known identity keeps its original number; a new one gets the next
    /// sequential number and a zero score. Does not consult the started flag.
    pub fn register_player(&mut self, token: SessionToken) -> PlayerNumber {
        if let Some(existing) = self.sessions.get(&token) {
            return *existing;
        }

        self.player_count += 1;
        let player = PlayerNumber::new(self.player_count);
        self.sessions.insert(token, player);
        self.scores.entry(player).or_insert(0);
        player
    }

    /// Look up the player number of a session identity.
    pub fn player_for(&self, token: &SessionToken) -> Option<PlayerNumber> {
        self.sessions.get(token).copied()
    }

    /// Number of registered players.
    pub fn player_count(&self) -> u32 {
        self.player_count
    }
}

// =============================================================================
// TESTS
// =============================================================================

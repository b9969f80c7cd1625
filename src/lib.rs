//! # Dots and Boxes Game Server
//!
//! Authoritative real-time multiplayer server for Dots and Boxes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  DOTS AND BOXES SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Geometry                                  │
//! │  └── grid.rs     - Dots, edges, cells, adjacency             │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── state.rs    - Board, ownership, scores, turn            │
//! │  ├── engine.rs   - Move validation and application           │
//! │  └── registry.rs - Session identity to player number         │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server and configuration        │
//! │  ├── protocol.rs - Message types                             │
//! │  └── session.rs  - Connected parties and fan-out             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! Clients only propose lines. The server validates each proposal,
//! applies it, and broadcasts the full resulting snapshot:
//! - Every mutation runs under one write guard per game
//! - Rejected proposals change nothing and produce no reply
//! - Completing a cell keeps the turn with the mover

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::grid::{Cell, Dot, Edge, GridSize};
pub use game::engine::{apply_move, MoveOutcome, ProposedMove};
pub use game::state::{BoardState, PlayerNumber};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of dot rows
pub const DEFAULT_ROWS: u32 = 5;

/// Default number of dot columns
pub const DEFAULT_COLS: u32 = 5;

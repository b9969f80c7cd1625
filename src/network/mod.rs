//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! This layer owns connections only; all game rules run through `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, NewLine, ServerError, ServerMessage, Snapshot};
pub use session::{ConnectionId, GameSession};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig};

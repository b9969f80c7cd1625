//! Game Session Management
//!
//! One game session owns the authoritative board and the set of connected
//! parties. All game logic runs through `game/`; this layer only resolves
//! which player a connection speaks for and fans results out.
//!
//! Fan-out never waits on a recipient: a full or closed outbound channel
//! drops that one message for that one party.

use std::collections::BTreeMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::grid::GridSize;
use crate::game::engine::{apply_move, MoveOutcome};
use crate::game::registry::{connect, JoinError, JoinOutcome};
use crate::game::state::{BoardState, PlayerNumber};
use crate::network::protocol::{NewLine, ServerMessage, Snapshot};

/// Unique connection identifier.
pub type ConnectionId = Uuid;

/// A party connected to the session.
#[derive(Debug)]
pub struct ConnectedParty {
    /// Player number, `None` for spectators.
    pub player: Option<PlayerNumber>,
    /// Message channel to this party.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// A game session.
pub struct GameSession {
    /// Authoritative board.
    board: BoardState,
    /// Connected parties.
    parties: BTreeMap<ConnectionId, ConnectedParty>,
}

impl GameSession {
    /// Create a session with an empty board.
    pub fn new(size: GridSize) -> Self {
        Self {
            board: BoardState::new(size),
            parties: BTreeMap::new(),
        }
    }

    /// Read access to the board.
    pub fn board(&self) -> &BoardState {
        &self.board
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of(&self.board)
    }

    /// Number of connected parties.
    pub fn party_count(&self) -> usize {
        self.parties.len()
    }

    /// Player number of a connection, if it has one.
    pub fn player_of(&self, id: &ConnectionId) -> Option<PlayerNumber> {
        self.parties.get(id).and_then(|p| p.player)
    }

    /// Admit a connection.
    ///
    /// Players receive `set_player_number`, late identities `game_full`; both
    /// then receive `load_state`. An invalid identity is not admitted.
    pub fn connect(
        &mut self,
        id: ConnectionId,
        session_token: Option<&str>,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinOutcome, JoinError> {
        let outcome = connect(&mut self.board, session_token)?;

        let greeting = match outcome {
            JoinOutcome::Joined { player, rejoined } => {
                info!(%id, %player, rejoined, "Player joined");
                ServerMessage::SetPlayerNumber {
                    player_number: player,
                }
            }
            JoinOutcome::Spectator => {
                info!(%id, "Game already started, admitting spectator");
                ServerMessage::game_full()
            }
        };

        self.parties.insert(
            id,
            ConnectedParty {
                player: outcome.player(),
                sender,
            },
        );
        self.send_to(&id, greeting);
        self.send_to(&id, ServerMessage::LoadState(self.snapshot()));

        Ok(outcome)
    }

    /// Forget a connection's channel. Its player mapping is kept.
    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        match self.parties.remove(id) {
            Some(party) => {
                debug!(%id, player = ?party.player, "Party disconnected");
                true
            }
            None => false,
        }
    }

    /// Validate and apply a proposed line from a connection.
    ///
    /// Applied moves and duplicates broadcast `update_state`; rejections are
    /// silent.
    pub fn handle_new_line(&mut self, id: &ConnectionId, line: &NewLine) -> MoveOutcome {
        let proposed = line.to_proposed_move(self.player_of(id));
        let outcome = apply_move(&mut self.board, &proposed);

        match &outcome {
            MoveOutcome::Applied(applied) => {
                debug!(
                    %id,
                    completed = applied.completed.len(),
                    next_turn = %applied.next_turn,
                    "Line drawn"
                );
                if self.board.is_complete() {
                    info!(scores = ?self.board.scores(), "All cells claimed");
                }
            }
            MoveOutcome::Duplicate => {
                debug!(%id, "Duplicate line, re-syncing");
            }
            MoveOutcome::Rejected(reason) => {
                debug!(%id, %reason, "Line rejected");
            }
        }

        if outcome.should_broadcast() {
            self.broadcast(ServerMessage::UpdateState(self.snapshot()));
        }

        outcome
    }

    /// Send the current snapshot to one connection.
    pub fn request_state(&self, id: &ConnectionId) -> bool {
        self.send_to(id, ServerMessage::LoadState(self.snapshot()))
    }

    /// Queue a message for one connection. Returns whether it was queued.
    pub fn send_to(&self, id: &ConnectionId, message: ServerMessage) -> bool {
        match self.parties.get(id) {
            Some(party) => deliver(id, party, message),
            None => false,
        }
    }

    /// Queue a message for every connection. Returns how many accepted it.
    pub fn broadcast(&self, message: ServerMessage) -> usize {
        self.parties
            .iter()
            .filter(|(id, party)| deliver(id, party, message.clone()))
            .count()
    }
}

fn deliver(id: &ConnectionId, party: &ConnectedParty, message: ServerMessage) -> bool {
    match party.sender.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(%id, "Outbound queue full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(%id, "Outbound queue closed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Dot;
    use crate::game::engine::RejectReason;

    fn create_test_session() -> GameSession {
        GameSession::new(GridSize::default())
    }

    fn line(start: (u32, u32), end: (u32, u32)) -> NewLine {
        NewLine {
            player_number: None,
            start: Some(Dot::new(start.0, start.1)),
            end: Some(Dot::new(end.0, end.1)),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn join(
        session: &mut GameSession,
        token: &str,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(16);
        session.connect(id, Some(token), tx).unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_connect_greets_player() {
        let mut session = create_test_session();
        let (id, mut rx) = join(&mut session, "abc");

        let msgs = drain(&mut rx);
        assert_eq!(msgs.len(), 2);
        assert_eq!(
            msgs[0],
            ServerMessage::SetPlayerNumber {
                player_number: PlayerNumber::new(1)
            }
        );
        assert_eq!(msgs[1], ServerMessage::LoadState(session.snapshot()));
        assert_eq!(session.player_of(&id), Some(PlayerNumber::new(1)));
        assert_eq!(session.party_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_session_not_admitted() {
        let mut session = create_test_session();
        let (tx, mut rx) = mpsc::channel(16);

        let result = session.connect(Uuid::new_v4(), None, tx);
        assert_eq!(result, Err(JoinError::InvalidSession));
        assert_eq!(session.party_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_move_broadcasts_to_everyone() {
        let mut session = create_test_session();
        let (alice, mut alice_rx) = join(&mut session, "alice");
        let (_bob, mut bob_rx) = join(&mut session, "bob");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let outcome = session.handle_new_line(&alice, &line((0, 0), (0, 1)));
        assert!(outcome.is_applied());

        let expected = ServerMessage::UpdateState(session.snapshot());
        assert_eq!(drain(&mut alice_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut bob_rx), vec![expected]);
        assert_eq!(session.board().turn(), PlayerNumber::new(2));
    }

    #[tokio::test]
    async fn test_rejected_move_is_silent() {
        let mut session = create_test_session();
        let (alice, mut alice_rx) = join(&mut session, "alice");
        let (bob, mut bob_rx) = join(&mut session, "bob");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        // Out of turn
        let outcome = session.handle_new_line(&bob, &line((0, 0), (0, 1)));
        assert_eq!(outcome, MoveOutcome::Rejected(RejectReason::NotYourTurn));

        // Spoofed player number
        let spoofed = NewLine {
            player_number: Some(PlayerNumber::new(2)),
            ..line((0, 0), (0, 1))
        };
        assert!(!session.handle_new_line(&alice, &spoofed).is_applied());

        // Not adjacent
        assert!(!session.handle_new_line(&alice, &line((0, 0), (2, 0))).is_applied());

        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
        assert!(session.board().lines().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rebroadcasts_snapshot() {
        let mut session = create_test_session();
        let (alice, mut alice_rx) = join(&mut session, "alice");
        let (bob, mut bob_rx) = join(&mut session, "bob");

        session.handle_new_line(&alice, &line((0, 0), (0, 1)));
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let outcome = session.handle_new_line(&bob, &line((0, 1), (0, 0)));
        assert_eq!(outcome, MoveOutcome::Duplicate);
        assert_eq!(drain(&mut alice_rx).len(), 1);
        assert_eq!(drain(&mut bob_rx).len(), 1);
        assert_eq!(session.board().lines().len(), 1);
        assert_eq!(session.board().turn(), PlayerNumber::new(2));
    }

    #[tokio::test]
    async fn test_late_identity_is_spectator() {
        let mut session = create_test_session();
        let (alice, _alice_rx) = join(&mut session, "alice");
        join(&mut session, "bob");
        session.handle_new_line(&alice, &line((0, 0), (0, 1)));

        let (late, mut late_rx) = join(&mut session, "xyz");
        let msgs = drain(&mut late_rx);
        assert_eq!(msgs[0], ServerMessage::game_full());
        assert_eq!(msgs[1], ServerMessage::LoadState(session.snapshot()));
        assert_eq!(session.player_of(&late), None);

        // Spectator moves are rejected
        let before = session.snapshot();
        assert!(!session.handle_new_line(&late, &line((1, 0), (1, 1))).is_applied());
        assert_eq!(session.snapshot(), before);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_player_number() {
        let mut session = create_test_session();
        let (first, _rx) = join(&mut session, "abc");
        join(&mut session, "def");
        assert!(session.disconnect(&first));
        assert!(!session.disconnect(&first));

        let (second, mut rx) = join(&mut session, "abc");
        assert_eq!(session.player_of(&second), Some(PlayerNumber::new(1)));
        assert_eq!(
            drain(&mut rx)[0],
            ServerMessage::SetPlayerNumber {
                player_number: PlayerNumber::new(1)
            }
        );
        assert_eq!(session.board().player_count(), 2);
    }

    #[tokio::test]
    async fn test_request_state_only_to_requester() {
        let mut session = create_test_session();
        let (alice, mut alice_rx) = join(&mut session, "alice");
        let (_bob, mut bob_rx) = join(&mut session, "bob");
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        assert!(session.request_state(&alice));
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerMessage::LoadState(session.snapshot())]
        );
        assert!(drain(&mut bob_rx).is_empty());
        assert!(!session.request_state(&Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_slow_party_does_not_block() {
        let mut session = create_test_session();
        let (alice, mut alice_rx) = join(&mut session, "alice");

        // Bob's queue holds exactly the greeting and nothing more
        let bob = Uuid::new_v4();
        let (bob_tx, mut bob_rx) = mpsc::channel(2);
        session.connect(bob, Some("bob"), bob_tx).unwrap();

        // Dropped receiver
        let carol = Uuid::new_v4();
        let (carol_tx, carol_rx) = mpsc::channel(4);
        session.connect(carol, Some("carol"), carol_tx).unwrap();
        drop(carol_rx);

        drain(&mut alice_rx);
        let outcome = session.handle_new_line(&alice, &line((0, 0), (0, 1)));
        assert!(outcome.is_applied());

        assert_eq!(drain(&mut alice_rx).len(), 1);
        assert_eq!(drain(&mut bob_rx).len(), 2);
        assert_eq!(session.board().lines().len(), 1);
        assert_eq!(session.broadcast(ServerMessage::game_full()), 2);
    }
}

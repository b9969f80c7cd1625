//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Resolves the session identity from the handshake and routes messages
//! into the shared game session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use url::form_urlencoded;
use uuid::Uuid;

use crate::core::grid::{GridError, GridSize};
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::session::{ConnectionId, GameSession};

/// Query parameter carrying the session identity.
pub const SESSION_QUERY_KEY: &str = "sessionId";

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 64;

/// How long a closing connection may take to flush its queue.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// How long shutdown waits for connections to close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Board dimensions in dots.
    pub grid: GridSize,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Deadline for a new socket to complete the WebSocket handshake.
    pub connection_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            grid: GridSize::default(),
            max_connections: 1000,
            connection_timeout: Duration::from_secs(30),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// Grid dimensions rejected.
    #[error("Invalid grid: {0}")]
    Grid(#[from] GridError),
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `DOTS_BIND_ADDR`, `DOTS_ROWS`, `DOTS_COLS`,
    /// `DOTS_MAX_CONNECTIONS` and `DOTS_CONNECTION_TIMEOUT_SECS`. Unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = parse_var(&lookup, "DOTS_BIND_ADDR")?.unwrap_or(defaults.bind_addr);
        let rows = parse_var(&lookup, "DOTS_ROWS")?.unwrap_or(defaults.grid.rows());
        let cols = parse_var(&lookup, "DOTS_COLS")?.unwrap_or(defaults.grid.cols());
        let max_connections =
            parse_var(&lookup, "DOTS_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections);
        let connection_timeout = parse_var(&lookup, "DOTS_CONNECTION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.connection_timeout);

        Ok(Self {
            bind_addr,
            grid: GridSize::new(rows, cols)?,
            max_connections,
            connection_timeout,
            version: defaults.version,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Peer did not finish the handshake in time.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Bad configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The single game this server hosts.
    game: Arc<RwLock<GameSession>>,
    /// Open connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            game: Arc::new(RwLock::new(GameSession::new(config.grid))),
            config,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared game session.
    pub fn game(&self) -> Arc<RwLock<GameSession>> {
        self.game.clone()
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            addr = %listener.local_addr()?,
            rows = self.config.grid.rows(),
            cols = self.config.grid.cols(),
            "Game server listening"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connection_count() >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while self.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(open = self.connection_count(), "Connections still open after drain");
        }

        Ok(())
    }

    /// Spawn the task owning one WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let game = self.game.clone();
        let connections = self.connections.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handshake_timeout = self.config.connection_timeout;

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let result = serve_connection(stream, addr, game, handshake_timeout, shutdown_rx).await;
            if let Err(e) = result {
                error!("Connection {} failed: {}", addr, e);
            }
            connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get open connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game: Arc<RwLock<GameSession>>,
    handshake_timeout: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), GameServerError> {
    let mut session_token = None;
    let handshake = accept_hdr_async(stream, |req: &Request, response: Response| {
        session_token = session_token_from_query(req.uri().query());
        Ok::<Response, ErrorResponse>(response)
    });
    let mut ws_stream = tokio::time::timeout(handshake_timeout, handshake)
        .await
        .map_err(|_| GameServerError::HandshakeTimeout(handshake_timeout))??;

    let id: ConnectionId = Uuid::new_v4();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

    let joined = game
        .write()
        .await
        .connect(id, session_token.as_deref(), msg_tx);

    if let Err(e) = joined {
        info!("Rejecting {}: {}", addr, e);
        let text = ServerMessage::invalid_session()
            .to_json()
            .unwrap_or_default();
        ws_stream.send(Message::Text(text)).await?;
        ws_stream.close(None).await?;
        return Ok(());
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.close().await;
    });

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg = match ClientMessage::from_json(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                continue;
                            }
                        };

                        handle_client_message(id, client_msg, &game).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring binary frame from {}", addr);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", addr, e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_rx.recv() => {
                game.read().await.send_to(&id, ServerMessage::Shutdown {
                    reason: "Server shutting down".to_string(),
                });
                break;
            }
        }
    }

    // Cleanup; dropping the party's sender ends the writer
    game.write().await.disconnect(&id);
    if tokio::time::timeout(FLUSH_TIMEOUT, writer).await.is_err() {
        debug!("Writer for {} did not flush in time", addr);
    }

    info!("Client {} cleaned up", addr);
    Ok(())
}

async fn handle_client_message(
    id: ConnectionId,
    msg: ClientMessage,
    game: &Arc<RwLock<GameSession>>,
) {
    match msg {
        ClientMessage::NewLine(line) => {
            game.write().await.handle_new_line(&id, &line);
        }
        ClientMessage::RequestState => {
            game.read().await.request_state(&id);
        }
        ClientMessage::Ping { timestamp } => {
            let pong = ServerMessage::Pong {
                timestamp,
                server_time: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            };
            if !game.read().await.send_to(&id, pong) {
                debug!(%id, "Pong not delivered");
            }
        }
    }
}

/// Extract the session identity from a handshake query string.
///
/// Values are form-decoded, so `%20` and `+` both read as a space.
pub fn session_token_from_query(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == SESSION_QUERY_KEY)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.grid.rows(), 5);
        assert_eq!(config.grid.cols(), 5);
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DOTS_BIND_ADDR", "127.0.0.1:9000"),
            ("DOTS_ROWS", "3"),
            ("DOTS_COLS", " 4 "),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.grid, GridSize::new(3, 4).unwrap());
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));

        let config =
            ServerConfig::from_lookup(lookup(&[("DOTS_CONNECTION_TIMEOUT_SECS", "5")])).unwrap();
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let err = ServerConfig::from_lookup(lookup(&[("DOTS_ROWS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DOTS_ROWS", .. }));

        let err = ServerConfig::from_lookup(lookup(&[("DOTS_COLS", "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Grid(_)));

        let err =
            ServerConfig::from_lookup(lookup(&[("DOTS_BIND_ADDR", "nowhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_session_token_from_query() {
        assert_eq!(
            session_token_from_query(Some("sessionId=abc")),
            Some("abc".to_string())
        );
        assert_eq!(
            session_token_from_query(Some("foo=1&sessionId=xyz&bar")),
            Some("xyz".to_string())
        );
        assert_eq!(
            session_token_from_query(Some("sessionId=")),
            Some(String::new())
        );
        assert_eq!(session_token_from_query(Some("session=abc")), None);
        assert_eq!(
            session_token_from_query(Some("sessionId=a%20b")),
            Some("a b".to_string())
        );
        assert_eq!(
            session_token_from_query(Some("sessionId=a+b")),
            Some("a b".to_string())
        );
        assert_eq!(
            session_token_from_query(Some("sessionId=caf%C3%A9%26co")),
            Some("café&co".to_string())
        );
        assert_eq!(session_token_from_query(None), None);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.game().read().await.party_count(), 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = Arc::new(GameServer::new(ServerConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let running = server.clone();
        let handle = tokio::spawn(async move { running.serve(listener).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        server.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_handshake_frees_slot() {
        use tokio::io::AsyncReadExt;

        let config = ServerConfig {
            max_connections: 1,
            connection_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let server = Arc::new(GameServer::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });

        // Connect but never send the upgrade request
        let mut silent = TcpStream::connect(addr).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.connection_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), silent.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        server.shutdown();
    }
}

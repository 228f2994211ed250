//! WebSocket relay backend with room-based document routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐                          ┌──► Client B
//!             ├── Room (document id) ────┤
//! Client C ──┘     RoomRegistry         └──► Client C
//!
//! RelayHandle ──► file:change ──► connections watching the path
//!             └─► drop_connections ──► every live socket closed
//! ```
//!
//! The relay keeps no document state: content changes, cursors and
//! selections are forwarded to the other members of the sender's room with the
//! sender's id attached. Versions are relayed untouched.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::{Member, MemberSender, RoomRegistry};
use crate::protocol::{ClientMessage, FileChangeEvent, ParticipantDescriptor, ServerMessage};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Display name for participants that join without one.
pub const ANONYMOUS: &str = "Anonymous";

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub malformed_messages: u64,
    pub active_rooms: usize,
    pub file_notifications: u64,
}

/// Path subscriptions of one connection.
struct Watcher {
    paths: HashSet<String>,
    sender: MemberSender,
}

impl Watcher {
    fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|watched| {
            path == watched
                || path
                    .strip_prefix(watched.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// State shared by every connection task.
struct RelayState {
    rooms: RoomRegistry,
    watchers: RwLock<HashMap<Uuid, Watcher>>,
    stats: RwLock<RelayStats>,
    kick: broadcast::Sender<()>,
}

/// Per-connection session on the relay side.
struct Peer {
    id: Uuid,
    name: String,
    document: Option<String>,
    sender: MemberSender,
}

impl Peer {
    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

/// Cloneable control handle for a running relay.
#[derive(Clone)]
pub struct RelayHandle {
    state: Arc<RelayState>,
}

impl RelayHandle {
    /// Deliver `file:change` to every connection watching the path (or a parent
    /// directory of it). Returns the number of connections notified.
    pub async fn notify_file_change(&self, event: FileChangeEvent) -> usize {
        let watchers = self.state.watchers.read().await;
        let mut delivered = 0;
        for watcher in watchers.values().filter(|w| w.matches(&event.path)) {
            if watcher.sender.send(ServerMessage::FileChange(event.clone())).is_ok() {
                delivered += 1;
            }
        }
        drop(watchers);

        self.state.stats.write().await.file_notifications += delivered as u64;
        log::debug!("file:change {} delivered to {delivered} watchers", event.path);
        delivered
    }

    /// Close every live connection. Returns how many were told to close.
    pub fn drop_connections(&self) -> usize {
        let count = self.state.kick.send(()).unwrap_or(0);
        log::info!("Dropping {count} connections");
        count
    }

    /// Participants currently in the room of `document_id`.
    pub async fn room_members(&self, document_id: &str) -> usize {
        self.state.rooms.member_count(document_id).await
    }

    pub async fn stats(&self) -> RelayStats {
        let mut stats = self.state.stats.read().await.clone();
        stats.active_rooms = self.state.rooms.room_count().await;
        stats
    }
}

/// The relay server.
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Bind the listener. Port 0 picks a free port; see [`local_addr`](Self::local_addr).
    pub async fn bind(config: RelayConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (kick, _) = broadcast::channel(16);

        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(RelayState {
                rooms: RoomRegistry::new(),
                watchers: RwLock::new(HashMap::new()),
                stats: RwLock::new(RelayStats::default()),
                kick,
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL clients should connect to.
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            state: self.state.clone(),
        }
    }

    /// Accept WebSocket connections until the listener fails.
    pub async fn run(self) -> Result<(), BoxError> {
        log::info!("Relay listening on {}", self.local_addr);

        loop {
            let (stream, addr) = self.listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, state).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        state: Arc<RelayState>,
    ) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut peer = Peer {
            id: Uuid::new_v4(),
            name: ANONYMOUS.to_string(),
            document: None,
            sender: tx.clone(),
        };

        log::info!("WebSocket connection established from {addr} as {}", peer.id);
        {
            let mut s = state.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }
        state.watchers.write().await.insert(
            peer.id,
            Watcher {
                paths: HashSet::new(),
                sender: tx,
            },
        );

        let result = Self::serve(ws_stream, rx, &state, &mut peer).await;

        // Cleanup runs however the socket ended.
        Self::leave_document(&state, &mut peer).await;
        state.watchers.write().await.remove(&peer.id);
        state.stats.write().await.active_connections -= 1;
        log::info!("Connection {} from {addr} closed", peer.id);

        result
    }

    async fn serve(
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        mut rx: mpsc::UnboundedReceiver<ServerMessage>,
        state: &RelayState,
        peer: &mut Peer,
    ) -> Result<(), BoxError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut kick = state.kick.subscribe();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            state.stats.write().await.total_messages += 1;
                            match ClientMessage::decode(text.as_str()) {
                                Ok(client_msg) => Self::dispatch(state, peer, client_msg).await,
                                Err(e) => {
                                    log::warn!("Failed to decode message from {}: {e}", peer.id);
                                    state.stats.write().await.malformed_messages += 1;
                                    let _ = peer.sender.send(ServerMessage::Error {
                                        message: e.to_string(),
                                    });
                                }
                            }
                        }

                        Some(Ok(Message::Binary(_))) => {
                            state.stats.write().await.malformed_messages += 1;
                            let _ = peer.sender.send(ServerMessage::Error {
                                message: "binary frames are not supported".to_string(),
                            });
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Ok(Message::Close(_))) | None => return Ok(()),

                        Some(Err(e)) => {
                            log::warn!("WebSocket error from {}: {e}", peer.id);
                            return Ok(());
                        }

                        _ => {}
                    }
                }

                outgoing = rx.recv() => {
                    let Some(msg) = outgoing else { return Ok(()) };
                    let text = msg.encode()?;
                    ws_sender.send(Message::Text(text.into())).await?;
                }

                _ = kick.recv() => {
                    log::debug!("Closing connection {} on request", peer.id);
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch(state: &RelayState, peer: &mut Peer, msg: ClientMessage) {
        log::trace!("{} <- {}", peer.id, msg.event_name());
        match msg {
            ClientMessage::DocumentJoin { document_id, name } => {
                Self::leave_document(state, peer).await;
                if let Some(name) = name {
                    peer.name = name;
                }

                let member = Member::new(peer.id, peer.name.clone(), peer.sender.clone());
                let existing = state.rooms.join(&document_id, member).await;
                for descriptor in existing {
                    let _ = peer.sender.send(ServerMessage::UserJoined(descriptor));
                }

                let joined =
                    ServerMessage::UserJoined(ParticipantDescriptor::new(peer.id_string(), peer.name.clone()));
                state.rooms.broadcast(&document_id, Some(peer.id), &joined).await;
                log::info!("Peer {} ({}) joined {document_id}", peer.name, peer.id);
                peer.document = Some(document_id);
            }

            ClientMessage::DocumentLeave { document_id } => {
                if peer.document.as_deref() == Some(document_id.as_str()) {
                    Self::leave_document(state, peer).await;
                }
            }

            ClientMessage::CursorMove { document_id, position } => {
                let relayed = ServerMessage::CursorMove {
                    user_id: peer.id_string(),
                    document_id: Some(document_id.clone()),
                    position,
                };
                Self::relay(state, peer, &document_id, &relayed).await;
            }

            ClientMessage::SelectionChange { document_id, selection } => {
                let relayed = ServerMessage::SelectionChange {
                    user_id: peer.id_string(),
                    document_id: Some(document_id.clone()),
                    selection,
                };
                Self::relay(state, peer, &document_id, &relayed).await;
            }

            ClientMessage::ContentChange { document_id, changes, version } => {
                let relayed = ServerMessage::ContentChange {
                    user_id: Some(peer.id_string()),
                    document_id: Some(document_id.clone()),
                    changes,
                    version,
                };
                Self::relay(state, peer, &document_id, &relayed).await;
            }

            ClientMessage::Watch { path } => {
                if let Some(watcher) = state.watchers.write().await.get_mut(&peer.id) {
                    log::debug!("{} watching {path}", peer.id);
                    watcher.paths.insert(path);
                }
            }

            ClientMessage::Unwatch { path } => {
                if let Some(watcher) = state.watchers.write().await.get_mut(&peer.id) {
                    watcher.paths.remove(&path);
                }
            }
        }
    }

    /// Forward to the other members of `document_id` if the sender is in it.
    async fn relay(state: &RelayState, peer: &Peer, document_id: &str, msg: &ServerMessage) {
        if peer.document.as_deref() != Some(document_id) {
            log::debug!("{} sent an event for {document_id} without joining it", peer.id);
            return;
        }
        state.rooms.broadcast(document_id, Some(peer.id), msg).await;
    }

    async fn leave_document(state: &RelayState, peer: &mut Peer) {
        let Some(document_id) = peer.document.take() else {
            return;
        };
        if state.rooms.leave(&document_id, peer.id).await {
            let left = ServerMessage::UserLeft {
                user_id: peer.id_string(),
            };
            state.rooms.broadcast(&document_id, Some(peer.id), &left).await;
            log::info!("Peer {} left {document_id}", peer.id);
        }
    }
}

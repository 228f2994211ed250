//! Document session controller: the façade the editor integration talks to.
//!
//! The controller owns the connection, the presence registry, the file-watch
//! bridge and at most one [`DocumentSession`]. All state changes happen in
//! `&mut self` methods, one event at a time:
//!
//! ```text
//!  host calls ──► join / leave / update_cursor / apply_local_changes / watch
//!                                   │
//!                                   ▼
//!                          SessionController ──► ConnectionManager ──► link driver
//!                                   ▲
//!  host loop ◄── SessionEvent ◄─────┘◄── handle_transport_event ◄── TransportEvent FIFO
//! ```
//!
//! Nothing here waits for a reply from the backend. Sends are queued on the
//! link; edits made while the link is down are buffered per session and
//! replayed once the link is back.

use std::collections::VecDeque;

use crate::connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionSignal, ConnectionState,
    TransportEvent,
};
use crate::presence::{default_palette, Participant, PresenceRegistry};
use crate::protocol::{
    ClientMessage, ContentChange, CursorPosition, FileChangeEvent, Selection, ServerMessage,
};
use crate::versioning::{ChangePipeline, OutgoingChange};
use crate::watch::FileWatchBridge;

/// Errors reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a live channel and there is none.
    #[error("not connected to collaboration server")]
    NotConnected,
    /// The backend reported an error.
    #[error("collaboration server error: {0}")]
    Remote(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    /// Display name sent with every join
    pub display_name: Option<String>,
    /// Colors handed to remote participants
    pub palette: Vec<String>,
    /// Ignore local cursor, selection and content events from the editor
    pub read_only: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            display_name: None,
            palette: default_palette(),
            read_only: false,
        }
    }
}

/// Notifications for the editing widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectionChanged(bool),
    ParticipantJoined(Participant),
    ParticipantLeft(String),
    RemoteCursor {
        participant_id: String,
        position: CursorPosition,
        color: String,
    },
    RemoteSelection {
        participant_id: String,
        selection: Selection,
        color: String,
    },
    /// An accepted remote mutation to apply to the visible buffer.
    RemoteContent {
        changes: Vec<ContentChange>,
        version: u64,
    },
    /// Presence was cleared on rejoin; the backend re-announces participants.
    PresenceReset,
    FileChanged(FileChangeEvent),
    Error(SessionError),
}

/// Local membership in one document.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    document_id: String,
    pipeline: ChangePipeline,
}

impl DocumentSession {
    fn new(document_id: String) -> Self {
        Self {
            document_id,
            pipeline: ChangePipeline::new(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn version(&self) -> u64 {
        self.pipeline.version()
    }

    pub fn pending_changes(&self) -> usize {
        self.pipeline.pending().len()
    }
}

/// Coordinates connection, presence, versioning and file watches.
pub struct SessionController {
    config: SessionConfig,
    connection: ConnectionManager,
    presence: PresenceRegistry,
    watches: FileWatchBridge,
    session: Option<DocumentSession>,
    notifications: VecDeque<SessionEvent>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            connection: ConnectionManager::new(config.connection.clone()),
            presence: PresenceRegistry::with_palette(config.palette.clone()),
            watches: FileWatchBridge::new(),
            session: None,
            notifications: VecDeque::new(),
            config,
        }
    }

    // ── Connection ──────────────────────────────────────────────

    /// Start connecting to `address` (e.g. `ws://localhost:3001`).
    ///
    /// No-op when a link is already active. Progress is reported through
    /// [`SessionEvent::ConnectionChanged`] and [`SessionEvent::Error`].
    pub fn connect(&mut self, address: &str) -> Result<(), SessionError> {
        self.connection.connect(address)?;
        Ok(())
    }

    /// Terminate the channel. Tracked watches are forgotten; an active document
    /// session is kept and its edits keep buffering.
    pub fn disconnect(&mut self) {
        self.watches.clear();
        if self.connection.disconnect() {
            self.notify(SessionEvent::ConnectionChanged(false));
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    // ── Document session ────────────────────────────────────────

    /// Join `document_id`, leaving the current document first.
    ///
    /// Fails with [`SessionError::NotConnected`] when the channel is down; the
    /// join is not queued.
    pub fn join(&mut self, document_id: impl Into<String>) -> Result<(), SessionError> {
        let document_id = document_id.into();
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if self.session.is_some() {
            self.leave();
        }

        self.connection.send(self.join_message(&document_id))?;
        log::info!("Joined document {document_id}");
        self.session = Some(DocumentSession::new(document_id));
        self.presence.clear();
        Ok(())
    }

    /// Leave the active document. Safe to call repeatedly.
    pub fn leave(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if self.connection.is_connected() {
            let leave = ClientMessage::DocumentLeave {
                document_id: session.document_id.clone(),
            };
            if let Err(e) = self.connection.send(leave) {
                log::warn!("Failed to send leave for {}: {e}", session.document_id);
            }
        }
        let discarded = session.pending_changes();
        if discarded > 0 {
            log::info!(
                "Discarding {discarded} pending changes for {}",
                session.document_id
            );
        }
        log::info!("Left document {}", session.document_id);
        self.presence.clear();
    }

    pub fn session(&self) -> Option<&DocumentSession> {
        self.session.as_ref()
    }

    pub fn document_id(&self) -> Option<&str> {
        self.session.as_ref().map(DocumentSession::document_id)
    }

    // ── Outgoing presence and edits ─────────────────────────────

    /// Broadcast the local cursor. Dropped when offline or outside a session.
    pub fn update_cursor(&mut self, position: CursorPosition) {
        let Some(document_id) = self.live_document() else {
            log::trace!("Dropping cursor update: no live session");
            return;
        };
        let msg = ClientMessage::CursorMove { document_id, position };
        if let Err(e) = self.connection.send(msg) {
            log::debug!("Cursor update not sent: {e}");
        }
    }

    /// Broadcast the local selection. Dropped when offline or outside a session.
    pub fn update_selection(&mut self, selection: Selection) {
        let Some(document_id) = self.live_document() else {
            log::trace!("Dropping selection update: no live session");
            return;
        };
        let msg = ClientMessage::SelectionChange { document_id, selection };
        if let Err(e) = self.connection.send(msg) {
            log::debug!("Selection update not sent: {e}");
        }
    }

    /// Send one local mutation, or buffer it while the channel is down.
    pub fn apply_local_changes(&mut self, changes: Vec<ContentChange>) {
        if changes.is_empty() {
            return;
        }
        let connected = self.connection.is_connected();
        let Some(session) = self.session.as_mut() else {
            log::warn!("Dropping {} local changes: no document joined", changes.len());
            return;
        };

        if connected {
            let outgoing = session.pipeline.stamp(changes);
            transmit(&self.connection, &session.document_id, outgoing);
        } else {
            session.pipeline.defer(changes);
            log::debug!(
                "Buffered change for {} ({} pending)",
                session.document_id,
                session.pipeline.pending().len()
            );
        }
    }

    /// Current local version of the active document.
    pub fn version(&self) -> Option<u64> {
        self.session.as_ref().map(DocumentSession::version)
    }

    /// Mutations waiting for the channel.
    pub fn pending_changes(&self) -> usize {
        self.session.as_ref().map_or(0, DocumentSession::pending_changes)
    }

    // ── Presence ────────────────────────────────────────────────

    /// Remote participants of the active document, in join order.
    pub fn participants(&self) -> &[Participant] {
        self.presence.list()
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    // ── File watches ────────────────────────────────────────────

    pub fn watch(&mut self, path: &str) -> Result<(), SessionError> {
        self.watches.watch(&self.connection, path)
    }

    pub fn unwatch(&mut self, path: &str) -> Result<(), SessionError> {
        self.watches.unwatch(&self.connection, path)
    }

    pub fn watches(&self) -> &FileWatchBridge {
        &self.watches
    }

    // ── Event delivery ──────────────────────────────────────────

    /// Wait for the next notification, pulling transport events as needed.
    ///
    /// Returns `None` once no link is active and every queued notification
    /// has been delivered. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.notifications.pop_front() {
                return Some(event);
            }
            let transport_event = self.connection.recv().await?;
            self.handle_transport_event(transport_event);
        }
    }

    /// Take every queued notification.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.notifications.drain(..).collect()
    }

    /// Apply one transport event to session state.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match self.connection.handle(event) {
            ConnectionSignal::Up => self.on_connected(),
            ConnectionSignal::Down => self.notify(SessionEvent::ConnectionChanged(false)),
            ConnectionSignal::Frame(msg) => self.on_message(msg),
            ConnectionSignal::Malformed(err) => {
                log::warn!("Dropping malformed frame: {err}");
            }
            ConnectionSignal::Error(err) => self.notify(SessionEvent::Error(err.into())),
            ConnectionSignal::Terminal(err) => {
                self.notify(SessionEvent::Error(err.into()));
            }
        }
    }

    // ── Teardown ────────────────────────────────────────────────

    /// Leave, disconnect and drop pending notifications. Safe from any state.
    pub fn dispose(&mut self) {
        self.leave();
        self.watches.clear();
        self.connection.disconnect();
        self.notifications.clear();
        self.presence.clear();
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Internals ───────────────────────────────────────────────

    fn notify(&mut self, event: SessionEvent) {
        self.notifications.push_back(event);
    }

    fn join_message(&self, document_id: &str) -> ClientMessage {
        ClientMessage::DocumentJoin {
            document_id: document_id.to_string(),
            name: self.config.display_name.clone(),
        }
    }

    /// Document id when both a session and a live channel exist.
    fn live_document(&self) -> Option<String> {
        if !self.connection.is_connected() {
            return None;
        }
        self.session.as_ref().map(|s| s.document_id.clone())
    }

    fn on_connected(&mut self) {
        self.notify(SessionEvent::ConnectionChanged(true));

        if let Some(document_id) = self.document_id().map(str::to_string) {
            match self.connection.send(self.join_message(&document_id)) {
                Ok(()) => log::info!("Rejoined document {document_id}"),
                Err(e) => log::warn!("Failed to rejoin {document_id}: {e}"),
            }
            if !self.presence.is_empty() {
                self.presence.clear();
                self.notify(SessionEvent::PresenceReset);
            }
        }

        if let Some(session) = self.session.as_mut() {
            let drained = session.pipeline.drain_pending();
            if !drained.is_empty() {
                log::info!("Replaying {} buffered changes", drained.len());
            }
            for outgoing in drained {
                transmit(&self.connection, &session.document_id, outgoing);
            }
        }

        self.watches.resubscribe(&self.connection);
    }

    fn on_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::UserJoined(descriptor) => {
                if self.session.is_none() {
                    log::debug!("Ignoring join of {} outside a session", descriptor.id);
                    return;
                }
                let participant = self.presence.on_participant_joined(descriptor).clone();
                log::info!("{} joined", participant.name);
                self.notify(SessionEvent::ParticipantJoined(participant));
            }

            ServerMessage::UserLeft { user_id } => {
                if self.presence.on_participant_left(&user_id).is_some() {
                    self.notify(SessionEvent::ParticipantLeft(user_id));
                }
            }

            ServerMessage::CursorMove { user_id, document_id, position } => {
                if !self.is_current(document_id.as_deref()) {
                    return;
                }
                if let Some(participant) = self.presence.on_cursor_moved(&user_id, position) {
                    let color = participant.color.clone();
                    self.notify(SessionEvent::RemoteCursor {
                        participant_id: user_id,
                        position,
                        color,
                    });
                }
            }

            ServerMessage::SelectionChange { user_id, document_id, selection } => {
                if !self.is_current(document_id.as_deref()) {
                    return;
                }
                if let Some(participant) = self.presence.on_selection_changed(&user_id, selection) {
                    let color = participant.color.clone();
                    self.notify(SessionEvent::RemoteSelection {
                        participant_id: user_id,
                        selection,
                        color,
                    });
                }
            }

            ServerMessage::ContentChange { document_id, changes, version, .. } => {
                if !self.is_current(document_id.as_deref()) {
                    return;
                }
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.pipeline.accept_incoming(version) {
                    self.notify(SessionEvent::RemoteContent { changes, version });
                } else {
                    log::debug!(
                        "Discarding stale change v{version} (local v{})",
                        session.pipeline.version()
                    );
                }
            }

            ServerMessage::FileChange(event) => {
                self.notify(SessionEvent::FileChanged(event));
            }

            ServerMessage::Error { message } => {
                log::warn!("Server error: {message}");
                self.notify(SessionEvent::Error(SessionError::Remote(message)));
            }
        }
    }

    /// Whether an event tagged with `document_id` belongs to the active session.
    fn is_current(&self, document_id: Option<&str>) -> bool {
        match (&self.session, document_id) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(session), Some(id)) if session.document_id == id => true,
            (Some(session), Some(id)) => {
                log::debug!("Ignoring event for {id} while in {}", session.document_id);
                false
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn transmit(connection: &ConnectionManager, document_id: &str, outgoing: OutgoingChange) {
    let msg = ClientMessage::ContentChange {
        document_id: document_id.to_string(),
        changes: outgoing.changes,
        version: outgoing.version,
    };
    if let Err(e) = connection.send(msg) {
        log::warn!("Change v{} for {document_id} not sent: {e}", outgoing.version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbox;
    use crate::protocol::ParticipantDescriptor;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn open(controller: &mut SessionController) -> UnboundedReceiver<ClientMessage> {
        let (outbox, rx) = Outbox::channel();
        controller.handle_transport_event(TransportEvent::Opened(outbox));
        rx
    }

    fn sent(rx: &mut UnboundedReceiver<ClientMessage>) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn edit(text: &str) -> Vec<ContentChange> {
        vec![ContentChange::insert(CursorPosition::new(1, 1), 0, text)]
    }

    #[test]
    fn test_connected_notification() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        assert!(controller.is_connected());
        assert_eq!(controller.take_events(), vec![SessionEvent::ConnectionChanged(true)]);
    }

    #[test]
    fn test_join_sends_display_name() {
        let config = SessionConfig {
            display_name: Some("Alice".into()),
            ..SessionConfig::default()
        };
        let mut controller = SessionController::new(config);
        let mut rx = open(&mut controller);

        controller.join("doc-1").unwrap();
        assert_eq!(
            sent(&mut rx),
            vec![ClientMessage::DocumentJoin {
                document_id: "doc-1".into(),
                name: Some("Alice".into()),
            }]
        );
        assert_eq!(controller.document_id(), Some("doc-1"));
        assert_eq!(controller.version(), Some(0));
    }

    #[test]
    fn test_join_switches_documents() {
        let mut controller = SessionController::new(SessionConfig::default());
        let mut rx = open(&mut controller);
        controller.join("doc-1").unwrap();
        controller.apply_local_changes(edit("a"));
        sent(&mut rx);

        controller.join("doc-2").unwrap();
        let messages = sent(&mut rx);
        assert_eq!(messages[0], ClientMessage::DocumentLeave { document_id: "doc-1".into() });
        assert!(matches!(
            &messages[1],
            ClientMessage::DocumentJoin { document_id, .. } if document_id == "doc-2"
        ));
        assert_eq!(controller.version(), Some(0));
    }

    #[test]
    fn test_leave_without_session_is_noop() {
        let mut controller = SessionController::new(SessionConfig::default());
        let mut rx = open(&mut controller);
        controller.leave();
        controller.leave();
        assert!(sent(&mut rx).is_empty());
    }

    #[test]
    fn test_leave_while_disconnected_tears_down_locally() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.join("doc-1").unwrap();
        controller.handle_transport_event(TransportEvent::Closed { reason: None });
        controller.apply_local_changes(edit("lost"));
        assert_eq!(controller.pending_changes(), 1);

        controller.leave();
        assert!(controller.session().is_none());
        assert_eq!(controller.pending_changes(), 0);
    }

    #[test]
    fn test_changes_without_session_are_dropped() {
        let mut controller = SessionController::new(SessionConfig::default());
        let mut rx = open(&mut controller);
        controller.apply_local_changes(edit("x"));
        assert!(sent(&mut rx).is_empty());
        assert_eq!(controller.pending_changes(), 0);
    }

    #[test]
    fn test_remote_presence_flow() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.join("doc-1").unwrap();
        controller.take_events();

        let frames = vec![
            ServerMessage::UserJoined(ParticipantDescriptor::new("u-1", "Bob")),
            ServerMessage::CursorMove {
                user_id: "u-1".into(),
                document_id: Some("doc-1".into()),
                position: CursorPosition::new(2, 3),
            },
            ServerMessage::CursorMove {
                user_id: "u-1".into(),
                document_id: Some("other".into()),
                position: CursorPosition::new(9, 9),
            },
            ServerMessage::CursorMove {
                user_id: "ghost".into(),
                document_id: None,
                position: CursorPosition::new(1, 1),
            },
            ServerMessage::UserLeft { user_id: "u-1".into() },
        ];
        for frame in frames {
            controller.handle_transport_event(TransportEvent::Frame(frame));
        }

        let events = controller.take_events();
        assert_eq!(events.len(), 3);
        match &events[0] {
            SessionEvent::ParticipantJoined(p) => {
                assert_eq!(p.name, "Bob");
                assert_eq!(p.color, "#FF0000");
            }
            other => panic!("Expected ParticipantJoined, got {other:?}"),
        }
        assert_eq!(
            events[1],
            SessionEvent::RemoteCursor {
                participant_id: "u-1".into(),
                position: CursorPosition::new(2, 3),
                color: "#FF0000".into(),
            }
        );
        assert_eq!(events[2], SessionEvent::ParticipantLeft("u-1".into()));
        assert!(controller.participants().is_empty());
    }

    #[test]
    fn test_remote_selection_carries_color() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.join("doc-1").unwrap();
        controller.take_events();

        let selection = Selection::new(CursorPosition::new(1, 1), CursorPosition::new(1, 8));
        controller.handle_transport_event(TransportEvent::Frame(ServerMessage::UserJoined(
            ParticipantDescriptor::new("u-1", "Bob"),
        )));
        controller.handle_transport_event(TransportEvent::Frame(ServerMessage::SelectionChange {
            user_id: "u-1".into(),
            document_id: None,
            selection,
        }));

        let events = controller.take_events();
        assert_eq!(
            events.last(),
            Some(&SessionEvent::RemoteSelection {
                participant_id: "u-1".into(),
                selection,
                color: "#FF0000".into(),
            })
        );
        assert_eq!(controller.participants()[0].selection, Some(selection));
    }

    #[test]
    fn test_user_joined_outside_session_ignored() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.take_events();
        controller.handle_transport_event(TransportEvent::Frame(ServerMessage::UserJoined(
            ParticipantDescriptor::new("u-1", "Bob"),
        )));
        assert!(controller.participants().is_empty());
        assert!(controller.take_events().is_empty());
    }

    #[test]
    fn test_server_error_surfaces() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.take_events();
        controller.handle_transport_event(TransportEvent::Frame(ServerMessage::Error {
            message: "document locked".into(),
        }));
        assert_eq!(
            controller.take_events(),
            vec![SessionEvent::Error(SessionError::Remote("document locked".into()))]
        );
    }

    #[test]
    fn test_malformed_frame_keeps_session() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.join("doc-1").unwrap();
        controller.take_events();

        controller.handle_transport_event(TransportEvent::Malformed(
            crate::protocol::ProtocolError::DeserializationError("bad".into()),
        ));
        assert!(controller.take_events().is_empty());
        assert_eq!(controller.document_id(), Some("doc-1"));
        assert!(controller.is_connected());
    }

    #[test]
    fn test_failed_attempt_and_give_up_are_reported() {
        let mut controller = SessionController::new(SessionConfig::default());
        controller.handle_transport_event(TransportEvent::Failed {
            attempt: 1,
            reason: "refused".into(),
        });
        controller.handle_transport_event(TransportEvent::GaveUp { attempts: 6 });
        let events = controller.take_events();
        assert_eq!(
            events,
            vec![
                SessionEvent::Error(SessionError::Connection(ConnectionError::AttemptFailed {
                    attempt: 1,
                    reason: "refused".into(),
                })),
                SessionEvent::Error(SessionError::Connection(ConnectionError::ReconnectFailed {
                    attempts: 6,
                })),
            ]
        );
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_notifies_and_forgets_watches() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.watch("a.rs").unwrap();
        controller.take_events();

        controller.disconnect();
        assert_eq!(controller.take_events(), vec![SessionEvent::ConnectionChanged(false)]);
        assert!(controller.watches().is_empty());
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_file_change_is_forwarded() {
        let mut controller = SessionController::new(SessionConfig::default());
        let _rx = open(&mut controller);
        controller.take_events();

        let event = FileChangeEvent {
            kind: crate::protocol::FileChangeKind::Update,
            path: "a.rs".into(),
            content: Some("fn main() {}".into()),
        };
        controller.handle_transport_event(TransportEvent::Frame(ServerMessage::FileChange(
            event.clone(),
        )));
        assert_eq!(controller.take_events(), vec![SessionEvent::FileChanged(event)]);
    }

    #[test]
    fn test_dispose_from_any_state() {
        let mut fresh = SessionController::new(SessionConfig::default());
        fresh.dispose();
        fresh.dispose();

        let mut controller = SessionController::new(SessionConfig::default());
        let mut rx = open(&mut controller);
        controller.join("doc-1").unwrap();
        controller.handle_transport_event(TransportEvent::Frame(ServerMessage::UserJoined(
            ParticipantDescriptor::new("u-1", "Bob"),
        )));
        sent(&mut rx);

        controller.dispose();
        assert_eq!(
            sent(&mut rx),
            vec![ClientMessage::DocumentLeave { document_id: "doc-1".into() }]
        );
        assert!(controller.session().is_none());
        assert!(controller.participants().is_empty());
        assert!(controller.take_events().is_empty());
        assert_eq!(controller.connection_state(), ConnectionState::Disconnected);
    }
}

//! # scribe-collab - collaborative document session core
//!
//! Keeps one shared text document consistent across participants connected
//! to a collaboration backend over a WebSocket: content changes, cursor and
//! selection presence, and recovery from transient network loss.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  EditorEvent   ┌───────────────────┐
//! │ editing widget│ ─────────────► │ SessionController │ ◄── host: join / leave / watch
//! │               │ ◄───────────── │                   │
//! └───────────────┘  SessionEvent  └─────────┬─────────┘
//!                                            │
//!              ┌──────────────┬──────────────┼──────────────┐
//!              ▼              ▼              ▼              ▼
//!      ┌──────────────┐ ┌───────────┐ ┌─────────────┐ ┌───────────────┐
//!      │PresenceRegis.│ │ChangePipe.│ │FileWatchBrid│ │ConnectionMgr  │
//!      │ (colors)     │ │ (versions)│ │ (re-watch)  │ │ (link driver) │
//!      └──────────────┘ └───────────┘ └─────────────┘ └───────┬───────┘
//!                                                             │ JSON text frames
//!                                                             ▼
//!                                                     ┌───────────────┐
//!                                                     │ RelayServer   │
//!                                                     │ (RoomRegistry)│
//!                                                     └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - wire messages (`{"event", "data"}` JSON frames)
//! - [`connection`] - channel lifecycle, reconnect backoff, heartbeat
//! - [`presence`] - remote participants and color assignment
//! - [`versioning`] - version counter, stale rejection, offline buffer
//! - [`session`] - the controller the host talks to
//! - [`watch`] - file-change subscriptions
//! - [`editor`] - editing-widget event routing and read-only mode
//! - [`broadcast`] - room fan-out for the relay
//! - [`server`] - development relay backend

pub mod protocol;
pub mod connection;
pub mod presence;
pub mod versioning;
pub mod session;
pub mod watch;
pub mod editor;
pub mod broadcast;
pub mod server;

// Re-exports for convenience
pub use protocol::{
    ClientMessage, ContentChange, CursorPosition, FileChangeEvent, FileChangeKind,
    ParticipantDescriptor, ProtocolError, Selection, ServerMessage, TextRange,
};
pub use connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionSignal, ConnectionState,
    Outbox, TransportEvent,
};
pub use presence::{Participant, PresenceRegistry, DEFAULT_PALETTE};
pub use versioning::{ChangePipeline, OutgoingChange, PendingChangeBuffer};
pub use session::{DocumentSession, SessionConfig, SessionController, SessionError, SessionEvent};
pub use watch::FileWatchBridge;
pub use editor::{EditorEvent, EditorOutcome};
pub use broadcast::{BroadcastStats, Member, RoomRegistry};
pub use server::{RelayConfig, RelayHandle, RelayServer, RelayStats};

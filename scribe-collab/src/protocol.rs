//! JSON wire protocol spoken between session controllers and the relay.
//!
//! Every frame is a WebSocket text message carrying one event:
//! ```text
//! {"event": "content:change", "data": {"documentId": "doc-1", "changes": [...], "version": 7}}
//! ```
//!
//! Positions are 1-based (line, column), matching the editing widget.

use serde::{Deserialize, Serialize};

/// Caret position inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub line_number: u32,
    pub column: u32,
}

impl CursorPosition {
    pub fn new(line_number: u32, column: u32) -> Self {
        Self { line_number, column }
    }
}

/// A selection from `anchor` (where it started) to `head` (where the caret is).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: CursorPosition,
    pub head: CursorPosition,
}

impl Selection {
    pub fn new(anchor: CursorPosition, head: CursorPosition) -> Self {
        Self { anchor, head }
    }

    /// Collapsed selection at a single position.
    pub fn caret(position: CursorPosition) -> Self {
        Self { anchor: position, head: position }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }
}

/// Inclusive-start, exclusive-end text range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_line_number: u32,
    pub start_column: u32,
    pub end_line_number: u32,
    pub end_column: u32,
}

impl TextRange {
    pub fn new(start: CursorPosition, end: CursorPosition) -> Self {
        Self {
            start_line_number: start.line_number,
            start_column: start.column,
            end_line_number: end.line_number,
            end_column: end.column,
        }
    }

    pub fn start(&self) -> CursorPosition {
        CursorPosition::new(self.start_line_number, self.start_column)
    }

    pub fn end(&self) -> CursorPosition {
        CursorPosition::new(self.end_line_number, self.end_column)
    }
}

/// One contiguous text replacement, as raised by the editing widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChange {
    pub range: TextRange,
    /// Character offset of `range` from the start of the document.
    pub range_offset: u32,
    /// Length of the replaced text.
    pub range_length: u32,
    pub text: String,
}

impl ContentChange {
    /// Insert `text` at `at`.
    pub fn insert(at: CursorPosition, offset: u32, text: impl Into<String>) -> Self {
        Self {
            range: TextRange::new(at, at),
            range_offset: offset,
            range_length: 0,
            text: text.into(),
        }
    }
}

/// Identity of a collaborator as announced by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDescriptor {
    pub id: String,
    pub name: String,
}

impl ParticipantDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Create,
    Update,
    Delete,
}

/// External change to a watched path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    #[serde(rename = "type")]
    pub kind: FileChangeKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Messages sent by a session controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "document:join", rename_all = "camelCase")]
    DocumentJoin {
        document_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    #[serde(rename = "document:leave", rename_all = "camelCase")]
    DocumentLeave { document_id: String },
    #[serde(rename = "cursor:move", rename_all = "camelCase")]
    CursorMove {
        document_id: String,
        position: CursorPosition,
    },
    #[serde(rename = "selection:change", rename_all = "camelCase")]
    SelectionChange {
        document_id: String,
        selection: Selection,
    },
    #[serde(rename = "content:change", rename_all = "camelCase")]
    ContentChange {
        document_id: String,
        changes: Vec<ContentChange>,
        version: u64,
    },
    #[serde(rename = "watch")]
    Watch { path: String },
    #[serde(rename = "unwatch")]
    Unwatch { path: String },
}

impl ClientMessage {
    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::DocumentJoin { .. } => "document:join",
            Self::DocumentLeave { .. } => "document:leave",
            Self::CursorMove { .. } => "cursor:move",
            Self::SelectionChange { .. } => "selection:change",
            Self::ContentChange { .. } => "content:change",
            Self::Watch { .. } => "watch",
            Self::Unwatch { .. } => "unwatch",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Messages delivered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "user:joined")]
    UserJoined(ParticipantDescriptor),
    #[serde(rename = "user:left", rename_all = "camelCase")]
    UserLeft { user_id: String },
    #[serde(rename = "cursor:move", rename_all = "camelCase")]
    CursorMove {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_id: Option<String>,
        position: CursorPosition,
    },
    #[serde(rename = "selection:change", rename_all = "camelCase")]
    SelectionChange {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_id: Option<String>,
        selection: Selection,
    },
    #[serde(rename = "content:change", rename_all = "camelCase")]
    ContentChange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_id: Option<String>,
        changes: Vec<ContentChange>,
        version: u64,
    },
    #[serde(rename = "file:change")]
    FileChange(FileChangeEvent),
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Unexpected {0} frame")]
    UnexpectedFrame(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_wire_shape() {
        let msg = ClientMessage::DocumentJoin {
            document_id: "src/main.rs".into(),
            name: None,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "document:join", "data": {"documentId": "src/main.rs"}})
        );
    }

    #[test]
    fn test_content_change_wire_shape() {
        let change = ContentChange::insert(CursorPosition::new(3, 5), 42, "fn");
        let msg = ClientMessage::ContentChange {
            document_id: "doc-1".into(),
            changes: vec![change],
            version: 7,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["event"], "content:change");
        assert_eq!(value["data"]["version"], 7);
        assert_eq!(value["data"]["changes"][0]["rangeOffset"], 42);
        assert_eq!(value["data"]["changes"][0]["range"]["startLineNumber"], 3);
        assert_eq!(value["data"]["changes"][0]["text"], "fn");
    }

    #[test]
    fn test_decode_user_joined() {
        let text = r#"{"event":"user:joined","data":{"id":"u-1","name":"Alice"}}"#;
        let msg = ServerMessage::decode(text).unwrap();
        assert_eq!(msg, ServerMessage::UserJoined(ParticipantDescriptor::new("u-1", "Alice")));
    }

    #[test]
    fn test_decode_content_change_without_optional_fields() {
        let text = r#"{"event":"content:change","data":{"changes":[],"version":3}}"#;
        match ServerMessage::decode(text).unwrap() {
            ServerMessage::ContentChange { user_id, document_id, changes, version } => {
                assert!(user_id.is_none());
                assert!(document_id.is_none());
                assert!(changes.is_empty());
                assert_eq!(version, 3);
            }
            other => panic!("Expected ContentChange, got {other:?}"),
        }
    }

    #[test]
    fn test_file_change_uses_type_tag() {
        let msg = ServerMessage::FileChange(FileChangeEvent {
            kind: FileChangeKind::Delete,
            path: "notes.md".into(),
            content: None,
        });
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "file:change", "data": {"type": "delete", "path": "notes.md"}})
        );
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        let text = r#"{"event":"theme:changed","data":{}}"#;
        assert!(matches!(
            ServerMessage::decode(text),
            Err(ProtocolError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(ClientMessage::decode("not json").is_err());
        assert!(ServerMessage::decode("").is_err());
    }

    #[test]
    fn test_event_names_match_serialized_tag() {
        let messages = vec![
            ClientMessage::DocumentLeave { document_id: "d".into() },
            ClientMessage::CursorMove {
                document_id: "d".into(),
                position: CursorPosition::new(1, 1),
            },
            ClientMessage::SelectionChange {
                document_id: "d".into(),
                selection: Selection::caret(CursorPosition::new(1, 1)),
            },
            ClientMessage::Watch { path: "a".into() },
            ClientMessage::Unwatch { path: "a".into() },
        ];
        for msg in messages {
            let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
            assert_eq!(value["event"], msg.event_name());
        }
    }

    #[test]
    fn test_selection_helpers() {
        let p = CursorPosition::new(2, 4);
        assert!(Selection::caret(p).is_empty());
        assert!(!Selection::new(p, CursorPosition::new(2, 9)).is_empty());

        let range = TextRange::new(CursorPosition::new(1, 2), CursorPosition::new(3, 4));
        assert_eq!(range.start(), CursorPosition::new(1, 2));
        assert_eq!(range.end(), CursorPosition::new(3, 4));
    }
}

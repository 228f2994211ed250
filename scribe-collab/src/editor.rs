//! Editor bridge: routes editing-widget events into the session controller.

use crate::protocol::{ContentChange, CursorPosition, Selection};
use crate::session::SessionController;

/// Events raised by the editing widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    CursorMoved(CursorPosition),
    SelectionChanged(Selection),
    /// One content mutation, as raised by a single edit.
    ContentChanged(Vec<ContentChange>),
    SaveRequested,
}

/// What the bridge did with an [`EditorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorOutcome {
    /// Handed to the session controller.
    Forwarded,
    /// Dropped because the session is read-only.
    Ignored,
    /// The host should persist the document.
    Save,
}

impl SessionController {
    /// Feed one editing-widget event to the session.
    ///
    /// Read-only sessions ignore cursor, selection and content events. Save
    /// requests are never handled here.
    pub fn handle_editor_event(&mut self, event: EditorEvent) -> EditorOutcome {
        if event == EditorEvent::SaveRequested {
            return EditorOutcome::Save;
        }
        if self.config().read_only {
            log::trace!("Read-only session: ignoring {event:?}");
            return EditorOutcome::Ignored;
        }

        match event {
            EditorEvent::CursorMoved(position) => self.update_cursor(position),
            EditorEvent::SelectionChanged(selection) => self.update_selection(selection),
            EditorEvent::ContentChanged(changes) => self.apply_local_changes(changes),
            EditorEvent::SaveRequested => return EditorOutcome::Save,
        }
        EditorOutcome::Forwarded
    }
}

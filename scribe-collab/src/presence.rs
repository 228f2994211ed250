//! Presence registry: who else is in the document and where their cursor is.
//!
//! A pure in-memory projection of `user:*`, `cursor:move` and
//! `selection:change` events. No network I/O happens here.
//!
//! ## Color assignment
//!
//! ```text
//! palette: [red, green, blue, yellow, ...]
//!              │
//!   join ──► first palette entry not held by a registered participant
//!              │
//!   palette exhausted ──► palette[0] (duplicates allowed)
//!              │
//!   leave ──► color returns to the pool
//! ```

use crate::protocol::{CursorPosition, ParticipantDescriptor, Selection};

/// Cursor colors handed out to participants, in assignment order.
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF", "#00FFFF", "#FFA500", "#800080",
];

/// Default palette as owned strings, for configuration.
pub fn default_palette() -> Vec<String> {
    DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
}

/// A remote collaborator in the current document session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub color: String,
    /// Last announced cursor. Replaced wholesale on every update.
    pub cursor: Option<CursorPosition>,
    /// Last announced selection. Replaced wholesale on every update.
    pub selection: Option<Selection>,
}

impl Participant {
    fn new(descriptor: ParticipantDescriptor, color: String) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name,
            color,
            cursor: None,
            selection: None,
        }
    }
}

/// Tracks remote participants of the active document, in join order.
#[derive(Debug, Clone)]
pub struct PresenceRegistry {
    participants: Vec<Participant>,
    palette: Vec<String>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::with_palette(default_palette())
    }

    /// Use a custom palette. An empty palette falls back to the default one.
    pub fn with_palette(palette: Vec<String>) -> Self {
        let palette = if palette.is_empty() { default_palette() } else { palette };
        Self {
            participants: Vec::new(),
            palette,
        }
    }

    /// Register a participant and assign its color.
    ///
    /// A repeated join for a registered id refreshes the display name and keeps
    /// the color, cursor and selection already held.
    pub fn on_participant_joined(&mut self, descriptor: ParticipantDescriptor) -> &Participant {
        if let Some(index) = self.position(&descriptor.id) {
            let existing = &mut self.participants[index];
            existing.name = descriptor.name;
            return existing;
        }

        let color = self.next_color();
        log::debug!("Participant {} ({}) joined with color {color}", descriptor.name, descriptor.id);
        self.participants.push(Participant::new(descriptor, color));
        &self.participants[self.participants.len() - 1]
    }

    /// Remove a participant, returning its color to the pool.
    pub fn on_participant_left(&mut self, participant_id: &str) -> Option<Participant> {
        let index = self.position(participant_id)?;
        Some(self.participants.remove(index))
    }

    /// Replace the cursor of a participant. Unknown ids are ignored.
    pub fn on_cursor_moved(
        &mut self,
        participant_id: &str,
        position: CursorPosition,
    ) -> Option<&Participant> {
        let Some(index) = self.position(participant_id) else {
            log::debug!("Ignoring cursor for unknown participant {participant_id}");
            return None;
        };
        let participant = &mut self.participants[index];
        participant.cursor = Some(position);
        Some(&*participant)
    }

    /// Replace the selection of a participant. Unknown ids are ignored.
    pub fn on_selection_changed(
        &mut self,
        participant_id: &str,
        selection: Selection,
    ) -> Option<&Participant> {
        let Some(index) = self.position(participant_id) else {
            log::debug!("Ignoring selection for unknown participant {participant_id}");
            return None;
        };
        let participant = &mut self.participants[index];
        participant.selection = Some(selection);
        Some(&*participant)
    }

    /// All participants in join order.
    pub fn list(&self) -> &[Participant] {
        &self.participants
    }

    pub fn get(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    fn position(&self, participant_id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.id == participant_id)
    }

    fn next_color(&self) -> String {
        self.palette
            .iter()
            .find(|color| !self.participants.iter().any(|p| &p.color == *color))
            .unwrap_or(&self.palette[0])
            .clone()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

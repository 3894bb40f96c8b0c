//! Local note list plus the draft being composed, reconciled against the
//! backend's create/update/delete feeds by note id.

use std::collections::HashSet;

use shared::domain::{Note, NoteId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerState {
    notes: Vec<Note>,
    draft_text: String,
    editing_id: Option<NoteId>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes in arrival order; at most one entry per id.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn draft_text(&self) -> &str {
        &self.draft_text
    }

    pub fn editing_id(&self) -> Option<&NoteId> {
        self.editing_id.as_ref()
    }

    /// Whether the next submit updates an existing note instead of creating.
    pub fn is_editing(&self) -> bool {
        self.editing_id.is_some()
    }

    pub fn find(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    fn position(&self, id: &NoteId) -> Option<usize> {
        self.notes.iter().position(|note| &note.id == id)
    }

    /// Replaces the list wholesale and clears the draft. Later duplicates of
    /// an id are dropped; returns how many were dropped.
    pub(crate) fn replace_all(&mut self, notes: Vec<Note>) -> usize {
        let received = notes.len();
        let mut seen = HashSet::with_capacity(received);
        self.notes = notes
            .into_iter()
            .filter(|note| seen.insert(note.id.clone()))
            .collect();
        self.draft_text.clear();
        received - self.notes.len()
    }

    /// Last write wins on id and the note always moves to the end.
    pub(crate) fn upsert_created(&mut self, note: Note) {
        self.notes.retain(|existing| existing.id != note.id);
        self.notes.push(note);
    }

    /// Replaces in place; an unknown id is dropped. Returns whether a note
    /// was replaced.
    pub(crate) fn replace_updated(&mut self, note: Note) -> bool {
        match self.position(&note.id) {
            Some(index) => {
                self.notes[index] = note;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_deleted(&mut self, id: &NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|existing| &existing.id != id);
        self.notes.len() != before
    }

    pub(crate) fn set_draft(&mut self, text: String) {
        self.draft_text = text;
    }

    /// An empty id leaves the state in add mode.
    pub(crate) fn select(&mut self, note: &Note) {
        self.draft_text = note.note.clone();
        self.editing_id = (!note.id.as_str().is_empty()).then(|| note.id.clone());
    }

    /// Back to add mode with an empty draft.
    pub(crate) fn reset_draft(&mut self) {
        self.draft_text.clear();
        self.editing_id = None;
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;

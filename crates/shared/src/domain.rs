use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(NoteId);

/// A note as stored by the backend. Identity is `id` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub note: String,
}

impl Note {
    pub fn new(id: impl Into<NoteId>, note: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            note: note.into(),
        }
    }
}

/// Which of the three push feeds an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteEventKind {
    Created,
    Updated,
    Deleted,
}

impl NoteEventKind {
    pub const ALL: [NoteEventKind; 3] = [
        NoteEventKind::Created,
        NoteEventKind::Updated,
        NoteEventKind::Deleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NoteEventKind::Created => "created",
            NoteEventKind::Updated => "updated",
            NoteEventKind::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    Created(Note),
    Updated(Note),
    Deleted(Note),
}

impl NoteEvent {
    pub fn new(kind: NoteEventKind, note: Note) -> Self {
        match kind {
            NoteEventKind::Created => NoteEvent::Created(note),
            NoteEventKind::Updated => NoteEvent::Updated(note),
            NoteEventKind::Deleted => NoteEvent::Deleted(note),
        }
    }

    pub fn kind(&self) -> NoteEventKind {
        match self {
            NoteEvent::Created(_) => NoteEventKind::Created,
            NoteEvent::Updated(_) => NoteEventKind::Updated,
            NoteEvent::Deleted(_) => NoteEventKind::Deleted,
        }
    }

    pub fn note(&self) -> &Note {
        match self {
            NoteEvent::Created(note) | NoteEvent::Updated(note) | NoteEvent::Deleted(note) => note,
        }
    }
}

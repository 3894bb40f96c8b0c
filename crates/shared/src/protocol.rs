use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    domain::{Note, NoteEventKind, NoteId},
    error::GraphQlError,
};

/// WebSocket subprotocol negotiated for subscriptions.
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

pub const LIST_NOTES: &str = "query ListNotes($limit: Int, $nextToken: String) {
  listNotes(limit: $limit, nextToken: $nextToken) {
    items { id note }
    nextToken
  }
}";

pub const CREATE_NOTE: &str = "mutation CreateNote($input: CreateNoteInput!) {
  createNote(input: $input) { id note }
}";

pub const UPDATE_NOTE: &str = "mutation UpdateNote($input: UpdateNoteInput!) {
  updateNote(input: $input) { id note }
}";

pub const DELETE_NOTE: &str = "mutation DeleteNote($input: DeleteNoteInput!) {
  deleteNote(input: $input) { id note }
}";

pub const ON_CREATE_NOTE: &str = "subscription OnCreateNote {
  onCreateNote { id note }
}";

pub const ON_UPDATE_NOTE: &str = "subscription OnUpdateNote {
  onUpdateNote { id note }
}";

pub const ON_DELETE_NOTE: &str = "subscription OnDeleteNote {
  onDeleteNote { id note }
}";

pub const LIST_NOTES_FIELD: &str = "listNotes";
pub const CREATE_NOTE_FIELD: &str = "createNote";
pub const UPDATE_NOTE_FIELD: &str = "updateNote";
pub const DELETE_NOTE_FIELD: &str = "deleteNote";

impl NoteEventKind {
    pub fn subscription_document(self) -> &'static str {
        match self {
            NoteEventKind::Created => ON_CREATE_NOTE,
            NoteEventKind::Updated => ON_UPDATE_NOTE,
            NoteEventKind::Deleted => ON_DELETE_NOTE,
        }
    }

    /// Root field of the subscription payload, e.g. `onCreateNote`.
    pub fn subscription_field(self) -> &'static str {
        match self {
            NoteEventKind::Created => "onCreateNote",
            NoteEventKind::Updated => "onUpdateNote",
            NoteEventKind::Deleted => "onDeleteNote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
        }
    }

    pub fn with_variables(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables: Some(variables),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNoteInput {
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNoteInput {
    pub id: NoteId,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteNoteInput {
    pub id: NoteId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationVariables<I> {
    pub input: I,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListNotesVariables {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(
        default,
        rename = "nextToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_token: Option<String>,
}

/// One page of `listNotes`. The schema types `items` as `[Note]`, so a
/// null list reads as empty and null entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteConnection {
    #[serde(default, deserialize_with = "nullable_items")]
    pub items: Vec<Note>,
    #[serde(default, rename = "nextToken")]
    pub next_token: Option<String>,
}

fn nullable_items<'de, D>(deserializer: D) -> Result<Vec<Note>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Option<Note>>>::deserialize(deserializer)?;
    Ok(items.into_iter().flatten().flatten().collect())
}

/// Messages of the `graphql-transport-ws` protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportMessage {
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Subscribe {
        id: String,
        payload: GraphQlRequest,
    },
    Next {
        id: String,
        payload: GraphQlResponse,
    },
    Error {
        id: String,
        payload: Vec<GraphQlError>,
    },
    Complete {
        id: String,
    },
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;

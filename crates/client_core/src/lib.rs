use async_trait::async_trait;
use shared::{
    domain::{Note, NoteEventKind},
    protocol::{CreateNoteInput, DeleteNoteInput, UpdateNoteInput},
};

pub mod controller;
pub mod error;
pub mod graphql_client;
pub mod state;
pub mod transport;

pub use controller::NoteListController;
pub use error::{ClientError, Result};
pub use graphql_client::{Credentials, GraphQlClient};
pub use state::ControllerState;
pub use transport::{Subscription, SubscriptionGuard};

/// Remote notes backend. Durability, authorization and fan-out of events
/// all live behind this seam.
#[async_trait]
pub trait NotesApi: Send + Sync {
    async fn list_notes(&self) -> Result<Vec<Note>>;
    async fn create_note(&self, input: CreateNoteInput) -> Result<Note>;
    async fn update_note(&self, input: UpdateNoteInput) -> Result<Note>;
    async fn delete_note(&self, input: DeleteNoteInput) -> Result<Note>;
    async fn subscribe(&self, kind: NoteEventKind) -> Result<Subscription>;
}

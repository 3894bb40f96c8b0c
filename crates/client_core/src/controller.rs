use std::sync::Arc;

use futures::{
    stream::{select_all, BoxStream, SelectAll},
    StreamExt,
};
use shared::{
    domain::{Note, NoteEvent, NoteEventKind, NoteId},
    protocol::{CreateNoteInput, DeleteNoteInput, UpdateNoteInput},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result},
    state::ControllerState,
    transport::SubscriptionGuard,
    NotesApi,
};

type FeedItem = (NoteEventKind, Result<Note>);

struct ActiveFeeds {
    events: SelectAll<BoxStream<'static, FeedItem>>,
    guards: Vec<SubscriptionGuard>,
}

/// Owns the note list shown to the user and keeps it in step with the
/// backend. Mutations go out through [`NotesApi`]; the list itself only
/// changes when the matching feed event comes back.
pub struct NoteListController {
    api: Arc<dyn NotesApi>,
    state: ControllerState,
    feeds: Option<ActiveFeeds>,
    started: bool,
}

impl NoteListController {
    pub fn new(api: Arc<dyn NotesApi>) -> Self {
        Self {
            api,
            state: ControllerState::new(),
            feeds: None,
            started: false,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn notes(&self) -> &[Note] {
        self.state.notes()
    }

    pub fn draft_text(&self) -> &str {
        self.state.draft_text()
    }

    pub fn editing_id(&self) -> Option<&NoteId> {
        self.state.editing_id()
    }

    pub fn is_editing(&self) -> bool {
        self.state.is_editing()
    }

    /// Loads the list, then opens the create, update and delete feeds.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(ClientError::AlreadyStarted);
        }
        self.fetch_all().await?;

        let mut streams = Vec::with_capacity(NoteEventKind::ALL.len());
        let mut guards = Vec::with_capacity(NoteEventKind::ALL.len());
        for kind in NoteEventKind::ALL {
            match self.api.subscribe(kind).await {
                Ok(subscription) => {
                    let (events, guard) = subscription.into_parts();
                    streams.push(
                        ReceiverStream::new(events)
                            .map(move |item| (kind, item))
                            .boxed(),
                    );
                    guards.push(guard);
                }
                Err(err) => {
                    for guard in guards {
                        guard.close().await;
                    }
                    return Err(err);
                }
            }
        }

        self.feeds = Some(ActiveFeeds {
            events: select_all(streams),
            guards,
        });
        self.started = true;
        info!(notes = self.state.notes().len(), "note list controller started");
        Ok(())
    }

    /// Replaces the list with the backend's and clears the draft.
    pub async fn fetch_all(&mut self) -> Result<&[Note]> {
        let notes = self.api.list_notes().await?;
        let dropped = self.state.replace_all(notes);
        if dropped > 0 {
            warn!(dropped, "listNotes returned duplicate ids; kept first occurrence");
        }
        Ok(self.state.notes())
    }

    /// Waits for the next feed event, applies it and returns it. Feed
    /// failures are logged and skipped. `None` once every feed has ended or
    /// the controller is not running.
    pub async fn next_event(&mut self) -> Option<NoteEvent> {
        loop {
            let feeds = self.feeds.as_mut()?;
            let (kind, item) = feeds.events.next().await?;
            match item {
                Ok(note) => {
                    let event = NoteEvent::new(kind, note);
                    self.apply(event.clone());
                    return Some(event);
                }
                Err(err) => {
                    warn!(kind = kind.as_str(), error = %err, "note feed failed");
                }
            }
        }
    }

    pub fn apply(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::Created(note) => self.on_create_event(note),
            NoteEvent::Updated(note) => self.on_update_event(note),
            NoteEvent::Deleted(note) => self.on_delete_event(note),
        }
    }

    pub fn on_create_event(&mut self, note: Note) {
        debug!(id = %note.id, "applying create event");
        self.state.upsert_created(note);
    }

    pub fn on_update_event(&mut self, note: Note) {
        let id = note.id.clone();
        if self.state.replace_updated(note) {
            debug!(%id, "applied update event");
        } else {
            debug!(%id, "dropping update event for unknown note");
        }
    }

    pub fn on_delete_event(&mut self, note: Note) {
        if self.state.remove_deleted(&note.id) {
            debug!(id = %note.id, "applied delete event");
        }
    }

    /// Updates the note being edited, or creates a new one from the draft.
    /// A selection whose note has since been deleted still issues
    /// `updateNote`; the backend's rejection comes back as the error.
    /// The draft and edit selection are cleared once the backend accepts.
    pub async fn submit(&mut self) -> Result<Note> {
        let text = self.state.draft_text().to_string();
        let note = match self.state.editing_id().cloned() {
            Some(id) => self.update(id, text).await?,
            None => self.create(text).await?,
        };
        self.state.reset_draft();
        Ok(note)
    }

    pub async fn create(&self, text: impl Into<String>) -> Result<Note> {
        self.api
            .create_note(CreateNoteInput { note: text.into() })
            .await
    }

    pub async fn update(&self, id: NoteId, text: impl Into<String>) -> Result<Note> {
        self.api
            .update_note(UpdateNoteInput {
                id,
                note: text.into(),
            })
            .await
    }

    pub async fn delete(&self, id: NoteId) -> Result<Note> {
        self.api.delete_note(DeleteNoteInput { id }).await
    }

    pub fn select_for_edit(&mut self, note: &Note) {
        self.state.select(note);
    }

    pub fn change_draft(&mut self, text: impl Into<String>) {
        self.state.set_draft(text.into());
    }

    /// Closes all feeds. Later calls do nothing.
    pub async fn teardown(&mut self) {
        let Some(feeds) = self.feeds.take() else {
            return;
        };
        for guard in feeds.guards {
            guard.close().await;
        }
        info!("note list controller stopped");
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;

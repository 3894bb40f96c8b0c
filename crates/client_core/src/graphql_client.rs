use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use shared::{
    domain::{Note, NoteEventKind},
    protocol::{
        CreateNoteInput, DeleteNoteInput, GraphQlRequest, GraphQlResponse, ListNotesVariables,
        MutationVariables, NoteConnection, UpdateNoteInput, CREATE_NOTE, CREATE_NOTE_FIELD,
        DELETE_NOTE, DELETE_NOTE_FIELD, LIST_NOTES, LIST_NOTES_FIELD, UPDATE_NOTE,
        UPDATE_NOTE_FIELD,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    error::{ClientError, Result},
    transport::{open_subscription, Subscription},
    NotesApi,
};

const API_KEY_HEADER: &str = "x-api-key";
const AUTHORIZATION_HEADER: &str = "Authorization";

/// Credentials issued by whatever identity gate fronts the backend. They
/// are passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub auth_token: Option<String>,
}

impl Credentials {
    fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        if let Some(token) = &self.auth_token {
            request = request.header(AUTHORIZATION_HEADER, token);
        }
        request
    }

    /// Payload for `connection_init`, carrying the same headers as HTTP.
    pub fn connection_payload(&self) -> Option<Value> {
        let mut payload = Map::new();
        if let Some(api_key) = &self.api_key {
            payload.insert(API_KEY_HEADER.to_string(), Value::String(api_key.clone()));
        }
        if let Some(token) = &self.auth_token {
            payload.insert(
                AUTHORIZATION_HEADER.to_string(),
                Value::String(token.clone()),
            );
        }
        (!payload.is_empty()).then_some(Value::Object(payload))
    }
}

/// GraphQL client for the notes backend: queries and mutations over HTTP,
/// subscriptions over `graphql-transport-ws`.
pub struct GraphQlClient {
    http: Client,
    api_url: Url,
    realtime_url: Url,
    credentials: Credentials,
    list_limit: Option<u32>,
}

impl GraphQlClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let api_url = parse_url(api_url)?;
        let realtime_url = realtime_url_for(&api_url)?;
        Ok(Self {
            http: Client::new(),
            api_url,
            realtime_url,
            credentials: Credentials::default(),
            list_limit: None,
        })
    }

    pub fn with_realtime_url(mut self, realtime_url: &str) -> Result<Self> {
        let realtime_url = parse_url(realtime_url)?;
        if !matches!(realtime_url.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidUrl {
                url: realtime_url.to_string(),
                reason: "realtime url must start with ws:// or wss://".to_string(),
            });
        }
        self.realtime_url = realtime_url;
        Ok(self)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Page size requested from `listNotes`; the backend default applies
    /// when unset.
    pub fn with_list_limit(mut self, limit: u32) -> Self {
        self.list_limit = Some(limit);
        self
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn realtime_url(&self) -> &Url {
        &self.realtime_url
    }

    async fn execute(&self, request: &GraphQlRequest) -> Result<GraphQlResponse> {
        let response = self
            .credentials
            .apply(self.http.post(self.api_url.clone()))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http { status, body });
        }
        Ok(response.json().await?)
    }

    async fn mutate<I: Serialize>(
        &self,
        document: &str,
        field: &'static str,
        input: I,
    ) -> Result<Note> {
        let variables = serde_json::to_value(MutationVariables { input })?;
        let response = self
            .execute(&GraphQlRequest::with_variables(document, variables))
            .await?;
        extract_field(response, field)
    }

    async fn list_page(&self, next_token: Option<String>) -> Result<NoteConnection> {
        let variables = serde_json::to_value(ListNotesVariables {
            limit: self.list_limit,
            next_token,
        })?;
        let response = self
            .execute(&GraphQlRequest::with_variables(LIST_NOTES, variables))
            .await?;
        extract_field(response, LIST_NOTES_FIELD)
    }
}

#[async_trait]
impl NotesApi for GraphQlClient {
    async fn list_notes(&self) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        let mut next_token = None;
        loop {
            let page = self.list_page(next_token).await?;
            debug!(
                items = page.items.len(),
                has_more = page.next_token.is_some(),
                "fetched listNotes page"
            );
            notes.extend(page.items);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(notes)
    }

    async fn create_note(&self, input: CreateNoteInput) -> Result<Note> {
        self.mutate(CREATE_NOTE, CREATE_NOTE_FIELD, input).await
    }

    async fn update_note(&self, input: UpdateNoteInput) -> Result<Note> {
        self.mutate(UPDATE_NOTE, UPDATE_NOTE_FIELD, input).await
    }

    async fn delete_note(&self, input: DeleteNoteInput) -> Result<Note> {
        self.mutate(DELETE_NOTE, DELETE_NOTE_FIELD, input).await
    }

    async fn subscribe(&self, kind: NoteEventKind) -> Result<Subscription> {
        open_subscription(
            &self.realtime_url,
            self.credentials.connection_payload(),
            kind,
        )
        .await
    }
}

/// Pulls `data.<field>` out of a response, surfacing the `errors` array
/// first when the backend sent one.
pub(crate) fn extract_field<T: DeserializeOwned>(
    response: GraphQlResponse,
    field: &'static str,
) -> Result<T> {
    if !response.errors.is_empty() {
        return Err(ClientError::GraphQl(response.errors));
    }
    let value = response
        .data
        .and_then(|mut data| data.get_mut(field).map(Value::take))
        .filter(|value| !value.is_null())
        .ok_or(ClientError::MissingData(field))?;
    Ok(serde_json::from_value(value)?)
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|err| ClientError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })
}

/// `https://host/graphql` becomes `wss://host/graphql`.
pub fn realtime_url_for(api_url: &Url) -> Result<Url> {
    let scheme = match api_url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => {
            return Err(ClientError::InvalidUrl {
                url: api_url.to_string(),
                reason: "api url must start with http:// or https://".to_string(),
            });
        }
    };
    let mut realtime_url = api_url.clone();
    realtime_url
        .set_scheme(scheme)
        .map_err(|()| ClientError::InvalidUrl {
            url: api_url.to_string(),
            reason: format!("cannot switch scheme to {scheme}"),
        })?;
    Ok(realtime_url)
}

#[cfg(test)]
#[path = "tests/graphql_client_tests.rs"]
mod tests;

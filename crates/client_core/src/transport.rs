//! `graphql-transport-ws` subscription sockets.
//!
//! Every subscription owns one WebSocket served by a spawned task; decoded
//! notes are forwarded over a bounded channel to whoever holds the
//! [`Subscription`].

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use shared::{
    domain::{Note, NoteEventKind},
    protocol::{GraphQlRequest, TransportMessage, GRAPHQL_TRANSPORT_WS},
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest, http::HeaderValue, Error as WsError, Message,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ClientError, Result},
    graphql_client::extract_field,
};

const FEED_BUFFER: usize = 256;
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Receiving half of one event feed plus the handle that closes it.
pub struct Subscription {
    kind: NoteEventKind,
    events: mpsc::Receiver<Result<Note>>,
    guard: SubscriptionGuard,
}

impl Subscription {
    pub fn new(
        kind: NoteEventKind,
        events: mpsc::Receiver<Result<Note>>,
        guard: SubscriptionGuard,
    ) -> Self {
        Self {
            kind,
            events,
            guard,
        }
    }

    /// A feed with no socket behind it; the sender side drives it directly.
    pub fn from_channel(kind: NoteEventKind, events: mpsc::Receiver<Result<Note>>) -> Self {
        Self::new(kind, events, SubscriptionGuard::detached(kind))
    }

    pub fn kind(&self) -> NoteEventKind {
        self.kind
    }

    pub async fn next(&mut self) -> Option<Result<Note>> {
        self.events.recv().await
    }

    pub fn into_parts(self) -> (mpsc::Receiver<Result<Note>>, SubscriptionGuard) {
        (self.events, self.guard)
    }

    pub async fn unsubscribe(self) {
        self.guard.close().await;
    }
}

pub struct SubscriptionGuard {
    kind: NoteEventKind,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionGuard {
    fn new(kind: NoteEventKind, shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            kind,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    pub fn detached(kind: NoteEventKind) -> Self {
        Self {
            kind,
            shutdown: None,
            task: None,
        }
    }

    pub fn kind(&self) -> NoteEventKind {
        self.kind
    }

    /// Sends `complete` for the operation and waits briefly for the socket
    /// task to finish before aborting it.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                warn!(
                    kind = self.kind.as_str(),
                    "subscription task did not stop in time; aborting"
                );
                task.abort();
            }
        }
        debug!(kind = self.kind.as_str(), "subscription closed");
    }
}

/// Opens a socket, performs the `connection_init`/`connection_ack`
/// handshake and subscribes to the feed for `kind`.
pub(crate) async fn open_subscription(
    realtime_url: &Url,
    init_payload: Option<Value>,
    kind: NoteEventKind,
) -> Result<Subscription> {
    let mut request = realtime_url.as_str().into_client_request()?;
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static(GRAPHQL_TRANSPORT_WS),
    );
    let (ws_stream, _) = connect_async(request).await?;
    let (mut writer, mut reader) = ws_stream.split();

    send_message(
        &mut writer,
        &TransportMessage::ConnectionInit {
            payload: init_payload,
        },
    )
    .await?;

    loop {
        match read_message(&mut reader).await? {
            Some(TransportMessage::ConnectionAck { .. }) => break,
            Some(TransportMessage::Ping { payload }) => {
                send_message(&mut writer, &TransportMessage::Pong { payload }).await?;
            }
            Some(other) => {
                return Err(ClientError::Protocol(format!(
                    "expected connection_ack, got {other:?}"
                )));
            }
            None => {
                return Err(ClientError::Protocol(
                    "socket closed before connection_ack".to_string(),
                ));
            }
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    send_message(
        &mut writer,
        &TransportMessage::Subscribe {
            id: id.clone(),
            payload: GraphQlRequest::new(kind.subscription_document()),
        },
    )
    .await?;
    info!(kind = kind.as_str(), %realtime_url, "subscribed to note feed");

    let (events_tx, events_rx) = mpsc::channel(FEED_BUFFER);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run_feed(kind, id, writer, reader, events_tx, shutdown_rx));

    Ok(Subscription::new(
        kind,
        events_rx,
        SubscriptionGuard::new(kind, shutdown_tx, task),
    ))
}

async fn run_feed<W, R>(
    kind: NoteEventKind,
    id: String,
    mut writer: W,
    mut reader: R,
    events: mpsc::Sender<Result<Note>>,
    mut shutdown: oneshot::Receiver<()>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = send_message(&mut writer, &TransportMessage::Complete { id: id.clone() }).await;
                let _ = writer.send(Message::Close(None)).await;
                break;
            }
            message = read_message(&mut reader) => match message {
                Ok(Some(TransportMessage::Next { id: operation_id, payload })) => {
                    if operation_id != id {
                        debug!(kind = kind.as_str(), %operation_id, "ignoring event for unknown operation");
                        continue;
                    }
                    let item = extract_field::<Note>(payload, kind.subscription_field());
                    if events.send(item).await.is_err() {
                        break;
                    }
                }
                Ok(Some(TransportMessage::Ping { payload })) => {
                    if let Err(err) = send_message(&mut writer, &TransportMessage::Pong { payload }).await {
                        let _ = events.send(Err(err)).await;
                        break;
                    }
                }
                Ok(Some(TransportMessage::Error { payload, .. })) => {
                    let _ = events.send(Err(ClientError::GraphQl(payload))).await;
                    break;
                }
                Ok(Some(TransportMessage::Complete { .. })) => {
                    info!(kind = kind.as_str(), "note feed completed by server");
                    break;
                }
                Ok(Some(other)) => {
                    debug!(kind = kind.as_str(), ?other, "ignoring transport message");
                }
                Ok(None) => {
                    warn!(kind = kind.as_str(), "note feed socket closed by server");
                    break;
                }
                Err(err) => {
                    let _ = events.send(Err(err)).await;
                    break;
                }
            }
        }
    }
}

async fn send_message<W>(writer: &mut W, message: &TransportMessage) -> Result<()>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let text = serde_json::to_string(message)?;
    writer.send(Message::Text(text)).await?;
    Ok(())
}

/// Next protocol message, or `None` once the socket is closed. Text frames
/// that are not a known protocol message are logged and skipped.
async fn read_message<R>(reader: &mut R) -> Result<Option<TransportMessage>>
where
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = reader.next().await {
        match frame? {
            Message::Text(text) => match serde_json::from_str(&text) {
                Ok(message) => return Ok(Some(message)),
                Err(err) => warn!(error = %err, frame = %text, "skipping unrecognised frame"),
            },
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;

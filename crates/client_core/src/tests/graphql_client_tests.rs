use std::sync::Arc;

use super::*;
use axum::{
    extract::{
        ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;
use shared::protocol::{TransportMessage, GRAPHQL_TRANSPORT_WS};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

#[derive(Clone, Default)]
struct ServerState {
    http_requests: Arc<Mutex<Vec<(Option<String>, GraphQlRequest)>>>,
    init_payloads: Arc<Mutex<Vec<Option<Value>>>>,
    pongs: Arc<Mutex<u32>>,
    completed: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

async fn handle_graphql(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(request): Json<GraphQlRequest>,
) -> Json<Value> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state
        .http_requests
        .lock()
        .await
        .push((api_key, request.clone()));

    let variables = request.variables.unwrap_or(Value::Null);
    let input = &variables["input"];
    let body = if request.query.contains("listNotes") {
        match variables.get("nextToken").and_then(Value::as_str) {
            None => json!({ "data": { "listNotes": {
                "items": [{ "id": "1", "note": "a" }, null],
                "nextToken": "page-2"
            } } }),
            Some("page-2") => json!({ "data": { "listNotes": {
                "items": null,
                "nextToken": "page-3"
            } } }),
            Some(_) => json!({ "data": { "listNotes": {
                "items": [{ "id": "2", "note": "b" }],
                "nextToken": null
            } } }),
        }
    } else if request.query.contains("createNote") {
        if input["note"] == "" {
            json!({ "data": { "createNote": null } })
        } else {
            json!({ "data": { "createNote": { "id": "new-1", "note": input["note"] } } })
        }
    } else if request.query.contains("updateNote") {
        if input["id"] == "missing" {
            json!({
                "data": { "updateNote": null },
                "errors": [{
                    "message": "The conditional request failed",
                    "errorType": "DynamoDB:ConditionalCheckFailedException"
                }]
            })
        } else {
            json!({ "data": { "updateNote": input } })
        }
    } else {
        json!({ "data": { "deleteNote": { "id": input["id"], "note": "" } } })
    };
    Json(body)
}

async fn handle_realtime(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.protocols([GRAPHQL_TRANSPORT_WS])
        .on_upgrade(move |socket| serve_feed(socket, state))
}

async fn recv_message(socket: &mut WebSocket) -> Option<TransportMessage> {
    while let Some(Ok(frame)) = socket.recv().await {
        match frame {
            WsFrame::Text(text) => return serde_json::from_str(&text).ok(),
            WsFrame::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn send_message(socket: &mut WebSocket, message: &TransportMessage) {
    let text = serde_json::to_string(message).expect("encode");
    let _ = socket.send(WsFrame::Text(text)).await;
}

/// A frame type outside `graphql-transport-ws`, as some gateways send.
async fn send_keep_alive(socket: &mut WebSocket) {
    let _ = socket
        .send(WsFrame::Text(r#"{"type":"ka"}"#.to_string()))
        .await;
}

/// Acks (after an unknown keep-alive frame), pings once, then emits one
/// event (or an error for the delete feed) and waits for the client to
/// complete the operation.
async fn serve_feed(mut socket: WebSocket, state: ServerState) {
    let Some(TransportMessage::ConnectionInit { payload }) = recv_message(&mut socket).await
    else {
        return;
    };
    state.init_payloads.lock().await.push(payload);
    send_keep_alive(&mut socket).await;
    send_message(&mut socket, &TransportMessage::ConnectionAck { payload: None }).await;

    let Some(TransportMessage::Subscribe { id, payload }) = recv_message(&mut socket).await
    else {
        return;
    };

    if payload.query.contains("onDeleteNote") {
        send_message(
            &mut socket,
            &TransportMessage::Error {
                id,
                payload: vec![shared::error::GraphQlError::new("Not Authorized")],
            },
        )
        .await;
        return;
    }

    send_message(&mut socket, &TransportMessage::Ping { payload: None }).await;
    if let Some(TransportMessage::Pong { .. }) = recv_message(&mut socket).await {
        *state.pongs.lock().await += 1;
    }

    let field = if payload.query.contains("onCreateNote") {
        "onCreateNote"
    } else {
        "onUpdateNote"
    };
    send_keep_alive(&mut socket).await;
    send_message(
        &mut socket,
        &TransportMessage::Next {
            id: "someone-else".to_string(),
            payload: GraphQlResponse {
                data: Some(json!({ field: { "id": "x", "note": "not ours" } })),
                errors: Vec::new(),
            },
        },
    )
    .await;
    send_message(
        &mut socket,
        &TransportMessage::Next {
            id: id.clone(),
            payload: GraphQlResponse {
                data: Some(json!({ field: { "id": "1", "note": "from feed" } })),
                errors: Vec::new(),
            },
        },
    )
    .await;

    while let Some(message) = recv_message(&mut socket).await {
        if let TransportMessage::Complete { id: completed } = message {
            if let Some(tx) = state.completed.lock().await.take() {
                let _ = tx.send(completed);
            }
            break;
        }
    }
}

async fn spawn_notes_server(state: ServerState) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/graphql", post(handle_graphql).get(handle_realtime))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/graphql")
}

fn credentials() -> Credentials {
    Credentials {
        api_key: Some("da2-test".to_string()),
        auth_token: None,
    }
}

#[tokio::test]
async fn list_notes_follows_next_token_pages_across_null_items() {
    let state = ServerState::default();
    let api_url = spawn_notes_server(state.clone()).await;
    let client = GraphQlClient::new(&api_url)
        .expect("client")
        .with_credentials(credentials())
        .with_list_limit(50);

    let notes = client.list_notes().await.expect("list");

    assert_eq!(notes, vec![Note::new("1", "a"), Note::new("2", "b")]);
    let requests = state.http_requests.lock().await;
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].0.as_deref(), Some("da2-test"));
    assert_eq!(requests[0].1.variables, Some(json!({ "limit": 50 })));
    assert_eq!(
        requests[1].1.variables,
        Some(json!({ "limit": 50, "nextToken": "page-2" }))
    );
    assert_eq!(
        requests[2].1.variables,
        Some(json!({ "limit": 50, "nextToken": "page-3" }))
    );
}

#[tokio::test]
async fn create_note_sends_input_and_returns_note() {
    let state = ServerState::default();
    let api_url = spawn_notes_server(state.clone()).await;
    let client = GraphQlClient::new(&api_url).expect("client");

    let note = client
        .create_note(CreateNoteInput {
            note: "buy milk".to_string(),
        })
        .await
        .expect("create");

    assert_eq!(note, Note::new("new-1", "buy milk"));
    let requests = state.http_requests.lock().await;
    assert_eq!(requests[0].0, None);
    assert!(requests[0].1.query.contains("createNote"));
    assert_eq!(
        requests[0].1.variables,
        Some(json!({ "input": { "note": "buy milk" } }))
    );
}

#[tokio::test]
async fn update_and_delete_round_trip_ids() {
    let api_url = spawn_notes_server(ServerState::default()).await;
    let client = GraphQlClient::new(&api_url).expect("client");

    let updated = client
        .update_note(UpdateNoteInput {
            id: "1".into(),
            note: "b".to_string(),
        })
        .await
        .expect("update");
    assert_eq!(updated, Note::new("1", "b"));

    let deleted = client
        .delete_note(DeleteNoteInput { id: "1".into() })
        .await
        .expect("delete");
    assert_eq!(deleted.id.as_str(), "1");
}

#[tokio::test]
async fn graphql_errors_become_client_errors() {
    let api_url = spawn_notes_server(ServerState::default()).await;
    let client = GraphQlClient::new(&api_url).expect("client");

    let err = client
        .update_note(UpdateNoteInput {
            id: "missing".into(),
            note: "x".to_string(),
        })
        .await
        .expect_err("must fail");

    let ClientError::GraphQl(errors) = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(
        errors[0].error_type.as_deref(),
        Some("DynamoDB:ConditionalCheckFailedException")
    );
    assert!(err.is_remote_rejection());
    assert!(err.to_string().contains("conditional request failed"));
}

#[tokio::test]
async fn null_mutation_result_is_missing_data() {
    let api_url = spawn_notes_server(ServerState::default()).await;
    let client = GraphQlClient::new(&api_url).expect("client");

    let err = client
        .create_note(CreateNoteInput {
            note: String::new(),
        })
        .await
        .expect_err("must fail");

    assert!(matches!(err, ClientError::MissingData("createNote")));
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/graphql",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let client = GraphQlClient::new(&format!("http://{addr}/graphql")).expect("client");

    let err = client.list_notes().await.expect_err("must fail");

    match err {
        ClientError::Http { status, body } => {
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body, "try later");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn subscription_handshakes_answers_ping_and_forwards_events() {
    let (completed_tx, completed_rx) = oneshot::channel();
    let state = ServerState {
        completed: Arc::new(Mutex::new(Some(completed_tx))),
        ..ServerState::default()
    };
    let api_url = spawn_notes_server(state.clone()).await;
    let client = GraphQlClient::new(&api_url)
        .expect("client")
        .with_credentials(credentials());

    let mut subscription = client
        .subscribe(NoteEventKind::Created)
        .await
        .expect("subscribe");
    assert_eq!(subscription.kind(), NoteEventKind::Created);

    let note = subscription
        .next()
        .await
        .expect("event")
        .expect("decoded note");
    assert_eq!(note, Note::new("1", "from feed"));
    assert_eq!(*state.pongs.lock().await, 1);
    assert_eq!(
        state.init_payloads.lock().await[0],
        Some(json!({ "x-api-key": "da2-test" }))
    );

    subscription.unsubscribe().await;
    let completed_id = completed_rx.await.expect("complete sent");
    assert!(!completed_id.is_empty());
}

#[tokio::test]
async fn subscription_error_message_ends_feed() {
    let api_url = spawn_notes_server(ServerState::default()).await;
    let client = GraphQlClient::new(&api_url).expect("client");

    let mut subscription = client
        .subscribe(NoteEventKind::Deleted)
        .await
        .expect("subscribe");

    let err = subscription
        .next()
        .await
        .expect("error item")
        .expect_err("feed error");
    assert!(matches!(err, ClientError::GraphQl(_)));
    assert!(subscription.next().await.is_none());
}

#[test]
fn realtime_url_swaps_scheme_and_keeps_path() {
    let api_url = Url::parse("https://example.appsync-api.eu-west-1.amazonaws.com/graphql")
        .expect("url");
    assert_eq!(
        realtime_url_for(&api_url).expect("realtime").as_str(),
        "wss://example.appsync-api.eu-west-1.amazonaws.com/graphql"
    );

    let local = Url::parse("http://127.0.0.1:4000/graphql").expect("url");
    assert_eq!(
        realtime_url_for(&local).expect("realtime").as_str(),
        "ws://127.0.0.1:4000/graphql"
    );
}

#[test]
fn rejects_unsupported_endpoint_schemes() {
    assert!(matches!(
        GraphQlClient::new("ftp://example.com/graphql"),
        Err(ClientError::InvalidUrl { .. })
    ));
    assert!(matches!(
        GraphQlClient::new("not a url"),
        Err(ClientError::InvalidUrl { .. })
    ));

    let client = GraphQlClient::new("http://localhost:4000/graphql").expect("client");
    assert!(matches!(
        client.with_realtime_url("http://localhost:4000/realtime"),
        Err(ClientError::InvalidUrl { .. })
    ));
}

#[test]
fn explicit_realtime_url_overrides_derived_one() {
    let client = GraphQlClient::new("https://api.example.com/graphql")
        .expect("client")
        .with_realtime_url("wss://realtime.example.com/graphql")
        .expect("realtime");
    assert_eq!(client.api_url().as_str(), "https://api.example.com/graphql");
    assert_eq!(
        client.realtime_url().as_str(),
        "wss://realtime.example.com/graphql"
    );
}

#[test]
fn connection_payload_mirrors_http_headers() {
    assert_eq!(Credentials::default().connection_payload(), None);
    let credentials = Credentials {
        api_key: Some("da2-key".to_string()),
        auth_token: Some("eyJ.token".to_string()),
    };
    assert_eq!(
        credentials.connection_payload(),
        Some(json!({ "x-api-key": "da2-key", "Authorization": "eyJ.token" }))
    );
}

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dummy::state::{ClientFrame, DummyState};

pub fn router(state: DummyState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route(
            "/{*path}",
            get(read_handler)
                .post(create_handler)
                .patch(patch_handler)
                .put(replace_handler)
                .delete(delete_handler),
        )
        .with_state(state)
}

/// `a/b/c` names a collection, `a/b/c/d` an item in it.
enum Target {
    Collection(String),
    Item { collection: String, id: String },
}

impl Target {
    fn parse(path: &str) -> Option<Target> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (last, rest) = segments.split_last()?;
        if segments.len() % 2 == 1 {
            Some(Target::Collection(format!("/{}", segments.join("/"))))
        } else {
            Some(Target::Item {
                collection: format!("/{}", rest.join("/")),
                id: last.to_string(),
            })
        }
    }
}

fn found(value: Option<Value>) -> Response {
    match value {
        Some(value) => Json(value).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn read_handler(State(state): State<DummyState>, Path(path): Path<String>) -> Response {
    match Target::parse(&path) {
        Some(Target::Collection(collection)) => Json(state.list(&collection)).into_response(),
        Some(Target::Item { collection, id }) => found(state.get(&collection, &id)),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_handler(
    State(state): State<DummyState>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(Target::Collection(collection)) = Target::parse(&path) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    match state.create(&collection, body) {
        Some(created) => (StatusCode::CREATED, Json(created)).into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn patch_handler(
    State(state): State<DummyState>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(Target::Item { collection, id }) = Target::parse(&path) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let Value::Object(fields) = body else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    found(state.patch(&collection, &id, fields))
}

async fn replace_handler(
    State(state): State<DummyState>,
    Path(path): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(Target::Item { collection, id }) = Target::parse(&path) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    found(state.replace(&collection, &id, body))
}

async fn delete_handler(State(state): State<DummyState>, Path(path): Path<String>) -> Response {
    let Some(Target::Item { collection, id }) = Target::parse(&path) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    match state.delete(&collection, &id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DummyState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: DummyState) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = state.connect(tx);
    let shutdown = state.shutdown_token();
    tracing::info!(client, "socket connected");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            frame = rx.recv() => match frame {
                Some(ClientFrame::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(ClientFrame::Close) | None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = state.handle_command(client, text.as_str()) {
                        if socket.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.disconnect(client);
    tracing::info!(client, "socket disconnected");
}

use crate::game;
use crate::registry::Registry;
use crate::session::SessionCmd;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use playnine_protocol::{
    validate_player_name, validate_table_name, ActionError, ErrorMsg, Intent, JoinRequest,
    LeaveRequest,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// WebSocket close code for a table name that fails validation.
const CLOSE_INVALID_NAME: u16 = 4000;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub static_dir: PathBuf,
}

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/play9", get(lobby_page))
        .route("/play9/table/{name}", get(table_page))
        .route("/play9/player/{name}", get(player_page))
        .route("/play9/join", post(join_table))
        .route("/play9/leave", post(leave_table))
        .route("/play9/api/table/{name}", get(table_state))
        .route("/play9/ws/{name}", get(ws_upgrade))
        .with_state(app)
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

fn json_frame(frame: String) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        frame,
    )
        .into_response()
}

/// ---- pages (thin boundary; the real client is static assets) ----

async fn serve_page(dir: &std::path::Path, file: &str) -> Response {
    match tokio::fs::read_to_string(dir.join(file)).await {
        Ok(body) => Html(body).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "page not found").into_response(),
    }
}

async fn lobby_page(State(app): State<AppState>) -> Response {
    serve_page(&app.static_dir, "lobby.html").await
}

async fn table_page(State(app): State<AppState>, Path(name): Path<String>) -> Response {
    if validate_table_name(&name).is_err() {
        return detail(StatusCode::BAD_REQUEST, "Invalid table name");
    }
    serve_page(&app.static_dir, "table.html").await
}

async fn player_page(State(app): State<AppState>, Path(name): Path<String>) -> Response {
    if validate_table_name(&name).is_err() {
        return detail(StatusCode::BAD_REQUEST, "Invalid table name");
    }
    serve_page(&app.static_dir, "player.html").await
}

/// ---- join / leave / state ----

async fn join_table(State(app): State<AppState>, Json(req): Json<JoinRequest>) -> Response {
    let table_name = match validate_table_name(&req.table_name) {
        Ok(n) => n,
        Err(e) => return detail(StatusCode::BAD_REQUEST, e.0),
    };
    let player_name = match req
        .player_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        None => None,
        Some(raw) => match validate_player_name(raw) {
            Ok(n) => Some(n),
            Err(e) => return detail(StatusCode::BAD_REQUEST, e.0),
        },
    };

    let handle = app.registry.get_or_create(&table_name).await;
    let (reply_tx, reply_rx) = oneshot::channel();
    let cmd = SessionCmd::Join {
        player_name,
        reply: reply_tx,
    };
    if handle.send(cmd).await.is_err() {
        return detail(StatusCode::SERVICE_UNAVAILABLE, "Table unavailable");
    }
    match reply_rx.await {
        Ok(Ok(resp)) => Json(resp).into_response(),
        Ok(Err(e)) => detail(StatusCode::BAD_REQUEST, e.to_string()),
        Err(_) => detail(StatusCode::SERVICE_UNAVAILABLE, "Table unavailable"),
    }
}

async fn leave_table(State(app): State<AppState>, Json(req): Json<LeaveRequest>) -> Response {
    let table_name = match validate_table_name(&req.table_name) {
        Ok(n) => n,
        Err(e) => return detail(StatusCode::BAD_REQUEST, e.0),
    };
    // Leaving a table that does not exist is already done.
    if let Some(handle) = app.registry.get(&table_name) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = SessionCmd::Leave {
            player_id: req.player_id,
            reply: reply_tx,
        };
        if handle.send(cmd).await.is_ok() {
            let _ = reply_rx.await;
        }
    }
    Json(json!({ "ok": true })).into_response()
}

async fn table_state(State(app): State<AppState>, Path(name): Path<String>) -> Response {
    let table_name = match validate_table_name(&name) {
        Ok(n) => n,
        Err(_) => return detail(StatusCode::BAD_REQUEST, "Invalid table name"),
    };
    let Some(handle) = app.registry.get(&table_name) else {
        return Json(game::empty_snapshot(&table_name)).into_response();
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .send(SessionCmd::Snapshot { reply: reply_tx })
        .await
        .is_err()
    {
        return Json(game::empty_snapshot(&table_name)).into_response();
    }
    match reply_rx.await {
        Ok(frame) => json_frame(frame),
        Err(_) => Json(game::empty_snapshot(&table_name)).into_response(),
    }
}

/// ---- websocket ----

#[derive(Deserialize)]
struct WsParams {
    #[serde(default)]
    id: Option<Uuid>,
}

async fn ws_upgrade(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app, name, params.id))
}

async fn handle_socket(
    mut socket: WebSocket,
    app: AppState,
    raw_name: String,
    player_id: Option<Uuid>,
) {
    let Ok(table_name) = validate_table_name(&raw_name) else {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_INVALID_NAME,
                reason: "invalid table name".into(),
            })))
            .await;
        return;
    };

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let handle = app.registry.get_or_create(&table_name).await;
    let (reply_tx, reply_rx) = oneshot::channel();
    let subscribe = SessionCmd::Subscribe {
        conn_id,
        player_id,
        tx: out_tx.clone(),
        reply: reply_tx,
    };
    let accepted = if handle.send(subscribe).await.is_ok() {
        match reply_rx.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                send_error_frame(&out_tx, &e);
                false
            }
            Err(_) => false,
        }
    } else {
        false
    };
    if !accepted {
        drop(out_tx);
        let _ = writer.await;
        return;
    }
    debug!(table = %table_name, conn_id, player = ?player_id, "websocket attached");

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<Intent>(&text) {
                Ok(intent) => {
                    if handle
                        .send(SessionCmd::Intent { conn_id, intent })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(_) => {
                    send_error_frame(&out_tx, &ActionError::InvalidInput("bad json"));
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = handle.send(SessionCmd::Unsubscribe { conn_id }).await;
    drop(out_tx);
    let _ = writer.await;
    debug!(table = %table_name, conn_id, "websocket detached");
}

fn send_error_frame(out_tx: &mpsc::UnboundedSender<String>, err: &ActionError) {
    if let Ok(frame) = serde_json::to_string(&ErrorMsg::from_action(err)) {
        let _ = out_tx.send(frame);
    }
}

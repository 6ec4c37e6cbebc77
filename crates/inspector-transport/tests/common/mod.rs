//! Small axum servers for exercising the network transports.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

const SESSION_HEADER: &str = "mcp-session-id";

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    addr
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn echo_result(headers: &HeaderMap, frame: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": frame["id"],
        "result": {
            "method": frame["method"],
            "apiKey": header(headers, "x-api-key"),
            "session": header(headers, SESSION_HEADER),
        }
    })
}

fn announcement() -> Vec<Result<Event, Infallible>> {
    vec![
        Ok(Event::default().comment("hello")),
        Ok(Event::default().event("endpoint").data("/messages?sessionId=test")),
    ]
}

#[derive(Clone)]
struct SseState {
    replies: mpsc::UnboundedSender<Value>,
    pending: Arc<Mutex<Option<mpsc::UnboundedReceiver<Value>>>>,
}

async fn open_stream(State(state): State<SseState>) -> impl IntoResponse {
    let receiver = state.pending.lock().await.take();
    let messages = stream::unfold(receiver, |receiver| async move {
        let mut receiver = receiver?;
        let frame = receiver.recv().await?;
        let event = Event::default().event("message").data(frame.to_string());
        Some((Ok::<_, Infallible>(event), Some(receiver)))
    });
    Sse::new(stream::iter(announcement()).chain(messages))
}

async fn open_short_stream() -> impl IntoResponse {
    Sse::new(stream::iter(announcement()))
}

async fn post_message(
    State(state): State<SseState>,
    headers: HeaderMap,
    Json(frame): Json<Value>,
) -> StatusCode {
    let reply = if frame.get("id").is_some() {
        echo_result(&headers, &frame)
    } else {
        json!({"jsonrpc": "2.0", "method": "notifications/ack"})
    };
    let _ = state.replies.send(reply);
    StatusCode::ACCEPTED
}

/// SSE server: `GET /sse` announces `/messages`; every `POST`ed request is
/// answered on the stream with an echo result and every notification with
/// `notifications/ack`. `GET /sse-once` announces the endpoint and then ends
/// the stream.
pub async fn spawn_sse_server() -> SocketAddr {
    let (replies, pending) = mpsc::unbounded_channel();
    let state = SseState {
        replies,
        pending: Arc::new(Mutex::new(Some(pending))),
    };

    let router = Router::new()
        .route("/sse", get(open_stream))
        .route("/sse-once", get(open_short_stream))
        .route("/messages", post(post_message))
        .with_state(state);
    serve(router).await
}

async fn mcp_post(headers: HeaderMap, Json(frame): Json<Value>) -> Response {
    let session = [(SESSION_HEADER, "sess-1")];
    if frame.get("id").is_none() {
        return (StatusCode::ACCEPTED, session).into_response();
    }

    let result = echo_result(&headers, &frame);
    if frame["method"] == "stream" {
        let progress = json!({"jsonrpc": "2.0", "method": "notifications/progress"});
        let events = stream::iter([
            Ok::<_, Infallible>(Event::default().data(progress.to_string())),
            Ok(Event::default().event("message").data(result.to_string())),
        ]);
        return (session, Sse::new(events)).into_response();
    }
    (session, Json(result)).into_response()
}

/// Streamable HTTP server on `/mcp`: requests for method `stream` are
/// answered with a `text/event-stream` body, other requests with JSON. Every
/// response assigns session `sess-1`.
pub async fn spawn_streamable_http_server() -> SocketAddr {
    let router = Router::new().route("/mcp", post(mcp_post).delete(|| async { StatusCode::OK }));
    serve(router).await
}

/// Server whose `/mcp` endpoint always answers `500 nope`.
pub async fn spawn_failing_server() -> SocketAddr {
    let router = Router::new().route(
        "/mcp",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "nope") }),
    );
    serve(router).await
}

/// MCP Server Transports
///
/// This module contains the transports that feed the dispatcher:
/// - HTTP + SSE with Actix Web: `GET /sse` opens a session stream and
///   `POST /message?sessionId=...` submits one JSON-RPC request to it
/// - STDIO: newline-delimited JSON-RPC on stdin/stdout
/// - Informational endpoints (`/`, `/health`, `/metrics`)
///
/// On the HTTP transport a POST is only acknowledged (202); the JSON-RPC
/// response travels back asynchronously on the session's SSE stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use actix_web::{
    App, HttpResponse, HttpServer, Result,
    http::{Method, header},
    middleware::{Compress, DefaultHeaders, Logger},
    web,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::core::config::ServerConfig;
use crate::core::dispatcher::Dispatcher;
use crate::core::error::TransportError;
use crate::core::protocol::{MCPRequest, MCPResponse, PARSE_ERROR};
use crate::core::session::{SessionManager, SseFrame};

/// Path that opens an SSE session.
pub const SSE_PATH: &str = "/sse";

/// Path that accepts JSON-RPC submissions for a session.
pub const MESSAGE_PATH: &str = "/message";

/// Browser clients may open streams and post from any origin.
pub const ALLOW_ANY_ORIGIN: (header::HeaderName, &str) = (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");

/// Application state shared across all worker threads in HTTP mode.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionManager>,
    /// Submissions received on the message endpoint
    pub requests: AtomicU64,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, sessions: Arc<SessionManager>) -> Self {
        Self {
            dispatcher,
            sessions,
            requests: AtomicU64::new(0),
        }
    }
}

#[derive(Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Register all HTTP routes.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route(SSE_PATH, web::get().to(sse_connect))
        .service(
            web::resource(MESSAGE_PATH)
                .route(web::post().to(post_message))
                .route(web::method(Method::OPTIONS).to(preflight)),
        )
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/", web::get().to(server_info));
}

/// Open an SSE session.
///
/// The first frame is the `endpoint` event naming the submission path for
/// the new session.
///
/// The session is closed when actix drops the response stream. actix only
/// notices a vanished client when a write to it fails, so a silent
/// disconnect is picked up by the next frame at the latest, i.e. within one
/// keep-alive interval. A client that disconnects while a frame is queued
/// closes right away.
async fn sse_connect(state: web::Data<AppState>) -> HttpResponse {
    let (token, stream) = state.sessions.open();

    let endpoint = format!("{}?sessionId={}", MESSAGE_PATH, token);
    if let Some(session) = state.sessions.get(&token) {
        session.send(SseFrame::Endpoint(endpoint));
    }

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(header::CacheControl(vec![header::CacheDirective::NoCache]))
        .insert_header(ALLOW_ANY_ORIGIN)
        // Keep the compression middleware from buffering the stream
        .insert_header((header::CONTENT_ENCODING, "identity"))
        // Disable nginx buffering for real-time streaming
        .insert_header(("x-accel-buffering", "no"))
        .streaming(stream.map(|frame| Ok::<_, Infallible>(frame.to_bytes())))
}

/// Accept one JSON-RPC request for an open session.
///
/// Rejections (missing/unknown session, unparseable body) are answered here
/// with 400. Anything else is acknowledged with 202 right away and processed
/// in the background; its response, if any, goes to the session's stream.
async fn post_message(
    state: web::Data<AppState>,
    query: web::Query<MessageQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, TransportError> {
    state.requests.fetch_add(1, Ordering::Relaxed);

    let token = query
        .into_inner()
        .session_id
        .filter(|token| !token.is_empty())
        .ok_or(TransportError::MissingSession)?;

    if state.sessions.get(&token).is_none() {
        tracing::warn!(session = %token, "submission for unknown session");
        return Err(TransportError::UnknownSession(token));
    }

    // the response is delivered on the SSE stream, not awaited here
    let _pending = state.dispatcher.handle(token.clone(), &body).inspect_err(|e| {
        tracing::warn!(session = %token, error = %e, "rejected submission");
    })?;

    Ok(HttpResponse::Accepted()
        .content_type("text/plain; charset=utf-8")
        .insert_header(ALLOW_ANY_ORIGIN)
        .body("Accepted"))
}

/// CORS preflight for browser clients posting JSON.
async fn preflight() -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header(ALLOW_ANY_ORIGIN)
        .insert_header(("Access-Control-Allow-Methods", "POST, OPTIONS"))
        .insert_header(("Access-Control-Allow-Headers", "Content-Type"))
        .finish()
}

/// Health check endpoint handler.
async fn health() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok"
    })))
}

async fn server_info(state: web::Data<AppState>) -> Result<HttpResponse> {
    let info = state.dispatcher.info();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "name": info.name,
        "version": info.version,
        "endpoints": {
            "sse": SSE_PATH,
            "message": MESSAGE_PATH
        }
    })))
}

/// Metrics endpoint handler.
async fn metrics_handler(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "requests_total": state.requests.load(Ordering::Relaxed),
        "active_sessions": state.sessions.len(),
        "status": "ok"
    })))
}

/// Run the MCP server in HTTP mode.
///
/// Binds to the configured address and serves until shutdown, then closes
/// any sessions still registered.
pub async fn run_server_http(
    config: &ServerConfig,
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionManager>,
) -> std::io::Result<()> {
    let bind_addr = config.bind_addr();
    let state = web::Data::new(AppState::new(dispatcher, sessions.clone()));

    tracing::info!(
        bind = %bind_addr,
        workers = config.workers,
        keep_alive_secs = config.keep_alive.as_secs(),
        "MCP server starting (HTTP + SSE)"
    );

    let result = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(ALLOW_ANY_ORIGIN),
            )
            // %r = request line, %s = status, %D = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(routes)
    })
    .workers(config.workers)
    .max_connections(10000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await;

    if !sessions.is_empty() {
        sessions.close_all();
    }
    tracing::info!("HTTP server stopped");
    result
}

/// Run the MCP server in STDIO mode.
///
/// Reads one JSON-RPC request per line from stdin and writes each response on
/// its own line to stdout. Logging goes to stderr so stdout only carries
/// protocol traffic.
pub async fn run_server_stdio(dispatcher: Arc<Dispatcher>) -> std::io::Result<()> {
    tracing::info!("MCP server starting (STDIO)");

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&dispatcher, stdin, stdout).await
}

async fn serve_lines<R, W>(dispatcher: &Dispatcher, input: R, mut output: W) -> std::io::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<MCPRequest>(&line) {
            Ok(request) => dispatcher.dispatch(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                parse_error_response(&line, &e)
            }
        };

        if let Some(response) = response {
            write_line(&mut output, &response).await?;
        }
    }

    output.flush().await
}

/// Build a parse-error response when the line still carries a usable id.
fn parse_error_response(line: &str, error: &serde_json::Error) -> Option<MCPResponse> {
    let partial = serde_json::from_str::<serde_json::Value>(line).ok()?;
    let id = partial.get("id").filter(|id| !id.is_null())?.clone();
    Some(MCPResponse::failure(
        id,
        PARSE_ERROR,
        format!("Parse error: {}", error),
    ))
}

async fn write_line<W: AsyncWrite + Unpin>(
    output: &mut W,
    response: &MCPResponse,
) -> std::io::Result<()> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n');
    output.write_all(&json).await?;
    // Flush after each response for low latency
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::tests::dispatcher;
    use crate::core::protocol::INTERNAL_ERROR;
    use actix_web::body::{BoxBody, MessageBody};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use futures_util::future::poll_fn;
    use serde_json::{Value, json};
    use std::pin::Pin;

    fn test_state() -> web::Data<AppState> {
        let sessions = Arc::new(SessionManager::default());
        let dispatcher = Arc::new(dispatcher(sessions.clone()));
        web::Data::new(AppState::new(dispatcher, sessions))
    }

    async fn next_chunk(body: &mut BoxBody, wait: Duration) -> Option<String> {
        let polled = tokio::time::timeout(wait, poll_fn(|cx| Pin::new(&mut *body).poll_next(cx)))
            .await
            .ok()?;
        let chunk = polled?.ok()?;
        Some(String::from_utf8(chunk.to_vec()).unwrap())
    }

    async fn next_frame(body: &mut BoxBody) -> String {
        next_chunk(body, Duration::from_secs(2))
            .await
            .expect("expected an SSE frame")
    }

    fn message_payload(frame: &str) -> Value {
        let data = frame
            .strip_prefix("event: message\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap_or_else(|| panic!("not a message frame: {frame:?}"));
        serde_json::from_str(data).unwrap()
    }

    fn post(path: &str, body: &'static str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(path)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload(body)
    }

    fn allow_origin<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Option<String> {
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    macro_rules! open_session {
        ($app:expr) => {{
            let resp = test::call_service(&$app, test::TestRequest::get().uri(SSE_PATH).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let mut body = resp.map_into_boxed_body().into_body();
            let announcement = next_frame(&mut body).await;
            let path = announcement
                .strip_prefix("event: endpoint\ndata: ")
                .and_then(|rest| rest.strip_suffix("\n\n"))
                .expect("first frame announces the endpoint")
                .to_string();
            (path, body)
        }};
    }

    #[actix_rt::test]
    async fn sse_headers() {
        let app = test::init_service(App::new().app_data(test_state()).configure(routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri(SSE_PATH).to_request()).await;

        let headers = resp.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(header::CONTENT_ENCODING).unwrap(), "identity");
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        // connection management is left to actix; HTTP/2 forbids the header
        assert!(headers.get(header::CONNECTION).is_none());
    }

    #[actix_rt::test]
    async fn browser_clients_can_reach_every_session_endpoint() {
        // no DefaultHeaders here: the handlers set the CORS header themselves
        let app = test::init_service(App::new().app_data(test_state()).configure(routes)).await;
        let (path, _body) = open_session!(app);

        let resp = test::call_service(
            &app,
            test::TestRequest::default().method(Method::OPTIONS).uri(&path).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(allow_origin(&resp).as_deref(), Some("*"));

        let resp = test::call_service(&app, post(&path, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(allow_origin(&resp).as_deref(), Some("*"));

        let resp = test::call_service(&app, post(&path, "{not json").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(allow_origin(&resp).as_deref(), Some("*"));
    }

    #[actix_rt::test]
    async fn list_tools_round_trip() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;
        let (path, mut body) = open_session!(app);

        assert!(path.starts_with("/message?sessionId="));
        let token = path.trim_start_matches("/message?sessionId=");
        assert!(state.sessions.get(token).is_some());

        let resp = test::call_service(
            &app,
            post(&path, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(test::read_body(resp).await, "Accepted");

        let payload = message_payload(&next_frame(&mut body).await);
        assert_eq!(payload["jsonrpc"], "2.0");
        assert_eq!(payload["id"], 1);
        let names: Vec<_> = payload["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["add", "fail", "slow"]);
    }

    #[actix_rt::test]
    async fn executor_failure_still_acks() {
        let app = test::init_service(App::new().app_data(test_state()).configure(routes)).await;
        let (path, mut body) = open_session!(app);

        let resp = test::call_service(
            &app,
            post(
                &path,
                r#"{"jsonrpc":"2.0","id":"c1","method":"tools/call","params":{"name":"fail","arguments":{}}}"#,
            )
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let payload = message_payload(&next_frame(&mut body).await);
        assert_eq!(payload["id"], "c1");
        assert_eq!(payload["error"]["code"], INTERNAL_ERROR);
        assert_eq!(payload["error"]["message"], "upstream returned 503");
    }

    #[actix_rt::test]
    async fn notifications_are_acked_without_a_frame() {
        let app = test::init_service(App::new().app_data(test_state()).configure(routes)).await;
        let (path, mut body) = open_session!(app);

        let resp = test::call_service(
            &app,
            post(&path, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(next_chunk(&mut body, Duration::from_millis(100)).await.is_none());
    }

    #[actix_rt::test]
    async fn stale_session_is_rejected() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;
        let (path, body) = open_session!(app);

        drop(body);
        assert!(state.sessions.is_empty());

        let resp = test::call_service(&app, post(&path, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn unknown_session_does_not_touch_live_streams() {
        let app = test::init_service(App::new().app_data(test_state()).configure(routes)).await;
        let (_path, mut body) = open_session!(app);

        let resp = test::call_service(
            &app,
            post("/message?sessionId=not-a-session", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body_json: Value = test::read_body_json(resp).await;
        assert!(body_json["error"].as_str().unwrap().contains("not-a-session"));

        assert!(next_chunk(&mut body, Duration::from_millis(100)).await.is_none());
    }

    #[actix_rt::test]
    async fn missing_session_and_bad_body() {
        let app = test::init_service(App::new().app_data(test_state()).configure(routes)).await;
        let (path, mut body) = open_session!(app);

        let resp = test::call_service(&app, post(MESSAGE_PATH, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(&app, post(&path, "{not json").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(next_chunk(&mut body, Duration::from_millis(100)).await.is_none());
    }

    #[actix_rt::test]
    async fn sessions_do_not_cross_talk() {
        let app = test::init_service(App::new().app_data(test_state()).configure(routes)).await;
        let (path_a, mut body_a) = open_session!(app);
        let (path_b, mut body_b) = open_session!(app);
        assert_ne!(path_a, path_b);

        let resp = test::call_service(&app, post(&path_b, r#"{"jsonrpc":"2.0","id":42,"method":"ping"}"#).to_request()).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let payload = message_payload(&next_frame(&mut body_b).await);
        assert_eq!(payload, json!({"jsonrpc": "2.0", "id": 42, "result": {}}));
        assert!(next_chunk(&mut body_a, Duration::from_millis(100)).await.is_none());
    }

    #[actix_rt::test]
    async fn informational_endpoints() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let info: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(info["name"], "test-server");
        assert_eq!(info["endpoints"]["sse"], SSE_PATH);

        let (_path, _body) = open_session!(app);
        let metrics: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(metrics["active_sessions"], 1);
    }

    #[tokio::test]
    async fn stdio_answers_requests_and_skips_notifications() {
        let d = dispatcher(Arc::new(SessionManager::default()));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"oops":true}"#,
            "\n",
            "garbage\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"nope"}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve_lines(&d, input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        assert_eq!(lines[1]["id"], 2);
        assert_eq!(lines[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(lines[2]["error"]["code"], INTERNAL_ERROR);
    }
}

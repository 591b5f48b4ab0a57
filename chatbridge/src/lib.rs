pub mod adapters;
pub mod app;
pub mod domain;
pub mod ports;
pub mod telemetry;

pub use app::bridge::{BridgeConfig, BridgeError, ChatBridge, OutputSubscription};

use adapters::session::{MemorySession, SessionError};
use adapters::ui::{pump_ui_socket, ChannelUi, HeadlessUi};
use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use domain::bridge::BindingId;
use domain::conversation::{EntryTimestamp, LogEntry, LogError, NewLogEntry, PendingGatedAction};
use futures::{SinkExt, StreamExt};
use ports::session::SessionPort;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub read_timeout_ms: u64,
    pub otlp_endpoint: Option<String>,
    /// Keep a renderless input field bound while no UI is attached.
    pub headless_ui: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 17719)),
            read_timeout_ms: 2000,
            otlp_endpoint: None,
            headless_ui: true,
        }
    }
}

#[derive(Clone)]
struct AppState {
    bridge: ChatBridge,
    session: Arc<MemorySession>,
    headless_ui: bool,
    started_at: Instant,
    telemetry_ready: bool,
}

impl AppState {
    fn new(settings: &Settings, metrics: Option<Arc<telemetry::BridgeMetrics>>) -> Self {
        let config = BridgeConfig::default()
            .with_read_timeout(Duration::from_millis(settings.read_timeout_ms));
        Self {
            telemetry_ready: metrics.is_some(),
            bridge: ChatBridge::new(config, metrics),
            session: Arc::new(MemorySession::new()),
            headless_ui: settings.headless_ui,
            started_at: Instant::now(),
        }
    }

    fn attach_headless(&self) -> Result<Option<BindingId>, BridgeError> {
        if !self.headless_ui {
            return Ok(None);
        }
        self.bridge
            .bind(self.session.clone(), Arc::new(HeadlessUi::new()))
            .map(Some)
    }

    /// Called when the UI behind `binding_id` goes away.
    fn release_ui(&self, binding_id: &BindingId) {
        if !self.bridge.unbind_if(binding_id) {
            debug!(%binding_id, "ui detached after being replaced");
            return;
        }
        info!(%binding_id, "ui detached");
        match self.attach_headless() {
            Ok(Some(headless)) => info!(binding_id = %headless, "headless ui re-attached"),
            Ok(None) => {}
            Err(err) => warn!(%err, "re-attaching headless ui failed"),
        }
    }
}

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let (metrics, provider) = if let Some(ref endpoint) = settings.otlp_endpoint {
        let (provider, metrics) = telemetry::init_metrics(Some(endpoint.clone()), "chatbridged")?;
        (Some(Arc::new(metrics)), Some(provider))
    } else {
        (None, None)
    };

    let state = AppState::new(&settings, metrics);
    if let Some(binding_id) = state.attach_headless()? {
        info!(%binding_id, "headless ui attached");
    }

    let app = router(state.clone());
    let listener = TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("binding {}", settings.listen))?;
    info!(
        listening = %settings.listen,
        read_timeout_ms = settings.read_timeout_ms,
        headless_ui = settings.headless_ui,
        "chatbridged started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.bridge.unbind();

    if let Some(provider) = provider {
        if let Err(e) = telemetry::shutdown_metrics(provider) {
            warn!("Failed to shutdown telemetry: {e:#}");
        }
    }

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/status", get(status))
        .route("/v1/input", get(read_input).put(set_input))
        .route("/v1/submit", post(submit))
        .route("/v1/output", get(read_output))
        .route("/v1/approve", post(approve))
        .route("/v1/notifications", get(notifications_ws))
        .route("/v1/ui", get(ui_ws))
        .route("/v1/session/entries", post(append_entry))
        .route("/v1/session/entries/:timestamp", put(replace_entry))
        .route(
            "/v1/session/pending",
            post(raise_pending).delete(withdraw_pending),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = ctrl_c().await;
    info!("shutdown signal received");
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: &'static str,
    uptime_ms: u128,
    bound: bool,
    binding_id: Option<String>,
    read_timeout_ms: u128,
    entries: usize,
    pending_action: Option<PendingGatedAction>,
    subscribers: usize,
    telemetry_ready: bool,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let binding_id = state.bridge.binding_id();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_ms: state.started_at.elapsed().as_millis(),
        bound: binding_id.is_some(),
        binding_id: binding_id.map(|id| id.to_string()),
        read_timeout_ms: state.bridge.config().read_timeout.as_millis(),
        entries: state.session.len(),
        pending_action: state.session.pending_action().ok().flatten(),
        subscribers: state.bridge.subscriber_count(),
        telemetry_ready: state.telemetry_ready,
    })
}

#[derive(Debug, Serialize)]
struct TextResponse {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct SetInputRequest {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    text: Option<String>,
}

async fn read_input(State(state): State<AppState>) -> Json<TextResponse> {
    Json(TextResponse {
        text: state.bridge.read_current_input().await,
    })
}

async fn set_input(
    State(state): State<AppState>,
    Json(payload): Json<SetInputRequest>,
) -> Json<OkResponse> {
    Json(OkResponse {
        ok: state.bridge.set_current_input(payload.text).await,
    })
}

async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Json<OkResponse> {
    Json(OkResponse {
        ok: state.bridge.submit(payload.text).await,
    })
}

async fn read_output(State(state): State<AppState>) -> Json<TextResponse> {
    Json(TextResponse {
        text: state.bridge.read_all_output(),
    })
}

async fn approve(State(state): State<AppState>) -> Json<OkResponse> {
    Json(OkResponse {
        ok: state.bridge.approve_pending_action().await,
    })
}

async fn notifications_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = stream_notifications(socket, state.bridge).await {
            warn!("notification stream terminated: {err:#}");
        }
    })
}

async fn stream_notifications(socket: WebSocket, bridge: ChatBridge) -> anyhow::Result<()> {
    let (subscription, mut output) = bridge.subscribe_output_stream();
    debug!(subscription = subscription.id(), "notification stream opened");
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            text = output.recv() => {
                let Some(text) = text else {
                    break;
                };
                sink.send(Message::Text(text)).await?;
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                }
            }
        }
    }

    debug!(subscription = subscription.id(), "notification stream closed");
    subscription.dispose();
    Ok(())
}

async fn ui_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| attach_ui(socket, state))
}

async fn attach_ui(socket: WebSocket, state: AppState) {
    let (ui, endpoint) = ChannelUi::pair();
    let binding_id = match state.bridge.bind(state.session.clone(), Arc::new(ui)) {
        Ok(binding_id) => binding_id,
        Err(err) => {
            warn!(%err, "ui attach failed");
            return;
        }
    };
    info!(%binding_id, "ui attached");

    if let Err(err) = pump_ui_socket(socket, endpoint).await {
        warn!(%binding_id, "ui socket terminated: {err:#}");
    }
    state.release_ui(&binding_id);
}

async fn append_entry(
    State(state): State<AppState>,
    Json(draft): Json<NewLogEntry>,
) -> Result<Json<LogEntry>, ApiError> {
    state
        .session
        .append(draft)
        .map(Json)
        .map_err(|err| session_error("append_entry", err))
}

async fn replace_entry(
    State(state): State<AppState>,
    Path(timestamp): Path<String>,
    Json(draft): Json<NewLogEntry>,
) -> Result<Json<LogEntry>, ApiError> {
    let timestamp: EntryTimestamp = timestamp
        .parse()
        .map_err(|err: String| ApiError::invalid("invalid_timestamp", err))?;
    state
        .session
        .replace(draft.stamp(timestamp))
        .map(Json)
        .map_err(|err| session_error("replace_entry", err))
}

#[derive(Debug, Deserialize)]
struct RaisePendingRequest {
    description: String,
}

async fn raise_pending(
    State(state): State<AppState>,
    Json(payload): Json<RaisePendingRequest>,
) -> Result<Json<PendingGatedAction>, ApiError> {
    if payload.description.trim().is_empty() {
        return Err(ApiError::invalid(
            "invalid_description",
            "description must not be empty",
        ));
    }
    state
        .session
        .request_approval(payload.description)
        .map(Json)
        .map_err(|err| session_error("raise_pending", err))
}

async fn withdraw_pending(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "withdrawn": state.session.withdraw_pending() }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn invalid(code: &'static str, err: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                code,
                message: err.into(),
            },
        }
    }

    fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status;
        let body = Json(self.body);
        (status, body).into_response()
    }
}

fn session_error(code: &'static str, err: SessionError) -> ApiError {
    match err {
        SessionError::Log(LogError::UnknownEntry(_)) => ApiError::not_found(code, err.to_string()),
        SessionError::Log(LogError::OutOfOrder { .. }) => ApiError::invalid(code, err.to_string()),
        SessionError::ActionPending(_) => ApiError::conflict(code, err.to_string()),
    }
}

//! HTTP and WebSocket Gateway
//!
//! Query surface over the windowed cache and the live tick stream.
//!
//! # Endpoints
//!
//! - `GET /api/ticks?symbol=<SYM>&lookback_hours=<1..=72>` - cached ticks, ascending
//! - `GET /api/ticks/latest?symbol=<SYM>` - newest cached tick or `null`
//! - `WS /ws/ticks?symbols=<CSV>` - ticks for a symbol set (`*` for all)
//! - `WS /ws/ticks/{symbol}` - ticks for one symbol
//!
//! # Connection lifecycle
//!
//! A connection is registered with the broadcaster once the upgrade
//! completes and stays subscribed to the same set until it closes. Inbound
//! messages are read with a bounded wait; running out the wait is not an
//! error. A receive error, a failed send, a close frame, eviction by the
//! broadcaster or server shutdown deregisters the connection and closes it.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::market::WindowEntry;
use crate::domain::subscription::{Subscription, normalize_symbol};
use crate::infrastructure::broadcast::SharedBroadcaster;
use crate::infrastructure::window::WindowedStore;

/// Default lookback for `/api/ticks`.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;
/// Accepted `lookback_hours` range.
pub const LOOKBACK_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=72;

const HOUR_MS: i64 = 60 * 60 * 1000;

// =============================================================================
// State and Router
// =============================================================================

/// Shared gateway state.
pub struct GatewayState {
    window: Arc<WindowedStore>,
    broadcaster: SharedBroadcaster,
    receive_timeout: Duration,
    shutdown: CancellationToken,
}

impl GatewayState {
    /// Create gateway state.
    #[must_use]
    pub const fn new(
        window: Arc<WindowedStore>,
        broadcaster: SharedBroadcaster,
        receive_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            window,
            broadcaster,
            receive_timeout,
            shutdown,
        }
    }
}

/// Gateway routes over `state`.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/ticks", get(recent_ticks))
        .route("/api/ticks/latest", get(latest_tick))
        .route("/ws/ticks", get(stream_symbols))
        .route("/ws/ticks/{symbol}", get(stream_symbol))
        .with_state(state)
}

/// Serve the gateway on an already bound listener until `state`'s shutdown
/// token fires.
///
/// # Errors
///
/// Returns `GatewayError::ServerFailed` if the HTTP server stops with an error.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>) -> Result<(), GatewayError> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| GatewayError::ServerFailed(e.to_string()))
}

/// Gateway HTTP server.
pub struct GatewayServer {
    port: u16,
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Create a new gateway server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<GatewayState>) -> Self {
        Self { port, state }
    }

    /// Bind and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if binding fails or the server stops with an error.
    pub async fn run(self) -> Result<(), GatewayError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Gateway listening");
        serve(listener, self.state).await?;
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

// =============================================================================
// Query Handlers
// =============================================================================

/// Query string of the cache endpoints.
#[derive(Debug, Deserialize)]
pub struct TicksQuery {
    symbol: Option<String>,
    lookback_hours: Option<String>,
}

impl TicksQuery {
    fn symbol(&self) -> Result<String, ApiError> {
        self.symbol
            .as_deref()
            .map(normalize_symbol)
            .filter(|s| !s.is_empty())
            .ok_or(ApiError::MissingSymbol)
    }

    fn lookback_hours(&self) -> Result<i64, ApiError> {
        let Some(raw) = self.lookback_hours.as_deref() else {
            return Ok(DEFAULT_LOOKBACK_HOURS);
        };
        raw.trim()
            .parse::<i64>()
            .ok()
            .filter(|hours| LOOKBACK_HOURS_RANGE.contains(hours))
            .ok_or_else(|| ApiError::InvalidLookback(raw.to_string()))
    }
}

async fn recent_ticks(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<TicksQuery>,
) -> Result<Json<Vec<WindowEntry>>, ApiError> {
    let symbol = query.symbol()?;
    let hours = query.lookback_hours()?;
    let until = Utc::now().timestamp_millis();
    let since = until - hours * HOUR_MS;
    Ok(Json(state.window.range(&symbol, since, until)))
}

async fn latest_tick(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<TicksQuery>,
) -> Result<Json<Option<WindowEntry>>, ApiError> {
    let symbol = query.symbol()?;
    Ok(Json(state.window.latest(&symbol)))
}

// =============================================================================
// Streaming Handlers
// =============================================================================

/// Query string of the multi-symbol stream.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    symbols: String,
}

async fn stream_symbols(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let subscription = Subscription::from_csv(&query.symbols);
    ws.on_upgrade(move |socket| handle_socket(socket, subscription, state))
}

async fn stream_symbol(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Path(symbol): Path<String>,
) -> Response {
    let subscription = Some(Subscription::single(&symbol));
    ws.on_upgrade(move |socket| handle_socket(socket, subscription, state))
}

/// Why a live connection ended.
#[derive(Debug)]
enum CloseReason {
    ClientClosed,
    ReceiveFailed(axum::Error),
    SendFailed(axum::Error),
    Evicted,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("client closed"),
            Self::ReceiveFailed(e) => write!(f, "receive failed: {e}"),
            Self::SendFailed(e) => write!(f, "send failed: {e}"),
            Self::Evicted => f.write_str("dropped by broadcaster"),
            Self::Shutdown => f.write_str("server shutdown"),
        }
    }
}

async fn handle_socket(
    mut socket: WebSocket,
    subscription: Option<Subscription>,
    state: Arc<GatewayState>,
) {
    let Some(subscription) = subscription else {
        tracing::debug!("Empty subscription, closing connection");
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let registry = state.broadcaster.registry();
    let (id, mut frames) = registry.register(subscription.clone());
    tracing::info!(connection = %id, subscription = %subscription, "Live connection opened");

    let (mut sender, mut receiver) = socket.split();

    let reason = loop {
        tokio::select! {
            () = state.shutdown.cancelled() => break CloseReason::Shutdown,

            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sender.send(Message::Text(frame.to_string().into())).await {
                        break CloseReason::SendFailed(e);
                    }
                }
                None => break CloseReason::Evicted,
            },

            inbound = tokio::time::timeout(state.receive_timeout, receiver.next()) => match inbound {
                // Nothing received in time; keep waiting.
                Err(_) => {}
                Ok(None | Some(Ok(Message::Close(_)))) => break CloseReason::ClientClosed,
                Ok(Some(Err(e))) => break CloseReason::ReceiveFailed(e),
                Ok(Some(Ok(_))) => {}
            },
        }
    };

    registry.deregister(id);
    if !matches!(reason, CloseReason::ClientClosed | CloseReason::SendFailed(_)) {
        let _ = sender.send(Message::Close(None)).await;
    }
    tracing::info!(connection = %id, reason = %reason, "Live connection closed");
}

// =============================================================================
// Errors
// =============================================================================

/// Request errors returned to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `symbol` query parameter missing or blank.
    #[error("query parameter 'symbol' is required")]
    MissingSymbol,

    /// `lookback_hours` not an integer in range.
    #[error("lookback_hours must be an integer between 1 and 72, got '{0}'")]
    InvalidLookback(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MissingSymbol => StatusCode::BAD_REQUEST,
            Self::InvalidLookback(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Gateway server errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use test_case::test_case;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::market::Tick;
    use crate::infrastructure::broadcast::Broadcaster;

    fn state_with(window: Arc<WindowedStore>) -> Arc<GatewayState> {
        Arc::new(GatewayState::new(
            window,
            Arc::new(Broadcaster::default()),
            Duration::from_secs(30),
            CancellationToken::new(),
        ))
    }

    async fn fetch(state: Arc<GatewayState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[allow(clippy::cast_precision_loss)]
    fn seeded_window() -> Arc<WindowedStore> {
        let window = Arc::new(WindowedStore::default());
        let now = Utc::now().timestamp_millis();
        for (minutes_ago, price) in [(30, 190.1), (10, 190.2), (2 * 60 + 5, 189.9)] {
            let ts = (now - minutes_ago * 60_000) as f64 / 1000.0;
            window.put("AAPL", &Tick::new("AAPL", price, 950, ts)).unwrap();
        }
        window
    }

    #[tokio::test]
    async fn recent_ticks_within_lookback_ascending() {
        let state = state_with(seeded_window());

        let (status, body) =
            fetch(Arc::clone(&state), "/api/ticks?symbol=aapl&lookback_hours=1").await;
        assert_eq!(status, StatusCode::OK);
        let prices: Vec<f64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["price"].as_f64().unwrap())
            .collect();
        assert_eq!(prices, vec![190.1, 190.2]);

        let (_, body) = fetch(state, "/api/ticks?symbol=AAPL").await;
        assert_eq!(body.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_symbol_is_empty_not_error() {
        let (status, body) = fetch(state_with(seeded_window()), "/api/ticks?symbol=ZZZZ").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn latest_tick_or_null() {
        let state = state_with(seeded_window());
        let (status, body) = fetch(Arc::clone(&state), "/api/ticks/latest?symbol=AAPL").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], 190.2);
        assert_eq!(body["symbol"], "AAPL");

        let (status, body) = fetch(state, "/api/ticks/latest?symbol=MSFT").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[test_case("/api/ticks?symbol=AAPL&lookback_hours=0" ; "below range")]
    #[test_case("/api/ticks?symbol=AAPL&lookback_hours=73" ; "above range")]
    #[test_case("/api/ticks?symbol=AAPL&lookback_hours=abc" ; "not a number")]
    #[tokio::test]
    async fn bad_lookback_is_unprocessable(uri: &str) {
        let (status, body) = fetch(state_with(seeded_window()), uri).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("lookback_hours"));
    }

    #[test_case("/api/ticks" ; "recent without symbol")]
    #[test_case("/api/ticks?symbol=%20" ; "blank symbol")]
    #[test_case("/api/ticks/latest" ; "latest without symbol")]
    #[tokio::test]
    async fn missing_symbol_is_bad_request(uri: &str) {
        let (status, _) = fetch(state_with(seeded_window()), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

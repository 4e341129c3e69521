use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, ChatMessage, DeleteBotResponse, Direction, EnterRequest, ErrorCode, MoveRequest,
    MoveResponse, PlayerRecord, PlayerResponse, SeeResponse, SendRequest, SendResponse,
    UpdateBotRequest, WorldSnapshot, SCHEMA_VERSION_V1,
};
use plaza_core::{LevelData, StepOutcome, BOT_STEP_DELAY_MS};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{BusEvent, SpaceApi, SpaceBus, SpaceError, WebhookNotifier};

const DEFAULT_SQLITE_PATH: &str = "plaza_space.sqlite";
const DEFAULT_API_TOKEN: &str = "plaza-dev-token";

include!("error.rs");
include!("state.rs");
include!("routes/bots.rs");
include!("routes/world.rs");
include!("routes/stream.rs");
include!("util.rs");

pub async fn serve(addr: SocketAddr, level: LevelData) -> Result<(), ServerError> {
    let mut api = SpaceApi::new(level);

    let sqlite_path = default_sqlite_path();
    match api.attach_sqlite_store(&sqlite_path) {
        Ok(()) => match api.restore_bots() {
            Ok(restored) => {
                info!(
                    sqlite_path = sqlite_path.as_str(),
                    restored, "sqlite store attached"
                );
            }
            Err(err) => {
                warn!(error = %err, "failed to restore persisted bots");
            }
        },
        Err(err) => {
            warn!(
                sqlite_path = sqlite_path.as_str(),
                error = %err,
                "running without persistence"
            );
        }
    }

    let state = AppState::new(api, api_token_from_env());
    {
        let api = state.inner.lock().await;
        state.bus.seed(api.snapshot(now_ms()).players.into_values());
    }
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "plaza api listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/enter", post(enter_bot))
        .route("/update/{player_id}", post(update_bot).put(update_bot))
        .route("/delete/{player_id}", post(delete_bot).delete(delete_bot))
        .route("/see/{player_id}", get(see).post(see))
        .route("/move/{player_id}", post(move_bot))
        .route("/send/{player_id}", post(send_message))
        .route("/stream", get(stream_space))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = bearer_token(request.headers())
        .map(|token| token == state.api_token.as_str())
        .unwrap_or(false);

    if !authorized {
        return HttpApiError::unauthorized().into_response();
    }

    next.run(request).await
}

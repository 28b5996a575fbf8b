use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::info;

use crate::api::rest::auth::AuthenticatedDriver;
use crate::hub::session::run_session;
use crate::state::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedDriver,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let driver_id = auth.driver_id;
    let ctx = state.session_context();

    info!(driver_id = %driver_id, "websocket upgrade accepted");
    ws.on_upgrade(move |socket| run_session(socket, driver_id, ctx))
}

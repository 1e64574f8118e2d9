//! Session lifecycle endpoints.
//!
//! Every command answers with the session snapshot taken right after the
//! driver handled it. Commands that are not valid in the current status
//! are refused with 409 and leave the session untouched.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use vouch_common::SessionSnapshot;

use crate::session::{CommandAck, SessionCommand};
use crate::state::AppState;

/// Current session snapshot
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

pub async fn start(State(state): State<AppState>) -> Result<(StatusCode, Json<CommandAck>), StatusCode> {
    dispatch(&state, SessionCommand::Start).await
}

pub async fn begin(State(state): State<AppState>) -> Result<(StatusCode, Json<CommandAck>), StatusCode> {
    dispatch(&state, SessionCommand::Begin).await
}

pub async fn cancel(State(state): State<AppState>) -> Result<(StatusCode, Json<CommandAck>), StatusCode> {
    dispatch(&state, SessionCommand::Cancel).await
}

pub async fn retry(State(state): State<AppState>) -> Result<(StatusCode, Json<CommandAck>), StatusCode> {
    dispatch(&state, SessionCommand::Retry).await
}

pub async fn resubmit(State(state): State<AppState>) -> Result<(StatusCode, Json<CommandAck>), StatusCode> {
    dispatch(&state, SessionCommand::Resubmit).await
}

async fn dispatch(
    state: &AppState,
    command: SessionCommand,
) -> Result<(StatusCode, Json<CommandAck>), StatusCode> {
    let ack = state.session.send(command).await.map_err(|e| {
        tracing::error!(error = %e, command = ?command, "Session command failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let status = if ack.accepted {
        StatusCode::OK
    } else {
        tracing::debug!(
            command = ?command,
            status = ack.snapshot.status.name(),
            "Command refused"
        );
        StatusCode::CONFLICT
    };
    Ok((status, Json(ack)))
}

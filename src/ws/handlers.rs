//! Message dispatch. `Some` return values go back to the initiating
//! connection only; anything addressed to the rest of the room is queued and
//! flushed inside the state layer.

use crate::error::GameError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{engine, turn, vote, AppState};
use crate::types::ConnId;
use std::sync::Arc;

pub async fn handle_message(
    msg: ClientMessage,
    conn: &ConnId,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateRoom { name, color } => {
            reply(state.create_room(conn, &name, &color).await)
        }
        ClientMessage::JoinRoom { code, name, color } => {
            reply(state.join_room(conn, &code, &name, &color).await)
        }
        ClientMessage::StartRound { code } => on_err(engine::start_round(state, conn, &code).await),
        ClientMessage::SubmitClue {
            code,
            player_id,
            clue,
        } => on_err(turn::submit_clue(state, conn, &code, &player_id, &clue).await),
        ClientMessage::SubmitVote {
            code,
            player_id,
            target_id,
        } => on_err(vote::submit_vote(state, conn, &code, &player_id, &target_id).await),
        ClientMessage::LeaveRoom { code } => Some(state.leave_room(conn, &code).await),
        ClientMessage::PlayAgain { code, player_id } => {
            Some(state.play_again(conn, &code, &player_id).await)
        }
    }
}

fn reply(result: Result<ServerMessage, GameError>) -> Option<ServerMessage> {
    match result {
        Ok(msg) => Some(msg),
        Err(e) => Some(ServerMessage::ErrorMessage {
            message: e.to_string(),
        }),
    }
}

/// Successful actions answer through the room broadcast. Expected races
/// (a timer beat the request in) are dropped without a reply.
fn on_err(result: Result<(), GameError>) -> Option<ServerMessage> {
    match result {
        Ok(()) => None,
        Err(e) if e.is_silent() => {
            tracing::debug!(error = %e, "dropping late action");
            None
        }
        Err(e) => Some(ServerMessage::ErrorMessage {
            message: e.to_string(),
        }),
    }
}

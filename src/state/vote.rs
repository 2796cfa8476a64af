//! Vote collection and resolution.
//!
//! Resolution follows a strict plurality rule: a single most-voted player is
//! eliminated, anything else (including nobody voting at all) is a tie and
//! restarts the round with the same secret. Ties never eliminate anyone.

use super::{engine, normalize_code, view, AppState, Outbox, Room};
use crate::error::GameError;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Records one vote from an alive player for an alive target. The last vote
/// in triggers resolution immediately instead of waiting for the deadline.
pub async fn submit_vote(
    state: &Arc<AppState>,
    conn: &ConnId,
    code: &str,
    voter_id: &PlayerId,
    target_id: &PlayerId,
) -> Result<(), GameError> {
    let code = normalize_code(code);
    let mut outbox = Outbox::new();
    {
        let mut rooms = state.rooms.write().await;
        let room = rooms.get_mut(&code).ok_or(GameError::RoomNotFound)?;
        if room.phase != Phase::Voting {
            return Err(GameError::WrongPhase);
        }
        match room.find_player(voter_id) {
            Some(p) if &p.conn == conn => {}
            _ => return Err(GameError::PlayerNotFound),
        }
        if !room.alive_ids.contains(voter_id) {
            return Err(GameError::NotAlive);
        }
        if room.find_player(target_id).is_none() {
            return Err(GameError::PlayerNotFound);
        }
        if !room.alive_ids.contains(target_id) {
            return Err(GameError::NotAlive);
        }
        if room.votes.iter().any(|v| &v.voter_id == voter_id) {
            return Err(GameError::AlreadyVoted);
        }

        room.votes.push(Vote {
            voter_id: voter_id.clone(),
            target_id: target_id.clone(),
        });
        view::broadcast_state(room, &mut outbox);

        if room.votes.len() >= room.alive_players().len() {
            resolve_votes(state, room, &mut outbox);
        }
    }
    state.flush(outbox).await;
    Ok(())
}

/// Tally and act. Reached from the last incoming vote or from the voting
/// deadline, whichever comes first; the phase guard makes the loser of that
/// race a no-op.
pub(crate) fn resolve_votes(state: &Arc<AppState>, room: &mut Room, outbox: &mut Outbox) {
    if room.phase != Phase::Voting {
        return;
    }
    room.timers.clear();
    room.vote_ends_at = None;

    let impostor_alive = room
        .impostor_id
        .as_ref()
        .is_some_and(|id| room.alive_ids.contains(id));
    if room.alive_players().len() <= 2 && impostor_alive {
        engine::finish_game(room, outbox, Winner::Impostor, "Only two players remain.");
        return;
    }

    let mut tally: HashMap<PlayerId, usize> = HashMap::new();
    for v in &room.votes {
        if room.alive_ids.contains(&v.target_id) {
            *tally.entry(v.target_id.clone()).or_default() += 1;
        }
    }
    let top = tally.values().copied().max().unwrap_or(0);
    let mut leaders: Vec<PlayerId> = tally
        .into_iter()
        .filter(|(_, n)| *n == top)
        .map(|(id, _)| id)
        .collect();

    if top == 0 || leaders.len() != 1 {
        tracing::debug!(code = %room.code, leaders = leaders.len(), "vote tied, restarting round");
        if room.countdown_used {
            engine::start_round_now(state, room, outbox, false);
        } else {
            engine::begin_countdown(state, room, outbox);
        }
        return;
    }

    let target = leaders.pop().unwrap();
    room.alive_ids.remove(&target);
    if room.impostor_id.as_ref() == Some(&target) {
        engine::begin_elimination(
            state,
            room,
            outbox,
            PendingAction::Finish {
                winner: Winner::Players,
                reason: "The impostor was voted out.".to_string(),
            },
            Some(target),
        );
        return;
    }

    let impostor_alive = room
        .impostor_id
        .as_ref()
        .is_some_and(|id| room.alive_ids.contains(id));
    let action = if room.alive_players().len() <= 2 && impostor_alive {
        PendingAction::Finish {
            winner: Winner::Impostor,
            reason: "Only two players remain.".to_string(),
        }
    } else {
        PendingAction::NextRound {
            use_countdown: !room.countdown_used,
        }
    };
    engine::begin_elimination(state, room, outbox, action, Some(target));
}

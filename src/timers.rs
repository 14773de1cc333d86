//! Periodic timer sweep.
//!
//! One loop polls every per-session and per-group timer: keepalive pings,
//! idle moves to the idle group, idle disconnects, and idle-moderator
//! hand-off. The loop sleeps until the earliest upcoming deadline instead
//! of scheduling a timer per session.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use icb_proto::Packet;

use crate::handlers::helpers::{self, DepartKind};
use crate::state::session::SessionId;
use crate::state::switchboard::{Core, Switchboard};

/// Sweep resolution bounds: never spin faster than this, never sleep
/// longer than this (new sessions must be noticed).
const MIN_SLEEP: Duration = Duration::from_secs(1);
const MAX_SLEEP: Duration = Duration::from_secs(30);

/// Spawn the sweep loop.
pub fn spawn_sweeper(board: Arc<Switchboard>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = sweep(&board).await;
            tokio::time::sleep(next.clamp(MIN_SLEEP, MAX_SLEEP)).await;
        }
    })
}

/// Run one sweep pass; returns the time until the next deadline.
async fn sweep(board: &Switchboard) -> Duration {
    let timeouts = &board.config.timeouts;
    let ping_after = Duration::from_secs(timeouts.ping_secs);
    let idle_after = Duration::from_secs(timeouts.idle_move_secs);
    let drop_after = Duration::from_secs(timeouts.idle_disconnect_secs);
    let mod_after = Duration::from_secs(timeouts.moderator_idle_secs);

    board.away_notices.purge();
    board.mailbox_notices.purge();

    let mut core = board.core.lock().await;
    let idle_key = board.config.groups.idle_group.to_lowercase();

    let mut to_ping: Vec<SessionId> = Vec::new();
    let mut to_idle: Vec<SessionId> = Vec::new();
    let mut to_drop: Vec<SessionId> = Vec::new();
    let mut next_deadline = MAX_SLEEP;

    for sess in core.sessions.iter() {
        let idle = sess.idle();

        if idle >= drop_after {
            to_drop.push(sess.id.clone());
            continue;
        }
        next_deadline = next_deadline.min(drop_after - idle);

        if idle >= ping_after && sess.last_ping.is_none() {
            to_ping.push(sess.id.clone());
        } else if sess.last_ping.is_none() {
            next_deadline = next_deadline.min(ping_after - idle);
        }

        if sess.nickname.is_some()
            && idle >= idle_after
            && sess.group.as_deref() != Some(idle_key.as_str())
            && sess.group.is_some()
        {
            to_idle.push(sess.id.clone());
        } else if sess.group.is_some() && idle < idle_after {
            next_deadline = next_deadline.min(idle_after - idle);
        }
    }

    for id in &to_ping {
        core.broker.deliver(id, Packet::ping());
        if let Ok(sess) = core.sessions.get_mut(id) {
            sess.last_ping = Some(Instant::now());
        }
    }

    for id in &to_idle {
        debug!(session = %id, "Moving idle session to the idle group");
        let idle_group = board.config.groups.idle_group.clone();
        if helpers::leave_group(&mut core, id, DepartKind::Idle).is_ok() {
            let _ = helpers::join_group(board, &mut core, id, &idle_group, "Arrive");
        }
    }

    sweep_idle_moderators(&mut core, mod_after);

    for id in &to_drop {
        info!(session = %id, "Idle timeout, disconnecting");
        core.broker.deliver(id, Packet::error("Idle timeout."));
        core.broker.deliver(id, Packet::exit());
        helpers::sign_off(board, &mut core, id).await;
    }

    next_deadline
}

/// Demote moderators that have gone idle, handing the role to the most
/// recently active member. The successor must itself be active within the
/// threshold, so a fully idle group does not churn.
fn sweep_idle_moderators(core: &mut Core, mod_after: Duration) {
    let stale: Vec<(String, SessionId)> = core
        .groups
        .groups()
        .iter()
        .filter_map(|info| {
            let mod_id = info.moderator.clone()?;
            let idle = core.sessions.get(&mod_id).ok()?.idle();
            (idle >= mod_after).then(|| (info.key(), mod_id))
        })
        .collect();

    for (key, mod_id) in stale {
        let Some(next) = core.pick_successor(&key, &mod_id) else {
            continue;
        };
        let next_active = core
            .sessions
            .get(&next)
            .map(|s| s.idle() < mod_after)
            .unwrap_or(false);
        if !next_active {
            continue;
        }

        debug!(group = %key, "Idle moderator demoted");
        helpers::hand_off_moderator(core, &key, &mod_id);
    }
}

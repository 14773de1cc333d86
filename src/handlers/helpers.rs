//! Shared action-layer plumbing: group entry/exit with announcements,
//! moderator hand-off, and session teardown.

use icb_proto::Packet;
use tracing::warn;

use crate::config::GroupsConfig;
use crate::error::{HandlerError, HandlerResult};
use crate::state::group::{GroupInfo, Visibility, Volume};
use crate::state::switchboard::{Core, Switchboard};

/// Why a session is leaving its group; controls the announcement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartKind {
    /// Moving to another group.
    Depart,
    /// Disconnecting.
    SignOff,
    /// Ejected by the moderator (the boot announcement is made separately).
    Boot,
    /// Moved to the idle group by the sweep.
    Idle,
}

impl DepartKind {
    fn category(&self) -> &'static str {
        match self {
            Self::Depart | Self::Idle => "Depart",
            Self::SignOff => "Sign-off",
            Self::Boot => "Boot",
        }
    }

    fn text(&self, nick: &str, address: &str) -> Option<String> {
        match self {
            Self::Depart => Some(format!("{nick} ({address}) just left")),
            Self::SignOff => Some(format!("{nick} ({address}) has signed off.")),
            Self::Idle => Some(format!("{nick} ({address}) drifted off to idle")),
            // The boot command announces before moving the target.
            Self::Boot => None,
        }
    }
}

/// Default metadata for a group being created, honoring the reserved names.
pub fn default_group_info(cfg: &GroupsConfig, name: &str) -> GroupInfo {
    let mut info = GroupInfo::new(name);
    let key = info.key();
    if key == cfg.default_group.to_lowercase() {
        info.topic = Some(cfg.default_topic.clone());
    } else if key == cfg.idle_group.to_lowercase() {
        info.volume = Volume::Quiet;
    } else if key == cfg.boot_group.to_lowercase() {
        info.volume = Volume::Quiet;
        info.visibility = Visibility::Secret;
    }
    info
}

/// Whether a name is one of the reserved groups that never get an implicit
/// creator-moderator.
pub fn is_reserved_group(cfg: &GroupsConfig, name: &str) -> bool {
    let key = name.to_lowercase();
    key == cfg.default_group.to_lowercase()
        || key == cfg.idle_group.to_lowercase()
        || key == cfg.boot_group.to_lowercase()
}

/// Take a session out of its current group, announcing the departure
/// (unless the group is quiet) and running the moderator hand-off.
pub fn leave_group(core: &mut Core, sid: &str, kind: DepartKind) -> HandlerResult {
    let Some(dep) = core.depart_group(sid)? else {
        return Ok(());
    };
    if !dep.members_remain {
        return Ok(());
    }

    let (nick, address) = {
        let sess = core.sessions.get(sid)?;
        (
            sess.nickname.clone().unwrap_or_else(|| sess.loginid.clone()),
            sess.address(),
        )
    };

    let info = core.groups.get(&dep.key);
    if info.volume != Volume::Quiet
        && let Some(text) = kind.text(&nick, &address)
    {
        core.broker
            .to_group(&dep.key, Packet::status(kind.category(), &text));
    }

    if dep.needs_handoff {
        hand_off_moderator(core, &dep.key, sid);
    }
    Ok(())
}

/// Hand moderatorship to the most recently active remaining member and
/// announce it. With no successor the group simply loses its moderator.
pub fn hand_off_moderator(core: &mut Core, group_key: &str, departing: &str) {
    let successor = core.pick_successor(group_key, departing);
    let next_nick = successor.as_ref().and_then(|id| {
        core.sessions
            .get(id)
            .ok()
            .and_then(|s| s.nickname.clone())
    });

    if let Some(info) = core.groups.get_mut(group_key) {
        info.moderator = successor;
    }

    if let Some(nick) = next_nick {
        core.broker.to_group(
            group_key,
            Packet::status("Pass", &format!("{nick} is now the moderator")),
        );
    }
}

/// Put a session into a group, creating it with default (or given) metadata
/// when it does not exist. Handles the full transition: access check, part
/// of the old group, announcements, self status, topic notice.
///
/// `arrival` is the status category other members see (`Sign-on` for the
/// login join, `Arrive` afterwards).
pub fn join_group(
    board: &Switchboard,
    core: &mut Core,
    sid: &str,
    requested: &str,
    arrival: &str,
) -> HandlerResult {
    use icb_proto::NameExt;

    if !requested.is_valid_nick() {
        return Err(HandlerError::command("Invalid group name."));
    }

    let key = requested.to_lowercase();
    {
        let sess = core.sessions.get(sid)?;
        if sess.group.as_deref() == Some(key.as_str()) {
            return Err(HandlerError::command("You are already in that group."));
        }

        let exists = core.groups.exists(&key);
        if exists {
            let info = core.groups.get(&key);
            if !info.may_enter(sess) {
                return Err(HandlerError::command(format!(
                    "{} is restricted.",
                    info.name
                )));
            }
        }
    }

    // Single logical transition: the old membership goes away in the same
    // action invocation that adds the new one.
    leave_group(core, sid, DepartKind::Depart)?;

    let exists = core.groups.exists(&key);
    let mut info = if exists {
        core.groups.get(&key)
    } else {
        default_group_info(&board.config.groups, requested)
    };
    if !exists && !is_reserved_group(&board.config.groups, requested) {
        info.moderator = Some(sid.to_string());
    }

    core.place_in_group(sid, info.clone())?;

    let (nick, address) = {
        let sess = core.sessions.get(sid)?;
        (
            sess.nickname.clone().unwrap_or_else(|| sess.loginid.clone()),
            sess.address(),
        )
    };

    if info.volume != Volume::Quiet {
        core.broker.to_group_from(
            sid,
            &key,
            Packet::status(arrival, &format!("{nick} ({address}) entered group")),
        );
    }

    let mut note = format!("You are now in group {}", info.name);
    if info.moderator.as_deref() == Some(sid) {
        note.push_str(" as moderator");
    }
    core.broker.deliver(sid, Packet::status("Status", &note));

    if let Some(topic) = info.topic.as_deref()
        && !topic.is_empty()
    {
        core.broker
            .deliver(sid, Packet::status("Topic", &format!("The topic is: {topic}")));
    }

    Ok(())
}

/// Full session teardown: sign-off announcement, group cleanup, broker and
/// store removal, sign-off timestamp persistence.
///
/// Idempotent: a session that is already gone is a no-op, so the
/// disconnect/boot race runs teardown exactly once.
pub async fn sign_off(board: &Switchboard, core: &mut Core, sid: &str) {
    let Ok(sess) = core.sessions.get(sid) else {
        return;
    };
    let nickname = sess.nickname.clone();
    let registered = sess.registered;

    if let Err(e) = leave_group(core, sid, DepartKind::SignOff) {
        warn!(session = %sid, error = %e, "Group cleanup during sign-off failed");
    }

    for emptied in core.broker.remove_session(sid) {
        core.groups.remove(&emptied);
    }
    core.sessions.remove(sid);

    if registered
        && let Some(nick) = nickname
        && let Err(e) = board.db.accounts().set_signoff(&nick).await
    {
        warn!(nick = %nick, error = %e, "Failed to persist sign-off timestamp");
    }
}

/// Collect the display nicknames of a group's members.
pub fn member_nicks(core: &Core, group_key: &str) -> Vec<String> {
    core.broker
        .subscribers(group_key)
        .iter()
        .filter_map(|id| core.sessions.get(id).ok())
        .filter_map(|s| s.nickname.clone())
        .collect()
}

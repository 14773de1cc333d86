//! Group membership and moderation commands.

use async_trait::async_trait;

use icb_proto::Packet;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{helpers, require_word, split_word, Command, Context};
use crate::state::group::{Control, Visibility, Volume};

/// The acting session's current group key, or a "not in a group" rejection.
fn current_group(ctx: &Context<'_>) -> Result<String, HandlerError> {
    ctx.session()?
        .group
        .clone()
        .ok_or_else(|| HandlerError::command("You aren't in a group."))
}

/// Moderator gate: with a moderator set, only that session passes; an
/// unmoderated group refuses moderation commands outright.
fn require_moderator(ctx: &Context<'_>, group_key: &str) -> HandlerResult {
    let info = ctx.core.groups.get(group_key);
    match info.moderator {
        Some(ref id) if *id == ctx.sid => Ok(()),
        Some(_) => Err(HandlerError::command("You aren't the moderator.")),
        None => Err(HandlerError::command("The group isn't moderated.")),
    }
}

/// `g <group>`: move to another group, creating it if needed.
pub struct JoinCmd;

#[async_trait]
impl Command for JoinCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let target = require_word(args, "g <group>")?.to_string();
        helpers::join_group(ctx.board, ctx.core, &ctx.sid.clone(), &target, "Arrive")
    }
}

/// `topic [text]`: show or set the group topic.
pub struct TopicCmd;

#[async_trait]
impl Command for TopicCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let key = current_group(ctx)?;
        let text = args.trim();

        if text.is_empty() {
            let info = ctx.core.groups.get(&key);
            match info.topic.as_deref().filter(|t| !t.is_empty()) {
                Some(topic) => ctx.status("Topic", &format!("The topic is: {topic}")),
                None => ctx.status("Topic", "The topic is not set."),
            }
            return Ok(());
        }

        // Setting is open in an unmoderated group; otherwise moderator-only.
        if ctx.core.groups.get(&key).moderator.is_some() {
            require_moderator(ctx, &key)?;
        }

        let nick = ctx.nick()?;
        if let Some(info) = ctx.core.groups.get_mut(&key) {
            info.topic = Some(text.to_string());
        }
        ctx.core.broker.to_group(
            &key,
            Packet::status("Topic", &format!("{nick} changed the topic to \"{text}\"")),
        );
        Ok(())
    }
}

/// `status [flags]`: report group status, or change modes by flag letter:
/// control `p`/`m`/`r`/`c`, visibility `v`/`s`/`i`, volume `q`/`n`/`l`.
pub struct StatusCmd;

#[async_trait]
impl Command for StatusCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let key = current_group(ctx)?;
        let flags = args.trim();

        if flags.is_empty() {
            let info = ctx.core.groups.get(&key);
            let moderator = info
                .moderator
                .as_deref()
                .and_then(|id| ctx.core.sessions.get(id).ok())
                .and_then(|s| s.nickname.clone())
                .unwrap_or_else(|| "(None)".to_string());
            ctx.co(&format!(
                "Name: {} Mod: {} ({}/{}/{})",
                info.name,
                moderator,
                info.control.label(),
                info.visibility.label(),
                info.volume.label(),
            ));
            ctx.co(&format!(
                "Topic: {}",
                info.topic.as_deref().unwrap_or("(None)")
            ));
            if !info.invited_nicks.is_empty() || !info.invited_addrs.is_empty() {
                ctx.co(&format!(
                    "Invited: {}",
                    describe_entries(&info.invited_nicks, &info.invited_addrs)
                ));
            }
            if !info.talker_nicks.is_empty() || !info.talker_addrs.is_empty() {
                ctx.co(&format!(
                    "Talkers: {}",
                    describe_entries(&info.talker_nicks, &info.talker_addrs)
                ));
            }
            return Ok(());
        }

        if ctx.core.groups.get(&key).moderator.is_some() {
            require_moderator(ctx, &key)?;
        }

        let nick = ctx.nick()?;
        for flag in flags.chars().filter(|c| !c.is_whitespace()) {
            apply_status_flag(ctx, &key, &nick, flag)?;
        }
        Ok(())
    }
}

fn describe_entries(
    nicks: &[crate::state::group::ListEntry],
    addrs: &[crate::state::group::ListEntry],
) -> String {
    nicks
        .iter()
        .map(|e| e.name.clone())
        .chain(addrs.iter().map(|e| format!("@{}", e.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn apply_status_flag(
    ctx: &mut Context<'_>,
    key: &str,
    nick: &str,
    flag: char,
) -> HandlerResult {
    match flag {
        'p' | 'm' | 'r' | 'c' => {
            let mode = match flag {
                'p' => Control::Public,
                'm' => Control::Moderated,
                'r' => Control::Restricted,
                _ => Control::Controlled,
            };
            let members = helpers::member_nicks(ctx.core, key);
            if let Some(info) = ctx.core.groups.get_mut(key) {
                info.set_control(mode, members.iter().map(String::as_str));
            }
            let text = match mode {
                Control::Public => format!("{nick} made group public."),
                other => format!("{nick} is now {}.", other.label()),
            };
            ctx.core.broker.to_group(key, Packet::status("Change", &text));
        }
        'v' | 's' | 'i' => {
            let visibility = match flag {
                'v' => Visibility::Visible,
                's' => Visibility::Secret,
                _ => Visibility::Invisible,
            };
            if let Some(info) = ctx.core.groups.get_mut(key) {
                info.visibility = visibility;
            }
            ctx.core.broker.to_group(
                key,
                Packet::status(
                    "Change",
                    &format!("{nick} made group {}.", visibility.label()),
                ),
            );
        }
        'q' | 'n' | 'l' => {
            let volume = match flag {
                'q' => Volume::Quiet,
                'n' => Volume::Normal,
                _ => Volume::Loud,
            };
            if let Some(info) = ctx.core.groups.get_mut(key) {
                info.volume = volume;
            }
            ctx.core.broker.to_group(
                key,
                Packet::status(
                    "Change",
                    &format!("{nick} made group {}.", volume.label()),
                ),
            );
        }
        other => {
            return Err(HandlerError::command(format!(
                "Unknown status flag: {other}"
            )));
        }
    }
    Ok(())
}

/// Flags accepted by the invite/cancel/talk family.
struct ListArgs<'a> {
    target: &'a str,
    by_address: bool,
    registered_only: bool,
}

fn parse_list_args<'a>(args: &'a str, usage: &str) -> Result<ListArgs<'a>, HandlerError> {
    let mut by_address = false;
    let mut registered_only = false;
    let mut rest = args.trim();

    loop {
        let (word, tail) = split_word(rest);
        match word {
            "-a" => by_address = true,
            "-r" => registered_only = true,
            _ => break,
        }
        rest = tail;
    }

    let (target, _) = split_word(rest);
    if target.is_empty() {
        return Err(HandlerError::command(format!("Usage: {usage}")));
    }
    Ok(ListArgs {
        target,
        by_address,
        registered_only,
    })
}

/// `invite [-r] [-a] <target>`: add to the group's invite list.
pub struct InviteCmd;

#[async_trait]
impl Command for InviteCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let parsed = parse_list_args(args, "invite [-r] [-a] <target>")?;
        let key = current_group(ctx)?;

        // In a restricted group the invite list is an access list, so only
        // the moderator may grow it.
        if ctx.core.groups.get(&key).control == Control::Restricted {
            require_moderator(ctx, &key)?;
        }

        let nick = ctx.nick()?;
        let group_name = {
            let Some(info) = ctx.core.groups.get_mut(&key) else {
                return Err(HandlerError::Internal("group vanished mid-invite".into()));
            };
            if parsed.by_address {
                info.invite_addr(parsed.target, parsed.registered_only);
            } else {
                info.invite_nick(parsed.target, parsed.registered_only);
            }
            info.name.clone()
        };

        ctx.status("FYI", &format!("{} invited", parsed.target));

        if !parsed.by_address
            && let Some(target_id) = ctx.core.sessions.find_nick(parsed.target)
        {
            ctx.core.broker.deliver(
                &target_id,
                Packet::status(
                    "RSVP",
                    &format!("You are invited to group {group_name} by {nick}"),
                ),
            );
        }
        Ok(())
    }
}

/// `cancel [-a] <target>`: drop invite or talker entries.
pub struct CancelCmd;

#[async_trait]
impl Command for CancelCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let parsed = parse_list_args(args, "cancel [-a] <target>")?;
        let key = current_group(ctx)?;

        let info = ctx.core.groups.get(&key);
        if info.control == Control::Restricted || info.control == Control::Controlled {
            require_moderator(ctx, &key)?;
        }

        let Some(info) = ctx.core.groups.get_mut(&key) else {
            return Err(HandlerError::Internal("group vanished mid-cancel".into()));
        };
        let removed = if parsed.by_address {
            info.cancel_addr(parsed.target) | info.untalk_addr(parsed.target)
        } else {
            info.cancel_nick(parsed.target) | info.untalk_nick(parsed.target)
        };
        if !removed {
            return Err(HandlerError::command(format!(
                "{} isn't invited.",
                parsed.target
            )));
        }
        ctx.status("FYI", &format!("{} cancelled", parsed.target));
        Ok(())
    }
}

/// `talk [-r] [-a] <target>`: add to the talker list of a controlled group.
pub struct TalkCmd;

#[async_trait]
impl Command for TalkCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let parsed = parse_list_args(args, "talk [-r] [-a] <target>")?;
        let key = current_group(ctx)?;

        if ctx.core.groups.get(&key).control == Control::Controlled {
            require_moderator(ctx, &key)?;
        }

        let Some(info) = ctx.core.groups.get_mut(&key) else {
            return Err(HandlerError::Internal("group vanished mid-talk".into()));
        };
        if parsed.by_address {
            info.talk_addr(parsed.target, parsed.registered_only);
        } else {
            info.talk_nick(parsed.target, parsed.registered_only);
        }
        ctx.status("FYI", &format!("{} may now talk", parsed.target));
        Ok(())
    }
}

/// `pass [nick]`: hand off, claim, or relinquish moderatorship.
pub struct PassCmd;

#[async_trait]
impl Command for PassCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let key = current_group(ctx)?;
        let nick = ctx.nick()?;
        let (target, _) = split_word(args);

        let moderator = ctx.core.groups.get(&key).moderator.clone();

        if target.is_empty() {
            match moderator {
                Some(ref id) if *id == ctx.sid => {
                    if let Some(info) = ctx.core.groups.get_mut(&key) {
                        info.moderator = None;
                    }
                    ctx.core.broker.to_group(
                        &key,
                        Packet::status("Pass", &format!("{nick} just relinquished moderatorship")),
                    );
                }
                Some(_) => return Err(HandlerError::command("You aren't the moderator.")),
                None => {
                    // An orphaned group can be claimed.
                    if let Some(info) = ctx.core.groups.get_mut(&key) {
                        info.moderator = Some(ctx.sid.clone());
                    }
                    ctx.core.broker.to_group(
                        &key,
                        Packet::status("Pass", &format!("{nick} is now the moderator")),
                    );
                }
            }
            return Ok(());
        }

        require_moderator(ctx, &key)?;
        let target_id = ctx
            .core
            .sessions
            .find_nick(target)
            .ok_or_else(|| HandlerError::command(format!("{target} is not signed on.")))?;
        if !ctx.core.broker.subscribers(&key).contains(&target_id) {
            return Err(HandlerError::command(format!(
                "{target} isn't in your group."
            )));
        }

        let target_nick = ctx
            .core
            .sessions
            .get(&target_id)?
            .nickname
            .clone()
            .unwrap_or_else(|| target.to_string());
        if let Some(info) = ctx.core.groups.get_mut(&key) {
            info.moderator = Some(target_id);
        }
        ctx.core.broker.to_group(
            &key,
            Packet::status("Pass", &format!("{target_nick} is now the moderator")),
        );
        Ok(())
    }
}

/// `boot <nick>`: eject a member into the boot group.
pub struct BootCmd;

#[async_trait]
impl Command for BootCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let target = require_word(args, "boot <nick>")?.to_string();
        let key = current_group(ctx)?;
        require_moderator(ctx, &key)?;

        let target_id = ctx
            .core
            .sessions
            .find_nick(&target)
            .ok_or_else(|| HandlerError::command(format!("{target} is not signed on.")))?;
        if !ctx.core.broker.subscribers(&key).contains(&target_id) {
            return Err(HandlerError::command(format!(
                "{target} isn't in your group."
            )));
        }

        let target_nick = ctx
            .core
            .sessions
            .get(&target_id)?
            .nickname
            .clone()
            .unwrap_or_else(|| target.clone());

        // Protected accounts cannot be booted.
        if ctx.core.sessions.get(&target_id)?.registered
            && let Some(acc) = ctx.board.db.accounts().lookup(&target_nick).await?
            && acc.protected
        {
            return Err(HandlerError::command(format!("{target_nick} is protected.")));
        }

        let group_name = ctx.core.groups.get(&key).name.clone();
        ctx.core.broker.to_group(
            &key,
            Packet::status("Boot", &format!("{target_nick} was booted.")),
        );
        ctx.core.broker.deliver(
            &target_id,
            Packet::status("Boot", &format!("You were booted from {group_name}.")),
        );

        helpers::leave_group(ctx.core, &target_id, helpers::DepartKind::Boot)?;
        let boot_group = ctx.board.config.groups.boot_group.clone();
        helpers::join_group(ctx.board, ctx.core, &target_id, &boot_group, "Arrive")?;
        Ok(())
    }
}

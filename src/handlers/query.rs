//! Informational commands: who listings, whois, version, MOTD, help.

use async_trait::async_trait;

use icb_proto::Packet;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{require_word, split_word, Command, Context};
use crate::state::group::{GroupInfo, Visibility};

/// Short mode code shown in group headers, e.g. `(pvl)`.
fn mode_code(info: &GroupInfo) -> String {
    let control = match info.control.label().chars().next() {
        Some(c) => c,
        None => '?',
    };
    let visibility = match info.visibility {
        Visibility::Visible => 'v',
        Visibility::Secret => 's',
        Visibility::Invisible => 'i',
    };
    let volume = match info.volume.label().chars().next() {
        Some(c) => c,
        None => '?',
    };
    format!("{control}{visibility}{volume}")
}

/// Emit the `w` listing: `wh` header, per-group `co` headers and `wl`
/// member rows, and a totals line.
///
/// Invisible groups are hidden from non-members entirely; secret groups
/// show their header but not their members.
pub fn who_listing(ctx: &Context<'_>, filter: &str) -> HandlerResult {
    let actor_group = ctx.session()?.group.clone();

    if !filter.is_empty() {
        let key = filter.to_lowercase();
        let visible_to_actor = ctx.core.groups.exists(&key)
            && (actor_group.as_deref() == Some(key.as_str())
                || ctx.core.groups.get(&key).visibility != Visibility::Invisible);
        if !visible_to_actor {
            return Err(HandlerError::command(format!(
                "There is no such group: {filter}"
            )));
        }
    }

    ctx.reply(Packet::output("wh", std::iter::empty::<String>()));

    let mut shown_groups = 0;
    let mut shown_users = 0;
    for info in ctx.core.groups.groups() {
        let key = info.key();
        if !filter.is_empty() && key != filter.to_lowercase() {
            continue;
        }
        let is_member = actor_group.as_deref() == Some(key.as_str());

        if info.visibility == Visibility::Invisible && !is_member {
            continue;
        }

        let moderator = info
            .moderator
            .as_deref()
            .and_then(|id| ctx.core.sessions.get(id).ok())
            .and_then(|s| s.nickname.clone())
            .unwrap_or_else(|| "(None)".to_string());
        ctx.co(&format!(
            "Group: {} ({}) Mod: {} Topic: {}",
            info.name,
            mode_code(info),
            moderator,
            info.topic.as_deref().unwrap_or("(None)"),
        ));
        shown_groups += 1;

        if info.visibility == Visibility::Secret && !is_member {
            continue;
        }

        let mut members: Vec<_> = ctx
            .core
            .broker
            .subscribers(&key)
            .into_iter()
            .filter_map(|id| ctx.core.sessions.get(&id).ok())
            .collect();
        members.sort_by(|a, b| a.nickname.cmp(&b.nickname));

        for member in members {
            let Some(nick) = member.nickname.as_deref() else {
                continue;
            };
            let flag = if info.is_moderator(&member.id) { "m" } else { " " };
            ctx.reply(Packet::output(
                "wl",
                [
                    flag.to_string(),
                    nick.to_string(),
                    member.idle().as_secs().to_string(),
                    member.last_message.elapsed().as_secs().to_string(),
                    member.signed_on.to_string(),
                    member.loginid.clone(),
                    member.hostname.clone(),
                ],
            ));
            shown_users += 1;
        }
    }

    ctx.co(&format!(
        "Total: {} user(s) in {} group(s)",
        shown_users, shown_groups
    ));
    Ok(())
}

/// `w [group]`: list groups and their members.
pub struct WhoCmd;

#[async_trait]
impl Command for WhoCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let (filter, _) = split_word(args);
        who_listing(ctx, filter)
    }
}

/// `whois <nick>`: details about a signed-on user.
pub struct WhoisCmd;

#[async_trait]
impl Command for WhoisCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let target = require_word(args, "whois <nick>")?;
        let target_id = ctx
            .core
            .sessions
            .find_nick(target)
            .ok_or_else(|| HandlerError::command(format!("{target} is not signed on.")))?;

        let sess = ctx.core.sessions.get(&target_id)?;
        let nick = sess.nickname.as_deref().unwrap_or(target);
        let group = sess
            .group
            .as_deref()
            .map(|key| ctx.core.groups.get(key).name)
            .unwrap_or_else(|| "(None)".to_string());
        let signed_on = chrono::DateTime::from_timestamp(sess.signed_on, 0)
            .map(|dt| dt.format("%b %e %H:%M %Z").to_string())
            .unwrap_or_default();

        ctx.co(&format!("Nickname:   {nick}"));
        ctx.co(&format!("Address:    {}", sess.address()));
        ctx.co(&format!("Group:      {group}"));
        ctx.co(&format!("Idle:       {}s", sess.idle().as_secs()));
        ctx.co(&format!("Signed on:  {signed_on}"));
        ctx.co(&format!(
            "Registered: {}",
            if sess.registered { "yes" } else { "no" }
        ));
        if sess.secure {
            ctx.co("Secure:     yes");
        }
        if let Some(away) = sess.away.as_deref() {
            ctx.co(&format!("Away:       {away}"));
        }
        Ok(())
    }
}

/// `v`: server version banner.
pub struct VersionCmd;

#[async_trait]
impl Command for VersionCmd {
    async fn run(&self, ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        ctx.co(&ctx.board.config.server.id);
        Ok(())
    }
}

/// `motd`: re-deliver the message of the day.
pub struct MotdCmd;

#[async_trait]
impl Command for MotdCmd {
    async fn run(&self, ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        if ctx.board.motd.is_empty() {
            ctx.status("FYI", "There is no MOTD.");
            return Ok(());
        }
        for line in &ctx.board.motd {
            ctx.co(line);
        }
        Ok(())
    }
}

/// `help`: command summary.
pub struct HelpCmd;

const HELP_LINES: &[&str] = &[
    "g <group>            join or create a group",
    "name <nick>          change your nickname",
    "p <password>         authenticate or register your nickname",
    "cp <old> <new>       change your password",
    "m <nick> <text>      send a personal message",
    "write <nick> <text>  leave an offline message",
    "read                 read your offline messages",
    "beep <nick>          beep a user",
    "nobeep on|off|verbose  control incoming beeps",
    "away [text] / noaway mark yourself away or back",
    "w [group]            list groups and users",
    "whois <nick>         user details",
    "topic [text]         show or set the group topic",
    "status [flags]       show or change group modes (pmrc/vsi/qnl)",
    "invite/cancel/talk   manage invitations and talkers",
    "pass [nick]          hand off or claim moderatorship",
    "boot <nick>          eject a member",
    "hush <nick>          toggle ignoring a user",
    "notify <nick>        toggle sign-on notification",
    "echoback on|off      echo your own open messages",
    "v / motd / ping      version, MOTD, keepalive probe",
];

#[async_trait]
impl Command for HelpCmd {
    async fn run(&self, ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        for line in HELP_LINES {
            ctx.co(line);
        }
        Ok(())
    }
}

/// `ping`: ask the server to probe this client.
pub struct PingCmd;

#[async_trait]
impl Command for PingCmd {
    async fn run(&self, ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        ctx.reply(Packet::ping());
        Ok(())
    }
}

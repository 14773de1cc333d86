//! Message routing: open (group) messages, personal messages, offline
//! mailbox, and beeps.

use async_trait::async_trait;
use std::time::Instant;

use icb_proto::Packet;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{require_word, split_word, Command, Context};
use crate::state::session::BeepMode;
use crate::state::group::Volume;

/// Route a `b` open message to the sender's group.
pub fn open_message(ctx: &mut Context<'_>, text: &str) -> HandlerResult {
    let nick = ctx.nick()?;
    let key = ctx
        .session()?
        .group
        .clone()
        .ok_or_else(|| HandlerError::command("You aren't in a group."))?;

    let info = ctx.core.groups.get(&key);
    if info.volume == Volume::Quiet {
        return Err(HandlerError::command("You can't talk in a quiet group!"));
    }
    if !info.may_talk(ctx.session()?) {
        return Err(HandlerError::command(
            "You aren't permitted to talk in this group.",
        ));
    }

    // Hushed recipients still count as an audience; they just don't get
    // the packet.
    let mut audience = 0;
    let packet = Packet::open(&nick, text);
    for id in ctx.core.broker.subscribers(&key) {
        if id == ctx.sid {
            continue;
        }
        audience += 1;
        let Ok(recipient) = ctx.core.sessions.get(&id) else {
            continue;
        };
        if recipient.has_hushed(&nick) {
            continue;
        }
        ctx.core.broker.deliver(&id, packet.clone());
    }
    if audience == 0 {
        return Err(HandlerError::command("No one else in group!"));
    }

    if ctx.session()?.echoback {
        ctx.reply(packet);
    }
    ctx.session_mut()?.last_message = Instant::now();
    Ok(())
}

/// Send an away notice for the target, at most once per window per
/// (sender, target) pair.
fn maybe_away_notice(ctx: &Context<'_>, target_id: &str) -> HandlerResult {
    let target = ctx.core.sessions.get(target_id)?;
    if let (Some(away), Some(nick)) = (target.away.as_deref(), target.nickname.as_deref())
        && ctx.board.away_notices.remember(
            (ctx.sid.clone(), target_id.to_string()),
            ctx.board.away_notice_window(),
        )
    {
        ctx.status("Away", &format!("{nick} is away: {away}"));
    }
    Ok(())
}

/// `m <nick> <text>`: personal message to a signed-on user.
pub struct PersonalCmd;

#[async_trait]
impl Command for PersonalCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let (target, text) = split_word(args);
        if target.is_empty() || text.is_empty() {
            return Err(HandlerError::command("Usage: m <nick> <text>"));
        }

        let nick = ctx.nick()?;
        let target_id = ctx
            .core
            .sessions
            .find_nick(target)
            .ok_or_else(|| HandlerError::command(format!("{target} is not signed on.")))?;

        // A hushed sender's messages vanish without telling either side.
        if !ctx.core.sessions.get(&target_id)?.has_hushed(&nick) {
            ctx.core
                .broker
                .deliver(&target_id, Packet::personal(&nick, text));
        }

        maybe_away_notice(ctx, &target_id)?;
        ctx.session_mut()?.last_message = Instant::now();
        Ok(())
    }
}

/// `write <nick> <text>`: store an offline message for a registered
/// nickname.
pub struct WriteCmd;

#[async_trait]
impl Command for WriteCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let (target, text) = split_word(args);
        if target.is_empty() || text.is_empty() {
            return Err(HandlerError::command("Usage: write <nick> <text>"));
        }

        let nick = ctx.nick()?;
        let account = ctx
            .board
            .db
            .accounts()
            .lookup(target)
            .await?
            .ok_or_else(|| HandlerError::command(format!("{target} is not registered.")))?;

        match ctx
            .board
            .db
            .mailbox()
            .store(&account.nick, &nick, text, account.mailbox_limit)
            .await
        {
            Ok(()) => {
                ctx.status("Message", &format!("Message stored for {}", account.nick));
                if let Some(target_id) = ctx.core.sessions.find_nick(target) {
                    ctx.core.broker.deliver(
                        &target_id,
                        Packet::status("Message", &format!("{nick} just wrote you a message")),
                    );
                }
                Ok(())
            }
            Err(crate::db::DbError::MailboxFull(_)) => {
                // Repeat the warning at most once per window.
                if ctx.board.mailbox_notices.remember(
                    (ctx.sid.clone(), account.nick.to_lowercase()),
                    ctx.board.away_notice_window(),
                ) {
                    Err(HandlerError::command(format!(
                        "{}'s message box is full!",
                        account.nick
                    )))
                } else {
                    Ok(())
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// `read`: deliver and delete stored messages.
pub struct ReadCmd;

#[async_trait]
impl Command for ReadCmd {
    async fn run(&self, ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        let nick = ctx.nick()?;
        if !ctx.session()?.registered {
            return Err(HandlerError::command(
                "You must be registered to read messages.",
            ));
        }

        let messages = ctx.board.db.mailbox().drain(&nick).await?;
        if messages.is_empty() {
            ctx.status("Message", "You have no messages.");
            return Ok(());
        }

        for msg in &messages {
            let stamp = chrono::DateTime::from_timestamp(msg.sent_at, 0)
                .map(|dt| dt.format("%b %e %H:%M").to_string())
                .unwrap_or_default();
            ctx.status("Message", &format!("Written by {} on {stamp}", msg.sender));
            ctx.reply(Packet::personal(&msg.sender, &msg.body));
        }
        ctx.status("Message", &format!("{} message(s) read", messages.len()));
        Ok(())
    }
}

/// `beep <nick>`: beep a user, honoring their beep mode.
pub struct BeepCmd;

#[async_trait]
impl Command for BeepCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let target = require_word(args, "beep <nick>")?;
        let nick = ctx.nick()?;

        let target_id = ctx
            .core
            .sessions
            .find_nick(target)
            .ok_or_else(|| HandlerError::command(format!("{target} is not signed on.")))?;

        let mode = ctx.core.sessions.get(&target_id)?.beep;
        match mode {
            BeepMode::Off => {
                return Err(HandlerError::command(format!(
                    "{target} has beeps disabled."
                )));
            }
            BeepMode::On => {
                ctx.core.broker.deliver(&target_id, Packet::beep(&nick));
            }
            BeepMode::Verbose => {
                ctx.core.broker.deliver(&target_id, Packet::beep(&nick));
                ctx.core.broker.deliver(
                    &target_id,
                    Packet::status("Beep", &format!("{nick} sent you a beep")),
                );
            }
        }

        maybe_away_notice(ctx, &target_id)?;
        Ok(())
    }
}

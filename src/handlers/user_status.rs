//! Per-session presence and preference commands.

use async_trait::async_trait;
use std::time::Instant;

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{require_word, split_word, Command, Context};
use crate::state::session::BeepMode;

/// `away [text]`: mark the session away.
pub struct AwayCmd;

#[async_trait]
impl Command for AwayCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let text = args.trim();
        if text.is_empty() {
            return match ctx.session()?.away.as_deref() {
                Some(current) => {
                    let current = current.to_string();
                    ctx.status("Away", &format!("Away message is: {current}"));
                    Ok(())
                }
                None => Err(HandlerError::command("Usage: away <message>")),
            };
        }

        {
            let sess = ctx.session_mut()?;
            sess.away = Some(text.to_string());
            sess.away_since = Some(Instant::now());
        }
        ctx.status("Away", &format!("Away message set to \"{text}\""));
        Ok(())
    }
}

/// `noaway`: clear the away state.
pub struct NoAwayCmd;

#[async_trait]
impl Command for NoAwayCmd {
    async fn run(&self, ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        let sess = ctx.session_mut()?;
        if sess.away.take().is_none() {
            return Err(HandlerError::command("You weren't away!"));
        }
        sess.away_since = None;
        ctx.status("Away", "You are no longer marked away.");
        Ok(())
    }
}

/// `nobeep on|off|verbose`: set beep acceptance.
pub struct NoBeepCmd;

#[async_trait]
impl Command for NoBeepCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let (mode, _) = split_word(args);
        // "nobeep on" means beeps are refused; the flag names the refusal.
        let beep = match mode {
            "on" => BeepMode::Off,
            "off" => BeepMode::On,
            "verbose" => BeepMode::Verbose,
            _ => return Err(HandlerError::command("Usage: nobeep on|off|verbose")),
        };
        ctx.session_mut()?.beep = beep;
        ctx.status("No-Beep", &format!("No-beep is now {mode}."));
        Ok(())
    }
}

/// `hush <nick>`: toggle suppression of a user's messages.
pub struct HushCmd;

#[async_trait]
impl Command for HushCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let target = require_word(args, "hush <nick>")?.to_lowercase();
        let sess = ctx.session_mut()?;
        if sess.hushed.remove(&target) {
            ctx.status("Hush", &format!("{target} is no longer hushed."));
        } else {
            sess.hushed.insert(target.clone());
            ctx.status("Hush", &format!("{target} is now hushed."));
        }
        Ok(())
    }
}

/// `notify <nick>`: toggle sign-on notification for a nickname.
pub struct NotifyCmd;

#[async_trait]
impl Command for NotifyCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let target = require_word(args, "notify <nick>")?.to_lowercase();
        let sess = ctx.session_mut()?;
        if sess.notify.remove(&target) {
            ctx.status("Notify", &format!("You will no longer be told when {target} signs on."));
        } else {
            sess.notify.insert(target.clone());
            ctx.status("Notify", &format!("You will be told when {target} signs on."));
        }
        Ok(())
    }
}

/// `echoback on|off`: echo own open messages back.
pub struct EchobackCmd;

#[async_trait]
impl Command for EchobackCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let (mode, _) = split_word(args);
        let enabled = match mode {
            "on" => true,
            "off" => false,
            _ => return Err(HandlerError::command("Usage: echoback on|off")),
        };
        ctx.session_mut()?.echoback = enabled;
        ctx.status("Echo", &format!("Echoback is now {mode}."));
        Ok(())
    }
}

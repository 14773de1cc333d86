//! Login flow and nickname registration.
//!
//! A session arrives anonymous, becomes provisional once a loginid and
//! nickname are set, and authenticated when a password checks out (or the
//! stored last-login matches and unsecured auto-login is enabled). Renaming
//! or signing off drops it back to provisional.

use async_trait::async_trait;
use tracing::info;

use icb_proto::{NameExt, Packet};

use crate::db::Account;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{helpers, name, query, require_word, split_word, Command, Context};

/// Whether an account qualifies for unsecured auto-login from this client.
///
/// Admin accounts never auto-login: an admin nickname always requires its
/// password.
pub(crate) fn auto_login_allowed(
    enabled: bool,
    account: &Account,
    loginid: &str,
    host: &str,
) -> bool {
    enabled
        && !account.secure
        && !account.admin
        && account.last_login_matches(loginid, host)
}

/// Handle an `a` login packet.
///
/// Fields: loginid, nickname, group, command (`login` or `w`), password.
pub async fn login(ctx: &mut Context<'_>, fields: &[String]) -> HandlerResult {
    if ctx.session()?.nickname.is_some() {
        return Err(HandlerError::command("You are already logged in."));
    }
    if fields.len() < 4 {
        return Err(HandlerError::protocol(
            "Login requires loginid, nickname, group and command fields.",
        ));
    }

    let loginid = fields[0].as_str();
    let nick = fields[1].as_str();
    let group_field = fields[2].as_str();
    let command = fields[3].as_str();
    let password = fields.get(4).map(String::as_str).filter(|p| !p.is_empty());

    if !loginid.is_valid_loginid() {
        return Err(HandlerError::command("Invalid loginid."));
    }
    if !nick.is_valid_nick() {
        return Err(HandlerError::command("Invalid nickname."));
    }
    if nick.eq_ignore_ascii_case(&ctx.board.config.server.nickname) {
        return Err(HandlerError::command("That nickname is reserved."));
    }

    ctx.session_mut()?.loginid = loginid.to_string();

    match command {
        "login" => {}
        "w" => {
            // List-only login: show who is on and tell the client to leave.
            query::who_listing(ctx, "")?;
            ctx.reply(Packet::exit());
            return Err(HandlerError::Quit);
        }
        other => {
            return Err(HandlerError::protocol(format!(
                "Unknown login command: {other}"
            )));
        }
    }

    for line in &ctx.board.motd {
        ctx.co(line);
    }

    let host = ctx.session()?.hostname.clone();
    let account = ctx.board.db.accounts().lookup(nick).await?;
    let mut authenticated = false;

    match (&account, password) {
        (Some(acc), Some(password)) => {
            if ctx.board.db.accounts().check_password(nick, password).await? {
                authenticated = true;
            } else if acc.admin {
                // A failed password for an admin nickname aborts the login.
                return Err(HandlerError::command("Invalid password."));
            } else {
                ctx.status("Register", "Invalid password.");
            }
        }
        (Some(acc), None) => {
            if auto_login_allowed(ctx.board.config.auth.auto_register, acc, loginid, &host) {
                authenticated = true;
            } else if acc.password_hash.is_some() {
                ctx.status(
                    "Register",
                    &format!("{nick} is registered. Send your password with /p to authenticate."),
                );
            } else {
                ctx.status("No-Pass", &format!("No password on file for {nick}."));
            }
        }
        (None, _) => {
            ctx.status("No-Pass", &format!("No password on file for {nick}."));
        }
    }

    // A live nickname only yields to an authenticated claim; the displaced
    // session is renamed away rather than the login being rejected.
    if let Some(other) = ctx.core.sessions.find_nick(nick)
        && other != ctx.sid
    {
        if authenticated {
            name::auto_rename(ctx.core, &other)?;
        } else {
            return Err(HandlerError::status("Warning", "Nickname already in use."));
        }
    }

    {
        let sess = ctx.session_mut()?;
        sess.nickname = Some(nick.to_string());
        sess.registered = authenticated;
        sess.signed_on = chrono::Utc::now().timestamp();
        sess.touch();
    }

    if authenticated {
        ctx.board.db.accounts().set_signon(nick, loginid, &host).await?;
    }

    ctx.reply(Packet::login_ok());
    info!(nick, loginid, authenticated, "Login completed");

    if authenticated {
        let waiting = ctx.board.db.mailbox().count(nick).await?;
        if waiting > 0 {
            ctx.status(
                "Message",
                &format!("You have {waiting} message(s). Use /read to read them."),
            );
        }
    }

    // Tell everyone who asked to hear about this nickname.
    let lower = nick.to_lowercase();
    let watchers: Vec<_> = ctx
        .core
        .sessions
        .named()
        .filter(|s| s.id != ctx.sid && s.notify.contains(&lower))
        .map(|s| s.id.clone())
        .collect();
    for watcher in watchers {
        ctx.core
            .broker
            .deliver(&watcher, Packet::status("Notify", &format!("{nick} signed on")));
    }

    let target_group = if group_field.is_empty() {
        ctx.board.config.groups.default_group.clone()
    } else {
        group_field.to_string()
    };
    if let Err(e) = helpers::join_group(ctx.board, ctx.core, &ctx.sid.clone(), &target_group, "Sign-on") {
        // The login itself stands; a refused group just leaves the session
        // groupless.
        for pkt in e.to_replies() {
            ctx.reply(pkt);
        }
    }

    Ok(())
}

/// `p <password>`: authenticate the current nickname, or register it when
/// no account exists yet.
pub struct RegisterCmd;

#[async_trait]
impl Command for RegisterCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let password = require_word(args, "p <password>")?;
        let nick = ctx.nick()?;

        match ctx.board.db.accounts().lookup(&nick).await? {
            Some(_) => {
                if !ctx.board.db.accounts().check_password(&nick, password).await? {
                    return Err(HandlerError::command("Password incorrect."));
                }
                ctx.status("Register", "Password accepted.");
            }
            None => {
                ctx.board.db.accounts().register(&nick, password).await?;
                ctx.status("Register", &format!("{nick} is now registered."));
            }
        }

        let (loginid, host) = {
            let sess = ctx.session()?;
            (sess.loginid.clone(), sess.hostname.clone())
        };
        ctx.board.db.accounts().set_signon(&nick, &loginid, &host).await?;
        ctx.session_mut()?.registered = true;
        Ok(())
    }
}

/// `cp <old> <new>`: change the account password.
pub struct ChangePasswordCmd;

#[async_trait]
impl Command for ChangePasswordCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let (old, rest) = split_word(args);
        let (new, _) = split_word(rest);
        if old.is_empty() || new.is_empty() {
            return Err(HandlerError::command("Usage: cp <old password> <new password>"));
        }

        let nick = ctx.nick()?;
        if !ctx.session()?.registered {
            return Err(HandlerError::command("You are not registered."));
        }
        if !ctx.board.db.accounts().check_password(&nick, old).await? {
            return Err(HandlerError::command("Password incorrect."));
        }

        ctx.board.db.accounts().set_password(&nick, new).await?;
        ctx.status("Pass", "Password changed.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(secure: bool, admin: bool) -> Account {
        Account {
            nick: "alice".into(),
            password_hash: Some("x".into()),
            secure,
            admin,
            protected: false,
            last_login_id: Some("alice".into()),
            last_login_host: Some("host.example.org".into()),
            signon_at: None,
            signoff_at: None,
            mailbox_limit: 20,
        }
    }

    #[test]
    fn test_auto_login_requires_matching_last_login() {
        let acc = account(false, false);
        assert!(auto_login_allowed(true, &acc, "alice", "host.example.org"));
        assert!(!auto_login_allowed(true, &acc, "alice", "other.org"));
        assert!(!auto_login_allowed(true, &acc, "bob", "host.example.org"));
    }

    #[test]
    fn test_auto_login_disabled_globally() {
        let acc = account(false, false);
        assert!(!auto_login_allowed(false, &acc, "alice", "host.example.org"));
    }

    #[test]
    fn test_auto_login_denied_for_secure_and_admin() {
        assert!(!auto_login_allowed(
            true,
            &account(true, false),
            "alice",
            "host.example.org"
        ));
        // Admin accounts always need their password.
        assert!(!auto_login_allowed(
            true,
            &account(false, true),
            "alice",
            "host.example.org"
        ));
    }
}

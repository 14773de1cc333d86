//! Nickname changes and forced collision renames.

use async_trait::async_trait;

use icb_proto::{NameExt, Packet, MAX_NICK_LEN};

use crate::error::{HandlerError, HandlerResult};
use crate::handlers::{login, require_word, Command, Context};
use crate::state::group::Volume;
use crate::state::switchboard::Core;

/// Strip a trailing `-<digits>` suffix, the shape earlier auto-renames
/// leave behind.
fn rename_base(name: &str) -> &str {
    if let Some(pos) = name.rfind('-') {
        let suffix = &name[pos + 1..];
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return &name[..pos];
        }
    }
    name
}

/// Candidate `<base>-<n>` truncated so the result stays a valid nickname.
fn numbered(base: &str, n: u32) -> String {
    let suffix = format!("-{n}");
    let room = MAX_NICK_LEN.saturating_sub(suffix.len());
    let mut candidate: String = base.chars().take(room).collect();
    candidate.push_str(&suffix);
    candidate
}

/// Forcibly rename a session to free up its nickname.
///
/// Tries `<base>-1`..`<base>-10` over the current nick, then over the
/// loginid, then random hex tokens until an unused name turns up. The
/// random branch guarantees termination.
pub fn auto_rename(core: &mut Core, sid: &str) -> Result<String, HandlerError> {
    let (old, loginid, group) = {
        let sess = core.sessions.get(sid)?;
        (
            sess.nickname.clone().unwrap_or_else(|| sess.loginid.clone()),
            sess.loginid.clone(),
            sess.group.clone(),
        )
    };

    let mut chosen = None;
    'search: for base in [rename_base(&old), rename_base(&loginid)] {
        if base.is_empty() {
            continue;
        }
        for n in 1..=10 {
            let candidate = numbered(base, n);
            if candidate.is_valid_nick() && core.sessions.find_nick(&candidate).is_none() {
                chosen = Some(candidate);
                break 'search;
            }
        }
    }
    let new = chosen.unwrap_or_else(|| loop {
        let candidate = format!("{:08x}", rand::random::<u32>());
        if core.sessions.find_nick(&candidate).is_none() {
            break candidate;
        }
    });

    {
        let sess = core.sessions.get_mut(sid)?;
        sess.nickname = Some(new.clone());
        // Authentication belonged to the old nickname.
        sess.registered = false;
    }

    if let Some(key) = group {
        let info = core.groups.get(&key);
        if info.volume != Volume::Quiet {
            core.broker.to_group(
                &key,
                Packet::status("Name", &format!("{old} changed nickname to {new}")),
            );
        }
    }
    core.broker.deliver(
        sid,
        Packet::status("Name", &format!("Your nickname is now {new}")),
    );

    Ok(new)
}

/// `name <nickname>`: change nicknames.
pub struct NameCmd;

#[async_trait]
impl Command for NameCmd {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let new = require_word(args, "name <nickname>")?.to_string();

        if !new.is_valid_nick() {
            return Err(HandlerError::command("Invalid nickname."));
        }
        if new.eq_ignore_ascii_case(&ctx.board.config.server.nickname) {
            return Err(HandlerError::command("That nickname is reserved."));
        }
        if let Some(existing) = ctx.core.sessions.find_nick(&new)
            && existing != ctx.sid
        {
            return Err(HandlerError::status("Warning", "Nickname already in use."));
        }

        let old = ctx.nick()?;
        let (was_registered, group, loginid, host) = {
            let sess = ctx.session()?;
            (
                sess.registered,
                sess.group.clone(),
                sess.loginid.clone(),
                sess.hostname.clone(),
            )
        };
        let was_moderator = group
            .as_deref()
            .is_some_and(|key| ctx.core.groups.get(key).is_moderator(&ctx.sid));

        if let Some(key) = group.as_deref() {
            let info = ctx.core.groups.get(key);
            if info.volume != Volume::Quiet {
                ctx.core.broker.to_group(
                    key,
                    Packet::status("Name", &format!("{old} changed nickname to {new}")),
                );
            }
        }

        if was_registered {
            ctx.board.db.accounts().set_signoff(&old).await?;
        }
        {
            let sess = ctx.session_mut()?;
            sess.registered = false;
            sess.nickname = Some(new.clone());
        }

        // The claimed nickname may be someone's account.
        if let Some(acc) = ctx.board.db.accounts().lookup(&new).await? {
            if acc.secure {
                ctx.status(
                    "Register",
                    &format!("{new} is registered. Send your password with /p to authenticate."),
                );
            } else if login::auto_login_allowed(
                ctx.board.config.auth.auto_register,
                &acc,
                &loginid,
                &host,
            ) {
                ctx.board.db.accounts().set_signon(&new, &loginid, &host).await?;
                ctx.session_mut()?.registered = true;
                ctx.status("Register", "Nickname automatically registered.");
            } else {
                ctx.status(
                    "Register",
                    &format!("{new} is registered. Send your password with /p to authenticate."),
                );
            }

            // An admin nickname cannot be held unauthenticated: the claim is
            // undone by renaming the claimer away.
            if acc.admin && !ctx.session()?.registered {
                auto_rename(ctx.core, &ctx.sid.clone())?;
            }
        }

        if was_moderator && let Some(key) = group.as_deref() {
            let current = ctx.nick()?;
            ctx.core.broker.to_group(
                key,
                Packet::status("Pass", &format!("{current} is the moderator")),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icb_proto::NameExt;

    #[test]
    fn test_rename_base_strips_numeric_suffix() {
        assert_eq!(rename_base("alice-3"), "alice");
        assert_eq!(rename_base("alice-10"), "alice");
        assert_eq!(rename_base("alice"), "alice");
        assert_eq!(rename_base("alice-x1"), "alice-x1");
        assert_eq!(rename_base("-1"), "");
    }

    #[test]
    fn test_numbered_respects_length_limit() {
        let cand = numbered("averylongnick", 10);
        assert!(cand.len() <= MAX_NICK_LEN);
        assert!(cand.ends_with("-10"));
        assert!(cand.is_valid_nick());
    }

    #[test]
    fn test_auto_rename_picks_first_free_suffix() {
        let mut core = Core::new();
        let a = core
            .sessions
            .create("127.0.0.1".into(), "localhost".into(), false);
        core.sessions.get_mut(&a).unwrap().nickname = Some("alice".into());
        let b = core
            .sessions
            .create("127.0.0.1".into(), "localhost".into(), false);
        core.sessions.get_mut(&b).unwrap().nickname = Some("alice-1".into());

        let new = auto_rename(&mut core, &a).unwrap();
        assert_eq!(new, "alice-2");
        assert_eq!(core.sessions.find_nick("alice-2"), Some(a.clone()));
        assert!(!core.sessions.get(&a).unwrap().registered);
    }

    #[test]
    fn test_auto_rename_terminates_when_everything_is_taken() {
        let mut core = Core::new();
        let victim = core
            .sessions
            .create("127.0.0.1".into(), "localhost".into(), false);
        {
            let sess = core.sessions.get_mut(&victim).unwrap();
            sess.nickname = Some("fred".into());
            sess.loginid = "fred".into();
        }
        // Occupy every numbered candidate for both derivation bases.
        for n in 1..=10 {
            let id = core
                .sessions
                .create("127.0.0.1".into(), "localhost".into(), false);
            core.sessions.get_mut(&id).unwrap().nickname = Some(format!("fred-{n}"));
        }

        let new = auto_rename(&mut core, &victim).unwrap();
        assert!(new.is_valid_nick());
        assert_eq!(core.sessions.find_nick(&new), Some(victim));
        // Fell through to the random hex branch.
        assert_eq!(new.len(), 8);
        assert!(new.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_auto_rename_with_adversarial_suffix_nick() {
        let mut core = Core::new();
        let victim = core
            .sessions
            .create("127.0.0.1".into(), "localhost".into(), false);
        {
            let sess = core.sessions.get_mut(&victim).unwrap();
            // Base strips to empty; loginid base must be used instead.
            sess.nickname = Some("-7".into());
            sess.loginid = "guest".into();
        }

        let new = auto_rename(&mut core, &victim).unwrap();
        assert_eq!(new, "guest-1");
    }
}

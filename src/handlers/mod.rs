//! Packet dispatch and the command action layer.
//!
//! The dispatcher maps a decoded packet's type tag (and, for `h` command
//! packets, the sub-command name) to an action. The table is built once at
//! startup; argument validation and login preconditions are explicit checks
//! here and in the individual actions.

pub mod helpers;

mod group;
mod login;
mod message;
mod name;
mod query;
mod user_status;

pub use name::auto_rename;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use icb_proto::packet::tag;
use icb_proto::{Frame, Packet};

use crate::error::{HandlerError, HandlerResult};
use crate::state::session::{Session, SessionId};
use crate::state::switchboard::{Core, Switchboard};

/// Handler context passed to each action.
///
/// The connection task holds the switchboard lock for the duration of the
/// action, so `core` access is exclusive and every mutation an action makes
/// is observed atomically by other connections.
pub struct Context<'a> {
    /// The acting session's id.
    pub sid: SessionId,
    /// Shared server state and collaborators (config, db, timeout tables).
    pub board: &'a Arc<Switchboard>,
    /// The locked store trio.
    pub core: &'a mut Core,
}

impl Context<'_> {
    /// Enqueue a packet to the acting session.
    pub fn reply(&self, pkt: Packet) {
        self.core.broker.deliver(&self.sid, pkt);
    }

    /// Enqueue a status message to the acting session.
    pub fn status(&self, category: &str, text: &str) {
        self.reply(Packet::status(category, text));
    }

    /// Enqueue a one-column output line to the acting session.
    pub fn co(&self, text: &str) {
        self.reply(Packet::co(text));
    }

    pub fn session(&self) -> Result<&Session, HandlerError> {
        Ok(self.core.sessions.get(&self.sid)?)
    }

    pub fn session_mut(&mut self) -> Result<&mut Session, HandlerError> {
        Ok(self.core.sessions.get_mut(&self.sid)?)
    }

    /// The acting session's nickname; fails when not logged in.
    pub fn nick(&self) -> Result<String, HandlerError> {
        self.session()?
            .nickname
            .clone()
            .ok_or_else(|| HandlerError::command("You must login first."))
    }
}

/// Trait implemented by all `h` sub-command actions.
///
/// `args` is the raw argument field; actions split it themselves since
/// arity differs per command.
#[async_trait]
pub trait Command: Send + Sync {
    async fn run(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult;
}

/// Static table from sub-command name to action.
pub struct Registry {
    commands: HashMap<&'static str, Box<dyn Command>>,
}

impl Registry {
    /// Create a new registry with all actions registered.
    pub fn new() -> Self {
        let mut commands: HashMap<&'static str, Box<dyn Command>> = HashMap::new();

        // Group membership and moderation
        commands.insert("g", Box::new(group::JoinCmd));
        commands.insert("topic", Box::new(group::TopicCmd));
        commands.insert("status", Box::new(group::StatusCmd));
        commands.insert("invite", Box::new(group::InviteCmd));
        commands.insert("cancel", Box::new(group::CancelCmd));
        commands.insert("talk", Box::new(group::TalkCmd));
        commands.insert("pass", Box::new(group::PassCmd));
        commands.insert("boot", Box::new(group::BootCmd));

        // Identity
        commands.insert("name", Box::new(name::NameCmd));
        commands.insert("p", Box::new(login::RegisterCmd));
        commands.insert("cp", Box::new(login::ChangePasswordCmd));

        // Messaging
        commands.insert("m", Box::new(message::PersonalCmd));
        commands.insert("write", Box::new(message::WriteCmd));
        commands.insert("read", Box::new(message::ReadCmd));
        commands.insert("beep", Box::new(message::BeepCmd));

        // Presence and preferences
        commands.insert("away", Box::new(user_status::AwayCmd));
        commands.insert("noaway", Box::new(user_status::NoAwayCmd));
        commands.insert("nobeep", Box::new(user_status::NoBeepCmd));
        commands.insert("hush", Box::new(user_status::HushCmd));
        commands.insert("notify", Box::new(user_status::NotifyCmd));
        commands.insert("echoback", Box::new(user_status::EchobackCmd));

        // Queries
        commands.insert("w", Box::new(query::WhoCmd));
        commands.insert("whois", Box::new(query::WhoisCmd));
        commands.insert("v", Box::new(query::VersionCmd));
        commands.insert("motd", Box::new(query::MotdCmd));
        commands.insert("help", Box::new(query::HelpCmd));
        commands.insert("ping", Box::new(query::PingCmd));

        Self { commands }
    }

    /// The registered command names, for help output.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Dispatch a decoded packet to the appropriate action.
    pub async fn dispatch(&self, ctx: &mut Context<'_>, frame: &Frame) -> HandlerResult {
        match frame.tag {
            tag::LOGIN => login::login(ctx, &frame.text_fields()).await,

            tag::OPEN => {
                require_login(ctx)?;
                ctx.session_mut()?.touch();
                let text = String::from_utf8_lossy(&frame.payload).into_owned();
                message::open_message(ctx, &text)
            }

            tag::COMMAND => {
                require_login(ctx)?;
                ctx.session_mut()?.touch();

                let fields = frame.text_fields();
                let cmd_name = fields
                    .first()
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| HandlerError::protocol("Empty command packet."))?
                    .to_lowercase();
                let args = fields.get(1).cloned().unwrap_or_default();
                // A third field (client message-id) is accepted and ignored.

                match self.commands.get(cmd_name.as_str()) {
                    Some(cmd) => cmd.run(ctx, &args).await,
                    None => Err(HandlerError::command(format!(
                        "Unknown command: {cmd_name}"
                    ))),
                }
            }

            tag::PING => {
                ctx.reply(Packet::pong());
                Ok(())
            }

            tag::PONG => {
                ctx.session_mut()?.touch();
                Ok(())
            }

            tag::NOOP => Ok(()),

            other => Err(HandlerError::protocol(format!(
                "Unknown packet type '{}'",
                other as char
            ))),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Login precondition shared by every post-login packet type.
fn require_login(ctx: &Context<'_>) -> HandlerResult {
    if ctx.session()?.nickname.is_none() {
        return Err(HandlerError::command("You must login first."));
    }
    Ok(())
}

/// Split one leading word off an argument string.
pub(crate) fn split_word(args: &str) -> (&str, &str) {
    let args = args.trim_start();
    match args.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (args, ""),
    }
}

/// Require a non-empty single-word argument.
pub(crate) fn require_word<'a>(args: &'a str, usage: &str) -> Result<&'a str, HandlerError> {
    let (word, _) = split_word(args);
    if word.is_empty() {
        return Err(HandlerError::command(format!("Usage: {usage}")));
    }
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::NickDb;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        board: Arc<Switchboard>,
        registry: Registry,
    }

    impl Harness {
        async fn new() -> Self {
            let db = NickDb::open_in_memory().await.unwrap();
            Self {
                board: Arc::new(Switchboard::new(Config::default(), db)),
                registry: Registry::new(),
            }
        }

        /// Register a fresh connected-but-anonymous session.
        async fn connect(&self) -> (SessionId, UnboundedReceiver<Packet>) {
            let mut core = self.board.core.lock().await;
            let sid = core
                .sessions
                .create("127.0.0.1".into(), "localhost".into(), false);
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            core.broker.add_session(&sid, tx);
            (sid, rx)
        }

        async fn dispatch(&self, sid: &SessionId, frame: Frame) -> HandlerResult {
            let mut core = self.board.core.lock().await;
            let mut ctx = Context {
                sid: sid.clone(),
                board: &self.board,
                core: &mut core,
            };
            self.registry.dispatch(&mut ctx, &frame).await
        }
    }

    fn frame(tag: u8, fields: &[&str]) -> Frame {
        Frame {
            tag,
            payload: fields.join("\x01").into_bytes(),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Packet>) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Ok(pkt) = rx.try_recv() {
            out.push(pkt);
        }
        out
    }

    #[tokio::test]
    async fn test_commands_require_login() {
        let h = Harness::new().await;
        let (sid, _rx) = h.connect().await;

        let err = h
            .dispatch(&sid, frame(tag::COMMAND, &["w", ""]))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Command(ref t) if t.contains("login first")));
    }

    #[tokio::test]
    async fn test_login_acks_and_joins_default_group() {
        let h = Harness::new().await;
        let (sid, mut rx) = h.connect().await;

        h.dispatch(&sid, frame(tag::LOGIN, &["alice", "alice", "", "login", ""]))
            .await
            .unwrap();

        let packets = drain(&mut rx);
        assert!(packets.iter().any(|p| p.tag == tag::LOGIN));
        assert!(packets.iter().any(|p| {
            p.tag == tag::STATUS
                && p.fields.first().map(String::as_str) == Some("Status")
                && p.fields[1].contains("You are now in group lobby")
        }));

        let core = h.board.core.lock().await;
        let sess = core.sessions.get(&sid).unwrap();
        assert_eq!(sess.nickname.as_deref(), Some("alice"));
        assert_eq!(sess.group.as_deref(), Some("lobby"));
        // The default group was created public, with the configured topic
        // and no implicit moderator.
        let lobby = core.groups.get("lobby");
        assert_eq!(lobby.control, crate::state::group::Control::Public);
        assert_eq!(lobby.topic.as_deref(), Some("(None)"));
        assert!(lobby.moderator.is_none());
        assert!(core.lockstep_holds());
    }

    #[tokio::test]
    async fn test_unknown_command_is_rejected() {
        let h = Harness::new().await;
        let (sid, _rx) = h.connect().await;
        h.dispatch(&sid, frame(tag::LOGIN, &["alice", "alice", "", "login", ""]))
            .await
            .unwrap();

        let err = h
            .dispatch(&sid, frame(tag::COMMAND, &["frobnicate", ""]))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Command(ref t) if t.contains("Unknown command")));
    }

    #[tokio::test]
    async fn test_ping_packet_is_answered() {
        let h = Harness::new().await;
        let (sid, mut rx) = h.connect().await;

        h.dispatch(&sid, frame(tag::PING, &[])).await.unwrap();
        let packets = drain(&mut rx);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].tag, tag::PONG);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_a_protocol_error() {
        let h = Harness::new().await;
        let (sid, _rx) = h.connect().await;

        let err = h.dispatch(&sid, frame(b'z', &[])).await.unwrap_err();
        assert!(matches!(err, HandlerError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_open_to_empty_group_fails_and_delivers_nothing() {
        let h = Harness::new().await;
        let (sid, mut rx) = h.connect().await;
        h.dispatch(&sid, frame(tag::LOGIN, &["alice", "alice", "solo", "login", ""]))
            .await
            .unwrap();
        drain(&mut rx);

        let err = h
            .dispatch(&sid, frame(tag::OPEN, &["anyone?"]))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Command(ref t) if t == "No one else in group!"));
        assert!(drain(&mut rx).is_empty());
    }
}

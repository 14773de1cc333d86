//! Session types and the in-memory session store.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Opaque session identifier.
///
/// Drawn from a large random space (UUID v4); never checked for collisions.
pub type SessionId = String;

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no such session: {0}")]
    SessionNotFound(SessionId),
}

/// Beep acceptance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeepMode {
    /// Beeps are delivered (default).
    #[default]
    On,
    /// Beeps are refused; the sender is told.
    Off,
    /// Beeps are delivered and the recipient is told who sent them.
    Verbose,
}

/// One connected client's server-side state.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    /// Peer IP address, as text.
    pub ip: String,
    /// Reverse-resolved hostname, or the bare IP when resolution failed.
    pub hostname: String,
    /// Whether the transport is encrypted.
    pub secure: bool,
    /// Login identity, freely chosen at login.
    pub loginid: String,
    /// Display nickname; `None` until login completes.
    pub nickname: Option<String>,
    /// Whether the nickname is backed by a verified account.
    pub registered: bool,
    /// Current group key (lowercase); not-in-a-group is a valid state.
    pub group: Option<String>,
    /// When the session last sent a message.
    pub last_message: Instant,
    /// Last activity of any kind.
    pub alive: Instant,
    /// When the last keepalive ping was sent.
    pub last_ping: Option<Instant>,
    /// Wall-clock sign-on time.
    pub signed_on: i64,
    /// Away message, if away.
    pub away: Option<String>,
    /// When the away message was set.
    pub away_since: Option<Instant>,
    pub beep: BeepMode,
    /// Echo own open messages back to self.
    pub echoback: bool,
    /// Lowercased nicknames whose messages this session refuses.
    pub hushed: HashSet<String>,
    /// Lowercased nicknames whose sign-ons this session wants to hear about.
    pub notify: HashSet<String>,
}

impl Session {
    fn new(id: SessionId, ip: String, hostname: String, secure: bool) -> Self {
        let now = Instant::now();
        Self {
            id,
            ip,
            hostname,
            secure,
            loginid: String::new(),
            nickname: None,
            registered: false,
            group: None,
            last_message: now,
            alive: now,
            last_ping: None,
            signed_on: chrono::Utc::now().timestamp(),
            away: None,
            away_since: None,
            beep: BeepMode::default(),
            echoback: false,
            hushed: HashSet::new(),
            notify: HashSet::new(),
        }
    }

    /// Mark activity: resets the idle clock and clears any pending ping.
    pub fn touch(&mut self) {
        self.alive = Instant::now();
        self.last_ping = None;
    }

    /// Time since last activity.
    pub fn idle(&self) -> Duration {
        self.alive.elapsed()
    }

    /// `loginid@host` form used in announcements and whois output.
    pub fn address(&self) -> String {
        format!("{}@{}", self.loginid, self.hostname)
    }

    /// The four derived address strings that invite/talk entries by
    /// address are matched against: bare IP, bare hostname, `loginid@ip`,
    /// `loginid@host`.
    pub fn match_addresses(&self) -> [String; 4] {
        [
            self.ip.clone(),
            self.hostname.clone(),
            format!("{}@{}", self.loginid, self.ip),
            format!("{}@{}", self.loginid, self.hostname),
        ]
    }

    /// Whether this session has hushed the given nickname.
    pub fn has_hushed(&self, nick: &str) -> bool {
        self.hushed.contains(&nick.to_lowercase())
    }
}

/// In-memory table of connection state keyed by session id.
///
/// Nickname uniqueness is enforced by the action layer, never here; the
/// store only promises that `find_nick` scans case-insensitively.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a fresh unguessable identifier.
    pub fn create(&mut self, ip: String, hostname: String, secure: bool) -> SessionId {
        let id = Uuid::new_v4().simple().to_string();
        self.sessions
            .insert(id.clone(), Session::new(id.clone(), ip, hostname, secure));
        id
    }

    pub fn get(&self, id: &str) -> Result<&Session, StateError> {
        self.sessions
            .get(id)
            .ok_or_else(|| StateError::SessionNotFound(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Session, StateError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| StateError::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Case-insensitive nickname lookup.
    ///
    /// Linear scan; at most one session can own a nickname because the
    /// action layer keeps them unique.
    pub fn find_nick(&self, nick: &str) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|s| {
                s.nickname
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(nick))
            })
            .map(|s| s.id.clone())
    }

    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// All sessions that currently have a nickname set.
    pub fn named(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.nickname.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

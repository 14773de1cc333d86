//! The Switchboard - central shared state for the chat server.
//!
//! The store trio (sessions, groups, broker) lives behind one async mutex;
//! every protocol-semantic mutation happens with the lock held, so the
//! stores themselves need no further synchronization. Connection tasks do
//! their socket I/O outside the lock and only take it to run an action.

use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::NickDb;
use crate::state::broker::Broker;
use crate::state::group::{GroupInfo, GroupStore};
use crate::state::session::{SessionId, SessionStore, StateError};
use crate::state::timeout::TimeoutTable;

/// What a departure left behind, for the caller to announce and clean up.
#[derive(Debug)]
pub struct Departure {
    /// Lowercased key of the group that was left.
    pub key: String,
    /// Display name at the time of departure.
    pub name: String,
    /// Whether the group still has members (false means its GroupInfo was
    /// deleted to preserve the lockstep invariant).
    pub members_remain: bool,
    /// Whether the departing session was the moderator of a still-populated
    /// group; the caller must run the hand-off.
    pub needs_handoff: bool,
}

/// The mutex-guarded store trio.
#[derive(Debug, Default)]
pub struct Core {
    pub sessions: SessionStore,
    pub groups: GroupStore,
    pub broker: Broker,
}

impl Core {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a session into a group, persisting the GroupInfo when this is
    /// the first member. Returns whether the group was created.
    ///
    /// The caller must have parted any previous group first; this is the
    /// second half of the single logical join transition.
    pub fn place_in_group(&mut self, id: &str, info: GroupInfo) -> Result<bool, StateError> {
        let key = info.key();
        let created = self.broker.join(id, &key);
        if created || !self.groups.exists(&key) {
            self.groups.insert(info);
        }
        self.sessions.get_mut(id)?.group = Some(key);
        Ok(created)
    }

    /// Take a session out of whatever group it is in, pruning the GroupInfo
    /// when the group empties. Announcements and moderator hand-off are the
    /// caller's business; the returned [`Departure`] says what is needed.
    pub fn depart_group(&mut self, id: &str) -> Result<Option<Departure>, StateError> {
        let Some(key) = self.sessions.get_mut(id)?.group.take() else {
            return Ok(None);
        };

        let info = self.groups.get(&key);
        let was_moderator = info.is_moderator(id);
        let members_remain = self.broker.part(id, &key);

        if !members_remain {
            self.groups.remove(&key);
        }

        Ok(Some(Departure {
            name: info.name.clone(),
            key,
            members_remain,
            needs_handoff: was_moderator && members_remain,
        }))
    }

    /// Pick the member a departing moderator's role falls to: the most
    /// recently active remaining member. Exact ties break on the lowest
    /// session id, which keeps the choice deterministic.
    pub fn pick_successor(&self, group: &str, excluding: &str) -> Option<SessionId> {
        self.broker
            .subscribers(group)
            .into_iter()
            .filter(|id| id != excluding)
            .filter_map(|id| self.sessions.get(&id).ok().map(|s| (s.alive, id)))
            .max_by(|(a1, id1), (a2, id2)| a1.cmp(a2).then_with(|| id2.cmp(id1)))
            .map(|(_, id)| id)
    }

    /// Lockstep invariant: a GroupInfo exists iff the broker has members
    /// for that key. Exercised by tests after every mutation sequence.
    #[cfg(test)]
    pub fn lockstep_holds(&self) -> bool {
        self.groups
            .groups()
            .iter()
            .all(|g| self.broker.has_members(&g.key()))
            && self
                .sessions
                .iter()
                .filter_map(|s| s.group.as_deref())
                .all(|key| self.groups.exists(key))
    }
}

/// Top-level owner of all server state, shared across connection tasks.
pub struct Switchboard {
    /// The store trio; every protocol-state mutation holds this lock.
    pub core: Mutex<Core>,
    /// Server configuration.
    pub config: Config,
    /// Nickname account and mailbox database.
    pub db: NickDb,
    /// Message of the day, one line per entry.
    pub motd: Vec<String>,
    /// (sender, target) pairs already given an away notice this window.
    pub away_notices: TimeoutTable<(SessionId, SessionId)>,
    /// (sender, recipient-nick) pairs already told the mailbox is full.
    pub mailbox_notices: TimeoutTable<(SessionId, String)>,
}

impl Switchboard {
    /// Assemble the switchboard. The MOTD file is read once at startup;
    /// a missing file just means an empty MOTD.
    pub fn new(config: Config, db: NickDb) -> Self {
        let motd = config
            .server
            .motd_path
            .as_deref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            core: Mutex::new(Core::new()),
            config,
            db,
            motd,
            away_notices: TimeoutTable::new(),
            mailbox_notices: TimeoutTable::new(),
        }
    }

    /// Window during which a repeated away notice is suppressed.
    pub fn away_notice_window(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.away_notice_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icb_proto::Packet;
    use tokio::sync::mpsc;

    fn add_session(
        core: &mut Core,
        nick: &str,
    ) -> (SessionId, mpsc::UnboundedReceiver<Packet>) {
        let id = core
            .sessions
            .create("127.0.0.1".into(), "localhost".into(), false);
        core.sessions.get_mut(&id).unwrap().nickname = Some(nick.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        core.broker.add_session(&id, tx);
        (id, rx)
    }

    #[test]
    fn test_lockstep_across_join_part_sequences() {
        let mut core = Core::new();
        let (a, _) = add_session(&mut core, "a");
        let (b, _) = add_session(&mut core, "b");

        assert!(core.place_in_group(&a, GroupInfo::new("x")).unwrap());
        assert!(core.lockstep_holds());

        assert!(!core.place_in_group(&b, GroupInfo::new("X")).unwrap());
        assert!(core.lockstep_holds());

        let dep = core.depart_group(&a).unwrap().unwrap();
        assert!(dep.members_remain);
        assert!(core.lockstep_holds());
        assert!(core.groups.exists("x"));

        let dep = core.depart_group(&b).unwrap().unwrap();
        assert!(!dep.members_remain);
        assert!(core.lockstep_holds());
        assert!(!core.groups.exists("x"));
    }

    #[test]
    fn test_depart_flags_moderator_handoff() {
        let mut core = Core::new();
        let (a, _) = add_session(&mut core, "a");
        let (b, _) = add_session(&mut core, "b");

        let mut info = GroupInfo::new("x");
        info.moderator = Some(a.clone());
        core.place_in_group(&a, info).unwrap();
        core.place_in_group(&b, core.groups.get("x")).unwrap();

        let dep = core.depart_group(&a).unwrap().unwrap();
        assert!(dep.needs_handoff);

        // Sole member departing needs no hand-off; the group is gone.
        let dep = core.depart_group(&b).unwrap().unwrap();
        assert!(!dep.needs_handoff);
        assert!(!dep.members_remain);
    }

    #[test]
    fn test_pick_successor_most_recently_active_then_lowest_id() {
        let mut core = Core::new();
        let (a, _) = add_session(&mut core, "a");
        let (b, _) = add_session(&mut core, "b");
        let (c, _) = add_session(&mut core, "c");
        for id in [&a, &b, &c] {
            core.place_in_group(id, GroupInfo::new("x")).unwrap();
        }

        // Make b clearly the most recently active.
        core.sessions.get_mut(&b).unwrap().touch();
        let successor = core.pick_successor("x", &a);
        assert_eq!(successor.as_ref(), Some(&b));

        // With identical activity instants the lowest id wins.
        let now = std::time::Instant::now();
        for id in [&b, &c] {
            core.sessions.get_mut(id).unwrap().alive = now;
        }
        let successor = core.pick_successor("x", &a).unwrap();
        let expected = std::cmp::min(b.clone(), c.clone());
        assert_eq!(successor, expected);
    }
}

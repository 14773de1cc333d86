//! Group metadata and the in-memory group store.

use std::collections::HashMap;

use crate::state::session::{Session, SessionId};

/// Who can see the group in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    /// Listed by name, membership hidden from non-members.
    Secret,
    /// Hidden entirely from non-members.
    Invisible,
}

impl Visibility {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Secret => "secret",
            Self::Invisible => "invisible",
        }
    }
}

/// Who may enter and who may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Control {
    #[default]
    Public,
    /// Moderator is informational only; enter/speak unrestricted.
    Moderated,
    /// Entry requires moderatorship or an invitation.
    Restricted,
    /// Speaking requires a talker entry.
    Controlled,
}

impl Control {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Moderated => "moderated",
            Self::Restricted => "restricted",
            Self::Controlled => "controlled",
        }
    }
}

/// Announcement verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Volume {
    Quiet,
    Normal,
    #[default]
    Loud,
}

impl Volume {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Normal => "normal",
            Self::Loud => "loud",
        }
    }
}

/// An invitation or talker entry.
///
/// Keyed case-insensitively on `name`. When `registered_only` is set the
/// entry only matches an actor that is currently authenticated.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub registered_only: bool,
}

impl ListEntry {
    pub fn new(name: &str, registered_only: bool) -> Self {
        Self {
            name: name.to_string(),
            registered_only,
        }
    }

    fn matches_name(&self, name: &str, actor_registered: bool) -> bool {
        self.name.eq_ignore_ascii_case(name) && (!self.registered_only || actor_registered)
    }
}

fn list_contains(entries: &[ListEntry], name: &str, actor_registered: bool) -> bool {
    entries.iter().any(|e| e.matches_name(name, actor_registered))
}

fn list_remove(entries: &mut Vec<ListEntry>, name: &str) -> bool {
    let before = entries.len();
    entries.retain(|e| !e.name.eq_ignore_ascii_case(name));
    entries.len() != before
}

fn list_add(entries: &mut Vec<ListEntry>, entry: ListEntry) {
    list_remove(entries, &entry.name);
    entries.push(entry);
}

/// Metadata for one active group.
#[derive(Debug, Clone)]
pub struct GroupInfo {
    /// Display name (case-preserving); identity is the lowercased form.
    pub name: String,
    pub visibility: Visibility,
    pub control: Control,
    pub volume: Volume,
    pub moderator: Option<SessionId>,
    pub topic: Option<String>,
    pub invited_nicks: Vec<ListEntry>,
    pub invited_addrs: Vec<ListEntry>,
    pub talker_nicks: Vec<ListEntry>,
    pub talker_addrs: Vec<ListEntry>,
}

impl GroupInfo {
    /// Default metadata for a new group.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            visibility: Visibility::default(),
            control: Control::default(),
            volume: Volume::default(),
            moderator: None,
            topic: None,
            invited_nicks: Vec::new(),
            invited_addrs: Vec::new(),
            talker_nicks: Vec::new(),
            talker_addrs: Vec::new(),
        }
    }

    /// Lowercased identity key.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn is_moderator(&self, id: &str) -> bool {
        self.moderator.as_deref() == Some(id)
    }

    /// Whether this session may enter the group.
    ///
    /// Only `Restricted` gates entry: the moderator and invited sessions
    /// (by nick or by any of the four derived addresses) pass.
    pub fn may_enter(&self, session: &Session) -> bool {
        match self.control {
            Control::Public | Control::Moderated | Control::Controlled => true,
            Control::Restricted => {
                self.is_moderator(&session.id) || self.is_invited(session)
            }
        }
    }

    /// Whether this session may speak in the group.
    ///
    /// Only `Controlled` gates speaking: the moderator and talker-listed
    /// sessions pass.
    pub fn may_talk(&self, session: &Session) -> bool {
        match self.control {
            Control::Public | Control::Moderated | Control::Restricted => true,
            Control::Controlled => {
                self.is_moderator(&session.id) || self.is_talker(session)
            }
        }
    }

    pub fn is_invited(&self, session: &Session) -> bool {
        Self::listed(session, &self.invited_nicks, &self.invited_addrs)
    }

    pub fn is_talker(&self, session: &Session) -> bool {
        Self::listed(session, &self.talker_nicks, &self.talker_addrs)
    }

    fn listed(session: &Session, nicks: &[ListEntry], addrs: &[ListEntry]) -> bool {
        if let Some(nick) = session.nickname.as_deref()
            && list_contains(nicks, nick, session.registered)
        {
            return true;
        }
        session
            .match_addresses()
            .iter()
            .any(|addr| list_contains(addrs, addr, session.registered))
    }

    pub fn invite_nick(&mut self, nick: &str, registered_only: bool) {
        list_add(&mut self.invited_nicks, ListEntry::new(nick, registered_only));
    }

    pub fn invite_addr(&mut self, addr: &str, registered_only: bool) {
        list_add(&mut self.invited_addrs, ListEntry::new(addr, registered_only));
    }

    pub fn cancel_nick(&mut self, nick: &str) -> bool {
        list_remove(&mut self.invited_nicks, nick)
    }

    pub fn cancel_addr(&mut self, addr: &str) -> bool {
        list_remove(&mut self.invited_addrs, addr)
    }

    pub fn talk_nick(&mut self, nick: &str, registered_only: bool) {
        list_add(&mut self.talker_nicks, ListEntry::new(nick, registered_only));
    }

    pub fn talk_addr(&mut self, addr: &str, registered_only: bool) {
        list_add(&mut self.talker_addrs, ListEntry::new(addr, registered_only));
    }

    pub fn untalk_nick(&mut self, nick: &str) -> bool {
        list_remove(&mut self.talker_nicks, nick)
    }

    pub fn untalk_addr(&mut self, addr: &str) -> bool {
        list_remove(&mut self.talker_addrs, addr)
    }

    /// Apply a control-mode change with its list side effects.
    ///
    /// Becoming restricted snapshots the given member nicks into the invite
    /// list and clears talkers; leaving restricted clears invitations;
    /// leaving controlled clears talkers.
    pub fn set_control<'a>(
        &mut self,
        control: Control,
        members: impl Iterator<Item = &'a str>,
    ) {
        let previous = self.control;
        if previous == control {
            return;
        }

        self.control = control;
        match control {
            Control::Restricted => {
                self.invited_nicks = members
                    .map(|nick| ListEntry::new(nick, false))
                    .collect();
                self.talker_nicks.clear();
                self.talker_addrs.clear();
            }
            _ => {
                if previous == Control::Restricted {
                    self.invited_nicks.clear();
                    self.invited_addrs.clear();
                }
                if previous == Control::Controlled {
                    self.talker_nicks.clear();
                    self.talker_addrs.clear();
                }
            }
        }
    }
}

/// In-memory table of group metadata keyed by lowercased name.
#[derive(Debug, Default)]
pub struct GroupStore {
    groups: HashMap<String, GroupInfo>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a group, or a fresh default carrying the requested display
    /// name when it does not exist. Never fails; callers decide whether the
    /// returned value gets persisted.
    pub fn get(&self, name: &str) -> GroupInfo {
        self.groups
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| GroupInfo::new(name))
    }

    /// Mutable access to a stored group.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut GroupInfo> {
        self.groups.get_mut(&name.to_lowercase())
    }

    /// Upsert keyed by lowercased name.
    pub fn insert(&mut self, info: GroupInfo) {
        self.groups.insert(info.key(), info);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.groups.contains_key(&name.to_lowercase())
    }

    /// All groups, sorted by display name.
    pub fn groups(&self) -> Vec<&GroupInfo> {
        let mut all: Vec<_> = self.groups.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn remove(&mut self, name: &str) -> Option<GroupInfo> {
        self.groups.remove(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::SessionStore;

    fn session(nick: &str, registered: bool) -> (SessionStore, SessionId) {
        let mut store = SessionStore::new();
        let id = store.create("10.0.0.5".into(), "host.example.org".into(), false);
        let s = store.get_mut(&id).unwrap();
        s.nickname = Some(nick.to_string());
        s.loginid = "login".to_string();
        s.registered = registered;
        (store, id)
    }

    #[test]
    fn test_get_missing_group_yields_default() {
        let store = GroupStore::new();
        let info = store.get("Hackers");
        assert_eq!(info.name, "Hackers");
        assert_eq!(info.control, Control::Public);
        assert_eq!(info.visibility, Visibility::Visible);
        assert_eq!(info.volume, Volume::Loud);
        assert!(info.moderator.is_none());
        // Not persisted by a plain get.
        assert!(!store.exists("Hackers"));
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let mut store = GroupStore::new();
        store.insert(GroupInfo::new("Hackers"));
        assert!(store.exists("hackers"));
        assert!(store.exists("HACKERS"));
        assert_eq!(store.get("hackers").name, "Hackers");
    }

    #[test]
    fn test_groups_sorted_by_display_name() {
        let mut store = GroupStore::new();
        store.insert(GroupInfo::new("zebra"));
        store.insert(GroupInfo::new("apple"));
        store.insert(GroupInfo::new("mango"));
        let names: Vec<_> = store.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["apple", "mango", "zebra"]);
    }

    #[test]
    fn test_restricted_blocks_uninvited() {
        let (sessions, id) = session("alice", false);
        let mut info = GroupInfo::new("x");
        info.set_control(Control::Restricted, std::iter::empty());
        assert!(!info.may_enter(sessions.get(&id).unwrap()));

        info.invite_nick("alice", false);
        assert!(info.may_enter(sessions.get(&id).unwrap()));
    }

    #[test]
    fn test_registered_only_invite_requires_authentication() {
        let (sessions, id) = session("alice", false);
        let mut info = GroupInfo::new("x");
        info.set_control(Control::Restricted, std::iter::empty());
        info.invite_nick("alice", true);
        assert!(!info.may_enter(sessions.get(&id).unwrap()));

        let (sessions, id) = session("alice", true);
        assert!(info.may_enter(sessions.get(&id).unwrap()));
    }

    #[test]
    fn test_invite_by_address_matches_derived_forms() {
        let (sessions, id) = session("alice", false);
        let mut info = GroupInfo::new("x");
        info.set_control(Control::Restricted, std::iter::empty());

        info.invite_addr("login@host.example.org", false);
        assert!(info.may_enter(sessions.get(&id).unwrap()));

        info.cancel_addr("login@host.example.org");
        assert!(!info.may_enter(sessions.get(&id).unwrap()));

        info.invite_addr("10.0.0.5", false);
        assert!(info.may_enter(sessions.get(&id).unwrap()));
    }

    #[test]
    fn test_controlled_gates_speaking_not_entry() {
        let (sessions, id) = session("alice", false);
        let mut info = GroupInfo::new("x");
        info.set_control(Control::Controlled, std::iter::empty());

        assert!(info.may_enter(sessions.get(&id).unwrap()));
        assert!(!info.may_talk(sessions.get(&id).unwrap()));

        info.talk_nick("alice", false);
        assert!(info.may_talk(sessions.get(&id).unwrap()));
    }

    #[test]
    fn test_becoming_restricted_snapshots_members_and_clears_talkers() {
        let mut info = GroupInfo::new("x");
        info.talk_nick("carol", false);
        info.set_control(Control::Restricted, ["alice", "bob"].into_iter());

        assert_eq!(info.invited_nicks.len(), 2);
        assert!(info.talker_nicks.is_empty());

        // Leaving restricted clears all invitations.
        info.invite_addr("1.2.3.4", false);
        info.set_control(Control::Public, std::iter::empty());
        assert!(info.invited_nicks.is_empty());
        assert!(info.invited_addrs.is_empty());
    }

    #[test]
    fn test_leaving_controlled_clears_talkers() {
        let mut info = GroupInfo::new("x");
        info.set_control(Control::Controlled, std::iter::empty());
        info.talk_nick("alice", false);
        info.talk_addr("1.2.3.4", false);

        info.set_control(Control::Public, std::iter::empty());
        assert!(info.talker_nicks.is_empty());
        assert!(info.talker_addrs.is_empty());
    }
}

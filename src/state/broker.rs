//! The broker: session↔group membership and message delivery.
//!
//! Each registered session owns an unbounded FIFO sink; its connection
//! handler drains the matching receiver onto the socket. Packets enqueued by
//! successive deliver calls within one action land in call order, which is
//! the per-recipient ordering guarantee. Nothing is promised about ordering
//! across different recipients.

use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::warn;

use icb_proto::Packet;

use crate::state::session::SessionId;

/// Per-session delivery sink.
pub type Sink = mpsc::UnboundedSender<Packet>;

/// Routing hub mapping sessions to groups and delivering packets.
#[derive(Debug, Default)]
pub struct Broker {
    sinks: HashMap<SessionId, Sink>,
    /// Group key (lowercase) -> member ids.
    members: HashMap<String, HashSet<SessionId>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a delivery sink. Returns false (and changes nothing) if the
    /// session is already registered; callers must check.
    pub fn add_session(&mut self, id: &str, sink: Sink) -> bool {
        if self.sinks.contains_key(id) {
            return false;
        }
        self.sinks.insert(id.to_string(), sink);
        true
    }

    /// Drop a session's sink and remove it from every group it was in.
    ///
    /// Returns the keys of groups whose membership became empty; the caller
    /// must delete the matching GroupInfo records to keep the stores in
    /// lockstep.
    pub fn remove_session(&mut self, id: &str) -> Vec<String> {
        self.sinks.remove(id);

        let mut emptied = Vec::new();
        self.members.retain(|key, members| {
            members.remove(id);
            if members.is_empty() {
                emptied.push(key.clone());
                false
            } else {
                true
            }
        });
        emptied
    }

    /// Add a session to a group. Returns whether this created the group
    /// (first member).
    pub fn join(&mut self, id: &str, group: &str) -> bool {
        let key = group.to_lowercase();
        let members = self.members.entry(key).or_default();
        let created = members.is_empty();
        members.insert(id.to_string());
        created
    }

    /// Remove a session from a group. Returns whether the group still has
    /// members afterwards; false means the caller must delete the GroupInfo.
    pub fn part(&mut self, id: &str, group: &str) -> bool {
        let key = group.to_lowercase();
        let Some(members) = self.members.get_mut(&key) else {
            return false;
        };
        members.remove(id);
        if members.is_empty() {
            self.members.remove(&key);
            false
        } else {
            true
        }
    }

    /// Member ids of a group.
    pub fn subscribers(&self, group: &str) -> Vec<SessionId> {
        self.members
            .get(&group.to_lowercase())
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the group has any members.
    pub fn has_members(&self, group: &str) -> bool {
        self.members
            .get(&group.to_lowercase())
            .is_some_and(|m| !m.is_empty())
    }

    /// Enqueue a packet onto one session's sink.
    ///
    /// Delivering to an unknown session is a no-op logged at warning level:
    /// disconnects race in-flight routing and that is expected.
    pub fn deliver(&self, id: &str, packet: Packet) {
        match self.sinks.get(id) {
            Some(sink) => {
                // Send only fails when the receiver is gone, i.e. the
                // connection is tearing down. Same race as above.
                if sink.send(packet).is_err() {
                    warn!(session = %id, "Delivery to closing session dropped");
                }
            }
            None => {
                warn!(session = %id, "Delivery to unknown session dropped");
            }
        }
    }

    /// Deliver to every member of a group. Returns the delivery count.
    pub fn to_group(&self, group: &str, packet: Packet) -> usize {
        let Some(members) = self.members.get(&group.to_lowercase()) else {
            return 0;
        };
        for id in members {
            self.deliver(id, packet.clone());
        }
        members.len()
    }

    /// Deliver to every member of a group except the sender. Returns the
    /// delivery count, which callers use to detect an empty audience.
    pub fn to_group_from(&self, sender: &str, group: &str, packet: Packet) -> usize {
        let Some(members) = self.members.get(&group.to_lowercase()) else {
            return 0;
        };
        let mut count = 0;
        for id in members {
            if id == sender {
                continue;
            }
            self.deliver(id, packet.clone());
            count += 1;
        }
        count
    }

    /// Deliver to every registered session.
    pub fn broadcast(&self, packet: Packet) -> usize {
        for id in self.sinks.keys() {
            self.deliver(id, packet.clone());
        }
        self.sinks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn sink() -> (Sink, UnboundedReceiver<Packet>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut UnboundedReceiver<Packet>) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Ok(pkt) = rx.try_recv() {
            out.push(pkt);
        }
        out
    }

    #[test]
    fn test_add_session_rejects_duplicates() {
        let mut broker = Broker::new();
        let (tx, _rx) = sink();
        assert!(broker.add_session("a", tx.clone()));
        assert!(!broker.add_session("a", tx));
    }

    #[test]
    fn test_join_reports_group_creation() {
        let mut broker = Broker::new();
        assert!(broker.join("a", "Lobby"));
        assert!(!broker.join("b", "lobby"));
        assert_eq!(broker.subscribers("LOBBY").len(), 2);
    }

    #[test]
    fn test_part_reports_remaining_members() {
        let mut broker = Broker::new();
        broker.join("a", "g");
        broker.join("b", "g");
        assert!(broker.part("a", "g"));
        assert!(!broker.part("b", "g"));
        assert!(!broker.has_members("g"));
    }

    #[test]
    fn test_remove_session_reports_emptied_groups() {
        let mut broker = Broker::new();
        let (tx, _rx) = sink();
        broker.add_session("a", tx);
        broker.join("a", "solo");
        broker.join("b", "shared");
        broker.join("a", "shared");

        let emptied = broker.remove_session("a");
        assert_eq!(emptied, vec!["solo".to_string()]);
        assert_eq!(broker.subscribers("shared"), vec!["b".to_string()]);
    }

    #[test]
    fn test_to_group_from_excludes_sender_exactly_once() {
        let mut broker = Broker::new();
        let (tx_a, mut rx_a) = sink();
        let (tx_b, mut rx_b) = sink();
        let (tx_c, mut rx_c) = sink();
        broker.add_session("a", tx_a);
        broker.add_session("b", tx_b);
        broker.add_session("c", tx_c);
        broker.join("a", "g");
        broker.join("b", "g");
        broker.join("c", "g");

        let count = broker.to_group_from("a", "g", Packet::open("a", "hi"));
        assert_eq!(count, 2);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert_eq!(drain(&mut rx_c).len(), 1);
    }

    #[test]
    fn test_deliver_to_unknown_session_is_noop() {
        let broker = Broker::new();
        // Must not panic; just a warning.
        broker.deliver("ghost", Packet::ping());
    }

    #[test]
    fn test_deliveries_preserve_fifo_order() {
        let mut broker = Broker::new();
        let (tx, mut rx) = sink();
        broker.add_session("a", tx);
        broker.join("a", "g");

        broker.deliver("a", Packet::status("First", "1"));
        broker.to_group("g", Packet::status("Second", "2"));
        broker.deliver("a", Packet::status("Third", "3"));

        let got: Vec<String> = drain(&mut rx)
            .into_iter()
            .map(|p| p.fields[0].clone())
            .collect();
        assert_eq!(got, vec!["First", "Second", "Third"]);
    }
}

//! Server state: sessions, groups, the broker, and the switchboard that
//! owns them.

pub mod broker;
pub mod group;
pub mod session;
pub mod switchboard;
pub mod timeout;

pub use broker::{Broker, Sink};
pub use group::{Control, GroupInfo, GroupStore, ListEntry, Visibility, Volume};
pub use session::{BeepMode, Session, SessionId, SessionStore, StateError};
pub use switchboard::{Core, Departure, Switchboard};
pub use timeout::TimeoutTable;

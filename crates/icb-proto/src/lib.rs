//! # icb-proto
//!
//! Wire-protocol library for the ICB family of chat protocols: binary packets
//! with a one-byte length prefix, a one-byte type tag, and `0x01`-separated
//! payload fields.
//!
//! - [`Packet`]: typed construction and overflow-checked encoding
//! - [`Frame`]: a decoded packet (tag + raw payload) with field splitting
//! - [`IcbCodec`]: tokio codec handling partial reads and pipelined packets
//! - [`NameExt`]: nickname/loginid validation

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod nick;
pub mod packet;

#[cfg(feature = "tokio")]
pub mod codec;

pub use error::ProtocolError;
pub use nick::{NameExt, MAX_NICK_LEN};
pub use packet::{split_fields, Frame, Packet, MAX_FRAME, PROTO_LEVEL, SEPARATOR};

#[cfg(feature = "tokio")]
pub use codec::IcbCodec;

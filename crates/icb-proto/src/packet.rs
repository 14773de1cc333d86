//! Packet framing and field layout.
//!
//! A packet on the wire is `[len:1][tag:1][payload:len-1]`. The length byte
//! covers everything after itself, so tag + payload is limited to 254 bytes.
//! Fields inside a payload are joined by [`SEPARATOR`]; the final field may
//! carry a trailing NUL, which the splitter strips.

use crate::error::ProtocolError;

/// Field separator inside a packet payload.
pub const SEPARATOR: u8 = 0x01;

/// Maximum tag + payload size a single length byte can describe.
pub const MAX_FRAME: usize = 254;

/// Protocol level reported in the `j` banner.
pub const PROTO_LEVEL: &str = "1";

/// Packet type tags.
///
/// The same letter can mean different things in each direction (`a` is a
/// login request from the client and a login ack from the server).
pub mod tag {
    /// Login request (client) / login ack (server).
    pub const LOGIN: u8 = b'a';
    /// Open (group) message.
    pub const OPEN: u8 = b'b';
    /// Personal message.
    pub const PERSONAL: u8 = b'c';
    /// Status message: category + text.
    pub const STATUS: u8 = b'd';
    /// Error message.
    pub const ERROR: u8 = b'e';
    /// Exit: the client must terminate.
    pub const EXIT: u8 = b'g';
    /// Command dispatch: sub-command name + argument string.
    pub const COMMAND: u8 = b'h';
    /// Generic command output (`co`, `wh`, `wl` rows).
    pub const OUTPUT: u8 = b'i';
    /// Protocol banner: level, host id, server id.
    pub const PROTO: u8 = b'j';
    /// Beep.
    pub const BEEP: u8 = b'k';
    /// Ping.
    pub const PING: u8 = b'l';
    /// Pong.
    pub const PONG: u8 = b'm';
    /// No-op keepalive.
    pub const NOOP: u8 = b'n';
}

/// An outgoing packet: a type tag plus text fields.
///
/// Construct with the typed helpers below; [`Packet::encode`] performs the
/// overflow check against [`MAX_FRAME`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet type tag (ASCII letter).
    pub tag: u8,
    /// Payload fields, joined by [`SEPARATOR`] on the wire.
    pub fields: Vec<String>,
}

impl Packet {
    /// Build a packet from a tag and text fields.
    pub fn new<S: Into<String>>(tag: u8, fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            tag,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Login ack (empty payload).
    pub fn login_ok() -> Self {
        Self::new::<String>(tag::LOGIN, [])
    }

    /// Open message as seen by a recipient.
    pub fn open(from: &str, text: &str) -> Self {
        Self::new(tag::OPEN, [from, text])
    }

    /// Personal message as seen by the recipient.
    pub fn personal(from: &str, text: &str) -> Self {
        Self::new(tag::PERSONAL, [from, text])
    }

    /// Status message: a category (`Arrive`, `Depart`, `Topic`, ...) and text.
    pub fn status(category: &str, text: &str) -> Self {
        Self::new(tag::STATUS, [category, text])
    }

    /// Error message.
    pub fn error(text: &str) -> Self {
        Self::new(tag::ERROR, [text])
    }

    /// Exit: tells the client to terminate.
    pub fn exit() -> Self {
        Self::new::<String>(tag::EXIT, [])
    }

    /// Generic command output row. `kind` is `co`, `wh` or `wl`.
    pub fn output<S: Into<String>>(kind: &str, columns: impl IntoIterator<Item = S>) -> Self {
        let mut fields = vec![kind.to_string()];
        fields.extend(columns.into_iter().map(Into::into));
        Self { tag: tag::OUTPUT, fields }
    }

    /// One-column `co` output line.
    pub fn co(text: &str) -> Self {
        Self::output("co", [text])
    }

    /// Protocol banner sent on accept.
    pub fn proto(host_id: &str, server_id: &str) -> Self {
        Self::new(tag::PROTO, [PROTO_LEVEL, host_id, server_id])
    }

    /// Beep from a named sender.
    pub fn beep(from: &str) -> Self {
        Self::new(tag::BEEP, [from])
    }

    /// Ping probe.
    pub fn ping() -> Self {
        Self::new::<String>(tag::PING, [])
    }

    /// Pong reply.
    pub fn pong() -> Self {
        Self::new::<String>(tag::PONG, [])
    }

    /// Serialize to wire form: `[len][tag][payload]`.
    ///
    /// Fails with [`ProtocolError::PacketOverflow`] when tag + payload exceed
    /// [`MAX_FRAME`], and with [`ProtocolError::ReservedByte`] when a field
    /// contains the separator or NUL.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                payload.push(SEPARATOR);
            }
            for &b in field.as_bytes() {
                if b == SEPARATOR || b == 0 {
                    return Err(ProtocolError::ReservedByte { byte: b });
                }
            }
            payload.extend_from_slice(field.as_bytes());
        }

        let frame_len = 1 + payload.len();
        if frame_len > MAX_FRAME {
            return Err(ProtocolError::PacketOverflow {
                len: frame_len,
                limit: MAX_FRAME,
            });
        }

        let mut out = Vec::with_capacity(1 + frame_len);
        out.push(frame_len as u8);
        out.push(self.tag);
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// A decoded packet: tag plus raw payload, fields not yet split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Packet type tag.
    pub tag: u8,
    /// Raw payload bytes (everything after the tag).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Split the payload into raw fields.
    pub fn fields(&self) -> Vec<&[u8]> {
        split_fields(&self.payload)
    }

    /// Split the payload into text fields, replacing invalid UTF-8.
    pub fn text_fields(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }
}

/// Tokenize a payload on [`SEPARATOR`].
///
/// A trailing NUL on the payload (null-terminated final field) is stripped
/// before splitting. A payload ending in a separator yields a trailing empty
/// field; an empty payload yields a single empty field.
pub fn split_fields(payload: &[u8]) -> Vec<&[u8]> {
    let payload = match payload.last() {
        Some(0) => &payload[..payload.len() - 1],
        _ => payload,
    };
    payload.split(|&b| b == SEPARATOR).collect()
}

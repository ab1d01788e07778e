//! Wire layout of the Aerospike admin/info protocol, as far as the proxy
//! needs to understand it
//!
//! Every message starts with an 8 byte envelope:
//!
//! ```text
//! +---------+------+------------------+
//! | VERSION | TYPE |      LENGTH      |
//! +---------+------+------------------+
//! |    1    |  1   | 6 (big endian)   |
//! +---------+------+------------------+
//! ```
//!
//! Admin messages (TYPE 2) carry a 16 byte header followed by fields:
//!
//! ```text
//! +--------+--------+---------+--------+----------+
//! | UNUSED | RESULT | COMMAND | NFIELD | RESERVED |
//! +--------+--------+---------+--------+----------+
//! |   1    |   1    |    1    |   1    |    12    |
//! +--------+--------+---------+--------+----------+
//!
//! field:
//! +----------------+------+----------+
//! |      SIZE      |  ID  |   DATA   |
//! +----------------+------+----------+
//! | 4 (big endian) |  1   | SIZE - 1 |
//! +----------------+------+----------+
//! ```

use bytes::{Buf, BufMut, BytesMut};

/// Protocol version byte carried by every message the proxy acts on
pub const PROTOCOL_VERSION: u8 = 2;

/// Envelope length
pub const ENVELOPE_LEN: usize = 8;

/// Admin header length
pub const ADMIN_HEADER_LEN: usize = 16;

/// Absolute offset of the admin command byte
pub const COMMAND_OFFSET: usize = ENVELOPE_LEN + 2;

/// Absolute offset where the user name data of the first field begins
pub const CREDENTIALS_OFFSET: usize = ENVELOPE_LEN + ADMIN_HEADER_LEN + 5;

/// Anything this short or shorter is never a command or topology frame
pub const MIN_FRAME_LEN: usize = 70;

/// Separator between user name and credential as sent by the reference
/// client: the 4 byte size of a 60 byte credential field, then its id
pub const REFERENCE_DELIMITER: &[u8] = &[0, 0, 0, 61, FieldType::Credential as u8];

/// Separator used by the alternate client, which authenticates with the
/// session token handed out on login
pub const ALTERNATE_DELIMITER: &[u8] = &[
    0,
    0,
    0,
    62,
    FieldType::SessionToken as u8,
    SESSION_TOKEN_MARKER,
];

/// First byte of every session token the proxy issues
pub const SESSION_TOKEN_MARKER: u8 = 66;

/// Length of a hashed credential, and so of the token echoed on login
pub const SESSION_TOKEN_LEN: usize = 60;

/// MessageType represents the envelope TYPE byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Info = 1,
    Admin = 2,
}

/// MessageType implementation block
impl MessageType {
    /// from_byte converts a byte to its message type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageType::Info),
            2 => Some(MessageType::Admin),
            _ => None,
        }
    }
}

/// Command represents the admin commands the proxy intercepts
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Authenticate = 0,
    Login = 20,
}

/// Command implementation block
impl Command {
    /// from_byte converts a byte to its related admin command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Command::Authenticate),
            20 => Some(Command::Login),
            _ => None,
        }
    }
}

/// ResultCode represents the admin result codes the proxy answers with
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok = 0,
    InvalidUser = 60,
    InvalidCredential = 65,
}

/// FieldType represents admin field ids
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Credential = 3,
    SessionToken = 5,
}

/// Envelope is the 8 byte prefix of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub version: u8,
    pub kind: u8,
    pub length: u64,
}

/// Envelope implementation block
impl Envelope {
    /// admin builds the envelope of an admin message with `length` payload bytes
    pub fn admin(length: usize) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind: MessageType::Admin as u8,
            length: length as u64,
        }
    }

    /// peek reads the envelope at the start of `chunk` without consuming it
    pub fn peek(chunk: &[u8]) -> Option<Self> {
        if chunk.len() < ENVELOPE_LEN {
            return None;
        }
        let mut len = &chunk[2..ENVELOPE_LEN];
        Some(Self {
            version: chunk[0],
            kind: chunk[1],
            length: len.get_uint(6),
        })
    }

    /// message_type returns the TYPE byte as a known message type, if it is one
    pub fn message_type(&self) -> Option<MessageType> {
        if self.version != PROTOCOL_VERSION {
            return None;
        }
        MessageType::from_byte(self.kind)
    }

    /// encode appends the 8 envelope bytes to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.kind);
        buf.put_uint(self.length, 6);
    }
}

/// AdminHeader is the fixed 16 byte header of an admin message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminHeader {
    pub result_code: u8,
    pub command: u8,
    pub field_count: u8,
}

/// AdminHeader implementation block
impl AdminHeader {
    /// encode appends the 16 header bytes to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
        buf.put_u8(self.result_code);
        buf.put_u8(self.command);
        buf.put_u8(self.field_count);
        buf.put_bytes(0, ADMIN_HEADER_LEN - 4);
    }
}

/// Field is one size-prefixed admin field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<'a> {
    pub kind: FieldType,
    pub data: &'a [u8],
}

/// Field implementation block
impl Field<'_> {
    /// encoded_len is the number of bytes `encode` will append
    pub fn encoded_len(&self) -> usize {
        5 + self.data.len()
    }

    /// encode appends the size, id and data to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.data.len() as u32 + 1);
        buf.put_u8(self.kind as u8);
        buf.put_slice(self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_encodes_48_bit_big_endian_length() {
        let mut buf = BytesMut::new();
        Envelope::admin(0x0102_0304_0506).encode(&mut buf);
        assert_eq!(&buf[..], &[2, 2, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn envelope_peek_reads_what_encode_wrote() {
        let info = Envelope {
            version: PROTOCOL_VERSION,
            kind: MessageType::Info as u8,
            length: 209,
        };
        let mut buf = BytesMut::new();
        info.encode(&mut buf);
        buf.put_slice(b"node");

        let env = Envelope::peek(&buf).unwrap();
        assert_eq!(env, info);
        assert_eq!(env.message_type(), Some(MessageType::Info));
    }

    #[test]
    fn envelope_peek_rejects_short_input() {
        assert_eq!(Envelope::peek(&[2, 2, 0]), None);
    }

    #[test]
    fn unknown_version_has_no_message_type() {
        let env = Envelope::peek(&[3, 2, 0, 0, 0, 0, 0, 16]).unwrap();
        assert_eq!(env.message_type(), None);
    }

    #[test]
    fn admin_header_places_result_command_and_field_count() {
        let mut buf = BytesMut::new();
        AdminHeader {
            result_code: 65,
            command: Command::Login as u8,
            field_count: 1,
        }
        .encode(&mut buf);
        assert_eq!(buf.len(), ADMIN_HEADER_LEN);
        assert_eq!(&buf[..4], &[0, 65, 20, 1]);
        assert!(buf[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn field_size_counts_the_id_byte() {
        let mut buf = BytesMut::new();
        let field = Field {
            kind: FieldType::Credential,
            data: &[0xaa; 60],
        };
        field.encode(&mut buf);
        assert_eq!(buf.len(), field.encoded_len());
        // A 60 byte credential field starts with the reference delimiter
        assert_eq!(&buf[..5], REFERENCE_DELIMITER);
    }

    #[test]
    fn commands_from_byte() {
        assert_eq!(Command::from_byte(0), Some(Command::Authenticate));
        assert_eq!(Command::from_byte(20), Some(Command::Login));
        assert_eq!(Command::from_byte(1), None);
    }

    #[test]
    fn delimiters_are_field_headers() {
        assert_eq!(REFERENCE_DELIMITER, &[0, 0, 0, 61, 3]);
        assert_eq!(ALTERNATE_DELIMITER, &[0, 0, 0, 62, 5, 66]);
    }
}

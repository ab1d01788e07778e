//! Classification of what an unauthenticated client sends
//!
//! Each read from the client is treated as one unit. Only two requests
//! are understood before authentication: LOGIN and AUTHENTICATE, both
//! carrying a user name field followed by a credential field:
//!
//! ```text
//! +----------+--------------+------+------+--------------+-----------+
//! | ENVELOPE | ADMIN HEADER | SIZE | 0x00 |  USER NAME   | CREDENTIAL|
//! +----------+--------------+------+------+--------------+-----------+
//! |    8     |      16      |  4   |  1   |   variable   | variable  |
//! +----------+--------------+------+------+--------------+-----------+
//! ```
//!
//! The credential field header works as a delimiter between the two.

use crate::protocol::{
    ALTERNATE_DELIMITER, COMMAND_OFFSET, CREDENTIALS_OFFSET, Command, Envelope, MIN_FRAME_LEN,
    MessageType, REFERENCE_DELIMITER,
};
use thiserror::Error;

/// Request is a recognized authentication request, borrowing from the
/// chunk it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub command: Command,
    pub username: &'a [u8],
    pub credential: &'a [u8],
}

/// Rejection explains why a chunk is not an authentication request
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("{0} byte chunk is too short for a command")]
    TooShort(usize),

    #[error("not an admin message")]
    NotAdmin,

    #[error("unsupported command {0}")]
    UnknownCommand(u8),

    #[error("{0:?} request without credentials")]
    Malformed(Command),
}

/// classify decides whether `chunk` is a LOGIN or AUTHENTICATE request
/// and pulls out its user name and credential
pub fn classify(chunk: &[u8]) -> Result<Request<'_>, Rejection> {
    if chunk.len() <= MIN_FRAME_LEN {
        return Err(Rejection::TooShort(chunk.len()));
    }

    let envelope = Envelope::peek(chunk).ok_or(Rejection::TooShort(chunk.len()))?;
    if envelope.message_type() != Some(MessageType::Admin) {
        return Err(Rejection::NotAdmin);
    }

    let code = chunk[COMMAND_OFFSET];
    let command = Command::from_byte(code).ok_or(Rejection::UnknownCommand(code))?;
    let fields = &chunk[CREDENTIALS_OFFSET..];

    let parts = match command {
        Command::Login => split_once(fields, REFERENCE_DELIMITER),
        Command::Authenticate => split_once(fields, REFERENCE_DELIMITER)
            .or_else(|| split_once(fields, ALTERNATE_DELIMITER)),
    };

    let (username, credential) = parts.ok_or(Rejection::Malformed(command))?;
    Ok(Request {
        command,
        username,
        credential,
    })
}

/// split_once splits `data` around the first occurrence of `delimiter`
fn split_once<'a>(data: &'a [u8], delimiter: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    let at = data
        .windows(delimiter.len())
        .position(|window| window == delimiter)?;
    Some((&data[..at], &data[at + delimiter.len()..]))
}

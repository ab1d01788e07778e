//! Frames the proxy answers unauthenticated clients with
//!
//! The three failure frames never vary and are kept as plain bytes. The
//! two success frames depend on the request and are assembled from
//! protocol records.

use crate::auth::AuthOutcome;
use crate::protocol::{
    ADMIN_HEADER_LEN, AdminHeader, Command, ENVELOPE_LEN, Envelope, Field, FieldType, ResultCode,
    SESSION_TOKEN_LEN, SESSION_TOKEN_MARKER,
};
use bytes::{Bytes, BytesMut};

/// Info message: "ERROR:80:not authenticated\n"
pub static NOT_AUTHENTICATED: [u8; 35] = [
    2, 1, 0, 0, 0, 0, 0, 27, b'E', b'R', b'R', b'O', b'R', b':', b'8', b'0', b':', b'n', b'o',
    b't', b' ', b'a', b'u', b't', b'h', b'e', b'n', b't', b'i', b'c', b'a', b't', b'e', b'd',
    b'\n',
];

/// Admin message with result code 65
pub static INVALID_CREDENTIAL: [u8; 24] = [
    2, 2, 0, 0, 0, 0, 0, 16, 0, 65, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Admin message with result code 60
pub static INVALID_USER: [u8; 24] = [
    2, 2, 0, 0, 0, 0, 0, 16, 0, 60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Response is what the proxy writes back to a client that is not yet
/// authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Write the frame; the client authenticated as `username`
    Accept { frame: Bytes, username: String },
    /// Write the frame; the client may try again
    Reject(Bytes),
    /// Write the frame, then close the connection
    Terminate(Bytes),
}

/// Response implementation block
impl Response {
    /// frame returns the bytes to write to the client
    pub fn frame(&self) -> &[u8] {
        match self {
            Response::Accept { frame, .. } => frame,
            Response::Reject(frame) | Response::Terminate(frame) => frame,
        }
    }

    /// not_authenticated is the answer to anything that is not a
    /// well-formed login or authenticate request
    pub fn not_authenticated() -> Self {
        Response::Terminate(Bytes::from_static(&NOT_AUTHENTICATED))
    }
}

/// respond turns an authentication outcome into the frame the client gets
pub fn respond(
    outcome: AuthOutcome,
    command: Command,
    username: &[u8],
    credential: &[u8],
) -> Response {
    match outcome {
        AuthOutcome::InvalidCredential => Response::Reject(Bytes::from_static(&INVALID_CREDENTIAL)),
        AuthOutcome::InvalidUser => Response::Reject(Bytes::from_static(&INVALID_USER)),
        AuthOutcome::Ok => {
            let frame = match command {
                Command::Login => login_success(credential),
                Command::Authenticate => status_frame(ResultCode::Ok),
            };
            Response::Accept {
                frame,
                username: String::from_utf8_lossy(username).into_owned(),
            }
        }
    }
}

/// status_frame builds a header-only admin message carrying `code`
pub fn status_frame(code: ResultCode) -> Bytes {
    let mut buf = BytesMut::with_capacity(ENVELOPE_LEN + ADMIN_HEADER_LEN);
    Envelope::admin(ADMIN_HEADER_LEN).encode(&mut buf);
    AdminHeader {
        result_code: code as u8,
        ..AdminHeader::default()
    }
    .encode(&mut buf);
    buf.freeze()
}

/// login_success builds the login answer. Its single session token field
/// holds the marker byte and the credential the client presented, padded
/// or cut to the hashed credential length.
pub fn login_success(credential: &[u8]) -> Bytes {
    let mut token = [0u8; SESSION_TOKEN_LEN + 1];
    token[0] = SESSION_TOKEN_MARKER;
    let n = credential.len().min(SESSION_TOKEN_LEN);
    token[1..=n].copy_from_slice(&credential[..n]);

    let field = Field {
        kind: FieldType::SessionToken,
        data: &token,
    };

    let mut buf = BytesMut::with_capacity(ENVELOPE_LEN + ADMIN_HEADER_LEN + field.encoded_len());
    Envelope::admin(ADMIN_HEADER_LEN + field.encoded_len()).encode(&mut buf);
    AdminHeader {
        field_count: 1,
        ..AdminHeader::default()
    }
    .encode(&mut buf);
    field.encode(&mut buf);
    buf.freeze()
}

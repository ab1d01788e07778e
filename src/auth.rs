use crate::error::{ProxyError, Result};
use base64::{Engine, alphabet, engine::GeneralPurpose, engine::general_purpose::NO_PAD};
use std::collections::HashMap;

/// Salt the client library hashes every password with, in bcrypt's own
/// base64 alphabet
const CLIENT_SALT: &str = "7EqJtq98hPqEX7fNZaFWoO";

/// bcrypt cost used by the client library
const CLIENT_COST: u32 = 10;

/// AuthOutcome is the verdict on a user name / credential pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok,
    InvalidUser,
    InvalidCredential,
}

/// CredentialStore maps user names to the hashed credential their client
/// will present. Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, Vec<u8>>,
}

/// CredentialStore implementation block
impl CredentialStore {
    /// new creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// from_passwords hashes every plaintext password the way the client
    /// library does before storing it
    pub fn from_passwords<'a, I>(passwords: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut store = Self::new();
        for (user, password) in passwords {
            store.insert(user.clone(), hash_password(password)?.into_bytes());
        }
        Ok(store)
    }

    /// insert stores an already hashed credential for `user`
    pub fn insert(&mut self, user: impl Into<String>, credential: impl Into<Vec<u8>>) {
        self.users.insert(user.into(), credential.into());
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// authenticate checks a user name / credential pair. The credential
    /// must equal the stored one byte for byte.
    pub fn authenticate(&self, username: &[u8], credential: &[u8]) -> AuthOutcome {
        let Ok(username) = std::str::from_utf8(username) else {
            return AuthOutcome::InvalidUser;
        };

        match self.users.get(username) {
            None => AuthOutcome::InvalidUser,
            Some(stored) if stored.as_slice() != credential => AuthOutcome::InvalidCredential,
            Some(_) => AuthOutcome::Ok,
        }
    }
}

/// hash_password produces the 60 byte modular-crypt string the client
/// library sends in place of `password`
pub fn hash_password(password: &str) -> Result<String> {
    let engine = GeneralPurpose::new(&alphabet::BCRYPT, NO_PAD);
    let salt: [u8; 16] = engine
        .decode(CLIENT_SALT)
        .map_err(|e| ProxyError::Config(format!("bad client salt: {e}")))?
        .try_into()
        .map_err(|_| ProxyError::Config("client salt is not 16 bytes".into()))?;

    let parts = bcrypt::hash_with_salt(password, CLIENT_COST, salt)?;
    Ok(parts.format_for_version(bcrypt::Version::TwoA))
}

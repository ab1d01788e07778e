use crate::auth::{AuthOutcome, CredentialStore};
use crate::frame;
use crate::responses::{self, Response};
use tracing::{debug, warn};

/// Session is the authentication state of one client connection. It is
/// owned by the task reading from that client, so nothing outlives the
/// connection and nothing is shared with other connections.
#[derive(Debug, Default)]
pub struct Session {
    user: Option<String>,
}

/// Session implementation block
impl Session {
    /// new starts an unauthenticated session
    pub fn new() -> Self {
        Self::default()
    }

    /// is_authenticated reports whether traffic should now be forwarded
    /// verbatim
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// user returns the name the client authenticated as
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// mark_authenticated records a successful login; called once the
    /// success frame has reached the client
    pub fn mark_authenticated(&mut self, user: String) {
        self.user = Some(user);
    }

    /// answer works out what an unauthenticated client gets back for `chunk`
    pub fn answer(&self, chunk: &[u8], credentials: &CredentialStore) -> Response {
        let request = match frame::classify(chunk) {
            Ok(request) => request,
            Err(rejection) => {
                warn!("rejecting unauthenticated client: {rejection}");
                return Response::not_authenticated();
            }
        };

        let outcome = credentials.authenticate(request.username, request.credential);
        let user = String::from_utf8_lossy(request.username);
        match outcome {
            AuthOutcome::Ok => debug!("{:?} for {user:?}: {outcome:?}", request.command),
            AuthOutcome::InvalidUser | AuthOutcome::InvalidCredential => {
                warn!("{:?} for {user:?} failed: {outcome:?}", request.command)
            }
        }

        responses::respond(outcome, request.command, request.username, request.credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::REFERENCE_DELIMITER;
    use crate::responses::{INVALID_USER, NOT_AUTHENTICATED};
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::Level;

    /// LogBuffer collects formatted log output for inspection
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// warnings runs `f` and returns everything logged at WARN or above
    fn warnings(f: impl FnOnce()) -> String {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let out = logs.0.lock().unwrap().clone();
        String::from_utf8(out).unwrap()
    }

    fn login(user: &[u8], credential: &[u8]) -> Vec<u8> {
        let mut chunk = vec![0u8; 29];
        chunk[0] = 2;
        chunk[1] = 2;
        chunk[10] = 20;
        chunk.extend_from_slice(user);
        chunk.extend_from_slice(REFERENCE_DELIMITER);
        chunk.extend_from_slice(credential);
        chunk
    }

    fn credentials() -> CredentialStore {
        let mut store = CredentialStore::new();
        store.insert("bob", [b'h'; 60]);
        store
    }

    #[test]
    fn starts_unauthenticated() {
        let session = Session::new();
        assert!(!session.is_authenticated());
        assert_eq!(session.user(), None);
    }

    #[test]
    fn successful_login_is_accepted() {
        let session = Session::new();
        match session.answer(&login(b"bob", &[b'h'; 60]), &credentials()) {
            Response::Accept { frame, username } => {
                assert_eq!(username, "bob");
                assert_eq!(frame.len(), 90);
                assert_eq!(&frame[30..], &[b'h'; 60]);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn unknown_user_is_rejected_but_not_terminated() {
        let session = Session::new();
        let response = session.answer(&login(b"eve", &[b'h'; 60]), &credentials());
        assert!(matches!(response, Response::Reject(_)));
        assert_eq!(response.frame(), &INVALID_USER);
    }

    #[test]
    fn failed_attempts_are_warnings() {
        let session = Session::new();
        let store = credentials();

        let logged = warnings(|| {
            session.answer(&login(b"eve", &[b'h'; 60]), &store);
        });
        assert!(logged.contains("WARN"), "{logged}");
        assert!(logged.contains("InvalidUser"), "{logged}");

        let logged = warnings(|| {
            session.answer(&login(b"bob", &[b'x'; 60]), &store);
        });
        assert!(logged.contains("InvalidCredential"), "{logged}");

        let logged = warnings(|| {
            session.answer(&login(b"bob", &[b'h'; 60]), &store);
        });
        assert!(logged.is_empty(), "{logged}");
    }

    #[test]
    fn garbage_terminates() {
        let session = Session::new();
        let response = session.answer(b"hello", &credentials());
        assert!(matches!(response, Response::Terminate(_)));
        assert_eq!(response.frame(), &NOT_AUTHENTICATED);
    }

    #[test]
    fn mark_authenticated_records_user() {
        let mut session = Session::new();
        session.mark_authenticated("bob".into());
        assert!(session.is_authenticated());
        assert_eq!(session.user(), Some("bob"));
    }
}

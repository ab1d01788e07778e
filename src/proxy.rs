use crate::auth::CredentialStore;
use crate::error::{ProxyError, Result};
use crate::responses::Response;
use crate::session::Session;
use crate::topology::ClusterMap;
use socket2::{SockRef, TcpKeepalive};
use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    task::JoinSet,
    time::timeout,
};
use tracing::{debug, error, info};

/// Read buffer size for each direction
pub const BUFFER_SIZE: usize = 16 * 1024;

/// Dial timeout used when none is configured
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive period used when none is configured
pub const DEFAULT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);

/// DialErrorHook receives the client connection when the backend cannot
/// be reached, and becomes responsible for closing it
pub type DialErrorHook = Arc<dyn Fn(TcpStream, &ProxyError) + Send + Sync>;

/// ClientWriter is the write half of the client socket. Both directions
/// write to the client: one with local answers, the other with backend
/// traffic.
type ClientWriter = Arc<Mutex<OwnedWriteHalf>>;

/// DialProxy dials the backend for every client and proxies data back and
/// forth, answering authentication locally
#[derive(Clone)]
pub struct DialProxy {
    /// Backend address
    pub addr: String,

    /// Period between TCP keep-alives on both sockets; None disables them
    pub keepalive_period: Option<Duration>,

    /// Bound on dialing the backend; None waits for as long as the OS does
    pub dial_timeout: Option<Duration>,

    on_dial_error: Option<DialErrorHook>,
}

/// DialProxy implementation block
impl DialProxy {
    /// new is a constructor for the DialProxy type
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            keepalive_period: Some(DEFAULT_KEEPALIVE_PERIOD),
            dial_timeout: Some(DEFAULT_DIAL_TIMEOUT),
            on_dial_error: None,
        }
    }

    /// with_keepalive sets the keep-alive period
    pub fn with_keepalive(mut self, period: Option<Duration>) -> Self {
        self.keepalive_period = period;
        self
    }

    /// with_dial_timeout sets the dial timeout
    pub fn with_dial_timeout(mut self, dial_timeout: Option<Duration>) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    /// with_dial_error_hook replaces the default handling of dial errors,
    /// which logs the error and closes the client
    pub fn with_dial_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(TcpStream, &ProxyError) + Send + Sync + 'static,
    {
        self.on_dial_error = Some(Arc::new(hook));
        self
    }

    /// handle_connection runs one client connection to completion
    pub async fn handle_connection(
        &self,
        client: TcpStream,
        credentials: Arc<CredentialStore>,
        cluster: Arc<ClusterMap>,
    ) -> Result<()> {
        // Dial failures are terminal for this client, there is no retry
        let backend = match self.dial().await {
            Ok(backend) => backend,
            Err(e) => {
                self.dial_failed(client, e);
                return Ok(());
            }
        };

        if let Some(period) = self.keepalive_period {
            set_keepalive(&client, period);
            set_keepalive(&backend, period);
        }

        let pump = Pump {
            peer: client.peer_addr()?,
            client,
            backend,
        };

        pump.run(credentials, cluster).await
    }

    /// dial connects to the backend, bounded by the dial timeout
    async fn dial(&self) -> Result<TcpStream> {
        self.bounded(TcpStream::connect(&self.addr)).await
    }

    /// bounded waits for `connect` for at most the dial timeout
    async fn bounded<F>(&self, connect: F) -> Result<TcpStream>
    where
        F: Future<Output = io::Result<TcpStream>>,
    {
        let result = match self.dial_timeout {
            Some(limit) => timeout(limit, connect)
                .await
                .map_err(|_| ProxyError::DialTimeout {
                    addr: self.addr.clone(),
                    timeout: limit,
                })?,
            None => connect.await,
        };

        result.map_err(|source| ProxyError::Dial {
            addr: self.addr.clone(),
            source,
        })
    }

    fn dial_failed(&self, client: TcpStream, err: ProxyError) {
        match &self.on_dial_error {
            Some(hook) => hook(client, &err),
            None => {
                let peer = client
                    .peer_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|_| "unknown".into());
                error!("proxy: for incoming conn {peer}, {err}");
                // Dropping the stream closes it
            }
        }
    }
}

/// set_keepalive turns on TCP keep-alive, logging rather than failing when
/// the socket does not support it
fn set_keepalive(stream: &TcpStream, period: Duration) {
    let keepalive = TcpKeepalive::new()
        .with_time(period)
        .with_interval(period);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        debug!("TCP keepalive setup failed: {e}");
    }
}

/// Direction names one of the two forwarding loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToBackend,
    BackendToClient,
}

/// Traffic counts bytes forwarded in each direction
#[derive(Debug, Default)]
struct Traffic {
    from_client: AtomicU64,
    from_server: AtomicU64,
}

/// Pump owns a client / backend socket pair for the lifetime of the
/// connection
struct Pump {
    peer: SocketAddr,
    client: TcpStream,
    backend: TcpStream,
}

/// Pump implementation block
impl Pump {
    /// run forwards in both directions until either one ends, then closes
    /// both sockets
    async fn run(self, credentials: Arc<CredentialStore>, cluster: Arc<ClusterMap>) -> Result<()> {
        let peer = self.peer;
        let (client_rd, client_wr) = self.client.into_split();
        let (backend_rd, backend_wr) = self.backend.into_split();
        let client_wr: ClientWriter = Arc::new(Mutex::new(client_wr));
        let traffic = Arc::new(Traffic::default());

        let mut tasks = JoinSet::new();

        // Client -> backend, intercepting authentication
        {
            let client_wr = Arc::clone(&client_wr);
            let traffic = Arc::clone(&traffic);
            tasks.spawn(async move {
                let result =
                    forward_requests(peer, client_rd, backend_wr, client_wr, credentials, traffic)
                        .await;
                (Direction::ClientToBackend, result)
            });
        }

        // Backend -> client, rewriting topology answers
        {
            let traffic = Arc::clone(&traffic);
            tasks.spawn(async move {
                let result = forward_responses(backend_rd, client_wr, cluster, traffic).await;
                (Direction::BackendToClient, result)
            });
        }

        // The first loop to end decides the outcome; aborting the other
        // drops its socket halves
        let outcome = match tasks.join_next().await {
            Some(Ok((direction, result))) => {
                debug!("{peer}: {direction:?} ended");
                result
            }
            Some(Err(e)) => Err(ProxyError::Io(e.into())),
            None => Ok(()),
        };
        tasks.shutdown().await;

        // DEBUG
        info!(
            "connection {} closed: {} bytes from client, {} bytes from server",
            peer,
            traffic.from_client.load(Ordering::Relaxed),
            traffic.from_server.load(Ordering::Relaxed)
        );

        outcome
    }
}

/// forward_requests answers authentication locally, then forwards
/// everything the client sends to the backend verbatim
async fn forward_requests(
    peer: SocketAddr,
    mut client: OwnedReadHalf,
    mut backend: OwnedWriteHalf,
    replies: ClientWriter,
    credentials: Arc<CredentialStore>,
    traffic: Arc<Traffic>,
) -> Result<()> {
    let mut session = Session::new();
    let mut buf = vec![0u8; BUFFER_SIZE];

    loop {
        let n = client.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let chunk = &buf[..n];

        if session.is_authenticated() {
            backend.write_all(chunk).await?;
            traffic.from_client.fetch_add(n as u64, Ordering::Relaxed);
            continue;
        }

        let response = session.answer(chunk, &credentials);
        replies.lock().await.write_all(response.frame()).await?;

        match response {
            Response::Accept { username, .. } => {
                session.mark_authenticated(username);
                info!("{peer} authenticated as {:?}", session.user().unwrap_or_default());
            }
            Response::Reject(_) => {}
            Response::Terminate(_) => return Ok(()),
        }
    }
}

/// forward_responses forwards everything the backend sends to the client,
/// rewriting cluster topology answers on the way
async fn forward_responses(
    mut backend: OwnedReadHalf,
    client: ClientWriter,
    cluster: Arc<ClusterMap>,
    traffic: Arc<Traffic>,
) -> Result<()> {
    let mut buf = vec![0u8; BUFFER_SIZE];

    loop {
        let n = backend.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let chunk = cluster.rewrite(&buf[..n]);
        if let Cow::Owned(rewritten) = &chunk {
            debug!("rewrote topology answer: {} -> {} bytes", n, rewritten.len());
        }

        client.lock().await.write_all(&chunk).await?;
        traffic.from_server.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn defaults() {
        let proxy = DialProxy::new("127.0.0.1:7000");
        assert_eq!(proxy.dial_timeout, Some(Duration::from_secs(10)));
        assert_eq!(proxy.keepalive_period, Some(Duration::from_secs(60)));
        assert!(proxy.on_dial_error.is_none());
    }

    #[tokio::test]
    async fn dial_reaches_listening_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let proxy = DialProxy::new(addr.to_string());
        let stream = proxy.dial().await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn dial_refused_is_a_dial_error() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let proxy = DialProxy::new(addr.to_string()).with_dial_timeout(None);
        let err = proxy.dial().await.unwrap_err();
        assert!(matches!(err, ProxyError::Dial { .. }), "{err}");
    }

    #[tokio::test]
    async fn stalled_dial_times_out() {
        let limit = Duration::from_millis(100);
        let proxy = DialProxy::new("127.0.0.1:7000").with_dial_timeout(Some(limit));

        // A connect that never completes, like a backend dropping SYNs
        let err = proxy.bounded(std::future::pending()).await.unwrap_err();
        assert!(
            matches!(err, ProxyError::DialTimeout { timeout, .. } if timeout == limit),
            "{err}"
        );
    }

    #[tokio::test]
    async fn dial_timeout_goes_to_hook_and_closes_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let proxy = DialProxy::new("127.0.0.1:7000")
            .with_dial_timeout(Some(Duration::from_millis(100)))
            .with_dial_error_hook(move |conn, err| {
                let _ = tx.send(matches!(err, ProxyError::DialTimeout { .. }));
                drop(conn);
            });

        let err = proxy.bounded(std::future::pending()).await.unwrap_err();
        proxy.dial_failed(accepted, err);
        assert!(rx.recv().unwrap());

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn keepalive_sets_idle_time_and_interval() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();

        set_keepalive(&stream, Duration::from_secs(42));

        let sock = SockRef::from(&stream);
        assert!(sock.keepalive().unwrap());
        assert_eq!(sock.keepalive_time().unwrap(), Duration::from_secs(42));
        assert_eq!(sock.keepalive_interval().unwrap(), Duration::from_secs(42));
    }
}

use crate::{
    auth::CredentialStore,
    error::{ProxyError, Result},
    proxy::DialProxy,
    topology::ClusterMap,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

/// ProxyServer accepts clients and hands each one to the DialProxy,
/// together with the read-only tables every connection shares
pub struct ProxyServer {
    pub listen_addr: String,
    target: DialProxy,
    credentials: Arc<CredentialStore>,
    cluster: Arc<ClusterMap>,
    listener: Option<TcpListener>,
}

/// ProxyServer implementation block
impl ProxyServer {
    /// new is a constructor for the ProxyServer type. It starts with no
    /// users and no cluster routes.
    pub fn new(listen_addr: impl Into<String>, target: DialProxy) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            target,
            credentials: Arc::new(CredentialStore::new()),
            cluster: Arc::new(ClusterMap::new()),
            listener: None,
        }
    }

    /// with_credentials sets the users clients may authenticate as
    pub fn with_credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    /// with_cluster_map sets the backend to proxy address rewrites
    pub fn with_cluster_map(mut self, cluster: ClusterMap) -> Self {
        self.cluster = Arc::new(cluster);
        self
    }

    /// bind to the listen address; binding again returns the bound address
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        // Instantiate tokio listener
        let listener = TcpListener::bind(&self.listen_addr).await?;
        let addr = listener.local_addr()?;

        // DEBUG
        info!("proxying from {} to {}", addr, self.target.addr);

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run listens for incoming connections until accepting fails
    pub async fn run(&mut self) -> Result<()> {
        self.bind().await?;
        let listener = self
            .listener
            .take()
            .ok_or_else(|| ProxyError::Config("listener is not bound".into()))?;

        // Listen for connections to proxy
        loop {
            // Accept incoming connection
            let (inbound, peer_addr) = listener.accept().await?;

            // Clone for this connection
            let target = self.target.clone();
            let credentials = Arc::clone(&self.credentials);
            let cluster = Arc::clone(&self.cluster);

            // Spawn async task
            tokio::spawn(async move {
                // DEBUG
                info!("new client: {}", peer_addr);

                // Send connection to connection handler
                if let Err(e) = target.handle_connection(inbound, credentials, cluster).await {
                    error!("connection error: {}", e);
                }
            });
        }
    }
}

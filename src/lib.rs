//! An authenticating TCP proxy for the Aerospike admin/info protocol
//!
//! ## Features
//!
//! - LOGIN and AUTHENTICATE answered locally from a configured user list,
//!   never forwarded to the backend
//! - Both credential layouts in use by client libraries
//! - Verbatim forwarding once a client has authenticated
//! - Rewriting of backend node addresses in cluster topology answers, so
//!   clients keep talking to the proxy
//! - Async using tokio: one task per client plus one per direction
//!
//! # Example
//! ```no_run
//! use as_proxy::{CredentialStore, DialProxy, ProxyServer, hash_password};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut credentials = CredentialStore::new();
//!     credentials.insert("bob", hash_password("secret")?);
//!
//!     let mut server = ProxyServer::new("127.0.0.1:3000", DialProxy::new("127.0.0.1:7000"))
//!         .with_credentials(credentials);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod proxy;
pub mod responses;
pub mod server;
pub mod session;
pub mod topology;

// Re-export main types at crate root for convenience
pub use auth::{AuthOutcome, CredentialStore, hash_password};
pub use config::Config;
pub use error::{ProxyError, Result};
pub use proxy::DialProxy;
pub use server::ProxyServer;
pub use topology::ClusterMap;

//! Rewriting of cluster topology answers from the backend
//!
//! Clients learn about the other cluster nodes from info answers such as
//! `peers-clear-std` and `service-clear-std`. Left alone they would then
//! connect to the nodes directly, so every configured backend address in
//! such an answer is replaced with the matching proxy address.

use crate::error::{ProxyError, Result};
use crate::protocol::{ENVELOPE_LEN, Envelope, MIN_FRAME_LEN, MessageType};
use regex::bytes::{NoExpand, Regex};
use std::borrow::Cow;

/// Low envelope length bytes of peer and service list answers
const NODE_LIST_LENGTHS: [u8; 2] = [56, 63];

/// Low envelope length byte of answers that start with "node"
const NODE_INFO_LENGTH: u8 = 209;

const NODE_INFO_PREFIX: &[u8] = b"node";

/// ClusterMap holds compiled backend address patterns and the proxy
/// address each one is replaced with. Built once at startup and only read
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct ClusterMap {
    routes: Vec<(Regex, Vec<u8>)>,
}

/// ClusterMap implementation block
impl ClusterMap {
    /// new creates an empty map, which rewrites nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// from_patterns compiles every backend pattern, in iteration order
    pub fn from_patterns<I, S, P>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, P)>,
        S: AsRef<str>,
        P: AsRef<str>,
    {
        let mut map = Self::new();
        for (pattern, proxy) in patterns {
            map.insert(pattern.as_ref(), proxy.as_ref())?;
        }
        Ok(map)
    }

    /// insert adds one backend pattern and its proxy address
    pub fn insert(&mut self, pattern: &str, proxy: &str) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|source| ProxyError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.routes.push((regex, proxy.as_bytes().to_vec()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// rewrite replaces every configured backend address in a topology
    /// answer. Anything else is returned untouched and unallocated.
    pub fn rewrite<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        if !is_topology_frame(chunk) {
            return Cow::Borrowed(chunk);
        }

        let mut out = Cow::Borrowed(chunk);
        for (regex, proxy) in &self.routes {
            let replaced = match regex.replace_all(&out, NoExpand(proxy.as_slice())) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(bytes) => bytes,
            };
            out = Cow::Owned(replaced);
        }
        out
    }
}

/// is_topology_frame recognizes the info answers that list cluster nodes
pub fn is_topology_frame(chunk: &[u8]) -> bool {
    if chunk.len() <= MIN_FRAME_LEN {
        return false;
    }

    let Some(envelope) = Envelope::peek(chunk) else {
        return false;
    };
    if envelope.message_type() != Some(MessageType::Info) {
        return false;
    }

    match chunk[ENVELOPE_LEN - 1] {
        len if NODE_LIST_LENGTHS.contains(&len) => true,
        NODE_INFO_LENGTH => chunk[ENVELOPE_LEN..].starts_with(NODE_INFO_PREFIX),
        _ => false,
    }
}

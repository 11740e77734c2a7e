//! Consistent hash ring routing block hashes to block servers.
//!
//! Each server contributes one token: the SHA-256 of its address string.
//! Tokens are kept sorted; a block hash routes to the first token at or
//! after it, wrapping to the smallest token. Because a [`BlockHash`] orders
//! byte-wise exactly as its hex rendering orders lexicographically, routing
//! matches the wire-level definition.

use std::collections::HashMap;

use crate::hash::BlockHash;

/// Immutable routing table from block hash to block-server address.
#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    /// Server tokens, sorted ascending
    tokens: Vec<BlockHash>,
    /// Token back to the address that produced it
    servers: HashMap<BlockHash, String>,
}

impl ConsistentHashRing {
    /// Build a ring over the given server addresses.
    ///
    /// Construction is order-insensitive: any permutation of `addrs`
    /// produces the same routing. Duplicate addresses collapse to one token.
    ///
    /// # Panics
    /// Panics if `addrs` is empty; routing over an empty ring is a
    /// programming error, not a runtime condition.
    #[must_use]
    pub fn new(addrs: &[String]) -> Self {
        assert!(
            !addrs.is_empty(),
            "consistent hash ring requires at least one server"
        );

        let mut tokens = Vec::with_capacity(addrs.len());
        let mut servers = HashMap::with_capacity(addrs.len());
        for addr in addrs {
            let token = BlockHash::of(addr.as_bytes());
            tokens.push(token);
            servers.insert(token, addr.clone());
        }
        tokens.sort_unstable();
        tokens.dedup();

        Self { tokens, servers }
    }

    /// Address of the server responsible for `hash`: the first token at or
    /// after it, wrapping around to the smallest token.
    #[must_use]
    pub fn responsible_server(&self, hash: &BlockHash) -> &str {
        let idx = self.tokens.partition_point(|t| t < hash);
        let token = self.tokens.get(idx).unwrap_or(&self.tokens[0]);
        &self.servers[token]
    }

    /// Number of distinct servers on the ring
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the ring has no servers (never true for a constructed ring)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

//! The route table: request path → backend port.
//!
//! Routing is deliberately minimal. Lookup is exact-match on the URI path
//! component, case-sensitive and byte-exact: no wildcards, no prefix
//! matching, no normalization (a trailing slash is a different path). The
//! table is built once from configuration and never mutated afterwards, so
//! sessions can share it behind an `Arc` and resolve concurrently without
//! any locking.

use std::collections::HashMap;

/// Immutable mapping from request path (e.g. `/hub`) to a backend TCP port
/// on the local host.
///
/// Construct once at startup via [`RouteTable::new`], then share by
/// reference. Ports are validated at configuration-load time; the table
/// itself stores whatever it is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: HashMap<String, u16>,
}

impl RouteTable {
    /// Builds a route table from a path → port map.
    pub fn new(routes: HashMap<String, u16>) -> Self {
        Self { routes }
    }

    /// Resolves a request path to its backend port.
    ///
    /// Returns `None` when the path has no route. The comparison is exact:
    /// `/hub` does not match `/hub/`, `/Hub`, or `/hub/extra`.
    pub fn resolve(&self, path: &str) -> Option<u16> {
        self.routes.get(path).copied()
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` when no routes are configured (every connection is rejected).
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterates over the configured paths, for startup logging.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

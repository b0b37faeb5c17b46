//! This module contains the event vocabulary of the on-chain project and the
//! replay fold that turns a historical event stream into the current view.
//!
//! There is no "list everything" query on chain; the only source of truth is
//! the project's historical event log. The current value for a key is the
//! last non-zero-address event emitted for it — later events supersede
//! earlier ones, and a zero-address event means the key was unset.

use alloy_primitives::Address;
use indexmap::IndexMap;

/// The kinds of historical events the reconciliation engine replays.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    /// An implementation was registered in the project's directory under an
    /// alias.
    ImplementationRegistered,

    /// A proxy was created for some implementation.
    ProxyCreated,

    /// A dependency package was linked into the project.
    DependencyRegistered,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ImplementationRegistered => "implementation-registered",
            Self::ProxyCreated => "proxy-created",
            Self::DependencyRegistered => "dependency-registered",
        };
        write!(f, "{name}")
    }
}

/// One historical event emitted by the on-chain project.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChainEvent {
    /// An implementation was registered at `address` under `alias`.
    Implementation { alias: String, address: Address },

    /// A proxy was created at `address`.
    Proxy { address: Address },

    /// The dependency package `name` was linked at `package` and `version`.
    Dependency {
        name:    String,
        package: Address,
        version: String,
    },
}

impl ChainEvent {
    /// Gets the key later events of the same kind supersede this event
    /// under.
    ///
    /// Implementations are keyed by alias and dependencies by name; proxy
    /// creations are keyed by the proxy's own address, as each creation is a
    /// distinct deployment.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Implementation { alias, .. } => alias.clone(),
            Self::Proxy { address } => address.to_string(),
            Self::Dependency { name, .. } => name.clone(),
        }
    }

    /// Gets the address the event associates with its key.
    #[must_use]
    pub fn address(&self) -> Address {
        match self {
            Self::Implementation { address, .. } | Self::Proxy { address } => *address,
            Self::Dependency { package, .. } => *package,
        }
    }
}

/// Folds a chronologically ordered event stream into the current view:
/// the last event per key wins, and keys whose final event carries the zero
/// address are dropped as unset.
///
/// The returned map preserves the order in which keys were first emitted, so
/// that downstream comparisons run in a stable, reproducible order.
#[must_use]
pub fn latest_by_key(events: Vec<ChainEvent>) -> IndexMap<String, ChainEvent> {
    let mut latest = IndexMap::new();
    for event in events {
        latest.insert(event.key(), event);
    }
    latest.retain(|_, event| event.address() != Address::ZERO);
    latest
}

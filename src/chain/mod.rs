//! This module contains the interface to the live on-chain project and the
//! bounded event fetcher built on top of it.
//!
//! Connecting, signing and transaction broadcast all live outside this
//! library; what reconciliation needs is the small read-only surface captured
//! by [`ProjectHandle`], which tests satisfy with an in-memory fake.

pub mod event;

use std::time::Duration;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::{
    chain::event::{ChainEvent, EventKind},
    constant::{DEFAULT_EVENT_TIMEOUT, TEST_EVENT_TIMEOUT},
    error::sync::{Error, Result},
};

/// The configuration for observing the on-chain project.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// The bound on how long one historical event query may take before the
    /// fetch fails with a timeout.
    pub event_timeout: Duration,
}

impl Config {
    /// Constructs a configuration suitable for automated tests, where a hung
    /// provider should fail the suite quickly rather than stall it.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            event_timeout: TEST_EVENT_TIMEOUT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_timeout: DEFAULT_EVENT_TIMEOUT,
        }
    }
}

/// A live, read-only handle to the deployed on-chain project.
///
/// The handle is the reconciliation engine's only window onto the chain.
/// Every method represents one provider query and may fail with
/// [`Error::Provider`].
#[async_trait]
pub trait ProjectHandle {
    /// Attaches to the project contract, verifying it is reachable.
    ///
    /// This is always the first call of a reconciliation run; nothing else is
    /// queried if it fails.
    async fn attach(&self) -> Result<()>;

    /// Gets the semantic version the project declares on chain.
    async fn version(&self) -> Result<String>;

    /// Gets the address of the project's owning package contract.
    async fn package_address(&self) -> Result<Address>;

    /// Gets the address of the project's implementation provider/directory
    /// contract.
    async fn provider_address(&self) -> Result<Address>;

    /// Gets the complete historical event log of the provided `kind`, in
    /// chronological order.
    async fn events(&self, kind: EventKind) -> Result<Vec<ChainEvent>>;

    /// Gets the implementation address the proxy at `proxy` currently
    /// delegates to.
    async fn implementation_of(&self, proxy: Address) -> Result<Address>;

    /// Gets the deployed bytecode at `address`.
    async fn code_at(&self, address: Address) -> Result<Vec<u8>>;
}

/// The fetcher for historical on-chain events, bounding every query by the
/// configured timeout.
#[derive(Clone, Copy, Debug)]
pub struct EventFetcher {
    config: Config,
}

impl EventFetcher {
    /// Constructs a fetcher with the provided `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Fetches the historical events of the provided `kind` from `handle`.
    ///
    /// The underlying query races the configured timeout and is attempted
    /// exactly once: on expiry the fetch fails with [`Error::EventTimeout`],
    /// and an underlying query failure propagates unchanged. Whether either
    /// is worth retrying is the caller's policy, not this library's.
    pub async fn fetch<H: ProjectHandle + ?Sized>(
        &self,
        handle: &H,
        kind: EventKind,
    ) -> Result<Vec<ChainEvent>> {
        match tokio::time::timeout(self.config.event_timeout, handle.events(kind)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::EventTimeout {
                kind,
                waited: self.config.event_timeout,
            }),
        }
    }
}

//! This module contains the reconciliation engine, which compares the local
//! deployment record against the state observed on chain and delivers every
//! discrepancy to an outcome policy.
//!
//! # Drift Is Not an Error
//!
//! The engine distinguishes sharply between failures and drift. A provider
//! that cannot be reached, or a project that cannot be attached to, aborts
//! the run with an error. Divergence between the recorded and observed state
//! is the engine's _product_: it is delivered as signals to a
//! [`DriftHandler`], which either accumulates them for display
//! ([`report::DriftReport`]) or mutates the record to match the chain
//! ([`repair::DriftRepair`]).
//!
//! # Ordering
//!
//! The comparison steps run strictly in sequence, and within each step the
//! signals are delivered in a stable order, so that two runs against the
//! same state produce identical output. The only concurrency is in the
//! read-only phases — fetching code for every observed implementation and
//! resolving every proxy's current implementation — whose results are
//! collected before any signal is delivered.

pub mod report;
pub mod repair;

use std::collections::{HashMap, HashSet};

use alloy_primitives::Address;
use futures::future::try_join_all;
use indexmap::IndexMap;
use itertools::Itertools;
use tracing::{debug, info};

use crate::{
    bytecode,
    chain::{
        event::{latest_by_key, ChainEvent, EventKind},
        Config,
        EventFetcher,
        ProjectHandle,
    },
    error::sync::{Error, Result},
    record::{DeploymentRecord, ImplementationKind},
};

/// The closed set of drift signals a reconciliation run can deliver.
///
/// The two outcome policies implement the identical signal set with opposite
/// effects: the report policy accumulates human-readable records and never
/// touches the deployment record, while the repair policy mutates the record
/// so that it matches the observed state. Every method receives the record
/// mutably; policies that only observe simply leave it alone.
pub trait DriftHandler {
    /// The locally declared semantic version differs from the on-chain one.
    fn on_version_mismatch(&mut self, record: &mut DeploymentRecord, expected: &str, observed: &str);

    /// The recorded package address differs from the on-chain one.
    fn on_package_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        expected: Option<Address>,
        observed: Address,
    );

    /// The recorded provider/directory address differs from the on-chain
    /// one.
    fn on_provider_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        expected: Option<Address>,
        observed: Address,
    );

    /// A recorded implementation is registered on chain at a different
    /// address.
    fn on_implementation_address_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        alias: &str,
        expected: Option<Address>,
        observed: Address,
    );

    /// A recorded implementation's bytecode body digest differs from the
    /// digest of the code observed at its on-chain address.
    fn on_implementation_digest_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        alias: &str,
        expected: &str,
        observed: &str,
    );

    /// An implementation is registered on chain under an alias the record
    /// does not know.
    ///
    /// The code observed at the implementation's address is supplied so that
    /// a repairing policy never needs to query the chain itself.
    fn on_missing_remote_implementation(
        &mut self,
        record: &mut DeploymentRecord,
        alias: &str,
        address: Address,
        code: &[u8],
    );

    /// A recorded implementation has no registration on chain.
    fn on_unregistered_local_implementation(&mut self, record: &mut DeploymentRecord, alias: &str);

    /// A recorded proxy sits in a bucket whose contract alias differs from
    /// the alias its observed implementation resolves to.
    fn on_proxy_alias_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        proxy: Address,
        expected_bucket: &str,
        observed_alias: &str,
    );

    /// A recorded proxy delegates to a different implementation address than
    /// recorded.
    fn on_proxy_implementation_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        proxy: Address,
        expected: Address,
        observed: Address,
    );

    /// A proxy observed on chain has no entry in the record.
    fn on_missing_remote_proxy(
        &mut self,
        record: &mut DeploymentRecord,
        proxy: Address,
        alias: &str,
        implementation: Address,
    );

    /// A recorded proxy was never observed on chain.
    fn on_unregistered_local_proxy(&mut self, record: &mut DeploymentRecord, proxy: Address);

    /// More than one registered alias points at the implementation a proxy
    /// delegates to, so the proxy cannot be attributed to any alias.
    ///
    /// This is surfaced rather than guessed at, preserving auditability.
    fn on_multiple_proxy_implementations(
        &mut self,
        record: &mut DeploymentRecord,
        implementation: Address,
        aliases: &[String],
        proxy: Address,
    );

    /// A proxy observed on chain delegates to an implementation no
    /// registered alias points at.
    fn on_unregistered_proxy_implementation(
        &mut self,
        record: &mut DeploymentRecord,
        proxy: Address,
        implementation: Address,
    );

    /// A recorded dependency is linked on chain at a different package
    /// address.
    fn on_dependency_address_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        name: &str,
        expected: Address,
        observed: Address,
    );

    /// A recorded dependency is linked on chain at a different version.
    fn on_dependency_version_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        name: &str,
        expected: &str,
        observed: &str,
    );

    /// A dependency is linked on chain that the record does not know.
    fn on_missing_dependency(
        &mut self,
        record: &mut DeploymentRecord,
        name: &str,
        package: Address,
        version: &str,
    );

    /// A recorded dependency has no link on chain.
    fn on_unregistered_dependency(&mut self, record: &mut DeploymentRecord, name: &str);

    /// Invoked once at the end of every run, after all comparisons.
    fn finalize(&mut self, record: &mut DeploymentRecord);
}

/// The engine driving one reconciliation run against a live project.
#[derive(Debug)]
pub struct Reconciler<'a, H: ProjectHandle + ?Sized> {
    /// The read-only window onto the on-chain project.
    handle: &'a H,

    /// The bounded fetcher for historical events.
    fetcher: EventFetcher,
}

impl<'a, H: ProjectHandle + ?Sized> Reconciler<'a, H> {
    /// Constructs a reconciler over `handle`, fetching events under the
    /// provided `config`.
    #[must_use]
    pub fn new(handle: &'a H, config: Config) -> Self {
        Self {
            handle,
            fetcher: EventFetcher::new(config),
        }
    }

    /// Runs one reconciliation pass, delivering every drift signal to
    /// `handler` in a stable order.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AttachFailed`] when the project contract cannot
    /// be attached to — nothing is compared in that case — and propagates
    /// event-fetch timeouts and provider failures from the comparison steps.
    /// A failing step aborts the run; the record is never partially
    /// persisted by this method (persistence is the caller's step).
    pub async fn run(
        &self,
        record: &mut DeploymentRecord,
        handler: &mut dyn DriftHandler,
    ) -> Result<()> {
        self.handle.attach().await.map_err(|e| Error::AttachFailed {
            message: e.to_string(),
        })?;
        info!("Attached to the on-chain project");

        let package = self.reconcile_project_fields(record, handler).await?;
        let implementations = self.reconcile_implementations(record, handler).await?;
        self.reconcile_proxies(record, handler, &implementations).await?;
        self.reconcile_dependencies(record, handler, package).await?;

        handler.finalize(record);
        Ok(())
    }

    /// Compares the project-level fields: version, package address and
    /// provider address.
    ///
    /// Returns the observed package address, which the dependency step uses
    /// to recognise the project's own registration even when the recorded
    /// address has drifted.
    async fn reconcile_project_fields(
        &self,
        record: &mut DeploymentRecord,
        handler: &mut dyn DriftHandler,
    ) -> Result<Address> {
        let version = self.handle.version().await?;
        if record.version != version {
            let expected = record.version.clone();
            handler.on_version_mismatch(record, &expected, &version);
        }

        let package = self.handle.package_address().await?;
        if record.package.address != Some(package) {
            let expected = record.package.address;
            handler.on_package_mismatch(record, expected, package);
        }

        let provider = self.handle.provider_address().await?;
        if record.provider.address != Some(provider) {
            let expected = record.provider.address;
            handler.on_provider_mismatch(record, expected, provider);
        }

        Ok(package)
    }

    /// Compares the recorded implementations against the registration events
    /// observed on chain, returning the observed alias-to-address map for
    /// the proxy step.
    async fn reconcile_implementations(
        &self,
        record: &mut DeploymentRecord,
        handler: &mut dyn DriftHandler,
    ) -> Result<IndexMap<String, Address>> {
        let events = self
            .fetcher
            .fetch(self.handle, EventKind::ImplementationRegistered)
            .await?;
        let observed: IndexMap<String, Address> = latest_by_key(events)
            .into_iter()
            .map(|(alias, event)| (alias, event.address()))
            .collect();
        debug!(count = observed.len(), "Observed registered implementations");

        // The per-address code fetches are independent reads, so they run
        // concurrently and are all collected before any signal is delivered.
        let handle = self.handle;
        let codes: HashMap<Address, Vec<u8>> = try_join_all(
            observed
                .values()
                .copied()
                .unique()
                .map(|address| async move {
                    Ok::<_, Error>((address, handle.code_at(address).await?))
                }),
        )
        .await?
        .into_iter()
        .collect();

        for (alias, address) in &observed {
            let code = &codes[address];
            match record.implementation_kind(alias) {
                None => {
                    handler.on_missing_remote_implementation(record, alias, *address, code);
                }
                Some(kind) => {
                    let expected_address = record.implementation_address(alias);
                    if expected_address != Some(*address) {
                        handler.on_implementation_address_mismatch(
                            record,
                            alias,
                            expected_address,
                            *address,
                        );
                    }

                    // A library's deployed code embeds its own address, so
                    // its digest is computed over the self-address-stripped
                    // body.
                    let body = bytecode::body(code);
                    let observed_digest = match kind {
                        ImplementationKind::Library => {
                            bytecode::digest(&bytecode::strip_library_address(body))
                        }
                        ImplementationKind::Contract => bytecode::digest(body),
                    };
                    let expected_digest = record
                        .implementation_body_digest(alias)
                        .unwrap_or_default()
                        .to_string();
                    if expected_digest != observed_digest {
                        handler.on_implementation_digest_mismatch(
                            record,
                            alias,
                            &expected_digest,
                            &observed_digest,
                        );
                    }
                }
            }
        }

        let unregistered: Vec<String> = record
            .implementation_aliases()
            .filter(|alias| !observed.contains_key(*alias))
            .map(ToString::to_string)
            .collect();
        for alias in unregistered {
            handler.on_unregistered_local_implementation(record, &alias);
        }

        Ok(observed)
    }

    /// Compares the recorded proxies against the creation events observed on
    /// chain, cross-referencing each proxy's current implementation against
    /// the observed implementation registrations.
    async fn reconcile_proxies(
        &self,
        record: &mut DeploymentRecord,
        handler: &mut dyn DriftHandler,
        implementations: &IndexMap<String, Address>,
    ) -> Result<()> {
        let mut aliases_by_address: IndexMap<Address, Vec<String>> = IndexMap::new();
        for (alias, address) in implementations {
            aliases_by_address.entry(*address).or_default().push(alias.clone());
        }

        let events = self.fetcher.fetch(self.handle, EventKind::ProxyCreated).await?;
        let observed = latest_by_key(events);
        debug!(count = observed.len(), "Observed created proxies");

        // Each proxy's current implementation is an independent read; the
        // results are collected before any signal is delivered.
        let handle = self.handle;
        let current: Vec<(Address, Address)> = try_join_all(
            observed
                .values()
                .map(ChainEvent::address)
                .map(|proxy| async move {
                    Ok::<_, Error>((proxy, handle.implementation_of(proxy).await?))
                }),
        )
        .await?;

        for (proxy, implementation) in &current {
            match aliases_by_address.get(implementation).map(Vec::as_slice) {
                None | Some([]) => {
                    handler.on_unregistered_proxy_implementation(record, *proxy, *implementation);
                }
                Some([alias]) => {
                    let local = record
                        .proxy_by_address(*proxy)
                        .map(|(bucket, entry)| (bucket.to_string(), entry.implementation));
                    match local {
                        Some((bucket, expected_implementation)) => {
                            let bucket_alias =
                                bucket.rsplit('/').next().unwrap_or(bucket.as_str());
                            if bucket_alias != alias.as_str() {
                                handler.on_proxy_alias_mismatch(record, *proxy, &bucket, alias);
                            }
                            if expected_implementation != *implementation {
                                handler.on_proxy_implementation_mismatch(
                                    record,
                                    *proxy,
                                    expected_implementation,
                                    *implementation,
                                );
                            }
                        }
                        None => {
                            handler.on_missing_remote_proxy(
                                record,
                                *proxy,
                                alias,
                                *implementation,
                            );
                        }
                    }
                }
                Some(aliases) => {
                    let aliases = aliases.to_vec();
                    handler.on_multiple_proxy_implementations(
                        record,
                        *implementation,
                        &aliases,
                        *proxy,
                    );
                }
            }
        }

        let seen: HashSet<Address> = current.iter().map(|(proxy, _)| *proxy).collect();
        let unregistered: Vec<Address> = record
            .all_proxies()
            .filter(|(_, proxy)| !seen.contains(&proxy.address))
            .map(|(_, proxy)| proxy.address)
            .collect();
        for proxy in unregistered {
            handler.on_unregistered_local_proxy(record, proxy);
        }

        Ok(())
    }

    /// Compares the recorded dependency links against the registration
    /// events observed on chain, ignoring the project's own registration
    /// (recognised by `own_package`, the package address observed on chain).
    async fn reconcile_dependencies(
        &self,
        record: &mut DeploymentRecord,
        handler: &mut dyn DriftHandler,
        own_package: Address,
    ) -> Result<()> {
        let events = self
            .fetcher
            .fetch(self.handle, EventKind::DependencyRegistered)
            .await?;
        let mut observed = latest_by_key(events);
        observed.retain(|_, event| event.address() != own_package);
        debug!(count = observed.len(), "Observed registered dependencies");

        for (name, event) in &observed {
            let ChainEvent::Dependency { package, version, .. } = event else {
                continue;
            };
            match record.dependencies.get(name).cloned() {
                Some(dependency) => {
                    if dependency.package != *package {
                        handler.on_dependency_address_mismatch(
                            record,
                            name,
                            dependency.package,
                            *package,
                        );
                    }
                    if dependency.version != *version {
                        handler.on_dependency_version_mismatch(
                            record,
                            name,
                            &dependency.version,
                            version,
                        );
                    }
                }
                None => handler.on_missing_dependency(record, name, *package, version),
            }
        }

        let unregistered: Vec<String> = record
            .dependencies
            .keys()
            .filter(|name| !observed.contains_key(*name))
            .cloned()
            .collect();
        for name in unregistered {
            handler.on_unregistered_dependency(record, &name);
        }

        Ok(())
    }
}

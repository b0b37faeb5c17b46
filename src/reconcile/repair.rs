//! This module contains the repair outcome policy, which mutates the
//! deployment record so that after the run it matches the state observed on
//! chain.

use alloy_primitives::Address;
use tracing::{debug, info, warn};

use crate::{
    artifact::ArtifactSet,
    bytecode,
    constant::UNKNOWN_BYTECODE_DIGEST,
    reconcile::DriftHandler,
    record::{
        AddressEntry,
        ContractEntry,
        DependencyEntry,
        DeploymentRecord,
        ProxyEntry,
        SolidityLibEntry,
    },
};

/// The outcome policy that repairs the deployment record in place.
///
/// Every signal is answered with the mutation that makes a subsequent report
/// run clean, with one deliberate exception: a proxy whose implementation is
/// claimed by multiple aliases is left untouched, because attributing it
/// would be a guess.
#[derive(Debug)]
pub struct DriftRepair<'a> {
    /// The locally compiled artifacts consulted when reconstructing the
    /// bytecode digests of a newly discovered implementation.
    artifacts: &'a ArtifactSet,

    /// The name of the project's own package, used to derive the bucket for
    /// newly discovered proxies.
    package_name: String,

    /// The number of mutations applied so far.
    mutations: usize,
}

impl<'a> DriftRepair<'a> {
    /// Constructs a repair policy consulting `artifacts` and bucketing new
    /// proxies under `package_name`.
    #[must_use]
    pub fn new(artifacts: &'a ArtifactSet, package_name: impl Into<String>) -> Self {
        Self {
            artifacts,
            package_name: package_name.into(),
            mutations: 0,
        }
    }

    /// Gets the number of mutations the policy has applied to the record.
    ///
    /// A run that applied none left the record untouched; iterating repair
    /// runs until this stays zero drives the record to convergence with the
    /// chain.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    fn mutated(&mut self) {
        self.mutations += 1;
    }

    /// Attempts to reconstruct a contract entry for `alias` from a locally
    /// compiled artifact whose deployed bytecode body matches the observed
    /// `code` exactly.
    ///
    /// Returns `None` when no artifact with that name exists or its bytecode
    /// disagrees with what is deployed; the caller then records the entry
    /// with explicit unknown placeholders rather than guessing.
    fn rebuild_from_artifact(
        &self,
        alias: &str,
        address: Address,
        code: &[u8],
    ) -> Option<ContractEntry> {
        let artifact = self.artifacts.get(alias)?;
        let creation = artifact.bytecode_bytes().ok()?;
        let deployed = artifact.deployed_bytecode_bytes().ok()?;

        let observed_body = bytecode::strip_library_address(bytecode::body(code));
        let local_body = bytecode::strip_library_address(bytecode::body(&deployed));
        if observed_body != local_body {
            return None;
        }

        Some(ContractEntry {
            address:                Some(address),
            constructor_code:       format!(
                "0x{}",
                hex::encode(bytecode::constructor_fragment(&creation, &deployed))
            ),
            local_bytecode_hash:    bytecode::digest(&creation),
            deployed_bytecode_hash: bytecode::digest(&deployed),
            body_bytecode_hash:     bytecode::digest(&observed_body),
            storage_layout:         None,
        })
    }

    /// Builds the entry recorded when no matching artifact can vouch for the
    /// observed code: the digests that depend on local compilation are
    /// explicit placeholders, while the body digest is taken from the
    /// observed code itself so that the record converges.
    fn unknown_entry(address: Address, code: &[u8]) -> ContractEntry {
        ContractEntry {
            address:                Some(address),
            constructor_code:       String::new(),
            local_bytecode_hash:    UNKNOWN_BYTECODE_DIGEST.to_string(),
            deployed_bytecode_hash: UNKNOWN_BYTECODE_DIGEST.to_string(),
            body_bytecode_hash:     bytecode::digest(&bytecode::strip_library_address(
                bytecode::body(code),
            )),
            storage_layout:         None,
        }
    }
}

impl DriftHandler for DriftRepair<'_> {
    fn on_version_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        _expected: &str,
        observed: &str,
    ) {
        debug!(version = observed, "Updating declared version");
        record.version = observed.to_string();
        self.mutated();
    }

    fn on_package_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        _expected: Option<Address>,
        observed: Address,
    ) {
        debug!(address = %observed, "Updating package address");
        record.package = AddressEntry::new(observed);
        self.mutated();
    }

    fn on_provider_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        _expected: Option<Address>,
        observed: Address,
    ) {
        debug!(address = %observed, "Updating provider address");
        record.provider = AddressEntry::new(observed);
        self.mutated();
    }

    fn on_implementation_address_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        alias: &str,
        _expected: Option<Address>,
        observed: Address,
    ) {
        debug!(alias, address = %observed, "Updating implementation address");
        if let Some(entry) = record.contracts.get_mut(alias) {
            entry.address = Some(observed);
        } else if let Some(entry) = record.solidity_libs.get_mut(alias) {
            entry.address = Some(observed);
        }
        self.mutated();
    }

    fn on_implementation_digest_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        alias: &str,
        _expected: &str,
        observed: &str,
    ) {
        debug!(alias, "Updating implementation bytecode digest");
        if let Some(entry) = record.contracts.get_mut(alias) {
            entry.body_bytecode_hash = observed.to_string();
        } else if let Some(entry) = record.solidity_libs.get_mut(alias) {
            entry.body_bytecode_hash = observed.to_string();
        }
        self.mutated();
    }

    fn on_missing_remote_implementation(
        &mut self,
        record: &mut DeploymentRecord,
        alias: &str,
        address: Address,
        code: &[u8],
    ) {
        let entry = self
            .rebuild_from_artifact(alias, address, code)
            .unwrap_or_else(|| {
                debug!(alias, "No matching local artifact; recording unknown digests");
                Self::unknown_entry(address, code)
            });

        if bytecode::is_library(code) {
            debug!(alias, address = %address, "Recording library from chain");
            record.solidity_libs.insert(alias.to_string(), SolidityLibEntry {
                address:                entry.address,
                constructor_code:       entry.constructor_code,
                local_bytecode_hash:    entry.local_bytecode_hash,
                deployed_bytecode_hash: entry.deployed_bytecode_hash,
                body_bytecode_hash:     entry.body_bytecode_hash,
            });
        } else {
            debug!(alias, address = %address, "Recording implementation from chain");
            record.contracts.insert(alias.to_string(), entry);
        }
        self.mutated();
    }

    fn on_unregistered_local_implementation(
        &mut self,
        record: &mut DeploymentRecord,
        alias: &str,
    ) {
        debug!(alias, "Removing implementation with no on-chain registration");
        record.remove_implementation(alias);
        self.mutated();
    }

    fn on_proxy_alias_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        proxy: Address,
        _expected_bucket: &str,
        observed_alias: &str,
    ) {
        let bucket = DeploymentRecord::proxy_bucket_name(&self.package_name, observed_alias);
        debug!(proxy = %proxy, bucket, "Re-bucketing proxy");
        record.move_proxy(proxy, &bucket);
        self.mutated();
    }

    fn on_proxy_implementation_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        proxy: Address,
        _expected: Address,
        observed: Address,
    ) {
        debug!(proxy = %proxy, implementation = %observed, "Updating proxy implementation");
        record.update_proxy(proxy, |entry| entry.implementation = observed);
        self.mutated();
    }

    fn on_missing_remote_proxy(
        &mut self,
        record: &mut DeploymentRecord,
        proxy: Address,
        alias: &str,
        implementation: Address,
    ) {
        debug!(proxy = %proxy, alias, "Recording proxy from chain");
        let version = record.version.clone();
        record.add_proxy(&self.package_name, alias, ProxyEntry {
            address: proxy,
            version,
            implementation,
            admin: None,
        });
        self.mutated();
    }

    fn on_unregistered_local_proxy(&mut self, record: &mut DeploymentRecord, proxy: Address) {
        debug!(proxy = %proxy, "Removing proxy that was never created on chain");
        record.remove_proxy(proxy);
        self.mutated();
    }

    fn on_multiple_proxy_implementations(
        &mut self,
        _record: &mut DeploymentRecord,
        implementation: Address,
        aliases: &[String],
        proxy: Address,
    ) {
        // Attributing the proxy to any one alias would be a guess, so it is
        // surfaced and left alone.
        warn!(
            implementation = %implementation,
            proxy = %proxy,
            aliases = %aliases.join(", "),
            "Implementation is claimed by multiple aliases; leaving proxy unattributed"
        );
    }

    fn on_unregistered_proxy_implementation(
        &mut self,
        _record: &mut DeploymentRecord,
        proxy: Address,
        implementation: Address,
    ) {
        warn!(
            proxy = %proxy,
            implementation = %implementation,
            "Proxy delegates to an unregistered implementation; leaving it unrecorded"
        );
    }

    fn on_dependency_address_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        name: &str,
        _expected: Address,
        observed: Address,
    ) {
        debug!(name, address = %observed, "Updating dependency package address");
        if let Some(dependency) = record.dependencies.get_mut(name) {
            dependency.package = observed;
        }
        self.mutated();
    }

    fn on_dependency_version_mismatch(
        &mut self,
        record: &mut DeploymentRecord,
        name: &str,
        _expected: &str,
        observed: &str,
    ) {
        debug!(name, version = observed, "Updating dependency version");
        if let Some(dependency) = record.dependencies.get_mut(name) {
            dependency.version = observed.to_string();
        }
        self.mutated();
    }

    fn on_missing_dependency(
        &mut self,
        record: &mut DeploymentRecord,
        name: &str,
        package: Address,
        version: &str,
    ) {
        debug!(name, version, "Recording dependency from chain");
        record.dependencies.insert(name.to_string(), DependencyEntry {
            package,
            version: version.to_string(),
            custom_deploy: None,
        });
        self.mutated();
    }

    fn on_unregistered_dependency(&mut self, record: &mut DeploymentRecord, name: &str) {
        debug!(name, "Removing dependency with no on-chain link");
        record.dependencies.shift_remove(name);
        self.mutated();
    }

    fn finalize(&mut self, _record: &mut DeploymentRecord) {
        info!(mutations = self.mutations, "Repair pass complete");
    }
}

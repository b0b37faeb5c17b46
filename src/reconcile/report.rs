//! This module contains the report outcome policy, which accumulates drift
//! signals as human-readable records and never touches the deployment
//! record.

use alloy_primitives::Address;
use tracing::debug;

use crate::{reconcile::DriftHandler, record::DeploymentRecord, utility::clip_hex};

/// One accumulated drift record, ready for display by the surrounding CLI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriftRecord {
    /// The locally recorded value, or `"none"` when nothing was recorded.
    pub expected: String,

    /// The value observed on chain, or `"none"` when nothing was observed.
    pub observed: String,

    /// A human-readable description of what drifted.
    pub description: String,
}

impl std::fmt::Display for DriftRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (recorded {}, observed {})",
            self.description, self.expected, self.observed
        )
    }
}

/// The outcome policy that reports drift without acting on it.
///
/// A run that delivers no signals leaves the report empty, meaning the local
/// record is up to date with the chain.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DriftReport {
    records: Vec<DriftRecord>,
}

impl DriftReport {
    /// Constructs an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the accumulated drift records, in delivery order.
    #[must_use]
    pub fn records(&self) -> &[DriftRecord] {
        &self.records
    }

    /// Checks whether the run delivered no drift at all.
    #[must_use]
    pub fn up_to_date(&self) -> bool {
        self.records.is_empty()
    }

    /// Gets the number of accumulated records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Checks whether the report is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(
        &mut self,
        expected: impl Into<String>,
        observed: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.records.push(DriftRecord {
            expected:    expected.into(),
            observed:    observed.into(),
            description: description.into(),
        });
    }

    fn render_address(address: Option<Address>) -> String {
        address.map_or_else(|| "none".to_string(), |a| a.to_string())
    }
}

impl DriftHandler for DriftReport {
    fn on_version_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        expected: &str,
        observed: &str,
    ) {
        self.push(expected, observed, "Declared project version");
    }

    fn on_package_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        expected: Option<Address>,
        observed: Address,
    ) {
        self.push(
            Self::render_address(expected),
            observed.to_string(),
            "Package contract address",
        );
    }

    fn on_provider_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        expected: Option<Address>,
        observed: Address,
    ) {
        self.push(
            Self::render_address(expected),
            observed.to_string(),
            "Provider contract address",
        );
    }

    fn on_implementation_address_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        alias: &str,
        expected: Option<Address>,
        observed: Address,
    ) {
        self.push(
            Self::render_address(expected),
            observed.to_string(),
            format!("Address of implementation {alias}"),
        );
    }

    fn on_implementation_digest_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        alias: &str,
        expected: &str,
        observed: &str,
    ) {
        self.push(
            clip_hex(expected),
            clip_hex(observed),
            format!("Bytecode digest of implementation {alias}"),
        );
    }

    fn on_missing_remote_implementation(
        &mut self,
        _record: &mut DeploymentRecord,
        alias: &str,
        address: Address,
        _code: &[u8],
    ) {
        self.push(
            "none",
            address.to_string(),
            format!("Implementation {alias} is registered on chain but not recorded locally"),
        );
    }

    fn on_unregistered_local_implementation(
        &mut self,
        _record: &mut DeploymentRecord,
        alias: &str,
    ) {
        self.push(
            format!("implementation {alias}"),
            "none",
            format!("Implementation {alias} is recorded locally but not registered on chain"),
        );
    }

    fn on_proxy_alias_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        proxy: Address,
        expected_bucket: &str,
        observed_alias: &str,
    ) {
        self.push(
            expected_bucket,
            observed_alias,
            format!("Contract alias of proxy {proxy}"),
        );
    }

    fn on_proxy_implementation_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        proxy: Address,
        expected: Address,
        observed: Address,
    ) {
        self.push(
            expected.to_string(),
            observed.to_string(),
            format!("Implementation of proxy {proxy}"),
        );
    }

    fn on_missing_remote_proxy(
        &mut self,
        _record: &mut DeploymentRecord,
        proxy: Address,
        alias: &str,
        _implementation: Address,
    ) {
        self.push(
            "none",
            proxy.to_string(),
            format!("Proxy of {alias} exists on chain but is not recorded locally"),
        );
    }

    fn on_unregistered_local_proxy(&mut self, _record: &mut DeploymentRecord, proxy: Address) {
        self.push(
            proxy.to_string(),
            "none",
            "Proxy is recorded locally but was never created on chain",
        );
    }

    fn on_multiple_proxy_implementations(
        &mut self,
        _record: &mut DeploymentRecord,
        implementation: Address,
        aliases: &[String],
        proxy: Address,
    ) {
        self.push(
            "one alias",
            aliases.join(", "),
            format!(
                "Implementation {implementation} of proxy {proxy} is claimed by multiple aliases \
                 and cannot be attributed"
            ),
        );
    }

    fn on_unregistered_proxy_implementation(
        &mut self,
        _record: &mut DeploymentRecord,
        proxy: Address,
        implementation: Address,
    ) {
        self.push(
            "a registered implementation",
            implementation.to_string(),
            format!("Proxy {proxy} delegates to an implementation no alias is registered for"),
        );
    }

    fn on_dependency_address_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        name: &str,
        expected: Address,
        observed: Address,
    ) {
        self.push(
            expected.to_string(),
            observed.to_string(),
            format!("Package address of dependency {name}"),
        );
    }

    fn on_dependency_version_mismatch(
        &mut self,
        _record: &mut DeploymentRecord,
        name: &str,
        expected: &str,
        observed: &str,
    ) {
        self.push(expected, observed, format!("Version of dependency {name}"));
    }

    fn on_missing_dependency(
        &mut self,
        _record: &mut DeploymentRecord,
        name: &str,
        package: Address,
        version: &str,
    ) {
        self.push(
            "none",
            format!("{name}@{version} at {package}"),
            format!("Dependency {name} is linked on chain but not recorded locally"),
        );
    }

    fn on_unregistered_dependency(&mut self, _record: &mut DeploymentRecord, name: &str) {
        self.push(
            format!("dependency {name}"),
            "none",
            format!("Dependency {name} is recorded locally but not linked on chain"),
        );
    }

    fn finalize(&mut self, _record: &mut DeploymentRecord) {
        debug!(drift_count = self.records.len(), "Report pass complete");
    }
}

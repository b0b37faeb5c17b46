//! This module contains the durable data model for one network's believed
//! deployed state: the deployment record.
//!
//! The record is what the reconciliation engine treats as the local baseline.
//! It is loaded from (and persisted to) one JSON document per network, and is
//! only ever mutated from a single reconciliation flow, so it needs no
//! locking.

use std::{fs, path::Path};

use alloy_primitives::Address;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    constant::{RECORD_FILE_PREFIX, RECORD_SCHEMA_VERSION},
    error::record::{Error, Result},
    layout::StorageLayout,
};

/// A single recorded address, wrapped in an object so that the on-disk field
/// can grow siblings without a schema change.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressEntry {
    /// The recorded address, absent until first deployment.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<Address>,
}

impl AddressEntry {
    /// Wraps `address` in an entry.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            address: Some(address),
        }
    }
}

/// The recorded deployment of one logical contract (an implementation an
/// upgradeable proxy delegates to).
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEntry {
    /// The address the implementation was deployed to.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<Address>,

    /// The hex-encoded constructor fragment of the creation bytecode.
    #[serde(default)]
    pub constructor_code: String,

    /// The digest of the locally compiled creation bytecode.
    #[serde(default)]
    pub local_bytecode_hash: String,

    /// The digest of the locally compiled deployed bytecode.
    #[serde(default)]
    pub deployed_bytecode_hash: String,

    /// The digest of the deployed bytecode body, with the compiler metadata
    /// stripped.
    #[serde(default)]
    pub body_bytecode_hash: String,

    /// The storage layout extracted when the implementation was recorded,
    /// kept so that a later layout can be diffed against it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_layout: Option<StorageLayout>,
}

/// The recorded deployment of one Solidity library.
///
/// Libraries carry no storage of their own, so no layout is recorded for
/// them, and their bytecode digests are computed with the embedded
/// self-address stripped.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolidityLibEntry {
    /// The address the library was deployed to.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<Address>,

    /// The hex-encoded constructor fragment of the creation bytecode.
    #[serde(default)]
    pub constructor_code: String,

    /// The digest of the locally compiled creation bytecode.
    #[serde(default)]
    pub local_bytecode_hash: String,

    /// The digest of the locally compiled deployed bytecode.
    #[serde(default)]
    pub deployed_bytecode_hash: String,

    /// The digest of the deployed bytecode body, with the metadata and the
    /// embedded self-address stripped.
    #[serde(default)]
    pub body_bytecode_hash: String,
}

/// One recorded proxy deployment.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEntry {
    /// The proxy's own address, which owns the storage.
    pub address: Address,

    /// The declared version of the package the proxy was created from.
    pub version: String,

    /// The implementation address the proxy currently delegates to.
    pub implementation: Address,

    /// The proxy's explicitly recorded admin, when one was set at creation.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub admin: Option<Address>,
}

/// One recorded link to a dependency package.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEntry {
    /// The address of the linked package contract.
    pub package: Address,

    /// The version of the dependency the link was made at.
    pub version: String,

    /// Whether the dependency was deployed by hand rather than resolved from
    /// its published package.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub custom_deploy: Option<bool>,
}

/// The kind of implementation a recorded alias refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImplementationKind {
    /// An ordinary contract implementation.
    Contract,

    /// A Solidity library, whose bytecode embeds its own address.
    Library,
}

/// The durable record of one network's believed deployed state.
///
/// # Invariants
///
/// Aliases are unique within each map. A proxy entry belongs to exactly one
/// `package/contract` bucket, and removing the last proxy of a bucket removes
/// the bucket itself.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// The schema version of the file format; must equal
    /// [`RECORD_SCHEMA_VERSION`] for the record to load.
    pub schema_version: String,

    /// The recorded contract implementations, by alias.
    #[serde(default)]
    pub contracts: IndexMap<String, ContractEntry>,

    /// The recorded Solidity libraries, by alias.
    #[serde(default)]
    pub solidity_libs: IndexMap<String, SolidityLibEntry>,

    /// The recorded proxies, bucketed by `package/contract` full name.
    #[serde(default)]
    pub proxies: IndexMap<String, Vec<ProxyEntry>>,

    /// The address of the proxy admin contract.
    #[serde(default)]
    pub proxy_admin: AddressEntry,

    /// The address of the top-level application contract.
    #[serde(default)]
    pub app: AddressEntry,

    /// The address of the owning package contract.
    #[serde(default)]
    pub package: AddressEntry,

    /// The address of the implementation provider/directory contract.
    #[serde(default)]
    pub provider: AddressEntry,

    /// The declared semantic version of the project.
    #[serde(default)]
    pub version: String,

    /// Whether the recorded package version has been frozen on chain.
    #[serde(default)]
    pub frozen: bool,

    /// The linked dependency packages, by name.
    #[serde(default)]
    pub dependencies: IndexMap<String, DependencyEntry>,
}

impl Default for DeploymentRecord {
    fn default() -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION.to_string(),
            contracts:      IndexMap::new(),
            solidity_libs:  IndexMap::new(),
            proxies:        IndexMap::new(),
            proxy_admin:    AddressEntry::default(),
            app:            AddressEntry::default(),
            package:        AddressEntry::default(),
            provider:       AddressEntry::default(),
            version:        String::new(),
            frozen:         false,
            dependencies:   IndexMap::new(),
        }
    }
}

impl DeploymentRecord {
    /// Constructs an empty record at the supported schema version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a record from the JSON document at `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SchemaMissing`] when the document declares no
    /// schema version at all, and with [`Error::SchemaUnsupported`] when it
    /// declares one this library does not read; in both cases the data needs
    /// migration and proceeding would misinterpret it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|e| Error::Read {
            path:    shown.clone(),
            message: e.to_string(),
        })?;

        // The schema version is checked on the raw document before the typed
        // parse, so that a shape change in a future schema version is
        // reported as a migration problem and not as a parse failure.
        let raw: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| Error::Parse {
                path:    shown.clone(),
                message: e.to_string(),
            })?;
        let declared = raw
            .get("schemaVersion")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::SchemaMissing {
                path: shown.clone(),
            })?;
        if declared != RECORD_SCHEMA_VERSION {
            return Err(Error::SchemaUnsupported {
                path:      shown,
                found:     declared.to_string(),
                supported: RECORD_SCHEMA_VERSION.to_string(),
            });
        }

        serde_json::from_value(raw).map_err(|e| Error::Parse {
            path:    shown,
            message: e.to_string(),
        })
    }

    /// Persists the record to `path` as pretty-printed JSON, returning
    /// whether anything was written.
    ///
    /// The write is skipped entirely when the file already holds identical
    /// content, so that an up-to-date reconciliation run leaves the file's
    /// modification time untouched.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let rendered = serde_json::to_string_pretty(self).map_err(|e| Error::Write {
            path:    shown.clone(),
            message: e.to_string(),
        })?;

        if fs::read_to_string(path).is_ok_and(|existing| existing == rendered) {
            debug!(path = %shown, "Record unchanged; skipping write");
            return Ok(false);
        }

        fs::write(path, rendered).map_err(|e| Error::Write {
            path:    shown.clone(),
            message: e.to_string(),
        })?;
        info!(path = %shown, "Wrote deployment record");
        Ok(true)
    }

    /// Derives the standard per-network record file name for `network`.
    #[must_use]
    pub fn file_name(network: &str) -> String {
        format!("{RECORD_FILE_PREFIX}.{network}.json")
    }

    /// Gets the kind of implementation recorded under `alias`, if any.
    #[must_use]
    pub fn implementation_kind(&self, alias: &str) -> Option<ImplementationKind> {
        if self.contracts.contains_key(alias) {
            Some(ImplementationKind::Contract)
        } else if self.solidity_libs.contains_key(alias) {
            Some(ImplementationKind::Library)
        } else {
            None
        }
    }

    /// Gets the recorded address of the implementation under `alias`,
    /// whether it is a contract or a library.
    #[must_use]
    pub fn implementation_address(&self, alias: &str) -> Option<Address> {
        self.contracts
            .get(alias)
            .and_then(|entry| entry.address)
            .or_else(|| self.solidity_libs.get(alias).and_then(|entry| entry.address))
    }

    /// Gets the recorded body bytecode digest of the implementation under
    /// `alias`.
    #[must_use]
    pub fn implementation_body_digest(&self, alias: &str) -> Option<&str> {
        self.contracts
            .get(alias)
            .map(|entry| entry.body_bytecode_hash.as_str())
            .or_else(|| {
                self.solidity_libs
                    .get(alias)
                    .map(|entry| entry.body_bytecode_hash.as_str())
            })
    }

    /// Gets every recorded implementation alias, contracts first and then
    /// libraries, in insertion order.
    pub fn implementation_aliases(&self) -> impl Iterator<Item = &str> {
        self.contracts
            .keys()
            .chain(self.solidity_libs.keys())
            .map(String::as_str)
    }

    /// Removes the implementation recorded under `alias` from whichever map
    /// holds it, returning whether anything was removed.
    pub fn remove_implementation(&mut self, alias: &str) -> bool {
        self.contracts.shift_remove(alias).is_some()
            || self.solidity_libs.shift_remove(alias).is_some()
    }

    /// Derives the full `package/contract` bucket name for a proxy.
    #[must_use]
    pub fn proxy_bucket_name(package: &str, contract: &str) -> String {
        format!("{package}/{contract}")
    }

    /// Adds `proxy` to the bucket for `package` and `contract`, creating the
    /// bucket if it does not exist yet.
    pub fn add_proxy(&mut self, package: &str, contract: &str, proxy: ProxyEntry) {
        self.proxies
            .entry(Self::proxy_bucket_name(package, contract))
            .or_default()
            .push(proxy);
    }

    /// Finds the recorded proxy with the provided `address` by scanning the
    /// buckets linearly, returning the owning bucket's full name alongside
    /// the entry.
    #[must_use]
    pub fn proxy_by_address(&self, address: Address) -> Option<(&str, &ProxyEntry)> {
        self.proxies.iter().find_map(|(bucket, entries)| {
            entries
                .iter()
                .find(|proxy| proxy.address == address)
                .map(|proxy| (bucket.as_str(), proxy))
        })
    }

    /// Applies `update` to the recorded proxy with the provided `address`,
    /// returning whether a proxy was found.
    pub fn update_proxy(&mut self, address: Address, update: impl FnOnce(&mut ProxyEntry)) -> bool {
        for entries in self.proxies.values_mut() {
            if let Some(proxy) = entries.iter_mut().find(|proxy| proxy.address == address) {
                update(proxy);
                return true;
            }
        }
        false
    }

    /// Removes the recorded proxy with the provided `address`, dropping its
    /// bucket when the bucket becomes empty, and returning whether anything
    /// was removed.
    pub fn remove_proxy(&mut self, address: Address) -> bool {
        let Some(bucket) = self.proxies.iter().find_map(|(bucket, entries)| {
            entries
                .iter()
                .any(|proxy| proxy.address == address)
                .then(|| bucket.clone())
        }) else {
            return false;
        };

        let entries = self.proxies.get_mut(&bucket).unwrap_or_else(|| {
            unreachable!("bucket was found by the scan above")
        });
        entries.retain(|proxy| proxy.address != address);
        if entries.is_empty() {
            self.proxies.shift_remove(&bucket);
        }
        true
    }

    /// Moves the recorded proxy with the provided `address` into the bucket
    /// named `bucket`, upholding the empty-bucket invariant on the source,
    /// and returning whether a proxy was moved.
    pub fn move_proxy(&mut self, address: Address, bucket: &str) -> bool {
        let Some(entry) = self
            .proxy_by_address(address)
            .map(|(_, proxy)| proxy.clone())
        else {
            return false;
        };
        self.remove_proxy(address);
        self.proxies.entry(bucket.to_string()).or_default().push(entry);
        true
    }

    /// Iterates over every recorded proxy in bucket order.
    pub fn all_proxies(&self) -> impl Iterator<Item = (&str, &ProxyEntry)> {
        self.proxies.iter().flat_map(|(bucket, entries)| {
            entries.iter().map(move |proxy| (bucket.as_str(), proxy))
        })
    }
}

#[cfg(test)]
mod test {
    use alloy_primitives::address;

    use super::{DeploymentRecord, ProxyEntry};

    fn proxy(address: alloy_primitives::Address) -> ProxyEntry {
        ProxyEntry {
            address,
            version: "1.0.0".to_string(),
            implementation: address,
            admin: None,
        }
    }

    #[test]
    fn removing_the_last_proxy_removes_the_bucket() {
        let first = address!("0000000000000000000000000000000000000001");
        let second = address!("0000000000000000000000000000000000000002");

        let mut record = DeploymentRecord::new();
        record.add_proxy("pkg", "Token", proxy(first));
        record.add_proxy("pkg", "Token", proxy(second));

        assert!(record.remove_proxy(first));
        assert!(record.proxies.contains_key("pkg/Token"));
        assert!(record.remove_proxy(second));
        assert!(!record.proxies.contains_key("pkg/Token"));
    }

    #[test]
    fn proxies_are_found_by_address_across_buckets() {
        let first = address!("0000000000000000000000000000000000000001");
        let second = address!("0000000000000000000000000000000000000002");

        let mut record = DeploymentRecord::new();
        record.add_proxy("pkg", "Token", proxy(first));
        record.add_proxy("pkg", "Vault", proxy(second));

        let (bucket, found) = record.proxy_by_address(second).unwrap();
        assert_eq!(bucket, "pkg/Vault");
        assert_eq!(found.address, second);
        assert!(record.proxy_by_address(
            address!("00000000000000000000000000000000000000ff")
        )
        .is_none());
    }

    #[test]
    fn moving_a_proxy_rebuckets_it() {
        let first = address!("0000000000000000000000000000000000000001");

        let mut record = DeploymentRecord::new();
        record.add_proxy("pkg", "Token", proxy(first));
        assert!(record.move_proxy(first, "pkg/Vault"));

        assert!(!record.proxies.contains_key("pkg/Token"));
        assert_eq!(record.proxy_by_address(first).unwrap().0, "pkg/Vault");
    }

    #[test]
    fn implementations_are_removed_from_whichever_map_holds_them() {
        let mut record = DeploymentRecord::new();
        record.contracts.insert("Token".to_string(), Default::default());
        record
            .solidity_libs
            .insert("MathLib".to_string(), Default::default());

        assert!(record.remove_implementation("Token"));
        assert!(record.remove_implementation("MathLib"));
        assert!(!record.remove_implementation("Token"));
        assert!(record.contracts.is_empty());
        assert!(record.solidity_libs.is_empty());
    }
}

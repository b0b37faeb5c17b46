//! This library manages the lifecycle of upgradeable smart-contract
//! deployments: it tracks what is declared locally, what was last recorded as
//! deployed, and what is actually observed on chain, and it detects and acts
//! on drift between those three views.
//!
//! The surrounding CLI — command parsing, compiler invocation, dependency
//! installation, transaction signing — is an external collaborator. It
//! supplies already-compiled artifacts and a live [`chain::ProjectHandle`],
//! and invokes the two subsystems this library provides:
//!
//! 1. **Storage-layout drift detection.** [`layout::LayoutExtractor`] walks a
//!    contract's inheritance-linearized syntax tree (indexed by
//!    [`ast::AstIndex`]) into an ordered [`layout::StorageLayout`], and
//!    [`layout::diff`] computes the minimal edit sequence between two such
//!    layouts. Contract storage is append-only-safe; any structural edit in
//!    the middle of the sequence corrupts the data a proxy already holds, and
//!    the diff's action vocabulary makes exactly that distinction.
//! 2. **Deployment-state reconciliation.** [`reconcile::Reconciler`] replays
//!    the project's historical on-chain events — the only source of on-chain
//!    truth — and compares the result against the durable
//!    [`record::DeploymentRecord`], delivering every discrepancy to an
//!    outcome policy: [`reconcile::report::DriftReport`] accumulates them for
//!    display, [`reconcile::repair::DriftRepair`] mutates the record to match
//!    the chain.
//!
//! # Basic Usage
//!
//! Extracting and comparing storage layouts:
//!
//! ```no_run
//! use deployment_drift_analyzer::{
//!     artifact::ArtifactSet,
//!     ast::AstIndex,
//!     layout::{diff, LayoutExtractor},
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let artifacts = ArtifactSet::from_build_dir("build/contracts")?;
//! let index = AstIndex::new(&artifacts);
//! let extractor = LayoutExtractor::new(&index, ".");
//!
//! let baseline = extractor.extract("Token")?;
//! // ... the contract is edited and recompiled ...
//! let updated = extractor.extract("Token")?;
//!
//! for operation in diff(&baseline.storage, &updated.storage)? {
//!     println!("{}: {:?}", operation.action, operation.updated);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod artifact;
pub mod ast;
pub mod bytecode;
pub mod chain;
pub mod constant;
pub mod error;
pub mod layout;
pub mod reconcile;
pub mod record;
pub mod utility;

// Re-exports to provide the library interface.
pub use layout::StorageLayout;
pub use reconcile::Reconciler;
pub use record::DeploymentRecord;

// src/lib.rs

//! JHBuild meta-build orchestrator
//!
//! Builds a stack of interdependent source modules into a common prefix.
//! Modules come from XML modulesets; each one is checked out, configured,
//! built and installed by the tool its type names (autotools, meson,
//! cmake, distutils).
//!
//! # Architecture
//!
//! - [`moduleset`]: the catalog and the dependency resolver
//! - [`build`]: the per-module phase state machine and its frontends
//! - [`modtypes`]: phase tables and phase bodies per module type
//! - [`packagedb`]: installed module records and file manifests
//! - [`trigger`]: post-install hooks matched against manifests

pub mod branch;
pub mod build;
pub mod config;
pub mod environment;
mod error;
pub mod modtypes;
pub mod moduleset;
pub mod package;
pub mod packagedb;
pub mod phase;
pub mod sysdeps;
pub mod trigger;
pub mod version;

pub use build::{BuildContext, BuildOutcome, BuildScript};
pub use config::{BuildPolicy, Config, Overrides};
pub use error::{Error, Result};
pub use moduleset::{ModuleSet, ModuleState};
pub use package::Package;
pub use phase::Phase;

//! Resolve the requirements of a project to one version of each package for a target, and
//! record the result in a lock file that can be reused and extended.

pub use error::{DerivationChain, NoSolutionError, ResolveError};
pub use graph::Parent;
pub use lock::{
    FileLocation, Lock, LockError, LockErrorKind, LockedDependency, LockedFile, MergeMode,
    Package, Pin, Pins, StrategyFlags, content_hash, merge,
};
pub use lockstep_repository::PrereleaseMode;
pub use manifest::Manifest;
pub use options::{ResolutionMode, ResolverConfig, ResolverConfigBuilder, Upgrade, UpgradeMode};
pub use preferences::{Preference, Preferences};
pub use resolution::{ResolutionEdge, Resolution, ResolvedPackage};
pub use resolver::{Resolver, resolve};
pub use strategy::{ResolutionStrategy, Strategy};

mod error;
mod graph;
pub mod lock;
mod manifest;
mod options;
mod preferences;
mod resolution;
mod resolver;
mod strategy;

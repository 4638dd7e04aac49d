use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use lockstep_normalize::PackageName;
use lockstep_repository::PrereleaseMode;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ResolutionMode {
    /// Resolve the highest compatible version of each package.
    #[default]
    Highest,
    /// Resolve the lowest compatible version of each package.
    Lowest,
    /// Resolve the lowest compatible version of any direct dependencies, and the highest
    /// compatible version of any transitive dependencies.
    LowestDirect,
}

impl std::fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Highest => write!(f, "highest"),
            Self::Lowest => write!(f, "lowest"),
            Self::LowestDirect => write!(f, "lowest-direct"),
        }
    }
}

/// How the versions of a prior lock are reused.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum UpgradeMode {
    /// Prefer the locked version of every package that isn't named for upgrade.
    #[default]
    Reuse,
    /// Like `reuse`, but also upgrade the dependencies of the named packages.
    Eager,
    /// Ignore the prior lock.
    All,
}

impl std::fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reuse => write!(f, "reuse"),
            Self::Eager => write!(f, "eager"),
            Self::All => write!(f, "all"),
        }
    }
}

/// The packages to upgrade, and how.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Upgrade {
    pub mode: UpgradeMode,
    pub packages: BTreeSet<PackageName>,
}

impl Upgrade {
    /// Reuse every locked version.
    pub fn none() -> Self {
        Self::default()
    }

    /// Ignore the prior lock entirely.
    pub fn all() -> Self {
        Self {
            mode: UpgradeMode::All,
            packages: BTreeSet::new(),
        }
    }

    pub fn packages(mode: UpgradeMode, packages: impl IntoIterator<Item = PackageName>) -> Self {
        Self {
            mode,
            packages: packages.into_iter().collect(),
        }
    }

    /// Whether `name` was named for upgrade.
    pub fn contains(&self, name: &PackageName) -> bool {
        self.mode == UpgradeMode::All || self.packages.contains(name)
    }
}

/// The immutable configuration of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub resolution_mode: ResolutionMode,
    pub prerelease_mode: PrereleaseMode,
    pub upgrade: Upgrade,
    /// The maximum number of candidate selections before the resolution fails as too deep.
    pub max_rounds: usize,
    /// The maximum number of concurrent metadata requests.
    pub concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfigBuilder::new().build()
    }
}

impl ResolverConfig {
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::new()
    }
}

/// Builder for [`ResolverConfig`].
#[derive(Debug, Clone)]
pub struct ResolverConfigBuilder {
    resolution_mode: ResolutionMode,
    prerelease_mode: PrereleaseMode,
    upgrade: Upgrade,
    max_rounds: usize,
    concurrency: usize,
}

impl Default for ResolverConfigBuilder {
    fn default() -> Self {
        Self {
            resolution_mode: ResolutionMode::default(),
            prerelease_mode: PrereleaseMode::default(),
            upgrade: Upgrade::default(),
            max_rounds: 10_000,
            concurrency: 8,
        }
    }
}

impl ResolverConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the [`ResolutionMode`].
    #[must_use]
    pub fn resolution_mode(mut self, resolution_mode: ResolutionMode) -> Self {
        self.resolution_mode = resolution_mode;
        self
    }

    /// Sets the [`PrereleaseMode`].
    #[must_use]
    pub fn prerelease_mode(mut self, prerelease_mode: PrereleaseMode) -> Self {
        self.prerelease_mode = prerelease_mode;
        self
    }

    /// Sets the [`Upgrade`] policy.
    #[must_use]
    pub fn upgrade(mut self, upgrade: Upgrade) -> Self {
        self.upgrade = upgrade;
        self
    }

    /// Sets the round cap.
    #[must_use]
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Sets the number of concurrent metadata requests; at least one.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ResolverConfig {
        ResolverConfig {
            resolution_mode: self.resolution_mode,
            prerelease_mode: self.prerelease_mode,
            upgrade: self.upgrade,
            max_rounds: self.max_rounds,
            concurrency: self.concurrency,
        }
    }
}

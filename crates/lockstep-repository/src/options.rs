use std::fmt;
use std::time::Duration;

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};

use lockstep_distribution_types::IndexUrl;

/// Whether built distributions are preferred over source distributions at equal version.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum BinaryPolicy {
    /// Prefer wheels over source distributions.
    #[default]
    PreferBinary,
    /// Prefer source distributions over wheels.
    NoBinary,
    /// Order distributions of the same version by index and filename only.
    NoPreference,
}

impl fmt::Display for BinaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreferBinary => write!(f, "prefer-binary"),
            Self::NoBinary => write!(f, "no-binary"),
            Self::NoPreference => write!(f, "no-preference"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PrereleaseMode {
    /// Disallow all pre-release versions.
    Disallow,

    /// Allow all pre-release versions.
    Allow,

    /// Allow pre-release versions if no final release satisfies the requirement.
    IfNecessary,

    /// Allow pre-release versions for requirements that name a pre-release in their specifiers.
    Explicit,

    /// Allow pre-release versions if no final release satisfies the requirement, or if the
    /// requirement names a pre-release.
    #[default]
    IfNecessaryOrExplicit,
}

impl fmt::Display for PrereleaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disallow => write!(f, "disallow"),
            Self::Allow => write!(f, "allow"),
            Self::IfNecessary => write!(f, "if-necessary"),
            Self::Explicit => write!(f, "explicit"),
            Self::IfNecessaryOrExplicit => write!(f, "if-necessary-or-explicit"),
        }
    }
}

/// Bounded exponential backoff for transient index errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub(crate) fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
    }
}

/// Options for an [`IndexRepository`](crate::IndexRepository).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryOptions {
    pub binary: BinaryPolicy,
    pub prereleases: PrereleaseMode,
    pub retry: RetryPolicy,
}

impl RepositoryOptions {
    #[must_use]
    pub fn with_binary(mut self, binary: BinaryPolicy) -> Self {
        self.binary = binary;
        self
    }

    #[must_use]
    pub fn with_prereleases(mut self, prereleases: PrereleaseMode) -> Self {
        self.prereleases = prereleases;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A package index, optionally named.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: IndexUrl,
}

impl Index {
    pub fn new(url: IndexUrl) -> Self {
        Self { name: None, url }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether this index is declared as a replacement for the default index.
    fn replaces_default(&self) -> bool {
        self.name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case("pypi"))
    }
}

/// The indexes to search, in priority order.
///
/// The default index comes first, followed by the extra indexes in declaration order. An extra
/// index named `pypi` takes the place of the default index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLocations {
    default: IndexUrl,
    extra: Vec<Index>,
}

impl Default for IndexLocations {
    fn default() -> Self {
        Self::new(IndexUrl::pypi())
    }
}

impl IndexLocations {
    pub fn new(default: IndexUrl) -> Self {
        Self {
            default,
            extra: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, index: Index) -> Self {
        self.extra.push(index);
        self
    }

    /// The indexes in priority order.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexUrl> {
        let replacement = self.extra.iter().position(Index::replaces_default);
        let default = match replacement {
            Some(position) => &self.extra[position].url,
            None => &self.default,
        };
        std::iter::once(default).chain(
            self.extra
                .iter()
                .enumerate()
                .filter(move |(position, _)| Some(*position) != replacement)
                .map(|(_, index)| &index.url),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn extra_indexes_follow_the_default() {
        let locations = IndexLocations::default().with_extra(Index::new(
            IndexUrl::from_str("https://download.pytorch.org/whl").unwrap(),
        ));
        let indexes: Vec<_> = locations.indexes().map(ToString::to_string).collect();
        assert_eq!(
            indexes,
            ["https://pypi.org/simple", "https://download.pytorch.org/whl"]
        );
    }

    #[test]
    fn pypi_named_index_replaces_the_default() {
        let mirror = IndexUrl::from_str("https://mirror.example.com/simple").unwrap();
        let internal = IndexUrl::from_str("https://internal.example.com/simple").unwrap();
        let locations = IndexLocations::default()
            .with_extra(Index::new(internal.clone()).with_name("internal"))
            .with_extra(Index::new(mirror.clone()).with_name("PyPI"));
        let indexes: Vec<_> = locations.indexes().cloned().collect();
        assert_eq!(indexes, [mirror, internal]);
    }

    #[test]
    fn policies_are_kebab_case() {
        assert_eq!(PrereleaseMode::IfNecessaryOrExplicit.to_string(), "if-necessary-or-explicit");
        assert_eq!(BinaryPolicy::default(), BinaryPolicy::PreferBinary);
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Version, VersionParseError};

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`, plus the wildcard forms `==X.*` and `!=X.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `===` (arbitrary equality on the version text)
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~= 1.2`
    TildeEqual,
    /// `< 1.2.3`
    LessThan,
    /// `<= 1.2.3`
    LessThanEqual,
    /// `> 1.2.3`
    GreaterThan,
    /// `>= 1.2.3`
    GreaterThanEqual,
}

impl Operator {
    /// Split the leading operator off a specifier, returning the operator and the remainder.
    fn split(specifier: &str) -> Option<(Self, &str)> {
        const PREFIXES: [(&str, Operator); 8] = [
            ("===", Operator::ExactEqual),
            ("~=", Operator::TildeEqual),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("<=", Operator::LessThanEqual),
            (">=", Operator::GreaterThanEqual),
            ("<", Operator::LessThan),
            (">", Operator::GreaterThan),
        ];
        PREFIXES.iter().find_map(|(prefix, operator)| {
            specifier
                .strip_prefix(prefix)
                .map(|rest| (*operator, rest.trim()))
        })
    }

    /// The operator with `version` swapped to the left-hand side, e.g. `"3.8" < python_version`
    /// is `python_version > "3.8"`.
    #[must_use]
    pub fn reverse(self) -> Option<Self> {
        match self {
            Self::Equal | Self::ExactEqual | Self::NotEqual => Some(self),
            Self::LessThan => Some(Self::GreaterThan),
            Self::LessThanEqual => Some(Self::GreaterThanEqual),
            Self::GreaterThan => Some(Self::LessThan),
            Self::GreaterThanEqual => Some(Self::LessThanEqual),
            Self::EqualStar | Self::NotEqualStar | Self::TildeEqual => None,
        }
    }

    fn is_star(self) -> bool {
        matches!(self, Self::EqualStar | Self::NotEqualStar)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        })
    }
}

/// A single version constraint such as `>=1.0` or `==2.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Build a specifier, validating the combination of operator and version.
    pub fn new(operator: Operator, version: Version) -> Result<Self, VersionSpecifierParseError> {
        if operator == Operator::TildeEqual && version.release().len() < 2 {
            return Err(VersionSpecifierParseError::CompatibleReleaseTooShort(
                version.to_string(),
            ));
        }
        if version.is_local()
            && !matches!(
                operator,
                Operator::Equal | Operator::NotEqual | Operator::ExactEqual
            )
        {
            return Err(VersionSpecifierParseError::LocalNotAllowed {
                operator,
                version: version.to_string(),
            });
        }
        Ok(Self { operator, version })
    }

    /// `==version`
    pub fn equals(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            version,
        }
    }

    /// `>=version`
    pub fn greater_than_equal(version: Version) -> Self {
        Self {
            operator: Operator::GreaterThanEqual,
            version,
        }
    }

    /// `<version`
    pub fn less_than(version: Version) -> Self {
        Self {
            operator: Operator::LessThan,
            version,
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether the specifier names a pre-release, which opts the requirement into pre-releases.
    pub fn any_prerelease(&self) -> bool {
        self.version.any_prerelease()
    }

    /// Whether `candidate` satisfies this specifier under the PEP 440 comparison rules.
    ///
    /// Pre-release exclusion is not applied here; see [`VersionSpecifiers::matches`].
    pub fn contains(&self, candidate: &Version) -> bool {
        let spec = &self.version;
        match self.operator {
            Operator::Equal => {
                if spec.is_local() {
                    candidate == spec
                } else {
                    candidate.without_local() == *spec
                }
            }
            Operator::NotEqual => {
                if spec.is_local() {
                    candidate != spec
                } else {
                    candidate.without_local() != *spec
                }
            }
            Operator::EqualStar => release_prefix_matches(spec, candidate),
            Operator::NotEqualStar => !release_prefix_matches(spec, candidate),
            Operator::ExactEqual => candidate.to_string() == spec.to_string(),
            Operator::TildeEqual => {
                let prefix = Version::new(
                    spec.release()[..spec.release().len() - 1].iter().copied(),
                )
                .with_epoch(spec.epoch());
                candidate.without_local() >= *spec && release_prefix_matches(&prefix, candidate)
            }
            Operator::LessThan => {
                // `<1.0` excludes `1.0rc1` unless the bound itself is a pre-release.
                if !spec.any_prerelease()
                    && candidate.any_prerelease()
                    && candidate.cmp_release(spec) == Ordering::Equal
                {
                    return false;
                }
                candidate.without_local() < *spec
            }
            Operator::LessThanEqual => candidate.without_local() <= *spec,
            Operator::GreaterThan => {
                // `>1.0` excludes `1.0.post1` unless the bound itself is a post-release.
                if !spec.is_post()
                    && candidate.is_post()
                    && candidate.cmp_release(spec) == Ordering::Equal
                {
                    return false;
                }
                candidate.without_local() > *spec
            }
            Operator::GreaterThanEqual => candidate.without_local() >= *spec,
        }
    }
}

/// Whether the release of `candidate` starts with the release of `prefix`, e.g. `1.2.5`
/// matches `1.2`. Epochs must be equal. Pre-, post- and dev-release suffixes of the candidate
/// are ignored, so `1.2.0rc1` matches `==1.2.*`.
fn release_prefix_matches(prefix: &Version, candidate: &Version) -> bool {
    if prefix.epoch() != candidate.epoch() {
        return false;
    }
    prefix
        .release()
        .iter()
        .enumerate()
        .all(|(index, segment)| candidate.release().get(index).copied().unwrap_or(0) == *segment)
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    fn from_str(specifier: &str) -> Result<Self, Self::Err> {
        let specifier = specifier.trim();
        let Some((operator, rest)) = Operator::split(specifier) else {
            return Err(VersionSpecifierParseError::MissingOperator(
                specifier.to_string(),
            ));
        };
        if rest.is_empty() {
            return Err(VersionSpecifierParseError::MissingVersion(
                specifier.to_string(),
            ));
        }

        let (operator, text) = match rest.strip_suffix(".*") {
            Some(prefix) => {
                let operator = match operator {
                    Operator::Equal => Operator::EqualStar,
                    Operator::NotEqual => Operator::NotEqualStar,
                    operator => {
                        return Err(VersionSpecifierParseError::StarNotAllowed(operator));
                    }
                };
                (operator, prefix)
            }
            None => (operator, rest),
        };

        let version = Version::from_str(text)?;
        if operator.is_star() && version.is_local() {
            return Err(VersionSpecifierParseError::LocalNotAllowed {
                operator,
                version: version.to_string(),
            });
        }
        Self::new(operator, version)
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operator.is_star() {
            write!(f, "{}{}.*", self.operator, self.version)
        } else {
            write!(f, "{}{}", self.operator, self.version)
        }
    }
}

/// A conjunction of [`VersionSpecifier`]s, such as `>=1.0, <2.0`.
///
/// The empty set matches every version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifiers {
    /// The empty specifier set, which matches any version.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VersionSpecifier> {
        self.0.iter()
    }

    /// Add the specifiers of `other` to this conjunction.
    pub fn extend(&mut self, other: impl IntoIterator<Item = VersionSpecifier>) {
        for specifier in other {
            if !self.0.contains(&specifier) {
                self.0.push(specifier);
            }
        }
    }

    /// Whether any specifier names a pre-release.
    pub fn any_prerelease(&self) -> bool {
        self.0.iter().any(VersionSpecifier::any_prerelease)
    }

    /// Whether `version` satisfies every specifier, ignoring pre-release policy.
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|specifier| specifier.contains(version))
    }

    /// Whether `version` satisfies the set under the pre-release policy.
    ///
    /// The empty set matches everything, pre-releases included. Otherwise a pre-release only
    /// matches when `allow_prereleases` is set or one of the specifiers names a pre-release.
    pub fn matches(&self, version: &Version, allow_prereleases: bool) -> bool {
        if self.0.is_empty() {
            return true;
        }
        if version.any_prerelease() && !allow_prereleases && !self.any_prerelease() {
            return false;
        }
        self.contains(version)
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        let mut specifiers = Self::empty();
        specifiers.extend(iter);
        specifiers
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl<'a> IntoIterator for &'a VersionSpecifiers {
    type Item = &'a VersionSpecifier;
    type IntoIter = std::slice::Iter<'a, VersionSpecifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    fn from_str(specifiers: &str) -> Result<Self, Self::Err> {
        let mut parsed = Vec::new();
        for part in specifiers.split(',') {
            if part.trim().is_empty() {
                if specifiers.trim().is_empty() {
                    break;
                }
                return Err(VersionSpecifiersParseError {
                    specifiers: specifiers.to_string(),
                    inner: VersionSpecifierParseError::MissingOperator(String::new()),
                });
            }
            let specifier =
                VersionSpecifier::from_str(part).map_err(|inner| VersionSpecifiersParseError {
                    specifiers: specifiers.to_string(),
                    inner,
                })?;
            parsed.push(specifier);
        }
        Ok(parsed.into_iter().collect())
    }
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, specifier) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{specifier}")?;
        }
        Ok(())
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let specifiers = String::deserialize(deserializer)?;
        Self::from_str(&specifiers).map_err(serde::de::Error::custom)
    }
}

/// A single specifier that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionSpecifierParseError {
    #[error("Expected a comparison operator (`==`, `!=`, `<`, `<=`, `>`, `>=`, `~=`, `===`), found `{0}`")]
    MissingOperator(String),
    #[error("Expected a version after the operator in `{0}`")]
    MissingVersion(String),
    #[error("The `{0}` operator can't be used with a wildcard version (`.*`)")]
    StarNotAllowed(Operator),
    #[error("The `~=` operator requires at least two release segments, found `{0}`")]
    CompatibleReleaseTooShort(String),
    #[error("A local version (`{version}`) can't be used with the `{operator}` operator")]
    LocalNotAllowed { operator: Operator, version: String },
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
}

/// A specifier set that failed to parse, with the full input for context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse version specifiers `{specifiers}`: {inner}")]
pub struct VersionSpecifiersParseError {
    specifiers: String,
    #[source]
    inner: VersionSpecifierParseError,
}

impl VersionSpecifiersParseError {
    pub fn inner(&self) -> &VersionSpecifierParseError {
        &self.inner
    }
}

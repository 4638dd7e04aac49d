use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The PEP 440 grammar, in its permissive (non-normalized) form.
///
/// See: <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)
        ^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:
            [-_.]?
            (?P<pre_label>alpha|a|beta|b|preview|pre|rc|c)
            [-_.]?
            (?P<pre_number>[0-9]+)?
        )?
        (?:
            (?:-(?P<post_implicit>[0-9]+))
            |
            (?:[-_.]?(?P<post_label>post|rev|r)[-_.]?(?P<post_number>[0-9]+)?)
        )?
        (?:
            [-_.]?
            (?P<dev_label>dev)
            [-_.]?
            (?P<dev_number>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("the version grammar is a valid regular expression")
});

/// A version identifier, such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
///
/// Versions are immutable and cheap to clone. Equality and ordering follow PEP 440: trailing
/// zeros in the release are insignificant (`1.0 == 1.0.0`), dev releases sort before
/// pre-releases, pre-releases before the final release, and post-releases after it. A local
/// label only matters when the public versions are equal, and a version without a local label
/// sorts below one with a label.
#[derive(Clone)]
pub struct Version {
    inner: Arc<VersionInner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VersionInner {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<Prerelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

/// The kind of a pre-release: `a`, `b` or `rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrereleaseKind {
    Alpha,
    Beta,
    Rc,
}

impl PrereleaseKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

/// A pre-release marker such as `rc2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prerelease {
    pub kind: PrereleaseKind,
    pub number: u64,
}

/// One dot-separated component of a local version label.
///
/// Numeric segments sort above alphanumeric ones, alphanumeric segments compare
/// lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    String(String),
    Number(u64),
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(left), Self::Number(right)) => left.cmp(right),
            (Self::String(left), Self::String(right)) => left.cmp(right),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(segment) => f.write_str(segment),
            Self::Number(segment) => write!(f, "{segment}"),
        }
    }
}

impl Version {
    /// Create a final release from its release segments, e.g. `Version::new([3, 8])`.
    pub fn new<I>(release: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<u64>,
    {
        Self {
            inner: Arc::new(VersionInner {
                epoch: 0,
                release: release.into_iter().map(Into::into).collect(),
                pre: None,
                post: None,
                dev: None,
                local: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        Arc::make_mut(&mut self.inner).epoch = epoch;
        self
    }

    #[must_use]
    pub fn with_pre(mut self, pre: Option<Prerelease>) -> Self {
        Arc::make_mut(&mut self.inner).pre = pre;
        self
    }

    #[must_use]
    pub fn with_post(mut self, post: Option<u64>) -> Self {
        Arc::make_mut(&mut self.inner).post = post;
        self
    }

    #[must_use]
    pub fn with_dev(mut self, dev: Option<u64>) -> Self {
        Arc::make_mut(&mut self.inner).dev = dev;
        self
    }

    #[must_use]
    pub fn with_local(mut self, local: Vec<LocalSegment>) -> Self {
        Arc::make_mut(&mut self.inner).local = local;
        self
    }

    /// The public part of the version, i.e., the version without its local label.
    #[must_use]
    pub fn without_local(&self) -> Self {
        if self.inner.local.is_empty() {
            self.clone()
        } else {
            self.clone().with_local(Vec::new())
        }
    }

    /// The epoch and release segments only, e.g. `1!2.0` for `1!2.0rc1.post3+local`.
    #[must_use]
    pub fn only_release(&self) -> Self {
        Self::new(self.inner.release.iter().copied()).with_epoch(self.inner.epoch)
    }

    pub fn epoch(&self) -> u64 {
        self.inner.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.inner.release
    }

    pub fn pre(&self) -> Option<Prerelease> {
        self.inner.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.inner.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.inner.dev
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.inner.local
    }

    /// Whether this is a pre-release or a development release.
    pub fn any_prerelease(&self) -> bool {
        self.inner.pre.is_some() || self.inner.dev.is_some()
    }

    pub fn is_post(&self) -> bool {
        self.inner.post.is_some()
    }

    pub fn is_local(&self) -> bool {
        !self.inner.local.is_empty()
    }

    /// Compare the epoch and release segments only, padding the shorter release with zeros.
    pub(crate) fn cmp_release(&self, other: &Self) -> Ordering {
        self.inner
            .epoch
            .cmp(&other.inner.epoch)
            .then_with(|| compare_release(&self.inner.release, &other.inner.release))
    }

    /// The key that orders the suffixes of two versions with equal releases.
    ///
    /// `phase` is `0` for a bare dev release, `1..=3` for `a`, `b`, `rc`, `4` for a final
    /// release and `5` for a post-release. A missing dev number sorts last within its phase.
    fn suffix_key(&self) -> (u8, u64, Option<u64>, u64) {
        let inner = &self.inner;
        let dev = inner.dev.unwrap_or(u64::MAX);
        match (inner.pre, inner.post) {
            (Some(pre), post) => {
                let phase = match pre.kind {
                    PrereleaseKind::Alpha => 1,
                    PrereleaseKind::Beta => 2,
                    PrereleaseKind::Rc => 3,
                };
                (phase, pre.number, post, dev)
            }
            (None, None) if inner.dev.is_some() => (0, 0, None, dev),
            (None, None) => (4, 0, None, dev),
            (None, Some(post)) => (5, 0, Some(post), dev),
        }
    }

    fn parse_captures(text: &str, captures: &Captures) -> Result<Self, VersionParseError> {
        let number = |name: &str| -> Result<Option<u64>, VersionParseError> {
            captures
                .name(name)
                .map(|value| {
                    value
                        .as_str()
                        .parse::<u64>()
                        .map_err(|_| VersionParseError::new(text, ErrorKind::NumberTooLarge))
                })
                .transpose()
        };

        let epoch = number("epoch")?.unwrap_or(0);
        let release = captures
            .name("release")
            .map(|release| release.as_str())
            .unwrap_or_default()
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::new(text, ErrorKind::NumberTooLarge))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match captures.name("pre_label") {
            Some(label) => {
                let kind = match label.as_str().to_ascii_lowercase().as_str() {
                    "a" | "alpha" => PrereleaseKind::Alpha,
                    "b" | "beta" => PrereleaseKind::Beta,
                    _ => PrereleaseKind::Rc,
                };
                Some(Prerelease {
                    kind,
                    number: number("pre_number")?.unwrap_or(0),
                })
            }
            None => None,
        };

        let post = if captures.name("post_implicit").is_some() {
            number("post_implicit")?
        } else if captures.name("post_label").is_some() {
            Some(number("post_number")?.unwrap_or(0))
        } else {
            None
        };

        let dev = if captures.name("dev_label").is_some() {
            Some(number("dev_number")?.unwrap_or(0))
        } else {
            None
        };

        let local = captures
            .name("local")
            .map(|local| {
                local
                    .as_str()
                    .split(['-', '_', '.'])
                    .map(|segment| match segment.parse::<u64>() {
                        Ok(number) => LocalSegment::Number(number),
                        Err(_) => LocalSegment::String(segment.to_ascii_lowercase()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            inner: Arc::new(VersionInner {
                epoch,
                release,
                pre,
                post,
                dev,
                local,
            }),
        })
    }
}

/// Compare two release segments, padding the shorter one with zeros.
fn compare_release(left: &[u64], right: &[u64]) -> Ordering {
    let len = left.len().max(right.len());
    for index in 0..len {
        let ordering = left
            .get(index)
            .copied()
            .unwrap_or(0)
            .cmp(&right.get(index).copied().unwrap_or(0));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parse a version such as `1.19`, `1.0a1`, `1.0+abc.5` or `1!2012.2`.
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        if version.trim_end().ends_with(".*") {
            return Err(VersionParseError::new(version, ErrorKind::Wildcard));
        }
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::new(version, ErrorKind::Grammar))?;
        Self::parse_captures(version, &captures)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_release(other)
            .then_with(|| self.suffix_key().cmp(&other.suffix_key()))
            .then_with(|| self.inner.local.cmp(&other.inner.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Equality pads releases with zeros, so trailing zeros can't take part in the hash.
        let inner = &self.inner;
        inner.epoch.hash(state);
        let significant = inner
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |index| index + 1);
        inner.release[..significant].hash(state);
        inner.pre.hash(state);
        inner.post.hash(state);
        inner.dev.hash(state);
        inner.local.hash(state);
    }
}

impl fmt::Display for Version {
    /// Write the normalized form of the version.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &self.inner;
        if inner.epoch != 0 {
            write!(f, "{}!", inner.epoch)?;
        }
        let mut release = inner.release.iter();
        if let Some(first) = release.next() {
            write!(f, "{first}")?;
        }
        for segment in release {
            write!(f, ".{segment}")?;
        }
        if let Some(pre) = inner.pre {
            write!(f, "{}{}", pre.kind.as_str(), pre.number)?;
        }
        if let Some(post) = inner.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = inner.dev {
            write!(f, ".dev{dev}")?;
        }
        if let Some((first, rest)) = inner.local.split_first() {
            write!(f, "+{first}")?;
            for segment in rest {
                write!(f, ".{segment}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        Self::from_str(&version).map_err(serde::de::Error::custom)
    }
}

/// A version string that doesn't follow PEP 440.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .kind.message(&.version))]
pub struct VersionParseError {
    version: String,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    Grammar,
    Wildcard,
    NumberTooLarge,
}

impl ErrorKind {
    fn message(self, version: &str) -> String {
        match self {
            Self::Grammar => format!("Version `{version}` doesn't match PEP 440 rules"),
            Self::Wildcard => {
                format!("Version `{version}` contains a wildcard, which is only allowed in `==` and `!=` specifiers")
            }
            Self::NumberTooLarge => {
                format!("Version `{version}` contains a number that doesn't fit in 64 bits")
            }
        }
    }
}

impl VersionParseError {
    fn new(version: &str, kind: ErrorKind) -> Self {
        Self {
            version: version.to_string(),
            kind,
        }
    }

    /// The text that failed to parse.
    pub fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn version(text: &str) -> Version {
        Version::from_str(text).unwrap()
    }

    #[test]
    fn normalized_display() {
        let cases = [
            ("1.0", "1.0"),
            ("v1.0", "1.0"),
            ("1.0-ALPHA.1", "1.0a1"),
            ("1.0preview2", "1.0rc2"),
            ("1.0c3", "1.0rc3"),
            ("1.0-1", "1.0.post1"),
            ("1.0.rev", "1.0.post0"),
            ("1.0-dev", "1.0.dev0"),
            ("1!2.0b2.post3.dev4", "1!2.0b2.post3.dev4"),
            ("1.0+Ubuntu-1", "1.0+ubuntu.1"),
            (" 2.0.0 ", "2.0.0"),
        ];
        for (input, expected) in cases {
            assert_eq!(version(input).to_string(), expected, "{input}");
        }
    }

    #[test]
    fn total_order() {
        let ordered = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0rc1.dev456",
            "1.0rc1",
            "1.0",
            "1.0+abc.5",
            "1.0+abc.7",
            "1.0+5",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
            "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(
                version(pair[0]) < version(pair[1]),
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn trailing_zeros_are_insignificant() {
        use std::collections::hash_map::DefaultHasher;

        let left = version("1.2");
        let right = version("1.2.0.0");
        assert_eq!(left, right);

        let hash = |version: &Version| {
            let mut hasher = DefaultHasher::new();
            version.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&left), hash(&right));
        assert_ne!(version("1.2"), version("1.2.1"));
    }

    #[test]
    fn prerelease_predicates() {
        assert!(version("1.0rc1").any_prerelease());
        assert!(version("1.0.dev0").any_prerelease());
        assert!(!version("1.0.post1").any_prerelease());
        assert!(version("1.0.post1").is_post());
        assert!(version("1.0+local").is_local());
        assert_eq!(version("1.0+local").without_local(), version("1.0"));
        assert_eq!(version("1!2.0rc1.post3+x").only_release().to_string(), "1!2.0");
    }

    #[test]
    fn invalid_versions() {
        insta::assert_snapshot!(
            Version::from_str("1.0.0-foo").unwrap_err(),
            @"Version `1.0.0-foo` doesn't match PEP 440 rules"
        );
        insta::assert_snapshot!(
            Version::from_str("1.0.*").unwrap_err(),
            @"Version `1.0.*` contains a wildcard, which is only allowed in `==` and `!=` specifiers"
        );
        assert!(Version::from_str("").is_err());
        assert!(Version::from_str("99999999999999999999999").is_err());
    }
}

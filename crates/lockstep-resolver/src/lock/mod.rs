//! The lock file: a reproducible record of the resolutions of one project for one or more
//! targets.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use toml_edit::{Array, ArrayOfTables, DocumentMut, InlineTable, Item, Table, Value, value};
use tracing::{debug, warn};
use url::Url;

use lockstep_distribution_types::{
    CandidateSource, DistFile, HashDigest, Implementation, IndexUrl, Platform, Requirement, Target,
};
use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::{Version, VersionSpecifiers};
use lockstep_pep508::{MarkerEnvironment, MarkerTree};

use crate::options::{ResolutionMode, ResolverConfig};
use crate::preferences::{Preference, Preferences};
use crate::resolution::Resolution;

pub use merge::{MergeMode, merge};

mod merge;

/// The current version of the lock file format.
const VERSION: u32 = 1;

/// The settings a lock was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
#[allow(clippy::struct_excessive_bools)]
pub struct StrategyFlags {
    /// Whether the targets are ranges of environments rather than one interpreter.
    pub cross_platform: bool,
    /// Whether files are recorded by URL rather than by filename.
    pub static_urls: bool,
    /// Whether direct dependencies were resolved to their lowest compatible version.
    pub direct_minimal_versions: bool,
    /// Whether each package records its activation marker and its dependencies.
    pub inherit_metadata: bool,
}

impl Default for StrategyFlags {
    fn default() -> Self {
        Self {
            cross_platform: true,
            static_urls: false,
            direct_minimal_versions: false,
            inherit_metadata: true,
        }
    }
}

impl StrategyFlags {
    /// The flags for a resolution of `target` with `config`.
    pub fn new(config: &ResolverConfig, target: &Target) -> Self {
        Self {
            cross_platform: target.environment().is_none(),
            direct_minimal_versions: config.resolution_mode == ResolutionMode::LowestDirect,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_static_urls(mut self, static_urls: bool) -> Self {
        self.static_urls = static_urls;
        self
    }

    #[must_use]
    pub fn with_inherit_metadata(mut self, inherit_metadata: bool) -> Self {
        self.inherit_metadata = inherit_metadata;
        self
    }
}

/// Where a locked file can be found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileLocation {
    /// A file of the package's index, found by name.
    Filename(String),
    Url(Url),
}

/// A distribution file of a locked package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockedFile {
    pub location: FileLocation,
    pub hash: Option<HashDigest>,
}

impl LockedFile {
    pub fn from_dist(file: &DistFile, static_urls: bool) -> Self {
        Self {
            location: if static_urls {
                FileLocation::Url(file.url.clone())
            } else {
                FileLocation::Filename(file.filename.clone())
            },
            hash: file.hash.clone(),
        }
    }

    fn to_toml(&self) -> InlineTable {
        let mut table = InlineTable::new();
        match &self.location {
            FileLocation::Filename(filename) => {
                table.insert("file", Value::from(filename.as_str()))
            }
            FileLocation::Url(url) => table.insert("url", Value::from(url.as_str())),
        };
        if let Some(hash) = &self.hash {
            table.insert("hash", Value::from(hash.to_string()));
        }
        table
    }
}

/// A dependency of a locked package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedDependency {
    pub name: PackageName,
    pub specifier: Option<VersionSpecifiers>,
    /// The part of the requirement's marker the target leaves undecided.
    pub marker: MarkerTree,
    /// The extra of the package that introduced the dependency.
    pub extra: Option<ExtraName>,
}

impl LockedDependency {
    fn to_toml(&self) -> InlineTable {
        let mut table = InlineTable::new();
        table.insert("name", Value::from(self.name.to_string()));
        if let Some(specifier) = &self.specifier {
            table.insert("specifier", Value::from(specifier.to_string()));
        }
        if !self.marker.is_true() {
            table.insert("marker", Value::from(self.marker.to_string()));
        }
        if let Some(extra) = &self.extra {
            table.insert("extra", Value::from(extra.to_string()));
        }
        table
    }
}

/// One locked version of a package, for the targets listed in `targets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    name: PackageName,
    version: Version,
    source: CandidateSource,
    /// The condition under which the package is installed.
    marker: MarkerTree,
    targets: BTreeSet<usize>,
    files: Vec<LockedFile>,
    dependencies: Vec<LockedDependency>,
}

impl Package {
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn source(&self) -> &CandidateSource {
        &self.source
    }

    pub fn marker(&self) -> &MarkerTree {
        &self.marker
    }

    /// The indices of the targets the entry applies to.
    pub fn targets(&self) -> &BTreeSet<usize> {
        &self.targets
    }

    pub fn files(&self) -> &[LockedFile] {
        &self.files
    }

    pub fn dependencies(&self) -> &[LockedDependency] {
        &self.dependencies
    }

    /// Entries with the same key describe the same installation and are merged across targets.
    fn key(&self) -> PackageKey<'_> {
        PackageKey {
            name: &self.name,
            version: &self.version,
            source: &self.source,
            marker: self.marker.to_string(),
        }
    }

    fn to_toml(&self) -> Table {
        let mut table = Table::new();
        table.insert("name", value(self.name.to_string()));
        table.insert("version", value(self.version.to_string()));
        table.insert(
            "targets",
            value(
                self.targets
                    .iter()
                    .map(|index| i64::try_from(*index).unwrap_or(i64::MAX))
                    .collect::<Array>(),
            ),
        );
        table.insert("source", value(source_to_toml(&self.source)));
        if !self.marker.is_true() {
            table.insert("marker", value(self.marker.to_string()));
        }
        if !self.files.is_empty() {
            table.insert(
                "files",
                value(each_element_on_its_line_array(
                    self.files.iter().map(LockedFile::to_toml),
                )),
            );
        }
        if !self.dependencies.is_empty() {
            table.insert(
                "dependencies",
                value(each_element_on_its_line_array(
                    self.dependencies.iter().map(LockedDependency::to_toml),
                )),
            );
        }
        table
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PackageKey<'a> {
    name: &'a PackageName,
    version: &'a Version,
    source: &'a CandidateSource,
    marker: String,
}

fn source_to_toml(source: &CandidateSource) -> InlineTable {
    let mut table = InlineTable::new();
    match source {
        CandidateSource::Registry { index } => {
            table.insert("registry", Value::from(index.as_str()));
        }
        CandidateSource::Url { url } => {
            table.insert("url", Value::from(url.as_str()));
        }
        CandidateSource::Path { path } => {
            table.insert("path", Value::from(path.to_string_lossy().into_owned()));
        }
        CandidateSource::Git { url, rev } => {
            table.insert("git", Value::from(url.as_str()));
            if let Some(rev) = rev {
                table.insert("rev", Value::from(rev.as_str()));
            }
        }
        CandidateSource::Editable { path } => {
            table.insert("editable", Value::from(path.to_string_lossy().into_owned()));
        }
    }
    table
}

/// A locked package as a round trip through the lock file sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pub version: Version,
    pub source: CandidateSource,
    pub files: Vec<LockedFile>,
}

/// The locked packages of one target, by name.
pub type Pins = BTreeMap<PackageName, Pin>;

/// A lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    version: u32,
    content_hash: String,
    strategy: StrategyFlags,
    targets: Vec<Target>,
    packages: Vec<Package>,
}

impl Lock {
    /// Lock a resolution of requirements with the given content hash.
    pub fn from_resolution(
        resolution: &Resolution,
        strategy: StrategyFlags,
        content_hash: String,
    ) -> Self {
        let mut packages: Vec<Package> = resolution
            .packages()
            .map(|package| {
                let mut dependencies = Vec::new();
                if strategy.inherit_metadata {
                    for (dependency, edge) in resolution.dependencies(package.name()) {
                        let dependency = LockedDependency {
                            name: dependency.name().clone(),
                            specifier: edge
                                .requirement
                                .source
                                .specifier()
                                .filter(|specifier| !specifier.is_empty())
                                .cloned(),
                            marker: edge.marker.clone(),
                            extra: edge.extra.clone(),
                        };
                        if !dependencies.contains(&dependency) {
                            dependencies.push(dependency);
                        }
                    }
                    dependencies.sort_by(|left: &LockedDependency, right| {
                        (&left.name, &left.extra).cmp(&(&right.name, &right.extra))
                    });
                }
                Package {
                    name: package.name().clone(),
                    version: package.version().clone(),
                    source: package.candidate.source.clone(),
                    marker: if strategy.inherit_metadata {
                        package.marker.clone()
                    } else {
                        MarkerTree::TRUE
                    },
                    targets: BTreeSet::from([0]),
                    files: package
                        .candidate
                        .files
                        .iter()
                        .map(|file| LockedFile::from_dist(file, strategy.static_urls))
                        .collect(),
                    dependencies,
                }
            })
            .collect();
        packages.sort_by(|left, right| left.key().cmp(&right.key()));

        Self {
            version: VERSION,
            content_hash,
            strategy,
            targets: vec![resolution.target().clone()],
            packages,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn strategy(&self) -> &StrategyFlags {
        &self.strategy
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Whether the lock was produced for different requirements.
    pub fn is_stale(&self, requirements: &[Requirement]) -> bool {
        self.content_hash != content_hash(requirements)
    }

    pub fn target_index(&self, target: &Target) -> Option<usize> {
        self.targets.iter().position(|existing| existing == target)
    }

    /// The packages locked for `index`.
    fn packages_for_index(&self, index: usize) -> impl Iterator<Item = &Package> {
        self.packages
            .iter()
            .filter(move |package| package.targets.contains(&index))
    }

    /// The locked packages of `target`, or `None` if the lock doesn't cover it.
    pub fn pins(&self, target: &Target) -> Option<Pins> {
        let index = self.target_index(target)?;
        Some(
            self.packages_for_index(index)
                .map(|package| {
                    (
                        package.name.clone(),
                        Pin {
                            version: package.version.clone(),
                            source: package.source.clone(),
                            files: package.files.clone(),
                        },
                    )
                })
                .collect(),
        )
    }

    /// The locked versions to prefer when resolving `target` again. A lock that doesn't cover
    /// the target contributes the versions of all its targets, in order.
    pub fn preferences(&self, target: &Target) -> Preferences {
        let packages: Vec<&Package> = match self.target_index(target) {
            Some(index) => self.packages_for_index(index).collect(),
            None => {
                let mut packages: Vec<&Package> = self.packages.iter().collect();
                packages.sort_by_key(|package| package.targets.first().copied());
                packages
            }
        };
        packages
            .into_iter()
            .map(|package| {
                let dependencies = package
                    .dependencies
                    .iter()
                    .map(|dependency| dependency.name.clone())
                    .collect();
                (
                    package.name.clone(),
                    Preference::new(package.version.clone(), dependencies),
                )
            })
            .collect()
    }

    /// The packages to install into `environment`: those of the first target that covers it,
    /// whose markers hold.
    pub fn packages_for(&self, environment: &MarkerEnvironment) -> Vec<&Package> {
        let Some(index) = self
            .targets
            .iter()
            .position(|target| covers(target, environment))
        else {
            return Vec::new();
        };
        self.packages_for_index(index)
            .filter(|package| package.marker.evaluate(environment, &[]))
            .collect()
    }

    /// Returns the TOML representation of the lock.
    pub fn to_toml(&self) -> String {
        // We construct the document manually instead of going through Serde to enable the use
        // of inline tables.
        let mut doc = DocumentMut::new();
        doc.insert("version", value(i64::from(self.version)));
        doc.insert("content-hash", value(self.content_hash.as_str()));

        let mut strategy = Table::new();
        strategy.insert("cross-platform", value(self.strategy.cross_platform));
        strategy.insert("static-urls", value(self.strategy.static_urls));
        strategy.insert(
            "direct-minimal-versions",
            value(self.strategy.direct_minimal_versions),
        );
        strategy.insert("inherit-metadata", value(self.strategy.inherit_metadata));
        doc.insert("strategy", Item::Table(strategy));

        let mut targets = ArrayOfTables::new();
        for target in &self.targets {
            let mut table = Table::new();
            table.insert(
                "requires-python",
                value(target.requires_python().to_string()),
            );
            if let Some(platform) = target.platform() {
                table.insert("platform", value(platform.as_str()));
            }
            if let Some(implementation) = target.implementation() {
                table.insert("implementation", value(implementation.as_str()));
            }
            targets.push(table);
        }
        doc.insert("target", Item::ArrayOfTables(targets));

        let mut packages = ArrayOfTables::new();
        for package in &self.packages {
            packages.push(package.to_toml());
        }
        doc.insert("package", Item::ArrayOfTables(packages));

        doc.to_string()
    }

    /// Parse a lock file.
    pub fn from_toml(contents: &str) -> Result<Self, LockError> {
        // Check the version first, so an unsupported format is reported as such rather than as
        // whatever field it happens to lack.
        let probe: VersionProbe = toml::from_str(contents)?;
        match probe.version {
            Some(VERSION) => {}
            Some(found) => {
                return Err(LockErrorKind::UnsupportedVersion {
                    found,
                    expected: VERSION,
                }
                .into());
            }
            None => return Err(LockErrorKind::Invalid("missing `version`".to_string()).into()),
        }
        let wire: LockWire = toml::from_str(contents)?;
        Self::try_from(wire)
    }

    pub fn read(path: &Path) -> Result<Self, LockError> {
        let contents = fs_err::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn write(&self, path: &Path) -> Result<(), LockError> {
        fs_err::write(path, self.to_toml())?;
        debug!("Wrote {} packages to `{}`", self.packages.len(), path.display());
        Ok(())
    }

    /// Read the lock at `path` to reuse its versions. A missing or unreadable lock is treated as
    /// no lock at all.
    pub fn read_prior(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::read(path) {
            Ok(lock) => Some(lock),
            Err(err) => {
                warn!(
                    "Ignoring the existing lock file at `{}`: {err}",
                    path.display()
                );
                None
            }
        }
    }
}

/// Whether `environment` is one of the environments `target` covers.
fn covers(target: &Target, environment: &MarkerEnvironment) -> bool {
    let concrete = Target::from_environment(environment.clone());
    target
        .requires_python()
        .contains(&environment.python_full_version.only_release())
        && target
            .platform()
            .is_none_or(|platform| concrete.platform() == Some(platform))
        && target
            .implementation()
            .is_none_or(|implementation| concrete.implementation() == Some(implementation))
}

/// The content hash of a set of requirements: the SHA-256 of their sorted, normalized forms.
pub fn content_hash(requirements: &[Requirement]) -> String {
    let lines: BTreeSet<String> = requirements.iter().map(ToString::to_string).collect();
    let mut hasher = Sha256::new();
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            hasher.update(b"\n");
        }
        hasher.update(line.as_bytes());
    }
    format!("sha256:{:x}", hasher.finalize())
}

/// Format an array so that each element is on its own line and has a trailing comma.
///
/// ```toml
/// files = [
///     { file = "idna-3.7-py3-none-any.whl", hash = "sha256:..." },
///     { file = "idna-3.7.tar.gz", hash = "sha256:..." },
/// ]
/// ```
fn each_element_on_its_line_array(elements: impl Iterator<Item = impl Into<Value>>) -> Array {
    let mut array = elements
        .map(|item| {
            let mut value = item.into();
            value.decor_mut().set_prefix("\n    ");
            value
        })
        .collect::<Array>();
    array.set_trailing_comma(true);
    array.set_trailing("\n");
    array
}

#[derive(Deserialize)]
struct VersionProbe {
    version: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct LockWire {
    version: u32,
    content_hash: String,
    #[serde(default)]
    strategy: StrategyFlags,
    #[serde(rename = "target", default)]
    targets: Vec<TargetWire>,
    #[serde(rename = "package", default)]
    packages: Vec<PackageWire>,
}

impl TryFrom<LockWire> for Lock {
    type Error = LockError;

    fn try_from(wire: LockWire) -> Result<Self, LockError> {
        let targets: Vec<Target> = wire
            .targets
            .into_iter()
            .map(|target| {
                Target::new(target.requires_python)
                    .with_platform(target.platform)
                    .with_implementation(target.implementation)
            })
            .collect();
        let packages = wire
            .packages
            .into_iter()
            .map(|package| package.unwire(targets.len()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version: wire.version,
            content_hash: wire.content_hash,
            strategy: wire.strategy,
            targets,
            packages,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct TargetWire {
    requires_python: VersionSpecifiers,
    #[serde(default)]
    platform: Option<Platform>,
    #[serde(default)]
    implementation: Option<Implementation>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PackageWire {
    name: PackageName,
    version: Version,
    targets: BTreeSet<usize>,
    source: SourceWire,
    #[serde(default)]
    marker: Option<MarkerTree>,
    #[serde(default)]
    files: Vec<FileWire>,
    #[serde(default)]
    dependencies: Vec<DependencyWire>,
}

impl PackageWire {
    fn unwire(self, targets: usize) -> Result<Package, LockError> {
        if self.targets.is_empty() {
            return Err(LockErrorKind::Invalid(format!(
                "package `{}` applies to no target",
                self.name
            ))
            .into());
        }
        if let Some(index) = self.targets.iter().find(|index| **index >= targets) {
            return Err(LockErrorKind::Invalid(format!(
                "package `{}` refers to target {index}, but the lock has {targets} targets",
                self.name
            ))
            .into());
        }
        let source = self.source.unwire(&self.name)?;
        let files = self
            .files
            .into_iter()
            .map(|file| file.unwire(&self.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Package {
            name: self.name,
            version: self.version,
            source,
            marker: self.marker.unwrap_or(MarkerTree::TRUE),
            targets: self.targets,
            files,
            dependencies: self
                .dependencies
                .into_iter()
                .map(|dependency| LockedDependency {
                    name: dependency.name,
                    specifier: dependency.specifier,
                    marker: dependency.marker.unwrap_or(MarkerTree::TRUE),
                    extra: dependency.extra,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct SourceWire {
    registry: Option<IndexUrl>,
    url: Option<Url>,
    path: Option<PathBuf>,
    git: Option<Url>,
    rev: Option<String>,
    editable: Option<PathBuf>,
}

impl SourceWire {
    fn unwire(self, name: &PackageName) -> Result<CandidateSource, LockError> {
        let source = match self {
            Self {
                registry: Some(index),
                url: None,
                path: None,
                git: None,
                rev: None,
                editable: None,
            } => CandidateSource::Registry { index },
            Self {
                registry: None,
                url: Some(url),
                path: None,
                git: None,
                rev: None,
                editable: None,
            } => CandidateSource::Url { url },
            Self {
                registry: None,
                url: None,
                path: Some(path),
                git: None,
                rev: None,
                editable: None,
            } => CandidateSource::Path { path },
            Self {
                registry: None,
                url: None,
                path: None,
                git: Some(url),
                rev,
                editable: None,
            } => CandidateSource::Git { url, rev },
            Self {
                registry: None,
                url: None,
                path: None,
                git: None,
                rev: None,
                editable: Some(path),
            } => CandidateSource::Editable { path },
            _ => {
                return Err(LockErrorKind::Invalid(format!(
                    "package `{name}` must have exactly one of `registry`, `url`, `path`, `git` or `editable` as its source"
                ))
                .into());
            }
        };
        Ok(source)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileWire {
    file: Option<String>,
    url: Option<Url>,
    hash: Option<HashDigest>,
}

impl FileWire {
    fn unwire(self, name: &PackageName) -> Result<LockedFile, LockError> {
        let location = match (self.file, self.url) {
            (Some(filename), None) => FileLocation::Filename(filename),
            (None, Some(url)) => FileLocation::Url(url),
            _ => {
                return Err(LockErrorKind::Invalid(format!(
                    "a file of package `{name}` must have exactly one of `file` or `url`"
                ))
                .into());
            }
        };
        Ok(LockedFile {
            location,
            hash: self.hash,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct DependencyWire {
    name: PackageName,
    specifier: Option<VersionSpecifiers>,
    marker: Option<MarkerTree>,
    extra: Option<ExtraName>,
}

/// An error that occurs when reading, writing or merging a lock file.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct LockError(Box<LockErrorKind>);

impl LockError {
    pub fn kind(&self) -> &LockErrorKind {
        &self.0
    }

    /// Whether the lock file could be read but not understood.
    pub fn is_format(&self) -> bool {
        matches!(
            *self.0,
            LockErrorKind::Format(_)
                | LockErrorKind::UnsupportedVersion { .. }
                | LockErrorKind::Invalid(_)
        )
    }
}

impl<E> From<E> for LockError
where
    LockErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        LockError(Box::new(LockErrorKind::from(err)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockErrorKind {
    #[error("Unsupported lock file version {found} (expected version {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Failed to parse the lock file")]
    Format(#[from] toml::de::Error),

    #[error("Invalid lock file: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(
        "Cannot append to a lock file for different requirements (content hash `{existing}`, expected `{new}`)"
    )]
    StaleAppend { existing: String, new: String },

    #[error("Cannot append a resolution made with {new} to a lock file made with {existing}")]
    StrategyMismatch {
        existing: StrategyFlags,
        new: StrategyFlags,
    },
}

impl Display for StrategyFlags {
    /// `cross-platform, inherit-metadata`
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let flags = [
            ("cross-platform", self.cross_platform),
            ("static-urls", self.static_urls),
            ("direct-minimal-versions", self.direct_minimal_versions),
            ("inherit-metadata", self.inherit_metadata),
        ];
        let mut enabled = flags.iter().filter(|(_, enabled)| *enabled).peekable();
        if enabled.peek().is_none() {
            return f.write_str("no strategy flags");
        }
        for (index, (flag, _)) in enabled.enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(flag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;

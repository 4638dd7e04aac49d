use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHasher};
use serde::Deserialize;
use tracing::trace;
use url::Url;

use lockstep_distribution_types::{
    DistFile, HashDigest, IndexUrl, Metadata, RequirementSource,
};
use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::{Version, VersionSpecifiers};

use crate::{
    BuildBackend, BuildError, ClientError, ClientErrorKind, FetchSource, FetchedSource,
    IndexClient, VersionFiles,
};

/// A fixed snapshot of one or more package indexes, read from JSON.
///
/// ```json
/// {
///   "indexes": {
///     "https://pypi.org/simple": {
///       "flask": [{ "version": "2.0.0", "requires-dist": ["werkzeug>=2.0"] }]
///     }
///   },
///   "artifacts": {
///     "https://github.com/pallets/flask": { "name": "flask", "version": "3.1.0.dev0", "commit": "6d1b0d9" }
///   }
/// }
/// ```
///
/// Releases without `files` get a single pure-Python wheel. Releases marked `dynamic` serve no
/// metadata from the index and have to go through [`BuildBackend::build_metadata`]; releases
/// marked `broken` serve malformed metadata.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticIndex {
    #[serde(default)]
    indexes: BTreeMap<IndexUrl, BTreeMap<PackageName, Vec<StaticRelease>>>,
    /// Direct sources, keyed by URL or path.
    #[serde(default)]
    artifacts: BTreeMap<String, StaticArtifact>,
    #[serde(skip)]
    transient_failures: Mutex<FxHashMap<PackageName, u32>>,
    #[serde(skip)]
    latency: Option<Duration>,
    #[serde(skip)]
    list_requests: AtomicUsize,
    #[serde(skip)]
    metadata_requests: AtomicUsize,
}

/// One version of a package in a [`StaticIndex`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticRelease {
    pub version: Version,
    #[serde(default)]
    pub files: Vec<StaticFile>,
    #[serde(default)]
    pub requires_dist: Vec<lockstep_pep508::Requirement>,
    #[serde(default)]
    pub provides_extras: Vec<ExtraName>,
    #[serde(default)]
    pub requires_python: Option<VersionSpecifiers>,
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub broken: bool,
}

impl StaticRelease {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            files: Vec::new(),
            requires_dist: Vec::new(),
            provides_extras: Vec::new(),
            requires_python: None,
            dynamic: false,
            broken: false,
        }
    }

    #[must_use]
    pub fn with_requires_dist(
        mut self,
        requires_dist: impl IntoIterator<Item = lockstep_pep508::Requirement>,
    ) -> Self {
        self.requires_dist.extend(requires_dist);
        self
    }

    fn metadata(&self, name: &PackageName) -> Metadata {
        Metadata {
            name: name.clone(),
            version: self.version.clone(),
            requires_dist: self.requires_dist.clone(),
            provides_extras: self.provides_extras.clone(),
            requires_python: self.requires_python.clone(),
        }
    }

    /// The files of the release, with URLs and hashes filled in.
    fn files(&self, index: &IndexUrl, name: &PackageName) -> Result<Vec<DistFile>, ClientError> {
        let default = [StaticFile {
            filename: format!("{}-{}-py3-none-any.whl", name.as_dist_info_name(), self.version),
            url: None,
            hash: None,
            requires_python: None,
        }];
        let files = if self.files.is_empty() {
            &default[..]
        } else {
            &self.files[..]
        };
        files
            .iter()
            .map(|file| {
                let url = match &file.url {
                    Some(url) => url.clone(),
                    None => {
                        let url = format!("{index}/{name}/{}", file.filename);
                        Url::parse(&url).map_err(|err| ClientErrorKind::MalformedMetadata {
                            url,
                            message: err.to_string(),
                        })?
                    }
                };
                Ok(DistFile {
                    filename: file.filename.clone(),
                    url,
                    hash: Some(
                        file.hash
                            .clone()
                            .unwrap_or_else(|| fake_digest(&file.filename)),
                    ),
                    requires_python: file
                        .requires_python
                        .clone()
                        .or_else(|| self.requires_python.clone()),
                })
            })
            .collect()
    }
}

/// A file of a [`StaticRelease`]; the URL defaults to `{index}/{name}/{filename}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticFile {
    pub filename: String,
    #[serde(default)]
    pub url: Option<Url>,
    #[serde(default)]
    pub hash: Option<HashDigest>,
    #[serde(default)]
    pub requires_python: Option<VersionSpecifiers>,
}

/// The built metadata of a direct source in a [`StaticIndex`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StaticArtifact {
    #[serde(flatten)]
    pub metadata: Metadata,
    #[serde(default)]
    pub hash: Option<HashDigest>,
    #[serde(default)]
    pub commit: Option<String>,
}

/// A stable stand-in for the SHA-256 of a file the snapshot doesn't hash.
fn fake_digest(filename: &str) -> HashDigest {
    let mut hasher = FxHasher::default();
    filename.hash(&mut hasher);
    let digest = hasher.finish();
    HashDigest::sha256(format!("{digest:016x}").repeat(4))
}

/// The key a direct source is stored under in `artifacts`.
fn artifact_key(source: &RequirementSource) -> String {
    match source {
        RequirementSource::Registry { .. } => String::new(),
        RequirementSource::Url { url } | RequirementSource::Git { url, .. } => url.to_string(),
        RequirementSource::Path { path } | RequirementSource::Editable { path } => {
            path.display().to_string()
        }
    }
}

impl StaticIndex {
    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json).map_err(|err| ClientErrorKind::Snapshot(err).into())
    }

    /// Read a snapshot from a JSON file.
    pub fn read(path: &Path) -> Result<Self, ClientError> {
        let json = fs_err::read_to_string(path).map_err(|err| ClientErrorKind::Io {
            path: path.to_path_buf(),
            err,
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn with_release(
        mut self,
        index: IndexUrl,
        name: PackageName,
        release: StaticRelease,
    ) -> Self {
        self.indexes
            .entry(index)
            .or_default()
            .entry(name)
            .or_default()
            .push(release);
        self
    }

    /// Fail the next `count` listings of `name` with a transient error.
    #[must_use]
    pub fn with_transient_failures(self, name: PackageName, count: u32) -> Self {
        if let Ok(mut failures) = self.transient_failures.lock() {
            failures.insert(name, count);
        }
        self
    }

    /// Delay every response.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The number of listing requests served so far, including failed ones.
    pub fn list_requests(&self) -> usize {
        self.list_requests.load(Ordering::Relaxed)
    }

    /// The number of metadata requests served so far.
    pub fn metadata_requests(&self) -> usize {
        self.metadata_requests.load(Ordering::Relaxed)
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_transient_failure(&self, name: &PackageName) -> bool {
        let Ok(mut failures) = self.transient_failures.lock() else {
            return false;
        };
        match failures.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn release(&self, name: &PackageName, version: &Version) -> Option<&StaticRelease> {
        self.indexes
            .values()
            .filter_map(|packages| packages.get(name))
            .flatten()
            .find(|release| release.version == *version)
    }

    /// Find the release a fetched file belongs to.
    fn release_for_path(&self, path: &Path) -> Option<(PackageName, &StaticRelease)> {
        for (index, packages) in &self.indexes {
            for (name, releases) in packages {
                for release in releases {
                    let Ok(files) = release.files(index, name) else {
                        continue;
                    };
                    if files.iter().any(|file| Path::new(file.url.path()) == path) {
                        return Some((name.clone(), release));
                    }
                }
            }
        }
        None
    }
}

impl IndexClient for StaticIndex {
    async fn list_versions<'io>(
        &'io self,
        index: &'io IndexUrl,
        name: &'io PackageName,
    ) -> Result<Vec<VersionFiles>, ClientError> {
        self.list_requests.fetch_add(1, Ordering::Relaxed);
        self.wait().await;
        if self.take_transient_failure(name) {
            return Err(ClientErrorKind::Transport {
                url: format!("{index}/{name}"),
                message: "connection reset by peer".to_string(),
            }
            .into());
        }
        let releases = self
            .indexes
            .get(index)
            .and_then(|packages| packages.get(name))
            .ok_or_else(|| ClientErrorKind::PackageNotFound {
                package: name.clone(),
                index: index.clone(),
            })?;
        trace!("Listing {} releases of {name} from {index}", releases.len());
        releases
            .iter()
            .map(|release| {
                Ok(VersionFiles {
                    version: release.version.clone(),
                    files: release.files(index, name)?,
                })
            })
            .collect()
    }

    async fn metadata<'io>(
        &'io self,
        name: &'io PackageName,
        version: &'io Version,
        file: &'io DistFile,
    ) -> Result<Option<Metadata>, ClientError> {
        self.metadata_requests.fetch_add(1, Ordering::Relaxed);
        self.wait().await;
        let release = self
            .release(name, version)
            .ok_or_else(|| ClientErrorKind::FileNotFound(file.filename.clone()))?;
        if release.broken {
            return Err(ClientErrorKind::MalformedMetadata {
                url: file.url.to_string(),
                message: "missing `Name` field".to_string(),
            }
            .into());
        }
        if release.dynamic {
            return Ok(None);
        }
        Ok(Some(release.metadata(name)))
    }

    async fn fetch<'io>(&'io self, source: FetchSource<'io>) -> Result<FetchedSource, ClientError> {
        self.wait().await;
        match source {
            FetchSource::File(file) => Ok(FetchedSource {
                path: PathBuf::from(file.url.path()),
                hash: file.hash.clone(),
                commit: None,
            }),
            FetchSource::Direct(source) => {
                let key = artifact_key(source);
                let artifact = self
                    .artifacts
                    .get(&key)
                    .ok_or(ClientErrorKind::FileNotFound(key.clone()))?;
                Ok(FetchedSource {
                    path: PathBuf::from(&key),
                    hash: artifact.hash.clone(),
                    commit: artifact.commit.clone(),
                })
            }
        }
    }
}

impl BuildBackend for StaticIndex {
    async fn build_metadata<'io>(&'io self, source: &'io Path) -> Result<Metadata, BuildError> {
        self.wait().await;
        if let Some(artifact) = self.artifacts.get(&source.display().to_string()) {
            return Ok(artifact.metadata.clone());
        }
        match self.release_for_path(source) {
            Some((_, release)) if release.broken => Err(BuildError::Failed {
                path: source.to_path_buf(),
                message: "`setup.py egg_info` exited with status 1".to_string(),
            }),
            Some((name, release)) => Ok(release.metadata(&name)),
            None => Err(BuildError::Unavailable {
                path: source.to_path_buf(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use indoc::indoc;

    use super::*;

    const SNAPSHOT: &str = indoc! {r#"
        {
          "indexes": {
            "https://pypi.org/simple": {
              "flask": [
                { "version": "2.0.0", "requires-dist": ["werkzeug>=2.0"] },
                { "version": "3.0.0", "requires-dist": ["werkzeug>=3.0"], "requires-python": ">=3.8" }
              ],
              "legacy": [
                {
                  "version": "1.0",
                  "dynamic": true,
                  "files": [{ "filename": "legacy-1.0.tar.gz" }]
                }
              ]
            }
          },
          "artifacts": {
            "https://github.com/example/tool": {
              "name": "tool",
              "version": "0.3.0",
              "commit": "4f2a1c9"
            }
          }
        }
    "#};

    #[tokio::test]
    async fn list_and_metadata() -> Result<()> {
        let index = StaticIndex::from_json(SNAPSHOT)?;
        let pypi = IndexUrl::pypi();
        let flask = PackageName::from_str("flask")?;

        let versions = index.list_versions(&pypi, &flask).await?;
        assert_eq!(versions.len(), 2);
        let file = &versions[1].files[0];
        assert_eq!(file.filename, "flask-3.0.0-py3-none-any.whl");
        assert_eq!(
            file.url.as_str(),
            "https://pypi.org/simple/flask/flask-3.0.0-py3-none-any.whl"
        );
        assert_eq!(file.requires_python, Some(VersionSpecifiers::from_str(">=3.8")?));

        let metadata = index
            .metadata(&flask, &versions[1].version, file)
            .await?
            .expect("static metadata");
        assert_eq!(metadata.requires_dist[0].to_string(), "werkzeug>=3.0");
        assert_eq!(index.metadata_requests(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn dynamic_metadata_is_built() -> Result<()> {
        let index = StaticIndex::from_json(SNAPSHOT)?;
        let legacy = PackageName::from_str("legacy")?;
        let versions = index.list_versions(&IndexUrl::pypi(), &legacy).await?;
        let file = &versions[0].files[0];

        assert!(index.metadata(&legacy, &versions[0].version, file).await?.is_none());
        let fetched = index.fetch(FetchSource::File(file)).await?;
        let metadata = index.build_metadata(&fetched.path).await?;
        assert_eq!(metadata.name, legacy);
        Ok(())
    }

    #[tokio::test]
    async fn direct_artifacts() -> Result<()> {
        let index = StaticIndex::from_json(SNAPSHOT)?;
        let source = RequirementSource::Git {
            url: Url::parse("https://github.com/example/tool")?,
            reference: None,
        };
        let fetched = index.fetch(FetchSource::Direct(&source)).await?;
        assert_eq!(fetched.commit.as_deref(), Some("4f2a1c9"));
        let metadata = index.build_metadata(&fetched.path).await?;
        assert_eq!(metadata.version, Version::from_str("0.3.0")?);
        Ok(())
    }

    #[tokio::test]
    async fn transient_failures() -> Result<()> {
        let flask = PackageName::from_str("flask")?;
        let index = StaticIndex::from_json(SNAPSHOT)?.with_transient_failures(flask.clone(), 1);

        let err = index
            .list_versions(&IndexUrl::pypi(), &flask)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(index.list_versions(&IndexUrl::pypi(), &flask).await.is_ok());
        assert_eq!(index.list_requests(), 2);

        let missing = PackageName::from_str("missing")?;
        let err = index
            .list_versions(&IndexUrl::pypi(), &missing)
            .await
            .unwrap_err();
        insta::assert_snapshot!(err, @"Package `missing` was not found in the index at https://pypi.org/simple");
        Ok(())
    }
}

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use lockstep_normalize::PackageName;
use lockstep_pep440::Version;

use crate::{DistFile, DistKind, HashDigest, IndexUrl};

/// Where a candidate comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateSource {
    /// A file listed by a package index.
    Registry { index: IndexUrl },
    /// A direct URL to an archive.
    Url { url: Url },
    /// A local archive or source tree.
    Path { path: PathBuf },
    /// A Git repository, at the commit `rev` was resolved to.
    Git { url: Url, rev: Option<String> },
    /// A local source tree installed in editable mode.
    Editable { path: PathBuf },
}

impl CandidateSource {
    /// Whether the source was named by the requirement rather than found on an index.
    pub fn is_direct(&self) -> bool {
        !matches!(self, Self::Registry { .. })
    }
}

impl Display for CandidateSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry { index } => write!(f, "{index}"),
            Self::Url { url } => write!(f, "{url}"),
            Self::Path { path } => write!(f, "{}", path.display()),
            Self::Git { url, rev: Some(rev) } => write!(f, "git+{url}@{rev}"),
            Self::Git { url, rev: None } => write!(f, "git+{url}"),
            Self::Editable { path } => write!(f, "-e {}", path.display()),
        }
    }
}

/// One concrete, installable distribution of a package.
///
/// Registry candidates carry every file of their version that is compatible with the target,
/// best first; `dist` is the file the metadata is read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub name: PackageName,
    pub version: Version,
    pub source: CandidateSource,
    pub dist: Option<DistFile>,
    pub files: Arc<[DistFile]>,
    /// The declaration order of the index the candidate was found on.
    pub index_priority: usize,
}

impl Candidate {
    /// A candidate found on an index, with its compatible files in preference order.
    pub fn registry(
        name: PackageName,
        version: Version,
        index: IndexUrl,
        files: Vec<DistFile>,
        index_priority: usize,
    ) -> Self {
        Self {
            name,
            version,
            source: CandidateSource::Registry { index },
            dist: files.first().cloned(),
            files: Arc::from(files),
            index_priority,
        }
    }

    /// A candidate for a direct source, whose version was read from the fetched artifact.
    pub fn direct(
        name: PackageName,
        version: Version,
        source: CandidateSource,
        dist: Option<DistFile>,
    ) -> Self {
        let files = dist.iter().cloned().collect::<Vec<_>>();
        Self {
            name,
            version,
            source,
            dist,
            files: Arc::from(files),
            index_priority: 0,
        }
    }

    /// The kind of the file the metadata is read from, if any.
    pub fn kind(&self) -> Option<DistKind> {
        self.dist.as_ref().map(DistFile::kind)
    }

    /// The key metadata is cached under.
    pub fn id(&self) -> CandidateId {
        CandidateId {
            name: self.name.clone(),
            version: self.version.clone(),
            source: self.source.clone(),
            hash: self.dist.as_ref().and_then(|dist| dist.hash.clone()),
        }
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.source.is_direct() {
            write!(f, "{}=={} ({})", self.name, self.version, self.source)
        } else {
            write!(f, "{}=={}", self.name, self.version)
        }
    }
}

/// The identity of a candidate: name, version, source, and the file hash when known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateId {
    pub name: PackageName,
    pub version: Version,
    pub source: CandidateSource,
    pub hash: Option<HashDigest>,
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={} from {}", self.name, self.version, self.source)
    }
}

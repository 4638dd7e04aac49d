//! The collaborators the resolver depends on: a package index client and a build backend.
//!
//! Network transport and PEP 517 builds live outside this workspace; [`StaticIndex`] serves a
//! fixed snapshot of an index for tests and offline resolutions.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lockstep_distribution_types::{DistFile, HashDigest, IndexUrl, Metadata, RequirementSource};
use lockstep_normalize::PackageName;
use lockstep_pep440::Version;

pub use crate::error::{BuildError, ClientError, ClientErrorKind};
pub use crate::static_index::{StaticArtifact, StaticFile, StaticIndex, StaticRelease};

mod error;
mod static_index;

/// The files an index lists for one version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFiles {
    pub version: Version,
    pub files: Vec<DistFile>,
}

/// What to download or check out.
#[derive(Debug, Clone, Copy)]
pub enum FetchSource<'a> {
    /// A file listed by an index.
    File(&'a DistFile),
    /// The source named by a direct requirement.
    Direct(&'a RequirementSource),
}

/// A downloaded archive or checked out source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub path: PathBuf,
    pub hash: Option<HashDigest>,
    /// The commit a Git reference was resolved to.
    pub commit: Option<String>,
}

/// A client for one or more package indexes.
pub trait IndexClient: Send + Sync {
    /// List every version of a package on an index, with its files.
    fn list_versions<'io>(
        &'io self,
        index: &'io IndexUrl,
        name: &'io PackageName,
    ) -> impl Future<Output = Result<Vec<VersionFiles>, ClientError>> + Send + 'io;

    /// Read the metadata the index serves for a file, if it serves any.
    ///
    /// `None` means the metadata has to be built from the artifact.
    fn metadata<'io>(
        &'io self,
        name: &'io PackageName,
        version: &'io Version,
        file: &'io DistFile,
    ) -> impl Future<Output = Result<Option<Metadata>, ClientError>> + Send + 'io;

    /// Download a file or check out a direct source.
    fn fetch<'io>(
        &'io self,
        source: FetchSource<'io>,
    ) -> impl Future<Output = Result<FetchedSource, ClientError>> + Send + 'io;
}

/// Reads the metadata of source distributions and source trees.
pub trait BuildBackend: Send + Sync {
    fn build_metadata<'io>(
        &'io self,
        source: &'io Path,
    ) -> impl Future<Output = Result<Metadata, BuildError>> + Send + 'io;
}

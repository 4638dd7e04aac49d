use serde::{Deserialize, Serialize};

use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::{Version, VersionSpecifiers};

/// The subset of the core metadata of a distribution that matters for resolution.
///
/// See: <https://packaging.python.org/specifications/core-metadata/>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Metadata {
    pub name: PackageName,
    pub version: Version,
    #[serde(default)]
    pub requires_dist: Vec<lockstep_pep508::Requirement>,
    #[serde(default)]
    pub provides_extras: Vec<ExtraName>,
    #[serde(default)]
    pub requires_python: Option<VersionSpecifiers>,
}

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::{Version, VersionSpecifiers};
use lockstep_pep508::{MarkerTree, Pep508Error, VersionOrUrl};

/// Where the distributions of a requirement may come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequirementSource {
    /// Any version from the configured indexes that matches the specifiers.
    Registry { specifier: VersionSpecifiers },
    /// A remote archive.
    Url { url: Url },
    /// A local archive or source tree.
    Path { path: PathBuf },
    /// A Git repository, optionally at a branch, tag or commit.
    Git {
        url: Url,
        reference: Option<String>,
    },
    /// A local source tree installed in editable mode.
    Editable { path: PathBuf },
}

impl RequirementSource {
    /// Whether the requirement names its source rather than a version range.
    pub fn is_direct(&self) -> bool {
        !matches!(self, Self::Registry { .. })
    }

    /// The version specifiers, for registry requirements.
    pub fn specifier(&self) -> Option<&VersionSpecifiers> {
        match self {
            Self::Registry { specifier } => Some(specifier),
            _ => None,
        }
    }

    /// Convert a PEP 508 direct URL, recognizing `git+` and `file:` URLs.
    fn from_url(url: Url) -> Self {
        if let Some(git) = url.as_str().strip_prefix("git+") {
            if let Ok(mut git) = Url::parse(git) {
                // `git+https://host/repo@v1.0` pins the reference in the last path segment.
                let reference = git
                    .path()
                    .rsplit_once('@')
                    .map(|(path, reference)| (path.to_string(), reference.to_string()));
                if let Some((path, reference)) = reference {
                    git.set_path(&path);
                    return Self::Git {
                        url: git,
                        reference: Some(reference),
                    };
                }
                return Self::Git {
                    url: git,
                    reference: None,
                };
            }
        }
        if url.scheme() == "file" {
            if let Ok(path) = url.to_file_path() {
                return Self::Path { path };
            }
        }
        Self::Url { url }
    }
}

/// A requirement on a package, as declared by the project or by the metadata of a
/// distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub name: PackageName,
    pub extras: Vec<ExtraName>,
    pub source: RequirementSource,
    pub marker: MarkerTree,
}

impl Requirement {
    /// A requirement on any version of a package.
    pub fn any(name: PackageName) -> Self {
        Self {
            name,
            extras: Vec::new(),
            source: RequirementSource::Registry {
                specifier: VersionSpecifiers::empty(),
            },
            marker: MarkerTree::TRUE,
        }
    }

    /// An editable requirement on a local source tree.
    pub fn editable(name: PackageName, path: PathBuf) -> Self {
        Self {
            name,
            extras: Vec::new(),
            source: RequirementSource::Editable { path },
            marker: MarkerTree::TRUE,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: MarkerTree) -> Self {
        self.marker = marker;
        self
    }

    /// The version specifiers, for registry requirements.
    pub fn specifier(&self) -> Option<&VersionSpecifiers> {
        self.source.specifier()
    }

    /// Whether a version satisfies the requirement; direct requirements accept any version of
    /// their source.
    pub fn contains(&self, version: &Version) -> bool {
        self.specifier()
            .is_none_or(|specifier| specifier.contains(version))
    }
}

impl From<lockstep_pep508::Requirement> for Requirement {
    fn from(requirement: lockstep_pep508::Requirement) -> Self {
        let source = match requirement.version_or_url {
            None => RequirementSource::Registry {
                specifier: VersionSpecifiers::empty(),
            },
            Some(VersionOrUrl::VersionSpecifier(specifier)) => {
                RequirementSource::Registry { specifier }
            }
            Some(VersionOrUrl::Url(url)) => RequirementSource::from_url(url),
        };
        Self {
            name: requirement.name,
            extras: requirement.extras,
            source,
            marker: requirement.marker,
        }
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    fn from_str(requirement: &str) -> Result<Self, Self::Err> {
        lockstep_pep508::Requirement::from_str(requirement).map(Self::from)
    }
}

impl Display for Requirement {
    /// `name[extras]specifiers ; marker`, or `name[extras] @ source ; marker`.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<String> = self.extras.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        match &self.source {
            RequirementSource::Registry { specifier } => write!(f, "{specifier}")?,
            RequirementSource::Url { url } => write!(f, " @ {url}")?,
            RequirementSource::Path { path } => write!(f, " @ file://{}", path.display())?,
            RequirementSource::Git {
                url,
                reference: Some(reference),
            } => write!(f, " @ git+{url}@{reference}")?,
            RequirementSource::Git {
                url,
                reference: None,
            } => write!(f, " @ git+{url}")?,
            RequirementSource::Editable { path } => write!(f, " @ editable+{}", path.display())?,
        }
        if let Some(marker) = self.marker.contents() {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry() {
        let requirement =
            Requirement::from_str("Werkzeug >= 2.0 ; python_version < '3.12'").unwrap();
        assert_eq!(requirement.name.as_str(), "werkzeug");
        assert!(requirement.contains(&Version::from_str("3.0.0").unwrap()));
        assert!(!requirement.contains(&Version::from_str("1.0.1").unwrap()));
        assert_eq!(
            requirement.to_string(),
            r#"werkzeug>=2.0 ; python_version < "3.12""#
        );
    }

    #[test]
    fn git() {
        let requirement =
            Requirement::from_str("flask @ git+https://github.com/pallets/flask@3.0.0").unwrap();
        let RequirementSource::Git { url, reference } = &requirement.source else {
            panic!("expected a Git source, found {:?}", requirement.source);
        };
        assert_eq!(url.as_str(), "https://github.com/pallets/flask");
        assert_eq!(reference.as_deref(), Some("3.0.0"));
        assert!(requirement.source.is_direct());
        assert_eq!(
            requirement.to_string(),
            "flask @ git+https://github.com/pallets/flask@3.0.0"
        );
    }

    #[test]
    fn direct_url() {
        let requirement = Requirement::from_str(
            "flask @ https://files.example.com/flask-3.0.0-py3-none-any.whl",
        )
        .unwrap();
        assert!(matches!(requirement.source, RequirementSource::Url { .. }));
        assert!(requirement.contains(&Version::from_str("0.1").unwrap()));
    }

    #[cfg(unix)]
    #[test]
    fn file_url() {
        let requirement = Requirement::from_str("local @ file:///srv/local-1.0.tar.gz").unwrap();
        assert_eq!(
            requirement.source,
            RequirementSource::Path {
                path: PathBuf::from("/srv/local-1.0.tar.gz")
            }
        );
    }
}

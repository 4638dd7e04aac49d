use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use lockstep_distribution_types::{Candidate, CandidateSource, Requirement, RequirementSource};
use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::VersionSpecifiers;
use lockstep_pep508::MarkerTree;

use crate::error::ResolveError;
use crate::graph::Node;

/// What the active requirements on one package demand, merged.
#[derive(Debug, Clone)]
pub(crate) struct Criterion {
    /// The conjunction of every registry requirement's specifiers.
    pub(crate) specifier: VersionSpecifiers,
    /// The union of the requested extras.
    pub(crate) extras: BTreeSet<ExtraName>,
    /// The requirement that names the package's source, if any.
    pub(crate) direct: Option<Requirement>,
}

impl Criterion {
    pub(crate) fn from_node(name: &PackageName, node: &Node) -> Result<Self, ResolveError> {
        let mut specifier = VersionSpecifiers::empty();
        let mut extras = BTreeSet::new();
        let mut direct: Option<&Requirement> = None;
        for incoming in &node.incoming {
            let requirement = &incoming.requirement;
            extras.extend(requirement.extras.iter().cloned());
            match &requirement.source {
                RequirementSource::Registry { specifier: other } => {
                    specifier.extend(other.iter().cloned());
                }
                source => match direct {
                    None => direct = Some(requirement),
                    Some(existing) if existing.source == *source => {}
                    Some(existing) => {
                        return Err(ResolveError::ConflictingUrls {
                            package: name.clone(),
                            first: existing.to_string(),
                            second: requirement.to_string(),
                        });
                    }
                },
            }
        }
        Ok(Self {
            specifier,
            extras,
            direct: direct.cloned(),
        })
    }

    /// The listing the candidates come from, and the request that produces it.
    pub(crate) fn listing(&self, name: &PackageName) -> (ListingKey, Requirement) {
        match &self.direct {
            Some(requirement) => (
                ListingKey::Direct(name.clone(), requirement.source.clone()),
                Requirement {
                    name: name.clone(),
                    extras: Vec::new(),
                    source: requirement.source.clone(),
                    marker: MarkerTree::TRUE,
                },
            ),
            None => (
                ListingKey::Registry(name.clone()),
                Requirement::any(name.clone()),
            ),
        }
    }

    /// Whether a candidate satisfies the merged version and source constraints.
    pub(crate) fn accepts(&self, candidate: &Candidate) -> bool {
        if !self.specifier.contains(&candidate.version) {
            return false;
        }
        match &self.direct {
            None => !candidate.source.is_direct(),
            Some(requirement) => same_source(&requirement.source, &candidate.source),
        }
    }
}

/// Whether a single requirement accepts a candidate. Registry requirements only constrain the
/// version, so they accept a direct candidate of a matching version.
pub(crate) fn allows(requirement: &Requirement, candidate: &Candidate) -> bool {
    match &requirement.source {
        RequirementSource::Registry { specifier } => specifier.contains(&candidate.version),
        source => same_source(source, &candidate.source),
    }
}

/// Whether a candidate was found for a direct requirement. Git candidates are pinned to the
/// commit the reference resolved to, so only the repository has to match.
fn same_source(requirement: &RequirementSource, candidate: &CandidateSource) -> bool {
    match (requirement, candidate) {
        (RequirementSource::Url { url }, CandidateSource::Url { url: found }) => url == found,
        (RequirementSource::Path { path }, CandidateSource::Path { path: found })
        | (RequirementSource::Editable { path }, CandidateSource::Editable { path: found }) => {
            path == found
        }
        (RequirementSource::Git { url, .. }, CandidateSource::Git { url: found, .. }) => {
            url == found
        }
        _ => false,
    }
}

/// The identity of a listing: every registry requirement on a name shares one listing, every
/// direct source has its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ListingKey {
    Registry(PackageName),
    Direct(PackageName, RequirementSource),
}

impl Display for ListingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(name) => write!(f, "{name}"),
            Self::Direct(name, _) => write!(f, "{name} (direct)"),
        }
    }
}

use std::cmp::Ordering;
use std::sync::Arc;

use lockstep_distribution_types::{Candidate, DistFile, DistKind};
use lockstep_normalize::PackageName;
use lockstep_pep440::VersionSpecifiers;

use crate::{BinaryPolicy, PrereleaseMode};

/// The order of two files of the same version under a binary policy; the preferred file sorts
/// first. Ties are broken by filename.
pub fn file_order(left: &DistFile, right: &DistFile, policy: BinaryPolicy) -> Ordering {
    kind_order(left.kind(), right.kind(), policy).then_with(|| left.filename.cmp(&right.filename))
}

fn kind_order(left: DistKind, right: DistKind, policy: BinaryPolicy) -> Ordering {
    match policy {
        BinaryPolicy::PreferBinary => left.cmp(&right),
        BinaryPolicy::NoBinary => right.cmp(&left),
        BinaryPolicy::NoPreference => Ordering::Equal,
    }
}

/// The order in which candidates are tried; the preferred candidate sorts first.
///
/// Keys, in order:
/// 1. Version, highest first.
/// 2. The kind of the candidate's distribution under `policy`.
/// 3. Index priority, in declaration order.
/// 4. The filename of the candidate's distribution.
pub fn candidate_order(left: &Candidate, right: &Candidate, policy: BinaryPolicy) -> Ordering {
    right
        .version
        .cmp(&left.version)
        .then_with(|| tie_break(left, right, policy))
}

/// [`candidate_order`] with the versions ascending, for minimal-version resolution.
pub fn ascending_candidate_order(
    left: &Candidate,
    right: &Candidate,
    policy: BinaryPolicy,
) -> Ordering {
    left.version
        .cmp(&right.version)
        .then_with(|| tie_break(left, right, policy))
}

fn tie_break(left: &Candidate, right: &Candidate, policy: BinaryPolicy) -> Ordering {
    let kind = match (left.kind(), right.kind()) {
        (Some(left), Some(right)) => kind_order(left, right, policy),
        _ => Ordering::Equal,
    };
    kind.then_with(|| left.index_priority.cmp(&right.index_priority))
        .then_with(|| {
            let left = left.dist.as_ref().map(|dist| dist.filename.as_str());
            let right = right.dist.as_ref().map(|dist| dist.filename.as_str());
            left.cmp(&right)
        })
}

/// The direction in which [`Candidates`] yields versions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionOrder {
    #[default]
    Descending,
    Ascending,
}

/// The candidates of one package, in preference order.
///
/// Iterating is cheap and restartable: the listing is shared, and every iterator filters it
/// lazily, so a caller that stops at the first acceptable candidate never looks at the rest.
/// Metadata is not part of a candidate and is fetched separately.
#[derive(Debug, Clone)]
pub struct Candidates {
    name: PackageName,
    candidates: Arc<[Candidate]>,
    specifier: VersionSpecifiers,
    prereleases: PrereleaseMode,
    binary: BinaryPolicy,
    order: VersionOrder,
}

impl Candidates {
    /// Candidates from a listing, sorted by [`candidate_order`].
    pub fn new(
        name: PackageName,
        mut candidates: Vec<Candidate>,
        specifier: VersionSpecifiers,
        prereleases: PrereleaseMode,
        binary: BinaryPolicy,
    ) -> Self {
        candidates.sort_by(|left, right| candidate_order(left, right, binary));
        Self {
            name,
            candidates: Arc::from(candidates),
            specifier,
            prereleases,
            binary,
            order: VersionOrder::Descending,
        }
    }

    /// The single candidate of a direct requirement.
    pub fn single(candidate: Candidate) -> Self {
        Self {
            name: candidate.name.clone(),
            candidates: Arc::from(vec![candidate]),
            specifier: VersionSpecifiers::empty(),
            prereleases: PrereleaseMode::Allow,
            binary: BinaryPolicy::default(),
            order: VersionOrder::Descending,
        }
    }

    /// Apply a different pre-release policy to the same listing.
    #[must_use]
    pub fn with_prereleases(mut self, prereleases: PrereleaseMode) -> Self {
        self.prereleases = prereleases;
        self
    }

    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The specifiers of the requirement the candidates were found for.
    pub fn specifier(&self) -> &VersionSpecifiers {
        &self.specifier
    }

    pub fn order(&self) -> VersionOrder {
        self.order
    }

    /// The number of candidates before any filtering.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The same candidates with the lowest version first; ties keep their relative order.
    #[must_use]
    pub fn ascending(&self) -> Self {
        if self.order == VersionOrder::Ascending {
            return self.clone();
        }
        let mut candidates = self.candidates.to_vec();
        candidates.sort_by(|left, right| ascending_candidate_order(left, right, self.binary));
        Self {
            candidates: Arc::from(candidates),
            order: VersionOrder::Ascending,
            ..self.clone()
        }
    }

    /// Every candidate, unfiltered.
    pub fn all(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// The candidates that satisfy the requirement they were found for.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.matching(&self.specifier)
    }

    /// The candidates that satisfy `specifier`, under the pre-release policy.
    pub fn matching<'a>(
        &'a self,
        specifier: &'a VersionSpecifiers,
    ) -> impl Iterator<Item = &'a Candidate> + 'a {
        let prereleases = self.allows_prereleases(specifier);
        self.candidates.iter().filter(move |candidate| {
            (prereleases || !candidate.version.any_prerelease())
                && specifier.contains(&candidate.version)
        })
    }

    /// Whether pre-releases are acceptable for `specifier`.
    pub fn allows_prereleases(&self, specifier: &VersionSpecifiers) -> bool {
        let necessary = || {
            !self.candidates.iter().any(|candidate| {
                !candidate.version.any_prerelease() && specifier.contains(&candidate.version)
            })
        };
        match self.prereleases {
            PrereleaseMode::Disallow => false,
            PrereleaseMode::Allow => true,
            PrereleaseMode::Explicit => specifier.any_prerelease(),
            PrereleaseMode::IfNecessary => necessary(),
            PrereleaseMode::IfNecessaryOrExplicit => specifier.any_prerelease() || necessary(),
        }
    }
}

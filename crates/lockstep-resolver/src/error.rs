use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use lockstep_distribution_types::Requirement;
use lockstep_normalize::PackageName;

use crate::graph::Parent;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Package `{package}` is unavailable: {reason} (required by {chain})")]
    CandidateUnavailable {
        package: PackageName,
        reason: String,
        chain: DerivationChain,
    },

    #[error(transparent)]
    ResolutionConflict(Box<NoSolutionError>),

    #[error(
        "The resolution did not finish within {max_rounds} rounds; consider narrowing the requirements"
    )]
    ResolutionTooDeep { max_rounds: usize },

    #[error("The resolution was cancelled")]
    Cancelled,

    #[error("Requirements contain conflicting sources for package `{package}`:\n- {first}\n- {second}")]
    ConflictingUrls {
        package: PackageName,
        first: String,
        second: String,
    },
}

/// Why a candidate was ruled out for a branch of the search.
#[derive(Debug, Clone)]
pub(crate) enum RejectReason {
    /// Its metadata could not be fetched or built.
    Metadata(String),
    /// One of its dependencies can't be satisfied next to the current selections.
    Dependency(Box<Conflict>),
    /// Every way forward from it ended in a conflict.
    Backtracked(Box<Conflict>),
    /// The requirements added after its selection exclude it.
    Excluded(Vec<(Parent, Requirement)>),
}

/// A package for which no candidate is left.
#[derive(Debug, Clone)]
pub(crate) struct Conflict {
    pub(crate) package: PackageName,
    /// The requirements on the package at the time of the conflict.
    pub(crate) requirements: Vec<(Parent, Requirement)>,
    /// The candidates that matched the requirements but were ruled out.
    pub(crate) rejected: Vec<Rejection>,
    /// Why the package could not be listed, if it couldn't.
    pub(crate) unavailable: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Rejection {
    pub(crate) candidate: String,
    pub(crate) reason: RejectReason,
}

impl Conflict {
    /// Whether nothing but the availability of the package itself is at fault: it can't be
    /// listed, a single requirement matches no version, or every matching version failed to
    /// provide metadata.
    pub(crate) fn unavailable_reason(&self) -> Option<String> {
        if let Some(reason) = &self.unavailable {
            return Some(reason.clone());
        }
        if self.rejected.is_empty() {
            return match self.requirements.as_slice() {
                [(_, requirement)] => Some(format!("no version matches `{requirement}`")),
                _ => None,
            };
        }
        let mut reasons = Vec::with_capacity(self.rejected.len());
        for rejection in &self.rejected {
            let RejectReason::Metadata(reason) = &rejection.reason else {
                return None;
            };
            reasons.push(format!("`{}`: {reason}", rejection.candidate));
        }
        Some(format!(
            "no candidate provided usable metadata ({})",
            reasons.join("; ")
        ))
    }

    /// The packages whose requirements took part in the conflict, transitively.
    fn contributors(&self, contributors: &mut BTreeSet<PackageName>) {
        for (parent, _) in &self.requirements {
            if let Some(name) = parent.name() {
                contributors.insert(name.clone());
            }
        }
        for rejection in &self.rejected {
            match &rejection.reason {
                RejectReason::Dependency(conflict) | RejectReason::Backtracked(conflict) => {
                    conflict.contributors(contributors);
                }
                RejectReason::Excluded(requirements) => {
                    contributors.extend(
                        requirements
                            .iter()
                            .filter_map(|(parent, _)| parent.name().cloned()),
                    );
                }
                RejectReason::Metadata(_) => {}
            }
        }
    }

    /// Explain the conflict, innermost causes first.
    fn explain(&self, lines: &mut Vec<String>) {
        for rejection in &self.rejected {
            match &rejection.reason {
                RejectReason::Metadata(reason) => {
                    lines.push(format!("{} cannot be used: {reason}.", rejection.candidate));
                }
                RejectReason::Excluded(requirements) => {
                    lines.push(format!(
                        "Because {}, {} cannot be used.",
                        because(requirements),
                        rejection.candidate
                    ));
                }
                RejectReason::Dependency(conflict) | RejectReason::Backtracked(conflict) => {
                    conflict.explain(lines);
                    lines.push(format!("So {} cannot be used.", rejection.candidate));
                }
            }
        }
        if let Some(reason) = &self.unavailable {
            lines.push(format!("{} is unavailable: {reason}.", self.package));
        } else if self.rejected.is_empty() {
            lines.push(format!(
                "Because {}, no version of {} satisfies all requirements.",
                because(&self.requirements),
                self.package
            ));
        } else {
            lines.push(format!(
                "Because {}, no remaining version of {} can be selected.",
                because(&self.requirements),
                self.package
            ));
        }
    }
}

fn because(requirements: &[(Parent, Requirement)]) -> String {
    requirements
        .iter()
        .map(|(parent, requirement)| format!("{parent} requires {requirement}"))
        .join(" and ")
}

/// The path from the project to a package, through the packages that required it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationChain(Vec<Parent>);

impl DerivationChain {
    pub(crate) fn new(steps: Vec<Parent>) -> Self {
        Self(steps)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parent> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for DerivationChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("the project")?;
        for step in &self.0 {
            if let Parent::Package { .. } = step {
                write!(f, " -> {step}")?;
            }
        }
        Ok(())
    }
}

/// The failure of a resolution: every assignment ran into the contradiction described here.
#[derive(Debug)]
pub struct NoSolutionError {
    conflict: Conflict,
    chains: Vec<(PackageName, DerivationChain)>,
}

impl NoSolutionError {
    pub(crate) fn new(conflict: Conflict, chains: Vec<(PackageName, DerivationChain)>) -> Self {
        Self { conflict, chains }
    }

    /// The package for which no candidate was left.
    pub fn package(&self) -> &PackageName {
        &self.conflict.package
    }

    /// The packages whose requirements contributed to the conflict.
    pub fn contributors(&self) -> BTreeSet<PackageName> {
        let mut contributors = BTreeSet::new();
        self.conflict.contributors(&mut contributors);
        contributors
    }

    /// How the project reached each contributing package.
    pub fn chains(&self) -> &[(PackageName, DerivationChain)] {
        &self.chains
    }
}

impl std::error::Error for NoSolutionError {}

impl Display for NoSolutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        self.conflict.explain(&mut lines);
        writeln!(f, "No solution found when resolving dependencies:")?;
        for line in &lines {
            writeln!(f, "  {line}")?;
        }
        for (package, chain) in &self.chains {
            if !chain.is_empty() {
                writeln!(f, "  {package} is required through {chain}.")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use lockstep_pep440::Version;

    use super::*;

    fn name(name: &str) -> PackageName {
        PackageName::from_str(name).unwrap()
    }

    fn package(package: &str, version: &str) -> Parent {
        Parent::Package {
            name: name(package),
            version: Version::from_str(version).unwrap(),
            extra: None,
        }
    }

    fn requires(parent: Parent, requirement: &str) -> (Parent, Requirement) {
        (parent, Requirement::from_str(requirement).unwrap())
    }

    fn shared_conflict() -> Conflict {
        Conflict {
            package: name("shared"),
            requirements: vec![
                requires(package("pkg-a", "1.0"), "shared<2"),
                requires(package("pkg-b", "1.0"), "shared>=2"),
            ],
            rejected: Vec::new(),
            unavailable: None,
        }
    }

    #[test]
    fn report() {
        let conflict = Conflict {
            package: name("pkg-a"),
            requirements: vec![requires(Parent::Root, "pkg-a")],
            rejected: vec![Rejection {
                candidate: "pkg-a==1.0".to_string(),
                reason: RejectReason::Backtracked(Box::new(Conflict {
                    package: name("pkg-b"),
                    requirements: vec![requires(Parent::Root, "pkg-b")],
                    rejected: vec![Rejection {
                        candidate: "pkg-b==1.0".to_string(),
                        reason: RejectReason::Dependency(Box::new(shared_conflict())),
                    }],
                    unavailable: None,
                })),
            }],
            unavailable: None,
        };
        let error = NoSolutionError::new(conflict, Vec::new());

        insta::assert_snapshot!(error, @r"
        No solution found when resolving dependencies:
          Because pkg-a==1.0 requires shared<2 and pkg-b==1.0 requires shared>=2, no version of shared satisfies all requirements.
          So pkg-b==1.0 cannot be used.
          Because the project requires pkg-b, no remaining version of pkg-b can be selected.
          So pkg-a==1.0 cannot be used.
          Because the project requires pkg-a, no remaining version of pkg-a can be selected.
        ");
        assert_eq!(
            error.contributors(),
            [name("pkg-a"), name("pkg-b")].into_iter().collect()
        );
    }

    #[test]
    fn unavailable() {
        let conflict = Conflict {
            package: name("flask"),
            requirements: vec![requires(Parent::Root, "flask>=9")],
            rejected: Vec::new(),
            unavailable: None,
        };
        assert_eq!(
            conflict.unavailable_reason().as_deref(),
            Some("no version matches `flask>=9`")
        );

        assert_eq!(shared_conflict().unavailable_reason(), None);

        let conflict = Conflict {
            package: name("flask"),
            requirements: vec![requires(Parent::Root, "flask")],
            rejected: vec![Rejection {
                candidate: "flask==3.0.0".to_string(),
                reason: RejectReason::Metadata("malformed metadata".to_string()),
            }],
            unavailable: None,
        };
        assert_eq!(
            conflict.unavailable_reason().as_deref(),
            Some("no candidate provided usable metadata (`flask==3.0.0`: malformed metadata)")
        );
    }

    #[test]
    fn chain() {
        let chain = DerivationChain::new(vec![
            package("flask", "3.0.0"),
            package("werkzeug", "3.0.0"),
        ]);
        assert_eq!(
            chain.to_string(),
            "the project -> flask==3.0.0 -> werkzeug==3.0.0"
        );
        assert_eq!(DerivationChain::default().to_string(), "the project");
    }
}

//! Three-valued evaluation of markers against a [`RangedEnvironment`].

use lockstep_normalize::ExtraName;
use lockstep_pep440::{Operator, Ranges, Version, VersionSpecifier, release_specifier_to_range};

use crate::marker::tree::{compare_strings, evaluate_extra};
use crate::marker::{MarkerExpression, MarkerTree, MarkerValueVersion, RangedEnvironment};

/// The outcome of evaluating a marker over every environment a [`RangedEnvironment`]
/// describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerTruth {
    /// The marker holds in every environment.
    AlwaysTrue,
    /// The marker holds in no environment.
    AlwaysFalse,
    /// The marker holds in some environments only, and must be carried along.
    Depends,
}

impl MarkerTruth {
    fn from_bool(value: bool) -> Self {
        if value {
            Self::AlwaysTrue
        } else {
            Self::AlwaysFalse
        }
    }

    /// Compare the environment's Python range against the range a marker admits.
    fn from_ranges(environment: &Ranges<Version>, marker: &Ranges<Version>) -> Self {
        if environment.subset_of(marker) {
            Self::AlwaysTrue
        } else if environment.is_disjoint(marker) {
            Self::AlwaysFalse
        } else {
            Self::Depends
        }
    }
}

impl MarkerTree {
    /// Decide the marker for every environment in `environment` at once.
    ///
    /// Subtrees that only constrain the Python version are folded into a single range before
    /// comparison, so `python_version < '3.10' or python_version >= '3.10'` is always true.
    pub fn evaluate_symbolic(
        &self,
        environment: &RangedEnvironment,
        extras: &[ExtraName],
    ) -> MarkerTruth {
        if let Some(range) = self.python_range() {
            return MarkerTruth::from_ranges(environment.python_full_version(), &range);
        }
        match self {
            Self::Expression(expression) => expression.evaluate_symbolic(environment, extras),
            Self::And(children) => {
                let mut truth = MarkerTruth::AlwaysTrue;
                for child in children {
                    match child.evaluate_symbolic(environment, extras) {
                        MarkerTruth::AlwaysFalse => return MarkerTruth::AlwaysFalse,
                        MarkerTruth::Depends => truth = MarkerTruth::Depends,
                        MarkerTruth::AlwaysTrue => {}
                    }
                }
                truth
            }
            Self::Or(children) => {
                let mut truth = MarkerTruth::AlwaysFalse;
                for child in children {
                    match child.evaluate_symbolic(environment, extras) {
                        MarkerTruth::AlwaysTrue => return MarkerTruth::AlwaysTrue,
                        MarkerTruth::Depends => truth = MarkerTruth::Depends,
                        MarkerTruth::AlwaysFalse => {}
                    }
                }
                truth
            }
        }
    }

    /// The part of the marker that `environment` and `extras` leave undecided.
    ///
    /// Returns [`MarkerTree::TRUE`] for markers that always hold, [`MarkerTree::FALSE`] for
    /// markers that never hold, and otherwise the marker with every decided clause removed.
    #[must_use]
    pub fn simplify(&self, environment: &RangedEnvironment, extras: &[ExtraName]) -> Self {
        match self.evaluate_symbolic(environment, extras) {
            MarkerTruth::AlwaysTrue => Self::TRUE,
            MarkerTruth::AlwaysFalse => Self::FALSE,
            MarkerTruth::Depends => match self {
                Self::Expression(_) => self.clone(),
                Self::And(children) => children.iter().fold(Self::TRUE, |tree, child| {
                    tree.and(child.simplify(environment, extras))
                }),
                Self::Or(children) => children.iter().fold(Self::FALSE, |tree, child| {
                    tree.or(child.simplify(environment, extras))
                }),
            },
        }
    }

    /// The range of Python versions the marker admits, if it only constrains the Python
    /// version.
    fn python_range(&self) -> Option<Ranges<Version>> {
        match self {
            Self::Expression(MarkerExpression::Version {
                key: MarkerValueVersion::PythonFullVersion,
                specifier,
            }) => Some(release_specifier_to_range(specifier)),
            Self::Expression(MarkerExpression::Version {
                key: MarkerValueVersion::PythonVersion,
                specifier,
            }) => Some(python_version_to_range(specifier)),
            Self::Expression(_) => None,
            Self::And(children) => children.iter().try_fold(Ranges::full(), |range, child| {
                Some(range.intersection(&child.python_range()?))
            }),
            Self::Or(children) => children.iter().try_fold(Ranges::empty(), |range, child| {
                Some(range.union(&child.python_range()?))
            }),
        }
    }
}

impl MarkerExpression {
    fn evaluate_symbolic(
        &self,
        environment: &RangedEnvironment,
        extras: &[ExtraName],
    ) -> MarkerTruth {
        match self {
            Self::Version {
                key: MarkerValueVersion::PythonFullVersion,
                specifier,
            } => MarkerTruth::from_ranges(
                environment.python_full_version(),
                &release_specifier_to_range(specifier),
            ),
            Self::Version {
                key: MarkerValueVersion::PythonVersion,
                specifier,
            } => MarkerTruth::from_ranges(
                environment.python_full_version(),
                &python_version_to_range(specifier),
            ),
            Self::Version {
                key: MarkerValueVersion::ImplementationVersion,
                specifier,
            } => environment
                .implementation_version()
                .map_or(MarkerTruth::Depends, |version| {
                    MarkerTruth::from_bool(specifier.contains(version))
                }),
            Self::String {
                key,
                operator,
                value,
            } => environment
                .get_string(*key)
                .map_or(MarkerTruth::Depends, |actual| {
                    MarkerTruth::from_bool(compare_strings(actual, *operator, value))
                }),
            Self::StringInverted {
                value,
                operator,
                key,
            } => environment
                .get_string(*key)
                .map_or(MarkerTruth::Depends, |actual| {
                    MarkerTruth::from_bool(compare_strings(value, *operator, actual))
                }),
            Self::Extra { operator, name } => {
                MarkerTruth::from_bool(evaluate_extra(*operator, name, extras))
            }
        }
    }
}

/// Translate a `python_version` comparison into the range of full Python versions it admits.
///
/// `python_version` is the `major.minor` prefix of `python_full_version`, so
/// `python_version <= "3.8"` admits `3.8.18` and is `python_full_version < "3.9"`, while
/// `python_version > "3.8"` is `python_full_version >= "3.9"`.
pub fn python_version_to_range(specifier: &VersionSpecifier) -> Ranges<Version> {
    let version = specifier.version().only_release();
    let release = version.release();
    let major = release.first().copied().unwrap_or(0);
    let minor = release.get(1).copied().unwrap_or(0);
    let floor = Version::new([major, minor]).with_epoch(version.epoch());
    let next = Version::new([major, minor + 1]).with_epoch(version.epoch());
    // Whether the bound is itself a `major.minor` version, e.g. `3.8` but not `3.8.1`.
    let exact = release.iter().skip(2).all(|segment| *segment == 0);
    let ceiling = if exact { floor.clone() } else { next.clone() };

    match specifier.operator() {
        Operator::Equal | Operator::ExactEqual if exact => Ranges::between(floor, next),
        Operator::Equal | Operator::ExactEqual => Ranges::empty(),
        Operator::NotEqual if exact => Ranges::between(floor, next).complement(),
        Operator::NotEqual => Ranges::full(),
        Operator::LessThan => Ranges::strictly_lower_than(ceiling),
        Operator::LessThanEqual => Ranges::strictly_lower_than(next),
        Operator::GreaterThan => Ranges::higher_than(next),
        Operator::GreaterThanEqual => Ranges::higher_than(ceiling),
        Operator::TildeEqual => {
            Ranges::higher_than(ceiling).intersection(&release_specifier_to_range(specifier))
        }
        Operator::EqualStar | Operator::NotEqualStar => release_specifier_to_range(specifier),
    }
}

use rustc_hash::FxHashSet;

use lockstep_normalize::PackageName;
use lockstep_pep440::Version;
use lockstep_repository::VersionOrder;

use crate::manifest::Manifest;
use crate::options::{ResolutionMode, ResolverConfig, Upgrade, UpgradeMode};
use crate::preferences::Preferences;

/// The policy that orders the candidates of each package.
///
/// A strategy only decides which acceptable candidate is tried first; it never makes an
/// unacceptable candidate acceptable.
pub trait ResolutionStrategy {
    /// The version to try before any other, if it is still acceptable.
    fn preferred_version(&self, name: &PackageName) -> Option<&Version>;

    /// The order in which the remaining versions are tried.
    fn version_order(&self, name: &PackageName) -> VersionOrder;

    /// Whether the dependencies of `parent` ignore the prior lock whenever `parent` does.
    ///
    /// The resolver tracks the packages unlocked this way per branch of the search, so a
    /// selection that is backtracked no longer unlocks anything.
    fn unlocks_dependencies(&self, parent: &PackageName) -> bool {
        let _ = parent;
        false
    }
}

/// The default strategy: a [`ResolutionMode`] combined with reuse of a prior lock.
#[derive(Debug, Clone)]
pub struct Strategy {
    mode: ResolutionMode,
    direct: FxHashSet<PackageName>,
    preferences: Preferences,
    upgrade: Upgrade,
    /// The packages whose locked versions are ignored from the start.
    unlocked: FxHashSet<PackageName>,
}

impl Strategy {
    pub fn new(manifest: &Manifest, config: &ResolverConfig, preferences: Preferences) -> Self {
        let upgrade = config.upgrade.clone();
        let unlocked = match upgrade.mode {
            UpgradeMode::Reuse | UpgradeMode::All => upgrade.packages.iter().cloned().collect(),
            UpgradeMode::Eager => preferences.closure(&upgrade.packages),
        };
        Self {
            mode: config.resolution_mode,
            direct: manifest
                .requirements()
                .iter()
                .map(|requirement| requirement.name.clone())
                .collect(),
            preferences,
            upgrade,
            unlocked,
        }
    }
}

impl ResolutionStrategy for Strategy {
    fn preferred_version(&self, name: &PackageName) -> Option<&Version> {
        if self.upgrade.mode == UpgradeMode::All || self.unlocked.contains(name) {
            return None;
        }
        self.preferences.version(name)
    }

    fn version_order(&self, name: &PackageName) -> VersionOrder {
        match self.mode {
            ResolutionMode::Highest => VersionOrder::Descending,
            ResolutionMode::Lowest => VersionOrder::Ascending,
            ResolutionMode::LowestDirect if self.direct.contains(name) => VersionOrder::Ascending,
            ResolutionMode::LowestDirect => VersionOrder::Descending,
        }
    }

    fn unlocks_dependencies(&self, parent: &PackageName) -> bool {
        self.upgrade.mode == UpgradeMode::Eager && self.unlocked.contains(parent)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::preferences::Preference;

    use super::*;

    fn name(name: &str) -> PackageName {
        PackageName::from_str(name).unwrap()
    }

    fn version(version: &str) -> Version {
        Version::from_str(version).unwrap()
    }

    fn preferences() -> Preferences {
        [
            ("flask", "2.0.0", vec!["werkzeug"]),
            ("werkzeug", "2.0.0", vec!["markupsafe"]),
            ("markupsafe", "2.1.1", vec![]),
        ]
        .into_iter()
        .map(|(package, locked, dependencies)| {
            (
                name(package),
                Preference::new(version(locked), dependencies.into_iter().map(name).collect()),
            )
        })
        .collect()
    }

    fn strategy(upgrade: Upgrade, mode: ResolutionMode) -> Strategy {
        let manifest = Manifest::parse(["flask"]).unwrap();
        let config = ResolverConfig::builder()
            .upgrade(upgrade)
            .resolution_mode(mode)
            .build();
        Strategy::new(&manifest, &config, preferences())
    }

    #[test]
    fn reuse() {
        let strategy = strategy(
            Upgrade::packages(UpgradeMode::Reuse, [name("flask")]),
            ResolutionMode::Highest,
        );
        assert_eq!(strategy.preferred_version(&name("flask")), None);
        assert_eq!(
            strategy.preferred_version(&name("werkzeug")),
            Some(&version("2.0.0"))
        );
    }

    #[test]
    fn eager() {
        let eager = strategy(
            Upgrade::packages(UpgradeMode::Eager, [name("flask")]),
            ResolutionMode::Highest,
        );
        assert_eq!(eager.preferred_version(&name("werkzeug")), None);
        assert_eq!(eager.preferred_version(&name("markupsafe")), None);
        assert!(eager.unlocks_dependencies(&name("flask")));
        assert!(eager.unlocks_dependencies(&name("markupsafe")));
        assert!(!eager.unlocks_dependencies(&name("itsdangerous")));

        let reuse = strategy(
            Upgrade::packages(UpgradeMode::Reuse, [name("flask")]),
            ResolutionMode::Highest,
        );
        assert!(!reuse.unlocks_dependencies(&name("flask")));
    }

    #[test]
    fn all() {
        let strategy = strategy(Upgrade::all(), ResolutionMode::Highest);
        assert_eq!(strategy.preferred_version(&name("markupsafe")), None);
    }

    #[test]
    fn lowest_direct() {
        let strategy = strategy(Upgrade::none(), ResolutionMode::LowestDirect);
        assert_eq!(strategy.version_order(&name("flask")), VersionOrder::Ascending);
        assert_eq!(
            strategy.version_order(&name("werkzeug")),
            VersionOrder::Descending
        );
    }
}

use rustc_hash::{FxHashMap, FxHashSet};

use lockstep_normalize::PackageName;
use lockstep_pep440::Version;

/// A version to try first, as recorded by a prior lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preference {
    version: Version,
    dependencies: Vec<PackageName>,
}

impl Preference {
    pub fn new(version: Version, dependencies: Vec<PackageName>) -> Self {
        Self {
            version,
            dependencies,
        }
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The packages the locked version depended on.
    pub fn dependencies(&self) -> &[PackageName] {
        &self.dependencies
    }
}

/// The preferred versions of a resolution, by package.
#[derive(Debug, Clone, Default)]
pub struct Preferences(FxHashMap<PackageName, Preference>);

impl Preferences {
    /// Add a preference; the first one for a name wins.
    pub fn insert(&mut self, name: PackageName, preference: Preference) {
        self.0.entry(name).or_insert(preference);
    }

    pub fn get(&self, name: &PackageName) -> Option<&Preference> {
        self.0.get(name)
    }

    pub fn version(&self, name: &PackageName) -> Option<&Version> {
        self.0.get(name).map(Preference::version)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The given packages and everything they depended on in the prior lock.
    pub fn closure<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a PackageName>,
    ) -> FxHashSet<PackageName> {
        let mut seen = FxHashSet::default();
        let mut queue: Vec<PackageName> = roots.into_iter().cloned().collect();
        while let Some(name) = queue.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(preference) = self.0.get(&name) {
                queue.extend(
                    preference
                        .dependencies
                        .iter()
                        .filter(|dependency| !seen.contains(*dependency))
                        .cloned(),
                );
            }
        }
        seen
    }
}

impl FromIterator<(PackageName, Preference)> for Preferences {
    fn from_iter<T: IntoIterator<Item = (PackageName, Preference)>>(iter: T) -> Self {
        let mut preferences = Self::default();
        for (name, preference) in iter {
            preferences.insert(name, preference);
        }
        preferences
    }
}

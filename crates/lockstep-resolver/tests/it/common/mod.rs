use std::str::FromStr;

use indoc::indoc;

use lockstep_client::{StaticIndex, StaticRelease};
use lockstep_distribution_types::{Implementation, IndexUrl, Platform, Target};
use lockstep_normalize::PackageName;
use lockstep_pep440::{Version, VersionSpecifiers};
use lockstep_pep508::{MarkerEnvironment, Requirement};
use lockstep_repository::{IndexLocations, IndexRepository, RepositoryOptions, RetryPolicy};
use lockstep_resolver::{Lock, Manifest, Resolution, ResolveError, ResolverConfig, resolve};

/// A small index: a web framework with a tightening dependency, a CLI library with a
/// Windows-only dependency, an extra, a pre-release, and two packages that can't be installed
/// together.
pub(crate) const SNAPSHOT: &str = indoc! {r#"
    {
      "indexes": {
        "https://pypi.org/simple": {
          "flask": [
            { "version": "2.0.0", "requires-dist": ["werkzeug>=2.0"] },
            { "version": "3.0.0", "requires-dist": ["werkzeug>=3.0"], "requires-python": ">=3.8" }
          ],
          "werkzeug": [
            { "version": "2.0.0" },
            { "version": "3.0.0" }
          ],
          "click": [
            { "version": "8.1.7", "requires-dist": ["colorama ; platform_system == 'Windows'"] }
          ],
          "colorama": [
            { "version": "0.4.6", "files": [{ "filename": "colorama-0.4.6-py2.py3-none-any.whl" }] }
          ],
          "requests": [
            {
              "version": "2.31.0",
              "requires-dist": ["idna>=2.5", "pysocks>=1.5.6 ; extra == 'socks'"],
              "provides-extras": ["socks"]
            }
          ],
          "idna": [{ "version": "3.7" }],
          "pytest": [
            { "version": "8.0.0", "requires-dist": ["iniconfig", "colorama; sys_platform==\"win32\""] }
          ],
          "iniconfig": [{ "version": "2.0.0" }],
          "pysocks": [{ "version": "1.7.1" }],
          "pydantic": [
            { "version": "2.0.0" },
            { "version": "2.1.0b1" }
          ],
          "pkg-a": [{ "version": "1.0", "requires-dist": ["shared<2"] }],
          "pkg-b": [{ "version": "1.0", "requires-dist": ["shared>=2"] }],
          "shared": [
            { "version": "1.0" },
            { "version": "2.0" }
          ],
          "app": [{ "version": "1.0", "requires-dist": ["ghost"] }]
        }
      }
    }
"#};

pub(crate) fn repository() -> IndexRepository<StaticIndex> {
    repository_from(StaticIndex::from_json(SNAPSHOT).unwrap())
}

/// An index with one release per `(name, version, requires-dist)` entry.
pub(crate) fn universe(releases: &[(&str, &str, &[&str])]) -> IndexRepository<StaticIndex> {
    let index = releases
        .iter()
        .fold(StaticIndex::default(), |index, (name, version, requires)| {
            let release = StaticRelease::new(Version::from_str(version).unwrap())
                .with_requires_dist(
                    requires
                        .iter()
                        .map(|requirement| Requirement::from_str(requirement).unwrap()),
                );
            index.with_release(
                IndexUrl::pypi(),
                PackageName::from_str(name).unwrap(),
                release,
            )
        });
    repository_from(index)
}

pub(crate) fn repository_from(index: StaticIndex) -> IndexRepository<StaticIndex> {
    IndexRepository::new(
        index,
        IndexLocations::default(),
        RepositoryOptions::default().with_retry(RetryPolicy::none()),
    )
}

/// CPython on Linux, for every Python from 3.8 on.
pub(crate) fn linux() -> Target {
    Target::new(VersionSpecifiers::from_str(">=3.8").unwrap())
        .with_platform(Some(Platform::Linux))
        .with_implementation(Some(Implementation::CPython))
}

pub(crate) fn windows() -> Target {
    Target::new(VersionSpecifiers::from_str(">=3.8").unwrap())
        .with_platform(Some(Platform::Windows))
        .with_implementation(Some(Implementation::CPython))
}

/// A concrete interpreter.
pub(crate) fn environment(sys_platform: &str, platform_system: &str) -> MarkerEnvironment {
    MarkerEnvironment {
        implementation_name: "cpython".to_string(),
        implementation_version: Version::from_str("3.12.1").unwrap(),
        os_name: if sys_platform == "win32" { "nt" } else { "posix" }.to_string(),
        platform_machine: "x86_64".to_string(),
        platform_python_implementation: "CPython".to_string(),
        platform_release: String::new(),
        platform_system: platform_system.to_string(),
        platform_version: String::new(),
        python_full_version: Version::from_str("3.12.1").unwrap(),
        python_version: Version::from_str("3.12").unwrap(),
        sys_platform: sys_platform.to_string(),
    }
}

pub(crate) async fn resolve_for(
    requirements: &[&str],
    target: &Target,
    config: &ResolverConfig,
    prior_lock: Option<&Lock>,
) -> Result<Resolution, ResolveError> {
    resolve_in(&repository(), requirements, target, config, prior_lock).await
}

pub(crate) async fn resolve_in(
    repository: &IndexRepository<StaticIndex>,
    requirements: &[&str],
    target: &Target,
    config: &ResolverConfig,
    prior_lock: Option<&Lock>,
) -> Result<Resolution, ResolveError> {
    let manifest = Manifest::parse(requirements.iter().copied()).unwrap();
    resolve(&manifest, target, config, prior_lock, repository).await
}

/// The resolved packages as `name==version`.
pub(crate) fn pinned(resolution: &Resolution) -> Vec<String> {
    resolution
        .versions()
        .into_iter()
        .map(|(name, version)| format!("{name}=={version}"))
        .collect()
}

use std::str::FromStr;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use lockstep_client::StaticIndex;
use lockstep_distribution_types::Target;
use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::{Version, VersionSpecifiers};
use lockstep_repository::IndexRepository;
use lockstep_resolver::{
    Lock, Manifest, PrereleaseMode, ResolutionMode, ResolveError, Resolver, ResolverConfig,
    StrategyFlags, Upgrade, UpgradeMode,
};

use crate::common::{
    environment, linux, pinned, repository, resolve_for, resolve_in, universe, windows,
};

fn name(name: &str) -> PackageName {
    PackageName::from_str(name).unwrap()
}

#[tokio::test]
async fn highest() -> Result<()> {
    let resolution = resolve_for(&["flask"], &linux(), &ResolverConfig::default(), None).await?;
    insta::assert_snapshot!(resolution, @r"
    flask==3.0.0
        # via the project
    werkzeug==3.0.0
        # via flask
    ");
    assert!(resolution.get(&name("flask")).unwrap().direct);
    assert!(!resolution.get(&name("werkzeug")).unwrap().direct);
    Ok(())
}

#[tokio::test]
async fn lowest() -> Result<()> {
    let config = ResolverConfig::builder()
        .resolution_mode(ResolutionMode::Lowest)
        .build();
    let resolution = resolve_for(&["flask"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["flask==2.0.0", "werkzeug==2.0.0"]);
    Ok(())
}

#[tokio::test]
async fn lowest_direct() -> Result<()> {
    let config = ResolverConfig::builder()
        .resolution_mode(ResolutionMode::LowestDirect)
        .build();
    let resolution = resolve_for(&["flask"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["flask==2.0.0", "werkzeug==3.0.0"]);
    Ok(())
}

/// Every selected version satisfies every requirement on it.
#[tokio::test]
async fn constraints_hold() -> Result<()> {
    let resolution = resolve_for(
        &["flask", "werkzeug<3"],
        &linux(),
        &ResolverConfig::default(),
        None,
    )
    .await?;
    assert_eq!(pinned(&resolution), ["flask==2.0.0", "werkzeug==2.0.0"]);

    for package in resolution.packages() {
        for (dependency, edge) in resolution.dependencies(package.name()) {
            assert!(edge.requirement.contains(dependency.version()));
        }
    }
    Ok(())
}

#[tokio::test]
async fn requires_python_excludes_newer_releases() -> Result<()> {
    let target = Target::new(VersionSpecifiers::from_str(">=3.7")?);
    let resolution = resolve_for(&["flask"], &target, &ResolverConfig::default(), None).await?;
    assert_eq!(pinned(&resolution), ["flask==2.0.0", "werkzeug==3.0.0"]);
    Ok(())
}

#[tokio::test]
async fn deterministic() -> Result<()> {
    let requirements = ["flask", "click", "requests[socks]"];
    let config = ResolverConfig::default();
    let first = resolve_for(&requirements, &linux(), &config, None).await?;
    let second = resolve_for(&requirements, &linux(), &config, None).await?;
    assert_eq!(first.to_string(), second.to_string());

    let config = ResolverConfig::builder().concurrency(1).build();
    let sequential = resolve_for(&requirements, &linux(), &config, None).await?;
    assert_eq!(first.to_string(), sequential.to_string());
    Ok(())
}

#[tokio::test]
async fn markers_decided_by_the_target() -> Result<()> {
    let config = ResolverConfig::default();

    let resolution = resolve_for(&["click"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["click==8.1.7"]);

    let resolution = resolve_for(&["click"], &windows(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["click==8.1.7", "colorama==0.4.6"]);
    assert!(resolution.get(&name("colorama")).unwrap().marker.is_true());

    let target = Target::from_environment(environment("win32", "Windows"));
    let resolution = resolve_for(&["click"], &target, &config, None).await?;
    assert_eq!(pinned(&resolution), ["click==8.1.7", "colorama==0.4.6"]);
    Ok(())
}

#[tokio::test]
async fn sys_platform_markers() -> Result<()> {
    let config = ResolverConfig::default();

    let resolution = resolve_for(&["pytest"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["iniconfig==2.0.0", "pytest==8.0.0"]);

    let resolution = resolve_for(&["pytest"], &windows(), &config, None).await?;
    assert_eq!(
        pinned(&resolution),
        ["colorama==0.4.6", "iniconfig==2.0.0", "pytest==8.0.0"]
    );
    assert!(resolution.get(&name("colorama")).unwrap().marker.is_true());
    Ok(())
}

#[tokio::test]
async fn markers_kept_across_platforms() -> Result<()> {
    let target = Target::new(VersionSpecifiers::from_str(">=3.8")?);
    let resolution = resolve_for(&["click"], &target, &ResolverConfig::default(), None).await?;
    insta::assert_snapshot!(resolution, @r#"
    click==8.1.7
        # via the project
    colorama==0.4.6 ; platform_system == "Windows"
        # via click
    "#);
    Ok(())
}

#[tokio::test]
async fn extras() -> Result<()> {
    let config = ResolverConfig::default();

    let resolution = resolve_for(&["requests"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["idna==3.7", "requests==2.31.0"]);

    let resolution = resolve_for(&["requests[socks]"], &linux(), &config, None).await?;
    assert_eq!(
        pinned(&resolution),
        ["idna==3.7", "pysocks==1.7.1", "requests==2.31.0"]
    );
    let socks = ExtraName::from_str("socks")?;
    let requests = resolution.get(&name("requests")).unwrap();
    assert!(requests.extras.contains(&socks));
    let extra = resolution
        .dependencies(&name("requests"))
        .find(|(dependency, _)| dependency.name().as_ref() == "pysocks")
        .map(|(_, edge)| edge.extra.clone());
    assert_eq!(extra, Some(Some(socks)));
    Ok(())
}

#[tokio::test]
async fn prereleases() -> Result<()> {
    let config = ResolverConfig::default();
    let resolution = resolve_for(&["pydantic"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["pydantic==2.0.0"]);

    let resolution = resolve_for(&["pydantic>=2.1.0b1"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["pydantic==2.1.0b1"]);

    let config = ResolverConfig::builder()
        .prerelease_mode(PrereleaseMode::Allow)
        .build();
    let resolution = resolve_for(&["pydantic"], &linux(), &config, None).await?;
    assert_eq!(pinned(&resolution), ["pydantic==2.1.0b1"]);
    Ok(())
}

#[tokio::test]
async fn prior_lock_is_preferred() -> Result<()> {
    let manifest = Manifest::parse(["flask"])?;
    let lowest = ResolverConfig::builder()
        .resolution_mode(ResolutionMode::Lowest)
        .build();
    let resolution = resolve_for(&["flask"], &linux(), &lowest, None).await?;
    let lock = Lock::from_resolution(
        &resolution,
        StrategyFlags::new(&lowest, &linux()),
        manifest.content_hash(),
    );

    let config = ResolverConfig::default();
    let resolution = resolve_for(&["flask"], &linux(), &config, Some(&lock)).await?;
    assert_eq!(pinned(&resolution), ["flask==2.0.0", "werkzeug==2.0.0"]);

    // Upgrading a dependency leaves its parent locked.
    let config = ResolverConfig::builder()
        .upgrade(Upgrade::packages(UpgradeMode::Reuse, [name("werkzeug")]))
        .build();
    let resolution = resolve_for(&["flask"], &linux(), &config, Some(&lock)).await?;
    assert_eq!(pinned(&resolution), ["flask==2.0.0", "werkzeug==3.0.0"]);

    // Upgrading a package eagerly also upgrades what it depends on.
    let config = ResolverConfig::builder()
        .upgrade(Upgrade::packages(UpgradeMode::Eager, [name("flask")]))
        .build();
    let resolution = resolve_for(&["flask"], &linux(), &config, Some(&lock)).await?;
    assert_eq!(pinned(&resolution), ["flask==3.0.0", "werkzeug==3.0.0"]);

    let config = ResolverConfig::builder().upgrade(Upgrade::all()).build();
    let resolution = resolve_for(&["flask"], &linux(), &config, Some(&lock)).await?;
    assert_eq!(pinned(&resolution), ["flask==3.0.0", "werkzeug==3.0.0"]);
    Ok(())
}

/// Changing the requirements keeps the locked versions of the packages they don't touch.
#[tokio::test]
async fn prior_lock_survives_new_requirements() -> Result<()> {
    let manifest = Manifest::parse(["flask"])?;
    let config = ResolverConfig::builder()
        .resolution_mode(ResolutionMode::Lowest)
        .build();
    let resolution = resolve_for(&["flask"], &linux(), &config, None).await?;
    let lock = Lock::from_resolution(
        &resolution,
        StrategyFlags::new(&config, &linux()),
        manifest.content_hash(),
    );

    let resolution = resolve_for(
        &["flask==2.0.0", "click"],
        &linux(),
        &ResolverConfig::default(),
        Some(&lock),
    )
    .await?;
    assert_eq!(
        pinned(&resolution),
        ["click==8.1.7", "flask==2.0.0", "werkzeug==2.0.0"]
    );
    Ok(())
}

/// A locked version the requirements no longer allow is replaced.
#[tokio::test]
async fn prior_lock_yields_to_requirements() -> Result<()> {
    let manifest = Manifest::parse(["flask"])?;
    let config = ResolverConfig::builder()
        .resolution_mode(ResolutionMode::Lowest)
        .build();
    let resolution = resolve_for(&["flask"], &linux(), &config, None).await?;
    let lock = Lock::from_resolution(
        &resolution,
        StrategyFlags::new(&config, &linux()),
        manifest.content_hash(),
    );

    let resolution = resolve_for(
        &["flask>=3"],
        &linux(),
        &ResolverConfig::default(),
        Some(&lock),
    )
    .await?;
    assert_eq!(pinned(&resolution), ["flask==3.0.0", "werkzeug==3.0.0"]);
    Ok(())
}

/// The newest `top-a` pins `base-c` to a version that `top-b` rejects, which only shows once
/// `base-c` is selected.
#[tokio::test]
async fn backtracks_to_an_older_version() -> Result<()> {
    let repository = universe(&[
        ("top-a", "1.0", &["base-c>=1"]),
        ("top-a", "2.0", &["base-c==1"]),
        ("top-b", "1.0", &["base-c>=2"]),
        ("top-b", "1.1", &["base-c>=2"]),
        ("base-c", "1.0", &[]),
        ("base-c", "2.0", &[]),
    ]);
    let resolution = resolve_in(
        &repository,
        &["top-a", "top-b"],
        &linux(),
        &ResolverConfig::default(),
        None,
    )
    .await?;
    assert_eq!(
        pinned(&resolution),
        ["base-c==2.0", "top-a==1.0", "top-b==1.1"]
    );
    Ok(())
}

/// Packages unlocked by an eagerly upgraded version are locked again once that version is
/// abandoned.
#[tokio::test]
async fn eager_unlocking_is_undone_by_backtracking() -> Result<()> {
    let repository = universe(&[
        ("app-x", "1.0", &[]),
        ("app-x", "2.0", &["lib-y", "lib-w>=2"]),
        ("lib-y", "1.0", &[]),
        ("lib-y", "2.0", &[]),
        ("lib-v", "1.0", &["lib-w<2"]),
        ("lib-v", "2.0", &["lib-w<2"]),
        ("lib-w", "1.0", &[]),
        ("lib-w", "2.0", &[]),
    ]);
    let requirements = ["app-x", "lib-y", "lib-v"];
    let lowest = ResolverConfig::builder()
        .resolution_mode(ResolutionMode::Lowest)
        .build();
    let resolution = resolve_in(&repository, &requirements, &linux(), &lowest, None).await?;
    let lock = Lock::from_resolution(
        &resolution,
        StrategyFlags::new(&lowest, &linux()),
        Manifest::parse(requirements)?.content_hash(),
    );

    let config = ResolverConfig::builder()
        .upgrade(Upgrade::packages(UpgradeMode::Eager, [name("app-x")]))
        .build();
    let resolution = resolve_in(&repository, &requirements, &linux(), &config, Some(&lock)).await?;
    assert_eq!(
        pinned(&resolution),
        ["app-x==1.0", "lib-v==1.0", "lib-w==1.0", "lib-y==1.0"]
    );
    Ok(())
}

/// Every version of `ring-a` excludes itself through `ring-b` and `ring-c`.
#[tokio::test]
async fn exhausted_search_is_a_conflict() {
    let repository = universe(&[
        ("ring-a", "1.0", &["ring-b==1.0"]),
        ("ring-a", "2.0", &["ring-b==2.0"]),
        ("ring-b", "1.0", &["ring-c==1.0"]),
        ("ring-b", "2.0", &["ring-c==2.0"]),
        ("ring-c", "1.0", &["ring-a!=1.0"]),
        ("ring-c", "2.0", &["ring-a!=2.0"]),
    ]);
    let err = resolve_in(
        &repository,
        &["ring-a"],
        &linux(),
        &ResolverConfig::default(),
        None,
    )
    .await
    .unwrap_err();
    let ResolveError::ResolutionConflict(conflict) = &err else {
        panic!("expected a conflict, found {err:?}");
    };
    assert_eq!(conflict.package().as_ref(), "ring-a");
    assert_eq!(
        conflict.contributors(),
        [name("ring-a"), name("ring-b"), name("ring-c")]
            .into_iter()
            .collect()
    );
    let message = err.to_string();
    assert!(message.contains("ring-c==1.0 requires ring-a!=1.0"), "{message}");
    assert!(message.contains("ring-c==2.0 requires ring-a!=2.0"), "{message}");
}

const NAMES: [&str; 5] = ["pa", "pb", "pc", "pd", "pe"];
const SPECIFIERS: [&str; 8] = ["", ">=2", "<2", "==1", "==3", "!=2", ">=3", "<3"];

/// Deterministic pseudo-random numbers.
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        usize::try_from((self.0 >> 33) % u64::try_from(bound).unwrap()).unwrap()
    }
}

/// Five packages with versions 1 to 3, each version requiring one or two of the others.
struct SmallUniverse {
    roots: Vec<(usize, &'static str)>,
    /// The requirements of each package, by version.
    requires: [[Vec<(usize, &'static str)>; 3]; 5],
}

impl SmallUniverse {
    fn generate(seed: u64) -> Self {
        let mut rng = Lcg(seed);
        let requires: [[Vec<(usize, &'static str)>; 3]; 5] = std::array::from_fn(|package| {
            std::array::from_fn(|_| {
                let count = rng.below(2) + 1;
                (0..count)
                    .map(|_| {
                        let dependency = (package + 1 + rng.below(4)) % NAMES.len();
                        (dependency, SPECIFIERS[rng.below(SPECIFIERS.len())])
                    })
                    .collect()
            })
        });
        let mut roots = vec![(0, "")];
        if rng.below(2) == 1 {
            roots.push((1, SPECIFIERS[rng.below(SPECIFIERS.len())]));
        }
        Self { roots, requires }
    }

    fn roots(&self) -> Vec<String> {
        self.roots
            .iter()
            .map(|(package, specifier)| format!("{}{specifier}", NAMES[*package]))
            .collect()
    }

    fn repository(&self) -> IndexRepository<StaticIndex> {
        let mut releases = Vec::new();
        for (package, versions) in self.requires.iter().enumerate() {
            for (index, requires) in versions.iter().enumerate() {
                let requires: Vec<String> = requires
                    .iter()
                    .map(|(dependency, specifier)| format!("{}{specifier}", NAMES[*dependency]))
                    .collect();
                releases.push((NAMES[package], (index + 1).to_string(), requires));
            }
        }
        let requires: Vec<Vec<&str>> = releases
            .iter()
            .map(|(_, _, requires)| requires.iter().map(String::as_str).collect())
            .collect();
        let releases: Vec<(&str, &str, &[&str])> = releases
            .iter()
            .zip(&requires)
            .map(|((name, version, _), requires)| (*name, version.as_str(), requires.as_slice()))
            .collect();
        universe(&releases)
    }

    /// Whether choosing `version_of` for each package satisfies the project and every chosen
    /// version.
    fn satisfied(&self, version_of: impl Fn(usize) -> Option<usize>) -> bool {
        let holds = |(package, specifier): &(usize, &str)| {
            version_of(*package).is_some_and(|version| {
                VersionSpecifiers::from_str(specifier)
                    .unwrap()
                    .contains(&Version::from_str(&version.to_string()).unwrap())
            })
        };
        self.roots.iter().all(holds)
            && (0..NAMES.len()).all(|package| {
                version_of(package)
                    .is_none_or(|version| self.requires[package][version - 1].iter().all(holds))
            })
    }

    /// Whether any choice of at most one version per package is satisfying.
    fn satisfiable(&self) -> bool {
        (0..4usize.pow(5)).any(|code| {
            let choice: [usize; 5] = std::array::from_fn(|package| {
                code / 4usize.pow(u32::try_from(package).unwrap()) % 4
            });
            self.satisfied(|package| (choice[package] != 0).then_some(choice[package]))
        })
    }
}

/// The resolver finds a solution exactly when one exists, and reports a conflict otherwise.
#[tokio::test]
async fn small_universes_agree_with_exhaustive_search() -> Result<()> {
    let config = ResolverConfig::default();
    for seed in 0..300 {
        let small = SmallUniverse::generate(seed);
        let roots = small.roots();
        let roots: Vec<&str> = roots.iter().map(String::as_str).collect();
        match resolve_in(&small.repository(), &roots, &linux(), &config, None).await {
            Ok(resolution) => {
                let versions = resolution.versions();
                let version_of = |package: usize| {
                    versions
                        .get(&name(NAMES[package]))
                        .map(|version| version.to_string().parse::<usize>().unwrap())
                };
                assert!(small.satisfied(version_of), "seed {seed}: {resolution}");
            }
            Err(ResolveError::ResolutionConflict(_)) => {
                assert!(!small.satisfiable(), "seed {seed}: missed a solution");
            }
            Err(err) => panic!("seed {seed}: {err}"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn contradictory_requirements() {
    let err = resolve_for(
        &["flask>=2", "flask<2"],
        &linux(),
        &ResolverConfig::default(),
        None,
    )
    .await
    .unwrap_err();
    let ResolveError::ResolutionConflict(conflict) = &err else {
        panic!("expected a conflict, found {err:?}");
    };
    assert_eq!(conflict.package().as_ref(), "flask");
    insta::assert_snapshot!(err, @r"
    No solution found when resolving dependencies:
      Because the project requires flask>=2 and the project requires flask<2, no version of flask satisfies all requirements.
    ");
}

#[tokio::test]
async fn conflicting_dependencies() {
    let err = resolve_for(
        &["pkg-a", "pkg-b"],
        &linux(),
        &ResolverConfig::default(),
        None,
    )
    .await
    .unwrap_err();
    let ResolveError::ResolutionConflict(conflict) = &err else {
        panic!("expected a conflict, found {err:?}");
    };
    assert_eq!(
        conflict.contributors(),
        [name("pkg-a"), name("pkg-b")].into_iter().collect()
    );
    let message = err.to_string();
    assert!(message.contains("pkg-a==1.0 requires shared<2"), "{message}");
    assert!(message.contains("pkg-b==1.0 requires shared>=2"), "{message}");
}

#[tokio::test]
async fn missing_package() {
    let err = resolve_for(&["missing"], &linux(), &ResolverConfig::default(), None)
        .await
        .unwrap_err();
    let ResolveError::CandidateUnavailable { package, chain, .. } = &err else {
        panic!("expected an unavailable package, found {err:?}");
    };
    assert_eq!(package.as_ref(), "missing");
    assert!(chain.is_empty());
}

#[tokio::test]
async fn missing_transitive_package() {
    let err = resolve_for(&["app"], &linux(), &ResolverConfig::default(), None)
        .await
        .unwrap_err();
    let ResolveError::CandidateUnavailable { package, .. } = &err else {
        panic!("expected an unavailable package, found {err:?}");
    };
    assert_eq!(package.as_ref(), "ghost");
    let message = err.to_string();
    assert!(
        message.ends_with("(required by the project -> app==1.0)"),
        "{message}"
    );
}

#[tokio::test]
async fn too_deep() {
    let config = ResolverConfig::builder().max_rounds(1).build();
    let err = resolve_for(&["flask"], &linux(), &config, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::ResolutionTooDeep { max_rounds: 1 }
    ));
}

#[tokio::test]
async fn cancelled() -> Result<()> {
    let manifest = Manifest::parse(["flask"])?;
    let target = linux();
    let config = ResolverConfig::default();
    let repository = repository();

    let cancellation = CancellationToken::new();
    cancellation.cancel();
    let err = Resolver::new(&manifest, &target, &config, None, &repository)
        .with_cancellation(cancellation)
        .resolve()
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled));
    Ok(())
}

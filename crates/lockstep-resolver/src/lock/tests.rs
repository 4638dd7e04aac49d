use std::str::FromStr;

use indoc::indoc;

use super::*;

fn name(name: &str) -> PackageName {
    PackageName::from_str(name).unwrap()
}

fn linux() -> Target {
    Target::new(VersionSpecifiers::from_str(">=3.8").unwrap())
        .with_platform(Some(Platform::Linux))
        .with_implementation(Some(Implementation::CPython))
}

fn windows() -> Target {
    Target::new(VersionSpecifiers::from_str(">=3.8").unwrap())
        .with_platform(Some(Platform::Windows))
}

fn lock() -> Lock {
    Lock {
        version: VERSION,
        content_hash: content_hash(&[Requirement::from_str("flask>=2").unwrap()]),
        strategy: StrategyFlags::default(),
        targets: vec![linux(), windows()],
        packages: vec![
            Package {
                name: name("colorama"),
                version: Version::from_str("0.4.6").unwrap(),
                source: CandidateSource::Registry {
                    index: IndexUrl::pypi(),
                },
                marker: MarkerTree::from_str("sys_platform == 'win32'").unwrap(),
                targets: BTreeSet::from([1]),
                files: vec![LockedFile {
                    location: FileLocation::Filename(
                        "colorama-0.4.6-py2.py3-none-any.whl".to_string(),
                    ),
                    hash: Some(HashDigest::sha256("4f1d9991f5acc0ca119f9d443620b77f")),
                }],
                dependencies: Vec::new(),
            },
            Package {
                name: name("flask"),
                version: Version::from_str("3.0.0").unwrap(),
                source: CandidateSource::Git {
                    url: Url::parse("https://github.com/pallets/flask").unwrap(),
                    rev: Some("4f2a1c9".to_string()),
                },
                marker: MarkerTree::TRUE,
                targets: BTreeSet::from([0, 1]),
                files: Vec::new(),
                dependencies: vec![
                    LockedDependency {
                        name: name("colorama"),
                        specifier: None,
                        marker: MarkerTree::from_str("sys_platform == 'win32'").unwrap(),
                        extra: None,
                    },
                    LockedDependency {
                        name: name("werkzeug"),
                        specifier: Some(VersionSpecifiers::from_str(">=3.0.0").unwrap()),
                        marker: MarkerTree::TRUE,
                        extra: None,
                    },
                ],
            },
            Package {
                name: name("werkzeug"),
                version: Version::from_str("3.0.0").unwrap(),
                source: CandidateSource::Registry {
                    index: IndexUrl::pypi(),
                },
                marker: MarkerTree::TRUE,
                targets: BTreeSet::from([0, 1]),
                files: vec![
                    LockedFile {
                        location: FileLocation::Filename(
                            "werkzeug-3.0.0-py3-none-any.whl".to_string(),
                        ),
                        hash: Some(HashDigest::sha256("cbb2600f7eabe51dbc0502f58be0b3e1")),
                    },
                    LockedFile {
                        location: FileLocation::Url(
                            Url::parse("https://files.example.com/werkzeug-3.0.0.tar.gz")
                                .unwrap(),
                        ),
                        hash: None,
                    },
                ],
                dependencies: Vec::new(),
            },
        ],
    }
}

fn environment(sys_platform: &str, python: &str) -> MarkerEnvironment {
    MarkerEnvironment {
        implementation_name: "cpython".to_string(),
        implementation_version: Version::from_str(python).unwrap(),
        os_name: "posix".to_string(),
        platform_machine: "x86_64".to_string(),
        platform_python_implementation: "CPython".to_string(),
        platform_release: String::new(),
        platform_system: String::new(),
        platform_version: String::new(),
        python_full_version: Version::from_str(python).unwrap(),
        python_version: Version::from_str(python).unwrap().only_release(),
        sys_platform: sys_platform.to_string(),
    }
}

#[test]
fn round_trip() {
    let lock = lock();
    let toml = lock.to_toml();
    let parsed = Lock::from_toml(&toml).unwrap();
    assert_eq!(parsed, lock);
    assert_eq!(parsed.pins(&linux()), lock.pins(&linux()));
    assert_eq!(parsed.to_toml(), toml);
}

#[test]
fn format() {
    let toml = lock().to_toml();
    assert!(toml.starts_with("version = 1\ncontent-hash = \"sha256:"));
    assert!(toml.contains("[strategy]\ncross-platform = true\n"));
    assert!(toml.contains("[[target]]\nrequires-python = \">=3.8\"\nplatform = \"linux\"\n"));
    assert!(toml.contains(
        r#"source = { git = "https://github.com/pallets/flask", rev = "4f2a1c9" }"#
    ));
    assert!(
        toml.lines()
            .any(|line| line.starts_with("marker = ") && line.contains("sys_platform == "))
    );
    assert!(toml.contains(
        "\n    { file = \"werkzeug-3.0.0-py3-none-any.whl\", hash = \"sha256:cbb2600f7eabe51dbc0502f58be0b3e1\" },"
    ));
    assert!(toml.contains(r#"{ url = "https://files.example.com/werkzeug-3.0.0.tar.gz" }"#));
    assert!(toml.contains(r#"{ name = "werkzeug", specifier = ">=3.0.0" }"#));
}

#[test]
fn parse() {
    let lock = Lock::from_toml(indoc! {r#"
        version = 1
        content-hash = "sha256:00"

        [[target]]
        requires-python = ">=3.9"

        [[package]]
        name = "Markup_Safe"
        version = "2.1.5"
        targets = [0]
        source = { registry = "https://pypi.org/simple" }
        files = [{ file = "MarkupSafe-2.1.5.tar.gz" }]
    "#})
    .unwrap();

    // Missing strategy flags take their defaults.
    assert_eq!(*lock.strategy(), StrategyFlags::default());
    let package = &lock.packages()[0];
    assert_eq!(package.name().as_ref(), "markup-safe");
    assert!(package.marker().is_true());
    assert_eq!(lock.targets()[0].platform(), None);
}

#[test]
fn unsupported_version() {
    let err = Lock::from_toml(indoc! {r#"
        version = 2
        content-hash = "sha256:00"
        something-new = true
    "#})
    .unwrap_err();
    assert!(err.is_format());
    insta::assert_snapshot!(err, @"Unsupported lock file version 2 (expected version 1)");
}

#[test]
fn malformed() {
    let err = Lock::from_toml("version = 1\ncontent-hash = 3\n").unwrap_err();
    assert!(matches!(err.kind(), LockErrorKind::Format(_)));

    let err = Lock::from_toml(indoc! {r#"
        version = 1
        content-hash = "sha256:00"

        [[target]]
        requires-python = ">=3.9"

        [[package]]
        name = "flask"
        version = "3.0.0"
        targets = [1]
        source = { registry = "https://pypi.org/simple" }
    "#})
    .unwrap_err();
    insta::assert_snapshot!(err, @"Invalid lock file: package `flask` refers to target 1, but the lock has 1 targets");

    let err = Lock::from_toml(indoc! {r#"
        version = 1
        content-hash = "sha256:00"

        [[target]]
        requires-python = ">=3.9"

        [[package]]
        name = "flask"
        version = "3.0.0"
        targets = [0]
        source = { registry = "https://pypi.org/simple", path = "./flask" }
    "#})
    .unwrap_err();
    assert!(err.is_format());
}

#[test]
fn staleness() {
    let lock = lock();
    let same = [Requirement::from_str("Flask >= 2").unwrap()];
    assert!(!lock.is_stale(&same));
    let changed = [Requirement::from_str("flask>=3").unwrap()];
    assert!(lock.is_stale(&changed));

    let first = [
        Requirement::from_str("flask").unwrap(),
        Requirement::from_str("requests").unwrap(),
    ];
    let second = [first[1].clone(), first[0].clone(), first[1].clone()];
    assert_eq!(content_hash(&first), content_hash(&second));
}

#[test]
fn preferences() {
    let lock = lock();
    let preferences = lock.preferences(&linux());
    assert_eq!(preferences.len(), 2);
    assert_eq!(
        preferences.version(&name("werkzeug")),
        Some(&Version::from_str("3.0.0").unwrap())
    );
    assert_eq!(
        preferences.get(&name("flask")).unwrap().dependencies(),
        [name("colorama"), name("werkzeug")]
    );
    assert_eq!(preferences.version(&name("colorama")), None);
}

#[test]
fn packages_for_environment() {
    let lock = lock();

    let names = |environment: &MarkerEnvironment| {
        lock.packages_for(environment)
            .into_iter()
            .map(|package| package.name().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&environment("linux", "3.12.1")), ["flask", "werkzeug"]);
    assert_eq!(
        names(&environment("win32", "3.12.1")),
        ["colorama", "flask", "werkzeug"]
    );
    assert!(names(&environment("linux", "3.7.9")).is_empty());
}

#[test]
fn read_prior() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lockstep.lock");
    assert!(Lock::read_prior(&path).is_none());

    lock().write(&path)?;
    assert_eq!(Lock::read_prior(&path), Some(lock()));

    fs_err::write(&path, "version = 7\n")?;
    assert!(Lock::read(&path).unwrap_err().is_format());
    assert!(Lock::read_prior(&path).is_none());
    Ok(())
}

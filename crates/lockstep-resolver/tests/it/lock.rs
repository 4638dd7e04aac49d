use anyhow::Result;
use indoc::indoc;
use url::Url;

use lockstep_distribution_types::Target;
use lockstep_resolver::{
    FileLocation, Lock, LockErrorKind, Manifest, MergeMode, ResolverConfig, StrategyFlags, merge,
};

use crate::common::{environment, linux, resolve_for, windows};

async fn lock_for(requirements: &[&str], target: &Target) -> Result<Lock> {
    let manifest = Manifest::parse(requirements.iter().copied())?;
    let config = ResolverConfig::default();
    let resolution = resolve_for(requirements, target, &config, None).await?;
    Ok(Lock::from_resolution(
        &resolution,
        StrategyFlags::new(&config, target),
        manifest.content_hash(),
    ))
}

fn entries(lock: &Lock) -> Vec<String> {
    lock.packages()
        .iter()
        .map(|package| {
            format!(
                "{}=={} {:?}",
                package.name(),
                package.version(),
                package.targets()
            )
        })
        .collect()
}

/// Locking again with the lock as input changes nothing.
#[tokio::test]
async fn relock_is_idempotent() -> Result<()> {
    let requirements = ["flask", "click", "requests[socks]"];
    let first = lock_for(&requirements, &linux()).await?;

    let manifest = Manifest::parse(requirements)?;
    let config = ResolverConfig::default();
    let parsed = Lock::from_toml(&first.to_toml())?;
    let resolution = resolve_for(&requirements, &linux(), &config, Some(&parsed)).await?;
    let second = Lock::from_resolution(
        &resolution,
        StrategyFlags::new(&config, &linux()),
        manifest.content_hash(),
    );
    assert_eq!(first.to_toml(), second.to_toml());
    Ok(())
}

/// What the lock file records is what the resolution selected.
#[tokio::test]
async fn pins_survive_the_lock_file() -> Result<()> {
    let config = ResolverConfig::default();
    let resolution = resolve_for(&["flask", "click"], &linux(), &config, None).await?;

    for flags in [
        StrategyFlags::new(&config, &linux()),
        StrategyFlags::new(&config, &linux()).with_static_urls(true),
    ] {
        let lock = Lock::from_resolution(&resolution, flags, "sha256:00".to_string());
        let parsed = Lock::from_toml(&lock.to_toml())?;
        assert_eq!(parsed.pins(&linux()), Some(resolution.pins(&flags)));
    }
    Ok(())
}

#[tokio::test]
async fn lock_format() -> Result<()> {
    let lock = lock_for(&["flask"], &linux()).await?;
    let toml = lock.to_toml();
    assert!(toml.contains(indoc! {r#"
        [[target]]
        requires-python = ">=3.8"
        platform = "linux"
        implementation = "cpython"
    "#}));
    assert!(toml.contains("name = \"werkzeug\"\nversion = \"3.0.0\"\ntargets = [0]\n"));
    assert!(toml.contains("{ file = \"werkzeug-3.0.0-py3-none-any.whl\", hash = \"sha256:"));
    assert!(toml.contains("{ name = \"werkzeug\", specifier = \">=3.0\" }"));

    let config = ResolverConfig::default();
    let resolution = resolve_for(&["flask"], &linux(), &config, None).await?;
    let flags = StrategyFlags::new(&config, &linux())
        .with_static_urls(true)
        .with_inherit_metadata(false);
    let lock = Lock::from_resolution(&resolution, flags, "sha256:00".to_string());
    let flask = &lock.packages()[0];
    assert!(flask.dependencies().is_empty());
    assert_eq!(
        flask.files()[0].location,
        FileLocation::Url(Url::parse(
            "https://pypi.org/simple/flask/flask-3.0.0-py3-none-any.whl"
        )?)
    );
    Ok(())
}

#[tokio::test]
async fn staleness() -> Result<()> {
    let lock = lock_for(&["flask", "click"], &linux()).await?;
    assert!(!lock.is_stale(Manifest::parse(["click", "Flask"])?.requirements()));
    assert!(lock.is_stale(Manifest::parse(["flask>=3", "click"])?.requirements()));
    Ok(())
}

#[tokio::test]
async fn append_targets() -> Result<()> {
    let linux_lock = lock_for(&["click"], &linux()).await?;
    let windows_lock = lock_for(&["click"], &windows()).await?;

    let merged = merge(Some(&linux_lock), windows_lock, MergeMode::Append)?;
    assert_eq!(merged.targets(), [linux(), windows()]);
    assert_eq!(
        entries(&merged),
        ["click==8.1.7 {0, 1}", "colorama==0.4.6 {1}"]
    );

    let install = |sys_platform: &str, platform_system: &str| {
        merged
            .packages_for(&environment(sys_platform, platform_system))
            .into_iter()
            .map(|package| package.name().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(install("linux", "Linux"), ["click"]);
    assert_eq!(install("win32", "Windows"), ["click", "colorama"]);
    assert!(install("darwin", "Darwin").is_empty());

    // Appending to an unchanged target replaces it rather than adding it again.
    let again = merge(
        Some(&merged),
        lock_for(&["click"], &linux()).await?,
        MergeMode::Append,
    )?;
    assert_eq!(again, merged);

    let parsed = Lock::from_toml(&merged.to_toml())?;
    assert_eq!(parsed, merged);
    Ok(())
}

#[tokio::test]
async fn append_requires_the_same_requirements() -> Result<()> {
    let existing = lock_for(&["click"], &linux()).await?;
    let new = lock_for(&["click", "flask"], &windows()).await?;
    let err = merge(Some(&existing), new.clone(), MergeMode::Append).unwrap_err();
    assert!(matches!(err.kind(), LockErrorKind::StaleAppend { .. }));

    assert_eq!(merge(Some(&existing), new.clone(), MergeMode::Overwrite)?, new);
    assert_eq!(merge(None, new.clone(), MergeMode::Append)?, new);
    Ok(())
}

use std::path::PathBuf;

use anstream::{eprintln, print};
use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::info;

use lockstep_client::StaticIndex;
use lockstep_distribution_types::{Implementation, IndexUrl, Platform, Target};
use lockstep_normalize::PackageName;
use lockstep_pep440::VersionSpecifiers;
use lockstep_repository::{
    BinaryPolicy, Index, IndexLocations, IndexRepository, PrereleaseMode, RepositoryOptions,
};
use lockstep_resolver::{
    Lock, Manifest, MergeMode, ResolutionMode, ResolverConfig, StrategyFlags, Upgrade,
    UpgradeMode, merge, resolve,
};

#[derive(Parser)]
pub(crate) struct LockArgs {
    /// The requirements to lock, e.g. `flask>=2` or `requests[socks]`.
    #[arg(required = true)]
    requirements: Vec<String>,
    /// A JSON snapshot of the package indexes to resolve against.
    #[arg(long)]
    index: PathBuf,
    /// The Python versions the lock must support.
    #[arg(long, default_value = ">=3.8")]
    python: VersionSpecifiers,
    /// Restrict the lock to one operating system family.
    #[arg(long)]
    platform: Option<Platform>,
    /// Restrict the lock to one Python implementation.
    #[arg(long)]
    implementation: Option<Implementation>,
    #[arg(long, value_enum, default_value_t = ResolutionMode::default())]
    resolution: ResolutionMode,
    #[arg(long, value_enum, default_value_t = PrereleaseMode::default())]
    prerelease: PrereleaseMode,
    #[arg(long, value_enum, default_value_t = BinaryPolicy::default())]
    binary: BinaryPolicy,
    /// The default index of the snapshot.
    #[arg(long, default_value_t = IndexUrl::pypi())]
    index_url: IndexUrl,
    /// Further indexes of the snapshot, in priority order.
    #[arg(long)]
    extra_index_url: Vec<IndexUrl>,
    /// Ignore the versions of the existing lock file.
    #[arg(long, short = 'U')]
    upgrade: bool,
    /// Ignore the locked version of a single package.
    #[arg(long, short = 'P')]
    upgrade_package: Vec<PackageName>,
    /// Also upgrade the dependencies of the packages named with `--upgrade-package`.
    #[arg(long)]
    eager: bool,
    /// Record files by URL rather than by filename.
    #[arg(long)]
    static_urls: bool,
    /// Don't record the dependencies of each package.
    #[arg(long)]
    no_inherit_metadata: bool,
    /// Add the target to the existing lock file instead of replacing it.
    #[arg(long)]
    append: bool,
    #[arg(long, short, default_value = "lockstep.lock")]
    output: PathBuf,
}

impl LockArgs {
    fn target(&self) -> Target {
        Target::new(self.python.clone())
            .with_platform(self.platform)
            .with_implementation(self.implementation)
    }

    fn upgrade(&self) -> Upgrade {
        if self.upgrade {
            Upgrade::all()
        } else if self.eager {
            Upgrade::packages(UpgradeMode::Eager, self.upgrade_package.iter().cloned())
        } else {
            Upgrade::packages(UpgradeMode::Reuse, self.upgrade_package.iter().cloned())
        }
    }

    fn index_locations(&self) -> IndexLocations {
        self.extra_index_url.iter().fold(
            IndexLocations::new(self.index_url.clone()),
            |locations, url| locations.with_extra(Index::new(url.clone())),
        )
    }
}

pub(crate) async fn lock(args: LockArgs) -> Result<()> {
    let manifest = Manifest::parse(args.requirements.iter().map(String::as_str))?;
    let target = args.target();
    let config = ResolverConfig::builder()
        .resolution_mode(args.resolution)
        .prerelease_mode(args.prerelease)
        .upgrade(args.upgrade())
        .build();

    let index = StaticIndex::read(&args.index)
        .with_context(|| format!("Failed to read the index snapshot `{}`", args.index.display()))?;
    let repository = IndexRepository::new(
        index,
        args.index_locations(),
        RepositoryOptions::default()
            .with_binary(args.binary)
            .with_prereleases(args.prerelease),
    );

    let existing = Lock::read_prior(&args.output);
    let resolution = resolve(&manifest, &target, &config, existing.as_ref(), &repository).await?;
    print!("{resolution}");

    let flags = StrategyFlags::new(&config, &target)
        .with_static_urls(args.static_urls)
        .with_inherit_metadata(!args.no_inherit_metadata);
    let mode = if args.append {
        MergeMode::Append
    } else {
        MergeMode::Overwrite
    };
    let lock = Lock::from_resolution(&resolution, flags, manifest.content_hash());
    let lock = merge(existing.as_ref(), lock, mode)?;
    lock.write(&args.output)?;

    info!(
        "Locked {} packages for {} targets",
        lock.packages().len(),
        lock.targets().len()
    );
    eprintln!(
        "{} {}",
        "Wrote".green().bold(),
        args.output.display().bold()
    );
    Ok(())
}

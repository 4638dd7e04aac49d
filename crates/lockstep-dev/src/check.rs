use std::path::PathBuf;

use anstream::println;
use anyhow::{Result, bail};
use clap::Parser;
use owo_colors::OwoColorize;

use lockstep_resolver::{Lock, Manifest};

#[derive(Parser)]
pub(crate) struct CheckArgs {
    /// The requirements the lock file should have been produced for.
    requirements: Vec<String>,
    #[arg(long, default_value = "lockstep.lock")]
    lock: PathBuf,
}

pub(crate) fn check(args: &CheckArgs) -> Result<()> {
    let manifest = Manifest::parse(args.requirements.iter().map(String::as_str))?;
    let lock = Lock::read(&args.lock)?;

    if lock.is_stale(manifest.requirements()) {
        bail!(
            "`{}` is out of date: it was locked for different requirements (content hash `{}`, expected `{}`)",
            args.lock.display(),
            lock.content_hash(),
            manifest.content_hash()
        );
    }

    println!(
        "{} `{}` is up to date for {} targets",
        "Fresh:".green().bold(),
        args.lock.display(),
        lock.targets().len()
    );
    for target in lock.targets() {
        println!("  {target}");
    }
    Ok(())
}

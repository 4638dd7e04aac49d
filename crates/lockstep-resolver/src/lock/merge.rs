use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Lock, LockError, LockErrorKind, Package};

/// How a new lock is combined with an existing one.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum MergeMode {
    /// Discard every target of the existing lock.
    #[default]
    Overwrite,
    /// Keep the existing targets, replacing the entries of any target the new lock covers.
    Append,
}

/// Combine `new` with the `existing` lock.
///
/// In append mode, a package locked at the same version, source and marker for several targets
/// shares one entry; differing versions are kept side by side, each for its own targets.
pub fn merge(existing: Option<&Lock>, new: Lock, mode: MergeMode) -> Result<Lock, LockError> {
    let Some(existing) = existing else {
        return Ok(new);
    };
    if mode == MergeMode::Overwrite {
        debug!("Replacing {} existing targets", existing.targets.len());
        return Ok(new);
    }

    if existing.content_hash != new.content_hash {
        return Err(LockErrorKind::StaleAppend {
            existing: existing.content_hash.clone(),
            new: new.content_hash,
        }
        .into());
    }
    if existing.strategy != new.strategy {
        return Err(LockErrorKind::StrategyMismatch {
            existing: existing.strategy,
            new: new.strategy,
        }
        .into());
    }

    let mut targets = existing.targets.clone();
    let mut packages = existing.packages.clone();

    // The index of each of the new lock's targets in the merged lock.
    let mut remap = Vec::with_capacity(new.targets.len());
    for target in &new.targets {
        let index = if let Some(index) = targets.iter().position(|existing| existing == target) {
            debug!("Replacing the entries of target `{target}`");
            for package in &mut packages {
                package.targets.remove(&index);
            }
            index
        } else {
            debug!("Adding target `{target}`");
            targets.push(target.clone());
            targets.len() - 1
        };
        remap.push(index);
    }
    packages.retain(|package| !package.targets.is_empty());

    for mut package in new.packages {
        package.targets = package
            .targets
            .iter()
            .filter_map(|index| remap.get(*index).copied())
            .collect();
        if let Some(existing) = packages
            .iter_mut()
            .find(|existing| existing.key() == package.key())
        {
            union(existing, package);
        } else {
            packages.push(package);
        }
    }
    packages.sort_by(|left, right| left.key().cmp(&right.key()));

    Ok(Lock {
        version: new.version,
        content_hash: new.content_hash,
        strategy: new.strategy,
        targets,
        packages,
    })
}

/// Merge the targets, files and dependencies of two entries for the same installation.
fn union(existing: &mut Package, package: Package) {
    existing.targets.extend(package.targets);
    for file in package.files {
        if !existing.files.contains(&file) {
            existing.files.push(file);
        }
    }
    for dependency in package.dependencies {
        if !existing.dependencies.contains(&dependency) {
            existing.dependencies.push(dependency);
        }
    }
}

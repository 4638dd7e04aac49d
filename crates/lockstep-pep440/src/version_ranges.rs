use crate::{Operator, Ranges, Version, VersionSpecifier, VersionSpecifiers};

/// Convert a set of specifiers to the range of versions they admit, using release-only
/// semantics.
///
/// Pre-, post-, dev- and local segments of the bounds are dropped, and the resulting range is
/// meant to be tested against release-only versions such as `3.12.4`. These are the semantics
/// of `requires-python` and of the Python version markers: `requires-python = ">=3.8"` admits
/// `3.8.0` and every later interpreter.
pub fn release_specifiers_to_ranges(specifiers: &VersionSpecifiers) -> Ranges<Version> {
    specifiers
        .iter()
        .fold(Ranges::full(), |range, specifier| {
            range.intersection(&release_specifier_to_range(specifier))
        })
}

/// Convert a single specifier to a range of release-only versions.
pub fn release_specifier_to_range(specifier: &VersionSpecifier) -> Ranges<Version> {
    let version = specifier.version().only_release();
    match specifier.operator() {
        Operator::Equal | Operator::ExactEqual => Ranges::singleton(version),
        Operator::NotEqual => Ranges::singleton(version).complement(),
        Operator::LessThan => Ranges::strictly_lower_than(version),
        Operator::LessThanEqual => Ranges::lower_than(version),
        Operator::GreaterThan => Ranges::strictly_higher_than(version),
        Operator::GreaterThanEqual => Ranges::higher_than(version),
        Operator::TildeEqual => {
            // `~=3.8.1` is `>=3.8.1, ==3.8.*`
            let release = version.release();
            let upper = bump(&release[..release.len() - 1], version.epoch());
            Ranges::between(version, upper)
        }
        Operator::EqualStar => {
            let upper = bump(version.release(), version.epoch());
            Ranges::between(version, upper)
        }
        Operator::NotEqualStar => {
            let upper = bump(version.release(), version.epoch());
            Ranges::between(version, upper).complement()
        }
    }
}

/// The smallest release that no longer starts with `prefix`, e.g. `3.9` for `3.8`.
fn bump(prefix: &[u64], epoch: u64) -> Version {
    let mut release = prefix.to_vec();
    if let Some(last) = release.last_mut() {
        *last += 1;
    }
    Version::new(release).with_epoch(epoch)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn range(specifiers: &str) -> Ranges<Version> {
        release_specifiers_to_ranges(&VersionSpecifiers::from_str(specifiers).unwrap())
    }

    fn version(text: &str) -> Version {
        Version::from_str(text).unwrap()
    }

    #[test]
    fn requires_python_ranges() {
        let supported = range(">=3.8, <4");
        assert!(supported.contains(&version("3.8")));
        assert!(supported.contains(&version("3.12.4")));
        assert!(!supported.contains(&version("3.7.17")));
        assert!(!supported.contains(&version("4.0")));
    }

    #[test]
    fn compatible_release() {
        let compatible = range("~=3.8.1");
        assert!(compatible.contains(&version("3.8.9")));
        assert!(!compatible.contains(&version("3.9.0")));
        assert!(!compatible.contains(&version("3.8.0")));
    }

    #[test]
    fn wildcards() {
        let minor = range("==3.8.*");
        assert!(minor.contains(&version("3.8.18")));
        assert!(!minor.contains(&version("3.9")));
        let excluded = range("!=3.8.*");
        assert!(excluded.contains(&version("3.9")));
        assert!(!excluded.contains(&version("3.8.1")));
    }

    #[test]
    fn subset_of_requires_python() {
        assert!(range(">=3.9").subset_of(&range(">=3.8")));
        assert!(!range(">=3.7").subset_of(&range(">=3.8")));
        assert!(range(">=3.8, <3.10").is_disjoint(&range(">=3.11")));
    }
}

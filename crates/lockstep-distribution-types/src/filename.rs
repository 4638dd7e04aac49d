use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use lockstep_normalize::{InvalidNameError, PackageName};
use lockstep_pep440::{Ranges, Version, VersionParseError};

use crate::{Implementation, Platform, Target};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilenameError {
    #[error("The filename `{0}` is not a valid wheel filename: {1}")]
    InvalidWheelFilename(String, String),
    #[error("The filename `{0}` is not a valid source distribution filename: {1}")]
    InvalidSourceDistFilename(String, String),
    #[error("The filename `{0}` has an invalid package name")]
    InvalidName(String, #[source] InvalidNameError),
    #[error("The filename `{0}` has an invalid version")]
    InvalidVersion(String, #[source] VersionParseError),
}

/// A wheel filename, `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`.
///
/// See: <https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-name-convention>
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
    pub python_tags: Vec<String>,
    pub abi_tags: Vec<String>,
    pub platform_tags: Vec<String>,
}

impl FromStr for WheelFilename {
    type Err = FilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let stem = filename.strip_suffix(".whl").ok_or_else(|| {
            FilenameError::InvalidWheelFilename(
                filename.to_string(),
                "Must end with .whl".to_string(),
            )
        })?;
        let (name, version, python_tag, abi_tag, platform_tag) =
            match stem.split('-').collect::<Vec<_>>().as_slice() {
                [name, version, _, python_tag, abi_tag, platform_tag]
                | [name, version, python_tag, abi_tag, platform_tag] => {
                    (*name, *version, *python_tag, *abi_tag, *platform_tag)
                }
                _ => {
                    return Err(FilenameError::InvalidWheelFilename(
                        filename.to_string(),
                        "Expected four or five `-` in the filename".to_string(),
                    ));
                }
            };
        Ok(Self {
            name: PackageName::from_str(name)
                .map_err(|err| FilenameError::InvalidName(filename.to_string(), err))?,
            version: Version::from_str(version)
                .map_err(|err| FilenameError::InvalidVersion(filename.to_string(), err))?,
            python_tags: python_tag.split('.').map(String::from).collect(),
            abi_tags: abi_tag.split('.').map(String::from).collect(),
            platform_tags: platform_tag.split('.').map(String::from).collect(),
        })
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}.whl",
            self.name.as_dist_info_name(),
            self.version,
            self.python_tags.join("."),
            self.abi_tags.join("."),
            self.platform_tags.join("."),
        )
    }
}

impl WheelFilename {
    /// Whether the wheel can be installed on some interpreter of the target.
    ///
    /// Platform tags are matched by operating system family (`manylinux_2_17_x86_64` is a Linux
    /// wheel) and Python tags by implementation and major version. ABI tags aren't considered:
    /// a target describes a family of interpreters, not a single ABI.
    pub fn is_compatible(&self, target: &Target) -> bool {
        let platform = target.platform();
        let platform_ok = self.platform_tags.iter().any(|tag| {
            tag == "any" || platform.is_none_or(|platform| platform_tag_os(tag) == Some(platform))
        });
        if !platform_ok {
            return false;
        }

        let python = target.python_range();
        let implementation = target.implementation();
        self.python_tags.iter().any(|tag| {
            let Some((tag_implementation, major)) = parse_python_tag(tag) else {
                return false;
            };
            let implementation_ok = match (tag_implementation, implementation) {
                (None, _) | (_, None) => true,
                (Some(tag), Some(target)) => tag == target,
            };
            let version_ok = major.is_none_or(|major| {
                !python.is_disjoint(&Ranges::between(
                    Version::new([major]),
                    Version::new([major + 1]),
                ))
            });
            implementation_ok && version_ok
        })
    }
}

/// The operating system family of a platform tag such as `win_amd64` or `macosx_11_0_arm64`.
fn platform_tag_os(tag: &str) -> Option<Platform> {
    if tag.starts_with("win") {
        Some(Platform::Windows)
    } else if tag.starts_with("macosx") {
        Some(Platform::Macos)
    } else if tag.starts_with("linux")
        || tag.starts_with("manylinux")
        || tag.starts_with("musllinux")
    {
        Some(Platform::Linux)
    } else {
        None
    }
}

/// Split a Python tag such as `cp312`, `pp39` or `py3` into the implementation it requires (if
/// any) and the major Python version (if any).
fn parse_python_tag(tag: &str) -> Option<(Option<Implementation>, Option<u64>)> {
    let (implementation, version) = if let Some(version) = tag.strip_prefix("py") {
        (None, version)
    } else if let Some(version) = tag.strip_prefix("cp") {
        (Some(Implementation::CPython), version)
    } else if let Some(version) = tag.strip_prefix("pp") {
        (Some(Implementation::PyPy), version)
    } else {
        return None;
    };
    let major = version
        .chars()
        .next()
        .and_then(|major| major.to_digit(10))
        .map(u64::from);
    Some((implementation, major))
}

/// A source distribution filename, `{name}-{version}.tar.gz` or `{name}-{version}.zip`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceDistFilename {
    pub name: PackageName,
    pub version: Version,
}

impl FromStr for SourceDistFilename {
    type Err = FilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let stem = [".tar.gz", ".zip", ".tar.bz2", ".tar.xz"]
            .iter()
            .find_map(|extension| filename.strip_suffix(extension))
            .ok_or_else(|| {
                FilenameError::InvalidSourceDistFilename(
                    filename.to_string(),
                    "Must end with .tar.gz, .zip, .tar.bz2 or .tar.xz".to_string(),
                )
            })?;
        // Names may contain `-`, versions may not.
        let (name, version) = stem.rsplit_once('-').ok_or_else(|| {
            FilenameError::InvalidSourceDistFilename(
                filename.to_string(),
                "Expected a `-` between the name and the version".to_string(),
            )
        })?;
        Ok(Self {
            name: PackageName::from_str(name)
                .map_err(|err| FilenameError::InvalidName(filename.to_string(), err))?,
            version: Version::from_str(version)
                .map_err(|err| FilenameError::InvalidVersion(filename.to_string(), err))?,
        })
    }
}

/// Either kind of distribution filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DistFilename {
    Wheel(WheelFilename),
    SourceDist(SourceDistFilename),
}

impl DistFilename {
    pub fn name(&self) -> &PackageName {
        match self {
            Self::Wheel(wheel) => &wheel.name,
            Self::SourceDist(sdist) => &sdist.name,
        }
    }

    pub fn version(&self) -> &Version {
        match self {
            Self::Wheel(wheel) => &wheel.version,
            Self::SourceDist(sdist) => &sdist.version,
        }
    }
}

impl FromStr for DistFilename {
    type Err = FilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        if filename.ends_with(".whl") {
            WheelFilename::from_str(filename).map(Self::Wheel)
        } else {
            SourceDistFilename::from_str(filename).map(Self::SourceDist)
        }
    }
}

#[cfg(test)]
mod tests {
    use lockstep_pep440::VersionSpecifiers;

    use super::*;

    fn target(requires_python: &str, platform: Option<Platform>) -> Target {
        Target::new(VersionSpecifiers::from_str(requires_python).unwrap()).with_platform(platform)
    }

    #[test]
    fn wheel_filename() {
        let wheel = WheelFilename::from_str("Flask-3.0.0-1-py3-none-any.whl").unwrap();
        assert_eq!(wheel.name.as_str(), "flask");
        assert_eq!(wheel.version, Version::from_str("3.0.0").unwrap());
        assert_eq!(wheel.python_tags, ["py3"]);
        assert_eq!(wheel.abi_tags, ["none"]);
        assert_eq!(wheel.platform_tags, ["any"]);
        assert_eq!(wheel.to_string(), "flask-3.0.0-py3-none-any.whl");

        // The build tag is optional.
        let untagged = WheelFilename::from_str("flask-3.0.0-py3-none-any.whl").unwrap();
        assert_eq!(untagged, wheel);

        let multi = WheelFilename::from_str("six-1.16.0-py2.py3-none-any.whl").unwrap();
        assert_eq!(multi.python_tags, ["py2", "py3"]);

        insta::assert_snapshot!(
            WheelFilename::from_str("flask-3.0.0.whl").unwrap_err(),
            @"The filename `flask-3.0.0.whl` is not a valid wheel filename: Expected four or five `-` in the filename"
        );
    }

    #[test]
    fn source_dist_filename() {
        let sdist = SourceDistFilename::from_str("zope.interface-6.1.tar.gz").unwrap();
        assert_eq!(sdist.name.as_str(), "zope-interface");
        assert_eq!(sdist.version, Version::from_str("6.1").unwrap());

        let sdist = SourceDistFilename::from_str("typing-extensions-4.9.0.zip").unwrap();
        assert_eq!(sdist.name.as_str(), "typing-extensions");
        assert!(SourceDistFilename::from_str("flask-3.0.0.exe").is_err());
    }

    #[test]
    fn platform_compatibility() {
        let linux = target(">=3.8", Some(Platform::Linux));
        let windows = target(">=3.8", Some(Platform::Windows));
        let anywhere = target(">=3.8", None);

        let pure = WheelFilename::from_str("six-1.16.0-py2.py3-none-any.whl").unwrap();
        assert!(pure.is_compatible(&linux));
        assert!(pure.is_compatible(&windows));

        let manylinux = WheelFilename::from_str(
            "numpy-1.26.0-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl",
        )
        .unwrap();
        assert!(manylinux.is_compatible(&linux));
        assert!(!manylinux.is_compatible(&windows));
        assert!(manylinux.is_compatible(&anywhere));

        let win = WheelFilename::from_str("pywin32-306-cp311-cp311-win_amd64.whl").unwrap();
        assert!(win.is_compatible(&windows));
        assert!(!win.is_compatible(&linux));
    }

    #[test]
    fn python_compatibility() {
        let modern = target(">=3.8", None);
        let py2 = WheelFilename::from_str("futures-3.4.0-py2-none-any.whl").unwrap();
        assert!(!py2.is_compatible(&modern));

        let pypy = modern.clone().with_implementation(Some(Implementation::PyPy));
        let cpython_only =
            WheelFilename::from_str("ujson-5.9.0-cp38-cp38-linux_x86_64.whl").unwrap();
        assert!(cpython_only.is_compatible(&modern));
        assert!(!cpython_only.is_compatible(&pypy));
    }
}

use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use lockstep_pep440::{
    Ranges, Version, VersionSpecifier, VersionSpecifiers, release_specifiers_to_ranges,
};
use lockstep_pep508::{MarkerEnvironment, MarkerValueString, RangedEnvironment};

/// The operating system family a lock is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Linux,
    Windows,
    Macos,
}

impl Platform {
    fn markers(self) -> [(MarkerValueString, &'static str); 3] {
        match self {
            Self::Linux => [
                (MarkerValueString::SysPlatform, "linux"),
                (MarkerValueString::PlatformSystem, "Linux"),
                (MarkerValueString::OsName, "posix"),
            ],
            Self::Windows => [
                (MarkerValueString::SysPlatform, "win32"),
                (MarkerValueString::PlatformSystem, "Windows"),
                (MarkerValueString::OsName, "nt"),
            ],
            Self::Macos => [
                (MarkerValueString::SysPlatform, "darwin"),
                (MarkerValueString::PlatformSystem, "Darwin"),
                (MarkerValueString::OsName, "posix"),
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Macos => "macos",
        }
    }
}

impl FromStr for Platform {
    type Err = TargetError;

    fn from_str(platform: &str) -> Result<Self, Self::Err> {
        match platform.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" | "win32" => Ok(Self::Windows),
            "macos" | "darwin" => Ok(Self::Macos),
            _ => Err(TargetError::UnknownPlatform(platform.to_string())),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The Python implementation a lock is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Implementation {
    #[serde(rename = "cpython")]
    CPython,
    #[serde(rename = "pypy")]
    PyPy,
}

impl Implementation {
    fn markers(self) -> [(MarkerValueString, &'static str); 2] {
        match self {
            Self::CPython => [
                (MarkerValueString::ImplementationName, "cpython"),
                (MarkerValueString::PlatformPythonImplementation, "CPython"),
            ],
            Self::PyPy => [
                (MarkerValueString::ImplementationName, "pypy"),
                (MarkerValueString::PlatformPythonImplementation, "PyPy"),
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CPython => "cpython",
            Self::PyPy => "pypy",
        }
    }
}

impl FromStr for Implementation {
    type Err = TargetError;

    fn from_str(implementation: &str) -> Result<Self, Self::Err> {
        match implementation.to_ascii_lowercase().as_str() {
            "cpython" | "cp" => Ok(Self::CPython),
            "pypy" | "pp" => Ok(Self::PyPy),
            _ => Err(TargetError::UnknownImplementation(
                implementation.to_string(),
            )),
        }
    }
}

impl Display for Implementation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("Unknown platform `{0}`, expected one of `linux`, `windows` or `macos`")]
    UnknownPlatform(String),
    #[error("Unknown Python implementation `{0}`, expected `cpython` or `pypy`")]
    UnknownImplementation(String),
}

/// The set of environments a resolution is valid for: a range of Python versions, optionally
/// restricted to one platform and one implementation.
///
/// A target built from a concrete [`MarkerEnvironment`] decides every marker; a target built
/// from a `requires-python` range leaves undecided markers in the lock.
#[derive(Debug, Clone)]
pub struct Target {
    requires_python: VersionSpecifiers,
    platform: Option<Platform>,
    implementation: Option<Implementation>,
    environment: Option<Box<MarkerEnvironment>>,
}

impl Target {
    /// A target covering every interpreter in `requires_python`, on every platform and
    /// implementation.
    pub fn new(requires_python: VersionSpecifiers) -> Self {
        Self {
            requires_python,
            platform: None,
            implementation: None,
            environment: None,
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_implementation(mut self, implementation: Option<Implementation>) -> Self {
        self.implementation = implementation;
        self
    }

    /// A target for exactly one interpreter.
    ///
    /// Platforms and implementations the lock model doesn't know about leave the corresponding
    /// fields unset, but the environment still decides every marker.
    pub fn from_environment(environment: MarkerEnvironment) -> Self {
        let python = environment.python_full_version.only_release();
        let platform = match environment.sys_platform.as_str() {
            "linux" => Some(Platform::Linux),
            "win32" => Some(Platform::Windows),
            "darwin" => Some(Platform::Macos),
            _ => None,
        };
        let implementation = match environment.implementation_name.as_str() {
            "cpython" => Some(Implementation::CPython),
            "pypy" => Some(Implementation::PyPy),
            _ => None,
        };
        Self {
            requires_python: std::iter::once(VersionSpecifier::equals(python)).collect(),
            platform,
            implementation,
            environment: Some(Box::new(environment)),
        }
    }

    pub fn requires_python(&self) -> &VersionSpecifiers {
        &self.requires_python
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn implementation(&self) -> Option<Implementation> {
        self.implementation
    }

    /// The concrete environment, for single-interpreter targets.
    pub fn environment(&self) -> Option<&MarkerEnvironment> {
        self.environment.as_deref()
    }

    /// The range of Python versions the target covers.
    pub fn python_range(&self) -> Ranges<Version> {
        release_specifiers_to_ranges(&self.requires_python)
    }

    /// Whether every interpreter of the target satisfies a distribution's `requires-python`.
    pub fn satisfies_requires_python(&self, requires_python: &VersionSpecifiers) -> bool {
        self.python_range()
            .subset_of(&release_specifiers_to_ranges(requires_python))
    }

    /// The partially known environment used to decide markers symbolically.
    pub fn ranged_environment(&self) -> RangedEnvironment {
        if let Some(environment) = &self.environment {
            return RangedEnvironment::from(environment.as_ref());
        }
        let mut ranged = RangedEnvironment::new(self.python_range());
        if let Some(platform) = self.platform {
            for (key, value) in platform.markers() {
                ranged = ranged.with_string(key, value);
            }
        }
        if let Some(implementation) = self.implementation {
            for (key, value) in implementation.markers() {
                ranged = ranged.with_string(key, value);
            }
        }
        ranged
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.requires_python == other.requires_python
            && self.platform == other.platform
            && self.implementation == other.implementation
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.requires_python.hash(state);
        self.platform.hash(state);
        self.implementation.hash(state);
    }
}

impl Display for Target {
    /// `python>=3.8, linux, cpython`
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "python{}", self.requires_python)?;
        if let Some(platform) = self.platform {
            write!(f, ", {platform}")?;
        }
        if let Some(implementation) = self.implementation {
            write!(f, ", {implementation}")?;
        }
        Ok(())
    }
}

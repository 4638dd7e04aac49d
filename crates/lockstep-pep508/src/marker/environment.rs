use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lockstep_pep440::{Ranges, Version};

use crate::marker::{MarkerValueString, MarkerValueVersion};

/// The concrete values of every marker variable for one interpreter.
///
/// See: <https://packaging.python.org/en/latest/specifications/dependency-specifiers/#environment-markers>
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: Version,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: Version,
    pub python_version: Version,
    pub sys_platform: String,
}

impl MarkerEnvironment {
    pub fn get_version(&self, key: MarkerValueVersion) -> &Version {
        match key {
            MarkerValueVersion::ImplementationVersion => &self.implementation_version,
            MarkerValueVersion::PythonFullVersion => &self.python_full_version,
            MarkerValueVersion::PythonVersion => &self.python_version,
        }
    }

    pub fn get_string(&self, key: MarkerValueString) -> &str {
        match key {
            MarkerValueString::ImplementationName => &self.implementation_name,
            MarkerValueString::OsName => &self.os_name,
            MarkerValueString::PlatformMachine => &self.platform_machine,
            MarkerValueString::PlatformPythonImplementation => {
                &self.platform_python_implementation
            }
            MarkerValueString::PlatformRelease => &self.platform_release,
            MarkerValueString::PlatformSystem => &self.platform_system,
            MarkerValueString::PlatformVersion => &self.platform_version,
            MarkerValueString::SysPlatform => &self.sys_platform,
        }
    }
}

/// A partially known environment: a range of Python versions, plus whichever string variables
/// are fixed.
///
/// Markers evaluated against a ranged environment are decided when every environment that the
/// range describes agrees, and left undecided otherwise. A lock for `requires-python >= 3.8`
/// on Linux knows `sys_platform` but not `python_full_version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangedEnvironment {
    python_full_version: Ranges<Version>,
    implementation_version: Option<Version>,
    strings: BTreeMap<MarkerValueString, String>,
}

impl RangedEnvironment {
    /// An environment where only the range of Python versions is known.
    pub fn new(python_full_version: Ranges<Version>) -> Self {
        Self {
            python_full_version,
            implementation_version: None,
            strings: BTreeMap::new(),
        }
    }

    /// Fix the value of a string variable.
    #[must_use]
    pub fn with_string(mut self, key: MarkerValueString, value: impl Into<String>) -> Self {
        self.strings.insert(key, value.into());
        self
    }

    #[must_use]
    pub fn with_implementation_version(mut self, version: Version) -> Self {
        self.implementation_version = Some(version);
        self
    }

    pub fn python_full_version(&self) -> &Ranges<Version> {
        &self.python_full_version
    }

    pub fn implementation_version(&self) -> Option<&Version> {
        self.implementation_version.as_ref()
    }

    /// The value of a string variable, if it is fixed.
    pub fn get_string(&self, key: MarkerValueString) -> Option<&str> {
        self.strings.get(&key).map(String::as_str)
    }
}

impl From<&MarkerEnvironment> for RangedEnvironment {
    fn from(environment: &MarkerEnvironment) -> Self {
        let mut ranged = Self::new(Ranges::singleton(
            environment.python_full_version.only_release(),
        ))
        .with_implementation_version(environment.implementation_version.clone());
        for key in MarkerValueString::ALL {
            ranged = ranged.with_string(key, environment.get_string(key));
        }
        ranged
    }
}

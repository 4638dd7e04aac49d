use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use lockstep_pep440::VersionSpecifiers;

use crate::{DistFilename, FilenameError, HashDigest, Target, WheelFilename};

/// Whether a file is a built or a source distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DistKind {
    Wheel,
    SourceDist,
}

/// A downloadable distribution file of one package version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DistFile {
    pub filename: String,
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashDigest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<VersionSpecifiers>,
}

impl DistFile {
    pub fn kind(&self) -> DistKind {
        if self.filename.ends_with(".whl") {
            DistKind::Wheel
        } else {
            DistKind::SourceDist
        }
    }

    pub fn parse_filename(&self) -> Result<DistFilename, FilenameError> {
        DistFilename::from_str(&self.filename)
    }

    /// Whether the file can be installed on every interpreter of the target: its
    /// `requires-python` covers the target and, for wheels, its tags match the target.
    pub fn is_compatible(&self, target: &Target) -> bool {
        if let Some(requires_python) = &self.requires_python {
            if !target.satisfies_requires_python(requires_python) {
                return false;
            }
        }
        match self.kind() {
            DistKind::Wheel => WheelFilename::from_str(&self.filename)
                .is_ok_and(|wheel| wheel.is_compatible(target)),
            DistKind::SourceDist => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Platform;

    use super::*;

    fn file(filename: &str, requires_python: Option<&str>) -> DistFile {
        DistFile {
            filename: filename.to_string(),
            url: Url::parse(&format!("https://files.example.com/{filename}")).unwrap(),
            hash: None,
            requires_python: requires_python.map(|specifiers| {
                VersionSpecifiers::from_str(specifiers).unwrap()
            }),
        }
    }

    #[test]
    fn compatibility() {
        let target = Target::new(VersionSpecifiers::from_str(">=3.8").unwrap())
            .with_platform(Some(Platform::Linux));

        assert!(file("flask-3.0.0-py3-none-any.whl", Some(">=3.8")).is_compatible(&target));
        assert!(!file("flask-3.0.0-py3-none-any.whl", Some(">=3.9")).is_compatible(&target));
        assert!(file("flask-3.0.0.tar.gz", None).is_compatible(&target));
        assert!(!file("pywin32-306-cp38-cp38-win_amd64.whl", None).is_compatible(&target));
        assert!(!file("not-a-wheel.whl", None).is_compatible(&target));
    }

    #[test]
    fn deserialize() {
        let file: DistFile = serde_json::from_str(
            r#"{
                "filename": "werkzeug-3.0.0-py3-none-any.whl",
                "url": "https://files.example.com/werkzeug-3.0.0-py3-none-any.whl",
                "hash": "sha256:0123abcd",
                "requires-python": ">=3.8"
            }"#,
        )
        .unwrap();
        assert_eq!(file.kind(), DistKind::Wheel);
        assert_eq!(file.hash, Some(HashDigest::sha256("0123abcd")));
    }
}

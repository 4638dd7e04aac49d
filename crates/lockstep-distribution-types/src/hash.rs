use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = HashParseError;

    fn from_str(algorithm: &str) -> Result<Self, Self::Err> {
        match algorithm {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(HashParseError::UnknownAlgorithm(algorithm.to_string())),
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        })
    }
}

/// A digest of a distribution file, written as `{algorithm}:{digest}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashDigest {
    pub algorithm: HashAlgorithm,
    pub digest: Box<str>,
}

impl HashDigest {
    pub fn sha256(digest: impl Into<Box<str>>) -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            digest: digest.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashParseError {
    #[error("Expected `{{algorithm}}:{{digest}}`, but found no `:` in `{0}`")]
    MissingSeparator(String),
    #[error("Unsupported hash algorithm: `{0}`")]
    UnknownAlgorithm(String),
    #[error("Hash digest must be a non-empty hex string, found `{0}`")]
    InvalidDigest(String),
}

impl FromStr for HashDigest {
    type Err = HashParseError;

    fn from_str(hash: &str) -> Result<Self, Self::Err> {
        let (algorithm, digest) = hash
            .split_once(':')
            .ok_or_else(|| HashParseError::MissingSeparator(hash.to_string()))?;
        let algorithm = HashAlgorithm::from_str(algorithm)?;
        if digest.is_empty() || !digest.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(HashParseError::InvalidDigest(digest.to_string()));
        }
        Ok(Self {
            algorithm,
            digest: digest.to_ascii_lowercase().into(),
        })
    }
}

impl Display for HashDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

impl Serialize for HashDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HashDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hash = String::deserialize(deserializer)?;
        Self::from_str(&hash).map_err(serde::de::Error::custom)
    }
}

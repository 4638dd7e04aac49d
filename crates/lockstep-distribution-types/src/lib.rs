//! The value types shared by the repository, the resolver and the lock: candidates,
//! requirements, distribution files and targets.

pub use crate::candidate::{Candidate, CandidateId, CandidateSource};
pub use crate::file::{DistFile, DistKind};
pub use crate::filename::{DistFilename, FilenameError, SourceDistFilename, WheelFilename};
pub use crate::hash::{HashAlgorithm, HashDigest, HashParseError};
pub use crate::index::IndexUrl;
pub use crate::metadata::Metadata;
pub use crate::requirement::{Requirement, RequirementSource};
pub use crate::target::{Implementation, Platform, Target, TargetError};

mod candidate;
mod file;
mod filename;
mod hash;
mod index;
mod metadata;
mod requirement;
mod target;

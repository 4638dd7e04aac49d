//! PEP 440 version identifiers and version specifiers.
//!
//! ```text
//! 1.0.dev1 < 1.0a1 < 1.0b2 < 1.0rc1 < 1.0 < 1.0+local < 1.0.post1
//! ```
//!
//! [`Version`] implements the PEP 440 total order, [`VersionSpecifiers`] the PEP 440 matching
//! rules, and [`release_specifiers_to_ranges`] the conversion to [`Ranges`] used when reasoning
//! about Python version ranges.

pub use crate::ranges::Ranges;
pub use crate::version::{LocalSegment, Prerelease, PrereleaseKind, Version, VersionParseError};
pub use crate::version_ranges::{release_specifier_to_range, release_specifiers_to_ranges};
pub use crate::version_specifier::{
    Operator, VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers,
    VersionSpecifiersParseError,
};

mod ranges;
mod version;
mod version_ranges;
mod version_specifier;

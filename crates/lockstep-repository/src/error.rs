use lockstep_client::{BuildError, ClientError};
use lockstep_normalize::PackageName;
use lockstep_pep440::{Version, VersionSpecifiers};

/// The candidates of a requirement could not be determined.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Package `{0}` was not found in any of the configured indexes")]
    PackageNotFound(PackageName),

    #[error("Failed to list the versions of `{package}`")]
    Listing {
        package: PackageName,
        #[source]
        err: ClientError,
    },

    #[error("Failed to fetch `{location}` for `{package}`")]
    Fetch {
        package: PackageName,
        location: String,
        #[source]
        err: ClientError,
    },

    #[error("Failed to read the metadata of `{package}` from `{location}`")]
    Build {
        package: PackageName,
        location: String,
        #[source]
        err: BuildError,
    },

    #[error("`{location}` provides package `{found}`, but the requirement is on `{package}`")]
    NameMismatch {
        package: PackageName,
        location: String,
        found: PackageName,
    },
}

/// The metadata of one candidate could not be read.
///
/// The resolver rejects the candidate and tries the next one.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to fetch the metadata of `{candidate}`")]
    Client {
        candidate: String,
        #[source]
        err: ClientError,
    },

    #[error("Failed to build `{candidate}`")]
    Build {
        candidate: String,
        #[source]
        err: BuildError,
    },

    #[error("`{candidate}` has no distribution to read metadata from")]
    NoDistribution { candidate: String },

    #[error("The metadata of `{candidate}` is for package `{found}`")]
    NameMismatch {
        candidate: String,
        found: PackageName,
    },

    #[error("The metadata of `{candidate}` has version `{found}`")]
    VersionMismatch { candidate: String, found: Version },

    #[error("`{candidate}` requires Python {requires_python}, but the target requires Python {target}")]
    RequiresPython {
        candidate: String,
        requires_python: VersionSpecifiers,
        target: VersionSpecifiers,
    },
}

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use lockstep_distribution_types::IndexUrl;
use lockstep_normalize::PackageName;

/// An error returned by an [`IndexClient`](crate::IndexClient).
#[derive(Debug)]
pub struct ClientError {
    kind: Box<ClientErrorKind>,
    retries: u32,
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.retries > 0 {
            write!(
                f,
                "Request failed after {retries} retries",
                retries = self.retries
            )
        } else {
            Display::fmt(&self.kind, f)
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if self.retries > 0 {
            Some(&self.kind)
        } else {
            self.kind.source()
        }
    }
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, retries: u32) -> Self {
        Self {
            kind: Box::new(kind),
            retries,
        }
    }

    /// Record the number of attempts that failed before this error was returned.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn kind(&self) -> &ClientErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ClientErrorKind {
        *self.kind
    }

    /// Whether the request may succeed if it's retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            &*self.kind,
            ClientErrorKind::Transport { .. } | ClientErrorKind::Timeout { .. }
        )
    }
}

impl From<ClientErrorKind> for ClientError {
    fn from(kind: ClientErrorKind) -> Self {
        Self::new(kind, 0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientErrorKind {
    #[error("Package `{package}` was not found in the index at {index}")]
    PackageNotFound {
        package: PackageName,
        index: IndexUrl,
    },

    #[error("File `{0}` was not found")]
    FileNotFound(String),

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Received malformed metadata from {url}: {message}")]
    MalformedMetadata { url: String, message: String },

    #[error("Failed to read `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Failed to parse the index snapshot")]
    Snapshot(#[source] serde_json::Error),
}

/// An error returned by a [`BuildBackend`](crate::BuildBackend).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to build `{}`: {message}", path.display())]
    Failed { path: PathBuf, message: String },

    #[error("No build backend is available for `{}`", path.display())]
    Unavailable { path: PathBuf },
}

//! The integration tests of the resolver and the lock file, against an in-memory index.

pub(crate) mod common;

mod lock;
mod resolve;

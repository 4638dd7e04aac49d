//! Candidate discovery for the resolver.
//!
//! A [`CandidateRepository`] turns a requirement into an ordered, lazily filtered sequence of
//! [`Candidates`] and fetches the metadata of individual candidates on demand.
//! [`IndexRepository`] implements it on top of an [`IndexClient`](lockstep_client::IndexClient)
//! and a [`BuildBackend`](lockstep_client::BuildBackend), with a shared metadata cache.

use std::future::Future;
use std::sync::Arc;

use lockstep_distribution_types::{Candidate, Metadata, Requirement, Target};

pub use crate::candidates::{
    Candidates, VersionOrder, ascending_candidate_order, candidate_order, file_order,
};
pub use crate::error::{MetadataError, RepositoryError};
pub use crate::index::IndexRepository;
pub use crate::options::{
    BinaryPolicy, Index, IndexLocations, PrereleaseMode, RepositoryOptions, RetryPolicy,
};

mod candidates;
mod error;
mod index;
mod once_map;
mod options;

/// A source of candidates and their metadata.
pub trait CandidateRepository: Send + Sync {
    /// Find the candidates for a requirement on a target, best first.
    ///
    /// Direct requirements yield exactly one candidate.
    fn find_candidates<'io>(
        &'io self,
        requirement: &'io Requirement,
        target: &'io Target,
    ) -> impl Future<Output = Result<Candidates, RepositoryError>> + Send + 'io;

    /// Fetch the metadata of a candidate, checking that it supports the target.
    fn fetch_metadata<'io>(
        &'io self,
        candidate: &'io Candidate,
        target: &'io Target,
    ) -> impl Future<Output = Result<Arc<Metadata>, MetadataError>> + Send + 'io;
}

use std::future::Future;
use std::sync::Arc;

use backon::Retryable;
use tracing::{debug, instrument, trace, warn};

use lockstep_client::{
    BuildBackend, ClientError, ClientErrorKind, FetchSource, IndexClient, VersionFiles,
};
use lockstep_distribution_types::{
    Candidate, CandidateId, CandidateSource, DistFile, IndexUrl, Metadata, Requirement,
    RequirementSource, Target,
};
use lockstep_normalize::PackageName;
use lockstep_pep440::VersionSpecifiers;

use crate::once_map::OnceMap;
use crate::{
    CandidateRepository, Candidates, IndexLocations, MetadataError, RepositoryError,
    RepositoryOptions, file_order,
};

/// A [`CandidateRepository`] backed by one or more package indexes.
///
/// Listings and metadata are cached for the lifetime of the repository. Concurrent requests for
/// the same listing or the same candidate's metadata share a single request.
pub struct IndexRepository<C> {
    client: C,
    locations: IndexLocations,
    options: RepositoryOptions,
    listings: OnceMap<(IndexUrl, PackageName), Arc<[VersionFiles]>>,
    metadata: OnceMap<CandidateId, Arc<Metadata>>,
}

impl<C: IndexClient + BuildBackend> IndexRepository<C> {
    pub fn new(client: C, locations: IndexLocations, options: RepositoryOptions) -> Self {
        Self {
            client,
            locations,
            options,
            listings: OnceMap::default(),
            metadata: OnceMap::default(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Run a client request, retrying transient failures with exponential backoff.
    async fn retry<T, F, Fut>(&self, what: &str, request: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut retries = 0;
        let result = request
            .retry(self.options.retry.backoff())
            .when(ClientError::is_transient)
            .notify(|err, delay| {
                retries += 1;
                warn!("Retrying {what} in {delay:?} after a transient error: {err}");
            })
            .await;
        result.map_err(|err| err.with_retries(retries))
    }

    async fn list(
        &self,
        index: &IndexUrl,
        name: &PackageName,
    ) -> Result<Arc<[VersionFiles]>, ClientError> {
        self.listings
            .get_or_try_init((index.clone(), name.clone()), || async {
                let what = format!("the listing of `{name}` on {index}");
                let listing = self
                    .retry(&what, || self.client.list_versions(index, name))
                    .await?;
                Ok(Arc::from(listing))
            })
            .await
    }

    #[instrument(skip_all, fields(package = %requirement.name))]
    async fn find_registry(
        &self,
        requirement: &Requirement,
        specifier: &VersionSpecifiers,
        target: &Target,
    ) -> Result<Candidates, RepositoryError> {
        let name = &requirement.name;
        let indexes: Vec<&IndexUrl> = self.locations.indexes().collect();
        let mut candidates = Vec::new();
        let mut found = false;

        for (priority, index) in indexes.into_iter().enumerate() {
            let listing = match self.list(index, name).await {
                Ok(listing) => listing,
                Err(err) if matches!(err.kind(), ClientErrorKind::PackageNotFound { .. }) => {
                    debug!("Package `{name}` is not available on {index}");
                    continue;
                }
                Err(err) => {
                    return Err(RepositoryError::Listing {
                        package: name.clone(),
                        err,
                    });
                }
            };
            found = true;

            for release in listing.iter() {
                let mut files: Vec<DistFile> = release
                    .files
                    .iter()
                    .filter(|file| file.is_compatible(target))
                    .cloned()
                    .collect();
                if files.is_empty() {
                    trace!("No file of {name}=={} is compatible with {target}", release.version);
                    continue;
                }
                files.sort_by(|left, right| file_order(left, right, self.options.binary));
                candidates.push(Candidate::registry(
                    name.clone(),
                    release.version.clone(),
                    index.clone(),
                    files,
                    priority,
                ));
            }
        }

        if !found {
            return Err(RepositoryError::PackageNotFound(name.clone()));
        }

        debug!("Found {} candidates for `{name}`", candidates.len());
        Ok(Candidates::new(
            name.clone(),
            candidates,
            specifier.clone(),
            self.options.prereleases,
            self.options.binary,
        ))
    }

    /// Fetch a direct source and read its name and version from the built metadata.
    #[instrument(skip_all, fields(package = %requirement.name))]
    async fn find_direct(
        &self,
        requirement: &Requirement,
        source: CandidateSource,
    ) -> Result<Candidate, RepositoryError> {
        let location = source.to_string();
        let fetched = self
            .retry(&location, || {
                self.client.fetch(FetchSource::Direct(&requirement.source))
            })
            .await
            .map_err(|err| RepositoryError::Fetch {
                package: requirement.name.clone(),
                location: location.clone(),
                err,
            })?;
        let metadata = self
            .client
            .build_metadata(&fetched.path)
            .await
            .map_err(|err| RepositoryError::Build {
                package: requirement.name.clone(),
                location: location.clone(),
                err,
            })?;
        if metadata.name != requirement.name {
            return Err(RepositoryError::NameMismatch {
                package: requirement.name.clone(),
                location,
                found: metadata.name,
            });
        }

        let (source, dist) = match source {
            CandidateSource::Git { url, rev } => {
                let rev = fetched.commit.clone().or(rev);
                (CandidateSource::Git { url, rev }, None)
            }
            CandidateSource::Url { url } => {
                let filename = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .unwrap_or_default()
                    .to_string();
                let dist = DistFile {
                    filename,
                    url: url.clone(),
                    hash: fetched.hash.clone(),
                    requires_python: None,
                };
                (CandidateSource::Url { url }, Some(dist))
            }
            source => (source, None),
        };

        let candidate = Candidate::direct(
            metadata.name.clone(),
            metadata.version.clone(),
            source,
            dist,
        );
        debug!("Resolved direct requirement to {candidate}");
        if let Some(registration) = self.metadata.register(candidate.id()) {
            registration.done(Arc::new(metadata));
        }
        Ok(candidate)
    }

    #[instrument(skip_all, fields(candidate = %candidate))]
    async fn read_metadata(&self, candidate: &Candidate) -> Result<Arc<Metadata>, MetadataError> {
        let source = match &candidate.source {
            CandidateSource::Registry { .. } => None,
            CandidateSource::Url { url } => Some(RequirementSource::Url { url: url.clone() }),
            CandidateSource::Path { path } => Some(RequirementSource::Path { path: path.clone() }),
            CandidateSource::Git { url, rev } => Some(RequirementSource::Git {
                url: url.clone(),
                reference: rev.clone(),
            }),
            CandidateSource::Editable { path } => {
                Some(RequirementSource::Editable { path: path.clone() })
            }
        };
        let client_error = |err| MetadataError::Client {
            candidate: candidate.to_string(),
            err,
        };
        let build_error = |err| MetadataError::Build {
            candidate: candidate.to_string(),
            err,
        };

        let metadata = if let Some(source) = source {
            let fetched = self
                .retry(&candidate.to_string(), || {
                    self.client.fetch(FetchSource::Direct(&source))
                })
                .await
                .map_err(client_error)?;
            self.client
                .build_metadata(&fetched.path)
                .await
                .map_err(build_error)?
        } else {
            let dist = candidate
                .dist
                .as_ref()
                .ok_or_else(|| MetadataError::NoDistribution {
                    candidate: candidate.to_string(),
                })?;
            let served = self
                .retry(&dist.filename, || {
                    self.client
                        .metadata(&candidate.name, &candidate.version, dist)
                })
                .await
                .map_err(client_error)?;
            if let Some(metadata) = served {
                metadata
            } else {
                debug!("No static metadata for {}; building it", dist.filename);
                let fetched = self
                    .retry(&dist.filename, || self.client.fetch(FetchSource::File(dist)))
                    .await
                    .map_err(client_error)?;
                self.client
                    .build_metadata(&fetched.path)
                    .await
                    .map_err(build_error)?
            }
        };

        if metadata.name != candidate.name {
            return Err(MetadataError::NameMismatch {
                candidate: candidate.to_string(),
                found: metadata.name,
            });
        }
        if metadata.version != candidate.version {
            return Err(MetadataError::VersionMismatch {
                candidate: candidate.to_string(),
                found: metadata.version,
            });
        }
        Ok(Arc::new(metadata))
    }
}

impl<C: IndexClient + BuildBackend> CandidateRepository for IndexRepository<C> {
    async fn find_candidates<'io>(
        &'io self,
        requirement: &'io Requirement,
        target: &'io Target,
    ) -> Result<Candidates, RepositoryError> {
        let source = match &requirement.source {
            RequirementSource::Registry { specifier } => {
                return self.find_registry(requirement, specifier, target).await;
            }
            RequirementSource::Url { url } => CandidateSource::Url { url: url.clone() },
            RequirementSource::Path { path } => CandidateSource::Path { path: path.clone() },
            RequirementSource::Git { url, reference } => CandidateSource::Git {
                url: url.clone(),
                rev: reference.clone(),
            },
            RequirementSource::Editable { path } => {
                CandidateSource::Editable { path: path.clone() }
            }
        };
        self.find_direct(requirement, source)
            .await
            .map(Candidates::single)
    }

    async fn fetch_metadata<'io>(
        &'io self,
        candidate: &'io Candidate,
        target: &'io Target,
    ) -> Result<Arc<Metadata>, MetadataError> {
        let metadata = self
            .metadata
            .get_or_try_init(candidate.id(), || self.read_metadata(candidate))
            .await?;
        if let Some(requires_python) = &metadata.requires_python {
            if !target.satisfies_requires_python(requires_python) {
                return Err(MetadataError::RequiresPython {
                    candidate: candidate.to_string(),
                    requires_python: requires_python.clone(),
                    target: target.requires_python().clone(),
                });
            }
        }
        Ok(metadata)
    }
}

//! Given a set of requirements, find a set of compatible packages.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use lockstep_distribution_types::{Candidate, Metadata, Requirement, Target};
use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep508::{MarkerTree, MarkerTruth, RangedEnvironment};
use lockstep_repository::{CandidateRepository, Candidates, MetadataError, VersionOrder};

use crate::error::{
    Conflict, DerivationChain, NoSolutionError, RejectReason, Rejection, ResolveError,
};
use crate::graph::{Graph, Incoming, Node, Parent, Rejected, Selection};
use crate::lock::Lock;
use crate::manifest::Manifest;
use crate::options::ResolverConfig;
use crate::resolution::Resolution;
use crate::strategy::{ResolutionStrategy, Strategy};

pub(crate) use criterion::{Criterion, ListingKey, allows};

mod criterion;

/// Resolve `manifest` for `target` with the default [`Strategy`], reusing the versions of
/// `prior_lock` where the configuration allows it.
pub async fn resolve<R: CandidateRepository>(
    manifest: &Manifest,
    target: &Target,
    config: &ResolverConfig,
    prior_lock: Option<&Lock>,
    repository: &R,
) -> Result<Resolution, ResolveError> {
    Resolver::new(manifest, target, config, prior_lock, repository)
        .resolve()
        .await
}

/// A single resolution run.
pub struct Resolver<'a, R, S = Strategy> {
    manifest: &'a Manifest,
    target: &'a Target,
    config: &'a ResolverConfig,
    repository: &'a R,
    strategy: S,
    cancellation: CancellationToken,
}

impl<'a, R: CandidateRepository> Resolver<'a, R> {
    pub fn new(
        manifest: &'a Manifest,
        target: &'a Target,
        config: &'a ResolverConfig,
        prior_lock: Option<&Lock>,
        repository: &'a R,
    ) -> Self {
        let preferences = prior_lock
            .map(|lock| lock.preferences(target))
            .unwrap_or_default();
        Self {
            manifest,
            target,
            config,
            repository,
            strategy: Strategy::new(manifest, config, preferences),
            cancellation: CancellationToken::new(),
        }
    }
}

impl<'a, R: CandidateRepository, S: ResolutionStrategy> Resolver<'a, R, S> {
    /// Use a different candidate ordering policy.
    pub fn with_strategy<T: ResolutionStrategy>(self, strategy: T) -> Resolver<'a, R, T> {
        Resolver {
            manifest: self.manifest,
            target: self.target,
            config: self.config,
            repository: self.repository,
            strategy,
            cancellation: self.cancellation,
        }
    }

    /// Abort the resolution once `cancellation` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Run the resolution to completion, failure, or cancellation.
    #[instrument(skip_all, fields(target = %self.target))]
    pub async fn resolve(self) -> Result<Resolution, ResolveError> {
        let cancellation = self.cancellation.clone();
        let solver = Solver {
            manifest: self.manifest,
            target: self.target,
            config: self.config,
            repository: self.repository,
            strategy: self.strategy,
            environment: self.target.ranged_environment(),
            listings: FxHashMap::default(),
            decisions: Vec::new(),
            rounds: 0,
        };
        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                debug!("Resolution cancelled");
                Err(ResolveError::Cancelled)
            }
            result = solver.solve() => result,
        }
    }
}

/// The candidates of a package, or why there are none.
enum Listing {
    Available(Candidates),
    Unavailable(String),
}

/// A selection the search can return to.
struct Decision {
    name: PackageName,
    candidate: Candidate,
    /// The graph before the selection, with the candidates already ruled out for it.
    snapshot: Graph,
}

enum Phase {
    /// Bring the graph up to date and pick the next package.
    Pending,
    /// Select a candidate for a package.
    Select(PackageName),
    /// The latest decision led to a contradiction.
    Conflict(Box<Conflict>),
    Resolved,
}

enum Attempt {
    Selected,
    Conflict,
}

struct Solver<'a, R, S> {
    manifest: &'a Manifest,
    target: &'a Target,
    config: &'a ResolverConfig,
    repository: &'a R,
    strategy: S,
    environment: RangedEnvironment,
    listings: FxHashMap<ListingKey, Listing>,
    decisions: Vec<Decision>,
    rounds: usize,
}

impl<R: CandidateRepository, S: ResolutionStrategy> Solver<'_, R, S> {
    async fn solve(mut self) -> Result<Resolution, ResolveError> {
        let mut graph = Graph::default();
        for requirement in self.manifest.requirements() {
            match self.incoming(requirement.clone(), Parent::Root, &[]) {
                Some(incoming) => graph.add_incoming(incoming),
                None => debug!("Ignoring `{requirement}`: its marker excludes the target"),
            }
        }

        let mut phase = Phase::Pending;
        loop {
            phase = match phase {
                Phase::Pending => self.pending(&mut graph).await?,
                Phase::Select(name) => match self.attempt(&mut graph, &name).await? {
                    Attempt::Selected => Phase::Pending,
                    Attempt::Conflict => {
                        let node = graph.node(&name).cloned().unwrap_or_default();
                        let criterion = Criterion::from_node(&name, &node)?;
                        Phase::Conflict(Box::new(self.conflict(&name, &node, &criterion)))
                    }
                },
                Phase::Conflict(conflict) => {
                    self.backtrack(&mut graph, *conflict)?;
                    Phase::Pending
                }
                Phase::Resolved => {
                    debug!(
                        "Resolved {} packages in {} rounds",
                        graph.selections().count(),
                        self.rounds
                    );
                    return Ok(Resolution::from_graph(
                        &graph,
                        self.target,
                        &self.environment,
                    ));
                }
            };
        }
    }

    /// Activate requested extras, check the selections against them, list new packages, and
    /// pick the most constrained unsatisfied package.
    async fn pending(&mut self, graph: &mut Graph) -> Result<Phase, ResolveError> {
        while self.activate_extras(graph) {}
        if let Some(conflict) = self.excluded(graph)? {
            return Ok(Phase::Conflict(Box::new(conflict)));
        }

        let mut requests = Vec::new();
        for (name, node) in graph.active() {
            let criterion = Criterion::from_node(name, node)?;
            requests.push(criterion.listing(name));
        }
        self.list(requests).await;

        let mut best: Option<((usize, usize, usize), PackageName)> = None;
        for (name, node) in graph.active() {
            if node.selection.is_some() {
                continue;
            }
            let criterion = Criterion::from_node(name, node)?;
            let remaining = self
                .candidates(name, &criterion, node)
                .map_or(0, |candidates| candidates.len());
            let known = self
                .listing(name, &criterion)
                .map_or(0, |listing| listing.len());
            let key = (remaining, known, graph.position(name));
            if best.as_ref().is_none_or(|(best, _)| key < *best) {
                best = Some((key, name.clone()));
            }
        }

        Ok(match best {
            Some(((remaining, ..), name)) => {
                trace!("Selecting a version of {name} ({remaining} candidates left)");
                Phase::Select(name)
            }
            None => Phase::Resolved,
        })
    }

    /// Add the dependencies of extras that were requested after their package was selected.
    ///
    /// Returns whether anything was added.
    fn activate_extras(&self, graph: &mut Graph) -> bool {
        let missing: Vec<(PackageName, Candidate, Arc<Metadata>, Vec<ExtraName>)> = graph
            .selections()
            .filter_map(|(name, node, selection)| {
                let extras: Vec<ExtraName> = node
                    .requested_extras()
                    .into_iter()
                    .filter(|extra| !selection.extras.contains(extra))
                    .collect();
                (!extras.is_empty()).then(|| {
                    (
                        name.clone(),
                        selection.candidate.clone(),
                        selection.metadata.clone(),
                        extras,
                    )
                })
            })
            .collect();
        let changed = !missing.is_empty();
        for (name, candidate, metadata, extras) in missing {
            for extra in &extras {
                debug!("Activating the `{extra}` extra of {candidate}");
                for incoming in self.extra_dependencies(&candidate, &metadata, extra) {
                    graph.add_incoming(incoming);
                }
            }
            graph.activate_extras(&name, extras);
        }
        changed
    }

    /// The first selection that the requirements on it no longer accept.
    ///
    /// Only the dependencies of an extra requested after its package was selected can cause
    /// this. Every other requirement is checked against the selections before it is added.
    fn excluded(&self, graph: &Graph) -> Result<Option<Conflict>, ResolveError> {
        for (name, node, _) in graph.selections() {
            let criterion = Criterion::from_node(name, node)?;
            if let Some(conflict) = self.selection_conflict(name, node, &criterion) {
                debug!("{name} conflicts with the dependencies of a newly requested extra");
                return Ok(Some(conflict));
            }
        }
        Ok(None)
    }

    /// The conflict between the selection on `node` and the requirements on it, if any.
    fn selection_conflict(
        &self,
        name: &PackageName,
        node: &Node,
        criterion: &Criterion,
    ) -> Option<Conflict> {
        let selection = node.selection.as_ref()?;
        if criterion.accepts(&selection.candidate) {
            return None;
        }
        let excluding = node
            .incoming
            .iter()
            .filter(|incoming| !allows(&incoming.requirement, &selection.candidate))
            .map(|incoming| (incoming.parent.clone(), incoming.requirement.clone()))
            .collect();
        let mut conflict = self.conflict(name, node, criterion);
        conflict.rejected.push(Rejection {
            candidate: selection.candidate.to_string(),
            reason: RejectReason::Excluded(excluding),
        });
        Some(conflict)
    }

    /// Try the candidates of `name` in strategy order until one can be selected.
    async fn attempt(
        &mut self,
        graph: &mut Graph,
        name: &PackageName,
    ) -> Result<Attempt, ResolveError> {
        self.rounds += 1;
        if self.rounds > self.config.max_rounds {
            return Err(ResolveError::ResolutionTooDeep {
                max_rounds: self.config.max_rounds,
            });
        }

        let Some(node) = graph.node(name) else {
            return Ok(Attempt::Conflict);
        };
        let criterion = Criterion::from_node(name, node)?;
        let Ok(candidates) = self.candidates(name, &criterion, node) else {
            return Ok(Attempt::Conflict);
        };
        let candidates: Vec<Candidate> = candidates.into_iter().cloned().collect();
        let prefetch = self.prefetch(graph, name);

        for (index, window) in candidates.chunks(self.concurrency()).enumerate() {
            let prefetch = if index == 0 { prefetch.as_slice() } else { &[] };
            let results = self.fetch_metadata(window, prefetch).await;

            for (candidate, result) in window.iter().zip(results) {
                let metadata = match result {
                    Ok(metadata) => metadata,
                    Err(err) => {
                        let reason = error_chain(&err);
                        debug!("Rejecting {candidate}: {reason}");
                        graph.reject(
                            name,
                            Rejected {
                                id: candidate.id(),
                                display: candidate.to_string(),
                                reason: RejectReason::Metadata(reason),
                            },
                        );
                        continue;
                    }
                };

                let dependencies = self.dependencies(candidate, &metadata, &criterion.extras);
                if let Some(conflict) = self.check_dependencies(graph, &dependencies).await? {
                    debug!(
                        "Rejecting {candidate}: no version of {} is compatible",
                        conflict.package
                    );
                    graph.reject(
                        name,
                        Rejected {
                            id: candidate.id(),
                            display: candidate.to_string(),
                            reason: RejectReason::Dependency(Box::new(conflict)),
                        },
                    );
                    continue;
                }

                debug!("Selecting {candidate}");
                let snapshot = graph.clone();
                let names: Vec<PackageName> = dependencies
                    .iter()
                    .map(|incoming| incoming.requirement.name.clone())
                    .unique()
                    .collect();
                graph.select(
                    name,
                    Selection {
                        candidate: candidate.clone(),
                        metadata,
                        extras: criterion.extras.clone(),
                    },
                );
                for incoming in dependencies {
                    graph.add_incoming(incoming);
                }
                if self.strategy.unlocks_dependencies(name)
                    || graph.node(name).is_some_and(|node| node.unlocked)
                {
                    for dependency in &names {
                        graph.unlock(dependency);
                    }
                }
                self.decisions.push(Decision {
                    name: name.clone(),
                    candidate: candidate.clone(),
                    snapshot,
                });
                return Ok(Attempt::Selected);
            }
        }

        Ok(Attempt::Conflict)
    }

    /// Check that every dependency is still satisfiable once merged into the graph: a selected
    /// package must keep its selection, any other must keep at least one candidate.
    ///
    /// Returns the first dependency that isn't.
    async fn check_dependencies(
        &mut self,
        graph: &Graph,
        dependencies: &[Incoming],
    ) -> Result<Option<Conflict>, ResolveError> {
        let mut merged: Vec<(PackageName, Node)> = Vec::new();
        for incoming in dependencies {
            let name = &incoming.requirement.name;
            let position = match merged.iter().position(|(merged, _)| merged == name) {
                Some(position) => position,
                None => {
                    merged.push((name.clone(), graph.node(name).cloned().unwrap_or_default()));
                    merged.len() - 1
                }
            };
            let node = &mut merged[position].1;
            if !node.incoming.contains(incoming) {
                node.incoming.push(incoming.clone());
            }
        }

        let mut requests = Vec::with_capacity(merged.len());
        for (name, node) in &merged {
            requests.push(Criterion::from_node(name, node)?.listing(name));
        }
        self.list(requests).await;

        for (name, node) in &merged {
            let criterion = Criterion::from_node(name, node)?;
            if node.selection.is_some() {
                if let Some(conflict) = self.selection_conflict(name, node, &criterion) {
                    return Ok(Some(conflict));
                }
                continue;
            }
            if self
                .candidates(name, &criterion, node)
                .is_ok_and(|candidates| !candidates.is_empty())
            {
                continue;
            }
            return Ok(Some(self.conflict(name, node, &criterion)));
        }
        Ok(None)
    }

    /// Undo the latest decision and rule its candidate out, or fail if there is none.
    ///
    /// Every state on the decision stack is only ever extended, so a candidate ruled out in a
    /// snapshot stays ruled out below it and no branch is explored twice.
    fn backtrack(&mut self, graph: &mut Graph, conflict: Conflict) -> Result<(), ResolveError> {
        let Some(decision) = self.decisions.pop() else {
            return Err(failure(graph, conflict));
        };
        debug!(
            "Backtracking from {}: no version of {} is compatible",
            decision.candidate, conflict.package
        );
        *graph = decision.snapshot;
        graph.reject(
            &decision.name,
            Rejected {
                id: decision.candidate.id(),
                display: decision.candidate.to_string(),
                reason: RejectReason::Backtracked(Box::new(conflict)),
            },
        );
        Ok(())
    }

    /// The requirement as it applies to the target, or `None` if its marker excludes it.
    fn incoming(
        &self,
        requirement: Requirement,
        parent: Parent,
        extras: &[ExtraName],
    ) -> Option<Incoming> {
        let marker = match requirement
            .marker
            .evaluate_symbolic(&self.environment, extras)
        {
            MarkerTruth::AlwaysFalse => return None,
            MarkerTruth::AlwaysTrue => MarkerTree::TRUE,
            MarkerTruth::Depends => requirement.marker.simplify(&self.environment, extras),
        };
        Some(Incoming {
            requirement,
            parent,
            marker,
        })
    }

    /// The base dependencies of a candidate, plus those of the given extras.
    fn dependencies(
        &self,
        candidate: &Candidate,
        metadata: &Metadata,
        extras: &BTreeSet<ExtraName>,
    ) -> Vec<Incoming> {
        let parent = Parent::Package {
            name: candidate.name.clone(),
            version: candidate.version.clone(),
            extra: None,
        };
        let mut dependencies: Vec<Incoming> = metadata
            .requires_dist
            .iter()
            .filter(|requirement| {
                requirement.name != candidate.name || !requirement.extras.is_empty()
            })
            .filter_map(|requirement| {
                self.incoming(Requirement::from(requirement.clone()), parent.clone(), &[])
            })
            .collect();
        for extra in extras {
            dependencies.extend(self.extra_dependencies(candidate, metadata, extra));
        }
        dependencies
    }

    /// The dependencies that only apply when `extra` is requested.
    fn extra_dependencies(
        &self,
        candidate: &Candidate,
        metadata: &Metadata,
        extra: &ExtraName,
    ) -> Vec<Incoming> {
        if !metadata.provides_extras.contains(extra) {
            debug!("{candidate} does not declare the `{extra}` extra");
        }
        let parent = Parent::Package {
            name: candidate.name.clone(),
            version: candidate.version.clone(),
            extra: Some(extra.clone()),
        };
        metadata
            .requires_dist
            .iter()
            .filter(|requirement| {
                requirement
                    .marker
                    .evaluate_symbolic(&self.environment, &[])
                    == MarkerTruth::AlwaysFalse
            })
            .filter_map(|requirement| {
                self.incoming(
                    Requirement::from(requirement.clone()),
                    parent.clone(),
                    std::slice::from_ref(extra),
                )
            })
            .collect()
    }

    fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    fn listing(&self, name: &PackageName, criterion: &Criterion) -> Result<&Candidates, String> {
        let (key, _) = criterion.listing(name);
        match self.listings.get(&key) {
            Some(Listing::Available(candidates)) => Ok(candidates),
            Some(Listing::Unavailable(reason)) => Err(reason.clone()),
            None => Err(format!("`{key}` was not listed")),
        }
    }

    /// The candidates of `name` that the criterion accepts and the branch hasn't ruled out, in
    /// the order the strategy tries them.
    fn candidates<'s>(
        &'s self,
        name: &PackageName,
        criterion: &'s Criterion,
        node: &Node,
    ) -> Result<Vec<&'s Candidate>, String> {
        let listing = self.listing(name, criterion)?;
        let mut candidates: Vec<&Candidate> = listing
            .matching(&criterion.specifier)
            .filter(|candidate| criterion.accepts(candidate) && !node.is_rejected(&candidate.id()))
            .collect();
        if self.strategy.version_order(name) == VersionOrder::Ascending {
            // Stable, so candidates of one version keep the listing's preference order.
            candidates.sort_by(|left, right| left.version.cmp(&right.version));
        }
        if let Some(preferred) = self
            .strategy
            .preferred_version(name)
            .filter(|_| !node.unlocked)
        {
            candidates.sort_by_key(|candidate| candidate.version != *preferred);
        }
        Ok(candidates)
    }

    /// The best candidate of every other unsatisfied package, to warm the metadata cache.
    fn prefetch(&self, graph: &Graph, selecting: &PackageName) -> Vec<Candidate> {
        graph
            .active()
            .filter(|(name, node)| *name != selecting && node.selection.is_none())
            .filter_map(|(name, node)| {
                let criterion = Criterion::from_node(name, node).ok()?;
                let candidates = self.candidates(name, &criterion, node).ok()?;
                candidates.first().map(|candidate| (*candidate).clone())
            })
            .take(self.concurrency())
            .collect()
    }

    /// Fetch the metadata of a window of candidates, in order, while warming the cache for
    /// `prefetch`.
    async fn fetch_metadata(
        &self,
        window: &[Candidate],
        prefetch: &[Candidate],
    ) -> Vec<Result<Arc<Metadata>, MetadataError>> {
        let fetches = stream::iter(
            window
                .iter()
                .map(|candidate| self.repository.fetch_metadata(candidate, self.target)),
        )
        .buffered(self.concurrency())
        .collect::<Vec<_>>();
        let warm = stream::iter(
            prefetch
                .iter()
                .map(|candidate| self.repository.fetch_metadata(candidate, self.target)),
        )
        .buffer_unordered(self.concurrency())
        .for_each(|result| async move {
            if let Err(err) = result {
                trace!("Prefetch failed: {err}");
            }
        });
        let (results, ()) = futures::join!(fetches, warm);
        results
    }

    /// List every package that hasn't been listed yet, concurrently.
    async fn list(&mut self, requests: Vec<(ListingKey, Requirement)>) {
        let requests: Vec<(ListingKey, Requirement)> = requests
            .into_iter()
            .filter(|(key, _)| !self.listings.contains_key(key))
            .unique_by(|(key, _)| key.clone())
            .collect();
        if requests.is_empty() {
            return;
        }

        let results: Vec<_> = stream::iter(
            requests
                .iter()
                .map(|(_, requirement)| self.repository.find_candidates(requirement, self.target)),
        )
        .buffered(self.concurrency())
        .collect()
        .await;

        for ((key, _), result) in requests.into_iter().zip(results) {
            let listing = match result {
                Ok(candidates) => {
                    trace!("Found {} candidates for {key}", candidates.len());
                    match key {
                        ListingKey::Registry(_) => Listing::Available(
                            candidates.with_prereleases(self.config.prerelease_mode),
                        ),
                        ListingKey::Direct(..) => Listing::Available(candidates),
                    }
                }
                Err(err) => {
                    let reason = error_chain(&err);
                    debug!("Failed to list {key}: {reason}");
                    Listing::Unavailable(reason)
                }
            };
            self.listings.insert(key, listing);
        }
    }

    fn conflict(&self, name: &PackageName, node: &Node, criterion: &Criterion) -> Conflict {
        Conflict {
            package: name.clone(),
            requirements: node
                .incoming
                .iter()
                .map(|incoming| (incoming.parent.clone(), incoming.requirement.clone()))
                .collect(),
            rejected: node
                .rejected
                .iter()
                .map(|rejected| Rejection {
                    candidate: rejected.display.clone(),
                    reason: rejected.reason.clone(),
                })
                .collect(),
            unavailable: self.listing(name, criterion).err(),
        }
    }
}

/// The error for a conflict that no decision can be undone for.
fn failure(graph: &Graph, conflict: Conflict) -> ResolveError {
    if let Some((leaf, path)) = unavailable(&conflict) {
        let mut chain = derivation(graph, &conflict.package);
        chain.extend(path);
        return ResolveError::CandidateUnavailable {
            package: leaf.package.clone(),
            reason: leaf.unavailable_reason().unwrap_or_default(),
            chain: DerivationChain::new(chain),
        };
    }
    let chains = NoSolutionError::new(conflict.clone(), Vec::new())
        .contributors()
        .into_iter()
        .map(|name| {
            let chain = DerivationChain::new(derivation(graph, &name));
            (name, chain)
        })
        .collect();
    ResolveError::ResolutionConflict(Box::new(NoSolutionError::new(conflict, chains)))
}

/// Find the package whose unavailability explains the whole conflict, if there is one, with
/// the path from the conflicting package to it.
fn unavailable(conflict: &Conflict) -> Option<(&Conflict, Vec<Parent>)> {
    if conflict.unavailable_reason().is_some() {
        return Some((conflict, Vec::new()));
    }
    if conflict.rejected.is_empty() {
        return None;
    }
    let mut found: Option<(&Conflict, Vec<Parent>)> = None;
    for rejection in &conflict.rejected {
        let RejectReason::Dependency(inner) = &rejection.reason else {
            return None;
        };
        let (leaf, mut path) = unavailable(inner)?;
        match &found {
            Some((found, _)) if found.package != leaf.package => return None,
            Some(_) => {}
            None => {
                if let Some((parent, _)) = inner
                    .requirements
                    .iter()
                    .find(|(parent, _)| parent.name() == Some(&conflict.package))
                {
                    path.insert(0, parent.clone());
                }
                found = Some((leaf, path));
            }
        }
    }
    found
}

/// The chain of parents through which the project requires `name` in the current graph.
fn derivation(graph: &Graph, name: &PackageName) -> Vec<Parent> {
    let mut chain = Vec::new();
    let mut seen = FxHashSet::default();
    let mut current = name.clone();
    while seen.insert(current.clone()) {
        let Some(parent) = graph
            .node(&current)
            .and_then(|node| node.incoming.first())
            .map(|incoming| incoming.parent.clone())
        else {
            break;
        };
        let Parent::Package { name, .. } = &parent else {
            break;
        };
        current = name.clone();
        chain.push(parent);
    }
    chain.reverse();
    chain
}

/// Render an error with its sources, as `error: source: source`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use tracing::trace;

use lockstep_distribution_types::{Candidate, CandidateSource, Requirement, Target};
use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::Version;
use lockstep_pep508::{MarkerTree, RangedEnvironment};

use crate::graph::{Graph, Parent};
use crate::lock::{LockedFile, Pin, Pins, StrategyFlags};

/// The number of times a node's marker may grow before it is taken to be reachable
/// unconditionally.
const MAX_MARKER_UPDATES: usize = 64;

/// A package in a [`Resolution`].
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub candidate: Candidate,
    /// The extras whose dependencies are part of the resolution.
    pub extras: BTreeSet<ExtraName>,
    /// The condition under which the package is needed, [`MarkerTree::TRUE`] when it always is.
    pub marker: MarkerTree,
    /// Whether the project requires the package itself.
    pub direct: bool,
}

impl ResolvedPackage {
    pub fn name(&self) -> &PackageName {
        &self.candidate.name
    }

    pub fn version(&self) -> &Version {
        &self.candidate.version
    }
}

#[derive(Debug, Clone)]
enum ResolutionNode {
    Root,
    Package(ResolvedPackage),
}

/// A requirement of the project or of a resolved package on another resolved package.
#[derive(Debug, Clone)]
pub struct ResolutionEdge {
    pub requirement: Requirement,
    /// The part of the requirement's marker the target leaves undecided.
    pub marker: MarkerTree,
    /// The extra of the parent that introduced the requirement.
    pub extra: Option<ExtraName>,
}

/// A complete, consistent assignment of one candidate per package for one target.
#[derive(Debug, Clone)]
pub struct Resolution {
    graph: DiGraph<ResolutionNode, ResolutionEdge>,
    packages: BTreeMap<PackageName, NodeIndex>,
    target: Target,
}

impl Resolution {
    /// Collect the selections of a finished search, keeping only what the project reaches.
    pub(crate) fn from_graph(
        graph: &Graph,
        target: &Target,
        environment: &RangedEnvironment,
    ) -> Self {
        let mut petgraph = DiGraph::new();
        let root = petgraph.add_node(ResolutionNode::Root);

        let mut indices = FxHashMap::default();
        for (name, node, selection) in graph.selections() {
            let index = petgraph.add_node(ResolutionNode::Package(ResolvedPackage {
                candidate: selection.candidate.clone(),
                extras: selection.extras.clone(),
                marker: MarkerTree::TRUE,
                direct: node
                    .incoming
                    .iter()
                    .any(|incoming| incoming.parent == Parent::Root),
            }));
            indices.insert(name.clone(), index);
        }

        for (name, node, _) in graph.selections() {
            let Some(&child) = indices.get(name) else {
                continue;
            };
            for incoming in &node.incoming {
                let (parent, extra) = match &incoming.parent {
                    Parent::Root => (root, None),
                    Parent::Package { name, extra, .. } => match indices.get(name) {
                        Some(&parent) => (parent, extra.clone()),
                        None => continue,
                    },
                };
                petgraph.add_edge(
                    parent,
                    child,
                    ResolutionEdge {
                        requirement: incoming.requirement.clone(),
                        marker: incoming.marker.clone(),
                        extra,
                    },
                );
            }
        }

        let reachability = marker_reachability(&petgraph, root);
        let graph = petgraph.filter_map(
            |index, node| {
                let Some(marker) = reachability.get(&index) else {
                    if let ResolutionNode::Package(package) = node {
                        trace!("Dropping unreachable {}", package.candidate);
                    }
                    return None;
                };
                Some(match node {
                    ResolutionNode::Root => ResolutionNode::Root,
                    ResolutionNode::Package(package) => ResolutionNode::Package(ResolvedPackage {
                        marker: marker.simplify(environment, &[]),
                        ..package.clone()
                    }),
                })
            },
            |_, edge| Some(edge.clone()),
        );

        let packages = graph
            .node_indices()
            .filter_map(|index| match &graph[index] {
                ResolutionNode::Package(package) => Some((package.name().clone(), index)),
                ResolutionNode::Root => None,
            })
            .collect();

        Self {
            graph,
            packages,
            target: target.clone(),
        }
    }

    /// The target the resolution is valid for.
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// The resolved packages, by name.
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages
            .values()
            .filter_map(|index| self.package(*index))
    }

    pub fn get(&self, name: &PackageName) -> Option<&ResolvedPackage> {
        self.packages
            .get(name)
            .and_then(|index| self.package(*index))
    }

    /// The resolved dependencies of `name`, with the requirements that introduced them.
    pub fn dependencies(
        &self,
        name: &PackageName,
    ) -> impl Iterator<Item = (&ResolvedPackage, &ResolutionEdge)> {
        self.packages.get(name).into_iter().flat_map(move |index| {
            self.graph
                .edges_directed(*index, Direction::Outgoing)
                .filter_map(move |edge| {
                    self.package(edge.target())
                        .map(|package| (package, edge.weight()))
                })
        })
    }

    /// The selected version of every package.
    pub fn versions(&self) -> BTreeMap<PackageName, Version> {
        self.packages()
            .map(|package| (package.name().clone(), package.version().clone()))
            .collect()
    }

    /// The packages as a lock with `flags` would record them.
    pub fn pins(&self, flags: &StrategyFlags) -> Pins {
        self.packages()
            .map(|package| {
                (
                    package.name().clone(),
                    Pin {
                        version: package.version().clone(),
                        source: package.candidate.source.clone(),
                        files: package
                            .candidate
                            .files
                            .iter()
                            .map(|file| LockedFile::from_dist(file, flags.static_urls))
                            .collect(),
                    },
                )
            })
            .collect()
    }

    fn package(&self, index: NodeIndex) -> Option<&ResolvedPackage> {
        match &self.graph[index] {
            ResolutionNode::Package(package) => Some(package),
            ResolutionNode::Root => None,
        }
    }
}

/// Write the resolution in the `{name}=={version}` format, annotated with the packages that
/// requested each entry.
impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (name, index) in &self.packages {
            let Some(package) = self.package(*index) else {
                continue;
            };
            match &package.candidate.source {
                CandidateSource::Registry { .. } => write!(f, "{name}=={}", package.version())?,
                CandidateSource::Editable { path } => write!(f, "-e {}", path.display())?,
                source => write!(f, "{name} @ {source}")?,
            }
            if !package.marker.is_true() {
                write!(f, " ; {}", package.marker)?;
            }
            writeln!(f)?;

            let parents: BTreeSet<String> = self
                .graph
                .edges_directed(*index, Direction::Incoming)
                .map(|edge| match self.package(edge.source()) {
                    Some(parent) => parent.name().to_string(),
                    None => "the project".to_string(),
                })
                .collect();
            match parents.len() {
                0 => {}
                1 => {
                    for parent in &parents {
                        writeln!(f, "    # via {parent}")?;
                    }
                }
                _ => {
                    writeln!(f, "    # via")?;
                    for parent in &parents {
                        writeln!(f, "    #   {parent}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Determine the markers under which each package is reachable from the project.
///
/// A node's marker is the disjunction, over every path from the root, of the conjunction of the
/// edge markers along the path. Whenever a path adds something the recorded marker doesn't
/// already cover, the node is re-queued and its children updated. Around a cycle the marker of
/// the longer path implies the recorded one, so the walk stops there. Nodes not in the returned
/// map are unreachable.
fn marker_reachability(
    graph: &DiGraph<ResolutionNode, ResolutionEdge>,
    root: NodeIndex,
) -> FxHashMap<NodeIndex, MarkerTree> {
    let mut reachability = FxHashMap::default();
    let mut updates: FxHashMap<NodeIndex, usize> = FxHashMap::default();
    reachability.insert(root, MarkerTree::TRUE);
    let mut queue = vec![root];

    while let Some(parent) = queue.pop() {
        let Some(marker) = reachability.get(&parent).cloned() else {
            continue;
        };
        for edge in graph.edges_directed(parent, Direction::Outgoing) {
            let child_marker = edge.weight().marker.clone().and(marker.clone());
            match reachability.entry(edge.target()) {
                Entry::Occupied(mut existing) => {
                    if implies(&child_marker, existing.get()) {
                        continue;
                    }
                    let count = updates.entry(edge.target()).or_default();
                    *count += 1;
                    let merged = if *count > MAX_MARKER_UPDATES {
                        MarkerTree::TRUE
                    } else {
                        existing.get().clone().or(child_marker)
                    };
                    if merged != *existing.get() {
                        existing.insert(merged);
                        queue.push(edge.target());
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(child_marker);
                    queue.push(edge.target());
                }
            }
        }
    }

    reachability
}

/// Whether `marker` implies `existing` syntactically: it contains every conjunct of `existing`,
/// or of one of the disjuncts of `existing`.
fn implies(marker: &MarkerTree, existing: &MarkerTree) -> bool {
    let own = conjuncts(marker);
    let covers = |other: &MarkerTree| {
        conjuncts(other)
            .iter()
            .all(|conjunct| own.contains(conjunct))
    };
    match existing {
        MarkerTree::Or(disjuncts) => disjuncts.iter().any(covers),
        other => covers(other),
    }
}

fn conjuncts(marker: &MarkerTree) -> Vec<&MarkerTree> {
    match marker {
        MarkerTree::And(children) => children.iter().collect(),
        other => vec![other],
    }
}

//! The working state of a resolution: one node per package name, holding the requirements that
//! point at it, the tentative selection and the branch-local rejections.
//!
//! Within a branch the state only grows: requirements and rejections are added, never removed.
//! Going back to an earlier branch means restoring the snapshot taken there.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use lockstep_distribution_types::{Candidate, CandidateId, Metadata, Requirement};
use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::Version;
use lockstep_pep508::MarkerTree;

use crate::error::RejectReason;

/// The origin of a requirement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Parent {
    /// The project itself.
    Root,
    /// The metadata of a selected package, for one of its extras or for its base dependencies.
    Package {
        name: PackageName,
        version: Version,
        extra: Option<ExtraName>,
    },
}

impl Parent {
    /// The name of the parent package, if any.
    pub fn name(&self) -> Option<&PackageName> {
        match self {
            Self::Root => None,
            Self::Package { name, .. } => Some(name),
        }
    }
}

impl Display for Parent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("the project"),
            Self::Package {
                name,
                version,
                extra: Some(extra),
            } => write!(f, "{name}[{extra}]=={version}"),
            Self::Package {
                name,
                version,
                extra: None,
            } => write!(f, "{name}=={version}"),
        }
    }
}

/// An active requirement on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Incoming {
    pub(crate) requirement: Requirement,
    pub(crate) parent: Parent,
    /// The part of the requirement's marker the target leaves undecided.
    pub(crate) marker: MarkerTree,
}

#[derive(Debug, Clone)]
pub(crate) struct Selection {
    pub(crate) candidate: Candidate,
    pub(crate) metadata: Arc<Metadata>,
    /// The extras whose dependencies have been added to the graph.
    pub(crate) extras: BTreeSet<ExtraName>,
}

/// A candidate ruled out for the current branch and every branch below it.
#[derive(Debug, Clone)]
pub(crate) struct Rejected {
    pub(crate) id: CandidateId,
    pub(crate) display: String,
    pub(crate) reason: RejectReason,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    pub(crate) incoming: SmallVec<[Incoming; 2]>,
    pub(crate) selection: Option<Selection>,
    pub(crate) rejected: Vec<Rejected>,
    /// Whether the branch ignores the prior lock for the package.
    pub(crate) unlocked: bool,
}

impl Node {
    /// Whether any requirement points at the node.
    pub(crate) fn is_active(&self) -> bool {
        !self.incoming.is_empty()
    }

    /// The union of the extras requested by the incoming requirements.
    pub(crate) fn requested_extras(&self) -> BTreeSet<ExtraName> {
        self.incoming
            .iter()
            .flat_map(|incoming| incoming.requirement.extras.iter().cloned())
            .collect()
    }

    pub(crate) fn is_rejected(&self, id: &CandidateId) -> bool {
        self.rejected.iter().any(|rejected| rejected.id == *id)
    }
}

/// The dependency graph under construction.
///
/// Cloning is cheap: nodes are shared until they are modified, so a clone serves as the
/// snapshot that backtracking restores.
#[derive(Debug, Clone, Default)]
pub(crate) struct Graph {
    nodes: IndexMap<PackageName, Arc<Node>, FxBuildHasher>,
}

impl Graph {
    pub(crate) fn node(&self, name: &PackageName) -> Option<&Node> {
        self.nodes.get(name).map(AsRef::as_ref)
    }

    fn node_mut(&mut self, name: &PackageName) -> &mut Node {
        Arc::make_mut(self.nodes.entry(name.clone()).or_default())
    }

    /// The nodes with at least one incoming requirement, in declaration order.
    pub(crate) fn active(&self) -> impl Iterator<Item = (&PackageName, &Node)> {
        self.nodes
            .iter()
            .map(|(name, node)| (name, node.as_ref()))
            .filter(|(_, node)| node.is_active())
    }

    /// The position of the node in declaration order.
    pub(crate) fn position(&self, name: &PackageName) -> usize {
        self.nodes.get_index_of(name).unwrap_or(usize::MAX)
    }

    pub(crate) fn add_incoming(&mut self, incoming: Incoming) {
        let node = self.node_mut(&incoming.requirement.name.clone());
        if !node.incoming.contains(&incoming) {
            node.incoming.push(incoming);
        }
    }

    pub(crate) fn select(&mut self, name: &PackageName, selection: Selection) {
        self.node_mut(name).selection = Some(selection);
    }

    /// Ignore the prior lock for `name` in this branch.
    pub(crate) fn unlock(&mut self, name: &PackageName) {
        if !self.node(name).is_some_and(|node| node.unlocked) {
            self.node_mut(name).unlocked = true;
        }
    }

    /// Record the extras whose dependencies were added for the selection of `name`.
    pub(crate) fn activate_extras(
        &mut self,
        name: &PackageName,
        extras: impl IntoIterator<Item = ExtraName>,
    ) {
        if let Some(selection) = &mut self.node_mut(name).selection {
            selection.extras.extend(extras);
        }
    }

    pub(crate) fn reject(&mut self, name: &PackageName, rejected: Rejected) {
        let node = self.node_mut(name);
        if !node.is_rejected(&rejected.id) {
            node.rejected.push(rejected);
        }
    }

    /// The selected nodes.
    pub(crate) fn selections(&self) -> impl Iterator<Item = (&PackageName, &Node, &Selection)> {
        self.active().filter_map(|(name, node)| {
            node.selection
                .as_ref()
                .map(|selection| (name, node, selection))
        })
    }
}

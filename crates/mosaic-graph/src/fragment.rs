use indexmap::IndexMap;

use mosaic_logic::Atom;
use serde::{Deserialize, Serialize};

use crate::{Colors, Node, NodeSet, StructureError};

/// A directed, colored edge.
///
/// The successor and predecessor views of a fragment are two projections
/// of one edge set: if `target` is a successor of `source` for colors `C`,
/// then `source` is a predecessor of `target` for the same `C`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge<N, C> {
    pub source: N,
    pub target: N,
    pub colors: C,
}

impl<N, C> Edge<N, C> {
    pub fn new(source: N, target: N, colors: C) -> Self {
        Edge {
            source,
            target,
            colors,
        }
    }
}

/// One partition's view of the state-transition graph.
///
/// All queries are scoped to local knowledge: `all_nodes` lists only
/// locally-owned nodes, while `successors`/`predecessors` may mention
/// border nodes owned by other partitions. Implementations are queried
/// concurrently from the worker and delivery threads and must be safe to
/// share (`&self` queries only).
pub trait KripkeFragment<N: Node, C: Colors>: Send + Sync + 'static {
    /// Successors of `node` with the colors along each edge.
    fn successors(&self, node: &N) -> NodeSet<N, C>;

    /// Predecessors of `node` with the colors along each edge.
    fn predecessors(&self, node: &N) -> NodeSet<N, C>;

    /// Locally-owned nodes where `atom` holds, with the valid colors.
    fn valid_nodes(&self, atom: &Atom) -> NodeSet<N, C>;

    /// All locally-owned nodes with their full color membership.
    fn all_nodes(&self) -> NodeSet<N, C>;
}

/// An explicit adjacency-list fragment, validated at construction.
///
/// This is the reference backend: small models held fully in memory,
/// used by drivers and the test-suite. Construction enforces the
/// structural invariants the engine's algorithms rely on; a violation is
/// a fatal [`StructureError`], not a soft warning.
pub struct ExplicitKripkeFragment<N: Node, C: Colors> {
    nodes: NodeSet<N, C>,
    successor_map: IndexMap<N, NodeSet<N, C>>,
    predecessor_map: IndexMap<N, NodeSet<N, C>>,
    validity: IndexMap<Atom, NodeSet<N, C>>,
    empty: C,
}

impl<N: Node, C: Colors> ExplicitKripkeFragment<N, C> {
    /// Build a fragment from local node memberships, the local edge set
    /// (including edges to/from border nodes), and atom validity.
    pub fn new(
        empty: C,
        nodes: impl IntoIterator<Item = (N, C)>,
        edges: impl IntoIterator<Item = Edge<N, C>>,
        validity: impl IntoIterator<Item = (Atom, Vec<(N, C)>)>,
    ) -> Result<Self, StructureError> {
        let nodes = NodeSet::of(empty.clone(), nodes);

        let mut successor_map: IndexMap<N, NodeSet<N, C>> = IndexMap::new();
        let mut predecessor_map: IndexMap<N, NodeSet<N, C>> = IndexMap::new();
        for edge in edges {
            if !nodes.contains(&edge.source) && !nodes.contains(&edge.target) {
                return Err(StructureError::DanglingEdge {
                    from: format!("{:?}", edge.source),
                    target: format!("{:?}", edge.target),
                });
            }
            successor_map
                .entry(edge.source.clone())
                .or_insert_with(|| NodeSet::new(empty.clone()))
                .union_insert(edge.target.clone(), &edge.colors);
            predecessor_map
                .entry(edge.target)
                .or_insert_with(|| NodeSet::new(empty.clone()))
                .union_insert(edge.source, &edge.colors);
        }

        let validity: IndexMap<Atom, NodeSet<N, C>> = validity
            .into_iter()
            .map(|(atom, valid)| (atom, NodeSet::of(empty.clone(), valid)))
            .collect();

        for (atom, valid) in &validity {
            for (node, colors) in valid {
                if colors.intersect(nodes.get(node)) != *colors {
                    return Err(StructureError::ValidityOutsideMembership {
                        atom: atom.to_string(),
                        node: format!("{node:?}"),
                    });
                }
            }
        }

        for node in nodes.nodes() {
            let has_successor = successor_map
                .get(node)
                .map(|set| !set.is_empty())
                .unwrap_or(false);
            if !has_successor {
                return Err(StructureError::MissingSuccessors {
                    node: format!("{node:?}"),
                });
            }
        }

        Ok(ExplicitKripkeFragment {
            nodes,
            successor_map,
            predecessor_map,
            validity,
            empty,
        })
    }
}

impl<N: Node, C: Colors> KripkeFragment<N, C> for ExplicitKripkeFragment<N, C> {
    fn successors(&self, node: &N) -> NodeSet<N, C> {
        self.successor_map
            .get(node)
            .cloned()
            .unwrap_or_else(|| NodeSet::new(self.empty.clone()))
    }

    fn predecessors(&self, node: &N) -> NodeSet<N, C> {
        self.predecessor_map
            .get(node)
            .cloned()
            .unwrap_or_else(|| NodeSet::new(self.empty.clone()))
    }

    fn valid_nodes(&self, atom: &Atom) -> NodeSet<N, C> {
        match atom {
            Atom::True => self.nodes.clone(),
            Atom::False => NodeSet::new(self.empty.clone()),
            Atom::Prop(_) => self
                .validity
                .get(atom)
                .cloned()
                .unwrap_or_else(|| NodeSet::new(self.empty.clone())),
        }
    }

    fn all_nodes(&self) -> NodeSet<N, C> {
        self.nodes.clone()
    }
}

#![allow(dead_code)]

//! Shared fixture: a global explicit model that can be sliced into
//! per-rank fragments, a thread-per-rank harness running the full
//! distributed checker over it, and brute-force oracles for the temporal
//! operators.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use mosaic_comm::{Communicator, SharedMemoryCommunicator};
use mosaic_engine::{Job, ModelChecker};
use mosaic_graph::{
    Colors, Edge, ExplicitKripkeFragment, ExplicitPartitionFunction, IdColors, IdNode, NodeSet,
};
use mosaic_logic::{Atom, Formula, Operator};

pub type IdNodeSet = NodeSet<IdNode, IdColors>;

/// The whole (unpartitioned) model, as a driver would describe it.
#[derive(Clone)]
pub struct GlobalModel {
    pub memberships: Vec<(IdNode, IdColors)>,
    pub edges: Vec<Edge<IdNode, IdColors>>,
    pub validity: Vec<(Atom, Vec<(IdNode, IdColors)>)>,
}

pub fn colors(items: &[u32]) -> IdColors {
    IdColors::of(items.iter().copied())
}

pub fn prop(name: &str) -> Atom {
    Atom::Prop(name.to_string())
}

impl GlobalModel {
    /// The slice of the model that rank `rank` owns: its nodes, every
    /// edge touching them, and its share of the atom validity.
    pub fn fragment_for(
        &self,
        assignment: &HashMap<IdNode, u32>,
        rank: u32,
    ) -> ExplicitKripkeFragment<IdNode, IdColors> {
        let owner = |node: &IdNode| assignment[node];
        let nodes: Vec<_> = self
            .memberships
            .iter()
            .filter(|(node, _)| owner(node) == rank)
            .cloned()
            .collect();
        let edges: Vec<_> = self
            .edges
            .iter()
            .filter(|edge| owner(&edge.source) == rank || owner(&edge.target) == rank)
            .cloned()
            .collect();
        let validity: Vec<_> = self
            .validity
            .iter()
            .map(|(atom, valid)| {
                (
                    atom.clone(),
                    valid
                        .iter()
                        .filter(|(node, _)| owner(node) == rank)
                        .cloned()
                        .collect(),
                )
            })
            .collect();
        ExplicitKripkeFragment::new(IdColors::empty(), nodes, edges, validity)
            .expect("test model slices must be well-formed")
    }
}

/// Run the checker over `model` split across `ranks` partitions and
/// return, per formula, the union of every rank's local result.
pub fn verify_distributed(
    model: &GlobalModel,
    assignment: &[(IdNode, u32)],
    ranks: u32,
    formulas: &[Formula],
) -> Vec<IdNodeSet> {
    let assignment_map: HashMap<IdNode, u32> = assignment.iter().copied().collect();
    let group = SharedMemoryCommunicator::<Job<IdNode, IdColors>>::create_group(ranks);

    let workers: Vec<_> = group
        .into_iter()
        .map(|comm| {
            let model = model.clone();
            let assignment = assignment.to_vec();
            let assignment_map = assignment_map.clone();
            let formulas = formulas.to_vec();
            thread::spawn(move || {
                let rank = comm.rank();
                let fragment = Arc::new(model.fragment_for(&assignment_map, rank));
                let partition =
                    Arc::new(ExplicitPartitionFunction::new(rank, assignment).expect("partition"));
                let comm = Arc::new(comm);
                let communicator: Arc<dyn Communicator<Job<IdNode, IdColors>>> = comm.clone();
                let mut checker = ModelChecker::new(fragment, partition, communicator);
                let results: Vec<IdNodeSet> = formulas
                    .iter()
                    .map(|formula| checker.verify(formula).expect("verify"))
                    .collect();
                comm.finalize().expect("finalize");
                results
            })
        })
        .collect();

    let mut merged: Vec<IdNodeSet> = formulas
        .iter()
        .map(|_| NodeSet::new(IdColors::empty()))
        .collect();
    for worker in workers {
        let results = worker.join().expect("rank thread");
        for (merged, local) in merged.iter_mut().zip(results) {
            *merged = merged.union(&local);
        }
    }
    merged
}

/// Assignment placing every node on rank `node_id % ranks`.
pub fn round_robin_assignment(model: &GlobalModel, ranks: u32) -> Vec<(IdNode, u32)> {
    model
        .memberships
        .iter()
        .map(|(node, _)| (*node, (node.0 % u64::from(ranks)) as u32))
        .collect()
}

// --- brute-force oracle ---------------------------------------------------

/// Sequential reference evaluation of a normalized formula over the
/// global model. Deliberately naive: round-based fixpoint iteration until
/// nothing changes.
pub fn brute_force(model: &GlobalModel, formula: &Formula) -> IdNodeSet {
    match formula.operator() {
        Operator::Atom => {
            let atom = formula.as_atom().expect("atom payload");
            match atom {
                Atom::True => membership_set(model),
                Atom::False => NodeSet::new(IdColors::empty()),
                Atom::Prop(_) => model
                    .validity
                    .iter()
                    .find(|(candidate, _)| candidate == atom)
                    .map(|(_, valid)| NodeSet::of(IdColors::empty(), valid.iter().cloned()))
                    .unwrap_or_else(|| NodeSet::new(IdColors::empty())),
            }
        }
        Operator::Negation => {
            membership_set(model).subtract(&brute_force(model, formula.operand(0)))
        }
        Operator::And => brute_force(model, formula.operand(0))
            .intersect(&brute_force(model, formula.operand(1))),
        Operator::Or => brute_force(model, formula.operand(0))
            .union(&brute_force(model, formula.operand(1))),
        Operator::ExistsNext => {
            let inner = brute_force(model, formula.operand(0));
            let mut result = NodeSet::new(IdColors::empty());
            for edge in &model.edges {
                let through = edge.colors.intersect(inner.get(&edge.target));
                result.union_insert(edge.source, &through);
            }
            result
        }
        Operator::ExistsUntil => {
            let path = brute_force(model, formula.operand(0));
            let goal = brute_force(model, formula.operand(1));
            fixpoint(&goal, |z| {
                let mut next = z.clone();
                for edge in &model.edges {
                    let through = edge.colors.intersect(z.get(&edge.target));
                    let supported = through.intersect(path.get(&edge.source));
                    next.union_insert(edge.source, &supported);
                }
                next
            })
        }
        Operator::AllUntil => {
            let path = brute_force(model, formula.operand(0));
            let goal = brute_force(model, formula.operand(1));
            fixpoint(&goal, |z| {
                let mut next = z.clone();
                for (node, _) in &model.memberships {
                    // colors with at least one outgoing edge, none of
                    // which escapes the current approximation
                    let mut has_edge = IdColors::empty();
                    let mut escapes = IdColors::empty();
                    for edge in model.edges.iter().filter(|edge| edge.source == *node) {
                        has_edge = has_edge.union(&edge.colors);
                        escapes = escapes.union(&edge.colors.subtract(z.get(&edge.target)));
                    }
                    let candidate = path.get(node).intersect(&has_edge).subtract(&escapes);
                    next.union_insert(*node, &candidate);
                }
                next
            })
        }
        unsupported => panic!("oracle only evaluates the checker basis, got {unsupported:?}"),
    }
}

fn membership_set(model: &GlobalModel) -> IdNodeSet {
    NodeSet::of(IdColors::empty(), model.memberships.iter().cloned())
}

fn fixpoint(seed: &IdNodeSet, step: impl Fn(&IdNodeSet) -> IdNodeSet) -> IdNodeSet {
    let mut current = seed.clone();
    loop {
        let next = step(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

//! The model checker: memoized recursive descent over the formula tree,
//! one communication phase per temporal operator.
//!
//! Every rank runs the same descent over the same formula, so all ranks
//! open and close phases in the same order — which is what lines up the
//! global barriers of messenger registration and teardown. Boolean
//! operators are pure set algebra on local results; the temporal
//! operators push colors backward along predecessor edges until the
//! phase's termination detector reports global quiescence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use mosaic_comm::{CommError, Communicator};
use mosaic_graph::{Colors, KripkeFragment, Node, NodeSet, PartitionFunction};
use mosaic_logic::{Formula, FormulaId, Operator};

use crate::queue::{JobSink, SingleWorkerQueue};
use crate::{CheckError, Job, JobKind};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Take the result out of the shared mutex once the phase is over.
fn unwrap_shared<T: Clone>(shared: Arc<Mutex<T>>) -> T {
    match Arc::try_unwrap(shared) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
        Err(shared) => lock(&shared).clone(),
    }
}

/// One partition's model checker.
///
/// Explicitly composed from the graph query surface, the partition
/// function, and the communicator (which carries the messenger and
/// terminator factories for the propagation phases). `verify` is the sole
/// entry point; results are memoized per formula identity for the
/// checker's lifetime.
pub struct ModelChecker<N, C, G, P>
where
    N: Node,
    C: Colors,
    G: KripkeFragment<N, C>,
    P: PartitionFunction<N>,
{
    fragment: Arc<G>,
    partition: Arc<P>,
    communicator: Arc<dyn Communicator<Job<N, C>>>,
    cache: HashMap<FormulaId, NodeSet<N, C>>,
    empty: C,
}

impl<N, C, G, P> ModelChecker<N, C, G, P>
where
    N: Node,
    C: Colors,
    G: KripkeFragment<N, C>,
    P: PartitionFunction<N>,
{
    pub fn new(
        fragment: Arc<G>,
        partition: Arc<P>,
        communicator: Arc<dyn Communicator<Job<N, C>>>,
    ) -> Self {
        let empty = fragment.all_nodes().default_value().clone();
        ModelChecker {
            fragment,
            partition,
            communicator,
            cache: HashMap::new(),
            empty,
        }
    }

    /// Compute, for every locally-owned node, the colors for which
    /// `formula` holds. The formula must be in the checker's operator
    /// basis (`mosaic_logic::normalize`).
    pub fn verify(&mut self, formula: &Formula) -> Result<NodeSet<N, C>, CheckError> {
        if let Some(cached) = self.cache.get(&formula.id()) {
            return Ok(cached.clone());
        }
        tracing::info!(rank = self.partition.my_id(), %formula, "verification started");
        let result = match formula.operator() {
            Operator::Atom => match formula.as_atom() {
                Some(atom) => self.fragment.valid_nodes(atom),
                None => return Err(CheckError::UnsupportedOperator(Operator::Atom)),
            },
            Operator::Negation => self.check_negation(formula)?,
            Operator::And => self.check_and(formula)?,
            Operator::Or => self.check_or(formula)?,
            Operator::ExistsNext => self.check_exists_next(formula)?,
            Operator::ExistsUntil => self.check_exists_until(formula)?,
            Operator::AllUntil => self.check_all_until(formula)?,
            unsupported => return Err(CheckError::UnsupportedOperator(unsupported)),
        };
        self.cache.insert(formula.id(), result.clone());
        Ok(result)
    }

    /// Colors where the formula does not hold, within each node's own
    /// full color membership.
    fn check_negation(&mut self, formula: &Formula) -> Result<NodeSet<N, C>, CheckError> {
        let inner = self.verify(formula.operand(0))?;
        Ok(self.fragment.all_nodes().subtract(&inner))
    }

    fn check_and(&mut self, formula: &Formula) -> Result<NodeSet<N, C>, CheckError> {
        let left = self.verify(formula.operand(0))?;
        let right = self.verify(formula.operand(1))?;
        Ok(left.intersect(&right))
    }

    fn check_or(&mut self, formula: &Formula) -> Result<NodeSet<N, C>, CheckError> {
        let left = self.verify(formula.operand(0))?;
        let right = self.verify(formula.operand(1))?;
        Ok(left.union(&right))
    }

    /// One backward propagation round: wherever the operand holds, its
    /// colors are pushed to every predecessor through the edge colors.
    /// Delivered jobs only accumulate — EX is a single step, so the
    /// callback never re-posts.
    fn check_exists_next(&mut self, formula: &Formula) -> Result<NodeSet<N, C>, CheckError> {
        let inner = self.verify(formula.operand(0))?;
        let result = Arc::new(Mutex::new(NodeSet::new(self.empty.clone())));

        let cb_result = result.clone();
        let queue = SingleWorkerQueue::new(
            self.communicator.as_ref(),
            self.partition.clone(),
            JobKind::ExistsNext,
            Box::new(move |_, job| {
                let (node, colors) = match job {
                    Job::ExistsNext { node, colors } => (node, colors),
                    other => return Err(wrong_job(JobKind::ExistsNext, other.kind())),
                };
                lock(&cb_result).union_insert(node, &colors);
                Ok(())
            }),
        )?;

        for (node, colors) in &inner {
            push_back(self.fragment.as_ref(), queue.sink(), node, colors, |_, target, pushed| {
                Job::ExistsNext {
                    node: target,
                    colors: pushed,
                }
            })?;
        }
        queue.wait_for_termination()?;

        Ok(unwrap_shared(result))
    }

    /// Least fixpoint of `Z -> psi ∪ (phi ∩ pre(Z))`. The goal seeds the
    /// result; every delivered job intersects the pushed colors with the
    /// path operand at the receiving node and re-pushes only when that
    /// grew the stored value. Colors grow monotonically and are bounded
    /// by the full color set, so the phase quiesces.
    fn check_exists_until(&mut self, formula: &Formula) -> Result<NodeSet<N, C>, CheckError> {
        let path = Arc::new(self.verify(formula.operand(0))?);
        let goal = self.verify(formula.operand(1))?;
        let result = Arc::new(Mutex::new(NodeSet::new(self.empty.clone())));

        let cb_result = result.clone();
        let cb_path = path.clone();
        let cb_fragment = self.fragment.clone();
        let queue = SingleWorkerQueue::new(
            self.communicator.as_ref(),
            self.partition.clone(),
            JobKind::ExistsUntil,
            Box::new(move |sink, job| {
                let (node, colors) = match job {
                    Job::ExistsUntil { node, colors } => (node, colors),
                    other => return Err(wrong_job(JobKind::ExistsUntil, other.kind())),
                };
                let supported = colors.intersect(cb_path.get(&node));
                if supported.is_empty() {
                    return Ok(());
                }
                let changed = lock(&cb_result).union_insert(node.clone(), &supported);
                if changed {
                    push_back(cb_fragment.as_ref(), sink, &node, &supported, exists_until_job)?;
                }
                Ok(())
            }),
        )?;

        for (node, colors) in &goal {
            let changed = lock(&result).union_insert(node.clone(), colors);
            if changed {
                push_back(self.fragment.as_ref(), queue.sink(), node, colors, exists_until_job)?;
            }
        }
        queue.wait_for_termination()?;

        Ok(unwrap_shared(result))
    }

    /// Coverage fixpoint: a node becomes valid for a color once every
    /// outgoing edge for that color leads into an already-valid node, the
    /// path operand permitting — and goal nodes are valid outright.
    ///
    /// Per node, `uncovered` maps each successor to the colors not yet
    /// proven valid behind that edge. The map is materialized lazily on
    /// first receipt, under the same lock that mutates it, so two
    /// concurrent deliveries cannot both "first-initialize" it. A color
    /// with no outgoing edge at a node is never covered and therefore
    /// never becomes valid there except through the goal operand.
    fn check_all_until(&mut self, formula: &Formula) -> Result<NodeSet<N, C>, CheckError> {
        let path = Arc::new(self.verify(formula.operand(0))?);
        let goal = self.verify(formula.operand(1))?;
        let result = Arc::new(Mutex::new(NodeSet::new(self.empty.clone())));
        let uncovered: Arc<Mutex<HashMap<N, HashMap<N, C>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let cb_result = result.clone();
        let cb_path = path.clone();
        let cb_fragment = self.fragment.clone();
        let cb_uncovered = uncovered.clone();
        let cb_empty = self.empty.clone();
        let queue = SingleWorkerQueue::new(
            self.communicator.as_ref(),
            self.partition.clone(),
            JobKind::AllUntil,
            Box::new(move |sink, job| {
                let (source, target, colors) = match job {
                    Job::AllUntil {
                        source,
                        target,
                        colors,
                    } => (source, target, colors),
                    other => return Err(wrong_job(JobKind::AllUntil, other.kind())),
                };
                let newly_covered = {
                    let mut uncovered = lock(&cb_uncovered);
                    let edges = uncovered.entry(target.clone()).or_insert_with(|| {
                        cb_fragment
                            .successors(&target)
                            .iter()
                            .map(|(successor, edge_colors)| {
                                (successor.clone(), edge_colors.clone())
                            })
                            .collect()
                    });
                    // cover the pushed edge, then see which of the pushed
                    // colors no other edge still withholds
                    if let Some(remaining) = edges.get_mut(&source) {
                        *remaining = remaining.subtract(&colors);
                    }
                    let withheld = edges
                        .values()
                        .fold(cb_empty.clone(), |all, remaining| all.union(remaining));
                    colors.subtract(&withheld)
                };
                let valid = newly_covered.intersect(cb_path.get(&target));
                if valid.is_empty() {
                    return Ok(());
                }
                let changed = lock(&cb_result).union_insert(target.clone(), &valid);
                if changed {
                    push_back(cb_fragment.as_ref(), sink, &target, &valid, all_until_job)?;
                }
                Ok(())
            }),
        )?;

        // Goal nodes are valid outright; their colors seed the backward
        // wave that covers edges.
        for (node, colors) in &goal {
            lock(&result).union_insert(node.clone(), colors);
        }
        for (node, colors) in &goal {
            push_back(self.fragment.as_ref(), queue.sink(), node, colors, all_until_job)?;
        }
        queue.wait_for_termination()?;

        Ok(unwrap_shared(result))
    }
}

fn exists_until_job<N, C>(_source: N, target: N, colors: C) -> Job<N, C> {
    Job::ExistsUntil {
        node: target,
        colors,
    }
}

fn all_until_job<N, C>(source: N, target: N, colors: C) -> Job<N, C> {
    Job::AllUntil {
        source,
        target,
        colors,
    }
}

fn wrong_job(expected: JobKind, got: JobKind) -> CommError {
    CommError::ProtocolViolation(format!("{expected:?} phase received a {got:?} job"))
}

/// Push `colors` from `node` to every predecessor, intersected with the
/// edge colors; empty pushes are dropped.
fn push_back<N, C, G>(
    fragment: &G,
    sink: &JobSink<N, C>,
    node: &N,
    colors: &C,
    make_job: impl Fn(N, N, C) -> Job<N, C>,
) -> Result<(), CommError>
where
    N: Node,
    C: Colors,
    G: KripkeFragment<N, C> + ?Sized,
{
    for (predecessor, edge_colors) in &fragment.predecessors(node) {
        let pushed = colors.intersect(edge_colors);
        if pushed.is_not_empty() {
            sink.post(make_job(node.clone(), predecessor.clone(), pushed))?;
        }
    }
    Ok(())
}

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::{Node, PartitionError};

/// Total mapping from nodes to their owning partition rank.
///
/// Totality is a contract: asking for the owner of a node outside the
/// declared universe is a programmer error and panics. Partiality is
/// rejected at construction where it can be (overlapping assignments).
pub trait PartitionFunction<N: Node>: Send + Sync + 'static {
    /// Rank of the partition owning `node`.
    fn owner_of(&self, node: &N) -> u32;

    /// Rank of the local partition.
    fn my_id(&self) -> u32;
}

/// Ownership from an explicit node-to-rank table.
pub struct ExplicitPartitionFunction<N: Node> {
    my_id: u32,
    mapping: HashMap<N, u32>,
}

impl<N: Node> ExplicitPartitionFunction<N> {
    pub fn new(
        my_id: u32,
        assignments: impl IntoIterator<Item = (N, u32)>,
    ) -> Result<Self, PartitionError> {
        let mut mapping = HashMap::new();
        for (node, owner) in assignments {
            if let Some(previous) = mapping.insert(node.clone(), owner) {
                if previous != owner {
                    return Err(PartitionError::OverlappingOwnership {
                        node: format!("{node:?}"),
                        first: previous,
                        second: owner,
                    });
                }
            }
        }
        Ok(ExplicitPartitionFunction { my_id, mapping })
    }

    /// Build from rank-to-nodes lists, the inverse direction.
    pub fn from_inverse(
        my_id: u32,
        partitions: impl IntoIterator<Item = (u32, Vec<N>)>,
    ) -> Result<Self, PartitionError> {
        let assignments = partitions
            .into_iter()
            .flat_map(|(owner, nodes)| nodes.into_iter().map(move |node| (node, owner)))
            .collect::<Vec<_>>();
        Self::new(my_id, assignments)
    }
}

impl<N: Node> PartitionFunction<N> for ExplicitPartitionFunction<N> {
    fn owner_of(&self, node: &N) -> u32 {
        match self.mapping.get(node) {
            Some(owner) => *owner,
            None => panic!("partition function is not total: no owner for {node:?}"),
        }
    }

    fn my_id(&self) -> u32 {
        self.my_id
    }
}

/// Everything owned by one rank; the single-partition case.
pub struct UniformPartitionFunction<N> {
    id: u32,
    _marker: PhantomData<fn(N)>,
}

impl<N> UniformPartitionFunction<N> {
    pub fn new(id: u32) -> Self {
        UniformPartitionFunction {
            id,
            _marker: PhantomData,
        }
    }
}

impl<N: Node> PartitionFunction<N> for UniformPartitionFunction<N> {
    fn owner_of(&self, _node: &N) -> u32 {
        self.id
    }

    fn my_id(&self) -> u32 {
        self.id
    }
}

/// Ownership by hash of the node, modulo partition count.
///
/// All participating processes must construct this with the same
/// `partition_count` (and the same node type) to agree on ownership.
pub struct HashPartitionFunction<N> {
    my_id: u32,
    partition_count: u32,
    _marker: PhantomData<fn(N)>,
}

impl<N> HashPartitionFunction<N> {
    pub fn new(my_id: u32, partition_count: u32) -> Self {
        assert!(partition_count > 0, "partition count must be positive");
        HashPartitionFunction {
            my_id,
            partition_count,
            _marker: PhantomData,
        }
    }
}

impl<N: Node> PartitionFunction<N> for HashPartitionFunction<N> {
    fn owner_of(&self, node: &N) -> u32 {
        let mut hasher = DefaultHasher::new();
        node.hash(&mut hasher);
        (hasher.finish() % u64::from(self.partition_count)) as u32
    }

    fn my_id(&self) -> u32 {
        self.my_id
    }
}

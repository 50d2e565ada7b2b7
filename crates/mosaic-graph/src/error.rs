use thiserror::Error;

/// Fatal construction-time defects in a Kripke fragment.
///
/// None of these are recoverable: a malformed fragment would silently
/// corrupt fixpoint results, so construction refuses it outright.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("atom `{atom}` is valid at {node} for colors outside the node's membership")]
    ValidityOutsideMembership { atom: String, node: String },

    #[error("node {node} has no successors; model an explicit self-loop or border edge")]
    MissingSuccessors { node: String },

    #[error("edge {from} -> {target} touches no locally owned node")]
    DanglingEdge { from: String, target: String },
}

/// Fatal construction-time defects in a partition function.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("node {node} is assigned to both partition {first} and partition {second}")]
    OverlappingOwnership { node: String, first: u32, second: u32 },
}

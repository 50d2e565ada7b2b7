#![doc = include_str!("../README.md")]

//! Colored graph model.
//!
//! Everything here is pure data + queries; the distributed machinery lives
//! in `mosaic-comm` and `mosaic-engine`.

use std::fmt;
use std::hash::Hash;

pub mod colors;
pub mod error;
pub mod fragment;
pub mod ids;
pub mod node_set;
pub mod partition;

pub use colors::Colors;
pub use error::{PartitionError, StructureError};
pub use fragment::{Edge, ExplicitKripkeFragment, KripkeFragment};
pub use ids::{IdColorSpace, IdColors, IdNode};
pub use node_set::NodeSet;
pub use partition::{
    ExplicitPartitionFunction, HashPartitionFunction, PartitionFunction, UniformPartitionFunction,
};

/// Opaque node identity.
///
/// Nodes are created and owned by graph backends; the checker only ever
/// compares, hashes and routes them. Implemented automatically for any
/// suitable type.
pub trait Node: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static> Node for T {}

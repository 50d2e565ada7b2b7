#![doc = include_str!("../README.md")]

//! Formula construction and normalization.
//!
//! The checker consumes formulas as an opaque tree: an [`Operator`], an
//! optional [`Atom`] payload, and indexable operands. Construction goes
//! through a process-global interner, so `FormulaId` equality coincides
//! with structural equality.

pub mod ast;
pub mod normalize;

pub use ast::{Atom, Formula, FormulaId, Operator};
pub use normalize::normalize;

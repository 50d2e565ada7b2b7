use indexmap::IndexMap;

use crate::{Colors, Node};

/// A mapping from nodes to non-empty color sets, with an explicit default
/// for absent keys.
///
/// The explicit default keeps "no information" and "empty set" distinct at
/// the type level: genuine results always carry an empty default, while a
/// non-empty default can transiently represent "all colors except where
/// overridden". Keys are never stored with an empty value — combinators
/// and [`NodeSet::union_insert`] prune them.
///
/// Combining two sets with different defaults is a programmer error and
/// panics.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSet<N: Node, C: Colors> {
    entries: IndexMap<N, C>,
    default: C,
}

impl<N: Node, C: Colors> NodeSet<N, C> {
    /// An empty set with the given default.
    pub fn new(default: C) -> Self {
        NodeSet {
            entries: IndexMap::new(),
            default,
        }
    }

    /// Build from explicit entries; keys with empty values are dropped.
    pub fn of(default: C, entries: impl IntoIterator<Item = (N, C)>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|(_, colors)| colors.is_not_empty())
            .collect();
        NodeSet { entries, default }
    }

    pub fn default_value(&self) -> &C {
        &self.default
    }

    /// The colors stored for `node`, or the default when absent.
    pub fn get(&self, node: &N) -> &C {
        self.entries.get(node).unwrap_or(&self.default)
    }

    pub fn contains(&self, node: &N) -> bool {
        self.entries.contains_key(node)
    }

    /// Number of keys with explicit (non-empty) values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&N, &C)> {
        self.entries.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.entries.keys()
    }

    /// Union `colors` into the value stored at `node`; returns whether the
    /// stored value changed. This is the primitive every fixpoint loop in
    /// the engine is built on: monotone, and `false` means "nothing new,
    /// stop propagating".
    pub fn union_insert(&mut self, node: N, colors: &C) -> bool {
        let merged = self.get(&node).union(colors);
        let changed = merged != *self.get(&node);
        if changed && merged.is_not_empty() {
            self.entries.insert(node, merged);
        }
        changed
    }

    fn combine(&self, other: &Self, op: impl Fn(&C, &C) -> C) -> Self {
        assert!(
            self.default == other.default,
            "combining NodeSets with different defaults"
        );
        let mut entries = IndexMap::new();
        for (node, colors) in &self.entries {
            let merged = op(colors, other.get(node));
            if merged.is_not_empty() {
                entries.insert(node.clone(), merged);
            }
        }
        for (node, colors) in &other.entries {
            if self.entries.contains_key(node) {
                continue;
            }
            let merged = op(&self.default, colors);
            if merged.is_not_empty() {
                entries.insert(node.clone(), merged);
            }
        }
        NodeSet {
            entries,
            default: self.default.clone(),
        }
    }

    /// Pointwise union over the union of key sets.
    pub fn union(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a.union(b))
    }

    /// Pointwise intersection over the union of key sets.
    pub fn intersect(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a.intersect(b))
    }

    /// Pointwise subtraction over the union of key sets.
    pub fn subtract(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a.subtract(b))
    }
}

impl<'a, N: Node, C: Colors> IntoIterator for &'a NodeSet<N, C> {
    type Item = (&'a N, &'a C);
    type IntoIter = indexmap::map::Iter<'a, N, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

//! Progress index algebra.
//!
//! A progress index records how much of a replication stream has been durably processed. Indices
//! are only partially ordered: two indices produced by different writers may be incomparable,
//! in which case neither `is_after` the other. Indices from different writers are combined with
//! `merge`, which yields their least upper bound.
//!
//! ## Variants
//! - `Minimum` is the bottom element. Every other index is after it, and merging with it yields
//!   the other operand.
//! - `Simple` is a leader-local sequence number, qualified by the number of times the node has
//!   rebooted so that sequences restarting from zero after a reboot still move forward.
//! - `Recover` maps node IDs to the simple index assigned to data recovered from disk on that node.
//! - `Consensus` maps consensus peer IDs to the highest search index attributed to that peer.
//! - `Hybrid` combines indices of different variants, keyed by variant kind.
//!
//! Comparing indices of unrelated variants is never an error; `is_after` is conservatively false.
//!
//! ## Total Order Approximation
//! Every index projects to a `TotalOrderSumTuple`, which is used to give collections of indices a
//! deterministic order for display and batching. That order carries no meaning beyond that.

mod tuple;
#[cfg(test)]
mod tuple_test;

use std::collections::BTreeMap;
use std::fmt;

use crate::meta::NodeId;
pub use tuple::TotalOrderSumTuple;

/// The ID of a consensus peer.
pub type PeerId = i32;

/// The kind of a progress index variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProgressIndexKind {
    Minimum,
    Simple,
    Recover,
    Consensus,
    Hybrid,
}

/// A mergeable, partially ordered marker of replication progress.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProgressIndex {
    /// The bottom element.
    Minimum,
    /// A leader-local sequence number.
    Simple(SimpleProgressIndex),
    /// Progress of data recovered from disk, per node.
    Recover(RecoverProgressIndex),
    /// Progress attributed to each peer of a consensus group.
    Consensus(ConsensusProgressIndex),
    /// A combination of indices of different kinds.
    Hybrid(HybridProgressIndex),
}

impl Default for ProgressIndex {
    fn default() -> Self {
        Self::Minimum
    }
}

impl ProgressIndex {
    /// Create a new simple progress index.
    pub fn simple(reboot_times: u64, sequence: u64) -> Self {
        Self::Simple(SimpleProgressIndex::new(reboot_times, sequence))
    }

    /// Create a new consensus progress index from the given peer search indices.
    pub fn consensus<I: IntoIterator<Item = (PeerId, u64)>>(peers: I) -> Self {
        Self::Consensus(ConsensusProgressIndex { peers: peers.into_iter().collect() })
    }

    /// Create a new recover progress index from the given per-node simple indices.
    pub fn recover<I: IntoIterator<Item = (NodeId, SimpleProgressIndex)>>(nodes: I) -> Self {
        Self::Recover(RecoverProgressIndex { nodes: nodes.into_iter().collect() })
    }

    /// Combine the given indices into a single index.
    ///
    /// The result is canonical: a combination of indices of a single kind collapses into an index
    /// of that kind, and an empty combination is `Minimum`.
    pub fn hybrid<I: IntoIterator<Item = ProgressIndex>>(indices: I) -> Self {
        indices.into_iter().fold(Self::Minimum, |acc, idx| acc.merge(&idx))
    }

    /// The kind of this index.
    pub fn kind(&self) -> ProgressIndexKind {
        match self {
            Self::Minimum => ProgressIndexKind::Minimum,
            Self::Simple(_) => ProgressIndexKind::Simple,
            Self::Recover(_) => ProgressIndexKind::Recover,
            Self::Consensus(_) => ProgressIndexKind::Consensus,
            Self::Hybrid(_) => ProgressIndexKind::Hybrid,
        }
    }

    pub fn is_minimum(&self) -> bool {
        matches!(self, Self::Minimum)
    }

    /// Check if this index strictly dominates the given index.
    ///
    /// This relation is irreflexive, and `a.is_after(b) && b.is_after(a)` never holds. Two
    /// indices may be incomparable, in which case both directions are false.
    pub fn is_after(&self, other: &ProgressIndex) -> bool {
        if self == other {
            return false;
        }
        match (self, other) {
            (Self::Minimum, _) => false,
            (_, Self::Minimum) => true,
            (Self::Simple(this), Self::Simple(that)) => this.is_after(that),
            (Self::Recover(this), Self::Recover(that)) => this.is_after(that),
            (Self::Consensus(this), Self::Consensus(that)) => this.is_after(that),
            (Self::Hybrid(this), Self::Hybrid(that)) => that.components.values().all(|component| this.is_after_component(component)),
            (Self::Hybrid(this), that) => this.is_after_component(that),
            _ => false,
        }
    }

    /// Merge this index with the given index, returning their least upper bound.
    ///
    /// Merging is commutative and associative, and `Minimum` is its identity element. Neither
    /// operand is modified.
    pub fn merge(&self, other: &ProgressIndex) -> ProgressIndex {
        match (self, other) {
            (Self::Minimum, that) => that.clone(),
            (this, Self::Minimum) => this.clone(),
            (Self::Simple(this), Self::Simple(that)) => Self::Simple(*this.max(that)),
            (Self::Recover(this), Self::Recover(that)) => Self::Recover(this.merge(that)),
            (Self::Consensus(this), Self::Consensus(that)) => Self::Consensus(this.merge(that)),
            (Self::Hybrid(this), Self::Hybrid(that)) => {
                let mut merged = this.clone();
                that.components.values().for_each(|component| merged.absorb(component));
                Self::Hybrid(merged)
            }
            (Self::Hybrid(hybrid), that) | (that, Self::Hybrid(hybrid)) => {
                let mut merged = hybrid.clone();
                merged.absorb(that);
                Self::Hybrid(merged)
            }
            (this, that) => {
                let mut merged = HybridProgressIndex::default();
                merged.absorb(this);
                merged.absorb(that);
                Self::Hybrid(merged)
            }
        }
    }

    /// Blend two optional indices together.
    ///
    /// An absent operand yields the other operand, two absent operands yield `Minimum`, otherwise
    /// this is `merge`.
    pub fn blend(first: Option<&ProgressIndex>, second: Option<&ProgressIndex>) -> ProgressIndex {
        match (first, second) {
            (None, None) => Self::Minimum,
            (Some(idx), None) | (None, Some(idx)) => idx.clone(),
            (Some(first), Some(second)) => first.merge(second),
        }
    }

    /// Project this index onto its total order tuple.
    pub fn total_order_sum_tuple(&self) -> TotalOrderSumTuple {
        match self {
            Self::Minimum => TotalOrderSumTuple::default(),
            Self::Simple(idx) => idx.total_order_sum_tuple(),
            Self::Recover(idx) => {
                let tuples: Vec<_> = idx.nodes.values().map(SimpleProgressIndex::total_order_sum_tuple).collect();
                TotalOrderSumTuple::sum(&tuples)
            }
            Self::Consensus(idx) => TotalOrderSumTuple::new(vec![idx.peers.values().fold(0u64, |acc, val| acc.saturating_add(*val))]),
            Self::Hybrid(idx) => {
                let tuples: Vec<_> = idx.components.values().map(ProgressIndex::total_order_sum_tuple).collect();
                TotalOrderSumTuple::sum(&tuples)
            }
        }
    }

    /// Sort the given indices by their total order tuples.
    ///
    /// The sort is stable. It only gives a deterministic order and says nothing about which
    /// indices are actually after others.
    pub fn topological_sort(indices: &mut [ProgressIndex]) {
        indices.sort_by_cached_key(ProgressIndex::total_order_sum_tuple);
    }
}

impl fmt::Display for ProgressIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimum => write!(f, "Minimum"),
            Self::Simple(idx) => write!(f, "Simple({}:{})", idx.reboot_times, idx.sequence),
            Self::Recover(idx) => {
                write!(f, "Recover{{")?;
                for (pos, (node, simple)) in idx.nodes.iter().enumerate() {
                    if pos > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}:{}", node, simple.reboot_times, simple.sequence)?;
                }
                write!(f, "}}")
            }
            Self::Consensus(idx) => {
                write!(f, "Consensus{{")?;
                for (pos, (peer, search_index)) in idx.peers.iter().enumerate() {
                    if pos > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", peer, search_index)?;
                }
                write!(f, "}}")
            }
            Self::Hybrid(idx) => {
                write!(f, "Hybrid[")?;
                for (pos, component) in idx.components.values().enumerate() {
                    if pos > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", component)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A leader-local sequence number qualified by the reboot count of the node which assigned it.
///
/// Field order matters: the derived ordering compares reboot times first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimpleProgressIndex {
    pub reboot_times: u64,
    pub sequence: u64,
}

impl SimpleProgressIndex {
    pub fn new(reboot_times: u64, sequence: u64) -> Self {
        Self { reboot_times, sequence }
    }

    fn is_after(&self, other: &Self) -> bool {
        self > other
    }

    /// The last element is the most significant one, so the reboot count goes last.
    fn total_order_sum_tuple(&self) -> TotalOrderSumTuple {
        TotalOrderSumTuple::new(vec![self.sequence, self.reboot_times])
    }
}

/// Progress of data recovered from disk, keyed by the node which recovered it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RecoverProgressIndex {
    pub nodes: BTreeMap<NodeId, SimpleProgressIndex>,
}

impl RecoverProgressIndex {
    fn is_after(&self, other: &Self) -> bool {
        other
            .nodes
            .iter()
            .all(|(node, that)| self.nodes.get(node).map_or(false, |this| this.is_after(that)))
    }

    fn merge(&self, other: &Self) -> Self {
        let mut nodes = self.nodes.clone();
        for (node, that) in other.nodes.iter() {
            nodes.entry(*node).and_modify(|this| *this = (*this).max(*that)).or_insert(*that);
        }
        Self { nodes }
    }
}

/// Progress attributed to each peer of a consensus group.
///
/// Dominance over another index requires a strictly greater search index for every peer of the
/// other index. A tie on any shared peer means the indices are not ordered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConsensusProgressIndex {
    pub peers: BTreeMap<PeerId, u64>,
}

impl ConsensusProgressIndex {
    fn is_after(&self, other: &Self) -> bool {
        other
            .peers
            .iter()
            .all(|(peer, that)| self.peers.get(peer).map_or(false, |this| this > that))
    }

    fn merge(&self, other: &Self) -> Self {
        let mut peers = self.peers.clone();
        for (peer, that) in other.peers.iter() {
            peers.entry(*peer).and_modify(|this| *this = (*this).max(*that)).or_insert(*that);
        }
        Self { peers }
    }
}

/// A combination of indices of different kinds.
///
/// Components are never `Minimum` or `Hybrid`, and there is at most one component per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HybridProgressIndex {
    components: BTreeMap<ProgressIndexKind, ProgressIndex>,
}

impl HybridProgressIndex {
    /// The components of this index, keyed by kind.
    pub fn components(&self) -> &BTreeMap<ProgressIndexKind, ProgressIndex> {
        &self.components
    }

    fn is_after_component(&self, component: &ProgressIndex) -> bool {
        self.components.get(&component.kind()).map_or(false, |this| this.is_after(component))
    }

    /// Merge a non-hybrid index into the component of the same kind.
    fn absorb(&mut self, index: &ProgressIndex) {
        match index {
            ProgressIndex::Minimum => (),
            ProgressIndex::Hybrid(hybrid) => hybrid.components.values().for_each(|component| self.absorb(component)),
            _ => {
                let merged = match self.components.get(&index.kind()) {
                    Some(current) => current.merge(index),
                    None => index.clone(),
                };
                self.components.insert(index.kind(), merged);
            }
        }
    }
}

//! Connectivity engine - match and dead-cell detection
//!
//! Uses depth-first flood fill over the distance-neighbor graph of the
//! lattice index. A same-color component of `min_match` or more pops; after
//! that, anything no longer reachable from the anchor cell falls.

use std::collections::HashSet;

use super::bubble::{BubbleColor, BubbleId};
use super::geometry::CellCoord;
use super::lattice::LatticeIndex;

/// Same-color component around a trigger bubble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSet {
    pub color: BubbleColor,
    /// Members in discovery order, trigger first
    pub members: Vec<BubbleId>,
}

impl MatchSet {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: BubbleId) -> bool {
        self.members.contains(&id)
    }
}

/// Outcome of the dead-cell search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadScan {
    /// Bubbles with no path to the anchor, in cell order
    Dead(Vec<BubbleId>),
    /// Anchor cell empty (or popped); no disconnection pass
    NoAnchor,
}

impl DeadScan {
    /// Dead bubbles, treating a missing anchor as "none dead"
    pub fn into_dead(self) -> Vec<BubbleId> {
        match self {
            DeadScan::Dead(dead) => dead,
            DeadScan::NoAnchor => Vec::new(),
        }
    }
}

/// Flood-fill the same-color component containing the bubble at `start`.
///
/// `color_of` resolves the color of an attached bubble. Returns an empty set
/// if `start` is unoccupied; a colorless trigger yields just itself.
pub fn find_match<F>(index: &LatticeIndex, start: CellCoord, color_of: F) -> MatchSet
where
    F: Fn(BubbleId) -> Option<BubbleColor>,
{
    let Some(start_id) = index.get(start) else {
        return MatchSet {
            color: BubbleColor::Core,
            members: Vec::new(),
        };
    };
    let color = color_of(start_id).unwrap_or(BubbleColor::Core);
    let mut members = vec![start_id];
    if !color.is_matchable() {
        return MatchSet { color, members };
    }

    let mut visited = HashSet::from([start_id]);
    let mut stack = vec![start];

    while let Some(cell) = stack.pop() {
        for (neighbor_cell, neighbor) in index.neighbors(cell) {
            if visited.contains(&neighbor) || color_of(neighbor) != Some(color) {
                continue;
            }
            visited.insert(neighbor);
            members.push(neighbor);
            stack.push(neighbor_cell);
        }
    }

    MatchSet { color, members }
}

/// Find attached bubbles with no path to `anchor` once `matched` is gone.
pub fn find_dead(index: &LatticeIndex, anchor: CellCoord, matched: &HashSet<BubbleId>) -> DeadScan {
    let Some(anchor_id) = index.get(anchor) else {
        return DeadScan::NoAnchor;
    };
    if matched.contains(&anchor_id) {
        return DeadScan::NoAnchor;
    }

    let mut connected = HashSet::from([anchor_id]);
    let mut stack = vec![anchor];

    while let Some(cell) = stack.pop() {
        for (neighbor_cell, neighbor) in index.neighbors(cell) {
            if connected.contains(&neighbor) || matched.contains(&neighbor) {
                continue;
            }
            connected.insert(neighbor);
            stack.push(neighbor_cell);
        }
    }

    DeadScan::Dead(
        index
            .ids()
            .filter(|id| !connected.contains(id) && !matched.contains(id))
            .collect(),
    )
}

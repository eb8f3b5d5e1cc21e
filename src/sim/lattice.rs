//! Lattice index: which attached bubble occupies which cell
//!
//! Sparse storage keyed by cell, ordered so every scan is deterministic.
//! Neighbors are found by distance (within one cell height of each other),
//! not by a fixed adjacency template.

use std::collections::BTreeMap;

use glam::Vec2;
use thiserror::Error;

use super::bubble::BubbleId;
use super::geometry::CellCoord;

/// Errors for lattice registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LatticeError {
    #[error("cell {cell} already holds bubble {occupant}")]
    CellOccupied { cell: CellCoord, occupant: BubbleId },

    #[error("no bubble with id {0}")]
    UnknownBubble(BubbleId),

    #[error("bubble {0} is not free")]
    NotFree(BubbleId),

    #[error("no empty cell found near {0}")]
    NoEmptyCell(CellCoord),
}

/// An occupied cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub id: BubbleId,
    /// Cell center in the group's local frame
    pub local: Vec2,
}

/// Cell -> attached bubble map
#[derive(Debug, Clone, Default)]
pub struct LatticeIndex {
    cells: BTreeMap<CellCoord, Slot>,
    /// Neighbor distance (one cell height)
    neighbor_distance: f32,
}

impl LatticeIndex {
    pub fn new(neighbor_distance: f32) -> Self {
        Self {
            cells: BTreeMap::new(),
            neighbor_distance,
        }
    }

    /// Bubble occupying `cell`, if any
    pub fn get(&self, cell: CellCoord) -> Option<BubbleId> {
        self.cells.get(&cell).map(|slot| slot.id)
    }

    pub fn is_occupied(&self, cell: CellCoord) -> bool {
        self.cells.contains_key(&cell)
    }

    /// Register a bubble at `cell`. Never overwrites an occupant.
    pub fn insert(&mut self, id: BubbleId, cell: CellCoord, local: Vec2) -> Result<(), LatticeError> {
        if let Some(slot) = self.cells.get(&cell) {
            return Err(LatticeError::CellOccupied {
                cell,
                occupant: slot.id,
            });
        }
        self.cells.insert(cell, Slot { id, local });
        Ok(())
    }

    /// Remove a bubble wherever it sits. Returns its cell if it was present.
    pub fn remove(&mut self, id: BubbleId) -> Option<CellCoord> {
        let cell = self
            .cells
            .iter()
            .find_map(|(cell, slot)| (slot.id == id).then_some(*cell))?;
        self.cells.remove(&cell);
        Some(cell)
    }

    /// Attached bubbles within one cell height of `cell` (excluding its occupant)
    ///
    /// Linear scan over all occupied cells; attached counts are in the tens.
    pub fn neighbors(&self, cell: CellCoord) -> Vec<(CellCoord, BubbleId)> {
        let Some(origin) = self.cells.get(&cell) else {
            return Vec::new();
        };
        let max_sq = self.neighbor_distance * self.neighbor_distance;
        self.cells
            .iter()
            .filter(|(other, slot)| {
                **other != cell && (slot.local - origin.local).length_squared() <= max_sq
            })
            .map(|(other, slot)| (*other, slot.id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate occupied cells in cell order
    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, &Slot)> {
        self.cells.iter().map(|(cell, slot)| (*cell, slot))
    }

    /// Attached bubble ids in cell order
    pub fn ids(&self) -> impl Iterator<Item = BubbleId> + '_ {
        self.cells.values().map(|slot| slot.id)
    }
}

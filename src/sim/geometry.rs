//! Lattice geometry: cell coordinates, the cell <-> position mapping, and the
//! rotating group transform
//!
//! Cells are offset hex coordinates (odd-r, pointy-top): odd rows are shifted
//! right by half a cell width. See <https://www.redblobgames.com/grids/hexagons/>.
//!
//! The mapping works in the group's local frame. `GroupTransform` carries
//! positions between that frame and world space, so the whole lattice can
//! rotate without any cell changing.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Square root of 3, used frequently in hex math.
pub const SQRT_3: f32 = 1.732_050_8;

/// Discrete lattice cell (column `x`, row `y`)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for CellCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cell <-> local position mapping supplied to the lattice core
///
/// Implementations must be round-trip stable:
/// `local_to_cell(cell_to_local(c)) == c` for every cell.
pub trait LatticeGeometry {
    /// Center of `cell` in the group's local frame
    fn cell_to_local(&self, cell: CellCoord) -> Vec2;

    /// Cell whose area contains `local`
    fn local_to_cell(&self, local: Vec2) -> CellCoord;

    /// Cell extent (width, height)
    fn cell_size(&self) -> Vec2;

    /// Cells sharing an edge with `cell`
    fn adjacent_cells(&self, cell: CellCoord) -> Vec<CellCoord>;

    /// Distance under which two attached bubbles are neighbors
    fn cell_height(&self) -> f32 {
        self.cell_size().y
    }
}

/// Pointy-top hex layout with odd rows shifted right
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HexLayout {
    /// Outer radius (center to vertex)
    pub size: f32,
}

impl Default for HexLayout {
    fn default() -> Self {
        Self {
            size: crate::consts::HEX_SIZE,
        }
    }
}

impl HexLayout {
    pub fn new(size: f32) -> Self {
        Self { size }
    }

    /// Round fractional axial coordinates to the containing hex
    fn axial_round(q: f32, r: f32) -> (i32, i32) {
        let s = -q - r;
        let mut rq = q.round();
        let mut rr = r.round();
        let rs = s.round();

        let dq = (rq - q).abs();
        let dr = (rr - r).abs();
        let ds = (rs - s).abs();

        if dq > dr && dq > ds {
            rq = -rr - rs;
        } else if dr > ds {
            rr = -rq - rs;
        }
        (rq as i32, rr as i32)
    }
}

impl LatticeGeometry for HexLayout {
    fn cell_to_local(&self, cell: CellCoord) -> Vec2 {
        // Odd rows shift right by half a hex width
        let row_offset = if cell.y % 2 != 0 { 0.5 } else { 0.0 };
        let x = self.size * SQRT_3 * (cell.x as f32 + row_offset);
        let y = self.size * 1.5 * cell.y as f32;
        Vec2::new(x, y)
    }

    fn local_to_cell(&self, local: Vec2) -> CellCoord {
        let q = (SQRT_3 / 3.0 * local.x - local.y / 3.0) / self.size;
        let r = (2.0 / 3.0 * local.y) / self.size;
        let (q, r) = Self::axial_round(q, r);
        // Axial -> odd-r offset
        CellCoord::new(q + (r - (r & 1)) / 2, r)
    }

    fn cell_size(&self) -> Vec2 {
        Vec2::new(self.size * SQRT_3, self.size * 2.0)
    }

    fn adjacent_cells(&self, cell: CellCoord) -> Vec<CellCoord> {
        let (x, y) = (cell.x, cell.y);
        if y % 2 != 0 {
            vec![
                CellCoord::new(x + 1, y),
                CellCoord::new(x + 1, y + 1),
                CellCoord::new(x, y + 1),
                CellCoord::new(x - 1, y),
                CellCoord::new(x, y - 1),
                CellCoord::new(x + 1, y - 1),
            ]
        } else {
            vec![
                CellCoord::new(x + 1, y),
                CellCoord::new(x, y + 1),
                CellCoord::new(x - 1, y + 1),
                CellCoord::new(x - 1, y),
                CellCoord::new(x - 1, y - 1),
                CellCoord::new(x, y - 1),
            ]
        }
    }
}

/// Placement of the lattice in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupTransform {
    /// World position of the lattice origin (rotation pivot)
    pub center: Vec2,
    /// Rotation in radians, counter-clockwise
    pub rotation: f32,
}

impl GroupTransform {
    pub fn new(center: Vec2, rotation: f32) -> Self {
        Self { center, rotation }
    }

    #[inline]
    pub fn local_to_world(&self, local: Vec2) -> Vec2 {
        self.center + self.rotate_vector(local)
    }

    #[inline]
    pub fn world_to_local(&self, world: Vec2) -> Vec2 {
        self.unrotate_vector(world - self.center)
    }

    /// Rotate a local-frame direction into world space
    #[inline]
    pub fn rotate_vector(&self, v: Vec2) -> Vec2 {
        Vec2::from_angle(self.rotation).rotate(v)
    }

    /// Rotate a world-space direction into the local frame
    #[inline]
    pub fn unrotate_vector(&self, v: Vec2) -> Vec2 {
        Vec2::from_angle(-self.rotation).rotate(v)
    }
}

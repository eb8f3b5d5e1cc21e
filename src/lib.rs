//! Bubble Orbit - a rotating bubble-lattice match-3 core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (lattice, connectivity, spring physics, tick)
//! - `settings`: Data-driven tuning for the lattice physics

pub mod settings;
pub mod sim;

pub use settings::{GameSettings, SettingsError};

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    use crate::sim::CellCoord;

    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Cell that defines "connected to the board"
    pub const ANCHOR_CELL: CellCoord = CellCoord::new(0, 0);

    /// Hex outer radius (center to vertex) in world units
    pub const HEX_SIZE: f32 = 0.5;

    /// Squared distance under which a snapping bubble counts as settled
    pub const SETTLE_EPSILON: f32 = 1e-4;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f32, theta: f32) -> Vec2 {
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Convert cartesian (x, y) to polar (r, theta)
#[inline]
pub fn cartesian_to_polar(pos: Vec2) -> (f32, f32) {
    (pos.length(), pos.y.atan2(pos.x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_normalize_angle_wraps() {
        assert!((normalize_angle(3.0 * PI) - (-PI)).abs() < 1e-5);
        assert!((normalize_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert_eq!(normalize_angle(0.25), 0.25);
    }

    #[test]
    fn test_polar_roundtrip() {
        let p = polar_to_cartesian(3.0, 0.75);
        let (r, theta) = cartesian_to_polar(p);
        assert!((r - 3.0).abs() < 1e-5);
        assert!((theta - 0.75).abs() < 1e-5);
    }
}

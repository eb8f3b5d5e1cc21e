//! Lattice physics and connectivity tuning
//!
//! Loaded from JSON by the host; every field has a default so partial files work.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{ANCHOR_CELL, SETTLE_EPSILON};
use crate::sim::CellCoord;

/// Errors raised while loading or validating settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Tuning values shared by every component of the lattice core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    // === Spring ===
    /// Spring stiffness pulling the visual offset back to rest
    pub spring: f32,
    /// Velocity damping factor per tick (0-1)
    pub damp: f32,
    /// Maximum magnitude of the accumulated external force per bubble
    pub max_force: f32,
    /// Scale of the rotation-reaction force
    pub rotate_force: f32,
    /// Spring velocity that maps to a full +1 scale pulse
    pub spring_scale_max_velocity: f32,

    // === Impacts ===
    /// Stick impact force at the reference speed
    pub stick_impact_force: f32,
    /// Impact force applied at each matched bubble
    pub match_impact_force: f32,
    /// Impact falloff radius in cell heights
    pub impact_range_cells: f32,
    /// Impact speed that yields exactly `stick_impact_force`
    pub stick_reference_speed: f32,

    // === Disconnect ===
    /// Impulse magnitude (outward and upward) given to disconnected bubbles
    pub disconnect_impulse: f32,
    /// Downward gravity for falling bubbles
    pub gravity: f32,
    /// Seconds before a disconnected bubble goes back to the pool
    pub disconnect_lifetime: f32,

    // === Matching ===
    /// Minimum same-color group size that pops
    pub min_match: usize,
    /// Seconds a match burst effect lives before release
    pub match_effect_lifetime: f32,
    /// Camera impulse magnitude per match
    pub camera_impulse_scale: f32,
    /// Cell that defines "connected to the board"
    pub anchor: CellCoord,

    // === Stick ===
    /// Seconds for a stuck bubble to ease into its cell
    pub snap_duration: f32,
    /// Squared distance under which a snapping bubble counts as settled
    pub settle_epsilon: f32,
    /// Maximum half-cell back-off steps before falling back to a ring search
    pub stick_backoff_limit: u32,

    // === Projectiles ===
    /// Free bubbles farther than this beyond the group radius are returned to the pool
    pub despawn_distance: f32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            spring: 5.0,
            damp: 0.9,
            max_force: 6.0,
            rotate_force: 0.5,
            spring_scale_max_velocity: 20.0,

            stick_impact_force: 2.5,
            match_impact_force: 2.0,
            impact_range_cells: 10.0,
            stick_reference_speed: 5.0,

            disconnect_impulse: 5.0,
            gravity: 9.81,
            disconnect_lifetime: 3.0,

            min_match: 3,
            match_effect_lifetime: 2.0,
            camera_impulse_scale: 1.5,
            anchor: ANCHOR_CELL,

            snap_duration: 0.1,
            settle_epsilon: SETTLE_EPSILON,
            stick_backoff_limit: 64,

            despawn_distance: 20.0,
        }
    }
}

impl GameSettings {
    /// Parse and validate settings from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load settings from a JSON file, falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(err) => {
                log::warn!("Using default settings ({err})");
                Self::default()
            }
        }
    }

    /// Reject values the integrator or flood fill cannot work with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.damp > 0.0 && self.damp <= 1.0) {
            return Err(SettingsError::Invalid {
                field: "damp",
                reason: "must be in (0, 1]",
            });
        }
        if self.spring <= 0.0 {
            return Err(SettingsError::Invalid {
                field: "spring",
                reason: "must be positive",
            });
        }
        if self.max_force < 0.0 {
            return Err(SettingsError::Invalid {
                field: "max_force",
                reason: "must not be negative",
            });
        }
        if self.impact_range_cells <= 0.0 {
            return Err(SettingsError::Invalid {
                field: "impact_range_cells",
                reason: "must be positive",
            });
        }
        if self.stick_reference_speed <= 0.0 {
            return Err(SettingsError::Invalid {
                field: "stick_reference_speed",
                reason: "must be positive",
            });
        }
        if self.min_match < 2 {
            return Err(SettingsError::Invalid {
                field: "min_match",
                reason: "must be at least 2",
            });
        }
        let non_negative = [
            ("snap_duration", self.snap_duration),
            ("settle_epsilon", self.settle_epsilon),
            ("disconnect_lifetime", self.disconnect_lifetime),
            ("match_effect_lifetime", self.match_effect_lifetime),
            ("gravity", self.gravity),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) {
                return Err(SettingsError::Invalid {
                    field,
                    reason: "must not be negative",
                });
            }
        }
        if self.despawn_distance <= 0.0 {
            return Err(SettingsError::Invalid {
                field: "despawn_distance",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Stick impact force for a bubble arriving at `speed`
    pub fn stick_force_for_speed(&self, speed: f32) -> f32 {
        self.stick_impact_force * speed / self.stick_reference_speed
    }
}

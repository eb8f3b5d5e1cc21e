//! Deterministic simulation module
//!
//! All lattice logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by bubble ID, then by cell)
//! - Presentation goes through the pool and effect seams in `services`

pub mod bubble;
pub mod collision;
pub mod connectivity;
pub mod geometry;
pub mod group;
pub mod impact;
pub mod lattice;
pub mod schedule;
pub mod services;
pub mod tick;

pub use bubble::{Bubble, BubbleColor, BubbleId, BubbleState};
pub use collision::{Contact, find_contacts};
pub use connectivity::{DeadScan, MatchSet, find_dead, find_match};
pub use geometry::{CellCoord, GroupTransform, HexLayout, LatticeGeometry};
pub use group::{LatticeGroup, MatchOutcome};
pub use impact::{apply_impact, impact_force};
pub use lattice::{LatticeError, LatticeIndex};
pub use schedule::{Deferred, DeferredQueue};
pub use services::{
    BubblePool, Effect, EffectLog, EffectSink, PoolHandle, PrefabKind, RecyclingPool, Services,
};
pub use tick::{TickInput, TickReport, tick};

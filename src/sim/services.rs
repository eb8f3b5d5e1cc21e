//! Collaborators the lattice core talks to: the object pool and the effects
//! layer (camera shake, score popups, audio)
//!
//! Both are handed to the group at construction. The defaults here are
//! complete enough for headless runs and tests: a recycling pool and an
//! effect log the host drains each frame.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Instance handle returned by the pool
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct PoolHandle(pub u32);

/// Kinds of pooled instances the core asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrefabKind {
    Bubble,
    /// Short-lived burst spawned where a bubble popped
    MatchBurst,
}

/// Object pool boundary
pub trait BubblePool {
    /// Obtain a fresh or recycled instance
    fn acquire(&mut self, kind: PrefabKind) -> PoolHandle;

    /// Return an instance; releasing an unknown or already-released handle is a no-op
    fn release(&mut self, handle: PoolHandle);
}

/// Fire-and-forget notifications
pub trait EffectSink {
    /// A group popped: centroid of the matched bubbles and the combo value
    fn notify_match(&mut self, centroid: Vec2, combo: usize);

    /// A projectile stuck at `position` with the given impact magnitude
    fn notify_stick(&mut self, position: Vec2, magnitude: f32);

    /// Camera kick for a match
    fn camera_impulse(&mut self, velocity: Vec2);
}

/// Explicit service context owned by the group
#[derive(Debug, Default)]
pub struct Services<P, E> {
    pub pool: P,
    pub effects: E,
}

impl<P: BubblePool, E: EffectSink> Services<P, E> {
    pub fn new(pool: P, effects: E) -> Self {
        Self { pool, effects }
    }
}

/// Pool that recycles released instances per kind
#[derive(Debug, Clone, Default)]
pub struct RecyclingPool {
    next_handle: u32,
    live: BTreeMap<PoolHandle, PrefabKind>,
    idle: Vec<(PrefabKind, PoolHandle)>,
    /// Successful releases (duplicates are not counted)
    released: u32,
}

impl RecyclingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, handle: PoolHandle) -> bool {
        self.live.contains_key(&handle)
    }

    /// Instances currently handed out
    pub fn live_count(&self, kind: PrefabKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    /// Instances waiting to be reused
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn released(&self) -> u32 {
        self.released
    }
}

impl BubblePool for RecyclingPool {
    fn acquire(&mut self, kind: PrefabKind) -> PoolHandle {
        let handle = match self.idle.iter().position(|(k, _)| *k == kind) {
            Some(i) => self.idle.swap_remove(i).1,
            None => {
                self.next_handle += 1;
                PoolHandle(self.next_handle)
            }
        };
        self.live.insert(handle, kind);
        handle
    }

    fn release(&mut self, handle: PoolHandle) {
        if let Some(kind) = self.live.remove(&handle) {
            self.idle.push((kind, handle));
            self.released += 1;
        }
    }
}

/// A recorded notification
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Match { centroid: Vec2, combo: usize },
    Stick { position: Vec2, magnitude: f32 },
    CameraImpulse { velocity: Vec2 },
}

/// Effect sink that records notifications for the host to consume
#[derive(Debug, Clone, Default)]
pub struct EffectLog {
    effects: Vec<Effect>,
}

impl EffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Take everything recorded so far
    pub fn drain(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Recorded match notifications as (centroid, combo)
    pub fn matches(&self) -> Vec<(Vec2, usize)> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Match { centroid, combo } => Some((*centroid, *combo)),
                _ => None,
            })
            .collect()
    }
}

impl EffectSink for EffectLog {
    fn notify_match(&mut self, centroid: Vec2, combo: usize) {
        self.effects.push(Effect::Match { centroid, combo });
    }

    fn notify_stick(&mut self, position: Vec2, magnitude: f32) {
        self.effects.push(Effect::Stick {
            position,
            magnitude,
        });
    }

    fn camera_impulse(&mut self, velocity: Vec2) {
        self.effects.push(Effect::CameraImpulse { velocity });
    }
}

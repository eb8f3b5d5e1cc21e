//! The lattice group: every bubble the core knows about, the cell index, and
//! the rotating transform they all inherit
//!
//! Bubbles are kept sorted by id for deterministic iteration. Free and
//! falling bubbles live here too so a single tick can move, stick, evaluate
//! and release them in a fixed order.

use std::collections::{HashSet, VecDeque};

use glam::Vec2;

use super::bubble::{Bubble, BubbleColor, BubbleId, BubbleState};
use super::collision::{Contact, find_contacts};
use super::connectivity::{DeadScan, find_dead, find_match};
use super::geometry::{CellCoord, GroupTransform, HexLayout, LatticeGeometry};
use super::impact;
use super::lattice::{LatticeError, LatticeIndex};
use super::schedule::{Deferred, DeferredQueue};
use super::services::{BubblePool, EffectLog, EffectSink, PrefabKind, RecyclingPool, Services};
use crate::normalize_angle;
use crate::settings::GameSettings;

/// Upper bound on cells visited by the nearest-empty-cell search
const MAX_RING_SEARCH: usize = 1000;

/// One popped group and what fell with it
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub color: BubbleColor,
    pub matched: Vec<BubbleId>,
    pub dead: Vec<BubbleId>,
    /// World centroid of the matched bubbles
    pub centroid: Vec2,
    /// |matched| + |dead|
    pub combo: usize,
}

/// Rotating lattice of attached bubbles plus the free and falling ones
#[derive(Debug)]
pub struct LatticeGroup<G = HexLayout, P = RecyclingPool, E = EffectLog> {
    pub settings: GameSettings,
    pub services: Services<P, E>,
    geometry: G,
    transform: GroupTransform,
    /// All live bubbles, sorted by id
    bubbles: Vec<Bubble>,
    index: LatticeIndex,
    /// Stuck bubbles awaiting connectivity evaluation, in stick order
    pending: Vec<BubbleId>,
    schedule: DeferredQueue,
    /// Simulation time in seconds
    time: f64,
    time_ticks: u64,
    /// Farthest attached cell from the pivot
    radius: f32,
    last_combo: usize,
    next_id: u32,
}

impl LatticeGroup {
    /// Hex lattice with the default pool and effect log
    pub fn new(settings: GameSettings) -> Self {
        Self::with_parts(settings, HexLayout::default(), Services::default())
    }
}

impl<G: LatticeGeometry, P: BubblePool, E: EffectSink> LatticeGroup<G, P, E> {
    pub fn with_parts(settings: GameSettings, geometry: G, services: Services<P, E>) -> Self {
        let index = LatticeIndex::new(geometry.cell_height());
        Self {
            settings,
            services,
            geometry,
            transform: GroupTransform::default(),
            bubbles: Vec::new(),
            index,
            pending: Vec::new(),
            schedule: DeferredQueue::new(),
            time: 0.0,
            time_ticks: 0,
            radius: 0.0,
            last_combo: 0,
            next_id: 1,
        }
    }

    /// Place the lattice pivot in world space
    ///
    /// Resting bubbles move with the pivot without picking up any velocity.
    pub fn with_center(mut self, center: Vec2) -> Self {
        self.transform.center = center;
        self.refresh_world_positions();
        for bubble in self.bubbles.iter_mut().filter(|b| b.is_attached()) {
            bubble.prev_pos = bubble.pos;
        }
        self
    }

    fn next_bubble_id(&mut self) -> BubbleId {
        let id = BubbleId(self.next_id);
        self.next_id += 1;
        id
    }

    fn position(&self, id: BubbleId) -> Option<usize> {
        self.bubbles.binary_search_by_key(&id, |b| b.id).ok()
    }

    // === Accessors ===

    pub fn bubble(&self, id: BubbleId) -> Option<&Bubble> {
        self.position(id).map(|i| &self.bubbles[i])
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn attached(&self) -> impl Iterator<Item = &Bubble> {
        self.bubbles.iter().filter(|b| b.is_attached())
    }

    pub fn attached_count(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &LatticeIndex {
        &self.index
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn transform(&self) -> &GroupTransform {
        &self.transform
    }

    pub fn pending(&self) -> &[BubbleId] {
        &self.pending
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn time_ticks(&self) -> u64 {
        self.time_ticks
    }

    /// Farthest attached cell center from the pivot
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Combo value of the most recent match
    pub fn last_combo(&self) -> usize {
        self.last_combo
    }

    /// Deferred releases still waiting
    pub fn scheduled(&self) -> usize {
        self.schedule.len()
    }

    /// Bubble occupying `cell`
    pub fn get(&self, cell: CellCoord) -> Option<&Bubble> {
        self.index.get(cell).and_then(|id| self.bubble(id))
    }

    pub fn color_of(&self, id: BubbleId) -> Option<BubbleColor> {
        self.bubble(id).map(|b| b.color())
    }

    // === Geometry ===

    pub fn world_to_cell(&self, world: Vec2) -> CellCoord {
        self.geometry
            .local_to_cell(self.transform.world_to_local(world))
    }

    pub fn cell_to_world(&self, cell: CellCoord) -> Vec2 {
        self.transform
            .local_to_world(self.geometry.cell_to_local(cell))
    }

    /// Impact falloff radius in world units
    pub fn impact_range(&self) -> f32 {
        self.geometry.cell_height() * self.settings.impact_range_cells
    }

    // === Rotation ===

    /// Set the absolute rotation of the lattice
    pub fn set_rotation(&mut self, theta: f32) {
        self.transform.rotation = normalize_angle(theta);
        self.refresh_world_positions();
    }

    pub fn rotate_by(&mut self, delta: f32) {
        self.set_rotation(self.transform.rotation + delta);
    }

    fn refresh_world_positions(&mut self) {
        let transform = self.transform;
        for bubble in self.bubbles.iter_mut().filter(|b| b.is_attached()) {
            bubble.pos = transform.local_to_world(bubble.local);
        }
    }

    fn refresh_radius(&mut self) {
        self.radius = self
            .bubbles
            .iter()
            .filter(|b| b.is_attached())
            .map(|b| b.target.length())
            .fold(0.0, f32::max);
    }

    // === Spawning ===

    /// Register an already-resting bubble (initial layout). Not evaluated for matches.
    pub fn seed_bubble(&mut self, cell: CellCoord, color: BubbleColor) -> Result<BubbleId, LatticeError> {
        if let Some(occupant) = self.index.get(cell) {
            return Err(LatticeError::CellOccupied { cell, occupant });
        }
        let id = self.next_bubble_id();
        let local = self.geometry.cell_to_local(cell);
        self.index.insert(id, cell, local)?;
        let handle = self.services.pool.acquire(PrefabKind::Bubble);
        self.bubbles.push(Bubble::new_attached(
            id,
            handle,
            color,
            cell,
            local,
            &self.transform,
        ));
        self.refresh_radius();
        Ok(id)
    }

    /// Seed the colorless core at the anchor cell
    pub fn seed_core(&mut self) -> Result<BubbleId, LatticeError> {
        self.seed_bubble(self.settings.anchor, BubbleColor::Core)
    }

    /// Create a free projectile outside the lattice
    pub fn spawn_free_bubble(&mut self, pos: Vec2, color: BubbleColor, vel: Vec2) -> BubbleId {
        let id = self.next_bubble_id();
        let handle = self.services.pool.acquire(PrefabKind::Bubble);
        self.bubbles
            .push(Bubble::new_free(id, handle, pos, color, vel));
        log::debug!("Spawned {color:?} bubble {id} at {pos}");
        id
    }

    // === Stick ===

    /// Free bubbles currently touching the lattice
    pub fn detect_contacts(&self) -> Vec<Contact> {
        find_contacts(&self.bubbles, self.geometry.cell_size().x)
    }

    /// Attach a free bubble that touched the lattice.
    ///
    /// If the cell under the bubble is taken, steps back against the impact
    /// direction half a cell at a time until an empty cell turns up.
    pub fn stick(&mut self, id: BubbleId) -> Result<CellCoord, LatticeError> {
        let i = self.position(id).ok_or(LatticeError::UnknownBubble(id))?;
        if !self.bubbles[i].is_free() {
            return Err(LatticeError::NotFree(id));
        }

        let pos = self.bubbles[i].pos;
        let impact_speed = self.bubbles[i].vel.length();
        let mut impact_dir = self.bubbles[i].vel.normalize_or_zero();
        if impact_dir == Vec2::ZERO {
            impact_dir = (pos - self.transform.center).normalize_or_zero();
        }

        let cell = self.find_stick_cell(pos, impact_dir)?;
        let target = self.geometry.cell_to_local(cell);
        if let Err(e) = self.index.insert(id, cell, target) {
            log::error!("Index rejected empty cell {cell} for bubble {id}: {e}");
            return Err(e);
        }

        let transform = self.transform;
        self.bubbles[i].attach(cell, target, &transform);
        self.pending.push(id);
        self.refresh_radius();

        let cell_world = transform.local_to_world(target);
        let force = self.settings.stick_force_for_speed(impact_speed);
        self.apply_impact(cell_world, force);
        self.services.effects.notify_stick(cell_world, force);
        log::debug!("Bubble {id} stuck at {cell} (speed {impact_speed:.2})");

        Ok(cell)
    }

    fn find_stick_cell(&self, pos: Vec2, impact_dir: Vec2) -> Result<CellCoord, LatticeError> {
        let step = self.geometry.cell_height() * 0.5;
        let mut back = pos;
        let mut cell = self.world_to_cell(back);

        for _ in 0..self.settings.stick_backoff_limit {
            if !self.index.is_occupied(cell) {
                return Ok(cell);
            }
            back -= impact_dir * step;
            cell = self.world_to_cell(back);
        }
        if !self.index.is_occupied(cell) {
            return Ok(cell);
        }

        log::debug!("Back-off from {pos} found no empty cell, searching rings around {cell}");
        self.nearest_empty_cell(cell)
    }

    /// Breadth-first search over adjacent cells for the closest empty one
    fn nearest_empty_cell(&self, start: CellCoord) -> Result<CellCoord, LatticeError> {
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(cell) = queue.pop_front() {
            if !self.index.is_occupied(cell) {
                return Ok(cell);
            }
            if visited.len() > MAX_RING_SEARCH {
                break;
            }
            for next in self.geometry.adjacent_cells(cell) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        Err(LatticeError::NoEmptyCell(start))
    }

    // === Impacts ===

    /// Push attached bubbles away from `origin` (world space)
    pub fn apply_impact(&mut self, origin: Vec2, force: f32) -> usize {
        let range = self.impact_range();
        impact::apply_impact(
            self.bubbles.iter_mut(),
            &self.transform,
            origin,
            force,
            range,
            self.settings.max_force,
        )
    }

    // === Connectivity ===

    /// Whether every pending bubble has finished snapping into its cell
    pub fn is_settled(&self) -> bool {
        let epsilon = self.settings.settle_epsilon;
        self.pending
            .iter()
            .filter_map(|id| self.bubble(*id))
            .all(|b| !b.is_moving(epsilon))
    }

    /// Run match and dead-cell detection for the pending bubbles.
    ///
    /// Does nothing until all pending bubbles have settled. Pending bubbles
    /// are evaluated newest first; one already removed by an earlier match
    /// in the same pass is skipped.
    pub fn evaluate(&mut self) -> Vec<MatchOutcome> {
        if self.pending.is_empty() || !self.is_settled() {
            return Vec::new();
        }

        let pending = std::mem::take(&mut self.pending);
        let mut outcomes = Vec::new();

        for &trigger in pending.iter().rev() {
            let Some(cell) = self
                .bubble(trigger)
                .filter(|b| b.is_attached())
                .and_then(|b| b.cell)
            else {
                continue;
            };

            let set = find_match(&self.index, cell, |id| self.color_of(id));
            if set.len() < self.settings.min_match {
                continue;
            }

            let matched: HashSet<BubbleId> = set.members.iter().copied().collect();
            let dead = match find_dead(&self.index, self.settings.anchor, &matched) {
                DeadScan::Dead(dead) => dead,
                DeadScan::NoAnchor => {
                    log::warn!(
                        "Anchor cell {} is empty, skipping disconnection pass",
                        self.settings.anchor
                    );
                    Vec::new()
                }
            };

            let combo = set.len() + dead.len();
            self.last_combo = combo;

            let centroid = set
                .members
                .iter()
                .filter_map(|id| self.bubble(*id))
                .map(|b| b.pos)
                .sum::<Vec2>()
                / set.len() as f32;

            for &id in &set.members {
                self.pop_bubble(id);
            }
            for &id in &dead {
                self.disconnect_bubble(id);
            }

            self.services.effects.notify_match(centroid, combo);
            let impulse = (centroid - self.transform.center).normalize_or_zero()
                * self.settings.camera_impulse_scale;
            self.services.effects.camera_impulse(impulse);

            log::info!(
                "Matched {} {:?} bubbles at {}, {} disconnected (combo {})",
                set.len(),
                set.color,
                cell,
                dead.len(),
                combo
            );

            outcomes.push(MatchOutcome {
                color: set.color,
                matched: set.members,
                dead,
                centroid,
                combo,
            });
        }

        outcomes
    }

    /// Match transition: burst, push neighbors, leave the lattice, back to the pool
    fn pop_bubble(&mut self, id: BubbleId) {
        let Some(i) = self.position(id) else {
            return;
        };
        if !self.bubbles[i].is_attached() {
            return;
        }
        let pos = self.bubbles[i].pos;

        let burst = self.services.pool.acquire(PrefabKind::MatchBurst);
        self.schedule.schedule(
            self.time,
            self.settings.match_effect_lifetime,
            Deferred::ReleaseEffect(burst),
        );
        self.apply_impact(pos, self.settings.match_impact_force);

        self.index.remove(id);
        self.pending.retain(|p| *p != id);
        self.bubbles[i].state = BubbleState::Removed;
        self.services.pool.release(self.bubbles[i].handle);
        self.bubbles.remove(i);
        self.refresh_radius();
    }

    /// Disconnect transition: detach, fall, and release after a delay
    fn disconnect_bubble(&mut self, id: BubbleId) {
        let Some(i) = self.position(id) else {
            return;
        };
        if !self.bubbles[i].is_attached() {
            return;
        }
        let transform = self.transform;
        self.bubbles[i].begin_disconnect(&transform, self.settings.disconnect_impulse);
        self.index.remove(id);
        self.pending.retain(|p| *p != id);
        self.refresh_radius();
        self.schedule.schedule(
            self.time,
            self.settings.disconnect_lifetime,
            Deferred::ReleaseBubble(id),
        );
    }

    /// Return a falling bubble to the pool. No-op for attached, free or
    /// already released bubbles.
    pub fn release_bubble(&mut self, id: BubbleId) -> bool {
        let Some(i) = self.position(id) else {
            return false;
        };
        if self.bubbles[i].state != BubbleState::Disconnecting {
            return false;
        }
        self.bubbles[i].state = BubbleState::Removed;
        self.services.pool.release(self.bubbles[i].handle);
        self.bubbles.remove(i);
        true
    }

    /// Return a projectile that never stuck to the pool. No-op for any
    /// bubble that is not Free.
    pub fn despawn_free_bubble(&mut self, id: BubbleId) -> bool {
        let Some(i) = self.position(id) else {
            return false;
        };
        if !self.bubbles[i].is_free() {
            return false;
        }
        self.bubbles[i].state = BubbleState::Removed;
        self.services.pool.release(self.bubbles[i].handle);
        self.bubbles.remove(i);
        log::debug!("Despawned stray bubble {id}");
        true
    }

    // === Per-tick steps (driven by `tick`) ===

    pub(crate) fn advance_clock(&mut self, dt: f32) {
        self.time += f64::from(dt);
        self.time_ticks += 1;
    }

    /// Despawn free bubbles that flew past `despawn_distance` beyond the
    /// lattice. Returns their ids.
    pub(crate) fn cull_strays(&mut self) -> Vec<BubbleId> {
        let limit = self.radius + self.settings.despawn_distance;
        let center = self.transform.center;
        let strays: Vec<BubbleId> = self
            .bubbles
            .iter()
            .filter(|b| b.is_free() && (b.pos - center).length() > limit)
            .map(|b| b.id)
            .collect();
        for &id in &strays {
            self.despawn_free_bubble(id);
        }
        strays
    }

    /// Snap animation, rotation reaction and spring for attached bubbles;
    /// ballistic motion for free and falling ones
    pub(crate) fn step_bubbles(&mut self, dt: f32) {
        let transform = self.transform;
        let settings = &self.settings;
        for bubble in &mut self.bubbles {
            match bubble.state {
                BubbleState::Attached => {
                    bubble.advance_snap(settings.snap_duration, dt);
                    bubble.pos = transform.local_to_world(bubble.local);
                    bubble.apply_rotation_reaction(&transform, settings, dt);
                    bubble.integrate_spring(settings, dt);
                }
                BubbleState::Free | BubbleState::Disconnecting => {
                    bubble.integrate_motion(settings.gravity, dt);
                }
                BubbleState::Removed => {}
            }
        }
    }

    /// Fire deferred releases that are due. Returns how many bubbles went back to the pool.
    pub(crate) fn process_deferred(&mut self) -> usize {
        let mut released = 0;
        for action in self.schedule.poll(self.time) {
            match action {
                Deferred::ReleaseBubble(id) => {
                    if self.release_bubble(id) {
                        released += 1;
                    }
                }
                Deferred::ReleaseEffect(handle) => self.services.pool.release(handle),
            }
        }
        released
    }

    /// Every attached bubble sits in the index at its own cell, once
    pub fn lattice_consistent(&self) -> bool {
        let mut cells = HashSet::new();
        let attached = self.bubbles.iter().filter(|b| b.is_attached());
        for bubble in attached {
            let Some(cell) = bubble.cell else {
                return false;
            };
            if !cells.insert(cell) || self.index.get(cell) != Some(bubble.id) {
                return false;
            }
        }
        cells.len() == self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::sim::tick::{TickInput, tick};

    fn group_with(cells: &[((i32, i32), BubbleColor)]) -> LatticeGroup {
        let mut group = LatticeGroup::new(GameSettings::default());
        for &((x, y), color) in cells {
            group.seed_bubble(CellCoord::new(x, y), color).expect("empty cell");
        }
        group
    }

    /// Spawn a free bubble sitting on `cell` and stick it there
    fn stick_at(group: &mut LatticeGroup, x: i32, y: i32, color: BubbleColor) -> BubbleId {
        let pos = group.cell_to_world(CellCoord::new(x, y));
        let id = group.spawn_free_bubble(pos, color, Vec2::new(-2.0, 0.0));
        let cell = group.stick(id).expect("sticks");
        assert_eq!(cell, CellCoord::new(x, y));
        id
    }

    use BubbleColor::{Blue, Core, Green, Red};

    #[test]
    fn test_seed_rejects_duplicate_cell() {
        let mut group = group_with(&[((0, 0), Core)]);
        let err = group.seed_bubble(CellCoord::new(0, 0), Red).unwrap_err();
        assert!(matches!(err, LatticeError::CellOccupied { .. }));
        assert_eq!(group.attached_count(), 1);
        assert!(group.lattice_consistent());
    }

    #[test]
    fn test_scenario_a_four_reds_pop_together() {
        let mut group = group_with(&[((0, 0), Red), ((1, 0), Red), ((0, 1), Red)]);
        stick_at(&mut group, 1, 1, Red);

        let report = tick(&mut group, &TickInput::default(), SIM_DT);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].matched.len(), 4);
        assert_eq!(report.matches[0].combo, 4);
        assert_eq!(group.attached_count(), 0);
        assert_eq!(group.services.effects.matches().len(), 1);
        assert_eq!(group.services.effects.matches()[0].1, 4);
        assert!(group.lattice_consistent());
    }

    #[test]
    fn test_scenario_b_bridge_removal_disconnects_branch() {
        let mut group = group_with(&[
            ((0, 0), Core),
            ((1, 0), Red),
            ((1, -1), Red),
            ((2, 0), Green),
            ((3, 0), Green),
        ]);
        stick_at(&mut group, 1, 1, Red);
        let green_a = group.get(CellCoord::new(2, 0)).map(|b| b.id).expect("green");
        let green_b = group.get(CellCoord::new(3, 0)).map(|b| b.id).expect("green");

        let report = tick(&mut group, &TickInput::default(), SIM_DT);
        assert_eq!(report.matches.len(), 1);
        let outcome = &report.matches[0];
        assert_eq!(outcome.matched.len(), 3);
        assert_eq!(outcome.dead, vec![green_a, green_b]);
        assert_eq!(outcome.combo, 5);
        assert_eq!(group.last_combo(), 5);

        for id in [green_a, green_b] {
            let bubble = group.bubble(id).expect("still falling");
            assert_eq!(bubble.state, BubbleState::Disconnecting);
        }
        assert_eq!(group.attached_count(), 1);
        assert!(group.lattice_consistent());
    }

    #[test]
    fn test_scenario_c_occupied_cell_backs_off() {
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red)]);
        let occupied = group.cell_to_world(CellCoord::new(1, 0));
        // Arrives moving left, centered slightly inside the taken cell
        let id = group.spawn_free_bubble(occupied + Vec2::new(0.1, 0.0), Blue, Vec2::new(-3.0, 0.0));

        let cell = group.stick(id).expect("sticks");
        assert_ne!(cell, CellCoord::new(1, 0));
        assert_eq!(cell, CellCoord::new(2, 0));
        assert_eq!(group.get(CellCoord::new(1, 0)).map(|b| b.color()), Some(Red));
        assert!(group.lattice_consistent());
    }

    #[test]
    fn test_backoff_without_velocity_uses_outward_direction() {
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red)]);
        let occupied = group.cell_to_world(CellCoord::new(1, 0));
        let id = group.spawn_free_bubble(occupied, Blue, Vec2::ZERO);

        let cell = group.stick(id).expect("sticks");
        // Outward from the pivot along +X
        assert_eq!(cell, CellCoord::new(2, 0));
    }

    #[test]
    fn test_backoff_terminates_inside_packed_region() {
        let mut cells = Vec::new();
        for y in -3..=3 {
            for x in -3..=3 {
                cells.push(((x, y), if (x, y) == (0, 0) { Core } else { Blue }));
            }
        }
        let mut group = group_with(&cells);
        let settings = GameSettings {
            stick_backoff_limit: 2,
            ..GameSettings::default()
        };
        group.settings = settings;
        let id = group.spawn_free_bubble(Vec2::ZERO, Red, Vec2::new(0.0, -0.5));

        let cell = group.stick(id).expect("ring search finds a cell");
        assert!(group.index().get(cell) == Some(id));
        assert!(group.lattice_consistent());
    }

    #[test]
    fn test_stick_rejects_attached_and_unknown() {
        let mut group = group_with(&[((0, 0), Core)]);
        let core = group.get(CellCoord::new(0, 0)).map(|b| b.id).expect("core");
        assert_eq!(group.stick(core), Err(LatticeError::NotFree(core)));
        assert_eq!(
            group.stick(BubbleId(999)),
            Err(LatticeError::UnknownBubble(BubbleId(999)))
        );
    }

    #[test]
    fn test_stick_pushes_neighbors_and_notifies() {
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red)]);
        stick_at(&mut group, 0, 1, Blue);
        let core = group.get(CellCoord::new(0, 0)).expect("core");
        assert!(core.spring_force.length() > 0.0);
        let sticks = group
            .services
            .effects
            .effects()
            .iter()
            .filter(|e| matches!(e, crate::sim::services::Effect::Stick { .. }))
            .count();
        assert_eq!(sticks, 1);
    }

    #[test]
    fn test_settle_gate_defers_evaluation() {
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red), ((1, -1), Red)]);
        let target = group.cell_to_world(CellCoord::new(1, 1));
        let id = group.spawn_free_bubble(target + Vec2::new(0.2, 0.1), Red, Vec2::new(-2.0, 0.0));
        group.stick(id).expect("sticks");
        assert!(!group.is_settled());

        assert!(group.evaluate().is_empty());
        assert_eq!(group.pending(), &[id]);

        let mut matched = 0;
        for _ in 0..30 {
            matched += tick(&mut group, &TickInput::default(), SIM_DT).matches.len();
        }
        assert_eq!(matched, 1);
        assert!(group.pending().is_empty());
    }

    #[test]
    fn test_second_evaluation_is_noop() {
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red), ((1, -1), Red)]);
        stick_at(&mut group, 1, 1, Red);
        assert_eq!(group.evaluate().len(), 1);

        let attached = group.attached_count();
        let effects = group.services.effects.effects().len();
        assert!(group.evaluate().is_empty());
        assert_eq!(group.attached_count(), attached);
        assert_eq!(group.services.effects.effects().len(), effects);
    }

    #[test]
    fn test_no_match_still_clears_pending() {
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red)]);
        stick_at(&mut group, 2, 0, Blue);
        assert!(group.evaluate().is_empty());
        assert!(group.pending().is_empty());
        assert_eq!(group.attached_count(), 3);
    }

    #[test]
    fn test_consumed_pending_bubble_is_not_reevaluated() {
        // Both new reds complete the same group in one tick
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red)]);
        let first = stick_at(&mut group, 1, 1, Red);
        let second = stick_at(&mut group, 1, -1, Red);
        assert_eq!(group.pending(), &[first, second]);

        let outcomes = group.evaluate();
        assert_eq!(outcomes.len(), 1);
        // Newest pending bubble triggers the match
        assert_eq!(outcomes[0].matched[0], second);
        assert!(outcomes[0].matched.contains(&first));
        assert_eq!(group.services.effects.matches().len(), 1);
    }

    #[test]
    fn test_independent_groups_match_separately() {
        let mut group = group_with(&[
            ((0, 0), Core),
            ((1, 0), Red),
            ((2, 0), Red),
            ((-1, 0), Blue),
            ((-2, 0), Blue),
        ]);
        stick_at(&mut group, 3, 0, Red);
        stick_at(&mut group, -3, 0, Blue);

        let outcomes = group.evaluate();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].color, Blue);
        assert_eq!(outcomes[1].color, Red);
        assert_eq!(group.services.effects.matches().len(), 2);
        assert_eq!(group.attached_count(), 1);
    }

    #[test]
    fn test_missing_anchor_means_nothing_dead() {
        let mut group = group_with(&[((1, 0), Red), ((1, -1), Red), ((5, 5), Blue)]);
        stick_at(&mut group, 1, 1, Red);
        let outcomes = group.evaluate();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].dead.is_empty());
        assert!(group.get(CellCoord::new(5, 5)).is_some());
    }

    #[test]
    fn test_disconnected_bubbles_release_after_delay() {
        let mut group = group_with(&[
            ((0, 0), Core),
            ((1, 0), Red),
            ((1, -1), Red),
            ((2, 0), Green),
            ((3, 0), Green),
        ]);
        stick_at(&mut group, 1, 1, Red);
        let outcome = group.evaluate().remove(0);
        let released_after_match = group.services.pool.released();
        assert_eq!(released_after_match, 3);

        let mut released = 0;
        let ticks = (group.settings.disconnect_lifetime / SIM_DT) as usize + 5;
        for _ in 0..ticks {
            released += tick(&mut group, &TickInput::default(), SIM_DT).released;
        }
        assert_eq!(released, 2);
        for id in &outcome.dead {
            assert!(group.bubble(*id).is_none());
            assert!(!group.release_bubble(*id), "second release is a no-op");
        }
        // 3 popped + 2 fallen bubbles + 3 burst effects
        assert_eq!(group.services.pool.released(), 8);
        assert_eq!(group.services.pool.live_count(PrefabKind::MatchBurst), 0);
        assert_eq!(group.scheduled(), 0);
    }

    #[test]
    fn test_falling_bubble_starts_where_it_was_drawn() {
        let mut group = group_with(&[
            ((0, 0), Core),
            ((1, 0), Red),
            ((1, -1), Red),
            ((2, 0), Green),
        ]);
        let green = group.get(CellCoord::new(2, 0)).map(|b| b.id).expect("green");
        stick_at(&mut group, 1, 1, Red);
        let transform = *group.transform();
        let drawn = group.bubble(green).map(|b| b.visual_position(&transform)).expect("green");

        group.evaluate();
        let falling = group.bubble(green).expect("falling");
        assert!((falling.pos - drawn).length() < 1e-5);
    }

    #[test]
    fn test_radius_tracks_outermost_bubble() {
        let mut group = group_with(&[((0, 0), Core)]);
        assert_eq!(group.radius(), 0.0);
        group.seed_bubble(CellCoord::new(3, 0), Blue).expect("empty");
        let expected = group.geometry().cell_to_local(CellCoord::new(3, 0)).length();
        assert!((group.radius() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_recentering_keeps_bubbles_at_rest() {
        let group = group_with(&[((0, 0), Core), ((1, 0), Red)]);
        let mut group = group.with_center(Vec2::new(100.0, 0.0));
        tick(&mut group, &TickInput::default(), SIM_DT);

        let red = group.get(CellCoord::new(1, 0)).expect("red");
        assert_eq!(red.spring_offset, Vec2::ZERO);
        assert_eq!(red.spring_vel, Vec2::ZERO);
        assert!((red.pos - Vec2::new(100.0 + group.geometry().cell_size().x, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_despawn_only_touches_free_bubbles() {
        let mut group = group_with(&[((0, 0), Core)]);
        let core = group.get(CellCoord::new(0, 0)).map(|b| b.id).expect("core");
        assert!(!group.despawn_free_bubble(core));
        assert!(!group.despawn_free_bubble(BubbleId(999)));

        let shot = group.spawn_free_bubble(Vec2::new(4.0, 0.0), Blue, Vec2::ZERO);
        assert!(group.despawn_free_bubble(shot));
        assert!(!group.despawn_free_bubble(shot));
        assert_eq!(group.services.pool.released(), 1);
        assert_eq!(group.attached_count(), 1);
    }

    #[test]
    fn test_clock_stays_accurate_over_long_runs() {
        let mut group = group_with(&[((0, 0), Core)]);
        // Four hours at 60 Hz
        for _ in 0..864_000 {
            group.advance_clock(SIM_DT);
        }
        assert_eq!(group.time_ticks(), 864_000);
        assert!((group.time() - 14_400.0).abs() < 0.01, "{}", group.time());
    }

    #[test]
    fn test_rotation_moves_attached_bubbles() {
        let mut group = group_with(&[((0, 0), Core), ((1, 0), Red)]);
        let before = group.get(CellCoord::new(1, 0)).map(|b| b.pos).expect("red");
        group.set_rotation(std::f32::consts::FRAC_PI_2);
        let after = group.get(CellCoord::new(1, 0)).map(|b| b.pos).expect("red");
        assert!((after.length() - before.length()).abs() < 1e-5);
        assert!(after.y > 0.9 * before.x);
        assert_eq!(group.world_to_cell(after), CellCoord::new(1, 0));
    }
}

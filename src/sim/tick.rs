//! Fixed timestep simulation tick
//!
//! Advances a lattice group deterministically. Per tick:
//! 1. rotation input
//! 2. motion (snap, spring, ballistic), then stray projectiles despawn
//! 3. contacts -> stick
//! 4. connectivity evaluation (once pending bubbles have settled)
//! 5. deferred releases

use super::bubble::BubbleId;
use super::geometry::LatticeGeometry;
use super::group::{LatticeGroup, MatchOutcome};
use super::services::{BubblePool, EffectSink};

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Absolute lattice rotation (from drag/tilt)
    pub target_rotation: Option<f32>,
    /// Free bubbles an external collision system reports as touching the lattice
    pub contacts: Vec<BubbleId>,
    /// Freeze the simulation this tick
    pub paused: bool,
}

/// What happened during a tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Bubbles that stuck, in stick order
    pub stuck: Vec<BubbleId>,
    pub matches: Vec<MatchOutcome>,
    /// Projectiles that left the play area without sticking
    pub despawned: Vec<BubbleId>,
    /// Fallen bubbles returned to the pool
    pub released: usize,
}

/// Advance the group by one fixed timestep
pub fn tick<G, P, E>(group: &mut LatticeGroup<G, P, E>, input: &TickInput, dt: f32) -> TickReport
where
    G: LatticeGeometry,
    P: BubblePool,
    E: EffectSink,
{
    let mut report = TickReport::default();
    if input.paused {
        return report;
    }

    group.advance_clock(dt);

    if let Some(theta) = input.target_rotation {
        group.set_rotation(theta);
    }

    group.step_bubbles(dt);
    report.despawned = group.cull_strays();

    // External contacts first, then our own detection; a bubble sticks once
    let detected = group.detect_contacts();
    let candidates = input
        .contacts
        .iter()
        .copied()
        .chain(detected.iter().map(|c| c.free));
    for id in candidates {
        if report.stuck.contains(&id) {
            continue;
        }
        match group.stick(id) {
            Ok(_) => report.stuck.push(id),
            Err(e) => log::warn!("Bubble {id} failed to stick: {e}"),
        }
    }

    report.matches = group.evaluate();
    report.released = group.process_deferred();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::settings::GameSettings;
    use crate::sim::bubble::{BubbleColor, BubbleState};
    use crate::sim::geometry::CellCoord;
    use crate::sim::services::PrefabKind;
    use glam::Vec2;

    fn small_group() -> LatticeGroup {
        let mut group = LatticeGroup::new(GameSettings::default());
        group.seed_core().expect("empty anchor");
        group
            .seed_bubble(CellCoord::new(1, 0), BubbleColor::Red)
            .expect("empty cell");
        group
    }

    #[test]
    fn test_free_bubble_flies_in_and_sticks() {
        let mut group = small_group();
        let id = group.spawn_free_bubble(Vec2::new(3.0, 0.0), BubbleColor::Blue, Vec2::new(-5.0, 0.0));

        let mut stuck = Vec::new();
        for _ in 0..60 {
            stuck.extend(tick(&mut group, &TickInput::default(), SIM_DT).stuck);
        }
        assert_eq!(stuck, vec![id]);
        let bubble = group.bubble(id).expect("attached");
        assert_eq!(bubble.state, BubbleState::Attached);
        assert_eq!(bubble.cell, Some(CellCoord::new(2, 0)));
        assert!(group.lattice_consistent());
    }

    #[test]
    fn test_reported_contact_sticks_once() {
        let mut group = small_group();
        let pos = group.cell_to_world(CellCoord::new(0, 1));
        let id = group.spawn_free_bubble(pos, BubbleColor::Blue, Vec2::ZERO);

        let input = TickInput {
            contacts: vec![id, id],
            ..Default::default()
        };
        let report = tick(&mut group, &input, SIM_DT);
        assert_eq!(report.stuck, vec![id]);
        // Already attached: logged and ignored
        let report = tick(&mut group, &input, SIM_DT);
        assert!(report.stuck.is_empty());
        assert_eq!(group.attached_count(), 3);
    }

    #[test]
    fn test_missed_shot_despawns_once() {
        let mut group = LatticeGroup::new(GameSettings::default());
        group.seed_core().expect("empty anchor");
        let id = group.spawn_free_bubble(Vec2::new(5.0, 0.0), BubbleColor::Blue, Vec2::new(5.0, 0.0));
        let handle = group.bubble(id).map(|b| b.handle).expect("free");

        let mut despawned = Vec::new();
        for _ in 0..6000 {
            despawned.extend(tick(&mut group, &TickInput::default(), SIM_DT).despawned);
        }
        assert_eq!(despawned, vec![id]);
        assert!(group.bubble(id).is_none());
        assert!(!group.services.pool.is_live(handle));
        assert_eq!(group.services.pool.live_count(PrefabKind::Bubble), 1);
        assert_eq!(group.services.pool.released(), 1);
        assert!(!group.despawn_free_bubble(id));
        assert_eq!(group.services.pool.released(), 1);
    }

    #[test]
    fn test_paused_tick_does_nothing() {
        let mut group = small_group();
        let id = group.spawn_free_bubble(Vec2::new(3.0, 0.0), BubbleColor::Blue, Vec2::new(-5.0, 0.0));
        let input = TickInput {
            paused: true,
            ..Default::default()
        };
        tick(&mut group, &input, SIM_DT);
        assert_eq!(group.time_ticks(), 0);
        assert_eq!(group.bubble(id).map(|b| b.pos), Some(Vec2::new(3.0, 0.0)));
    }

    #[test]
    fn test_rotation_wobbles_then_settles() {
        let mut group = small_group();
        let input = TickInput {
            target_rotation: Some(0.6),
            ..Default::default()
        };
        tick(&mut group, &input, SIM_DT);
        let red = group.get(CellCoord::new(1, 0)).expect("red");
        assert!(red.spring_offset.length() > 0.0);

        for _ in 0..2000 {
            tick(&mut group, &input, SIM_DT);
        }
        let red = group.get(CellCoord::new(1, 0)).expect("red");
        assert!(red.spring_offset.length() < 1e-3);
        assert!((group.transform().rotation - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_determinism() {
        // Two groups fed the same inputs end up identical
        let mut group1 = small_group();
        let mut group2 = small_group();
        for group in [&mut group1, &mut group2] {
            group.spawn_free_bubble(Vec2::new(0.0, 3.0), BubbleColor::Red, Vec2::new(0.0, -4.0));
            group.spawn_free_bubble(Vec2::new(-3.0, 0.5), BubbleColor::Green, Vec2::new(4.0, 0.0));
        }

        let inputs = [
            TickInput {
                target_rotation: Some(0.3),
                ..Default::default()
            },
            TickInput::default(),
            TickInput {
                target_rotation: Some(-0.4),
                ..Default::default()
            },
        ];
        for _ in 0..40 {
            for input in &inputs {
                tick(&mut group1, input, SIM_DT);
                tick(&mut group2, input, SIM_DT);
            }
        }

        assert_eq!(group1.time_ticks(), group2.time_ticks());
        assert_eq!(group1.bubbles().len(), group2.bubbles().len());
        for (a, b) in group1.bubbles().iter().zip(group2.bubbles()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.cell, b.cell);
            assert_eq!(a.pos, b.pos);
            assert_eq!(a.spring_offset, b.spring_offset);
        }
        assert!(group1.lattice_consistent());
    }
}

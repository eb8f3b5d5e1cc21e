//! Bubble entities: color, lifecycle state, and local spring physics
//!
//! A bubble is spawned Free, sticks to the lattice (Attached), and leaves it
//! either by matching (Removed) or by losing its path to the anchor
//! (Disconnecting, then Removed once its fall has played out).

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::{CellCoord, GroupTransform};
use super::services::PoolHandle;
use crate::settings::GameSettings;

/// Stable bubble identity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BubbleId(pub u32);

impl std::fmt::Display for BubbleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bubble colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BubbleColor {
    /// Colorless anchor bubble; never matches
    Core,
    #[default]
    Red,
    Green,
    Yellow,
    Blue,
    Purple,
    Orange,
}

impl BubbleColor {
    /// Colors a projectile can have
    pub const PALETTE: [BubbleColor; 6] = [
        BubbleColor::Blue,
        BubbleColor::Green,
        BubbleColor::Red,
        BubbleColor::Yellow,
        BubbleColor::Purple,
        BubbleColor::Orange,
    ];

    /// Whether this color takes part in same-color matching
    pub fn is_matchable(self) -> bool {
        self != BubbleColor::Core
    }

    /// Pick uniformly among the first `count` palette colors
    pub fn random<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Self {
        let count = count.clamp(1, Self::PALETTE.len());
        Self::PALETTE[rng.random_range(0..count)]
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BubbleState {
    /// Moving ballistically outside the lattice
    Free,
    /// Registered in the lattice index
    Attached,
    /// Falling away after losing its path to the anchor
    Disconnecting,
    /// Gone; waiting to be dropped from the group
    Removed,
}

/// Ease-in of a freshly stuck bubble toward its cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapTween {
    pub from: Vec2,
    pub elapsed: f32,
}

/// A bubble entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bubble {
    pub id: BubbleId,
    color: BubbleColor,
    pub state: BubbleState,
    /// Pool instance backing this bubble
    pub handle: PoolHandle,
    /// Lattice cell (Attached only)
    pub cell: Option<CellCoord>,
    /// World position (for attached bubbles, derived from the group each tick)
    pub pos: Vec2,
    /// World velocity (Free and Disconnecting)
    pub vel: Vec2,
    /// Position in the group's local frame (Attached only)
    pub local: Vec2,
    /// Local center of `cell`
    pub target: Vec2,
    /// Active snap animation
    pub snap: Option<SnapTween>,
    /// Visual displacement from rest, group-local frame
    pub spring_offset: Vec2,
    pub spring_vel: Vec2,
    /// External forces accumulated since the last integration
    pub spring_force: Vec2,
    /// Cosmetic squash/stretch driven by spring velocity
    pub scale: Vec2,
    /// World position at the previous tick (rotation reaction)
    pub prev_pos: Vec2,
}

impl Bubble {
    /// A free projectile
    pub fn new_free(id: BubbleId, handle: PoolHandle, pos: Vec2, color: BubbleColor, vel: Vec2) -> Self {
        Self {
            id,
            color,
            state: BubbleState::Free,
            handle,
            cell: None,
            pos,
            vel,
            local: Vec2::ZERO,
            target: Vec2::ZERO,
            snap: None,
            spring_offset: Vec2::ZERO,
            spring_vel: Vec2::ZERO,
            spring_force: Vec2::ZERO,
            scale: Vec2::ONE,
            prev_pos: pos,
        }
    }

    /// A bubble already resting in `cell`
    pub fn new_attached(
        id: BubbleId,
        handle: PoolHandle,
        color: BubbleColor,
        cell: CellCoord,
        local: Vec2,
        transform: &GroupTransform,
    ) -> Self {
        let pos = transform.local_to_world(local);
        let mut bubble = Self::new_free(id, handle, pos, color, Vec2::ZERO);
        bubble.state = BubbleState::Attached;
        bubble.cell = Some(cell);
        bubble.local = local;
        bubble.target = local;
        bubble
    }

    pub fn color(&self) -> BubbleColor {
        self.color
    }

    pub fn is_attached(&self) -> bool {
        self.state == BubbleState::Attached
    }

    pub fn is_free(&self) -> bool {
        self.state == BubbleState::Free
    }

    /// Still easing into its cell
    pub fn is_moving(&self, epsilon: f32) -> bool {
        (self.target - self.local).length_squared() > epsilon
    }

    /// Attach to `cell`, easing from the current position
    pub fn attach(&mut self, cell: CellCoord, target: Vec2, transform: &GroupTransform) {
        let from = transform.world_to_local(self.pos);
        self.state = BubbleState::Attached;
        self.cell = Some(cell);
        self.local = from;
        self.target = target;
        self.snap = Some(SnapTween { from, elapsed: 0.0 });
        self.vel = Vec2::ZERO;
        self.prev_pos = self.pos;
    }

    /// Advance the snap animation (out-quad ease)
    pub fn advance_snap(&mut self, duration: f32, dt: f32) {
        let Some(mut snap) = self.snap else {
            return;
        };
        snap.elapsed += dt;
        let t = if duration > 0.0 {
            (snap.elapsed / duration).min(1.0)
        } else {
            1.0
        };
        if t >= 1.0 {
            self.local = self.target;
            self.snap = None;
        } else {
            let eased = 1.0 - (1.0 - t) * (1.0 - t);
            self.local = snap.from.lerp(self.target, eased);
            self.snap = Some(snap);
        }
    }

    /// Accumulate a local-frame force, clamped to `max_force`
    pub fn add_force(&mut self, force: Vec2, max_force: f32) {
        self.spring_force = (self.spring_force + force).clamp_length_max(max_force);
    }

    /// Feed the bubble's own world motion back into the spring
    pub fn apply_rotation_reaction(&mut self, transform: &GroupTransform, settings: &GameSettings, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let velocity = (self.pos - self.prev_pos) / dt;
        let force = transform.unrotate_vector(velocity * settings.rotate_force);
        self.add_force(force, settings.max_force);
        self.prev_pos = self.pos;
    }

    /// Damped spring step for the visual offset
    pub fn integrate_spring(&mut self, settings: &GameSettings, dt: f32) {
        let spring = -settings.spring * self.spring_offset;
        let acc = spring + self.spring_force;
        self.spring_vel = settings.damp * (self.spring_vel + acc);
        self.spring_offset += self.spring_vel * dt;
        self.spring_force = Vec2::ZERO;

        if self.spring_vel.length_squared() > 0.01 {
            self.scale = Vec2::ONE + self.spring_vel / settings.spring_scale_max_velocity;
        } else {
            self.scale = Vec2::ONE;
        }
    }

    /// Where the bubble is drawn: cell slot plus spring offset
    pub fn visual_position(&self, transform: &GroupTransform) -> Vec2 {
        if self.is_attached() {
            transform.local_to_world(self.local + self.spring_offset)
        } else {
            self.pos
        }
    }

    /// Leave the lattice without a visual jump and start falling
    pub fn begin_disconnect(&mut self, transform: &GroupTransform, impulse: f32) {
        let position = self.visual_position(transform);
        let outward = (position - transform.center).normalize_or_zero();

        self.pos = position;
        self.prev_pos = position;
        self.spring_offset = Vec2::ZERO;
        self.spring_vel = Vec2::ZERO;
        self.spring_force = Vec2::ZERO;
        self.scale = Vec2::ONE;
        self.snap = None;
        self.cell = None;
        self.state = BubbleState::Disconnecting;
        self.vel = outward * impulse + Vec2::Y * impulse;
    }

    /// Ballistic step; falling bubbles also get gravity
    pub fn integrate_motion(&mut self, gravity: f32, dt: f32) {
        match self.state {
            BubbleState::Free => {
                self.prev_pos = self.pos;
                self.pos += self.vel * dt;
            }
            BubbleState::Disconnecting => {
                self.vel.y -= gravity * dt;
                self.prev_pos = self.pos;
                self.pos += self.vel * dt;
            }
            BubbleState::Attached | BubbleState::Removed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn attached() -> Bubble {
        Bubble::new_attached(
            BubbleId(1),
            PoolHandle(1),
            BubbleColor::Red,
            CellCoord::new(0, 0),
            Vec2::ZERO,
            &GroupTransform::default(),
        )
    }

    #[test]
    fn test_rest_state_is_fixed_point() {
        let settings = GameSettings::default();
        let transform = GroupTransform::default();
        let mut bubble = attached();
        for _ in 0..1000 {
            bubble.apply_rotation_reaction(&transform, &settings, crate::consts::SIM_DT);
            bubble.integrate_spring(&settings, crate::consts::SIM_DT);
        }
        assert_eq!(bubble.spring_offset, Vec2::ZERO);
        assert_eq!(bubble.spring_vel, Vec2::ZERO);
        assert_eq!(bubble.scale, Vec2::ONE);
    }

    #[test]
    fn test_spring_decays_back_to_rest() {
        let settings = GameSettings::default();
        let mut bubble = attached();
        bubble.add_force(Vec2::new(3.0, 0.0), settings.max_force);
        for _ in 0..2000 {
            bubble.integrate_spring(&settings, crate::consts::SIM_DT);
        }
        assert!(bubble.spring_offset.length() < 1e-3);
        assert!(bubble.spring_vel.length() < 1e-3);
    }

    #[test]
    fn test_force_accumulator_resets_after_step() {
        let settings = GameSettings::default();
        let mut bubble = attached();
        bubble.add_force(Vec2::X, settings.max_force);
        bubble.integrate_spring(&settings, crate::consts::SIM_DT);
        assert_eq!(bubble.spring_force, Vec2::ZERO);
        assert!(bubble.spring_offset.x > 0.0);
    }

    #[test]
    fn test_add_force_clamps_magnitude() {
        let mut bubble = attached();
        for _ in 0..10 {
            bubble.add_force(Vec2::new(4.0, 4.0), 6.0);
        }
        assert!(bubble.spring_force.length() <= 6.0 + 1e-4);
    }

    #[test]
    fn test_snap_converges_to_target() {
        let transform = GroupTransform::default();
        let mut bubble = Bubble::new_free(
            BubbleId(2),
            PoolHandle(2),
            Vec2::new(0.3, 0.2),
            BubbleColor::Blue,
            Vec2::new(-2.0, 0.0),
        );
        bubble.attach(CellCoord::new(0, 0), Vec2::ZERO, &transform);
        assert!(bubble.is_moving(1e-4));
        assert_eq!(bubble.vel, Vec2::ZERO);

        bubble.advance_snap(0.1, 0.05);
        assert!(bubble.is_moving(1e-4));
        bubble.advance_snap(0.1, 0.06);
        assert!(!bubble.is_moving(1e-4));
        assert_eq!(bubble.local, Vec2::ZERO);
        assert!(bubble.snap.is_none());
    }

    #[test]
    fn test_disconnect_keeps_visual_position() {
        let transform = GroupTransform::new(Vec2::ZERO, 0.5);
        let mut bubble = Bubble::new_attached(
            BubbleId(3),
            PoolHandle(3),
            BubbleColor::Green,
            CellCoord::new(2, 0),
            Vec2::new(2.0, 0.0),
            &transform,
        );
        bubble.spring_offset = Vec2::new(0.1, -0.05);
        let before = bubble.visual_position(&transform);

        bubble.begin_disconnect(&transform, 5.0);
        assert_eq!(bubble.state, BubbleState::Disconnecting);
        assert!((bubble.pos - before).length() < 1e-6);
        assert_eq!(bubble.spring_offset, Vec2::ZERO);
        assert!(bubble.vel.y > 0.0, "gets an upward kick");
        assert!(bubble.cell.is_none());
    }

    #[test]
    fn test_falling_bubble_accelerates_down() {
        let mut bubble = attached();
        bubble.begin_disconnect(&GroupTransform::default(), 0.0);
        bubble.integrate_motion(9.81, 0.1);
        bubble.integrate_motion(9.81, 0.1);
        assert!(bubble.vel.y < 0.0);
        assert!(bubble.pos.y < 0.0);
    }

    #[test]
    fn test_random_color_respects_count() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..100 {
            let color = BubbleColor::random(&mut rng, 2);
            assert!(color == BubbleColor::Blue || color == BubbleColor::Green);
            assert!(color.is_matchable());
        }
        assert!(!BubbleColor::Core.is_matchable());
    }
}

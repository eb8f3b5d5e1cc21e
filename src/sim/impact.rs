//! Impact propagation: radial pushes from a point into nearby attached bubbles
//!
//! Force falls off linearly with distance and reaches exactly zero at the
//! range. Pushes land in each bubble's spring accumulator, so several impacts
//! in one tick add up (clamped per bubble).

use glam::Vec2;

use super::bubble::Bubble;
use super::geometry::GroupTransform;

/// Push on a bubble at `target` from an impact at `origin`
#[inline]
pub fn impact_force(origin: Vec2, target: Vec2, force: f32, range: f32) -> Vec2 {
    let direction = target - origin;
    let distance = direction.length();
    if range <= 0.0 || distance > range {
        return Vec2::ZERO;
    }
    (range - distance) / range * force * direction.normalize_or_zero()
}

/// Apply an impact to every attached bubble within `range` of `origin`.
///
/// Returns how many bubbles were pushed.
pub fn apply_impact<'a>(
    bubbles: impl IntoIterator<Item = &'a mut Bubble>,
    transform: &GroupTransform,
    origin: Vec2,
    force: f32,
    range: f32,
    max_force: f32,
) -> usize {
    let mut pushed = 0;
    for bubble in bubbles {
        if !bubble.is_attached() {
            continue;
        }
        let push = impact_force(origin, bubble.pos, force, range);
        if push == Vec2::ZERO {
            continue;
        }
        bubble.add_force(transform.unrotate_vector(push), max_force);
        pushed += 1;
    }
    pushed
}

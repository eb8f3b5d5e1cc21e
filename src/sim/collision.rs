//! Contact detection between free projectiles and the attached lattice
//!
//! Bubbles are circles one cell wide; a free bubble touches the lattice when
//! its center comes within one cell width of an attached bubble's center.

use glam::Vec2;

use super::bubble::{Bubble, BubbleId};

/// A free bubble touching an attached one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub free: BubbleId,
    /// Closest attached bubble touched
    pub attached: BubbleId,
    /// Overlap depth
    pub penetration: f32,
}

/// Signed distance between two circles of equal radius (negative = overlap)
#[inline]
pub fn sd_circle_pair(a: Vec2, b: Vec2, diameter: f32) -> f32 {
    (a - b).length() - diameter
}

/// Find every free bubble touching the lattice, one contact per free bubble
///
/// `bubbles` should be in id order so contacts come out deterministically.
pub fn find_contacts(bubbles: &[Bubble], diameter: f32) -> Vec<Contact> {
    let attached: Vec<(BubbleId, Vec2)> = bubbles
        .iter()
        .filter(|b| b.is_attached())
        .map(|b| (b.id, b.pos))
        .collect();

    bubbles
        .iter()
        .filter(|b| b.is_free())
        .filter_map(|free| {
            attached
                .iter()
                .map(|(id, pos)| (*id, sd_circle_pair(free.pos, *pos, diameter)))
                .filter(|(_, d)| *d <= 0.0)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(id, d)| Contact {
                    free: free.id,
                    attached: id,
                    penetration: -d,
                })
        })
        .collect()
}

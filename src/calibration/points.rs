// SPDX-License-Identifier: GPL-3.0-or-later

//! Fixed test-point geometry used by the endstop-trim, delta-radius, and
//! comprehensive strategies (spec §4.E/4.F/4.G).

use core::f32::consts::PI;

use crate::consts::calibration::comprehensive::{NUM_RING_POINTS, RING_STEP_DEGREES};
use crate::consts::towers::{TOWER_SPACING_DEG, Z_TOWER_ANGLE_DEG};
use crate::geometry::Tower;
use crate::math::{cosf, sinf};

pub fn tower_angle_deg(tower: Tower) -> f32 {
    match tower {
        Tower::Z => Z_TOWER_ANGLE_DEG,
        Tower::Y => Z_TOWER_ANGLE_DEG + TOWER_SPACING_DEG,
        Tower::X => Z_TOWER_ANGLE_DEG + 2.0 * TOWER_SPACING_DEG,
    }
}

pub fn point_at_angle_deg(radius_mm: f32, angle_deg: f32) -> (f32, f32) {
    let rad = angle_deg * PI / 180.0;
    (radius_mm * cosf(rad), radius_mm * sinf(rad))
}

/// The three tower-base test points (spec §4.E): `(±sin60·r, ∓cos60·r)` for
/// X/Y, `(0, r)` for Z — expressed here as points on the angle convention
/// above, which reproduces the same coordinates.
pub fn tower_base_points(probe_radius_mm: f32) -> [(f32, f32); 3] {
    [Tower::X, Tower::Y, Tower::Z].map(|t| point_at_angle_deg(probe_radius_mm, tower_angle_deg(t)))
}

/// The 12-point comprehensive ring (spec §4.G), anchored so that indices
/// `0, 4, 8` fall exactly on the tower-base points. Even indices
/// (`0,2,4,6,8,10`, 60 degrees apart) feed the intersextile-mean
/// calculation; odd indices feed the off-axis tolerance check — see
/// DESIGN.md for why this is the non-degenerate reading of the spec's four
/// three-point categories under exact 120-degree tower symmetry.
pub fn comprehensive_ring_points(probe_radius_mm: f32) -> [(f32, f32); NUM_RING_POINTS] {
    let base = tower_angle_deg(Tower::Z);
    core::array::from_fn(|i| {
        point_at_angle_deg(probe_radius_mm, base + i as f32 * RING_STEP_DEGREES)
    })
}

/// Ring indices whose values feed the intersextile-mean (the tower points
/// and their diametric opposites).
pub const RING_EVEN_INDICES: [usize; 6] = [0, 2, 4, 6, 8, 10];
/// Ring indices whose values feed the off-axis tolerance check.
pub const RING_ODD_INDICES: [usize; 6] = [1, 3, 5, 7, 9, 11];

/// Points along the line `a -> b` split into `n` segments (`n + 1` points),
/// plus two points offset perpendicular to the line by one segment length
/// (spec §4.G segmented-line probe). Capacity bounds `n` to 30.
pub fn segmented_line_points(
    a: (f32, f32),
    b: (f32, f32),
    n: usize,
) -> heapless::Vec<(f32, f32), 34> {
    let mut points = heapless::Vec::new();
    let n = n.min(30).max(1);
    let step = ((b.0 - a.0) / n as f32, (b.1 - a.1) / n as f32);
    for i in 0..=n {
        let _ = points.push((a.0 + step.0 * i as f32, a.1 + step.1 * i as f32));
    }
    let perp = (-step.1, step.0);
    let mid = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    let _ = points.push((mid.0 + perp.0, mid.1 + perp.1));
    let _ = points.push((mid.0 - perp.0, mid.1 - perp.1));
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fabsf;

    #[test]
    fn ring_points_reproduce_tower_points_at_anchored_indices() {
        let ring = comprehensive_ring_points(100.0);
        let towers = tower_base_points(100.0);
        for (ring_idx, tower_idx) in [(0, 2), (4, 1), (8, 0)] {
            assert!(fabsf(ring[ring_idx].0 - towers[tower_idx].0) < 1e-3);
            assert!(fabsf(ring[ring_idx].1 - towers[tower_idx].1) < 1e-3);
        }
    }

    #[test]
    fn segmented_line_has_n_plus_one_plus_two_points() {
        let pts = segmented_line_points((0.0, 0.0), (100.0, 0.0), 4);
        assert_eq!(pts.len(), 4 + 1 + 2);
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later

//! Endstop-trim leveling (spec §4.E): iteratively levels the three tower
//! trims against the probed depth at each tower's base, the same
//! proportional-correction-with-backoff loop a Smoothieware-lineage
//! `ZProbe`/leveling strategy runs, re-expressed against this crate's
//! `GeometryFacade`/`ProbeController` boundary instead of a kernel
//! singleton.

use crate::calibration::points::tower_base_points;
use crate::calibration::depth_mm;
use crate::consts::calibration::endstop::{
    INITIAL_TRIMSCALE, MAX_ITERATIONS, TRIMSCALE_BACKOFF, TRIMSCALE_FLOOR,
};
use crate::consts::calibration::DEFAULT_TARGET_MM;
use crate::error::CalibrationError;
use crate::geometry::{ArmSolution, GeometryFacade, Tower, TOWERS};
use crate::interfaces::{CommandStream, Idle};
use crate::motion::{Actuator, Planner};
use crate::probe::{ProbeConfig, ProbeController, ProbeInput};

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndstopConfig {
    pub target_mm: f32,
    pub probe_radius_mm: f32,
    /// Spec §4.E: "Initial trim is zero unless 'keep' mode is requested, in
    /// which case the current trim is read and iterated from there."
    pub keep_trim: bool,
    pub max_iterations: u8,
}

impl Default for EndstopConfig {
    fn default() -> Self {
        Self {
            target_mm: DEFAULT_TARGET_MM,
            probe_radius_mm: crate::consts::probe::DEFAULT_PROBE_RADIUS_MM,
            keep_trim: false,
            max_iterations: MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EndstopReport {
    pub iterations: u8,
    pub deviation_mm: f32,
    pub trims_mm: [f32; 3],
}

/// Runs the endstop-trim leveling loop (spec §4.E) to convergence or
/// exhaustion. Returns `Nonconvergence` after `max_iterations` without
/// returning the geometry to a bad state — whatever trim the last
/// iteration wrote stays written, per spec §7 ("last iteration's values
/// remain").
pub fn run<AC, P, ARM>(
    cfg: &EndstopConfig,
    probe_cfg: &ProbeConfig,
    facade: &mut GeometryFacade<ARM>,
    controller: &mut ProbeController<AC>,
    input: &P,
    planner: &mut dyn Planner,
    idle: &mut dyn Idle,
    stream: &mut dyn CommandStream,
) -> Result<EndstopReport, CalibrationError>
where
    AC: Actuator,
    P: ProbeInput,
    ARM: ArmSolution,
{
    if !cfg.keep_trim {
        for tower in TOWERS {
            facade.set_trim(tower, 0.0);
        }
    }

    let points = tower_base_points(cfg.probe_radius_mm);
    let mut trimscale = INITIAL_TRIMSCALE;
    let mut previous_deviation = f32::MAX;

    for iteration in 1..=cfg.max_iterations {
        let mut depths = [0.0f32; 3];
        for (tower, &(x, y)) in TOWERS.iter().zip(points.iter()) {
            let steps = controller.probe_at(probe_cfg, input, planner, idle, x, y)?;
            let steps_per_mm = controller.driver().motion().z_steps_per_mm();
            depths[tower.index()] = depth_mm(steps, steps_per_mm);
        }

        let min = depths.iter().cloned().fold(f32::MAX, f32::min);
        let max = depths.iter().cloned().fold(f32::MIN, f32::max);
        let deviation = max - min;

        log::debug!("endstop iteration {iteration}: deviation={deviation:.4}mm trimscale={trimscale:.3}");

        let mut line: heapless::String<64> = heapless::String::new();
        let _ = core::fmt::write(
            &mut line,
            format_args!("[ES] iteration:{iteration} deviation:{deviation:.4}"),
        );
        stream.send_line(&line);

        if deviation <= cfg.target_mm {
            log::debug!("endstop converged after {iteration} iterations");
            facade.normalize_trims();
            return Ok(EndstopReport {
                iterations: iteration,
                deviation_mm: deviation,
                trims_mm: facade.trims(),
            });
        }

        for tower in TOWERS {
            let adjustment = (min - depths[tower.index()]) * trimscale;
            let new_trim = facade.get_trim(tower) + adjustment;
            facade.set_trim(tower, new_trim);
        }

        if deviation >= previous_deviation && trimscale * TRIMSCALE_BACKOFF >= TRIMSCALE_FLOOR {
            trimscale *= TRIMSCALE_BACKOFF;
        }
        previous_deviation = deviation;
    }

    log::warn!("endstop leveling did not converge within {} iterations", cfg.max_iterations);
    Err(CalibrationError::Nonconvergence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockArmSolution;

    #[test]
    fn depth_mm_is_positive_for_a_descent_that_moves_steps_negative() {
        // direction_sign is -1 for a plain downward probe (§4.A), so a
        // deeper surface produces a more negative step count.
        assert!(depth_mm(-800, 160.0) > depth_mm(-400, 160.0));
        assert_eq!(depth_mm(0, 160.0), 0.0);
    }

    #[test]
    fn default_target_matches_spec_tolerance() {
        assert_eq!(EndstopConfig::default().target_mm, 0.03);
        assert_eq!(EndstopConfig::default().max_iterations, 20);
    }

    #[test]
    fn non_keep_mode_resets_trim_to_zero_before_iterating() {
        let mut facade = GeometryFacade::new(MockArmSolution::default());
        facade.set_trim(Tower::X, -0.5);
        let cfg = EndstopConfig::default();
        assert!(!cfg.keep_trim);
        for tower in TOWERS {
            facade.set_trim(tower, 0.0);
        }
        assert_eq!(facade.get_trim(Tower::X), 0.0);
    }

    #[test]
    fn keep_mode_preserves_existing_trim_as_starting_point() {
        let mut facade = GeometryFacade::new(MockArmSolution::default());
        facade.set_trim(Tower::X, -0.5);
        let cfg = EndstopConfig {
            keep_trim: true,
            ..Default::default()
        };
        assert!(cfg.keep_trim);
        assert_eq!(facade.get_trim(Tower::X), -0.5);
    }
}

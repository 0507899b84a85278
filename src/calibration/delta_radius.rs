// SPDX-License-Identifier: GPL-3.0-or-later

//! Delta-radius calibration (spec §4.F): adjusts `delta_radius` so the
//! probed depth at bed center matches the mean depth at the three tower
//! bases. A bowl (center lower than the rim) means the radius is too
//! small; a dome means it's too large.

use crate::calibration::points::tower_base_points;
use crate::calibration::depth_mm;
use crate::consts::calibration::delta_radius::{ADJUSTMENT_GAIN, MAX_ITERATIONS};
use crate::consts::calibration::DEFAULT_TARGET_MM;
use crate::error::CalibrationError;
use crate::geometry::{ArmSolution, GeometryFacade, GeometryParam, TOWERS};
use crate::interfaces::{CommandStream, Idle};
use crate::math::fabsf;
use crate::motion::{Actuator, Planner};
use crate::probe::{ProbeConfig, ProbeController, ProbeInput};

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaRadiusConfig {
    pub target_mm: f32,
    pub probe_radius_mm: f32,
    pub max_iterations: u8,
}

impl Default for DeltaRadiusConfig {
    fn default() -> Self {
        Self {
            target_mm: DEFAULT_TARGET_MM,
            probe_radius_mm: crate::consts::probe::DEFAULT_PROBE_RADIUS_MM,
            max_iterations: MAX_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeltaRadiusReport {
    pub iterations: u8,
    pub deviation_mm: f32,
    pub delta_radius_mm: f32,
}

/// Runs the delta-radius loop (spec §4.F) to convergence or exhaustion.
/// Re-homing is never performed; `GeometryFacade::set` already forces a
/// forward-kinematics resync after each write.
pub fn run<AC, P, ARM>(
    cfg: &DeltaRadiusConfig,
    probe_cfg: &ProbeConfig,
    facade: &mut GeometryFacade<ARM>,
    controller: &mut ProbeController<AC>,
    input: &P,
    planner: &mut dyn Planner,
    idle: &mut dyn Idle,
    stream: &mut dyn CommandStream,
) -> Result<DeltaRadiusReport, CalibrationError>
where
    AC: Actuator,
    P: ProbeInput,
    ARM: ArmSolution,
{
    let tower_points = tower_base_points(cfg.probe_radius_mm);

    for iteration in 1..=cfg.max_iterations {
        let steps_per_mm = controller.driver().motion().z_steps_per_mm();

        let center_steps = controller.probe_at(probe_cfg, input, planner, idle, 0.0, 0.0)?;
        let center_mm = depth_mm(center_steps, steps_per_mm);

        let mut sum = 0.0f32;
        for &(x, y) in &tower_points {
            let steps = controller.probe_at(probe_cfg, input, planner, idle, x, y)?;
            sum += depth_mm(steps, steps_per_mm);
        }
        let mean_mm = sum / TOWERS.len() as f32;

        let d = center_mm - mean_mm;
        log::debug!("delta_radius iteration {iteration}: d={d:.4}mm");

        let mut line: heapless::String<64> = heapless::String::new();
        let _ = core::fmt::write(&mut line, format_args!("[DR] iteration:{iteration} d:{d:.4}"));
        stream.send_line(&line);

        if fabsf(d) <= cfg.target_mm {
            log::debug!("delta_radius converged after {iteration} iterations");
            return Ok(DeltaRadiusReport {
                iterations: iteration,
                deviation_mm: d,
                delta_radius_mm: facade.get(GeometryParam::DeltaRadius),
            });
        }

        let new_radius = facade.get(GeometryParam::DeltaRadius) + d * ADJUSTMENT_GAIN;
        facade.set(GeometryParam::DeltaRadius, new_radius);
    }

    log::warn!("delta_radius did not converge within {} iterations", cfg.max_iterations);
    Err(CalibrationError::Nonconvergence)
}

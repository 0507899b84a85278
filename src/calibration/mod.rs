// SPDX-License-Identifier: GPL-3.0-or-later

//! Calibration engine (spec §4.E-4.G): the endstop-trim, delta-radius, and
//! comprehensive strategies, plus the shared test-point geometry and depth
//! map they all build on.

pub mod delta_radius;
pub mod depth_map;
pub mod endstop;
pub mod comprehensive;
pub mod points;

#[cfg(test)]
mod scenarios;

use crate::error::CalibrationError;
use crate::geometry::GeometryFacade;
use crate::interfaces::{CommandStream, Idle};
use crate::motion::{Actuator, Planner};
use crate::probe::{ProbeConfig, ProbeController, ProbeInput};

/// Probed depth at a test point, in millimeters of downward travel — a
/// lower point on the bed always reads as a larger positive number here,
/// independent of `reverse_z` or which direction the raw step count
/// happens to run. Shared by every strategy that interprets a probe
/// result as a surface height.
pub(crate) fn depth_mm(steps: i32, steps_per_mm: f32) -> f32 {
    -(steps as f32) / steps_per_mm
}

/// `G32` (spec §4.G "Auto-calibration compound", §6): endstop-trim leveling
/// followed by delta-radius calibration, clearing the dirty flag on
/// success. Either sub-step can be skipped by the caller (R/E G-code
/// flags); skipping a step that was needed to clear the dirty flag leaves
/// it set, matching spec §4.D ("cleared only at the end of a successful
/// endstop-leveling followed by a successful delta-radius calibration").
pub struct AutoCalibrationConfig {
    pub endstop: endstop::EndstopConfig,
    pub delta_radius: delta_radius::DeltaRadiusConfig,
    pub skip_endstop: bool,
    pub skip_delta_radius: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AutoCalibrationReport {
    pub endstop: Option<endstop::EndstopReport>,
    pub delta_radius: Option<delta_radius::DeltaRadiusReport>,
}

pub fn run_auto_calibration<AC, P, ARM>(
    cfg: &AutoCalibrationConfig,
    probe_cfg: &ProbeConfig,
    facade: &mut GeometryFacade<ARM>,
    controller: &mut ProbeController<AC>,
    input: &P,
    planner: &mut dyn Planner,
    idle: &mut dyn Idle,
    stream: &mut dyn CommandStream,
) -> Result<AutoCalibrationReport, CalibrationError>
where
    AC: Actuator,
    P: ProbeInput,
    ARM: crate::geometry::ArmSolution,
{
    log::debug!(
        "auto-calibration starting: skip_endstop={} skip_delta_radius={}",
        cfg.skip_endstop, cfg.skip_delta_radius
    );
    let mut report = AutoCalibrationReport::default();

    if !cfg.skip_endstop {
        report.endstop = Some(endstop::run(
            &cfg.endstop,
            probe_cfg,
            facade,
            controller,
            input,
            planner,
            idle,
            stream,
        )?);
    }

    if !cfg.skip_delta_radius {
        report.delta_radius = Some(delta_radius::run(
            &cfg.delta_radius,
            probe_cfg,
            facade,
            controller,
            input,
            planner,
            idle,
            stream,
        )?);
    }

    if !cfg.skip_endstop && !cfg.skip_delta_radius {
        facade.mark_clean();
        log::debug!("auto-calibration complete, geometry marked clean");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_mm_flips_sign_of_a_downward_descent() {
        assert_eq!(depth_mm(-160, 160.0), 1.0);
        assert_eq!(depth_mm(160, 160.0), -1.0);
    }
}

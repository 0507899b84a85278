// SPDX-License-Identifier: GPL-3.0-or-later

//! The probe controller (spec §4.C): orchestrates whole probe cycles —
//! move to XY, probe, return — and implements the two G-code-facing probe
//! contracts (`G30` single probe, `G38.2`/`G38.3` straight probe).

use crate::consts::probe::MIN_PLAUSIBLE_AVERAGE_STEPS;
use crate::error::CalibrationError;
use crate::interfaces::{CommandStream, Idle, MachineZAxis};
use crate::math::minf;
use crate::motion::{Actuator, Axis, Planner};

use super::config::ProbeConfig;
use super::driver::{ProbeDriver, ProbeResult};
use super::input::{is_active, ProbeInput};

/// The compensation-transform pointer straight-probe saves and restores
/// around its move (spec §5 shared resources). An embedding firmware's
/// bed-leveling transform implements this; this core only toggles it.
pub trait CompensationTransform {
    fn set_enabled(&mut self, enabled: bool);
    fn is_enabled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightProbeResult {
    pub triggered: bool,
    pub position_mm: (f32, f32, f32),
}

pub struct ProbeController<AC> {
    driver: ProbeDriver<AC>,
    last_probe: Option<ProbeResult>,
}

impl<AC: Actuator> ProbeController<AC> {
    pub fn new(driver: ProbeDriver<AC>) -> Self {
        Self {
            driver,
            last_probe: None,
        }
    }

    pub fn driver(&self) -> &ProbeDriver<AC> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut ProbeDriver<AC> {
        &mut self.driver
    }

    pub fn last_probe(&self) -> Option<ProbeResult> {
        self.last_probe
    }

    /// Moves to `(x, y)` at fast feedrate, probes, returns to the pre-probe
    /// height, and reports the measured step count (averaged over
    /// `probe_smoothing` repeats). Spec §4.C.
    pub fn probe_at<P: ProbeInput>(
        &mut self,
        cfg: &ProbeConfig,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        x_mm: f32,
        y_mm: f32,
    ) -> Result<i32, CalibrationError> {
        self.probe_at_feedrate(cfg, input, planner, idle, x_mm, y_mm, cfg.slow_feedrate_mm_s)
    }

    /// Same as `probe_at` but with an explicit probing feedrate, used by the
    /// comprehensive strategy's `find_bed_center_height` (spec §4.G), which
    /// needs a fast initial probe followed by a slow one.
    pub fn probe_at_feedrate<P: ProbeInput>(
        &mut self,
        cfg: &ProbeConfig,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        x_mm: f32,
        y_mm: f32,
        feedrate_mm_s: f32,
    ) -> Result<i32, CalibrationError> {
        let (_, _, z) = planner.current_position_mm();
        planner.plan_absolute_move(x_mm, y_mm, z, cfg.fast_feedrate_mm_s);
        planner.wait_for_empty(idle)?;

        let mut sum: i64 = 0;
        let samples = cfg.probe_smoothing.max(1) as i64;
        for _ in 0..samples {
            let result =
                self.driver
                    .run_probe(cfg, input, idle, feedrate_mm_s, cfg.max_z_mm, false)?;
            if !result.triggered {
                return Err(CalibrationError::NotTriggered);
            }
            sum += result.steps_at_trigger as i64;
            self.driver
                .return_probe(cfg, planner, idle, result.steps_at_trigger, false)?;
            self.last_probe = Some(result);
        }

        let average = (sum / samples) as i32;
        if average.unsigned_abs() < MIN_PLAUSIBLE_AVERAGE_STEPS as u32 {
            log::warn!("probe_at({x_mm:.2}, {y_mm:.2}): implausible average of {average} steps");
            return Err(CalibrationError::NotTriggered);
        }
        Ok(average)
    }

    /// Same as `probe_at` but reports the measured depth in millimeters.
    pub fn probe_distance<P: ProbeInput>(
        &mut self,
        cfg: &ProbeConfig,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        x_mm: f32,
        y_mm: f32,
    ) -> Result<f32, CalibrationError> {
        let steps = self.probe_at(cfg, input, planner, idle, x_mm, y_mm)?;
        Ok(steps as f32 / self.driver.motion().z_steps_per_mm())
    }

    /// `G30`: single probe cycle at the current XY, at `feedrate_mm_s` if
    /// given (`F` parameter, spec §6) or else `cfg.slow_feedrate_mm_s`.
    /// Emits `Z:<mm> C:<steps>` on trigger, `ZProbe not triggered`
    /// otherwise; either way the last probe outcome is recorded for later
    /// reporting. On trigger, `override_z_mm` (`Z` parameter) resets the
    /// machine's Z axis to that value through `machine_z` instead of
    /// returning to the pre-probe height (spec §4.C).
    #[allow(clippy::too_many_arguments)]
    pub fn single_probe<P: ProbeInput>(
        &mut self,
        cfg: &ProbeConfig,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        stream: &mut dyn CommandStream,
        machine_z: &mut dyn MachineZAxis,
        reverse: bool,
        feedrate_mm_s: Option<f32>,
        override_z_mm: Option<f32>,
    ) -> Result<ProbeResult, CalibrationError> {
        planner.wait_for_empty(idle)?;
        let feedrate = feedrate_mm_s.unwrap_or(cfg.slow_feedrate_mm_s);
        let result = self.driver.run_probe(cfg, input, idle, feedrate, cfg.max_z_mm, reverse)?;
        self.last_probe = Some(result);

        if result.triggered {
            let steps_per_mm = self.driver.motion().z_steps_per_mm();
            let mm = result.steps_at_trigger as f32 / steps_per_mm;
            let mut line: heapless::String<64> = heapless::String::new();
            let _ = core::fmt::write(
                &mut line,
                format_args!("Z:{mm:.3} C:{}", result.steps_at_trigger),
            );
            stream.send_line(&line);

            match override_z_mm {
                None => {
                    self.driver
                        .return_probe(cfg, planner, idle, result.steps_at_trigger, reverse)?;
                }
                Some(z_mm) => machine_z.set_z_mm(z_mm),
            }
        } else {
            stream.send_line("ZProbe not triggered");
        }

        Ok(result)
    }

    /// `G38.2`/`G38.3`: probe along a single Cartesian axis using the
    /// planner, with compensation disabled for the move's duration.
    /// `alarm_on_miss` distinguishes `G38.2` (escalates to `Halted`) from
    /// `G38.3` (silent `triggered = false`).
    pub fn straight_probe<P: ProbeInput, C: CompensationTransform>(
        &mut self,
        cfg: &ProbeConfig,
        input: &P,
        compensation: &mut C,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        stream: &mut dyn CommandStream,
        axis: Axis,
        distance_mm: f32,
        feedrate_mm_s: f32,
        alarm_on_miss: bool,
    ) -> Result<StraightProbeResult, CalibrationError> {
        let was_enabled = compensation.is_enabled();
        compensation.set_enabled(false);

        let (dx, dy, dz) = match axis {
            Axis::X => (distance_mm, 0.0, 0.0),
            Axis::Y => (0.0, distance_mm, 0.0),
            Axis::Z => (0.0, 0.0, distance_mm),
        };
        planner.plan_relative_move(dx, dy, dz, feedrate_mm_s);

        let mut triggered = false;
        loop {
            if idle.yield_now() {
                planner.cancel();
                compensation.set_enabled(was_enabled);
                return Err(CalibrationError::Halted);
            }
            if is_active(input, cfg.invert) {
                planner.cancel();
                triggered = true;
                break;
            }
            if !planner.is_moving() {
                break;
            }
        }

        compensation.set_enabled(was_enabled);
        let position = planner.current_position_mm();

        let mut line: heapless::String<64> = heapless::String::new();
        let _ = core::fmt::write(
            &mut line,
            format_args!(
                "[PRB:{:.3},{:.3},{:.3}:{}]",
                position.0,
                position.1,
                position.2,
                triggered as u8
            ),
        );
        stream.send_line(&line);

        if !triggered && alarm_on_miss {
            stream.send_line("ALARM:Probe fail");
            return Err(CalibrationError::Halted);
        }

        Ok(StraightProbeResult {
            triggered,
            position_mm: position,
        })
    }
}

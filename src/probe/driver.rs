// SPDX-License-Identifier: GPL-3.0-or-later

//! The probe driver (spec §4.A): drives a single probe cycle to contact or
//! exhaustion, then returns the effector to (approximately) its pre-probe
//! height. Built directly on `ProbeMotionControl`, the same way the
//! teacher's `ZAxis::probe()` sits directly on its `MotionControl`.

use crate::consts::motion::ACCELERATION_TICKS_PER_SECOND;
use crate::error::{CalibrationError, StateError};
use crate::interfaces::Idle;
use crate::math::minf;
use crate::motion::{Axis, Planner, ProbeMotionControl, AXES};

use super::config::ProbeConfig;
use super::input::{is_active, ProbeInput};

/// Spec §3: "Probe cycle result: a tuple (triggered, steps_at_trigger,
/// steps_at_decel_end, overrun)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub triggered: bool,
    pub steps_at_trigger: i32,
    pub steps_at_decel_end: i32,
    pub overrun: bool,
}

impl ProbeResult {
    pub const NOT_TRIGGERED: ProbeResult = ProbeResult {
        triggered: false,
        steps_at_trigger: 0,
        steps_at_decel_end: 0,
        overrun: false,
    };
}

pub struct ProbeDriver<AC> {
    mc: ProbeMotionControl<AC>,
}

impl<AC: crate::motion::Actuator> ProbeDriver<AC> {
    pub fn new(mc: ProbeMotionControl<AC>) -> Self {
        Self { mc }
    }

    pub fn motion(&self) -> &ProbeMotionControl<AC> {
        &self.mc
    }

    pub fn motion_mut(&mut self) -> &mut ProbeMotionControl<AC> {
        &mut self.mc
    }

    /// Drives one probe cycle. `max_distance_mm < 0` is interpreted as
    /// `2 * max_z` per spec's boundary behavior.
    pub fn run_probe<P: ProbeInput>(
        &mut self,
        cfg: &ProbeConfig,
        input: &P,
        idle: &mut dyn Idle,
        feedrate_mm_s: f32,
        max_distance_mm: f32,
        reverse: bool,
    ) -> Result<ProbeResult, CalibrationError> {
        if is_active(input, cfg.invert) {
            return Err(StateError::ProbeAlreadyTriggered.into());
        }

        let max_distance_mm = if max_distance_mm < 0.0 {
            2.0 * cfg.max_z_mm
        } else {
            max_distance_mm
        };
        let direction_sign = if cfg.reverse_z ^ reverse { 1 } else { -1 };

        for axis in AXES {
            self.mc
                .begin_probe_descent(axis, direction_sign, max_distance_mm, feedrate_mm_s);
        }

        let mut debounce = 0u32;
        loop {
            self.mc.tick(ACCELERATION_TICKS_PER_SECOND)?;
            if idle.yield_now() {
                self.mc.hard_stop_all();
                return Err(CalibrationError::Halted);
            }
            if !self.mc.any_moving() {
                log::trace!("probe cycle ended without contact (max_distance_mm={max_distance_mm})");
                return Ok(ProbeResult::NOT_TRIGGERED);
            }
            if is_active(input, cfg.invert) {
                debounce += 1;
                if debounce >= cfg.debounce_count.max(1) {
                    break;
                }
            } else {
                debounce = 0;
            }
        }

        let steps_at_trigger = self.mc.z_stepped().0;
        log::debug!("probe triggered at {steps_at_trigger} steps");

        let (steps_at_decel_end, overrun) = if cfg.decelerate_on_trigger {
            let runout = cfg.decelerate_runout().unwrap_or(0.0);
            for axis in AXES {
                self.mc.begin_decelerate(axis, runout);
            }
            loop {
                let tick_res = self.mc.tick(ACCELERATION_TICKS_PER_SECOND);
                if idle.yield_now() {
                    self.mc.hard_stop_all();
                    return Err(CalibrationError::Halted);
                }
                if tick_res.is_err() || !self.mc.any_moving() {
                    break;
                }
            }
            let end = self
                .mc
                .decel_end_steps(Axis::Z)
                .unwrap_or(self.mc.z_stepped())
                .0;
            let overrun = self.mc.has_exceeded_runout(Axis::Z);
            if overrun {
                log::warn!("probe decel overran runout limit: decel_end={end} steps");
            }
            (end, overrun)
        } else {
            self.mc.hard_stop_all();
            (steps_at_trigger, false)
        };

        Ok(ProbeResult {
            triggered: true,
            steps_at_trigger,
            steps_at_decel_end,
            overrun,
        })
    }

    /// Returns the effector toward its pre-probe height via the planner.
    /// `steps` is the Z step count recorded by `run_probe` (trigger or
    /// decel-end, caller's choice); its sign already encodes the descent
    /// direction, so the return move is simply its negation.
    pub fn return_probe(
        &mut self,
        cfg: &ProbeConfig,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        steps: i32,
        _reverse: bool,
    ) -> Result<(), CalibrationError> {
        let steps_per_mm = self.mc.z_steps_per_mm();
        let dz_mm = -(steps as f32) / steps_per_mm;
        let feedrate = minf(2.0 * cfg.slow_feedrate_mm_s, cfg.fast_feedrate_mm_s);
        planner.plan_relative_move(0.0, 0.0, dz_mm, feedrate);
        planner.wait_for_empty(idle)?;
        self.mc.hard_stop_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::AxisConfig;
    use crate::testing::{MockActuator, MockIdle, MockPlanner, MockProbeInput};

    fn axis_cfg() -> AxisConfig {
        AxisConfig {
            acceleration_mm_s2: 25.0,
            deceleration_mm_s2: 60.0,
            steps_per_mm: 160.0,
            min_step_rate: 20.0,
        }
    }

    fn driver() -> ProbeDriver<MockActuator> {
        let mc = ProbeMotionControl::new(
            [MockActuator::default(), MockActuator::default(), MockActuator::default()],
            [axis_cfg(); 3],
        );
        ProbeDriver::new(mc)
    }

    #[test]
    fn refuses_when_already_triggered() {
        let mut driver = driver();
        let mut input = MockProbeInput::default();
        input.force_active(true);
        let mut idle = MockIdle::default();
        let err = driver
            .run_probe(&ProbeConfig::default(), &input, &mut idle, 5.0, 10.0, false)
            .unwrap_err();
        assert_eq!(err, CalibrationError::State(StateError::ProbeAlreadyTriggered));
    }

    #[test]
    fn not_triggered_when_surface_out_of_reach() {
        let mut driver = driver();
        let input = MockProbeInput::default();
        let mut idle = MockIdle::default();
        let result = driver
            .run_probe(&ProbeConfig::default(), &input, &mut idle, 5.0, 1.0, false)
            .unwrap();
        assert!(!result.triggered);
    }

    /// §9 Open Question: `direction_sign = reverse_z XOR reverse ? +1 : -1`
    /// exercised across all four boolean combinations. A probe that never
    /// triggers still commands a descent, so the sign of the resulting
    /// step count reveals which way the actuator was told to move.
    #[test]
    fn reverse_z_xor_reverse_selects_direction_across_all_combinations() {
        for &(reverse_z, reverse, expect_positive) in &[
            (false, false, false),
            (true, false, true),
            (false, true, true),
            (true, true, false),
        ] {
            let mut driver = driver();
            let input = MockProbeInput::default();
            let mut idle = MockIdle::default();
            let cfg = ProbeConfig {
                reverse_z,
                ..ProbeConfig::default()
            };
            let result = driver.run_probe(&cfg, &input, &mut idle, 5.0, 1.0, reverse).unwrap();
            assert!(!result.triggered);
            let stepped = driver.motion().z_stepped().0;
            assert_ne!(stepped, 0, "reverse_z={reverse_z} reverse={reverse}");
            assert_eq!(
                stepped > 0,
                expect_positive,
                "reverse_z={reverse_z} reverse={reverse} stepped={stepped}"
            );
        }
    }

    #[test]
    fn return_probe_moves_back_up() {
        let mut driver = driver();
        let mut idle = MockIdle::default();
        let mut planner = MockPlanner::default();
        let feedrate = minf(
            2.0 * crate::consts::probe::DEFAULT_SLOW_FEEDRATE_MM_S,
            crate::consts::probe::DEFAULT_FAST_FEEDRATE_MM_S,
        );
        driver
            .return_probe(&ProbeConfig::default(), &mut planner, &mut idle, -800, false)
            .unwrap();
        assert_eq!(planner.last_relative_move(), Some((0.0, 0.0, 5.0, feedrate)));
    }
}

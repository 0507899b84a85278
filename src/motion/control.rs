// SPDX-License-Identifier: GPL-3.0-or-later

//! Ties the three tower `Actuator`s to a `MotionTickHandler`, giving the
//! probe driver (§4.A) and calibration strategies (§4.E-4.G) the handful of
//! operations they actually need: start a probing descent, ask for
//! deceleration once triggered, hard-stop everything, and read back how far
//! Z travelled. Mirrors the split the teacher keeps between `ZAxis` (owns
//! the actuator) and `MotionControl` (owns the ramp state) in
//! `zaxis/motion_control.rs`.

use super::actuator::{Actuator, Axis, Steps, AXES};
use super::tick::{AxisConfig, MotionTickHandler};
use crate::error::CalibrationError;

pub struct ProbeMotionControl<AC: Actuator> {
    actuators: [AC; 3],
    tick: MotionTickHandler,
}

impl<AC: Actuator> ProbeMotionControl<AC> {
    pub fn new(actuators: [AC; 3], axis_cfg: [AxisConfig; 3]) -> Self {
        Self {
            actuators,
            tick: MotionTickHandler::new(axis_cfg),
        }
    }

    pub fn actuator(&self, axis: Axis) -> &AC {
        &self.actuators[axis.index()]
    }

    pub fn z_steps_per_mm(&self) -> f32 {
        self.tick.axis_config(Axis::Z).steps_per_mm
    }

    pub fn z_stepped(&self) -> Steps {
        self.actuators[Axis::Z.index()].stepped()
    }

    pub fn z_current_position(&self) -> Steps {
        self.actuators[Axis::Z.index()].current_position()
    }

    /// Begin a probing descent on a single axis: arm the actuator for
    /// `max_distance_mm` worth of steps in `direction_sign`, and start the
    /// tick handler ramping toward `feedrate_mm_s`.
    pub fn begin_probe_descent(
        &mut self,
        axis: Axis,
        direction_sign: i32,
        max_distance_mm: f32,
        feedrate_mm_s: f32,
    ) {
        let steps_per_mm = self.tick.axis_config(axis).steps_per_mm;
        let steps = (max_distance_mm * steps_per_mm).abs() as u32;
        self.actuators[axis.index()].begin_move(steps, direction_sign);
        self.tick.start(axis, direction_sign, feedrate_mm_s);
    }

    /// Engage deceleration on `axis`, latching the runout limit
    /// `runout_distance_mm` beyond the actuator's current `stepped()`.
    pub fn begin_decelerate(&mut self, axis: Axis, runout_distance_mm: f32) {
        let stepped = self.actuators[axis.index()].stepped();
        self.tick.begin_decelerate(axis, stepped, runout_distance_mm);
    }

    pub fn hard_stop_all(&mut self) {
        for axis in AXES {
            self.actuators[axis.index()].stop();
            self.tick.hard_stop(axis);
        }
    }

    /// Spec §4.A step 2: "If no actuator is moving -> NotTriggered". Reads
    /// the actuators' own moving flags, not the tick handler's ramp state —
    /// an actuator can finish its commanded step budget before the ramp
    /// would otherwise have brought it to rest.
    pub fn any_moving(&self) -> bool {
        AXES.iter().any(|&a| self.actuators[a.index()].is_moving())
    }

    pub fn has_exceeded_runout(&self, axis: Axis) -> bool {
        self.tick.state(axis).has_exceeded_runout
    }

    pub fn decel_end_steps(&self, axis: Axis) -> Option<Steps> {
        self.tick.state(axis).steps_at_decel_end.map(Steps)
    }

    /// One acceleration tick across all three axes; commands the resulting
    /// rate to each actuator. Returns `Err(Overrun)` if any axis's runout
    /// limit was exceeded this tick (spec §4.A: "deceleration must complete
    /// within decelerate_runout or the whole probe cycle fails").
    pub fn tick(&mut self, ticks_per_sec: f32) -> Result<(), CalibrationError> {
        let mut overrun = false;
        for axis in AXES {
            let stepped = self.actuators[axis.index()].stepped();
            if let Some(rate) = self.tick.tick_axis(axis, stepped, ticks_per_sec) {
                self.actuators[axis.index()].set_rate(rate.abs());
                if rate == 0.0 && !self.tick.is_running(axis) {
                    self.actuators[axis.index()].stop();
                }
                if self.tick.state(axis).has_exceeded_runout {
                    overrun = true;
                }
            }
        }
        if overrun {
            Err(CalibrationError::Overrun)
        } else {
            Ok(())
        }
    }
}

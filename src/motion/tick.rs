// SPDX-License-Identifier: GPL-3.0-or-later

//! The motion tick handler (spec §4.B): a callback invoked at
//! `acceleration_ticks_per_second` Hz that ramps each axis toward its target
//! step rate and enforces the runout distance after a probe trigger.
//!
//! Must not allocate, must not log, must not block — this mirrors the
//! constraint the teacher's `StepGenerator::next()` operates under (it's
//! called from `MotionControl::on_interrupt`, comments there call out the
//! exact CPU-cycle budget). We don't do delay-based pulse timing here (that
//! belongs to the `Actuator` the caller owns); instead we compute a target
//! rate and hand it to `Actuator::set_rate`, which is the boundary spec §1
//! draws between this core and the raw pulse generator.

use super::actuator::{Actuator, Axis, Steps, AXES};

#[derive(Debug, Clone, Copy)]
pub struct AxisConfig {
    pub acceleration_mm_s2: f32,
    pub deceleration_mm_s2: f32,
    pub steps_per_mm: f32,
    /// Platform floor below which a decelerating rate snaps to zero (spec
    /// §4.B: "If the decreasing rate falls below the platform's
    /// minimum-steps-per-second floor, snap to 0 and stop").
    pub min_step_rate: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AxisTickState {
    pub running: bool,
    pub decelerating: bool,
    pub current_rate: f32,
    pub target_rate: f32,
    pub direction_sign: i32,
    /// Absolute `stepped()` value past which this axis must have fully
    /// stopped; set only once `decelerate_on_trigger` engages.
    pub runout_limit: Option<i32>,
    pub steps_at_decel_end: Option<i32>,
    pub has_exceeded_runout: bool,
}

impl AxisTickState {
    pub const fn idle() -> Self {
        Self {
            running: false,
            decelerating: false,
            current_rate: 0.0,
            target_rate: 0.0,
            direction_sign: 1,
            runout_limit: None,
            steps_at_decel_end: None,
            has_exceeded_runout: false,
        }
    }
}

/// Owns the per-axis acceleration state; the caller (`ProbeMotionControl`)
/// owns the actuators themselves and drives `tick()` from whatever
/// "interrupt context" its embedding provides.
pub struct MotionTickHandler {
    pub(crate) axis_cfg: [AxisConfig; 3],
    pub(crate) state: [AxisTickState; 3],
}

impl MotionTickHandler {
    pub fn new(axis_cfg: [AxisConfig; 3]) -> Self {
        Self {
            axis_cfg,
            state: [AxisTickState::idle(); 3],
        }
    }

    pub fn axis_config(&self, axis: Axis) -> &AxisConfig {
        &self.axis_cfg[axis.index()]
    }

    pub fn state(&self, axis: Axis) -> &AxisTickState {
        &self.state[axis.index()]
    }

    /// Arms an axis to accelerate toward `feedrate_mm_s`, starting from rest.
    pub fn start(&mut self, axis: Axis, direction_sign: i32, feedrate_mm_s: f32) {
        let cfg = self.axis_cfg[axis.index()];
        self.state[axis.index()] = AxisTickState {
            running: true,
            decelerating: false,
            current_rate: 0.0,
            target_rate: feedrate_mm_s * cfg.steps_per_mm,
            direction_sign,
            runout_limit: None,
            steps_at_decel_end: None,
            has_exceeded_runout: false,
        };
    }

    /// Switches a running axis into deceleration, latching a runout limit
    /// `runout_distance_mm` past its position when this is called.
    pub fn begin_decelerate(&mut self, axis: Axis, stepped_now: Steps, runout_distance_mm: f32) {
        let idx = axis.index();
        let cfg = self.axis_cfg[idx];
        let st = &mut self.state[idx];
        if !st.running {
            return;
        }
        let runout_steps = (runout_distance_mm * cfg.steps_per_mm) as i32;
        st.runout_limit = Some(stepped_now.0 + st.direction_sign * runout_steps);
        st.decelerating = true;
    }

    pub fn hard_stop(&mut self, axis: Axis) {
        self.state[axis.index()] = AxisTickState::idle();
    }

    pub fn hard_stop_all(&mut self) {
        for axis in AXES {
            self.hard_stop(axis);
        }
    }

    pub fn is_running(&self, axis: Axis) -> bool {
        self.state[axis.index()].running
    }

    /// One acceleration tick for a single axis. `stepped` is the actuator's
    /// current step odometer; returns the new signed rate to command, or
    /// `None` if the axis is not running this tick.
    pub fn tick_axis(&mut self, axis: Axis, stepped: Steps, ticks_per_sec: f32) -> Option<f32> {
        let idx = axis.index();
        let cfg = self.axis_cfg[idx];
        let st = &mut self.state[idx];
        if !st.running {
            return None;
        }

        if let Some(limit) = st.runout_limit {
            let crossed = if st.direction_sign >= 0 {
                stepped.0 >= limit
            } else {
                stepped.0 <= limit
            };
            if crossed {
                st.current_rate = 0.0;
                st.running = false;
                st.has_exceeded_runout = true;
                st.steps_at_decel_end = Some(stepped.0);
                return Some(0.0);
            }
        }

        let rate_of_change = if st.decelerating {
            cfg.deceleration_mm_s2
        } else {
            cfg.acceleration_mm_s2
        };
        let delta = rate_of_change * cfg.steps_per_mm / ticks_per_sec;

        if st.decelerating {
            st.current_rate -= delta;
            if st.current_rate < cfg.min_step_rate {
                st.current_rate = 0.0;
                st.running = false;
                st.steps_at_decel_end = Some(stepped.0);
            }
        } else {
            st.current_rate = (st.current_rate + delta).min(st.target_rate);
        }

        Some(st.current_rate * st.direction_sign as f32)
    }
}

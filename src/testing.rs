// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory mock hardware, used only by `#[cfg(test)]` modules throughout
//! the crate. Mirrors the role of the teacher's own loopback/simulated
//! drivers in its unit tests: no mocking framework, just plain structs that
//! implement the same traits real hardware would.

#![cfg(test)]

use crate::consts::motion::ACCELERATION_TICKS_PER_SECOND;
use crate::error::CalibrationError;
use crate::geometry::{ArmSolution, GeometryParam, Tower};
use crate::interfaces::{CommandStream, Homing, Idle, MachineLimits, MachineZAxis};
use crate::motion::{Actuator, Planner, Steps};
use crate::probe::ProbeInput;

/// A stepper actuator that integrates its own step odometer from whatever
/// rate was last commanded, over a fixed tick interval matching
/// `ACCELERATION_TICKS_PER_SECOND`. "Moving" tracks the physical motor: it
/// goes false once the commanded step budget is exhausted or the rate is
/// commanded to zero, exactly as real pulse-generator hardware would report.
#[derive(Debug, Clone, Copy)]
pub struct MockActuator {
    stepped_mag: u32,
    steps_commanded: u32,
    direction_sign: i32,
    position: i32,
    moving: bool,
}

impl Default for MockActuator {
    fn default() -> Self {
        Self {
            stepped_mag: 0,
            steps_commanded: 0,
            direction_sign: 1,
            position: 0,
            moving: false,
        }
    }
}

impl Actuator for MockActuator {
    fn stepped(&self) -> Steps {
        Steps(self.direction_sign * self.stepped_mag as i32)
    }

    fn current_position(&self) -> Steps {
        Steps(self.position)
    }

    fn is_moving(&self) -> bool {
        self.moving
    }

    fn begin_move(&mut self, steps: u32, direction_sign: i32) {
        self.stepped_mag = 0;
        self.steps_commanded = steps;
        self.direction_sign = direction_sign;
        self.moving = steps > 0;
    }

    fn set_rate(&mut self, steps_per_sec: f32) {
        if !self.moving {
            return;
        }
        if steps_per_sec <= 0.0 {
            self.moving = false;
            return;
        }
        let delta = (steps_per_sec / ACCELERATION_TICKS_PER_SECOND).round() as u32;
        let new_mag = (self.stepped_mag + delta).min(self.steps_commanded);
        let advanced = new_mag - self.stepped_mag;
        self.stepped_mag = new_mag;
        self.position += self.direction_sign * advanced as i32;
        if self.stepped_mag >= self.steps_commanded {
            self.moving = false;
        }
    }

    fn stop(&mut self) {
        self.moving = false;
    }
}

#[derive(Debug, Default)]
pub struct MockProbeInput {
    active: bool,
}

impl MockProbeInput {
    pub fn force_active(&mut self, active: bool) {
        self.active = active;
    }
}

impl ProbeInput for MockProbeInput {
    fn read_raw(&self) -> bool {
        self.active
    }
}

/// Never halts, never needs to actually yield to anything.
#[derive(Debug, Default)]
pub struct MockIdle {
    pub halted: bool,
}

impl Idle for MockIdle {
    fn yield_now(&mut self) -> bool {
        self.halted
    }
}

#[derive(Debug, Default)]
pub struct MockPlanner {
    position: (f32, f32, f32),
    acceleration: f32,
    last_relative_move: Option<(f32, f32, f32, f32)>,
    /// Counts down on each `is_moving` poll so tests that never call
    /// `wait_for_empty` still see a move complete after a few iterations,
    /// the way a real planner would after its queued segment finishes.
    moving_ticks: core::cell::Cell<u32>,
}

impl MockPlanner {
    pub fn last_relative_move(&self) -> Option<(f32, f32, f32, f32)> {
        self.last_relative_move
    }
}

impl Planner for MockPlanner {
    fn wait_for_empty(&mut self, _idle: &mut dyn Idle) -> Result<(), CalibrationError> {
        self.moving_ticks.set(0);
        Ok(())
    }

    fn plan_relative_move(&mut self, dx_mm: f32, dy_mm: f32, dz_mm: f32, feedrate_mm_s: f32) {
        self.position.0 += dx_mm;
        self.position.1 += dy_mm;
        self.position.2 += dz_mm;
        self.last_relative_move = Some((dx_mm, dy_mm, dz_mm, feedrate_mm_s));
        self.moving_ticks.set(3);
    }

    fn plan_absolute_move(&mut self, x_mm: f32, y_mm: f32, z_mm: f32, _feedrate_mm_s: f32) {
        self.position = (x_mm, y_mm, z_mm);
        self.moving_ticks.set(3);
    }

    fn segment_acceleration(&self) -> f32 {
        self.acceleration
    }

    fn set_segment_acceleration(&mut self, mm_s2: f32) {
        self.acceleration = mm_s2;
    }

    fn current_position_mm(&self) -> (f32, f32, f32) {
        self.position
    }

    fn is_moving(&self) -> bool {
        let remaining = self.moving_ticks.get();
        if remaining == 0 {
            false
        } else {
            self.moving_ticks.set(remaining - 1);
            true
        }
    }

    fn cancel(&mut self) {
        self.moving_ticks.set(0);
    }
}

#[derive(Debug, Default)]
pub struct MockArmSolution {
    arm_length: f32,
    delta_radius: f32,
    radius_offset: [f32; 3],
    angle_offset: [f32; 3],
    arm_offset: [f32; 3],
    trim: [f32; 3],
    axis_position: [i32; 3],
    reset_count: u32,
}

impl MockArmSolution {
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }
}

impl ArmSolution for MockArmSolution {
    fn get_param(&self, param: GeometryParam) -> f32 {
        match param {
            GeometryParam::ArmLength => self.arm_length,
            GeometryParam::DeltaRadius => self.delta_radius,
            GeometryParam::RadiusOffset(t) => self.radius_offset[t.index()],
            GeometryParam::AngleOffset(t) => self.angle_offset[t.index()],
            GeometryParam::ArmOffset(t) => self.arm_offset[t.index()],
        }
    }

    fn set_param(&mut self, param: GeometryParam, value: f32) {
        match param {
            GeometryParam::ArmLength => self.arm_length = value,
            GeometryParam::DeltaRadius => self.delta_radius = value,
            GeometryParam::RadiusOffset(t) => self.radius_offset[t.index()] = value,
            GeometryParam::AngleOffset(t) => self.angle_offset[t.index()] = value,
            GeometryParam::ArmOffset(t) => self.arm_offset[t.index()] = value,
        }
    }

    fn get_trim(&self, tower: Tower) -> f32 {
        self.trim[tower.index()]
    }

    fn set_trim(&mut self, tower: Tower, value: f32) {
        self.trim[tower.index()] = value;
    }

    fn axis_position(&self) -> [Steps; 3] {
        [Steps(self.axis_position[0]), Steps(self.axis_position[1]), Steps(self.axis_position[2])]
    }

    fn reset_axis_position(&mut self, position: [Steps; 3]) {
        for (slot, s) in self.axis_position.iter_mut().zip(position.iter()) {
            *slot = s.0;
        }
        self.reset_count += 1;
    }
}

#[derive(Debug, Default)]
pub struct MockCommandStream {
    pub lines: heapless::Vec<heapless::String<64>, 64>,
}

impl CommandStream for MockCommandStream {
    fn send_line(&mut self, line: &str) {
        let mut s = heapless::String::new();
        let _ = s.push_str(line);
        let _ = self.lines.push(s);
    }
}

#[derive(Debug, Default)]
pub struct MockHoming {
    pub home_count: u32,
}

impl Homing for MockHoming {
    fn home(&mut self, _idle: &mut dyn Idle) -> Result<(), CalibrationError> {
        self.home_count += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockMachineLimits {
    pub gamma_max_mm: f32,
}

impl MachineLimits for MockMachineLimits {
    fn gamma_max_mm(&self) -> f32 {
        self.gamma_max_mm
    }

    fn set_gamma_max_mm(&mut self, mm: f32) {
        self.gamma_max_mm = mm;
    }
}

#[derive(Debug, Default)]
pub struct MockMachineZAxis {
    pub z_mm: Option<f32>,
}

impl MachineZAxis for MockMachineZAxis {
    fn set_z_mm(&mut self, z_mm: f32) {
        self.z_mm = Some(z_mm);
    }
}

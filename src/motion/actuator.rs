// SPDX-License-Identifier: GPL-3.0-or-later

//! The raw stepper pulse generator boundary (spec §1: "assumed to deliver a
//! commanded steps-per-second rate and report `is_moving`, `stepped`,
//! `current_position`"). This core never emits pulses itself; it only reads
//! and writes this small contract, exactly the way the teacher's
//! `Drv8424`/`Stepper` split keeps pulse timing (the `StepGenerator`'s
//! `Iterator` impl) separate from the thing that actually toggles a GPIO.

use core::ops::{Add, Neg, Sub};

/// A signed step count, kept as an integer to avoid losing precision the way
/// `nviennot-turbo-resin`'s `zaxis::Steps` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Steps(pub i32);

impl Steps {
    pub const ZERO: Steps = Steps(0);

    pub fn as_mm(self, steps_per_mm: f32) -> f32 {
        (self.0 as f32) / steps_per_mm
    }

    pub fn from_mm(mm: f32, steps_per_mm: f32) -> Steps {
        Steps((mm * steps_per_mm) as i32)
    }
}

impl Add for Steps {
    type Output = Steps;
    fn add(self, rhs: Self) -> Self::Output {
        Steps(self.0 + rhs.0)
    }
}

impl Sub for Steps {
    type Output = Steps;
    fn sub(self, rhs: Self) -> Self::Output {
        Steps(self.0 - rhs.0)
    }
}

impl Neg for Steps {
    type Output = Steps;
    fn neg(self) -> Self::Output {
        Steps(-self.0)
    }
}

/// One of the three tower actuators of a delta machine. Cartesian firmware
/// would instead have X/Y/Z linear axes; either way the raw actuator
/// contract below is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

pub const AXES: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// The raw stepper pulse generator's contract, out of scope for this core to
/// implement (spec §1) but depended on by the probe driver (§4.A) and the
/// motion tick handler (§4.B).
pub trait Actuator {
    /// Step counter in the currently commanded direction; it is an odometer
    /// of progress toward the commanded `begin_move`, not an absolute
    /// position. Reset to zero by `begin_move`.
    fn stepped(&self) -> Steps;

    /// Absolute machine position, signed, independent of any in-progress move.
    fn current_position(&self) -> Steps;

    fn is_moving(&self) -> bool;

    /// Arm the actuator to move `steps` in the given direction
    /// (`direction_sign` is `1` or `-1`), at whatever rate `set_rate` is
    /// called with afterward. Resets `stepped()` to zero.
    fn begin_move(&mut self, steps: u32, direction_sign: i32);

    /// Command a new target step rate (steps/sec, unsigned magnitude) for
    /// the move armed by `begin_move`. Called at every acceleration tick.
    fn set_rate(&mut self, steps_per_sec: f32);

    /// Immediately stop issuing pulses.
    fn stop(&mut self);
}

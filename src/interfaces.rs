// SPDX-License-Identifier: GPL-3.0-or-later

//! The two small callback boundaries every long-running operation in this
//! crate is threaded through: a cooperative yield point (`Idle`) and a
//! status line sink (`CommandStream`). Kept as plain traits rather than
//! closures so a `Machine<H: Hardware>` can name them as associated types,
//! the way the teacher names `Stepper`/`ZSensor` as associated types on its
//! driver structs instead of threading five generic parameters everywhere.

/// Cooperative yield point. An embedding firmware implements this to pump
/// its scheduler, service its UART, and feed the watchdog while a
/// calibration strategy polls for a probe trigger or waits on the planner
/// queue; a bare-metal superloop can make this a no-op.
pub trait Idle {
    /// Give the rest of the system a chance to run. Returns `true` if a
    /// halt/abort was requested while yielding (e.g. an emergency stop or a
    /// user-issued M112), in which case the caller must stop immediately and
    /// propagate `CalibrationError::Halted`.
    fn yield_now(&mut self) -> bool;
}

/// Where calibration strategies and G-code handlers emit their textual
/// progress/result lines (spec §6: "emits the same diagnostic lines a human
/// operator would see from the console"). Decoupled from any particular
/// transport so tests can capture output with a `heapless::Vec` sink.
pub trait CommandStream {
    fn send_line(&mut self, line: &str);

    fn send_ok(&mut self) {
        self.send_line("ok");
    }
}

/// `G28` (spec §6: "Home (delegated)"). Out of scope to implement — homing
/// sequences, switch debounce, and per-axis search order all live in the
/// embedding firmware — this core only needs to ask for one before
/// `find_bed_center_height`'s first fast probe.
pub trait Homing {
    fn home(&mut self, idle: &mut dyn Idle) -> Result<(), crate::error::CalibrationError>;
}

/// The machine's gamma-max (bed height) setting, updated by
/// `find_bed_center_height` (spec §4.G) via `M665 Z<h>` (spec §6).
pub trait MachineLimits {
    fn gamma_max_mm(&self) -> f32;
    fn set_gamma_max_mm(&mut self, mm: f32);
}

/// `G30 Z<val>` (spec §4.C: "reset the Z axis to a user-supplied value").
/// Distinct from `Planner::plan_relative_move`/`plan_absolute_move`: this
/// rewrites the machine's notion of its current Z position instead of
/// commanding a move toward it, the same "teleport, don't drive" contract
/// `ArmSolution::reset_axis_position` gives the geometry layer.
pub trait MachineZAxis {
    fn set_z_mm(&mut self, z_mm: f32);
}

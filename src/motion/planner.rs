// SPDX-License-Identifier: GPL-3.0-or-later

//! The look-ahead motion queue boundary (spec §1: "a trajectory planner that
//! accepts coordinated multi-axis moves and executes them asynchronously").
//! This core never implements a planner; it only drives one through this
//! trait, the same boundary the teacher draws around its `Planner`-like
//! G-code queue consumer in `drivers/zaxis/motion_control_async.rs`.

use crate::error::CalibrationError;
use crate::interfaces::Idle;

pub trait Planner {
    /// Blocks (cooperatively, via `idle`) until the move queue has fully
    /// drained and the machine is physically at rest.
    fn wait_for_empty(&mut self, idle: &mut dyn Idle) -> Result<(), CalibrationError>;

    fn plan_relative_move(&mut self, dx_mm: f32, dy_mm: f32, dz_mm: f32, feedrate_mm_s: f32);

    fn plan_absolute_move(&mut self, x_mm: f32, y_mm: f32, z_mm: f32, feedrate_mm_s: f32);

    /// The acceleration currently applied to queued segments (mm/s^2); used
    /// by calibration strategies that temporarily override it for probing
    /// moves and must restore it afterward (spec §7: "every strategy
    /// restores any acceleration/feedrate override it made, even on error").
    fn segment_acceleration(&self) -> f32;

    fn set_segment_acceleration(&mut self, mm_s2: f32);

    fn current_position_mm(&self) -> (f32, f32, f32);

    /// Whether a planned move is still in flight.
    fn is_moving(&self) -> bool;

    /// Aborts the in-flight move immediately (spec §4.C: "an asynchronous
    /// probe detector ... forcibly terminates all actuator motion on first
    /// active read").
    fn cancel(&mut self);
}

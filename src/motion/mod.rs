// SPDX-License-Identifier: GPL-3.0-or-later

mod actuator;
mod control;
mod planner;
mod tick;

pub use actuator::{Actuator, Axis, Steps, AXES};
pub use control::ProbeMotionControl;
pub use planner::Planner;
pub use tick::{AxisConfig, AxisTickState, MotionTickHandler};

// SPDX-License-Identifier: GPL-3.0-or-later

mod config;
mod controller;
mod driver;
mod input;

pub use config::ProbeConfig;
pub use controller::{CompensationTransform, ProbeController, StraightProbeResult};
pub use driver::{ProbeDriver, ProbeResult};
pub use input::{is_active, ProbeInput};

// SPDX-License-Identifier: GPL-3.0-or-later

//! Probe configuration (spec §3 Data Model), set once at init and mutable
//! at runtime by `M670`/`G29`/`G31` parameter overrides.

use crate::consts::probe as defaults;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeConfig {
    pub invert: bool,
    pub debounce_count: u32,
    pub slow_feedrate_mm_s: f32,
    pub fast_feedrate_mm_s: f32,
    pub return_feedrate_mm_s: f32,
    pub probe_height_mm: f32,
    pub max_z_mm: f32,
    pub probe_radius_mm: f32,
    pub probe_smoothing: u8,
    pub decelerate_on_trigger: bool,
    /// Sentinel `DECELERATE_RUNOUT_UNSET` (-1.0) means "not configured".
    pub decelerate_runout_mm: f32,
    pub reverse_z: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            invert: false,
            debounce_count: defaults::DEFAULT_DEBOUNCE_COUNT as u32,
            slow_feedrate_mm_s: defaults::DEFAULT_SLOW_FEEDRATE_MM_S,
            fast_feedrate_mm_s: defaults::DEFAULT_FAST_FEEDRATE_MM_S,
            return_feedrate_mm_s: defaults::DEFAULT_RETURN_FEEDRATE_MM_S,
            probe_height_mm: defaults::DEFAULT_PROBE_HEIGHT_MM,
            max_z_mm: defaults::DEFAULT_MAX_Z_MM,
            probe_radius_mm: defaults::DEFAULT_PROBE_RADIUS_MM,
            probe_smoothing: defaults::DEFAULT_PROBE_SMOOTHING,
            decelerate_on_trigger: false,
            decelerate_runout_mm: defaults::DECELERATE_RUNOUT_UNSET,
            reverse_z: false,
        }
    }
}

impl ProbeConfig {
    pub fn decelerate_runout(&self) -> Option<f32> {
        if self.decelerate_runout_mm < 0.0 {
            None
        } else {
            Some(self.decelerate_runout_mm)
        }
    }

    /// Validates the invariants spec §3 lists: smoothing bounds and the
    /// decelerate_on_trigger/decelerate_runout pairing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_smoothing < 1 || self.probe_smoothing > 10 {
            return Err(ConfigError::OutOfRange("probe_smoothing"));
        }
        if self.decelerate_on_trigger && self.decelerate_runout().is_none() {
            return Err(ConfigError::DecelerateRunoutUnset);
        }
        Ok(())
    }
}

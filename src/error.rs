// SPDX-License-Identifier: GPL-3.0-or-later

//! Error kinds for the calibration core (spec §7).
//!
//! Every fallible operation returns one of these instead of panicking; there
//! is no exception-like unwinding, each operation owns its own cleanup
//! (restoring compensation transforms, re-enabling acceleration limits, etc)
//! before returning.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The probe pin has no sensible reading (never connected / stuck).
    ProbeNotConnected,
    /// `decelerate_on_trigger` was requested without a non-negative
    /// `decelerate_runout`.
    DecelerateRunoutUnset,
    /// A scalar outside its documented range (debounce, smoothing, samples).
    OutOfRange(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ProbeNotConnected => write!(f, "zprobe not connected"),
            ConfigError::DecelerateRunoutUnset => {
                write!(f, "decelerate_on_trigger requires decelerate_runout to be set")
            }
            ConfigError::OutOfRange(what) => write!(f, "{what} out of range"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// The probe pin already reads active at cycle entry (§4.A start condition).
    ProbeAlreadyTriggered,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::ProbeAlreadyTriggered => write!(f, "zprobe already triggered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    Config(ConfigError),
    State(StateError),
    /// Motion completed without the probe ever triggering.
    NotTriggered,
    /// The deceleration path overshot `decelerate_runout`.
    Overrun,
    /// The process-wide halt flag was observed during a cooperative yield.
    Halted,
    /// A strategy exhausted its iteration budget without converging.
    Nonconvergence,
}

impl From<ConfigError> for CalibrationError {
    fn from(e: ConfigError) -> Self {
        CalibrationError::Config(e)
    }
}

impl From<StateError> for CalibrationError {
    fn from(e: StateError) -> Self {
        CalibrationError::State(e)
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::Config(e) => write!(f, "{e}"),
            CalibrationError::State(e) => write!(f, "{e}"),
            CalibrationError::NotTriggered => write!(f, "ZProbe not triggered"),
            CalibrationError::Overrun => write!(f, "probe overrun past decelerate_runout"),
            CalibrationError::Halted => write!(f, "halted"),
            CalibrationError::Nonconvergence => write!(f, "calibration did not converge"),
        }
    }
}

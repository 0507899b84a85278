// SPDX-License-Identifier: GPL-3.0-or-later

//! The Z-probe pin boundary (spec §3: "probe_pin_state — sampleable
//! boolean, with an inversion flag"). Out of scope to implement; this core
//! only samples it.

pub trait ProbeInput {
    /// Raw, uninverted pin read.
    fn read_raw(&self) -> bool;
}

/// Applies the configured inversion to a raw pin read (spec: probe pin
/// state carries "an inversion flag").
pub fn is_active<P: ProbeInput>(input: &P, invert: bool) -> bool {
    input.read_raw() ^ invert
}

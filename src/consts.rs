// SPDX-License-Identifier: GPL-3.0-or-later

pub mod hardware {
    // Defaults for a typical delta tower leadscrew/belt drive; an embedding
    // firmware overrides these per-axis through `AxisConfig`.
    pub const DEFAULT_STEPS_PER_MM: f32 = 160.0;
}

pub mod probe {
    pub const DEFAULT_DEBOUNCE_COUNT: u8 = 100;
    pub const DEFAULT_SLOW_FEEDRATE_MM_S: f32 = 100.0 / 60.0 * 4.0; // ~6.7mm/s
    pub const DEFAULT_FAST_FEEDRATE_MM_S: f32 = 100.0 / 60.0 * 30.0; // ~50mm/s
    pub const DEFAULT_RETURN_FEEDRATE_MM_S: f32 = 100.0 / 60.0 * 30.0;
    pub const DEFAULT_PROBE_HEIGHT_MM: f32 = 5.0;
    pub const DEFAULT_MAX_Z_MM: f32 = 200.0;
    pub const DEFAULT_PROBE_RADIUS_MM: f32 = 100.0;
    pub const DEFAULT_PROBE_SMOOTHING: u8 = 1;
    // Sentinel meaning "unset"; enabling decelerate_on_trigger is rejected
    // until this is assigned a value >= 0.
    pub const DECELERATE_RUNOUT_UNSET: f32 = -1.0;
    // A probe_at() average below this many steps is treated as evidence of
    // misconfiguration (wrong probe height, probe never actually touching).
    pub const MIN_PLAUSIBLE_AVERAGE_STEPS: i32 = 100;
}

pub mod motion {
    // Acceleration tick rate driving §4.B (spec: "typically 1kHz").
    pub const ACCELERATION_TICKS_PER_SECOND: f32 = 1000.0;
    pub const MAX_ACCELERATION_MM_S2: f32 = 25.0;
    pub const MAX_DECELERATION_MM_S2: f32 = 60.0;
    pub const Z_MAX_ACCELERATION_MM_S2: f32 = 25.0;
    pub const Z_MAX_DECELERATION_MM_S2: f32 = 60.0;
    // The platform's minimum commandable steps/sec; below this a
    // decelerating axis snaps straight to 0 instead of crawling forever.
    pub const MIN_STEP_RATE: f32 = 20.0;
}

pub mod calibration {
    pub const DEFAULT_TARGET_MM: f32 = 0.03;

    pub mod endstop {
        pub const INITIAL_TRIMSCALE: f32 = 1.3;
        pub const TRIMSCALE_BACKOFF: f32 = 0.9;
        pub const TRIMSCALE_FLOOR: f32 = 0.9;
        pub const MAX_ITERATIONS: u8 = 20;
    }

    pub mod delta_radius {
        pub const ADJUSTMENT_GAIN: f32 = 2.5;
        pub const MAX_ITERATIONS: u8 = 10;
    }

    pub mod comprehensive {
        pub const NUM_RING_POINTS: usize = 12;
        pub const RING_STEP_DEGREES: f32 = 30.0;
        // §9 Open Question: kept hardcoded literally, independent of probe_radius.
        pub const ECCENTRICITY_RADIUS_MM: f32 = 10.0;
        pub const MAX_REPEATABILITY_SAMPLES: u8 = 30;
        pub const REPEATABILITY_STEP_SANITY_LIMIT: i32 = 50_000;
        pub const HEURISTIC_MAX_ITERATIONS: u8 = 20;
        pub const HEURISTIC_OFF_AXIS_TOLERANCE_MM: f32 = 0.05;
        // Step size used by the heuristic coordinate-descent probes (mm, or
        // degrees for angle offsets). See DESIGN.md for the acceptance rule.
        pub const HEURISTIC_STEP_ARM_LENGTH_MM: f32 = 0.1;
        pub const HEURISTIC_STEP_RADIUS_OFFSET_MM: f32 = 0.1;
        pub const HEURISTIC_STEP_ANGLE_OFFSET_DEG: f32 = 0.1;
        pub const HEURISTIC_STEP_ARM_OFFSET_MM: f32 = 0.1;
    }
}

pub mod repeatability {
    pub const VERY_GOOD_RANGE_MM: f32 = 0.015;
    pub const AVERAGE_RANGE_MM: f32 = 0.03;
    pub const BORDERLINE_RANGE_MM: f32 = 0.04;
}

pub mod towers {
    // X and Y towers sit at (+/-sin(60deg)*r, -cos(60deg)*r); Z tower at
    // (0, r). In our (x = r*cos(theta), y = r*sin(theta)) convention that
    // puts the Z tower at 90 degrees, 120 degrees apart from X and Y.
    pub const Z_TOWER_ANGLE_DEG: f32 = 90.0;
    pub const TOWER_SPACING_DEG: f32 = 120.0;
}

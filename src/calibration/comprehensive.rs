// SPDX-License-Identifier: GPL-3.0-or-later

//! The comprehensive strategy (spec §4.G): probe repeatability testing,
//! 12-point depth-map acquisition, bed-center-height discovery, the
//! segmented-line probe, and the heuristic (coordinate-descent) surface
//! calibration loop.

use crate::calibration::depth_map::{DepthMap, DepthMapHistory};
use crate::calibration::depth_mm;
use crate::calibration::points::{comprehensive_ring_points, segmented_line_points, tower_base_points};
use crate::consts::calibration::comprehensive::{
    ECCENTRICITY_RADIUS_MM, HEURISTIC_MAX_ITERATIONS, HEURISTIC_OFF_AXIS_TOLERANCE_MM,
    HEURISTIC_STEP_ANGLE_OFFSET_DEG, HEURISTIC_STEP_ARM_LENGTH_MM, HEURISTIC_STEP_ARM_OFFSET_MM,
    HEURISTIC_STEP_RADIUS_OFFSET_MM, MAX_REPEATABILITY_SAMPLES, NUM_RING_POINTS,
    REPEATABILITY_STEP_SANITY_LIMIT,
};
use crate::consts::repeatability::{AVERAGE_RANGE_MM, BORDERLINE_RANGE_MM, VERY_GOOD_RANGE_MM};
use crate::error::{CalibrationError, ConfigError};
use crate::geometry::{ArmSolution, GeometryFacade, GeometryParam, ALL_PARAMS};
use crate::interfaces::{CommandStream, Homing, Idle, MachineLimits};
use crate::math::{fabsf, sqrtf};
use crate::motion::{Actuator, Planner};
use crate::probe::{ProbeConfig, ProbeController, ProbeInput};

// ---------------------------------------------------------------------
// Repeatability test (G29)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RepeatabilityConfig {
    pub samples: u8,
    /// G29 `E`: disable the eccentricity excursion.
    pub eccentricity_enabled: bool,
    /// G29 `A`: planner acceleration override for the duration of the test.
    pub acceleration_override: Option<f32>,
}

impl Default for RepeatabilityConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            eccentricity_enabled: true,
            acceleration_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatabilityClass {
    VeryGood,
    Average,
    Borderline,
    Unusable,
}

fn classify_range(range_mm: f32) -> RepeatabilityClass {
    if range_mm < VERY_GOOD_RANGE_MM {
        RepeatabilityClass::VeryGood
    } else if range_mm < AVERAGE_RANGE_MM {
        RepeatabilityClass::Average
    } else if range_mm < BORDERLINE_RANGE_MM {
        RepeatabilityClass::Borderline
    } else {
        RepeatabilityClass::Unusable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RepeatabilityReport {
    pub samples_taken: u8,
    pub mean_mm: f32,
    pub stddev_mm: f32,
    pub range_mm: f32,
    pub class: RepeatabilityClass,
}

/// `G29`: probes bed center `samples` times (spec boundary: "> 30 ... rejected
/// with message"), optionally preceded each time by an eccentricity
/// excursion to the (hardcoded, §9 open question) 10mm-radius tower-base
/// points, then reports mean/stddev/range and a qualitative class.
pub fn run_repeatability_test<AC, P>(
    cfg: &RepeatabilityConfig,
    probe_cfg: &ProbeConfig,
    controller: &mut ProbeController<AC>,
    input: &P,
    planner: &mut dyn Planner,
    idle: &mut dyn Idle,
    stream: &mut dyn CommandStream,
) -> Result<RepeatabilityReport, CalibrationError>
where
    AC: Actuator,
    P: ProbeInput,
{
    if cfg.samples > MAX_REPEATABILITY_SAMPLES {
        return Err(CalibrationError::Config(ConfigError::OutOfRange("G29 sample count")));
    }
    let samples = cfg.samples.max(1);

    let prior_acceleration = cfg.acceleration_override.map(|a| {
        let prev = planner.segment_acceleration();
        planner.set_segment_acceleration(a);
        prev
    });

    let eccentricity_points = tower_base_points(ECCENTRICITY_RADIUS_MM);
    let steps_per_mm = controller.driver().motion().z_steps_per_mm();

    let mut values_mm: heapless::Vec<f32, 30> = heapless::Vec::new();
    for sample in 0..samples {
        if cfg.eccentricity_enabled {
            for &(x, y) in &eccentricity_points {
                let (_, _, z) = planner.current_position_mm();
                planner.plan_absolute_move(x, y, z, probe_cfg.fast_feedrate_mm_s);
                planner.wait_for_empty(idle)?;
            }
            let (_, _, z) = planner.current_position_mm();
            planner.plan_absolute_move(0.0, 0.0, z, probe_cfg.fast_feedrate_mm_s);
            planner.wait_for_empty(idle)?;
        }

        let steps = controller.probe_at(probe_cfg, input, planner, idle, 0.0, 0.0)?;
        if steps.unsigned_abs() as i32 > REPEATABILITY_STEP_SANITY_LIMIT {
            if let Some(prev) = prior_acceleration {
                planner.set_segment_acceleration(prev);
            }
            return Err(CalibrationError::Config(ConfigError::OutOfRange("probe_height")));
        }

        let mm = depth_mm(steps, steps_per_mm);
        let _ = values_mm.push(mm);

        let mut line: heapless::String<64> = heapless::String::new();
        let _ = core::fmt::write(&mut line, format_args!("[RT] sample:{sample} mm:{mm:.4}"));
        stream.send_line(&line);
    }

    if let Some(prev) = prior_acceleration {
        planner.set_segment_acceleration(prev);
    }

    let n = values_mm.len() as f32;
    let mean = values_mm.iter().sum::<f32>() / n;
    let variance = values_mm.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    let stddev = sqrtf(variance);
    let min = values_mm.iter().cloned().fold(f32::MAX, f32::min);
    let max = values_mm.iter().cloned().fold(f32::MIN, f32::max);
    let range = max - min;
    let class = classify_range(range);

    log::debug!("repeatability test: mean={mean:.4}mm stddev={stddev:.4}mm range={range:.4}mm class={class:?}");

    let mut line: heapless::String<96> = heapless::String::new();
    let _ = core::fmt::write(
        &mut line,
        format_args!("[RT] mean:{mean:.4} stddev:{stddev:.4} range:{range:.4} class:{class:?}"),
    );
    stream.send_line(&line);

    Ok(RepeatabilityReport {
        samples_taken: samples,
        mean_mm: mean,
        stddev_mm: stddev,
        range_mm: range,
        class,
    })
}

// ---------------------------------------------------------------------
// Depth map acquisition (used by G31 and the heuristic loop)
// ---------------------------------------------------------------------

/// Probes bed center, then the 12-point ring (spec §4.G), reporting each
/// point's step delta relative to center.
pub fn acquire_depth_map<AC, P>(
    probe_cfg: &ProbeConfig,
    controller: &mut ProbeController<AC>,
    input: &P,
    planner: &mut dyn Planner,
    idle: &mut dyn Idle,
    stream: &mut dyn CommandStream,
    probe_radius_mm: f32,
) -> Result<DepthMap, CalibrationError>
where
    AC: Actuator,
    P: ProbeInput,
{
    let origin_steps = controller.probe_at(probe_cfg, input, planner, idle, 0.0, 0.0)?;
    let ring_points = comprehensive_ring_points(probe_radius_mm);

    let mut ring_delta_steps = [0i32; NUM_RING_POINTS];
    for (i, &(x, y)) in ring_points.iter().enumerate() {
        let steps = controller.probe_at(probe_cfg, input, planner, idle, x, y)?;
        ring_delta_steps[i] = origin_steps - steps;
    }

    let map = DepthMap {
        center_steps: origin_steps,
        ring_delta_steps,
    };

    let steps_per_mm = controller.driver().motion().z_steps_per_mm();
    let (best, worst) = map.best_worst_mm(steps_per_mm);
    let mut line: heapless::String<64> = heapless::String::new();
    let _ = core::fmt::write(&mut line, format_args!("[DM] best:{best:.4} worst:{worst:.4}"));
    stream.send_line(&line);

    Ok(map)
}

/// Segmented-line probe (spec §4.G): `a -> b` split into `n` segments, plus
/// two perpendicular off-axis points, reported as depths in millimeters.
pub fn probe_segmented_line<AC, P>(
    probe_cfg: &ProbeConfig,
    controller: &mut ProbeController<AC>,
    input: &P,
    planner: &mut dyn Planner,
    idle: &mut dyn Idle,
    stream: &mut dyn CommandStream,
    a: (f32, f32),
    b: (f32, f32),
    n: usize,
) -> Result<heapless::Vec<f32, 34>, CalibrationError>
where
    AC: Actuator,
    P: ProbeInput,
{
    let points = segmented_line_points(a, b, n);
    let steps_per_mm = controller.driver().motion().z_steps_per_mm();
    let mut depths: heapless::Vec<f32, 34> = heapless::Vec::new();
    for (i, &(x, y)) in points.iter().enumerate() {
        let steps = controller.probe_at(probe_cfg, input, planner, idle, x, y)?;
        let mm = depth_mm(steps, steps_per_mm);
        let _ = depths.push(mm);
        let mut line: heapless::String<64> = heapless::String::new();
        let _ = core::fmt::write(&mut line, format_args!("[PT] point:{i} mm:{mm:.4}"));
        stream.send_line(&line);
    }
    Ok(depths)
}

// ---------------------------------------------------------------------
// find_bed_center_height
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct BedCenterHeight {
    pub probe_from_height_mm: f32,
    pub mm_probe_height_to_trigger: f32,
    pub bed_height_mm: f32,
}

/// Owns the session-lifetime state the comprehensive strategy carries:
/// `find_bed_center_height`'s memoized result and the depth-map history
/// the heuristic loop diffs against (spec §3: "reset when the user
/// re-enters a probing operation").
#[derive(Default)]
pub struct ComprehensiveStrategy {
    bed_center_height: Option<BedCenterHeight>,
    depth_maps: DepthMapHistory,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComprehensiveConfig {
    pub probe_radius_mm: f32,
    pub probe_offset_mm: (f32, f32, f32),
}

impl Default for ComprehensiveConfig {
    fn default() -> Self {
        Self {
            probe_radius_mm: crate::consts::probe::DEFAULT_PROBE_RADIUS_MM,
            probe_offset_mm: (0.0, 0.0, 0.0),
        }
    }
}

impl ComprehensiveStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bed_center_height(&self) -> Option<BedCenterHeight> {
        self.bed_center_height
    }

    pub fn depth_maps(&self) -> &DepthMapHistory {
        &self.depth_maps
    }

    pub fn depth_maps_mut(&mut self) -> &mut DepthMapHistory {
        &mut self.depth_maps
    }

    /// Spec §3: depth maps persist across a session but reset when the
    /// user re-enters a probing operation.
    pub fn reset_depth_maps(&mut self) {
        self.depth_maps = DepthMapHistory::default();
    }

    /// Spec §4.G: "run lazily, once per session." Subsequent calls return
    /// the memoized result without moving anything.
    pub fn find_bed_center_height<AC, P, H, M>(
        &mut self,
        cfg: &ComprehensiveConfig,
        probe_cfg: &ProbeConfig,
        controller: &mut ProbeController<AC>,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        stream: &mut dyn CommandStream,
        homing: &mut H,
        limits: &mut M,
    ) -> Result<BedCenterHeight, CalibrationError>
    where
        AC: Actuator,
        P: ProbeInput,
        H: Homing,
        M: MachineLimits,
    {
        if let Some(existing) = self.bed_center_height {
            return Ok(existing);
        }

        homing.home(idle)?;
        let steps_per_mm = controller.driver().motion().z_steps_per_mm();
        let fast_steps = controller.probe_at_feedrate(
            probe_cfg,
            input,
            planner,
            idle,
            0.0,
            0.0,
            probe_cfg.fast_feedrate_mm_s,
        )?;
        let measured_mm = depth_mm(fast_steps, steps_per_mm);
        let probe_from_height_mm = measured_mm - probe_cfg.probe_height_mm;

        homing.home(idle)?;
        planner.plan_relative_move(0.0, 0.0, -probe_from_height_mm, probe_cfg.fast_feedrate_mm_s);
        planner.wait_for_empty(idle)?;

        let (ox, oy, oz) = cfg.probe_offset_mm;
        let slow_steps = controller.probe_at_feedrate(
            probe_cfg,
            input,
            planner,
            idle,
            ox,
            oy,
            probe_cfg.slow_feedrate_mm_s,
        )?;
        let mm_probe_height_to_trigger = depth_mm(slow_steps, steps_per_mm);
        let bed_height_mm = probe_from_height_mm + mm_probe_height_to_trigger + oz;

        limits.set_gamma_max_mm(bed_height_mm);

        let result = BedCenterHeight {
            probe_from_height_mm,
            mm_probe_height_to_trigger,
            bed_height_mm,
        };
        self.bed_center_height = Some(result);
        log::debug!("bed center height resolved: {bed_height_mm:.4}mm");

        let mut line: heapless::String<64> = heapless::String::new();
        let _ = core::fmt::write(&mut line, format_args!("[BH] bed_height:{bed_height_mm:.4}"));
        stream.send_line(&line);

        Ok(result)
    }

    /// The heuristic (coordinate-descent) calibration loop (spec §4.G, §9
    /// Open Question, SPEC_FULL §11/§12): at each iteration, tries a small
    /// step up and down on each of the 11 geometric parameters, keeps
    /// whichever single change most reduces `|average|` and `|intersextile
    /// mean|` without pushing any off-axis point beyond tolerance, and
    /// stops when no trial improves on the current map or the iteration
    /// budget is exhausted.
    pub fn run_heuristic<AC, P, ARM>(
        &mut self,
        cfg: &HeuristicConfig,
        probe_cfg: &ProbeConfig,
        facade: &mut GeometryFacade<ARM>,
        controller: &mut ProbeController<AC>,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        stream: &mut dyn CommandStream,
    ) -> Result<HeuristicReport, CalibrationError>
    where
        AC: Actuator,
        P: ProbeInput,
        ARM: ArmSolution,
    {
        let steps_per_mm = controller.driver().motion().z_steps_per_mm();

        let initial_map = acquire_depth_map(
            probe_cfg,
            controller,
            input,
            planner,
            idle,
            stream,
            cfg.probe_radius_mm,
        )?;
        self.depth_maps.push(initial_map);

        let mut average = initial_map.average_mm(steps_per_mm);
        let mut intersextile = initial_map.intersextile_mean_mm(steps_per_mm);
        let mut accepted = 0u8;
        let mut iterations_run = 0u8;

        for iteration in 1..=cfg.max_iterations {
            iterations_run = iteration;
            let mut best: Option<(GeometryParam, f32, DepthMap, f32, f32)> = None;

            for &param in ALL_PARAMS.iter() {
                let original = facade.get(param);
                let step = heuristic_step(param);

                for &delta in &[step, -step] {
                    facade.set(param, original + delta);
                    let candidate = acquire_depth_map(
                        probe_cfg,
                        controller,
                        input,
                        planner,
                        idle,
                        stream,
                        cfg.probe_radius_mm,
                    )?;
                    facade.set(param, original);

                    let candidate_avg = candidate.average_mm(steps_per_mm);
                    let candidate_inter = candidate.intersextile_mean_mm(steps_per_mm);
                    let off_axis = candidate.off_axis_max_deviation_mm(steps_per_mm);

                    let improves =
                        fabsf(candidate_avg) < fabsf(average) && fabsf(candidate_inter) < fabsf(intersextile);
                    let within_tolerance = off_axis <= cfg.off_axis_tolerance_mm;

                    if improves && within_tolerance {
                        let is_better = match &best {
                            None => true,
                            Some((_, _, _, best_avg, _)) => fabsf(candidate_avg) < fabsf(*best_avg),
                        };
                        if is_better {
                            best = Some((param, original + delta, candidate, candidate_avg, candidate_inter));
                        }
                    }
                }
            }

            match best {
                Some((param, value, map, avg, inter)) => {
                    log::debug!(
                        "heuristic iteration {iteration}: accepted {}={value:.4}, average={avg:.4}mm",
                        param.key()
                    );
                    facade.set(param, value);
                    average = avg;
                    intersextile = inter;
                    accepted += 1;
                    self.depth_maps.push(map);

                    let mut line: heapless::String<64> = heapless::String::new();
                    let _ = core::fmt::write(
                        &mut line,
                        format_args!("[PG] iteration:{iteration} param:{} avg:{avg:.4}", param.key()),
                    );
                    stream.send_line(&line);
                }
                None => {
                    log::debug!("heuristic iteration {iteration}: no improving adjustment found, stopping");
                    let mut line: heapless::String<64> = heapless::String::new();
                    let _ = core::fmt::write(
                        &mut line,
                        format_args!("[PG] iteration:{iteration} no improving adjustment"),
                    );
                    stream.send_line(&line);
                    break;
                }
            }
        }

        Ok(HeuristicReport {
            iterations_run,
            accepted_adjustments: accepted,
            final_average_mm: average,
            final_intersextile_mean_mm: intersextile,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeuristicConfig {
    pub probe_radius_mm: f32,
    pub max_iterations: u8,
    pub off_axis_tolerance_mm: f32,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            probe_radius_mm: crate::consts::probe::DEFAULT_PROBE_RADIUS_MM,
            max_iterations: HEURISTIC_MAX_ITERATIONS,
            off_axis_tolerance_mm: HEURISTIC_OFF_AXIS_TOLERANCE_MM,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReport {
    pub iterations_run: u8,
    pub accepted_adjustments: u8,
    pub final_average_mm: f32,
    pub final_intersextile_mean_mm: f32,
}

fn heuristic_step(param: GeometryParam) -> f32 {
    match param {
        GeometryParam::ArmLength => HEURISTIC_STEP_ARM_LENGTH_MM,
        GeometryParam::DeltaRadius | GeometryParam::RadiusOffset(_) => HEURISTIC_STEP_RADIUS_OFFSET_MM,
        GeometryParam::AngleOffset(_) => HEURISTIC_STEP_ANGLE_OFFSET_DEG,
        GeometryParam::ArmOffset(_) => HEURISTIC_STEP_ARM_OFFSET_MM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_thresholds_match_spec() {
        assert_eq!(classify_range(0.01), RepeatabilityClass::VeryGood);
        assert_eq!(classify_range(0.02), RepeatabilityClass::Average);
        assert_eq!(classify_range(0.035), RepeatabilityClass::Borderline);
        assert_eq!(classify_range(0.05), RepeatabilityClass::Unusable);
    }

    #[test]
    fn sample_count_above_thirty_is_rejected() {
        let cfg = RepeatabilityConfig {
            samples: 31,
            ..Default::default()
        };
        assert!(cfg.samples > MAX_REPEATABILITY_SAMPLES);
    }

    #[test]
    fn heuristic_step_sizes_are_distinct_per_kind() {
        use crate::geometry::Tower;
        assert_eq!(heuristic_step(GeometryParam::ArmLength), HEURISTIC_STEP_ARM_LENGTH_MM);
        assert_eq!(
            heuristic_step(GeometryParam::RadiusOffset(Tower::X)),
            HEURISTIC_STEP_RADIUS_OFFSET_MM
        );
        assert_eq!(
            heuristic_step(GeometryParam::AngleOffset(Tower::X)),
            HEURISTIC_STEP_ANGLE_OFFSET_DEG
        );
        assert_eq!(
            heuristic_step(GeometryParam::ArmOffset(Tower::X)),
            HEURISTIC_STEP_ARM_OFFSET_MM
        );
    }

    #[test]
    fn bed_center_height_formula_matches_spec() {
        let probe_from_height_mm = 150.0;
        let mm_probe_height_to_trigger = 4.8;
        let probe_offset_z = -0.2;
        let bed_height = probe_from_height_mm + mm_probe_height_to_trigger + probe_offset_z;
        assert_eq!(bed_height, 154.6);
    }
}

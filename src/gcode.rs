// SPDX-License-Identifier: GPL-3.0-or-later

//! The G-code surface (spec §6, §9 Design Notes "G-code dispatch
//! re-entry"): a tagged sum of the commands this core understands, and a
//! `Machine` that owns the calibration-relevant state (geometry, probe
//! config, the comprehensive strategy's session memory) across calls.
//! The embedding firmware is responsible for lexing/parsing actual G-code
//! text into a `GCode` value and for routing unrecognized codes elsewhere
//! — no string synthesis or reparsing happens on this side of the
//! boundary.

use bitflags::bitflags;

use crate::calibration::comprehensive::{
    self, ComprehensiveConfig, ComprehensiveStrategy, HeuristicConfig, RepeatabilityConfig,
};
use crate::calibration::{self, delta_radius, endstop};
use crate::error::CalibrationError;
use crate::geometry::{ArmSolution, GeometryFacade, ALL_PARAMS};
use crate::interfaces::{CommandStream, Homing, Idle, MachineLimits, MachineZAxis};
use crate::motion::{Actuator, Axis, Planner};
use crate::probe::{CompensationTransform, ProbeConfig, ProbeController, ProbeInput};

bitflags! {
    /// Which optional `M670`/`M503` fields are present on a given command —
    /// the Smoothieware-lineage convention of letter parameters being
    /// individually optional, reified as a bitset instead of a pile of
    /// `Option<f32>` booleans re-derived ad hoc at each call site.
    #[derive(Default)]
    pub struct ProbeParamFields: u8 {
        const SLOW_FEEDRATE   = 1 << 0;
        const FAST_FEEDRATE   = 1 << 1;
        const RETURN_FEEDRATE = 1 << 2;
        const MAX_Z           = 1 << 3;
        const PROBE_HEIGHT    = 1 << 4;
        const INVERT          = 1 << 5;
    }
}

/// `M670 [S K R Z H I]` payload (spec §6): only the fields flagged present
/// in `present` are applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeParams {
    pub present: ProbeParamFields,
    pub slow_feedrate_mm_s: f32,
    pub fast_feedrate_mm_s: f32,
    pub return_feedrate_mm_s: f32,
    pub max_z_mm: f32,
    pub probe_height_mm: f32,
    pub invert: bool,
}

/// `G31`'s comprehensive/heuristic operation selector (spec §6: "depth map,
/// annealing variants"). The letter-to-operation mapping is not fixed in
/// the source this was distilled from (§9 Open Questions); see DESIGN.md
/// for the chosen reading.
#[derive(Debug, Clone, Copy)]
pub enum ComprehensiveOperation {
    DepthMap { probe_radius_mm: f32 },
    BedCenterHeight { probe_offset_mm: (f32, f32, f32) },
    SegmentedLine { a: (f32, f32), b: (f32, f32), segments: usize },
    Heuristic(HeuristicConfig),
}

/// Every command this core's dispatcher understands (spec §6). Axis moves
/// for `G38.2`/`G38.3` are expressed in machine coordinates, matching the
/// motion boundary's `relative_move(dx,dy,dz,feedrate)` contract (§9).
#[derive(Debug, Clone, Copy)]
pub enum GCode {
    /// `G28`: delegated homing.
    G28,
    /// `G29 [A S B D E P U V]`: repeatability test.
    G29(RepeatabilityConfig),
    /// `G30 [R F Z]`: single probe. `F` overrides the probing feedrate;
    /// `Z`, when present, resets the machine's Z axis to that value on
    /// trigger instead of returning to the pre-probe height.
    G30 {
        reverse: bool,
        feedrate_mm_s: Option<f32>,
        override_z_mm: Option<f32>,
    },
    /// `G31 [...]`: comprehensive/heuristic calibration.
    G31(ComprehensiveOperation),
    /// `G32 [R E I J K]`: endstop + delta-radius compound.
    G32 {
        skip_endstop: bool,
        skip_delta_radius: bool,
        target_mm: Option<f32>,
        probe_radius_mm: Option<f32>,
        keep_trim: bool,
    },
    /// `G38.2`: straight probe, alarms on miss.
    G38_2 { axis: Axis, distance_mm: f32, feedrate_mm_s: f32 },
    /// `G38.3`: straight probe, silent on miss.
    G38_3 { axis: Axis, distance_mm: f32, feedrate_mm_s: f32 },
    /// `M119`: report probe pin state.
    M119,
    /// `M204 S<a>`: set planner acceleration.
    M204 { acceleration_mm_s2: f32 },
    /// `M500`: save settings (persistence itself is external, per §6).
    M500,
    /// `M503`: print settings.
    M503,
    /// `M665 Z<h>`: set gamma-max.
    M665 { gamma_max_mm: f32 },
    /// `M670 [S K R Z H I]`: probe feedrate/geometry parameter overrides.
    M670(ProbeParams),
}

/// The calibration-relevant machine state this core owns across G-code
/// calls: the probe controller (and through it, the actuators/motion
/// tick state), the geometry facade, the probe configuration, and the
/// comprehensive strategy's session memory (`find_bed_center_height`
/// memoization, depth-map history). Everything else an operation needs —
/// the planner, the probe pin, the cooperative yield point, the command
/// stream, homing, machine limits, the bed-compensation transform — is a
/// genuinely external collaborator (spec §1) and is threaded through
/// `dispatch` explicitly instead of being owned here.
pub struct Machine<AC: Actuator, ARM: ArmSolution> {
    controller: ProbeController<AC>,
    facade: GeometryFacade<ARM>,
    probe_cfg: ProbeConfig,
    comprehensive: ComprehensiveStrategy,
}

impl<AC: Actuator, ARM: ArmSolution> Machine<AC, ARM> {
    pub fn new(controller: ProbeController<AC>, facade: GeometryFacade<ARM>, probe_cfg: ProbeConfig) -> Self {
        Self {
            controller,
            facade,
            probe_cfg,
            comprehensive: ComprehensiveStrategy::new(),
        }
    }

    pub fn probe_config(&self) -> &ProbeConfig {
        &self.probe_cfg
    }

    pub fn facade(&self) -> &GeometryFacade<ARM> {
        &self.facade
    }

    pub fn facade_mut(&mut self) -> &mut GeometryFacade<ARM> {
        &mut self.facade
    }

    pub fn controller_mut(&mut self) -> &mut ProbeController<AC> {
        &mut self.controller
    }

    #[allow(clippy::too_many_arguments)]
    pub fn dispatch<P, H, ML, CT, MZ>(
        &mut self,
        code: GCode,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        stream: &mut dyn CommandStream,
        homing: &mut H,
        limits: &mut ML,
        compensation: &mut CT,
        machine_z: &mut MZ,
    ) -> Result<(), CalibrationError>
    where
        P: ProbeInput,
        H: Homing,
        ML: MachineLimits,
        CT: CompensationTransform,
        MZ: MachineZAxis,
    {
        match code {
            GCode::G28 => {
                homing.home(idle)?;
                stream.send_ok();
                Ok(())
            }

            GCode::G29(cfg) => {
                comprehensive::run_repeatability_test(
                    &cfg,
                    &self.probe_cfg,
                    &mut self.controller,
                    input,
                    planner,
                    idle,
                    stream,
                )?;
                stream.send_ok();
                Ok(())
            }

            GCode::G30 { reverse, feedrate_mm_s, override_z_mm } => {
                self.controller.single_probe(
                    &self.probe_cfg,
                    input,
                    planner,
                    idle,
                    stream,
                    machine_z,
                    reverse,
                    feedrate_mm_s,
                    override_z_mm,
                )?;
                Ok(())
            }

            GCode::G31(op) => {
                self.dispatch_comprehensive(op, input, planner, idle, stream, homing, limits)?;
                stream.send_ok();
                Ok(())
            }

            GCode::G32 {
                skip_endstop,
                skip_delta_radius,
                target_mm,
                probe_radius_mm,
                keep_trim,
            } => {
                let mut endstop_cfg = endstop::EndstopConfig::default();
                let mut radius_cfg = delta_radius::DeltaRadiusConfig::default();
                if let Some(t) = target_mm {
                    endstop_cfg.target_mm = t;
                    radius_cfg.target_mm = t;
                }
                if let Some(r) = probe_radius_mm {
                    endstop_cfg.probe_radius_mm = r;
                    radius_cfg.probe_radius_mm = r;
                }
                endstop_cfg.keep_trim = keep_trim;

                let cfg = calibration::AutoCalibrationConfig {
                    endstop: endstop_cfg,
                    delta_radius: radius_cfg,
                    skip_endstop,
                    skip_delta_radius,
                };
                calibration::run_auto_calibration(
                    &cfg,
                    &self.probe_cfg,
                    &mut self.facade,
                    &mut self.controller,
                    input,
                    planner,
                    idle,
                    stream,
                )?;
                stream.send_ok();
                Ok(())
            }

            GCode::G38_2 { axis, distance_mm, feedrate_mm_s } => {
                self.controller.straight_probe(
                    &self.probe_cfg,
                    input,
                    compensation,
                    planner,
                    idle,
                    stream,
                    axis,
                    distance_mm,
                    feedrate_mm_s,
                    true,
                )?;
                Ok(())
            }

            GCode::G38_3 { axis, distance_mm, feedrate_mm_s } => {
                self.controller.straight_probe(
                    &self.probe_cfg,
                    input,
                    compensation,
                    planner,
                    idle,
                    stream,
                    axis,
                    distance_mm,
                    feedrate_mm_s,
                    false,
                )?;
                Ok(())
            }

            GCode::M119 => {
                let triggered = crate::probe::is_active(input, self.probe_cfg.invert);
                stream.send_line(if triggered { "Probe: 1" } else { "Probe: 0" });
                stream.send_ok();
                Ok(())
            }

            GCode::M204 { acceleration_mm_s2 } => {
                planner.set_segment_acceleration(acceleration_mm_s2);
                stream.send_ok();
                Ok(())
            }

            GCode::M500 | GCode::M503 => {
                self.print_settings(stream);
                stream.send_ok();
                Ok(())
            }

            GCode::M665 { gamma_max_mm } => {
                limits.set_gamma_max_mm(gamma_max_mm);
                stream.send_ok();
                Ok(())
            }

            GCode::M670(params) => {
                self.apply_probe_params(params);
                stream.send_ok();
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_comprehensive<P, H, ML>(
        &mut self,
        op: ComprehensiveOperation,
        input: &P,
        planner: &mut dyn Planner,
        idle: &mut dyn Idle,
        stream: &mut dyn CommandStream,
        homing: &mut H,
        limits: &mut ML,
    ) -> Result<(), CalibrationError>
    where
        P: ProbeInput,
        H: Homing,
        ML: MachineLimits,
    {
        match op {
            ComprehensiveOperation::DepthMap { probe_radius_mm } => {
                let map = comprehensive::acquire_depth_map(
                    &self.probe_cfg,
                    &mut self.controller,
                    input,
                    planner,
                    idle,
                    stream,
                    probe_radius_mm,
                )?;
                self.comprehensive.depth_maps_mut().push(map);
                Ok(())
            }
            ComprehensiveOperation::BedCenterHeight { probe_offset_mm } => {
                let cfg = ComprehensiveConfig {
                    probe_offset_mm,
                    ..ComprehensiveConfig::default()
                };
                self.comprehensive.find_bed_center_height(
                    &cfg,
                    &self.probe_cfg,
                    &mut self.controller,
                    input,
                    planner,
                    idle,
                    stream,
                    homing,
                    limits,
                )?;
                Ok(())
            }
            ComprehensiveOperation::SegmentedLine { a, b, segments } => {
                comprehensive::probe_segmented_line(
                    &self.probe_cfg,
                    &mut self.controller,
                    input,
                    planner,
                    idle,
                    stream,
                    a,
                    b,
                    segments,
                )?;
                Ok(())
            }
            ComprehensiveOperation::Heuristic(heuristic_cfg) => {
                self.comprehensive.run_heuristic(
                    &heuristic_cfg,
                    &self.probe_cfg,
                    &mut self.facade,
                    &mut self.controller,
                    input,
                    planner,
                    idle,
                    stream,
                )?;
                Ok(())
            }
        }
    }

    fn apply_probe_params(&mut self, params: ProbeParams) {
        if params.present.contains(ProbeParamFields::SLOW_FEEDRATE) {
            self.probe_cfg.slow_feedrate_mm_s = params.slow_feedrate_mm_s;
        }
        if params.present.contains(ProbeParamFields::FAST_FEEDRATE) {
            self.probe_cfg.fast_feedrate_mm_s = params.fast_feedrate_mm_s;
        }
        if params.present.contains(ProbeParamFields::RETURN_FEEDRATE) {
            self.probe_cfg.return_feedrate_mm_s = params.return_feedrate_mm_s;
        }
        if params.present.contains(ProbeParamFields::MAX_Z) {
            self.probe_cfg.max_z_mm = params.max_z_mm;
        }
        if params.present.contains(ProbeParamFields::PROBE_HEIGHT) {
            self.probe_cfg.probe_height_mm = params.probe_height_mm;
        }
        if params.present.contains(ProbeParamFields::INVERT) {
            self.probe_cfg.invert = params.invert;
        }
    }

    /// `M503` (and `M500`'s in-core half): emits the `M670` feedrate/height
    /// line and the eleven geometry scalars, matching spec §6's "Save /
    /// print settings including `M670 S<slow> K<fast> R<return> Z<max>
    /// H<height>`". Writing this to non-volatile storage is the embedding
    /// firmware's job (§6: "external to this core").
    fn print_settings(&self, stream: &mut dyn CommandStream) {
        let mut line: heapless::String<96> = heapless::String::new();
        let _ = core::fmt::write(
            &mut line,
            format_args!(
                "M670 S{:.3} K{:.3} R{:.3} Z{:.3} H{:.3} I{}",
                self.probe_cfg.slow_feedrate_mm_s,
                self.probe_cfg.fast_feedrate_mm_s,
                self.probe_cfg.return_feedrate_mm_s,
                self.probe_cfg.max_z_mm,
                self.probe_cfg.probe_height_mm,
                self.probe_cfg.invert as u8,
            ),
        );
        stream.send_line(&line);

        for &param in ALL_PARAMS.iter() {
            let mut line: heapless::String<32> = heapless::String::new();
            let _ = core::fmt::write(
                &mut line,
                format_args!("M665 {}{:.4}", param.key(), self.facade.get(param)),
            );
            stream.send_line(&line);
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end calibration scenarios (spec §8), run against a small
//! simulated rig instead of the per-module hand-fed fixtures the rest of
//! the crate's unit tests use: a shared Z-position cell plays the role of
//! the physical effector, a shared XY-position cell lets the simulated
//! probe react to wherever the planner last moved to, and a shared arm
//! solution lets the simulated bed read back whatever trim/delta_radius
//! the strategy under test has applied so far, the same way a real probe
//! would feel the effect of its own prior corrections.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::calibration::points::tower_base_points;
use crate::calibration::{delta_radius, endstop};
use crate::error::CalibrationError;
use crate::geometry::{ArmSolution, GeometryFacade, GeometryParam, Tower};
use crate::interfaces::Idle;
use crate::motion::{Actuator, AxisConfig, Planner, ProbeMotionControl, Steps};
use crate::probe::{ProbeConfig, ProbeController, ProbeDriver, ProbeInput};
use crate::testing::{MockArmSolution, MockCommandStream, MockIdle, MockPlanner};

const STEPS_PER_MM: f32 = 160.0;
const PROBE_RADIUS_MM: f32 = 100.0;

#[derive(Clone, Default)]
struct SharedSteps(Rc<Cell<i32>>);

impl SharedSteps {
    fn get(&self) -> i32 {
        self.0.get()
    }
}

/// Wraps a plain simulated actuator, mirroring its position out to a shared
/// cell after every rate change so a `ProbeInput` elsewhere can see it.
#[derive(Clone, Default)]
struct TrackedActuator {
    inner: crate::testing::MockActuator,
    shared: SharedSteps,
}

impl Actuator for TrackedActuator {
    fn stepped(&self) -> Steps {
        self.inner.stepped()
    }

    fn current_position(&self) -> Steps {
        self.inner.current_position()
    }

    fn is_moving(&self) -> bool {
        self.inner.is_moving()
    }

    fn begin_move(&mut self, steps: u32, direction_sign: i32) {
        self.inner.begin_move(steps, direction_sign);
        // `stepped()`, not `current_position()`: the probe driver triggers
        // off the per-descent odometer (matches `ProbeMotionControl::tick`),
        // which `begin_move` resets to zero.
        self.shared.0.set(self.inner.stepped().0);
    }

    fn set_rate(&mut self, steps_per_sec: f32) {
        self.inner.set_rate(steps_per_sec);
        self.shared.0.set(self.inner.stepped().0);
    }

    fn stop(&mut self) {
        self.inner.stop();
    }
}

#[derive(Clone, Default)]
struct SharedXY(Rc<Cell<(f32, f32)>>);

/// Wraps `MockPlanner`, mirroring its XY position out to a shared cell so
/// the simulated probe input can see where it's being asked about.
struct TrackingPlanner {
    inner: MockPlanner,
    xy: SharedXY,
}

impl TrackingPlanner {
    fn new(xy: SharedXY) -> Self {
        Self {
            inner: MockPlanner::default(),
            xy,
        }
    }

    fn sync(&self) {
        let (x, y, _) = self.inner.current_position_mm();
        self.xy.0.set((x, y));
    }
}

impl Planner for TrackingPlanner {
    fn wait_for_empty(&mut self, idle: &mut dyn Idle) -> Result<(), CalibrationError> {
        self.inner.wait_for_empty(idle)
    }

    fn plan_relative_move(&mut self, dx_mm: f32, dy_mm: f32, dz_mm: f32, feedrate_mm_s: f32) {
        self.inner.plan_relative_move(dx_mm, dy_mm, dz_mm, feedrate_mm_s);
        self.sync();
    }

    fn plan_absolute_move(&mut self, x_mm: f32, y_mm: f32, z_mm: f32, feedrate_mm_s: f32) {
        self.inner.plan_absolute_move(x_mm, y_mm, z_mm, feedrate_mm_s);
        self.sync();
    }

    fn segment_acceleration(&self) -> f32 {
        self.inner.segment_acceleration()
    }

    fn set_segment_acceleration(&mut self, mm_s2: f32) {
        self.inner.set_segment_acceleration(mm_s2);
    }

    fn current_position_mm(&self) -> (f32, f32, f32) {
        self.inner.current_position_mm()
    }

    fn is_moving(&self) -> bool {
        self.inner.is_moving()
    }

    fn cancel(&mut self) {
        self.inner.cancel();
    }
}

/// A `MockArmSolution` shared between the `GeometryFacade` a strategy
/// mutates and the `SimulatedZSurface` that reads it back, so a trim or
/// delta_radius write made by `endstop::run`/`delta_radius::run` is visible
/// to the very next probe instead of being probed against a frozen fixture.
#[derive(Clone, Default)]
struct SharedArmSolution(Rc<RefCell<MockArmSolution>>);

impl ArmSolution for SharedArmSolution {
    fn get_param(&self, param: GeometryParam) -> f32 {
        self.0.borrow().get_param(param)
    }

    fn set_param(&mut self, param: GeometryParam, value: f32) {
        self.0.borrow_mut().set_param(param, value);
    }

    fn get_trim(&self, tower: Tower) -> f32 {
        self.0.borrow().get_trim(tower)
    }

    fn set_trim(&mut self, tower: Tower, value: f32) {
        self.0.borrow_mut().set_trim(tower, value);
    }

    fn axis_position(&self) -> [Steps; 3] {
        self.0.borrow().axis_position()
    }

    fn reset_axis_position(&mut self, position: [Steps; 3]) {
        self.0.borrow_mut().reset_axis_position(position);
    }
}

/// Barycentric weight of each tower's trim at `(x, y)`, used to turn the
/// three independent per-tower trims into a single continuous correction
/// surface: 1.0 for a tower at its own base point, 0.0 for the other two,
/// and an even 1/3 each at the bed center (the centroid of the three tower
/// points), interpolating linearly in between.
fn trim_weights(x: f32, y: f32) -> [f32; 3] {
    let [a, b, c] = tower_base_points(PROBE_RADIUS_MM);
    let denom = (b.1 - c.1) * (a.0 - c.0) + (c.0 - b.0) * (a.1 - c.1);
    let wa = ((b.1 - c.1) * (x - c.0) + (c.0 - b.0) * (y - c.1)) / denom;
    let wb = ((c.1 - a.1) * (x - c.0) + (a.0 - c.0) * (y - c.1)) / denom;
    [wa, wb, 1.0 - wa - wb]
}

/// Describes a simulated bed's true physical shape (spec §8 scenarios):
/// the pure, printer-opinion-independent surface (`tilt_fn`) plus the
/// bowl/dome distortion a wrong `delta_radius` would make a real delta
/// print (maximal at the bed center, vanishing at the tower-base ring,
/// zero once `delta_radius` matches `true_radius_mm`).
#[derive(Clone, Copy)]
struct SurfaceModel {
    base_depth_mm: f32,
    tilt_fn: fn(f32, f32) -> f32,
    true_radius_mm: f32,
    radial_gain: f32,
}

impl SurfaceModel {
    fn flat(base_depth_mm: f32, tilt_fn: fn(f32, f32) -> f32) -> Self {
        // `true_radius_mm` equal to the facade's starting delta_radius
        // (100.0, see `geometry()`) keeps the radial term inert for
        // scenarios that never touch delta_radius.
        Self {
            base_depth_mm,
            tilt_fn,
            true_radius_mm: 100.0,
            radial_gain: 0.0,
        }
    }

    fn bowl_or_dome(base_depth_mm: f32, true_radius_mm: f32, radial_gain: f32) -> Self {
        Self {
            base_depth_mm,
            tilt_fn: |_x, _y| 0.0,
            true_radius_mm,
            radial_gain,
        }
    }

    /// The depth a probe at `(x, y)` would measure, given the trims and
    /// delta_radius currently stored in `arm`.
    fn depth_at(&self, x: f32, y: f32, arm: &SharedArmSolution) -> f32 {
        let trims = [arm.get_trim(Tower::X), arm.get_trim(Tower::Y), arm.get_trim(Tower::Z)];
        let delta_radius = arm.get_param(GeometryParam::DeltaRadius);

        let weights = trim_weights(x, y);
        let trim_term: f32 = weights.iter().zip(trims.iter()).map(|(w, t)| w * t).sum();

        let r2 = x * x + y * y;
        let falloff = (1.0 - r2 / (PROBE_RADIUS_MM * PROBE_RADIUS_MM)).max(0.0);
        let radial_term = (self.true_radius_mm - delta_radius) * self.radial_gain * falloff;

        // A more negative trim raises that tower's effective home, which
        // shrinks the measured probe depth at points near it — the same
        // direction `GeometryFacade::set_trim`'s forward-kinematics resync
        // gives a real arm solution.
        self.base_depth_mm + (self.tilt_fn)(x, y) + trim_term + radial_term
    }
}

/// A bed whose height at `(x, y)` is given by `model`, combined with the
/// live trim/delta_radius state in `arm`, returning a depth in millimeters
/// using the same sign convention as `calibration::depth_mm` (positive =
/// lower).
struct SimulatedZSurface {
    z: SharedSteps,
    xy: SharedXY,
    arm: SharedArmSolution,
    model: SurfaceModel,
}

impl ProbeInput for SimulatedZSurface {
    fn read_raw(&self) -> bool {
        let (x, y) = self.xy.0.get();
        let depth_mm = self.model.depth_at(x, y, &self.arm);
        let trigger_steps = -(depth_mm * STEPS_PER_MM) as i32;
        self.z.get() <= trigger_steps
    }
}

fn axis_cfg() -> AxisConfig {
    AxisConfig {
        acceleration_mm_s2: 25.0,
        deceleration_mm_s2: 60.0,
        steps_per_mm: STEPS_PER_MM,
        min_step_rate: 20.0,
    }
}

struct Rig {
    controller: ProbeController<TrackedActuator>,
    input: SimulatedZSurface,
    planner: TrackingPlanner,
    idle: MockIdle,
    stream: MockCommandStream,
}

/// Builds a simulated rig and the `GeometryFacade` it shares state with.
/// The facade starts at `delta_radius = 100.0` and zero trim, matching
/// `SurfaceModel::flat`'s inert radial term.
fn build_rig(model: SurfaceModel) -> (Rig, GeometryFacade<SharedArmSolution>) {
    let z_shared = SharedSteps::default();
    let xy_shared = SharedXY::default();
    let arm = SharedArmSolution::default();

    let mut facade = GeometryFacade::new(arm.clone());
    facade.set(GeometryParam::DeltaRadius, 100.0);
    facade.mark_clean();

    let x_actuator = TrackedActuator::default();
    let y_actuator = TrackedActuator::default();
    let z_actuator = TrackedActuator {
        inner: crate::testing::MockActuator::default(),
        shared: z_shared.clone(),
    };

    let mc = ProbeMotionControl::new([x_actuator, y_actuator, z_actuator], [axis_cfg(); 3]);
    let controller = ProbeController::new(ProbeDriver::new(mc));

    let input = SimulatedZSurface {
        z: z_shared,
        xy: xy_shared.clone(),
        arm,
        model,
    };
    let planner = TrackingPlanner::new(xy_shared);

    let rig = Rig {
        controller,
        input,
        planner,
        idle: MockIdle::default(),
        stream: MockCommandStream::default(),
    };
    (rig, facade)
}

// ---------------------------------------------------------------------
// Scenario 1: a level bed needs no trim adjustment.
// ---------------------------------------------------------------------

#[test]
fn level_bed_converges_without_adjusting_trim() {
    let (mut rig, mut facade) = build_rig(SurfaceModel::flat(2.0, |_x, _y| 0.0));

    let report = endstop::run(
        &endstop::EndstopConfig::default(),
        &ProbeConfig::default(),
        &mut facade,
        &mut rig.controller,
        &rig.input,
        &mut rig.planner,
        &mut rig.idle,
        &mut rig.stream,
    )
    .unwrap();

    assert_eq!(report.iterations, 1);
    assert_eq!(report.deviation_mm, 0.0);
    for t in report.trims_mm {
        assert!(t.abs() < 1e-6);
    }
}

// ---------------------------------------------------------------------
// Scenario 2: a tilted bed (X tower low, Y/Z level) levels out over a few
// iterations, leaving the X tower with the most negative trim.
// ---------------------------------------------------------------------

#[test]
fn tilted_bed_levels_trim_toward_the_low_tower() {
    // The X tower sits on the positive-x side of the ring; make it deeper
    // (lower) than the other two by 0.3mm (48 steps difference, but each
    // point's own depth is comfortably above the plausibility floor since
    // `base_depth_mm` carries a 2.0mm/320-step margin).
    let model = SurfaceModel::flat(2.0, |x, _y| if x > 10.0 { 0.3 } else { 0.0 });
    let (mut rig, mut facade) = build_rig(model);

    let report = endstop::run(
        &endstop::EndstopConfig::default(),
        &ProbeConfig::default(),
        &mut facade,
        &mut rig.controller,
        &rig.input,
        &mut rig.planner,
        &mut rig.idle,
        &mut rig.stream,
    )
    .unwrap();

    assert!(report.deviation_mm <= 0.03);
    let min_trim = report.trims_mm.iter().cloned().fold(f32::MAX, f32::min);
    assert!((report.trims_mm[Tower::X.index()] - min_trim).abs() < 1e-6);
}

// ---------------------------------------------------------------------
// Idempotence (spec §8): running endstop-calibration twice in a row, both
// in "keep" mode, converges on the second call in <=2 iterations and only
// moves the trims by normalization, not further proportional correction.
// ---------------------------------------------------------------------

#[test]
fn keep_mode_converges_in_at_most_two_iterations_on_a_second_run() {
    let model = SurfaceModel::flat(2.0, |x, _y| if x > 10.0 { 0.3 } else { 0.0 });
    let (mut rig, mut facade) = build_rig(model);
    let keep_cfg = endstop::EndstopConfig {
        keep_trim: true,
        ..endstop::EndstopConfig::default()
    };

    let first = endstop::run(
        &keep_cfg,
        &ProbeConfig::default(),
        &mut facade,
        &mut rig.controller,
        &rig.input,
        &mut rig.planner,
        &mut rig.idle,
        &mut rig.stream,
    )
    .unwrap();
    assert!(first.deviation_mm <= keep_cfg.target_mm);

    let second = endstop::run(
        &keep_cfg,
        &ProbeConfig::default(),
        &mut facade,
        &mut rig.controller,
        &rig.input,
        &mut rig.planner,
        &mut rig.idle,
        &mut rig.stream,
    )
    .unwrap();

    assert!(second.iterations <= 2, "second run took {} iterations", second.iterations);
    assert!(second.deviation_mm <= keep_cfg.target_mm);
}

// ---------------------------------------------------------------------
// Scenario 3: a bowl-shaped bed (center lower than the rim) increases
// delta_radius.
// ---------------------------------------------------------------------

#[test]
fn bowl_surface_increases_delta_radius() {
    // Center deeper than the rim (a salad-bowl dip): the true radius
    // (101.5) exceeds the facade's starting 100.0, so `delta_radius` must
    // grow to flatten it. Every probed depth (5.0mm base, +0.525mm peak at
    // center) stays far above the 100-step plausibility floor (0.625mm).
    let model = SurfaceModel::bowl_or_dome(5.0, 101.5, 0.35);
    let (mut rig, mut facade) = build_rig(model);
    let initial_radius = facade.get(GeometryParam::DeltaRadius);

    let report = delta_radius::run(
        &delta_radius::DeltaRadiusConfig::default(),
        &ProbeConfig::default(),
        &mut facade,
        &mut rig.controller,
        &rig.input,
        &mut rig.planner,
        &mut rig.idle,
        &mut rig.stream,
    )
    .unwrap();

    assert!(report.delta_radius_mm > initial_radius);
    assert!(report.deviation_mm.abs() <= delta_radius::DeltaRadiusConfig::default().target_mm);
}

// ---------------------------------------------------------------------
// Scenario 3b: a dome-shaped bed (center higher than the rim) decreases
// delta_radius.
// ---------------------------------------------------------------------

#[test]
fn dome_surface_decreases_delta_radius() {
    // Center shallower than the rim (a dome): the true radius (98.5) is
    // below the facade's starting 100.0, so `delta_radius` must shrink.
    let model = SurfaceModel::bowl_or_dome(5.0, 98.5, 0.35);
    let (mut rig, mut facade) = build_rig(model);
    let initial_radius = facade.get(GeometryParam::DeltaRadius);

    let report = delta_radius::run(
        &delta_radius::DeltaRadiusConfig::default(),
        &ProbeConfig::default(),
        &mut facade,
        &mut rig.controller,
        &rig.input,
        &mut rig.planner,
        &mut rig.idle,
        &mut rig.stream,
    )
    .unwrap();

    assert!(report.delta_radius_mm < initial_radius);
    assert!(report.deviation_mm.abs() <= delta_radius::DeltaRadiusConfig::default().target_mm);
}

// ---------------------------------------------------------------------
// Scenario 5: a surface entirely out of reach never triggers; the probe
// cycle reports `NotTriggered` rather than silently treating a timeout as
// contact.
// ---------------------------------------------------------------------

#[test]
fn unreachable_surface_reports_not_triggered_instead_of_a_false_contact() {
    let (mut rig, _facade) = build_rig(SurfaceModel::flat(10_000.0, |_x, _y| 0.0));
    let mut cfg = ProbeConfig::default();
    cfg.max_z_mm = 5.0;

    let err = rig
        .controller
        .probe_at(&cfg, &rig.input, &mut rig.planner, &mut rig.idle, 0.0, 0.0)
        .unwrap_err();

    assert_eq!(err, CalibrationError::NotTriggered);
}

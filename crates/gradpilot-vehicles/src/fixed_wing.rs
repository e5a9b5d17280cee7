//! Small fixed-wing aircraft with linearized aerodynamic coefficients.
//!
//! Control: `[thrust, elevator, aileron, rudder]`. Body frame: x forward,
//! y left, z up. Coefficients follow the usual aerospace sign conventions
//! (nose-up pitch, nose-right yaw, sideslip from the right); the mapping to
//! body-axis torques happens in [`FixedWing::aero_wrench`].

use std::ops::Range;

use gradpilot_diff::{Scalar, safe_norm};
use gradpilot_math::{GRAVITY, V3, Vec3};
use gradpilot_model::{Bounds, Dynamics, ModelError, Result};
use serde::{Deserialize, Serialize};

use crate::rigid::{
    self, MassProperties, RigidState, STATE_DIM, TrackingWeights, rigid_perturbation_scale,
};

/// Stability and control derivatives (per radian).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AeroCoefficients {
    pub cl0: f64,
    pub cl_alpha: f64,
    pub cl_elevator: f64,
    pub cd0: f64,
    /// Induced drag factor: `CD = cd0 + k·CL²`.
    pub cd_k: f64,
    pub cy_beta: f64,
    pub croll_beta: f64,
    pub croll_p: f64,
    pub croll_aileron: f64,
    pub cm0: f64,
    pub cm_alpha: f64,
    pub cm_q: f64,
    pub cm_elevator: f64,
    pub cn_beta: f64,
    pub cn_r: f64,
    pub cn_rudder: f64,
}

impl Default for AeroCoefficients {
    fn default() -> Self {
        Self {
            cl0: 0.3,
            cl_alpha: 5.0,
            cl_elevator: 0.4,
            cd0: 0.03,
            cd_k: 0.05,
            cy_beta: -0.3,
            croll_beta: -0.05,
            croll_p: -0.4,
            croll_aileron: 0.15,
            cm0: 0.02,
            cm_alpha: -0.6,
            cm_q: -8.0,
            cm_elevator: -0.8,
            cn_beta: 0.08,
            cn_r: -0.15,
            cn_rudder: -0.06,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedWingParams {
    pub mass: f64,
    pub inertia: [f64; 3],
    pub wing_area: f64,
    pub wing_span: f64,
    pub mean_chord: f64,
    pub air_density: f64,
    pub max_thrust: f64,
    /// Maximum surface deflection (rad), shared by all three surfaces.
    pub max_deflection: f64,
    /// Speed used for trim (nominal control).
    pub cruise_speed: f64,
    /// Softening speed in `V = sqrt(|v|² + v0²)`.
    pub airspeed_floor: f64,
    pub gravity: f64,
    pub aero: AeroCoefficients,
    pub weights: TrackingWeights,
}

impl Default for FixedWingParams {
    fn default() -> Self {
        Self {
            mass: 1.2,
            inertia: [0.05, 0.08, 0.12],
            wing_area: 0.3,
            wing_span: 1.4,
            mean_chord: 0.22,
            air_density: 1.225,
            max_thrust: 15.0,
            max_deflection: 0.4,
            cruise_speed: 12.0,
            airspeed_floor: 1.0,
            gravity: GRAVITY,
            aero: AeroCoefficients::default(),
            weights: TrackingWeights {
                position: 1.0,
                attitude: 0.2,
                velocity: 0.05,
                body_rate: 0.01,
            },
        }
    }
}

impl FixedWingParams {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("mass", self.mass),
            ("inertia[0]", self.inertia[0]),
            ("inertia[1]", self.inertia[1]),
            ("inertia[2]", self.inertia[2]),
            ("wing_area", self.wing_area),
            ("wing_span", self.wing_span),
            ("mean_chord", self.mean_chord),
            ("air_density", self.air_density),
            ("max_thrust", self.max_thrust),
            ("max_deflection", self.max_deflection),
            ("cruise_speed", self.cruise_speed),
            ("airspeed_floor", self.airspeed_floor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidParameter(format!(
                    "fixed_wing.{name} must be positive, got {value}"
                )));
            }
        }
        if self.aero.cm_elevator == 0.0 || self.aero.cl_alpha == 0.0 {
            return Err(ModelError::InvalidParameter(
                "fixed_wing.aero: cl_alpha and cm_elevator must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FixedWing {
    pub params: FixedWingParams,
    body: MassProperties,
    bounds: [Bounds; 4],
    weights: [f64; STATE_DIM],
}

impl FixedWing {
    pub fn new(params: FixedWingParams) -> Result<Self> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: FixedWingParams) -> Self {
        let body = MassProperties {
            mass: params.mass,
            inertia: Vec3::from(params.inertia),
        };
        let d = Bounds::symmetric(params.max_deflection);
        let bounds = [Bounds::new(0.0, params.max_thrust), d, d, d];
        let weights = params.weights.expand();
        Self {
            params,
            body,
            bounds,
            weights,
        }
    }

    /// Level-flight trim at cruise speed: `(thrust, elevator, angle of attack)`.
    pub fn trim(&self) -> (f64, f64, f64) {
        let p = &self.params;
        let a = &p.aero;
        let qs = 0.5 * p.air_density * p.cruise_speed.powi(2) * p.wing_area;
        let cl = p.mass * p.gravity / qs;
        // Solve lift and pitch balance jointly for (α, δe).
        let det = a.cl_alpha * a.cm_elevator - a.cl_elevator * a.cm_alpha;
        let (alpha, elevator) = if det.abs() > 1e-12 {
            let rhs_l = cl - a.cl0;
            let rhs_m = -a.cm0;
            (
                (rhs_l * a.cm_elevator - a.cl_elevator * rhs_m) / det,
                (a.cl_alpha * rhs_m - a.cm_alpha * rhs_l) / det,
            )
        } else {
            ((cl - a.cl0) / a.cl_alpha, 0.0)
        };
        let thrust = qs * (a.cd0 + a.cd_k * cl * cl);
        (thrust, elevator, alpha)
    }

    /// A state flying level along +x at cruise speed and trim attitude.
    pub fn cruise_state(&self, position: Vec3) -> Vec<f64> {
        let (_, _, alpha) = self.trim();
        let mut s = rigid::hover_state(position);
        // Nose-up pitch by α: rotation of -α about body y (y points left).
        s[rigid::QUAT] = (alpha * 0.5).cos();
        s[rigid::QUAT + 2] = -(alpha * 0.5).sin();
        s[rigid::VEL] = self.params.cruise_speed;
        s
    }

    /// `sqrt(|v|² + v₀²)`: the body-frame speed, floored so that it can be
    /// divided by and differentiated at rest.
    pub fn airspeed<S: Scalar>(&self, v_body: V3<S>) -> S {
        safe_norm(&[v_body.x, v_body.y, v_body.z], self.params.airspeed_floor)
    }

    /// Aerodynamic force (body frame) and torque (body frame).
    pub fn aero_wrench<S: Scalar>(
        &self,
        v_body: V3<S>,
        rate: V3<S>,
        control: &[S],
    ) -> (V3<S>, V3<S>) {
        let p = &self.params;
        let a = &p.aero;
        let airspeed = self.airspeed(v_body);
        let inv_v = airspeed.constant_like(1.0) / airspeed;

        // Small-angle incidence estimates, bounded since |v| < V.
        let alpha = -v_body.z * inv_v;
        let beta = -v_body.y * inv_v;
        // Aerospace rates: roll right, pitch up, yaw right.
        let (p_rate, q_rate, r_rate) = (rate.x, -rate.y, -rate.z);
        let (elevator, aileron, rudder) = (control[1], control[2], control[3]);

        let qbar_s = airspeed.square() * (0.5 * p.air_density * p.wing_area);
        let half_span = 0.5 * p.wing_span;
        let half_chord = 0.5 * p.mean_chord;

        let cl = alpha * a.cl_alpha + elevator * a.cl_elevator + a.cl0;
        let cd = cl.square() * a.cd_k + a.cd0;
        let cy = beta * a.cy_beta;

        let lift = qbar_s * cl;
        let drag = qbar_s * cd;
        let side = qbar_s * cy;

        // Drag against the airflow, lift perpendicular to it in the body x-z
        // plane, side force to the right.
        let zero = airspeed.constant_like(0.0);
        let lift_dir = V3::new(-v_body.z, zero, v_body.x).scale(inv_v);
        let force = v_body.scale(drag * inv_v * -1.0)
            + lift_dir.scale(lift)
            + V3::new(zero, -side, zero);

        let roll = qbar_s
            * (beta * a.croll_beta
                + p_rate * inv_v * (a.croll_p * half_span)
                + aileron * a.croll_aileron)
            * p.wing_span;
        let pitch = qbar_s
            * (alpha * a.cm_alpha
                + q_rate * inv_v * (a.cm_q * half_chord)
                + elevator * a.cm_elevator
                + a.cm0)
            * p.mean_chord;
        let yaw = qbar_s
            * (beta * a.cn_beta + r_rate * inv_v * (a.cn_r * half_span) + rudder * a.cn_rudder)
            * p.wing_span;

        (force, V3::new(roll, -pitch, -yaw))
    }
}

impl Default for FixedWing {
    fn default() -> Self {
        Self::build(FixedWingParams::default())
    }
}

impl Dynamics for FixedWing {
    fn name(&self) -> &'static str {
        "fixed-wing"
    }

    fn state_dim(&self) -> usize {
        STATE_DIM
    }

    fn control_bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    fn advance<S: Scalar>(&self, state: &[S], control: &[S], dt: f64) -> Vec<S> {
        let s = RigidState::unpack(state);
        let v_body = s.attitude.inverse_rotate(s.velocity);
        let (mut force_body, torque) = self.aero_wrench(v_body, s.body_rate, control);
        force_body.x = force_body.x + control[0];
        let force = s.attitude.rotate(force_body);
        self.body
            .integrate(&s, force, torque, self.params.gravity, dt)
            .pack()
    }

    fn nominal_control(&self) -> Vec<f64> {
        let (thrust, elevator, _) = self.trim();
        let d = self.params.max_deflection;
        vec![
            thrust.clamp(0.0, self.params.max_thrust),
            elevator.clamp(-d, d),
            0.0,
            0.0,
        ]
    }

    fn error_weights(&self) -> &[f64] {
        &self.weights
    }

    fn position_indices(&self) -> Range<usize> {
        rigid::POS..rigid::POS + 3
    }

    fn quaternion_offset(&self) -> Option<usize> {
        Some(rigid::QUAT)
    }

    fn perturbation_scale(&self) -> Vec<f64> {
        rigid_perturbation_scale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradpilot_diff::tape_gradient;
    use gradpilot_model::{finite_diff_jacobians, tape_jacobians};

    #[test]
    fn test_trim_holds_level_flight() {
        let fw = FixedWing::default();
        let mut s = fw.cruise_state(Vec3::new(0.0, 0.0, 50.0));
        let u = fw.nominal_control();
        for _ in 0..50 {
            s = fw.advance(&s, &u, 0.01);
        }
        // Half a second at trim: altitude and speed stay close.
        assert!((s[rigid::POS + 2] - 50.0).abs() < 0.05, "z = {}", s[2]);
        assert!((s[rigid::VEL] - 12.0).abs() < 0.1);
        assert!(s[rigid::POS] > 5.5);
    }

    #[test]
    fn test_trim_values_reasonable() {
        let fw = FixedWing::default();
        let (thrust, elevator, alpha) = fw.trim();
        assert!(thrust > 0.0 && thrust < fw.params.max_thrust);
        assert!(elevator.abs() < fw.params.max_deflection);
        assert!(alpha > 0.0 && alpha < 0.2);
    }

    #[test]
    fn test_finite_at_rest() {
        // Zero velocity must not divide by zero thanks to the airspeed floor.
        let fw = FixedWing::default();
        let s = rigid::hover_state(Vec3::zeros());
        let next = fw.advance(&s, &[0.0, 0.4, -0.4, 0.4], 0.01);
        assert!(next.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_airspeed_is_smooth_at_rest() {
        let fw = FixedWing::default();
        let floor = fw.params.airspeed_floor;
        assert_relative_eq!(fw.airspeed(V3::new(0.0, 0.0, 0.0)), floor);
        assert_relative_eq!(
            fw.airspeed(V3::new(12.0, 0.0, 0.0)),
            (144.0 + floor * floor).sqrt(),
            epsilon = 1e-12
        );
        let (_, grad) =
            tape_gradient(|_, v| fw.airspeed(V3::from_slice(v, 0)), &[0.0, 0.0, 0.0]);
        assert_eq!(grad, vec![0.0, 0.0, 0.0]);
        let (_, grad) =
            tape_gradient(|_, v| fw.airspeed(V3::from_slice(v, 0)), &[3.0, 0.0, -4.0]);
        let speed = (25.0 + floor * floor).sqrt();
        assert_relative_eq!(grad[0], 3.0 / speed, epsilon = 1e-12);
        assert_relative_eq!(grad[2], -4.0 / speed, epsilon = 1e-12);
    }

    #[test]
    fn test_aileron_rolls() {
        let fw = FixedWing::default();
        let v = V3::new(12.0, 0.0, 0.0);
        let w = V3::new(0.0, 0.0, 0.0);
        let (_, tau) = fw.aero_wrench(v, w, &[0.0, 0.0, 0.2, 0.0]);
        assert!(tau.x > 0.0);
        let (_, tau) = fw.aero_wrench(v, w, &[0.0, 0.0, 0.0, 0.2]);
        // Negative cn_rudder: positive rudder yaws nose-left, a positive body z torque.
        assert!(tau.z > 0.0);
    }

    #[test]
    fn test_step_jacobians_match() {
        let fw = FixedWing::default();
        let mut s = fw.cruise_state(Vec3::new(1.0, 2.0, 30.0));
        s[rigid::VEL + 1] = 0.8;
        s[rigid::RATE] = 0.3;
        let u = [3.0, 0.05, -0.1, 0.02];
        let exact = tape_jacobians(&fw, &s, &u, 0.01).unwrap();
        let approx = finite_diff_jacobians(&fw, &s, &u, 0.01, 1e-6).unwrap();
        assert!((&exact.dx_dx - &approx.dx_dx).abs().max() < 1e-5);
        assert!((&exact.dx_du - &approx.dx_du).abs().max() < 1e-5);
    }

    #[test]
    fn test_invalid_params() {
        let params = FixedWingParams {
            airspeed_floor: 0.0,
            ..Default::default()
        };
        assert!(FixedWing::new(params).is_err());
        assert_relative_eq!(FixedWingParams::default().cruise_speed, 12.0);
    }
}

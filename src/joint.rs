//! Joints connecting a body to its parent.
//!
//! All variants are dispatched from a flat [JointKind] enum. A joint maps its generalized
//! coordinates to the transform of the child body relative to the parent body
//!
//! `T(q) = T_parent_joint · Q(q) · T_child_joint⁻¹`
//!
//! and its generalized velocities to the relative twist `S(q)·q̇` expressed in the child body
//! frame. Position and velocity of a joint depend on its own coordinates only.

use crate::dof::DofProperties;
use crate::math::{adjoint, exp_so3, left_jacobian_so3, log_so3, spatial, Transform};
use crate::DynamicsError;
use itertools::Itertools;
use nalgebra::{Isometry3, Matrix6xX, Rotation3, Translation3, UnitQuaternion, Vector3, Vector6};

/// Order of the rotations of an [JointKind::Euler] joint (intrinsic rotations)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EulerOrder {
    XYZ,
    ZYX,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    /// Rigid connection without degrees of freedom
    Weld,
    Revolute { axis: Vector3<f64> },
    Prismatic { axis: Vector3<f64> },
    /// Rotation about and translation along `axis` by `pitch` per radian
    Screw { axis: Vector3<f64>, pitch: f64 },
    /// Rotation about `axis1` followed by rotation about the rotated `axis2`
    Universal { axis1: Vector3<f64>, axis2: Vector3<f64> },
    /// Spherical joint in exponential coordinates, velocity is the body angular velocity
    Ball,
    /// Six degrees of freedom `[rotation (exponential coordinates); translation]`, velocity is
    /// the body twist
    Free,
    Euler { order: EulerOrder },
    /// Three translational degrees of freedom
    Translational,
}

impl JointKind {
    pub fn revolute(axis: Vector3<f64>) -> Self {
        JointKind::Revolute { axis }
    }

    pub fn prismatic(axis: Vector3<f64>) -> Self {
        JointKind::Prismatic { axis }
    }

    pub fn screw(axis: Vector3<f64>, pitch: f64) -> Self {
        JointKind::Screw { axis, pitch }
    }

    pub fn universal(axis1: Vector3<f64>, axis2: Vector3<f64>) -> Self {
        JointKind::Universal { axis1, axis2 }
    }

    pub fn dof_count(&self) -> usize {
        match self {
            JointKind::Weld => 0,
            JointKind::Revolute { .. } | JointKind::Prismatic { .. } | JointKind::Screw { .. } => 1,
            JointKind::Universal { .. } => 2,
            JointKind::Ball | JointKind::Euler { .. } | JointKind::Translational => 3,
            JointKind::Free => 6,
        }
    }

    /// Whether the joint carries rotational coordinates that live on a manifold
    pub fn is_euclidean(&self) -> bool {
        !matches!(self, JointKind::Ball | JointKind::Free)
    }

    fn dof_suffixes(&self) -> &'static [&'static str] {
        match self {
            JointKind::Weld => &[],
            JointKind::Revolute { .. } | JointKind::Prismatic { .. } | JointKind::Screw { .. } => {
                &[""]
            }
            JointKind::Universal { .. } => &["_1", "_2"],
            JointKind::Ball | JointKind::Euler { .. } => &["_x", "_y", "_z"],
            JointKind::Translational => &["_pos_x", "_pos_y", "_pos_z"],
            JointKind::Free => &["_rot_x", "_rot_y", "_rot_z", "_pos_x", "_pos_y", "_pos_z"],
        }
    }

    /// Normalizes the axes, fails for zero or non-finite axes
    fn normalized(&self, joint: &str) -> Result<JointKind, DynamicsError> {
        let unit = |axis: &Vector3<f64>| {
            let norm = axis.norm();
            if norm.is_finite() && norm > 1e-12 {
                Ok(axis / norm)
            } else {
                Err(DynamicsError::InvalidAxis {
                    joint: joint.to_string(),
                })
            }
        };
        Ok(match self {
            JointKind::Revolute { axis } => JointKind::Revolute { axis: unit(axis)? },
            JointKind::Prismatic { axis } => JointKind::Prismatic { axis: unit(axis)? },
            JointKind::Screw { axis, pitch } => {
                if !pitch.is_finite() {
                    return Err(DynamicsError::MissingProperty {
                        owner: joint.to_string(),
                        property: "pitch".to_string(),
                    });
                }
                JointKind::Screw {
                    axis: unit(axis)?,
                    pitch: *pitch,
                }
            }
            JointKind::Universal { axis1, axis2 } => {
                let (axis1, axis2) = (unit(axis1)?, unit(axis2)?);
                // parallel axes do not span two rotations
                if axis1.cross(&axis2).norm() < 1e-9 {
                    return Err(DynamicsError::InvalidAxis {
                        joint: joint.to_string(),
                    });
                }
                JointKind::Universal { axis1, axis2 }
            }
            other => other.clone(),
        })
    }
}

/// How the generalized force of a joint's coordinates comes about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuatorType {
    /// The command is the generalized force (clamped to the force limits)
    #[default]
    Force,
    /// No actuation, only springs, dampers and external forces act
    Passive,
    /// The command is a target velocity reached within the force limits
    Servo,
    /// The command is a prescribed acceleration
    Acceleration,
    /// The command is a target velocity reached regardless of the force limits
    Velocity,
    /// The coordinates are held in place
    Locked,
}

impl ActuatorType {
    /// Whether the motion (rather than the force) of the coordinates is prescribed
    pub fn is_prescribed(&self) -> bool {
        matches!(
            self,
            ActuatorType::Servo
                | ActuatorType::Acceleration
                | ActuatorType::Velocity
                | ActuatorType::Locked
        )
    }
}

/// Description of a joint, turned into a [Joint] when added to a skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct JointProperties {
    pub name: String,
    pub kind: JointKind,
    /// Pose of the joint frame in the parent body frame
    pub parent_to_joint: Transform,
    /// Pose of the joint frame in the child body frame
    pub child_to_joint: Transform,
    pub actuator: ActuatorType,
    pub position_limits_enforced: bool,
    pub velocity_limits_enforced: bool,
    /// Either empty (defaults) or one entry per degree of freedom
    pub dofs: Vec<DofProperties>,
}

impl JointProperties {
    pub fn new(name: impl Into<String>, kind: JointKind) -> Self {
        JointProperties {
            name: name.into(),
            kind,
            parent_to_joint: Transform::identity(),
            child_to_joint: Transform::identity(),
            actuator: ActuatorType::default(),
            position_limits_enforced: false,
            velocity_limits_enforced: false,
            dofs: vec![],
        }
    }

    pub fn with_parent_to_joint(mut self, transform: Transform) -> Self {
        self.parent_to_joint = transform;
        self
    }

    pub fn with_child_to_joint(mut self, transform: Transform) -> Self {
        self.child_to_joint = transform;
        self
    }

    pub fn with_actuator(mut self, actuator: ActuatorType) -> Self {
        self.actuator = actuator;
        self
    }

    pub fn with_position_limits_enforced(mut self, enforced: bool) -> Self {
        self.position_limits_enforced = enforced;
        self
    }

    pub fn with_velocity_limits_enforced(mut self, enforced: bool) -> Self {
        self.velocity_limits_enforced = enforced;
        self
    }

    pub fn with_dofs(mut self, dofs: Vec<DofProperties>) -> Self {
        self.dofs = dofs;
        self
    }

    /// Uses the same properties for every degree of freedom
    pub fn with_all_dofs(mut self, dof: DofProperties) -> Self {
        self.dofs = vec![dof; self.kind.dof_count()];
        self
    }
}

/// A joint attached to a body. The degrees of freedom are stored in the skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    name: String,
    kind: JointKind,
    parent_to_joint: Transform,
    child_to_joint: Transform,
    actuator: ActuatorType,
    position_limits_enforced: bool,
    velocity_limits_enforced: bool,
}

impl Joint {
    /// Validates the properties and creates the joint along with the (named) properties of its
    /// degrees of freedom
    pub fn from_properties(
        properties: &JointProperties,
    ) -> Result<(Joint, Vec<DofProperties>), DynamicsError> {
        let kind = properties.kind.normalized(&properties.name)?;
        let count = kind.dof_count();
        let mut dofs = match properties.dofs.len() {
            0 => vec![DofProperties::default(); count],
            n if n == count => properties.dofs.clone(),
            n => {
                return Err(DynamicsError::DimensionMismatch {
                    expected: count,
                    actual: n,
                })
            }
        };
        for (dof, name) in dofs.iter_mut().zip(dof_names(&properties.name, &kind)) {
            dof.validate(&properties.name)?;
            if dof.name.is_none() {
                dof.name = Some(name);
            }
        }
        let joint = Joint {
            name: properties.name.clone(),
            kind,
            parent_to_joint: properties.parent_to_joint,
            child_to_joint: properties.child_to_joint,
            actuator: properties.actuator,
            position_limits_enforced: properties.position_limits_enforced,
            velocity_limits_enforced: properties.velocity_limits_enforced,
        };
        Ok((joint, dofs))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn dof_count(&self) -> usize {
        self.kind.dof_count()
    }

    pub fn actuator(&self) -> ActuatorType {
        self.actuator
    }

    pub(crate) fn set_actuator(&mut self, actuator: ActuatorType) {
        self.actuator = actuator;
    }

    pub fn parent_to_joint(&self) -> &Transform {
        &self.parent_to_joint
    }

    pub fn child_to_joint(&self) -> &Transform {
        &self.child_to_joint
    }

    pub fn position_limits_enforced(&self) -> bool {
        self.position_limits_enforced
    }

    pub fn velocity_limits_enforced(&self) -> bool {
        self.velocity_limits_enforced
    }

    /// Transform of the child body relative to the parent body
    pub fn relative_transform(&self, q: &[f64]) -> Transform {
        self.parent_to_joint * self.motion(q) * self.child_to_joint.inverse()
    }

    /// Motion subspace `S` (6 x dof count) in the child body frame
    pub fn relative_jacobian(&self, q: &[f64]) -> Matrix6xX<f64> {
        adjoint(&self.child_to_joint) * self.local_jacobian(q)
    }

    /// Time derivative `Ṡ` of the motion subspace
    pub fn relative_jacobian_deriv(&self, q: &[f64], dq: &[f64]) -> Matrix6xX<f64> {
        adjoint(&self.child_to_joint) * self.local_jacobian_deriv(q, dq)
    }

    /// Relative twist `S·q̇` of the child body in the child body frame
    pub fn relative_velocity(&self, q: &[f64], dq: &[f64]) -> Vector6<f64> {
        self.relative_jacobian(q) * nalgebra::DVector::from_column_slice(dq)
    }

    /// Relative spatial acceleration `Ṡ·q̇ + S·q̈`
    pub fn relative_acceleration(&self, q: &[f64], dq: &[f64], ddq: &[f64]) -> Vector6<f64> {
        self.relative_jacobian_deriv(q, dq) * nalgebra::DVector::from_column_slice(dq)
            + self.relative_jacobian(q) * nalgebra::DVector::from_column_slice(ddq)
    }

    /// Advances the positions by the velocities over a time step. Rotational coordinates of
    /// ball and free joints are integrated on the rotation group.
    pub fn integrate_positions(&self, q: &mut [f64], dq: &[f64], dt: f64) {
        match self.kind {
            JointKind::Ball => {
                let rotation = exp_so3(&vec3(q, 0)) * exp_so3(&(vec3(dq, 0) * dt));
                q.copy_from_slice(log_so3(&rotation).as_slice());
            }
            JointKind::Free => {
                let rotation = exp_so3(&vec3(q, 0));
                let w = vec3(dq, 0) * dt;
                let translation = vec3(q, 3) + rotation * (left_jacobian_so3(&w) * vec3(dq, 3) * dt);
                let rotation = rotation * exp_so3(&w);
                q[..3].copy_from_slice(log_so3(&rotation).as_slice());
                q[3..].copy_from_slice(translation.as_slice());
            }
            _ => q.iter_mut().zip(dq).for_each(|(q, dq)| *q += dq * dt),
        }
    }

    /// Transform `Q(q)` of the joint frame on the child relative to the joint frame on the
    /// parent
    fn motion(&self, q: &[f64]) -> Transform {
        match &self.kind {
            JointKind::Weld => Transform::identity(),
            JointKind::Revolute { axis } => rotation(&Rotation3::new(axis * q[0])),
            JointKind::Prismatic { axis } => {
                Isometry3::from_parts(Translation3::from(axis * q[0]), UnitQuaternion::identity())
            }
            JointKind::Screw { axis, pitch } => Isometry3::from_parts(
                Translation3::from(axis * (pitch * q[0])),
                UnitQuaternion::from_scaled_axis(axis * q[0]),
            ),
            JointKind::Ball => Isometry3::from_parts(Translation3::identity(), exp_so3(&vec3(q, 0))),
            JointKind::Free => {
                Isometry3::from_parts(Translation3::from(vec3(q, 3)), exp_so3(&vec3(q, 0)))
            }
            JointKind::Translational => {
                Isometry3::from_parts(Translation3::from(vec3(q, 0)), UnitQuaternion::identity())
            }
            JointKind::Universal { .. } | JointKind::Euler { .. } => {
                let chain = self
                    .rotation_axes()
                    .iter()
                    .zip(q)
                    .fold(Rotation3::identity(), |acc, (axis, angle)| {
                        acc * Rotation3::new(axis * *angle)
                    });
                rotation(&chain)
            }
        }
    }

    fn rotation_axes(&self) -> Vec<Vector3<f64>> {
        match &self.kind {
            JointKind::Universal { axis1, axis2 } => vec![*axis1, *axis2],
            JointKind::Euler {
                order: EulerOrder::XYZ,
            } => vec![Vector3::x(), Vector3::y(), Vector3::z()],
            JointKind::Euler {
                order: EulerOrder::ZYX,
            } => vec![Vector3::z(), Vector3::y(), Vector3::x()],
            _ => vec![],
        }
    }

    /// Body angular velocity directions `c_i = (R_{i+1}···R_k)ᵀ e_i` of a chain of rotations
    fn chain_columns(&self, q: &[f64]) -> Vec<Vector3<f64>> {
        let axes = self.rotation_axes();
        let mut columns = vec![Vector3::zeros(); axes.len()];
        let mut trailing = Rotation3::identity();
        for i in (0..axes.len()).rev() {
            columns[i] = trailing.inverse() * axes[i];
            trailing = Rotation3::new(axes[i] * q[i]) * trailing;
        }
        columns
    }

    fn local_jacobian(&self, q: &[f64]) -> Matrix6xX<f64> {
        let n = self.dof_count();
        let mut s = Matrix6xX::zeros(n);
        match &self.kind {
            JointKind::Weld => {}
            JointKind::Revolute { axis } => s.set_column(0, &spatial(axis, &Vector3::zeros())),
            JointKind::Prismatic { axis } => s.set_column(0, &spatial(&Vector3::zeros(), axis)),
            JointKind::Screw { axis, pitch } => s.set_column(0, &spatial(axis, &(axis * *pitch))),
            JointKind::Ball => s.fixed_view_mut::<3, 3>(0, 0).fill_with_identity(),
            JointKind::Translational => s.fixed_view_mut::<3, 3>(3, 0).fill_with_identity(),
            JointKind::Free => s.fill_with_identity(),
            JointKind::Universal { .. } | JointKind::Euler { .. } => {
                for (i, column) in self.chain_columns(q).iter().enumerate() {
                    s.set_column(i, &spatial(column, &Vector3::zeros()));
                }
            }
        }
        s
    }

    fn local_jacobian_deriv(&self, q: &[f64], dq: &[f64]) -> Matrix6xX<f64> {
        let n = self.dof_count();
        let mut ds = Matrix6xX::zeros(n);
        if let JointKind::Universal { .. } | JointKind::Euler { .. } = self.kind {
            let columns = self.chain_columns(q);
            // ċ_i = c_i × Σ_{j>i} c_j q̇_j
            let mut trailing = Vector3::zeros();
            for i in (0..columns.len()).rev() {
                ds.set_column(i, &spatial(&columns[i].cross(&trailing), &Vector3::zeros()));
                trailing += columns[i] * dq[i];
            }
        }
        ds
    }
}

fn rotation(r: &Rotation3<f64>) -> Transform {
    Isometry3::from_parts(Translation3::identity(), UnitQuaternion::from_rotation_matrix(r))
}

fn vec3(values: &[f64], offset: usize) -> Vector3<f64> {
    Vector3::new(values[offset], values[offset + 1], values[offset + 2])
}

/// Names of the degrees of freedom a joint of this kind would create
pub fn dof_names(joint: &str, kind: &JointKind) -> Vec<String> {
    kind.dof_suffixes()
        .iter()
        .map(|suffix| format!("{joint}{suffix}"))
        .collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{angular, euler_xyz, euler_zyx, linear, translation};
    use approx::assert_abs_diff_eq;

    fn all_kinds() -> Vec<JointKind> {
        vec![
            JointKind::Weld,
            JointKind::revolute(Vector3::new(1.0, 1.0, 0.0)),
            JointKind::prismatic(Vector3::z()),
            JointKind::screw(Vector3::x(), 0.2),
            JointKind::universal(Vector3::x(), Vector3::y()),
            JointKind::Ball,
            JointKind::Free,
            JointKind::Euler {
                order: EulerOrder::XYZ,
            },
            JointKind::Euler {
                order: EulerOrder::ZYX,
            },
            JointKind::Translational,
        ]
    }

    fn joint(kind: JointKind) -> Joint {
        Joint::from_properties(&JointProperties::new("j", kind)).unwrap().0
    }

    fn sample(n: usize, scale: f64) -> Vec<f64> {
        (0..n).map(|i| scale * (0.3 + 0.17 * i as f64)).collect_vec()
    }

    #[test_log::test]
    fn test_identity_at_zero() {
        for kind in all_kinds() {
            let joint = joint(kind);
            let q = vec![0.0; joint.dof_count()];
            assert_abs_diff_eq!(
                joint.relative_transform(&q).to_homogeneous(),
                Transform::identity().to_homogeneous(),
                epsilon = 1e-12
            );
        }
    }

    #[test_log::test]
    fn test_reference_transform_at_zero() {
        let offset = translation(&Vector3::new(0.0, 0.0, 1.0));
        let properties = JointProperties::new("j", JointKind::Ball).with_parent_to_joint(offset);
        let (joint, _) = Joint::from_properties(&properties).unwrap();
        assert_abs_diff_eq!(
            joint.relative_transform(&[0.0; 3]).to_homogeneous(),
            offset.to_homogeneous()
        );
    }

    #[test_log::test]
    fn test_invalid_axis() {
        for kind in [
            JointKind::revolute(Vector3::zeros()),
            JointKind::prismatic(Vector3::new(f64::NAN, 0.0, 0.0)),
            JointKind::screw(Vector3::zeros(), 1.0),
            JointKind::universal(Vector3::x(), Vector3::x() * 2.0),
        ] {
            assert_eq!(
                Joint::from_properties(&JointProperties::new("bad", kind)).map(|_| ()),
                Err(DynamicsError::InvalidAxis { joint: "bad".into() })
            );
        }
        assert!(matches!(
            Joint::from_properties(
                &JointProperties::new("j", JointKind::Ball).with_dofs(vec![DofProperties::default()])
            ),
            Err(DynamicsError::DimensionMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test_log::test]
    fn test_dof_names() {
        let (_, dofs) = Joint::from_properties(&JointProperties::new("hip", JointKind::Free)).unwrap();
        assert_eq!(dofs[0].name.as_deref(), Some("hip_rot_x"));
        assert_eq!(dofs[5].name.as_deref(), Some("hip_pos_z"));
        assert_eq!(dof_names("knee", &JointKind::revolute(Vector3::x())), vec!["knee"]);
    }

    #[test_log::test]
    fn test_euler_matches_rotation() {
        let q = [0.3, -0.7, 1.2];
        let xyz = joint(JointKind::Euler { order: EulerOrder::XYZ });
        let zyx = joint(JointKind::Euler { order: EulerOrder::ZYX });
        assert_abs_diff_eq!(
            xyz.relative_transform(&q).rotation.to_rotation_matrix().into_inner(),
            euler_xyz(&Vector3::from(q)).into_inner(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            zyx.relative_transform(&q).rotation.to_rotation_matrix().into_inner(),
            euler_zyx(&Vector3::from(q)).into_inner(),
            epsilon = 1e-12
        );
    }

    /// The relative twist must match the finite-difference body velocity of the transform
    #[test_log::test]
    fn test_velocity_matches_finite_difference() {
        let frame = Transform::from_parts(
            Translation3::new(0.1, 0.2, -0.3),
            UnitQuaternion::from_scaled_axis(Vector3::new(0.3, 0.1, 0.2)),
        );
        for kind in all_kinds() {
            if !kind.is_euclidean() {
                continue;
            }
            let properties = JointProperties::new("j", kind)
                .with_parent_to_joint(frame)
                .with_child_to_joint(frame.inverse());
            let (joint, _) = Joint::from_properties(&properties).unwrap();
            let n = joint.dof_count();
            let (q, dq) = (sample(n, 1.0), sample(n, -0.5));
            let h = 1e-7;
            let q_next = q.iter().zip(&dq).map(|(q, dq)| q + h * dq).collect_vec();
            let delta = joint.relative_transform(&q).inverse() * joint.relative_transform(&q_next);
            let w = delta.rotation.scaled_axis() / h;
            let v = delta.translation.vector / h;
            let twist = joint.relative_velocity(&q, &dq);
            assert_abs_diff_eq!(angular(&twist), w, epsilon = 1e-5);
            assert_abs_diff_eq!(linear(&twist), v, epsilon = 1e-5);
        }
    }

    #[test_log::test]
    fn test_jacobian_deriv_matches_finite_difference() {
        for kind in [
            JointKind::universal(Vector3::x(), Vector3::new(0.0, 1.0, 1.0)),
            JointKind::Euler { order: EulerOrder::XYZ },
            JointKind::Euler { order: EulerOrder::ZYX },
        ] {
            let joint = joint(kind);
            let n = joint.dof_count();
            let (q, dq) = (sample(n, 1.0), sample(n, 0.8));
            let h = 1e-7;
            let q_next = q.iter().zip(&dq).map(|(q, dq)| q + h * dq).collect_vec();
            let numeric = (joint.relative_jacobian(&q_next) - joint.relative_jacobian(&q)) / h;
            assert_abs_diff_eq!(joint.relative_jacobian_deriv(&q, &dq), numeric, epsilon = 1e-5);
        }
    }

    #[test_log::test]
    fn test_manifold_integration() {
        // integrating the ball joint must agree with the body velocity definition
        let ball = joint(JointKind::Ball);
        let mut q = vec![0.4, -0.2, 0.1];
        let start = ball.relative_transform(&q);
        let dq = [0.0, 0.0, 2.0];
        ball.integrate_positions(&mut q, &dq, 0.1);
        let expected = start.rotation * exp_so3(&Vector3::new(0.0, 0.0, 0.2));
        assert_abs_diff_eq!(
            ball.relative_transform(&q).rotation.to_rotation_matrix().into_inner(),
            expected.to_rotation_matrix().into_inner(),
            epsilon = 1e-12
        );

        // free joint moving forward along its rotated body x axis
        let free = joint(JointKind::Free);
        let mut q = vec![0.0, 0.0, std::f64::consts::FRAC_PI_2, 1.0, 0.0, 0.0];
        free.integrate_positions(&mut q, &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], 0.5);
        assert_abs_diff_eq!(q[3], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q[4], 0.5, epsilon = 1e-12);
    }
}

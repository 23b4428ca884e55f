//! Lazily evaluated kinematics of a [Skeleton].
//!
//! Every body quantity is memoised in the body's [crate::body::BodyCache] and computed from
//! the parent's quantity and the body's own joint: `V_i = Ad_{T_i⁻¹} V_parent + S_i q̇_i`.
//! Queries take `&mut self` as they fill the caches. Velocities, accelerations and Jacobians
//! are always measured relative to the world and expressed in the coordinates of the
//! requested [Frame].

use crate::arena::Nodelike;
use crate::body::{BodyCache, BodyIndex};
use crate::math::{
    ad, ad_matrix, adjoint_inverse, angular, linear, skew, spatial, transform_twist_inverse,
    Transform,
};
use crate::memo::Memo;
use crate::skeleton::Skeleton;
use crate::DynamicsError;
use nalgebra::{Matrix3, Matrix3xX, Matrix6xX, Point3, Vector3, Vector6};

/// Coordinate frame for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frame {
    #[default]
    World,
    Body(BodyIndex),
}

impl Skeleton {
    /// Returns the memoised value or computes and stores it
    fn memoized<T, F, C>(&mut self, body: BodyIndex, field: F, compute: C) -> T
    where
        T: Clone,
        F: Fn(&mut BodyCache) -> &mut Memo<T>,
        C: FnOnce(&mut Self) -> T,
    {
        if let Some(value) = field(&mut self.bodies[body].get_mut().cache).cloned() {
            return value;
        }
        let value = compute(self);
        let stamp = self.next_stamp();
        field(&mut self.bodies[body].get_mut().cache).set(value.clone(), stamp);
        value
    }

    pub(crate) fn relative_transform_of(&mut self, body: BodyIndex) -> Transform {
        self.memoized(body, |cache| &mut cache.relative_transform, |skeleton| {
            let node = skeleton.bodies[body].get();
            node.joint
                .relative_transform(&skeleton.positions.as_slice()[node.dof_indices()])
        })
    }

    /// Motion subspace `S` of the body's joint
    pub(crate) fn motion_subspace(&mut self, body: BodyIndex) -> Matrix6xX<f64> {
        self.memoized(body, |cache| &mut cache.relative_jacobian, |skeleton| {
            let node = skeleton.bodies[body].get();
            node.joint
                .relative_jacobian(&skeleton.positions.as_slice()[node.dof_indices()])
        })
    }

    pub(crate) fn world_transform(&mut self, body: BodyIndex) -> Transform {
        self.memoized(body, |cache| &mut cache.transform, |skeleton| {
            let relative = skeleton.relative_transform_of(body);
            match skeleton.bodies[body].parent() {
                Some(parent) => skeleton.world_transform(parent) * relative,
                None => relative,
            }
        })
    }

    /// Relative twist `S·q̇` of the body's joint
    fn joint_velocity(&mut self, body: BodyIndex) -> Vector6<f64> {
        let s = self.motion_subspace(body);
        let range = self.bodies[body].get().dof_indices();
        s * self.velocities.rows(range.start, range.len())
    }

    /// Body twist in body coordinates
    pub(crate) fn body_velocity(&mut self, body: BodyIndex) -> Vector6<f64> {
        self.memoized(body, |cache| &mut cache.velocity, |skeleton| {
            let joint = skeleton.joint_velocity(body);
            match skeleton.bodies[body].parent() {
                Some(parent) => {
                    let relative = skeleton.relative_transform_of(body);
                    transform_twist_inverse(&relative, &skeleton.body_velocity(parent)) + joint
                }
                None => joint,
            }
        })
    }

    /// Velocity dependent part of the body acceleration, `ad(V, S·q̇) + Ṡ·q̇`
    pub(crate) fn partial_acceleration(&mut self, body: BodyIndex) -> Vector6<f64> {
        self.memoized(body, |cache| &mut cache.partial_acceleration, |skeleton| {
            let velocity = skeleton.body_velocity(body);
            let joint = skeleton.joint_velocity(body);
            let node = skeleton.bodies[body].get();
            let range = node.dof_indices();
            let ds = node.joint.relative_jacobian_deriv(
                &skeleton.positions.as_slice()[range.clone()],
                &skeleton.velocities.as_slice()[range.clone()],
            );
            ad(&velocity, &joint) + ds * skeleton.velocities.rows(range.start, range.len())
        })
    }

    /// Body acceleration in body coordinates (time derivative of the body twist)
    pub(crate) fn body_acceleration(&mut self, body: BodyIndex) -> Vector6<f64> {
        self.memoized(body, |cache| &mut cache.acceleration, |skeleton| {
            let partial = skeleton.partial_acceleration(body);
            let s = skeleton.motion_subspace(body);
            let range = skeleton.bodies[body].get().dof_indices();
            let own = partial + s * skeleton.accelerations.rows(range.start, range.len());
            match skeleton.bodies[body].parent() {
                Some(parent) => {
                    let relative = skeleton.relative_transform_of(body);
                    transform_twist_inverse(&relative, &skeleton.body_acceleration(parent)) + own
                }
                None => own,
            }
        })
    }

    /// Body Jacobian (6 x number of degrees of freedom) in body coordinates
    pub(crate) fn body_jacobian(&mut self, body: BodyIndex) -> Matrix6xX<f64> {
        self.memoized(body, |cache| &mut cache.jacobian, |skeleton| {
            let s = skeleton.motion_subspace(body);
            let mut jacobian = match skeleton.bodies[body].parent() {
                Some(parent) => {
                    let relative = skeleton.relative_transform_of(body);
                    adjoint_inverse(&relative) * skeleton.body_jacobian(parent)
                }
                None => Matrix6xX::zeros(skeleton.dof_count()),
            };
            let range = skeleton.bodies[body].get().dof_indices();
            jacobian.columns_mut(range.start, range.len()).copy_from(&s);
            jacobian
        })
    }

    /// Time derivative of the body Jacobian
    pub(crate) fn body_jacobian_deriv(&mut self, body: BodyIndex) -> Matrix6xX<f64> {
        self.memoized(body, |cache| &mut cache.jacobian_deriv, |skeleton| {
            let mut deriv = match skeleton.bodies[body].parent() {
                Some(parent) => {
                    let adj = adjoint_inverse(&skeleton.relative_transform_of(body));
                    let joint = skeleton.joint_velocity(body);
                    adj * skeleton.body_jacobian_deriv(parent)
                        - ad_matrix(&joint) * (adj * skeleton.body_jacobian(parent))
                }
                None => Matrix6xX::zeros(skeleton.dof_count()),
            };
            let node = skeleton.bodies[body].get();
            let range = node.dof_indices();
            let ds = node.joint.relative_jacobian_deriv(
                &skeleton.positions.as_slice()[range.clone()],
                &skeleton.velocities.as_slice()[range.clone()],
            );
            deriv.columns_mut(range.start, range.len()).copy_from(&ds);
            deriv
        })
    }

    /// World transform of a frame
    fn frame_transform(&mut self, frame: Frame) -> Result<Transform, DynamicsError> {
        match frame {
            Frame::World => Ok(Transform::identity()),
            Frame::Body(body) => {
                self.check_body(body)?;
                Ok(self.world_transform(body))
            }
        }
    }

    /// Rotation from body coordinates into frame coordinates
    fn frame_rotation(&mut self, body: BodyIndex, frame: Frame) -> Result<Matrix3<f64>, DynamicsError> {
        self.check_body(body)?;
        if frame == Frame::Body(body) {
            return Ok(Matrix3::identity());
        }
        let to_world = self.world_transform(body).rotation;
        let from_world = self.frame_transform(frame)?.rotation.inverse();
        Ok((from_world * to_world).to_rotation_matrix().into_inner())
    }

    // Transforms

    /// Transform of the body relative to a frame
    pub fn transform(&mut self, body: BodyIndex, relative_to: Frame) -> Result<Transform, DynamicsError> {
        self.check_body(body)?;
        let frame = self.frame_transform(relative_to)?;
        Ok(frame.inverse() * self.world_transform(body))
    }

    /// Transform of the body relative to its parent body (or the world)
    pub fn relative_transform(&mut self, body: BodyIndex) -> Result<Transform, DynamicsError> {
        self.check_body(body)?;
        Ok(self.relative_transform_of(body))
    }

    // Velocities and accelerations

    /// Twist `[ω; v]` of the body origin
    pub fn spatial_velocity(&mut self, body: BodyIndex, frame: Frame) -> Result<Vector6<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        let velocity = self.body_velocity(body);
        Ok(spatial(&(rotation * angular(&velocity)), &(rotation * linear(&velocity))))
    }

    /// Linear velocity of a point given in body coordinates
    pub fn linear_velocity(
        &mut self,
        body: BodyIndex,
        offset: &Vector3<f64>,
        frame: Frame,
    ) -> Result<Vector3<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        let velocity = self.body_velocity(body);
        Ok(rotation * (linear(&velocity) + angular(&velocity).cross(offset)))
    }

    pub fn angular_velocity(&mut self, body: BodyIndex, frame: Frame) -> Result<Vector3<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        Ok(rotation * angular(&self.body_velocity(body)))
    }

    /// Time derivative of the body twist (body-fixed spatial acceleration)
    pub fn spatial_acceleration(
        &mut self,
        body: BodyIndex,
        frame: Frame,
    ) -> Result<Vector6<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        let acceleration = self.body_acceleration(body);
        Ok(spatial(&(rotation * angular(&acceleration)), &(rotation * linear(&acceleration))))
    }

    /// Classical linear acceleration of a point given in body coordinates
    pub fn linear_acceleration(
        &mut self,
        body: BodyIndex,
        offset: &Vector3<f64>,
        frame: Frame,
    ) -> Result<Vector3<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        let velocity = self.body_velocity(body);
        let acceleration = self.body_acceleration(body);
        let (w, v) = (angular(&velocity), linear(&velocity));
        let point_velocity = v + w.cross(offset);
        Ok(rotation
            * (linear(&acceleration) + angular(&acceleration).cross(offset) + w.cross(&point_velocity)))
    }

    pub fn angular_acceleration(&mut self, body: BodyIndex, frame: Frame) -> Result<Vector3<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        Ok(rotation * angular(&self.body_acceleration(body)))
    }

    // Jacobians

    /// Jacobian `[angular; linear]` of a point given in body coordinates
    pub fn jacobian(
        &mut self,
        body: BodyIndex,
        offset: &Vector3<f64>,
        frame: Frame,
    ) -> Result<Matrix6xX<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        let point = point_jacobian(&self.body_jacobian(body), offset);
        Ok(rotate_jacobian(&rotation, &point))
    }

    pub fn linear_jacobian(
        &mut self,
        body: BodyIndex,
        offset: &Vector3<f64>,
        frame: Frame,
    ) -> Result<Matrix3xX<f64>, DynamicsError> {
        Ok(self.jacobian(body, offset, frame)?.fixed_rows::<3>(3).into_owned())
    }

    pub fn angular_jacobian(&mut self, body: BodyIndex, frame: Frame) -> Result<Matrix3xX<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        Ok(rotation * self.body_jacobian(body).fixed_rows::<3>(0))
    }

    /// Time derivative of [Skeleton::jacobian]
    pub fn jacobian_deriv(
        &mut self,
        body: BodyIndex,
        offset: &Vector3<f64>,
        frame: Frame,
    ) -> Result<Matrix6xX<f64>, DynamicsError> {
        let rotation = self.frame_rotation(body, frame)?;
        let point = point_jacobian(&self.body_jacobian(body), offset);
        let point_deriv = point_jacobian(&self.body_jacobian_deriv(body), offset);
        let body_omega = skew(&angular(&self.body_velocity(body)));
        let frame_omega = match frame {
            Frame::World => Matrix3::zeros(),
            Frame::Body(other) => skew(&angular(&self.body_velocity(other))),
        };
        // d/dt (R X) = R ([ω_b] X + Ẋ) - [ω_f] R X
        let rotated = rotate_jacobian(&rotation, &point);
        let mut deriv = Matrix6xX::zeros(point.ncols());
        for block in [0, 3] {
            let x = point.fixed_rows::<3>(block);
            let dx = point_deriv.fixed_rows::<3>(block);
            let y = rotated.fixed_rows::<3>(block);
            deriv
                .fixed_rows_mut::<3>(block)
                .copy_from(&(rotation * (body_omega * x + dx) - frame_omega * y));
        }
        Ok(deriv)
    }

    // Center of mass

    /// Center of mass of a body
    pub fn body_com(&mut self, body: BodyIndex, frame: Frame) -> Result<Vector3<f64>, DynamicsError> {
        self.check_body(body)?;
        let com = Point3::from(*self.bodies[body].get().inertia.com());
        let world = self.world_transform(body) * com;
        Ok((self.frame_transform(frame)?.inverse() * world).coords)
    }

    /// Center of mass of the skeleton
    pub fn com(&mut self, frame: Frame) -> Result<Vector3<f64>, DynamicsError> {
        self.mass_weighted(|skeleton, body, _| skeleton.body_com(body, frame))
    }

    pub fn com_velocity(&mut self, frame: Frame) -> Result<Vector3<f64>, DynamicsError> {
        self.mass_weighted(|skeleton, body, com| skeleton.linear_velocity(body, &com, frame))
    }

    pub fn com_acceleration(&mut self, frame: Frame) -> Result<Vector3<f64>, DynamicsError> {
        self.mass_weighted(|skeleton, body, com| skeleton.linear_acceleration(body, &com, frame))
    }

    /// Jacobian of the center of mass (3 x number of degrees of freedom)
    pub fn com_jacobian(&mut self, frame: Frame) -> Result<Matrix3xX<f64>, DynamicsError> {
        let mut result = Matrix3xX::zeros(self.dof_count());
        let total = self.total_mass();
        if total <= 0.0 {
            return Ok(result);
        }
        for index in 0..self.body_count() {
            let body = BodyIndex::from(index);
            let (mass, com) = {
                let node = self.bodies[body].get();
                (node.mass(), *node.inertia.com())
            };
            result += self.linear_jacobian(body, &com, frame)? * (mass / total);
        }
        Ok(result)
    }

    /// Sum of a per-body quantity weighted by the body masses, divided by the total mass
    fn mass_weighted<F>(&mut self, mut quantity: F) -> Result<Vector3<f64>, DynamicsError>
    where
        F: FnMut(&mut Self, BodyIndex, Vector3<f64>) -> Result<Vector3<f64>, DynamicsError>,
    {
        let total = self.total_mass();
        let mut result = Vector3::zeros();
        if total <= 0.0 {
            return Ok(result);
        }
        for index in 0..self.body_count() {
            let body = BodyIndex::from(index);
            let (mass, com) = {
                let node = self.bodies[body].get();
                (node.mass(), *node.inertia.com())
            };
            result += quantity(self, body, com)? * (mass / total);
        }
        Ok(result)
    }

    // Energies

    /// Kinetic energy `½ Σ Vᵀ G V`
    pub fn kinetic_energy(&mut self) -> f64 {
        (0..self.body_count())
            .map(BodyIndex::from)
            .map(|body| {
                let velocity = self.body_velocity(body);
                0.5 * velocity.dot(&(self.bodies[body].get().spatial_inertia() * velocity))
            })
            .sum()
    }

    /// Gravitational potential energy plus the energy stored in joint springs
    pub fn potential_energy(&mut self) -> f64 {
        let gravity = self.gravity;
        let mut energy = 0.0;
        for body in (0..self.body_count()).map(BodyIndex::from) {
            let com = Point3::from(*self.bodies[body].get().inertia.com());
            let height = self.world_transform(body) * com;
            energy -= self.bodies[body].get().mass() * gravity.dot(&height.coords);
        }
        energy
            + self
                .dofs
                .iter()
                .map(|dof| dof.spring_energy(self.positions[dof.index]))
                .sum::<f64>()
    }
}

/// Jacobian of a point at `offset` from the body Jacobian (both in body coordinates)
fn point_jacobian(jacobian: &Matrix6xX<f64>, offset: &Vector3<f64>) -> Matrix6xX<f64> {
    let mut result = jacobian.clone();
    let shift = -skew(offset) * jacobian.fixed_rows::<3>(0);
    let mut lin = result.fixed_rows_mut::<3>(3);
    lin += shift;
    result
}

fn rotate_jacobian(rotation: &Matrix3<f64>, jacobian: &Matrix6xX<f64>) -> Matrix6xX<f64> {
    let mut result = Matrix6xX::zeros(jacobian.ncols());
    result
        .fixed_rows_mut::<3>(0)
        .copy_from(&(rotation * jacobian.fixed_rows::<3>(0)));
    result
        .fixed_rows_mut::<3>(3)
        .copy_from(&(rotation * jacobian.fixed_rows::<3>(3)));
    result
}

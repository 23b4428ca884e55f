//! Conversion of contacts and enforced joint limits into generalized constraint forces.
//!
//! The forces are written to [Skeleton::constraint_forces], separate from the actuator
//! forces, before the forward dynamics of a step runs.

use crate::body::BodyIndex;
use crate::collision::{BodyHandle, Contact};
use crate::kinematics::Frame;
use crate::skeleton::Skeleton;
use crate::world::SkeletonId;
use crate::DynamicsError;
use nalgebra::{DVector, Point3, Vector3};
use tracing::trace;

/// Turns contacts into constraint forces
pub trait ConstraintSolver: Send {
    /// Sets the constraint forces of every skeleton for the given contacts and the current
    /// state
    fn solve(
        &mut self,
        skeletons: &mut [(SkeletonId, Skeleton)],
        contacts: &[Contact],
    ) -> Result<(), DynamicsError>;
}

/// Spring-damper contacts with regularized Coulomb friction, and spring-damper joint limits
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyConstraintSolver {
    pub contact_stiffness: f64,
    pub contact_damping: f64,
    pub friction: f64,
    /// Slope of the friction force below the Coulomb bound
    pub friction_damping: f64,
    pub limit_stiffness: f64,
    pub limit_damping: f64,
}

impl Default for PenaltyConstraintSolver {
    fn default() -> Self {
        PenaltyConstraintSolver {
            contact_stiffness: 1e5,
            contact_damping: 1e3,
            friction: 0.8,
            friction_damping: 1e3,
            limit_stiffness: 1e4,
            limit_damping: 1e2,
        }
    }
}

impl PenaltyConstraintSolver {
    pub fn with_contact(mut self, stiffness: f64, damping: f64) -> Self {
        self.contact_stiffness = stiffness;
        self.contact_damping = damping;
        self
    }

    pub fn with_friction(mut self, coefficient: f64, damping: f64) -> Self {
        self.friction = coefficient;
        self.friction_damping = damping;
        self
    }

    pub fn with_limits(mut self, stiffness: f64, damping: f64) -> Self {
        self.limit_stiffness = stiffness;
        self.limit_damping = damping;
        self
    }

    /// Contact force acting on the first body given the relative velocity of the contact point
    pub fn contact_force(&self, contact: &Contact, velocity: &Vector3<f64>) -> Vector3<f64> {
        let approach = velocity.dot(&contact.normal);
        let normal = (self.contact_stiffness * contact.depth - self.contact_damping * approach).max(0.0);
        let sliding = velocity - contact.normal * approach;
        let speed = sliding.norm();
        let tangential = if speed > f64::EPSILON {
            -sliding / speed * (self.friction_damping * speed).min(self.friction * normal)
        } else {
            Vector3::zeros()
        };
        contact.normal * normal + tangential
    }

    /// Penalty force of a coordinate outside its limits. Zero for joints without enforced
    /// limits and for coordinates with a prescribed motion.
    pub fn limit_force(&self, skeleton: &Skeleton, index: usize) -> Result<f64, DynamicsError> {
        let dof = skeleton.dof(index)?;
        let joint = skeleton.body(dof.body())?.joint();
        if joint.actuator().is_prescribed() {
            return Ok(0.0);
        }
        let (position, velocity) = (skeleton.position(index)?, skeleton.velocity(index)?);
        let mut force = 0.0;
        if joint.position_limits_enforced() {
            let violation = dof.position_violation(position);
            if violation != 0.0 {
                // damp only motion further out of the limits
                let outward = if velocity * violation > 0.0 { velocity } else { 0.0 };
                force -= self.limit_stiffness * violation + self.limit_damping * outward;
            }
        }
        if joint.velocity_limits_enforced() {
            force -= self.limit_damping * dof.velocity_violation(velocity);
        }
        Ok(force)
    }
}

fn find(skeletons: &[(SkeletonId, Skeleton)], id: SkeletonId) -> Result<usize, DynamicsError> {
    skeletons
        .iter()
        .position(|(other, _)| *other == id)
        .ok_or(DynamicsError::UnknownSkeleton(id.0))
}

/// Velocity of a world point attached to a body
fn point_velocity(
    skeletons: &mut [(SkeletonId, Skeleton)],
    handle: &BodyHandle,
    point: &Vector3<f64>,
) -> Result<Vector3<f64>, DynamicsError> {
    let index = find(skeletons, handle.skeleton)?;
    let skeleton = &mut skeletons[index].1;
    let local = local_point(skeleton, handle.body, point)?;
    skeleton.linear_velocity(handle.body, &local, Frame::World)
}

fn local_point(skeleton: &mut Skeleton, body: BodyIndex, point: &Vector3<f64>) -> Result<Vector3<f64>, DynamicsError> {
    let pose = skeleton.transform(body, Frame::World)?;
    Ok(pose.inverse_transform_point(&Point3::from(*point)).coords)
}

/// Adds `Jᵀ F` of a force acting on a world point of a body
fn apply(
    skeletons: &mut [(SkeletonId, Skeleton)],
    forces: &mut [DVector<f64>],
    handle: &BodyHandle,
    point: &Vector3<f64>,
    force: &Vector3<f64>,
) -> Result<(), DynamicsError> {
    let index = find(skeletons, handle.skeleton)?;
    let skeleton = &mut skeletons[index].1;
    let local = local_point(skeleton, handle.body, point)?;
    let jacobian = skeleton.linear_jacobian(handle.body, &local, Frame::World)?;
    forces[index] += jacobian.transpose() * force;
    Ok(())
}

impl ConstraintSolver for PenaltyConstraintSolver {
    fn solve(
        &mut self,
        skeletons: &mut [(SkeletonId, Skeleton)],
        contacts: &[Contact],
    ) -> Result<(), DynamicsError> {
        let mut forces = skeletons
            .iter()
            .map(|(_, skeleton)| DVector::zeros(skeleton.dof_count()))
            .collect::<Vec<_>>();

        for contact in contacts {
            let mut velocity = point_velocity(skeletons, &contact.first, &contact.point)?;
            if let Some(second) = &contact.second {
                velocity -= point_velocity(skeletons, second, &contact.point)?;
            }
            let force = self.contact_force(contact, &velocity);
            apply(skeletons, &mut forces, &contact.first, &contact.point, &force)?;
            if let Some(second) = &contact.second {
                apply(skeletons, &mut forces, second, &contact.point, &-force)?;
            }
        }

        for ((_, skeleton), mut force) in skeletons.iter_mut().zip(forces) {
            for index in 0..skeleton.dof_count() {
                force[index] += self.limit_force(skeleton, index)?;
            }
            skeleton.set_constraint_forces(&force)?;
        }
        trace!(contacts = contacts.len(), "constraint forces updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::DofProperties;
    use crate::dummy;
    use crate::body::BodyProperties;
    use crate::inertia::Inertia;
    use crate::joint::{ActuatorType, JointKind, JointProperties};
    use approx::assert_relative_eq;

    fn contact(depth: f64) -> Contact {
        Contact {
            first: BodyHandle {
                skeleton: SkeletonId(0),
                body: BodyIndex::from(0),
            },
            second: None,
            point: Vector3::zeros(),
            normal: Vector3::z(),
            depth,
        }
    }

    #[test]
    fn test_contact_force() {
        let solver = PenaltyConstraintSolver::default().with_contact(100.0, 10.0).with_friction(0.5, 1e6);
        let force = solver.contact_force(&contact(0.01), &Vector3::new(2.0, 0.0, -0.1));
        // normal 100 * 0.01 + 10 * 0.1, sliding saturates at 0.5 * 2
        assert_relative_eq!(force, Vector3::new(-1.0, 0.0, 2.0), epsilon = 1e-12);
        // separating fast enough: no pulling
        let force = solver.contact_force(&contact(0.01), &Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(force, Vector3::zeros());
    }

    #[test_log::test]
    fn test_limit_forces() {
        let limited = DofProperties::default().with_position_limits(-0.5, 0.5);
        let mut skeleton = Skeleton::new("limited");
        let mut add = |name: &str, enforced: bool| {
            skeleton
                .add_body(
                    None,
                    JointProperties::new(name, JointKind::revolute(Vector3::y()))
                        .with_position_limits_enforced(enforced)
                        .with_all_dofs(limited.clone()),
                    BodyProperties::new(name, Inertia::default()),
                )
                .unwrap()
        };
        add("advisory", false);
        let enforced = add("enforced", true);
        skeleton.set_positions(&DVector::from_element(2, 0.6)).unwrap();
        skeleton.set_velocities(&DVector::from_element(2, 1.0)).unwrap();
        let solver = PenaltyConstraintSolver::default().with_limits(100.0, 2.0);

        assert_eq!(solver.limit_force(&skeleton, 0).unwrap(), 0.0);
        assert_relative_eq!(solver.limit_force(&skeleton, 1).unwrap(), -100.0 * 0.1 - 2.0, epsilon = 1e-12);
        skeleton.set_velocity(1, -1.0).unwrap();
        assert_relative_eq!(solver.limit_force(&skeleton, 1).unwrap(), -100.0 * 0.1, epsilon = 1e-12);

        skeleton.set_actuator(enforced, ActuatorType::Locked).unwrap();
        assert_eq!(solver.limit_force(&skeleton, 1).unwrap(), 0.0);
    }

    #[test_log::test]
    fn test_contact_maps_through_jacobian() {
        let mut skeletons = vec![(SkeletonId(3), dummy::pendulum(2, 1.0, 1.0).unwrap())];
        skeletons[0].1.set_position(0, 0.2).unwrap();
        let tip = BodyIndex::from(1);
        let point = skeletons[0].1.body_com(tip, Frame::World).unwrap();
        let contact = Contact {
            first: BodyHandle { skeleton: SkeletonId(3), body: tip },
            second: None,
            point,
            normal: Vector3::x(),
            depth: 0.01,
        };
        let mut solver = PenaltyConstraintSolver::default().with_contact(1000.0, 0.0);
        solver.solve(&mut skeletons, &[contact.clone()]).unwrap();
        let skeleton = &mut skeletons[0].1;
        let jacobian = skeleton
            .linear_jacobian(tip, &Vector3::new(0.0, 0.0, -1.0), Frame::World)
            .unwrap();
        let expected = jacobian.transpose() * Vector3::new(10.0, 0.0, 0.0);
        assert_relative_eq!(skeleton.constraint_forces(), &expected, epsilon = 1e-9);

        let unknown = Contact {
            first: BodyHandle { skeleton: SkeletonId(7), body: tip },
            ..contact
        };
        assert_eq!(solver.solve(&mut skeletons, &[unknown]), Err(DynamicsError::UnknownSkeleton(7)));
    }
}

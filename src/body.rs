//! Rigid bodies of a skeleton and their memoised kinematic quantities

use crate::arena::ArenaIndex;
use crate::dof::DofProperties;
use crate::inertia::Inertia;
use crate::joint::Joint;
use crate::math::Transform;
use crate::memo::Memo;
use crate::shape::ShapeNode;
use nalgebra::{Matrix6, Matrix6xX, Vector6};

/// Handle of a body in its skeleton. Handles are stable unless the topology of the skeleton
/// is edited out of depth-first order.
pub type BodyIndex = ArenaIndex;

/// Description of a body, turned into a [BodyNode] when added to a skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct BodyProperties {
    pub name: String,
    pub inertia: Inertia,
    pub shapes: Vec<ShapeNode>,
    /// Whether the body takes part in collision detection at all
    pub collidable: bool,
}

impl BodyProperties {
    pub fn new(name: impl Into<String>, inertia: Inertia) -> Self {
        BodyProperties {
            name: name.into(),
            inertia,
            shapes: vec![],
            collidable: true,
        }
    }

    pub fn with_shape(mut self, shape: ShapeNode) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }
}

/// Memoised per-body quantities. All spatial quantities are expressed in the body frame.
#[derive(Debug, Clone, Default)]
pub struct BodyCache {
    /// Transform relative to the parent body
    pub(crate) relative_transform: Memo<Transform>,
    /// Motion subspace of the parent joint
    pub(crate) relative_jacobian: Memo<Matrix6xX<f64>>,
    /// Transform relative to the world
    pub(crate) transform: Memo<Transform>,
    pub(crate) velocity: Memo<Vector6<f64>>,
    /// Velocity product part of the acceleration `ad(V, S·q̇) + Ṡ·q̇`
    pub(crate) partial_acceleration: Memo<Vector6<f64>>,
    pub(crate) acceleration: Memo<Vector6<f64>>,
    /// Body Jacobian with one column per degree of freedom of the skeleton
    pub(crate) jacobian: Memo<Matrix6xX<f64>>,
    pub(crate) jacobian_deriv: Memo<Matrix6xX<f64>>,
}

impl BodyCache {
    /// Drops everything that depends on generalized positions
    pub(crate) fn invalidate_position(&mut self) {
        self.relative_transform.invalidate();
        self.relative_jacobian.invalidate();
        self.transform.invalidate();
        self.jacobian.invalidate();
        self.invalidate_velocity();
    }

    /// Drops everything that depends on generalized velocities
    pub(crate) fn invalidate_velocity(&mut self) {
        self.velocity.invalidate();
        self.partial_acceleration.invalidate();
        self.jacobian_deriv.invalidate();
        self.invalidate_acceleration();
    }

    pub(crate) fn invalidate_acceleration(&mut self) {
        self.acceleration.invalidate();
    }

    /// Stamps of the cached quantities in the order transform, velocity, acceleration,
    /// Jacobian, Jacobian derivative
    pub fn stamps(&self) -> [Option<u64>; 5] {
        [
            self.transform.stamp(),
            self.velocity.stamp(),
            self.acceleration.stamp(),
            self.jacobian.stamp(),
            self.jacobian_deriv.stamp(),
        ]
    }
}

/// A rigid body together with the joint attaching it to its parent (or the world)
#[derive(Debug, Clone)]
pub struct BodyNode {
    pub(crate) name: String,
    pub(crate) inertia: Inertia,
    pub(crate) shapes: Vec<ShapeNode>,
    pub(crate) collidable: bool,
    pub(crate) colliding: bool,
    pub(crate) joint: Joint,
    pub(crate) dofs: Vec<DofProperties>,
    /// Index of the first degree of freedom of the joint in the skeleton vectors
    pub(crate) dof_offset: usize,
    /// Accumulated external wrench `[torque; force]` about the body origin in body coordinates
    pub(crate) external_force: Vector6<f64>,
    pub(crate) cache: BodyCache,
}

impl BodyNode {
    pub(crate) fn new(properties: BodyProperties, joint: Joint, dofs: Vec<DofProperties>) -> Self {
        BodyNode {
            name: properties.name,
            inertia: properties.inertia,
            shapes: properties.shapes,
            collidable: properties.collidable,
            colliding: false,
            joint,
            dofs,
            dof_offset: 0,
            external_force: Vector6::zeros(),
            cache: BodyCache::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inertia(&self) -> &Inertia {
        &self.inertia
    }

    pub fn mass(&self) -> f64 {
        self.inertia.mass()
    }

    pub fn spatial_inertia(&self) -> Matrix6<f64> {
        self.inertia.spatial()
    }

    pub fn shapes(&self) -> &[ShapeNode] {
        &self.shapes
    }

    /// The joint connecting this body to its parent
    pub fn joint(&self) -> &Joint {
        &self.joint
    }

    pub fn dof_count(&self) -> usize {
        self.joint.dof_count()
    }

    /// Skeleton indices of the degrees of freedom of the parent joint
    pub fn dof_indices(&self) -> std::ops::Range<usize> {
        self.dof_offset..self.dof_offset + self.joint.dof_count()
    }

    pub fn is_collidable(&self) -> bool {
        self.collidable
    }

    /// Set by the collision layer
    pub fn is_colliding(&self) -> bool {
        self.colliding
    }

    pub fn set_colliding(&mut self, colliding: bool) {
        self.colliding = colliding;
    }

    pub fn external_force(&self) -> &Vector6<f64> {
        &self.external_force
    }

    pub fn cache(&self) -> &BodyCache {
        &self.cache
    }
}

impl std::fmt::Display for BodyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (joint {})", self.name, self.joint.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::{JointKind, JointProperties};
    use nalgebra::Vector3;

    #[test]
    fn test_cache_categories() {
        let (joint, dofs) =
            Joint::from_properties(&JointProperties::new("j", JointKind::revolute(Vector3::z())))
                .unwrap();
        let mut body = BodyNode::new(BodyProperties::new("b", Inertia::default()), joint, dofs);
        body.dof_offset = 2;
        assert_eq!(body.dof_indices(), 2..3);

        let cache = &mut body.cache;
        cache.transform.set(Transform::identity(), 1);
        cache.velocity.set(Vector6::zeros(), 2);
        cache.acceleration.set(Vector6::zeros(), 3);
        cache.invalidate_acceleration();
        assert_eq!(cache.stamps(), [Some(1), Some(2), None, None, None]);
        cache.acceleration.set(Vector6::zeros(), 4);
        cache.invalidate_velocity();
        assert_eq!(cache.stamps(), [Some(1), None, None, None, None]);
        cache.invalidate_position();
        assert_eq!(cache.stamps(), [None; 5]);
    }
}

//! Interface to the collision layer.
//!
//! A [CollisionDetector] inspects the current poses of the bodies of all skeletons of a
//! world and reports [Contact]s. Self-collision filtering is up to the detector, which should
//! consult [Skeleton::is_collidable]. The contacts are turned into generalized forces by a
//! [crate::constraint::ConstraintSolver].

use crate::arena::Nodelike;
use crate::body::BodyIndex;
use crate::shape::Shape;
use crate::skeleton::Skeleton;
use crate::world::SkeletonId;
use crate::DynamicsError;
use itertools::Itertools;
use nalgebra::{Point3, Vector3};
use tracing::trace;

/// A body of a skeleton in a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    pub skeleton: SkeletonId,
    pub body: BodyIndex,
}

/// Contact between a body and another body or the environment (`second == None`). All
/// quantities are in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub first: BodyHandle,
    pub second: Option<BodyHandle>,
    pub point: Vector3<f64>,
    /// Unit normal pointing from the second body (or the environment) towards the first
    pub normal: Vector3<f64>,
    /// Penetration depth, positive when penetrating
    pub depth: f64,
}

/// The collision layer
pub trait CollisionDetector: Send {
    /// Contacts between the bodies of the skeletons in their current configuration
    fn detect(&mut self, skeletons: &mut [(SkeletonId, Skeleton)]) -> Result<Vec<Contact>, DynamicsError>;
}

/// Reports no contacts at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCollisionDetector;

impl CollisionDetector for NullCollisionDetector {
    fn detect(&mut self, _skeletons: &mut [(SkeletonId, Skeleton)]) -> Result<Vec<Contact>, DynamicsError> {
        Ok(vec![])
    }
}

/// Collides the collidable shapes of all bodies with the half space `normal · x <= offset`.
/// Boxes contact with their corners, all other shapes with their deepest point.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundPlaneDetector {
    normal: Vector3<f64>,
    offset: f64,
}

impl Default for GroundPlaneDetector {
    /// The plane `z = 0`
    fn default() -> Self {
        GroundPlaneDetector {
            normal: Vector3::z(),
            offset: 0.0,
        }
    }
}

impl GroundPlaneDetector {
    pub fn new(normal: Vector3<f64>, offset: f64) -> Result<Self, DynamicsError> {
        let normal = normal
            .try_normalize(f64::EPSILON)
            .ok_or_else(|| DynamicsError::MissingProperty {
                owner: "ground plane".to_string(),
                property: "normal".to_string(),
            })?;
        Ok(GroundPlaneDetector { normal, offset })
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Contact candidates of a shape in shape coordinates
    fn probes(&self, shape: &Shape, normal: &Vector3<f64>) -> Vec<Vector3<f64>> {
        match *shape {
            Shape::Box { size } => (0..8)
                .map(|corner| {
                    let sign = |bit: usize| if corner & bit == 0 { -0.5 } else { 0.5 };
                    Vector3::new(sign(1) * size.x, sign(2) * size.y, sign(4) * size.z)
                })
                .collect_vec(),
            _ => vec![support(shape, &-normal)],
        }
    }
}

impl CollisionDetector for GroundPlaneDetector {
    fn detect(&mut self, skeletons: &mut [(SkeletonId, Skeleton)]) -> Result<Vec<Contact>, DynamicsError> {
        let mut contacts = vec![];
        for (id, skeleton) in skeletons.iter_mut() {
            for index in 0..skeleton.body_count() {
                let body = BodyIndex::from(index);
                if !skeleton.bodies[body].get().is_collidable() {
                    continue;
                }
                let pose = skeleton.world_transform(body);
                for shape in skeleton.bodies[body].get().shapes().iter().filter(|s| s.collidable) {
                    let placed = pose * shape.offset;
                    let local_normal = placed.rotation.inverse_transform_vector(&self.normal);
                    for probe in self.probes(&shape.shape, &local_normal) {
                        let point = placed * Point3::from(probe);
                        let depth = self.offset - self.normal.dot(&point.coords);
                        if depth > 0.0 {
                            contacts.push(Contact {
                                first: BodyHandle { skeleton: *id, body },
                                second: None,
                                point: point.coords,
                                normal: self.normal,
                                depth,
                            });
                        }
                    }
                }
            }
        }
        trace!(contacts = contacts.len(), "ground plane contacts");
        Ok(contacts)
    }
}

/// Point of the shape furthest in `direction` (shape coordinates)
pub fn support(shape: &Shape, direction: &Vector3<f64>) -> Vector3<f64> {
    let unit = direction.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::z);
    let radial = |radius: f64| {
        Vector3::new(unit.x, unit.y, 0.0)
            .try_normalize(f64::EPSILON)
            .map_or(Vector3::zeros(), |r| r * radius)
    };
    let axial = |height: f64| Vector3::new(0.0, 0.0, 0.5 * height * unit.z.signum());
    match *shape {
        Shape::Box { size } => Vector3::new(
            0.5 * size.x * unit.x.signum(),
            0.5 * size.y * unit.y.signum(),
            0.5 * size.z * unit.z.signum(),
        ),
        Shape::Sphere { radius } => unit * radius,
        Shape::Ellipsoid { radii } => {
            let scaled = radii.component_mul(&unit);
            radii.component_mul(&scaled) / scaled.norm()
        }
        Shape::Cylinder { radius, height } => axial(height) + radial(radius),
        Shape::Capsule { radius, height } => axial(height) + unit * radius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyProperties;
    use crate::inertia::Inertia;
    use crate::joint::{JointKind, JointProperties};
    use crate::math::translation;
    use crate::shape::ShapeNode;
    use approx::assert_relative_eq;

    #[test]
    fn test_support() {
        let capsule = Shape::Capsule { radius: 0.1, height: 1.0 };
        assert_relative_eq!(support(&capsule, &-Vector3::z()), Vector3::new(0.0, 0.0, -0.6));
        let ellipsoid = Shape::Ellipsoid { radii: Vector3::new(1.0, 2.0, 3.0) };
        assert_relative_eq!(support(&ellipsoid, &Vector3::y()), Vector3::new(0.0, 2.0, 0.0));
        let cylinder = Shape::Cylinder { radius: 0.5, height: 2.0 };
        assert_relative_eq!(
            support(&cylinder, &Vector3::new(1.0, 0.0, -1.0)),
            Vector3::new(0.5, 0.0, -1.0)
        );
    }

    #[test_log::test]
    fn test_ground_plane() {
        let mut skeleton = Skeleton::new("drop");
        let ball = ShapeNode::new(Shape::Sphere { radius: 0.2 });
        let cube = ShapeNode::new(Shape::Box { size: Vector3::repeat(0.2) })
            .with_offset(translation(&Vector3::new(1.0, 0.0, 0.0)));
        let body = skeleton
            .add_body(
                None,
                JointProperties::new("root", JointKind::Translational),
                BodyProperties::new("body", Inertia::default()).with_shape(ball).with_shape(cube),
            )
            .unwrap();
        // sphere penetrates by 0.05, the cube's bottom corners by 0.1 - 0.15 < 0
        skeleton.set_position(2, 0.15).unwrap();
        let mut skeletons = vec![(SkeletonId(0), skeleton)];
        let contacts = GroundPlaneDetector::default().detect(&mut skeletons).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].depth, 0.05, epsilon = 1e-12);
        assert_relative_eq!(contacts[0].point, Vector3::new(0.0, 0.0, -0.05), epsilon = 1e-12);
        assert_eq!(contacts[0].first, BodyHandle { skeleton: SkeletonId(0), body });

        skeletons[0].1.set_position(2, 0.05).unwrap();
        let contacts = GroundPlaneDetector::default().detect(&mut skeletons).unwrap();
        assert_eq!(contacts.len(), 1 + 4);

        assert!(GroundPlaneDetector::new(Vector3::zeros(), 0.0).is_err());
        assert!(NullCollisionDetector.detect(&mut skeletons).unwrap().is_empty());
    }
}

//! Geometric shapes attached to bodies. Shapes are handles for the collision layer and can be
//! used to derive solid inertial properties.

use crate::inertia::Inertia;
use crate::math::Transform;
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

/// Primitive shapes centered in their local frame. Cylinders and capsules are aligned with
/// the local z axis.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Full edge lengths
    Box { size: Vector3<f64> },
    Sphere { radius: f64 },
    /// Semi-axes
    Ellipsoid { radii: Vector3<f64> },
    Cylinder { radius: f64, height: f64 },
    /// `height` is the length of the cylindrical part
    Capsule { radius: f64, height: f64 },
}

impl Shape {
    pub fn volume(&self) -> f64 {
        match *self {
            Shape::Box { size } => size.x * size.y * size.z,
            Shape::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Shape::Ellipsoid { radii } => 4.0 / 3.0 * PI * radii.x * radii.y * radii.z,
            Shape::Cylinder { radius, height } => PI * radius * radius * height,
            Shape::Capsule { radius, height } => {
                PI * radius * radius * height + 4.0 / 3.0 * PI * radius.powi(3)
            }
        }
    }

    /// Moment of inertia of the solid shape with the given mass about its center
    pub fn moment(&self, mass: f64) -> Matrix3<f64> {
        let principal = match *self {
            Shape::Box { size } => {
                let sq = size.component_mul(&size);
                Vector3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 12.0)
            }
            Shape::Sphere { radius } => Vector3::repeat(0.4 * mass * radius * radius),
            Shape::Ellipsoid { radii } => {
                let sq = radii.component_mul(&radii);
                Vector3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 5.0)
            }
            Shape::Cylinder { radius, height } => {
                let side = mass * (3.0 * radius * radius + height * height) / 12.0;
                Vector3::new(side, side, 0.5 * mass * radius * radius)
            }
            Shape::Capsule { radius, height } => {
                // cylinder plus two hemispheres shifted along the axis
                let (r2, h) = (radius * radius, height);
                let cylinder = PI * r2 * h;
                let hemisphere = 2.0 / 3.0 * PI * r2 * radius;
                let density = mass / (cylinder + 2.0 * hemisphere);
                let (mc, mh) = (density * cylinder, density * hemisphere);
                let axial = 0.5 * mc * r2 + 2.0 * 0.4 * mh * r2;
                let side = mc * (r2 / 4.0 + h * h / 12.0)
                    + 2.0 * mh * (0.4 * r2 + h * h / 4.0 + 3.0 * h * radius / 8.0);
                Vector3::new(side, side, axial)
            }
        };
        Matrix3::from_diagonal(&principal)
    }
}

/// A shape placed in a body frame
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeNode {
    pub shape: Shape,
    /// Pose of the shape relative to the body frame
    pub offset: Transform,
    /// Whether the collision layer should consider this shape
    pub collidable: bool,
}

impl ShapeNode {
    pub fn new(shape: Shape) -> Self {
        ShapeNode {
            shape,
            offset: Transform::identity(),
            collidable: true,
        }
    }

    pub fn with_offset(mut self, offset: Transform) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }

    /// Inertial properties of the solid shape with uniform density, expressed in the body frame
    pub fn solid_inertia(&self, density: f64) -> Inertia {
        let mass = density * self.shape.volume();
        let rotation = self.offset.rotation.to_rotation_matrix().into_inner();
        let moment = rotation * self.shape.moment(mass) * rotation.transpose();
        Inertia::new(mass, self.offset.translation.vector, moment)
    }
}

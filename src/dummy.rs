/*! Sample skeletons used for testing */

use crate::body::BodyProperties;
use crate::inertia::Inertia;
use crate::joint::{EulerOrder, JointKind, JointProperties};
use crate::math::{translation, Transform};
use crate::shape::{Shape, ShapeNode};
use crate::skeleton::Skeleton;
use crate::DynamicsError;
use nalgebra::{Translation3, UnitQuaternion, Vector3};

/// Chain of point masses hanging along -z, connected by revolute joints about y. The mass of
/// each link sits at the joint of the next link.
pub fn pendulum(links: usize, length: f64, mass: f64) -> Result<Skeleton, DynamicsError> {
    let mut skeleton = Skeleton::new("pendulum");
    let mut parent = None;
    for i in 0..links {
        let offset = if i == 0 {
            Transform::identity()
        } else {
            translation(&Vector3::new(0.0, 0.0, -length))
        };
        let joint = JointProperties::new(format!("joint{i}"), JointKind::revolute(Vector3::y()))
            .with_parent_to_joint(offset);
        let body = BodyProperties::new(
            format!("link{i}"),
            Inertia::point_mass(mass, Vector3::new(0.0, 0.0, -length)),
        );
        parent = Some(skeleton.add_body(parent, joint, body)?);
    }
    Ok(skeleton)
}

fn solid(name: &str, shape: Shape, center: Vector3<f64>) -> BodyProperties {
    let node = ShapeNode::new(shape).with_offset(translation(&center));
    BodyProperties::new(name, node.solid_inertia(500.0)).with_shape(node)
}

/// Tree of bodies with solid inertias connected by joints with Euclidean coordinates
/// (revolute, universal, Euler, screw, prismatic, translational)
pub fn branching() -> Result<Skeleton, DynamicsError> {
    let mut skeleton = Skeleton::new("branching");
    let tilted = Transform::from_parts(
        Translation3::new(0.2, 0.0, 0.5),
        UnitQuaternion::from_scaled_axis(Vector3::new(0.3, -0.2, 0.1)),
    );

    let base = skeleton.add_body(
        None,
        JointProperties::new("base_joint", JointKind::revolute(Vector3::z())),
        solid("base", Shape::Box { size: Vector3::new(0.4, 0.3, 0.2) }, Vector3::zeros()),
    )?;
    let trunk = skeleton.add_body(
        Some(base),
        JointProperties::new("trunk_joint", JointKind::universal(Vector3::x(), Vector3::y()))
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, 0.1))),
        solid("trunk", Shape::Box { size: Vector3::new(0.2, 0.2, 0.5) }, Vector3::new(0.0, 0.0, 0.25)),
    )?;
    let arm = skeleton.add_body(
        Some(trunk),
        JointProperties::new("arm_joint", JointKind::Euler { order: EulerOrder::XYZ })
            .with_parent_to_joint(tilted)
            .with_child_to_joint(translation(&Vector3::new(-0.05, 0.0, 0.0))),
        solid("arm", Shape::Cylinder { radius: 0.04, height: 0.3 }, Vector3::new(0.0, 0.0, -0.15)),
    )?;
    skeleton.add_body(
        Some(arm),
        JointProperties::new("hand_joint", JointKind::screw(Vector3::x(), 0.1))
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, -0.3))),
        solid("hand", Shape::Sphere { radius: 0.05 }, Vector3::new(0.05, 0.0, 0.0)),
    )?;
    let leg = skeleton.add_body(
        Some(base),
        JointProperties::new("leg_joint", JointKind::prismatic(Vector3::new(0.0, 1.0, 1.0)))
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.2, -0.1))),
        solid("leg", Shape::Capsule { radius: 0.05, height: 0.4 }, Vector3::new(0.0, 0.0, -0.25)),
    )?;
    skeleton.add_body(
        Some(leg),
        JointProperties::new("foot_joint", JointKind::Translational)
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, -0.5))),
        solid("foot", Shape::Ellipsoid { radii: Vector3::new(0.1, 0.05, 0.03) }, Vector3::zeros()),
    )?;
    skeleton.add_body(
        Some(base),
        JointProperties::new("tail_joint", JointKind::Euler { order: EulerOrder::ZYX })
            .with_parent_to_joint(translation(&Vector3::new(-0.2, 0.0, 0.0))),
        solid("tail", Shape::Box { size: Vector3::new(0.3, 0.05, 0.05) }, Vector3::new(-0.15, 0.0, 0.0)),
    )?;
    Ok(skeleton)
}

/// Floating body (free joint) with limbs attached by ball, revolute and weld joints
pub fn floating() -> Result<Skeleton, DynamicsError> {
    let mut skeleton = Skeleton::new("floating");
    let pelvis = skeleton.add_body(
        None,
        JointProperties::new("root", JointKind::Free),
        solid("pelvis", Shape::Box { size: Vector3::new(0.3, 0.2, 0.15) }, Vector3::zeros()),
    )?;
    let thigh = skeleton.add_body(
        Some(pelvis),
        JointProperties::new("hip", JointKind::Ball)
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.1, -0.1)))
            .with_child_to_joint(translation(&Vector3::new(0.0, 0.0, 0.2))),
        solid("thigh", Shape::Capsule { radius: 0.05, height: 0.3 }, Vector3::zeros()),
    )?;
    skeleton.add_body(
        Some(thigh),
        JointProperties::new("knee", JointKind::revolute(Vector3::y()))
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, -0.2))),
        solid("shin", Shape::Cylinder { radius: 0.04, height: 0.4 }, Vector3::new(0.0, 0.0, -0.2)),
    )?;
    let torso = skeleton.add_body(
        Some(pelvis),
        JointProperties::new("waist", JointKind::Ball)
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, 0.1))),
        solid("torso", Shape::Box { size: Vector3::new(0.3, 0.2, 0.4) }, Vector3::new(0.0, 0.0, 0.2)),
    )?;
    skeleton.add_body(
        Some(torso),
        JointProperties::new("neck", JointKind::Weld)
            .with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, 0.45))),
        solid("head", Shape::Sphere { radius: 0.1 }, Vector3::zeros()),
    )?;
    Ok(skeleton)
}

use approx::assert_relative_eq;
use marionette::math::translation;
use marionette::{
    BodyProperties, DynamicsError, Frame, GroundPlaneDetector, JointKind, JointProperties,
    Shape, ShapeNode, SkeletonBuilder, World, WorldConfig,
};
use nalgebra::Vector3;

fn link(name: &str) -> BodyProperties {
    let shape = ShapeNode::new(Shape::Capsule { radius: 0.05, height: 0.3 })
        .with_offset(translation(&Vector3::new(0.0, 0.0, -0.2)));
    BodyProperties::new(name, shape.solid_inertia(1000.0)).with_shape(shape)
}

fn hinge(name: &str, offset: f64) -> JointProperties {
    JointProperties::new(name, JointKind::revolute(Vector3::x()))
        .with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, -offset)))
}

fn chain(name: &str) -> SkeletonBuilder {
    SkeletonBuilder::new(name)
        .with_body(link("c"))
        .with_body(link("b"))
        .with_body(link("a"))
        .with_joint(hinge("bc", 0.4), Some("b"), "c")
        .with_joint(hinge("ab", 0.4), Some("a"), "b")
        .with_joint(
            JointProperties::new("anchor", JointKind::Weld).with_parent_to_joint(translation(&Vector3::new(0.0, 0.0, 2.0))),
            None,
            "a",
        )
}

#[test_log::test]
fn test_self_collision_pairs() {
    let index = |skeleton: &marionette::Skeleton, name: &str| skeleton.body_index(name).unwrap();

    let skeleton = chain("default").build().unwrap();
    assert!(skeleton.collidable_pairs().is_empty());

    let mut skeleton = chain("distant").with_self_collision(false).build().unwrap();
    let (a, b, c) = (index(&skeleton, "a"), index(&skeleton, "b"), index(&skeleton, "c"));
    assert_eq!(skeleton.collidable_pairs(), vec![(a, c)]);
    assert!(skeleton.are_adjacent(a, b).unwrap());
    assert!(!skeleton.is_collidable(a, a).unwrap());

    skeleton.enable_self_collision(true);
    assert_eq!(skeleton.collidable_pairs(), vec![(a, b), (a, c), (b, c)]);
    skeleton.set_body_collidable(b, false).unwrap();
    assert_eq!(skeleton.collidable_pairs(), vec![(a, c)]);
    skeleton.disable_self_collision();
    assert!(skeleton.collidable_pairs().is_empty());
}

#[test_log::test]
fn test_move_subtree_keeps_configuration() {
    let mut skeleton = chain("chain")
        .with_body(link("post"))
        .with_joint(
            JointProperties::new("post", JointKind::Weld).with_parent_to_joint(translation(&Vector3::new(1.0, 0.0, 0.0))),
            None,
            "post",
        )
        .build()
        .unwrap();
    let ab = skeleton.dof_index("ab").unwrap();
    let bc = skeleton.dof_index("bc").unwrap();
    skeleton.set_position(ab, 0.3).unwrap();
    skeleton.set_position(bc, 0.4).unwrap();

    let b = skeleton.body_index("b").unwrap();
    let post = skeleton.body_index("post").unwrap();
    let moved = skeleton
        .move_subtree(b, Some(post), hinge("post_b", 0.1))
        .unwrap();

    assert_eq!(skeleton.body(moved).unwrap().name(), "b");
    assert_eq!(skeleton.dof_index("ab"), None);
    assert_relative_eq!(skeleton.position(skeleton.dof_index("bc").unwrap()).unwrap(), 0.4);
    assert_eq!(skeleton.position(skeleton.dof_index("post_b").unwrap()).unwrap(), 0.0);

    let post = skeleton.body_index("post").unwrap();
    let expected = skeleton.transform(post, Frame::World).unwrap() * translation(&Vector3::new(0.0, 0.0, -0.1));
    assert_relative_eq!(skeleton.transform(moved, Frame::World).unwrap(), expected, epsilon = 1e-12);

    let c = skeleton.body_index("c").unwrap();
    assert_eq!(skeleton.parent(c).unwrap(), Some(moved));
    assert!(matches!(
        skeleton.move_subtree(post, Some(c), hinge("loop", 0.0)),
        Err(DynamicsError::Cycle { .. })
    ));
}

#[test_log::test]
fn test_world_with_several_skeletons() {
    let config = WorldConfig::default().with_time_step(0.002);
    let mut world = World::new(config)
        .unwrap()
        .with_collision_detector(GroundPlaneDetector::default());
    let high = world.add_skeleton(chain("high").build().unwrap()).unwrap();
    let low = world
        .add_skeleton(
            chain("low")
                .with_gravity(Vector3::zeros())
                .build()
                .unwrap(),
        )
        .unwrap();
    // the world gravity wins
    assert_eq!(world.skeleton(low).unwrap().gravity(), world.gravity());

    let start = world.skeleton(high).unwrap().positions().clone();
    let bc = world.skeleton(low).unwrap().dof_index("bc").unwrap();
    world.skeleton_mut(low).unwrap().set_position(bc, 0.5).unwrap();
    for _ in 0..50 {
        world.step().unwrap();
    }
    // the hanging chain stays at rest, the bent one swings back
    assert_relative_eq!(world.skeleton(high).unwrap().positions(), &start, epsilon = 1e-12);
    assert!(world.skeleton(low).unwrap().position(bc).unwrap() < 0.5);
    // all bodies are well above the ground
    assert!(world.contacts().is_empty());
    let anchor = world.skeleton(low).unwrap().body_index("a").unwrap();
    assert!(!world.skeleton(low).unwrap().body(anchor).unwrap().is_colliding());

    world.set_gravity(Vector3::zeros());
    assert_eq!(world.skeleton(high).unwrap().gravity(), &Vector3::zeros());
    world.remove_skeleton(high).unwrap();
    assert_eq!(world.skeleton_count(), 1);
    world.reset();
    assert_eq!(world.frame(), 0);
    assert_eq!(world.time(), 0.0);
    assert!(world.skeleton_mut(high).is_err());
}

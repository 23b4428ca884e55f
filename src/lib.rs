//! ## About
//!
//! **Warning: still under heavy development**
//!
//! This crate contains the kinematics and dynamics of articulated rigid bodies for robotics and
//! animation. A [Skeleton] is a forest of bodies, each connected to its parent (or the world) by
//! a joint with up to six degrees of freedom. The state of a skeleton is kept in generalized
//! coordinates, and all derived quantities (transforms, velocities, Jacobians, the mass matrix
//! and its inverse, Coriolis and gravity forces) are computed lazily and cached until the state
//! they depend on changes.
//!
//! The dynamics are computed with the recursive Newton-Euler algorithm (inverse dynamics) and
//! a hybrid articulated body algorithm (forward dynamics) that mixes force-driven joints with
//! joints whose motion is prescribed. Several skeletons can be simulated together in a
//! [World], which plugs in a collision detector and a constraint solver.
//!
//! See the [SkeletonBuilder] and [World] structs to get started, or the skeletons in [dummy].
//!
//! ## Reading list
//!
//! * [A Mathematical Introduction to Robotic Manipulation](https://www.cse.lehigh.edu/~trink/Courses/RoboticsII/reading/murray-li-sastry-94-complete.pdf)
//! * [Rigid Body Dynamics Algorithms](https://royfeatherstone.org/)
//! * [Lecture on Inverse Kinematics](https://cseweb.ucsd.edu/classes/wi17/cse169-a/sessions.html)
//! * [Dynamics in Cumputer Graphics](https://foswiki.cs.rpi.edu/foswiki/pub/RoboticsWeb/LabPublications/BETCstar_part1.pdf)
//!
//! ## Naming conventions
//! * Traits – adjectives or agent nouns that indicate capability and behavior
//! * Structs – substantives that indicate entities implementing a behavior
//! * Methods – imperative forms with the exception of getters and factories, which
//!             are uses substantives (i.e., omit a `get_` prefix) much like the standard library.
//!             Lazily evaluated quantities are getters, explicit computations have a `compute_` prefix
//! * Spatial vectors – ordered `[angular; linear]`

pub mod arena;
pub mod body;
pub mod builder;
pub mod collision;
pub mod constraint;
pub mod dof;
pub mod dummy;
pub mod dynamics;
pub mod errors;
pub mod inertia;
pub mod joint;
pub mod kinematics;
pub mod math;
pub mod memo;
pub mod shape;
pub mod skeleton;
pub mod world;

pub use arena::{ArenaIndex, ArenaNode, ArenaTree, Nodelike};
pub use body::{BodyIndex, BodyNode, BodyProperties};
pub use builder::SkeletonBuilder;
pub use collision::{BodyHandle, CollisionDetector, Contact, GroundPlaneDetector, NullCollisionDetector};
pub use constraint::{ConstraintSolver, PenaltyConstraintSolver};
pub use dof::{DegreeOfFreedom, DofProperties};
pub use errors::{DynamicsError, ErrorKind};
pub use inertia::Inertia;
pub use joint::{ActuatorType, EulerOrder, Joint, JointKind, JointProperties};
pub use kinematics::Frame;
pub use math::Transform;
pub use shape::{Shape, ShapeNode};
pub use skeleton::Skeleton;
pub use world::{SkeletonId, World, WorldConfig};

// Backends
#[cfg(feature = "faer")]
pub mod faer;

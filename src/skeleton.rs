//! The [Skeleton]: a forest of bodies connected by joints and the generalized coordinate
//! vectors of all joints.
//!
//! Bodies are stored in an [ArenaTree] kept in depth-first order, so the degrees of freedom
//! of a skeleton are numbered parent to child, depth-first, and every sub-tree is a
//! contiguous range of the arena. Writing a coordinate invalidates the memoised quantities
//! of the sub-tree below the owning joint (see [crate::body::BodyCache]) and the skeleton
//! wide quantities (mass matrix, force vectors), nothing else.

use crate::arena::{ArenaTree, Nodelike};
use crate::body::{BodyIndex, BodyNode, BodyProperties};
use crate::dof::{DegreeOfFreedom, DofProperties};
use crate::inertia::Inertia;
use crate::joint::{ActuatorType, Joint, JointProperties};
use crate::memo::Memo;
use crate::shape::ShapeNode;
use crate::DynamicsError;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector, Vector3};
use std::ops::Range;
use tracing::{debug, trace};
use tracing_attributes::instrument;

/// Memoised skeleton-wide quantities
#[derive(Debug, Clone, Default)]
pub(crate) struct SkeletonCache {
    pub(crate) mass_matrix: Memo<DMatrix<f64>>,
    pub(crate) inv_mass_matrix: Memo<DMatrix<f64>>,
    pub(crate) coriolis_forces: Memo<DVector<f64>>,
    pub(crate) gravity_forces: Memo<DVector<f64>>,
    pub(crate) coriolis_and_gravity_forces: Memo<DVector<f64>>,
    pub(crate) external_forces: Memo<DVector<f64>>,
}

impl SkeletonCache {
    fn invalidate_all(&mut self) {
        *self = SkeletonCache::default();
    }

    fn invalidate_velocity(&mut self) {
        self.coriolis_forces.invalidate();
        self.coriolis_and_gravity_forces.invalidate();
    }

    fn invalidate_gravity(&mut self) {
        self.gravity_forces.invalidate();
        self.coriolis_and_gravity_forces.invalidate();
    }
}

/// Articulated rigid body system
#[derive(Debug, Clone)]
pub struct Skeleton {
    name: String,
    pub(crate) bodies: ArenaTree<BodyNode, String>,
    pub(crate) dofs: Vec<DegreeOfFreedom>,
    pub(crate) positions: DVector<f64>,
    pub(crate) velocities: DVector<f64>,
    pub(crate) accelerations: DVector<f64>,
    pub(crate) forces: DVector<f64>,
    pub(crate) commands: DVector<f64>,
    pub(crate) constraint_forces: DVector<f64>,
    pub(crate) gravity: Vector3<f64>,
    pub(crate) time_step: f64,
    self_collision: bool,
    adjacent_body_check: bool,
    /// Incremented with every invalidation
    generation: u64,
    /// Source of memo stamps, incremented with every computation
    stamp: u64,
    pub(crate) cache: SkeletonCache,
}

impl Skeleton {
    /// Empty skeleton with standard gravity along -z and a time step of 1 ms
    pub fn new(name: impl Into<String>) -> Self {
        Skeleton {
            name: name.into(),
            bodies: ArenaTree::new(),
            dofs: vec![],
            positions: DVector::zeros(0),
            velocities: DVector::zeros(0),
            accelerations: DVector::zeros(0),
            forces: DVector::zeros(0),
            commands: DVector::zeros(0),
            constraint_forces: DVector::zeros(0),
            gravity: Vector3::new(0.0, 0.0, -9.81),
            time_step: 0.001,
            self_collision: false,
            adjacent_body_check: false,
            generation: 0,
            stamp: 0,
            cache: SkeletonCache::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counts the invalidations of memoised quantities so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    // Bodies

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> impl Iterator<Item = &BodyNode> {
        self.bodies.nodes().iter().map(|node| node.get())
    }

    pub fn body(&self, body: BodyIndex) -> Result<&BodyNode, DynamicsError> {
        Ok(self.bodies.node(body)?.get())
    }

    pub fn body_index(&self, name: &str) -> Option<BodyIndex> {
        self.bodies.index_of(&name.to_string())
    }

    pub fn body_by_name(&self, name: &str) -> Option<&BodyNode> {
        self.bodies.node_by_id(&name.to_string()).map(|node| node.get())
    }

    pub fn roots(&self) -> &[BodyIndex] {
        self.bodies.roots()
    }

    pub fn parent(&self, body: BodyIndex) -> Result<Option<BodyIndex>, DynamicsError> {
        Ok(self.bodies.node(body)?.parent())
    }

    pub fn children(&self, body: BodyIndex) -> Result<&[BodyIndex], DynamicsError> {
        Ok(self.bodies.node(body)?.children())
    }

    /// Arena range of the sub-tree rooted in `body`
    pub fn subtree(&self, body: BodyIndex) -> Result<Range<usize>, DynamicsError> {
        Ok(self.bodies.node(body)?.subtree())
    }

    pub(crate) fn check_body(&self, body: BodyIndex) -> Result<(), DynamicsError> {
        self.bodies.node(body).map(|_| ())
    }

    pub fn total_mass(&self) -> f64 {
        self.bodies().map(|body| body.mass()).sum()
    }

    // Degrees of freedom

    pub fn dof_count(&self) -> usize {
        self.dofs.len()
    }

    pub fn dofs(&self) -> &[DegreeOfFreedom] {
        &self.dofs
    }

    pub fn dof(&self, index: usize) -> Result<&DegreeOfFreedom, DynamicsError> {
        self.dofs.get(index).ok_or(DynamicsError::DofOutOfBound {
            index,
            count: self.dofs.len(),
        })
    }

    pub fn dof_index(&self, name: &str) -> Option<usize> {
        self.dofs.iter().position(|dof| dof.name == name)
    }

    pub(crate) fn check_dimension(&self, actual: usize) -> Result<(), DynamicsError> {
        if actual == self.dofs.len() {
            Ok(())
        } else {
            Err(DynamicsError::DimensionMismatch {
                expected: self.dofs.len(),
                actual,
            })
        }
    }

    pub fn positions(&self) -> &DVector<f64> {
        &self.positions
    }

    pub fn velocities(&self) -> &DVector<f64> {
        &self.velocities
    }

    pub fn accelerations(&self) -> &DVector<f64> {
        &self.accelerations
    }

    /// Generalized actuator forces
    pub fn forces(&self) -> &DVector<f64> {
        &self.forces
    }

    pub fn commands(&self) -> &DVector<f64> {
        &self.commands
    }

    /// Generalized forces imposed by constraints (contacts, joint limits) during the last step
    pub fn constraint_forces(&self) -> &DVector<f64> {
        &self.constraint_forces
    }

    pub fn position(&self, index: usize) -> Result<f64, DynamicsError> {
        self.dof(index).map(|_| self.positions[index])
    }

    pub fn velocity(&self, index: usize) -> Result<f64, DynamicsError> {
        self.dof(index).map(|_| self.velocities[index])
    }

    pub fn acceleration(&self, index: usize) -> Result<f64, DynamicsError> {
        self.dof(index).map(|_| self.accelerations[index])
    }

    pub fn force(&self, index: usize) -> Result<f64, DynamicsError> {
        self.dof(index).map(|_| self.forces[index])
    }

    pub fn command(&self, index: usize) -> Result<f64, DynamicsError> {
        self.dof(index).map(|_| self.commands[index])
    }

    pub fn set_position(&mut self, index: usize, position: f64) -> Result<(), DynamicsError> {
        let body = self.dof(index)?.body;
        if self.positions[index] != position {
            self.positions[index] = position;
            self.invalidate_position(body);
        }
        Ok(())
    }

    pub fn set_velocity(&mut self, index: usize, velocity: f64) -> Result<(), DynamicsError> {
        let body = self.dof(index)?.body;
        if self.velocities[index] != velocity {
            self.velocities[index] = velocity;
            self.invalidate_velocity(body);
        }
        Ok(())
    }

    pub fn set_acceleration(&mut self, index: usize, acceleration: f64) -> Result<(), DynamicsError> {
        let body = self.dof(index)?.body;
        if self.accelerations[index] != acceleration {
            self.accelerations[index] = acceleration;
            self.invalidate_acceleration(body);
        }
        Ok(())
    }

    pub fn set_force(&mut self, index: usize, force: f64) -> Result<(), DynamicsError> {
        self.dof(index)?;
        self.forces[index] = force;
        Ok(())
    }

    /// Sets the command of a degree of freedom, interpreted according to the actuator of the
    /// owning joint: a force (clamped to the force limits) for [ActuatorType::Force], a
    /// target velocity for servos and velocity actuators, an acceleration for
    /// [ActuatorType::Acceleration]. Passive and locked joints ignore commands.
    pub fn set_command(&mut self, index: usize, command: f64) -> Result<(), DynamicsError> {
        let dof = self.dof(index)?;
        let actuator = self.bodies[dof.body].get().joint.actuator();
        let clamped = dof.clamp_force(command);
        self.commands[index] = command;
        if actuator == ActuatorType::Force {
            self.forces[index] = clamped;
        }
        Ok(())
    }

    pub fn set_positions(&mut self, positions: &DVector<f64>) -> Result<(), DynamicsError> {
        self.check_dimension(positions.len())?;
        let changed = self.changed_bodies(&self.positions, positions);
        self.positions.copy_from(positions);
        self.invalidate_bodies(changed, Self::invalidate_position);
        Ok(())
    }

    pub fn set_velocities(&mut self, velocities: &DVector<f64>) -> Result<(), DynamicsError> {
        self.check_dimension(velocities.len())?;
        let changed = self.changed_bodies(&self.velocities, velocities);
        self.velocities.copy_from(velocities);
        self.invalidate_bodies(changed, Self::invalidate_velocity);
        Ok(())
    }

    pub fn set_accelerations(&mut self, accelerations: &DVector<f64>) -> Result<(), DynamicsError> {
        self.check_dimension(accelerations.len())?;
        let changed = self.changed_bodies(&self.accelerations, accelerations);
        self.accelerations.copy_from(accelerations);
        self.invalidate_bodies(changed, Self::invalidate_acceleration);
        Ok(())
    }

    pub fn set_forces(&mut self, forces: &DVector<f64>) -> Result<(), DynamicsError> {
        self.check_dimension(forces.len())?;
        self.forces.copy_from(forces);
        Ok(())
    }

    pub fn set_commands(&mut self, commands: &DVector<f64>) -> Result<(), DynamicsError> {
        self.check_dimension(commands.len())?;
        for (index, command) in commands.iter().enumerate() {
            self.set_command(index, *command)?;
        }
        Ok(())
    }

    pub fn set_constraint_forces(&mut self, forces: &DVector<f64>) -> Result<(), DynamicsError> {
        self.check_dimension(forces.len())?;
        self.constraint_forces.copy_from(forces);
        Ok(())
    }

    pub fn clear_constraint_forces(&mut self) {
        self.constraint_forces.fill(0.0);
    }

    /// Zeroes the forces and commands of all degrees of freedom
    pub fn reset_commands(&mut self) {
        self.forces.fill(0.0);
        self.commands.fill(0.0);
    }

    /// Updates the limits and passive coefficients of a degree of freedom
    pub fn set_dof_properties(
        &mut self,
        index: usize,
        properties: DofProperties,
    ) -> Result<(), DynamicsError> {
        let dof = self.dof(index)?;
        let (body, in_joint, name) = (dof.body, dof.index_in_joint, dof.name.clone());
        properties.validate(&name)?;
        let properties = DofProperties {
            name: properties.name.or(Some(name)),
            ..properties
        };
        if let Some(dof_name) = properties.name.as_deref() {
            if self.dofs.iter().any(|d| d.name == dof_name && d.index != index) {
                return Err(DynamicsError::NotUnique(dof_name.to_string()));
            }
            self.dofs[index].name = dof_name.to_string();
        }
        self.dofs[index].properties = properties.clone();
        self.bodies[body].get_mut().dofs[in_joint] = properties;
        Ok(())
    }

    // Environment

    pub fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        if self.gravity != gravity {
            self.gravity = gravity;
            self.cache.invalidate_gravity();
            self.generation += 1;
        }
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn set_time_step(&mut self, time_step: f64) -> Result<(), DynamicsError> {
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(DynamicsError::InvalidTimeStep(time_step));
        }
        self.time_step = time_step;
        Ok(())
    }

    // Body properties

    pub fn set_inertia(&mut self, body: BodyIndex, inertia: Inertia) -> Result<(), DynamicsError> {
        let node = self.bodies.node_mut(body)?.get_mut();
        inertia.validate(&node.name)?;
        node.inertia = inertia;
        self.cache.invalidate_all();
        self.generation += 1;
        Ok(())
    }

    pub fn set_actuator(&mut self, body: BodyIndex, actuator: ActuatorType) -> Result<(), DynamicsError> {
        self.bodies.node_mut(body)?.get_mut().joint.set_actuator(actuator);
        Ok(())
    }

    pub fn add_shape(&mut self, body: BodyIndex, shape: ShapeNode) -> Result<(), DynamicsError> {
        self.bodies.node_mut(body)?.get_mut().shapes.push(shape);
        Ok(())
    }

    pub fn set_colliding(&mut self, body: BodyIndex, colliding: bool) -> Result<(), DynamicsError> {
        self.bodies.node_mut(body)?.get_mut().set_colliding(colliding);
        Ok(())
    }

    pub fn set_body_collidable(&mut self, body: BodyIndex, collidable: bool) -> Result<(), DynamicsError> {
        self.bodies.node_mut(body)?.get_mut().collidable = collidable;
        Ok(())
    }

    // Self-collision metadata

    /// Marks the pairs of bodies of this skeleton as collidable. Pairs of bodies directly
    /// connected by a joint are only included if `adjacent_bodies` is set.
    pub fn enable_self_collision(&mut self, adjacent_bodies: bool) {
        self.self_collision = true;
        self.adjacent_body_check = adjacent_bodies;
    }

    pub fn disable_self_collision(&mut self) {
        self.self_collision = false;
        self.adjacent_body_check = false;
    }

    pub fn is_self_collision_enabled(&self) -> bool {
        self.self_collision
    }

    pub fn is_adjacent_body_check_enabled(&self) -> bool {
        self.adjacent_body_check
    }

    /// Whether two bodies are directly connected by a joint
    pub fn are_adjacent(&self, first: BodyIndex, second: BodyIndex) -> Result<bool, DynamicsError> {
        let (a, b) = (self.bodies.node(first)?, self.bodies.node(second)?);
        Ok(a.parent() == Some(second) || b.parent() == Some(first))
    }

    /// Whether the collision layer should test the two bodies of this skeleton against each
    /// other
    pub fn is_collidable(&self, first: BodyIndex, second: BodyIndex) -> Result<bool, DynamicsError> {
        let adjacent = self.are_adjacent(first, second)?;
        let (a, b) = (self.body(first)?, self.body(second)?);
        Ok(first != second
            && self.self_collision
            && a.collidable
            && b.collidable
            && (self.adjacent_body_check || !adjacent))
    }

    /// All pairs of bodies of this skeleton the collision layer should test
    pub fn collidable_pairs(&self) -> Vec<(BodyIndex, BodyIndex)> {
        let indices = self.bodies.nodes().iter().map(|node| node.index()).collect_vec();
        indices
            .into_iter()
            .tuple_combinations()
            .filter(|(a, b)| self.is_collidable(*a, *b).unwrap_or(false))
            .collect_vec()
    }

    // Editing

    /// Adds a body attached to `parent` (or the world) by a new joint. Returns the index of
    /// the body, which equals the number of bodies before the insertion when bodies are added
    /// in depth-first order.
    #[instrument(skip_all, fields(skeleton = %self.name, body = %body.name))]
    pub fn add_body(
        &mut self,
        parent: Option<BodyIndex>,
        joint: JointProperties,
        body: BodyProperties,
    ) -> Result<BodyIndex, DynamicsError> {
        if let Some(parent) = parent {
            self.check_body(parent)?;
        }
        let (joint, dofs) = Joint::from_properties(&joint)?;
        body.inertia.validate(&body.name)?;
        if self.body_index(&body.name).is_some() {
            return Err(DynamicsError::NotUnique(body.name));
        }
        self.check_joint_names(&joint, &dofs, None)?;

        let name = body.name.clone();
        let node = BodyNode::new(body, joint, dofs);
        let index = match parent {
            Some(parent) => self.bodies.add(node, name.clone(), parent)?,
            None => self.bodies.add_root(node, name.clone())?,
        };
        self.rebuild_dofs(Some(&name));
        self.invalidate_all();
        debug!(index = index.0, dofs = self.dof_count(), "added body");
        Ok(index)
    }

    /// Detaches `body` with its descendants from its parent and attaches it below
    /// `new_parent` (or the world) with a new joint. The coordinates of all other joints are
    /// kept, the new joint starts at zero. Returns the new index of `body`.
    #[instrument(skip(self, joint), fields(skeleton = %self.name))]
    pub fn move_subtree(
        &mut self,
        body: BodyIndex,
        new_parent: Option<BodyIndex>,
        joint: JointProperties,
    ) -> Result<BodyIndex, DynamicsError> {
        self.check_body(body)?;
        if let Some(parent) = new_parent {
            self.check_body(parent)?;
            if self.bodies.is_in_subtree(body, parent) {
                return Err(DynamicsError::Cycle {
                    node: self.bodies[body].get().name.clone(),
                    parent: self.bodies[parent].get().name.clone(),
                });
            }
        }
        let (joint, dofs) = Joint::from_properties(&joint)?;
        self.check_joint_names(&joint, &dofs, Some(body))?;

        let name = self.bodies[body].get().name.clone();
        let new_of_old = self.bodies.move_subtree(body, new_parent)?;
        let moved = new_of_old[body.0];
        let node = self.bodies[moved].get_mut();
        node.joint = joint;
        node.dofs = dofs;
        self.rebuild_dofs(Some(&name));
        self.invalidate_all();
        debug!(index = moved.0, dofs = self.dof_count(), "moved sub-tree");
        Ok(moved)
    }

    /// Joint and degree of freedom names must be unique within the skeleton, `replaced` is
    /// the body whose joint is about to be replaced
    fn check_joint_names(
        &self,
        joint: &Joint,
        dofs: &[DofProperties],
        replaced: Option<BodyIndex>,
    ) -> Result<(), DynamicsError> {
        let others = self
            .bodies
            .nodes()
            .iter()
            .filter(|node| Some(node.index()) != replaced)
            .map(|node| node.get())
            .collect_vec();
        if others.iter().any(|body| body.joint.name() == joint.name()) {
            return Err(DynamicsError::NotUnique(joint.name().to_string()));
        }
        for name in dofs.iter().filter_map(|dof| dof.name.as_deref()) {
            let taken = others
                .iter()
                .flat_map(|body| body.dofs.iter())
                .any(|dof| dof.name.as_deref() == Some(name));
            if taken {
                return Err(DynamicsError::NotUnique(name.to_string()));
            }
        }
        Ok(())
    }

    /// Renumbers the degrees of freedom in arena order. Coordinates of all joints except the
    /// one of body `fresh` are carried over.
    fn rebuild_dofs(&mut self, fresh: Option<&str>) {
        let n = self
            .bodies
            .nodes()
            .iter()
            .map(|node| node.get().dof_count())
            .sum::<usize>();
        let mut targets = [
            &mut self.positions,
            &mut self.velocities,
            &mut self.accelerations,
            &mut self.forces,
            &mut self.commands,
            &mut self.constraint_forces,
        ];
        let old = targets
            .iter_mut()
            .map(|target| std::mem::replace(&mut **target, DVector::zeros(n)))
            .collect_vec();

        let mut dofs = Vec::with_capacity(n);
        let mut offset = 0;
        for node in self.bodies.nodes_mut() {
            let index = node.index();
            let body = node.get_mut();
            let count = body.dof_count();
            if fresh != Some(body.name.as_str()) {
                for (target, source) in targets.iter_mut().zip(&old) {
                    target
                        .rows_mut(offset, count)
                        .copy_from(&source.rows(body.dof_offset, count));
                }
            }
            body.dof_offset = offset;
            for (i, properties) in body.dofs.iter().enumerate() {
                dofs.push(DegreeOfFreedom {
                    name: properties.name.clone().unwrap_or_default(),
                    index: offset + i,
                    body: index,
                    index_in_joint: i,
                    properties: properties.clone(),
                });
            }
            offset += count;
        }
        self.dofs = dofs;
    }

    // Invalidation

    /// Bodies (in arena order) whose joint coordinates differ between the two vectors
    fn changed_bodies(&self, old: &DVector<f64>, new: &DVector<f64>) -> Vec<BodyIndex> {
        self.bodies
            .nodes()
            .iter()
            .filter(|node| {
                node.get()
                    .dof_indices()
                    .any(|i| old[i] != new[i])
            })
            .map(|node| node.index())
            .collect_vec()
    }

    /// Invalidates the given bodies (sorted in arena order), skipping bodies in sub-trees
    /// that were already invalidated
    fn invalidate_bodies(&mut self, bodies: Vec<BodyIndex>, invalidate: fn(&mut Self, BodyIndex)) {
        let mut covered = 0..0;
        for body in bodies {
            if covered.contains(&body.0) {
                continue;
            }
            covered = self.bodies[body].subtree();
            invalidate(self, body);
        }
    }

    fn invalidate_position(&mut self, body: BodyIndex) {
        let range = self.bodies[body].subtree();
        trace!(?range, "invalidating positions");
        for node in &mut self.bodies.nodes_mut()[range] {
            node.get_mut().cache.invalidate_position();
        }
        self.cache.invalidate_all();
        self.generation += 1;
    }

    fn invalidate_velocity(&mut self, body: BodyIndex) {
        let range = self.bodies[body].subtree();
        trace!(?range, "invalidating velocities");
        for node in &mut self.bodies.nodes_mut()[range] {
            node.get_mut().cache.invalidate_velocity();
        }
        self.cache.invalidate_velocity();
        self.generation += 1;
    }

    fn invalidate_acceleration(&mut self, body: BodyIndex) {
        let range = self.bodies[body].subtree();
        for node in &mut self.bodies.nodes_mut()[range] {
            node.get_mut().cache.invalidate_acceleration();
        }
        self.generation += 1;
    }

    /// Drops every memoised quantity of the skeleton
    pub fn invalidate_all(&mut self) {
        for node in self.bodies.nodes_mut() {
            node.get_mut().cache.invalidate_position();
        }
        self.cache.invalidate_all();
        self.generation += 1;
    }

    /// Drops the memoised generalized external forces after the body wrenches changed
    pub(crate) fn invalidate_external_forces(&mut self) {
        self.cache.external_forces.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaIndex;
    use crate::joint::JointKind;

    fn chain() -> Skeleton {
        // A - B - C with a branch B - D, added out of depth-first order
        let mut skeleton = Skeleton::new("chain");
        let revolute = |name: &str| JointProperties::new(name, JointKind::revolute(Vector3::x()));
        let body = |name: &str| BodyProperties::new(name, Inertia::default());
        let a = skeleton.add_body(None, revolute("ja"), body("A")).unwrap();
        let b = skeleton.add_body(Some(a), JointProperties::new("jb", JointKind::Ball), body("B")).unwrap();
        skeleton.add_body(Some(a), revolute("je"), body("E")).unwrap();
        skeleton.add_body(Some(b), revolute("jc"), body("C")).unwrap();
        skeleton
    }

    #[test_log::test]
    fn test_depth_first_dofs() {
        let skeleton = chain();
        let names = skeleton.bodies().map(|b| b.name().to_string()).collect_vec();
        assert_eq!(names, vec!["A", "B", "C", "E"]);
        let dofs = skeleton.dofs().iter().map(|d| d.name().to_string()).collect_vec();
        assert_eq!(dofs, vec!["ja", "jb_x", "jb_y", "jb_z", "jc", "je"]);
        assert_eq!(skeleton.dof(4).unwrap().body(), ArenaIndex(2));
        assert_eq!(skeleton.dof_index("je"), Some(5));
        assert_eq!(skeleton.positions().len(), 6);
        assert_eq!(skeleton.children(ArenaIndex(0)).unwrap().len(), 2);
    }

    #[test_log::test]
    fn test_values_survive_reordering() {
        let mut skeleton = Skeleton::new("s");
        let body = |name: &str| BodyProperties::new(name, Inertia::default());
        let revolute = |name: &str| JointProperties::new(name, JointKind::revolute(Vector3::x()));
        let a = skeleton.add_body(None, revolute("ja"), body("A")).unwrap();
        let b = skeleton
            .add_body(Some(a), JointProperties::new("jb", JointKind::Ball), body("B"))
            .unwrap();
        skeleton.add_body(Some(a), revolute("je"), body("E")).unwrap();
        skeleton.set_position(4, 0.7).unwrap();
        skeleton.set_position(2, 0.2).unwrap();
        // C lands between B and E in depth-first order
        let c = skeleton.add_body(Some(b), revolute("jc"), body("C")).unwrap();
        assert_eq!(c, ArenaIndex(2));
        assert_eq!(skeleton.dof_index("je"), Some(5));
        assert_eq!(skeleton.position(5).unwrap(), 0.7);
        assert_eq!(skeleton.position(4).unwrap(), 0.0);
        assert_eq!(skeleton.position(2).unwrap(), 0.2);
        assert_eq!(skeleton.body_index("E"), Some(ArenaIndex(3)));
    }

    #[test_log::test]
    fn test_errors() {
        let mut skeleton = chain();
        assert_eq!(
            skeleton.set_position(6, 1.0),
            Err(DynamicsError::DofOutOfBound { index: 6, count: 6 })
        );
        assert_eq!(
            skeleton.set_positions(&DVector::zeros(3)),
            Err(DynamicsError::DimensionMismatch { expected: 6, actual: 3 })
        );
        assert_eq!(skeleton.body(ArenaIndex(9)).map(|_| ()), Err(DynamicsError::ReferenceOutOfBound(9)));
        let before = skeleton.dof_count();
        assert_eq!(
            skeleton
                .add_body(
                    None,
                    JointProperties::new("ja", JointKind::Free),
                    BodyProperties::new("F", Inertia::default())
                )
                .map(|_| ()),
            Err(DynamicsError::NotUnique("ja".into()))
        );
        assert!(matches!(
            skeleton.add_body(
                Some(ArenaIndex(0)),
                JointProperties::new("jz", JointKind::revolute(Vector3::zeros())),
                BodyProperties::new("Z", Inertia::default())
            ),
            Err(DynamicsError::InvalidAxis { .. })
        ));
        assert!(matches!(
            skeleton.add_body(
                None,
                JointProperties::new("jm", JointKind::Free),
                BodyProperties::new("M", Inertia::point_mass(-1.0, Vector3::zeros()))
            ),
            Err(DynamicsError::InvalidInertia { .. })
        ));
        assert_eq!(skeleton.dof_count(), before);
        assert_eq!(skeleton.set_time_step(0.0), Err(DynamicsError::InvalidTimeStep(0.0)));
    }

    #[test_log::test]
    fn test_commands() {
        let mut skeleton = chain();
        skeleton
            .set_dof_properties(0, DofProperties::default().with_force_limits(-1.0, 1.0))
            .unwrap();
        assert_eq!(skeleton.dof(0).unwrap().name(), "ja");
        skeleton.set_command(0, 5.0).unwrap();
        assert_eq!(skeleton.force(0).unwrap(), 1.0);
        assert_eq!(skeleton.command(0).unwrap(), 5.0);

        skeleton.set_actuator(ArenaIndex(3), ActuatorType::Servo).unwrap();
        skeleton.set_command(5, 2.0).unwrap();
        assert_eq!(skeleton.force(5).unwrap(), 0.0);
        assert_eq!(skeleton.command(5).unwrap(), 2.0);

        skeleton.reset_commands();
        assert_eq!(skeleton.forces().sum(), 0.0);
    }

    #[test_log::test]
    fn test_self_collision() {
        let skeleton = chain();
        let (a, b, c, e) = (ArenaIndex(0), ArenaIndex(1), ArenaIndex(2), ArenaIndex(3));
        assert!(!skeleton.is_collidable(a, c).unwrap());

        let mut skeleton = skeleton;
        skeleton.enable_self_collision(false);
        assert!(skeleton.is_collidable(a, c).unwrap());
        assert!(skeleton.is_collidable(c, e).unwrap());
        assert!(!skeleton.is_collidable(a, b).unwrap());
        assert!(!skeleton.is_collidable(c, b).unwrap());
        assert!(!skeleton.is_collidable(a, a).unwrap());
        assert_eq!(skeleton.collidable_pairs(), vec![(a, c), (b, e), (c, e)]);

        skeleton.enable_self_collision(true);
        assert!(skeleton.is_collidable(a, b).unwrap());
        assert_eq!(skeleton.collidable_pairs().len(), 6);

        skeleton.set_body_collidable(e, false).unwrap();
        assert!(!skeleton.is_collidable(c, e).unwrap());
        assert!(skeleton.is_collidable(ArenaIndex(4), a).is_err());
    }

    #[test_log::test]
    fn test_move_subtree_bookkeeping() {
        let mut skeleton = chain();
        skeleton.set_position(0, 0.1).unwrap();
        skeleton.set_position(4, 0.4).unwrap();
        skeleton.set_position(5, 0.5).unwrap();
        let (b, c, e) = (ArenaIndex(1), ArenaIndex(2), ArenaIndex(3));

        // moving B below its own child fails and leaves the skeleton untouched
        let revolute = JointProperties::new("jn", JointKind::revolute(Vector3::y()));
        assert!(matches!(
            skeleton.move_subtree(b, Some(c), revolute.clone()),
            Err(DynamicsError::Cycle { .. })
        ));
        assert_eq!(skeleton.dof_count(), 6);

        // the joint name of the replaced joint may be reused
        let moved = skeleton
            .move_subtree(b, Some(e), JointProperties::new("jb", JointKind::revolute(Vector3::y())))
            .unwrap();
        let names = skeleton.bodies().map(|b| b.name().to_string()).collect_vec();
        assert_eq!(names, vec!["A", "E", "B", "C"]);
        assert_eq!(moved, ArenaIndex(2));
        let dofs = skeleton.dofs().iter().map(|d| d.name().to_string()).collect_vec();
        assert_eq!(dofs, vec!["ja", "je", "jb", "jc"]);
        assert_eq!(
            skeleton.positions().as_slice(),
            &[0.1, 0.5, 0.0, 0.4]
        );
        assert_eq!(skeleton.parent(moved).unwrap(), Some(ArenaIndex(1)));
    }
}

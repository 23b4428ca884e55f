//! A [World] of skeletons sharing gravity and a time step.
//!
//! [World::step] runs collision detection, turns contacts and enforced joint limits into
//! constraint forces, computes the forward dynamics of every skeleton and integrates with
//! semi-implicit Euler. External forces and constraint forces only last for one step.

use crate::body::BodyIndex;
use crate::collision::{CollisionDetector, Contact, NullCollisionDetector};
use crate::constraint::{ConstraintSolver, PenaltyConstraintSolver};
use crate::skeleton::Skeleton;
use crate::DynamicsError;
use itertools::Itertools;
use nalgebra::Vector3;
use tracing::{debug, trace, warn};
use tracing_attributes::instrument;

/// Handle of a skeleton in a [World], stable until the skeleton is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkeletonId(pub usize);

impl std::fmt::Display for SkeletonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Settings shared by all skeletons of a world
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub gravity: Vector3<f64>,
    pub time_step: f64,
    /// Zero the forces and commands of all skeletons after each step
    pub reset_commands: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            gravity: Vector3::new(0.0, 0.0, -9.81),
            time_step: 0.001,
            reset_commands: true,
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_reset_commands(mut self, reset_commands: bool) -> Self {
        self.reset_commands = reset_commands;
        self
    }

    fn validate(&self) -> Result<(), DynamicsError> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(DynamicsError::InvalidTimeStep(self.time_step));
        }
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(DynamicsError::MissingProperty {
                owner: "world".to_string(),
                property: "gravity".to_string(),
            });
        }
        Ok(())
    }
}

/// Owns skeletons and advances them in time
pub struct World {
    config: WorldConfig,
    skeletons: Vec<(SkeletonId, Skeleton)>,
    next_id: usize,
    detector: Box<dyn CollisionDetector>,
    solver: Box<dyn ConstraintSolver>,
    time: f64,
    frame: u64,
    contacts: Vec<Contact>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("skeletons", &self.skeletons.iter().map(|(id, s)| (id, s.name())).collect_vec())
            .field("time", &self.time)
            .field("frame", &self.frame)
            .field("contacts", &self.contacts.len())
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        World {
            config: WorldConfig::default(),
            skeletons: vec![],
            next_id: 0,
            detector: Box::new(NullCollisionDetector),
            solver: Box::new(PenaltyConstraintSolver::default()),
            time: 0.0,
            frame: 0,
            contacts: vec![],
        }
    }
}

impl World {
    /// World without collision detection
    pub fn new(config: WorldConfig) -> Result<Self, DynamicsError> {
        config.validate()?;
        Ok(World {
            config,
            ..Default::default()
        })
    }

    pub fn with_collision_detector(mut self, detector: impl CollisionDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn with_constraint_solver(mut self, solver: impl ConstraintSolver + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn gravity(&self) -> &Vector3<f64> {
        &self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.config.gravity = gravity;
        for (_, skeleton) in &mut self.skeletons {
            skeleton.set_gravity(gravity);
        }
    }

    pub fn time_step(&self) -> f64 {
        self.config.time_step
    }

    pub fn set_time_step(&mut self, time_step: f64) -> Result<(), DynamicsError> {
        self.config.clone().with_time_step(time_step).validate()?;
        for (_, skeleton) in &mut self.skeletons {
            skeleton.set_time_step(time_step)?;
        }
        self.config.time_step = time_step;
        Ok(())
    }

    /// Simulated time
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of steps taken
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Contacts found in the last step
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Adds a skeleton, which takes over the gravity and time step of the world. Skeleton
    /// names must be unique within a world.
    pub fn add_skeleton(&mut self, mut skeleton: Skeleton) -> Result<SkeletonId, DynamicsError> {
        if self.skeleton_by_name(skeleton.name()).is_some() {
            return Err(DynamicsError::NotUnique(skeleton.name().to_string()));
        }
        skeleton.set_gravity(self.config.gravity);
        skeleton.set_time_step(self.config.time_step)?;
        let id = SkeletonId(self.next_id);
        self.next_id += 1;
        debug!(%id, skeleton = skeleton.name(), "added skeleton");
        self.skeletons.push((id, skeleton));
        Ok(id)
    }

    pub fn remove_skeleton(&mut self, id: SkeletonId) -> Result<Skeleton, DynamicsError> {
        let index = self.position(id)?;
        Ok(self.skeletons.remove(index).1)
    }

    fn position(&self, id: SkeletonId) -> Result<usize, DynamicsError> {
        self.skeletons
            .iter()
            .position(|(other, _)| *other == id)
            .ok_or(DynamicsError::UnknownSkeleton(id.0))
    }

    pub fn skeleton(&self, id: SkeletonId) -> Result<&Skeleton, DynamicsError> {
        Ok(&self.skeletons[self.position(id)?].1)
    }

    pub fn skeleton_mut(&mut self, id: SkeletonId) -> Result<&mut Skeleton, DynamicsError> {
        let index = self.position(id)?;
        Ok(&mut self.skeletons[index].1)
    }

    pub fn skeleton_by_name(&self, name: &str) -> Option<(SkeletonId, &Skeleton)> {
        self.skeletons
            .iter()
            .find(|(_, skeleton)| skeleton.name() == name)
            .map(|(id, skeleton)| (*id, skeleton))
    }

    pub fn skeletons(&self) -> impl Iterator<Item = (SkeletonId, &Skeleton)> {
        self.skeletons.iter().map(|(id, skeleton)| (*id, skeleton))
    }

    pub fn skeleton_count(&self) -> usize {
        self.skeletons.len()
    }

    /// Resets time, frame counter and contacts. The state of the skeletons is kept.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.frame = 0;
        self.contacts.clear();
    }

    /// Advances all skeletons by one time step. Caches are not reset wholesale: integration
    /// writes through the coordinate setters, which invalidate every body whose coordinates
    /// changed.
    ///
    /// If the dynamics of any skeleton fails, the error is returned before any skeleton is
    /// integrated. Positions, velocities, time and frame keep their values and the constraint
    /// forces of the aborted step are cleared. Colliding flags, and the accelerations and
    /// prescribed forces of skeletons solved before the failure, reflect the aborted step.
    #[instrument(skip(self), fields(frame = self.frame))]
    pub fn step(&mut self) -> Result<(), DynamicsError> {
        let dt = self.config.time_step;

        let contacts = self.detector.detect(&mut self.skeletons)?;
        self.mark_colliding(&contacts)?;
        self.solver.solve(&mut self.skeletons, &contacts)?;

        if let Err(error) = forward_dynamics(&mut self.skeletons) {
            warn!(%error, "forward dynamics failed, step aborted");
            for (_, skeleton) in &mut self.skeletons {
                skeleton.clear_constraint_forces();
            }
            return Err(error);
        }

        for (_, skeleton) in &mut self.skeletons {
            skeleton.integrate_velocities(dt)?;
            skeleton.integrate_positions(dt)?;
            skeleton.clear_external_forces();
            skeleton.clear_constraint_forces();
            if self.config.reset_commands {
                skeleton.reset_commands();
            }
        }

        trace!(contacts = contacts.len(), "step done");
        self.contacts = contacts;
        self.time += dt;
        self.frame += 1;
        Ok(())
    }

    fn mark_colliding(&mut self, contacts: &[Contact]) -> Result<(), DynamicsError> {
        for (_, skeleton) in &mut self.skeletons {
            for index in 0..skeleton.body_count() {
                skeleton.set_colliding(BodyIndex::from(index), false)?;
            }
        }
        let handles = contacts
            .iter()
            .flat_map(|contact| std::iter::once(contact.first).chain(contact.second))
            .unique();
        for handle in handles {
            let index = self.position(handle.skeleton)?;
            self.skeletons[index].1.set_colliding(handle.body, true)?;
        }
        Ok(())
    }
}

#[cfg(feature = "rayon")]
fn forward_dynamics(skeletons: &mut [(SkeletonId, Skeleton)]) -> Result<(), DynamicsError> {
    use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
    skeletons
        .par_iter_mut()
        .try_for_each(|(_, skeleton)| skeleton.compute_forward_dynamics())
}

#[cfg(not(feature = "rayon"))]
fn forward_dynamics(skeletons: &mut [(SkeletonId, Skeleton)]) -> Result<(), DynamicsError> {
    skeletons
        .iter_mut()
        .try_for_each(|(_, skeleton)| skeleton.compute_forward_dynamics())
}

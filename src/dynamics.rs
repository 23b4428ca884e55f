//! Dynamics of a [Skeleton].
//!
//! Inverse dynamics is the recursive Newton-Euler algorithm (RNEA): an outward pass computes
//! body accelerations, an inward pass accumulates body wrenches and projects them onto the
//! joint motion subspaces. Gravity enters as an upward acceleration of the world. The mass
//! matrix is assembled column by column from RNEA with unit accelerations and every other
//! contribution switched off.
//!
//! Forward dynamics is the articulated body algorithm (ABA) in its hybrid form: coordinates
//! of joints with a force actuator get their accelerations from the forces, coordinates of
//! joints with a prescribed motion (servos, velocity, acceleration and locked actuators) get
//! the forces required to follow the prescription. The equation of motion is
//!
//! `M(q) q̈ + C(q, q̇) + g(q) = τ + τ_passive + τ_constraint + Σ J_iᵀ F_i`

use crate::arena::Nodelike;
use crate::body::BodyIndex;
use crate::joint::ActuatorType;
use crate::math::{
    adjoint_inverse, all_finite, dad, spatial, transform_twist_inverse, transform_wrench,
    Transform,
};
use crate::memo::Memo;
use crate::skeleton::{Skeleton, SkeletonCache};
use crate::DynamicsError;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector, Matrix6, Matrix6xX, Point3, Vector3, Vector6};
use std::ops::Range;
use tracing::{debug, trace, warn};
use tracing_attributes::instrument;

/// Contributions entering a recursive pass besides the inertial ones
#[derive(Debug, Clone, Copy)]
struct Terms {
    velocity: bool,
    gravity: bool,
    external: bool,
}

impl Terms {
    const INERTIAL: Terms = Terms {
        velocity: false,
        gravity: false,
        external: false,
    };
    const ALL: Terms = Terms {
        velocity: true,
        gravity: true,
        external: true,
    };
}

/// Quantities of one body used by the recursive passes
#[derive(Debug, Clone)]
struct Link {
    body: BodyIndex,
    parent: Option<usize>,
    /// Transform relative to the parent body
    transform: Transform,
    subspace: Matrix6xX<f64>,
    velocity: Vector6<f64>,
    /// Velocity product acceleration `ad(V, S·q̇) + Ṡ·q̇`
    bias: Vector6<f64>,
    inertia: Matrix6<f64>,
    external: Vector6<f64>,
    dofs: Range<usize>,
}

/// Joint space projection of the articulated inertia of a force driven joint
#[derive(Debug, Clone)]
struct Projection {
    /// `U = Iᴬ S`
    u: Matrix6xX<f64>,
    /// `Ψ = (Sᵀ Iᴬ S)⁻¹`
    psi: DMatrix<f64>,
    /// `τ - Sᵀ (Iᴬ η + B)`
    residual: DVector<f64>,
}

/// Result of a hybrid articulated body pass
#[derive(Debug, Clone)]
struct Solution {
    accelerations: DVector<f64>,
    /// Generalized forces, computed for prescribed joints and copied for the others
    forces: DVector<f64>,
}

impl Skeleton {
    fn links(&mut self, terms: Terms) -> Vec<Link> {
        (0..self.body_count())
            .map(BodyIndex::from)
            .map(|body| {
                let transform = self.relative_transform_of(body);
                let subspace = self.motion_subspace(body);
                let (velocity, bias) = if terms.velocity {
                    (self.body_velocity(body), self.partial_acceleration(body))
                } else {
                    (Vector6::zeros(), Vector6::zeros())
                };
                let node = &self.bodies[body];
                Link {
                    body,
                    parent: node.parent().map(|parent| parent.0),
                    transform,
                    subspace,
                    velocity,
                    bias,
                    inertia: node.get().spatial_inertia(),
                    external: if terms.external {
                        node.get().external_force
                    } else {
                        Vector6::zeros()
                    },
                    dofs: node.get().dof_indices(),
                }
            })
            .collect_vec()
    }

    /// Acceleration of the world frame, upwards to account for gravity
    fn root_acceleration(&self, terms: Terms) -> Vector6<f64> {
        if terms.gravity {
            spatial(&Vector3::zeros(), &-self.gravity)
        } else {
            Vector6::zeros()
        }
    }

    fn newton_euler(
        links: &[Link],
        accelerations: &DVector<f64>,
        root: &Vector6<f64>,
    ) -> DVector<f64> {
        let mut body_accelerations: Vec<Vector6<f64>> = Vec::with_capacity(links.len());
        let mut wrenches = Vec::with_capacity(links.len());
        for link in links {
            let parent = link.parent.map_or(*root, |parent| body_accelerations[parent]);
            let acceleration = transform_twist_inverse(&link.transform, &parent)
                + link.bias
                + &link.subspace * accelerations.rows(link.dofs.start, link.dofs.len());
            let momentum = link.inertia * link.velocity;
            wrenches.push(link.inertia * acceleration - dad(&link.velocity, &momentum) - link.external);
            body_accelerations.push(acceleration);
        }

        let mut forces = DVector::zeros(accelerations.len());
        for (i, link) in links.iter().enumerate().rev() {
            let wrench = wrenches[i];
            forces
                .rows_mut(link.dofs.start, link.dofs.len())
                .copy_from(&(link.subspace.transpose() * wrench));
            if let Some(parent) = link.parent {
                wrenches[parent] += transform_wrench(&link.transform, &wrench);
            }
        }
        forces
    }

    /// Hybrid articulated body algorithm. Joints flagged in `prescribed` (indexed by body)
    /// follow the accelerations in `known`, the others are driven by `forces`.
    fn articulated(
        &self,
        links: &[Link],
        root: &Vector6<f64>,
        forces: &DVector<f64>,
        prescribed: &[bool],
        known: &DVector<f64>,
    ) -> Result<Solution, DynamicsError> {
        let mut inertias = links.iter().map(|link| link.inertia).collect_vec();
        let mut biases = links
            .iter()
            .map(|link| -dad(&link.velocity, &(link.inertia * link.velocity)) - link.external)
            .collect_vec();
        let mut projections: Vec<Option<Projection>> = vec![None; links.len()];

        for (i, link) in links.iter().enumerate().rev() {
            let (inertia, bias) = (inertias[i], biases[i]);
            let (start, count) = (link.dofs.start, link.dofs.len());
            let (projected, transmitted) = if prescribed[i] || count == 0 {
                let motion = link.bias + &link.subspace * known.rows(start, count);
                (inertia, bias + inertia * motion)
            } else {
                let u: Matrix6xX<f64> = inertia * &link.subspace;
                let psi = (link.subspace.transpose() * &u)
                    .try_inverse()
                    .filter(|psi| all_finite(psi.iter()))
                    .ok_or_else(|| DynamicsError::SingularArticulatedInertia {
                        body: self.bodies[link.body].get().name().to_string(),
                    })?;
                let residual = forces.rows(start, count).into_owned()
                    - link.subspace.transpose() * (inertia * link.bias + bias);
                let projected = inertia - &u * &psi * u.transpose();
                let transmitted = bias + inertia * link.bias + &u * (&psi * &residual);
                projections[i] = Some(Projection { u, psi, residual });
                (projected, transmitted)
            };
            if let Some(parent) = link.parent {
                let adjoint = adjoint_inverse(&link.transform);
                inertias[parent] += adjoint.transpose() * projected * adjoint;
                biases[parent] += transform_wrench(&link.transform, &transmitted);
            }
        }

        let mut accelerations = known.clone();
        let mut required = forces.clone();
        let mut body_accelerations: Vec<Vector6<f64>> = Vec::with_capacity(links.len());
        for (i, link) in links.iter().enumerate() {
            let parent = link.parent.map_or(*root, |parent| body_accelerations[parent]);
            let base = transform_twist_inverse(&link.transform, &parent);
            let (start, count) = (link.dofs.start, link.dofs.len());
            if let Some(projection) = &projections[i] {
                let ddq = &projection.psi * (&projection.residual - projection.u.transpose() * base);
                accelerations.rows_mut(start, count).copy_from(&ddq);
            }
            let acceleration = base + link.bias + &link.subspace * accelerations.rows(start, count);
            if projections[i].is_none() {
                let wrench = inertias[i] * acceleration + biases[i];
                required
                    .rows_mut(start, count)
                    .copy_from(&(link.subspace.transpose() * wrench));
            }
            body_accelerations.push(acceleration);
        }

        if !all_finite(accelerations.iter()) || !all_finite(required.iter()) {
            return Err(DynamicsError::NonFiniteResult("articulated body algorithm"));
        }
        Ok(Solution {
            accelerations,
            forces: required,
        })
    }

    /// Returns the memoised skeleton quantity or computes and stores it
    fn memoized_skeleton<T, F, C>(&mut self, field: F, compute: C) -> T
    where
        T: Clone,
        F: Fn(&mut SkeletonCache) -> &mut Memo<T>,
        C: FnOnce(&mut Self) -> T,
    {
        if let Some(value) = field(&mut self.cache).cloned() {
            return value;
        }
        let value = compute(self);
        let stamp = self.next_stamp();
        field(&mut self.cache).set(value.clone(), stamp);
        value
    }

    fn recursive_newton_euler(&mut self, accelerations: &DVector<f64>, terms: Terms) -> DVector<f64> {
        let links = self.links(terms);
        let root = self.root_acceleration(terms);
        Self::newton_euler(&links, accelerations, &root)
    }

    // Inverse dynamics

    /// Total generalized force (actuator, passive, constraint) required for the given
    /// accelerations in the current state
    pub fn inverse_dynamics(&mut self, accelerations: &DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
        self.check_dimension(accelerations.len())?;
        Ok(self.recursive_newton_euler(accelerations, Terms::ALL))
    }

    /// Sets the actuator forces such that forward dynamics reproduces the current
    /// accelerations
    #[instrument(skip(self), fields(skeleton = %self.name()))]
    pub fn compute_inverse_dynamics(&mut self) -> Result<(), DynamicsError> {
        let accelerations = self.accelerations.clone();
        let total = self.inverse_dynamics(&accelerations)?;
        let forces = total - self.passive_forces() - &self.constraint_forces;
        if !all_finite(forces.iter()) {
            return Err(DynamicsError::NonFiniteResult("inverse dynamics"));
        }
        self.forces = forces;
        Ok(())
    }

    /// Joint space inertia `M(q)`
    pub fn mass_matrix(&mut self) -> DMatrix<f64> {
        self.memoized_skeleton(
            |cache| &mut cache.mass_matrix,
            |skeleton| {
                let n = skeleton.dof_count();
                let links = skeleton.links(Terms::INERTIAL);
                let root = Vector6::zeros();
                let mut matrix = DMatrix::zeros(n, n);
                let mut unit = DVector::zeros(n);
                for j in 0..n {
                    unit[j] = 1.0;
                    matrix.set_column(j, &Self::newton_euler(&links, &unit, &root));
                    unit[j] = 0.0;
                }
                trace!(dofs = n, "assembled mass matrix");
                matrix
            },
        )
    }

    /// `M(q)⁻¹` from articulated body passes with unit forces
    pub fn inv_mass_matrix(&mut self) -> Result<DMatrix<f64>, DynamicsError> {
        if let Some(matrix) = self.cache.inv_mass_matrix.cloned() {
            return Ok(matrix);
        }
        let n = self.dof_count();
        let links = self.links(Terms::INERTIAL);
        let root = Vector6::zeros();
        let prescribed = vec![false; links.len()];
        let known = DVector::zeros(n);
        let mut matrix = DMatrix::zeros(n, n);
        let mut unit = DVector::zeros(n);
        for j in 0..n {
            unit[j] = 1.0;
            let solution = self.articulated(&links, &root, &unit, &prescribed, &known)?;
            matrix.set_column(j, &solution.accelerations);
            unit[j] = 0.0;
        }
        let stamp = self.next_stamp();
        self.cache.inv_mass_matrix.set(matrix.clone(), stamp);
        Ok(matrix)
    }

    /// Velocity product forces `C(q, q̇)`
    pub fn coriolis_forces(&mut self) -> DVector<f64> {
        self.memoized_skeleton(
            |cache| &mut cache.coriolis_forces,
            |skeleton| {
                let zeros = DVector::zeros(skeleton.dof_count());
                skeleton.recursive_newton_euler(
                    &zeros,
                    Terms {
                        velocity: true,
                        ..Terms::INERTIAL
                    },
                )
            },
        )
    }

    /// Gravity forces `g(q)`
    pub fn gravity_forces(&mut self) -> DVector<f64> {
        self.memoized_skeleton(
            |cache| &mut cache.gravity_forces,
            |skeleton| {
                let zeros = DVector::zeros(skeleton.dof_count());
                skeleton.recursive_newton_euler(
                    &zeros,
                    Terms {
                        gravity: true,
                        ..Terms::INERTIAL
                    },
                )
            },
        )
    }

    /// `C(q, q̇) + g(q)` in a single pass
    pub fn coriolis_and_gravity_forces(&mut self) -> DVector<f64> {
        self.memoized_skeleton(
            |cache| &mut cache.coriolis_and_gravity_forces,
            |skeleton| {
                let zeros = DVector::zeros(skeleton.dof_count());
                skeleton.recursive_newton_euler(
                    &zeros,
                    Terms {
                        external: false,
                        ..Terms::ALL
                    },
                )
            },
        )
    }

    /// Generalized forces `Σ J_iᵀ F_i` of the external wrenches on the bodies
    pub fn external_forces(&mut self) -> DVector<f64> {
        self.memoized_skeleton(
            |cache| &mut cache.external_forces,
            |skeleton| {
                let zeros = DVector::zeros(skeleton.dof_count());
                -skeleton.recursive_newton_euler(
                    &zeros,
                    Terms {
                        external: true,
                        ..Terms::INERTIAL
                    },
                )
            },
        )
    }

    /// Spring and damper forces. Zero for coordinates with a prescribed motion.
    pub fn passive_forces(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.dof_count(),
            self.dofs.iter().map(|dof| {
                if self.bodies[dof.body].get().joint.actuator().is_prescribed() {
                    0.0
                } else {
                    dof.passive_force(self.positions[dof.index], self.velocities[dof.index])
                }
            }),
        )
    }

    // Forward dynamics

    /// Accelerations prescribed by the actuators of the joints for the next time step,
    /// together with the flags (per body) of prescribed joints
    fn prescribed_accelerations(&self) -> (Vec<bool>, DVector<f64>) {
        let dt = self.time_step;
        let mut known = DVector::zeros(self.dof_count());
        let mut prescribed = Vec::with_capacity(self.body_count());
        for node in self.bodies.nodes() {
            let body = node.get();
            let actuator = body.joint.actuator();
            prescribed.push(actuator.is_prescribed());
            for i in body.dof_indices() {
                known[i] = match actuator {
                    ActuatorType::Servo | ActuatorType::Velocity => {
                        (self.commands[i] - self.velocities[i]) / dt
                    }
                    ActuatorType::Acceleration => self.commands[i],
                    ActuatorType::Locked => -self.velocities[i] / dt,
                    ActuatorType::Force | ActuatorType::Passive => 0.0,
                };
            }
        }
        (prescribed, known)
    }

    /// Total generalized forces of force driven coordinates
    fn applied_forces(&self) -> DVector<f64> {
        let mut forces = self.passive_forces() + &self.constraint_forces;
        for node in self.bodies.nodes() {
            let body = node.get();
            if body.joint.actuator() == ActuatorType::Force {
                for i in body.dof_indices() {
                    forces[i] += self.forces[i];
                }
            }
        }
        forces
    }

    /// Computes the accelerations of all coordinates with the articulated body algorithm
    /// and stores them in [Skeleton::accelerations]. The forces required by joints with a
    /// prescribed motion are written to [Skeleton::forces]. Servos whose required force
    /// exceeds the force limits are re-solved as force driven with the clamped force.
    ///
    /// On failure the state of the skeleton is left untouched.
    #[instrument(skip(self), fields(skeleton = %self.name()))]
    pub fn compute_forward_dynamics(&mut self) -> Result<(), DynamicsError> {
        let (mut prescribed, known) = self.prescribed_accelerations();
        let mut forces = self.applied_forces();
        let links = self.links(Terms::ALL);
        let root = self.root_acceleration(Terms::ALL);

        let mut saturated = vec![false; links.len()];
        let solution = loop {
            let solution = self.articulated(&links, &root, &forces, &prescribed, &known)?;
            let mut resolve = false;
            for (i, link) in links.iter().enumerate() {
                let servo = self.bodies[link.body].get().joint.actuator() == ActuatorType::Servo;
                if !servo || !prescribed[i] {
                    continue;
                }
                let clamped = link
                    .dofs
                    .clone()
                    .map(|k| {
                        let actuator = solution.forces[k] - self.constraint_forces[k];
                        (k, actuator, self.dofs[k].clamp_force(actuator))
                    })
                    .collect_vec();
                if clamped.iter().any(|(_, actuator, limited)| actuator != limited) {
                    for (k, _, limited) in clamped {
                        forces[k] = limited + self.constraint_forces[k];
                    }
                    prescribed[i] = false;
                    saturated[i] = true;
                    resolve = true;
                }
            }
            if !resolve {
                break solution;
            }
            debug!(
                servos = saturated.iter().filter(|s| **s).count(),
                "servo force limits reached"
            );
        };

        for (i, link) in links.iter().enumerate() {
            if prescribed[i] || saturated[i] {
                for k in link.dofs.clone() {
                    self.forces[k] = solution.forces[k] - self.constraint_forces[k];
                }
            }
        }
        self.set_accelerations(&solution.accelerations)
    }

    /// Accelerations `M⁻¹(τ - C - g + τ_ext)` from a dense solve, treating every joint as
    /// force driven. Does not modify the skeleton.
    pub fn forward_dynamics_dense(&mut self) -> Result<DVector<f64>, DynamicsError> {
        let forces = self.passive_forces() + &self.forces + &self.constraint_forces
            - self.coriolis_and_gravity_forces()
            + self.external_forces();
        let mass = self.mass_matrix();
        let accelerations = solve_dense(mass, forces)?;
        if !all_finite(accelerations.iter()) {
            warn!("dense forward dynamics produced non-finite accelerations");
            return Err(DynamicsError::NonFiniteResult("dense forward dynamics"));
        }
        Ok(accelerations)
    }

    // Integration

    /// Semi-implicit Euler update of the velocities, `q̇ += q̈ dt`
    pub fn integrate_velocities(&mut self, dt: f64) -> Result<(), DynamicsError> {
        check_time_step(dt)?;
        let velocities = &self.velocities + &self.accelerations * dt;
        self.set_velocities(&velocities)
    }

    /// Advances the positions of every joint on its configuration manifold
    pub fn integrate_positions(&mut self, dt: f64) -> Result<(), DynamicsError> {
        check_time_step(dt)?;
        let mut positions = self.positions.clone();
        for node in self.bodies.nodes() {
            let body = node.get();
            let range = body.dof_indices();
            body.joint.integrate_positions(
                &mut positions.as_mut_slice()[range.clone()],
                &self.velocities.as_slice()[range],
                dt,
            );
        }
        self.set_positions(&positions)
    }

    // External forces

    /// Adds a force acting on the point `offset` of the body. The force and the point are
    /// given in body coordinates if the respective flag is set and in world coordinates
    /// otherwise, world quantities are converted with the current pose of the body.
    pub fn add_external_force(
        &mut self,
        body: BodyIndex,
        force: &Vector3<f64>,
        offset: &Vector3<f64>,
        force_local: bool,
        offset_local: bool,
    ) -> Result<(), DynamicsError> {
        self.check_body(body)?;
        let pose = self.world_transform(body);
        let force = if force_local {
            *force
        } else {
            pose.rotation.inverse_transform_vector(force)
        };
        let point = if offset_local {
            *offset
        } else {
            pose.inverse_transform_point(&Point3::from(*offset)).coords
        };
        self.bodies[body].get_mut().external_force += spatial(&point.cross(&force), &force);
        self.invalidate_external_forces();
        Ok(())
    }

    pub fn add_external_torque(
        &mut self,
        body: BodyIndex,
        torque: &Vector3<f64>,
        local: bool,
    ) -> Result<(), DynamicsError> {
        self.check_body(body)?;
        let torque = if local {
            *torque
        } else {
            self.world_transform(body).rotation.inverse_transform_vector(torque)
        };
        self.bodies[body].get_mut().external_force += spatial(&torque, &Vector3::zeros());
        self.invalidate_external_forces();
        Ok(())
    }

    pub fn clear_external_forces(&mut self) {
        for node in self.bodies.nodes_mut() {
            node.get_mut().external_force = Vector6::zeros();
        }
        self.invalidate_external_forces();
    }
}

fn check_time_step(dt: f64) -> Result<(), DynamicsError> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(DynamicsError::InvalidTimeStep(dt))
    }
}

#[cfg(not(feature = "faer"))]
fn solve_dense(matrix: DMatrix<f64>, rhs: DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
    let cholesky = matrix.cholesky().ok_or(DynamicsError::SingularMassMatrix)?;
    Ok(cholesky.solve(&rhs))
}

#[cfg(feature = "faer")]
fn solve_dense(matrix: DMatrix<f64>, rhs: DVector<f64>) -> Result<DVector<f64>, DynamicsError> {
    crate::faer::solve_mass_matrix(&matrix, &rhs)
}

//! Inertial properties of a rigid body

use crate::math::skew;
use crate::DynamicsError;
use nalgebra::{Matrix3, Matrix6, Vector3};

/// Mass, center of mass (in body coordinates) and moment of inertia about the center of mass
#[derive(Debug, Clone, PartialEq)]
pub struct Inertia {
    mass: f64,
    com: Vector3<f64>,
    moment: Matrix3<f64>,
}

impl Default for Inertia {
    /// Unit mass at the body origin with a unit moment of inertia
    fn default() -> Self {
        Inertia {
            mass: 1.0,
            com: Vector3::zeros(),
            moment: Matrix3::identity(),
        }
    }
}

impl Inertia {
    /// Creates inertial properties without validation, see [Inertia::validate]
    pub fn new(mass: f64, com: Vector3<f64>, moment: Matrix3<f64>) -> Self {
        Inertia { mass, com, moment }
    }

    pub fn point_mass(mass: f64, com: Vector3<f64>) -> Self {
        Inertia::new(mass, com, Matrix3::zeros())
    }

    /// Moment of inertia given by its principal moments (aligned with the body axes)
    pub fn from_principal(mass: f64, com: Vector3<f64>, principal: Vector3<f64>) -> Self {
        Inertia::new(mass, com, Matrix3::from_diagonal(&principal))
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn com(&self) -> &Vector3<f64> {
        &self.com
    }

    pub fn moment(&self) -> &Matrix3<f64> {
        &self.moment
    }

    /// Checks that the parameters are physically admissible: a positive, finite mass and a
    /// symmetric, positive semi-definite moment of inertia.
    pub fn validate(&self, body: &str) -> Result<(), DynamicsError> {
        let invalid = |reason: &str| DynamicsError::InvalidInertia {
            body: body.to_string(),
            reason: reason.to_string(),
        };
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(invalid("mass must be positive and finite"));
        }
        if !(self.com.iter().all(|v| v.is_finite()) && self.moment.iter().all(|v| v.is_finite())) {
            return Err(invalid("non-finite center of mass or moment of inertia"));
        }
        let scale = self.moment.amax().max(1.0);
        if (self.moment - self.moment.transpose()).amax() > 1e-9 * scale {
            return Err(invalid("moment of inertia is not symmetric"));
        }
        if self.moment.symmetric_eigenvalues().min() < -1e-9 * scale {
            return Err(invalid("moment of inertia is not positive semi-definite"));
        }
        Ok(())
    }

    /// Spatial inertia tensor about the body origin for `[angular; linear]` spatial vectors
    /// `G = [[I_c + m[c][c]ᵀ, m[c]], [m[c]ᵀ, m·1]]`
    pub fn spatial(&self) -> Matrix6<f64> {
        let cx = skew(&self.com);
        let mut result = Matrix6::zeros();
        result
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(self.moment + self.mass * cx * cx.transpose()));
        result
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&(self.mass * cx));
        result
            .fixed_view_mut::<3, 3>(3, 0)
            .copy_from(&(self.mass * cx.transpose()));
        result
            .fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(self.mass * Matrix3::identity()));
        result
    }
}

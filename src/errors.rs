//! Provides the error type used throughout this crate.
//!
//! Errors fall into three families (see [ErrorKind]): malformed configuration (rejected before
//! any state is touched), out-of-range indices, and numerical degeneracy detected by the
//! dynamics algorithms.

use thiserror::Error;

/// Coarse classification of a [DynamicsError]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Index,
    Numerical,
}

/// The error type of this crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DynamicsError {
    // Configuration errors
    #[error("Joint '{joint}' requires a non-zero axis")]
    InvalidAxis { joint: String },
    #[error("Invalid inertia for body '{body}': {reason}")]
    InvalidInertia { body: String, reason: String },
    #[error("Missing or malformed property '{property}' of '{owner}'")]
    MissingProperty { owner: String, property: String },
    #[error("Attaching '{node}' below '{parent}' would create a cycle")]
    Cycle { node: String, parent: String },
    #[error("ID not unique: {0}")]
    NotUnique(String),
    #[error("Node not in tree: {0}")]
    UnknownNode(String),
    #[error("Body '{child}' references parent '{parent}' which cannot be resolved")]
    MissingParent { child: String, parent: String },
    #[error("Invalid time step {0} (must be positive and finite)")]
    InvalidTimeStep(f64),

    // Index errors
    #[error("Degree of freedom {index} is out of bound ({count} degrees of freedom)")]
    DofOutOfBound { index: usize, count: usize },
    #[error("Node reference {0} is out of bound")]
    ReferenceOutOfBound(usize),
    #[error("Wrong dimensions: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("No skeleton with id {0}")]
    UnknownSkeleton(usize),

    // Numerical errors
    #[error("Articulated inertia of body '{body}' is singular")]
    SingularArticulatedInertia { body: String },
    #[error("Mass matrix is singular or not positive definite")]
    SingularMassMatrix,
    #[error("Non-finite value in {0}")]
    NonFiniteResult(&'static str),
}

impl DynamicsError {
    /// The family the error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            DynamicsError::InvalidAxis { .. }
            | DynamicsError::InvalidInertia { .. }
            | DynamicsError::MissingProperty { .. }
            | DynamicsError::Cycle { .. }
            | DynamicsError::NotUnique(_)
            | DynamicsError::UnknownNode(_)
            | DynamicsError::MissingParent { .. }
            | DynamicsError::InvalidTimeStep(_) => ErrorKind::Configuration,
            DynamicsError::DofOutOfBound { .. }
            | DynamicsError::ReferenceOutOfBound(_)
            | DynamicsError::DimensionMismatch { .. }
            | DynamicsError::UnknownSkeleton(_) => ErrorKind::Index,
            DynamicsError::SingularArticulatedInertia { .. }
            | DynamicsError::SingularMassMatrix
            | DynamicsError::NonFiniteResult(_) => ErrorKind::Numerical,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            DynamicsError::InvalidAxis { joint: "j".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(DynamicsError::ReferenceOutOfBound(3).kind(), ErrorKind::Index);
        assert_eq!(DynamicsError::SingularMassMatrix.kind(), ErrorKind::Numerical);
        assert_eq!(
            DynamicsError::DofOutOfBound { index: 4, count: 2 }.to_string(),
            "Degree of freedom 4 is out of bound (2 degrees of freedom)"
        );
    }
}

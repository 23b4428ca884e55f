//! Metadata of a single generalized coordinate. The values themselves (position, velocity,
//! acceleration, force, command) live in the vectors of the owning [crate::Skeleton].

use crate::arena::ArenaIndex;
use crate::DynamicsError;

/// Limits and passive coefficients of a degree of freedom
#[derive(Debug, Clone, PartialEq)]
pub struct DofProperties {
    /// Defaults to a name derived from the joint's name
    pub name: Option<String>,
    pub position_limits: (f64, f64),
    pub velocity_limits: (f64, f64),
    pub force_limits: (f64, f64),
    pub spring_stiffness: f64,
    pub rest_position: f64,
    pub damping: f64,
}

impl Default for DofProperties {
    fn default() -> Self {
        DofProperties {
            name: None,
            position_limits: (f64::NEG_INFINITY, f64::INFINITY),
            velocity_limits: (f64::NEG_INFINITY, f64::INFINITY),
            force_limits: (f64::NEG_INFINITY, f64::INFINITY),
            spring_stiffness: 0.0,
            rest_position: 0.0,
            damping: 0.0,
        }
    }
}

impl DofProperties {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position_limits(mut self, lower: f64, upper: f64) -> Self {
        self.position_limits = (lower, upper);
        self
    }

    pub fn with_velocity_limits(mut self, lower: f64, upper: f64) -> Self {
        self.velocity_limits = (lower, upper);
        self
    }

    pub fn with_force_limits(mut self, lower: f64, upper: f64) -> Self {
        self.force_limits = (lower, upper);
        self
    }

    pub fn with_spring(mut self, stiffness: f64, rest_position: f64) -> Self {
        self.spring_stiffness = stiffness;
        self.rest_position = rest_position;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub(crate) fn validate(&self, owner: &str) -> Result<(), DynamicsError> {
        let malformed = |property: &str| DynamicsError::MissingProperty {
            owner: owner.to_string(),
            property: property.to_string(),
        };
        for (limits, property) in [
            (self.position_limits, "position limits"),
            (self.velocity_limits, "velocity limits"),
            (self.force_limits, "force limits"),
        ] {
            if limits.0.is_nan() || limits.1.is_nan() || limits.0 > limits.1 {
                return Err(malformed(property));
            }
        }
        if !(self.spring_stiffness.is_finite() && self.spring_stiffness >= 0.0) {
            return Err(malformed("spring stiffness"));
        }
        if !(self.damping.is_finite() && self.damping >= 0.0) {
            return Err(malformed("damping"));
        }
        if !self.rest_position.is_finite() {
            return Err(malformed("rest position"));
        }
        Ok(())
    }
}

/// A single generalized coordinate of a skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeOfFreedom {
    pub(crate) name: String,
    /// Index in the generalized coordinate vectors
    pub(crate) index: usize,
    /// Body whose parent joint owns the coordinate
    pub(crate) body: ArenaIndex,
    pub(crate) index_in_joint: usize,
    pub(crate) properties: DofProperties,
}

impl DegreeOfFreedom {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn body(&self) -> ArenaIndex {
        self.body
    }

    pub fn index_in_joint(&self) -> usize {
        self.index_in_joint
    }

    pub fn properties(&self) -> &DofProperties {
        &self.properties
    }

    pub fn position_limits(&self) -> (f64, f64) {
        self.properties.position_limits
    }

    pub fn velocity_limits(&self) -> (f64, f64) {
        self.properties.velocity_limits
    }

    pub fn force_limits(&self) -> (f64, f64) {
        self.properties.force_limits
    }

    /// Signed distance of a position outside the limits (zero when within)
    pub fn position_violation(&self, position: f64) -> f64 {
        violation(position, self.properties.position_limits)
    }

    /// Signed distance of a velocity outside the limits (zero when within)
    pub fn velocity_violation(&self, velocity: f64) -> f64 {
        violation(velocity, self.properties.velocity_limits)
    }

    pub fn is_position_within_limits(&self, position: f64) -> bool {
        self.position_violation(position) == 0.0
    }

    pub fn is_velocity_within_limits(&self, velocity: f64) -> bool {
        self.velocity_violation(velocity) == 0.0
    }

    pub fn clamp_force(&self, force: f64) -> f64 {
        let (lower, upper) = self.properties.force_limits;
        force.clamp(lower, upper)
    }

    /// Spring (`-k(q - q_rest)`) and damper (`-c q̇`) force
    pub fn passive_force(&self, position: f64, velocity: f64) -> f64 {
        -self.properties.spring_stiffness * (position - self.properties.rest_position)
            - self.properties.damping * velocity
    }

    /// Potential energy stored in the spring
    pub fn spring_energy(&self, position: f64) -> f64 {
        let displacement = position - self.properties.rest_position;
        0.5 * self.properties.spring_stiffness * displacement * displacement
    }
}

fn violation(value: f64, (lower, upper): (f64, f64)) -> f64 {
    if value < lower {
        value - lower
    } else if value > upper {
        value - upper
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dof(properties: DofProperties) -> DegreeOfFreedom {
        DegreeOfFreedom {
            name: "q".into(),
            index: 0,
            body: ArenaIndex(0),
            index_in_joint: 0,
            properties,
        }
    }

    #[test]
    fn test_limits() {
        let q = dof(DofProperties::default()
            .with_position_limits(-1.0, 2.0)
            .with_force_limits(-5.0, 5.0));
        assert_eq!(q.position_violation(0.0), 0.0);
        assert_eq!(q.position_violation(2.5), 0.5);
        assert_eq!(q.position_violation(-1.5), -0.5);
        assert!(q.is_velocity_within_limits(1e9));
        assert_eq!(q.clamp_force(7.0), 5.0);
    }

    #[test]
    fn test_passive_force() {
        let q = dof(DofProperties::default().with_spring(10.0, 0.5).with_damping(2.0));
        assert_eq!(q.passive_force(1.0, 0.0), -5.0);
        assert_eq!(q.passive_force(0.5, 1.0), -2.0);
        assert_eq!(q.spring_energy(1.5), 5.0);
    }

    #[test]
    fn test_validate() {
        assert!(DofProperties::default().validate("j").is_ok());
        assert!(matches!(
            DofProperties::default().with_position_limits(1.0, -1.0).validate("j"),
            Err(DynamicsError::MissingProperty { .. })
        ));
        assert!(DofProperties::default().with_damping(-1.0).validate("j").is_err());
    }
}

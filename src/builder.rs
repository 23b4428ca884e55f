//! Construction of a [Skeleton] from name-keyed body and joint records, the way model loaders
//! emit them: bodies first, then joints naming their parent and child body.

use crate::body::{BodyIndex, BodyProperties};
use crate::joint::JointProperties;
use crate::skeleton::Skeleton;
use crate::DynamicsError;
use itertools::Itertools;
use nalgebra::Vector3;
use std::collections::HashMap;
use tracing::debug;
use tracing_attributes::instrument;

/// Joint record connecting a child body to a parent body (or the world)
#[derive(Debug, Clone, PartialEq)]
pub struct JointRecord {
    pub properties: JointProperties,
    pub parent: Option<String>,
    pub child: String,
}

/// Validates loader output and builds a skeleton with degrees of freedom numbered depth-first
/// in emission order: roots in the order of their joints, children in the order of their
/// joints.
#[derive(Debug, Clone, Default)]
pub struct SkeletonBuilder {
    name: String,
    bodies: Vec<BodyProperties>,
    joints: Vec<JointRecord>,
    gravity: Option<Vector3<f64>>,
    self_collision: Option<bool>,
}

impl SkeletonBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        SkeletonBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: BodyProperties) -> Self {
        self.bodies.push(body);
        self
    }

    /// Connects `child` to `parent` (or the world if `None`)
    pub fn with_joint(mut self, joint: JointProperties, parent: Option<&str>, child: &str) -> Self {
        self.joints.push(JointRecord {
            properties: joint,
            parent: parent.map(str::to_string),
            child: child.to_string(),
        });
        self
    }

    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = Some(gravity);
        self
    }

    /// See [Skeleton::enable_self_collision]
    pub fn with_self_collision(mut self, adjacent_bodies: bool) -> Self {
        self.self_collision = Some(adjacent_bodies);
        self
    }

    pub fn add_body(&mut self, body: BodyProperties) -> &mut Self {
        self.bodies.push(body);
        self
    }

    pub fn add_joint(&mut self, joint: JointProperties, parent: Option<&str>, child: &str) -> &mut Self {
        self.joints.push(JointRecord {
            properties: joint,
            parent: parent.map(str::to_string),
            child: child.to_string(),
        });
        self
    }

    /// Checks that bodies are unique, joints reference known bodies and every body has exactly
    /// one parent joint
    fn validate_records(&self) -> Result<(), DynamicsError> {
        if let Some(duplicate) = self.bodies.iter().map(|body| body.name.as_str()).duplicates().next() {
            return Err(DynamicsError::NotUnique(duplicate.to_string()));
        }
        let known = |name: &str| self.bodies.iter().any(|body| body.name == name);
        let mut joints = HashMap::new();
        for record in &self.joints {
            if !known(&record.child) {
                return Err(DynamicsError::UnknownNode(record.child.clone()));
            }
            if let Some(parent) = &record.parent {
                if !known(parent) {
                    return Err(DynamicsError::MissingParent {
                        child: record.child.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            if joints.insert(record.child.as_str(), record).is_some() {
                return Err(DynamicsError::NotUnique(format!(
                    "parent joint of '{}'",
                    record.child
                )));
            }
        }
        if let Some(orphan) = self.bodies.iter().find(|body| !joints.contains_key(body.name.as_str())) {
            return Err(DynamicsError::MissingProperty {
                owner: orphan.name.clone(),
                property: "parent joint".to_string(),
            });
        }
        Ok(())
    }

    /// Joint records in depth-first emission order
    fn emission_order(&self) -> Result<Vec<&JointRecord>, DynamicsError> {
        self.validate_records()?;
        let children = |parent: Option<&str>| {
            self.joints
                .iter()
                .filter(move |record| record.parent.as_deref() == parent)
                .collect_vec()
        };

        let mut order = Vec::with_capacity(self.bodies.len());
        let mut stack = children(None);
        stack.reverse();
        while let Some(record) = stack.pop() {
            order.push(record);
            let mut below = children(Some(record.child.as_str()));
            below.reverse();
            stack.extend(below);
        }

        // bodies not reachable from the world form a cycle
        let reached = order.iter().map(|record| record.child.as_str()).collect_vec();
        if let Some(record) = self
            .joints
            .iter()
            .find(|record| !reached.contains(&record.child.as_str()))
        {
            return Err(DynamicsError::Cycle {
                node: record.child.clone(),
                parent: record.parent.clone().unwrap_or_default(),
            });
        }
        Ok(order)
    }

    /// Validates the records and creates the skeleton. Nothing is created if any record is
    /// invalid.
    #[instrument(skip(self), fields(skeleton = %self.name))]
    pub fn build(&self) -> Result<Skeleton, DynamicsError> {
        let order = self.emission_order()?;
        let mut skeleton = Skeleton::new(self.name.clone());
        if let Some(gravity) = self.gravity {
            skeleton.set_gravity(gravity);
        }
        let mut indices: HashMap<&str, BodyIndex> = HashMap::new();
        for record in order {
            let parent = match record.parent.as_deref() {
                Some(parent) => Some(indices.get(parent).copied().ok_or_else(|| {
                    DynamicsError::MissingParent {
                        child: record.child.clone(),
                        parent: parent.to_string(),
                    }
                })?),
                None => None,
            };
            let body = self
                .bodies
                .iter()
                .find(|body| body.name == record.child)
                .cloned()
                .ok_or_else(|| DynamicsError::UnknownNode(record.child.clone()))?;
            let index = skeleton.add_body(parent, record.properties.clone(), body)?;
            indices.insert(record.child.as_str(), index);
        }
        if let Some(adjacent) = self.self_collision {
            skeleton.enable_self_collision(adjacent);
        }
        debug!(bodies = skeleton.body_count(), dofs = skeleton.dof_count(), "built skeleton");
        Ok(skeleton)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inertia::Inertia;
    use crate::joint::JointKind;

    fn body(name: &str) -> BodyProperties {
        BodyProperties::new(name, Inertia::default())
    }

    fn hinge(name: &str) -> JointProperties {
        JointProperties::new(name, JointKind::revolute(Vector3::z()))
    }

    #[test_log::test]
    fn test_emission_order() {
        // records arrive in arbitrary order
        let skeleton = SkeletonBuilder::new("forest")
            .with_body(body("hand"))
            .with_body(body("board"))
            .with_body(body("arm"))
            .with_body(body("torso"))
            .with_body(body("leg"))
            .with_joint(hinge("wrist"), Some("arm"), "hand")
            .with_joint(JointProperties::new("root", JointKind::Free), None, "torso")
            .with_joint(hinge("shoulder"), Some("torso"), "arm")
            .with_joint(JointProperties::new("board_root", JointKind::Free), None, "board")
            .with_joint(hinge("hip"), Some("torso"), "leg")
            .with_self_collision(false)
            .build()
            .unwrap();
        let names = skeleton.bodies().map(|b| b.name().to_string()).collect_vec();
        assert_eq!(names, vec!["torso", "arm", "hand", "leg", "board"]);
        assert_eq!(skeleton.roots().len(), 2);
        assert_eq!(skeleton.dof_count(), 6 + 1 + 1 + 1 + 6);
        assert_eq!(skeleton.dof_index("wrist"), Some(7));
        assert!(skeleton.is_self_collision_enabled());
    }

    #[test_log::test]
    fn test_incremental_records() {
        let mut builder = SkeletonBuilder::new("loader");
        for name in ["tip", "base", "middle"] {
            builder.add_body(body(name));
        }
        builder
            .add_joint(hinge("j2"), Some("middle"), "tip")
            .add_joint(hinge("j0"), None, "base");
        // incomplete records are rejected
        assert!(matches!(builder.build(), Err(DynamicsError::MissingProperty { .. })));

        builder.add_joint(hinge("j1"), Some("base"), "middle");
        let skeleton = builder.build().unwrap();
        let names = skeleton.bodies().map(|b| b.name().to_string()).collect_vec();
        assert_eq!(names, vec!["base", "middle", "tip"]);
        assert_eq!(skeleton.dof_index("j2"), Some(2));
    }

    #[test_log::test]
    fn test_invalid_records() {
        let base = SkeletonBuilder::new("s")
            .with_body(body("a"))
            .with_body(body("b"))
            .with_joint(hinge("ja"), None, "a");

        assert_eq!(
            base.clone().with_body(body("a")).build().map(|_| ()),
            Err(DynamicsError::NotUnique("a".into()))
        );
        assert_eq!(
            base.clone().with_joint(hinge("jb"), Some("z"), "b").build().map(|_| ()),
            Err(DynamicsError::MissingParent {
                child: "b".into(),
                parent: "z".into()
            })
        );
        assert_eq!(
            base.clone().with_joint(hinge("jx"), Some("a"), "x").build().map(|_| ()),
            Err(DynamicsError::UnknownNode("x".into()))
        );
        assert!(matches!(
            base.clone().build(),
            Err(DynamicsError::MissingProperty { .. })
        ));
        assert!(matches!(
            base.clone()
                .with_joint(hinge("jb"), Some("a"), "b")
                .with_joint(hinge("jb2"), None, "b")
                .build(),
            Err(DynamicsError::NotUnique(_))
        ));

        let cyclic = SkeletonBuilder::new("cycle")
            .with_body(body("a"))
            .with_body(body("b"))
            .with_body(body("c"))
            .with_joint(hinge("ja"), None, "a")
            .with_joint(hinge("jb"), Some("c"), "b")
            .with_joint(hinge("jc"), Some("b"), "c");
        assert!(matches!(cyclic.build(), Err(DynamicsError::Cycle { .. })));
    }
}

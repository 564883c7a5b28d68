//! Roles, actions, and the authorization check.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Identity, Result};

/// A privilege held by an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The single account that created the registry.
    Owner,
    /// The account assigned to a course when it was created.
    Instructor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => f.write_str("registry owner"),
            Role::Instructor => f.write_str("course's instructor"),
        }
    }
}

/// A mutating registry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateCourse,
    EnrollStudent,
    PostGrade,
}

impl Action {
    /// The role a caller must hold to perform this action.
    pub fn required_role(self) -> Role {
        match self {
            Action::CreateCourse => Role::Owner,
            Action::EnrollStudent | Action::PostGrade => Role::Instructor,
        }
    }
}

/// Who holds each role for the entity an action touches.
#[derive(Debug, Clone, Copy)]
pub struct Grants<'a> {
    pub owner: &'a Identity,
    /// `None` when the action does not target an existing course.
    pub instructor: Option<&'a Identity>,
}

impl<'a> Grants<'a> {
    /// Grants for registry-wide actions.
    pub fn registry(owner: &'a Identity) -> Self {
        Self {
            owner,
            instructor: None,
        }
    }

    /// Grants for actions on a specific course.
    pub fn for_course(owner: &'a Identity, instructor: &'a Identity) -> Self {
        Self {
            owner,
            instructor: Some(instructor),
        }
    }

    /// Whether `caller` holds `role` under these grants.
    pub fn holds(&self, caller: &Identity, role: Role) -> bool {
        match role {
            Role::Owner => caller == self.owner,
            Role::Instructor => self.instructor.is_some_and(|i| i == caller),
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { required: Role },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turn a denial into [`Error::Unauthorized`] naming `caller`.
    pub fn require(self, caller: &Identity) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny { required } => Err(Error::Unauthorized {
                caller: caller.clone(),
                required,
            }),
        }
    }
}

/// Check whether `caller` may perform `action` under `grants`.
///
/// Pure: the outcome depends only on the arguments. Roles do not nest, so the
/// owner is denied instructor actions on courses it does not teach.
pub fn authorize(action: Action, caller: &Identity, grants: &Grants<'_>) -> Decision {
    let required = action.required_role();
    if grants.holds(caller, required) {
        Decision::Allow
    } else {
        Decision::Deny { required }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn test_only_owner_creates_courses() {
        let owner = id("0xowner");
        let grants = Grants::registry(&owner);

        assert!(authorize(Action::CreateCourse, &owner, &grants).is_allowed());
        assert_eq!(
            authorize(Action::CreateCourse, &id("0xother"), &grants),
            Decision::Deny {
                required: Role::Owner
            }
        );
    }

    #[test]
    fn test_owner_is_not_an_instructor() {
        let owner = id("0xowner");
        let prof = id("0xprof");
        let grants = Grants::for_course(&owner, &prof);

        for action in [Action::EnrollStudent, Action::PostGrade] {
            assert!(authorize(action, &prof, &grants).is_allowed());
            assert_eq!(
                authorize(action, &owner, &grants),
                Decision::Deny {
                    required: Role::Instructor
                }
            );
        }
    }

    #[test]
    fn test_owner_teaching_own_course() {
        let owner = id("0xowner");
        let grants = Grants::for_course(&owner, &owner);
        assert!(authorize(Action::EnrollStudent, &owner, &grants).is_allowed());
    }

    #[test]
    fn test_instructor_actions_without_course_are_denied() {
        let owner = id("0xowner");
        let grants = Grants::registry(&owner);
        assert!(!authorize(Action::PostGrade, &owner, &grants).is_allowed());
    }

    #[test]
    fn test_require_names_caller() {
        let owner = id("0xowner");
        let stranger = id("0xstranger");
        let err = authorize(Action::CreateCourse, &stranger, &Grants::registry(&owner))
            .require(&stranger)
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "unauthorized account 0xstranger: only the registry owner may perform this action"
        );
    }

    #[test]
    fn test_parse_action_names() {
        let action: Action = serde_json::from_str("\"post_grade\"").unwrap();
        assert_eq!(action, Action::PostGrade);
        assert_eq!(action.required_role(), Role::Instructor);
    }
}

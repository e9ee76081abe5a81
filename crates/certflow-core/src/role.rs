//! # Roles and Actors
//!
//! The organisational roles that participate in approval chains, and the
//! [`Actor`] value every guarded operation receives.
//!
//! Roles are client-supplied. The engine trusts them and only checks that
//! the supplied role matches what the current stage requires.

use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Organisational role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular employee; applicant of most processes.
    Employee,
    /// Training engineer; runs reviews and assessments for the department.
    TrainingAdmin,
    /// Member of an assessment panel.
    Assessor,
    /// Section chief.
    SectionChief,
    /// Department manager.
    DeptManager,
    /// Vice president; final sign-off on position revocations.
    VicePresident,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::TrainingAdmin => "training_admin",
            Self::Assessor => "assessor",
            Self::SectionChief => "section_chief",
            Self::DeptManager => "dept_manager",
            Self::VicePresident => "vice_president",
        }
    }

    /// Whether this role sees every process of its own department.
    pub fn has_department_scope(&self) -> bool {
        matches!(
            self,
            Self::TrainingAdmin | Self::SectionChief | Self::DeptManager
        )
    }

    /// Whether this role sees processes of every department.
    pub fn has_organisation_scope(&self) -> bool {
        matches!(self, Self::VicePresident)
    }

    /// Whether this role may assign work to its department's staff.
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::SectionChief | Self::DeptManager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user performing an operation, with the role they act under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub user_id: UserId,
    /// The role the user acts under.
    pub role: Role,
    /// The user's department.
    pub department: String,
}

impl Actor {
    /// Create an actor.
    pub fn new(user_id: UserId, role: Role, department: impl Into<String>) -> Self {
        Self {
            user_id,
            role,
            department: department.into(),
        }
    }
}

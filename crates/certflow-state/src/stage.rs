//! # Workflow Kinds, Variants and Stages
//!
//! Every approval chain in the system is one [`WorkflowKind`] started under
//! one [`Variant`]. Its position in the chain is a [`Stage`]. All kinds share
//! one stage vocabulary; which stages a process visits, and in which order,
//! is decided by the route table in [`crate::graph`].

use serde::{Deserialize, Serialize};

/// A family of approval workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// MTA (skill) authorisation.
    MtaAuthorization,
    /// Position qualification.
    PositionQualification,
    /// Position development plan.
    PositionPlan,
    /// Work authorisation.
    WorkAuthorization,
    /// On-the-job training guidance sheet.
    TrainingGuidance,
    /// Withdrawal of a held position, signed off up to the VP.
    PositionRevocation,
}

impl WorkflowKind {
    /// All workflow kinds, in declaration order.
    pub const ALL: [WorkflowKind; 6] = [
        Self::MtaAuthorization,
        Self::PositionQualification,
        Self::PositionPlan,
        Self::WorkAuthorization,
        Self::TrainingGuidance,
        Self::PositionRevocation,
    ];

    /// Return the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MtaAuthorization => "mta_authorization",
            Self::PositionQualification => "position_qualification",
            Self::PositionPlan => "position_plan",
            Self::WorkAuthorization => "work_authorization",
            Self::TrainingGuidance => "training_guidance",
            Self::PositionRevocation => "position_revocation",
        }
    }

    /// Prefix used in certificate numbers issued for this kind. `None` for
    /// kinds that never lead to a certificate.
    pub fn certificate_prefix(&self) -> Option<&'static str> {
        match self {
            Self::MtaAuthorization => Some("MC"),
            Self::PositionQualification => Some("PC"),
            Self::WorkAuthorization => Some("WC"),
            Self::PositionPlan | Self::TrainingGuidance => Some("TC"),
            Self::PositionRevocation => None,
        }
    }

    /// Template key under which certificates of this kind name their
    /// subject, e.g. `{{workName}}`.
    pub fn subject_variable(&self) -> &'static str {
        match self {
            Self::MtaAuthorization => "mtaName",
            Self::PositionQualification | Self::PositionRevocation => "positionName",
            Self::WorkAuthorization => "workName",
            Self::PositionPlan => "planName",
            Self::TrainingGuidance => "guidanceName",
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a process was started within its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// First-time application.
    Apply,
    /// Recognition of an equivalent existing qualification.
    Equivalent,
    /// Extension of an existing qualification.
    Extend,
    /// Assessment of externally hired or transferred staff.
    Assessment,
}

impl Variant {
    /// Return the string representation of this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Equivalent => "equivalent",
            Self::Extend => "extend",
            Self::Assessment => "assessment",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position in an approval chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The applicant fills in and signs the request.
    ApplicantSubmission,
    /// The employee fills in the guidance sheet.
    EmployeeFill,
    /// The mentor countersigns.
    MentorSign,
    /// Training engineer review.
    TrainingEngineerReview,
    /// Panel assessment; advanced by the assessment conclusion.
    Assessment,
    /// Section chief review.
    SectionChiefReview,
    /// Department manager review.
    DeptManagerReview,
    /// Final sign-off by the vice president.
    VpSignOff,
    /// Every stage approved (terminal).
    Completed,
    /// Rejected at some stage (terminal).
    Rejected,
}

impl Stage {
    /// Whether this stage is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// Whether entering this stage spawns an assessment.
    pub fn bears_assessment(&self) -> bool {
        matches!(self, Self::Assessment)
    }

    /// Return the string representation of this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicantSubmission => "applicant_submission",
            Self::EmployeeFill => "employee_fill",
            Self::MentorSign => "mentor_sign",
            Self::TrainingEngineerReview => "training_engineer_review",
            Self::Assessment => "assessment",
            Self::SectionChiefReview => "section_chief_review",
            Self::DeptManagerReview => "dept_manager_review",
            Self::VpSignOff => "vp_sign_off",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision taken at a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Advance to the next stage of the route.
    Approve,
    /// Move to the `rejected` terminal.
    Reject,
    /// A leader created the process already approved. Only ever recorded
    /// in history; no route edge carries it.
    Assign,
}

impl Action {
    /// Return the string representation of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Assign => "assign",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! # Stage Graphs
//!
//! One declarative table describes every approval chain. Each
//! `(kind, variant)` pair owns a [`Route`]: the ordered stages an approve
//! walks through, and for each stage whether a reject edge leaves it.
//!
//! ```text
//! step₀ ──approve──▶ step₁ ──approve──▶ … ──approve──▶ step_n ──approve──▶ completed
//!   │                  │                                 │
//!   └──reject──▶ rejected ◀──reject──┘ … ◀──reject───────┘   (rejectable steps only)
//! ```
//!
//! The first step is the initial stage. Routes listed in [`ASSIGNABLE`]
//! may also be created already completed by a leader's assignment. Adding a workflow kind or variant
//! means adding one row to [`ROUTES`]; neither the state machine nor the
//! guard changes.

use crate::stage::{Action, Stage, Variant, WorkflowKind};

/// One step of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteStep {
    /// The stage.
    pub stage: Stage,
    /// Whether a reject edge leaves this stage.
    pub rejectable: bool,
}

/// The approve chain of one `(kind, variant)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// The workflow kind.
    pub kind: WorkflowKind,
    /// The variant within the kind.
    pub variant: Variant,
    /// Non-terminal steps in approve order.
    pub steps: &'static [RouteStep],
}

const fn review(stage: Stage) -> RouteStep {
    RouteStep {
        stage,
        rejectable: true,
    }
}

const fn submission(stage: Stage) -> RouteStep {
    RouteStep {
        stage,
        rejectable: false,
    }
}

const REVIEW_WITH_ASSESSMENT: &[RouteStep] = &[
    review(Stage::TrainingEngineerReview),
    review(Stage::Assessment),
    review(Stage::SectionChiefReview),
    review(Stage::DeptManagerReview),
];

const CHIEF_AND_MANAGER: &[RouteStep] = &[
    review(Stage::SectionChiefReview),
    review(Stage::DeptManagerReview),
];

const ENGINEER_CHIEF_MANAGER: &[RouteStep] = &[
    review(Stage::TrainingEngineerReview),
    review(Stage::SectionChiefReview),
    review(Stage::DeptManagerReview),
];

/// Every known route.
pub static ROUTES: &[Route] = &[
    Route {
        kind: WorkflowKind::MtaAuthorization,
        variant: Variant::Apply,
        steps: REVIEW_WITH_ASSESSMENT,
    },
    Route {
        kind: WorkflowKind::MtaAuthorization,
        variant: Variant::Equivalent,
        steps: ENGINEER_CHIEF_MANAGER,
    },
    Route {
        kind: WorkflowKind::MtaAuthorization,
        variant: Variant::Extend,
        steps: CHIEF_AND_MANAGER,
    },
    Route {
        kind: WorkflowKind::PositionQualification,
        variant: Variant::Apply,
        steps: REVIEW_WITH_ASSESSMENT,
    },
    Route {
        kind: WorkflowKind::PositionQualification,
        variant: Variant::Equivalent,
        steps: &[
            submission(Stage::ApplicantSubmission),
            review(Stage::SectionChiefReview),
            review(Stage::DeptManagerReview),
        ],
    },
    Route {
        kind: WorkflowKind::PositionQualification,
        variant: Variant::Extend,
        steps: CHIEF_AND_MANAGER,
    },
    Route {
        kind: WorkflowKind::PositionQualification,
        variant: Variant::Assessment,
        steps: &[
            review(Stage::TrainingEngineerReview),
            review(Stage::Assessment),
            review(Stage::DeptManagerReview),
        ],
    },
    Route {
        kind: WorkflowKind::PositionPlan,
        variant: Variant::Apply,
        steps: ENGINEER_CHIEF_MANAGER,
    },
    Route {
        kind: WorkflowKind::WorkAuthorization,
        variant: Variant::Apply,
        steps: &[
            review(Stage::Assessment),
            review(Stage::SectionChiefReview),
            review(Stage::DeptManagerReview),
        ],
    },
    Route {
        kind: WorkflowKind::TrainingGuidance,
        variant: Variant::Apply,
        steps: &[
            submission(Stage::EmployeeFill),
            review(Stage::MentorSign),
            review(Stage::TrainingEngineerReview),
            review(Stage::DeptManagerReview),
        ],
    },
    Route {
        kind: WorkflowKind::PositionRevocation,
        variant: Variant::Apply,
        steps: &[
            submission(Stage::ApplicantSubmission),
            review(Stage::DeptManagerReview),
            review(Stage::VpSignOff),
        ],
    },
];

/// Routes a leader may assign directly, skipping the approve chain.
pub static ASSIGNABLE: &[(WorkflowKind, Variant)] =
    &[(WorkflowKind::PositionPlan, Variant::Apply)];

/// Look up the route for a `(kind, variant)` pair.
pub fn route(kind: WorkflowKind, variant: Variant) -> Option<&'static Route> {
    ROUTES
        .iter()
        .find(|r| r.kind == kind && r.variant == variant)
}

impl Route {
    /// The stage a new process starts in.
    pub fn initial_stage(&self) -> Stage {
        self.steps.first().map_or(Stage::Completed, |s| s.stage)
    }

    /// Follow the edge `(from, action)`. `None` when no such edge exists.
    pub fn next(&self, from: Stage, action: Action) -> Option<Stage> {
        if from.is_terminal() {
            return None;
        }
        let idx = self.position(from)?;
        match action {
            Action::Approve => Some(
                self.steps
                    .get(idx + 1)
                    .map_or(Stage::Completed, |s| s.stage),
            ),
            Action::Reject => self.steps[idx].rejectable.then_some(Stage::Rejected),
            Action::Assign => None,
        }
    }

    /// Whether a leader may create this route's processes already approved.
    pub fn is_assignable(&self) -> bool {
        ASSIGNABLE.contains(&(self.kind, self.variant))
    }

    /// Index of `stage` in this route.
    pub fn position(&self, stage: Stage) -> Option<usize> {
        self.steps.iter().position(|s| s.stage == stage)
    }

    /// Whether any step of this route is an assessment stage.
    pub fn has_assessment(&self) -> bool {
        self.steps.iter().any(|s| s.stage.bears_assessment())
    }

    /// Every stage reachable on this route, terminals included.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.steps
            .iter()
            .map(|s| s.stage)
            .chain([Stage::Completed, Stage::Rejected])
    }
}

//! # Process State Machine
//!
//! One [`Process`] is one instance of an approval workflow moving through
//! the stages of its route. Every mutation goes through a guarded method:
//!
//! 1. the edge `(current_stage, action)` must exist on the route, else
//!    [`ProcessError::InvalidTransition`];
//! 2. the actor must pass the stage guard, else
//!    [`ProcessError::Unauthorized`];
//! 3. the transition is appended to the history and the stage moves.
//!
//! Terminal stages have no outgoing edges, so nothing leaves `completed` or
//! `rejected`. A leader may instead [assign](Process::assign) an assignable
//! route, which creates the process already completed with a single
//! `assign` history entry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use certflow_core::{Actor, ProcessId, Role, Timestamp, UserId};

use crate::graph::{self, Route};
use crate::guard::{self, Authorization, Unauthorized};
use crate::stage::{Action, Stage, Variant, WorkflowKind};

// ─── Status ──────────────────────────────────────────────────────────

/// Coarse outcome of a process, derived from its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Not yet in a terminal stage.
    InProgress,
    /// Reached `completed`.
    Approved,
    /// Reached `rejected`.
    Rejected,
}

impl ProcessStatus {
    /// The status implied by `stage`.
    pub fn of(stage: Stage) -> Self {
        match stage {
            Stage::Completed => Self::Approved,
            Stage::Rejected => Self::Rejected,
            _ => Self::InProgress,
        }
    }

    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who started a process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessSource {
    /// The owner applied and the process walks its route.
    #[default]
    Applicant,
    /// A leader assigned it; the approve chain was skipped.
    LeaderAssign,
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by the process state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// No route exists for the `(kind, variant)` pair.
    #[error("workflow {kind} has no variant {variant}")]
    InvalidVariant {
        /// The workflow kind.
        kind: WorkflowKind,
        /// The requested variant.
        variant: Variant,
    },

    /// No `(stage, action)` edge exists on the process's route.
    #[error("process {process_id} cannot {action} at stage {stage}")]
    InvalidTransition {
        /// The process.
        process_id: ProcessId,
        /// The stage the process is in.
        stage: Stage,
        /// The attempted action.
        action: Action,
    },

    /// The actor failed the stage guard.
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),

    /// The process is terminal and its details are frozen.
    #[error("process {process_id} is in terminal stage {stage}")]
    TerminalState {
        /// The process.
        process_id: ProcessId,
        /// The terminal stage.
        stage: Stage,
    },
}

// ─── Context and History ─────────────────────────────────────────────

/// Optional data supplied when a process is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessContext {
    /// Department the process belongs to. Empty means "the owner's".
    pub department: String,
    /// Entity the request derives from (e.g. the qualification being
    /// extended or recognised as equivalent).
    pub source_entity_id: Option<String>,
    /// Mentor who countersigns, for kinds with a mentor stage.
    pub mentor_id: Option<UserId>,
    /// Free-text justification.
    pub reason: Option<String>,
    /// Requested extension length, for `extend` requests.
    pub extension_months: Option<u32>,
}

/// Fields an owner may amend while the process is still open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessAmendment {
    /// Replace the justification.
    pub reason: Option<String>,
    /// Replace the requested extension length.
    pub extension_months: Option<u32>,
    /// Replace the source entity.
    pub source_entity_id: Option<String>,
}

/// Record of one stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransitionRecord {
    /// Stage before the transition.
    pub from_stage: Stage,
    /// Stage after the transition.
    pub to_stage: Stage,
    /// The action taken.
    pub action: Action,
    /// Who acted.
    pub actor_id: UserId,
    /// The role the actor presented.
    pub actor_role: Role,
    /// Participant the actor stood in for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_for: Option<String>,
    /// Reviewer comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the transition occurred.
    pub timestamp: Timestamp,
}

// ─── Process ─────────────────────────────────────────────────────────

/// One workflow instance and its transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    /// Unique identifier.
    pub id: ProcessId,
    /// The applicant.
    pub owner_id: UserId,
    /// Department that reviews the process.
    pub department: String,
    /// Workflow family.
    pub kind: WorkflowKind,
    /// How the process was started.
    pub variant: Variant,
    /// The MTA, position, work definition or plan the request targets.
    pub target_entity_id: String,
    /// Entity the request derives from.
    #[serde(default)]
    pub source_entity_id: Option<String>,
    /// Who started the process.
    #[serde(default)]
    pub source: ProcessSource,
    /// Mentor, for kinds with a mentor stage.
    #[serde(default)]
    pub mentor_id: Option<UserId>,
    /// Applicant's justification.
    #[serde(default)]
    pub reason: Option<String>,
    /// Requested extension length in months.
    #[serde(default)]
    pub extension_months: Option<u32>,
    /// Current stage.
    pub current_stage: Stage,
    /// Derived from `current_stage`; stored for readers of the raw record.
    pub status: ProcessStatus,
    /// Ordered transition log.
    #[serde(default)]
    pub history: Vec<StageTransitionRecord>,
    /// Comment left by the reviewer who rejected the process.
    #[serde(default)]
    pub improvement_suggestion: Option<String>,
    /// Incremented on every mutation.
    #[serde(default)]
    pub revision: u64,
    /// When the process was created.
    pub created_at: Timestamp,
    /// When the process last changed.
    pub updated_at: Timestamp,
}

impl Process {
    /// Create a process at the initial stage of its `(kind, variant)` route.
    pub fn create(
        kind: WorkflowKind,
        variant: Variant,
        owner_id: UserId,
        target_entity_id: impl Into<String>,
        context: ProcessContext,
    ) -> Result<Self, ProcessError> {
        let route = graph::route(kind, variant).ok_or(ProcessError::InvalidVariant { kind, variant })?;
        let stage = route.initial_stage();
        let now = Timestamp::now();
        let process = Self {
            id: ProcessId::new(),
            owner_id,
            department: context.department,
            kind,
            variant,
            target_entity_id: target_entity_id.into(),
            source_entity_id: context.source_entity_id,
            source: ProcessSource::Applicant,
            mentor_id: context.mentor_id,
            reason: context.reason,
            extension_months: context.extension_months,
            current_stage: stage,
            status: ProcessStatus::of(stage),
            history: Vec::new(),
            improvement_suggestion: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        tracing::info!(
            process_id = %process.id,
            kind = %kind,
            variant = %variant,
            stage = %stage,
            owner = %process.owner_id,
            "process created"
        );
        Ok(process)
    }

    /// Create a process on behalf of `owner_id`, assigned by `leader` and
    /// completed on the spot.
    pub fn assign(
        kind: WorkflowKind,
        variant: Variant,
        owner_id: UserId,
        target_entity_id: impl Into<String>,
        context: ProcessContext,
        leader: &Actor,
        comment: Option<&str>,
    ) -> Result<Self, ProcessError> {
        let route = graph::route(kind, variant).ok_or(ProcessError::InvalidVariant { kind, variant })?;
        guard::authorize_assignment(route, &context.department, leader)?;
        let mut process = Self::create(kind, variant, owner_id, target_entity_id, context)?;
        process.source = ProcessSource::LeaderAssign;
        process.do_transition(
            Stage::Completed,
            Action::Assign,
            leader,
            Authorization::Direct,
            comment,
        );
        Ok(process)
    }

    /// The route this process follows.
    pub fn route(&self) -> Result<&'static Route, ProcessError> {
        graph::route(self.kind, self.variant).ok_or(ProcessError::InvalidVariant {
            kind: self.kind,
            variant: self.variant,
        })
    }

    /// The stage `action` would lead to, without checking the actor.
    pub fn next_stage(&self, action: Action) -> Result<Stage, ProcessError> {
        self.route()?
            .next(self.current_stage, action)
            .ok_or(ProcessError::InvalidTransition {
                process_id: self.id,
                stage: self.current_stage,
                action,
            })
    }

    /// Take `action` at the current stage as `actor` in person.
    ///
    /// Returns the new stage. A reject comment becomes the improvement
    /// suggestion.
    pub fn transition(
        &mut self,
        actor: &Actor,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Stage, ProcessError> {
        let to = self.next_stage(action)?;
        let authorization = guard::authorize(self, actor)?;
        Ok(self.do_transition(to, action, actor, authorization, comment))
    }

    /// Take `action` at the current stage as `actor` standing in for
    /// `delegated_for`. The delegation is recorded in the history.
    pub fn transition_on_behalf(
        &mut self,
        actor: &Actor,
        delegated_for: &str,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Stage, ProcessError> {
        let to = self.next_stage(action)?;
        let authorization = guard::authorize_on_behalf(self, actor, delegated_for)?;
        Ok(self.do_transition(to, action, actor, authorization, comment))
    }

    /// Apply an owner amendment. Only open processes can be amended.
    pub fn amend(&mut self, amendment: ProcessAmendment) -> Result<(), ProcessError> {
        if self.is_terminal() {
            return Err(ProcessError::TerminalState {
                process_id: self.id,
                stage: self.current_stage,
            });
        }
        if let Some(reason) = amendment.reason {
            self.reason = Some(reason);
        }
        if let Some(months) = amendment.extension_months {
            self.extension_months = Some(months);
        }
        if let Some(source) = amendment.source_entity_id {
            self.source_entity_id = Some(source);
        }
        self.touch();
        Ok(())
    }

    /// Whether the process is in a terminal stage.
    pub fn is_terminal(&self) -> bool {
        self.current_stage.is_terminal()
    }

    /// Whether the process sits at an assessment-bearing stage.
    pub fn at_assessment_stage(&self) -> bool {
        self.current_stage.bears_assessment()
    }

    fn do_transition(
        &mut self,
        to: Stage,
        action: Action,
        actor: &Actor,
        authorization: Authorization,
        comment: Option<&str>,
    ) -> Stage {
        let from = self.current_stage;
        let comment = comment.map(str::trim).filter(|c| !c.is_empty()).map(String::from);
        if action == Action::Reject {
            self.improvement_suggestion = comment.clone();
        }
        let delegated_for = authorization.delegated_for().map(String::from);
        tracing::info!(
            process_id = %self.id,
            from = %from,
            to = %to,
            action = %action,
            actor = %actor.user_id,
            role = %actor.role,
            delegated_for = delegated_for.as_deref(),
            "process transition"
        );
        self.history.push(StageTransitionRecord {
            from_stage: from,
            to_stage: to,
            action,
            actor_id: actor.user_id.clone(),
            actor_role: actor.role,
            delegated_for,
            comment,
            timestamp: Timestamp::now(),
        });
        self.current_stage = to;
        self.status = ProcessStatus::of(to);
        self.touch();
        to
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = Timestamp::now();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

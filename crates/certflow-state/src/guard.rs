//! # Role-Gated Transition Guard
//!
//! Maps `(kind, stage)` to the participant allowed to act there and checks
//! an [`Actor`] against it before the state machine mutates anything.
//!
//! Two tables drive the guard:
//!
//! - [`STAGE_ACTORS`]: who acts at each stage. Rows scoped to a kind win
//!   over kind-agnostic rows.
//! - [`DELEGATIONS`]: which role may stand in for an unavailable
//!   participant. Delegation is never implicit: the caller names the
//!   participant it acts for, and the resulting [`Authorization::Delegated`]
//!   is written into the transition history.
//!
//! Assignment, where a leader creates a process already approved, is
//! checked separately by [`authorize_assignment`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use certflow_core::{Actor, Role};

use crate::graph::Route;
use crate::process::Process;
use crate::stage::{Stage, WorkflowKind};

/// The participant required to act at a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "role")]
pub enum StageActor {
    /// The process owner (applicant).
    Owner,
    /// The mentor named on the process.
    Mentor,
    /// Anyone holding the role.
    Role(Role),
}

impl std::fmt::Display for StageActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => f.write_str("owner"),
            Self::Mentor => f.write_str("mentor"),
            Self::Role(role) => f.write_str(role.as_str()),
        }
    }
}

/// One row of the stage-actor table.
#[derive(Debug, Clone, Copy)]
pub struct StageActorRule {
    /// Restrict the row to one kind; `None` applies to every kind.
    pub kind: Option<WorkflowKind>,
    /// The stage.
    pub stage: Stage,
    /// Who acts there.
    pub actor: StageActor,
}

/// Who acts at each stage.
pub static STAGE_ACTORS: &[StageActorRule] = &[
    StageActorRule {
        kind: None,
        stage: Stage::ApplicantSubmission,
        actor: StageActor::Owner,
    },
    StageActorRule {
        kind: None,
        stage: Stage::EmployeeFill,
        actor: StageActor::Owner,
    },
    StageActorRule {
        kind: None,
        stage: Stage::MentorSign,
        actor: StageActor::Mentor,
    },
    StageActorRule {
        kind: None,
        stage: Stage::TrainingEngineerReview,
        actor: StageActor::Role(Role::TrainingAdmin),
    },
    StageActorRule {
        kind: None,
        stage: Stage::Assessment,
        actor: StageActor::Role(Role::TrainingAdmin),
    },
    StageActorRule {
        kind: None,
        stage: Stage::SectionChiefReview,
        actor: StageActor::Role(Role::SectionChief),
    },
    StageActorRule {
        kind: None,
        stage: Stage::DeptManagerReview,
        actor: StageActor::Role(Role::DeptManager),
    },
    StageActorRule {
        kind: Some(WorkflowKind::PositionRevocation),
        stage: Stage::VpSignOff,
        actor: StageActor::Role(Role::VicePresident),
    },
];

/// A role allowed to act on behalf of a participant.
#[derive(Debug, Clone, Copy)]
pub struct Delegation {
    /// The participant who may be stood in for.
    pub participant: StageActor,
    /// The role that may stand in.
    pub delegate: Role,
}

/// Permitted stand-ins.
pub static DELEGATIONS: &[Delegation] = &[Delegation {
    participant: StageActor::Mentor,
    delegate: Role::TrainingAdmin,
}];

/// Outcome of a successful guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The actor is the required participant.
    Direct,
    /// The actor stands in for `delegated_for`.
    Delegated {
        /// The participant acted for.
        delegated_for: String,
    },
}

impl Authorization {
    /// The participant acted for, if delegated.
    pub fn delegated_for(&self) -> Option<&str> {
        match self {
            Self::Direct => None,
            Self::Delegated { delegated_for } => Some(delegated_for),
        }
    }
}

/// Why a guard check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The actor's role is not the one the stage requires.
    RoleMismatch,
    /// The stage requires a specific participant and the actor is not them.
    NotParticipant,
    /// The actor's role may not stand in for this participant.
    NotDelegable,
    /// The named participant is not the one this process expects.
    DelegationMismatch,
    /// Nobody acts at this stage.
    NoActor,
    /// Only section chiefs and department managers assign processes.
    NotLeader,
    /// The leader belongs to another department.
    ForeignDepartment,
    /// The route cannot be assigned.
    NotAssignable,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RoleMismatch => "role mismatch",
            Self::NotParticipant => "actor is not the required participant",
            Self::NotDelegable => "role may not act on behalf of this participant",
            Self::DelegationMismatch => "delegated participant does not match the process",
            Self::NoActor => "no participant acts at this stage",
            Self::NotLeader => "only a leader may assign",
            Self::ForeignDepartment => "leader belongs to another department",
            Self::NotAssignable => "this workflow cannot be assigned",
        };
        f.write_str(s)
    }
}

/// The actor may not act at the process's current stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{actor_role} may not act at stage {stage}: {reason}")]
pub struct Unauthorized {
    /// The stage the process is in.
    pub stage: Stage,
    /// Who the stage requires, if anyone.
    pub required: Option<StageActor>,
    /// The role the actor presented.
    pub actor_role: Role,
    /// Why the check failed.
    pub reason: DenialReason,
}

/// Who acts at `stage` of a `kind` process.
pub fn required_actor(kind: WorkflowKind, stage: Stage) -> Option<StageActor> {
    STAGE_ACTORS
        .iter()
        .find(|r| r.kind == Some(kind) && r.stage == stage)
        .or_else(|| {
            STAGE_ACTORS
                .iter()
                .find(|r| r.kind.is_none() && r.stage == stage)
        })
        .map(|r| r.actor)
}

/// Check that `actor` may act at the process's current stage in person.
pub fn authorize(process: &Process, actor: &Actor) -> Result<Authorization, Unauthorized> {
    let required = required_actor(process.kind, process.current_stage);
    let deny = |reason| Unauthorized {
        stage: process.current_stage,
        required,
        actor_role: actor.role,
        reason,
    };
    match required {
        None => Err(deny(DenialReason::NoActor)),
        Some(StageActor::Role(role)) if role == actor.role => Ok(Authorization::Direct),
        Some(StageActor::Role(_)) => Err(deny(DenialReason::RoleMismatch)),
        Some(StageActor::Owner) if process.owner_id == actor.user_id => Ok(Authorization::Direct),
        Some(StageActor::Mentor) if process.mentor_id.as_ref() == Some(&actor.user_id) => {
            Ok(Authorization::Direct)
        }
        Some(StageActor::Owner | StageActor::Mentor) => Err(deny(DenialReason::NotParticipant)),
    }
}

/// Check that `actor` may act at the current stage on behalf of
/// `delegated_for`.
///
/// When the process names the participant (e.g. a mentor id),
/// `delegated_for` must match it.
pub fn authorize_on_behalf(
    process: &Process,
    actor: &Actor,
    delegated_for: &str,
) -> Result<Authorization, Unauthorized> {
    let required = required_actor(process.kind, process.current_stage);
    let deny = |reason| Unauthorized {
        stage: process.current_stage,
        required,
        actor_role: actor.role,
        reason,
    };
    let participant = required.ok_or_else(|| deny(DenialReason::NoActor))?;
    let delegable = DELEGATIONS
        .iter()
        .any(|d| d.participant == participant && d.delegate == actor.role);
    if !delegable {
        return Err(deny(DenialReason::NotDelegable));
    }
    let expected = match participant {
        StageActor::Mentor => process.mentor_id.as_ref().map(|m| m.as_str()),
        StageActor::Owner => Some(process.owner_id.as_str()),
        StageActor::Role(_) => None,
    };
    let delegated_for = delegated_for.trim();
    if delegated_for.is_empty() || expected.is_some_and(|e| e != delegated_for) {
        return Err(deny(DenialReason::DelegationMismatch));
    }
    tracing::debug!(
        process_id = %process.id,
        stage = %process.current_stage,
        actor = %actor.user_id,
        delegated_for,
        "delegated authorization granted"
    );
    Ok(Authorization::Delegated {
        delegated_for: delegated_for.to_string(),
    })
}

/// Check that `leader` may assign a `route` process in `department`.
///
/// The denial reports the route's initial stage, which assignment skips.
pub fn authorize_assignment(
    route: &Route,
    department: &str,
    leader: &Actor,
) -> Result<(), Unauthorized> {
    let deny = |reason| Unauthorized {
        stage: route.initial_stage(),
        required: None,
        actor_role: leader.role,
        reason,
    };
    if !route.is_assignable() {
        return Err(deny(DenialReason::NotAssignable));
    }
    if !leader.role.is_leader() {
        return Err(deny(DenialReason::NotLeader));
    }
    if leader.department != department {
        return Err(deny(DenialReason::ForeignDepartment));
    }
    Ok(())
}

/// Whether `actor` could act at the current stage, in person or as a
/// permitted stand-in.
pub fn can_act(process: &Process, actor: &Actor) -> bool {
    if process.current_stage.is_terminal() {
        return false;
    }
    if authorize(process, actor).is_ok() {
        return true;
    }
    required_actor(process.kind, process.current_stage).is_some_and(|participant| {
        DELEGATIONS
            .iter()
            .any(|d| d.participant == participant && d.delegate == actor.role)
    })
}

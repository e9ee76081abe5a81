//! # Stage Route Matrix
//!
//! Walks every `(kind, variant)` route in the table through the engine:
//! the full approve chain with the right actor at each stage, a reject at
//! every stage that allows one, and a refused action by the wrong actor
//! everywhere.

use std::sync::Arc;

use certflow_assessment::Conclusion;
use certflow_core::{Actor, Role, UserId};
use certflow_engine::{
    EngineConfig, EngineError, InMemoryDirectory, InMemoryTemplateCatalog, WorkflowEngine,
};
use certflow_state::{
    route, Action, DenialReason, Process, ProcessContext, ProcessError, ProcessStatus, Route,
    Stage, Variant, WorkflowKind, ROUTES,
};

const DEPT: &str = "avionics";

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn engine() -> WorkflowEngine {
    WorkflowEngine::from_config(
        EngineConfig::default(),
        Arc::new(InMemoryDirectory::new()),
        Arc::new(InMemoryTemplateCatalog::default()),
    )
    .unwrap()
}

fn owner() -> Actor {
    Actor::new(user("owner"), Role::Employee, DEPT)
}

fn create(engine: &WorkflowEngine, route: &Route) -> Process {
    engine
        .create_process(
            &owner(),
            route.kind,
            route.variant,
            "subject-1",
            ProcessContext {
                mentor_id: Some(user("mentor")),
                ..ProcessContext::default()
            },
        )
        .unwrap()
}

/// The participant expected to act at the process's current stage.
fn stage_actor(process: &Process) -> Actor {
    match process.current_stage {
        Stage::ApplicantSubmission | Stage::EmployeeFill => owner(),
        Stage::MentorSign => Actor::new(user("mentor"), Role::Employee, DEPT),
        Stage::TrainingEngineerReview | Stage::Assessment => {
            Actor::new(user("admin"), Role::TrainingAdmin, DEPT)
        }
        Stage::SectionChiefReview => Actor::new(user("chief"), Role::SectionChief, DEPT),
        Stage::DeptManagerReview => Actor::new(user("manager"), Role::DeptManager, DEPT),
        Stage::VpSignOff => vice_president(),
        Stage::Completed | Stage::Rejected => panic!("no actor at terminal stage"),
    }
}

fn vice_president() -> Actor {
    Actor::new(user("vp"), Role::VicePresident, "executive")
}

/// Someone who is never the expected participant at `stage`.
fn wrong_actor(stage: Stage) -> Actor {
    match stage {
        Stage::DeptManagerReview => Actor::new(user("chief"), Role::SectionChief, DEPT),
        _ => Actor::new(user("manager"), Role::DeptManager, DEPT),
    }
}

/// Approve the current stage, concluding an assessment where one is due.
fn advance(engine: &WorkflowEngine, process: &Process) -> Process {
    let actor = stage_actor(process);
    if process.current_stage == Stage::Assessment {
        let a = engine
            .create_assessment(&actor, &process.id, [user("assessor")])
            .unwrap();
        engine
            .sign_assessment(&Actor::new(user("assessor"), Role::Assessor, "quality"), &a.id, "sig")
            .unwrap();
        engine.confirm_assessment(&owner(), &a.id, "sig").unwrap();
        engine
            .set_conclusion(&actor, &a.id, Conclusion::SuggestAuthorize, None)
            .unwrap()
    } else {
        engine
            .transition(&actor, &process.id, Action::Approve, None)
            .unwrap()
    }
}

#[test]
fn every_route_approves_through_to_completed() {
    let engine = engine();
    for route in ROUTES {
        let mut process = create(&engine, route);
        let expected: Vec<Stage> = route.steps.iter().map(|s| s.stage).collect();
        let mut visited = Vec::new();
        while !process.is_terminal() {
            visited.push(process.current_stage);
            process = advance(&engine, &process);
        }
        assert_eq!(visited, expected, "{} {}", route.kind, route.variant);
        assert_eq!(process.current_stage, Stage::Completed);
        assert_eq!(process.status, ProcessStatus::Approved);
        assert_eq!(process.history.len(), expected.len());
    }
}

#[test]
fn reject_edges_match_the_route_table() {
    let engine = engine();
    for route in ROUTES {
        for (index, step) in route.steps.iter().enumerate() {
            let mut process = create(&engine, route);
            for _ in 0..index {
                process = advance(&engine, &process);
            }
            assert_eq!(process.current_stage, step.stage);

            let result = engine.transition(
                &stage_actor(&process),
                &process.id,
                Action::Reject,
                Some("not yet"),
            );
            if step.rejectable {
                let rejected = result.unwrap();
                assert_eq!(rejected.current_stage, Stage::Rejected);
                assert_eq!(rejected.improvement_suggestion.as_deref(), Some("not yet"));
            } else {
                assert!(
                    matches!(
                        result,
                        Err(EngineError::Process(ProcessError::InvalidTransition { .. }))
                    ),
                    "{} {} at {}: {result:?}",
                    route.kind,
                    route.variant,
                    step.stage
                );
            }
        }
    }
}

#[test]
fn wrong_actor_is_refused_at_every_stage() {
    let engine = engine();
    for route in ROUTES {
        let mut process = create(&engine, route);
        while !process.is_terminal() {
            let stage = process.current_stage;
            let rejectable = route
                .steps
                .iter()
                .any(|s| s.stage == stage && s.rejectable);
            let action = if rejectable { Action::Reject } else { Action::Approve };
            let result = engine.transition(&wrong_actor(stage), &process.id, action, None);
            assert!(
                matches!(result, Err(EngineError::Process(ProcessError::Unauthorized(_)))),
                "{} {} at {stage}: {result:?}",
                route.kind,
                route.variant
            );
            let unchanged = engine.process(&process.id).unwrap();
            assert_eq!(unchanged.current_stage, stage);
            assert_eq!(unchanged.revision, process.revision);
            process = advance(&engine, &process);
        }
    }
}

#[test]
fn terminal_processes_accept_nothing() {
    let engine = engine();
    let route = &ROUTES[0];
    let mut process = create(&engine, route);
    while !process.is_terminal() {
        process = advance(&engine, &process);
    }
    for action in [Action::Approve, Action::Reject] {
        let err = engine
            .transition(&Actor::new(user("manager"), Role::DeptManager, DEPT), &process.id, action, None)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Process(ProcessError::InvalidTransition { stage: Stage::Completed, .. })
        ));
    }
    assert!(engine.pending_for_actor(&Actor::new(user("manager"), Role::DeptManager, DEPT)).is_empty());
}

#[test]
fn position_revocation_signs_off_up_to_the_vp() {
    let engine = engine();
    let revocation = route(WorkflowKind::PositionRevocation, Variant::Apply).unwrap();
    let mut process = create(&engine, revocation);
    assert_eq!(process.current_stage, Stage::ApplicantSubmission);

    // Only the employee signs first, and cannot refuse their own revocation.
    let err = engine
        .transition(&owner(), &process.id, Action::Reject, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Process(ProcessError::InvalidTransition { .. })));
    process = advance(&engine, &process);
    assert_eq!(process.current_stage, Stage::DeptManagerReview);
    assert!(engine.pending_for_actor(&vice_president()).is_empty());

    process = advance(&engine, &process);
    assert_eq!(process.current_stage, Stage::VpSignOff);

    // The manager cannot sign for the VP; the VP sees it from outside the
    // department.
    let err = engine
        .transition(
            &Actor::new(user("manager"), Role::DeptManager, DEPT),
            &process.id,
            Action::Approve,
            None,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Process(ProcessError::Unauthorized(ref u))
            if u.reason == DenialReason::RoleMismatch
    ));
    assert_eq!(engine.pending_for_actor(&vice_president()), vec![process.clone()]);

    process = advance(&engine, &process);
    assert_eq!(process.current_stage, Stage::Completed);
    assert_eq!(process.status, ProcessStatus::Approved);
    let signers: Vec<Role> = process.history.iter().map(|h| h.actor_role).collect();
    assert_eq!(signers, vec![Role::Employee, Role::DeptManager, Role::VicePresident]);
}

#[test]
fn assign_is_not_a_stage_action() {
    let engine = engine();
    for route in ROUTES {
        let process = create(&engine, route);
        let result = engine.transition(&stage_actor(&process), &process.id, Action::Assign, None);
        assert!(
            matches!(result, Err(EngineError::Process(ProcessError::InvalidTransition { .. }))),
            "{} {}: {result:?}",
            route.kind,
            route.variant
        );
    }
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn random_walks_stay_on_the_route(
            route_index in 0..ROUTES.len(),
            rejects in proptest::collection::vec(any::<bool>(), 1..8),
        ) {
            let engine = engine();
            let route = &ROUTES[route_index];
            let mut process = create(&engine, route);
            let mut applied = 0usize;
            for reject in rejects {
                if process.is_terminal() {
                    break;
                }
                let next = if reject {
                    engine
                        .transition(&stage_actor(&process), &process.id, Action::Reject, None)
                        .ok()
                } else {
                    Some(advance(&engine, &process))
                };
                if let Some(next) = next {
                    applied += 1;
                    process = next;
                }
                prop_assert!(route.stages().any(|s| s == process.current_stage));
            }
            prop_assert_eq!(process.history.len(), applied);
            prop_assert_eq!(engine.process(&process.id).unwrap(), process);
        }
    }
}

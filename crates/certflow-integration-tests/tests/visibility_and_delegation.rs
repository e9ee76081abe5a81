//! # Visibility and Delegation
//!
//! Who sees which processes, whose inbox a process lands in, and how a
//! training admin stands in for an absent mentor.

use std::sync::Arc;

use certflow_core::{Actor, Role, UserId};
use certflow_engine::{
    EngineConfig, EngineError, InMemoryDirectory, InMemoryTemplateCatalog, WorkflowEngine,
};
use certflow_state::{
    Action, DenialReason, ProcessAmendment, ProcessContext, ProcessError, Stage, Variant,
    WorkflowKind,
};

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

fn employee(id: &str, dept: &str) -> Actor {
    Actor::new(user(id), Role::Employee, dept)
}

fn guidance(engine: &WorkflowEngine, owner: &Actor) -> certflow_state::Process {
    engine
        .create_process(
            owner,
            WorkflowKind::TrainingGuidance,
            Variant::Apply,
            "plan_001",
            ProcessContext {
                mentor_id: Some(user("mentor")),
                ..ProcessContext::default()
            },
        )
        .unwrap()
}

#[test]
fn listing_follows_the_visibility_rule() {
    let engine = engine();
    let alice = employee("alice", "electrical");
    let bob = employee("bob", "avionics");
    let first = engine
        .create_process(&alice, WorkflowKind::PositionPlan, Variant::Apply, "pos_1", ProcessContext::default())
        .unwrap();
    let second = engine
        .create_process(&alice, WorkflowKind::WorkAuthorization, Variant::Apply, "wk_1", ProcessContext::default())
        .unwrap();
    let third = engine
        .create_process(&bob, WorkflowKind::PositionPlan, Variant::Apply, "pos_2", ProcessContext::default())
        .unwrap();

    let ids = |actor: &Actor| -> Vec<_> {
        engine.list_for_actor(actor).into_iter().map(|p| p.id).collect()
    };

    // Newest first.
    assert_eq!(ids(&alice), vec![second.id, first.id]);
    assert_eq!(ids(&bob), vec![third.id]);
    assert!(ids(&employee("carol", "electrical")).is_empty());

    let chief = Actor::new(user("chief"), Role::SectionChief, "electrical");
    assert_eq!(ids(&chief), vec![second.id, first.id]);
    let manager = Actor::new(user("mgr"), Role::DeptManager, "avionics");
    assert_eq!(ids(&manager), vec![third.id]);

    // Assessors see what they are named on, whatever the department.
    let assessor = Actor::new(user("a1"), Role::Assessor, "quality");
    assert!(ids(&assessor).is_empty());
    let admin = Actor::new(user("admin"), Role::TrainingAdmin, "electrical");
    engine.create_assessment(&admin, &second.id, [user("a1")]).unwrap();
    assert_eq!(ids(&assessor), vec![second.id]);
}

#[test]
fn pending_lists_follow_the_current_stage() {
    let engine = engine();
    let alice = employee("alice", "electrical");
    let p = engine
        .create_process(&alice, WorkflowKind::PositionPlan, Variant::Apply, "pos_1", ProcessContext::default())
        .unwrap();
    let admin = Actor::new(user("admin"), Role::TrainingAdmin, "electrical");
    let chief = Actor::new(user("chief"), Role::SectionChief, "electrical");
    let other_admin = Actor::new(user("admin2"), Role::TrainingAdmin, "avionics");

    assert_eq!(engine.pending_for_actor(&admin).len(), 1);
    assert!(engine.pending_for_actor(&chief).is_empty());
    assert!(engine.pending_for_actor(&other_admin).is_empty());
    assert!(engine.pending_for_actor(&alice).is_empty());

    engine.transition(&admin, &p.id, Action::Approve, None).unwrap();
    assert!(engine.pending_for_actor(&admin).is_empty());
    assert_eq!(engine.pending_for_actor(&chief)[0].id, p.id);
}

#[test]
fn mentor_stage_accepts_the_mentor_or_a_named_stand_in() {
    let engine = engine();
    let owner = employee("owner", "electrical");
    let admin = Actor::new(user("admin"), Role::TrainingAdmin, "electrical");

    let p = guidance(&engine, &owner);
    assert_eq!(p.current_stage, Stage::EmployeeFill);
    assert_eq!(engine.pending_for_actor(&owner)[0].id, p.id);
    let p = engine.transition(&owner, &p.id, Action::Approve, None).unwrap();
    assert_eq!(p.current_stage, Stage::MentorSign);

    // The mentor sees it in their inbox, and so does the admin who may stand in.
    let mentor = employee("mentor", "avionics");
    assert_eq!(engine.pending_for_actor(&mentor)[0].id, p.id);
    assert_eq!(engine.pending_for_actor(&admin)[0].id, p.id);

    match engine.transition(&admin, &p.id, Action::Approve, None) {
        Err(EngineError::Process(ProcessError::Unauthorized(u))) => {
            assert_eq!(u.reason, DenialReason::NotParticipant)
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    match engine.transition_on_behalf(&admin, "someone-else", &p.id, Action::Approve, None) {
        Err(EngineError::Process(ProcessError::Unauthorized(u))) => {
            assert_eq!(u.reason, DenialReason::DelegationMismatch)
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    let chief = Actor::new(user("chief"), Role::SectionChief, "electrical");
    assert!(engine
        .transition_on_behalf(&chief, "mentor", &p.id, Action::Approve, None)
        .is_err());

    let p = engine
        .transition_on_behalf(&admin, "mentor", &p.id, Action::Approve, None)
        .unwrap();
    assert_eq!(p.current_stage, Stage::TrainingEngineerReview);
    let record = p.history.last().unwrap();
    assert_eq!(record.actor_id, user("admin"));
    assert_eq!(record.delegated_for.as_deref(), Some("mentor"));

    let direct = guidance(&engine, &owner);
    engine.transition(&owner, &direct.id, Action::Approve, None).unwrap();
    let direct = engine.transition(&mentor, &direct.id, Action::Approve, None).unwrap();
    assert_eq!(direct.history.last().unwrap().delegated_for, None);
}

#[test]
fn owner_amends_until_the_process_closes() {
    let engine = engine();
    let owner = employee("owner", "electrical");
    let p = engine
        .create_process(
            &owner,
            WorkflowKind::MtaAuthorization,
            Variant::Extend,
            "mta_001",
            ProcessContext {
                reason: Some("still on the line".to_string()),
                extension_months: Some(12),
                source_entity_id: Some("mc_2021_004".to_string()),
                ..ProcessContext::default()
            },
        )
        .unwrap();
    assert_eq!(p.extension_months, Some(12));

    let amended = engine
        .amend_process(
            &owner,
            &p.id,
            ProcessAmendment {
                extension_months: Some(24),
                ..ProcessAmendment::default()
            },
        )
        .unwrap();
    assert_eq!(amended.extension_months, Some(24));
    assert_eq!(amended.reason.as_deref(), Some("still on the line"));
    assert!(amended.revision > p.revision);

    let chief = Actor::new(user("chief"), Role::SectionChief, "electrical");
    engine
        .transition(&chief, &p.id, Action::Reject, Some("no hours logged"))
        .unwrap();
    assert!(matches!(
        engine.amend_process(&owner, &p.id, ProcessAmendment::default()),
        Err(EngineError::Process(ProcessError::TerminalState { .. }))
    ));
}

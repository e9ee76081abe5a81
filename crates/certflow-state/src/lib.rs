//! # certflow-state — Process State Machine
//!
//! Approval workflows as data:
//!
//! - [`stage`]: workflow kinds, variants, the shared stage vocabulary and
//!   the approve/reject actions.
//! - [`graph`]: one route table keyed by `(kind, variant)`. The initial
//!   stage, approve chain and reject edges of every workflow live there.
//! - [`guard`]: who may act at each stage, and which roles may stand in for
//!   an absent participant.
//! - [`process`]: the [`Process`] record and its guarded transitions.
//! - [`visibility`]: the one rule deciding who sees which process.
//!
//! Adding a workflow kind means adding rows to the route and stage-actor
//! tables. Transition logic and the guard stay untouched.

pub mod graph;
pub mod guard;
pub mod process;
pub mod stage;
pub mod visibility;

pub use graph::{route, Route, RouteStep, ASSIGNABLE, ROUTES};
pub use guard::{
    authorize, authorize_assignment, authorize_on_behalf, can_act, required_actor, Authorization,
    DenialReason, StageActor, Unauthorized,
};
pub use process::{
    Process, ProcessAmendment, ProcessContext, ProcessError, ProcessSource, ProcessStatus,
    StageTransitionRecord,
};
pub use stage::{Action, Stage, Variant, WorkflowKind};
pub use visibility::{can_view, is_participant};

//! # Visibility
//!
//! The single rule deciding which processes a user may see, shared by every
//! workflow kind:
//!
//! - everyone sees processes they own, mentor, or are a named assessor on;
//! - `training_admin`, `section_chief` and `dept_manager` additionally see
//!   every process of their own department;
//! - `vice_president` sees every process in the organisation.
//!
//! Assessors get no department-wide view: being named on a panel is what
//! grants access, whatever department the process belongs to.

use certflow_core::{Actor, UserId};

use crate::process::Process;

/// Whether `viewer` may see `process`.
///
/// `assessor_ids` is the panel of the process's assessment, if one exists.
pub fn can_view(process: &Process, viewer: &Actor, assessor_ids: &[UserId]) -> bool {
    is_participant(process, &viewer.user_id, assessor_ids)
        || (viewer.role.has_department_scope() && process.department == viewer.department)
        || viewer.role.has_organisation_scope()
}

/// Whether `user_id` takes part in `process` personally.
pub fn is_participant(process: &Process, user_id: &UserId, assessor_ids: &[UserId]) -> bool {
    process.owner_id == *user_id
        || process.mentor_id.as_ref() == Some(user_id)
        || assessor_ids.contains(user_id)
}

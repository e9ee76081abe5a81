//! # External Collaborators
//!
//! The engine reads, never writes, two external sources:
//!
//! - a [`Directory`] resolving user and subject display names (users,
//!   MTA definitions, positions, work definitions, plans);
//! - a [`TemplateCatalog`] supplying certificate templates.
//!
//! In-memory implementations back tests and embedded use.

use std::collections::HashMap;

use serde_json::Value;

use certflow_cert::{ScopeKey, Template};
use certflow_core::{TemplateId, UserId};
use certflow_state::WorkflowKind;

use crate::migration::{self, MigrationError};

/// Read-only lookups of display names.
pub trait Directory: Send + Sync {
    /// Display name of a user.
    fn user_name(&self, user_id: &UserId) -> Option<String>;

    /// Display name of the entity a `kind` process targets.
    fn subject_name(&self, kind: WorkflowKind, subject_id: &str) -> Option<String>;
}

/// Read-only access to certificate templates.
pub trait TemplateCatalog: Send + Sync {
    /// A template by id.
    fn template(&self, id: &TemplateId) -> Option<Template>;

    /// Templates applying to `scope`.
    fn templates_for(&self, scope: &ScopeKey) -> Vec<Template>;
}

/// A [`Directory`] held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    users: HashMap<UserId, String>,
    subjects: HashMap<(WorkflowKind, String), String>,
}

impl InMemoryDirectory {
    /// An empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's display name.
    pub fn with_user(mut self, user_id: UserId, name: impl Into<String>) -> Self {
        self.users.insert(user_id, name.into());
        self
    }

    /// Register a subject's display name.
    pub fn with_subject(
        mut self,
        kind: WorkflowKind,
        subject_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.subjects.insert((kind, subject_id.into()), name.into());
        self
    }
}

impl Directory for InMemoryDirectory {
    fn user_name(&self, user_id: &UserId) -> Option<String> {
        self.users.get(user_id).cloned()
    }

    fn subject_name(&self, kind: WorkflowKind, subject_id: &str) -> Option<String> {
        self.subjects.get(&(kind, subject_id.to_string())).cloned()
    }
}

/// A [`TemplateCatalog`] held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateCatalog {
    templates: Vec<Template>,
}

impl InMemoryTemplateCatalog {
    /// A catalog of `templates`.
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    /// Build a catalog from a stored template list, migrating unversioned
    /// records.
    pub fn from_value(doc: Value) -> Result<Self, MigrationError> {
        Ok(Self::new(migration::decode_templates("templates", doc)?))
    }

    /// Add a template.
    pub fn with_template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }
}

impl TemplateCatalog for InMemoryTemplateCatalog {
    fn template(&self, id: &TemplateId) -> Option<Template> {
        self.templates.iter().find(|t| t.id == *id).cloned()
    }

    fn templates_for(&self, scope: &ScopeKey) -> Vec<Template> {
        self.templates
            .iter()
            .filter(|t| t.scope == *scope)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn directory_lookups() {
        let dir = InMemoryDirectory::new()
            .with_user(UserId::new("u_001").unwrap(), "Liu Bei")
            .with_subject(WorkflowKind::MtaAuthorization, "mta_001", "Engine run-up");
        assert_eq!(
            dir.user_name(&UserId::new("u_001").unwrap()).as_deref(),
            Some("Liu Bei")
        );
        assert_eq!(
            dir.subject_name(WorkflowKind::MtaAuthorization, "mta_001").as_deref(),
            Some("Engine run-up")
        );
        assert!(dir.subject_name(WorkflowKind::WorkAuthorization, "mta_001").is_none());
    }

    #[test]
    fn catalog_scope_filter() {
        let scope = ScopeKey::new("electrical", "mta_001");
        let catalog = InMemoryTemplateCatalog::default()
            .with_template(Template::new(TemplateId::new("a").unwrap(), "A", scope.clone(), ""))
            .with_template(Template::new(
                TemplateId::new("b").unwrap(),
                "B",
                ScopeKey::new("avionics", "mta_001"),
                "",
            ));
        assert_eq!(catalog.templates_for(&scope).len(), 1);
        assert!(catalog.template(&TemplateId::new("b").unwrap()).is_some());
    }

    #[test]
    fn catalog_from_unversioned_list() {
        let catalog = InMemoryTemplateCatalog::from_value(json!([{
            "id": "ct_1",
            "name": "MTA",
            "scope": {"department": "electrical", "subject_id": "mta_001"},
            "content_template": "{{applicantName}}"
        }]))
        .unwrap();
        let t = catalog.template(&TemplateId::new("ct_1").unwrap()).unwrap();
        assert_eq!(t.default_expire_years, 5);
    }
}

//! # Certificate Templates
//!
//! A [`Template`] is a text body with `{{key}}` placeholders plus the list of
//! variables it declares. Rendering is literal substitution: a placeholder
//! whose key has a value is replaced, anything else stays in the output
//! verbatim. Declared custom variables are the only ones a caller must
//! supply; built-ins are filled in at issuance, and a declared built-in the
//! issuer does not know fails issuance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use certflow_core::TemplateId;

/// Name of the certificate holder.
pub const APPLICANT_NAME: &str = "applicantName";
/// Issue date.
pub const ISSUED_AT: &str = "issuedAt";
/// Expiry date.
pub const EXPIRE_AT: &str = "expireAt";
/// Name of the MTA, position or work the certificate covers. Each workflow
/// kind also knows the subject under its own key, e.g. `workName`.
pub const SUBJECT_NAME: &str = "subjectName";
/// Department of the process. Supplied when a template declares it as a
/// built-in.
pub const DEPARTMENT: &str = "department";

/// Keys the issuer always supplies.
pub const BUILT_IN_KEYS: [&str; 4] = [APPLICANT_NAME, ISSUED_AT, EXPIRE_AT, SUBJECT_NAME];

/// Validity period used when a template does not set a positive one.
pub const DEFAULT_EXPIRE_YEARS: u32 = 5;

/// Where a variable's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    /// Supplied by the issuer.
    BuiltIn,
    /// Supplied by the caller at issuance.
    Custom,
}

/// A variable declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// Placeholder key, as written between the braces.
    pub key: String,
    /// Display label.
    #[serde(default)]
    pub label: String,
    /// Where the value comes from.
    #[serde(rename = "type")]
    pub source: VariableSource,
}

impl TemplateVariable {
    /// A caller-supplied variable.
    pub fn custom(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            source: VariableSource::Custom,
        }
    }

    /// An issuer-supplied variable.
    pub fn built_in(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            source: VariableSource::BuiltIn,
        }
    }
}

/// The department and subject a template applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    /// Owning department.
    pub department: String,
    /// The MTA, position or work definition.
    pub subject_id: String,
}

impl ScopeKey {
    /// Build a scope key.
    pub fn new(department: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            department: department.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.department, self.subject_id)
    }
}

/// A certificate template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Identifier.
    pub id: TemplateId,
    /// Display name.
    pub name: String,
    /// Where the template applies.
    pub scope: ScopeKey,
    /// Body with `{{key}}` placeholders.
    pub content_template: String,
    /// Declared variables.
    pub variables: Vec<TemplateVariable>,
    /// Validity period of issued certificates, in years.
    pub default_expire_years: u32,
}

impl Template {
    /// Create a template declaring the standard built-in variables.
    pub fn new(
        id: TemplateId,
        name: impl Into<String>,
        scope: ScopeKey,
        content_template: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            scope,
            content_template: content_template.into(),
            variables: default_variables(),
            default_expire_years: DEFAULT_EXPIRE_YEARS,
        }
    }

    /// Declare an additional caller-supplied variable.
    pub fn with_custom_variable(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.variables.push(TemplateVariable::custom(key, label));
        self
    }

    /// Override the validity period.
    pub fn with_expire_years(mut self, years: u32) -> Self {
        self.default_expire_years = years;
        self
    }

    /// Validity period to apply, falling back to the default for zero.
    pub fn effective_expire_years(&self) -> u32 {
        if self.default_expire_years == 0 {
            DEFAULT_EXPIRE_YEARS
        } else {
            self.default_expire_years
        }
    }

    /// Keys the caller must supply, in declaration order.
    ///
    /// A custom variable whose key collides with a built-in is supplied by
    /// the issuer and therefore not required.
    pub fn required_variables(&self) -> impl Iterator<Item = &str> {
        self.variables
            .iter()
            .filter(|v| v.source == VariableSource::Custom)
            .map(|v| v.key.as_str())
            .filter(|k| !BUILT_IN_KEYS.contains(k))
    }

    /// Keys the issuer must supply, in declaration order.
    pub fn built_in_variables(&self) -> impl Iterator<Item = &str> {
        self.variables
            .iter()
            .filter(|v| v.source == VariableSource::BuiltIn)
            .map(|v| v.key.as_str())
    }

    /// Declare an issuer-supplied variable, such as `workName`.
    pub fn with_built_in_variable(
        mut self,
        key: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        self.variables.push(TemplateVariable::built_in(key, label));
        self
    }

    /// Whether the template applies to `department` and `subject_id`.
    pub fn applies_to(&self, department: &str, subject_id: &str) -> bool {
        self.scope.department == department && self.scope.subject_id == subject_id
    }

    /// Render the body with `values`.
    pub fn render(&self, values: &BTreeMap<String, String>) -> String {
        render(&self.content_template, values)
    }
}

/// The built-in variables every new template declares.
pub fn default_variables() -> Vec<TemplateVariable> {
    vec![
        TemplateVariable::built_in(APPLICANT_NAME, "Holder"),
        TemplateVariable::built_in(ISSUED_AT, "Issued at"),
        TemplateVariable::built_in(EXPIRE_AT, "Valid until"),
    ]
}

/// Replace each `{{key}}` in `body` with `values[key]`.
///
/// Keys are matched literally, whitespace included. Placeholders without a
/// value, and unmatched braces, are copied through unchanged.
pub fn render(body: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = &after[..close];
                match values.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_all_occurrences() {
        let out = render(
            "{{applicantName}} holds {{subjectName}}. Signed: {{applicantName}}",
            &values(&[("applicantName", "Liu Bei"), ("subjectName", "MTA-7")]),
        );
        assert_eq!(out, "Liu Bei holds MTA-7. Signed: Liu Bei");
    }

    #[test]
    fn test_render_leaves_unresolved_placeholders() {
        let out = render("{{a}} and {{unknown}}", &values(&[("a", "1")]));
        assert_eq!(out, "1 and {{unknown}}");
    }

    #[test]
    fn test_render_keys_are_literal() {
        let out = render("{{ a }}|{{a}}", &values(&[("a", "x")]));
        assert_eq!(out, "{{ a }}|x");
    }

    #[test]
    fn test_render_unclosed_braces() {
        let out = render("total {{a", &values(&[("a", "x")]));
        assert_eq!(out, "total {{a");
        assert_eq!(render("", &values(&[])), "");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("{{a}}", &values(&[("a", "{{b}}"), ("b", "nope")]));
        assert_eq!(out, "{{b}}");
    }

    #[test]
    fn test_required_variables_exclude_built_ins() {
        let t = Template::new(
            TemplateId::new("tpl").unwrap(),
            "Position",
            ScopeKey::new("D", "pos-1"),
            "{{applicantName}} / {{positionName}}",
        )
        .with_custom_variable("positionName", "Position")
        .with_custom_variable(SUBJECT_NAME, "Subject");
        assert_eq!(t.required_variables().collect::<Vec<_>>(), vec!["positionName"]);
    }

    #[test]
    fn test_built_in_variables_in_declaration_order() {
        let t = Template::new(
            TemplateId::new("wct").unwrap(),
            "Work",
            ScopeKey::new("D", "wk-1"),
            "",
        )
        .with_built_in_variable("workName", "Work")
        .with_custom_variable("note", "Note")
        .with_built_in_variable(DEPARTMENT, "Department");
        assert_eq!(
            t.built_in_variables().collect::<Vec<_>>(),
            vec![APPLICANT_NAME, ISSUED_AT, EXPIRE_AT, "workName", DEPARTMENT]
        );
        assert_eq!(t.required_variables().collect::<Vec<_>>(), vec!["note"]);
    }

    #[test]
    fn test_effective_expire_years() {
        let t = Template::new(
            TemplateId::new("tpl").unwrap(),
            "T",
            ScopeKey::new("D", "s"),
            "",
        );
        assert_eq!(t.effective_expire_years(), 5);
        assert_eq!(t.clone().with_expire_years(0).effective_expire_years(), 5);
        assert_eq!(t.with_expire_years(2).effective_expire_years(), 2);
    }

    #[test]
    fn test_variable_source_serializes_as_type() {
        let v = TemplateVariable::built_in(ISSUED_AT, "Issued at");
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"type\":\"built_in\""));
    }
}

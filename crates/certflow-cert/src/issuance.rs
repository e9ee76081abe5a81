//! # Issuance
//!
//! [`CertificateRegistry`] owns every issued certificate and the
//! process → certificate index that keeps issuance at most once per process.
//! The index is never pruned: purging a process leaves its certificate, and
//! the certificate keeps the process id blocked.
//!
//! Issuing a certificate:
//!
//! 1. the process must be `completed`, of a certified kind, and have no
//!    certificate yet;
//! 2. values are the caller's, overlaid with the built-ins
//!    (`applicantName`, `issuedAt`, `expireAt`, `subjectName`) and with
//!    every built-in the template declares, such as the kind's own subject
//!    key (`mtaName`, `positionName`, `workName`, `planName`) or
//!    `department`. A declared built-in the issuer does not know fails with
//!    [`CertificateError::MissingVariable`];
//! 3. every custom variable the template declares must have a non-blank
//!    value;
//! 4. the body is rendered leniently, digested, and numbered
//!    `<PREFIX>-<YEAR>-<NNN>` with a sequence per prefix and year.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use certflow_core::{sha256_digest, CertificateId, ProcessId, Timestamp, UserId};
use certflow_state::{Process, Stage};

use crate::certificate::Certificate;
use crate::error::CertificateError;
use crate::template::{
    Template, APPLICANT_NAME, BUILT_IN_KEYS, DEPARTMENT, EXPIRE_AT, ISSUED_AT, SUBJECT_NAME,
};

/// Caller-supplied issuance input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Values for the template's custom variables.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Overrides `issued_at + default_expire_years`.
    #[serde(default)]
    pub expire_at: Option<Timestamp>,
}

impl IssueRequest {
    /// Add a variable value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Override the expiry.
    pub fn with_expire_at(mut self, expire_at: Timestamp) -> Self {
        self.expire_at = Some(expire_at);
        self
    }
}

/// Display names resolved by the issuer for the built-in variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    /// The applicant's display name.
    pub applicant_name: String,
    /// The subject's display name.
    pub subject_name: String,
}

/// Every issued certificate, indexed by process.
#[derive(Debug, Clone, Default)]
pub struct CertificateRegistry {
    certificates: BTreeMap<CertificateId, Certificate>,
    by_process: HashMap<ProcessId, CertificateId>,
}

impl CertificateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from stored certificates.
    ///
    /// If two stored certificates claim the same process, the earlier issue
    /// keeps the index entry.
    pub fn from_certificates(certificates: impl IntoIterator<Item = Certificate>) -> Self {
        let mut sorted: Vec<Certificate> = certificates.into_iter().collect();
        sorted.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.number.cmp(&b.number)));
        let mut registry = Self::new();
        for certificate in sorted {
            if registry.by_process.contains_key(&certificate.process_id) {
                tracing::warn!(
                    process_id = %certificate.process_id,
                    certificate_id = %certificate.id,
                    "duplicate certificate for process in stored data"
                );
            } else {
                registry.by_process.insert(certificate.process_id, certificate.id);
            }
            registry.certificates.insert(certificate.id, certificate);
        }
        registry
    }

    /// Issue the certificate for a completed `process`.
    pub fn issue(
        &mut self,
        process: &Process,
        template: &Template,
        holder: &Holder,
        request: IssueRequest,
        now: Timestamp,
    ) -> Result<Certificate, CertificateError> {
        if process.current_stage != Stage::Completed {
            return Err(CertificateError::ProcessNotCompleted {
                process_id: process.id,
                stage: process.current_stage,
            });
        }
        if let Some(existing) = self.by_process.get(&process.id) {
            return Err(CertificateError::AlreadyIssued {
                process_id: process.id,
                certificate_id: *existing,
            });
        }
        let prefix = process
            .kind
            .certificate_prefix()
            .ok_or(CertificateError::NotCertifiable {
                process_id: process.id,
                kind: process.kind,
            })?;

        let issued_at = now;
        let expire_at = match request.expire_at {
            Some(at) => at,
            None => issued_at.add_years(template.effective_expire_years())?,
        };
        if expire_at <= issued_at {
            return Err(CertificateError::ExpiryNotAfterIssue {
                issued_at,
                expire_at,
            });
        }

        let known = built_in_values(process, holder, issued_at, expire_at);
        let mut values = request.values;
        for key in BUILT_IN_KEYS.iter().copied().chain(template.built_in_variables()) {
            let value = known
                .get(key)
                .ok_or_else(|| CertificateError::MissingVariable {
                    template_id: template.id.clone(),
                    key: key.to_string(),
                })?;
            values.insert(key.to_string(), value.clone());
        }

        if let Some(key) = template
            .required_variables()
            .find(|k| values.get(*k).map_or(true, |v| v.trim().is_empty()))
        {
            return Err(CertificateError::MissingVariable {
                template_id: template.id.clone(),
                key: key.to_string(),
            });
        }

        let content = template.render(&values);
        let number = self.next_number(prefix, issued_at.year())?;
        let certificate = Certificate {
            id: CertificateId::new(),
            number,
            process_id: process.id,
            kind: process.kind,
            recipient_id: process.owner_id.clone(),
            recipient_name: holder.applicant_name.clone(),
            department: process.department.clone(),
            subject_id: process.target_entity_id.clone(),
            subject_name: holder.subject_name.clone(),
            template_id: template.id.clone(),
            template_name: template.name.clone(),
            issued_at,
            expire_at,
            content_digest: sha256_digest(content.as_bytes()),
            content,
            revocation: None,
        };

        tracing::info!(
            certificate_id = %certificate.id,
            number = %certificate.number,
            process_id = %process.id,
            recipient = %certificate.recipient_id,
            expire_at = %certificate.expire_at,
            "certificate issued"
        );
        self.by_process.insert(process.id, certificate.id);
        self.certificates.insert(certificate.id, certificate.clone());
        Ok(certificate)
    }

    /// Revoke a certificate. `None` if it does not exist.
    pub fn revoke(
        &mut self,
        id: &CertificateId,
        reason: &str,
        now: Timestamp,
    ) -> Option<Result<Certificate, CertificateError>> {
        let certificate = self.certificates.get_mut(id)?;
        Some(certificate.revoke(reason, now).map(|()| {
            tracing::info!(certificate_id = %id, reason, "certificate revoked");
            certificate.clone()
        }))
    }

    /// Look up a certificate.
    pub fn get(&self, id: &CertificateId) -> Option<&Certificate> {
        self.certificates.get(id)
    }

    /// The certificate issued for a process, if any.
    pub fn for_process(&self, process_id: &ProcessId) -> Option<&Certificate> {
        self.by_process
            .get(process_id)
            .and_then(|id| self.certificates.get(id))
    }

    /// Certificates held by `recipient`, oldest first.
    pub fn for_recipient(&self, recipient: &UserId) -> Vec<&Certificate> {
        let mut held: Vec<&Certificate> = self
            .certificates
            .values()
            .filter(|c| c.recipient_id == *recipient)
            .collect();
        held.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.number.cmp(&b.number)));
        held
    }

    /// Every certificate.
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.values()
    }

    /// Number of certificates.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Whether no certificate has been issued.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    fn next_number(&self, prefix: &str, year: i32) -> Result<String, CertificateError> {
        let stem = format!("{prefix}-{year}-");
        let last = self
            .certificates
            .values()
            .filter_map(|c| c.number.strip_prefix(&stem))
            .filter_map(|seq| seq.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        match last.checked_add(1) {
            Some(next) => Ok(format!("{stem}{next:03}")),
            None => Err(CertificateError::NumberingExhausted { stem }),
        }
    }
}

/// Every value the issuer can supply for a certificate of `process`.
fn built_in_values(
    process: &Process,
    holder: &Holder,
    issued_at: Timestamp,
    expire_at: Timestamp,
) -> HashMap<&'static str, String> {
    HashMap::from([
        (APPLICANT_NAME, holder.applicant_name.clone()),
        (SUBJECT_NAME, holder.subject_name.clone()),
        (process.kind.subject_variable(), holder.subject_name.clone()),
        (DEPARTMENT, process.department.clone()),
        (ISSUED_AT, issued_at.to_date_string()),
        (EXPIRE_AT, expire_at.to_date_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateStatus;
    use crate::template::ScopeKey;
    use certflow_core::{Actor, Role, TemplateId};
    use certflow_state::{Action, ProcessContext, Variant, WorkflowKind};

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn completed(kind: WorkflowKind) -> Process {
        let variant = match kind {
            WorkflowKind::PositionPlan | WorkflowKind::WorkAuthorization => Variant::Apply,
            _ => Variant::Extend,
        };
        let mut p = Process::create(
            kind,
            variant,
            UserId::new("u_001").unwrap(),
            "pos-1",
            ProcessContext {
                department: "electrical".to_string(),
                ..ProcessContext::default()
            },
        )
        .unwrap();
        for role in [Role::TrainingAdmin, Role::SectionChief, Role::DeptManager] {
            let a = Actor::new(UserId::new("reviewer").unwrap(), role, "electrical");
            let _ = p.transition(&a, Action::Approve, None);
        }
        assert_eq!(p.current_stage, Stage::Completed);
        p
    }

    fn template() -> Template {
        Template::new(
            TemplateId::new("pct_001").unwrap(),
            "Position certificate",
            ScopeKey::new("electrical", "pos-1"),
            "{{applicantName}} qualifies for {{positionName}} until {{expireAt}}. {{note}}",
        )
        .with_custom_variable("positionName", "Position")
        .with_expire_years(3)
    }

    fn holder() -> Holder {
        Holder {
            applicant_name: "Liu Bei".to_string(),
            subject_name: "Line technician".to_string(),
        }
    }

    #[test]
    fn test_scenario_c_missing_then_supplied() {
        let mut registry = CertificateRegistry::new();
        let process = completed(WorkflowKind::PositionQualification);
        let now = ts("2024-03-01T09:00:00Z");

        let err = registry
            .issue(&process, &template(), &holder(), IssueRequest::default(), now)
            .unwrap_err();
        assert!(matches!(err, CertificateError::MissingVariable { ref key, .. } if key == "positionName"));
        assert!(registry.is_empty());

        let cert = registry
            .issue(
                &process,
                &template(),
                &holder(),
                IssueRequest::default().with_value("positionName", "Line technician"),
                now,
            )
            .unwrap();
        assert_eq!(cert.expire_at, ts("2027-03-01T09:00:00Z"));
        assert_eq!(
            cert.content,
            "Liu Bei qualifies for Line technician until 2027-03-01. {{note}}"
        );
        assert_eq!(cert.number, "PC-2024-001");
        assert!(cert.verify_content());
        assert_eq!(cert.status_at(now), CertificateStatus::Valid);
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut registry = CertificateRegistry::new();
        let err = registry
            .issue(
                &completed(WorkflowKind::PositionQualification),
                &template(),
                &holder(),
                IssueRequest::default().with_value("positionName", "  "),
                Timestamp::now(),
            )
            .unwrap_err();
        assert!(matches!(err, CertificateError::MissingVariable { .. }));
    }

    #[test]
    fn test_scenario_d_second_issue_fails() {
        let mut registry = CertificateRegistry::new();
        let process = completed(WorkflowKind::PositionQualification);
        let request = IssueRequest::default().with_value("positionName", "x");
        let first = registry
            .issue(&process, &template(), &holder(), request.clone(), Timestamp::now())
            .unwrap();
        let err = registry
            .issue(&process, &template(), &holder(), request, Timestamp::now())
            .unwrap_err();
        assert!(matches!(
            err,
            CertificateError::AlreadyIssued { certificate_id, .. } if certificate_id == first.id
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_requires_completed_process() {
        let mut registry = CertificateRegistry::new();
        let process = Process::create(
            WorkflowKind::MtaAuthorization,
            Variant::Apply,
            UserId::new("u_001").unwrap(),
            "mta-1",
            ProcessContext::default(),
        )
        .unwrap();
        let err = registry
            .issue(&process, &template(), &holder(), IssueRequest::default(), Timestamp::now())
            .unwrap_err();
        assert!(matches!(err, CertificateError::ProcessNotCompleted { .. }));
    }

    #[test]
    fn test_expiry_override() {
        let mut registry = CertificateRegistry::new();
        let now = ts("2024-03-01T09:00:00Z");
        let cert = registry
            .issue(
                &completed(WorkflowKind::PositionQualification),
                &template(),
                &holder(),
                IssueRequest::default()
                    .with_value("positionName", "x")
                    .with_expire_at(ts("2024-12-31T00:00:00Z")),
                now,
            )
            .unwrap();
        assert_eq!(cert.expire_at, ts("2024-12-31T00:00:00Z"));

        let err = registry
            .issue(
                &completed(WorkflowKind::PositionQualification),
                &template(),
                &holder(),
                IssueRequest::default()
                    .with_value("positionName", "x")
                    .with_expire_at(now),
                now,
            )
            .unwrap_err();
        assert!(matches!(err, CertificateError::ExpiryNotAfterIssue { .. }));
    }

    #[test]
    fn test_numbers_are_sequential_per_prefix_and_year() {
        let mut registry = CertificateRegistry::new();
        let request = IssueRequest::default().with_value("positionName", "x");
        let issue = |registry: &mut CertificateRegistry, kind, at: &str| {
            registry
                .issue(&completed(kind), &template(), &holder(), request.clone(), ts(at))
                .unwrap()
                .number
        };
        assert_eq!(
            issue(&mut registry, WorkflowKind::PositionQualification, "2024-01-01T00:00:00Z"),
            "PC-2024-001"
        );
        assert_eq!(
            issue(&mut registry, WorkflowKind::PositionQualification, "2024-05-01T00:00:00Z"),
            "PC-2024-002"
        );
        assert_eq!(
            issue(&mut registry, WorkflowKind::MtaAuthorization, "2024-05-01T00:00:00Z"),
            "MC-2024-001"
        );
        assert_eq!(
            issue(&mut registry, WorkflowKind::PositionQualification, "2025-01-02T00:00:00Z"),
            "PC-2025-001"
        );
        assert_eq!(
            issue(&mut registry, WorkflowKind::PositionPlan, "2025-01-02T00:00:00Z"),
            "TC-2025-001"
        );
    }

    /// Shaped like the stock work-authorisation template: the subject and
    /// department are declared as built-ins.
    fn work_template() -> Template {
        Template::new(
            TemplateId::new("wct_001").unwrap(),
            "Work authorisation",
            ScopeKey::new("electrical", "pos-1"),
            "{{applicantName}} may perform {{workName}} for {{department}} until {{expireAt}}.",
        )
        .with_built_in_variable("workName", "Work")
        .with_built_in_variable("department", "Department")
    }

    #[test]
    fn test_declared_built_ins_are_rendered() {
        let mut registry = CertificateRegistry::new();
        let holder = Holder {
            applicant_name: "Liu Bei".to_string(),
            subject_name: "Engine run-up".to_string(),
        };
        let cert = registry
            .issue(
                &completed(WorkflowKind::WorkAuthorization),
                &work_template(),
                &holder,
                IssueRequest::default(),
                ts("2024-03-01T09:00:00Z"),
            )
            .unwrap();
        assert_eq!(
            cert.content,
            "Liu Bei may perform Engine run-up for electrical until 2029-03-01."
        );
        assert_eq!(cert.number, "WC-2024-001");
    }

    #[test]
    fn test_built_ins_override_caller_values() {
        let mut registry = CertificateRegistry::new();
        let cert = registry
            .issue(
                &completed(WorkflowKind::WorkAuthorization),
                &work_template(),
                &holder(),
                IssueRequest::default()
                    .with_value("workName", "forged")
                    .with_value("department", "forged"),
                ts("2024-03-01T09:00:00Z"),
            )
            .unwrap();
        assert!(!cert.content.contains("forged"));
    }

    #[test]
    fn test_unknown_built_in_fails_issuance() {
        let mut registry = CertificateRegistry::new();
        let template = work_template().with_built_in_variable("badgeNumber", "Badge");
        let err = registry
            .issue(
                &completed(WorkflowKind::WorkAuthorization),
                &template,
                &holder(),
                IssueRequest::default().with_value("badgeNumber", "B-7"),
                Timestamp::now(),
            )
            .unwrap_err();
        assert!(matches!(err, CertificateError::MissingVariable { ref key, .. } if key == "badgeNumber"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subject_key_belongs_to_the_kind() {
        // `workName` is not known for an MTA certificate.
        let mut registry = CertificateRegistry::new();
        let err = registry
            .issue(
                &completed(WorkflowKind::MtaAuthorization),
                &work_template(),
                &holder(),
                IssueRequest::default(),
                Timestamp::now(),
            )
            .unwrap_err();
        assert!(matches!(err, CertificateError::MissingVariable { ref key, .. } if key == "workName"));
    }

    #[test]
    fn test_revocations_are_not_certified() {
        let mut registry = CertificateRegistry::new();
        let mut process = Process::create(
            WorkflowKind::PositionRevocation,
            Variant::Apply,
            UserId::new("u_001").unwrap(),
            "pos-1",
            ProcessContext::default(),
        )
        .unwrap();
        process.current_stage = Stage::Completed;
        let err = registry
            .issue(&process, &template(), &holder(), IssueRequest::default(), Timestamp::now())
            .unwrap_err();
        assert!(matches!(
            err,
            CertificateError::NotCertifiable { kind: WorkflowKind::PositionRevocation, .. }
        ));
    }

    #[test]
    fn test_numbering_past_u32_range() {
        let mut registry = CertificateRegistry::new();
        let request = IssueRequest::default().with_value("positionName", "x");
        let now = ts("2024-03-01T09:00:00Z");
        let qualification = || completed(WorkflowKind::PositionQualification);
        let mut stored = registry
            .issue(&qualification(), &template(), &holder(), request.clone(), now)
            .unwrap();
        stored.number = "PC-2024-4294967295".to_string();

        let mut rebuilt = CertificateRegistry::from_certificates([stored.clone()]);
        let next = rebuilt
            .issue(&qualification(), &template(), &holder(), request.clone(), now)
            .unwrap();
        assert_eq!(next.number, "PC-2024-4294967296");

        stored.number = format!("PC-2024-{}", u64::MAX);
        let mut full = CertificateRegistry::from_certificates([stored]);
        let err = full
            .issue(&qualification(), &template(), &holder(), request, now)
            .unwrap_err();
        assert!(matches!(err, CertificateError::NumberingExhausted { ref stem } if stem == "PC-2024-"));
    }

    #[test]
    fn test_revoke_through_registry() {
        let mut registry = CertificateRegistry::new();
        let cert = registry
            .issue(
                &completed(WorkflowKind::PositionQualification),
                &template(),
                &holder(),
                IssueRequest::default().with_value("positionName", "x"),
                Timestamp::now(),
            )
            .unwrap();
        let revoked = registry
            .revoke(&cert.id, "fraud", Timestamp::now())
            .unwrap()
            .unwrap();
        assert_eq!(revoked.status(), CertificateStatus::Revoked);
        assert!(matches!(
            registry.revoke(&cert.id, "fraud", Timestamp::now()),
            Some(Err(CertificateError::AlreadyRevoked { .. }))
        ));
        assert!(registry.revoke(&CertificateId::new(), "x", Timestamp::now()).is_none());
    }

    #[test]
    fn test_rebuild_keeps_index_and_sequence() {
        let mut registry = CertificateRegistry::new();
        let process = completed(WorkflowKind::PositionQualification);
        let request = IssueRequest::default().with_value("positionName", "x");
        let now = ts("2024-03-01T09:00:00Z");
        registry
            .issue(&process, &template(), &holder(), request.clone(), now)
            .unwrap();

        let mut rebuilt = CertificateRegistry::from_certificates(registry.iter().cloned());
        assert!(rebuilt.for_process(&process.id).is_some());
        assert!(matches!(
            rebuilt.issue(&process, &template(), &holder(), request.clone(), now),
            Err(CertificateError::AlreadyIssued { .. })
        ));
        let next = rebuilt
            .issue(
                &completed(WorkflowKind::PositionQualification),
                &template(),
                &holder(),
                request,
                now,
            )
            .unwrap();
        assert_eq!(next.number, "PC-2024-002");
        assert_eq!(rebuilt.for_recipient(&process.owner_id).len(), 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn at_most_one_certificate_per_process(picks in proptest::collection::vec(0usize..4, 1..20)) {
                let processes: Vec<Process> = (0..4)
                    .map(|_| completed(WorkflowKind::PositionQualification))
                    .collect();
                let mut registry = CertificateRegistry::new();
                let request = IssueRequest::default().with_value("positionName", "x");
                for i in picks {
                    let _ = registry.issue(&processes[i], &template(), &holder(), request.clone(), Timestamp::now());
                }
                for p in &processes {
                    let count = registry.iter().filter(|c| c.process_id == p.id).count();
                    prop_assert!(count <= 1);
                }
            }
        }
    }
}

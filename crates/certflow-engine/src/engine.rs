//! # Workflow Engine
//!
//! The service object a presentation layer calls. It owns the process,
//! assessment and certificate tables, routes every change through the
//! guarded domain methods, and mirrors each table into the key-value store
//! after it changes.
//!
//! Multi-record operations (concluding an assessment moves its process)
//! are validated on copies of both records and committed only when every
//! check passed, so a rejection never leaves one record changed and the
//! other not.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use certflow_assessment::{Assessment, AssessmentStatus, Conclusion, Evaluation};
use certflow_cert::{
    Certificate, CertificateRegistry, CertificateStatus, Holder, IssueRequest, ScopeKey, Template,
};
use certflow_core::{Actor, AssessmentId, CertificateId, ProcessId, TemplateId, Timestamp, UserId};
use certflow_state::{
    guard, visibility, Action, Process, ProcessAmendment, ProcessContext, ProcessError, Stage,
    Variant, WorkflowKind,
};

use crate::config::EngineConfig;
use crate::directory::{Directory, TemplateCatalog};
use crate::error::EngineError;
use crate::migration::{self, Envelope};
use crate::persistence::{
    processes_key, JsonFileStore, KeyValueStore, MemoryStore, PersistencePolicy,
    PersistenceWarning, ASSESSMENTS_KEY, CERTIFICATES_KEY,
};
use crate::store::Store;

/// The approval workflow engine.
pub struct WorkflowEngine {
    config: EngineConfig,
    kv: Arc<dyn KeyValueStore>,
    directory: Arc<dyn Directory>,
    templates: Arc<dyn TemplateCatalog>,
    processes: Store<ProcessId, Process>,
    assessments: Store<AssessmentId, Assessment>,
    certificates: RwLock<CertificateRegistry>,
    warnings: Mutex<Vec<PersistenceWarning>>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("config", &self.config)
            .field("processes", &self.processes.len())
            .field("assessments", &self.assessments.len())
            .field("certificates", &self.certificates.read().len())
            .finish()
    }
}

impl WorkflowEngine {
    /// Load every stored table through the migrations, then serve.
    ///
    /// # Errors
    ///
    /// Fails if stored data cannot be read or decoded. Starting empty over
    /// unreadable data would overwrite it on the next save.
    pub fn open(
        config: EngineConfig,
        kv: Arc<dyn KeyValueStore>,
        directory: Arc<dyn Directory>,
        templates: Arc<dyn TemplateCatalog>,
    ) -> Result<Self, EngineError> {
        let mut processes = Vec::new();
        for kind in WorkflowKind::ALL {
            let key = processes_key(kind);
            if let Some(doc) = kv.load(&key)? {
                for p in migration::decode_processes(&key, doc)? {
                    if p.kind == kind {
                        processes.push(p);
                    } else {
                        tracing::warn!(key = %key, process_id = %p.id, kind = %p.kind, "process stored under the wrong key; skipped");
                    }
                }
            }
        }
        processes.sort_by_key(|p| p.created_at);

        let assessments = match kv.load(ASSESSMENTS_KEY)? {
            Some(doc) => migration::decode_assessments(ASSESSMENTS_KEY, doc)?,
            None => Vec::new(),
        };
        let certificates = match kv.load(CERTIFICATES_KEY)? {
            Some(doc) => migration::decode_certificates(CERTIFICATES_KEY, doc)?,
            None => Vec::new(),
        };

        tracing::info!(
            processes = processes.len(),
            assessments = assessments.len(),
            certificates = certificates.len(),
            policy = ?config.persistence_policy,
            "workflow engine opened"
        );

        let engine = Self {
            config,
            kv,
            directory,
            templates,
            processes: Store::new(),
            assessments: Store::new(),
            certificates: RwLock::new(CertificateRegistry::from_certificates(certificates)),
            warnings: Mutex::new(Vec::new()),
        };
        for p in processes {
            engine.processes.insert(p.id, p);
        }
        for a in assessments {
            engine.assessments.insert(a.id, a);
        }
        Ok(engine)
    }

    /// Open with the store the configuration selects: a [`JsonFileStore`]
    /// under `storage_dir`, or a fresh [`MemoryStore`].
    pub fn from_config(
        config: EngineConfig,
        directory: Arc<dyn Directory>,
        templates: Arc<dyn TemplateCatalog>,
    ) -> Result<Self, EngineError> {
        let kv: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(JsonFileStore::open(dir.clone())?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::open(config, kv, directory, templates)
    }

    /// The configuration the engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Take the persistence warnings recorded so far.
    pub fn drain_warnings(&self) -> Vec<PersistenceWarning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    // ─── Processes ───────────────────────────────────────────────────

    /// Start a process owned by `owner`.
    ///
    /// An empty `context.department` means the owner's department.
    pub fn create_process(
        &self,
        owner: &Actor,
        kind: WorkflowKind,
        variant: Variant,
        target_entity_id: &str,
        mut context: ProcessContext,
    ) -> Result<Process, EngineError> {
        if context.department.trim().is_empty() {
            context.department = owner.department.clone();
        }
        let process = Process::create(kind, variant, owner.user_id.clone(), target_entity_id, context)?;
        self.processes.insert(process.id, process.clone());
        self.persist_processes(kind);
        Ok(process)
    }

    /// Create a process for `owner_id` on a leader's assignment. The process
    /// starts completed; see [`Process::assign`].
    ///
    /// An empty `context.department` means the leader's department.
    #[allow(clippy::too_many_arguments)]
    pub fn assign_process(
        &self,
        leader: &Actor,
        owner_id: &UserId,
        kind: WorkflowKind,
        variant: Variant,
        target_entity_id: &str,
        mut context: ProcessContext,
        comment: Option<&str>,
    ) -> Result<Process, EngineError> {
        if context.department.trim().is_empty() {
            context.department = leader.department.clone();
        }
        let process = Process::assign(
            kind,
            variant,
            owner_id.clone(),
            target_entity_id,
            context,
            leader,
            comment,
        )?;
        self.processes.insert(process.id, process.clone());
        self.persist_processes(kind);
        Ok(process)
    }

    /// Approve or reject the process at its current stage.
    ///
    /// Approving at an assessment stage requires a complete assessment
    /// concluded `suggest_authorize`.
    pub fn transition(
        &self,
        actor: &Actor,
        process_id: &ProcessId,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Process, EngineError> {
        self.apply_transition(process_id, action, |p| p.transition(actor, action, comment))
    }

    /// Like [`transition`](Self::transition), with `actor` standing in for
    /// the participant named `delegated_for`.
    pub fn transition_on_behalf(
        &self,
        actor: &Actor,
        delegated_for: &str,
        process_id: &ProcessId,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Process, EngineError> {
        self.apply_transition(process_id, action, |p| {
            p.transition_on_behalf(actor, delegated_for, action, comment)
        })
    }

    /// Apply an owner amendment to an open process.
    pub fn amend_process(
        &self,
        actor: &Actor,
        process_id: &ProcessId,
        amendment: ProcessAmendment,
    ) -> Result<Process, EngineError> {
        let updated = self
            .processes
            .try_update(process_id, |p| {
                if p.owner_id != actor.user_id {
                    return Err(EngineError::NotOwner {
                        process_id: p.id,
                        user_id: actor.user_id.clone(),
                    });
                }
                p.amend(amendment)?;
                Ok(p.clone())
            })
            .ok_or(EngineError::ProcessNotFound(*process_id))??;
        self.persist_processes(updated.kind);
        Ok(updated)
    }

    /// A process by id.
    pub fn process(&self, process_id: &ProcessId) -> Result<Process, EngineError> {
        self.processes
            .get(process_id)
            .ok_or(EngineError::ProcessNotFound(*process_id))
    }

    /// Processes `actor` may see, newest first.
    pub fn list_for_actor(&self, actor: &Actor) -> Vec<Process> {
        let panels = self.panels();
        let mut visible = self.processes.filter(|p| {
            let panel = panels.get(&p.id).map_or(&[][..], Vec::as_slice);
            visibility::can_view(p, actor, panel)
        });
        visible.reverse();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tracing::debug!(actor = %actor.user_id, role = %actor.role, count = visible.len(), "listed processes");
        visible
    }

    /// Visible processes whose current stage `actor` may act on, newest
    /// first.
    pub fn pending_for_actor(&self, actor: &Actor) -> Vec<Process> {
        self.list_for_actor(actor)
            .into_iter()
            .filter(|p| guard::can_act(p, actor))
            .collect()
    }

    /// Administratively delete a process and its assessment.
    ///
    /// An issued certificate is kept and still blocks a second issuance for
    /// the same process id.
    pub fn purge_process(&self, process_id: &ProcessId) -> Result<Process, EngineError> {
        let process = self
            .processes
            .remove(process_id)
            .ok_or(EngineError::ProcessNotFound(*process_id))?;
        let assessment = self.assessments.find(|a| a.process_id == *process_id);
        if let Some(a) = &assessment {
            self.assessments.remove(&a.id);
        }
        tracing::info!(process_id = %process_id, kind = %process.kind, "process purged");
        self.persist_processes(process.kind);
        if assessment.is_some() {
            self.persist_assessments();
        }
        Ok(process)
    }

    // ─── Assessments ─────────────────────────────────────────────────

    /// Open the assessment of a process sitting at its assessment stage.
    ///
    /// Only the stage's actor may do this, and only once per process.
    pub fn create_assessment(
        &self,
        actor: &Actor,
        process_id: &ProcessId,
        assessor_ids: impl IntoIterator<Item = UserId>,
    ) -> Result<Assessment, EngineError> {
        let process = self.process(process_id)?;
        require_assessment_stage(&process)?;
        guard::authorize(&process, actor).map_err(ProcessError::from)?;
        if let Some(existing) = self.assessment_for_process(process_id) {
            return Err(EngineError::AssessmentExists {
                process_id: *process_id,
                assessment_id: existing.id,
            });
        }
        let assessment = Assessment::new(*process_id, assessor_ids)?;
        tracing::info!(
            assessment_id = %assessment.id,
            process_id = %process_id,
            assessors = assessment.assessor_ids.len(),
            "assessment created"
        );
        self.assessments.insert(assessment.id, assessment.clone());
        self.persist_assessments();
        Ok(assessment)
    }

    /// Record `actor`'s signature as an assessor.
    pub fn sign_assessment(
        &self,
        actor: &Actor,
        assessment_id: &AssessmentId,
        payload: &str,
    ) -> Result<Assessment, EngineError> {
        self.update_assessment(assessment_id, |a, _| {
            let status = a.sign(&actor.user_id, payload)?;
            tracing::info!(
                assessment_id = %a.id,
                assessor = %actor.user_id,
                signed = a.signed_count(),
                of = a.assessor_ids.len(),
                status = %status,
                "assessment signed"
            );
            Ok(())
        })
    }

    /// Record the panel's evaluation. `actor` must sit on the panel.
    pub fn record_evaluation(
        &self,
        actor: &Actor,
        assessment_id: &AssessmentId,
        evaluation: Evaluation,
    ) -> Result<Assessment, EngineError> {
        self.update_assessment(assessment_id, |a, _| {
            if !a.has_assessor(&actor.user_id) {
                return Err(certflow_assessment::AssessmentError::UnknownAssessor {
                    assessment_id: a.id,
                    assessor_id: actor.user_id.clone(),
                }
                .into());
            }
            a.record_evaluation(evaluation)?;
            Ok(())
        })
    }

    /// The applicant confirms the fully signed assessment.
    pub fn confirm_assessment(
        &self,
        actor: &Actor,
        assessment_id: &AssessmentId,
        payload: &str,
    ) -> Result<Assessment, EngineError> {
        self.update_assessment(assessment_id, |a, process| {
            if process.owner_id != actor.user_id {
                return Err(EngineError::NotOwner {
                    process_id: process.id,
                    user_id: actor.user_id.clone(),
                });
            }
            a.confirm_by_applicant(payload)?;
            tracing::info!(assessment_id = %a.id, process_id = %process.id, "assessment confirmed by applicant");
            Ok(())
        })
    }

    /// Record the conclusion of a complete assessment and move its process:
    /// `suggest_authorize` approves, `failed` rejects.
    ///
    /// Guarded by the process's current stage actor. A reject comment
    /// defaults to the panel's improvement suggestions.
    pub fn set_conclusion(
        &self,
        actor: &Actor,
        assessment_id: &AssessmentId,
        conclusion: Conclusion,
        comment: Option<&str>,
    ) -> Result<Process, EngineError> {
        let mut assessment = self.assessment(assessment_id)?;
        let mut process = self.process(&assessment.process_id)?;
        require_assessment_stage(&process)?;
        guard::authorize(&process, actor).map_err(ProcessError::from)?;

        assessment.set_conclusion(conclusion)?;
        let action = match conclusion {
            Conclusion::SuggestAuthorize => Action::Approve,
            _ => Action::Reject,
        };
        let suggestions = assessment.evaluation.improvement_suggestions.trim().to_string();
        let comment = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or((!suggestions.is_empty()).then_some(suggestions.as_str()));
        process.transition(actor, action, comment)?;

        tracing::info!(
            assessment_id = %assessment.id,
            process_id = %process.id,
            conclusion = %conclusion,
            stage = %process.current_stage,
            "assessment concluded"
        );
        let kind = process.kind;
        self.assessments.insert(assessment.id, assessment);
        self.processes.insert(process.id, process.clone());
        self.persist_assessments();
        self.persist_processes(kind);
        Ok(process)
    }

    /// Reset the assessment with a new panel. The process stage does not
    /// change.
    pub fn reassess(
        &self,
        actor: &Actor,
        assessment_id: &AssessmentId,
        new_assessor_ids: impl IntoIterator<Item = UserId>,
    ) -> Result<Assessment, EngineError> {
        self.update_assessment(assessment_id, |a, process| {
            guard::authorize(process, actor).map_err(ProcessError::from)?;
            a.reassess(new_assessor_ids)?;
            tracing::info!(assessment_id = %a.id, round = a.round, "assessment reset");
            Ok(())
        })
    }

    /// An assessment by id.
    pub fn assessment(&self, assessment_id: &AssessmentId) -> Result<Assessment, EngineError> {
        self.assessments
            .get(assessment_id)
            .ok_or(EngineError::AssessmentNotFound(*assessment_id))
    }

    /// The assessment of a process, if one was opened.
    pub fn assessment_for_process(&self, process_id: &ProcessId) -> Option<Assessment> {
        self.assessments.find(|a| a.process_id == *process_id)
    }

    // ─── Certificates ────────────────────────────────────────────────

    /// Templates that apply to a process's department and target entity.
    pub fn templates_for_process(&self, process_id: &ProcessId) -> Result<Vec<Template>, EngineError> {
        let process = self.process(process_id)?;
        Ok(self
            .templates
            .templates_for(&ScopeKey::new(process.department, process.target_entity_id)))
    }

    /// Issue the certificate of a completed process.
    ///
    /// Applicant and subject names come from the directory, falling back to
    /// the raw identifiers.
    pub fn issue_certificate(
        &self,
        process_id: &ProcessId,
        template_id: &TemplateId,
        request: IssueRequest,
    ) -> Result<Certificate, EngineError> {
        let process = self.process(process_id)?;
        let template = self
            .templates
            .template(template_id)
            .ok_or_else(|| EngineError::TemplateNotFound(template_id.clone()))?;
        if !template.applies_to(&process.department, &process.target_entity_id) {
            return Err(EngineError::TemplateOutOfScope {
                template_id: template_id.clone(),
                department: process.department,
                subject_id: process.target_entity_id,
            });
        }
        let holder = Holder {
            applicant_name: self
                .directory
                .user_name(&process.owner_id)
                .unwrap_or_else(|| process.owner_id.to_string()),
            subject_name: self
                .directory
                .subject_name(process.kind, &process.target_entity_id)
                .unwrap_or_else(|| process.target_entity_id.clone()),
        };
        let certificate = self
            .certificates
            .write()
            .issue(&process, &template, &holder, request, Timestamp::now())?;
        self.persist_certificates();
        Ok(certificate)
    }

    /// Revoke a valid certificate.
    pub fn revoke_certificate(
        &self,
        certificate_id: &CertificateId,
        reason: &str,
    ) -> Result<Certificate, EngineError> {
        let revoked = self
            .certificates
            .write()
            .revoke(certificate_id, reason, Timestamp::now())
            .ok_or(EngineError::CertificateNotFound(*certificate_id))??;
        self.persist_certificates();
        Ok(revoked)
    }

    /// A certificate by id.
    pub fn certificate(&self, certificate_id: &CertificateId) -> Result<Certificate, EngineError> {
        self.certificates
            .read()
            .get(certificate_id)
            .cloned()
            .ok_or(EngineError::CertificateNotFound(*certificate_id))
    }

    /// The certificate issued for a process, if any.
    pub fn certificate_for_process(&self, process_id: &ProcessId) -> Option<Certificate> {
        self.certificates.read().for_process(process_id).cloned()
    }

    /// Certificates held by `recipient`, oldest first.
    pub fn certificates_for_recipient(&self, recipient: &UserId) -> Vec<Certificate> {
        self.certificates
            .read()
            .for_recipient(recipient)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Current status of a certificate; expiry is evaluated now.
    pub fn certificate_status(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<CertificateStatus, EngineError> {
        Ok(self.certificate(certificate_id)?.status())
    }

    // ─── Internals ───────────────────────────────────────────────────

    fn apply_transition(
        &self,
        process_id: &ProcessId,
        action: Action,
        f: impl FnOnce(&mut Process) -> Result<Stage, ProcessError>,
    ) -> Result<Process, EngineError> {
        let current = self.process(process_id)?;
        if action == Action::Approve && current.at_assessment_stage() {
            self.require_favourable_assessment(&current)?;
        }
        let updated = self
            .processes
            .try_update(process_id, |p| f(p).map(|_| p.clone()))
            .ok_or(EngineError::ProcessNotFound(*process_id))??;
        self.persist_processes(updated.kind);
        Ok(updated)
    }

    fn require_favourable_assessment(&self, process: &Process) -> Result<(), EngineError> {
        let assessment = self.assessment_for_process(&process.id);
        let favourable = assessment.as_ref().is_some_and(|a| {
            a.status == AssessmentStatus::Complete && a.conclusion == Conclusion::SuggestAuthorize
        });
        if favourable {
            Ok(())
        } else {
            Err(EngineError::AssessmentPending {
                process_id: process.id,
                status: assessment.as_ref().map(|a| a.status),
                conclusion: assessment.as_ref().map(|a| a.conclusion),
            })
        }
    }

    /// Mutate an assessment whose process still sits at its assessment
    /// stage. The closure sees a copy; the store changes only on success.
    fn update_assessment(
        &self,
        assessment_id: &AssessmentId,
        f: impl FnOnce(&mut Assessment, &Process) -> Result<(), EngineError>,
    ) -> Result<Assessment, EngineError> {
        let mut assessment = self.assessment(assessment_id)?;
        let process = self.process(&assessment.process_id)?;
        require_assessment_stage(&process)?;
        f(&mut assessment, &process)?;
        self.assessments.insert(assessment.id, assessment.clone());
        self.persist_assessments();
        Ok(assessment)
    }

    /// Panel membership per process.
    fn panels(&self) -> HashMap<ProcessId, Vec<UserId>> {
        self.assessments
            .list()
            .into_iter()
            .map(|a| (a.process_id, a.assessor_ids))
            .collect()
    }

    fn persist_processes(&self, kind: WorkflowKind) {
        let records = self.processes.filter(|p| p.kind == kind);
        self.save(&processes_key(kind), &Envelope::current(records));
    }

    fn persist_assessments(&self) {
        self.save(ASSESSMENTS_KEY, &Envelope::current(self.assessments.list()));
    }

    fn persist_certificates(&self) {
        let mut records: Vec<Certificate> = self.certificates.read().iter().cloned().collect();
        records.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.number.cmp(&b.number)));
        self.save(CERTIFICATES_KEY, &Envelope::current(records));
    }

    /// Best-effort save: failures are logged, recorded under
    /// [`PersistencePolicy::Record`], and never returned.
    fn save<T: Serialize>(&self, key: &str, envelope: &Envelope<T>) {
        let result = serde_json::to_value(envelope)
            .map_err(|e| e.to_string())
            .and_then(|doc| self.kv.save(key, &doc).map_err(|e| e.to_string()));
        match result {
            Ok(()) => tracing::debug!(key, records = envelope.records.len(), "persisted"),
            Err(message) => {
                tracing::warn!(key, error = %message, "persistence failed; in-memory state kept");
                if self.config.persistence_policy == PersistencePolicy::Record {
                    self.warnings.lock().push(PersistenceWarning {
                        key: key.to_string(),
                        message,
                        at: Timestamp::now(),
                    });
                }
            }
        }
    }
}

fn require_assessment_stage(process: &Process) -> Result<(), EngineError> {
    if process.at_assessment_stage() {
        Ok(())
    } else {
        Err(EngineError::NotAtAssessmentStage {
            process_id: process.id,
            stage: process.current_stage,
        })
    }
}

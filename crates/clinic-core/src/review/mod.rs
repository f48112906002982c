//! Document review engine.
//!
//! Drives a [`DocumentSubmission`] through the review state machine and
//! issues the medical certificate once staff have verified the documents.
//! Every transition goes through [`SubmissionStatus::apply`].

mod renderer;

pub use renderer::{CertificateRenderer, CertificateRequest, RenderError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ServiceContext;
use crate::db::Database;
use crate::error::{PortalError, PortalResult, StateError, ValidationError};
use crate::identity;
use crate::models::{
    DocumentSubmission, FileSlot, PatientSnapshot, ReviewAction, SubmissionStatus, UploadedFile,
    User,
};
use crate::snapshots::ensure_snapshot;

/// Certificate bytes plus the moment they were first issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub submission_id: i64,
    pub bytes: Vec<u8>,
    pub issued_at: String,
}

/// Review engine service.
pub struct ReviewEngine<'a> {
    ctx: ServiceContext<'a>,
    renderer: &'a dyn CertificateRenderer,
}

impl<'a> ReviewEngine<'a> {
    pub fn new(ctx: ServiceContext<'a>, renderer: &'a dyn CertificateRenderer) -> Self {
        Self { ctx, renderer }
    }

    /// Store a file in `slot` of the caller's submission for the year,
    /// creating the submission on first upload.
    pub fn upload(
        &self,
        caller: &User,
        academic_year_id: i64,
        slot: FileSlot,
        file: UploadedFile,
    ) -> PortalResult<DocumentSubmission> {
        identity::require_active(caller)?;
        if slot.is_server_generated() {
            return Err(ValidationError::BadFormat {
                field: "slot".into(),
                reason: format!("{} is generated by the clinic", slot.as_str()),
            }
            .into());
        }
        if file.content.is_empty() {
            return Err(ValidationError::MissingField {
                field: "file".into(),
            }
            .into());
        }

        let now = self.ctx.stamp();
        let today = self.ctx.clock.today();
        let submission = self.ctx.write("upload_document", |db| {
            let mut submission = match db.find_submission(caller.id, academic_year_id)? {
                Some(existing) => existing,
                None => {
                    let year = db
                        .get_year(academic_year_id)?
                        .ok_or_else(|| PortalError::not_found("academic_year", academic_year_id))?;
                    let semester = year.semester_or_next(today);
                    let snapshot = ensure_snapshot(db, caller.id, academic_year_id, semester, &now)?;
                    let mut fresh = DocumentSubmission::new(caller.id, snapshot.id, academic_year_id);
                    fresh.created_at = now.clone();
                    fresh.updated_at = now.clone();
                    fresh.id = db.insert_submission(&fresh)?;
                    fresh
                }
            };

            let previous = submission.status;
            submission.status = previous.apply(ReviewAction::Upload)?;
            submission.submitted_at = None;
            if previous == SubmissionStatus::Rejected {
                submission.rejection_reason = None;
                submission.reviewed_by = None;
                submission.reviewed_at = None;
            }

            let file_ref = db.store_file(&file, &now)?;
            if let Some(replaced) = submission.files.insert(slot, file_ref) {
                db.delete_file(&replaced.storage_key)?;
            }
            submission.updated_at = now.clone();
            db.update_submission(&submission)?;
            Ok(submission)
        })?;

        info!(
            submission_id = submission.id,
            user_id = caller.id,
            slot = slot.as_str(),
            completion = submission.completion_percentage(),
            "document uploaded"
        );
        Ok(submission)
    }

    /// Mark the caller's submission ready for staff review.
    pub fn submit_for_review(
        &self,
        caller: &User,
        academic_year_id: i64,
    ) -> PortalResult<DocumentSubmission> {
        identity::require_active(caller)?;
        let now = self.ctx.stamp();

        let submission = self.ctx.write("submit_for_review", |db| {
            let mut submission = db
                .find_submission(caller.id, academic_year_id)?
                .ok_or_else(|| {
                    PortalError::not_found("submission", format!("{}/{}", caller.id, academic_year_id))
                })?;
            require_complete(&submission)?;
            submission.status = submission.status.apply(ReviewAction::SubmitForReview)?;
            submission.submitted_at = Some(now.clone());
            submission.updated_at = now.clone();
            db.update_submission(&submission)?;
            Ok(submission)
        })?;

        info!(submission_id = submission.id, "submission sent for review");
        Ok(submission)
    }

    pub fn verify(&self, caller: &User, submission_id: i64) -> PortalResult<DocumentSubmission> {
        let now = self.ctx.stamp();
        let submission = self.ctx.write("verify_submission", |db| {
            let (mut submission, _) = load_for_staff(db, caller, submission_id)?;
            require_complete(&submission)?;
            require_submitted(&submission, ReviewAction::Verify)?;
            submission.status = submission.status.apply(ReviewAction::Verify)?;
            submission.reviewed_by = Some(caller.id);
            submission.reviewed_at = Some(now.clone());
            submission.rejection_reason = None;
            submission.updated_at = now.clone();
            db.update_submission(&submission)?;
            Ok(submission)
        })?;

        info!(submission_id, reviewer = caller.id, "submission verified");
        Ok(submission)
    }

    pub fn reject(
        &self,
        caller: &User,
        submission_id: i64,
        reason: &str,
    ) -> PortalResult<DocumentSubmission> {
        let reason = required_text("reason", reason)?;
        let now = self.ctx.stamp();
        let submission = self.ctx.write("reject_submission", |db| {
            let (mut submission, _) = load_for_staff(db, caller, submission_id)?;
            require_submitted(&submission, ReviewAction::Reject)?;
            submission.status = submission.status.apply(ReviewAction::Reject)?;
            submission.reviewed_by = Some(caller.id);
            submission.reviewed_at = Some(now.clone());
            submission.rejection_reason = Some(reason.clone());
            submission.updated_at = now.clone();
            db.update_submission(&submission)?;
            Ok(submission)
        })?;

        info!(submission_id, reviewer = caller.id, "submission rejected");
        Ok(submission)
    }

    pub fn advise_for_consultation(
        &self,
        caller: &User,
        submission_id: i64,
        reason: &str,
    ) -> PortalResult<DocumentSubmission> {
        let reason = required_text("reason", reason)?;
        let now = self.ctx.stamp();
        let submission = self.ctx.write("advise_for_consultation", |db| {
            let (mut submission, _) = load_for_staff(db, caller, submission_id)?;
            require_submitted(&submission, ReviewAction::AdviseConsultation)?;
            submission.status = submission.status.apply(ReviewAction::AdviseConsultation)?;
            submission.advised_by = Some(caller.id);
            submission.advised_at = Some(now.clone());
            submission.consultation_reason = Some(reason.clone());
            submission.updated_at = now.clone();
            db.update_submission(&submission)?;
            Ok(submission)
        })?;

        info!(submission_id, advised_by = caller.id, "submission advised for consultation");
        Ok(submission)
    }

    /// Issue the medical certificate.
    ///
    /// The first call renders and stores the document together with a
    /// frozen copy of the issuer's identity. Later calls return the stored
    /// bytes unchanged. A rendering failure leaves the submission verified.
    pub fn issue(&self, caller: &User, submission_id: i64) -> PortalResult<IssuedCertificate> {
        let now = self.ctx.stamp();
        let today = self.ctx.clock.today();

        let (certificate, fresh) = self.ctx.write("issue_certificate", |db| {
            let (mut submission, patient) = load_for_staff(db, caller, submission_id)?;
            let next = submission.status.apply(ReviewAction::Issue)?;

            if submission.status == SubmissionStatus::Issued {
                if let (Some(bytes), Some(issued_at)) =
                    (submission.certificate.clone(), submission.issued_at.clone())
                {
                    return Ok((
                        IssuedCertificate {
                            submission_id,
                            bytes,
                            issued_at,
                        },
                        false,
                    ));
                }
            }

            let profile = db
                .get_staff_profile(caller.id)?
                .ok_or_else(|| PortalError::not_found("staff_profile", caller.id))?;
            let issuer = profile.snapshot();

            let request = CertificateRequest {
                submission_id,
                patient: &patient,
                issuer: &issuer,
                issue_date: today,
            };
            let bytes = self.renderer.render(&request).map_err(|e| {
                warn!(submission_id, error = %e, "certificate rendering failed");
                PortalError::ExternalService(e.to_string())
            })?;
            if bytes.is_empty() {
                warn!(submission_id, "certificate renderer returned no bytes");
                return Err(PortalError::ExternalService(RenderError::EmptyOutput.to_string()));
            }

            let file_name = format!("medical-certificate-{}.pdf", submission_id);
            let file_ref = db.store_file(&UploadedFile::new(file_name, bytes.clone()), &now)?;
            if let Some(replaced) = submission.files.insert(FileSlot::MedicalCertificate, file_ref) {
                db.delete_file(&replaced.storage_key)?;
            }

            submission.status = next;
            submission.certificate = Some(bytes.clone());
            submission.issued_at = Some(now.clone());
            submission.issued_by = Some(caller.id);
            submission.issuer = Some(issuer.clone());
            submission.updated_at = now.clone();
            db.update_submission(&submission)?;

            Ok((
                IssuedCertificate {
                    submission_id,
                    bytes,
                    issued_at: now.clone(),
                },
                true,
            ))
        })?;

        if fresh {
            info!(submission_id, issued_by = caller.id, size = certificate.bytes.len(), "certificate issued");
        } else {
            debug!(submission_id, "certificate already issued, returning stored copy");
        }
        Ok(certificate)
    }

    /// Certificate bytes for the owner or campus staff.
    pub fn download(&self, caller: &User, submission_id: i64) -> PortalResult<Vec<u8>> {
        let db = self.ctx.db;
        let submission = db
            .get_submission(submission_id)?
            .ok_or_else(|| PortalError::not_found("submission", submission_id))?;
        let campus = db
            .get_snapshot(submission.patient_snapshot_id)?
            .and_then(|s| s.demographics.campus);
        identity::require_owner_or_staff(caller, submission.user_id, campus)?;

        match (submission.status, submission.certificate) {
            (SubmissionStatus::Issued, Some(bytes)) if !bytes.is_empty() => Ok(bytes),
            (status, _) => Err(StateError::IllegalTransition {
                entity: "submission",
                from: status.as_str().to_string(),
                action: "download".into(),
            }
            .into()),
        }
    }

    /// Audit that the certificate was emailed. Delivery happens elsewhere.
    pub fn record_certificate_emailed(
        &self,
        caller: &User,
        submission_id: i64,
    ) -> PortalResult<DocumentSubmission> {
        let now = self.ctx.stamp();
        let submission = self.ctx.write("record_certificate_emailed", |db| {
            let (mut submission, _) = load_for_staff(db, caller, submission_id)?;
            if submission.status != SubmissionStatus::Issued {
                return Err(StateError::IllegalTransition {
                    entity: "submission",
                    from: submission.status.as_str().to_string(),
                    action: "email_certificate".into(),
                }
                .into());
            }
            submission.certificate_emailed_at = Some(now.clone());
            submission.certificate_emailed_by = Some(caller.id);
            submission.updated_at = now.clone();
            db.update_submission(&submission)?;
            Ok(submission)
        })?;

        info!(submission_id, by = caller.id, "certificate email recorded");
        Ok(submission)
    }

    /// Submissions awaiting staff attention within the caller's campuses.
    pub fn review_queue(
        &self,
        caller: &User,
        status: Option<SubmissionStatus>,
    ) -> PortalResult<Vec<DocumentSubmission>> {
        identity::require_staff(caller)?;
        let scope = identity::campus_scope(caller);
        debug!(user_id = caller.id, status = ?status, "listing review queue");
        Ok(self.ctx.db.list_submissions(status, scope.as_deref())?)
    }

    /// The caller's own submission for a year.
    pub fn get_mine(
        &self,
        caller: &User,
        academic_year_id: i64,
    ) -> PortalResult<Option<DocumentSubmission>> {
        identity::require_active(caller)?;
        Ok(self.ctx.db.find_submission(caller.id, academic_year_id)?)
    }
}

fn load_for_staff(
    db: &Database,
    caller: &User,
    submission_id: i64,
) -> PortalResult<(DocumentSubmission, PatientSnapshot)> {
    identity::require_staff(caller)?;
    let submission = db
        .get_submission(submission_id)?
        .ok_or_else(|| PortalError::not_found("submission", submission_id))?;
    let snapshot = db
        .get_snapshot(submission.patient_snapshot_id)?
        .ok_or_else(|| PortalError::not_found("patient_snapshot", submission.patient_snapshot_id))?;
    identity::require_staff_for(caller, snapshot.demographics.campus)?;
    Ok((submission, snapshot))
}

fn require_complete(submission: &DocumentSubmission) -> Result<(), StateError> {
    let missing = submission.missing_required();
    if missing.is_empty() {
        return Ok(());
    }
    Err(StateError::Incomplete {
        missing: missing.iter().map(|slot| slot.as_str().to_string()).collect(),
    })
}

/// Staff decisions need a submission the owner sent for review.
fn require_submitted(submission: &DocumentSubmission, action: ReviewAction) -> Result<(), StateError> {
    if submission.submitted_at.is_some() {
        return Ok(());
    }
    Err(StateError::IllegalTransition {
        entity: "submission",
        from: format!("{} (not submitted)", submission.status.as_str()),
        action: action.as_str().to_string(),
    })
}

fn required_text(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CurrentYearCache;
    use crate::config::{FixedClock, PortalConfig};
    use crate::models::{AcademicYearInput, Campus, CampusSet, DateRange, StaffProfile};
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubRenderer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubRenderer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    impl CertificateRenderer for StubRenderer {
        fn render(&self, request: &CertificateRequest<'_>) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RenderError::Template("service down".into()));
            }
            Ok(format!("CERT {} {}", request.submission_id, request.issuer.name).into_bytes())
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Fixture {
        db: Database,
        config: PortalConfig,
        clock: FixedClock,
        cache: CurrentYearCache,
        year: i64,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let year = db
                .insert_year(
                    &AcademicYearInput {
                        label: "2024-2025".into(),
                        start: d(2024, 8, 1),
                        end: d(2025, 7, 31),
                        first_semester: DateRange::new(d(2024, 8, 1), d(2024, 12, 20)),
                        second_semester: DateRange::new(d(2025, 1, 6), d(2025, 5, 30)),
                        summer: DateRange::new(d(2025, 6, 9), d(2025, 7, 31)),
                    },
                    "now",
                )
                .unwrap();
            let mut profile = StaffProfile::new(50, "Dr. Ana Cruz".into(), "University Physician".into());
            profile.license_no = Some("PRC-12345".into());
            db.upsert_staff_profile(&profile).unwrap();
            Self {
                db,
                config: PortalConfig::default(),
                clock: FixedClock::at(d(2025, 3, 3), NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
                cache: CurrentYearCache::new(),
                year,
            }
        }

        fn engine<'a>(&'a self, renderer: &'a StubRenderer) -> ReviewEngine<'a> {
            ReviewEngine::new(
                ServiceContext::new(&self.db, &self.config, &self.clock, &self.cache),
                renderer,
            )
        }

        fn upload_all(&self, engine: &ReviewEngine<'_>, student: &User) -> DocumentSubmission {
            let mut last = None;
            for slot in FileSlot::REQUIRED {
                last = Some(
                    engine
                        .upload(student, self.year, slot, UploadedFile::new(format!("{}.pdf", slot.as_str()), vec![1, 2]))
                        .unwrap(),
                );
            }
            last.unwrap()
        }

        fn submitted(&self, engine: &ReviewEngine<'_>, student: &User) -> DocumentSubmission {
            self.upload_all(engine, student);
            engine.submit_for_review(student, self.year).unwrap()
        }
    }

    fn staff() -> User {
        User::staff(50, CampusSet::new(vec![Campus::A]))
    }

    #[test]
    fn test_upload_accumulates_and_tracks_completion() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let student = User::student(7);

        let first = engine
            .upload(&student, fx.year, FileSlot::Cbc, UploadedFile::new("cbc.pdf", vec![1]))
            .unwrap();
        assert_eq!(first.status, SubmissionStatus::Pending);
        assert_eq!(first.completion_percentage(), 20);

        let err = engine.submit_for_review(&student, fx.year).unwrap_err();
        assert_eq!(err.kind(), "incomplete");

        let full = fx.upload_all(&engine, &student);
        assert!(full.is_complete());
        assert_eq!(full.id, first.id);
        assert!(engine.submit_for_review(&student, fx.year).unwrap().submitted_at.is_some());
    }

    #[test]
    fn test_replacing_a_slot_drops_old_file() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let student = User::student(7);

        let first = engine
            .upload(&student, fx.year, FileSlot::Cbc, UploadedFile::new("a.pdf", vec![1]))
            .unwrap();
        let old_key = first.files[&FileSlot::Cbc].storage_key.clone();
        engine
            .upload(&student, fx.year, FileSlot::Cbc, UploadedFile::new("b.pdf", vec![2]))
            .unwrap();
        assert!(fx.db.get_file_content(&old_key).unwrap().is_none());
    }

    #[test]
    fn test_server_slot_not_uploadable() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let err = fx
            .engine(&renderer)
            .upload(
                &User::student(7),
                fx.year,
                FileSlot::MedicalCertificate,
                UploadedFile::new("x.pdf", vec![1]),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "bad_format");
    }

    #[test]
    fn test_issue_from_pending_is_illegal() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let submission = fx.upload_all(&engine, &User::student(7));

        let err = engine.issue(&staff(), submission.id).unwrap_err();
        assert_eq!(err.kind(), "illegal_transition");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_verify_requires_complete() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let submission = engine
            .upload(&User::student(7), fx.year, FileSlot::Cbc, UploadedFile::new("cbc.pdf", vec![1]))
            .unwrap();
        let err = engine.verify(&staff(), submission.id).unwrap_err();
        assert_eq!(err.kind(), "incomplete");
    }

    #[test]
    fn test_issue_is_idempotent() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let submission = fx.submitted(&engine, &User::student(7));

        engine.verify(&staff(), submission.id).unwrap();
        let first = engine.issue(&staff(), submission.id).unwrap();
        let second = engine.issue(&staff(), submission.id).unwrap();
        assert_eq!(first, second);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);

        let stored = fx.db.get_submission(submission.id).unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Issued);
        assert_eq!(stored.issuer.unwrap().license_no.as_deref(), Some("PRC-12345"));
        assert!(stored.files.contains_key(&FileSlot::MedicalCertificate));

        let bytes = engine.download(&User::student(7), submission.id).unwrap();
        assert_eq!(bytes, first.bytes);
        assert_eq!(
            engine.download(&User::student(8), submission.id).unwrap_err().kind(),
            "forbidden"
        );
    }

    #[test]
    fn test_render_failure_rolls_back() {
        let fx = Fixture::new();
        let renderer = StubRenderer {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let engine = fx.engine(&renderer);
        let submission = fx.submitted(&engine, &User::student(7));
        engine.verify(&staff(), submission.id).unwrap();

        let err = engine.issue(&staff(), submission.id).unwrap_err();
        assert_eq!(err.kind(), "external_service_error");
        assert_eq!(err.http_status(), 502);

        let stored = fx.db.get_submission(submission.id).unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Verified);
        assert!(stored.certificate.is_none());
        assert!(engine.download(&User::student(7), submission.id).is_err());
    }

    #[test]
    fn test_reject_requires_reason_and_reupload_clears_it() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let student = User::student(7);
        let submission = fx.submitted(&engine, &student);

        assert_eq!(
            engine.reject(&staff(), submission.id, "   ").unwrap_err().kind(),
            "missing_field"
        );
        let rejected = engine.reject(&staff(), submission.id, "blurry X-ray").unwrap();
        assert_eq!(rejected.status, SubmissionStatus::Rejected);

        let again = engine
            .upload(&student, fx.year, FileSlot::ChestXray, UploadedFile::new("x.png", vec![3]))
            .unwrap();
        assert_eq!(again.status, SubmissionStatus::Pending);
        assert!(again.rejection_reason.is_none());
        assert!(again.reviewed_by.is_none());
        assert!(again.reviewed_at.is_none());
    }

    #[test]
    fn test_advise_and_queue() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let submission = fx.submitted(&engine, &User::student(7));

        let advised = engine
            .advise_for_consultation(&staff(), submission.id, "elevated BP")
            .unwrap();
        assert_eq!(advised.status, SubmissionStatus::ForConsultation);
        assert_eq!(advised.advised_by, Some(50));

        // The patient profile has no campus, so every staff member sees it
        let queue = engine
            .review_queue(&staff(), Some(SubmissionStatus::ForConsultation))
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert!(engine.review_queue(&User::student(7), None).is_err());
    }

    #[test]
    fn test_email_audit_requires_issued() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let submission = fx.submitted(&engine, &User::student(7));
        assert!(engine.record_certificate_emailed(&staff(), submission.id).is_err());

        engine.verify(&staff(), submission.id).unwrap();
        engine.issue(&staff(), submission.id).unwrap();
        let audited = engine.record_certificate_emailed(&staff(), submission.id).unwrap();
        assert_eq!(audited.certificate_emailed_by, Some(50));
    }

    #[test]
    fn test_staff_cannot_act_before_submission() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let submission = fx.upload_all(&engine, &User::student(7));
        assert!(submission.submitted_at.is_none());

        assert_eq!(
            engine.verify(&staff(), submission.id).unwrap_err().kind(),
            "illegal_transition"
        );
        assert_eq!(
            engine.reject(&staff(), submission.id, "blurry").unwrap_err().kind(),
            "illegal_transition"
        );
        assert_eq!(
            engine
                .advise_for_consultation(&staff(), submission.id, "elevated BP")
                .unwrap_err()
                .kind(),
            "illegal_transition"
        );

        let stored = fx.db.get_submission(submission.id).unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Pending);
        assert!(stored.reviewed_by.is_none());
    }

    #[test]
    fn test_upload_after_submit_requires_resubmission() {
        let fx = Fixture::new();
        let renderer = StubRenderer::new();
        let engine = fx.engine(&renderer);
        let student = User::student(7);
        let submission = fx.submitted(&engine, &student);
        assert!(submission.submitted_at.is_some());

        let changed = engine
            .upload(&student, fx.year, FileSlot::Cbc, UploadedFile::new("cbc-v2.pdf", vec![9]))
            .unwrap();
        assert!(changed.submitted_at.is_none());
        assert_eq!(
            engine.verify(&staff(), submission.id).unwrap_err().kind(),
            "illegal_transition"
        );

        engine.submit_for_review(&student, fx.year).unwrap();
        let verified = engine.verify(&staff(), submission.id).unwrap();
        assert_eq!(verified.status, SubmissionStatus::Verified);
    }
}

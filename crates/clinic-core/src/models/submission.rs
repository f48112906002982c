//! Medical document submission models and the review state machine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::StaffSnapshot;
use crate::error::StateError;

/// Named document slot on a submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FileSlot {
    ChestXray,
    Cbc,
    BloodTyping,
    Urinalysis,
    DrugTest,
    HepaB,
    /// Server-generated on issuance
    MedicalCertificate,
}

impl FileSlot {
    pub const REQUIRED: [FileSlot; 5] = [
        FileSlot::ChestXray,
        FileSlot::Cbc,
        FileSlot::BloodTyping,
        FileSlot::Urinalysis,
        FileSlot::DrugTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileSlot::ChestXray => "chest_xray",
            FileSlot::Cbc => "cbc",
            FileSlot::BloodTyping => "blood_typing",
            FileSlot::Urinalysis => "urinalysis",
            FileSlot::DrugTest => "drug_test",
            FileSlot::HepaB => "hepa_b",
            FileSlot::MedicalCertificate => "medical_certificate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chest_xray" => Some(FileSlot::ChestXray),
            "cbc" => Some(FileSlot::Cbc),
            "blood_typing" => Some(FileSlot::BloodTyping),
            "urinalysis" => Some(FileSlot::Urinalysis),
            "drug_test" => Some(FileSlot::DrugTest),
            "hepa_b" => Some(FileSlot::HepaB),
            "medical_certificate" => Some(FileSlot::MedicalCertificate),
            _ => None,
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    pub fn is_server_generated(&self) -> bool {
        matches!(self, FileSlot::MedicalCertificate)
    }
}

/// Reference to an uploaded file held by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    pub storage_key: String,
    pub file_name: String,
    /// SHA-256 of the content, hex encoded
    pub sha256: String,
    pub size_bytes: u64,
    pub uploaded_at: String,
}

/// An upload as received from the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }
}

/// Review status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    ForConsultation,
    Verified,
    Rejected,
    Issued,
}

/// Operations that move a submission through review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Upload,
    SubmitForReview,
    Verify,
    Reject,
    AdviseConsultation,
    Issue,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Upload => "upload",
            ReviewAction::SubmitForReview => "submit_for_review",
            ReviewAction::Verify => "verify",
            ReviewAction::Reject => "reject",
            ReviewAction::AdviseConsultation => "advise_for_consultation",
            ReviewAction::Issue => "issue",
        }
    }
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::ForConsultation => "for_consultation",
            SubmissionStatus::Verified => "verified",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Issued => "issued",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "for_consultation" => Some(SubmissionStatus::ForConsultation),
            "verified" => Some(SubmissionStatus::Verified),
            "rejected" => Some(SubmissionStatus::Rejected),
            "issued" => Some(SubmissionStatus::Issued),
            _ => None,
        }
    }

    /// Transition table for the review state machine.
    pub fn apply(self, action: ReviewAction) -> Result<SubmissionStatus, StateError> {
        use ReviewAction as A;
        use SubmissionStatus as S;

        let next = match (self, action) {
            (S::Pending | S::Rejected | S::ForConsultation, A::Upload) => S::Pending,
            (S::Pending, A::SubmitForReview) => S::Pending,
            (S::Pending | S::ForConsultation, A::Verify) => S::Verified,
            (S::Pending | S::ForConsultation, A::Reject) => S::Rejected,
            (S::Pending, A::AdviseConsultation) => S::ForConsultation,
            (S::Verified | S::Issued, A::Issue) => S::Issued,
            (from, action) => {
                return Err(StateError::IllegalTransition {
                    entity: "submission",
                    from: from.as_str().to_string(),
                    action: action.as_str().to_string(),
                })
            }
        };
        Ok(next)
    }
}

/// One patient's document set for an academic year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSubmission {
    pub id: i64,
    pub user_id: i64,
    pub patient_snapshot_id: i64,
    pub academic_year_id: i64,
    pub files: BTreeMap<FileSlot, FileRef>,
    pub status: SubmissionStatus,
    pub submitted_at: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<String>,
    pub rejection_reason: Option<String>,
    pub consultation_reason: Option<String>,
    pub advised_by: Option<i64>,
    pub advised_at: Option<String>,
    #[serde(skip)]
    pub certificate: Option<Vec<u8>>,
    pub issued_at: Option<String>,
    pub issued_by: Option<i64>,
    pub issuer: Option<StaffSnapshot>,
    pub certificate_emailed_at: Option<String>,
    pub certificate_emailed_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentSubmission {
    pub fn new(user_id: i64, patient_snapshot_id: i64, academic_year_id: i64) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: 0,
            user_id,
            patient_snapshot_id,
            academic_year_id,
            files: BTreeMap::new(),
            status: SubmissionStatus::Pending,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            consultation_reason: None,
            advised_by: None,
            advised_at: None,
            certificate: None,
            issued_at: None,
            issued_by: None,
            issuer: None,
            certificate_emailed_at: None,
            certificate_emailed_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn missing_required(&self) -> Vec<FileSlot> {
        FileSlot::REQUIRED
            .into_iter()
            .filter(|slot| !self.files.contains_key(slot))
            .collect()
    }

    /// True iff every required slot is populated.
    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// `floor(100 * populated_required / required)`.
    pub fn completion_percentage(&self) -> u8 {
        let required = FileSlot::REQUIRED.len();
        let populated = required - self.missing_required().len();
        (100 * populated / required) as u8
    }

    pub fn has_certificate(&self) -> bool {
        self.certificate.as_ref().is_some_and(|bytes| !bytes.is_empty())
    }
}

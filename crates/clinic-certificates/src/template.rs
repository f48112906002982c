//! Certificate wording, independent of the output format.

use clinic_core::CertificateRequest;
use serde::{Deserialize, Serialize};

use crate::CertificateError;

/// Clinic name and address printed at the top of every certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicLetterhead {
    pub clinic_name: String,
    pub address: String,
}

impl Default for ClinicLetterhead {
    fn default() -> Self {
        Self {
            clinic_name: "University Health Services".into(),
            address: "Campus Clinic".into(),
        }
    }
}

/// The lines of a medical certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateText {
    pub heading: Vec<String>,
    pub title: String,
    pub reference: String,
    pub body: String,
    pub issue_date: String,
    pub signatory: Vec<String>,
}

impl CertificateText {
    pub fn compose(
        letterhead: &ClinicLetterhead,
        request: &CertificateRequest<'_>,
    ) -> Result<Self, CertificateError> {
        let issuer = request.issuer;
        if issuer.name.trim().is_empty() {
            return Err(CertificateError::MissingField("issuer name"));
        }

        let demographics = &request.patient.demographics;
        let name = match request.patient.display_name() {
            name if name.is_empty() => format!("Student #{}", request.patient.user_id),
            name => name,
        };
        let mut subject = name.to_uppercase();
        if let Some(student_id) = demographics.student_id.as_deref().filter(|s| !s.trim().is_empty()) {
            subject.push_str(&format!(" (ID {})", student_id.trim()));
        }
        let enrolment = match (demographics.course.as_deref(), demographics.year_level.as_deref()) {
            (Some(course), Some(level)) => format!(", {} {},", course, level),
            (Some(course), None) => format!(", {},", course),
            _ => String::new(),
        };

        let body = format!(
            "This is to certify that {}{} has submitted the required laboratory \
             results for the {} semester, which were reviewed by this office and found \
             to be within acceptable limits. The student is physically fit to attend \
             classes and take part in school activities.",
            subject,
            enrolment,
            request.patient.semester.as_str()
        );

        let mut signatory = vec![issuer.name.to_uppercase(), issuer.position.clone()];
        if let Some(license) = issuer.license_no.as_deref() {
            signatory.push(format!("License No. {}", license));
        }
        if let Some(ptr) = issuer.ptr_no.as_deref() {
            signatory.push(format!("PTR No. {}", ptr));
        }

        Ok(Self {
            heading: vec![letterhead.clinic_name.clone(), letterhead.address.clone()],
            title: "MEDICAL CERTIFICATE".into(),
            reference: format!("Ref. MC-{:06}", request.submission_id),
            body,
            issue_date: request.issue_date.format("%B %-d, %Y").to_string(),
            signatory,
        })
    }
}

/// Greedy word wrap at `max_chars`.
pub(crate) fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

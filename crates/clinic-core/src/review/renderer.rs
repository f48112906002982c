//! Seam to the certificate template service.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{PatientSnapshot, StaffSnapshot};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("renderer returned an empty document")]
    EmptyOutput,
}

/// Everything printed on a medical certificate.
#[derive(Debug, Clone, Copy)]
pub struct CertificateRequest<'a> {
    pub submission_id: i64,
    pub patient: &'a PatientSnapshot,
    pub issuer: &'a StaffSnapshot,
    pub issue_date: NaiveDate,
}

/// Turns a certificate request into document bytes.
pub trait CertificateRenderer: Send + Sync {
    fn render(&self, request: &CertificateRequest<'_>) -> Result<Vec<u8>, RenderError>;
}

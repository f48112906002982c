//! Clinic Certificates
//!
//! Renderers for the medical certificate issued once a student's
//! documents are verified. Both implement
//! [`clinic_core::CertificateRenderer`]:
//!
//! - [`PdfCertificateRenderer`] lays the certificate out on an A4 page
//!   with `printpdf` (feature `pdf`, on by default).
//! - [`MockRenderer`] emits the certificate text as JSON bytes. Output is
//!   a pure function of the request.

mod mock;
#[cfg(feature = "pdf")]
mod pdf;
mod template;

pub use mock::MockRenderer;
#[cfg(feature = "pdf")]
pub use pdf::PdfCertificateRenderer;
pub use template::{CertificateText, ClinicLetterhead};

use clinic_core::RenderError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CertificateError {
    #[error("certificate is missing {0}")]
    MissingField(&'static str),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<CertificateError> for RenderError {
    fn from(e: CertificateError) -> Self {
        RenderError::Template(e.to_string())
    }
}

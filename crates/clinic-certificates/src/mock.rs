//! Deterministic renderer for tests and offline deployments.

use std::sync::atomic::{AtomicUsize, Ordering};

use clinic_core::{CertificateRenderer, CertificateRequest, RenderError};
use tracing::debug;

use crate::template::{CertificateText, ClinicLetterhead};
use crate::CertificateError;

/// Renders the certificate text as JSON, prefixed with a marker line.
#[derive(Debug, Default)]
pub struct MockRenderer {
    letterhead: ClinicLetterhead,
    calls: AtomicUsize,
    fail_with: Option<String>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer whose every call fails, for exercising rollback paths.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Number of render calls so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CertificateRenderer for MockRenderer {
    fn render(&self, request: &CertificateRequest<'_>) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(RenderError::Template(message.clone()));
        }

        let text = CertificateText::compose(&self.letterhead, request)?;
        let mut bytes = b"MOCK-CERTIFICATE\n".to_vec();
        serde_json::to_writer(&mut bytes, &text)
            .map_err(|e| CertificateError::Encoding(e.to_string()))?;
        debug!(submission_id = request.submission_id, size = bytes.len(), "mock certificate rendered");
        Ok(bytes)
    }
}

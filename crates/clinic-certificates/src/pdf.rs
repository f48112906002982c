//! A4 certificate layout with `printpdf`.

use std::io::BufWriter;

use clinic_core::{CertificateRenderer, CertificateRequest, RenderError};
use printpdf::*;
use tracing::debug;

use crate::template::{wrap_text, CertificateText, ClinicLetterhead};
use crate::CertificateError;

/// Characters per body line at 11pt Helvetica across the text block.
const BODY_WRAP: usize = 85;

#[derive(Debug, Clone, Default)]
pub struct PdfCertificateRenderer {
    letterhead: ClinicLetterhead,
}

impl PdfCertificateRenderer {
    pub fn new(letterhead: ClinicLetterhead) -> Self {
        Self { letterhead }
    }

    fn layout(&self, text: &CertificateText) -> Result<Vec<u8>, CertificateError> {
        let (doc, page1, layer1) = PdfDocument::new(&text.title, Mm(210.0), Mm(297.0), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| CertificateError::Pdf(format!("font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| CertificateError::Pdf(format!("font error: {e}")))?;

        let mut y = Mm(275.0);

        for (i, line) in text.heading.iter().enumerate() {
            let (size, face) = if i == 0 { (14.0, &bold) } else { (10.0, &font) };
            layer.use_text(line, size, Mm(20.0), y, face);
            y -= Mm(6.0);
        }

        y -= Mm(14.0);
        layer.use_text(&text.title, 18.0, Mm(62.0), y, &bold);
        y -= Mm(8.0);
        layer.use_text(&text.reference, 9.0, Mm(20.0), y, &font);
        layer.use_text(&text.issue_date, 9.0, Mm(150.0), y, &font);

        y -= Mm(16.0);
        for line in wrap_text(&text.body, BODY_WRAP) {
            layer.use_text(&line, 11.0, Mm(20.0), y, &font);
            y -= Mm(6.0);
        }

        y -= Mm(30.0);
        for (i, line) in text.signatory.iter().enumerate() {
            let (size, face) = if i == 0 { (11.0, &bold) } else { (9.0, &font) };
            layer.use_text(line, size, Mm(120.0), y, face);
            y -= Mm(5.0);
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| CertificateError::Pdf(format!("save error: {e}")))?;
        buf.into_inner()
            .map_err(|e| CertificateError::Pdf(format!("buffer error: {e}")))
    }
}

impl CertificateRenderer for PdfCertificateRenderer {
    fn render(&self, request: &CertificateRequest<'_>) -> Result<Vec<u8>, RenderError> {
        let text = CertificateText::compose(&self.letterhead, request)?;
        let bytes = self.layout(&text)?;
        debug!(submission_id = request.submission_id, size = bytes.len(), "certificate PDF rendered");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clinic_core::models::StaffSnapshot;
    use clinic_core::{PatientSnapshot, Semester};

    #[test]
    fn test_renders_pdf() {
        let mut patient = PatientSnapshot::blank(7, 1, Semester::Second);
        patient.demographics.first_name = Some("Maria".into());
        patient.demographics.surname = Some("Santos".into());
        let issuer = StaffSnapshot {
            user_id: 50,
            name: "Ana Reyes, MD".into(),
            position: "University Physician".into(),
            ..Default::default()
        };
        let request = CertificateRequest {
            submission_id: 12,
            patient: &patient,
            issuer: &issuer,
            issue_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
        };

        let bytes = PdfCertificateRenderer::default().render(&request).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }
}

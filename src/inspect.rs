//! Read-back checks on produced PDFs.

use lopdf::Document as LoDocument;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectErrorCode {
    ParseFailed,
    Encrypted,
    PageCountMismatch,
    Io,
}

impl InspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectErrorCode::ParseFailed => "PDF_PARSE_FAILED",
            InspectErrorCode::Encrypted => "PDF_ENCRYPTED",
            InspectErrorCode::PageCountMismatch => "PDF_PAGE_COUNT_MISMATCH",
            InspectErrorCode::Io => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", code.as_str())]
pub struct InspectError {
    pub code: InspectErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfReport, InspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| InspectError {
        code: InspectErrorCode::ParseFailed,
        message: err.to_string(),
    })?;

    Ok(PdfReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfReport, InspectError> {
    let data = std::fs::read(path).map_err(|err| InspectError {
        code: InspectErrorCode::Io,
        message: format!("{}: {err}", path.display()),
    })?;
    inspect_pdf_bytes(&data)
}

/// Checks that a written sheet file is readable and holds exactly the sheets
/// that were printed.
pub fn require_sheet_count(report: &PdfReport, expected: usize) -> Result<(), InspectError> {
    if report.encrypted {
        return Err(InspectError {
            code: InspectErrorCode::Encrypted,
            message: "output pdf is encrypted".to_string(),
        });
    }
    if report.page_count != expected {
        return Err(InspectError {
            code: InspectErrorCode::PageCountMismatch,
            message: format!(
                "expected {expected} sheet(s), found {} page(s)",
                report.page_count
            ),
        });
    }
    Ok(())
}

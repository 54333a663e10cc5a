//! Error types shared by the print engine and its backends.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    /// The design has no template, so no placement can be computed.
    #[error("label design has no template")]
    MissingTemplate,

    /// Template geometry failed construction-time validation.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// Requested cell range or counts do not fit the sheet.
    #[error("invalid print range: {0}")]
    InvalidRange(String),

    /// The template's outline style cannot be drawn or clipped.
    #[error("unsupported outline style \"{0}\"")]
    UnsupportedOutline(String),

    /// The barcode symbology rejected its input.
    #[error("barcode error: {0}")]
    Barcode(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("font error: {0}")]
    Font(String),

    /// No label was placed and the caller asked for that to be an error.
    #[error("nothing to print: no selected merge records")]
    NothingToPrint,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

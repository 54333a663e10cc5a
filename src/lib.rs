//! Label and business-card sheet printing.
//!
//! A [`LabelDesign`] bound to a sheet [`Template`] is placed into the grid
//! cells of freshly created sheets, either repeated (simple mode) or once per
//! merge record and copy (merge mode). Sheets are recorded on a [`Canvas`] and
//! written as PDF, with optional PNG proofs.

mod assets;
mod barcode;
mod canvas;
mod design;
mod error;
mod font;
mod inspect;
mod merge;
mod outline;
mod pdf;
mod print;
mod raster;
mod render;
mod template;
mod transform;
mod types;

pub use assets::{RasterImage, parse_data_uri};
pub use barcode::{BarChar, BarLine, BarcodeGeometry, Symbology};
pub use canvas::{Canvas, Command, Document, Page, StateGuard};
pub use design::{
    BarcodeObject, DesignSpec, FontSpec, FontWeight, ImageObject, Justification, LabelDesign,
    LabelObject, LineObject, ShapeObject, TextObject,
};
pub use error::LabelError;
pub use font::{FontRegistry, base14_variant_name, is_base14};
pub use inspect::{
    InspectError, InspectErrorCode, PdfReport, inspect_pdf_bytes, inspect_pdf_path,
    require_sheet_count,
};
pub use merge::{MergeRecord, MergeSource, RecordList, expand};
pub use outline::{OUTLINE_GRAY, OUTLINE_LINE_WIDTH, OutlineSpec, Path, PathOp};
pub use pdf::PdfOptions;
pub use print::{
    BatchRequest, Collation, LABEL_META_KEY, OutlinePolicy, PrintJob, PrintOptions, PrintSummary,
    SheetSequencer, SheetState, merge_order,
};
pub use raster::DEFAULT_DPI;
pub use template::{Cell, OutlineStyle, PaperSize, Template, TemplateSpec, paper_size_by_name};
pub use transform::{Affine, Placement, TransformStep};
pub use types::{Color, Pt, Rgba, Size};

use log::{debug, info};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

/// What a run that placed no label produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyOutput {
    /// A document with no pages.
    #[default]
    Allow,
    /// One blank sheet.
    BlankSheet,
    /// [`LabelError::NothingToPrint`].
    Reject,
}

/// Print engine configured once and reused for any number of designs.
pub struct SheetPrinter {
    fonts: Arc<FontRegistry>,
    pdf_options: PdfOptions,
    empty_output: EmptyOutput,
    outline_policy: OutlinePolicy,
}

#[derive(Debug, Clone, Default)]
pub struct SheetPrinterBuilder {
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    pdf_options: PdfOptions,
    empty_output: EmptyOutput,
    outline_policy: OutlinePolicy,
}

impl SheetPrinter {
    pub fn builder() -> SheetPrinterBuilder {
        SheetPrinterBuilder::new()
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    /// Runs `design` as described by `request` and returns the recorded sheets.
    pub fn print_document(
        &self,
        design: &LabelDesign,
        request: &BatchRequest,
    ) -> Result<(Document, PrintSummary), LabelError> {
        let mut job = PrintJob::new(design, &self.fonts, self.outline_policy)?;
        job.print_batch(request)?;
        let template_name = job.template().name().to_string();
        let (mut document, mut summary) = job.into_document();

        if summary.labels == 0 {
            match self.empty_output {
                EmptyOutput::Allow => {
                    debug!("\"{template_name}\": nothing placed, no sheets");
                }
                EmptyOutput::BlankSheet => {
                    document.pages.push(Page {
                        name: "sheet 1".to_string(),
                        commands: Vec::new(),
                    });
                    summary.sheets = 1;
                    debug!("\"{template_name}\": nothing placed, one blank sheet");
                }
                EmptyOutput::Reject => return Err(LabelError::NothingToPrint),
            }
        }
        info!(
            "\"{template_name}\": {} label(s) on {} sheet(s)",
            summary.labels,
            document.pages.len()
        );
        Ok((document, summary))
    }

    pub fn render_to_buffer(
        &self,
        design: &LabelDesign,
        request: &BatchRequest,
    ) -> Result<Vec<u8>, LabelError> {
        let (document, _summary) = self.print_document(design, request)?;
        self.documents_to_buffer(std::slice::from_ref(&document))
    }

    /// Writes the sheets of every document, in order, as one PDF.
    pub fn documents_to_writer<W: std::io::Write>(
        &self,
        documents: &[Document],
        writer: &mut W,
    ) -> Result<usize, LabelError> {
        pdf::write_pdf(documents, &self.fonts, &self.pdf_options, writer)
    }

    pub fn documents_to_buffer(&self, documents: &[Document]) -> Result<Vec<u8>, LabelError> {
        pdf::documents_to_pdf(documents, &self.fonts, &self.pdf_options)
    }

    pub fn documents_to_file(
        &self,
        documents: &[Document],
        path: impl AsRef<FsPath>,
    ) -> Result<usize, LabelError> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        let written = self.documents_to_writer(documents, &mut file)?;
        std::io::Write::flush(&mut file)?;
        Ok(written)
    }

    /// One PNG per sheet at `dpi` (0 selects [`DEFAULT_DPI`]).
    pub fn render_image_pages(
        &self,
        document: &Document,
        dpi: u32,
    ) -> Result<Vec<Vec<u8>>, LabelError> {
        raster::document_to_png_pages(document, &self.fonts, dpi)
    }
}

impl SheetPrinterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    // Off leaves content streams readable, which helps when diffing output.
    pub fn compress(mut self, enabled: bool) -> Self {
        self.pdf_options.compress = enabled;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.pdf_options.title = Some(title.into());
        self
    }

    pub fn empty_output(mut self, policy: EmptyOutput) -> Self {
        self.empty_output = policy;
        self
    }

    pub fn outline_policy(mut self, policy: OutlinePolicy) -> Self {
        self.outline_policy = policy;
        self
    }

    pub fn build(self) -> Result<SheetPrinter, LabelError> {
        let mut registry = FontRegistry::new();
        for dir in &self.font_dirs {
            let count = registry.register_dir(dir)?;
            debug!("{count} font(s) from {}", dir.display());
        }
        for file in &self.font_files {
            registry.register_file(file)?;
        }
        Ok(SheetPrinter {
            fonts: Arc::new(registry),
            pdf_options: self.pdf_options,
            empty_output: self.empty_output,
            outline_policy: self.outline_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Arc<Template> {
        Arc::new(
            Template::new(
                "Avery 5371",
                PaperSize::Named("US Letter".to_string()),
                (2, 5),
                (Pt::from_i32(252), Pt::from_i32(144)),
                (Pt::from_i32(54), Pt::from_i32(36)),
                OutlineStyle::rect(Pt::from_i32(252), Pt::from_i32(144), Pt::from_i32(5)),
            )
            .unwrap(),
        )
    }

    fn text(body: &str) -> LabelObject {
        LabelObject::Text(TextObject {
            x: Pt::from_i32(9),
            y: Pt::from_i32(9),
            w: Pt::from_i32(200),
            h: Pt::from_i32(20),
            text: body.to_string(),
            font: FontSpec::default(),
            color: Rgba::BLACK,
            justify: Justification::Left,
        })
    }

    fn merge_design(records: RecordList) -> LabelDesign {
        LabelDesign::new(Some(template()), false, vec![text("${name}")])
            .with_merge(Arc::new(records))
    }

    fn printer(policy: EmptyOutput) -> SheetPrinter {
        SheetPrinter::builder()
            .compress(false)
            .empty_output(policy)
            .build()
            .unwrap()
    }

    #[test]
    fn simple_run_fills_every_cell_of_each_sheet() {
        let design = LabelDesign::new(Some(template()), false, vec![text("Hello")]);
        let request = BatchRequest {
            sheets: 2,
            ..BatchRequest::default()
        };
        let (document, summary) = printer(EmptyOutput::Allow)
            .print_document(&design, &request)
            .unwrap();
        assert_eq!(summary, PrintSummary { sheets: 2, labels: 20 });
        assert_eq!(document.pages.len(), 2);
        assert_eq!(document.pages[1].meta_values(LABEL_META_KEY).count(), 10);
    }

    #[test]
    fn empty_merge_follows_policy() {
        let design = merge_design(RecordList::default());
        let request = BatchRequest::default();

        let (document, _) = printer(EmptyOutput::Allow)
            .print_document(&design, &request)
            .unwrap();
        assert!(document.pages.is_empty());

        let (document, summary) = printer(EmptyOutput::BlankSheet)
            .print_document(&design, &request)
            .unwrap();
        assert_eq!(document.pages.len(), 1);
        assert!(document.pages[0].commands.is_empty());
        assert_eq!(summary, PrintSummary { sheets: 1, labels: 0 });

        assert!(matches!(
            printer(EmptyOutput::Reject).print_document(&design, &request),
            Err(LabelError::NothingToPrint)
        ));
    }

    #[test]
    fn pdf_holds_one_page_per_sheet() {
        let records: RecordList = (0..13)
            .map(|i| MergeRecord::new([("name", format!("Guest {i}"))]))
            .collect();
        let design = merge_design(records);
        let bytes = printer(EmptyOutput::Allow)
            .render_to_buffer(&design, &BatchRequest::default())
            .unwrap();
        let report = inspect_pdf_bytes(&bytes).unwrap();
        assert_eq!(report.page_count, 2);
        let pdf = String::from_utf8_lossy(&bytes);
        assert!(pdf.contains("(Guest 12) Tj"));
    }

    #[test]
    fn strict_policy_rejects_unsupported_outline() {
        let template = Arc::new(
            Template::new(
                "odd",
                PaperSize::default(),
                (1, 1),
                (Pt::from_i32(100), Pt::from_i32(100)),
                (Pt::ZERO, Pt::ZERO),
                OutlineStyle::Unsupported("odd".to_string()),
            )
            .unwrap(),
        );
        let design = LabelDesign::new(Some(template), false, vec![text("x")]);
        let strict = printer(EmptyOutput::Allow);
        assert!(matches!(
            strict.print_document(&design, &BatchRequest::default()),
            Err(LabelError::UnsupportedOutline(_))
        ));
        let lenient = SheetPrinter::builder()
            .outline_policy(OutlinePolicy::Lenient)
            .build()
            .unwrap();
        let (document, _) = lenient
            .print_document(&design, &BatchRequest::default())
            .unwrap();
        assert_eq!(document.pages.len(), 1);
    }

    #[test]
    fn missing_font_file_fails_build() {
        let result = SheetPrinter::builder()
            .register_font_file("/nonexistent/face.ttf")
            .build();
        assert!(result.is_err());
    }
}

//! Sheet traversal: which cell receives the next label, when sheets open and
//! close, and in which order merge records and their copies are placed.

use crate::canvas::{Canvas, Document};
use crate::design::LabelDesign;
use crate::error::LabelError;
use crate::font::FontRegistry;
use crate::merge::MergeRecord;
use crate::outline::{OutlineSpec, clip_to_outline, stroke_outline};
use crate::render::draw_objects;
use crate::template::{OutlineStyle, Template};
use crate::transform::Placement;
use crate::types::Size;
use log::{debug, warn};
use std::sync::Arc;

/// Marker key written before every placed label.
pub const LABEL_META_KEY: &str = "label";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrintOptions {
    /// Stroke each label's die-cut outline (printer alignment test).
    pub outline: bool,
    /// Mirror every label horizontally (iron-on transfers).
    pub mirror: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    /// All copies of a record are adjacent.
    #[default]
    Collated,
    /// One pass over all records per copy.
    Uncollated,
}

/// What to do when a template's outline style cannot be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutlinePolicy {
    /// Fail the job before any page is opened.
    #[default]
    Strict,
    /// Warn, then print without outline or clipping.
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetState {
    BeforeSheet,
    InSheet,
    Done,
}

/// Cell counter and sheet state shared by all traversal modes.
#[derive(Debug, Clone)]
pub struct SheetSequencer {
    per_sheet: usize,
    cell: usize,
    state: SheetState,
    sheets: usize,
}

impl SheetSequencer {
    /// `first_cell` is zero-based and must be below `per_sheet`.
    pub fn new(per_sheet: usize, first_cell: usize) -> Self {
        Self {
            per_sheet,
            cell: first_cell,
            state: SheetState::BeforeSheet,
            sheets: 0,
        }
    }

    pub fn state(&self) -> SheetState {
        self.state
    }

    pub fn cell(&self) -> usize {
        self.cell
    }

    /// Sheets opened so far.
    pub fn sheets(&self) -> usize {
        self.sheets
    }

    /// Claims the next cell. Returns the cell and whether a new sheet must be
    /// opened for it.
    pub fn claim(&mut self) -> (usize, bool) {
        let opens = self.state == SheetState::BeforeSheet;
        if opens {
            self.sheets += 1;
            self.state = SheetState::InSheet;
        }
        (self.cell, opens)
    }

    /// Advances past the claimed cell. Returns true when the sheet is full
    /// and must be closed now.
    pub fn advance(&mut self) -> bool {
        self.cell = (self.cell + 1) % self.per_sheet;
        if self.cell == 0 {
            self.state = SheetState::BeforeSheet;
            return true;
        }
        false
    }

    /// Ends the run. Returns true when a partly filled sheet is still open.
    pub fn finish(&mut self) -> bool {
        let open = self.state == SheetState::InSheet;
        self.state = SheetState::Done;
        open
    }
}

/// Indices of the selected records in the order their labels are placed.
/// Yields lazily, so large copy counts cost no memory up front.
pub fn merge_order(
    records: &[MergeRecord],
    copies: usize,
    collation: Collation,
) -> Box<dyn Iterator<Item = usize> + '_> {
    let selected = move || {
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_selected())
            .map(|(i, _)| i)
    };
    match collation {
        Collation::Collated => {
            Box::new(selected().flat_map(move |i| std::iter::repeat_n(i, copies)))
        }
        Collation::Uncollated => Box::new((0..copies).flat_map(move |_| selected())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrintSummary {
    pub sheets: usize,
    pub labels: usize,
}

/// Counts and options for [`PrintJob::print_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRequest {
    /// Sheets to print when the design has no merge source.
    pub sheets: usize,
    /// Copies of each record when it has one.
    pub copies: usize,
    pub collation: Collation,
    pub options: PrintOptions,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            sheets: 1,
            copies: 1,
            collation: Collation::Collated,
            options: PrintOptions::default(),
        }
    }
}

/// One print run of a design onto freshly created sheets.
pub struct PrintJob<'a> {
    canvas: Canvas,
    fonts: &'a FontRegistry,
    design: &'a LabelDesign,
    template: Arc<Template>,
    label_size: Size,
    outline: Option<OutlineSpec>,
    summary: PrintSummary,
}

impl<'a> PrintJob<'a> {
    pub fn new(
        design: &'a LabelDesign,
        fonts: &'a FontRegistry,
        outline_policy: OutlinePolicy,
    ) -> Result<Self, LabelError> {
        let template = design.template().cloned().ok_or(LabelError::MissingTemplate)?;
        let label_size = template.label_size(design.rotate());
        let outline = match (template.outline(), outline_policy) {
            (OutlineStyle::Unsupported(style), OutlinePolicy::Strict) => {
                return Err(LabelError::UnsupportedOutline(style.clone()));
            }
            (OutlineStyle::Unsupported(style), OutlinePolicy::Lenient) => {
                warn!(
                    "template \"{}\": outline style \"{style}\" is unsupported; labels print unclipped",
                    template.name()
                );
                None
            }
            (style, _) => Some(OutlineSpec::new(style, label_size)),
        };
        let canvas = Canvas::new(template.page_size());
        Ok(Self {
            canvas,
            fonts,
            design,
            template,
            label_size,
            outline,
            summary: PrintSummary::default(),
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn summary(&self) -> PrintSummary {
        self.summary
    }

    /// Repeats the design on cells `first..=last` (1-based) of each sheet.
    pub fn print_simple(
        &mut self,
        sheets: usize,
        first: usize,
        last: usize,
        options: PrintOptions,
    ) -> Result<(), LabelError> {
        let per_sheet = self.template.labels_per_sheet();
        check_first(first, per_sheet)?;
        if last < first || last > per_sheet {
            return Err(LabelError::InvalidRange(format!(
                "last cell {last} must be in [{first}, {per_sheet}]"
            )));
        }
        debug!("print simple: {sheets} sheet(s), cells {first}..={last}");
        for sheet in 0..sheets {
            self.begin_sheet(self.summary.sheets + 1);
            for cell in first - 1..last {
                self.print_label(cell, None, options)?;
            }
            self.canvas.show_page();
            debug!("sheet {} done", sheet + 1);
        }
        debug!("print simple: end");
        Ok(())
    }

    /// Places `copies` adjacent instances of each selected record.
    pub fn print_merge_collated(
        &mut self,
        records: &[MergeRecord],
        copies: usize,
        first: usize,
        options: PrintOptions,
    ) -> Result<(), LabelError> {
        debug!("print merge collated: {} record(s) x {copies}", records.len());
        self.print_merge(records, copies, first, Collation::Collated, options)
    }

    /// Places one instance of every selected record per copy pass.
    pub fn print_merge_uncollated(
        &mut self,
        records: &[MergeRecord],
        copies: usize,
        first: usize,
        options: PrintOptions,
    ) -> Result<(), LabelError> {
        debug!("print merge uncollated: {} record(s) x {copies}", records.len());
        self.print_merge(records, copies, first, Collation::Uncollated, options)
    }

    fn print_merge(
        &mut self,
        records: &[MergeRecord],
        copies: usize,
        first: usize,
        collation: Collation,
        options: PrintOptions,
    ) -> Result<(), LabelError> {
        let per_sheet = self.template.labels_per_sheet();
        check_first(first, per_sheet)?;
        let mut sequencer = SheetSequencer::new(per_sheet, first - 1);
        for index in merge_order(records, copies, collation) {
            let (cell, opens) = sequencer.claim();
            if opens {
                self.begin_sheet(self.summary.sheets + 1);
            }
            self.print_label(cell, Some((index, &records[index])), options)?;
            if sequencer.advance() {
                self.canvas.show_page();
            }
        }
        if sequencer.finish() {
            self.canvas.show_page();
        }
        debug!("print merge: end, {} sheet(s)", sequencer.sheets());
        Ok(())
    }

    /// Simple mode without a merge source, collated or uncollated merge
    /// otherwise. Merge output always starts at the first cell.
    pub fn print_batch(&mut self, request: &BatchRequest) -> Result<(), LabelError> {
        let per_sheet = self.template.labels_per_sheet();
        match self.design.merge() {
            None => self.print_simple(request.sheets, 1, per_sheet, request.options),
            Some(source) => {
                let records = source.records()?;
                match request.collation {
                    Collation::Collated => {
                        self.print_merge_collated(&records, request.copies, 1, request.options)
                    }
                    Collation::Uncollated => {
                        self.print_merge_uncollated(&records, request.copies, 1, request.options)
                    }
                }
            }
        }
    }

    fn begin_sheet(&mut self, number: usize) {
        self.canvas.begin_page(format!("sheet {number}"));
        self.summary.sheets = number;
        debug!("begin sheet {number}");
    }

    /// Places one label: save, transform, outline, clip, draw, restore.
    fn print_label(
        &mut self,
        cell: usize,
        record: Option<(usize, &MergeRecord)>,
        options: PrintOptions,
    ) -> Result<(), LabelError> {
        let placement = Placement::build(
            &self.template,
            cell,
            self.label_size,
            self.design.rotate(),
            options.mirror,
        )
        .ok_or_else(|| LabelError::InvalidRange(format!("cell {cell} is outside the sheet")))?;

        let record_tag = record
            .map(|(index, _)| (index + 1).to_string())
            .unwrap_or_else(|| "-".to_string());
        self.canvas.meta(
            LABEL_META_KEY,
            format!(
                "sheet={} cell={cell} record={record_tag}",
                self.summary.sheets
            ),
        );

        let mut guard = self.canvas.save();
        placement.apply(&mut guard);
        if let Some(outline) = &self.outline {
            if options.outline {
                stroke_outline(&mut guard, outline)?;
            }
            clip_to_outline(&mut guard, outline)?;
        }
        draw_objects(
            &mut guard,
            self.fonts,
            self.design.objects(),
            record.map(|(_, r)| r),
        );
        drop(guard);
        self.summary.labels += 1;
        Ok(())
    }

    /// Finishes the run and returns the recorded sheets.
    pub fn into_document(self) -> (Document, PrintSummary) {
        (self.canvas.finish(), self.summary)
    }
}

fn check_first(first: usize, per_sheet: usize) -> Result<(), LabelError> {
    if first == 0 || first > per_sheet {
        return Err(LabelError::InvalidRange(format!(
            "first cell {first} must be in [1, {per_sheet}]"
        )));
    }
    Ok(())
}

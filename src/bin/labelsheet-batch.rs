//! Prints label job files onto sheets and writes them as one PDF.

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use labelsheet::{
    BatchRequest, Collation, DesignSpec, Document, EmptyOutput, LabelDesign, PrintOptions,
    RecordList, SheetPrinter, Template, inspect_pdf_path, require_sheet_count,
};
use log::{error, info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print label designs onto sheets", long_about = None)]
struct Cli {
    /// Job files: JSON with "template", "design" and optional "records".
    #[arg(required = true)]
    jobs: Vec<PathBuf>,

    #[arg(short, long, default_value = "output.pdf")]
    output: PathBuf,

    /// Sheets to print for jobs without records.
    #[arg(short, long, default_value_t = 1)]
    sheets: usize,

    /// Copies of each record for jobs with records.
    #[arg(short, long, default_value_t = 1)]
    copies: usize,

    /// Print label outlines (printer alignment test).
    #[arg(short = 'l', long)]
    outline: bool,

    /// Mirror every label.
    #[arg(short = 'r', long)]
    reverse: bool,

    /// One pass over all records per copy instead of adjacent copies.
    #[arg(long)]
    uncollated: bool,

    /// Register a TrueType font (repeatable).
    #[arg(long = "font")]
    fonts: Vec<PathBuf>,

    /// Also write one PNG proof per sheet next to the output.
    #[arg(long)]
    png_dpi: Option<u32>,

    /// What a job that places no label produces.
    #[arg(long, value_enum, default_value_t = EmptyArg::Allow)]
    empty: EmptyArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmptyArg {
    Allow,
    Blank,
    Reject,
}

impl From<EmptyArg> for EmptyOutput {
    fn from(arg: EmptyArg) -> Self {
        match arg {
            EmptyArg::Allow => EmptyOutput::Allow,
            EmptyArg::Blank => EmptyOutput::BlankSheet,
            EmptyArg::Reject => EmptyOutput::Reject,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobFile {
    template: Template,
    #[serde(default)]
    design: DesignSpec,
    records: Option<RecordList>,
}

impl JobFile {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn into_design(self) -> LabelDesign {
        let design = LabelDesign::from_spec(Some(Arc::new(self.template)), self.design);
        match self.records {
            Some(records) => design.with_merge(Arc::new(records)),
            None => design,
        }
    }
}

impl Cli {
    fn request(&self) -> BatchRequest {
        BatchRequest {
            sheets: self.sheets,
            copies: self.copies,
            collation: if self.uncollated {
                Collation::Uncollated
            } else {
                Collation::Collated
            },
            options: PrintOptions {
                outline: self.outline,
                mirror: self.reverse,
            },
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run(Cli::parse()) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut builder = SheetPrinter::builder().empty_output(cli.empty.into());
    for font in &cli.fonts {
        builder = builder.register_font_file(font);
    }
    let printer = builder.build().context("cannot set up printer")?;
    let request = cli.request();

    let mut documents: Vec<Document> = Vec::new();
    for path in &cli.jobs {
        match print_job(&printer, path, &request) {
            Ok(document) => documents.push(document),
            Err(err) => eprintln!("{}: skipped: {err:#}", path.display()),
        }
    }
    if documents.is_empty() {
        bail!("no job printed; {} not written", cli.output.display());
    }

    let sheets: usize = documents.iter().map(|d| d.pages.len()).sum();
    let written = printer
        .documents_to_file(&documents, &cli.output)
        .with_context(|| format!("cannot write {}", cli.output.display()))?;
    let report = inspect_pdf_path(&cli.output)?;
    require_sheet_count(&report, sheets)?;
    info!(
        "wrote {}: {} sheet(s), PDF {}, {written} bytes",
        cli.output.display(),
        report.page_count,
        report.pdf_version
    );

    if let Some(dpi) = cli.png_dpi {
        let mut sheet = 0usize;
        for document in &documents {
            for png in printer.render_image_pages(document, dpi)? {
                sheet += 1;
                let path = proof_path(&cli.output, sheet);
                std::fs::write(&path, png)
                    .with_context(|| format!("cannot write {}", path.display()))?;
            }
        }
        info!("wrote {sheet} PNG proof(s) at {dpi} DPI");
    }
    Ok(())
}

fn print_job(printer: &SheetPrinter, path: &Path, request: &BatchRequest) -> Result<Document> {
    let mut design = JobFile::load(path)?.into_design();
    let missing = design.load_images();
    if missing > 0 {
        warn!("{}: {missing} image(s) could not be loaded", path.display());
    }
    let (document, summary) = printer.print_document(&design, request)?;
    info!(
        "{}: {} label(s), {} sheet(s)",
        path.display(),
        summary.labels,
        document.pages.len()
    );
    Ok(document)
}

/// `labels.pdf` -> `labels-3.png` for sheet 3.
fn proof_path(output: &Path, sheet: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output.with_file_name(format!("{stem}-{sheet}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = r#"{
        "template": {
            "name": "Avery 5160",
            "page_size": "US Letter",
            "nx": 3, "ny": 10,
            "dx": 198, "dy": 72,
            "x0": 11.25, "y0": 36,
            "label": {"style": "rect", "width": 189, "height": 72, "round": 5}
        },
        "design": {
            "objects": [
                {"type": "text", "x": 6, "y": 6, "w": 170, "text": "${name}\n${city}"}
            ]
        },
        "records": [
            {"name": "Ada", "city": "London"},
            {"selected": false, "fields": {"name": "Skipped"}}
        ]
    }"#;

    #[test]
    fn job_file_parses_into_merge_design() {
        let job: JobFile = serde_json::from_str(JOB).unwrap();
        assert_eq!(job.template.labels_per_sheet(), 30);
        assert_eq!(job.records.as_ref().map(|r| r.selected_count()), Some(1));
        let design = job.into_design();
        assert!(design.merge().is_some());
        assert_eq!(design.objects().len(), 1);
    }

    #[test]
    fn invalid_template_is_a_parse_error() {
        let bad = JOB.replace("\"nx\": 3", "\"nx\": 0");
        assert!(serde_json::from_str::<JobFile>(&bad).is_err());
    }

    #[test]
    fn cli_flags_build_the_request() {
        let cli = Cli::parse_from([
            "labelsheet-batch",
            "-c",
            "3",
            "-l",
            "-r",
            "--uncollated",
            "--empty",
            "blank",
            "job.json",
        ]);
        let request = cli.request();
        assert_eq!(request.copies, 3);
        assert_eq!(request.sheets, 1);
        assert_eq!(request.collation, Collation::Uncollated);
        assert!(request.options.outline && request.options.mirror);
        assert_eq!(EmptyOutput::from(cli.empty), EmptyOutput::BlankSheet);
        assert_eq!(cli.output, PathBuf::from("output.pdf"));
    }

    #[test]
    fn proofs_sit_next_to_the_output() {
        assert_eq!(
            proof_path(Path::new("out/labels.pdf"), 3),
            PathBuf::from("out/labels-3.png")
        );
    }
}

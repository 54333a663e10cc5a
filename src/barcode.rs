//! Barcode symbologies, encoded with `barcoders` and laid out as vertical
//! bar lines plus human-readable characters.

use crate::error::LabelError;
use barcoders::sym::code128::Code128;
use barcoders::sym::code39::Code39;
use barcoders::sym::code93::Code93;
use barcoders::sym::ean13::EAN13;
use barcoders::sym::ean8::EAN8;
use barcoders::sym::tf::TF;
use serde::Deserialize;

/// Width of one module at scale 1, in points.
pub const MODULE_WIDTH: f32 = 1.0;
/// Bar height at scale 1, in points.
pub const BAR_HEIGHT: f32 = 36.0;
/// Size of the human-readable characters at scale 1.
pub const TEXT_SIZE: f32 = 8.0;
/// Face used for human-readable characters and the invalid-data notice.
pub const BARCODE_FONT: &str = "Courier";

const TEXT_GAP: f32 = 2.0;
// Courier advance, 600/1000 em.
const COURIER_ADVANCE: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Code39,
    #[serde(alias = "code39c")]
    Code39Checksum,
    Code93,
    #[default]
    Code128,
    Ean8,
    Ean13,
    #[serde(alias = "itf", alias = "interleaved2of5")]
    Interleaved2Of5,
}

impl Symbology {
    /// Encodes `data` into a module sequence (1 = bar, 0 = space).
    pub fn modules(self, data: &str) -> Result<Vec<u8>, LabelError> {
        if data.is_empty() {
            return Err(LabelError::Barcode("empty barcode data".to_string()));
        }
        let encoded = match self {
            Symbology::Code39 => Code39::new(data).map(|b| b.encode()),
            Symbology::Code39Checksum => Code39::with_checksum(data).map(|b| b.encode()),
            Symbology::Code93 => Code93::new(data).map(|b| b.encode()),
            Symbology::Code128 => Code128::new(code128_input(data)).map(|b| b.encode()),
            Symbology::Ean8 => EAN8::new(data).map(|b| b.encode()),
            Symbology::Ean13 => EAN13::new(data).map(|b| b.encode()),
            Symbology::Interleaved2Of5 => TF::interleaved(data).map(|b| b.encode()),
        };
        encoded.map_err(|err| LabelError::Barcode(format!("{self:?} rejected \"{data}\": {err}")))
    }
}

/// Code 128 needs a leading character-set selector: set C packs digit pairs,
/// set B covers printable ASCII.
fn code128_input(data: &str) -> String {
    let digits_only = data.chars().all(|ch| ch.is_ascii_digit());
    if digits_only && data.len() % 2 == 0 {
        format!("\u{0106}{data}")
    } else {
        format!("\u{0181}{data}")
    }
}

/// One vertical bar. `x` is the bar's centre line; the bar runs from `y`
/// down the label for `length`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarLine {
    pub x: f32,
    pub y: f32,
    pub length: f32,
    pub width: f32,
}

/// A human-readable character whose cell top-left is at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarChar {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub c: char,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeGeometry {
    pub lines: Vec<BarLine>,
    pub chars: Vec<BarChar>,
    pub width: f32,
    pub height: f32,
}

/// Lays out `data` in label-local coordinates (Y down) at `scale`.
pub fn layout(
    symbology: Symbology,
    data: &str,
    show_text: bool,
    scale: f32,
) -> Result<BarcodeGeometry, LabelError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(LabelError::Barcode(format!("invalid barcode scale {scale}")));
    }
    let modules = symbology.modules(data)?;
    let module_w = MODULE_WIDTH * scale;
    let bar_h = BAR_HEIGHT * scale;

    let mut lines = Vec::new();
    let mut run_start: Option<usize> = None;
    for (i, module) in modules.iter().chain(std::iter::once(&0)).enumerate() {
        match (*module == 1, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                let run = (i - start) as f32;
                lines.push(BarLine {
                    x: (start as f32 + run / 2.0) * module_w,
                    y: 0.0,
                    length: bar_h,
                    width: run * module_w,
                });
                run_start = None;
            }
            _ => {}
        }
    }

    let width = modules.len() as f32 * module_w;
    let mut height = bar_h;
    let mut chars = Vec::new();
    if show_text {
        let size = TEXT_SIZE * scale;
        let count = data.chars().count() as f32;
        let pitch = width / count;
        let y = bar_h + TEXT_GAP * scale;
        chars = data
            .chars()
            .enumerate()
            .map(|(k, c)| BarChar {
                x: pitch * (k as f32 + 0.5) - size * COURIER_ADVANCE / 2.0,
                y,
                size,
                c,
            })
            .collect();
        height = y + size;
    }
    Ok(BarcodeGeometry {
        lines,
        chars,
        width,
        height,
    })
}

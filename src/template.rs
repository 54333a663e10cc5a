//! Sheet geometry: grid of label cells, paper size and die-cut outline.
//!
//! A [`Template`] is validated once at construction and never changes
//! afterwards; print jobs only read it.

use crate::error::LabelError;
use crate::types::{Pt, Size};
use log::warn;
use serde::Deserialize;

/// Paper used when a template names a size the table does not know.
pub const DEFAULT_PAPER: &str = "US Letter";

const PAPER_SIZES: &[(&str, f32, f32)] = &[
    ("US Letter", 612.0, 792.0),
    ("US Legal", 612.0, 1008.0),
    ("Executive", 522.0, 756.0),
    ("A3", 841.89, 1190.55),
    ("A4", 595.28, 841.89),
    ("A5", 419.53, 595.28),
    ("B5", 498.9, 708.66),
];

/// Looks up a standard paper name. Case, spaces, dashes and underscores are
/// ignored, so "us-letter" and "USLetter" both match "US Letter".
pub fn paper_size_by_name(name: &str) -> Option<Size> {
    let wanted = normalize_paper_name(name);
    PAPER_SIZES
        .iter()
        .find(|(known, _, _)| normalize_paper_name(known) == wanted)
        .map(|(_, w, h)| Size::new(Pt::from_f32(*w), Pt::from_f32(*h)))
}

fn normalize_paper_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PaperSize {
    Named(String),
    Custom { width: Pt, height: Pt },
}

impl PaperSize {
    /// Physical page size; unknown names fall back to [`DEFAULT_PAPER`].
    pub fn resolve(&self) -> Size {
        match self {
            PaperSize::Custom { width, height } => Size::new(*width, *height),
            PaperSize::Named(name) => paper_size_by_name(name).unwrap_or_else(|| {
                warn!("unknown paper size \"{name}\", using \"{DEFAULT_PAPER}\"");
                Size::letter()
            }),
        }
    }
}

impl Default for PaperSize {
    fn default() -> Self {
        PaperSize::Named(DEFAULT_PAPER.to_string())
    }
}

/// Die-cut shape of one label.
#[derive(Debug, Clone, PartialEq)]
pub enum OutlineStyle {
    Rectangle { width: Pt, height: Pt },
    RoundedRectangle { width: Pt, height: Pt, radius: Pt },
    /// Round label of the given radius, drawn in a `2r x 2r` box.
    Circle { radius: Pt },
    /// CD/DVD label: outer circle with a concentric hole.
    CircleWithHole { radius: Pt, hole: Pt },
    /// A style name this crate cannot draw.
    Unsupported(String),
}

impl OutlineStyle {
    /// Rectangle helper: a zero corner radius yields a plain rectangle.
    pub fn rect(width: Pt, height: Pt, round: Pt) -> Self {
        if round > Pt::ZERO {
            OutlineStyle::RoundedRectangle {
                width,
                height,
                radius: round,
            }
        } else {
            OutlineStyle::Rectangle { width, height }
        }
    }

    /// Unrotated bounding size of the shape.
    pub fn size(&self) -> Size {
        match self {
            OutlineStyle::Rectangle { width, height }
            | OutlineStyle::RoundedRectangle { width, height, .. } => Size::new(*width, *height),
            OutlineStyle::Circle { radius } | OutlineStyle::CircleWithHole { radius, .. } => {
                Size::new(*radius * 2, *radius * 2)
            }
            OutlineStyle::Unsupported(_) => Size::new(Pt::ZERO, Pt::ZERO),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, OutlineStyle::Unsupported(_))
    }
}

/// Grid position of a cell: `ix` counts columns from the left, `iy` counts
/// rows from the bottom of the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ix: u32,
    pub iy: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "TemplateSpec")]
pub struct Template {
    name: String,
    paper: PaperSize,
    nx: u32,
    ny: u32,
    dx: Pt,
    dy: Pt,
    x0: Pt,
    y0: Pt,
    outline: OutlineStyle,
}

/// Raw template fields as found in job files, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub page_size: PaperSize,
    pub nx: u32,
    pub ny: u32,
    pub dx: Pt,
    pub dy: Pt,
    #[serde(default = "zero")]
    pub x0: Pt,
    #[serde(default = "zero")]
    pub y0: Pt,
    pub label: LabelSpec,
}

fn zero() -> Pt {
    Pt::ZERO
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum ShapeSpec {
    Rect {
        width: Pt,
        height: Pt,
        #[serde(default = "zero")]
        round: Pt,
    },
    Round {
        radius: Pt,
    },
    Cd {
        radius: Pt,
        hole: Pt,
    },
}

/// A label shape, or the style name of one that cannot be drawn.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LabelSpec {
    Known(ShapeSpec),
    Other { style: String },
}

const KNOWN_STYLES: [&str; 3] = ["rect", "round", "cd"];

impl TryFrom<TemplateSpec> for Template {
    type Error = LabelError;

    fn try_from(spec: TemplateSpec) -> Result<Self, Self::Error> {
        let outline = match spec.label {
            LabelSpec::Other { style } if KNOWN_STYLES.contains(&style.as_str()) => {
                return Err(LabelError::InvalidTemplate(format!(
                    "label style \"{style}\" is missing or has malformed dimensions"
                )));
            }
            LabelSpec::Other { style } => OutlineStyle::Unsupported(style),
            LabelSpec::Known(ShapeSpec::Rect {
                width,
                height,
                round,
            }) => OutlineStyle::rect(width, height, round),
            LabelSpec::Known(ShapeSpec::Round { radius }) => OutlineStyle::Circle { radius },
            LabelSpec::Known(ShapeSpec::Cd { radius, hole }) => {
                OutlineStyle::CircleWithHole { radius, hole }
            }
        };
        Template::new(
            spec.name,
            spec.page_size,
            (spec.nx, spec.ny),
            (spec.dx, spec.dy),
            (spec.x0, spec.y0),
            outline,
        )
    }
}

impl Template {
    /// Validates and builds a template.
    ///
    /// `grid` is `(nx, ny)`, `pitch` is `(dx, dy)` and `origin` is the offset
    /// `(x0, y0)` of the bottom-left cell from the sheet origin.
    pub fn new(
        name: impl Into<String>,
        paper: PaperSize,
        grid: (u32, u32),
        pitch: (Pt, Pt),
        origin: (Pt, Pt),
        outline: OutlineStyle,
    ) -> Result<Self, LabelError> {
        let name = name.into();
        let (nx, ny) = grid;
        let (dx, dy) = pitch;
        if nx == 0 || ny == 0 {
            return Err(LabelError::InvalidTemplate(format!(
                "\"{name}\": grid must be at least 1x1, got {nx}x{ny}"
            )));
        }
        if dx <= Pt::ZERO || dy <= Pt::ZERO {
            return Err(LabelError::InvalidTemplate(format!(
                "\"{name}\": pitch must be positive, got {} x {}",
                dx.to_f32(),
                dy.to_f32()
            )));
        }
        validate_outline(&name, &outline)?;
        Ok(Self {
            name,
            paper,
            nx,
            ny,
            dx,
            dy,
            x0: origin.0,
            y0: origin.1,
            outline,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn paper(&self) -> &PaperSize {
        &self.paper
    }

    pub fn page_size(&self) -> Size {
        self.paper.resolve()
    }

    pub fn grid(&self) -> (u32, u32) {
        (self.nx, self.ny)
    }

    pub fn pitch(&self) -> (Pt, Pt) {
        (self.dx, self.dy)
    }

    pub fn origin(&self) -> (Pt, Pt) {
        (self.x0, self.y0)
    }

    pub fn outline(&self) -> &OutlineStyle {
        &self.outline
    }

    pub fn labels_per_sheet(&self) -> usize {
        self.nx as usize * self.ny as usize
    }

    /// Maps a cell index in reading order (left to right, top row first) to
    /// its grid position. Rows are numbered from the bottom of the sheet, so
    /// index 0 lands in row `ny - 1`.
    pub fn cell(&self, index: usize) -> Option<Cell> {
        if index >= self.labels_per_sheet() {
            return None;
        }
        let nx = self.nx as usize;
        let ix = (index % nx) as u32;
        let iy = (self.ny - 1) - (index / nx) as u32;
        Some(Cell { ix, iy })
    }

    /// Sheet coordinates of the bottom-left corner of cell `index`.
    pub fn cell_origin(&self, index: usize) -> Option<(Pt, Pt)> {
        let cell = self.cell(index)?;
        Some((
            self.dx * cell.ix as i32 + self.x0,
            self.dy * cell.iy as i32 + self.y0,
        ))
    }

    /// Size of the design frame: the outline's size, swapped when the design
    /// is rotated a quarter turn inside its cell.
    pub fn label_size(&self, rotate: bool) -> Size {
        let size = self.outline.size();
        if rotate { size.swapped() } else { size }
    }
}

fn validate_outline(name: &str, outline: &OutlineStyle) -> Result<(), LabelError> {
    let invalid = |what: &str| {
        Err(LabelError::InvalidTemplate(format!(
            "\"{name}\": {what}"
        )))
    };
    match outline {
        OutlineStyle::Rectangle { width, height } => {
            if *width <= Pt::ZERO || *height <= Pt::ZERO {
                return invalid("label width and height must be positive");
            }
        }
        OutlineStyle::RoundedRectangle {
            width,
            height,
            radius,
        } => {
            if *width <= Pt::ZERO || *height <= Pt::ZERO {
                return invalid("label width and height must be positive");
            }
            if *radius * 2 > width.min(*height) {
                return invalid("corner radius exceeds half the label size");
            }
        }
        OutlineStyle::Circle { radius } => {
            if *radius <= Pt::ZERO {
                return invalid("label radius must be positive");
            }
        }
        OutlineStyle::CircleWithHole { radius, hole } => {
            if *radius <= Pt::ZERO {
                return invalid("label radius must be positive");
            }
            if *hole < Pt::ZERO || *hole >= *radius {
                return invalid("hole radius must be in [0, radius)");
            }
        }
        OutlineStyle::Unsupported(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn grid_template(nx: u32, ny: u32) -> Template {
        Template::new(
            "test",
            PaperSize::default(),
            (nx, ny),
            (Pt::from_i32(100), Pt::from_i32(50)),
            (Pt::from_i32(10), Pt::from_i32(20)),
            OutlineStyle::rect(Pt::from_i32(90), Pt::from_i32(45), Pt::ZERO),
        )
        .unwrap()
    }

    #[test]
    fn cell_index_maps_top_row_first() {
        let t = grid_template(3, 2);
        assert_eq!(t.cell(0), Some(Cell { ix: 0, iy: 1 }));
        assert_eq!(t.cell(2), Some(Cell { ix: 2, iy: 1 }));
        assert_eq!(t.cell(3), Some(Cell { ix: 0, iy: 0 }));
        assert_eq!(t.cell(5), Some(Cell { ix: 2, iy: 0 }));
        assert_eq!(t.cell(6), None);
    }

    #[test]
    fn cell_origin_applies_pitch_and_offset() {
        let t = grid_template(3, 2);
        assert_eq!(t.cell_origin(0), Some((Pt::from_i32(10), Pt::from_i32(70))));
        assert_eq!(t.cell_origin(5), Some((Pt::from_i32(210), Pt::from_i32(20))));
    }

    #[test]
    fn every_cell_origin_is_distinct() {
        for (nx, ny) in [(1, 1), (1, 7), (4, 1), (3, 10), (5, 4)] {
            let t = grid_template(nx, ny);
            let origins: HashSet<(i64, i64)> = (0..t.labels_per_sheet())
                .map(|i| {
                    let (x, y) = t.cell_origin(i).unwrap();
                    (x.to_milli_i64(), y.to_milli_i64())
                })
                .collect();
            assert_eq!(origins.len(), (nx * ny) as usize);
        }
    }

    #[test]
    fn construction_rejects_degenerate_grids() {
        let outline = OutlineStyle::Circle {
            radius: Pt::from_i32(10),
        };
        let bad = [
            ((0, 1), (Pt::from_i32(1), Pt::from_i32(1))),
            ((1, 0), (Pt::from_i32(1), Pt::from_i32(1))),
            ((1, 1), (Pt::ZERO, Pt::from_i32(1))),
            ((1, 1), (Pt::from_i32(1), Pt::from_i32(-3))),
        ];
        for (grid, pitch) in bad {
            let result = Template::new(
                "bad",
                PaperSize::default(),
                grid,
                pitch,
                (Pt::ZERO, Pt::ZERO),
                outline.clone(),
            );
            assert!(matches!(result, Err(LabelError::InvalidTemplate(_))));
        }
    }

    #[test]
    fn cd_hole_must_be_inside_outer_circle() {
        let result = Template::new(
            "cd",
            PaperSize::default(),
            (1, 2),
            (Pt::from_i32(300), Pt::from_i32(300)),
            (Pt::ZERO, Pt::ZERO),
            OutlineStyle::CircleWithHole {
                radius: Pt::from_i32(50),
                hole: Pt::from_i32(50),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn paper_names_resolve_loosely_and_fall_back() {
        assert_eq!(paper_size_by_name("us-letter"), Some(Size::letter()));
        assert_eq!(paper_size_by_name("a4"), Some(Size::a4()));
        assert_eq!(paper_size_by_name("Folio Royale"), None);
        assert_eq!(
            PaperSize::Named("Folio Royale".to_string()).resolve(),
            Size::letter()
        );
        let custom = PaperSize::Custom {
            width: Pt::from_i32(200),
            height: Pt::from_i32(300),
        };
        assert_eq!(custom.resolve(), Size::new(Pt::from_i32(200), Pt::from_i32(300)));
    }

    #[test]
    fn label_size_swaps_when_rotated() {
        let t = grid_template(2, 2);
        assert_eq!(t.label_size(false), Size::new(Pt::from_i32(90), Pt::from_i32(45)));
        assert_eq!(t.label_size(true), Size::new(Pt::from_i32(45), Pt::from_i32(90)));
    }

    #[test]
    fn template_deserialises_from_job_json() {
        let json = r#"{
            "name": "Business card 10-up",
            "page_size": "US Letter",
            "nx": 2, "ny": 5, "dx": 252, "dy": 144, "x0": 54, "y0": 36,
            "label": { "style": "rect", "width": 252, "height": 144, "round": 9 }
        }"#;
        let t: Template = serde_json::from_str(json).unwrap();
        assert_eq!(t.labels_per_sheet(), 10);
        assert!(matches!(t.outline(), OutlineStyle::RoundedRectangle { .. }));

        let unknown = r#"{ "name": "odd", "nx": 1, "ny": 1, "dx": 10, "dy": 10,
            "label": { "style": "hexagon", "side": 4 } }"#;
        let t: Template = serde_json::from_str(unknown).unwrap();
        assert_eq!(t.outline(), &OutlineStyle::Unsupported("hexagon".to_string()));

        let malformed = r#"{ "nx": 1, "ny": 1, "dx": 10, "dy": 10,
            "label": { "style": "rect", "width": 4 } }"#;
        let err = serde_json::from_str::<Template>(malformed).unwrap_err();
        assert!(err.to_string().contains("\"rect\""));

        let invalid = r#"{ "nx": 0, "ny": 1, "dx": 10, "dy": 10,
            "label": { "style": "round", "radius": 4 } }"#;
        assert!(serde_json::from_str::<Template>(invalid).is_err());
    }
}

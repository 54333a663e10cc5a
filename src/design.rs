//! Label document model: the ordered drawing objects of one design.

use crate::assets::RasterImage;
use crate::barcode::Symbology;
use crate::merge::MergeSource;
use crate::template::Template;
use crate::types::{Pt, Rgba};
use log::warn;
use serde::Deserialize;
use std::sync::Arc;

fn default_font_family() -> String {
    "Sans".to_string()
}

fn default_font_size() -> Pt {
    Pt::from_i32(12)
}

fn default_line_width() -> Pt {
    Pt::from_i32(1)
}

fn default_scale() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FontSpec {
    #[serde(default = "default_font_family")]
    pub family: String,
    #[serde(default = "default_font_size")]
    pub size: Pt,
    #[serde(default)]
    pub weight: FontWeight,
    #[serde(default)]
    pub italic: bool,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: default_font_family(),
            size: default_font_size(),
            weight: FontWeight::Normal,
            italic: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Justification {
    #[default]
    Left,
    Center,
    Right,
}

/// Multi-line text; `${field}` placeholders are filled from merge records.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextObject {
    pub x: Pt,
    pub y: Pt,
    pub w: Pt,
    #[serde(default = "zero")]
    pub h: Pt,
    pub text: String,
    #[serde(default)]
    pub font: FontSpec,
    #[serde(default)]
    pub color: Rgba,
    #[serde(default)]
    pub justify: Justification,
}

/// Box or ellipse: filled, then outlined.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShapeObject {
    pub x: Pt,
    pub y: Pt,
    pub w: Pt,
    pub h: Pt,
    #[serde(default = "default_line_width")]
    pub line_width: Pt,
    #[serde(default)]
    pub line_color: Rgba,
    #[serde(default = "transparent")]
    pub fill_color: Rgba,
}

/// Segment from `(x, y)` to `(x + w, y + h)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineObject {
    pub x: Pt,
    pub y: Pt,
    pub w: Pt,
    pub h: Pt,
    #[serde(default = "default_line_width")]
    pub line_width: Pt,
    #[serde(default)]
    pub line_color: Rgba,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageObject {
    pub x: Pt,
    pub y: Pt,
    pub w: Pt,
    pub h: Pt,
    /// File path or `data:` URI.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(skip)]
    pub pixels: Option<Arc<RasterImage>>,
}

impl ImageObject {
    pub fn with_pixels(x: Pt, y: Pt, w: Pt, h: Pt, pixels: RasterImage) -> Self {
        Self {
            x,
            y,
            w,
            h,
            source: None,
            pixels: Some(Arc::new(pixels)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BarcodeObject {
    pub x: Pt,
    pub y: Pt,
    pub data: String,
    #[serde(default)]
    pub symbology: Symbology,
    /// Print the human-readable characters under the bars.
    #[serde(default = "default_true")]
    pub show_text: bool,
    #[serde(default)]
    pub color: Rgba,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn zero() -> Pt {
    Pt::ZERO
}

fn transparent() -> Rgba {
    Rgba::TRANSPARENT
}

/// Closed set of drawable objects. Positions are in design coordinates:
/// origin at the label's top-left corner, Y down.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LabelObject {
    Text(TextObject),
    Box(ShapeObject),
    Line(LineObject),
    Ellipse(ShapeObject),
    Image(ImageObject),
    Barcode(BarcodeObject),
}

/// Design content as found in job files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DesignSpec {
    #[serde(default)]
    pub rotate: bool,
    #[serde(default)]
    pub objects: Vec<LabelObject>,
}

/// A label design bound to its template and, optionally, a merge source.
#[derive(Debug, Clone)]
pub struct LabelDesign {
    template: Option<Arc<Template>>,
    rotate: bool,
    objects: Vec<LabelObject>,
    merge: Option<Arc<dyn MergeSource>>,
}

impl LabelDesign {
    pub fn new(template: Option<Arc<Template>>, rotate: bool, objects: Vec<LabelObject>) -> Self {
        Self {
            template,
            rotate,
            objects,
            merge: None,
        }
    }

    pub fn from_spec(template: Option<Arc<Template>>, spec: DesignSpec) -> Self {
        Self::new(template, spec.rotate, spec.objects)
    }

    pub fn with_merge(mut self, merge: Arc<dyn MergeSource>) -> Self {
        self.merge = Some(merge);
        self
    }

    pub fn template(&self) -> Option<&Arc<Template>> {
        self.template.as_ref()
    }

    pub fn rotate(&self) -> bool {
        self.rotate
    }

    pub fn objects(&self) -> &[LabelObject] {
        &self.objects
    }

    pub fn merge(&self) -> Option<&Arc<dyn MergeSource>> {
        self.merge.as_ref()
    }

    /// Decodes every image object that names a source but has no pixels yet.
    /// Failures are logged and leave the object without pixels; returns the
    /// number of images that could not be loaded.
    pub fn load_images(&mut self) -> usize {
        let mut failed = 0;
        for object in &mut self.objects {
            let LabelObject::Image(image) = object else {
                continue;
            };
            if image.pixels.is_some() {
                continue;
            }
            let Some(source) = image.source.as_deref() else {
                continue;
            };
            match RasterImage::load(source) {
                Ok(pixels) => image.pixels = Some(Arc::new(pixels)),
                Err(err) => {
                    let shown: String = source.chars().take(64).collect();
                    warn!("cannot load image \"{shown}\": {err}");
                    failed += 1;
                }
            }
        }
        failed
    }
}

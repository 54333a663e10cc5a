//! Font selection and text metrics.
//!
//! The PDF base-14 faces are always available through built-in AFM width
//! tables; TrueType faces can be registered from files or bytes and are
//! measured from their `hmtx` advances.

use crate::error::LabelError;
use crate::types::Pt;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Face used when a family resolves to nothing else.
pub const DEFAULT_FONT: &str = "Helvetica";

// AFM advance widths (1/1000 em) for ASCII 32..=126.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    278, 278, 564, 564, 564, 444, 921,
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889,
    722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
    333, 278, 333, 469, 500, 333,
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778,
    500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
    480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD_WIDTHS: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    333, 333, 570, 570, 570, 500, 930,
    722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944,
    722, 778, 611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667,
    333, 278, 333, 581, 500, 333,
    500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833,
    556, 500, 556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444,
    394, 220, 394, 520,
];

/// Metrics for one built-in face. Italic and oblique faces reuse the
/// upright widths.
#[derive(Debug, Clone, Copy)]
struct Base14Metrics {
    widths: Option<&'static [u16; 95]>,
    fixed_width: u16,
    descent: u16,
}

impl Base14Metrics {
    fn advance(&self, ch: char) -> u16 {
        let code = ch as u32;
        match self.widths {
            Some(widths) if (32..=126).contains(&code) => widths[(code - 32) as usize],
            _ => self.fixed_width,
        }
    }
}

fn base14_metrics(name: &str) -> Option<Base14Metrics> {
    let metrics = match name {
        "Helvetica" | "Helvetica-Oblique" => Base14Metrics {
            widths: Some(&HELVETICA_WIDTHS),
            fixed_width: 556,
            descent: 207,
        },
        "Helvetica-Bold" | "Helvetica-BoldOblique" => Base14Metrics {
            widths: Some(&HELVETICA_BOLD_WIDTHS),
            fixed_width: 556,
            descent: 207,
        },
        "Times-Roman" | "Times-Italic" => Base14Metrics {
            widths: Some(&TIMES_ROMAN_WIDTHS),
            fixed_width: 500,
            descent: 217,
        },
        "Times-Bold" | "Times-BoldItalic" => Base14Metrics {
            widths: Some(&TIMES_BOLD_WIDTHS),
            fixed_width: 500,
            descent: 217,
        },
        "Courier" | "Courier-Bold" | "Courier-Oblique" | "Courier-BoldOblique" => {
            Base14Metrics {
                widths: None,
                fixed_width: 600,
                descent: 157,
            }
        }
        _ => return None,
    };
    Some(metrics)
}

pub fn is_base14(name: &str) -> bool {
    base14_metrics(name).is_some()
}

/// Maps a family name plus style to a base-14 face name.
pub fn base14_variant_name(family: &str, bold: bool, italic: bool) -> Option<&'static str> {
    let norm = normalize_name(family);
    let base = match norm.as_str() {
        "helvetica" | "arial" | "sans" | "sans-serif" | "sans serif" => "helvetica",
        "times" | "times-roman" | "times new roman" | "serif" => "times-roman",
        "courier" | "courier new" | "mono" | "monospace" => "courier",
        _ => return None,
    };
    Some(match (base, bold, italic) {
        ("helvetica", true, true) => "Helvetica-BoldOblique",
        ("helvetica", true, false) => "Helvetica-Bold",
        ("helvetica", false, true) => "Helvetica-Oblique",
        ("helvetica", false, false) => "Helvetica",
        ("times-roman", true, true) => "Times-BoldItalic",
        ("times-roman", true, false) => "Times-Bold",
        ("times-roman", false, true) => "Times-Italic",
        ("times-roman", false, false) => "Times-Roman",
        (_, true, true) => "Courier-BoldOblique",
        (_, true, false) => "Courier-Bold",
        (_, false, true) => "Courier-Oblique",
        (_, false, false) => "Courier",
    })
}

#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
}

#[derive(Debug)]
pub struct RegisteredFont {
    pub name: String,
    pub data: Vec<u8>,
    pub metrics: FontMetrics,
}

/// Metrics of a registered TrueType face, scaled to 1/1000 em, for the
/// single-byte range the PDF writer encodes.
#[derive(Debug)]
pub struct FontMetrics {
    pub first_char: u8,
    pub last_char: u8,
    pub widths: Vec<u16>,
    pub ascent: i16,
    pub descent: i16,
    pub bbox: (i16, i16, i16, i16),
    pub italic_angle: i16,
    pub missing_width: u16,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Registers every `.ttf`/`.otf` file in `path`; returns how many loaded.
    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> Result<usize, LabelError> {
        let mut count = 0;
        for entry in fs::read_dir(path.as_ref())?.flatten() {
            let path = entry.path();
            let is_font = path
                .extension()
                .and_then(|v| v.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf"))
                .unwrap_or(false);
            if path.is_file() && is_font {
                self.register_file(&path)?;
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<String, LabelError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        self.register_bytes(data, path.to_str())
    }

    /// Registers font bytes and returns the primary (PostScript) name.
    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, LabelError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| LabelError::Font(format!("invalid font data for {source}: {err}")))?;

        let (name, aliases) = font_names(&face, Path::new(source));
        let metrics = FontMetrics::from_face(&face);
        drop(face);
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
        });
        for alias in std::iter::once(name.clone()).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        debug!("registered font \"{name}\" from {source}");
        Ok(name)
    }

    pub fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        self.lookup
            .get(&normalize_name(name))
            .and_then(|index| self.fonts.get(*index))
    }

    /// Picks the face to draw with: a base-14 face for the standard
    /// families, else a registered face, else Helvetica in the requested
    /// style.
    pub fn select(&self, family: &str, bold: bool, italic: bool) -> String {
        if let Some(name) = base14_variant_name(family, bold, italic) {
            return name.to_string();
        }
        let styled = match (bold, italic) {
            (true, true) => format!("{family} Bold Italic"),
            (true, false) => format!("{family} Bold"),
            (false, true) => format!("{family} Italic"),
            (false, false) => family.to_string(),
        };
        if let Some(font) = self.resolve(&styled).or_else(|| self.resolve(family)) {
            return font.name.clone();
        }
        warn!("font family \"{family}\" not available, using {DEFAULT_FONT}");
        base14_variant_name(DEFAULT_FONT, bold, italic)
            .unwrap_or(DEFAULT_FONT)
            .to_string()
    }

    pub fn measure_text_width(&self, name: &str, font_size: Pt, text: &str) -> Pt {
        if let Some(metrics) = base14_metrics(name) {
            let units: i32 = text.chars().map(|ch| metrics.advance(ch) as i32).sum();
            return font_size.mul_ratio(units, 1000);
        }
        match self.resolve(name) {
            Some(font) => font.metrics.measure_text_width(font_size, text),
            None => {
                let char_width = (font_size * 0.6).max(Pt::from_f32(1.0));
                char_width * (text.chars().count() as i32)
            }
        }
    }

    /// Depth of the descender below the baseline, as a positive length.
    pub fn descent(&self, name: &str, font_size: Pt) -> Pt {
        if let Some(metrics) = base14_metrics(name) {
            return font_size.mul_ratio(metrics.descent as i32, 1000);
        }
        match self.resolve(name) {
            Some(font) => font_size.mul_ratio(-(font.metrics.descent as i32).min(0), 1000),
            None => font_size.mul_ratio(207, 1000),
        }
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let last_char = 255u8;
        let widths: Vec<u16> = (first_char..=last_char)
            .map(|code| {
                let advance = char::from_u32(code as u32)
                    .and_then(|ch| face.glyph_index(ch))
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(0);
                ((advance as f32 * scale).round() as i32).clamp(0, u16::MAX as i32) as u16
            })
            .collect();
        let missing_width = widths.first().copied().unwrap_or(0);
        let bbox = face.global_bounding_box();
        Self {
            first_char,
            last_char,
            widths,
            ascent: scale_i16(face.ascender(), scale),
            descent: scale_i16(face.descender(), scale),
            bbox: (
                scale_i16(bbox.x_min, scale),
                scale_i16(bbox.y_min, scale),
                scale_i16(bbox.x_max, scale),
                scale_i16(bbox.y_max, scale),
            ),
            italic_angle: face
                .italic_angle()
                .map(|value| value.round() as i16)
                .unwrap_or(0),
            missing_width,
        }
    }

    fn advance_for_char(&self, ch: char) -> u16 {
        let code = ch as u32;
        if code < self.first_char as u32 || code > self.last_char as u32 {
            return self.missing_width;
        }
        self.widths
            .get((code - self.first_char as u32) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }

    fn measure_text_width(&self, font_size: Pt, text: &str) -> Pt {
        let units: i32 = text
            .chars()
            .map(|ch| self.advance_for_char(ch) as i32)
            .fold(0i32, |acc, adv| acc.saturating_add(adv));
        if units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(units, 1000)
    }
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        let slot = match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => &mut family,
            name_id::FULL_NAME => &mut full,
            name_id::POST_SCRIPT_NAME => &mut post,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(name);
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| family.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());
    let aliases = [full, family, post, stem]
        .into_iter()
        .flatten()
        .filter(|candidate| *candidate != primary)
        .collect();
    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_map_to_base14_variants() {
        let fonts = FontRegistry::new();
        assert_eq!(fonts.select("Sans", false, false), "Helvetica");
        assert_eq!(fonts.select("Arial", true, true), "Helvetica-BoldOblique");
        assert_eq!(fonts.select("Serif", true, false), "Times-Bold");
        assert_eq!(fonts.select("Monospace", false, true), "Courier-Oblique");
        assert_eq!(fonts.select("No Such Family", true, false), "Helvetica-Bold");
    }

    #[test]
    fn base14_widths_follow_afm_tables() {
        let fonts = FontRegistry::new();
        let size = Pt::from_i32(10);
        // H=722, i=222 in Helvetica.
        assert_eq!(fonts.measure_text_width("Helvetica", size, "Hi"), Pt::from_f32(9.44));
        assert_eq!(fonts.measure_text_width("Courier", size, "abc"), Pt::from_i32(18));
        assert!(
            fonts.measure_text_width("Helvetica-Bold", size, "Label")
                > fonts.measure_text_width("Helvetica", size, "Label")
        );
    }

    #[test]
    fn descent_is_positive_and_scales() {
        let fonts = FontRegistry::new();
        assert_eq!(fonts.descent("Courier", Pt::from_i32(12)), Pt::from_f32(1.884));
        assert_eq!(fonts.descent("Times-Roman", Pt::from_i32(10)), Pt::from_f32(2.17));
    }

    #[test]
    fn unknown_face_uses_proportional_fallback() {
        let fonts = FontRegistry::new();
        assert_eq!(
            fonts.measure_text_width("Mystery", Pt::from_i32(10), "abcd"),
            Pt::from_i32(24)
        );
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut fonts = FontRegistry::new();
        let err = fonts
            .register_bytes(vec![0, 1, 2, 3], Some("broken.ttf"))
            .unwrap_err();
        assert!(matches!(err, LabelError::Font(_)));
        assert!(fonts.is_empty());
    }
}

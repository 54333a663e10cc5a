//! PNG proofs of recorded sheets, painted with tiny-skia.

use crate::assets::RasterImage;
use crate::canvas::{Command, Document};
use crate::error::LabelError;
use crate::font::{FontRegistry, is_base14};
use crate::types::{Color, Pt};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{
    FillRule, FilterQuality, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Stroke,
    Transform,
};
use ttf_parser::OutlineBuilder;

pub const DEFAULT_DPI: u32 = 150;

#[derive(Clone)]
struct RasterState {
    transform: Transform,
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    fill_opacity: f32,
    stroke_opacity: f32,
    font_name: String,
    font_size: Pt,
    clip_mask: Option<Mask>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            font_name: "Helvetica".to_string(),
            font_size: Pt::from_f32(12.0),
            clip_mask: None,
        }
    }
}

// Pixmaps keyed by image identity and whether alpha is honoured.
type ImageCache = HashMap<(usize, bool), Option<Pixmap>>;

/// Paints every page of `document` at `dpi` (0 selects [`DEFAULT_DPI`]) and
/// returns one PNG per page. Text is drawn from registered TrueType outlines;
/// base-14 faces have no outlines to draw and are left out of the proof.
pub fn document_to_png_pages(
    document: &Document,
    fonts: &FontRegistry,
    dpi: u32,
) -> Result<Vec<Vec<u8>>, LabelError> {
    let dpi = if dpi == 0 { DEFAULT_DPI } else { dpi };
    let width_px = pt_milli_to_px_u32(document.page_size.width.to_milli_i64(), dpi)?;
    let height_px = pt_milli_to_px_u32(document.page_size.height.to_milli_i64(), dpi)?;
    let scale = dpi as f32 / 72.0;
    // User space is Y up; pixel rows run down.
    let base_transform = Transform::from_row(
        scale,
        0.0,
        0.0,
        -scale,
        0.0,
        document.page_size.height.to_f32() * scale,
    );

    let mut png_pages = Vec::with_capacity(document.pages.len());
    let mut image_cache = ImageCache::new();

    for page in &document.pages {
        let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
            LabelError::InvalidConfiguration(format!(
                "invalid raster size {}x{} at {} DPI",
                width_px, height_px, dpi
            ))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let mut painter = Painter {
            pixmap: &mut pixmap,
            base_transform,
            state: RasterState::default(),
            stack: Vec::new(),
            path_builder: PathBuilder::new(),
            has_path: false,
            fonts,
            image_cache: &mut image_cache,
        };
        painter.run(&page.commands);

        let png = pixmap
            .encode_png()
            .map_err(|e| LabelError::Image(format!("png encode failed: {e}")))?;
        png_pages.push(png);
    }

    Ok(png_pages)
}

struct Painter<'a> {
    pixmap: &'a mut Pixmap,
    base_transform: Transform,
    state: RasterState,
    stack: Vec<RasterState>,
    path_builder: PathBuilder,
    has_path: bool,
    fonts: &'a FontRegistry,
    image_cache: &'a mut ImageCache,
}

impl Painter<'_> {
    fn run(&mut self, commands: &[Command]) {
        for cmd in commands {
            match cmd {
                Command::SaveState => self.stack.push(self.state.clone()),
                Command::RestoreState => {
                    if let Some(restored) = self.stack.pop() {
                        self.state = restored;
                    }
                }
                Command::Translate(x, y) => {
                    self.concat(Transform::from_translate(x.to_f32(), y.to_f32()));
                }
                Command::Scale(x, y) => self.concat(Transform::from_scale(*x, *y)),
                Command::Rotate(angle) => {
                    self.concat(Transform::from_rotate(angle.to_degrees()));
                }
                Command::ConcatMatrix { a, b, c, d, e, f } => {
                    self.concat(Transform::from_row(*a, *b, *c, *d, e.to_f32(), f.to_f32()));
                }
                Command::Meta { .. } => {}
                Command::SetFillColor(color) => self.state.fill_color = *color,
                Command::SetStrokeColor(color) => self.state.stroke_color = *color,
                Command::SetLineWidth(width) => self.state.line_width = (*width).max(Pt::ZERO),
                Command::SetOpacity { fill, stroke } => {
                    self.state.fill_opacity = fill.clamp(0.0, 1.0);
                    self.state.stroke_opacity = stroke.clamp(0.0, 1.0);
                }
                Command::SetFontName(name) => self.state.font_name = name.clone(),
                Command::SetFontSize(size) => self.state.font_size = *size,
                Command::ClipPath { evenodd } => self.clip(fill_rule(*evenodd)),
                Command::MoveTo { x, y } => {
                    self.path_builder.move_to(x.to_f32(), y.to_f32());
                    self.has_path = true;
                }
                Command::LineTo { x, y } => {
                    self.path_builder.line_to(x.to_f32(), y.to_f32());
                    self.has_path = true;
                }
                Command::ClosePath => self.path_builder.close(),
                Command::Fill => self.fill(),
                Command::Stroke => self.stroke(),
                Command::DrawString { x, y, text } => self.draw_string(*x, *y, text),
                Command::DrawImage { image, alpha } => self.draw_image(image, *alpha),
            }
        }
    }

    fn concat(&mut self, next: Transform) {
        self.state.transform = self.state.transform.pre_concat(next);
    }

    fn device_transform(&self) -> Transform {
        self.base_transform.pre_concat(self.state.transform)
    }

    fn take_path(&mut self) -> Option<Path> {
        if !self.has_path {
            return None;
        }
        self.has_path = false;
        std::mem::replace(&mut self.path_builder, PathBuilder::new()).finish()
    }

    fn fill(&mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        let paint = fill_paint(self.state.fill_color, self.state.fill_opacity);
        let transform = self.device_transform();
        self.pixmap.fill_path(
            &path,
            &paint,
            FillRule::Winding,
            transform,
            self.state.clip_mask.as_ref(),
        );
    }

    fn stroke(&mut self) {
        let Some(path) = self.take_path() else {
            return;
        };
        let paint = fill_paint(self.state.stroke_color, self.state.stroke_opacity);
        let stroke = Stroke {
            width: self.state.line_width.to_f32().max(0.0),
            ..Stroke::default()
        };
        let transform = self.device_transform();
        self.pixmap.stroke_path(
            &path,
            &paint,
            &stroke,
            transform,
            self.state.clip_mask.as_ref(),
        );
    }

    fn clip(&mut self, rule: FillRule) {
        let Some(path) = self.take_path() else {
            return;
        };
        let transform = self.device_transform();
        if let Some(mask) = self.state.clip_mask.as_mut() {
            mask.intersect_path(&path, rule, true, transform);
            return;
        }
        let Some(mut mask) = Mask::new(self.pixmap.width(), self.pixmap.height()) else {
            return;
        };
        mask.fill_path(&path, rule, true, transform);
        self.state.clip_mask = Some(mask);
    }

    fn draw_string(&mut self, x: Pt, y: Pt, text: &str) {
        let font_name = self.state.font_name.as_str();
        let font = match self.fonts.resolve(font_name) {
            Some(font) if !is_base14(font_name) => font,
            _ => {
                debug!("no outlines for \"{font_name}\", text left out of proof");
                return;
            }
        };
        let Ok(face) = ttf_parser::Face::parse(&font.data, 0) else {
            debug!("cannot parse outlines of \"{}\"", font.name);
            return;
        };
        let scale = self.state.font_size.to_f32() / face.units_per_em().max(1) as f32;
        let mut pen_x = x.to_f32();
        let origin_y = y.to_f32();
        let mut builder = GlyphPathBuilder::new(scale);
        for ch in text.chars() {
            let Some(glyph) = face.glyph_index(ch) else {
                continue;
            };
            builder.origin_x = pen_x;
            builder.origin_y = origin_y;
            face.outline_glyph(glyph, &mut builder);
            let advance = face.glyph_hor_advance(glyph).unwrap_or(0);
            pen_x += advance as f32 * scale;
        }
        let Some(path) = builder.finish() else {
            return;
        };
        let paint = fill_paint(self.state.fill_color, self.state.fill_opacity);
        let transform = self.device_transform();
        self.pixmap.fill_path(
            &path,
            &paint,
            FillRule::Winding,
            transform,
            self.state.clip_mask.as_ref(),
        );
    }

    fn draw_image(&mut self, image: &Arc<RasterImage>, alpha: bool) {
        let device = self.device_transform();
        let paint = PixmapPaint {
            opacity: self.state.fill_opacity,
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        let key = (Arc::as_ptr(image) as usize, alpha);
        let entry = self
            .image_cache
            .entry(key)
            .or_insert_with(|| image_to_pixmap(image, alpha));
        let Some(source) = entry.as_ref() else {
            return;
        };
        let w = source.width() as f32;
        let h = source.height() as f32;
        // Pixel rows fill the unit square top-down, row 0 at y = 1.
        let unit = Transform::from_row(1.0 / w, 0.0, 0.0, -1.0 / h, 0.0, 1.0);
        self.pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            device.pre_concat(unit),
            self.state.clip_mask.as_ref(),
        );
    }
}

fn fill_rule(evenodd: bool) -> FillRule {
    if evenodd {
        FillRule::EvenOdd
    } else {
        FillRule::Winding
    }
}

fn image_to_pixmap(image: &RasterImage, alpha: bool) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in image.rgba().chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = if alpha { src_px[3] } else { 255 };
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

/// Collects glyph outlines, in font units scaled to points, at a pen origin.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x: 0.0,
            origin_y: 0.0,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y + y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = opacity.clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a).unwrap_or(tiny_skia::Color::BLACK)
}

fn pt_milli_to_px_u32(pt_milli: i64, dpi: u32) -> Result<u32, LabelError> {
    let px = pt_milli_to_px_i64(pt_milli, dpi);
    if px <= 0 {
        return Err(LabelError::InvalidConfiguration(format!(
            "invalid non-positive pixel dimension {px} for pt_milli={pt_milli} dpi={dpi}"
        )));
    }
    u32::try_from(px).map_err(|_| {
        LabelError::InvalidConfiguration(format!(
            "pixel dimension out of range: {px} for pt_milli={pt_milli} dpi={dpi}"
        ))
    })
}

// Rounds half away from zero.
fn pt_milli_to_px_i64(pt_milli: i64, dpi: u32) -> i64 {
    let num = (pt_milli as i128).saturating_mul(dpi as i128);
    let den = 72_000_i128;
    let px = if num >= 0 {
        (num + (den / 2)) / den
    } else {
        -(((-num) + (den / 2)) / den)
    };
    px.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::Size;

    fn decode(png: &[u8]) -> image::RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    fn has_non_white_pixel(img: &image::RgbaImage) -> bool {
        img.pixels().any(|p| {
            let [r, g, b, _a] = p.0;
            !(r == 255 && g == 255 && b == 255)
        })
    }

    #[test]
    fn pt_milli_to_px_rounds_half_away_from_zero() {
        assert_eq!(pt_milli_to_px_i64(72_000, 150), 150);
        assert_eq!(pt_milli_to_px_i64(240, 150), 1);
        assert_eq!(pt_milli_to_px_i64(-240, 150), -1);
        assert_eq!(pt_milli_to_px_i64(239, 150), 0);
    }

    #[test]
    fn filled_square_lands_bottom_left() {
        let mut canvas = Canvas::new(Size::new(Pt::from_i32(72), Pt::from_i32(72)));
        canvas.begin_page("1");
        canvas.set_fill_color(Color::rgb(1.0, 0.0, 0.0));
        canvas.move_to(Pt::ZERO, Pt::ZERO);
        canvas.line_to(Pt::from_i32(36), Pt::ZERO);
        canvas.line_to(Pt::from_i32(36), Pt::from_i32(36));
        canvas.line_to(Pt::ZERO, Pt::from_i32(36));
        canvas.close_path();
        canvas.fill();
        let doc = canvas.finish();

        let pngs = document_to_png_pages(&doc, &FontRegistry::new(), 72).unwrap();
        let img = decode(&pngs[0]);
        assert_eq!(img.dimensions(), (72, 72));
        assert_eq!(img.get_pixel(10, 60).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(10, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn clip_limits_painting() {
        let mut canvas = Canvas::new(Size::new(Pt::from_i32(40), Pt::from_i32(40)));
        canvas.begin_page("1");
        canvas.move_to(Pt::ZERO, Pt::ZERO);
        canvas.line_to(Pt::from_i32(10), Pt::ZERO);
        canvas.line_to(Pt::from_i32(10), Pt::from_i32(10));
        canvas.close_path();
        canvas.clip_path(false);
        canvas.move_to(Pt::ZERO, Pt::ZERO);
        canvas.line_to(Pt::from_i32(40), Pt::ZERO);
        canvas.line_to(Pt::from_i32(40), Pt::from_i32(40));
        canvas.line_to(Pt::ZERO, Pt::from_i32(40));
        canvas.close_path();
        canvas.fill();
        let doc = canvas.finish();

        let img = decode(&document_to_png_pages(&doc, &FontRegistry::new(), 72).unwrap()[0]);
        assert_eq!(img.get_pixel(30, 10).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(8, 38).0, [0, 0, 0, 255]);
    }

    #[test]
    fn image_fills_unit_square_top_row_up() {
        // Two rows: red on top, blue below.
        let pixels = RasterImage::from_rgb(1, 2, &[255, 0, 0, 0, 0, 255]).unwrap();
        let mut canvas = Canvas::new(Size::new(Pt::from_i32(20), Pt::from_i32(20)));
        canvas.begin_page("1");
        canvas.scale(20.0, 20.0);
        canvas.draw_rgb_image(Arc::new(pixels));
        let doc = canvas.finish();

        let img = decode(&document_to_png_pages(&doc, &FontRegistry::new(), 72).unwrap()[0]);
        let top = img.get_pixel(10, 2).0;
        let bottom = img.get_pixel(10, 17).0;
        assert!(top[0] > 200 && top[2] < 50);
        assert!(bottom[2] > 200 && bottom[0] < 50);
    }

    #[test]
    fn base14_text_is_skipped() {
        let mut canvas = Canvas::new(Size::letter());
        canvas.begin_page("1");
        canvas.set_font_name("Helvetica-Bold");
        canvas.draw_string(Pt::from_i32(72), Pt::from_i32(72), "Hello");
        let doc = canvas.finish();
        let img = decode(&document_to_png_pages(&doc, &FontRegistry::new(), 0).unwrap()[0]);
        assert_eq!(img.dimensions(), (1275, 1650));
        assert!(!has_non_white_pixel(&img));
    }

    #[test]
    fn zero_sized_pages_are_rejected() {
        let doc = Document {
            page_size: Size::new(Pt::ZERO, Pt::from_i32(10)),
            pages: Vec::new(),
        };
        assert!(matches!(
            document_to_png_pages(&doc, &FontRegistry::new(), 72),
            Err(LabelError::InvalidConfiguration(_))
        ));
    }
}

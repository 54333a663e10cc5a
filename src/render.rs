//! Draws label objects onto the canvas in design coordinates.
//!
//! Every routine sets all the state it depends on (colour, opacity, line
//! width, font); nothing is assumed to survive from a previous object.

use crate::barcode::{self, BARCODE_FONT};
use crate::canvas::Canvas;
use crate::design::{
    BarcodeObject, FontWeight, ImageObject, Justification, LabelObject, LineObject, ShapeObject,
    TextObject,
};
use crate::font::FontRegistry;
use crate::merge::{self, MergeRecord};
use crate::outline::Path;
use crate::types::{Pt, Rgba};
use log::{debug, warn};

/// Text drawn in place of a barcode whose data the symbology rejects.
pub const INVALID_BARCODE_TEXT: &str = "Invalid barcode";
const INVALID_BARCODE_SIZE: i32 = 12;

pub fn draw_objects(
    canvas: &mut Canvas,
    fonts: &FontRegistry,
    objects: &[LabelObject],
    record: Option<&MergeRecord>,
) {
    for object in objects {
        draw_object(canvas, fonts, object, record);
    }
}

pub fn draw_object(
    canvas: &mut Canvas,
    fonts: &FontRegistry,
    object: &LabelObject,
    record: Option<&MergeRecord>,
) {
    match object {
        LabelObject::Text(text) => draw_text(canvas, fonts, text, record),
        LabelObject::Box(shape) => draw_box(canvas, shape),
        LabelObject::Line(line) => draw_line(canvas, line),
        LabelObject::Ellipse(shape) => draw_ellipse(canvas, shape),
        LabelObject::Image(image) => draw_image(canvas, image),
        LabelObject::Barcode(code) => draw_barcode(canvas, fonts, code, record),
    }
}

fn set_fill(canvas: &mut Canvas, color: Rgba) {
    canvas.set_fill_color(color.color());
    canvas.set_opacity(color.opacity(), color.opacity());
}

fn set_stroke(canvas: &mut Canvas, color: Rgba, width: Pt) {
    canvas.set_stroke_color(color.color());
    canvas.set_opacity(color.opacity(), color.opacity());
    canvas.set_line_width(width);
}

/// Draws `text` with its baseline at `(x, baseline)`, flipping Y locally so
/// glyphs come out upright under the label's flipped frame.
fn show_text(canvas: &mut Canvas, x: Pt, baseline: Pt, text: &str) {
    let mut guard = canvas.save();
    guard.translate(x, baseline);
    guard.scale(1.0, -1.0);
    guard.draw_string(Pt::ZERO, Pt::ZERO, text);
}

fn draw_text(
    canvas: &mut Canvas,
    fonts: &FontRegistry,
    object: &TextObject,
    record: Option<&MergeRecord>,
) {
    let font = &object.font;
    let font_name = fonts.select(&font.family, font.weight == FontWeight::Bold, font.italic);
    canvas.set_font_name(&font_name);
    canvas.set_font_size(font.size);
    set_fill(canvas, object.color);

    let descent = fonts.descent(&font_name, font.size);
    let text = merge::expand(&object.text, record);
    for (i, line) in text.split('\n').enumerate() {
        let line_width = fonts.measure_text_width(&font_name, font.size, line);
        let x_offset = match object.justify {
            Justification::Left => Pt::ZERO,
            Justification::Center => (object.w - line_width) / 2.0,
            Justification::Right => object.w - line_width,
        };
        let baseline = object.y + font.size * (i as i32 + 1) - descent;
        show_text(canvas, object.x + x_offset, baseline, line);
    }
}

fn draw_box(canvas: &mut Canvas, object: &ShapeObject) {
    let path = Path::rectangle(object.x, object.y, object.w, object.h);
    fill_then_stroke(canvas, &path, object);
}

fn draw_ellipse(canvas: &mut Canvas, object: &ShapeObject) {
    let rx = object.w / 2.0;
    let ry = object.h / 2.0;
    let path = Path::ellipse(object.x + rx, object.y + ry, rx, ry);
    fill_then_stroke(canvas, &path, object);
}

fn fill_then_stroke(canvas: &mut Canvas, path: &Path, object: &ShapeObject) {
    path.emit(canvas);
    set_fill(canvas, object.fill_color);
    canvas.fill();

    path.emit(canvas);
    set_stroke(canvas, object.line_color, object.line_width);
    canvas.stroke();
}

fn draw_line(canvas: &mut Canvas, object: &LineObject) {
    canvas.move_to(object.x, object.y);
    canvas.line_to(object.x + object.w, object.y + object.h);
    set_stroke(canvas, object.line_color, object.line_width);
    canvas.stroke();
}

fn draw_image(canvas: &mut Canvas, object: &ImageObject) {
    let Some(pixels) = object.pixels.as_ref() else {
        warn!(
            "image object at ({}, {}) has no pixel data, skipped",
            object.x.to_f32(),
            object.y.to_f32()
        );
        return;
    };
    let mut guard = canvas.save();
    guard.translate(object.x, object.y + object.h);
    guard.scale(object.w.to_f32(), -object.h.to_f32());
    if pixels.has_alpha() {
        guard.draw_rgba_image(pixels.clone());
    } else {
        guard.draw_rgb_image(pixels.clone());
    }
}

fn draw_barcode(
    canvas: &mut Canvas,
    fonts: &FontRegistry,
    object: &BarcodeObject,
    record: Option<&MergeRecord>,
) {
    let data = merge::expand(&object.data, record);
    let geometry = match barcode::layout(object.symbology, &data, object.show_text, object.scale)
    {
        Ok(geometry) => geometry,
        Err(err) => {
            warn!("{err}; drawing \"{INVALID_BARCODE_TEXT}\" instead");
            draw_invalid_barcode(canvas, fonts, object);
            return;
        }
    };
    debug!(
        "barcode {:?} \"{data}\": {} bars, {} chars",
        object.symbology,
        geometry.lines.len(),
        geometry.chars.len()
    );

    for line in &geometry.lines {
        let x = object.x + Pt::from_f32(line.x);
        let y = object.y + Pt::from_f32(line.y);
        canvas.move_to(x, y);
        canvas.line_to(x, y + Pt::from_f32(line.length));
        set_stroke(canvas, object.color, Pt::from_f32(line.width));
        canvas.stroke();
    }

    for ch in &geometry.chars {
        let size = Pt::from_f32(ch.size);
        canvas.set_font_name(BARCODE_FONT);
        canvas.set_font_size(size);
        set_fill(canvas, object.color);
        let baseline = object.y + Pt::from_f32(ch.y) + size - fonts.descent(BARCODE_FONT, size);
        show_text(
            canvas,
            object.x + Pt::from_f32(ch.x),
            baseline,
            ch.c.encode_utf8(&mut [0u8; 4]),
        );
    }
}

fn draw_invalid_barcode(canvas: &mut Canvas, fonts: &FontRegistry, object: &BarcodeObject) {
    let size = Pt::from_i32(INVALID_BARCODE_SIZE);
    canvas.set_font_name(BARCODE_FONT);
    canvas.set_font_size(size);
    set_fill(canvas, object.color);
    let baseline = object.y + size - fonts.descent(BARCODE_FONT, size);
    show_text(canvas, object.x, baseline, INVALID_BARCODE_TEXT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::RasterImage;
    use crate::barcode::Symbology;
    use crate::canvas::Command;
    use crate::design::FontSpec;
    use crate::types::{Color, Size};
    use pretty_assertions::assert_eq;

    fn canvas() -> Canvas {
        let mut canvas = Canvas::new(Size::letter());
        canvas.begin_page("test");
        canvas
    }

    fn text_object(text: &str, justify: Justification) -> LabelObject {
        LabelObject::Text(TextObject {
            x: Pt::from_i32(10),
            y: Pt::from_i32(5),
            w: Pt::from_i32(100),
            h: Pt::from_i32(30),
            text: text.to_string(),
            font: FontSpec {
                family: "Courier".to_string(),
                size: Pt::from_i32(10),
                ..FontSpec::default()
            },
            color: Rgba::BLACK,
            justify,
        })
    }

    fn translations(commands: &[Command]) -> Vec<(Pt, Pt)> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Translate(x, y) => Some((*x, *y)),
                _ => None,
            })
            .collect()
    }

    fn strings(commands: &[Command]) -> Vec<String> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn text_lines_are_justified_and_stacked() {
        let fonts = FontRegistry::new();
        let mut c = canvas();
        // Courier 10pt: 6pt per character, descent 1.57pt.
        draw_object(&mut c, &fonts, &text_object("abcd\nab", Justification::Right), None);
        let moves = translations(c.current_commands());
        assert_eq!(
            moves,
            vec![
                (Pt::from_i32(86), Pt::from_f32(13.43)),
                (Pt::from_i32(98), Pt::from_f32(23.43)),
            ]
        );
        assert_eq!(strings(c.current_commands()), vec!["abcd", "ab"]);
        assert_eq!(c.state_depth(), 0);
    }

    #[test]
    fn centered_text_splits_remaining_width() {
        let fonts = FontRegistry::new();
        let mut c = canvas();
        draw_object(&mut c, &fonts, &text_object("abcde", Justification::Center), None);
        let moves = translations(c.current_commands());
        assert_eq!(moves[0].0, Pt::from_i32(45));
    }

    #[test]
    fn text_expands_merge_fields() {
        let fonts = FontRegistry::new();
        let record = MergeRecord::new([("name", "Grace")]);
        let mut c = canvas();
        draw_object(
            &mut c,
            &fonts,
            &text_object("Dear ${name}", Justification::Left),
            Some(&record),
        );
        assert_eq!(strings(c.current_commands()), vec!["Dear Grace"]);
    }

    #[test]
    fn box_fills_then_strokes_with_independent_alpha() {
        let mut c = canvas();
        let shape = ShapeObject {
            x: Pt::ZERO,
            y: Pt::ZERO,
            w: Pt::from_i32(20),
            h: Pt::from_i32(10),
            line_width: Pt::from_i32(2),
            line_color: Rgba::new(0, 0, 255, 255),
            fill_color: Rgba::new(255, 0, 0, 51),
        };
        draw_box(&mut c, &shape);
        let cmds = c.current_commands();
        let fill_at = cmds.iter().position(|c| *c == Command::Fill).unwrap();
        let stroke_at = cmds.iter().position(|c| *c == Command::Stroke).unwrap();
        assert!(fill_at < stroke_at);
        assert!(cmds[..fill_at].contains(&Command::SetOpacity {
            fill: 0.2,
            stroke: 0.2
        }));
        assert!(cmds[fill_at..stroke_at].contains(&Command::SetOpacity {
            fill: 1.0,
            stroke: 1.0
        }));
        assert!(cmds[fill_at..stroke_at].contains(&Command::SetStrokeColor(Color::rgb(0.0, 0.0, 1.0))));
    }

    #[test]
    fn line_runs_from_origin_by_size() {
        let mut c = canvas();
        draw_line(
            &mut c,
            &LineObject {
                x: Pt::from_i32(1),
                y: Pt::from_i32(2),
                w: Pt::from_i32(30),
                h: Pt::from_i32(-2),
                line_width: Pt::from_f32(0.5),
                line_color: Rgba::BLACK,
            },
        );
        let cmds = c.current_commands();
        assert_eq!(cmds[0], Command::MoveTo { x: Pt::from_i32(1), y: Pt::from_i32(2) });
        assert_eq!(cmds[1], Command::LineTo { x: Pt::from_i32(31), y: Pt::ZERO });
        assert_eq!(cmds.last(), Some(&Command::Stroke));
    }

    #[test]
    fn image_picks_blit_by_alpha_channel() {
        let opaque = RasterImage::from_rgb(1, 1, &[9, 9, 9]).unwrap();
        let translucent = RasterImage::from_rgba(1, 1, vec![9, 9, 9, 100]).unwrap();
        for (pixels, want_alpha) in [(opaque, false), (translucent, true)] {
            let mut c = canvas();
            let image = ImageObject::with_pixels(
                Pt::from_i32(5),
                Pt::from_i32(6),
                Pt::from_i32(40),
                Pt::from_i32(20),
                pixels,
            );
            draw_image(&mut c, &image);
            let cmds = c.current_commands();
            assert_eq!(cmds[1], Command::Translate(Pt::from_i32(5), Pt::from_i32(26)));
            assert_eq!(cmds[2], Command::Scale(40.0, -20.0));
            assert!(matches!(&cmds[3], Command::DrawImage { alpha, .. } if *alpha == want_alpha));
            assert_eq!(c.state_depth(), 0);
        }
    }

    #[test]
    fn image_without_pixels_draws_nothing() {
        let mut c = canvas();
        let image = ImageObject {
            x: Pt::ZERO,
            y: Pt::ZERO,
            w: Pt::from_i32(1),
            h: Pt::from_i32(1),
            source: None,
            pixels: None,
        };
        draw_image(&mut c, &image);
        assert!(c.current_commands().is_empty());
    }

    #[test]
    fn rejected_barcode_falls_back_to_notice_in_object_colour() {
        let fonts = FontRegistry::new();
        let mut c = canvas();
        let red = Rgba::new(255, 0, 0, 255);
        let code = LabelObject::Barcode(BarcodeObject {
            x: Pt::from_i32(3),
            y: Pt::from_i32(4),
            data: "${sku}".to_string(),
            symbology: Symbology::Ean13,
            show_text: true,
            color: red,
            scale: 1.0,
        });
        draw_object(&mut c, &fonts, &code, Some(&MergeRecord::new([("sku", "xyz")])));
        let cmds = c.current_commands();
        assert_eq!(strings(cmds), vec![INVALID_BARCODE_TEXT]);
        assert!(cmds.contains(&Command::SetFillColor(red.color())));
        assert!(cmds.contains(&Command::SetFontName("Courier".to_string())));
        assert!(!cmds.contains(&Command::Stroke));
        // 12pt Courier: baseline at y + 12 - 1.884.
        assert_eq!(
            translations(cmds),
            vec![(Pt::from_i32(3), Pt::from_f32(14.116))]
        );
        assert_eq!(c.state_depth(), 0);
    }

    #[test]
    fn valid_barcode_strokes_bars_and_prints_digits() {
        let fonts = FontRegistry::new();
        let mut c = canvas();
        let object = BarcodeObject {
            x: Pt::ZERO,
            y: Pt::ZERO,
            data: "1234".to_string(),
            symbology: Symbology::Code128,
            show_text: true,
            color: Rgba::BLACK,
            scale: 1.0,
        };
        draw_barcode(&mut c, &fonts, &object, None);
        let cmds = c.current_commands();
        let strokes = cmds.iter().filter(|c| **c == Command::Stroke).count();
        let expected = barcode::layout(Symbology::Code128, "1234", true, 1.0).unwrap();
        assert_eq!(strokes, expected.lines.len());
        assert_eq!(strings(cmds), vec!["1", "2", "3", "4"]);
    }
}

//! Die-cut outline paths, used for alignment strokes and for clipping label
//! content.

use crate::canvas::Canvas;
use crate::error::LabelError;
use crate::template::OutlineStyle;
use crate::types::{Color, Pt, Size};

/// Outline stroke colour (dark gray).
pub const OUTLINE_GRAY: f32 = 0.25;
/// Outline stroke width in points.
pub const OUTLINE_LINE_WIDTH: f32 = 0.25;

const ELLIPSE_STEP_DEG: usize = 2;
const ARC_STEP_DEG: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathOp {
    MoveTo(Pt, Pt),
    LineTo(Pt, Pt),
    Close,
}

/// Closed polyline path in label-local coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    ops: Vec<PathOp>,
}

impl Path {
    fn move_to(&mut self, x: f64, y: f64) {
        self.ops.push(PathOp::MoveTo(Pt::from_f64(x), Pt::from_f64(y)));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.ops.push(PathOp::LineTo(Pt::from_f64(x), Pt::from_f64(y)));
    }

    fn close(&mut self) {
        self.ops.push(PathOp::Close);
    }

    pub fn rectangle(x0: Pt, y0: Pt, w: Pt, h: Pt) -> Self {
        let (x0, y0, w, h) = (x0.to_f64(), y0.to_f64(), w.to_f64(), h.to_f64());
        let mut path = Path::default();
        path.move_to(x0, y0);
        path.line_to(x0 + w, y0);
        path.line_to(x0 + w, y0 + h);
        path.line_to(x0, y0 + h);
        path.line_to(x0, y0);
        path.close();
        path
    }

    /// Rectangle whose corners are quarter circles of radius `r`, sampled
    /// every 5 degrees.
    pub fn rounded_rectangle(x0: Pt, y0: Pt, w: Pt, h: Pt, r: Pt) -> Self {
        let (x0, y0, w, h, r) = (
            x0.to_f64(),
            y0.to_f64(),
            w.to_f64(),
            h.to_f64(),
            r.to_f64(),
        );
        let mut path = Path::default();
        path.move_to(x0 + r, y0);
        for deg in (ARC_STEP_DEG..=90).step_by(ARC_STEP_DEG) {
            let (sin, cos) = sin_cos_deg(deg);
            path.line_to(x0 + r - r * sin, y0 + r - r * cos);
        }
        for deg in (0..=90).step_by(ARC_STEP_DEG) {
            let (sin, cos) = sin_cos_deg(deg);
            path.line_to(x0 + r - r * cos, y0 + (h - r) + r * sin);
        }
        for deg in (0..=90).step_by(ARC_STEP_DEG) {
            let (sin, cos) = sin_cos_deg(deg);
            path.line_to(x0 + (w - r) + r * sin, y0 + (h - r) + r * cos);
        }
        for deg in (0..=90).step_by(ARC_STEP_DEG) {
            let (sin, cos) = sin_cos_deg(deg);
            path.line_to(x0 + (w - r) + r * cos, y0 + r - r * sin);
        }
        path.line_to(x0 + r, y0);
        path.close();
        path
    }

    /// Ellipse centred on `(cx, cy)`, sampled every 2 degrees (180 segments).
    pub fn ellipse(cx: Pt, cy: Pt, rx: Pt, ry: Pt) -> Self {
        let (cx, cy, rx, ry) = (cx.to_f64(), cy.to_f64(), rx.to_f64(), ry.to_f64());
        let mut path = Path::default();
        path.move_to(cx + rx, cy);
        for deg in (ELLIPSE_STEP_DEG..=360).step_by(ELLIPSE_STEP_DEG) {
            let (sin, cos) = sin_cos_deg(deg);
            path.line_to(cx + rx * cos, cy + ry * sin);
        }
        path.close();
        path
    }

    pub fn ops(&self) -> &[PathOp] {
        &self.ops
    }

    /// Number of straight segments (line-tos) in the path.
    pub fn segment_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, PathOp::LineTo(..)))
            .count()
    }

    pub fn vertices(&self) -> impl Iterator<Item = (Pt, Pt)> + '_ {
        self.ops.iter().filter_map(|op| match *op {
            PathOp::MoveTo(x, y) | PathOp::LineTo(x, y) => Some((x, y)),
            PathOp::Close => None,
        })
    }

    /// Appends the path to the canvas's current path.
    pub fn emit(&self, canvas: &mut Canvas) {
        for op in &self.ops {
            match *op {
                PathOp::MoveTo(x, y) => canvas.move_to(x, y),
                PathOp::LineTo(x, y) => canvas.line_to(x, y),
                PathOp::Close => canvas.close_path(),
            }
        }
    }
}

fn sin_cos_deg(deg: usize) -> (f64, f64) {
    let rad = (deg as f64).to_radians();
    (libm::sin(rad), libm::cos(rad))
}

/// Outline of one label in its design frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineSpec {
    style: OutlineStyle,
    frame: Size,
}

impl OutlineSpec {
    /// `frame` is the design frame size (swapped for rotated designs); it
    /// sizes rectangular outlines.
    pub fn new(style: &OutlineStyle, frame: Size) -> Self {
        Self {
            style: style.clone(),
            frame,
        }
    }

    pub fn style(&self) -> &OutlineStyle {
        &self.style
    }

    /// Paths stroked when outlines are requested: the outer shape, plus the
    /// hole for CD labels.
    pub fn stroke_paths(&self) -> Result<Vec<Path>, LabelError> {
        let outer = self.clip_path()?;
        let mut paths = vec![outer];
        if let OutlineStyle::CircleWithHole { radius, hole } = self.style {
            paths.push(Path::ellipse(radius, radius, hole, hole));
        }
        Ok(paths)
    }

    /// Clip boundary. CD labels clip to the outer circle only; the hole is
    /// not cut out of the content.
    pub fn clip_path(&self) -> Result<Path, LabelError> {
        let (w, h) = (self.frame.width, self.frame.height);
        match &self.style {
            OutlineStyle::Rectangle { .. } => Ok(Path::rectangle(Pt::ZERO, Pt::ZERO, w, h)),
            OutlineStyle::RoundedRectangle { radius, .. } => Ok(Path::rounded_rectangle(
                Pt::ZERO,
                Pt::ZERO,
                w,
                h,
                *radius,
            )),
            OutlineStyle::Circle { radius } | OutlineStyle::CircleWithHole { radius, .. } => {
                Ok(Path::ellipse(*radius, *radius, *radius, *radius))
            }
            OutlineStyle::Unsupported(name) => Err(LabelError::UnsupportedOutline(name.clone())),
        }
    }
}

/// Strokes the outline in thin dark gray at full opacity.
pub fn stroke_outline(canvas: &mut Canvas, spec: &OutlineSpec) -> Result<(), LabelError> {
    let paths = spec.stroke_paths()?;
    canvas.set_stroke_color(Color::gray(OUTLINE_GRAY));
    canvas.set_opacity(1.0, 1.0);
    canvas.set_line_width(Pt::from_f32(OUTLINE_LINE_WIDTH));
    for path in &paths {
        path.emit(canvas);
        canvas.stroke();
    }
    Ok(())
}

/// Intersects the clip region with the outline.
pub fn clip_to_outline(canvas: &mut Canvas, spec: &OutlineSpec) -> Result<(), LabelError> {
    let path = spec.clip_path()?;
    path.emit(canvas);
    canvas.clip_path(false);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;

    fn pt(v: i32) -> Pt {
        Pt::from_i32(v)
    }

    #[test]
    fn rectangle_is_four_segments_of_exact_size() {
        let path = Path::rectangle(Pt::ZERO, Pt::ZERO, pt(180), pt(72));
        assert_eq!(path.segment_count(), 4);
        assert_eq!(path.ops().last(), Some(&PathOp::Close));
        let corners: Vec<_> = path.vertices().collect();
        assert_eq!(
            corners,
            vec![
                (pt(0), pt(0)),
                (pt(180), pt(0)),
                (pt(180), pt(72)),
                (pt(0), pt(72)),
                (pt(0), pt(0)),
            ]
        );
    }

    #[test]
    fn rounded_rectangle_stays_in_bounds_and_touches_edges() {
        let (w, h, r) = (pt(180), pt(72), pt(9));
        let path = Path::rounded_rectangle(Pt::ZERO, Pt::ZERO, w, h, r);
        let mut touches = [false; 4];
        for (x, y) in path.vertices() {
            assert!(x >= Pt::ZERO && x <= w, "x out of bounds: {x:?}");
            assert!(y >= Pt::ZERO && y <= h, "y out of bounds: {y:?}");
            touches[0] |= y == Pt::ZERO;
            touches[1] |= y == h;
            touches[2] |= x == Pt::ZERO;
            touches[3] |= x == w;
        }
        assert_eq!(touches, [true; 4]);
        assert_eq!(path.ops().last(), Some(&PathOp::Close));
    }

    #[test]
    fn circle_has_180_segments_around_centre() {
        let path = Path::ellipse(pt(50), pt(50), pt(50), pt(50));
        assert_eq!(path.segment_count(), 180);
        for (x, y) in path.vertices() {
            let dx = x.to_f64() - 50.0;
            let dy = y.to_f64() - 50.0;
            assert!(((dx * dx + dy * dy).sqrt() - 50.0).abs() < 0.01);
        }
    }

    #[test]
    fn cd_strokes_hole_but_clips_outer_circle_only() {
        let style = OutlineStyle::CircleWithHole {
            radius: pt(58),
            hole: pt(8),
        };
        let spec = OutlineSpec::new(&style, style.size());
        assert_eq!(spec.stroke_paths().unwrap().len(), 2);
        assert_eq!(
            spec.clip_path().unwrap(),
            Path::ellipse(pt(58), pt(58), pt(58), pt(58))
        );
    }

    #[test]
    fn unsupported_style_is_an_error() {
        let spec = OutlineSpec::new(&OutlineStyle::Unsupported("hex".into()), Size::letter());
        assert!(matches!(
            spec.clip_path(),
            Err(LabelError::UnsupportedOutline(_))
        ));
    }

    #[test]
    fn stroke_outline_sets_gray_hairline() {
        let style = OutlineStyle::rect(pt(100), pt(50), Pt::ZERO);
        let spec = OutlineSpec::new(&style, style.size());
        let mut canvas = Canvas::new(Size::letter());
        canvas.begin_page("p");
        stroke_outline(&mut canvas, &spec).unwrap();
        let cmds = canvas.current_commands();
        assert_eq!(cmds[0], Command::SetStrokeColor(Color::gray(0.25)));
        assert!(cmds.contains(&Command::SetLineWidth(Pt::from_f32(0.25))));
        assert_eq!(cmds.last(), Some(&Command::Stroke));
    }
}

//! Placement transforms: label-local coordinates to sheet coordinates.

use crate::canvas::Canvas;
use crate::template::Template;
use crate::types::{Pt, Size};
use std::f64::consts::FRAC_PI_2;

/// 2-D affine matrix in PDF order `[a b c d e f]`, mapping `(x, y)` to
/// `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotate(radians: f64) -> Self {
        let (sin, cos) = (libm::sin(radians), libm::cos(radians));
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// `self` followed by `next`: the result maps `p` to `next(self(p))`.
    pub fn then(self, next: Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            e: next.a * self.e + next.c * self.f + next.e,
            f: next.b * self.e + next.d * self.f + next.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn approx_eq(&self, other: &Affine, eps: f64) -> bool {
        [
            (self.a, other.a),
            (self.b, other.b),
            (self.c, other.c),
            (self.d, other.d),
            (self.e, other.e),
            (self.f, other.f),
        ]
        .iter()
        .all(|(l, r)| (l - r).abs() <= eps)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Affine::IDENTITY
    }
}

/// One operation of a placement, expressed in the current (already
/// transformed) coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformStep {
    Translate(Pt, Pt),
    Rotate(f64),
    Scale(f64, f64),
    Concat(Affine),
}

impl TransformStep {
    pub fn matrix(&self) -> Affine {
        match *self {
            TransformStep::Translate(x, y) => Affine::translate(x.to_f64(), y.to_f64()),
            TransformStep::Rotate(radians) => Affine::rotate(radians),
            TransformStep::Scale(sx, sy) => Affine::scale(sx, sy),
            TransformStep::Concat(m) => m,
        }
    }

    fn apply(&self, canvas: &mut Canvas) {
        match *self {
            TransformStep::Translate(x, y) => canvas.translate(x, y),
            TransformStep::Rotate(radians) => canvas.rotate(radians as f32),
            TransformStep::Scale(sx, sy) => canvas.scale(sx as f32, sy as f32),
            TransformStep::Concat(m) => canvas.concat_matrix(
                m.a as f32,
                m.b as f32,
                m.c as f32,
                m.d as f32,
                Pt::from_f64(m.e),
                Pt::from_f64(m.f),
            ),
        }
    }
}

/// Ordered steps that put a label design into its grid cell.
///
/// Design coordinates have their origin at the label's top-left corner with
/// Y growing downward; the sheet has Y growing upward.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    steps: Vec<TransformStep>,
}

impl Placement {
    /// Builds the placement for `cell` of `template`.
    ///
    /// `size` is the design frame (already swapped for rotated designs).
    /// Returns `None` when `cell` is outside the sheet.
    pub fn build(
        template: &Template,
        cell: usize,
        size: Size,
        rotate: bool,
        mirror: bool,
    ) -> Option<Self> {
        let (x, y) = template.cell_origin(cell)?;
        let mut steps = vec![TransformStep::Translate(x, y)];
        if rotate {
            steps.push(TransformStep::Rotate(FRAC_PI_2));
            steps.push(TransformStep::Scale(1.0, -1.0));
        } else {
            steps.push(TransformStep::Concat(Affine::new(
                1.0,
                0.0,
                0.0,
                -1.0,
                0.0,
                size.height.to_f64(),
            )));
        }
        if mirror {
            steps.extend(mirror_steps(size.width));
        }
        Some(Self { steps })
    }

    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    /// Composite matrix from design coordinates to sheet coordinates.
    pub fn matrix(&self) -> Affine {
        self.steps
            .iter()
            .fold(Affine::IDENTITY, |ctm, step| step.matrix().then(ctm))
    }

    /// Emits every step onto the canvas, in order.
    pub fn apply(&self, canvas: &mut Canvas) {
        for step in &self.steps {
            step.apply(canvas);
        }
    }
}

/// Horizontal mirror about the centre of a frame `width` wide.
pub fn mirror_steps(width: Pt) -> [TransformStep; 2] {
    [
        TransformStep::Translate(width, Pt::ZERO),
        TransformStep::Concat(Affine::new(-1.0, 0.0, 0.0, 1.0, 0.0, 0.0)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{OutlineStyle, PaperSize};

    const EPS: f64 = 1e-9;

    fn template() -> Template {
        Template::new(
            "t",
            PaperSize::default(),
            (2, 3),
            (Pt::from_i32(200), Pt::from_i32(100)),
            (Pt::from_i32(10), Pt::from_i32(20)),
            OutlineStyle::rect(Pt::from_i32(180), Pt::from_i32(90), Pt::ZERO),
        )
        .unwrap()
    }

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6
    }

    #[test]
    fn then_composes_in_application_order() {
        let m = Affine::translate(5.0, 0.0).then(Affine::scale(2.0, 2.0));
        assert!(close(m.apply(1.0, 1.0), (12.0, 2.0)));
        let n = Affine::scale(2.0, 2.0).then(Affine::translate(5.0, 0.0));
        assert!(close(n.apply(1.0, 1.0), (7.0, 2.0)));
    }

    #[test]
    fn unrotated_design_top_left_maps_to_cell_top() {
        let t = template();
        let size = t.label_size(false);
        let p = Placement::build(&t, 0, size, false, false).unwrap();
        let m = p.matrix();
        // Cell 0 sits in the top row (iy = 2).
        assert!(close(m.apply(0.0, 0.0), (10.0, 20.0 + 200.0 + 90.0)));
        assert!(close(m.apply(0.0, 90.0), (10.0, 220.0)));
        assert!(close(m.apply(180.0, 0.0), (190.0, 310.0)));
    }

    #[test]
    fn rotated_design_swaps_axes() {
        let t = template();
        let size = t.label_size(true);
        let p = Placement::build(&t, 5, size, true, false).unwrap();
        let m = p.matrix();
        // Design x runs up the sheet, design y runs right.
        assert!(close(m.apply(0.0, 0.0), (210.0, 20.0)));
        assert!(close(m.apply(10.0, 0.0), (210.0, 30.0)));
        assert!(close(m.apply(0.0, 10.0), (220.0, 20.0)));
    }

    #[test]
    fn mirror_reflects_within_frame() {
        let t = template();
        let size = t.label_size(false);
        let plain = Placement::build(&t, 3, size, false, false).unwrap().matrix();
        let mirrored = Placement::build(&t, 3, size, false, true).unwrap().matrix();
        assert!(close(mirrored.apply(0.0, 0.0), plain.apply(180.0, 0.0)));
        assert!(close(mirrored.apply(30.0, 40.0), plain.apply(150.0, 40.0)));
    }

    #[test]
    fn mirror_twice_is_identity() {
        let width = Pt::from_f32(123.5);
        let once = mirror_steps(width)
            .iter()
            .fold(Affine::IDENTITY, |ctm, s| s.matrix().then(ctm));
        let twice = once.then(once);
        assert!(twice.approx_eq(&Affine::IDENTITY, EPS));
    }

    #[test]
    fn placement_outside_grid_is_none() {
        let t = template();
        assert!(Placement::build(&t, 6, t.label_size(false), false, false).is_none());
    }

    #[test]
    fn placement_is_deterministic() {
        let t = template();
        let a = Placement::build(&t, 4, t.label_size(true), true, true).unwrap();
        let b = Placement::build(&t, 4, t.label_size(true), true, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.matrix(), b.matrix());
    }
}

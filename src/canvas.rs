use crate::assets::RasterImage;
use crate::transform::Affine;
use crate::types::{Color, Pt, Size};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    Translate(Pt, Pt),
    Scale(f32, f32),
    Rotate(f32),
    ConcatMatrix {
        a: f32,
        b: f32,
        c: f32,
        d: f32,
        e: Pt,
        f: Pt,
    },
    // Non-rendered marker; backends ignore it.
    Meta {
        key: String,
        value: String,
    },
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    // Fill and stroke alpha (ca/CA), clamped to 0..1.
    SetOpacity {
        fill: f32,
        stroke: f32,
    },
    SetFontName(String),
    SetFontSize(Pt),
    // Intersects the clip with the current path and consumes it (W n).
    ClipPath {
        evenodd: bool,
    },
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    ClosePath,
    Fill,
    Stroke,
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    // Paints the image into the unit square of the current user space, top
    // row at y = 1. `alpha` selects the soft-masked path.
    DrawImage {
        image: Arc<RasterImage>,
        alpha: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub name: String,
    pub commands: Vec<Command>,
}

impl Page {
    fn new(name: String) -> Self {
        Self {
            name,
            commands: Vec::new(),
        }
    }

    pub fn meta_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.commands.iter().filter_map(move |cmd| match cmd {
            Command::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    fill_opacity: f32,
    stroke_opacity: f32,
    font_size: Pt,
    font_name: String,
    ctm: Affine,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            font_size: Pt::from_f32(12.0),
            font_name: "Helvetica".to_string(),
            ctm: Affine::IDENTITY,
        }
    }
}

/// Recording drawing context. Coordinates are PDF user space: origin at the
/// bottom-left of the page, Y up, unit = point.
pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    page_open: bool,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::new(String::new()),
            page_open: false,
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Opens a new page. An already open page is closed first.
    pub fn begin_page(&mut self, name: impl Into<String>) {
        if self.page_open {
            self.show_page();
        }
        self.current = Page::new(name.into());
        self.page_open = true;
    }

    pub fn is_page_open(&self) -> bool {
        self.page_open
    }

    /// Closes the current page; graphics state resets for the next one.
    pub fn show_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new(String::new()));
        self.pages.push(current);
        self.page_open = false;
        self.state_stack.clear();
        self.current_state = GraphicsState::default();
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    /// Saves the graphics state and returns a guard that restores it when
    /// dropped, on every exit path.
    pub fn save(&mut self) -> StateGuard<'_> {
        self.save_state();
        let depth = self.state_stack.len();
        StateGuard {
            canvas: self,
            depth,
        }
    }

    pub fn state_depth(&self) -> usize {
        self.state_stack.len()
    }

    /// Current transformation matrix from user space to page space.
    pub fn ctm(&self) -> Affine {
        self.current_state.ctm
    }

    fn concat_ctm(&mut self, m: Affine) {
        self.current_state.ctm = m.then(self.current_state.ctm);
    }

    pub fn translate(&mut self, x: Pt, y: Pt) {
        self.concat_ctm(Affine::translate(x.to_f64(), y.to_f64()));
        self.current.commands.push(Command::Translate(x, y));
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.concat_ctm(Affine::scale(x as f64, y as f64));
        self.current.commands.push(Command::Scale(x, y));
    }

    pub fn rotate(&mut self, angle_radians: f32) {
        self.concat_ctm(Affine::rotate(angle_radians as f64));
        self.current.commands.push(Command::Rotate(angle_radians));
    }

    pub fn concat_matrix(&mut self, a: f32, b: f32, c: f32, d: f32, e: Pt, f: Pt) {
        self.concat_ctm(Affine::new(
            a as f64,
            b as f64,
            c as f64,
            d as f64,
            e.to_f64(),
            f.to_f64(),
        ));
        self.current
            .commands
            .push(Command::ConcatMatrix { a, b, c, d, e, f });
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.current.commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_opacity(&mut self, fill: f32, stroke: f32) {
        let fill = fill.clamp(0.0, 1.0);
        let stroke = stroke.clamp(0.0, 1.0);
        if self.current_state.fill_opacity == fill && self.current_state.stroke_opacity == stroke {
            return;
        }
        self.current_state.fill_opacity = fill;
        self.current_state.stroke_opacity = stroke;
        self.current
            .commands
            .push(Command::SetOpacity { fill, stroke });
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.current
            .commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn clip_path(&mut self, evenodd: bool) {
        self.current.commands.push(Command::ClipPath { evenodd });
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn close_path(&mut self) {
        self.current.commands.push(Command::ClosePath);
    }

    pub fn fill(&mut self) {
        self.current.commands.push(Command::Fill);
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    /// Paints the colour channels of `image` into the unit square.
    pub fn draw_rgb_image(&mut self, image: Arc<RasterImage>) {
        self.current
            .commands
            .push(Command::DrawImage { image, alpha: false });
    }

    /// Paints `image` into the unit square, honouring its alpha channel.
    pub fn draw_rgba_image(&mut self, image: Arc<RasterImage>) {
        self.current
            .commands
            .push(Command::DrawImage { image, alpha: true });
    }

    pub fn current_commands(&self) -> &[Command] {
        &self.current.commands
    }

    /// Closes an open page and returns the recorded document. A canvas that
    /// never opened a page yields a document with no pages.
    pub fn finish(mut self) -> Document {
        if self.page_open {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}

/// Scoped save/restore: derefs to the canvas and restores the state saved by
/// [`Canvas::save`] when dropped, unwinding any saves left open inside it.
pub struct StateGuard<'a> {
    canvas: &'a mut Canvas,
    depth: usize,
}

impl Deref for StateGuard<'_> {
    type Target = Canvas;

    fn deref(&self) -> &Canvas {
        self.canvas
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut Canvas {
        self.canvas
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        while self.canvas.state_stack.len() >= self.depth && self.depth > 0 {
            self.canvas.restore_state();
        }
    }
}

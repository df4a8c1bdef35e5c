use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder, ImageError};
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform,
};

use crate::error::GameError;

/// Pixels covered by one terminal cell. A cell renders as two square
/// half-blocks, so the height is twice the width.
pub const CELL_WIDTH_PX: u32 = 6;
pub const CELL_HEIGHT_PX: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 200, 0);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const BLUE: Rgb = Rgb(0, 0, 255);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Centre of a terminal cell in surface pixels.
    pub fn from_cell(col: u16, row: u16) -> Self {
        Self {
            x: (col as u32 * CELL_WIDTH_PX + CELL_WIDTH_PX / 2) as f32,
            y: (row as u32 * CELL_HEIGHT_PX + CELL_HEIGHT_PX / 2) as f32,
        }
    }
}

/// Rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Pixel region covered by a block of terminal rows spanning all columns.
    pub fn from_rows(first_row: u16, rows: u16, cols: u16) -> Self {
        Self {
            x: 0,
            y: first_row as u32 * CELL_HEIGHT_PX,
            width: cols as u32 * CELL_WIDTH_PX,
            height: rows as u32 * CELL_HEIGHT_PX,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x as f32
            && p.y >= self.y as f32
            && p.x < (self.x + self.width) as f32
            && p.y < (self.y + self.height) as f32
    }
}

/// Immutable copy of part of the surface, safe to hand to another thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    /// Packed RGB rows.
    pub pixels: Vec<u8>,
}

impl Snapshot {
    pub fn to_png(&self) -> Result<Vec<u8>, ImageError> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(
            &self.pixels,
            self.width,
            self.height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }

    pub fn is_blank(&self, background: Rgb) -> bool {
        self.pixels
            .chunks_exact(3)
            .all(|px| px == [background.0, background.1, background.2])
    }
}

/// Offscreen raster the player draws on.
pub struct DrawingSurface {
    pixmap: Pixmap,
    background: Rgb,
}

impl std::fmt::Debug for DrawingSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawingSurface")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl DrawingSurface {
    pub fn new(width: u32, height: u32) -> Result<Self, GameError> {
        let mut pixmap = Pixmap::new(width.max(1), height.max(1))
            .ok_or(GameError::CanvasSize(width, height))?;
        pixmap.fill(to_color(Rgb::WHITE));

        Ok(Self {
            pixmap,
            background: Rgb::WHITE,
        })
    }

    /// Surface large enough for a terminal of `cols` x `rows` cells.
    pub fn for_terminal(cols: u16, rows: u16) -> Result<Self, GameError> {
        Self::new(cols as u32 * CELL_WIDTH_PX, rows as u32 * CELL_HEIGHT_PX)
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn background(&self) -> Rgb {
        self.background
    }

    pub fn clear(&mut self) {
        self.pixmap.fill(to_color(self.background));
    }

    pub fn draw_stroke(&mut self, from: Point, to: Point, color: Rgb, width: f32) {
        if (from.x - to.x).abs() < f32::EPSILON && (from.y - to.y).abs() < f32::EPSILON {
            self.draw_dot(from, color, width);
            return;
        }

        let mut pb = PathBuilder::new();
        pb.move_to(from.x, from.y);
        pb.line_to(to.x, to.y);

        let stroke = Stroke {
            width: width.max(1.0),
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Default::default()
        };

        if let Some(path) = pb.finish() {
            self.pixmap
                .stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
        }
    }

    pub fn draw_dot(&mut self, at: Point, color: Rgb, width: f32) {
        let radius = (width / 2.0).max(0.5);
        if let Some(path) = PathBuilder::from_circle(at.x, at.y, radius) {
            self.pixmap.fill_path(
                &path,
                &paint(color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        self.pixmap.pixel(x, y).map(|p| {
            let c = p.demultiply();
            Rgb(c.red(), c.green(), c.blue())
        })
    }

    /// Colour shown for a block of pixels: any ink wins over the background.
    pub fn block_color(&self, x: u32, y: u32, width: u32, height: u32) -> Rgb {
        for py in y..(y + height).min(self.height()) {
            for px in x..(x + width).min(self.width()) {
                if let Some(c) = self.pixel(px, py) {
                    if c != self.background {
                        return c;
                    }
                }
            }
        }
        self.background
    }

    /// Copy `region` (clipped to the surface) into an immutable snapshot.
    pub fn snapshot(&self, region: Region) -> Snapshot {
        let x0 = region.x.min(self.width());
        let y0 = region.y.min(self.height());
        let x1 = region.x.saturating_add(region.width).min(self.width());
        let y1 = region.y.saturating_add(region.height).min(self.height());
        let (width, height) = (x1 - x0, y1 - y0);

        let stride = self.width() as usize;
        let source = self.pixmap.pixels();
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in y0..y1 {
            let row = &source[y as usize * stride + x0 as usize..y as usize * stride + x1 as usize];
            for p in row {
                let c = p.demultiply();
                pixels.extend_from_slice(&[c.red(), c.green(), c.blue()]);
            }
        }

        Snapshot {
            width,
            height,
            pixels,
        }
    }
}

fn to_color(c: Rgb) -> Color {
    Color::from_rgba8(c.0, c.1, c.2, 255)
}

fn paint(c: Rgb) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_color(c));
    paint.anti_alias = false;
    paint
}

/// Tracks the stroke in progress. `last` is the previous point of the
/// current stroke; `None` means the next point starts a fresh segment.
#[derive(Debug, Default, Clone)]
pub struct StrokeTracker {
    active: bool,
    last: Option<Point>,
}

impl StrokeTracker {
    pub fn begin(&mut self, at: Point) {
        self.active = true;
        self.last = Some(at);
    }

    /// Next point of the stroke; returns the segment start if there is one.
    pub fn extend(&mut self, to: Point) -> Option<Point> {
        if !self.active {
            return None;
        }
        self.last.replace(to)
    }

    /// Pointer left the drawable area: keep the stroke, drop the anchor.
    pub fn interrupt(&mut self) {
        self.last = None;
    }

    /// Returns whether a stroke was actually in progress.
    pub fn end(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        self.last = None;
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last(&self) -> Option<Point> {
        self.last
    }
}

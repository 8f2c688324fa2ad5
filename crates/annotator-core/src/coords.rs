//! Coordinate transformation between viewport, page-normalized and PDF space
//!
//! Three spaces are involved:
//! - *viewport*: pointer pixels relative to the page container, scaled by zoom
//! - *normalized*: the same pixels at zoom 100%, top-left origin (storage)
//! - *PDF user space*: bottom-left origin, 1/72 inch units (export only)

use serde::{Deserialize, Serialize};

/// PDF user space units per inch
pub const PDF_POINTS_PER_INCH: f64 = 72.0;

/// Rendering DPI assumed for a page shown at zoom 100%
pub const DEFAULT_CAPTURE_DPI: f64 = 96.0;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned rectangle with a top-left origin (viewport or normalized units)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_parts(origin: Point, extent: Extent) -> Self {
        Self::new(origin.x, origin.y, extent.width, extent.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn extent(&self) -> Extent {
        Extent {
            width: self.width,
            height: self.height,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// True when the two rectangles share a region of positive area
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    /// Smallest rectangle containing every point, `None` for an empty slice
    pub fn bounding(points: &[Point]) -> Option<Rect> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

/// Rectangle in PDF user space: `(x, y)` is the bottom-left corner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// Viewport pixels to page-normalized units (100% zoom = 1.0)
pub fn to_normalized(viewport: Point, zoom_factor: f64) -> Point {
    Point::new(viewport.x / zoom_factor, viewport.y / zoom_factor)
}

/// Page-normalized units to viewport pixels at the given zoom
pub fn to_viewport(normalized: Point, zoom_factor: f64) -> Point {
    Point::new(normalized.x * zoom_factor, normalized.y * zoom_factor)
}

/// Page-normalized units to PDF user space (flips the vertical axis)
pub fn to_pdf_space(normalized: Point, page_height: f64, device_scale: f64) -> Point {
    Point::new(
        normalized.x * device_scale,
        page_height - (normalized.y * device_scale),
    )
}

/// Scale from normalized pixels rendered at `capture_dpi` to PDF points
pub fn device_scale(capture_dpi: f64) -> f64 {
    PDF_POINTS_PER_INCH / capture_dpi
}

/// Replace a zoom factor that would make the transforms meaningless with 1.0
pub fn sanitize_zoom(zoom_factor: f64) -> f64 {
    if zoom_factor.is_finite() && zoom_factor > 0.0 {
        zoom_factor
    } else {
        1.0
    }
}

pub fn rect_to_normalized(viewport: Rect, zoom_factor: f64) -> Rect {
    Rect::new(
        viewport.x / zoom_factor,
        viewport.y / zoom_factor,
        viewport.width / zoom_factor,
        viewport.height / zoom_factor,
    )
}

pub fn rect_to_viewport(normalized: Rect, zoom_factor: f64) -> Rect {
    Rect::new(
        normalized.x * zoom_factor,
        normalized.y * zoom_factor,
        normalized.width * zoom_factor,
        normalized.height * zoom_factor,
    )
}

/// Project a normalized rectangle; the top edge in normalized space becomes
/// the top edge in PDF space, so the PDF origin is the projected bottom-left.
pub fn rect_to_pdf_space(normalized: Rect, page_height: f64, device_scale: f64) -> PdfRect {
    let top_left = to_pdf_space(normalized.origin(), page_height, device_scale);
    let height = normalized.height * device_scale;
    PdfRect {
        x: top_left.x,
        y: top_left.y - height,
        width: normalized.width * device_scale,
        height,
    }
}

//! Content-stream operators for each annotation kind

use super::page::{PageBox, ResourceNames};
use super::text::{encode_win_ansi, text_width, wrap_lines};
use crate::annotation::Annotation;
use crate::config::ExportConfig;
use crate::coords::{self, PdfRect, Point};
use lopdf::content::Operation;
use lopdf::{Object, StringFormat};

const FONT_PREFIX: &str = "AnF";
const GSTATE_PREFIX: &str = "AnGS";
const IMAGE_PREFIX: &str = "AnIm";

/// Bezier control distance for approximating a quarter circle
const KAPPA: f64 = 0.552_284_8;

/// Parse `#rrggbb` or `#rgb` into 0..1 components; anything else is black
pub fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim().trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        _ => hex.to_string(),
    };
    if expanded.len() != 6 || !expanded.is_ascii() {
        return (0.0, 0.0, 0.0);
    }
    let channel = |i: usize| {
        u8::from_str_radix(&expanded[i..i + 2], 16)
            .map(|v| f32::from(v) / 255.0)
            .ok()
    };
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => (r, g, b),
        _ => (0.0, 0.0, 0.0),
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

/// Collects the operators and resources one page needs
pub struct PageCanvas<'a> {
    config: &'a ExportConfig,
    page: PageBox,
    scale: f64,
    ops: Vec<Operation>,
    names: ResourceNames,
    opacities: Vec<(String, f64)>,
    font: Option<String>,
}

impl<'a> PageCanvas<'a> {
    pub fn new(config: &'a ExportConfig, page: PageBox) -> Self {
        Self {
            config,
            page,
            scale: config.device_scale(),
            ops: Vec::new(),
            names: ResourceNames::default(),
            opacities: Vec::new(),
            font: None,
        }
    }

    /// Avoid the names already bound in the page's resources
    pub fn with_names(mut self, names: ResourceNames) -> Self {
        self.names = names;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Resource name of the Helvetica font, once any text was drawn
    pub fn font_name(&self) -> Option<&str> {
        self.font.as_deref()
    }

    /// ExtGState resource names paired with their fill/stroke alpha
    pub fn ext_gstates(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.opacities.iter().cloned()
    }

    /// Reserve a page-unique name for an image XObject
    pub fn image_name(&mut self) -> String {
        self.names.fresh(b"XObject", IMAGE_PREFIX)
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }

    fn project(&self, p: Point) -> (f64, f64) {
        let pdf = coords::to_pdf_space(p, self.page.height, self.scale);
        (pdf.x + self.page.x, pdf.y + self.page.y)
    }

    fn project_rect(&self, annotation: &Annotation) -> Option<PdfRect> {
        let rect = annotation.rect()?;
        let mut projected = coords::rect_to_pdf_space(rect, self.page.height, self.scale);
        projected.x += self.page.x;
        projected.y += self.page.y;
        Some(projected)
    }

    fn gstate_for(&mut self, alpha: f64) -> String {
        if let Some((name, _)) = self.opacities.iter().find(|(_, a)| (a - alpha).abs() < 1e-6) {
            return name.clone();
        }
        let name = self.names.fresh(b"ExtGState", GSTATE_PREFIX);
        self.opacities.push((name.clone(), alpha));
        name
    }

    fn font_operand(&mut self) -> Object {
        if let Some(name) = &self.font {
            return Object::Name(name.clone().into_bytes());
        }
        let name = self.names.fresh(b"Font", FONT_PREFIX);
        self.font = Some(name.clone());
        Object::Name(name.into_bytes())
    }

    fn set_fill(&mut self, color: &str) {
        let (r, g, b) = parse_hex_color(color);
        self.ops.push(op("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]));
    }

    fn set_stroke(&mut self, color: &str) {
        let (r, g, b) = parse_hex_color(color);
        self.ops.push(op("RG", vec![Object::Real(r), Object::Real(g), Object::Real(b)]));
    }

    pub fn draw_highlight(&mut self, annotation: &Annotation) {
        let Some(rect) = self.project_rect(annotation) else {
            return;
        };
        let gs = self.gstate_for(self.config.highlight_opacity);
        self.ops.push(op("q", vec![]));
        self.ops.push(op("gs", vec![Object::Name(gs.into_bytes())]));
        self.set_fill(&annotation.style().color);
        self.ops.push(op(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        ));
        self.ops.push(op("f", vec![]));
        self.ops.push(op("Q", vec![]));

        if self.config.searchable_highlights {
            self.invisible_text(annotation.text(), &rect);
        }
    }

    /// Source text in render mode 3, stretched over the rect
    fn invisible_text(&mut self, text: &str, rect: &PdfRect) {
        let text = text.trim();
        if text.is_empty() || rect.height <= 0.0 {
            return;
        }
        let font_size = rect.height * 0.8;
        let natural = text_width(text, font_size);
        if natural <= 0.0 {
            return;
        }
        let font = self.font_operand();
        let baseline = rect.y + rect.height * 0.2;
        self.ops.extend([
            op("BT", vec![]),
            op("Tr", vec![Object::Integer(3)]),
            op("Tf", vec![font, real(font_size)]),
            op("Tz", vec![real(100.0 * rect.width / natural)]),
            op("Td", vec![real(rect.x), real(baseline)]),
            op(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            op("ET", vec![]),
        ]);
    }

    pub fn draw_underline(&mut self, annotation: &Annotation) {
        let Some(rect) = self.project_rect(annotation) else {
            return;
        };
        self.ops.push(op("q", vec![]));
        self.set_stroke(&annotation.style().color);
        self.ops.extend([
            op("w", vec![real(self.config.underline_thickness)]),
            op("m", vec![real(rect.x), real(rect.y)]),
            op("l", vec![real(rect.right()), real(rect.y)]),
            op("S", vec![]),
            op("Q", vec![]),
        ]);
    }

    pub fn draw_path(&mut self, annotation: &Annotation) {
        let Some(points) = annotation.path().filter(|p| p.len() > 1) else {
            return;
        };
        let stroke = annotation.style().stroke_width;
        let stroke = if stroke.is_finite() && stroke > 0.0 {
            stroke
        } else {
            self.config.default_stroke_width
        };

        self.ops.push(op("q", vec![]));
        self.set_stroke(&annotation.style().color);
        self.ops.extend([
            op("w", vec![real(stroke * self.scale)]),
            op("J", vec![Object::Integer(1)]),
            op("j", vec![Object::Integer(1)]),
        ]);
        for (i, point) in points.iter().enumerate() {
            let (x, y) = self.project(*point);
            let operator = if i == 0 { "m" } else { "l" };
            self.ops.push(op(operator, vec![real(x), real(y)]));
        }
        self.ops.push(op("S", vec![]));
        self.ops.push(op("Q", vec![]));
    }

    pub fn draw_comment(&mut self, annotation: &Annotation) {
        let (cx, cy) = self.project(annotation.anchor());
        let radius = self.config.comment_marker_radius;

        self.ops.push(op("q", vec![]));
        self.set_fill(&annotation.style().color);
        self.circle(cx, cy, radius);
        self.ops.push(op("f", vec![]));
        self.ops.push(op("Q", vec![]));

        if annotation.text().trim().is_empty() {
            return;
        }

        let cfg = self.config;
        let inner = cfg.comment_box_width - 2.0 * cfg.comment_padding;
        let lines = wrap_lines(annotation.text(), cfg.comment_font_size, inner);
        let box_height = lines.len() as f64 * cfg.comment_line_height + 2.0 * cfg.comment_padding;
        let page_right = self.page.x + self.page.width;
        let box_x = (cx + radius)
            .min(page_right - cfg.comment_box_width)
            .max(self.page.x);
        let box_top = cy - radius;

        let gs = self.gstate_for(cfg.comment_box_opacity);
        self.ops.extend([
            op("q", vec![]),
            op("gs", vec![Object::Name(gs.into_bytes())]),
            op("rg", vec![real(1.0), real(1.0), real(0.8)]),
            op("G", vec![real(0.5)]),
            op("w", vec![real(0.5)]),
            op(
                "re",
                vec![
                    real(box_x),
                    real(box_top - box_height),
                    real(cfg.comment_box_width),
                    real(box_height),
                ],
            ),
            op("B", vec![]),
            op("Q", vec![]),
        ]);

        let font = self.font_operand();
        let first_baseline = box_top - cfg.comment_padding - cfg.comment_font_size;
        self.ops.extend([
            op("BT", vec![]),
            op("g", vec![Object::Integer(0)]),
            op("Tf", vec![font, real(cfg.comment_font_size)]),
            op("TL", vec![real(cfg.comment_line_height)]),
            op("Td", vec![real(box_x + cfg.comment_padding), real(first_baseline)]),
        ]);
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.ops.push(op("T*", vec![]));
            }
            if !line.is_empty() {
                self.ops.push(op(
                    "Tj",
                    vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
                ));
            }
        }
        self.ops.push(op("ET", vec![]));
    }

    /// Draw a registered image XObject into the annotation's rect
    pub fn draw_image(&mut self, annotation: &Annotation, xobject_name: &str) {
        let Some(rect) = self.project_rect(annotation) else {
            return;
        };
        self.ops.extend([
            op("q", vec![]),
            op(
                "cm",
                vec![
                    real(rect.width),
                    Object::Integer(0),
                    Object::Integer(0),
                    real(rect.height),
                    real(rect.x),
                    real(rect.y),
                ],
            ),
            op("Do", vec![Object::Name(xobject_name.as_bytes().to_vec())]),
            op("Q", vec![]),
        ]);
    }

    fn circle(&mut self, cx: f64, cy: f64, r: f64) {
        let k = r * KAPPA;
        self.ops.push(op("m", vec![real(cx + r), real(cy)]));
        let quarters = [
            [cx + r, cy + k, cx + k, cy + r, cx, cy + r],
            [cx - k, cy + r, cx - r, cy + k, cx - r, cy],
            [cx - r, cy - k, cx - k, cy - r, cx, cy - r],
            [cx + k, cy - r, cx + r, cy - k, cx + r, cy],
        ];
        for q in quarters {
            self.ops.push(op("c", q.iter().map(|v| real(*v)).collect()));
        }
        self.ops.push(op("h", vec![]));
    }
}

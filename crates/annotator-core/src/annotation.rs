//! Annotation records and the per-kind collections that hold them
//!
//! Every geometric field of an [`Annotation`] is stored in page-normalized
//! units. Viewport input enters through [`NewAnnotation`] together with the
//! zoom factor it was captured at, and is divided out on construction.

use crate::coords::{self, Extent, Point, Rect};
use crate::error::{AnnotatorError, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for AnnotationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Highlight,
    Underline,
    Comment,
    Signature,
    FreehandDraw,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 5] = [
        AnnotationKind::Highlight,
        AnnotationKind::Underline,
        AnnotationKind::Comment,
        AnnotationKind::Signature,
        AnnotationKind::FreehandDraw,
    ];

    /// Color used when the host did not pick one
    pub fn default_color(self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "#FFEB3B",
            AnnotationKind::Underline => "#4285F4",
            AnnotationKind::Comment => "#FFC107",
            AnnotationKind::Signature => "#000000",
            AnnotationKind::FreehandDraw => "#FF0000",
        }
    }

    /// Kinds whose geometry is a text-selection rectangle
    pub fn is_text_markup(self) -> bool {
        matches!(self, AnnotationKind::Highlight | AnnotationKind::Underline)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Style {
    pub color: String,
    /// Stroke width in normalized units; only used by path kinds
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
}

fn default_stroke_width() -> f64 {
    2.0
}

impl Style {
    pub fn new(color: impl Into<String>, stroke_width: f64) -> Self {
        Self {
            color: color.into(),
            stroke_width,
        }
    }

    pub fn for_kind(kind: AnnotationKind) -> Self {
        Self::new(kind.default_color(), default_stroke_width())
    }
}

/// Raster payload carried as a self-describing `data:` URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MediaPayload(String);

/// A media payload split into its MIME type and raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMedia {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl MediaPayload {
    pub fn from_data_url(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        Self(format!("data:image/png;base64,{}", engine.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split `data:<mime>;base64,<payload>` into MIME type and bytes
    pub fn decode(&self) -> Result<DecodedMedia> {
        let rest = self
            .0
            .strip_prefix("data:")
            .ok_or_else(|| AnnotatorError::MalformedMedia("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AnnotatorError::MalformedMedia("missing ',' separator".to_string()))?;
        let (mime, encoding) = header.split_once(';').unwrap_or((header, ""));
        if encoding != "base64" {
            return Err(AnnotatorError::MalformedMedia(format!(
                "unsupported encoding '{}'",
                encoding
            )));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| AnnotatorError::MalformedMedia(e.to_string()))?;
        Ok(DecodedMedia {
            mime: mime.to_string(),
            bytes,
        })
    }
}

/// Identity of the loaded document; annotations are partitioned by it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileKey(String);

impl FileKey {
    /// Local file: name plus modification time in milliseconds
    pub fn local(name: &str, last_modified_ms: i64) -> Self {
        Self(format!("{}-{}", name, last_modified_ms))
    }

    pub fn url(url: &str) -> Self {
        Self(url.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Geometry as captured from the viewport, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Point { at: Point },
    Rect { rect: Rect },
    Path { points: Vec<Point> },
    /// A finished raster image placed into a rectangle (signature pad output)
    Image { rect: Rect, media: MediaPayload },
}

/// Everything needed to create an annotation, in viewport units
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotation {
    pub kind: AnnotationKind,
    pub page: u32,
    pub geometry: Geometry,
    /// Zoom in effect when the geometry was captured (1.0 = 100%)
    pub zoom_factor: f64,
    pub style: Style,
    pub text: String,
}

impl NewAnnotation {
    pub fn new(kind: AnnotationKind, page: u32, geometry: Geometry, zoom_factor: f64) -> Self {
        Self {
            kind,
            page,
            geometry,
            zoom_factor,
            style: Style::for_kind(kind),
            text: String::new(),
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// Fields an existing annotation may change; identity, page and geometry
/// are fixed for the annotation's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPatch {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub stroke_width: Option<f64>,
    /// Replacement image; ignored for annotations drawn as a path
    #[serde(default)]
    pub media: Option<MediaPayload>,
}

impl AnnotationPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    id: AnnotationId,
    kind: AnnotationKind,
    page: u32,
    seq: u64,
    anchor: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extent: Option<Extent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<Vec<Point>>,
    style: Style,
    #[serde(default)]
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media: Option<MediaPayload>,
    created_at: DateTime<Utc>,
    edited_at: DateTime<Utc>,
    file: FileKey,
}

impl Annotation {
    /// Normalize viewport geometry and stamp identity
    pub(crate) fn create(new: NewAnnotation, file: FileKey, seq: u64, now: DateTime<Utc>) -> Self {
        let zoom = coords::sanitize_zoom(new.zoom_factor);
        let (anchor, extent, path, media) = match new.geometry {
            Geometry::Point { at } => (coords::to_normalized(at, zoom), None, None, None),
            Geometry::Rect { rect } => {
                let r = coords::rect_to_normalized(rect, zoom);
                (r.origin(), Some(r.extent()), None, None)
            }
            Geometry::Path { points } => {
                let points: Vec<Point> = points
                    .into_iter()
                    .map(|p| coords::to_normalized(p, zoom))
                    .collect();
                let anchor = Rect::bounding(&points)
                    .map(|b| b.origin())
                    .unwrap_or_default();
                (anchor, None, Some(points), None)
            }
            Geometry::Image { rect, media } => {
                let r = coords::rect_to_normalized(rect, zoom);
                (r.origin(), Some(r.extent()), None, Some(media))
            }
        };

        Self {
            id: AnnotationId::new(),
            kind: new.kind,
            page: new.page,
            seq,
            anchor,
            extent,
            path,
            style: new.style,
            text: new.text,
            media,
            created_at: now,
            edited_at: now,
            file,
        }
    }

    pub(crate) fn apply(&mut self, patch: AnnotationPatch, now: DateTime<Utc>) {
        if let Some(text) = patch.text {
            self.text = text;
        }
        if let Some(color) = patch.color {
            self.style.color = color;
        }
        if let Some(width) = patch.stroke_width {
            self.style.stroke_width = width;
        }
        // Only an image signature can have its picture replaced
        if let Some(media) = patch.media {
            if self.kind == AnnotationKind::Signature && self.media.is_some() {
                self.media = Some(media);
            }
        }
        self.edited_at = now;
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn kind(&self) -> AnnotationKind {
        self.kind
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Store insertion order; later annotations render on top
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    pub fn path(&self) -> Option<&[Point]> {
        self.path.as_deref()
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn media(&self) -> Option<&MediaPayload> {
        self.media.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn edited_at(&self) -> DateTime<Utc> {
        self.edited_at
    }

    pub fn file(&self) -> &FileKey {
        &self.file
    }

    /// Anchor plus extent, for box kinds
    pub fn rect(&self) -> Option<Rect> {
        self.extent.map(|e| Rect::from_parts(self.anchor, e))
    }

    /// Normalized region covered by the annotation
    pub fn bounds(&self) -> Rect {
        if let Some(rect) = self.rect() {
            return rect;
        }
        if let Some(bounds) = self.path.as_deref().and_then(Rect::bounding) {
            return bounds;
        }
        Rect::from_parts(self.anchor, Extent::default())
    }
}

/// An annotation projected to the viewport for rendering
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewportAnnotation {
    pub id: AnnotationId,
    pub kind: AnnotationKind,
    pub page: u32,
    pub anchor: Point,
    pub rect: Option<Rect>,
    pub path: Option<Vec<Point>>,
    pub color: String,
    pub stroke_width: f64,
    pub text: String,
    pub has_media: bool,
}

impl ViewportAnnotation {
    pub fn project(annotation: &Annotation, zoom_factor: f64) -> Self {
        let zoom = coords::sanitize_zoom(zoom_factor);
        Self {
            id: annotation.id,
            kind: annotation.kind,
            page: annotation.page,
            anchor: coords::to_viewport(annotation.anchor, zoom),
            rect: annotation.rect().map(|r| coords::rect_to_viewport(r, zoom)),
            path: annotation
                .path
                .as_ref()
                .map(|pts| pts.iter().map(|p| coords::to_viewport(*p, zoom)).collect()),
            color: annotation.style.color.clone(),
            stroke_width: annotation.style.stroke_width * zoom,
            text: annotation.text.clone(),
            has_media: annotation.media.is_some(),
        }
    }
}

/// Per-kind annotation lists; the persisted layout and the history snapshot body
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationSet {
    #[serde(default)]
    pub highlights: Vec<Annotation>,
    #[serde(default)]
    pub underlines: Vec<Annotation>,
    #[serde(default)]
    pub comments: Vec<Annotation>,
    #[serde(default)]
    pub signatures: Vec<Annotation>,
    #[serde(default)]
    pub drawings: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, kind: AnnotationKind) -> &[Annotation] {
        match kind {
            AnnotationKind::Highlight => &self.highlights,
            AnnotationKind::Underline => &self.underlines,
            AnnotationKind::Comment => &self.comments,
            AnnotationKind::Signature => &self.signatures,
            AnnotationKind::FreehandDraw => &self.drawings,
        }
    }

    pub(crate) fn list_mut(&mut self, kind: AnnotationKind) -> &mut Vec<Annotation> {
        match kind {
            AnnotationKind::Highlight => &mut self.highlights,
            AnnotationKind::Underline => &mut self.underlines,
            AnnotationKind::Comment => &mut self.comments,
            AnnotationKind::Signature => &mut self.signatures,
            AnnotationKind::FreehandDraw => &mut self.drawings,
        }
    }

    /// All annotations, grouped by kind (not insertion order)
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        AnnotationKind::ALL
            .into_iter()
            .flat_map(move |kind| self.list(kind).iter())
    }

    /// All annotations in insertion order
    pub fn ordered(&self) -> Vec<&Annotation> {
        let mut all: Vec<&Annotation> = self.iter().collect();
        all.sort_by_key(|a| a.seq);
        all
    }

    pub fn len(&self) -> usize {
        AnnotationKind::ALL
            .iter()
            .map(|kind| self.list(*kind).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, id: AnnotationId) -> Option<&Annotation> {
        self.iter().find(|a| a.id == id)
    }

    pub(crate) fn find_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        let Self {
            highlights,
            underlines,
            comments,
            signatures,
            drawings,
        } = self;
        highlights
            .iter_mut()
            .chain(underlines.iter_mut())
            .chain(comments.iter_mut())
            .chain(signatures.iter_mut())
            .chain(drawings.iter_mut())
            .find(|a| a.id == id)
    }

    pub(crate) fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        for kind in AnnotationKind::ALL {
            let list = self.list_mut(kind);
            if let Some(pos) = list.iter().position(|a| a.id == id) {
                return Some(list.remove(pos));
            }
        }
        None
    }

    pub(crate) fn max_seq(&self) -> Option<u64> {
        self.iter().map(|a| a.seq).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make(kind: AnnotationKind, geometry: Geometry, zoom: f64, seq: u64) -> Annotation {
        Annotation::create(
            NewAnnotation::new(kind, 1, geometry, zoom),
            FileKey::local("doc.pdf", 42),
            seq,
            Utc::now(),
        )
    }

    #[test]
    fn test_rect_geometry_is_normalized() {
        let a = make(
            AnnotationKind::Highlight,
            Geometry::Rect {
                rect: Rect::new(120.0, 80.0, 300.0, 30.0),
            },
            1.5,
            0,
        );
        assert_eq!(a.anchor().x, 80.0);
        assert!((a.anchor().y - 53.333).abs() < 0.001);
        let extent = a.extent().unwrap();
        assert_eq!(extent.width, 200.0);
        assert_eq!(extent.height, 20.0);
        assert!(a.path().is_none());
        assert!(a.media().is_none());
    }

    #[test]
    fn test_path_geometry_anchor_is_bounding_origin() {
        let a = make(
            AnnotationKind::FreehandDraw,
            Geometry::Path {
                points: vec![Point::new(40.0, 20.0), Point::new(20.0, 60.0)],
            },
            2.0,
            0,
        );
        assert_eq!(a.anchor(), Point::new(10.0, 10.0));
        assert_eq!(
            a.path().unwrap(),
            &[Point::new(20.0, 10.0), Point::new(10.0, 30.0)]
        );
        assert!(a.extent().is_none());
    }

    #[test]
    fn test_image_geometry_keeps_media_without_path() {
        let media = MediaPayload::from_png_bytes(&[1, 2, 3]);
        let a = make(
            AnnotationKind::Signature,
            Geometry::Image {
                rect: Rect::new(0.0, 0.0, 100.0, 50.0),
                media: media.clone(),
            },
            1.0,
            0,
        );
        assert_eq!(a.media(), Some(&media));
        assert!(a.path().is_none());
    }

    #[test]
    fn test_patch_keeps_identity() {
        let mut a = make(
            AnnotationKind::Comment,
            Geometry::Point {
                at: Point::new(5.0, 5.0),
            },
            1.0,
            3,
        );
        let (id, page, seq) = (a.id(), a.page(), a.seq());
        a.apply(AnnotationPatch::text("Hello"), Utc::now());
        assert_eq!(a.text(), "Hello");
        assert_eq!((a.id(), a.page(), a.seq()), (id, page, seq));
    }

    #[test]
    fn test_patch_media_never_joins_a_path() {
        let mut drawn = make(
            AnnotationKind::Signature,
            Geometry::Path {
                points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            },
            1.0,
            0,
        );
        let patch = AnnotationPatch {
            media: Some(MediaPayload::from_png_bytes(&[1])),
            ..AnnotationPatch::default()
        };
        drawn.apply(patch.clone(), Utc::now());
        assert!(drawn.media().is_none());

        let mut highlight = make(
            AnnotationKind::Highlight,
            Geometry::Rect {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            },
            1.0,
            1,
        );
        highlight.apply(patch.clone(), Utc::now());
        assert!(highlight.media().is_none());

        let mut placed = make(
            AnnotationKind::Signature,
            Geometry::Image {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                media: MediaPayload::from_png_bytes(&[0]),
            },
            1.0,
            2,
        );
        placed.apply(patch, Utc::now());
        assert_eq!(placed.media(), Some(&MediaPayload::from_png_bytes(&[1])));
    }

    #[test]
    fn test_viewport_annotation_uses_camel_case() {
        let a = make(
            AnnotationKind::Signature,
            Geometry::Image {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                media: MediaPayload::from_png_bytes(&[0]),
            },
            1.0,
            0,
        );
        let value = serde_json::to_value(ViewportAnnotation::project(&a, 1.0)).unwrap();
        assert_eq!(value["hasMedia"], serde_json::json!(true));
        assert!(value.get("strokeWidth").is_some());
        assert!(value.get("stroke_width").is_none());
    }

    #[test]
    fn test_media_decode() {
        let media = MediaPayload::from_png_bytes(b"abc");
        let decoded = media.decode().unwrap();
        assert_eq!(decoded.mime, "image/png");
        assert_eq!(decoded.bytes, b"abc");
    }

    #[test]
    fn test_media_decode_rejects_garbage() {
        assert!(MediaPayload::from_data_url("not a url").decode().is_err());
        assert!(MediaPayload::from_data_url("data:image/png,raw").decode().is_err());
        assert!(MediaPayload::from_data_url("data:image/png;base64,@@@")
            .decode()
            .is_err());
    }

    #[test]
    fn test_file_key_local() {
        assert_eq!(FileKey::local("a.pdf", 1700).as_str(), "a.pdf-1700");
        assert_eq!(
            FileKey::url("https://x.test/a.pdf").as_str(),
            "https://x.test/a.pdf"
        );
    }

    #[test]
    fn test_set_ordered_uses_seq() {
        let mut set = AnnotationSet::new();
        let comment = make(
            AnnotationKind::Comment,
            Geometry::Point {
                at: Point::new(0.0, 0.0),
            },
            1.0,
            0,
        );
        let highlight = make(
            AnnotationKind::Highlight,
            Geometry::Rect {
                rect: Rect::new(0.0, 0.0, 1.0, 1.0),
            },
            1.0,
            1,
        );
        set.list_mut(AnnotationKind::Highlight).push(highlight.clone());
        set.list_mut(AnnotationKind::Comment).push(comment.clone());

        let ordered: Vec<AnnotationId> = set.ordered().iter().map(|a| a.id()).collect();
        assert_eq!(ordered, vec![comment.id(), highlight.id()]);
        assert_eq!(set.max_seq(), Some(1));
        assert!(set.remove(comment.id()).is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_set_json_layout_is_keyed_by_kind() {
        let set = AnnotationSet::new();
        let json = serde_json::to_value(&set).unwrap();
        for key in ["highlights", "underlines", "comments", "signatures", "drawings"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}

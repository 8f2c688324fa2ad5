//! Per-tool gesture handling
//!
//! The machine owns only gesture-local state (an in-progress stroke). Tool,
//! zoom, color and page come from the [`ToolConfig`] passed with each event;
//! the values in effect at `PointerDown` are captured for the whole stroke.

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, Geometry, MediaPayload,
    NewAnnotation, Style,
};
use crate::config::ToolConfig;
use crate::coords::{self, Point, Rect};
use crate::store::AnnotationStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Highlight,
    Underline,
    Comment,
    Signature,
    FreehandDraw,
}

impl Tool {
    /// Kind of annotation this tool produces
    pub fn annotation_kind(self) -> Option<AnnotationKind> {
        match self {
            Tool::Select => None,
            Tool::Highlight => Some(AnnotationKind::Highlight),
            Tool::Underline => Some(AnnotationKind::Underline),
            Tool::Comment => Some(AnnotationKind::Comment),
            Tool::Signature => Some(AnnotationKind::Signature),
            Tool::FreehandDraw => Some(AnnotationKind::FreehandDraw),
        }
    }

    fn draws_paths(self) -> bool {
        matches!(self, Tool::Signature | Tool::FreehandDraw)
    }
}

/// A committed text selection as reported by the host's text layer.
/// One rect per rendered line, in viewport pixels relative to the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSelection {
    pub text: String,
    pub rects: Vec<Rect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    PointerLeave,
    SelectionCommitted(TextSelection),
    CommentEdited { id: AnnotationId, text: String },
    CommentClosed { save: bool },
    SignaturePlaced { rect: Rect, media: MediaPayload },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InteractionOutcome {
    Created(Vec<Annotation>),
    Updated(AnnotationId),
    CommentOpened(Annotation),
    CommentClosed(Option<AnnotationId>),
    /// Some selection rects matched existing annotations and were skipped
    DuplicateSuppressed {
        created: Vec<Annotation>,
        skipped: usize,
    },
    GestureStarted,
    GestureExtended,
    Discarded,
    Ignored,
}

/// Stroke settings frozen at `PointerDown`
#[derive(Debug, Clone)]
struct Stroke {
    kind: AnnotationKind,
    page: u32,
    zoom: f64,
    style: Style,
    points: Vec<Point>,
}

#[derive(Debug, Default)]
pub struct InteractionMachine {
    tool: Tool,
    stroke: Option<Stroke>,
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn is_drawing(&self) -> bool {
        self.stroke.is_some()
    }

    /// Finalize whatever the current tool has in flight, then activate `tool`
    pub fn switch_tool(&mut self, store: &mut AnnotationStore, tool: Tool) -> InteractionOutcome {
        if tool == self.tool {
            return InteractionOutcome::Ignored;
        }
        tracing::debug!("Switching tool {:?} -> {:?}", self.tool, tool);
        self.tool = tool;
        let finished = self.finish_stroke(store);
        match store.clear_active() {
            Some(id) => InteractionOutcome::CommentClosed(Some(id)),
            None if finished == InteractionOutcome::Ignored => InteractionOutcome::Ignored,
            None => finished,
        }
    }

    pub fn handle(
        &mut self,
        store: &mut AnnotationStore,
        config: &ToolConfig,
        event: InteractionEvent,
    ) -> InteractionOutcome {
        let switched = self.switch_tool(store, config.active_tool);

        let outcome = match event {
            InteractionEvent::PointerDown(at) => self.pointer_down(store, config, at),
            InteractionEvent::PointerMove(at) => match self.stroke.as_mut() {
                Some(stroke) => {
                    stroke.points.push(at);
                    InteractionOutcome::GestureExtended
                }
                None => InteractionOutcome::Ignored,
            },
            InteractionEvent::PointerUp(at) => {
                if let Some(stroke) = self.stroke.as_mut() {
                    if stroke.points.last() != Some(&at) {
                        stroke.points.push(at);
                    }
                }
                self.finish_stroke(store)
            }
            InteractionEvent::PointerLeave => self.finish_stroke(store),
            InteractionEvent::SelectionCommitted(selection) => {
                self.commit_selection(store, config, selection)
            }
            InteractionEvent::CommentEdited { id, text } => {
                let is_comment = store
                    .get(id)
                    .is_some_and(|a| a.kind() == AnnotationKind::Comment);
                if is_comment && store.update(id, AnnotationPatch::text(text)) {
                    InteractionOutcome::Updated(id)
                } else {
                    InteractionOutcome::Ignored
                }
            }
            InteractionEvent::CommentClosed { save } => {
                let closed = store.clear_active();
                tracing::debug!("Comment {:?} closed (save: {})", closed, save);
                InteractionOutcome::CommentClosed(closed)
            }
            InteractionEvent::SignaturePlaced { rect, media } => {
                if rect.is_empty() {
                    InteractionOutcome::Ignored
                } else {
                    let new = NewAnnotation::new(
                        AnnotationKind::Signature,
                        config.current_page,
                        Geometry::Image { rect, media },
                        config.zoom_factor,
                    )
                    .with_style(stroke_style(AnnotationKind::Signature, config));
                    InteractionOutcome::Created(vec![store.create(new)])
                }
            }
        };

        if outcome == InteractionOutcome::Ignored {
            switched
        } else {
            outcome
        }
    }

    fn pointer_down(
        &mut self,
        store: &mut AnnotationStore,
        config: &ToolConfig,
        at: Point,
    ) -> InteractionOutcome {
        let tool = self.tool;
        match tool {
            Tool::Comment => {
                // A click outside the open editor closes it instead of placing another
                if let Some(id) = store.clear_active() {
                    return InteractionOutcome::CommentClosed(Some(id));
                }
                let annotation = store.create(NewAnnotation::new(
                    AnnotationKind::Comment,
                    config.current_page,
                    Geometry::Point { at },
                    config.zoom_factor,
                ));
                store.set_active(annotation.id());
                InteractionOutcome::CommentOpened(annotation)
            }
            _ if tool.draws_paths() => {
                // A stroke left open by a lost PointerUp is finished first
                self.finish_stroke(store);
                let Some(kind) = tool.annotation_kind() else {
                    return InteractionOutcome::Ignored;
                };
                self.stroke = Some(Stroke {
                    kind,
                    page: config.current_page,
                    zoom: coords::sanitize_zoom(config.zoom_factor),
                    style: stroke_style(kind, config),
                    points: vec![at],
                });
                InteractionOutcome::GestureStarted
            }
            _ => InteractionOutcome::Ignored,
        }
    }

    fn finish_stroke(&mut self, store: &mut AnnotationStore) -> InteractionOutcome {
        let Some(stroke) = self.stroke.take() else {
            return InteractionOutcome::Ignored;
        };
        if stroke.points.len() < 2 {
            tracing::debug!("Discarding {:?} stroke with a single point", stroke.kind);
            return InteractionOutcome::Discarded;
        }
        let new = NewAnnotation::new(
            stroke.kind,
            stroke.page,
            Geometry::Path {
                points: stroke.points,
            },
            stroke.zoom,
        )
        .with_style(stroke.style);
        InteractionOutcome::Created(vec![store.create(new)])
    }

    fn commit_selection(
        &mut self,
        store: &mut AnnotationStore,
        config: &ToolConfig,
        selection: TextSelection,
    ) -> InteractionOutcome {
        let Some(kind) = self.tool.annotation_kind().filter(|k| k.is_text_markup()) else {
            return InteractionOutcome::Ignored;
        };
        let text = selection.text.trim();
        if text.is_empty() {
            return InteractionOutcome::Ignored;
        }
        let zoom = coords::sanitize_zoom(config.zoom_factor);
        let page = config.current_page;

        let mut created = Vec::new();
        let mut skipped = 0;
        let mut saw_rect = false;
        for rect in selection.rects.into_iter().filter(|r| !r.is_empty()) {
            saw_rect = true;
            let normalized = coords::rect_to_normalized(rect, zoom);
            if is_duplicate(store, kind, page, text, &normalized) {
                skipped += 1;
                continue;
            }
            let new = NewAnnotation::new(kind, page, Geometry::Rect { rect }, zoom).with_text(text);
            created.push(store.create(new));
        }

        if !saw_rect {
            InteractionOutcome::Ignored
        } else if skipped > 0 {
            tracing::info!("Skipped {} already-annotated {:?} region(s)", skipped, kind);
            InteractionOutcome::DuplicateSuppressed { created, skipped }
        } else {
            InteractionOutcome::Created(created)
        }
    }
}

fn is_duplicate(
    store: &AnnotationStore,
    kind: AnnotationKind,
    page: u32,
    text: &str,
    rect: &Rect,
) -> bool {
    store.list(kind).iter().any(|existing| {
        existing.page() == page
            && existing.text() == text
            && existing.rect().is_some_and(|r| r.overlaps(rect))
    })
}

fn stroke_style(kind: AnnotationKind, config: &ToolConfig) -> Style {
    let color = if config.active_color.trim().is_empty() {
        kind.default_color().to_string()
    } else {
        config.active_color.clone()
    };
    Style::new(color, config.stroke_width)
}

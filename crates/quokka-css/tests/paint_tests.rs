//! Integration tests for the painter and display list.

use quokka_css::ua_stylesheet::default_rules;
use quokka_css::{
    ApproximateFontMetrics, BlendMode, Color, DisplayItem, DrawCommand, DrawKind, EffectKind,
    LayoutContext, LayoutTree, NullEmbedHost, Painter, Rect, Rule, StyleResolver, VisualEffect,
    parse_stylesheet, sort_rules,
};
use quokka_dom::{DirtyGraph, DomTree, NodeId, WindowId};
use quokka_html::parse_document;

struct Page {
    dom: DomTree,
    graph: DirtyGraph,
    rules: Vec<Rule>,
    layout: LayoutTree,
}

impl Page {
    fn new(html: &str) -> Self {
        let mut dom = parse_document(html);
        let mut graph = DirtyGraph::new();
        let mut rules = default_rules().to_vec();
        rules.extend(parse_stylesheet(""));
        sort_rules(&mut rules);
        let layout = LayoutTree::new(&mut dom, &mut graph);
        Self {
            dom,
            graph,
            rules,
            layout,
        }
    }

    fn focused(html: &str, tag: &str) -> Self {
        let mut page = Self::new(html);
        let node = page.find(tag);
        page.dom.as_element_mut(node).unwrap().focused = true;
        page
    }

    fn paint(&mut self) -> Vec<DisplayItem> {
        self.paint_at(1.0)
    }

    fn paint_at(&mut self, zoom: f32) -> Vec<DisplayItem> {
        let _ = StyleResolver::new(&self.rules, false).resolve(&mut self.dom, &mut self.graph);
        let mut cx = LayoutContext {
            dom: &mut self.dom,
            graph: &mut self.graph,
            fonts: &ApproximateFontMetrics,
            host: &NullEmbedHost,
        };
        let _ = self.layout.layout(&mut cx, 800.0, zoom);
        Painter::new(
            &self.layout,
            &self.dom,
            &self.graph,
            &ApproximateFontMetrics,
            &NullEmbedHost,
            WindowId(1),
        )
        .paint()
    }

    fn find(&self, tag: &str) -> NodeId {
        self.dom
            .descendants(self.dom.root())
            .into_iter()
            .find(|id| self.dom.tag_name(*id) == Some(tag))
            .unwrap()
    }
}

fn draws(items: &[DisplayItem]) -> Vec<&DrawCommand> {
    let mut out = Vec::new();
    for item in items {
        match item {
            DisplayItem::Draw(cmd) => out.push(cmd),
            DisplayItem::Effect(effect) => out.extend(draws(&effect.children)),
        }
    }
    out
}

fn effects(items: &[DisplayItem]) -> Vec<&VisualEffect> {
    let mut out = Vec::new();
    for item in items {
        item.for_each_effect(&mut |effect| out.push(effect));
    }
    out
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

#[test]
fn test_simple_page_paints_text() {
    let mut page = Page::new("<html><body><div>text</div></body></html>");
    let list = page.paint();
    assert!(!list.is_empty());
    let texts: Vec<&str> = draws(&list)
        .into_iter()
        .filter_map(|cmd| match &cmd.kind {
            DrawKind::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["text"]);
}

#[test]
fn test_every_effect_names_its_node() {
    let mut page = Page::new("<div>a</div><p>b</p>");
    let list = page.paint();
    for effect in effects(&list) {
        if matches!(effect.kind, EffectKind::Transform(_)) {
            assert!(effect.node.is_some());
        }
    }
    let div = page.find("div");
    assert!(effects(&list).iter().any(|e| e.node.is_some_and(|k| k.node == div)));
}

#[test]
fn test_background_uses_border_radius() {
    let mut page = Page::new(r#"<div style="background-color: red; border-radius: 4px">x</div>"#);
    let list = page.paint();
    let rrect = draws(&list)
        .into_iter()
        .find_map(|cmd| match cmd.kind {
            DrawKind::RRect { radius, color } => Some((radius, color)),
            _ => None,
        })
        .unwrap();
    assert!(close(rrect.0, 4.0));
    assert_eq!(rrect.1, Color::RED);
}

#[test]
fn test_focused_input_draws_cursor_after_value() {
    let mut page = Page::focused("<input value=ab>", "input");
    let list = page.paint();
    let (x1, color) = draws(&list)
        .into_iter()
        .find_map(|cmd| match cmd.kind {
            DrawKind::Line { x1, color, .. } => Some((x1, color)),
            _ => None,
        })
        .unwrap();
    // 13px margin plus two 7.2px glyphs of the 12pt input font.
    assert!(close(x1, 13.0 + 14.4));
    assert_eq!(color, Color::RED);
    assert!(draws(&list).iter().any(|cmd| matches!(cmd.kind, DrawKind::Outline { .. })));
}

#[test]
fn test_button_paints_its_label() {
    let mut page = Page::new("<button>Go</button>");
    let list = page.paint();
    assert!(draws(&list).iter().any(|cmd| matches!(
        &cmd.kind,
        DrawKind::Text { text, .. } if text == "Go"
    )));
}

#[test]
fn test_contenteditable_cursor_follows_last_word() {
    let mut page = Page::focused("<div contenteditable>one two</div>", "div");
    let list = page.paint();
    let text_right = draws(&list)
        .into_iter()
        .filter_map(|cmd| match &cmd.kind {
            DrawKind::Text { text, .. } if text == "two" => Some(cmd.rect.right),
            _ => None,
        })
        .next()
        .unwrap();
    let cursor = draws(&list)
        .into_iter()
        .find_map(|cmd| match cmd.kind {
            DrawKind::Line { x1, .. } => Some(x1),
            _ => None,
        })
        .unwrap();
    assert!(close(cursor, text_right));
}

#[test]
fn test_focused_link_outlines_its_text() {
    let mut page = Page::focused("<div><a href=x>link</a> more</div>", "a");
    let list = page.paint();
    let link_rect = draws(&list)
        .into_iter()
        .find_map(|cmd| match &cmd.kind {
            DrawKind::Text { text, .. } if text == "link" => Some(cmd.rect),
            _ => None,
        })
        .unwrap();
    let outline = draws(&list)
        .into_iter()
        .find_map(|cmd| match cmd.kind {
            DrawKind::Outline { .. } => Some(cmd.rect),
            _ => None,
        })
        .unwrap();
    assert!(close(outline.left, link_rect.left));
    assert!(outline.right < link_rect.right + 10.0);
}

#[test]
fn test_opacity_needs_compositing() {
    let mut page = Page::new(r#"<div style="opacity: 0.5">x</div>"#);
    let list = page.paint();
    let div = page.find("div");
    let blend = effects(&list)
        .into_iter()
        .find(|e| e.node.is_some_and(|k| k.node == div) && matches!(e.kind, EffectKind::Blend(_)))
        .unwrap();
    let EffectKind::Blend(op) = blend.kind else {
        unreachable!()
    };
    assert!(close(op.opacity, 0.5));
    assert!(op.should_save);
    assert!(blend.needs_compositing);
    assert!(list[0].needs_compositing());
}

#[test]
fn test_opaque_page_needs_no_compositing() {
    let mut page = Page::new("<div>x</div>");
    let list = page.paint();
    assert!(list.iter().all(|item| !item.needs_compositing()));
}

#[test]
fn test_translate_moves_bounds() {
    let mut page = Page::new(r#"<div style="transform: translate(10px, 20px)">x</div>"#);
    let list = page.paint();
    let div = page.find("div");
    let moved = effects(&list)
        .into_iter()
        .find(|e| {
            e.node.is_some_and(|k| k.node == div) && matches!(e.kind, EffectKind::Transform(Some(_)))
        })
        .unwrap();
    let inner = moved.children[0].rect();
    assert_eq!(moved.rect, inner.offset(10.0, 20.0));
    assert!(moved.needs_compositing);
}

#[test]
fn test_overflow_clip_adds_mask() {
    let mut page = Page::new(r#"<div style="overflow: clip; border-radius: 3px">x</div>"#);
    let list = page.paint();
    let mask = effects(&list).into_iter().find(|e| {
        matches!(e.kind, EffectKind::Blend(op) if op.mode == Some(BlendMode::DestinationIn))
    });
    assert!(mask.is_some());
}

#[test]
fn test_clip_mask_radius_scales_with_zoom() {
    let mut page = Page::new(
        r#"<div style="overflow: clip; border-radius: 3px; background-color: red">x</div>"#,
    );
    let list = page.paint_at(2.0);
    let radii: Vec<f32> = draws(&list)
        .into_iter()
        .filter_map(|cmd| match cmd.kind {
            DrawKind::RRect { radius, .. } => Some(radius),
            _ => None,
        })
        .collect();
    // The background and the mask round their corners alike.
    assert_eq!(radii.len(), 2);
    assert!(radii.iter().all(|r| close(*r, 6.0)));
}

#[test]
fn test_unloaded_iframe_paints_bordered_box() {
    let mut page = Page::new("<p><iframe src=x></iframe></p>");
    let list = page.paint();
    let iframe = page.find("iframe");
    let rect = page
        .layout
        .get(page.dom.get(iframe).unwrap().layout_object.unwrap())
        .unwrap()
        .rect(&page.graph);
    let outline = draws(&list)
        .into_iter()
        .find_map(|cmd| match cmd.kind {
            DrawKind::Outline { .. } => Some(cmd.rect),
            _ => None,
        })
        .unwrap();
    assert_eq!(outline, rect);
    let mask = draws(&list)
        .into_iter()
        .find(|cmd| matches!(cmd.kind, DrawKind::RRect { color, .. } if color == Color::WHITE))
        .unwrap();
    assert_eq!(
        mask.rect,
        Rect::from_ltrb(rect.left + 1.0, rect.top + 1.0, rect.right - 1.0, rect.bottom - 1.0)
    );
}

#[test]
fn test_image_sits_on_box_bottom() {
    let mut page = Page::new("<p><img width=4 height=4></p>");
    let list = page.paint();
    let image = draws(&list)
        .into_iter()
        .find(|cmd| matches!(cmd.kind, DrawKind::Image { .. }))
        .unwrap();
    assert!(close(image.rect.height(), 4.0));
}

#[test]
fn test_repaint_after_mutation_matches_fresh_paint() {
    let mut page = Page::new(r#"<div>first</div><div style="opacity: 0.5">second</div>"#);
    let _ = page.paint();

    let div = page.find("div");
    let text = page.dom.children(div)[0];
    *page.dom.as_text_mut(text).unwrap() = "changed words here".to_string();
    page.layout.mark_children_dirty(&page.dom, &mut page.graph, text);
    let incremental = page.paint();

    let mut fresh = Page::new(r#"<div>changed words here</div><div style="opacity: 0.5">second</div>"#);
    assert_eq!(incremental, fresh.paint());
}

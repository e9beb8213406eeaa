//! Composited layers.
//!
//! [CSS Will Change § 3](https://www.w3.org/TR/css-will-change-1/#will-change)
//!
//! Effects that can change at composite time (a translucent group, a
//! translation) split the display list into layers. Each layer is rastered
//! once into its own surface; a later change to a composited blend op only
//! re-runs the final draw.

use quokka_css::{BlendOp, DisplayItem, EffectKey, EffectKind, Rect};
use tiny_skia::{Pixmap, PixmapPaint, Transform};

use super::canvas::{draw_items, with_blend};

/// A visual effect that needs compositing, lifted out of the display list.
#[derive(Debug, Clone)]
struct EffectNode {
    kind: EffectKind,
    key: Option<EffectKey>,
    parent: Option<usize>,
}

/// Display items that share a composited ancestor and are rastered into
/// one surface.
#[derive(Debug)]
pub struct CompositedLayer {
    parent: Option<usize>,
    items: Vec<DisplayItem>,
    /// Union of the items' bounds in the parent effect's space.
    bounds: Rect,
    /// `bounds` in page space.
    absolute_bounds: Rect,
    surface: Option<Pixmap>,
}

impl CompositedLayer {
    /// Bounds of the layer's surface: the items' bounds plus a pixel for
    /// anti-aliasing, on integer edges.
    #[must_use]
    pub fn composited_bounds(&self) -> Rect {
        self.bounds.outset(1.0).round_out()
    }

    /// Number of display items rastered into the layer.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// The rastered surface, if the layer has any area.
    #[must_use]
    pub const fn surface(&self) -> Option<&Pixmap> {
        self.surface.as_ref()
    }

    /// Draw the items into a fresh surface.
    fn raster(&mut self) {
        let bounds = self.composited_bounds();
        self.surface = Pixmap::new(bounds.width() as u32, bounds.height() as u32).map(|mut surface| {
            draw_items(
                &mut surface,
                &self.items,
                Transform::from_translate(-bounds.left, -bounds.top),
            );
            surface
        });
    }
}

/// The tree of composited effects and the layers under them.
enum DrawNode {
    Layer(usize),
    Effect(usize, Vec<DrawNode>),
}

/// Layers of one display list, in paint order.
#[derive(Debug, Default)]
pub struct LayerTree {
    effects: Vec<EffectNode>,
    layers: Vec<CompositedLayer>,
}

impl LayerTree {
    /// Partition `display_list` into layers and raster each one.
    #[must_use]
    pub fn build(display_list: &[DisplayItem]) -> Self {
        let mut tree = Self::default();

        // STEP 1: Lift composited effects out; everything else is a chunk
        // attached to its nearest composited ancestor.
        let mut chunks = Vec::new();
        tree.collect(display_list, None, &mut chunks);

        // STEP 2: A chunk joins the latest layer with the same ancestor,
        // unless a layer in between overlaps it.
        for (parent, item) in chunks {
            let absolute = tree.to_absolute(item.rect(), parent);
            let mut target = None;
            for (index, layer) in tree.layers.iter().enumerate().rev() {
                if layer.parent == parent {
                    target = Some(index);
                    break;
                }
                if layer.absolute_bounds.intersects(&absolute) {
                    break;
                }
            }
            match target {
                Some(index) => {
                    let layer = &mut tree.layers[index];
                    layer.bounds.join(&item.rect());
                    layer.absolute_bounds.join(&absolute);
                    layer.items.push(item);
                }
                None => tree.layers.push(CompositedLayer {
                    parent,
                    bounds: item.rect(),
                    absolute_bounds: absolute,
                    items: vec![item],
                    surface: None,
                }),
            }
        }

        // STEP 3: Raster.
        for layer in &mut tree.layers {
            layer.raster();
        }
        tree
    }

    fn collect(&mut self, items: &[DisplayItem], parent: Option<usize>, chunks: &mut Vec<(Option<usize>, DisplayItem)>) {
        for item in items {
            match item {
                DisplayItem::Effect(effect) if effect.needs_compositing => {
                    let id = self.effects.len();
                    self.effects.push(EffectNode {
                        kind: effect.kind,
                        key: effect.node,
                        parent,
                    });
                    self.collect(&effect.children, Some(id), chunks);
                }
                _ => chunks.push((parent, item.clone())),
            }
        }
    }

    /// Map a rectangle in the space under `parent` to page space.
    fn to_absolute(&self, mut rect: Rect, mut parent: Option<usize>) -> Rect {
        while let Some(id) = parent {
            let effect = &self.effects[id];
            if let EffectKind::Transform(Some((dx, dy))) = effect.kind {
                rect = rect.offset(dx, dy);
            }
            parent = effect.parent;
        }
        rect
    }

    /// Composited ancestors of `parent`, outermost first.
    fn ancestors(&self, mut parent: Option<usize>) -> Vec<usize> {
        let mut chain = Vec::new();
        while let Some(id) = parent {
            chain.push(id);
            parent = self.effects[id].parent;
        }
        chain.reverse();
        chain
    }

    /// The layers, in paint order.
    #[must_use]
    pub fn layers(&self) -> &[CompositedLayer] {
        &self.layers
    }

    /// Substitute the op of the composited blend owned by `key`. Returns
    /// whether there was one.
    pub fn set_blend(&mut self, key: EffectKey, op: BlendOp) -> bool {
        let mut found = false;
        for effect in &mut self.effects {
            if effect.key == Some(key) {
                if let EffectKind::Blend(_) = effect.kind {
                    effect.kind = EffectKind::Blend(op);
                    found = true;
                }
            }
        }
        found
    }

    /// Draw every layer onto `pixmap` under its composited effects.
    ///
    /// Consecutive layers with the same ancestors share one application of
    /// each ancestor effect, so a translucent group is composited once.
    pub fn draw(&self, pixmap: &mut Pixmap, transform: Transform) {
        let mut root = Vec::new();
        let mut open: Vec<(usize, Vec<DrawNode>)> = Vec::new();
        for (index, layer) in self.layers.iter().enumerate() {
            let chain = self.ancestors(layer.parent);
            let shared = open
                .iter()
                .zip(&chain)
                .take_while(|&(&(effect, _), &id)| effect == id)
                .count();
            while open.len() > shared {
                close_effect(&mut open, &mut root);
            }
            open.extend(chain[shared..].iter().map(|&id| (id, Vec::new())));
            push_node(&mut open, &mut root, DrawNode::Layer(index));
        }
        while !open.is_empty() {
            close_effect(&mut open, &mut root);
        }
        self.draw_nodes(pixmap, &root, transform);
    }

    fn draw_nodes(&self, pixmap: &mut Pixmap, nodes: &[DrawNode], transform: Transform) {
        for node in nodes {
            match node {
                DrawNode::Layer(index) => {
                    let layer = &self.layers[*index];
                    if let Some(surface) = &layer.surface {
                        let bounds = layer.composited_bounds();
                        pixmap.draw_pixmap(
                            bounds.left as i32,
                            bounds.top as i32,
                            surface.as_ref(),
                            &PixmapPaint::default(),
                            transform,
                            None,
                        );
                    }
                }
                DrawNode::Effect(id, children) => match self.effects[*id].kind {
                    EffectKind::Transform(translation) => {
                        let transform = translation.map_or(transform, |(dx, dy)| transform.pre_translate(dx, dy));
                        self.draw_nodes(pixmap, children, transform);
                    }
                    EffectKind::Blend(op) => {
                        with_blend(pixmap, op, |surface| self.draw_nodes(surface, children, transform));
                    }
                },
            }
        }
    }
}

fn push_node(open: &mut [(usize, Vec<DrawNode>)], root: &mut Vec<DrawNode>, node: DrawNode) {
    match open.last_mut() {
        Some((_, children)) => children.push(node),
        None => root.push(node),
    }
}

fn close_effect(open: &mut Vec<(usize, Vec<DrawNode>)>, root: &mut Vec<DrawNode>) {
    if let Some((id, children)) = open.pop() {
        push_node(open, root, DrawNode::Effect(id, children));
    }
}

#[cfg(test)]
mod tests {
    use quokka_css::{Color, DrawCommand, VisualEffect};
    use quokka_dom::{NodeId, WindowId};

    use super::*;

    fn square(x: f32, y: f32) -> DisplayItem {
        DrawCommand::rect(Rect::from_xywh(x, y, 10.0, 10.0), Color::BLACK).into()
    }

    fn key(node: usize) -> EffectKey {
        EffectKey {
            window: WindowId(1),
            node: NodeId(node),
        }
    }

    #[test]
    fn test_plain_items_share_one_layer() {
        let tree = LayerTree::build(&[square(0.0, 0.0), square(50.0, 0.0), square(0.0, 50.0)]);
        assert_eq!(tree.layers().len(), 1);
        assert_eq!(tree.layers()[0].item_count(), 3);
        assert_eq!(tree.layers()[0].composited_bounds(), Rect::from_ltrb(-1.0, -1.0, 61.0, 61.0));
    }

    #[test]
    fn test_composited_effect_starts_a_layer() {
        let faded = VisualEffect::blend(BlendOp::new(0.5, None), Some(key(3)), vec![square(20.0, 0.0)]);
        let tree = LayerTree::build(&[square(0.0, 0.0), faded.into(), square(100.0, 100.0)]);
        // The last square does not overlap the faded layer, so it merges
        // back into the first.
        assert_eq!(tree.layers().len(), 2);
        assert_eq!(tree.layers()[0].item_count(), 2);
    }

    #[test]
    fn test_overlap_forces_a_new_layer() {
        let faded = VisualEffect::blend(BlendOp::new(0.5, None), Some(key(3)), vec![square(0.0, 0.0)]);
        let tree = LayerTree::build(&[square(0.0, 0.0), faded.into(), square(5.0, 5.0)]);
        assert_eq!(tree.layers().len(), 3);
    }

    #[test]
    fn test_set_blend_by_key() {
        let faded = VisualEffect::blend(BlendOp::new(0.5, None), Some(key(3)), vec![square(0.0, 0.0)]);
        let mut tree = LayerTree::build(&[faded.into()]);
        assert!(tree.set_blend(key(3), BlendOp::new(0.25, None)));
        assert!(!tree.set_blend(key(4), BlendOp::new(0.25, None)));
    }
}

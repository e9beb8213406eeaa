//! Style resolution.
//!
//! [CSS Cascading Level 4](https://www.w3.org/TR/css-cascade-4/)
//!
//! Computes every node's [`StyleCells`] from the rule list, the `style`
//! attribute and the parent's inherited values. Only nodes with a dirty cell
//! are recomputed; a recomputation that produces the same value leaves the
//! layout fields reading it clean.

use std::collections::HashMap;
use std::str::FromStr;

use log::debug;
use strum::IntoEnumIterator;

use quokka_common::warning::warn_once;
use quokka_dom::{
    DirtyGraph, DomTree, FieldId, NodeId, NodeType, NumericAnimation, Property, StyleCells,
};

use crate::parser::{Rule, parse_declarations};

/// Seconds per animation frame, used to turn `transition` durations given
/// in seconds into frame counts.
pub const REFRESH_RATE_SEC: f64 = 0.033;

/// Default font size a percentage resolves against at the root.
const DEFAULT_FONT_SIZE_PX: f64 = 16.0;

/// Properties that can be transitioned with a [`NumericAnimation`].
const ANIMATED_PROPERTIES: [Property; 1] = [Property::Opacity];

/// What a style pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StyleOutcome {
    /// Nodes whose style was recomputed.
    pub restyled: usize,
    /// Transitions that started an animation.
    pub animations_started: usize,
}

/// Resolves computed styles for one frame's document.
#[derive(Debug, Clone, Copy)]
pub struct StyleResolver<'a> {
    rules: &'a [Rule],
    dark_mode: bool,
}

impl<'a> StyleResolver<'a> {
    /// A resolver over `rules`, which must already be sorted by
    /// [`crate::parser::sort_rules`].
    #[must_use]
    pub const fn new(rules: &'a [Rule], dark_mode: bool) -> Self {
        Self { rules, dark_mode }
    }

    /// Style every element and text node in tree order.
    ///
    /// Parents are visited before children, so an inherited value read from
    /// the parent is always clean.
    pub fn resolve(&self, dom: &mut DomTree, graph: &mut DirtyGraph) -> StyleOutcome {
        let mut outcome = StyleOutcome::default();
        for node in dom.descendants(dom.root()) {
            self.style_node(dom, graph, node, &mut outcome);
        }
        if outcome.restyled > 0 {
            debug!(
                "restyled {} nodes, {} animations started",
                outcome.restyled, outcome.animations_started
            );
        }
        outcome
    }

    fn style_node(
        &self,
        dom: &mut DomTree,
        graph: &mut DirtyGraph,
        node: NodeId,
        outcome: &mut StyleOutcome,
    ) {
        let Some(entry) = dom.get_mut(node) else {
            return;
        };
        if matches!(entry.node_type, NodeType::Document) {
            return;
        }
        let cells = entry.style.get_or_insert_with(|| StyleCells::new(graph));
        if !cells.any_dirty(graph) {
            return;
        }
        outcome.restyled += 1;

        // STEP 1: Snapshot the values from the previous pass.
        let old: HashMap<Property, Option<String>> = cells.snapshot().into_iter().collect();
        let notify: HashMap<Property, _> = Property::iter()
            .map(|property| (property, cells.field(property).id()))
            .collect();

        // STEP 2: Defaults for the non-inherited properties.
        let mut values: HashMap<Property, String> = Property::iter()
            .filter(|property| !property.is_inherited())
            .map(|property| (property, property.initial_value(self.dark_mode).to_string()))
            .collect();

        // STEP 3: Inherited properties.
        // [§ 7.2 Inheritance](https://www.w3.org/TR/css-cascade-4/#inheriting)
        // "the inherited value of a property on an element is the computed
        // value of the property on the element's parent element."
        let parent = dom
            .parent(node)
            .filter(|parent| dom.get(*parent).is_some_and(|p| p.style.is_some()));
        for property in Property::INHERITED {
            let value = match parent {
                Some(parent) => {
                    read_parent(dom, graph, parent, property, notify[&property], self.dark_mode)
                }
                None => property.initial_value(self.dark_mode).to_string(),
            };
            let _ = values.insert(property, value);
        }

        // STEP 4: Matching rules, lowest priority first.
        if dom.as_element(node).is_some() {
            for rule in self.rules {
                if rule.media.is_some_and(|media| !media.matches(self.dark_mode)) {
                    continue;
                }
                if !rule.selector.matches(dom, node) {
                    continue;
                }
                for (property, value) in &rule.declarations {
                    let _ = values.insert(*property, value.clone());
                }
            }

            // STEP 5: The style attribute beats every rule.
            if let Some(inline) = dom.attribute(node, "style") {
                for (property, value) in parse_declarations(inline) {
                    let _ = values.insert(property, value);
                }
            }
        }

        // STEP 6: Percentage font sizes.
        // [CSS Fonts § 2.5](https://www.w3.org/TR/css-fonts-4/#font-size-prop)
        // "Percentages: refer to parent element's font size"
        if let Some(percent) = values
            .get(&Property::FontSize)
            .and_then(|size| size.strip_suffix('%'))
            .map(str::to_string)
        {
            let parent_px = match parent {
                Some(parent) => parse_font_px(&read_parent(
                    dom,
                    graph,
                    parent,
                    Property::FontSize,
                    notify[&Property::FontSize],
                    self.dark_mode,
                )),
                None => DEFAULT_FONT_SIZE_PX,
            };
            let resolved = match percent.trim().parse::<f64>() {
                Ok(percent) => percent / 100.0 * parent_px,
                Err(_) => {
                    warn_once("CSS", &format!("invalid font-size '{percent}%'"));
                    parent_px
                }
            };
            let _ = values.insert(Property::FontSize, format!("{resolved}px"));
        }

        // STEP 7: Transitions.
        // [CSS Transitions § 3](https://www.w3.org/TR/css-transitions-1/#starting)
        let Some(entry) = dom.get_mut(node) else {
            return;
        };
        let transitions = parse_transition(values.get(&Property::Transition).map_or("", String::as_str));
        for (property, num_frames) in transitions {
            if !ANIMATED_PROPERTIES.contains(&property) {
                continue;
            }
            let Some(Some(old_value)) = old.get(&property) else {
                continue;
            };
            let Some(new_value) = values.get(&property) else {
                continue;
            };
            if old_value == new_value {
                continue;
            }
            let (Ok(from), Ok(to)) = (old_value.parse::<f64>(), new_value.parse::<f64>()) else {
                continue;
            };
            if entry
                .animations
                .get(&property)
                .is_some_and(|running| !running.is_finished() && running.target() == to)
            {
                // Already heading there: keep the in-flight value.
                let _ = values.insert(property, old_value.clone());
                continue;
            }
            let mut animation = NumericAnimation::new(from, to, num_frames);
            if let Some(first) = animation.animate() {
                let _ = values.insert(property, first);
            }
            let _ = entry.animations.insert(property, animation);
            outcome.animations_started += 1;
        }

        // STEP 8: Store.
        let Some(cells) = entry.style.as_mut() else {
            return;
        };
        for (property, value) in values {
            let _ = cells.field_mut(property).update(graph, value);
        }
    }
}

fn read_parent(
    dom: &DomTree,
    graph: &mut DirtyGraph,
    parent: NodeId,
    property: Property,
    notify: FieldId,
    dark_mode: bool,
) -> String {
    dom.get(parent)
        .and_then(|p| p.style.as_ref())
        .map_or_else(
            || property.initial_value(dark_mode).to_string(),
            |style| style.read(graph, property, notify).to_string(),
        )
}

fn parse_font_px(value: &str) -> f64 {
    value
        .trim()
        .strip_suffix("px")
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(DEFAULT_FONT_SIZE_PX)
}

/// [CSS Transitions § 2.1 The transition shorthand](https://www.w3.org/TR/css-transitions-1/#transition-shorthand-property)
///
/// Parses `property duration, ...` into `(property, frame count)` pairs.
/// A bare number is a frame count; `2s` and `500ms` are converted using
/// [`REFRESH_RATE_SEC`]. Entries naming unsupported properties are skipped.
#[must_use]
pub fn parse_transition(value: &str) -> Vec<(Property, u32)> {
    let mut out = Vec::new();
    for item in value.split(',') {
        let mut parts = item.split_whitespace();
        let (Some(name), Some(duration)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(property) = Property::from_str(name) else {
            warn_once("CSS", &format!("cannot transition '{name}'"));
            continue;
        };
        let frames = if let Some(ms) = duration.strip_suffix("ms") {
            ms.parse::<f64>().ok().map(|ms| ms / 1000.0 / REFRESH_RATE_SEC)
        } else if let Some(secs) = duration.strip_suffix('s') {
            secs.parse::<f64>().ok().map(|secs| secs / REFRESH_RATE_SEC)
        } else {
            duration.parse::<f64>().ok()
        };
        if let Some(frames) = frames.map(f64::round).filter(|f| f.is_finite() && *f >= 1.0) {
            out.push((property, frames as u32));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use quokka_dom::Field;

    use super::*;

    #[test]
    fn test_parse_transition_units() {
        assert_eq!(parse_transition("opacity 4"), vec![(Property::Opacity, 4)]);
        assert_eq!(parse_transition("opacity 0.33s"), vec![(Property::Opacity, 10)]);
        assert_eq!(parse_transition("opacity 66ms"), vec![(Property::Opacity, 2)]);
        assert!(parse_transition("").is_empty());
        assert!(parse_transition("opacity").is_empty());
    }

    #[test]
    fn test_unstyled_parent_falls_back_to_scheme_initial_value() {
        let dom = DomTree::new();
        let mut graph = DirtyGraph::new();
        let notify = Field::<String>::new(&mut graph, "color").id();
        let parent = dom.root();
        assert_eq!(
            read_parent(&dom, &mut graph, parent, Property::Color, notify, true),
            "white"
        );
        assert_eq!(
            read_parent(&dom, &mut graph, parent, Property::Color, notify, false),
            "black"
        );
    }

    #[test]
    fn test_parse_transition_lists() {
        assert_eq!(
            parse_transition("opacity 4, color 2"),
            vec![(Property::Opacity, 4), (Property::Color, 2)]
        );
    }
}

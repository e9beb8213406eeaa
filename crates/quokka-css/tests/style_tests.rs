//! Property tests over generated documents and stylesheets.

use quickcheck_macros::quickcheck;
use quokka_css::ua_stylesheet::default_rules;
use quokka_css::{Rule, StyleResolver, parse_stylesheet, sort_rules};
use quokka_dom::{DirtyGraph, DomTree, NodeId, Property};
use quokka_html::parse_document;

const TAGS: &[&str] = &["div", "p", "span", "b", "i", "a", "pre"];
const CLASSES: &[&str] = &["x", "y", "z"];
const COLORS: &[&str] = &["red", "green", "blue", "#123", "rgb(1, 2, 3)"];

/// Markup built from generated (tag, class, nesting) triples.
fn markup(shape: &[(u8, u8, bool)]) -> String {
    let mut html = String::new();
    let mut open = Vec::new();
    for (tag, class, nest) in shape {
        let tag = TAGS[usize::from(*tag) % TAGS.len()];
        let class = CLASSES[usize::from(*class) % CLASSES.len()];
        html.push_str(&format!(r#"<{tag} class="{class}">word "#));
        if *nest {
            open.push(tag);
        } else {
            html.push_str(&format!("</{tag}>"));
        }
    }
    while let Some(tag) = open.pop() {
        html.push_str(&format!("</{tag}>"));
    }
    html
}

fn snapshot(dom: &DomTree, graph: &DirtyGraph) -> Vec<(NodeId, Vec<String>)> {
    dom.descendants(dom.root())
        .into_iter()
        .filter_map(|id| {
            let style = dom.get(id)?.style.as_ref()?;
            let values = [
                Property::Color,
                Property::FontSize,
                Property::FontWeight,
                Property::BackgroundColor,
                Property::Opacity,
            ]
            .iter()
            .map(|property| style.get(graph, *property).to_string())
            .collect();
            Some((id, values))
        })
        .collect()
}

fn resolve(html: &str, rules: &[Rule]) -> Vec<(NodeId, Vec<String>)> {
    let mut dom = parse_document(html);
    let mut graph = DirtyGraph::new();
    let _ = StyleResolver::new(rules, false).resolve(&mut dom, &mut graph);
    snapshot(&dom, &graph)
}

/// Running the resolver again without mutations changes nothing.
#[quickcheck]
fn style_resolution_is_idempotent(shape: Vec<(u8, u8, bool)>, picks: Vec<(u8, u8)>) -> bool {
    let mut css = String::new();
    for (class, color) in picks {
        let class = CLASSES[usize::from(class) % CLASSES.len()];
        let color = COLORS[usize::from(color) % COLORS.len()];
        css.push_str(&format!(".{class} {{ color: {color}; font-size: 120%; }}\n"));
    }
    let mut rules = default_rules().to_vec();
    rules.extend(parse_stylesheet(&css));
    sort_rules(&mut rules);

    let mut dom = parse_document(&markup(&shape));
    let mut graph = DirtyGraph::new();
    let resolver = StyleResolver::new(&rules, false);
    let _ = resolver.resolve(&mut dom, &mut graph);
    let first = snapshot(&dom, &graph);
    let second = resolver.resolve(&mut dom, &mut graph);
    second.restyled == 0 && snapshot(&dom, &graph) == first
}

/// Reordering rules of equal priority that set different properties does
/// not change any computed value.
#[quickcheck]
fn equal_priority_rules_commute(shape: Vec<(u8, u8, bool)>, rotation: usize) -> bool {
    let per_class = [
        ".x { color: red; }",
        ".y { background-color: green; }",
        ".z { font-weight: bold; }",
        "div { opacity: 0.5; }",
        "span { font-size: 20px; }",
    ];
    let build = |order: &[&str]| {
        let mut rules = default_rules().to_vec();
        rules.extend(parse_stylesheet(&order.join("\n")));
        sort_rules(&mut rules);
        rules
    };
    let mut rotated = per_class.to_vec();
    rotated.rotate_left(rotation % per_class.len());

    let html = markup(&shape);
    resolve(&html, &build(&per_class)) == resolve(&html, &build(&rotated))
}

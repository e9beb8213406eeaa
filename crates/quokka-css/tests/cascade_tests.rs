//! Integration tests for the style resolver.

use quokka_css::ua_stylesheet::default_rules;
use quokka_css::{Rule, StyleResolver, parse_stylesheet, sort_rules};
use quokka_dom::{DirtyGraph, DomTree, NodeId, Property};
use quokka_html::parse_document;

fn rules(css: &str) -> Vec<Rule> {
    let mut rules = default_rules().to_vec();
    rules.extend(parse_stylesheet(css));
    sort_rules(&mut rules);
    rules
}

fn styled(html: &str, css: &str, dark_mode: bool) -> (DomTree, DirtyGraph) {
    let mut dom = parse_document(html);
    let mut graph = DirtyGraph::new();
    let rules = rules(css);
    let _ = StyleResolver::new(&rules, dark_mode).resolve(&mut dom, &mut graph);
    (dom, graph)
}

fn find(dom: &DomTree, tag: &str) -> NodeId {
    dom.descendants(dom.root())
        .into_iter()
        .find(|id| dom.tag_name(*id) == Some(tag))
        .unwrap()
}

fn value(dom: &DomTree, graph: &DirtyGraph, node: NodeId, property: Property) -> String {
    dom.get(node)
        .and_then(|n| n.style.as_ref())
        .unwrap()
        .get(graph, property)
        .to_string()
}

#[test]
fn test_defaults_without_rules() {
    let (dom, graph) = styled("<div>x</div>", "", false);
    let div = find(&dom, "div");
    assert_eq!(value(&dom, &graph, div, Property::Opacity), "1");
    assert_eq!(value(&dom, &graph, div, Property::Transform), "none");
    assert_eq!(value(&dom, &graph, div, Property::Overflow), "visible");
    assert_eq!(value(&dom, &graph, div, Property::BackgroundColor), "transparent");
    assert_eq!(value(&dom, &graph, div, Property::FontSize), "16px");
    assert_eq!(value(&dom, &graph, div, Property::Color), "black");
    assert_eq!(value(&dom, &graph, div, Property::MixBlendMode), "");
}

#[test]
fn test_inherited_properties_flow_to_text() {
    let (dom, graph) = styled(r#"<div style="color: red"><span>hello</span></div>"#, "", false);
    let span = find(&dom, "span");
    assert_eq!(value(&dom, &graph, span, Property::Color), "red");
    let text = dom.children(span)[0];
    assert_eq!(value(&dom, &graph, text, Property::Color), "red");
}

#[test]
fn test_non_inherited_properties_do_not_flow() {
    let (dom, graph) = styled(r#"<div style="opacity: 0.5"><span>x</span></div>"#, "", false);
    let span = find(&dom, "span");
    assert_eq!(value(&dom, &graph, span, Property::Opacity), "1");
}

#[test]
fn test_class_beats_tag_regardless_of_order() {
    let (dom, graph) = styled(
        r#"<div class="note">x</div>"#,
        ".note { color: blue; } div { color: green; }",
        false,
    );
    let div = find(&dom, "div");
    assert_eq!(value(&dom, &graph, div, Property::Color), "blue");
}

#[test]
fn test_later_rule_wins_on_tie() {
    let (dom, graph) = styled("<p>x</p>", "p { color: green; } p { color: purple; }", false);
    let p = find(&dom, "p");
    assert_eq!(value(&dom, &graph, p, Property::Color), "purple");
}

#[test]
fn test_inline_style_beats_rules() {
    let (dom, graph) = styled(
        r#"<div class="a" style="background-color: yellow">x</div>"#,
        ".a { background-color: red; }",
        false,
    );
    let div = find(&dom, "div");
    assert_eq!(value(&dom, &graph, div, Property::BackgroundColor), "yellow");
}

#[test]
fn test_descendant_selector() {
    let (dom, graph) = styled(
        "<div><p>in</p></div><p>out</p>",
        "div p { font-weight: bold; }",
        false,
    );
    let ps: Vec<NodeId> = dom
        .descendants(dom.root())
        .into_iter()
        .filter(|id| dom.tag_name(*id) == Some("p"))
        .collect();
    assert_eq!(value(&dom, &graph, ps[0], Property::FontWeight), "bold");
    assert_eq!(value(&dom, &graph, ps[1], Property::FontWeight), "normal");
}

#[test]
fn test_dark_mode_media_and_default_color() {
    let css = "@media (prefers-color-scheme: dark) { div { background-color: black; } }";
    let (dom, graph) = styled("<div>x</div>", css, true);
    let div = find(&dom, "div");
    assert_eq!(value(&dom, &graph, div, Property::BackgroundColor), "black");
    assert_eq!(value(&dom, &graph, div, Property::Color), "white");

    let (dom, graph) = styled("<div>x</div>", css, false);
    let div = find(&dom, "div");
    assert_eq!(value(&dom, &graph, div, Property::BackgroundColor), "transparent");
}

#[test]
fn test_percent_font_size_resolves_against_parent() {
    let (dom, graph) = styled(
        r#"<div style="font-size: 20px"><span style="font-size: 150%">x</span></div>"#,
        "",
        false,
    );
    let span = find(&dom, "span");
    assert_eq!(value(&dom, &graph, span, Property::FontSize), "30px");

    let (dom, graph) = styled("<h1>Title</h1>", "", false);
    let h1 = find(&dom, "h1");
    assert_eq!(value(&dom, &graph, h1, Property::FontSize), "32px");
}

#[test]
fn test_focus_pseudo_class() {
    let mut dom = parse_document("<a href=x>link</a>");
    let mut graph = DirtyGraph::new();
    let rules = rules("");
    let a = find(&dom, "a");
    dom.as_element_mut(a).unwrap().focused = true;
    let _ = StyleResolver::new(&rules, false).resolve(&mut dom, &mut graph);
    assert_eq!(value(&dom, &graph, a, Property::Outline), "1px solid black");
}

#[test]
fn test_restyle_only_dirty_nodes() {
    let mut dom = parse_document("<div>a</div><p>b</p>");
    let mut graph = DirtyGraph::new();
    let rules = rules("");
    let resolver = StyleResolver::new(&rules, false);
    let first = resolver.resolve(&mut dom, &mut graph);
    assert!(first.restyled > 0);
    assert_eq!(resolver.resolve(&mut dom, &mut graph).restyled, 0);

    let div = find(&dom, "div");
    dom.get(div).unwrap().style.as_ref().unwrap().mark_all(&mut graph);
    let outcome = resolver.resolve(&mut dom, &mut graph);
    // The div, plus its text child which read the div's inherited values
    // and was marked with them.
    assert_eq!(outcome.restyled, 2);
}

#[test]
fn test_parent_change_propagates_to_children() {
    let mut dom = parse_document(r#"<div style="color: red"><span>x</span></div>"#);
    let mut graph = DirtyGraph::new();
    let rules = rules("");
    let resolver = StyleResolver::new(&rules, false);
    let _ = resolver.resolve(&mut dom, &mut graph);

    let div = find(&dom, "div");
    let _ = dom
        .as_element_mut(div)
        .unwrap()
        .attrs
        .insert("style".to_string(), "color: green".to_string());
    dom.get(div).unwrap().style.as_ref().unwrap().mark_all(&mut graph);
    let _ = resolver.resolve(&mut dom, &mut graph);

    let span = find(&dom, "span");
    assert_eq!(value(&dom, &graph, span, Property::Color), "green");
}

#[test]
fn test_transition_installs_animation() {
    let mut dom = parse_document(r#"<div style="opacity: 1; transition: opacity 4">x</div>"#);
    let mut graph = DirtyGraph::new();
    let rules = rules("");
    let resolver = StyleResolver::new(&rules, false);
    assert_eq!(resolver.resolve(&mut dom, &mut graph).animations_started, 0);

    let div = find(&dom, "div");
    let _ = dom
        .as_element_mut(div)
        .unwrap()
        .attrs
        .insert("style".to_string(), "opacity: 0; transition: opacity 4".to_string());
    dom.get(div).unwrap().style.as_ref().unwrap().mark_all(&mut graph);
    let outcome = resolver.resolve(&mut dom, &mut graph);
    assert_eq!(outcome.animations_started, 1);
    assert_eq!(value(&dom, &graph, div, Property::Opacity), "0.750000");
    assert!(dom.get(div).unwrap().animations.contains_key(&Property::Opacity));
}
